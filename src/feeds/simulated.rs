//! Simulated auxiliary feeds.
//!
//! None of these talk to a real source. Every record carries
//! `"simulated": true` so a downstream reader can tell them apart from
//! measured data. A fixed seed makes the whole set reproducible.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use super::ContextFeed;
use crate::engine::OpaquePayload;

const POLICE_INCIDENT_TYPES: [&str; 5] =
    ["Traffic accident", "Medical emergency", "Fire", "Domestic dispute", "Assault"];
const ACCIDENT_TYPES: [&str; 4] = ["Rear-end collision", "Side impact", "Head-on collision", "Pedestrian accident"];
const ACCIDENT_SEVERITIES: [&str; 4] = ["Minor", "Moderate", "Serious", "Fatal"];
const CALL_TYPES: [&str; 5] = ["Medical emergency", "Traffic accident", "Fire", "Police assistance", "Other"];
const CALL_PRIORITIES: [&str; 4] = ["Low", "Medium", "High", "Critical"];
const EVENT_TYPES: [&str; 8] = [
    "Sports game",
    "Concert",
    "Festival",
    "Convention",
    "Wedding",
    "Corporate event",
    "Community gathering",
    "Political rally",
];
const MENTION_TYPES: [&str; 6] = [
    "Long wait times",
    "Crowded waiting room",
    "Staff shortage",
    "Delayed treatment",
    "Overcrowded ER",
    "Patient complaints",
];
const PLATFORMS: [&str; 4] = ["Twitter", "Facebook", "Reddit", "Instagram"];
const SENTIMENTS: [&str; 3] = ["Negative", "Neutral", "Positive"];
const LEVELS: [&str; 3] = ["Low", "Medium", "High"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedKind {
    PoliceScanner,
    TrafficAccidents,
    DispatchVolume,
    RushHourImpact,
    HistoricalPatterns,
    LocalEvents,
    SocialMentions,
    HealthAlerts,
}

impl SimulatedKind {
    pub const ALL: [SimulatedKind; 8] = [
        SimulatedKind::PoliceScanner,
        SimulatedKind::TrafficAccidents,
        SimulatedKind::DispatchVolume,
        SimulatedKind::RushHourImpact,
        SimulatedKind::HistoricalPatterns,
        SimulatedKind::LocalEvents,
        SimulatedKind::SocialMentions,
        SimulatedKind::HealthAlerts,
    ];

    /// Key under which the feed appears in the prompt.
    pub fn name(&self) -> &'static str {
        match self {
            SimulatedKind::PoliceScanner => "police_incidents",
            SimulatedKind::TrafficAccidents => "traffic_accidents",
            SimulatedKind::DispatchVolume => "dispatch_volume",
            SimulatedKind::RushHourImpact => "rush_hour_impact",
            SimulatedKind::HistoricalPatterns => "historical_patterns",
            SimulatedKind::LocalEvents => "local_events",
            SimulatedKind::SocialMentions => "social_mentions",
            SimulatedKind::HealthAlerts => "health_alerts",
        }
    }
}

pub struct SimulatedFeed {
    kind: SimulatedKind,
    rng: Arc<Mutex<StdRng>>,
}

impl SimulatedFeed {
    pub fn new(kind: SimulatedKind, rng: Arc<Mutex<StdRng>>) -> Self {
        Self { kind, rng }
    }

    pub fn kind(&self) -> SimulatedKind {
        self.kind
    }

    fn generate(&self, at: NaiveDateTime) -> Value {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let rng = &mut *rng;
        let hour = at.hour();
        let weekend = at.weekday().num_days_from_monday() >= 5;
        let clock = at.format("%H:%M").to_string();

        match self.kind {
            SimulatedKind::PoliceScanner => police_scanner(rng, hour, &clock),
            SimulatedKind::TrafficAccidents => traffic_accidents(rng, hour, &clock),
            SimulatedKind::DispatchVolume => dispatch_volume(rng, hour, weekend, &clock),
            SimulatedKind::RushHourImpact => json!({
                "summary": rush_hour_impact(hour),
                "simulated": true,
            }),
            SimulatedKind::HistoricalPatterns => json!({
                "summary": "Peak hours 8-10am, 6-8pm, weekend lulls",
                "simulated": true,
            }),
            SimulatedKind::LocalEvents => local_events(rng, hour, weekend),
            SimulatedKind::SocialMentions => social_mentions(rng, hour, &clock),
            SimulatedKind::HealthAlerts => json!({
                "summary": "Not available - no health alert source configured",
                "simulated": true,
            }),
        }
    }
}

#[async_trait]
impl ContextFeed for SimulatedFeed {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn collect(&self, at: NaiveDateTime) -> Result<OpaquePayload> {
        Ok(OpaquePayload::new(self.generate(at)))
    }
}

/// The full set of simulated feeds sharing one generator.
pub fn simulated_feeds(seed: Option<u64>) -> Vec<Arc<dyn ContextFeed>> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let rng = Arc::new(Mutex::new(rng));
    SimulatedKind::ALL
        .iter()
        .map(|kind| Arc::new(SimulatedFeed::new(*kind, rng.clone())) as Arc<dyn ContextFeed>)
        .collect()
}

fn is_rush_hour(hour: u32) -> bool {
    (7..=9).contains(&hour) || (17..=19).contains(&hour)
}

fn is_late_night(hour: u32) -> bool {
    hour >= 22 || hour <= 6
}

fn pick(rng: &mut StdRng, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or("Unknown")
}

fn level(count: usize, high_above: usize, medium_above: usize) -> &'static str {
    if count > high_above {
        "High"
    } else if count > medium_above {
        "Medium"
    } else {
        "Low"
    }
}

fn police_scanner(rng: &mut StdRng, hour: u32, clock: &str) -> Value {
    let count = if is_rush_hour(hour) {
        rng.gen_range(3..=8)
    } else if is_late_night(hour) {
        rng.gen_range(2..=6)
    } else {
        rng.gen_range(1..=4)
    };
    let incidents: Vec<Value> = (0..count)
        .map(|_| {
            json!({
                "type": pick(rng, &POLICE_INCIDENT_TYPES),
                "severity": pick(rng, &LEVELS),
                "location": format!("Area {}", rng.gen_range(1..=10)),
                "time": clock,
            })
        })
        .collect();
    json!({
        "total_incidents": count,
        "incidents": incidents,
        "impact_level": level(count, 5, 2),
        "simulated": true,
    })
}

fn traffic_accidents(rng: &mut StdRng, hour: u32, clock: &str) -> Value {
    let (count, severity_multiplier) = if is_rush_hour(hour) {
        (rng.gen_range(2..=6), 1.5)
    } else if (10..=16).contains(&hour) {
        (rng.gen_range(1..=3), 1.0)
    } else {
        (rng.gen_range(0..=2), 0.8)
    };
    let accidents: Vec<Value> = (0..count)
        .map(|_| {
            json!({
                "type": pick(rng, &ACCIDENT_TYPES),
                "severity": pick(rng, &ACCIDENT_SEVERITIES),
                "injuries": rng.gen_range(0..=4),
                "location": format!("Route {}", rng.gen_range(1..=5)),
                "time": clock,
            })
        })
        .collect();
    json!({
        "total_accidents": count,
        "accidents": accidents,
        "severity_multiplier": severity_multiplier,
        "impact_on_er": level(count, 3, 1),
        "simulated": true,
    })
}

fn dispatch_volume(rng: &mut StdRng, hour: u32, weekend: bool, clock: &str) -> Value {
    let count: usize = if weekend {
        rng.gen_range(15..=35)
    } else if is_rush_hour(hour) {
        rng.gen_range(20..=40)
    } else if is_late_night(hour) {
        rng.gen_range(10..=25)
    } else {
        rng.gen_range(8..=20)
    };

    let mut total_response = 0u32;
    let mut high_priority = 0usize;
    let calls: Vec<Value> = (0..count)
        .map(|_| {
            let priority = pick(rng, &CALL_PRIORITIES);
            let response_time: u32 = rng.gen_range(3..=15);
            total_response += response_time;
            if matches!(priority, "High" | "Critical") {
                high_priority += 1;
            }
            json!({
                "type": pick(rng, &CALL_TYPES),
                "priority": priority,
                "response_time": response_time,
                "time": clock,
            })
        })
        .collect();
    let average_response_time = if count == 0 { 0.0 } else { f64::from(total_response) / count as f64 };

    json!({
        "total_calls": count,
        "calls": calls,
        "average_response_time": average_response_time,
        "high_priority_calls": high_priority,
        "impact_level": level(count, 30, 15),
        "simulated": true,
    })
}

fn rush_hour_impact(hour: u32) -> &'static str {
    if is_rush_hour(hour) {
        "High rush hour impact - increased accident risk"
    } else if (10..=16).contains(&hour) {
        "Moderate traffic impact"
    } else {
        "Low traffic impact"
    }
}

fn local_events(rng: &mut StdRng, hour: u32, weekend: bool) -> Value {
    let count = if weekend {
        rng.gen_range(2..=5)
    } else if (18..=22).contains(&hour) {
        rng.gen_range(1..=3)
    } else {
        rng.gen_range(0..=2)
    };

    let mut total_attendance = 0u32;
    let mut high_impact = 0usize;
    let events: Vec<Value> = (0..count)
        .map(|_| {
            let attendance: u32 = rng.gen_range(50..=5000);
            let impact = pick(rng, &LEVELS);
            total_attendance += attendance;
            if impact == "High" {
                high_impact += 1;
            }
            json!({
                "type": pick(rng, &EVENT_TYPES),
                "attendance": attendance,
                "location": format!("Venue {}", rng.gen_range(1..=10)),
                "start_time": format!("{}:00", rng.gen_range(18..=22)),
                "er_impact": impact,
            })
        })
        .collect();

    json!({
        "total_events": count,
        "events": events,
        "high_impact_events": high_impact,
        "total_attendance": total_attendance,
        "impact_level": level(count, 3, 1),
        "simulated": true,
    })
}

fn social_mentions(rng: &mut StdRng, hour: u32, clock: &str) -> Value {
    let peak = (8..=10).contains(&hour) || (18..=20).contains(&hour);
    let count: usize = if peak { rng.gen_range(5..=15) } else { rng.gen_range(1..=8) };

    let mut negative = 0usize;
    let mut total_impact = 0u32;
    let mentions: Vec<Value> = (0..count)
        .map(|_| {
            let sentiment = pick(rng, &SENTIMENTS);
            let impact_score: u32 = rng.gen_range(1..=10);
            if sentiment == "Negative" {
                negative += 1;
            }
            total_impact += impact_score;
            json!({
                "type": pick(rng, &MENTION_TYPES),
                "sentiment": sentiment,
                "platform": pick(rng, &PLATFORMS),
                "time": clock,
                "impact_score": impact_score,
            })
        })
        .collect();
    let average_impact = if count == 0 { 0.0 } else { f64::from(total_impact) / count as f64 };

    json!({
        "total_mentions": count,
        "mentions": mentions,
        "negative_sentiment": negative,
        "average_impact": average_impact,
        "trend_level": level(count, 10, 5),
        "simulated": true,
    })
}
