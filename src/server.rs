//! HTTP surface over the prediction engine.

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::{
    BatchResult, HospitalState, IncidentImpact, Prediction, PredictionEngine, SymptomAdvice, TrafficRecord,
    WeatherRecord,
};
use crate::feeds::hospitals::DEFAULT_RADIUS_MILES;
use crate::feeds::{DataCollector, GeoPoint, RankedHospital};

pub struct ServerError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ServerError {
    fn new(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self { status, error: error.into() }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": format!("{:#}", self.error), "status": "error" });
        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

/// Unwrap a JSON body, answering 400 through `ServerError` when it does not parse.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ServerError::new(StatusCode::BAD_REQUEST, anyhow::anyhow!(rejection.body_text())))
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PredictionEngine>,
    pub collector: Arc<DataCollector>,
    pub latest: Arc<RwLock<BatchResult>>,
}

impl AppState {
    pub fn new(engine: PredictionEngine, collector: DataCollector) -> Self {
        Self {
            engine: Arc::new(engine),
            collector: Arc::new(collector),
            latest: Arc::new(RwLock::new(BatchResult::empty())),
        }
    }
}

#[derive(Deserialize)]
struct PredictionRequest {
    hospitals: Vec<HospitalState>,
    #[serde(default)]
    weather: Option<WeatherRecord>,
    #[serde(default)]
    traffic: Option<TrafficRecord>,
}

#[derive(Deserialize)]
struct LocationRequest {
    lat: f64,
    lng: f64,
    #[serde(default)]
    radius_miles: Option<f64>,
}

#[derive(Serialize)]
struct LocatedHospital {
    #[serde(flatten)]
    hospital: RankedHospital,
    prediction: Option<Prediction>,
}

#[derive(Serialize)]
struct LocationResponse {
    location: GeoPoint,
    hospitals: Vec<LocatedHospital>,
    weather: WeatherRecord,
    traffic: TrafficRecord,
    batch: BatchResult,
}

#[derive(Deserialize)]
struct IncidentRequest {
    #[serde(rename = "type", default = "default_incident")]
    incident_type: String,
    #[serde(default)]
    location: String,
    #[serde(default = "default_severity")]
    severity: String,
}

#[derive(Deserialize)]
struct SymptomRequest {
    symptoms: String,
    #[serde(default = "default_severity")]
    severity: String,
}

fn default_incident() -> String {
    "car_accident".to_string()
}

fn default_severity() -> String {
    "medium".to_string()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/predictions", get(latest_predictions).post(run_predictions))
        .route("/api/hospital/{id}", get(hospital_prediction))
        .route("/api/location", post(set_location))
        .route("/api/simulate-incident", post(simulate_incident))
        .route("/api/symptoms", post(analyze_symptoms))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("ER wait predictor listening at http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "strategy": state.engine.status(),
        "fallback": state.engine.stats(),
    }))
}

async fn latest_predictions(State(state): State<AppState>) -> Json<BatchResult> {
    Json(state.latest.read().await.clone())
}

async fn run_predictions(
    State(state): State<AppState>,
    body: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, ServerError> {
    let request = json_body(body)?;
    let weather = request.weather.unwrap_or_default();
    let traffic = request.traffic.unwrap_or_default();
    let batch = state
        .engine
        .generate_predictions(&weather, &traffic, &request.hospitals)
        .await
        .map_err(|e| ServerError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    *state.latest.write().await = batch.clone();
    Ok(Json(batch))
}

async fn hospital_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Prediction>, ServerError> {
    let latest = state.latest.read().await;
    let prediction = latest
        .get(&id)
        .cloned()
        .ok_or_else(|| ServerError::new(StatusCode::NOT_FOUND, anyhow::anyhow!("hospital '{}' not found", id)))?;
    Ok(Json(prediction))
}

async fn set_location(
    State(state): State<AppState>,
    body: Result<Json<LocationRequest>, JsonRejection>,
) -> Result<Json<LocationResponse>, ServerError> {
    let request = json_body(body)?;
    let location = GeoPoint::new(request.lat, request.lng);
    if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
        return Err(ServerError::new(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("coordinates out of range"),
        ));
    }

    let at = chrono::Local::now().naive_local();
    let radius = request.radius_miles.unwrap_or(DEFAULT_RADIUS_MILES);
    let snapshot = state.collector.snapshot(location, radius, at).await;
    if snapshot.hospitals.is_empty() {
        return Err(ServerError::new(
            StatusCode::NOT_FOUND,
            anyhow::anyhow!("no hospitals found within {} miles", radius),
        ));
    }

    let batch = state
        .engine
        .generate_predictions_at(&snapshot.weather, &snapshot.traffic, &snapshot.states, at)
        .await
        .map_err(|e| ServerError::new(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    *state.latest.write().await = batch.clone();

    let hospitals = snapshot
        .hospitals
        .into_iter()
        .map(|hospital| LocatedHospital {
            prediction: batch.get(&hospital.record.id).cloned(),
            hospital,
        })
        .collect();

    Ok(Json(LocationResponse {
        location,
        hospitals,
        weather: snapshot.weather,
        traffic: snapshot.traffic,
        batch,
    }))
}

async fn simulate_incident(
    State(state): State<AppState>,
    body: Result<Json<IncidentRequest>, JsonRejection>,
) -> Result<Json<IncidentImpact>, ServerError> {
    let request = json_body(body)?;
    Ok(Json(state.engine.simulate_incident(
        &request.incident_type,
        &request.location,
        &request.severity,
    )))
}

async fn analyze_symptoms(
    State(state): State<AppState>,
    body: Result<Json<SymptomRequest>, JsonRejection>,
) -> Result<Json<SymptomAdvice>, ServerError> {
    let request = json_body(body)?;
    if request.symptoms.trim().is_empty() {
        return Err(ServerError::new(StatusCode::BAD_REQUEST, anyhow::anyhow!("symptoms are required")));
    }
    Ok(Json(state.engine.analyze_symptoms(&request.symptoms, &request.severity).await))
}
