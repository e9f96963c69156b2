//! Symptom triage advice. Model-backed when available, rule table otherwise.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::EstimationFailure;
use super::model::{extract_json_object, ModelBackedEstimator};
use super::prediction::EstimationMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Urgency::Low,
            "high" => Urgency::High,
            _ => Urgency::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomAdvice {
    pub recommendation: String,
    pub urgency: Urgency,
    pub method: EstimationMethod,
}

#[derive(Deserialize)]
struct ModelAdvice {
    recommendation: Option<String>,
    urgency: Option<String>,
}

pub fn rule_based_advice(severity: &str) -> SymptomAdvice {
    let (recommendation, urgency) = match severity.trim().to_lowercase().as_str() {
        "high" => ("Seek immediate medical attention - call 911 or go to emergency room", Urgency::High),
        "medium" => (
            "Schedule urgent care visit or go to emergency room if symptoms worsen",
            Urgency::Medium,
        ),
        _ => ("Monitor symptoms and consult healthcare provider if they persist", Urgency::Low),
    };
    SymptomAdvice {
        recommendation: recommendation.to_string(),
        urgency,
        method: EstimationMethod::RuleBased,
    }
}

async fn model_advice(
    model: &ModelBackedEstimator,
    symptoms: &str,
    severity: &str,
) -> Result<SymptomAdvice, EstimationFailure> {
    let prompt = format!(
        r#"You are a medical triage assistant. Analyze the following symptoms and provide a recommendation:

Symptoms: {}
Severity: {}

Provide a recommendation for immediate action.
Respond with ONLY valid JSON: {{"recommendation": "text", "urgency": "low/medium/high"}}"#,
        symptoms, severity
    );
    let response = model.complete(prompt).await?;
    let span = extract_json_object(&response).ok_or(EstimationFailure::NoJsonObject)?;
    let parsed: ModelAdvice = serde_json::from_str(span).map_err(|e| EstimationFailure::MalformedJson(e.to_string()))?;

    Ok(SymptomAdvice {
        recommendation: parsed
            .recommendation
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Consult a healthcare professional".to_string()),
        urgency: parsed.urgency.as_deref().map(Urgency::parse).unwrap_or(Urgency::Medium),
        method: EstimationMethod::ModelBacked,
    })
}

/// Never fails; any model problem degrades to the rule table.
pub async fn analyze_symptoms(model: Option<&ModelBackedEstimator>, symptoms: &str, severity: &str) -> SymptomAdvice {
    let Some(model) = model else {
        return rule_based_advice(severity);
    };
    match model_advice(model, symptoms, severity).await {
        Ok(advice) => advice,
        Err(e) => {
            warn!("Symptom analysis fell back to rule table: {}", e);
            rule_based_advice(severity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMProvider;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Canned(&'static str);

    #[async_trait]
    impl LLMProvider for Canned {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_rule_table() {
        assert_eq!(rule_based_advice("high").urgency, Urgency::High);
        assert_eq!(rule_based_advice("medium").urgency, Urgency::Medium);
        assert_eq!(rule_based_advice("mild").urgency, Urgency::Low);
        assert!(rule_based_advice("HIGH").recommendation.contains("911"));
    }

    #[tokio::test]
    async fn test_model_advice_parsed() {
        let canned = Canned(r#"{"recommendation": "Go to the ER", "urgency": "HIGH"}"#);
        let model = ModelBackedEstimator::new(Arc::new(canned));
        let advice = analyze_symptoms(Some(&model), "chest pain", "high").await;
        assert_eq!(advice.recommendation, "Go to the ER");
        assert_eq!(advice.urgency, Urgency::High);
        assert_eq!(advice.method, EstimationMethod::ModelBacked);
    }

    #[tokio::test]
    async fn test_garbage_model_output_uses_rules() {
        let model = ModelBackedEstimator::new(Arc::new(Canned("I'm not able to help.")));
        let advice = analyze_symptoms(Some(&model), "headache", "low").await;
        assert_eq!(advice.method, EstimationMethod::RuleBased);
        assert_eq!(advice.urgency, Urgency::Low);
    }
}
