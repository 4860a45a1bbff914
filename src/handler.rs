//! Request handling: authentication, decoding and dispatch of one analysis.
//!
//! Every outcome, including failures, is returned as an [`AnalysisResponse`];
//! nothing here surfaces as a transport-level error.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactPublisher;
use crate::error::AnalysisError;
use crate::models::{ChartArtifact, DateRange};
use crate::{chart, filter, schema};

// ---

/// Transport-independent view of an incoming request.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    // ---
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    /// Base64-encoded JSON body, `None` when the request carried none.
    pub body: Option<String>,
}

impl Envelope {
    // ---
    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response envelope: a status message and, on success, the chart link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    // ---
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AnalysisResponse {
    // ---
    pub fn analyzed(url: String) -> Self {
        Self {
            message: "Analyzed".to_string(),
            url: Some(url),
        }
    }

    pub fn failure(err: &AnalysisError) -> Self {
        Self {
            message: err.message().to_string(),
            url: None,
        }
    }
}

/// Runs the analysis pipeline for one request.
pub struct Analyzer {
    // ---
    auth_secret: String,
    publisher: Arc<dyn ArtifactPublisher>,
}

impl Analyzer {
    // ---
    pub fn new(auth_secret: impl Into<String>, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            publisher,
        }
    }

    /// Handle one request. The second value is true for internal failures.
    pub async fn handle(&self, envelope: &Envelope) -> (AnalysisResponse, bool) {
        // ---
        match self.analyze(envelope).await {
            Ok(url) => (AnalysisResponse::analyzed(url), false),
            Err(err) if err.is_internal() => {
                error!("Analysis failed: {}", err);
                (AnalysisResponse::failure(&err), true)
            }
            Err(err) => {
                warn!("Request rejected: {}", err);
                (AnalysisResponse::failure(&err), false)
            }
        }
    }

    async fn analyze(&self, envelope: &Envelope) -> Result<String, AnalysisError> {
        // ---
        self.authenticate(envelope)?;

        let body = decode_body(envelope.body.as_deref())?;
        info!("Query Params: {:?}", envelope.query);

        let range = parse_range(&envelope.query)?;
        let plants = schema::validate(&body)?;
        debug!("Body holds {} plant(s)", plants.len());

        let plant_id = envelope
            .query
            .get("id")
            .ok_or(AnalysisError::MissingParam("id"))?;
        let (plant, filtered) = filter::filter_plant(&plants, plant_id, &range)?;

        debug!(
            "Plant {}: {} wetness sample(s), {} watering event(s) in range",
            plant_id,
            filtered.wetness.len(),
            filtered.water_history.len()
        );

        let plant = plant.clone();
        let artifact = tokio::task::spawn_blocking(move || {
            chart::render(&plant, &filtered, &range)
                .map(|bytes| ChartArtifact::new(bytes, &plant.name, &range))
        })
        .await
        .context("chart rendering task failed (panic/cancelled)")??;

        let url = self
            .publisher
            .publish(&artifact)
            .await
            .context("publishing chart failed")?;

        info!("Analyzed plant {} -> {}", plant_id, artifact.key);
        Ok(url)
    }

    fn authenticate(&self, envelope: &Envelope) -> Result<(), AnalysisError> {
        // ---
        match envelope.header("auth") {
            Some(token) if token == self.auth_secret => Ok(()),
            _ => Err(AnalysisError::Unauthorized),
        }
    }
}

/// Base64 then JSON. An absent body decodes to nothing and is rejected.
fn decode_body(body: Option<&str>) -> Result<Value, AnalysisError> {
    // ---
    let encoded = body.ok_or_else(|| AnalysisError::Decode("request has no body".to_string()))?;

    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AnalysisError::Decode(e.to_string()))
}

/// `start` then `end`, each required and in `YYYY-MM-DD`.
fn parse_range(query: &HashMap<String, String>) -> Result<DateRange, AnalysisError> {
    // ---
    let start = parse_date_param(query, "start")?;
    let end = parse_date_param(query, "end")?;
    Ok(DateRange::new(start, end))
}

fn parse_date_param(
    query: &HashMap<String, String>,
    name: &'static str,
) -> Result<NaiveDate, AnalysisError> {
    // ---
    let raw = query.get(name).ok_or(AnalysisError::MissingParam(name))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AnalysisError::DateFormat(raw.clone()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Keeps published artifacts in memory.
    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<ChartArtifact>>,
        fail: bool,
    }

    #[async_trait]
    impl ArtifactPublisher for RecordingPublisher {
        async fn publish(&self, artifact: &ChartArtifact) -> Result<String> {
            if self.fail {
                return Err(anyhow!("bucket unavailable"));
            }
            self.published.lock().unwrap().push(artifact.clone());
            Ok(format!("https://charts.test/{}", artifact.key))
        }
    }

    fn body() -> Value {
        // ---
        json!({
            "p1": {
                "id": "p1",
                "info": "",
                "name": "peace lily",
                "location": "office",
                "wetness": {
                    "2024-01-05T00:00:00": 15,
                    "2024-01-01T00:00:00": 10
                },
                "water_history": ["2024-01-02T00:00:00"]
            }
        })
    }

    fn envelope(auth: Option<&str>, query: &[(&str, &str)], body: Option<String>) -> Envelope {
        // ---
        Envelope {
            headers: auth
                .map(|a| HashMap::from([("auth".to_string(), a.to_string())]))
                .unwrap_or_default(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        }
    }

    fn encode(value: &Value) -> Option<String> {
        Some(BASE64.encode(value.to_string()))
    }

    const FULL_QUERY: &[(&str, &str)] = &[
        ("id", "p1"),
        ("start", "2024-01-01"),
        ("end", "2024-01-31"),
    ];

    fn analyzer() -> (Analyzer, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        (Analyzer::new("s3cret", publisher.clone()), publisher)
    }

    async fn message_for(env: Envelope) -> String {
        let (analyzer, _) = analyzer();
        analyzer.handle(&env).await.0.message
    }

    #[tokio::test]
    async fn test_analyzed() {
        // ---
        let (analyzer, publisher) = analyzer();
        let (response, internal) = analyzer
            .handle(&envelope(Some("s3cret"), FULL_QUERY, encode(&body())))
            .await;

        assert!(!internal);
        assert_eq!(response.message, "Analyzed");
        let url = response.url.unwrap();
        assert!(!url.is_empty());

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].file_name, "peace%20lily_2024-01-01_2024-01-31.png");
        assert!(url.ends_with(&published[0].key));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        // ---
        let bad_body = Some("not base64 at all".to_string());

        assert_eq!(
            message_for(envelope(Some("wrong"), FULL_QUERY, bad_body.clone())).await,
            "Unauthorized"
        );
        assert_eq!(
            message_for(envelope(None, FULL_QUERY, bad_body)).await,
            "Unauthorized"
        );
    }

    #[tokio::test]
    async fn test_header_name_is_case_insensitive() {
        // ---
        let mut env = envelope(None, FULL_QUERY, encode(&body()));
        env.headers.insert("Auth".to_string(), "s3cret".to_string());

        assert_eq!(message_for(env).await, "Analyzed");
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        // ---
        for body in [
            Some("%%%".to_string()),
            Some(BASE64.encode("{not json")),
            Some(BASE64.encode([0xffu8, 0xfe, 0x00])),
            Some(String::new()),
        ] {
            assert_eq!(
                message_for(envelope(Some("s3cret"), FULL_QUERY, body)).await,
                "Invalid JSON body"
            );
        }
    }

    #[tokio::test]
    async fn test_date_params() {
        // ---
        let b = encode(&body());

        let missing_start = envelope(
            Some("s3cret"),
            &[("id", "p1"), ("end", "2024-01-31")],
            b.clone(),
        );
        assert_eq!(message_for(missing_start).await, "Missing start or end params");

        let missing_end = envelope(
            Some("s3cret"),
            &[("id", "p1"), ("start", "2024-01-01")],
            b.clone(),
        );
        assert_eq!(message_for(missing_end).await, "Missing start or end params");

        let bad_start = envelope(
            Some("s3cret"),
            &[("id", "p1"), ("start", "01/01/2024"), ("end", "2024-01-31")],
            b.clone(),
        );
        assert_eq!(message_for(bad_start).await, "Invalid date format");

        // start is checked before end is looked up
        let bad_start_no_end = envelope(Some("s3cret"), &[("start", "2024-13-01")], b);
        assert_eq!(message_for(bad_start_no_end).await, "Invalid date format");
    }

    #[tokio::test]
    async fn test_invalid_body() {
        // ---
        let mut b = body();
        b["p1"].as_object_mut().unwrap().remove("location");

        let env = envelope(Some("s3cret"), FULL_QUERY, encode(&b));
        assert_eq!(message_for(env).await, "Invalid body");

        let env = envelope(Some("s3cret"), FULL_QUERY, encode(&json!([1, 2])));
        assert_eq!(message_for(env).await, "Invalid body");
    }

    #[tokio::test]
    async fn test_missing_id() {
        // ---
        let env = envelope(
            Some("s3cret"),
            &[("start", "2024-01-01"), ("end", "2024-01-31")],
            encode(&body()),
        );
        assert_eq!(message_for(env).await, "Missing id param");
    }

    #[tokio::test]
    async fn test_id_not_found() {
        // ---
        let env = envelope(
            Some("s3cret"),
            &[("id", "p2"), ("start", "2024-01-01"), ("end", "2024-01-31")],
            encode(&body()),
        );
        assert_eq!(message_for(env).await, "ID not found in body");
    }

    #[tokio::test]
    async fn test_absent_body_is_invalid_json() {
        // ---
        let env = envelope(Some("s3cret"), FULL_QUERY, None);
        assert_eq!(message_for(env).await, "Invalid JSON body");

        // Auth is still checked first
        let env = envelope(Some("wrong"), FULL_QUERY, None);
        assert_eq!(message_for(env).await, "Unauthorized");
    }

    #[tokio::test]
    async fn test_empty_range_still_analyzed() {
        // ---
        let env = envelope(
            Some("s3cret"),
            &[("id", "p1"), ("start", "2025-06-01"), ("end", "2025-06-30")],
            encode(&body()),
        );
        assert_eq!(message_for(env).await, "Analyzed");
    }

    #[tokio::test]
    async fn test_publish_failure_is_internal() {
        // ---
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let analyzer = Analyzer::new("s3cret", publisher);

        let (response, internal) = analyzer
            .handle(&envelope(Some("s3cret"), FULL_QUERY, encode(&body())))
            .await;

        assert!(internal);
        assert_eq!(response.message, "Internal error");
        assert_eq!(response.url, None);
    }

    #[test]
    fn test_response_serialization() {
        // ---
        let failure = AnalysisResponse::failure(&AnalysisError::Unauthorized);
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({ "message": "Unauthorized" })
        );

        let success = AnalysisResponse::analyzed("https://x/y.png".to_string());
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({ "message": "Analyzed", "url": "https://x/y.png" })
        );
    }
}
