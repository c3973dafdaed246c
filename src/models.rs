//! Core data models for the chat pipeline.
//!
//! These types represent the structured query plan produced by the planner,
//! the tagged fetch results flowing out of the gateway, and the chat
//! request/response payloads exposed over HTTP.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Classified purpose of a user question.
///
/// Unknown intent strings from the language model deserialize to
/// [`Intent::General`], which the assembler treats as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RiderInfo,
    RiderVictories,
    RiderResults,
    RaceResults,
    RaceStartlist,
    TeamInfo,
    Ranking,
    Comparison,
    Statistics,
    #[default]
    #[serde(other)]
    General,
}

/// Chart type suggested by the planner.
///
/// Only `bar_chart`, `radar_chart`, and `table` have projection rules;
/// the rest are accepted from the model but produce no visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visualization {
    BarChart,
    LineChart,
    RadarChart,
    PieChart,
    Table,
    #[default]
    #[serde(other)]
    None,
}

/// Entities extracted from the question by the planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanEntities {
    #[serde(default)]
    pub riders: Vec<String>,
    #[serde(default)]
    pub races: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub stage: Option<u32>,
}

/// Filters extracted from the question by the planner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFilters {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub race_type: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub ranking_type: Option<String>,
}

/// Structured query plan produced once per chat turn.
///
/// Immutable after creation; consumed by the assembler. Every field is
/// lenient in deserialization so that a partially well-formed model
/// response still yields a usable plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub entities: PlanEntities,
    #[serde(default)]
    pub filters: PlanFilters,
    #[serde(default)]
    pub visualization: Visualization,
    #[serde(default)]
    pub comparison_mode: bool,
}

/// Error half of a [`FetchResult`], carrying the failing identifiers.
///
/// Serializes to an object with an `error` field plus the flattened
/// context (e.g. `{"error": "...", "slug": "tadej-pogacar"}`), matching
/// the wire shape consumed by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchError {
    pub error: String,
    #[serde(flatten)]
    pub context: serde_json::Map<String, Value>,
}

/// Outcome of one external fetch.
///
/// The wire discriminant is the presence of an `error` field, so the
/// error variant must come first for untagged deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchResult {
    Error(FetchError),
    Data(Value),
}

impl FetchResult {
    /// Builds an error result with the given message and context identifiers.
    pub fn error<M: Into<String>>(message: M, context: &[(&str, Value)]) -> Self {
        let mut map = serde_json::Map::new();
        for (k, v) in context {
            map.insert((*k).to_string(), v.clone());
        }
        FetchResult::Error(FetchError {
            error: message.into(),
            context: map,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FetchResult::Error(_))
    }

    /// Returns the payload for successful fetches.
    pub fn data(&self) -> Option<&Value> {
        match self {
            FetchResult::Data(v) => Some(v),
            FetchResult::Error(_) => None,
        }
    }
}

/// Per-entity results gathered while executing a plan.
///
/// Keys are the entity identifiers as supplied in the plan (not the
/// resolved slugs) so callers can correlate inputs to outputs. A
/// top-level failure during fan-out lands in `error` while partial
/// results already collected stay in `entries`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryData {
    #[serde(flatten)]
    pub entries: BTreeMap<String, FetchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryData {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.error.is_none()
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// Request body for the chat endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

/// Chart payload attached to a chat response.
#[derive(Debug, Clone, Serialize)]
pub struct VisualizationData {
    #[serde(rename = "type")]
    pub kind: Visualization,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Response body for the chat endpoint.
///
/// Created fresh per request and never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<VisualizationData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_round_trip() {
        let json = serde_json::to_string(&Intent::RiderVictories).unwrap();
        assert_eq!(json, "\"rider_victories\"");
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Intent::RiderVictories);
    }

    #[test]
    fn test_unknown_intent_falls_back_to_general() {
        let intent: Intent = serde_json::from_str("\"weather_forecast\"").unwrap();
        assert_eq!(intent, Intent::General);
    }

    #[test]
    fn test_plan_tolerates_empty_objects() {
        let plan: QueryPlan =
            serde_json::from_str(r#"{"intent":"general","entities":{},"filters":{}}"#).unwrap();
        assert_eq!(plan.intent, Intent::General);
        assert!(plan.entities.riders.is_empty());
        assert_eq!(plan.visualization, Visualization::None);
        assert!(!plan.comparison_mode);
    }

    #[test]
    fn test_fetch_result_error_wire_shape() {
        let result = FetchResult::error("not found", &[("slug", json!("tadej-pogacar"))]);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"], "not found");
        assert_eq!(value["slug"], "tadej-pogacar");
    }

    #[test]
    fn test_fetch_result_deserializes_by_error_field() {
        let err: FetchResult =
            serde_json::from_value(json!({"error": "boom", "slug": "x"})).unwrap();
        assert!(err.is_error());

        let ok: FetchResult = serde_json::from_value(json!({"name": "Tadej Pogacar"})).unwrap();
        assert!(!ok.is_error());
        assert_eq!(ok.data().unwrap()["name"], "Tadej Pogacar");
    }

    #[test]
    fn test_query_data_serializes_flattened() {
        let mut data = QueryData::default();
        data.entries.insert(
            "pogacar".to_string(),
            FetchResult::Data(json!({"name": "Tadej Pogacar"})),
        );
        data.error = Some("upstream hiccup".to_string());

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["pogacar"]["name"], "Tadej Pogacar");
        assert_eq!(value["error"], "upstream hiccup");
    }
}
