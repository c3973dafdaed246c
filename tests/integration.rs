//! End-to-end pipeline tests: scripted completion backend, in-memory
//! data source, real planner/gateway/assembler wiring.

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use pcs_assistant::assembler::{ChatService, ResponseAssembler};
use pcs_assistant::cache::TtlCache;
use pcs_assistant::completion::{CompletionClient, CompletionRequest};
use pcs_assistant::gateway::StatsGateway;
use pcs_assistant::models::{Intent, Visualization};
use pcs_assistant::planner::QueryPlanner;
use pcs_assistant::resolver::EntityResolver;
use pcs_assistant::source::StatsSource;

/// In-memory source keyed by locator path.
struct MapSource(HashMap<String, Value>);

impl MapSource {
    fn new(payloads: Vec<(&str, Value)>) -> Self {
        Self(
            payloads
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl StatsSource for MapSource {
    fn fetch(&self, path: &str) -> anyhow::Result<Value> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no data for {path}"))
    }
}

/// Plays a fixed plan for the planning call and fixed prose for the
/// response call. The two are told apart by the system instruction,
/// which only response generation carries.
struct ScriptedClient {
    plan_json: String,
    prose: String,
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        if request.system.is_none() {
            Ok(self.plan_json.clone())
        } else {
            Ok(self.prose.clone())
        }
    }
}

/// A backend that fails every call, like an unconfigured provider.
struct DownClient;

#[async_trait]
impl CompletionClient for DownClient {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<String> {
        bail!("provider unavailable")
    }
}

fn service(client: Arc<dyn CompletionClient>, source: MapSource) -> ChatService {
    let gateway = Arc::new(StatsGateway::new(
        Arc::new(TtlCache::new()),
        Arc::new(EntityResolver::new()),
        Arc::new(source),
        4,
    ));
    let planner = QueryPlanner::new(Arc::clone(&client), 1000);
    let assembler = ResponseAssembler::new(gateway, client, 2024, 2000);
    ChatService::new(planner, assembler)
}

fn comparison_source() -> MapSource {
    MapSource::new(vec![
        (
            "rider/tadej-pogacar",
            json!({
                "name": "Tadej Pogacar",
                "team": "UAE Team Emirates",
                "specialties": {"gc": 9500, "time_trial": 7800, "sprint": 3000,
                                "climber": 9400, "one_day_races": 8900}
            }),
        ),
        (
            "rider/jonas-vingegaard",
            json!({
                "name": "Jonas Vingegaard",
                "team": "Visma | Lease a Bike",
                "specialties": {"gc": 9300, "time_trial": 8100, "sprint": 1500,
                                "climber": 9200, "one_day_races": 4000}
            }),
        ),
    ])
}

const COMPARISON_PLAN: &str = r#"{
    "intent": "comparison",
    "entities": {"riders": ["pogacar", "vingegaard"]},
    "filters": {},
    "visualization": "radar_chart",
    "comparison_mode": true
}"#;

#[tokio::test]
async fn test_comparison_turn_end_to_end() {
    let client = Arc::new(ScriptedClient {
        plan_json: COMPARISON_PLAN.to_string(),
        prose: "Pogacar edges out Vingegaard in GC points.".to_string(),
    });
    let service = service(client, comparison_source());

    let response = service.chat("Compare Pogacar and Vingegaard").await;

    assert_eq!(response.message, "Pogacar edges out Vingegaard in GC points.");

    let data = response.data.expect("data attached to response");
    assert_eq!(data.entries.len(), 2);
    assert!(!data.entries["pogacar"].is_error());
    assert!(!data.entries["vingegaard"].is_error());
    assert!(data.error.is_none());

    let viz = response.visualization.expect("radar chart attached");
    assert_eq!(viz.kind, Visualization::RadarChart);
    let series = viz.data["series"].as_array().expect("series array");
    assert_eq!(series.len(), 2);
    for entry in series {
        for key in ["name", "gc", "tt", "sprint", "climber", "one_day"] {
            assert!(entry.get(key).is_some(), "radar entry missing {key}");
        }
    }
}

#[tokio::test]
async fn test_quick_query_returns_plan_and_data() {
    let client = Arc::new(ScriptedClient {
        plan_json: COMPARISON_PLAN.to_string(),
        prose: String::new(),
    });
    let service = service(client, comparison_source());

    let (plan, data) = service.quick("Compare Pogacar and Vingegaard").await;

    assert_eq!(plan.intent, Intent::Comparison);
    assert!(plan.comparison_mode);
    assert_eq!(data.entries.len(), 2);
    let pogacar = data.entries["pogacar"].data().expect("profile payload");
    assert_eq!(pogacar["name"], "Tadej Pogacar");
}

#[tokio::test]
async fn test_missing_rider_degrades_without_aborting_the_turn() {
    let client = Arc::new(ScriptedClient {
        plan_json: r#"{
            "intent": "comparison",
            "entities": {"riders": ["pogacar", "nobody-famous"]},
            "visualization": "radar_chart"
        }"#
        .to_string(),
        prose: "Only found data for Pogacar.".to_string(),
    });
    let service = service(client, comparison_source());

    let response = service.chat("Compare Pogacar and Nobody").await;

    let data = response.data.expect("data attached");
    assert!(!data.entries["pogacar"].is_error());
    assert!(data.entries["nobody-famous"].is_error());
    assert!(data.error.is_none());

    // the surviving rider still charts
    let viz = response.visualization.expect("chart from partial data");
    assert_eq!(viz.data["series"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dead_provider_still_answers() {
    let service = service(Arc::new(DownClient), comparison_source());

    let response = service.chat("Who is the best climber?").await;

    // fallback plan fetches nothing; response is the apology
    assert!(response.message.contains("Sorry"));
    let data = response.data.expect("data attached");
    assert!(data.entries.is_empty());
    assert!(response.visualization.is_none());
}

#[tokio::test]
async fn test_victories_question_produces_bar_chart() {
    let client = Arc::new(ScriptedClient {
        plan_json: r#"{
            "intent": "rider_victories",
            "entities": {"riders": ["tadej-pogacar"]},
            "filters": {"year": 2024},
            "visualization": "bar_chart"
        }"#
        .to_string(),
        prose: "Pogacar took 2 wins in 2024.".to_string(),
    });
    let source = MapSource::new(vec![(
        "rider/tadej-pogacar",
        json!({
            "name": "Tadej Pogacar",
            "victories": [
                {"race": "Strade Bianche", "year": 2024},
                {"race": "Il Lombardia", "date": "12 Oct 2024"},
                {"race": "Tour de France", "year": 2021}
            ]
        }),
    )]);
    let service = service(client, source);

    let response = service.chat("How many wins does Pogacar have in 2024?").await;

    let viz = response.visualization.expect("bar chart attached");
    assert_eq!(viz.kind, Visualization::BarChart);
    // the 2021 win is filtered out before counting
    assert_eq!(viz.data["series"][0]["victories"], 2);
    assert_eq!(viz.data["xKey"], "name");
}
