//! Response assembly: executing a plan against the gateway and shaping
//! the final chat payload.
//!
//! `execute` fans out over the plan's entities with a hard cap per
//! intent, collecting per-entity [`FetchResult`]s keyed by the identifier
//! exactly as it appeared in the plan — callers correlate their inputs to
//! outputs without knowing about slug resolution. One entity failing
//! never short-circuits the batch; an internal failure mid-flight lands
//! under the `error` key with whatever partial results were already
//! gathered.
//!
//! `respond` turns the data into prose via the completion backend (with a
//! literal apology on failure) and derives a chart projection when the
//! plan asked for one and the data supports it.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::gateway::StatsGateway;
use crate::models::{
    ChatResponse, Intent, QueryData, QueryPlan, Visualization, VisualizationData,
};
use crate::planner::QueryPlanner;

/// Fan-out cap for most intents.
const MAX_FANOUT: usize = 3;
/// Fan-out cap for head-to-head comparisons.
const MAX_COMPARISON_FANOUT: usize = 4;
/// Rows kept in a ranking table projection.
const MAX_TABLE_ROWS: usize = 20;

/// Assistant persona and formatting rules for response generation.
const SYSTEM_PROMPT: &str = "\
You are PCS Assistant, an expert AI assistant for professional cycling statistics.
You have access to real-time data from ProCyclingStats.com.

Your capabilities:
1. Answer questions about riders (stats, victories, career, team)
2. Provide race results and classifications
3. Compare riders head-to-head
4. Show rankings (UCI, PCS)
5. Generate data for charts and visualizations

Always be precise with statistics and cite the data source (ProCyclingStats).
Use cycling terminology appropriately.
Format numbers nicely (e.g., \"25 victories\" not \"25 wins\").

Match the user's language.
Keep responses concise but informative.";

/// Executes plans and shapes chat responses.
pub struct ResponseAssembler {
    gateway: Arc<StatsGateway>,
    client: Arc<dyn CompletionClient>,
    default_season: i32,
    response_tokens: u32,
}

impl ResponseAssembler {
    pub fn new(
        gateway: Arc<StatsGateway>,
        client: Arc<dyn CompletionClient>,
        default_season: i32,
        response_tokens: u32,
    ) -> Self {
        Self {
            gateway,
            client,
            default_season,
            response_tokens,
        }
    }

    /// Fetches everything the plan calls for.
    ///
    /// Unrecognized intents produce an empty mapping — a deliberate
    /// no-op, not an error.
    pub async fn execute(&self, plan: &QueryPlan) -> QueryData {
        let mut data = QueryData::default();
        if let Err(err) = self.run_plan(plan, &mut data).await {
            tracing::error!(%err, "plan execution failed mid-flight");
            data.error = Some(err.to_string());
        }
        data
    }

    /// Intent dispatch. Fetch failures are carried per entity inside
    /// `data`; the `Result` covers internal machinery failures only, and
    /// partial results stay in `data` when it trips.
    async fn run_plan(&self, plan: &QueryPlan, data: &mut QueryData) -> anyhow::Result<()> {
        let entities = &plan.entities;
        let filters = &plan.filters;

        match plan.intent {
            Intent::RiderInfo => {
                for rider in entities.riders.iter().take(MAX_FANOUT) {
                    let result = self.gateway.rider_profile(rider).await?;
                    data.entries.insert(rider.clone(), result);
                }
            }
            Intent::RiderVictories => {
                for rider in entities.riders.iter().take(MAX_FANOUT) {
                    let result = self.gateway.rider_victories(rider, filters.year).await?;
                    data.entries.insert(rider.clone(), result);
                }
            }
            Intent::RaceResults => {
                let year = filters.year.or(entities.year).unwrap_or(self.default_season);
                for race in entities.races.iter().take(MAX_FANOUT) {
                    let result = self.gateway.race_results(race, year, entities.stage).await?;
                    data.entries.insert(race.clone(), result);
                }
            }
            Intent::RaceStartlist => {
                let year = filters.year.or(entities.year).unwrap_or(self.default_season);
                for race in entities.races.iter().take(MAX_FANOUT) {
                    let result = self.gateway.race_startlist(race, year).await?;
                    data.entries.insert(race.clone(), result);
                }
            }
            Intent::TeamInfo => {
                let year = filters.year.unwrap_or(self.default_season);
                for team in entities.teams.iter().take(MAX_FANOUT) {
                    let result = self.gateway.team_info(team, year).await?;
                    data.entries.insert(team.clone(), result);
                }
            }
            Intent::Ranking => {
                let ranking_type = filters.ranking_type.as_deref().unwrap_or("individual");
                let result = self.gateway.ranking(ranking_type, "me").await?;
                data.entries.insert("ranking".to_string(), result);
            }
            Intent::Comparison => {
                if entities.riders.len() >= 2 {
                    for rider in entities.riders.iter().take(MAX_COMPARISON_FANOUT) {
                        let result = self.gateway.rider_profile(rider).await?;
                        data.entries.insert(rider.clone(), result);
                    }
                }
            }
            // rider_results, statistics, general, and anything the model
            // invents: nothing to fetch
            _ => {}
        }
        Ok(())
    }

    /// Builds the final chat response: prose from the completion backend
    /// plus an optional chart projection.
    pub async fn respond(
        &self,
        question: &str,
        data: &QueryData,
        plan: &QueryPlan,
    ) -> ChatResponse {
        let data_context = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
        let plan_context = serde_json::to_string(plan).unwrap_or_else(|_| "{}".to_string());
        let prompt = format!(
            "Question: {question}\n\n\
             Data fetched from ProCyclingStats:\n```json\n{data_context}\n```\n\n\
             Query plan: {plan_context}\n\n\
             Provide a helpful response based on this data. Be concise and informative.\n\
             If there's an error in the data, explain what went wrong."
        );

        let message = match self
            .client
            .complete(CompletionRequest {
                system: Some(SYSTEM_PROMPT.to_string()),
                prompt,
                max_tokens: self.response_tokens,
            })
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, "response generation failed");
                format!("Sorry, something went wrong while answering: {err}")
            }
        };

        let visualization = if plan.visualization != Visualization::None && data.error.is_none() {
            prepare_chart_data(data, plan)
        } else {
            None
        };

        ChatResponse {
            message,
            data: Some(data.clone()),
            visualization,
        }
    }
}

/// Projects fetched data into a chart-ready shape, if the combination of
/// chart type and intent supports one.
///
/// Entities that are absent or error-tagged are skipped silently; a
/// projection that ends up empty is omitted entirely rather than emitted
/// as a degenerate chart.
pub fn prepare_chart_data(data: &QueryData, plan: &QueryPlan) -> Option<VisualizationData> {
    if data.is_empty() || data.error.is_some() {
        return None;
    }

    match (plan.visualization, plan.intent) {
        (Visualization::BarChart, Intent::RiderVictories | Intent::RiderInfo) => {
            let mut series = Vec::new();
            for (key, result) in &data.entries {
                let Some(payload) = result.data() else { continue };
                let name = payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(key)
                    .to_string();
                // victories may be a list (count it), already a count, or
                // absent (a zero bar)
                let victories = match payload.get("victories") {
                    Some(Value::Array(items)) => items.len() as i64,
                    Some(Value::Number(n)) => match n.as_i64() {
                        Some(count) => count,
                        None => continue,
                    },
                    None => 0,
                    Some(_) => continue,
                };
                series.push(json!({"name": name, "victories": victories}));
            }
            chart(
                plan.visualization,
                series,
                json!({"xKey": "name", "yKey": "victories"}),
            )
        }
        (Visualization::RadarChart, Intent::Comparison) => {
            let empty = Map::new();
            let mut series = Vec::new();
            for (key, result) in &data.entries {
                let Some(payload) = result.data() else { continue };
                // a profile without specialties still charts, as all zeros
                let specialties = payload
                    .get("specialties")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                let name = payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(key)
                    .to_string();
                series.push(json!({
                    "name": name,
                    "gc": numeric_or_zero(specialties, "gc"),
                    "tt": numeric_or_zero(specialties, "time_trial"),
                    "sprint": numeric_or_zero(specialties, "sprint"),
                    "climber": numeric_or_zero(specialties, "climber"),
                    "one_day": numeric_or_zero(specialties, "one_day_races"),
                }));
            }
            chart(plan.visualization, series, json!({}))
        }
        (Visualization::Table, Intent::Ranking) => {
            let payload = data.entries.get("ranking")?.data()?;
            // the fetch may have wrapped the list one level deep
            let rows = match payload {
                Value::Array(rows) => rows.as_slice(),
                Value::Object(map) => map.get("ranking")?.as_array()?.as_slice(),
                _ => return None,
            };
            let series: Vec<Value> = rows.iter().take(MAX_TABLE_ROWS).cloned().collect();
            chart(
                plan.visualization,
                series,
                json!({"xKey": "rider_name", "yKey": "points"}),
            )
        }
        _ => None,
    }
}

fn numeric_or_zero(map: &Map<String, Value>, key: &str) -> Value {
    match map.get(key) {
        Some(v) if v.is_number() => v.clone(),
        _ => json!(0),
    }
}

fn chart(kind: Visualization, series: Vec<Value>, extra: Value) -> Option<VisualizationData> {
    if series.is_empty() {
        return None;
    }
    let mut data = json!({"series": series});
    if let (Some(target), Some(source)) = (data.as_object_mut(), extra.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    Some(VisualizationData {
        kind,
        data,
        title: None,
    })
}

/// The full chat pipeline: plan → fetch → respond.
pub struct ChatService {
    planner: QueryPlanner,
    assembler: ResponseAssembler,
}

impl ChatService {
    pub fn new(planner: QueryPlanner, assembler: ResponseAssembler) -> Self {
        Self { planner, assembler }
    }

    /// Answers a chat turn end to end. Never fails: every internal
    /// failure mode degrades into the response payload.
    pub async fn chat(&self, question: &str) -> ChatResponse {
        let plan = self.planner.plan(question).await;
        tracing::info!(intent = ?plan.intent, "executing query plan");
        let data = self.assembler.execute(&plan).await;
        self.assembler.respond(question, &data, &plan).await
    }

    /// Plans a question without executing it.
    pub async fn plan(&self, question: &str) -> QueryPlan {
        self.planner.plan(question).await
    }

    /// Quick query: plan and fetch, skipping response generation.
    pub async fn quick(&self, question: &str) -> (QueryPlan, QueryData) {
        let plan = self.planner.plan(question).await;
        let data = self.assembler.execute(&plan).await;
        (plan, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::models::FetchResult;
    use crate::resolver::EntityResolver;
    use crate::source::StatsSource;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;

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

    struct SilentClient;

    #[async_trait]
    impl CompletionClient for SilentClient {
        fn model_name(&self) -> &str {
            "silent"
        }
        async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<String> {
            bail!("unavailable")
        }
    }

    fn assembler_with(source: MapSource) -> ResponseAssembler {
        let gateway = StatsGateway::new(
            Arc::new(TtlCache::new()),
            Arc::new(EntityResolver::new()),
            Arc::new(source),
            4,
        );
        ResponseAssembler::new(Arc::new(gateway), Arc::new(SilentClient), 2024, 2000)
    }

    fn plan(intent: Intent, visualization: Visualization) -> QueryPlan {
        QueryPlan {
            intent,
            visualization,
            ..QueryPlan::default()
        }
    }

    #[tokio::test]
    async fn test_execute_isolates_per_rider_failures() {
        let assembler = assembler_with(MapSource::new(vec![(
            "rider/tadej-pogacar",
            json!({"name": "Tadej Pogacar", "victories": [1, 2, 3]}),
        )]));
        let mut p = plan(Intent::RiderVictories, Visualization::None);
        p.entities.riders = vec!["pogacar".to_string(), "ghost-rider".to_string()];

        let data = assembler.execute(&p).await;
        assert_eq!(data.entries.len(), 2);
        assert!(!data.entries["pogacar"].is_error());
        assert!(data.entries["ghost-rider"].is_error());
        assert!(data.error.is_none());
    }

    #[tokio::test]
    async fn test_execute_keys_by_plan_identifier_not_slug() {
        let assembler = assembler_with(MapSource::new(vec![(
            "rider/tadej-pogacar",
            json!({"name": "Tadej Pogacar"}),
        )]));
        let mut p = plan(Intent::RiderInfo, Visualization::None);
        p.entities.riders = vec!["pogi".to_string()];

        let data = assembler.execute(&p).await;
        assert!(data.entries.contains_key("pogi"));
        assert!(!data.entries.contains_key("tadej-pogacar"));
    }

    #[tokio::test]
    async fn test_execute_caps_fanout() {
        let assembler = assembler_with(MapSource::new(vec![]));
        let mut p = plan(Intent::RiderInfo, Visualization::None);
        p.entities.riders = (0..6).map(|i| format!("rider-{i}")).collect();

        let data = assembler.execute(&p).await;
        assert_eq!(data.entries.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_unknown_intent_is_a_noop() {
        let assembler = assembler_with(MapSource::new(vec![]));
        let mut p = plan(Intent::General, Visualization::None);
        p.entities.riders = vec!["pogacar".to_string()];

        let data = assembler.execute(&p).await;
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_comparison_requires_two_riders() {
        let assembler = assembler_with(MapSource::new(vec![(
            "rider/tadej-pogacar",
            json!({"name": "Tadej Pogacar"}),
        )]));
        let mut p = plan(Intent::Comparison, Visualization::None);
        p.entities.riders = vec!["pogacar".to_string()];

        let data = assembler.execute(&p).await;
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_race_results_year_precedence() {
        let assembler = assembler_with(MapSource::new(vec![(
            "race/tour-de-france/2023",
            json!({"winner": "Jonas Vingegaard"}),
        )]));
        let mut p = plan(Intent::RaceResults, Visualization::None);
        p.entities.races = vec!["tdf".to_string()];
        p.entities.year = Some(2024);
        p.filters.year = Some(2023); // filters win over entities

        let data = assembler.execute(&p).await;
        assert!(!data.entries["tdf"].is_error());
    }

    #[tokio::test]
    async fn test_respond_substitutes_apology_on_completion_failure() {
        let assembler = assembler_with(MapSource::new(vec![]));
        let p = plan(Intent::General, Visualization::None);
        let data = QueryData::default();

        let response = assembler.respond("hello", &data, &p).await;
        assert!(response.message.contains("Sorry"));
        assert!(response.message.contains("unavailable"));
        assert!(response.visualization.is_none());
    }

    // ---- chart projections ----

    fn data_with(entries: Vec<(&str, FetchResult)>) -> QueryData {
        let mut data = QueryData::default();
        for (k, v) in entries {
            data.entries.insert(k.to_string(), v);
        }
        data
    }

    #[test]
    fn test_bar_chart_counts_victory_lists() {
        let data = data_with(vec![(
            "pogacar",
            FetchResult::Data(json!({
                "name": "Tadej Pogacar",
                "victories": [{}, {}, {}, {}, {}]
            })),
        )]);
        let viz =
            prepare_chart_data(&data, &plan(Intent::RiderInfo, Visualization::BarChart)).unwrap();
        assert_eq!(viz.data["series"][0]["victories"], 5);
        assert_eq!(viz.data["series"][0]["name"], "Tadej Pogacar");
        assert_eq!(viz.data["xKey"], "name");
    }

    #[test]
    fn test_bar_chart_accepts_integer_victories() {
        let data = data_with(vec![(
            "cav",
            FetchResult::Data(json!({"name": "Mark Cavendish", "victories": 165})),
        )]);
        let viz = prepare_chart_data(&data, &plan(Intent::RiderVictories, Visualization::BarChart))
            .unwrap();
        assert_eq!(viz.data["series"][0]["victories"], 165);
    }

    #[test]
    fn test_bar_chart_skips_errored_entities() {
        let data = data_with(vec![
            (
                "pogacar",
                FetchResult::Data(json!({"name": "Tadej Pogacar", "victories": []})),
            ),
            ("ghost", FetchResult::error("gone", &[])),
        ]);
        let viz = prepare_chart_data(&data, &plan(Intent::RiderInfo, Visualization::BarChart));
        // pogacar has an empty list (count 0) so it still charts; ghost is skipped
        let viz = viz.unwrap();
        assert_eq!(viz.data["series"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_radar_chart_defaults_missing_specialties_to_zero() {
        let data = data_with(vec![
            (
                "pogacar",
                FetchResult::Data(json!({
                    "name": "Tadej Pogacar",
                    "specialties": {"gc": 9500, "climber": 9000, "one_day_races": 8000}
                })),
            ),
            (
                "vingegaard",
                FetchResult::Data(json!({
                    "name": "Jonas Vingegaard",
                    "specialties": {"gc": 9300, "time_trial": 7000}
                })),
            ),
        ]);
        let viz =
            prepare_chart_data(&data, &plan(Intent::Comparison, Visualization::RadarChart))
                .unwrap();
        let series = viz.data["series"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        for entry in series {
            for key in ["name", "gc", "tt", "sprint", "climber", "one_day"] {
                assert!(entry.get(key).is_some(), "missing {key}");
            }
        }
        assert_eq!(series[0]["tt"], 0);
        assert_eq!(series[1]["sprint"], 0);
    }

    #[test]
    fn test_radar_chart_keeps_rider_without_specialties() {
        let data = data_with(vec![
            (
                "pogacar",
                FetchResult::Data(json!({
                    "name": "Tadej Pogacar",
                    "specialties": {"gc": 9500}
                })),
            ),
            (
                "neo-pro",
                FetchResult::Data(json!({"name": "Some Neo Pro"})),
            ),
        ]);
        let viz =
            prepare_chart_data(&data, &plan(Intent::Comparison, Visualization::RadarChart))
                .unwrap();
        let series = viz.data["series"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        let neo = series
            .iter()
            .find(|e| e["name"] == "Some Neo Pro")
            .expect("rider without specialties still charts");
        for key in ["gc", "tt", "sprint", "climber", "one_day"] {
            assert_eq!(neo[key], 0, "{key} should default to zero");
        }
    }

    #[test]
    fn test_bar_chart_missing_victories_is_a_zero_bar() {
        let data = data_with(vec![(
            "pogacar",
            FetchResult::Data(json!({"name": "Tadej Pogacar"})),
        )]);
        let viz =
            prepare_chart_data(&data, &plan(Intent::RiderInfo, Visualization::BarChart)).unwrap();
        assert_eq!(viz.data["series"][0]["victories"], 0);
        assert_eq!(viz.data["series"][0]["name"], "Tadej Pogacar");
    }

    #[test]
    fn test_table_unwraps_and_truncates_ranking() {
        let rows: Vec<Value> = (0..30)
            .map(|i| json!({"rider_name": format!("rider {i}"), "points": 1000 - i}))
            .collect();
        let data = data_with(vec![(
            "ranking",
            FetchResult::Data(json!({"ranking": rows})),
        )]);
        let viz = prepare_chart_data(&data, &plan(Intent::Ranking, Visualization::Table)).unwrap();
        assert_eq!(viz.data["series"].as_array().unwrap().len(), 20);
        assert_eq!(viz.data["yKey"], "points");
    }

    #[test]
    fn test_unsupported_combination_yields_no_chart() {
        let data = data_with(vec![(
            "pogacar",
            FetchResult::Data(json!({"name": "Tadej Pogacar", "victories": 10})),
        )]);
        assert!(prepare_chart_data(&data, &plan(Intent::RiderInfo, Visualization::RadarChart))
            .is_none());
        assert!(prepare_chart_data(&data, &plan(Intent::Ranking, Visualization::Table)).is_none());
    }

    #[test]
    fn test_empty_series_yields_no_chart() {
        let data = data_with(vec![("ghost", FetchResult::error("gone", &[]))]);
        assert!(
            prepare_chart_data(&data, &plan(Intent::RiderInfo, Visualization::BarChart)).is_none()
        );
    }

    #[test]
    fn test_top_level_error_suppresses_chart() {
        let mut data = data_with(vec![(
            "pogacar",
            FetchResult::Data(json!({"name": "Tadej Pogacar", "victories": 3})),
        )]);
        data.error = Some("boom".to_string());
        assert!(
            prepare_chart_data(&data, &plan(Intent::RiderInfo, Visualization::BarChart)).is_none()
        );
    }
}
