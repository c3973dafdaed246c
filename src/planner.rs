//! Query planning: free text → structured [`QueryPlan`].
//!
//! One completion attempt per chat turn, a strict JSON contract on the
//! response, and a safe default plan when anything goes wrong. Planning
//! never errors — the worst case is a `general` plan that fetches
//! nothing, which the assembler handles gracefully.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::models::QueryPlan;

/// Instruction template sent to the language model. The example alias
/// mappings are hints, not binding — resolution happens locally in the
/// entity resolver either way.
const PLANNING_PROMPT: &str = r#"Analyze this cycling question and determine what data to fetch.

Question: {question}

Return a JSON object with:
{
    "intent": "rider_info|rider_victories|rider_results|race_results|race_startlist|team_info|ranking|comparison|statistics|general",
    "entities": {
        "riders": ["slug1", "slug2"],
        "races": ["race-slug"],
        "teams": ["team-slug"],
        "year": 2024,
        "stage": null
    },
    "filters": {
        "year": 2024,
        "race_type": null,
        "limit": 10
    },
    "visualization": "bar_chart|line_chart|radar_chart|table|none",
    "comparison_mode": false
}

Common rider slugs:
- Tadej Pogacar: tadej-pogacar
- Jonas Vingegaard: jonas-vingegaard
- Remco Evenepoel: remco-evenepoel
- Wout van Aert: wout-van-aert
- Mathieu van der Poel: mathieu-van-der-poel
- Primoz Roglic: primoz-roglic

Common race slugs:
- Tour de France: tour-de-france
- Giro d'Italia: giro-d-italia
- Vuelta a Espana: vuelta-a-espana
- Paris-Roubaix: paris-roubaix
- Tour of Flanders: tour-of-flanders
- Milano-Sanremo: milano-sanremo

Only return valid JSON, no explanation."#;

/// Turns user questions into query plans via the completion backend.
pub struct QueryPlanner {
    client: Arc<dyn CompletionClient>,
    max_tokens: u32,
}

impl QueryPlanner {
    pub fn new(client: Arc<dyn CompletionClient>, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    /// Produces a plan for the question. Infallible: a failed completion
    /// call or an unparseable response both yield the default plan
    /// (`intent = general`, nothing to fetch).
    pub async fn plan(&self, question: &str) -> QueryPlan {
        let request = CompletionRequest {
            system: None,
            prompt: PLANNING_PROMPT.replace("{question}", question),
            max_tokens: self.max_tokens,
        };

        match self.client.complete(request).await {
            Ok(text) => parse_plan(&text).unwrap_or_else(|err| {
                tracing::warn!(%err, "unparseable plan response, using fallback");
                QueryPlan::default()
            }),
            Err(err) => {
                tracing::warn!(%err, "planning completion failed, using fallback");
                QueryPlan::default()
            }
        }
    }
}

/// Parses a model response into a plan.
///
/// If the trimmed text starts with `{` it is parsed directly as JSON;
/// otherwise the first fenced ```json block is tried.
pub fn parse_plan(text: &str) -> anyhow::Result<QueryPlan> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fence regex")
    });
    if let Some(captures) = re.captures(trimmed) {
        return Ok(serde_json::from_str(&captures[1])?);
    }

    Ok(serde_json::from_str(trimmed)?)
}
