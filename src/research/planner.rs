use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, instrument, warn};

use super::analyst::Analyst;
use crate::config::Settings;
use crate::models::{OutlineEntry, Plan, PlanAction};
use crate::prompts;
use crate::state::SharedState;
use crate::text::{extract_json, truncate_chars};
use crate::tools::{CompletionRequest, Services};

/// Drafts the outline and decides what to search next.
pub struct Planner {
    state: SharedState,
    services: Services,
    settings: Arc<Settings>,
    analyst: Arc<Analyst>,
}

impl Planner {
    pub fn new(
        state: SharedState,
        services: Services,
        settings: Arc<Settings>,
        analyst: Arc<Analyst>,
    ) -> Self {
        Self {
            state,
            services,
            settings,
            analyst,
        }
    }

    pub async fn generate_queries(&self, topic: &str, count: usize, purpose: &str) -> Vec<String> {
        let request = CompletionRequest::new(prompts::query_generator(count, purpose), topic)
            .max_tokens(384);
        match self.services.reasoning.complete(request).await {
            Ok(raw) => parse_query_list(&raw, count),
            Err(e) => {
                warn!("Query generation failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Builds the report outline from the first chunks in the store.
    ///
    /// Never returns an empty outline; the query becomes the only topic on failure.
    #[instrument(skip(self))]
    pub async fn draft_outline(&self) -> Vec<OutlineEntry> {
        let (query, context) = {
            let state = self.state.read().await;
            let context = state
                .chunks
                .iter()
                .take(self.settings.outline_context_chunks)
                .map(|chunk| chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            (state.query.clone(), context)
        };
        let fallback = vec![OutlineEntry::new(query.clone(), Vec::new())];

        if context.is_empty() {
            warn!("No chunks available to draft outline. Using query as single topic.");
            return fallback;
        }

        let request = CompletionRequest::new(
            prompts::OUTLINE_DRAFTER,
            format!(
                "User's Question: {}\n\nContext:\n{}",
                query,
                truncate_chars(&context, self.settings.max_abstract_context_chars)
            ),
        )
        .max_tokens(1536);

        let raw = match self.services.reasoning.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Outline request failed: {}. Using default.", e);
                return fallback;
            }
        };
        match parse_outline(&raw) {
            Some(outline) => {
                info!("Drafted outline with {} topics.", outline.len());
                outline
            }
            None => {
                error!("Could not parse outline from response. Using default.");
                fallback
            }
        }
    }

    /// Critiques progress and stores the next plan on the shared state.
    #[instrument(skip(self))]
    pub async fn plan_and_critique(&self) -> Plan {
        info!("--- Agent Step: Planning & Critiquing ---");
        let coverage = self.analyst.calculate_topic_coverage().await;
        let latent = self.analyst.novel_latent_topics().await;
        let trend = self.analyst.gain_trend_description().await;

        let summary = {
            let state = self.state.read().await;
            let outline = serde_json::to_string_pretty(&state.outline).unwrap_or_default();
            let queries =
                serde_json::to_string_pretty(&state.recent_queries(5)).unwrap_or_default();
            format!(
                "Original Query: {}\n\
                 Report Outline: {}\n\
                 Current Topic Coverage: {}\n\
                 Discovered Latent Topics: {}\n\
                 Research Cycles Completed: {}\n\
                 Previous Critique: {}\n\
                 Information Gain Trend: {}\n\
                 Previously Executed Search Queries (last 5): {}",
                state.query,
                outline,
                coverage.summary,
                latent,
                state.cycles,
                state.critique_history.last().map_or("None", String::as_str),
                trend,
                queries
            )
        };

        let request = CompletionRequest::new(prompts::PLANNER_CRITIC, summary)
            .temperature(0.2)
            .max_tokens(1024);
        let parsed = match self.services.reasoning.complete(request).await {
            Ok(raw) => parse_plan(&raw),
            Err(e) => {
                error!("Planner request failed: {}", e);
                None
            }
        };

        let mut state = self.state.write().await;
        let plan = match parsed {
            Some(plan) => {
                info!("Agent Critique: {}", plan.critique);
                info!("Agent Thought: {}", plan.thought);
                info!("New Plan: {} actions", plan.actions.len());
                state.critique_history.push(plan.critique.clone());
                plan
            }
            None => Plan::complete(
                "Error: No JSON found in LLM response.",
                "Failed to generate a valid plan.",
            ),
        };
        state.plan = plan.clone();
        plan
    }

    /// One or two sentence status update describing `plan`.
    pub async fn summarize_plan(&self, plan: &Plan) -> String {
        if plan.is_complete() {
            return "Research is complete. Preparing to write the final report.".to_string();
        }
        if plan.actions.is_empty() {
            return "The last plan had no usable actions. Re-planning.".to_string();
        }
        let actions = plan
            .actions
            .iter()
            .map(|action| match action {
                PlanAction::Search { query, .. } => format!("Search for '{}'", query),
                PlanAction::AddToOutline { topic, .. } => {
                    format!("Add new topic '{}' to the research outline", topic)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");

        let request = CompletionRequest::new(
            prompts::AGENT_SUMMARY,
            format!(
                "Agent's Thought Process: {}\nNext Actions: {}",
                plan.thought, actions
            ),
        )
        .model(self.settings.agent_summary_model.clone())
        .temperature(0.3)
        .max_tokens(256);

        match self.services.reasoning.complete(request).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                debug!("Status summary unavailable: {}", e);
                actions
            }
        }
    }
}

/// Reads a JSON list of strings from `raw`, falling back to one query per line.
pub fn parse_query_list(raw: &str, count: usize) -> Vec<String> {
    static LIST: OnceLock<Regex> = OnceLock::new();
    let list = LIST.get_or_init(|| Regex::new(r"(?s)\[.*?\]").expect("valid regex"));

    let parsed = list
        .find(raw)
        .and_then(|m| serde_json::from_str::<Vec<Value>>(m.as_str()).ok());
    match parsed {
        Some(values) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .take(count)
            .collect(),
        None => {
            warn!("Could not parse queries as JSON. Falling back to line splitting.");
            raw.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.trim_matches(|c| "-•* ".contains(c)).to_string())
                .take(count)
                .collect()
        }
    }
}

/// Sanitised outline entries, or `None` if nothing usable survives.
pub fn parse_outline(raw: &str) -> Option<Vec<OutlineEntry>> {
    let json = extract_json(raw)?;
    let value: Value = serde_json::from_str(&json).ok()?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("outline")?.as_array()?,
        _ => return None,
    };

    let mut outline: Vec<OutlineEntry> = Vec::new();
    for item in items {
        let Some(topic) = item
            .get("topic")
            .or_else(|| item.get("title"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            debug!("Dropping malformed outline entry: {}", item);
            continue;
        };
        if outline.iter().any(|entry| entry.topic == topic) {
            continue;
        }
        let subtopics = item
            .get("subtopics")
            .and_then(Value::as_array)
            .map(|subs| {
                subs.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        outline.push(OutlineEntry::new(topic, subtopics));
    }

    (!outline.is_empty()).then_some(outline)
}

/// Reads the planner's `{critique, thought, plan}` object.
///
/// A missing, non-list or empty `plan` marks research complete. A list whose
/// entries are all malformed yields no actions but keeps research going.
/// Returns `None` only when no JSON object can be extracted.
pub fn parse_plan(raw: &str) -> Option<Plan> {
    let json = extract_json(raw)?;
    let value: Value = serde_json::from_str(&json).ok()?;
    let object = value.as_object()?;

    let critique = object
        .get("critique")
        .and_then(Value::as_str)
        .unwrap_or("N/A (critique not provided by planner)")
        .to_string();
    let thought = object
        .get("thought")
        .and_then(Value::as_str)
        .unwrap_or("N/A (thought not provided by planner)")
        .to_string();

    let (actions, complete) = match object.get("plan").and_then(Value::as_array) {
        Some(items) => {
            let actions: Vec<PlanAction> = items.iter().filter_map(parse_action).collect();
            if actions.is_empty() && !items.is_empty() {
                warn!("Planner returned {} actions but none were usable.", items.len());
            }
            (actions, items.is_empty())
        }
        None => {
            warn!("Planner response missing 'plan' key or it's not a list. Assuming research complete.");
            (Vec::new(), true)
        }
    };

    Some(Plan {
        critique,
        thought,
        actions,
        complete,
    })
}

fn parse_action(item: &Value) -> Option<PlanAction> {
    let kind = item
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("SEARCH")
        .to_uppercase();
    let text = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match kind.as_str() {
        "SEARCH" => Some(PlanAction::Search {
            query: text("query")?,
            target_outline_topic: text("target_outline_topic"),
        }),
        "ADD_TO_OUTLINE" => Some(PlanAction::AddToOutline {
            topic: text("topic")?,
            subtopics: item
                .get("subtopics")
                .and_then(Value::as_array)
                .map(|subs| {
                    subs.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }),
        other => {
            warn!("Ignoring unknown plan action '{}'", other);
            None
        }
    }
}
