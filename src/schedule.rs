//! Scheduler output contract
//!
//! The scheduler emits JSON with schedule items and a `searchQuery` object
//! holding one query per risk agent. Each risk agent consumes exactly its
//! own key; a missing key is a contract violation, never guessed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrchestrationError;
use crate::models::AgentRole;
use crate::Result;

/// Keys the scheduler may use for its schedule items, in lookup order.
const SCHEDULE_KEYS: [&str; 3] = ["schedule_items", "scheduleItems", "schedule"];

#[derive(Debug, Clone, Serialize)]
pub struct StructuredScheduleOutput {
    /// Schedule items in whatever shape the scheduler wrote them; `Null`
    /// when absent. Only `searchQuery` is read strictly.
    pub schedule_items: Value,
    #[serde(rename = "searchQuery")]
    pub search_query: SearchQuery,
}

/// Query strings for the three risk agents. Kept as raw JSON so a missing
/// or mistyped key surfaces at the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchQuery(serde_json::Map<String, Value>);

impl SearchQuery {
    /// Query for the given risk agent, exactly as the scheduler wrote it.
    pub fn for_role(&self, role: AgentRole) -> Result<&str> {
        let key = role.search_key().ok_or_else(|| {
            OrchestrationError::ContractViolation(format!(
                "{} does not consume a searchQuery key",
                role
            ))
        })?;

        match self.0.get(key) {
            Some(Value::String(query)) => Ok(query.as_str()),
            Some(other) => Err(OrchestrationError::ContractViolation(format!(
                "searchQuery.{} must be a string, got {}",
                key, other
            ))),
            None => Err(OrchestrationError::ContractViolation(format!(
                "searchQuery.{} is missing from scheduler output",
                key
            ))),
        }
    }
}

impl StructuredScheduleOutput {
    /// Parse scheduler text: bare JSON, a fenced ```json block, or JSON
    /// embedded in surrounding prose.
    pub fn parse(text: &str) -> Result<Self> {
        let value = extract_json_object(text).ok_or_else(|| {
            OrchestrationError::ContractViolation(
                "scheduler output contains no JSON object".to_string(),
            )
        })?;

        let search_query = match value.get("searchQuery") {
            Some(Value::Object(map)) => SearchQuery(map.clone()),
            _ => {
                return Err(OrchestrationError::ContractViolation(
                    "scheduler output has no searchQuery object".to_string(),
                ))
            }
        };

        let schedule_items = SCHEDULE_KEYS
            .iter()
            .find_map(|key| value.get(*key))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Self {
            schedule_items,
            search_query,
        })
    }
}

/// True when the text carries a `searchQuery` object. Used by selection to
/// decide whether scheduling is finished.
pub fn has_search_query(text: &str) -> bool {
    extract_json_object(text)
        .and_then(|v| v.get("searchQuery").map(Value::is_object))
        .unwrap_or(false)
}

/// Find the first JSON object in agent text.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    // 1) Whole text is JSON
    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        if parsed.is_object() {
            return Some(parsed);
        }
    }

    // 2) A ```json ... ``` fenced block
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            if let Ok(parsed) = serde_json::from_str::<Value>(after[..end].trim()) {
                if parsed.is_object() {
                    return Some(parsed);
                }
            }
        }
    }

    // 3) Outermost { ... } span
    let brace_start = text.find('{')?;
    let brace_end = text.rfind('}')?;
    if brace_end <= brace_start {
        return None;
    }
    serde_json::from_str::<Value>(&text[brace_start..=brace_end])
        .ok()
        .filter(Value::is_object)
}
