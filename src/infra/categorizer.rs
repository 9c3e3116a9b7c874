use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use super::http_client::{read_json, truncate};
use crate::app::{CategorizationItem, CategorizerPort};
use crate::constants::EVENT_CATEGORIES;
use crate::error::PortError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("code fence pattern is valid")
});

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Claude messages API asked to label events with one of the fixed categories.
pub struct ClaudeCategorizer {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ClaudeCategorizer {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 64_000,
            temperature: 0.1,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn headers(&self) -> Result<HeaderMap, PortError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| PortError::Api(format!("invalid API key header: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

pub fn system_prompt() -> String {
    let categories: Vec<String> = EVENT_CATEGORIES.iter().map(|c| format!("- {}", c)).collect();
    format!(
        "You are an expert event categorization system. Your task is to categorize event descriptions into exactly one of these categories:\n\
         {}\n\n\
         Rules:\n\
         1. Return ONLY a JSON object whose keys are the unique IDs from the input\n\
         2. Each value must be exactly one of the categories above\n\
         3. Process every single entry; the output must have as many entries as the input\n\
         4. If uncertain, choose the most likely category based on keywords and context\n\
         5. Do not include any explanation or additional text\n\
         6. Return plain JSON, not Markdown",
        categories.join("\n")
    )
}

/// `{"<id>": "<title>: <description>"}` for every item, in input order.
pub fn user_prompt(batch: &[CategorizationItem]) -> Result<String, PortError> {
    let payload: Map<String, Value> = batch
        .iter()
        .map(|item| {
            let text = if item.description.is_empty() {
                item.title.clone()
            } else {
                format!("{}: {}", item.title, item.description)
            };
            (item.id.clone(), Value::String(text))
        })
        .collect();
    Ok(format!("Categorize this event data:\n\n{}", serde_json::to_string(&payload)?))
}

/// Reads the model's reply as an id -> category mapping. Accepts a flat object,
/// or one nested under `results_by_date` with per-date objects or lists of
/// single-entry objects, optionally wrapped in a Markdown code fence.
pub fn parse_category_response(text: &str) -> Result<HashMap<String, String>, PortError> {
    let body = match CODE_FENCE.captures(text) {
        Some(caps) => caps.get(1).map_or(text, |m| m.as_str()),
        None => text,
    };
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| PortError::Malformed(format!("{}: {}", e, truncate(text, 200))))?;
    let Value::Object(root) = value else {
        return Err(PortError::Malformed("expected a JSON object".to_string()));
    };

    let mut categories = HashMap::new();
    match root.get("results_by_date") {
        Some(Value::Object(by_date)) => {
            for entries in by_date.values() {
                match entries {
                    Value::Object(map) => collect_labels(map, &mut categories)?,
                    Value::Array(list) => {
                        for entry in list {
                            let Value::Object(map) = entry else {
                                return Err(PortError::Malformed("expected objects in date list".to_string()));
                            };
                            collect_labels(map, &mut categories)?;
                        }
                    }
                    _ => return Err(PortError::Malformed("unexpected value under a date".to_string())),
                }
            }
        }
        Some(_) => return Err(PortError::Malformed("results_by_date must be an object".to_string())),
        None => collect_labels(&root, &mut categories)?,
    }
    Ok(categories)
}

fn collect_labels(map: &Map<String, Value>, out: &mut HashMap<String, String>) -> Result<(), PortError> {
    for (id, label) in map {
        match label {
            Value::String(category) => {
                out.insert(id.clone(), category.clone());
            }
            Value::Null => {}
            other => {
                return Err(PortError::Malformed(format!("category for {} is not a string: {}", id, other)));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl CategorizerPort for ClaudeCategorizer {
    #[instrument(skip_all, fields(api = "anthropic", events = batch.len()))]
    async fn categorize(&self, batch: &[CategorizationItem]) -> Result<HashMap<String, String>, PortError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system_prompt(),
            messages: vec![Message { role: "user", content: user_prompt(batch)? }],
        };
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, "Claude categorization request");

        let resp = self.http.post(&url).headers(self.headers()?).json(&request).send().await?;
        let response: MessagesResponse = read_json(resp).await?;

        let text = response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| PortError::Malformed("no text content in response".to_string()))?;
        info!("Received {} characters of categorization", text.len());

        let categories = parse_category_response(&text)?;
        let unknown = categories.values().filter(|c| !EVENT_CATEGORIES.contains(&c.as_str())).count();
        if unknown > 0 {
            warn!("{} labels are outside the category list", unknown);
        }
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_object() {
        let parsed = parse_category_response(r#"{"101": "Comedy Scene", "102": "Fitness"}"#).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["101"], "Comedy Scene");
    }

    #[test]
    fn test_nested_by_date_in_code_fence() {
        let text = "```json\n{\"results_by_date\": {\n  \"2025-07-01\": [{\"101\": \"Fitness\"}, {\"102\": \"Movie Screenings\"}],\n  \"2025-07-02\": {\"103\": \"Board Game Nights\"}\n}}\n```";
        let parsed = parse_category_response(text).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["102"], "Movie Screenings");
        assert_eq!(parsed["103"], "Board Game Nights");
    }

    #[test]
    fn test_prose_is_malformed() {
        let err = parse_category_response("Sure! Here are your categories: ...").unwrap_err();
        assert!(matches!(err, PortError::Malformed(_)));
        assert!(parse_category_response("[\"Fitness\"]").is_err());
        assert!(parse_category_response(r#"{"101": 7}"#).is_err());
    }

    #[test]
    fn test_user_prompt_joins_title_and_description() {
        let batch = vec![CategorizationItem {
            id: "101".to_string(),
            title: "Trivia Tuesday".to_string(),
            description: "Pub quiz with prizes".to_string(),
        }];
        let prompt = user_prompt(&batch).unwrap();
        assert!(prompt.ends_with(r#"{"101":"Trivia Tuesday: Pub quiz with prizes"}"#));
    }

    #[test]
    fn test_system_prompt_lists_every_category() {
        let prompt = system_prompt();
        assert!(EVENT_CATEGORIES.iter().all(|c| prompt.contains(c)));
    }
}
