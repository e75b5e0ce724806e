use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use webpilot_core::errors::GeneratorError;
use webpilot_core::plan::TaskPlan;

use crate::generator::PlanGenerator;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const TEMPERATURE: f64 = 0.7;

const PLAN_PROMPT: &str = "Create a step-by-step plan to accomplish the following task in a web browser:\n\
{command}\n\n\
Respond with a JSON object containing an array of 'steps'. Each step should have \
'action' (e.g., navigate, click, type) and 'params' (e.g., url, selector, text) fields.";

/// Plan generator backed by the OpenAI chat completions API.
pub struct OpenAiGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiGenerator {
    /// Fails with `MissingCredential` when no API key is configured. Callers
    /// treat that as degraded mode, not a startup failure.
    pub fn new(api_key: &str, model: Option<&str>) -> Result<Self, GeneratorError> {
        if api_key.trim().is_empty() {
            return Err(GeneratorError::MissingCredential);
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: SecretString::from(api_key),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        })
    }

    fn build_prompt(command: &str) -> String {
        PLAN_PROMPT.replace("{command}", command)
    }

    /// Parse the completion text into a plan, tolerating a fenced code block.
    fn parse_plan(text: &str) -> Result<TaskPlan, GeneratorError> {
        let trimmed = strip_code_fence(text);
        let plan: TaskPlan = serde_json::from_str(trimmed)
            .map_err(|e| GeneratorError::InvalidResponse(format!("not a task plan: {e}")))?;
        plan.validate().map_err(GeneratorError::InvalidResponse)?;
        Ok(plan)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the opening fence.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end_matches('`').trim()
}

#[async_trait]
impl PlanGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, command), fields(model = %self.model))]
    async fn create_plan(&self, command: &str) -> Result<TaskPlan, GeneratorError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": [
                { "role": "user", "content": Self::build_prompt(command) }
            ],
        });

        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout
                } else {
                    GeneratorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::from_status(status.as_u16(), body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GeneratorError::InvalidResponse("no choices in response".into()))?;

        let plan = Self::parse_plan(content)?;
        tracing::debug!(steps = plan.steps.len(), "Task plan generated");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        assert!(matches!(
            OpenAiGenerator::new("", None),
            Err(GeneratorError::MissingCredential)
        ));
        assert!(matches!(
            OpenAiGenerator::new("   ", None),
            Err(GeneratorError::MissingCredential)
        ));
    }

    #[test]
    fn defaults_model_when_unset() {
        let gen = OpenAiGenerator::new("sk-test", None).unwrap();
        assert_eq!(gen.model(), "gpt-3.5-turbo");

        let gen = OpenAiGenerator::new("sk-test", Some("gpt-4o-mini")).unwrap();
        assert_eq!(gen.model(), "gpt-4o-mini");
    }

    #[test]
    fn prompt_embeds_command() {
        let prompt = OpenAiGenerator::build_prompt("open example.com");
        assert!(prompt.contains("open example.com"));
        assert!(!prompt.contains("{command}"));
    }

    #[test]
    fn parses_plain_json_plan() {
        let plan = OpenAiGenerator::parse_plan(
            r#"{"steps":[{"action":"navigate","params":{"url":"https://example.com"}}]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, "navigate");
    }

    #[test]
    fn parses_fenced_json_plan() {
        let text = "```json\n{\"steps\":[{\"action\":\"click\",\"params\":{\"selector\":\"#go\"}}]}\n```";
        let plan = OpenAiGenerator::parse_plan(text).unwrap();
        assert_eq!(plan.steps[0].action, "click");
    }

    #[test]
    fn rejects_non_json_response() {
        let err = OpenAiGenerator::parse_plan("Sure! Here is the plan:").unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse(_)));
    }

    #[test]
    fn rejects_plan_with_empty_action() {
        let err =
            OpenAiGenerator::parse_plan(r#"{"steps":[{"action":"","params":{}}]}"#).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse(_)));
    }
}
