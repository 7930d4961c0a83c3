//! Generative model clients.
//!
//! Both model calls force a single function call so the answer arrives as
//! structured JSON:
//!
//! | Client | Tool | Returns |
//! |--------|------|---------|
//! | [`OpenAIScorer`] | `assign_score` | raw `score` field |
//! | [`OpenAICriterionGenerator`] | `criteria_generator` | [`GeneratedCriterion`] |
//!
//! Requests go to `{OPENAI_BASE_URL}/chat/completions` and share the
//! embeddings client's retry policy.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use inventory_abc_core::models::{validate_prompt, ContextSnippet, GeneratedCriterion};
use inventory_abc_core::store::{CriterionGenerator, CriterionScorer};

use crate::config::LlmConfig;
use crate::embedding::{openai_api_key, openai_base_url, post_with_retry};

const SCORE_TOOL: &str = "assign_score";
const GENERATE_TOOL: &str = "criteria_generator";

const SCORE_SYSTEM_PROMPT: &str = "\
You are an expert in inventory optimization.
You are assigning a numeric score to an item based on the scoring scale of the criterion definition.
Additional context is provided in the form of reviews for the item.
The resulting score will be used to perform Multi Criteria Inventory Classification (MCIC) for ABC analysis.";

const GENERATE_SYSTEM_PROMPT: &str = r#"
You are an expert in inventory optimization.
You are defining new criteria for improving inventory classification.
The resulting criterion will be added as a feature to perform Multi Criteria Inventory Classification (MCIC) for ABC analysis.
The user will provide a prompt describing the high level reasoning of the new criterion to add.
The definition is used to assign quantitative scores to qualitative criteria defined by the user prompt.
Higher scores should be assigned to those items that need closer control by inventory.
Consider the data sources that will be used to extract the information required.

Here is an example of a criterion definition:
{
  "criteriaName": "Criticality",
  "criteriaDefinition": "The scoring will be based on:\n- IMPACT: The impact upon integrated operations.\n- SCARCITY: The possible scarcity of supply.\n- SUBSTITUTES: Existence (or not) of substitutes.\n\nScoring Scale:\n- A value of 1 would indicate a very critical item.\n- A value of 0.50 would indicate a moderately critical item.\n- A value of 0.01 would indicate a non-critical item.",
  "dataSources": []
}
"#;

/// Chat-completions client that forces one named tool call.
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl ChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: openai_api_key()?,
            base_url: openai_base_url(),
            model,
            max_retries: config.max_retries,
        })
    }

    /// Send `system` + `user` and return the forced tool call's arguments.
    pub async fn call_tool(
        &self,
        system: &str,
        user: &str,
        tool: serde_json::Value,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<serde_json::Value> {
        let tool_name = tool
            .pointer("/function/name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
            "tools": [tool],
            "tool_choice": {"type": "function", "function": {"name": tool_name}},
        });
        let url = format!("{}/chat/completions", self.base_url);

        let response =
            post_with_retry(&self.client, &url, &self.api_key, &body, self.max_retries).await?;
        parse_tool_arguments(&response, &tool_name)
    }
}

/// Extract and decode the arguments of the tool call named `tool_name`.
fn parse_tool_arguments(response: &serde_json::Value, tool_name: &str) -> Result<serde_json::Value> {
    let calls = response
        .pointer("/choices/0/message/tool_calls")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Model response has no tool call"))?;

    let call = calls
        .iter()
        .find(|c| c.pointer("/function/name").and_then(|n| n.as_str()) == Some(tool_name))
        .ok_or_else(|| anyhow::anyhow!("Model did not call tool '{}'", tool_name))?;

    let arguments = call
        .pointer("/function/arguments")
        .ok_or_else(|| anyhow::anyhow!("Tool call '{}' has no arguments", tool_name))?;

    // Arguments normally arrive as a JSON-encoded string.
    match arguments {
        serde_json::Value::String(s) => serde_json::from_str(s)
            .with_context(|| format!("Tool call '{}' has malformed arguments", tool_name)),
        other => Ok(other.clone()),
    }
}

fn function_tool(name: &str, description: &str, parameters: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

/// User message for one scoring call: the definition, then the reviews as JSON.
pub fn score_prompt(definition: &str, context: &[ContextSnippet]) -> String {
    let reviews: Vec<serde_json::Value> = context
        .iter()
        .map(|s| json!({"title": s.title, "message": s.text}))
        .collect();
    let reviews_json =
        serde_json::to_string_pretty(&reviews).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Assign a score to the item based on the following criterion:\n\n{}\n\n\
         Use the following data as context to make an informed decision:\n\n\
         REVIEWS\n{}\n",
        definition, reviews_json
    )
}

// ============ Scorer ============

pub struct OpenAIScorer {
    chat: ChatClient,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIScorer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            chat: ChatClient::new(config)?,
            max_tokens: config.score_max_tokens,
            temperature: config.score_temperature,
        })
    }
}

#[async_trait]
impl CriterionScorer for OpenAIScorer {
    async fn score(
        &self,
        definition: &str,
        context: &[ContextSnippet],
    ) -> Result<serde_json::Value> {
        let tool = function_tool(
            SCORE_TOOL,
            "Assign a score to an item from the scoring scale.",
            json!({
                "type": "object",
                "properties": {
                    "score": {
                        "type": "number",
                        "description": "The numeric score assigned to the item."
                    }
                },
                "required": ["score"]
            }),
        );

        let args = self
            .chat
            .call_tool(
                SCORE_SYSTEM_PROMPT,
                &score_prompt(definition, context),
                tool,
                self.max_tokens,
                self.temperature,
            )
            .await?;

        args.get("score")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Tool call has no 'score' field"))
    }
}

// ============ Generator ============

pub struct OpenAICriterionGenerator {
    chat: ChatClient,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAICriterionGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            chat: ChatClient::new(config)?,
            max_tokens: config.generate_max_tokens,
            temperature: config.generate_temperature,
        })
    }
}

#[async_trait]
impl CriterionGenerator for OpenAICriterionGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedCriterion> {
        validate_prompt(prompt)?;

        let tool = function_tool(
            GENERATE_TOOL,
            "Generates criteria definitions to incorporate in Inventory Classification analysis.",
            json!({
                "type": "object",
                "properties": {
                    "criteriaName": {
                        "type": "string",
                        "description": "The name of the criterion. Short name of a maximum of 3 words."
                    },
                    "criteriaDefinition": {
                        "type": "string",
                        "description": "A definition of the criterion that establishes a numeric scale."
                    },
                    "dataSources": {
                        "type": "array",
                        "items": {"type": "string", "enum": ["reviews", "products"]},
                        "description": "Data sources that can be used to extract information relevant to the criterion."
                    }
                },
                "required": ["criteriaName", "criteriaDefinition", "dataSources"]
            }),
        );

        let args = self
            .chat
            .call_tool(
                GENERATE_SYSTEM_PROMPT,
                prompt.trim(),
                tool,
                self.max_tokens,
                self.temperature,
            )
            .await?;

        parse_generated(args)
    }
}

fn parse_generated(args: serde_json::Value) -> Result<GeneratedCriterion> {
    let generated: GeneratedCriterion =
        serde_json::from_value(args).context("Generated criterion does not match the schema")?;
    if generated.criteria_name.trim().is_empty() {
        bail!("Generated criterion has an empty name");
    }
    if generated.criteria_definition.trim().is_empty() {
        bail!("Generated criterion has an empty definition");
    }
    Ok(generated)
}

// ============ Disabled ============

/// Stand-in used when `llm.provider = "disabled"`; every call fails.
pub struct DisabledLlm;

#[async_trait]
impl CriterionScorer for DisabledLlm {
    async fn score(&self, _definition: &str, _context: &[ContextSnippet]) -> Result<serde_json::Value> {
        bail!("LLM provider is disabled. Set [llm] provider in the config.")
    }
}

#[async_trait]
impl CriterionGenerator for DisabledLlm {
    async fn generate(&self, prompt: &str) -> Result<GeneratedCriterion> {
        validate_prompt(prompt)?;
        bail!("LLM provider is disabled. Set [llm] provider in the config.")
    }
}

pub fn create_scorer(config: &LlmConfig) -> Result<Box<dyn CriterionScorer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledLlm)),
        "openai" => Ok(Box::new(OpenAIScorer::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub fn create_generator(config: &LlmConfig) -> Result<Box<dyn CriterionGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledLlm)),
        "openai" => Ok(Box::new(OpenAICriterionGenerator::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_abc_core::error::ValidationError;
    use inventory_abc_core::models::DataSource;

    fn response_with(name: &str, arguments: serde_json::Value) -> serde_json::Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_parse_tool_arguments_string() {
        let resp = response_with(SCORE_TOOL, json!("{\"score\": 0.75}"));
        let args = parse_tool_arguments(&resp, SCORE_TOOL).unwrap();
        assert_eq!(args["score"], json!(0.75));
    }

    #[test]
    fn test_parse_tool_arguments_wrong_tool() {
        let resp = response_with("other", json!("{}"));
        assert!(parse_tool_arguments(&resp, SCORE_TOOL).is_err());
    }

    #[test]
    fn test_parse_tool_arguments_no_tool_call() {
        let resp = json!({"choices": [{"message": {"content": "0.5"}}]});
        let err = parse_tool_arguments(&resp, SCORE_TOOL).unwrap_err();
        assert!(err.to_string().contains("no tool call"));
    }

    #[test]
    fn test_parse_tool_arguments_malformed() {
        let resp = response_with(SCORE_TOOL, json!("{score: "));
        assert!(parse_tool_arguments(&resp, SCORE_TOOL).is_err());
    }

    #[test]
    fn test_parse_generated() {
        let generated = parse_generated(json!({
            "criteriaName": "Supplier Risk",
            "criteriaDefinition": "1 = high risk, 0.01 = low risk",
            "dataSources": ["reviews"]
        }))
        .unwrap();
        assert_eq!(generated.criteria_name, "Supplier Risk");
        assert_eq!(generated.data_sources, vec![DataSource::Reviews]);
    }

    #[test]
    fn test_parse_generated_rejects_unknown_source() {
        assert!(parse_generated(json!({
            "criteriaName": "X",
            "criteriaDefinition": "d",
            "dataSources": ["weather"]
        }))
        .is_err());
    }

    #[test]
    fn test_parse_generated_rejects_blank_name() {
        let err = parse_generated(json!({
            "criteriaName": "  ",
            "criteriaDefinition": "d",
            "dataSources": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn test_score_prompt_includes_reviews() {
        let ctx = vec![ContextSnippet {
            product_id: "p1".into(),
            title: Some("Broke".into()),
            text: "Stopped working after a week".into(),
            relevance: 0.9,
        }];
        let prompt = score_prompt("Durability: 1 = fragile", &ctx);
        assert!(prompt.contains("Durability: 1 = fragile"));
        assert!(prompt.contains("REVIEWS"));
        assert!(prompt.contains("Stopped working after a week"));
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let generator = create_generator(&LlmConfig::default()).unwrap();
        assert!(generator.generate("supplier risk").await.is_err());
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected_before_provider() {
        let generator = create_generator(&LlmConfig::default()).unwrap();
        let err = generator.generate("   ").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingField { field: "prompt" })
        );
    }
}
