//! Bedrock text-generation invoke shapes (`inputText` in, `results` out)

use crate::runtime::GenerateOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_token_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockRequest {
    pub input_text: String,
    #[serde(default)]
    pub text_generation_config: TextGenerationConfig,
}

impl BedrockRequest {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            text_generation_config: TextGenerationConfig::default(),
        }
    }

    pub fn with_max_token_count(mut self, max_token_count: usize) -> Self {
        self.text_generation_config.max_token_count = Some(max_token_count);
        self
    }

    pub fn generate_options(&self) -> GenerateOptions {
        let defaults = GenerateOptions::default();
        let config = &self.text_generation_config;
        GenerateOptions {
            max_new_tokens: config.max_token_count.unwrap_or(defaults.max_new_tokens),
            temperature: config.temperature.unwrap_or(defaults.temperature),
            top_p: config.top_p.unwrap_or(defaults.top_p),
            do_sample: config.temperature.map_or(defaults.do_sample, |t| t > 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockResult {
    pub token_count: usize,
    pub output_text: String,
    /// `FINISH` or `LENGTH`
    pub completion_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockResponse {
    pub input_text_token_count: usize,
    pub results: Vec<BedrockResult>,
}

impl BedrockResponse {
    pub fn from_text(input_tokens: usize, text: impl Into<String>, output_tokens: usize) -> Self {
        Self {
            input_text_token_count: input_tokens,
            results: vec![BedrockResult {
                token_count: output_tokens,
                output_text: text.into(),
                completion_reason: "FINISH".to_string(),
            }],
        }
    }

    pub fn text(&self) -> &str {
        self.results
            .first()
            .map(|r| r.output_text.as_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: BedrockRequest = serde_json::from_value(serde_json::json!({
            "inputText": "Summarize: edge inference",
            "textGenerationConfig": { "maxTokenCount": 64, "temperature": 0.2 }
        }))
        .unwrap();

        assert_eq!(request.input_text, "Summarize: edge inference");
        let options = request.generate_options();
        assert_eq!(options.max_new_tokens, 64);
        assert!(options.do_sample);
    }

    #[test]
    fn test_config_is_optional() {
        let request: BedrockRequest =
            serde_json::from_value(serde_json::json!({ "inputText": "hi" })).unwrap();
        assert_eq!(request.text_generation_config, TextGenerationConfig::default());

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire, serde_json::json!({ "inputText": "hi", "textGenerationConfig": {} }));
    }

    #[test]
    fn test_response_shape() {
        let response = BedrockResponse::from_text(4, "done", 1);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["inputTextTokenCount"], 4);
        assert_eq!(value["results"][0]["outputText"], "done");
        assert_eq!(value["results"][0]["completionReason"], "FINISH");
    }
}
