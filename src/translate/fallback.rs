//! Cloud fallback: replays a failed local request against a hosted provider

use super::bedrock::{BedrockRequest, BedrockResponse, TextGenerationConfig};
use super::openai::{messages_to_prompt, ChatMessage, ChatRole};
use crate::config::{FallbackConfig, FallbackProvider};
use crate::error::SdkError;
use crate::progress::{EventHandler, EventKind, SdkEvent};
use crate::runtime::GenerateOptions;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider-neutral completion handed back to the translator
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackCompletion {
    pub text: String,
    pub provider: FallbackProvider,
    pub model: String,
}

pub struct CloudFallback {
    config: FallbackConfig,
    http: reqwest::Client,
    genai: Client,
    handler: Arc<dyn EventHandler>,
    timeout: Duration,
}

impl CloudFallback {
    pub fn new(config: FallbackConfig, handler: Arc<dyn EventHandler>) -> Result<Self, SdkError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("edgeinfer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            genai: openai_client(&config),
            config,
            http,
            handler,
            timeout: FALLBACK_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> FallbackProvider {
        self.config.provider
    }

    /// Sends `messages` to the configured provider and emits the outcome event
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerateOptions,
        local_error: &SdkError,
    ) -> Result<FallbackCompletion, SdkError> {
        let provider = self.config.provider;
        info!(
            provider = provider.as_str(),
            model = %self.config.model,
            cause = %local_error,
            "Local inference failed, using cloud fallback"
        );

        let start = Instant::now();
        let result = match provider {
            FallbackProvider::OpenAI => self.complete_openai(messages, options).await,
            FallbackProvider::Bedrock => self.complete_bedrock(messages, options).await,
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(text) => {
                self.handler.on_event(&SdkEvent::new(
                    EventKind::FallbackSuccess,
                    serde_json::json!({
                        "provider": provider,
                        "model": self.config.model,
                        "latency_ms": latency_ms,
                        "local_error": local_error.to_string(),
                    }),
                ));
                Ok(FallbackCompletion {
                    text,
                    provider,
                    model: self.config.model.clone(),
                })
            }
            Err(e) => {
                error!(provider = provider.as_str(), "Cloud fallback failed: {}", e);
                self.handler.on_event(&SdkEvent::new(
                    EventKind::FallbackError,
                    serde_json::json!({
                        "provider": provider,
                        "model": self.config.model,
                        "error": e.to_string(),
                        "local_error": local_error.to_string(),
                    }),
                ));
                Err(e)
            }
        }
    }

    async fn complete_openai(
        &self,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String, SdkError> {
        let request = GenAIChatRequest::new(messages.iter().map(to_genai_message).collect());
        let chat_options = ChatOptions::default()
            .with_temperature(options.temperature)
            .with_top_p(options.top_p)
            .with_max_tokens(options.max_new_tokens as u32);

        let response = tokio::time::timeout(
            self.timeout,
            self.genai
                .exec_chat(&self.config.model, request, Some(&chat_options)),
        )
        .await
        .map_err(|_| {
            SdkError::Fallback(format!(
                "openai request timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| SdkError::Fallback(format!("openai request failed: {}", e)))?;

        Ok(response.first_text().unwrap_or_default().to_string())
    }

    async fn complete_bedrock(
        &self,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String, SdkError> {
        let url = format!("{}/model/{}/invoke", self.bedrock_base_url()?, self.config.model);
        let body = BedrockRequest {
            input_text: bedrock_input(messages),
            text_generation_config: TextGenerationConfig {
                max_token_count: Some(options.max_new_tokens),
                temperature: Some(options.temperature),
                top_p: Some(options.top_p),
                stop_sequences: Vec::new(),
            },
        };
        debug!(url = %url, "Invoking Bedrock model");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SdkError::Fallback(format!("bedrock request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SdkError::Fallback(format!(
                "bedrock returned {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: BedrockResponse = response
            .json()
            .await
            .map_err(|e| SdkError::Fallback(format!("invalid bedrock response: {}", e)))?;
        Ok(parsed.text().to_string())
    }

    fn bedrock_base_url(&self) -> Result<String, SdkError> {
        if let Some(endpoint) = &self.config.endpoint {
            return Ok(endpoint.clone());
        }
        let region = self
            .config
            .region
            .as_deref()
            .ok_or_else(|| SdkError::Fallback("Bedrock fallback requires a region".to_string()))?;
        Ok(format!("https://bedrock-runtime.{}.amazonaws.com", region))
    }
}

impl std::fmt::Debug for CloudFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFallback")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A lone user message is sent as-is; anything else as labeled lines
fn bedrock_input(messages: &[ChatMessage]) -> String {
    match messages {
        [only] if only.role == ChatRole::User => only.content.clone(),
        _ => messages_to_prompt(messages),
    }
}

fn to_genai_message(message: &ChatMessage) -> GenAIChatMessage {
    match message.role {
        ChatRole::System => GenAIChatMessage::system(&message.content),
        ChatRole::User => GenAIChatMessage::user(&message.content),
        ChatRole::Assistant => GenAIChatMessage::assistant(&message.content),
    }
}

/// genai client pinned to the OpenAI adapter with the configured key
fn openai_client(config: &FallbackConfig) -> Client {
    let api_key = config.api_key.clone();
    let model = config.model.clone();
    let endpoint = config.endpoint.clone();

    let resolver = ServiceTargetResolver::from_resolver_fn(
        move |service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let endpoint = match &endpoint {
                Some(url) => Endpoint::from_owned(format!("{}/", url)),
                None => service_target.endpoint,
            };

            Ok(ServiceTarget {
                endpoint,
                auth: AuthData::from_single(api_key.clone()),
                model: ModelIden::new(AdapterKind::OpenAI, &model),
            })
        },
    );

    Client::builder()
        .with_service_target_resolver(resolver)
        .build()
}
