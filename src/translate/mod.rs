//! OpenAI- and Bedrock-shaped front ends over local generation
//!
//! Both adapters flatten their request into one prompt, run it through
//! [`EdgeSdk::generate`] and rebuild the provider's response shape. Token
//! counts are estimated at four characters per token because the local
//! runtime does not report them. When local generation fails and a
//! [`FallbackConfig`](crate::config::FallbackConfig) is set, the same request
//! is replayed against the configured cloud provider, converting formats in
//! whichever direction is needed.
//!
//! ```no_run
//! use edgeinfer::config::SdkConfig;
//! use edgeinfer::translate::{openai_compatible, ChatCompletionRequest, ChatMessage};
//!
//! # async fn run() -> Result<(), edgeinfer::SdkError> {
//! let client = openai_compatible(SdkConfig::default())?;
//! let response = client
//!     .chat
//!     .completions
//!     .create(ChatCompletionRequest::new(
//!         "quantum-1.7b",
//!         vec![ChatMessage::user("What is edge inference?")],
//!     ))
//!     .await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

mod bedrock;
mod fallback;
mod openai;

pub use bedrock::{BedrockRequest, BedrockResponse, BedrockResult, TextGenerationConfig};
pub use fallback::{CloudFallback, FallbackCompletion};
pub use openai::{
    messages_to_prompt, ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChatRole, Usage,
};

use crate::config::SdkConfig;
use crate::error::SdkError;
use crate::registry::ModelRegistry;
use crate::sdk::{estimate_completion_tokens, EdgeSdk};
use std::sync::Arc;
use tracing::debug;

pub struct ProtocolTranslator {
    sdk: Arc<EdgeSdk>,
    fallback: Option<CloudFallback>,
}

impl ProtocolTranslator {
    /// Uses the SDK's fallback configuration, if any
    pub fn new(sdk: Arc<EdgeSdk>) -> Result<Self, SdkError> {
        let fallback = sdk
            .config()
            .fallback
            .clone()
            .map(|config| CloudFallback::new(config, sdk.handler().clone()))
            .transpose()?;
        Ok(Self { sdk, fallback })
    }

    pub fn with_fallback(mut self, fallback: CloudFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn sdk(&self) -> &Arc<EdgeSdk> {
        &self.sdk
    }

    /// Registered ids and hub references run as asked; anything else, such as
    /// a hosted model name, runs on the configured default model
    fn local_model<'a>(&'a self, requested: &'a str) -> &'a str {
        if ModelRegistry::get(requested).is_some() || requested.contains('/') {
            requested
        } else {
            &self.sdk.config().default_model
        }
    }

    pub async fn openai_chat(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, SdkError> {
        let prompt = request.to_prompt();
        let options = request.generate_options();
        let model = self.local_model(&request.model);
        let prompt_tokens = estimate_completion_tokens(&prompt);

        match self.sdk.generate(model, &prompt, &options).await {
            Ok(result) => Ok(ChatCompletionResponse::from_text(
                &request.model,
                result.text,
                Usage::new(prompt_tokens, result.tokens_estimated),
            )),
            Err(local_error) => {
                let Some(fallback) = &self.fallback else {
                    return Err(local_error);
                };
                let completion = fallback
                    .complete(&request.messages, &options, &local_error)
                    .await
                    .map_err(|e| self.sdk.report_error(e))?;
                let completion_tokens = estimate_completion_tokens(&completion.text);
                Ok(ChatCompletionResponse::from_text(
                    completion.model,
                    completion.text,
                    Usage::new(prompt_tokens, completion_tokens),
                ))
            }
        }
    }

    /// `model_id` plays the role of the Bedrock model path segment
    pub async fn bedrock_invoke(
        &self,
        model_id: &str,
        request: BedrockRequest,
    ) -> Result<BedrockResponse, SdkError> {
        let options = request.generate_options();
        let input_tokens = estimate_completion_tokens(&request.input_text);

        match self
            .sdk
            .generate(self.local_model(model_id), &request.input_text, &options)
            .await
        {
            Ok(result) => Ok(BedrockResponse::from_text(
                input_tokens,
                result.text,
                result.tokens_estimated,
            )),
            Err(local_error) => {
                let Some(fallback) = &self.fallback else {
                    return Err(local_error);
                };
                let messages = [ChatMessage::user(request.input_text.clone())];
                let completion = fallback
                    .complete(&messages, &options, &local_error)
                    .await
                    .map_err(|e| self.sdk.report_error(e))?;
                debug!(provider = completion.provider.as_str(), "Bedrock request served by fallback");
                let output_tokens = estimate_completion_tokens(&completion.text);
                Ok(BedrockResponse::from_text(
                    input_tokens,
                    completion.text,
                    output_tokens,
                ))
            }
        }
    }
}

impl std::fmt::Debug for ProtocolTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolTranslator")
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Drop-in for code written against an OpenAI client:
/// `client.chat.completions.create(request)`
#[derive(Debug, Clone)]
pub struct OpenAICompatibleClient {
    pub chat: Chat,
}

#[derive(Debug, Clone)]
pub struct Chat {
    pub completions: Completions,
}

#[derive(Debug, Clone)]
pub struct Completions {
    translator: Arc<ProtocolTranslator>,
}

impl Completions {
    pub async fn create(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, SdkError> {
        self.translator.openai_chat(request).await
    }
}

impl OpenAICompatibleClient {
    pub fn from_translator(translator: Arc<ProtocolTranslator>) -> Self {
        Self {
            chat: Chat {
                completions: Completions { translator },
            },
        }
    }

    pub fn from_sdk(sdk: Arc<EdgeSdk>) -> Result<Self, SdkError> {
        Ok(Self::from_translator(Arc::new(ProtocolTranslator::new(sdk)?)))
    }
}

/// Builds an SDK with default runtimes behind an OpenAI-shaped client
pub fn openai_compatible(config: SdkConfig) -> Result<OpenAICompatibleClient, SdkError> {
    OpenAICompatibleClient::from_sdk(Arc::new(EdgeSdk::new(config)?))
}
