//! Completion client for the LLM collaborators (OpenAI, Anthropic, Gemini).

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::borrow::Cow;
use tracing::{debug, error, info, instrument};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const JSON_ONLY: &str = "Reply with a single JSON object and no surrounding text.";

/// LLM provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI (GPT models).
    #[display("openai")]
    OpenAI,
    /// Anthropic (Claude models).
    #[display("anthropic")]
    Anthropic,
    /// Google (Gemini models).
    #[display("gemini")]
    Gemini,
}

impl LlmProvider {
    /// Environment variable holding this provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Whether the provider can be told to emit JSON without prompting.
    fn native_json(self) -> bool {
        matches!(self, LlmProvider::Gemini)
    }
}

/// Shape the caller expects the completion to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyFormat {
    /// Free text.
    #[default]
    Text,
    /// A single JSON object.
    Json,
}

/// Provider, credentials and limits for one client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    provider: LlmProvider,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmConfig {
    /// Creates a new LLM configuration.
    #[instrument(skip(api_key), fields(provider = %provider, model = %model))]
    pub fn new(provider: LlmProvider, api_key: String, model: String, max_tokens: u32) -> Self {
        debug!("Creating LLM config");
        Self {
            provider,
            api_key,
            model,
            max_tokens,
        }
    }

    /// Gets the provider.
    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Gets the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Gets the max tokens.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// One completion to produce.
#[derive(Debug, Clone, Copy, derive_new::new)]
struct Completion<'a> {
    system: &'a str,
    user: &'a str,
    format: ReplyFormat,
}

impl Completion<'_> {
    /// System prompt, with a JSON reminder for providers that cannot be told
    /// natively.
    fn system_for(&self, provider: LlmProvider) -> Cow<'_, str> {
        if self.format == ReplyFormat::Json && !provider.native_json() {
            Cow::Owned(format!("{}\n\n{}", self.system, JSON_ONLY))
        } else {
            Cow::Borrowed(self.system)
        }
    }
}

/// Client that sends one-shot completions to the configured provider.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Creates a new LLM client.
    #[instrument(skip(config), fields(provider = %config.provider()))]
    pub fn new(config: LlmConfig) -> Self {
        info!("Creating LLM client");
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// The client's configuration.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Produces a completion for a system prompt and a user message.
    #[instrument(
        skip(self, system_prompt, user_message),
        fields(provider = %self.config.provider, model = %self.config.model)
    )]
    pub async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
        format: ReplyFormat,
    ) -> Result<String, LlmError> {
        let completion = Completion::new(system_prompt, user_message, format);
        let text = match self.config.provider {
            LlmProvider::OpenAI => self.openai(completion).await?,
            LlmProvider::Anthropic => {
                let reply = self.anthropic_request(completion).await?;
                anthropic_text(&reply).ok_or_else(|| missing_text("Anthropic", &reply))?
            }
            LlmProvider::Gemini => {
                let reply = self.gemini_request(completion).await?;
                gemini_text(&reply).ok_or_else(|| missing_text("Gemini", &reply))?
            }
        };
        info!(?format, chars = text.len(), "Completion received");
        Ok(text)
    }

    async fn anthropic_request(&self, completion: Completion<'_>) -> Result<Value, LlmError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": completion.system_for(LlmProvider::Anthropic),
            "messages": [{ "role": "user", "content": completion.user }],
        });
        let request = self
            .http
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        self.send("Anthropic", request, &body).await
    }

    async fn gemini_request(&self, completion: Completion<'_>) -> Result<Value, LlmError> {
        let mut generation = json!({ "maxOutputTokens": self.config.max_tokens });
        if completion.format == ReplyFormat::Json {
            generation["responseMimeType"] = "application/json".into();
        }
        let body = json!({
            "systemInstruction": { "parts": [{ "text": completion.system_for(LlmProvider::Gemini) }] },
            "contents": [{ "role": "user", "parts": [{ "text": completion.user }] }],
            "generationConfig": generation,
        });
        let request = self
            .http
            .post(format!("{}/{}:generateContent", GEMINI_URL, self.config.model))
            .header("x-goog-api-key", &self.config.api_key);
        self.send("Gemini", request, &body).await
    }

    /// Posts `body` and decodes the JSON reply.
    async fn send(
        &self,
        provider: &str,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> Result<Value, LlmError> {
        debug!(provider, "Sending request");
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::new(format!("{} request failed: {}", provider, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::new(format!("{} reply unreadable: {}", provider, e)))?;
        if !status.is_success() {
            return Err(LlmError::new(format!("{} returned {}: {}", provider, status, text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| LlmError::new(format!("{} reply is not JSON: {}", provider, e)))
    }

    async fn openai(&self, completion: Completion<'_>) -> Result<String, LlmError> {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new().with_api_key(self.config.api_key.clone()),
        );

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(completion.system_for(LlmProvider::OpenAI).into_owned())
            .build()
            .map_err(|e| LlmError::new(format!("Invalid system message: {}", e)))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(completion.user)
            .build()
            .map_err(|e| LlmError::new(format!("Invalid user message: {}", e)))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system),
                ChatCompletionRequestMessage::User(user),
            ])
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| LlmError::new(format!("Invalid OpenAI request: {}", e)))?;

        debug!("Sending request to OpenAI");
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::new(format!("OpenAI request failed: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::new("OpenAI reply has no content".to_string()))
    }
}

/// Joins the text blocks of an Anthropic messages reply.
fn anthropic_text(reply: &Value) -> Option<String> {
    let text: String = reply["content"]
        .as_array()?
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Joins the text parts of the first Gemini candidate.
fn gemini_text(reply: &Value) -> Option<String> {
    let text: String = reply["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

#[track_caller]
fn missing_text(provider: &str, reply: &Value) -> LlmError {
    debug!(%reply, "Reply without text");
    LlmError::new(format!("{} reply has no text", provider))
}

/// LLM client error.
#[derive(Debug, Clone, Display, Error)]
#[display("LLM error: {} at {}:{}", message, file, line)]
pub struct LlmError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl LlmError {
    /// Creates a new LLM error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        error!(error_message = %message, "LLM error created");
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<LlmError> for crate::engine::CollaboratorError {
    fn from(err: LlmError) -> Self {
        Self::Failed(err.message)
    }
}
