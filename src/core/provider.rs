//! Text completion providers used for narrative and mission copy.
//!
//! The numeric engine never depends on these. Callers always hold a
//! deterministic fallback and treat any provider error as recoverable.

use crate::core::config::{ProviderChoice, ProviderConfig};
use crate::core::error::EngineError;
use crate::core::output;
use reqwest::{StatusCode, blocking::Client};
use serde::{Deserialize, Serialize};
use std::fmt;

const CHAT_PATH: &str = "/v1/chat/completions";
const CONTEXT_HEADER: &str = "Context:";
const CONTEXT_BULLET: &str = "- ";
const SYSTEM_PROMPT: &str = "You write short, upbeat wellbeing coaching copy for an insurance engagement app. Use only the supplied context. Never invent numbers.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    LocalDeterministic,
    ExternalLlm,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LocalDeterministic => "local_deterministic",
            Self::ExternalLlm => "external_llm",
        };
        write!(f, "{}", label)
    }
}

/// A single completion capability: prompt in, text out, bounded in time.
pub trait TextCompletionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn complete(&self, prompt: &str, max_tokens: u16, temperature: f32) -> Result<String, EngineError>;
}

/// Build a prompt whose context lines the local provider can replay verbatim.
pub fn build_prompt(instruction: &str, context: &[String]) -> String {
    let mut prompt = String::from(instruction.trim());
    prompt.push_str("\n\n");
    prompt.push_str(CONTEXT_HEADER);
    for line in context {
        prompt.push('\n');
        prompt.push_str(CONTEXT_BULLET);
        prompt.push_str(line.trim());
    }
    prompt
}

/// Composes text from the prompt's context lines. Same prompt, same text.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDeterministicProvider;

impl TextCompletionProvider for LocalDeterministicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalDeterministic
    }

    fn complete(&self, prompt: &str, max_tokens: u16, _temperature: f32) -> Result<String, EngineError> {
        let context: Vec<&str> = prompt
            .lines()
            .skip_while(|l| l.trim() != CONTEXT_HEADER)
            .skip(1)
            .filter_map(|l| l.trim().strip_prefix(CONTEXT_BULLET.trim_end()))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if context.is_empty() {
            return Err(EngineError::ExternalProvider(
                "prompt carries no context lines".to_string(),
            ));
        }

        let joined = context
            .iter()
            .map(|l| {
                if l.ends_with('.') || l.ends_with('!') {
                    l.to_string()
                } else {
                    format!("{}.", l)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        let words: Vec<&str> = joined.split_whitespace().collect();
        let bounded = words
            .iter()
            .take(usize::from(max_tokens.max(1)))
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        Ok(bounded)
    }
}

/// OpenAI-compatible chat completion client with a hard request timeout.
pub struct ExternalLlmProvider {
    http: Client,
    config: ProviderConfig,
    api_key: String,
}

impl ExternalLlmProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, EngineError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EngineError::ExternalProvider("missing API key for external provider".to_string())
        })?;
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| EngineError::ExternalProvider(format!("client build failure: {}", e)))?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), CHAT_PATH)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u16,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl TextCompletionProvider for ExternalLlmProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ExternalLlm
    }

    fn complete(&self, prompt: &str, max_tokens: u16, temperature: f32) -> Result<String, EngineError> {
        let payload = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens,
            temperature,
        };

        let response = self
            .http
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::ExternalProvider(format!("timed out after {}s", self.config.timeout_secs))
                } else {
                    EngineError::ExternalProvider(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::ExternalProvider("provider rate limited".to_string()));
        }
        if !status.is_success() {
            return Err(EngineError::ExternalProvider(format!("HTTP {} from provider", status)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .map_err(|e| EngineError::ExternalProvider(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|text| output::compact_line(&text, 600))
            .filter(|text| !text.is_empty())
            .ok_or_else(|| EngineError::ExternalProvider("empty completion".to_string()))
    }
}

/// Pick the configured provider; an unusable external config degrades to local.
pub fn build_provider(config: &ProviderConfig) -> (Box<dyn TextCompletionProvider>, Option<String>) {
    match config.kind {
        ProviderChoice::Local => (Box::new(LocalDeterministicProvider), None),
        ProviderChoice::Openai => match ExternalLlmProvider::new(config.clone()) {
            Ok(p) => (Box::new(p), None),
            Err(e) => (Box::new(LocalDeterministicProvider), Some(e.to_string())),
        },
    }
}
