use super::credential::CredentialCell;
use super::http::client_with_timeout;
use super::{Stage, StageAdapter, StageHealth, StageMeta, StageResult};
use crate::config::ResponderConfig;
use crate::error::StageError;
use crate::session::{Role, Turn};
use crate::timing::timed;
use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

const PROVIDER: &str = "gemini";

/// What the responder is asked to answer
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// The user's latest utterance
    pub message: String,
    /// Trailing conversation history, oldest first; may end with `message`
    pub history: Vec<Turn>,
    /// Session the request belongs to (logging only)
    pub session_id: String,
}

/// Assistant reply text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl AsRef<str> for Reply {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Conversational replies from the Gemini `generateContent` API
pub struct GeminiResponder {
    client: reqwest::Client,
    endpoint: String,
    temperature: f32,
    max_output_tokens: u32,
    credential: CredentialCell,
}

impl GeminiResponder {
    pub fn new(config: &ResponderConfig) -> Result<Self> {
        let responder = Self {
            client: client_with_timeout(config.timeout())?,
            endpoint: config.endpoint.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            credential: CredentialCell::new(config.api_key.clone()),
        };
        info!("LLM stage initialized - Available: {}", responder.is_available());
        Ok(responder)
    }

    fn failure(reason: StageError) -> StageResult<Reply> {
        warn!("LLM error: {}", reason);
        let message = match reason {
            StageError::RemoteTimeout => {
                "I'm taking a bit longer to think than usual. Could you please try asking your question again?"
            }
            StageError::RemoteConnectivity(_) => {
                "I'm having trouble connecting to my AI brain right now. Please check your internet connection and try again."
            }
            _ => "My AI systems are temporarily unavailable. Please try your question again shortly.",
        };
        StageResult::Failure {
            message: message.to_string(),
            reason,
        }
    }

    fn fallback(request: &ReplyRequest, reason: StageError) -> StageResult<Reply> {
        StageResult::Fallback {
            payload: Reply::new(contextual_fallback(&request.message, &request.history)),
            reason,
        }
    }

    async fn call(&self, key: &str, request: &ReplyRequest) -> StageResult<Reply> {
        let body = json!({
            "contents": [{
                "parts": [{ "text": render_prompt(&request.message, &request.history) }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "topP": 0.8,
                "topK": 40
            }
        });

        info!("Sending request to Gemini API for session {}", request.session_id);

        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Self::failure(StageError::from_transport(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            return Self::failure(StageError::RemoteHardError(format!("HTTP {}", status)));
        }

        let result: Value = match response.json().await {
            Ok(value) => value,
            Err(e) => {
                let reason = StageError::from_transport(&e);
                if reason == StageError::RemoteTimeout {
                    return Self::failure(reason);
                }
                warn!("Unreadable LLM response: {}", e);
                return Self::fallback(request, StageError::RemoteMalformed(e.to_string()));
            }
        };

        let text = result
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        if text.is_empty() {
            warn!("Empty or invalid LLM response structure");
            return Self::fallback(
                request,
                StageError::RemoteMalformed("no candidate text in response".to_string()),
            );
        }

        let preview: String = text.chars().take(50).collect();
        info!("LLM response successful: '{}...'", preview);

        let tokens_used = result
            .pointer("/usageMetadata/totalTokenCount")
            .and_then(Value::as_u64)
            .map(|t| t as u32);

        StageResult::Success {
            payload: Reply::new(text),
            meta: StageMeta {
                provider: PROVIDER.to_string(),
                attempts: 1,
                tokens_used,
                ..StageMeta::default()
            },
        }
    }
}

#[async_trait::async_trait]
impl StageAdapter for GeminiResponder {
    type Input = ReplyRequest;
    type Output = Reply;

    fn stage(&self) -> Stage {
        Stage::Response
    }

    fn is_available(&self) -> bool {
        self.credential.is_present()
    }

    async fn invoke(&self, request: ReplyRequest) -> StageResult<Reply> {
        let Some(key) = self.credential.get() else {
            warn!("Gemini API unavailable - API key missing or disabled");
            return Self::fallback(&request, StageError::CredentialMissing);
        };

        let (mut result, elapsed) = timed("llm call", self.call(&key, &request)).await;
        if let StageResult::Success { meta, .. } = &mut result {
            meta.elapsed_ms = elapsed.as_millis() as u64;
        }
        result
    }

    fn set_credential(&self, credential: Option<String>) {
        self.credential.set(credential);
        info!("LLM API key updated - Available: {}", self.is_available());
    }

    fn status(&self) -> StageHealth {
        self.credential.health(Stage::Response, PROVIDER)
    }
}

/// Build the provider prompt from the user's message and prior turns.
///
/// A trailing user turn identical to `message` is the message itself and is
/// not repeated as context.
pub fn render_prompt(message: &str, history: &[Turn]) -> String {
    let prior = match history.split_last() {
        Some((last, rest)) if last.role == Role::User && last.content == message => rest,
        _ => history,
    };

    if prior.is_empty() {
        return format!(
            "You are a helpful AI assistant. Please respond to this user message naturally and \
             conversationally. Keep your response under 200 words.\n\nUser: {}",
            message
        );
    }

    let context = prior
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("User: {}", turn.content),
            Role::Assistant => format!("Assistant: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a helpful AI assistant having a conversation. Here is our conversation \
         history:\n\n{}\n\nUser: {}\n\nPlease respond naturally and conversationally. Keep your \
         response under 200 words.",
        context, message
    )
}

const GENERIC_FALLBACKS: [&str; 4] = [
    "I'm having trouble connecting to my AI brain right now. Please try again in a moment.",
    "Sorry, I'm experiencing some technical difficulties. Could you repeat that?",
    "I'm having connectivity issues at the moment. Please bear with me and try again.",
    "My AI systems are temporarily unavailable. Please try your question again shortly.",
];

/// Name the user introduced themselves with, if any.
///
/// User turns with zero confidence hold the transcriber's own placeholder
/// text, not anything the user said, so they are skipped.
fn remembered_name(history: &[Turn]) -> Option<String> {
    history
        .iter()
        .filter(|turn| turn.role == Role::User)
        .filter(|turn| turn.confidence.map_or(true, |c| c > 0.0))
        .find_map(|turn| {
            let lower = turn.content.to_lowercase();
            let rest = ["my name is", "i'm"]
                .iter()
                .find_map(|marker| lower.split_once(marker).map(|(_, rest)| rest.to_string()))?;
            let word: String = rest
                .split_whitespace()
                .next()?
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect();
            let mut chars = word.chars();
            let first = chars.next()?;
            Some(first.to_uppercase().chain(chars).collect())
        })
}

/// Deterministic placeholder reply used when the provider cannot answer
pub fn contextual_fallback(message: &str, history: &[Turn]) -> String {
    let lower = message.to_lowercase();
    let words: Vec<String> = lower
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect())
        .collect();
    let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.contains(&w.as_str()));
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    let name = remembered_name(history);

    if has_word(&["hello", "hi", "hey"])
        || has_phrase(&["good morning", "good afternoon", "good evening"])
    {
        return match name {
            Some(name) => format!(
                "Hello {}! I'm experiencing some technical difficulties with my AI systems right \
                 now, but I'm still here to help as best I can.",
                name
            ),
            None => "Hello! I'm having some technical difficulties with my AI brain right now, \
                     but I'm still here to chat when my systems are back online."
                .to_string(),
        };
    }

    if has_phrase(&["what's your name", "your name", "who are you"]) {
        return "I'm an AI assistant, though I'm having trouble accessing my full capabilities \
                right now. My AI systems are temporarily experiencing issues."
            .to_string();
    }

    if has_phrase(&["my name", "who am i"]) {
        return match name {
            Some(name) => format!(
                "You told me your name is {}, and I remember that even though my AI systems are \
                 having issues right now.",
                name
            ),
            None => "I'm having trouble with my memory systems right now. Could you remind me of \
                     your name?"
                .to_string(),
        };
    }

    if has_phrase(&["thank", "appreciate"]) {
        return "You're welcome! I'm sorry I can't provide my full AI capabilities right now due \
                to technical difficulties."
            .to_string();
    }

    if has_word(&["what", "how", "why", "when", "where"]) || lower.contains('?') {
        return "I'd love to help answer your question, but I'm experiencing connectivity issues \
                with my AI knowledge systems right now. Please try again in a moment."
            .to_string();
    }

    let index = message.bytes().map(usize::from).sum::<usize>() % GENERIC_FALLBACKS.len();
    GENERIC_FALLBACKS[index].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> Turn {
        Turn::new(Role::User, text, None)
    }

    fn assistant(text: &str) -> Turn {
        Turn::new(Role::Assistant, text, None)
    }

    #[test]
    fn prompt_without_prior_turns_is_context_free() {
        let prompt = render_prompt("Hello", &[user("Hello")]);
        assert!(prompt.starts_with("You are a helpful AI assistant. Please respond"));
        assert!(prompt.ends_with("User: Hello"));
        assert!(!prompt.contains("conversation history"));
    }

    #[test]
    fn prompt_renders_prior_turns_in_order() {
        let history = vec![user("Hi"), assistant("Hello there"), user("How are you?")];
        let prompt = render_prompt("How are you?", &history);
        let context = "User: Hi\nAssistant: Hello there\n\nUser: How are you?";
        assert!(prompt.contains(context), "prompt was: {}", prompt);
        assert_eq!(prompt.matches("How are you?").count(), 1);
    }

    #[test]
    fn greeting_fallback_uses_remembered_name() {
        let history = vec![user("My name is alice."), assistant("Nice to meet you")];
        let reply = contextual_fallback("hello again", &history);
        assert!(reply.starts_with("Hello Alice!"), "got: {}", reply);
    }

    #[test]
    fn placeholder_transcripts_are_not_names() {
        let history = vec![
            Turn::new(
                Role::User,
                "I'm having trouble with my speech recognition right now. Could you please try again?",
                Some(0.0),
            ),
            assistant("Sorry about that"),
            user("what's my name"),
        ];
        let reply = contextual_fallback("what's my name", &history);
        assert!(!reply.contains("Having"), "got: {}", reply);

        let reply = contextual_fallback("hello", &history);
        assert!(reply.starts_with("Hello! "), "got: {}", reply);
    }

    #[test]
    fn greeting_fallback_without_name() {
        let reply = contextual_fallback("Hello", &[user("Hello")]);
        assert!(reply.starts_with("Hello! I'm having some technical difficulties"));
    }

    #[test]
    fn greeting_detection_ignores_embedded_words() {
        // "this" contains "hi" but is not a greeting
        let reply = contextual_fallback("this is fine", &[]);
        assert!(GENERIC_FALLBACKS.contains(&reply.as_str()));
    }

    #[test]
    fn questions_get_question_fallback() {
        let reply = contextual_fallback("Why is the sky blue", &[]);
        assert!(reply.starts_with("I'd love to help answer your question"));
    }

    #[test]
    fn generic_fallback_is_deterministic() {
        let a = contextual_fallback("tell me a story", &[]);
        let b = contextual_fallback("tell me a story", &[]);
        assert_eq!(a, b);
    }
}
