//! Request/response shapes for the router's library-level `generate` call
//! (the Request Envelope and Routing Outcome from the data model).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single message in a conversation. Only `system` and `user` content is
/// read by the intent classifier; `assistant` turns are carried through for
/// the backend but otherwise ignored by routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation parameters a caller may supply; any field left `None` falls
/// back to the selected backend's configured defaults (§4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

/// One in-flight request owned by the fallback router for the duration of
/// a single `generate` call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    pub params: GenerationParams,
    /// Caller-supplied backend identifier or alias, resolved by C7 before
    /// routing; takes precedence over the intent-derived primary when it
    /// resolves.
    pub preferred_backend: Option<String>,
}

impl GenerateRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            params: GenerationParams::default(),
            preferred_backend: None,
        }
    }

    /// Concatenate system- and user-role message content into one text,
    /// the input the intent classifier consumes (§4.3 step 1).
    pub fn classifiable_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::System | Role::User))
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Successful routing metadata, named to match the fields the original
/// `agent_router.generate()` return carried (`model_id`, `model_name`,
/// `intent`, `confidence`, `fallback_used`, `primary_model`,
/// `total_time_seconds`, `explicit_model_used`).
#[derive(Debug, Clone, Serialize)]
pub struct RoutingMetadata {
    pub backend_id: String,
    pub display_name: String,
    pub intent: String,
    pub confidence: f64,
    pub fallback_used: bool,
    pub primary_model: Option<String>,
    pub total_time_seconds: f64,
    pub explicit_model_used: bool,
}

/// Failure metadata returned when every candidate in `[primary] + chain`
/// has failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailureMetadata {
    pub intent: String,
    pub confidence: f64,
    pub tried_models: Vec<String>,
}

/// Outcome of a completed `generate` call (§3 Routing Outcome / §6
/// External Interfaces). This is a library-level return type, not a wire
/// format; `success` is implicit in which variant is matched rather than
/// serialized as a literal field.
#[derive(Debug, Clone, Serialize)]
pub enum GenerateResponse {
    Success {
        text: String,
        metadata: RoutingMetadata,
    },
    Failure {
        error: String,
        metadata: FailureMetadata,
    },
}

impl GenerateResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerateResponse::Success { .. })
    }
}

/// Wire payload posted to `<endpoint>/generate` (§6).
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequestPayload {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// Wire response expected from a backend's `/generate` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendResponsePayload {
    pub text: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifiable_text_excludes_assistant_turns() {
        let req = GenerateRequest::new(vec![
            Message::system("be terse"),
            Message::user("write a function"),
            Message::assistant("here you go"),
        ]);
        let text = req.classifiable_text();
        assert!(text.contains("be terse"));
        assert!(text.contains("write a function"));
        assert!(!text.contains("here you go"));
    }

    #[test]
    fn message_constructors_set_role() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::system("hi").role, Role::System);
        assert_eq!(Message::assistant("hi").role, Role::Assistant);
    }
}
