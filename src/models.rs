//! Core data model for the streaming transcript and activity timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Human,
    Ai,
}

/// A transcript message. Identity is `id`; updates carrying the same id are
/// idempotent upserts and never destroy unrelated fields on the receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create an AI message, initially empty. Used both for streamed content
    /// and for the placeholder that anchors timeline entries.
    pub fn ai(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Ai,
            content: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a human message with the given content.
    pub fn human(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Human,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Replace the visible content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// Payload of one activity-timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineData {
    /// Intermediate reasoning narration from an agent.
    Thinking { content: String, agent: String },
    /// A tool invocation.
    ToolCall {
        name: String,
        args: Value,
        id: String,
    },
    /// A tool's response.
    ToolResponse {
        name: String,
        response: Value,
        id: String,
    },
}

/// One entry in the per-message activity timeline.
///
/// Entries are insertion-ordered per message, except that two Thinking
/// entries sharing a title merge in place (see the session state machine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    /// Human-readable heading shown for this entry.
    pub title: String,
    pub data: TimelineData,
}

impl TimelineEntry {
    pub fn thinking(
        title: impl Into<String>,
        content: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            data: TimelineData::Thinking {
                content: content.into(),
                agent: agent.into(),
            },
        }
    }

    pub fn tool_call(title: impl Into<String>, name: String, args: Value, id: String) -> Self {
        Self {
            title: title.into(),
            data: TimelineData::ToolCall { name, args, id },
        }
    }

    pub fn tool_response(
        title: impl Into<String>,
        name: String,
        response: Value,
        id: String,
    ) -> Self {
        Self {
            title: title.into(),
            data: TimelineData::ToolResponse { name, response, id },
        }
    }

    /// Whether this is a Thinking entry.
    pub fn is_thinking(&self) -> bool {
        matches!(self.data, TimelineData::Thinking { .. })
    }
}

/// Request body for starting an analysis stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    /// The user's analysis prompt.
    pub message: String,
    pub user_id: String,
    pub session_id: String,
    /// Optional model override forwarded to the backend's model selector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AnalysisRequest {
    /// Create a request with a fresh session id.
    pub fn new(message: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            session_id: Uuid::new_v4().to_string(),
            model: None,
        }
    }

    /// Continue an existing backend session (builder pattern).
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Set a model override (builder pattern).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
