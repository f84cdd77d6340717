//! Event extraction from decoded SSE frames.
//!
//! Each frame payload is a JSON document of the shape
//! `{ "content": { "parts": [...] }, "author": "..." }`. The backend mixes
//! several kinds of part in one event: plain text, reasoning text flagged
//! with `thought`, tool calls and responses, and chunked fragments of a
//! large payload. This module decodes a frame exactly once into a tagged
//! union so downstream logic branches on an explicit discriminant instead
//! of probing for optional fields.

use serde::Deserialize;
use serde_json::Value;

/// One classified piece of event content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// A text fragment; `is_thought` marks reasoning narration.
    Text { value: String, is_thought: bool },
    /// An agent invoking a tool.
    FunctionCall { name: String, args: Value, id: String },
    /// A tool's reply to an earlier call.
    FunctionResponse {
        name: String,
        response: Value,
        id: String,
    },
    /// A fragment of a large payload delivered in indexed chunks.
    ChunkedText {
        value: String,
        index: u32,
        is_last: bool,
    },
}

/// A decoded SSE frame: the emitting agent plus its classified parts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamEvent {
    /// Name of the agent that produced this event, when the backend sends one.
    pub author: Option<String>,
    /// Classified content parts, in wire order.
    pub parts: Vec<ContentPart>,
}

impl StreamEvent {
    /// Whether any part of this event is a chunked fragment.
    ///
    /// The session switches to chunk-reassembly mode when this is true.
    pub fn has_chunked_parts(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ContentPart::ChunkedText { .. }))
    }
}

/// Errors produced while extracting an event from a frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    /// The frame payload was not valid JSON for the expected shape.
    MalformedEvent { source: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::MalformedEvent { source } => {
                write!(f, "Malformed stream event: {}", source)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Raw event payload as sent by the backend.
#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    content: Option<ContentPayload>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    #[serde(default)]
    parts: Vec<PartPayload>,
}

/// A single part before classification. The backend serializes part kinds by
/// field presence, so every field here is optional.
#[derive(Debug, Deserialize)]
struct PartPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default, alias = "chunkInfo")]
    chunk_info: Option<ChunkInfoPayload>,
    #[serde(default, alias = "functionCall")]
    function_call: Option<FunctionCallPayload>,
    #[serde(default, alias = "functionResponse")]
    function_response: Option<FunctionResponsePayload>,
}

#[derive(Debug, Deserialize)]
struct ChunkInfoPayload {
    #[serde(default)]
    index: u32,
    #[serde(default, alias = "isLast")]
    is_last: bool,
}

#[derive(Debug, Deserialize)]
struct FunctionCallPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct FunctionResponsePayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    id: String,
}

/// Extract a [`StreamEvent`] from one frame payload.
///
/// Pure and side-effect free. Invalid JSON yields
/// [`ExtractError::MalformedEvent`]; the caller decides whether a bad frame
/// aborts anything (it should not — one bad frame is logged and skipped).
pub fn extract_event(raw_json: &str) -> Result<StreamEvent, ExtractError> {
    let payload: EventPayload =
        serde_json::from_str(raw_json).map_err(|e| ExtractError::MalformedEvent {
            source: e.to_string(),
        })?;

    let parts = payload
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(classify_part)
        .collect();

    Ok(StreamEvent {
        author: payload.author,
        parts,
    })
}

/// Classify one raw part by which optional fields it carries.
///
/// Precedence: tool call, tool response, chunked text, plain text. A part
/// with none of these fields carries nothing we dispatch on and is dropped.
fn classify_part(part: PartPayload) -> Option<ContentPart> {
    if let Some(call) = part.function_call {
        return Some(ContentPart::FunctionCall {
            name: call.name,
            args: call.args,
            id: call.id,
        });
    }
    if let Some(resp) = part.function_response {
        return Some(ContentPart::FunctionResponse {
            name: resp.name,
            response: resp.response,
            id: resp.id,
        });
    }
    let text = part.text?;
    if let Some(chunk) = part.chunk_info {
        return Some(ContentPart::ChunkedText {
            value: text,
            index: chunk.index,
            is_last: chunk.is_last,
        });
    }
    Some(ContentPart::Text {
        value: text,
        is_thought: part.thought.unwrap_or(false),
    })
}
