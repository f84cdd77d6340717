//! Real-time streaming pipeline for a multi-agent stock-analysis backend.
//!
//! The backend runs a pipeline of research, analysis and advisory agents and
//! streams their activity over Server-Sent Events. This crate turns that
//! byte stream into an incrementally updated transcript: a visible answer
//! message from the final synthesis agent, a per-message activity timeline
//! of agent reasoning and tool calls, and a result sink collecting the
//! intermediate agents' full reports.
//!
//! Layers, bottom up:
//! - [`framer`]: reassembles SSE frames from arbitrarily split byte chunks
//! - [`events`]: decodes a frame payload into a typed [`events::StreamEvent`]
//! - [`session`]: the per-request state machine applying events in order
//! - [`connection`]: HTTP client, retry, cancellation and the read loop

pub mod connection;
pub mod error;
pub mod events;
pub mod framer;
pub mod labels;
pub mod models;
pub mod retry;
pub mod session;

pub use connection::{ConnectionManager, ConnectionState, DEFAULT_BASE_URL};
pub use error::ConnectionError;
pub use events::{extract_event, ContentPart, ExtractError, StreamEvent};
pub use framer::FrameBuffer;
pub use models::{AnalysisRequest, Message, MessageKind, TimelineData, TimelineEntry};
pub use retry::RetryPolicy;
pub use session::{MessagePhase, ResultSink, StreamCallbacks, StreamSession};
