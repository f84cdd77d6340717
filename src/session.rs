//! Per-request stream session state machine.
//!
//! A [`StreamSession`] owns all mutable state for one in-flight analysis
//! request: the accumulated answer text, the active agent, chunk-reassembly
//! state and thought sections. Decoded [`StreamEvent`]s are applied strictly
//! sequentially; every visible-state mutation is emitted as its own discrete
//! callback so consumers observe the stream incrementally rather than as one
//! coalesced update.
//!
//! The backend has no explicit end-of-stream marker for the synthesized
//! answer. Instead it re-sends the full aggregate text once streaming is
//! done; a non-empty fragment exactly equal to the accumulated text is the
//! termination signal.
//!
//! Sessions are never reused: one request, one session, discarded at stream
//! end or cancellation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::events::{ContentPart, StreamEvent};
use crate::labels;
use crate::models::{Message, TimelineEntry};

/// Delay before the completion signal fires after a terminal chunk, giving
/// pending message updates time to flush on the consumer side.
const COMPLETION_FLUSH_DELAY: Duration = Duration::from_millis(150);

/// Matches a bolded section header inside thought text.
static THOUGHT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("valid thought header regex"));

/// Observer interface for visible stream state.
///
/// All callbacks are invoked from the read loop, one mutation at a time, in
/// event order.
pub trait StreamCallbacks: Send {
    /// Idempotent upsert of a transcript message, keyed by `message.id`.
    fn on_message_update(&mut self, message: &Message);

    /// Append or merge one timeline entry for `message_id`. Two Thinking
    /// entries with the same title merge in place; everything else appends.
    fn on_event_update(&mut self, message_id: &str, entry: &TimelineEntry);

    /// The analysis finished; fires at most once per session.
    fn on_analysis_complete(&mut self);

    /// Number of source websites consulted by the web researcher.
    fn on_website_count_update(&mut self, count: u64);

    /// The active agent changed. Default: ignored.
    fn on_agent_change(&mut self, _agent: &str) {}
}

/// Receives the full output of agents that are not displayed.
pub trait ResultSink: Send {
    fn save(&mut self, agent_name: &str, content: &str);
}

/// Lifecycle of the displayed message within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePhase {
    Start,
    Streaming,
    Terminated,
    Complete,
}

/// Mutable state for one in-flight analysis request.
pub struct StreamSession<C, S> {
    message_id: String,
    callbacks: C,
    sink: S,
    accumulated_text: String,
    current_agent: String,
    phase: MessagePhase,
    /// Dedup keys for chunk deliveries: `agent:index`.
    seen_chunk_keys: HashSet<String>,
    /// Per-agent reassembly buffers for chunk mode, ordered by chunk index.
    /// Keyed by agent so interleaved chunk streams never mix.
    chunk_parts: HashMap<String, BTreeMap<u32, String>>,
    /// Thought sections in first-occurrence order: (title, content).
    thought_sections: Vec<(String, String)>,
    /// Last payload saved per non-displayed agent, for echo suppression.
    agent_results: HashMap<String, String>,
    anchor_emitted: bool,
    completion_fired: bool,
    completion_delay: Duration,
}

impl<C: StreamCallbacks, S: ResultSink> StreamSession<C, S> {
    /// Create a session for the AI message identified by `message_id`.
    pub fn new(message_id: impl Into<String>, callbacks: C, sink: S) -> Self {
        Self {
            message_id: message_id.into(),
            callbacks,
            sink,
            accumulated_text: String::new(),
            current_agent: String::new(),
            phase: MessagePhase::Start,
            seen_chunk_keys: HashSet::new(),
            chunk_parts: HashMap::new(),
            thought_sections: Vec::new(),
            agent_results: HashMap::new(),
            anchor_emitted: false,
            completion_fired: false,
            completion_delay: COMPLETION_FLUSH_DELAY,
        }
    }

    /// Override the completion flush delay (tests use zero).
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    /// The message id this session streams into.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Currently active agent name; empty until the first authored event.
    pub fn current_agent(&self) -> &str {
        &self.current_agent
    }

    /// Current phase of the displayed message.
    pub fn phase(&self) -> MessagePhase {
        self.phase
    }

    /// Text accumulated for the displayed message so far.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Consume the session, returning its callbacks and sink.
    pub fn into_parts(self) -> (C, S) {
        (self.callbacks, self.sink)
    }

    /// Apply one decoded event, emitting message and timeline deltas.
    ///
    /// Processing is strictly sequential; the caller must not apply events
    /// concurrently.
    pub async fn apply(&mut self, event: StreamEvent) {
        if let Some(author) = &event.author {
            if *author != self.current_agent {
                self.current_agent = author.clone();
                self.callbacks.on_agent_change(author);
            }
        }

        // Tool and thought parts surface on the timeline regardless of which
        // agent is active.
        for part in &event.parts {
            match part {
                ContentPart::FunctionCall { name, args, id } => {
                    self.handle_tool_call(name, args, id);
                }
                ContentPart::FunctionResponse { name, response, id } => {
                    self.handle_tool_response(name, response, id);
                }
                ContentPart::Text {
                    value,
                    is_thought: true,
                } => {
                    self.handle_thought(value);
                }
                _ => {}
            }
        }

        if event.has_chunked_parts() {
            self.handle_chunked(&event).await;
            return;
        }

        for part in &event.parts {
            if let ContentPart::Text {
                value,
                is_thought: false,
            } = part
            {
                self.handle_text_fragment(value).await;
            }
        }
    }

    fn handle_tool_call(&mut self, name: &str, args: &Value, id: &str) {
        let entry = TimelineEntry::tool_call(
            labels::tool_label(name),
            name.to_string(),
            args.clone(),
            id.to_string(),
        );
        self.callbacks.on_event_update(&self.message_id, &entry);
    }

    fn handle_tool_response(&mut self, name: &str, response: &Value, id: &str) {
        if let Some(count) = website_count(name, response) {
            self.callbacks.on_website_count_update(count);
        }
        let entry = TimelineEntry::tool_response(
            labels::tool_label(name),
            name.to_string(),
            response.clone(),
            id.to_string(),
        );
        self.callbacks.on_event_update(&self.message_id, &entry);
    }

    fn handle_thought(&mut self, text: &str) {
        let sections = split_thought_sections(text, labels::agent_label(&self.current_agent));
        if sections.is_empty() {
            return;
        }

        // Timeline entries need a message to attach to; emit an empty AI
        // placeholder if nothing has been shown for this id yet.
        self.ensure_anchor();

        let message_id = self.message_id.clone();
        let agent = self.current_agent.clone();
        for (title, content) in sections {
            let merged = match self
                .thought_sections
                .iter_mut()
                .find(|(existing, _)| *existing == title)
            {
                Some((_, existing_content)) => {
                    if existing_content.is_empty() {
                        *existing_content = content;
                    } else if !content.is_empty() {
                        existing_content.push_str("\n\n");
                        existing_content.push_str(&content);
                    }
                    existing_content.clone()
                }
                None => {
                    self.thought_sections.push((title.clone(), content.clone()));
                    content
                }
            };
            let entry = TimelineEntry::thinking(&title, merged, &agent);
            self.callbacks.on_event_update(&message_id, &entry);
        }
    }

    /// Chunk mode: reassemble indexed fragments of a large payload.
    ///
    /// Each agent reassembles into its own buffer. Only the final-synthesis
    /// agent's chunks touch the visible message, where the reassembled text
    /// replaces the accumulator outright; any other agent's completed
    /// reassembly goes to the result sink, leaving the displayed message and
    /// its phase untouched.
    async fn handle_chunked(&mut self, event: &StreamEvent) {
        let agent = self.current_agent.clone();
        let mut saw_last = false;
        for part in &event.parts {
            if let ContentPart::ChunkedText {
                value,
                index,
                is_last,
            } = part
            {
                let key = format!("{}:{}", agent, index);
                if !self.seen_chunk_keys.insert(key) {
                    continue;
                }
                self.chunk_parts
                    .entry(agent.clone())
                    .or_default()
                    .insert(*index, value.clone());
                if *is_last {
                    saw_last = true;
                }
            }
        }

        let reassembled: String = self
            .chunk_parts
            .get(&agent)
            .map(|parts| {
                parts
                    .values()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .concat()
            })
            .unwrap_or_default();

        if labels::is_final_synthesis(&agent) {
            self.accumulated_text = reassembled;
            self.phase = MessagePhase::Streaming;
            self.emit_message();
            if saw_last {
                self.phase = MessagePhase::Complete;
                self.fire_completion(true).await;
            }
        } else if saw_last {
            self.save_agent_result(&agent, &reassembled);
            if labels::is_advisor(&agent) {
                self.fire_completion(false).await;
            }
        }
    }

    /// Incremental mode: one fragment at a time.
    async fn handle_text_fragment(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        if !labels::is_final_synthesis(&self.current_agent) {
            let agent = self.current_agent.clone();
            let repeated = self.agent_results.get(&agent).map(String::as_str) == Some(fragment);
            if repeated {
                // Echoed payload: this agent is done. Advisors signal
                // completion of the overall analysis.
                if labels::is_advisor(&agent) {
                    self.fire_completion(false).await;
                }
            } else {
                self.save_agent_result(&agent, fragment);
                if labels::is_advisor(&agent) {
                    self.fire_completion(false).await;
                }
            }
            return;
        }

        // Final-synthesis agent: text becomes visible message content.
        if matches!(self.phase, MessagePhase::Terminated | MessagePhase::Complete) {
            return;
        }

        if !self.accumulated_text.is_empty() && fragment == self.accumulated_text {
            // Repeated aggregate payload: the implicit end-of-stream marker.
            self.phase = MessagePhase::Terminated;
            self.emit_message();
            self.fire_completion(false).await;
            return;
        }

        if fragment.starts_with(&self.accumulated_text) && !self.accumulated_text.is_empty() {
            // Cumulative snapshot extending what we already have.
            self.accumulated_text = fragment.to_string();
        } else {
            self.accumulated_text.push_str(fragment);
        }
        self.phase = MessagePhase::Streaming;
        self.emit_message();
    }

    fn save_agent_result(&mut self, agent: &str, content: &str) {
        self.sink.save(agent, content);
        self.agent_results
            .insert(agent.to_string(), content.to_string());
    }

    fn emit_message(&mut self) {
        let message =
            Message::ai(self.message_id.clone()).with_content(self.accumulated_text.trim());
        self.callbacks.on_message_update(&message);
        self.anchor_emitted = true;
    }

    fn ensure_anchor(&mut self) {
        if self.anchor_emitted {
            return;
        }
        let placeholder = Message::ai(self.message_id.clone());
        self.callbacks.on_message_update(&placeholder);
        self.anchor_emitted = true;
    }

    async fn fire_completion(&mut self, delayed: bool) {
        if self.completion_fired {
            return;
        }
        self.completion_fired = true;
        if delayed && !self.completion_delay.is_zero() {
            tokio::time::sleep(self.completion_delay).await;
        }
        self.callbacks.on_analysis_complete();
    }
}

/// Split thought text into `(title, content)` sections on bolded headers.
///
/// Each `**Header**` starts a new section; text before the first header is
/// attributed to `fallback_title` (the active agent's display name).
fn split_thought_sections(text: &str, fallback_title: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut last_title: Option<String> = None;
    let mut last_end = 0;

    for caps in THOUGHT_HEADER.captures_iter(text) {
        let m = caps.get(0).expect("regex match");
        let leading = text[last_end..m.start()].trim();
        match last_title.take() {
            Some(title) => sections.push((title, leading.to_string())),
            None => {
                if !leading.is_empty() {
                    sections.push((fallback_title.to_string(), leading.to_string()));
                }
            }
        }
        last_title = Some(caps[1].trim().to_string());
        last_end = m.end();
    }

    let trailing = text[last_end..].trim();
    match last_title {
        Some(title) => sections.push((title, trailing.to_string())),
        None => {
            if !trailing.is_empty() {
                sections.push((fallback_title.to_string(), trailing.to_string()));
            }
        }
    }

    sections
}

/// Pull a source-website count out of a web-research tool response.
fn website_count(tool_name: &str, response: &Value) -> Option<u64> {
    if let Some(count) = response
        .get("websiteCount")
        .or_else(|| response.get("website_count"))
        .and_then(Value::as_u64)
    {
        return Some(count);
    }
    if tool_name == "tavily_search" {
        if let Some(results) = response.get("results").and_then(Value::as_array) {
            return Some(results.len() as u64);
        }
    }
    None
}
