//! End-to-end stream tests using wiremock.
//!
//! These tests mount a mock SSE backend, drive a full submit through the
//! ConnectionManager and assert on the callback and sink traffic the
//! session produced.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tickertape::{
    AnalysisRequest, ConnectionError, ConnectionManager, ConnectionState, Message, ResultSink,
    RetryPolicy, StreamCallbacks, StreamSession, TimelineEntry,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Shared recorder so assertions can run after the session is consumed.
#[derive(Default, Clone)]
struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
}

#[derive(Default)]
struct RecorderInner {
    messages: Vec<Message>,
    entries: Vec<TimelineEntry>,
    completions: usize,
    website_counts: Vec<u64>,
    saved: Vec<(String, String)>,
}

impl Recorder {
    fn message_contents(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    fn entry_titles(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|e| e.title.clone())
            .collect()
    }

    fn completions(&self) -> usize {
        self.inner.lock().unwrap().completions
    }

    fn saved(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().saved.clone()
    }
}

impl StreamCallbacks for Recorder {
    fn on_message_update(&mut self, message: &Message) {
        self.inner.lock().unwrap().messages.push(message.clone());
    }

    fn on_event_update(&mut self, _message_id: &str, entry: &TimelineEntry) {
        self.inner.lock().unwrap().entries.push(entry.clone());
    }

    fn on_analysis_complete(&mut self) {
        self.inner.lock().unwrap().completions += 1;
    }

    fn on_website_count_update(&mut self, count: u64) {
        self.inner.lock().unwrap().website_counts.push(count);
    }
}

impl ResultSink for Recorder {
    fn save(&mut self, agent_name: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .saved
            .push((agent_name.to_string(), content.to_string()));
    }
}

fn sse_body(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|f| format!("data: {}\n\n", f))
        .collect::<String>()
}

fn manager_for(server: &MockServer) -> ConnectionManager {
    init_tracing();
    ConnectionManager::with_base_url(server.uri()).with_retry_policy(RetryPolicy::none())
}

/// Opt-in log output via RUST_LOG; safe to call from every test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session_with(recorder: &Recorder) -> StreamSession<Recorder, Recorder> {
    StreamSession::new("msg-1", recorder.clone(), recorder.clone())
        .with_completion_delay(Duration::from_millis(0))
}

#[tokio::test]
async fn test_full_analysis_stream() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        // Researcher reasons, calls a tool, and reports.
        r#"{"content":{"parts":[{"text":"**Gathering Data** Pulling statements.","thought":true}]},"author":"stock_researcher_agent"}"#,
        r#"{"content":{"parts":[{"function_call":{"name":"fmp_balance_sheet","args":{"symbol":"AAPL"},"id":"c1"}}]},"author":"stock_researcher_agent"}"#,
        r#"{"content":{"parts":[{"function_response":{"name":"fmp_balance_sheet","response":{"assets":1},"id":"c1"}}]},"author":"stock_researcher_agent"}"#,
        r#"{"content":{"parts":[{"text":"Research findings."}]},"author":"stock_researcher_agent"}"#,
        // Final synthesis streams in two fragments, then echoes the whole.
        r#"{"content":{"parts":[{"text":"AAPL looks "}]},"author":"hedge_fund_manager_agent"}"#,
        r#"{"content":{"parts":[{"text":"strong."}]},"author":"hedge_fund_manager_agent"}"#,
        r#"{"content":{"parts":[{"text":"AAPL looks strong."}]},"author":"hedge_fund_manager_agent"}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .and(header("Accept", "text/event-stream"))
        .and(body_partial_json(serde_json::json!({
            "message": "Analyze AAPL",
            "user_id": "user-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let manager = manager_for(&mock_server);
    let recorder = Recorder::default();
    let mut session = session_with(&recorder);

    let request = AnalysisRequest::new("Analyze AAPL", "user-1");
    let result = manager.submit(&request, &mut session).await;

    assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    assert_eq!(manager.state(), ConnectionState::Idle);

    // Placeholder for the first thought, then the streamed answer.
    assert_eq!(
        recorder.message_contents(),
        vec![
            "".to_string(),
            "AAPL looks".to_string(),
            "AAPL looks strong.".to_string(),
            "AAPL looks strong.".to_string(),
        ]
    );

    // Thought section plus tool call and response, with display labels.
    assert_eq!(
        recorder.entry_titles(),
        vec![
            "Gathering Data".to_string(),
            "Balance Sheet".to_string(),
            "Balance Sheet".to_string(),
        ]
    );

    // Researcher output never hit the transcript; it went to the sink.
    assert_eq!(
        recorder.saved(),
        vec![(
            "stock_researcher_agent".to_string(),
            "Research findings.".to_string()
        )]
    );

    assert_eq!(recorder.completions(), 1);
}

#[tokio::test]
async fn test_malformed_frame_is_skipped() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        "this is not json",
        r#"{"content":{"parts":[{"text":"Fine."}]},"author":"hedge_fund_manager_agent"}"#,
        r#"{"content":{"parts":[{"text":"Fine."}]},"author":"hedge_fund_manager_agent"}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let manager = manager_for(&mock_server);
    let recorder = Recorder::default();
    let mut session = session_with(&recorder);

    let request = AnalysisRequest::new("Analyze TSLA", "user-1");
    let result = manager.submit(&request, &mut session).await;

    assert!(result.is_ok());
    assert_eq!(recorder.message_contents(), vec!["Fine.", "Fine."]);
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test]
async fn test_final_frame_without_trailing_delimiter_is_flushed() {
    let mock_server = MockServer::start().await;

    // The last frame ends the body without a blank line.
    let body = format!(
        "{}data: {}",
        sse_body(&[
            r#"{"content":{"parts":[{"text":"Answer."}]},"author":"hedge_fund_manager_agent"}"#
        ]),
        r#"{"content":{"parts":[{"text":"Answer."}]},"author":"hedge_fund_manager_agent"}"#
    );

    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let manager = manager_for(&mock_server);
    let recorder = Recorder::default();
    let mut session = session_with(&recorder);

    let request = AnalysisRequest::new("Analyze MSFT", "user-1");
    let result = manager.submit(&request, &mut session).await;

    assert!(result.is_ok());
    // The flushed echo still terminated the message.
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test]
async fn test_server_error_status_fails_submit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&mock_server)
        .await;

    let manager = manager_for(&mock_server);
    let recorder = Recorder::default();
    let mut session = session_with(&recorder);

    let request = AnalysisRequest::new("Analyze AAPL", "user-1");
    let result = manager.submit(&request, &mut session).await;

    match result {
        Err(ConnectionError::HttpStatus { status, .. }) => assert_eq!(status, 400),
        other => panic!("Expected HttpStatus error, got {:?}", other),
    }
    assert!(matches!(manager.state(), ConnectionState::Error(_)));
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test]
async fn test_connect_retries_on_server_error() {
    let mock_server = MockServer::start().await;

    // First attempt sees 503; the mock is then replaced with a healthy one.
    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    let body = sse_body(&[
        r#"{"content":{"parts":[{"text":"Recovered."}]},"author":"hedge_fund_manager_agent"}"#,
        r#"{"content":{"parts":[{"text":"Recovered."}]},"author":"hedge_fund_manager_agent"}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&mock_server)
        .await;

    let retry = RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    };
    let manager = ConnectionManager::with_base_url(mock_server.uri()).with_retry_policy(retry);
    let recorder = Recorder::default();
    let mut session = session_with(&recorder);

    let request = AnalysisRequest::new("Analyze NVDA", "user-1");
    let result = manager.submit(&request, &mut session).await;

    assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test]
async fn test_cancel_mid_stream_keeps_partial_message() {
    init_tracing();

    // wiremock sends its body in one piece, so a hand-rolled server streams
    // one chunked frame and then stalls, leaving the client blocked on the
    // next read when the cancel lands.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;

        let frame = concat!(
            "data: {\"content\":{\"parts\":[{\"text\":\"Partial answer\"}]},",
            "\"author\":\"hedge_fund_manager_agent\"}\n\n"
        );
        let head = "HTTP/1.1 200 OK\r\n\
                    content-type: text/event-stream\r\n\
                    transfer-encoding: chunked\r\n\r\n";
        socket.write_all(head.as_bytes()).await.expect("write head");
        socket
            .write_all(format!("{:x}\r\n{}\r\n", frame.len(), frame).as_bytes())
            .await
            .expect("write frame chunk");
        socket.flush().await.expect("flush");

        // Hold the connection open; the terminal chunk is never sent.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let manager = Arc::new(
        ConnectionManager::with_base_url(format!("http://{}", addr))
            .with_retry_policy(RetryPolicy::none()),
    );
    let recorder = Recorder::default();

    let submit_manager = Arc::clone(&manager);
    let submit_recorder = recorder.clone();
    let handle = tokio::spawn(async move {
        let mut session = session_with(&submit_recorder);
        let request = AnalysisRequest::new("Analyze AAPL", "user-1");
        submit_manager.submit(&request, &mut session).await
    });

    // Wait until the first frame has been dispatched, then cancel between
    // reads.
    for _ in 0..200 {
        if !recorder.message_contents().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorder.message_contents(), vec!["Partial answer"]);
    manager.cancel();

    let result = handle.await.expect("submit task panicked");
    assert!(result.is_ok(), "cancellation must not be an error");
    assert_eq!(manager.state(), ConnectionState::Closed);

    // The partial message is untouched and the analysis never completed.
    assert_eq!(recorder.message_contents(), vec!["Partial answer"]);
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test]
async fn test_cancel_closes_stream_without_error() {
    let mock_server = MockServer::start().await;

    // Hold the response long enough for the cancel to land first.
    Mock::given(method("POST"))
        .and(path("/v1/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_raw("", "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let manager = Arc::new(manager_for(&mock_server));
    let recorder = Recorder::default();

    let submit_manager = Arc::clone(&manager);
    let submit_recorder = recorder.clone();
    let handle = tokio::spawn(async move {
        let mut session = session_with(&submit_recorder);
        let request = AnalysisRequest::new("Analyze AAPL", "user-1");
        submit_manager.submit(&request, &mut session).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.cancel();

    let result = handle.await.expect("submit task panicked");
    assert!(result.is_ok(), "cancellation must not be an error");
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(recorder.completions(), 0);
}
