//! Integration tests for the HTTP client against an in-process server.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use agentchat::{
    AgentCatalog, AgentClient, ChatController, ChatRequest, ConversationId, DataStreamPart, Error,
    TurnOutcome,
};

/// A canned HTTP response, written in chunks with a pause between them.
struct Reply {
    status: &'static str,
    content_type: &'static str,
    chunks: Vec<&'static str>,
}

impl Reply {
    fn json(status: &'static str, body: &'static str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body],
        }
    }

    fn stream(chunks: Vec<&'static str>) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/plain; charset=utf-8",
            chunks,
        }
    }
}

/// Serve exactly one request and return the raw request text.
async fn serve_once(reply: Reply) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let head = format!(
            "HTTP/1.1 {}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
            reply.status, reply.content_type
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in reply.chunks {
            socket.write_all(chunk.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        socket.shutdown().await.unwrap();
        request
    });
    (base_url, handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn client(base_url: &str, timeout: Duration) -> AgentClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    AgentClient::with_http_client(base_url, http, Some(timeout)).unwrap()
}

#[tokio::test]
async fn list_agents_sorted_by_name() {
    let (base_url, server) = serve_once(Reply::json(
        "200 OK",
        r#"{"weatherAgent":{"name":"Weather Agent","instructions":"forecast"},"researchAgent":{"name":"Research Agent","description":"digs deep"}}"#,
    ))
    .await;
    let client = client(&base_url, Duration::from_secs(5));

    let catalog = assert_ok!(AgentCatalog::load(&client).await);
    let names: Vec<_> = catalog.agents().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["researchAgent", "weatherAgent"]);
    let research = catalog.get("researchAgent").unwrap();
    assert_eq!(research.label(), "Research Agent");
    assert_eq!(research.description.as_deref(), Some("digs deep"));

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/agents HTTP/1.1"));
}

#[tokio::test]
async fn missing_agent_is_not_found() {
    let (base_url, server) =
        serve_once(Reply::json("404 Not Found", r#"{"error":"Agent not found"}"#)).await;
    let client = client(&base_url, Duration::from_secs(5));

    let err = assert_err!(client.get_agent("ghostAgent").await);
    assert!(err.is_not_found());
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(
        err.to_string(),
        "Agent not found (ghostAgent): Agent not found"
    );
    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/agents/ghostAgent HTTP/1.1"));
}

#[tokio::test]
async fn stream_decodes_lines_split_across_chunks() {
    let (base_url, server) = serve_once(Reply::stream(vec![
        "f:{\"messageId\":\"msg-1\"}\n0:\"Hel",
        "lo, \"\n0:\"world\"\n",
        "e:{\"finishReason\":\"stop\",\"isContinued\":false}\nd:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":4,\"completionTokens\":2}}\n",
    ]))
    .await;
    let client = client(&base_url, Duration::from_secs(5));
    let conversation_id = ConversationId::generate();
    let request = assert_ok!(ChatRequest::new(
        "researchAgent",
        "hi",
        Some(conversation_id.clone())
    ));

    let mut parts = assert_ok!(client.stream_chat(&request).await);
    let mut text = String::new();
    let mut finished = false;
    while let Some(part) = parts.next().await {
        match assert_ok!(part) {
            DataStreamPart::Text { text: t } => text.push_str(&t),
            DataStreamPart::Finish(finish) => {
                finished = true;
                assert_eq!(finish.usage.and_then(|u| u.completion_tokens), Some(2));
            }
            _ => {}
        }
    }
    assert_eq!(text, "Hello, world");
    assert!(finished);

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /api/agents/researchAgent/stream HTTP/1.1"));
    let body = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "hi");
    assert_eq!(body["conversationId"], conversation_id.as_str());
}

#[tokio::test]
async fn server_error_carries_status_and_message() {
    let (base_url, _server) = serve_once(Reply::json(
        "500 Internal Server Error",
        r#"{"error":{"message":"agent crashed"}}"#,
    ))
    .await;
    let client = client(&base_url, Duration::from_secs(5));
    let request = assert_ok!(ChatRequest::new("researchAgent", "hi", None));

    let err = assert_err!(client.stream_chat(&request).await.map(|_| ()));
    assert!(matches!(
        &err,
        Error::Api { status_code: 500, message } if message == "agent crashed"
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn plain_text_error_body() {
    let (base_url, _server) = serve_once(Reply {
        status: "503 Service Unavailable",
        content_type: "text/plain",
        chunks: vec!["upstream overloaded"],
    })
    .await;
    let client = client(&base_url, Duration::from_secs(5));
    let request = assert_ok!(ChatRequest::new("researchAgent", "hi", None));

    let err = assert_err!(client.generate(&request).await);
    assert_eq!(err.status_code(), Some(503));
    assert!(err.to_string().contains("upstream overloaded"));
}

#[tokio::test]
async fn generate_returns_text() {
    let (base_url, server) = serve_once(Reply::json("200 OK", r#"{"text":"It is sunny."}"#)).await;
    let client = client(&base_url, Duration::from_secs(5));
    let request = assert_ok!(ChatRequest::new("weatherAgent", "weather?", None));

    let response = assert_ok!(client.generate(&request).await);
    assert_eq!(response.text.as_deref(), Some("It is sunny."));
    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /api/agents/weatherAgent/generate HTTP/1.1"));
}

#[tokio::test]
async fn connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = client(&base_url, Duration::from_secs(5));
    let request = assert_ok!(ChatRequest::new("researchAgent", "hi", None));

    let err = assert_err!(client.stream_chat(&request).await.map(|_| ()));
    assert!(err.is_connection(), "unexpected error: {err}");
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let _server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    let client = client(&base_url, Duration::from_millis(200));
    let request = assert_ok!(ChatRequest::new("researchAgent", "hi", None));

    let err = assert_err!(client.stream_chat(&request).await.map(|_| ()));
    assert!(err.is_timeout(), "unexpected error: {err}");
}

#[tokio::test]
async fn controller_over_http() {
    let (base_url, _server) = serve_once(Reply::stream(vec![
        "0:\"**Search Phase** \"\n",
        "0:\"found it\"\n",
        "h:{\"sourceType\":\"url\",\"id\":\"s1\",\"url\":\"https://example.com/a\"}\n",
        "d:{\"finishReason\":\"stop\",\"usage\":{\"completionTokens\":7}}\n",
    ]))
    .await;
    let client = client(&base_url, Duration::from_secs(5));
    let mut controller = ChatController::new(Arc::new(client), Some(Duration::from_secs(5)));
    assert_ok!(controller.start_new_session("researchAgent"));

    let id = assert_ok!(controller.send_message("find it").await);
    let outcome = controller.wait_for_turn().await;
    assert_eq!(outcome, Some(TurnOutcome::Completed { message_id: id }));

    let state = controller.state();
    let message = state.message(id).unwrap();
    assert_eq!(message.content, "**Search Phase** found it");
    let metadata = message.metadata.as_ref().unwrap();
    assert_eq!(metadata.tokens, Some(7));
    assert_eq!(metadata.sources, vec!["https://example.com/a"]);
}

#[tokio::test]
async fn controller_reports_unreachable_service_in_conversation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let mut controller = ChatController::new(
        Arc::new(client(&base_url, Duration::from_secs(5))),
        None,
    );
    assert_ok!(controller.start_new_session("researchAgent"));

    assert_ok!(controller.send_message("anyone there?").await);
    let outcome = controller.wait_for_turn().await.unwrap();
    assert!(!outcome.is_completed());

    let state = controller.state();
    assert_eq!(state.messages.len(), 2);
    assert!(
        state.messages[1]
            .content
            .starts_with("Sorry, I encountered an error: Connection error")
    );
}
