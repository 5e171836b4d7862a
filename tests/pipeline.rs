//! Wire-level tests for the transcription and post-processing dispatchers,
//! run against a minimal in-process HTTP server.

use palaver::config::TranscriptionConfig;
use palaver::postprocess::{LlmPostProcessor, PostProcess, PostProcessError};
use palaver::transcribe::{new_transcriber, OpenAiTranscriber, Transcribe, TranscribeError};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

/// One canned HTTP exchange: the server answers every connection with the
/// same status/body and reports each raw request (head + body) back.
struct MockServer {
    base_url: String,
    requests: mpsc::Receiver<String>,
    _handle: thread::JoinHandle<()>,
}

fn mock_server(status: u16, content_type: &str, body: &str, connections: usize) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    let body = body.to_string();
    let content_type = content_type.to_string();

    let handle = thread::spawn(move || {
        for _ in 0..connections {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let request = read_request(&mut stream);
            let _ = tx.send(request);
            let reason = match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "Status",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    MockServer {
        base_url: format!("http://{addr}"),
        requests: rx,
        _handle: handle,
    }
}

/// Read one HTTP/1.1 request: headers, then Content-Length bytes of body.
fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn openai(base_url: &str, model: &str) -> OpenAiTranscriber {
    OpenAiTranscriber::new(base_url, model, 10, false).unwrap()
}

#[test]
fn multipart_upload_carries_model_format_and_file() {
    let server = mock_server(200, "text/plain", "  Hello world  ", 1);
    let transcriber = openai(&server.base_url, "test-model");

    let text = transcriber.transcribe(b"fake-wav-data").unwrap();
    assert_eq!(text, "Hello world");

    let request = server.requests.recv().unwrap();
    assert!(
        request.starts_with("POST /v1/audio/transcriptions HTTP/1.1"),
        "unexpected request line in {request:.120}"
    );
    assert!(request.contains("multipart/form-data"));
    assert!(request.contains("name=\"model\""));
    assert!(request.contains("test-model"));
    assert!(request.contains("name=\"response_format\""));
    assert!(request.contains("text"));
    assert!(request.contains("name=\"file\""));
    assert!(request.contains("filename=\"audio.wav\""));
    assert!(request.contains("fake-wav-data"));
}

#[test]
fn non_200_surfaces_status_and_body() {
    let server = mock_server(404, "text/plain", "model not found", 1);
    let transcriber = openai(&server.base_url, "test-model");

    match transcriber.transcribe(b"bytes") {
        Err(TranscribeError::Status { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "model not found");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    let message = TranscribeError::Status {
        status: 404,
        body: "model not found".to_string(),
    }
    .to_string();
    assert!(message.contains("404"), "status code missing from {message}");
}

#[test]
fn ping_accepts_any_response() {
    let server = mock_server(404, "text/plain", "not the endpoint you want", 1);
    let transcriber = openai(&server.base_url, "m");
    let health = transcriber.health().expect("openai provider has health");
    assert!(health.ping().is_ok());
}

#[test]
fn ping_fails_when_nothing_listens() {
    // Bind then drop to get a port nobody is listening on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let transcriber = openai(&format!("http://{addr}"), "m");
    assert!(transcriber.health().unwrap().ping().is_err());
}

#[test]
fn model_listing_decodes_ids_in_order() {
    let body = r#"{"data":[{"id":"parakeet-tdt-0.6b-v2"},{"id":"whisper-1"}]}"#;
    let server = mock_server(200, "application/json", body, 1);
    let transcriber = openai(&server.base_url, "m");
    let models = transcriber.models().unwrap().list_models().unwrap();
    assert_eq!(models, vec!["parakeet-tdt-0.6b-v2", "whisper-1"]);

    let request = server.requests.recv().unwrap();
    assert!(request.starts_with("GET /v1/models HTTP/1.1"));
}

#[test]
fn factory_builds_a_working_command_provider() {
    let cfg = TranscriptionConfig {
        provider: "command".to_string(),
        command: "cat {input}".to_string(),
        ..TranscriptionConfig::default()
    };
    let transcriber = new_transcriber(&cfg).unwrap();
    let out = transcriber.transcribe(b"test-wav-content").unwrap();
    assert_eq!(out, "test-wav-content");
}

#[test]
fn rewrite_sends_chat_envelope_and_trims_reply() {
    let body = r#"{"choices":[{"message":{"content":"  Formal text.  "}}]}"#;
    let server = mock_server(200, "application/json", body, 1);
    let post = LlmPostProcessor::new(&server.base_url, "llama3", "Be formal.", 10);

    let rewritten = post.rewrite("um hello there").unwrap();
    assert_eq!(rewritten, "Formal text.");

    let request = server.requests.recv().unwrap();
    assert!(request.starts_with("POST /chat/completions HTTP/1.1"));
    let json_start = request.find("\r\n\r\n").unwrap() + 4;
    let payload: serde_json::Value = serde_json::from_str(&request[json_start..]).unwrap();
    assert_eq!(payload["model"], "llama3");
    assert_eq!(payload["messages"][0]["role"], "system");
    assert_eq!(payload["messages"][0]["content"], "Be formal.");
    assert_eq!(payload["messages"][1]["role"], "user");
    assert_eq!(payload["messages"][1]["content"], "um hello there");
}

#[test]
fn rewrite_failure_is_typed_not_silent() {
    let server = mock_server(500, "text/plain", "overloaded", 1);
    let post = LlmPostProcessor::new(&server.base_url, "llama3", "Be formal.", 10);
    match post.rewrite("hello") {
        Err(PostProcessError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[test]
fn rewrite_rejects_empty_choices() {
    let server = mock_server(200, "application/json", r#"{"choices":[]}"#, 1);
    let post = LlmPostProcessor::new(&server.base_url, "llama3", "prompt", 10);
    assert!(matches!(
        post.rewrite("hello"),
        Err(PostProcessError::NoChoices)
    ));
}

#[test]
fn postprocess_model_listing_uses_models_path() {
    let body = r#"{"data":[{"id":"llama3"},{"id":"qwen2.5"}]}"#;
    let server = mock_server(200, "application/json", body, 1);
    let post = LlmPostProcessor::new(&server.base_url, "llama3", "prompt", 10);
    let models = post.models().unwrap().list_models().unwrap();
    assert_eq!(models, vec!["llama3", "qwen2.5"]);

    let request = server.requests.recv().unwrap();
    assert!(request.starts_with("GET /models HTTP/1.1"));
}
