//! End-to-end tests of the default reqwest connector.
//!
//! A mock hyper server streams `text/event-stream` bodies chunk by chunk and
//! records what each request carried.

use std::{convert::Infallible, net::SocketAddr, time::Duration};

use futures_util::{StreamExt, stream};
use http::{HeaderMap, HeaderValue};
use http_body_util::{BodyExt, StreamBody};
use hyper::{
    Request, Response,
    body::{Bytes, Frame, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use sse_hooks::{AuthPlugin, LogPlugin, RetryPlugin, SseClient, SseConfig, TransportError};
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, UnboundedReceiver},
    time::timeout,
};

// ---------------------------------------------------------------------------
// Mock SSE server helpers
// ---------------------------------------------------------------------------

/// What the server saw for one request.
#[derive(Debug)]
struct Recorded {
    method: String,
    path: String,
    headers: HeaderMap,
    body: String,
}

/// Start a mock server that answers every request with `status` and streams
/// `chunks` as separate body frames.
async fn start_sse_server(
    status: u16,
    chunks: Vec<&'static str>,
) -> (SocketAddr, UnboundedReceiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            let chunks = chunks.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req: Request<Incoming>| {
                            let tx = tx.clone();
                            let chunks = chunks.clone();
                            async move {
                                let (parts, body) = req.into_parts();
                                let body = body
                                    .collect()
                                    .await
                                    .map(|b| b.to_bytes())
                                    .unwrap_or_default();
                                let _ = tx.send(Recorded {
                                    method: parts.method.to_string(),
                                    path: parts.uri.path().to_string(),
                                    headers: parts.headers,
                                    body: String::from_utf8_lossy(&body).into_owned(),
                                });

                                let frames = stream::unfold(chunks.into_iter(), |mut it| async move {
                                    let chunk = it.next()?;
                                    tokio::time::sleep(Duration::from_millis(5)).await;
                                    let frame = Frame::data(Bytes::from_static(chunk.as_bytes()));
                                    Some((Ok::<_, Infallible>(frame), it))
                                })
                                .boxed();

                                let resp = Response::builder()
                                    .status(status)
                                    .header("content-type", "text/event-stream")
                                    .body(StreamBody::new(frames))
                                    .expect("build response");
                                Ok::<_, Infallible>(resp)
                            }
                        }),
                    )
                    .await;
            });
        }
    });

    (addr, rx)
}

async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel open")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_streamed_events_and_request_shape() {
    let (addr, mut requests) = start_sse_server(
        200,
        vec![
            "event: status\ndata: {\"status\":\"start\"}\n\n",
            "data: hel",
            "lo\n\n",
            ": keep-alive\n\nevent: thinking\r\ndata: {\"content\":\"x\"}\r\n\r\n",
            "data: [DONE]\n\n",
        ],
    )
    .await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let close_tx = tx.clone();

    let mut headers = HeaderMap::new();
    headers.insert("x-client", HeaderValue::from_static("sse-hooks"));
    let config = SseConfig::new(format!("http://{addr}/sse/stream"))
        .manual(true)
        .headers(headers);

    let client = SseClient::builder(config)
        .plugin(AuthPlugin::new("secret"))
        .plugin(LogPlugin::new())
        .on_message(move |m| {
            let _ = tx.send(format!("{} {}", m.event, m.data));
        })
        .on_close(move || {
            let _ = close_tx.send("close".to_string());
        })
        .build()
        .expect("build client");

    client.connect(Some(serde_json::json!({"prompt": "hi"}).into()));

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(recv(&mut events).await);
    }
    assert_eq!(
        seen,
        vec![
            "status {\"status\":\"start\"}",
            "message hello",
            "thinking {\"content\":\"x\"}",
            "message [DONE]",
            "close",
        ]
    );

    let request = recv(&mut requests).await;
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/sse/stream");
    assert_eq!(request.body, "{\"prompt\":\"hi\"}");
    assert_eq!(request.headers["content-type"], "application/json");
    assert_eq!(request.headers["accept"], "text/event-stream");
    assert_eq!(request.headers["authorization"], "Bearer secret");
    assert_eq!(request.headers["x-client"], "sse-hooks");

    assert!(client.latest_message().is_some_and(|m| m.is_done()));
}

#[tokio::test]
async fn test_server_error_status_reaches_on_error() {
    let (addr, _requests) = start_sse_server(500, vec!["data: nope\n\n"]).await;
    let (tx, mut errors) = mpsc::unbounded_channel();

    let client = SseClient::builder(SseConfig::new(format!("http://{addr}/sse")).manual(true))
        .on_message(|m| panic!("unexpected message {m:?}"))
        .on_error(move |e| {
            let _ = tx.send(e.status_code());
        })
        .build()
        .expect("build client");

    client.connect(None);
    assert_eq!(
        recv(&mut errors).await,
        Some(http::StatusCode::INTERNAL_SERVER_ERROR)
    );
    assert!(client.ready_state().is_closed());
}

#[tokio::test]
async fn test_no_content_is_an_empty_body() {
    let (addr, _requests) = start_sse_server(204, vec![]).await;
    let (tx, mut errors) = mpsc::unbounded_channel();

    let client = SseClient::builder(SseConfig::new(format!("http://{addr}/sse")).manual(true))
        .on_error(move |e| {
            let _ = tx.send(matches!(e, TransportError::EmptyBody));
        })
        .build()
        .expect("build client");

    client.connect(None);
    assert!(recv(&mut errors).await);
}

#[tokio::test]
async fn test_get_method_without_body() {
    let (addr, mut requests) = start_sse_server(200, vec!["data: ok\n\n"]).await;
    let (tx, mut events) = mpsc::unbounded_channel();

    let config = SseConfig::new(format!("http://{addr}/events"))
        .manual(true)
        .method(http::Method::GET)
        .body("not for GET");
    let client = SseClient::builder(config)
        .event_listener("message", move |m| {
            let _ = tx.send(m.data.clone());
        })
        .build()
        .expect("build client");

    client.connect(None);
    assert_eq!(recv(&mut events).await, "ok");

    let request = recv(&mut requests).await;
    assert_eq!(request.method, "GET");
    assert!(request.body.is_empty());
}

#[tokio::test]
async fn test_retry_against_refused_connection() {
    // Bind and release a port so nothing listens on it.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind scratch port");
        listener.local_addr().expect("local addr")
    };
    let (tx, mut errors) = mpsc::unbounded_channel();

    let client = SseClient::builder(SseConfig::new(format!("http://{addr}/sse")).manual(true))
        .plugin(
            RetryPlugin::new()
                .max_retries(1)
                .interval(Duration::from_millis(10)),
        )
        .on_error(move |e| {
            let _ = tx.send(matches!(e, TransportError::Http(_)));
        })
        .build()
        .expect("build client");

    client.connect(None);
    assert!(recv(&mut errors).await);
    assert!(recv(&mut errors).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(errors.try_recv().is_err());
}
