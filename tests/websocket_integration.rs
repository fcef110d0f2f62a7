//! Black-box WebSocket tests: a real RFC 6455 handshake and frame
//! exchange over a loopback socket, covering handshake acceptance, echo,
//! origin rejection, and heartbeat behavior.

use std::sync::Arc;
use std::time::Duration;

use cobalto_core::app::{Application, WsContext};
use cobalto_core::context::Context;
use cobalto_core::middleware::from_fn;
use cobalto_core::settings::Settings;
use cobalto_core::websocket::handshake::accept_key;
use cobalto_core::websocket::Message;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn serve_one(app: Arc<Application>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, peer) = listener.accept().await.unwrap();
        let _ = app.handle_connection(socket, peer).await;
    });
    addr
}

async fn read_headers(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.unwrap();
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn masked_text_frame(text: &str, key: [u8; 4]) -> Vec<u8> {
    let payload = text.as_bytes();
    let mut buf = vec![0x80 | 0x1]; // fin + text opcode
    assert!(payload.len() < 126);
    buf.push(0x80 | payload.len() as u8);
    buf.extend_from_slice(&key);
    for (i, b) in payload.iter().enumerate() {
        buf.push(b ^ key[i % 4]);
    }
    buf
}

/// Reads one unmasked server frame and returns its text payload.
async fn read_text_frame(stream: &mut TcpStream) -> String {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(header[1] & 0x80, 0, "server frames must not be masked");
    let len = (header[1] & 0x7F) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    String::from_utf8(payload).unwrap()
}

fn echo_handler() -> impl Fn(WsContext) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    |mut ctx: WsContext| {
        Box::pin(async move {
            loop {
                match ctx.conn.recv().await {
                    Ok(Some(Message::Text(text))) => {
                        let _ = ctx.conn.send(Message::Text(text)).await;
                    }
                    Ok(Some(Message::Close { .. })) | Ok(None) => break,
                    Ok(Some(_)) => {}
                    Err(_) => break,
                }
            }
        })
    }
}

#[tokio::test]
async fn handshake_succeeds_and_echoes_a_text_message() {
    let mut app = Application::new(Settings::default());
    app.ws("/ws", echo_handler()).unwrap();

    let addr = serve_one(Arc::new(app)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let client_key = "dGhlIHNhbXBsZSBub25jZQ==";
    let request = format!(
        "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {client_key}\r\nSec-WebSocket-Version: 13\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_headers(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 101"), "response was: {response}");
    let expected_accept = accept_key(client_key);
    assert!(response.contains(&expected_accept), "response was: {response}");

    stream.write_all(&masked_text_frame("hello", [1, 2, 3, 4])).await.unwrap();
    let echoed = read_text_frame(&mut stream).await;
    assert_eq!(echoed, "hello");
}

#[tokio::test]
async fn handshake_is_rejected_for_disallowed_origin() {
    let mut settings = Settings::default();
    settings.ws.allow_origins = vec!["https://trusted.example".to_string()];
    let mut app = Application::new(settings);
    app.ws("/ws", echo_handler()).unwrap();

    let addr = serve_one(Arc::new(app)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\nOrigin: https://evil.example\r\n\r\n";
    stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_headers(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 403"), "response was: {response}");
}

#[tokio::test]
async fn idle_connection_is_closed_after_a_missed_heartbeat() {
    let mut settings = Settings::default();
    settings.ws.heartbeat = Duration::from_millis(10);
    settings.ws.pong_timeout = Duration::from_millis(10);
    let mut app = Application::new(settings);
    app.ws("/ws", echo_handler()).unwrap();

    let addr = serve_one(Arc::new(app)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
    stream.write_all(request.as_bytes()).await.unwrap();
    let response = read_headers(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 101"), "response was: {response}");

    // Server pings after the heartbeat elapses; the client never answers,
    // so the server should close the connection once the pong timeout
    // elapses too, rather than leaving the socket open forever.
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0] & 0x0F, 0x9, "expected a ping frame");

    let mut trailing = Vec::new();
    stream.read_to_end(&mut trailing).await.unwrap();
}

#[tokio::test]
async fn global_middleware_can_reject_an_upgrade_before_handshake() {
    let mut app = Application::new(Settings::default());
    app.use_middleware(from_fn(|ctx: &mut Context, next| {
        Box::pin(async move {
            if ctx.headers.get("Authorization").is_none() {
                ctx.response.status(401);
                ctx.response.json(&json!({"error": "missing credentials"})).unwrap();
                return Ok(());
            }
            next.run(ctx).await
        })
    }));
    app.ws("/ws", echo_handler()).unwrap();

    let addr = serve_one(Arc::new(app)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
    stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_headers(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 401"), "response was: {response}");
}

#[tokio::test]
async fn verify_client_hook_rejects_the_upgrade_with_403() {
    let mut settings = Settings::default();
    settings.ws.verify_client = Some(Arc::new(|ctx: &Context| ctx.query.get("token") == Some("letmein")));
    let mut app = Application::new(settings);
    app.ws("/ws", echo_handler()).unwrap();

    let addr = serve_one(Arc::new(app)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = "GET /ws?token=wrong HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
    stream.write_all(request.as_bytes()).await.unwrap();

    let response = read_headers(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 403"), "response was: {response}");
}
