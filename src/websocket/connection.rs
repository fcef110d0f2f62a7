//! The per-connection state machine: `connecting → open → closing →
//! closed`, fragment reassembly, ping/pong heartbeat and the
//! 1009/1011/1002 close-code behaviors.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{self, Instant};

use super::frame::{Frame, Opcode};
use super::message::Message;
use super::WsError;

/// Mirrors the `ws.heartbeatMs`/`ws.pongTimeoutMs`/`ws.maxMessageSize`
/// configuration fields.
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    pub heartbeat: Duration,
    pub pong_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for WsSettings {
    fn default() -> Self {
        WsSettings {
            heartbeat: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Standard RFC 6455 close codes this crate originates.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// A single upgraded WebSocket connection. Owns the socket; callers drive
/// it via [`Connection::recv`]/[`Connection::send`]/[`Connection::close`].
/// `recv`'s own read loop pings on `heartbeat` and closes with 1011 if no
/// pong (or any other frame) arrives within `pong_timeout`: no response
/// within `heartbeatMs + pongTimeoutMs` closes the WebSocket with 1011.
pub struct Connection<S> {
    stream: S,
    state: ConnectionState,
    settings: WsSettings,
    last_pong: Instant,
    last_activity: Instant,
    ping_outstanding: Option<Instant>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, settings: WsSettings) -> Self {
        let now = Instant::now();
        Connection {
            stream,
            state: ConnectionState::Open,
            settings,
            last_pong: now,
            last_activity: now,
            ping_outstanding: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sends a message. A `send` while `closing` or `closed` is dropped
    /// with a warning.
    pub async fn send(&mut self, message: Message) -> Result<(), WsError> {
        if self.state != ConnectionState::Open {
            log::warn!("dropping websocket send: connection is {:?}", self.state);
            return Ok(());
        }
        let frame = Frame::new(message.opcode(), message.payload());
        frame.write(&mut self.stream).await
    }

    /// Reads the next complete, reassembled message, transparently
    /// answering pings with pongs and driving the heartbeat. Returns
    /// `Ok(None)` once a close has been fully processed (including a
    /// heartbeat timeout, which closes with 1011: no response within
    /// `heartbeatMs + pongTimeoutMs` closes the WebSocket with 1011).
    ///
    /// A server-originated ping is sent once `settings.heartbeat` has
    /// passed with no frame of any kind observed from the client; if no
    /// pong (or any other frame) follows within `settings.pong_timeout` of
    /// that ping, the connection is closed. Both are driven by the same
    /// read loop via `tokio::time::timeout_at` rather than a sibling task,
    /// since `Connection` is moved by value into the handler and has no
    /// other task that could share access to the socket.
    ///
    /// Fragmented messages are reassembled across continuation frames
    /// here: a non-fin
    /// text/binary frame opens a pending message, and subsequent
    /// continuation frames append to it until one arrives with `fin` set.
    /// Control frames may interleave between fragments per RFC 6455 §5.4
    /// and are handled immediately without disturbing the pending buffer.
    pub async fn recv(&mut self) -> Result<Option<Message>, WsError> {
        let mut pending: Option<(Opcode, Vec<u8>)> = None;

        loop {
            if self.state == ConnectionState::Closed {
                return Ok(None);
            }

            let deadline = match self.ping_outstanding {
                Some(sent_at) => sent_at + self.settings.pong_timeout,
                None => self.last_activity + self.settings.heartbeat,
            };

            let frame = match time::timeout_at(deadline, Frame::read(&mut self.stream, self.settings.max_message_size)).await {
                Err(_elapsed) if self.ping_outstanding.is_some() => {
                    self.fail_close(close_code::INTERNAL_ERROR, "heartbeat pong timeout").await;
                    return Ok(None);
                }
                Err(_elapsed) => {
                    self.ping_outstanding = Some(Instant::now());
                    let _ = self.send(Message::Ping(Vec::new())).await;
                    continue;
                }
                Ok(Ok(f)) => f,
                Ok(Err(WsError::PayloadTooLarge)) => {
                    self.fail_close(close_code::MESSAGE_TOO_BIG, "message too large").await;
                    return Ok(None);
                }
                Ok(Err(WsError::UnmaskedClientFrame)) | Ok(Err(WsError::ReservedBitsSet)) | Ok(Err(WsError::InvalidOpcode(_))) => {
                    self.fail_close(close_code::PROTOCOL_ERROR, "protocol error").await;
                    return Ok(None);
                }
                Ok(Err(WsError::Io(_))) => {
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Ok(Err(other)) => return Err(other),
            };

            self.last_activity = Instant::now();
            self.ping_outstanding = None;

            match frame.opcode {
                Opcode::Text | Opcode::Binary => {
                    if pending.is_some() {
                        self.fail_close(close_code::PROTOCOL_ERROR, "expected continuation frame").await;
                        return Ok(None);
                    }
                    if frame.fin {
                        return Ok(Some(self.finalize(frame.opcode, frame.payload)?));
                    }
                    pending = Some((frame.opcode, frame.payload));
                }
                Opcode::Continuation => {
                    let Some((opcode, mut buffer)) = pending.take() else {
                        self.fail_close(close_code::PROTOCOL_ERROR, "unexpected continuation frame").await;
                        return Ok(None);
                    };
                    buffer.extend_from_slice(&frame.payload);
                    if buffer.len() > self.settings.max_message_size {
                        self.fail_close(close_code::MESSAGE_TOO_BIG, "message too large").await;
                        return Ok(None);
                    }
                    if frame.fin {
                        return Ok(Some(self.finalize(opcode, buffer)?));
                    }
                    pending = Some((opcode, buffer));
                }
                Opcode::Ping => {
                    let _ = self.send(Message::Pong(frame.payload.clone())).await;
                    return Ok(Some(Message::Ping(frame.payload)));
                }
                Opcode::Pong => {
                    self.last_pong = Instant::now();
                    return Ok(Some(Message::Pong(frame.payload)));
                }
                Opcode::Close => {
                    let message = Message::decode_close_payload(&frame.payload);
                    self.respond_close(&message).await;
                    return Ok(Some(message));
                }
            }
        }
    }

    fn finalize(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Message, WsError> {
        match opcode {
            Opcode::Text => {
                let text = String::from_utf8(payload).map_err(|_| WsError::InvalidUtf8)?;
                Ok(Message::Text(text))
            }
            _ => Ok(Message::Binary(payload)),
        }
    }

    async fn respond_close(&mut self, message: &Message) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
            let _ = self.send(message.clone()).await;
        }
        self.state = ConnectionState::Closed;
    }

    async fn fail_close(&mut self, code: u16, reason: &str) {
        let _ = self
            .send(Message::Close { code: Some(code), reason: reason.to_string() })
            .await;
        self.state = ConnectionState::Closed;
    }

    /// Originates a close from the server side (e.g. shutdown, or the
    /// application choosing to disconnect a client).
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), WsError> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        self.state = ConnectionState::Closing;
        self.send(Message::Close { code: Some(code), reason: reason.to_string() }).await?;
        self.state = ConnectionState::Closed;
        Ok(())
    }

    pub fn last_pong_at(&self) -> Instant {
        self.last_pong
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn masked_frame(opcode: Opcode, payload: &[u8], fin: bool) -> Vec<u8> {
        let key = [7u8, 9, 2, 200];
        let mut buf = Vec::new();
        buf.push(((fin as u8) << 7) | opcode as u8);
        let len = payload.len();
        assert!(len < 126);
        buf.push(0x80 | len as u8);
        buf.extend_from_slice(&key);
        for (i, b) in payload.iter().enumerate() {
            buf.push(b ^ key[i % 4]);
        }
        buf
    }

    #[tokio::test]
    async fn echoes_ping_as_pong_and_yields_ping_message() {
        let (mut client, server) = duplex(4096);
        let mut conn = Connection::new(server, WsSettings::default());

        client.write_all(&masked_frame(Opcode::Ping, b"p", true)).await.unwrap();

        let message = conn.recv().await.unwrap().unwrap();
        assert_eq!(message, Message::Ping(b"p".to_vec()));

        let mut echoed = [0u8; 7];
        client.read_exact(&mut echoed).await.unwrap();
        let pong_frame = Frame::new(Opcode::Pong, b"p".to_vec());
        assert_eq!(echoed.to_vec(), pong_frame.encode());
    }

    #[tokio::test]
    async fn idle_connection_receives_a_server_ping_after_heartbeat_elapses() {
        let (mut client, server) = duplex(4096);
        let settings = WsSettings {
            heartbeat: Duration::from_millis(10),
            pong_timeout: Duration::from_secs(60),
            max_message_size: 1 << 20,
        };
        let mut conn = Connection::new(server, settings);

        // The client never sends anything; `recv` should still return a
        // server-originated ping once the heartbeat interval elapses,
        // rather than blocking forever.
        let recv_task = tokio::spawn(async move { conn.recv().await });

        let mut header = [0u8; 2];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0] & 0x0F, Opcode::Ping as u8);
        assert_eq!(header[0] & 0x80, 0x80, "fin bit should be set on a ping frame");

        recv_task.abort();
    }

    #[tokio::test]
    async fn heartbeat_timeout_closes_connection_with_internal_error() {
        let (client, server) = duplex(4096);
        let settings = WsSettings {
            heartbeat: Duration::from_millis(5),
            pong_timeout: Duration::from_millis(5),
            max_message_size: 1 << 20,
        };
        let mut conn = Connection::new(server, settings);

        // The client never responds to the server's ping, so the
        // connection should close itself with 1011 instead of hanging.
        let message = conn.recv().await.unwrap();
        assert!(message.is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
        drop(client);
    }

    #[tokio::test]
    async fn reassembles_fragmented_text_message() {
        let (mut client, server) = duplex(4096);
        let mut conn = Connection::new(server, WsSettings::default());

        client.write_all(&masked_frame(Opcode::Text, b"hel", false)).await.unwrap();
        client.write_all(&masked_frame(Opcode::Continuation, b"lo", true)).await.unwrap();

        let message = conn.recv().await.unwrap().unwrap();
        assert_eq!(message, Message::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn close_handshake_echoes_code_and_marks_closed() {
        let (mut client, server) = duplex(4096);
        let mut conn = Connection::new(server, WsSettings::default());

        let close_payload = {
            let mut p = Vec::new();
            p.extend_from_slice(&1000u16.to_be_bytes());
            p
        };
        client.write_all(&masked_frame(Opcode::Close, &close_payload, true)).await.unwrap();

        let message = conn.recv().await.unwrap().unwrap();
        assert_eq!(message, Message::Close { code: Some(1000), reason: String::new() });
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn unmasked_frame_closes_with_protocol_error() {
        let (mut client, server) = duplex(4096);
        let mut conn = Connection::new(server, WsSettings::default());

        let frame = Frame::new(Opcode::Text, b"hi".to_vec());
        client.write_all(&frame.encode()).await.unwrap();

        let message = conn.recv().await.unwrap();
        assert!(message.is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
