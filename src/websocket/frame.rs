//! WebSocket frame codec, [RFC 6455 §5](https://datatracker.ietf.org/doc/html/rfc6455#section-5).
//!
//! Generalized from `tiipotto-tii`'s blocking `std::io` frame reader
//! (`tiipotto-tii/src/websocket/frame.rs`) onto async Tokio I/O, since
//! this crate's connections are driven by `tokio::net::TcpStream` rather
//! than a blocking listener thread.

use std::convert::TryFrom;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::WsError;

/// A single WebSocket frame. Control frames (`Close`/`Ping`/`Pong`) are
/// never fragmented; `Continuation` reassembly happens one layer up in
/// [`super::connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl TryFrom<u8> for Opcode {
    type Error = WsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(WsError::InvalidOpcode(other)),
        }
    }
}

impl Opcode {
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

impl Frame {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode,
            payload,
        }
    }

    /// Reads and unmasks one frame. Per RFC 6455 §5.1 every frame a
    /// server receives from a client MUST be masked; an unmasked frame is
    /// a protocol error.
    pub async fn read<R: AsyncRead + Unpin>(stream: &mut R, max_payload: usize) -> Result<Self, WsError> {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.map_err(WsError::Io)?;

        let fin = header[0] & 0x80 != 0;
        let rsv = header[0] & 0x70;
        if rsv != 0 {
            return Err(WsError::ReservedBitsSet);
        }
        let opcode = Opcode::try_from(header[0] & 0x0F)?;
        let masked = header[1] & 0x80 != 0;
        if !masked {
            return Err(WsError::UnmaskedClientFrame);
        }

        let mut length = (header[1] & 0x7F) as u64;
        if length == 126 {
            let mut ext = [0u8; 2];
            stream.read_exact(&mut ext).await.map_err(WsError::Io)?;
            length = u16::from_be_bytes(ext) as u64;
        } else if length == 127 {
            let mut ext = [0u8; 8];
            stream.read_exact(&mut ext).await.map_err(WsError::Io)?;
            length = u64::from_be_bytes(ext);
        }

        if opcode.is_control() && length > 125 {
            return Err(WsError::ControlFrameTooLarge);
        }
        if length as usize > max_payload {
            return Err(WsError::PayloadTooLarge);
        }

        let mut masking_key = [0u8; 4];
        stream.read_exact(&mut masking_key).await.map_err(WsError::Io)?;

        let mut payload = vec![0u8; length as usize];
        stream.read_exact(&mut payload).await.map_err(WsError::Io)?;
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= masking_key[i % 4];
        }

        Ok(Frame { fin, opcode, payload })
    }

    /// Encodes and writes this frame unmasked, as a server always sends
    /// (RFC 6455 §5.1: "a server MUST NOT mask any frames").
    pub async fn write<W: AsyncWrite + Unpin>(&self, stream: &mut W) -> Result<(), WsError> {
        let bytes = self.encode();
        stream.write_all(&bytes).await.map_err(WsError::Io)?;
        stream.flush().await.map_err(WsError::Io)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 10);
        buf.push(((self.fin as u8) << 7) | (self.opcode as u8));

        let len = self.payload.len();
        if len < 126 {
            buf.push(len as u8);
        } else if len <= u16::MAX as usize {
            buf.push(126);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            buf.push(127);
            buf.extend_from_slice(&(len as u64).to_be_bytes());
        }

        buf.extend_from_slice(&self.payload);
        buf
    }
}
