//! Framing for the device socket.
//!
//! After accepting a connection the server sends one status byte: `OK` when
//! the connection now holds the device, `BUSY` otherwise (and closes).
//! Requests are `op (u8) | len (u32 BE) | payload`, responses are
//! `status (u8) | len (u32 BE) | payload`. Error responses carry a UTF-8
//! message as payload.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const STATUS_OK: u8 = 0;
pub const STATUS_BUSY: u8 = 1;
pub const STATUS_FAULT: u8 = 2;
pub const STATUS_BAD_REQUEST: u8 = 3;

pub const OP_WRITE: u8 = b'W';
pub const OP_READ: u8 = b'R';
pub const OP_STATS: u8 = b'S';

pub const MAX_REQUEST_PAYLOAD: usize = 4096;
pub const MAX_RESPONSE_PAYLOAD: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("ошибка ввода-вывода: {0}")]
    Io(#[from] io::Error),
    #[error("устройство занято другим клиентом")]
    Busy,
    #[error("сервер вернул ошибку (статус {status}): {message}")]
    Remote { status: u8, message: String },
    #[error("неожиданный статус ответа: {0}")]
    UnexpectedStatus(u8),
    #[error("кадр слишком большой: {0} байт")]
    FrameTooLarge(usize),
    #[error("неожиданная длина ответа: {0} байт")]
    UnexpectedLength(usize),
}

pub async fn write_frame<W>(w: &mut W, tag: u8, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;
    w.write_u8(tag).await?;
    w.write_u32(len).await?;
    w.write_all(payload).await?;
    w.flush().await
}

pub async fn read_frame<R>(r: &mut R, max: usize) -> Result<Option<(u8, Vec<u8>)>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let tag = match r.read_u8().await {
        Ok(tag) => tag,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let len = r.read_u32().await? as usize;
    if len > max {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    Ok(Some((tag, payload)))
}

pub async fn read_response<R>(r: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let Some((status, payload)) = read_frame(r, MAX_RESPONSE_PAYLOAD).await? else {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    };
    match status {
        STATUS_OK => Ok(payload),
        STATUS_BUSY => Err(ProtocolError::Busy),
        STATUS_FAULT | STATUS_BAD_REQUEST => Err(ProtocolError::Remote {
            status,
            message: String::from_utf8_lossy(&payload).into_owned(),
        }),
        other => Err(ProtocolError::UnexpectedStatus(other)),
    }
}

pub fn decode_u32(payload: &[u8]) -> Result<u32, ProtocolError> {
    let raw: [u8; 4] = payload
        .try_into()
        .map_err(|_| ProtocolError::UnexpectedLength(payload.len()))?;
    Ok(u32::from_be_bytes(raw))
}
