use crate::protocol::{self, ProtocolError, OP_READ, OP_STATS, OP_WRITE, STATUS_BUSY, STATUS_OK};
use crate::report::{Report, REPORT_LEN};
use crate::state::Mask;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

#[derive(Debug)]
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(socket_path: &Path) -> Result<Self, ProtocolError> {
        let mut stream = UnixStream::connect(socket_path).await?;
        match stream.read_u8().await? {
            STATUS_OK => Ok(Self { stream }),
            STATUS_BUSY => Err(ProtocolError::Busy),
            other => Err(ProtocolError::UnexpectedStatus(other)),
        }
    }

    pub async fn write_mask(&mut self, mask: Mask) -> Result<usize, ProtocolError> {
        protocol::write_frame(&mut self.stream, OP_WRITE, &mask.bits().to_ne_bytes()).await?;
        let payload = protocol::read_response(&mut self.stream).await?;
        Ok(protocol::decode_u32(&payload)? as usize)
    }

    pub async fn read_report(&mut self) -> Result<Report, ProtocolError> {
        let capacity = REPORT_LEN as u32;
        protocol::write_frame(&mut self.stream, OP_READ, &capacity.to_be_bytes()).await?;
        let payload = protocol::read_response(&mut self.stream).await?;
        let len = payload.len();
        let raw: [u8; REPORT_LEN] = payload
            .try_into()
            .map_err(|_| ProtocolError::UnexpectedLength(len))?;
        Ok(Report::from_bytes(raw))
    }

    pub async fn stats(&mut self) -> Result<String, ProtocolError> {
        protocol::write_frame(&mut self.stream, OP_STATS, &[]).await?;
        let payload = protocol::read_response(&mut self.stream).await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }
}
