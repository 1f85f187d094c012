use crate::device::{Device, DeviceError, Handle};
use crate::metrics::Metrics;
use crate::protocol::{
    self, ProtocolError, MAX_REQUEST_PAYLOAD, OP_READ, OP_STATS, OP_WRITE, STATUS_BAD_REQUEST,
    STATUS_BUSY, STATUS_FAULT, STATUS_OK,
};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task;
use tokio::time;
use tracing::{debug, error, info, warn};

const MAX_READ_CAPACITY: usize = 64 * 1024;

pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub idle_timeout: Duration,
}

pub fn bind(socket_path: &Path) -> Result<UnixListener, ProtocolError> {
    match fs::symlink_metadata(socket_path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(socket = %socket_path.display(), "удаляется старый сокет");
            fs::remove_file(socket_path)?;
        }
        Ok(_) => {
            return Err(ProtocolError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} существует и не является сокетом", socket_path.display()),
            )));
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    Ok(UnixListener::bind(socket_path)?)
}

pub async fn serve(
    listener: UnixListener,
    device: Arc<Device>,
    metrics: Arc<Metrics>,
    cfg: ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(socket = %cfg.socket_path.display(), "сокет устройства готов");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("получен сигнал остановки сервера");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let device = device.clone();
                        let metrics = metrics.clone();
                        let idle_timeout = cfg.idle_timeout;
                        tokio::spawn(async move {
                            if let Err(err) = serve_session(device, metrics, stream, idle_timeout).await {
                                warn!(error = %err, "сессия завершилась с ошибкой");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "не удалось принять подключение");
                    }
                }
            }
        }
    }

    drop(listener);
    if let Err(err) = fs::remove_file(&cfg.socket_path) {
        debug!(error = %err, "сокет уже удалён");
    }
}

async fn serve_session(
    device: Arc<Device>,
    metrics: Arc<Metrics>,
    mut stream: UnixStream,
    idle_timeout: Duration,
) -> Result<(), ProtocolError> {
    let handle = match device.open() {
        Ok(handle) => Arc::new(handle),
        Err(err) => {
            debug!(error = %err, state = ?device.access_state(), "подключение отклонено");
            stream.write_u8(STATUS_BUSY).await?;
            return Ok(());
        }
    };
    stream.write_u8(STATUS_OK).await?;

    loop {
        let frame = match time::timeout(
            idle_timeout,
            protocol::read_frame(&mut stream, MAX_REQUEST_PAYLOAD),
        )
        .await
        {
            Ok(Ok(frame)) => frame,
            Ok(Err(ProtocolError::FrameTooLarge(len))) => {
                let message = format!("запрос {len} байт превышает лимит {MAX_REQUEST_PAYLOAD}");
                protocol::write_frame(&mut stream, STATUS_BAD_REQUEST, message.as_bytes()).await?;
                break;
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                debug!("сессия закрыта по таймауту простоя");
                break;
            }
        };
        let Some((op, payload)) = frame else {
            break;
        };

        match op {
            OP_WRITE => {
                let handle = handle.clone();
                match task::spawn_blocking(move || handle.write(&payload)).await {
                    Ok(Ok(count)) => {
                        let count = u32::try_from(count).unwrap_or(u32::MAX);
                        protocol::write_frame(&mut stream, STATUS_OK, &count.to_be_bytes()).await?;
                    }
                    Ok(Err(err)) => send_device_error(&mut stream, &err).await?,
                    Err(err) => send_fault(&mut stream, &err.to_string()).await?,
                }
            }
            OP_READ => {
                let Ok(capacity) = protocol::decode_u32(&payload) else {
                    protocol::write_frame(
                        &mut stream,
                        STATUS_BAD_REQUEST,
                        "READ ожидает 4 байта ёмкости".as_bytes(),
                    )
                    .await?;
                    continue;
                };
                let capacity = (capacity as usize).min(MAX_READ_CAPACITY);
                match task::spawn_blocking({
                    let handle = handle.clone();
                    move || read_into(&handle, capacity)
                })
                .await
                {
                    Ok(Ok(bytes)) => protocol::write_frame(&mut stream, STATUS_OK, &bytes).await?,
                    Ok(Err(err)) => send_device_error(&mut stream, &err).await?,
                    Err(err) => send_fault(&mut stream, &err.to_string()).await?,
                }
            }
            OP_STATS => match metrics.encode_metrics() {
                Ok(encoded) => protocol::write_frame(&mut stream, STATUS_OK, &encoded).await?,
                Err(err) => send_fault(&mut stream, &err.to_string()).await?,
            },
            other => {
                let message = format!("неизвестная операция 0x{other:02x}");
                protocol::write_frame(&mut stream, STATUS_BAD_REQUEST, message.as_bytes()).await?;
                break;
            }
        }
    }

    Ok(())
}

fn read_into(handle: &Handle, capacity: usize) -> Result<Vec<u8>, DeviceError> {
    let mut buf = vec![0u8; capacity];
    let n = handle.read(&mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

async fn send_device_error(stream: &mut UnixStream, err: &DeviceError) -> std::io::Result<()> {
    let status = match err {
        DeviceError::AlreadyOpen => STATUS_BUSY,
        DeviceError::Revoked | DeviceError::CopyFault { .. } | DeviceError::Report(_) => {
            STATUS_FAULT
        }
    };
    debug!(error = %err, "операция устройства отклонена");
    protocol::write_frame(stream, status, err.to_string().as_bytes()).await
}

async fn send_fault(stream: &mut UnixStream, message: &str) -> std::io::Result<()> {
    error!(error = %message, "внутренняя ошибка сессии");
    protocol::write_frame(stream, STATUS_FAULT, message.as_bytes()).await
}
