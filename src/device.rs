use crate::collectors::{self, HostProbe};
use crate::gate::{AccessGate, AccessState};
use crate::metrics::Metrics;
use crate::report::{self, Report, ReportError, REPORT_LEN};
use crate::state::{Mask, Snapshot};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const WRITE_COUNT: usize = REPORT_LEN;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("устройство уже открыто")]
    AlreadyOpen,
    #[error("дескриптор отозван остановкой устройства")]
    Revoked,
    #[error("ошибка копирования при {op}: {detail}")]
    CopyFault { op: &'static str, detail: String },
    #[error(transparent)]
    Report(#[from] ReportError),
}

type RenderFn = fn(Mask, &Snapshot) -> Result<Report, ReportError>;

struct Inner {
    cached: Option<Report>,
    probe: Box<dyn HostProbe>,
    render: RenderFn,
}

pub struct Device {
    gate: AccessGate,
    inner: Mutex<Inner>,
    metrics: Arc<Metrics>,
}

impl Device {
    pub fn start(probe: Box<dyn HostProbe>, metrics: Arc<Metrics>) -> Arc<Self> {
        info!("устройство запущено");
        Arc::new(Self {
            gate: AccessGate::new(),
            inner: Mutex::new(Inner {
                cached: None,
                probe,
                render: report::render,
            }),
            metrics,
        })
    }

    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.cached = None;
        self.gate.revoke();
        drop(inner);
        info!("устройство остановлено");
    }

    pub fn open(self: &Arc<Self>) -> Result<Handle, DeviceError> {
        let token = match self.gate.acquire() {
            Ok(token) => token,
            Err(err) => {
                self.metrics.open_busy_total.inc();
                warn!("устройство занято, открытие отклонено");
                return Err(err);
            }
        };
        self.metrics.open_total.inc();
        debug!(token, "устройство открыто");
        Ok(Handle {
            device: Arc::clone(self),
            token,
        })
    }

    pub fn access_state(&self) -> AccessState {
        self.gate.state()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_holder(&self, token: u64) -> Result<(), DeviceError> {
        if self.gate.is_held_by(token) {
            Ok(())
        } else {
            Err(DeviceError::Revoked)
        }
    }

    fn write(&self, token: u64, buf: &[u8]) -> Result<usize, DeviceError> {
        let mut guard = self.lock();
        self.check_holder(token)?;
        let Some(mask) = Mask::from_prefix(buf) else {
            self.metrics.copy_fault_total.inc();
            return Err(DeviceError::CopyFault {
                op: "write",
                detail: format!("маска занимает 4 байта, передано {}", buf.len()),
            });
        };

        let inner = &mut *guard;
        inner.cached = None;
        let report = regenerate(inner.probe.as_mut(), inner.render, &self.metrics, mask)?;
        inner.cached = Some(report);
        Ok(WRITE_COUNT)
    }

    fn read(&self, token: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let mut guard = self.lock();
        self.check_holder(token)?;
        if buf.len() < REPORT_LEN {
            self.metrics.copy_fault_total.inc();
            return Err(DeviceError::CopyFault {
                op: "read",
                detail: format!("буфер {} байт меньше отчёта {REPORT_LEN}", buf.len()),
            });
        }

        let inner = &mut *guard;
        let report = match inner.cached.take() {
            Some(report) => report,
            None => regenerate(inner.probe.as_mut(), inner.render, &self.metrics, Mask::FULL)?,
        };
        buf[..REPORT_LEN].copy_from_slice(report.as_bytes());
        inner.cached = Some(report);
        self.metrics.read_total.inc();
        Ok(REPORT_LEN)
    }
}

fn regenerate(
    probe: &mut dyn HostProbe,
    render: RenderFn,
    metrics: &Metrics,
    mask: Mask,
) -> Result<Report, DeviceError> {
    let snapshot = collectors::collect(probe, mask);
    for category in snapshot.missing(mask) {
        metrics.inc_unavailable(category);
    }
    let report = render(mask, &snapshot)?;
    metrics.write_total.inc();
    metrics.mark_report_generated();
    debug!(
        mask = mask.bits(),
        at = %humantime::format_rfc3339_seconds(SystemTime::now()),
        "отчёт сформирован"
    );
    Ok(report)
}

/// The single open handle. Dropping it releases the device unless the
/// device was stopped in the meantime.
pub struct Handle {
    device: Arc<Device>,
    token: u64,
}

impl Handle {
    pub fn write(&self, buf: &[u8]) -> Result<usize, DeviceError> {
        self.device.write(self.token, buf)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.device.read(self.token, buf)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.device.gate.release(self.token) {
            debug!(token = self.token, "устройство закрыто");
        } else {
            debug!(token = self.token, "закрыт отозванный дескриптор");
        }
    }
}
