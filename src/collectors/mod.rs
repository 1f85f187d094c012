pub mod cpu;
pub mod system;

use crate::state::{
    Category, CpuCounts, Mask, MemoryInfo, Snapshot, CPU_MODEL_MAX, KERNEL_RELEASE_MAX,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("запрос не поддерживается платформой: {0}")]
    Unsupported(&'static str),
    #[error("не удалось получить {what}: {detail}")]
    Unavailable { what: &'static str, detail: String },
}

pub trait HostProbe: Send {
    fn host_name(&mut self) -> Result<String, CollectError>;
    fn kernel_release(&mut self) -> Result<String, CollectError>;
    fn cpu_model(&mut self) -> Result<String, CollectError>;
    fn cpu_counts(&mut self) -> Result<CpuCounts, CollectError>;
    fn memory(&mut self) -> Result<MemoryInfo, CollectError>;
    fn process_count(&mut self) -> Result<u64, CollectError>;
    fn uptime_seconds(&mut self) -> Result<u64, CollectError>;
}

// A failing category is left empty and never stops the others.
pub fn collect(probe: &mut dyn HostProbe, mask: Mask) -> Snapshot {
    let host_name = match probe.host_name() {
        Ok(name) => name,
        Err(err) => {
            warn!(error = %err, "имя хоста недоступно");
            String::new()
        }
    };
    let mut snapshot = Snapshot {
        host_name,
        ..Snapshot::default()
    };

    for category in Category::BIT_ORDER {
        if !mask.contains(category) {
            continue;
        }
        let outcome = match category {
            Category::Release => probe.kernel_release().map(|v| {
                snapshot.kernel_release = Some(truncate_to(&v, KERNEL_RELEASE_MAX));
            }),
            Category::CpuModel => probe.cpu_model().map(|v| {
                snapshot.cpu_model = Some(printable_prefix(v.as_bytes(), CPU_MODEL_MAX));
            }),
            Category::NumCpus => probe.cpu_counts().map(|v| snapshot.cpus = Some(v)),
            Category::Mem => probe.memory().map(|v| {
                snapshot.memory = Some(MemoryInfo {
                    free_mb: v.free_mb.min(v.total_mb),
                    total_mb: v.total_mb,
                });
            }),
            Category::NumProcs => probe
                .process_count()
                .map(|v| snapshot.process_count = Some(v)),
            Category::Uptime => probe
                .uptime_seconds()
                .map(|v| snapshot.uptime_minutes = Some(v / 60)),
        };
        if let Err(err) = outcome {
            debug!(category = category.name(), error = %err, "категория недоступна");
        }
    }

    snapshot
}

pub fn truncate_to(value: &str, max: usize) -> String {
    let value = value.split('\0').next().unwrap_or_default();
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

pub fn printable_prefix(bytes: &[u8], max: usize) -> String {
    bytes
        .iter()
        .take(max)
        .take_while(|b| (0x20..0x7f).contains(*b))
        .map(|&b| b as char)
        .collect()
}
