use crate::collectors::cpu::{self, CpuIdentify};
use crate::collectors::{CollectError, HostProbe};
use crate::state::{CpuCounts, MemoryInfo};
#[cfg(target_os = "linux")]
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{System, SystemExt};
use tracing::debug;

pub struct SysinfoProbe {
    system: System,
    cpu: Box<dyn CpuIdentify>,
    sysfs_root: PathBuf,
}

impl SysinfoProbe {
    pub fn new(sysfs_root: impl AsRef<Path>) -> Self {
        Self {
            system: System::new(),
            cpu: cpu::platform_default(),
            sysfs_root: sysfs_root.as_ref().to_path_buf(),
        }
    }
}

impl HostProbe for SysinfoProbe {
    fn host_name(&mut self) -> Result<String, CollectError> {
        self.system
            .host_name()
            .ok_or_else(|| CollectError::Unavailable {
                what: "host name",
                detail: "система не сообщила имя".to_string(),
            })
    }

    fn kernel_release(&mut self) -> Result<String, CollectError> {
        self.system
            .kernel_version()
            .ok_or_else(|| CollectError::Unavailable {
                what: "kernel release",
                detail: "система не сообщила версию ядра".to_string(),
            })
    }

    fn cpu_model(&mut self) -> Result<String, CollectError> {
        self.cpu.brand()
    }

    fn cpu_counts(&mut self) -> Result<CpuCounts, CollectError> {
        self.system.refresh_cpu();
        let logical = self.system.cpus().len() as u32;
        let online = read_cpu_list(&self.sysfs_root, "online").unwrap_or(logical);
        let total = read_cpu_list(&self.sysfs_root, "present").unwrap_or(logical.max(online));
        if online == 0 && total == 0 {
            return Err(CollectError::Unavailable {
                what: "cpu counts",
                detail: "список процессоров пуст".to_string(),
            });
        }
        Ok(CpuCounts { online, total })
    }

    fn memory(&mut self) -> Result<MemoryInfo, CollectError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(CollectError::Unavailable {
                what: "memory",
                detail: "размер памяти равен нулю".to_string(),
            });
        }
        Ok(MemoryInfo::from_bytes(self.system.free_memory(), total))
    }

    fn process_count(&mut self) -> Result<u64, CollectError> {
        self.system.refresh_processes();
        Ok(self.system.processes().len() as u64)
    }

    fn uptime_seconds(&mut self) -> Result<u64, CollectError> {
        Ok(self.system.uptime())
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_list(sysfs_root: &Path, name: &str) -> Option<u32> {
    let path = sysfs_root.join("devices/system/cpu").join(name);
    match fs::read_to_string(&path) {
        Ok(text) => parse_cpu_list(&text),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "список CPU недоступен");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_list(_sysfs_root: &Path, name: &str) -> Option<u32> {
    debug!(list = name, "sysfs недоступен на этой платформе");
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_cpu_list(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut count = 0_u32;
    for part in text.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().ok()?;
                let hi: u32 = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                count = count.checked_add(hi - lo + 1)?;
            }
            None => {
                part.parse::<u32>().ok()?;
                count = count.checked_add(1)?;
            }
        }
    }
    Some(count)
}
