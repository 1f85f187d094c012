use crate::collectors::{printable_prefix, CollectError};
use crate::state::CPU_MODEL_MAX;
use sysinfo::{CpuExt, CpuRefreshKind, RefreshKind, System, SystemExt};

pub trait CpuIdentify: Send {
    fn brand(&self) -> Result<String, CollectError>;
}

#[cfg(target_arch = "x86_64")]
const EXT_MAX_LEAF: u32 = 0x8000_0000;
#[cfg(target_arch = "x86_64")]
const BRAND_FIRST_LEAF: u32 = 0x8000_0002;
#[cfg(target_arch = "x86_64")]
const BRAND_LAST_LEAF: u32 = 0x8000_0004;

#[cfg(target_arch = "x86_64")]
#[derive(Debug, Default)]
pub struct Cpuid;

#[cfg(target_arch = "x86_64")]
impl CpuIdentify for Cpuid {
    fn brand(&self) -> Result<String, CollectError> {
        if max_extended_leaf() < BRAND_LAST_LEAF {
            return Err(CollectError::Unsupported("cpuid brand string"));
        }
        let mut raw = [0u8; CPU_MODEL_MAX];
        for (i, leaf) in (BRAND_FIRST_LEAF..=BRAND_LAST_LEAF).enumerate() {
            let regs = cpuid(leaf);
            for (j, reg) in regs.iter().enumerate() {
                let offset = i * 16 + j * 4;
                raw[offset..offset + 4].copy_from_slice(&reg.to_le_bytes());
            }
        }
        Ok(brand_from_raw(&raw))
    }
}

#[cfg(target_arch = "x86_64")]
fn max_extended_leaf() -> u32 {
    cpuid(EXT_MAX_LEAF)[0]
}

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
fn cpuid(leaf: u32) -> [u32; 4] {
    use std::arch::x86_64::__cpuid;
    // CPUID is always present on x86_64.
    let result = unsafe { __cpuid(leaf) };
    [result.eax, result.ebx, result.ecx, result.edx]
}

#[derive(Debug, Default)]
pub struct OsReported {
    brand: Option<String>,
}

impl OsReported {
    #[cfg_attr(target_arch = "x86_64", allow(dead_code))]
    pub fn detect() -> Self {
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        let brand = system
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty());
        Self { brand }
    }
}

impl CpuIdentify for OsReported {
    fn brand(&self) -> Result<String, CollectError> {
        self.brand
            .as_deref()
            .map(|b| brand_from_raw(b.as_bytes()))
            .ok_or(CollectError::Unsupported("os cpu brand"))
    }
}

pub fn brand_from_raw(raw: &[u8]) -> String {
    printable_prefix(raw, CPU_MODEL_MAX)
}

#[cfg(target_arch = "x86_64")]
pub fn platform_default() -> Box<dyn CpuIdentify> {
    Box::new(Cpuid)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn platform_default() -> Box<dyn CpuIdentify> {
    Box::new(OsReported::detect())
}
