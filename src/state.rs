use serde::Serialize;

pub const KERNEL_RELEASE_MAX: usize = 48;
pub const CPU_MODEL_MAX: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Release = 0,
    NumCpus = 1,
    CpuModel = 2,
    Mem = 3,
    Uptime = 4,
    NumProcs = 5,
}

impl Category {
    pub const BIT_ORDER: [Category; 6] = [
        Category::Release,
        Category::NumCpus,
        Category::CpuModel,
        Category::Mem,
        Category::Uptime,
        Category::NumProcs,
    ];

    pub const DISPLAY_ORDER: [Category; 6] = [
        Category::Release,
        Category::CpuModel,
        Category::NumCpus,
        Category::Mem,
        Category::NumProcs,
        Category::Uptime,
    ];

    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Category::Release => "release",
            Category::NumCpus => "num_cpus",
            Category::CpuModel => "cpu_model",
            Category::Mem => "mem",
            Category::Uptime => "uptime",
            Category::NumProcs => "num_procs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mask(u32);

impl Mask {
    pub const EMPTY: Mask = Mask(0);
    pub const FULL: Mask = Mask((1 << Category::BIT_ORDER.len()) - 1);

    pub const fn from_bits(raw: u32) -> Self {
        Mask(raw & Self::FULL.0)
    }

    // Host byte order.
    pub fn from_prefix(buf: &[u8]) -> Option<Self> {
        let head: [u8; 4] = buf.get(..4)?.try_into().ok()?;
        Some(Self::from_bits(u32::from_ne_bytes(head)))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub const fn with(self, category: Category) -> Self {
        Mask(self.0 | category.bit())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn categories(self) -> impl Iterator<Item = Category> {
        Category::DISPLAY_ORDER
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuCounts {
    pub online: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub free_mb: u64,
    pub total_mb: u64,
}

impl MemoryInfo {
    pub fn from_bytes(free_bytes: u64, total_bytes: u64) -> Self {
        let total_mb = total_bytes >> 20;
        Self {
            free_mb: (free_bytes >> 20).min(total_mb),
            total_mb,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub host_name: String,
    pub kernel_release: Option<String>,
    pub cpu_model: Option<String>,
    pub cpus: Option<CpuCounts>,
    pub memory: Option<MemoryInfo>,
    pub process_count: Option<u64>,
    pub uptime_minutes: Option<u64>,
}

impl Snapshot {
    pub fn has(&self, category: Category) -> bool {
        match category {
            Category::Release => self.kernel_release.is_some(),
            Category::CpuModel => self.cpu_model.is_some(),
            Category::NumCpus => self.cpus.is_some(),
            Category::Mem => self.memory.is_some(),
            Category::NumProcs => self.process_count.is_some(),
            Category::Uptime => self.uptime_minutes.is_some(),
        }
    }

    pub fn missing(&self, mask: Mask) -> Vec<Category> {
        mask.categories().filter(|c| !self.has(*c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_drops_unknown_bits() {
        let mask = Mask::from_bits(0xffff_ffc0 | Category::Mem.bit());
        assert_eq!(mask.bits(), Category::Mem.bit());
        assert_eq!(Mask::from_bits(u32::MAX), Mask::FULL);
        assert_eq!(Mask::FULL.bits(), 63);
    }

    #[test]
    fn mask_prefix_uses_host_byte_order_and_ignores_tail() {
        let mut buf = 0b10_0001_u32.to_ne_bytes().to_vec();
        buf.extend_from_slice(&[0xff; 12]);
        let mask = Mask::from_prefix(&buf).expect("four bytes are enough");
        assert!(mask.contains(Category::Release));
        assert!(mask.contains(Category::NumProcs));
        assert!(!mask.contains(Category::Mem));
        assert!(Mask::from_prefix(&[1, 0, 0]).is_none());
    }

    #[test]
    fn categories_follow_display_order() {
        let order: Vec<_> = Mask::FULL.categories().collect();
        assert_eq!(order, Category::DISPLAY_ORDER.to_vec());

        let mask = Mask::EMPTY
            .with(Category::Uptime)
            .with(Category::NumCpus)
            .with(Category::CpuModel);
        let order: Vec<_> = mask.categories().collect();
        assert_eq!(
            order,
            vec![Category::CpuModel, Category::NumCpus, Category::Uptime]
        );
    }

    #[test]
    fn bit_numbering_is_fixed() {
        let bits: Vec<u32> = Category::BIT_ORDER.iter().map(|c| c.bit()).collect();
        assert_eq!(bits, vec![1, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn free_memory_never_exceeds_total() {
        let mem = MemoryInfo::from_bytes(9 << 30, 8 << 30);
        assert_eq!(mem.total_mb, 8192);
        assert_eq!(mem.free_mb, 8192);

        let mem = MemoryInfo::from_bytes((3 << 20) - 1, 16 << 20);
        assert_eq!(mem.free_mb, 2);
        assert_eq!(mem.total_mb, 16);
    }

    #[test]
    fn missing_lists_only_requested_categories() {
        let snapshot = Snapshot {
            process_count: Some(12),
            ..Snapshot::default()
        };
        let mask = Mask::EMPTY
            .with(Category::NumProcs)
            .with(Category::Release);
        assert_eq!(snapshot.missing(mask), vec![Category::Release]);
    }
}
