use crate::state::{Category, Mask, Snapshot};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

pub const REPORT_LEN: usize = 832;
pub const INFO_SLOTS: usize = 6;
pub const HOST_NAME_MAX: usize = 65;
pub const INFO_LINE_MAX: usize = 127;
pub const UNAVAILABLE: &str = "unavailable";

const LOGO: [&str; 8] = [
    "                  ",
    "       .-.        ",
    "      (.. |       ",
    "      <>  |       ",
    "     / --- \\      ",
    "    ( |   | |     ",
    "  |\\\\_)___/\\)/\\   ",
    " <__)------(__/   ",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("отчёт не помещается в буфер: нужно {needed} байт, доступно {capacity}")]
    Overflow { needed: usize, capacity: usize },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Report([u8; REPORT_LEN]);

impl Report {
    pub fn from_bytes(raw: [u8; REPORT_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    pub fn text(&self) -> Cow<'_, str> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(REPORT_LEN);
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Report").field(&self.text()).finish()
    }
}

struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BoundedWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), ReportError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(ReportError::Overflow {
                needed: end,
                capacity: self.buf.len(),
            });
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

pub fn render(mask: Mask, snapshot: &Snapshot) -> Result<Report, ReportError> {
    let host = header_host(&snapshot.host_name);
    let separator = "-".repeat(separator_len(&snapshot.host_name));

    let mut lines: Vec<Cow<'_, str>> = Vec::with_capacity(LOGO.len());
    lines.push(Cow::Borrowed(host));
    lines.push(Cow::Owned(separator));
    lines.extend(
        mask.categories()
            .take(INFO_SLOTS)
            .map(|c| Cow::Owned(info_line(c, snapshot))),
    );
    lines.resize(LOGO.len(), Cow::Borrowed(""));

    let mut out = [0u8; REPORT_LEN];
    let mut writer = BoundedWriter::new(&mut out);
    for (logo, line) in LOGO.iter().zip(&lines) {
        writer.push(logo.as_bytes())?;
        writer.push(line.as_bytes())?;
        writer.push(b"\n")?;
    }
    Ok(Report(out))
}

fn header_host(name: &str) -> &str {
    let end = name
        .bytes()
        .take(HOST_NAME_MAX)
        .take_while(|b| (0x20..0x7f).contains(b))
        .count();
    &name[..end]
}

// The underline stops at the first blank or control byte.
fn separator_len(name: &str) -> usize {
    name.bytes()
        .take(HOST_NAME_MAX)
        .take_while(u8::is_ascii_graphic)
        .count()
}

fn info_line(category: Category, s: &Snapshot) -> String {
    let line = match category {
        Category::Release => format!(
            "Kernel:  {}",
            s.kernel_release.as_deref().unwrap_or(UNAVAILABLE)
        ),
        Category::CpuModel => {
            format!("CPU:     {}", s.cpu_model.as_deref().unwrap_or(UNAVAILABLE))
        }
        Category::NumCpus => match s.cpus {
            Some(c) => format!("CPUs:    {} / {}", c.online, c.total),
            None => format!("CPUs:    {UNAVAILABLE}"),
        },
        Category::Mem => match s.memory {
            Some(m) => format!("Mem:     {} MB / {} MB", m.free_mb, m.total_mb),
            None => format!("Mem:     {UNAVAILABLE}"),
        },
        Category::NumProcs => match s.process_count {
            Some(n) => format!("Procs:   {n}"),
            None => format!("Procs:   {UNAVAILABLE}"),
        },
        Category::Uptime => match s.uptime_minutes {
            Some(m) => format!("Uptime:  {m} mins"),
            None => format!("Uptime:  {UNAVAILABLE}"),
        },
    };
    crate::collectors::truncate_to(&line, INFO_LINE_MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::state::{CpuCounts, MemoryInfo};

    pub(crate) fn sample_snapshot() -> Snapshot {
        Snapshot {
            host_name: "node1".to_string(),
            kernel_release: Some("6.1.0-test".to_string()),
            cpu_model: Some("Test CPU @ 3.00GHz".to_string()),
            cpus: Some(CpuCounts {
                online: 4,
                total: 8,
            }),
            memory: Some(MemoryInfo {
                free_mb: 1024,
                total_mb: 4096,
            }),
            process_count: Some(123),
            uptime_minutes: Some(62),
        }
    }

    pub(crate) fn display_lines(report: &Report) -> Vec<String> {
        report
            .text()
            .lines()
            .map(|l| l.get(LOGO[0].len()..).unwrap_or_default().to_string())
            .collect()
    }

    pub(crate) fn info_lines(report: &Report) -> Vec<String> {
        display_lines(report).into_iter().skip(2).collect()
    }

    fn label(category: Category) -> &'static str {
        match category {
            Category::Release => "Kernel:",
            Category::CpuModel => "CPU:",
            Category::NumCpus => "CPUs:",
            Category::Mem => "Mem:",
            Category::NumProcs => "Procs:",
            Category::Uptime => "Uptime:",
        }
    }

    #[test]
    fn full_report_matches_layout_exactly() {
        let report = render(Mask::FULL, &sample_snapshot()).expect("render");
        let expected = concat!(
            "                  node1\n",
            "       .-.        -----\n",
            "      (.. |       Kernel:  6.1.0-test\n",
            "      <>  |       CPU:     Test CPU @ 3.00GHz\n",
            "     / --- \\      CPUs:    4 / 8\n",
            "    ( |   | |     Mem:     1024 MB / 4096 MB\n",
            "  |\\\\_)___/\\)/\\   Procs:   123\n",
            " <__)------(__/   Uptime:  62 mins\n",
        );
        assert_eq!(report.text(), expected);
        assert_eq!(report.as_bytes().len(), REPORT_LEN);
        assert!(report.as_bytes()[expected.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn every_mask_compacts_in_display_order() {
        let snapshot = sample_snapshot();
        for raw in 0..=63_u32 {
            let mask = Mask::from_bits(raw);
            let report = render(mask, &snapshot).expect("render");
            let lines = info_lines(&report);
            assert_eq!(lines.len(), INFO_SLOTS, "mask {raw}");

            let shown: Vec<&String> = lines.iter().filter(|l| !l.is_empty()).collect();
            let expected: Vec<Category> = Category::DISPLAY_ORDER
                .into_iter()
                .filter(|c| raw & c.bit() != 0)
                .collect();
            assert_eq!(shown.len(), expected.len(), "mask {raw}");
            for (line, category) in shown.iter().zip(&expected) {
                assert!(line.starts_with(label(*category)), "mask {raw}: {line}");
            }
            assert!(
                lines[expected.len()..].iter().all(|l| l.is_empty()),
                "mask {raw}: gap in slots"
            );
        }
    }

    #[test]
    fn single_category_lands_in_first_slot() {
        let mask = Mask::EMPTY.with(Category::NumProcs);
        let report = render(mask, &sample_snapshot()).expect("render");
        let lines = info_lines(&report);
        assert_eq!(lines[0], "Procs:   123");
        assert!(lines[1..].iter().all(|l| l.is_empty()));
    }

    #[test]
    fn procs_and_release_use_display_order() {
        let mask = Mask::EMPTY
            .with(Category::NumProcs)
            .with(Category::Release);
        let report = render(mask, &sample_snapshot()).expect("render");
        let lines = info_lines(&report);
        assert_eq!(lines[0], "Kernel:  6.1.0-test");
        assert_eq!(lines[1], "Procs:   123");
        assert!(lines[2..].iter().all(|l| l.is_empty()));
    }

    #[test]
    fn empty_mask_keeps_header_and_logo() {
        let report = render(Mask::EMPTY, &sample_snapshot()).expect("render");
        let lines = display_lines(&report);
        assert_eq!(lines[0], "node1");
        assert_eq!(lines[1], "-----");
        assert!(lines[2..].iter().all(|l| l.is_empty()));
        assert_eq!(report.text().lines().count(), LOGO.len());
        assert_eq!(report.as_bytes().len(), REPORT_LEN);
    }

    #[test]
    fn separator_tracks_printable_host_span() {
        let mut snapshot = sample_snapshot();
        snapshot.host_name = "build-box\u{7}.local".to_string();
        let report = render(Mask::EMPTY, &snapshot).expect("render");
        let lines = display_lines(&report);
        assert_eq!(lines[0], "build-box");
        assert_eq!(lines[1], "---------");

        snapshot.host_name = "h".repeat(200);
        let report = render(Mask::EMPTY, &snapshot).expect("render");
        let lines = display_lines(&report);
        assert_eq!(lines[0].len(), HOST_NAME_MAX);
        assert_eq!(lines[1], "-".repeat(HOST_NAME_MAX));
    }

    #[test]
    fn host_with_space_keeps_full_header() {
        let mut snapshot = sample_snapshot();
        snapshot.host_name = "a b".to_string();
        let report = render(Mask::EMPTY, &snapshot).expect("render");
        let lines = display_lines(&report);
        assert_eq!(lines[0], "a b");
        assert_eq!(lines[1], "-");
    }

    #[test]
    fn unavailable_values_render_placeholder() {
        let snapshot = Snapshot {
            host_name: "node1".to_string(),
            ..Snapshot::default()
        };
        let mask = Mask::EMPTY.with(Category::CpuModel).with(Category::Mem);
        let report = render(mask, &snapshot).expect("render");
        let lines = info_lines(&report);
        assert_eq!(lines[0], "CPU:     unavailable");
        assert_eq!(lines[1], "Mem:     unavailable");
    }

    #[test]
    fn info_lines_are_capped() {
        let mut snapshot = sample_snapshot();
        snapshot.cpu_model = Some("c".repeat(400));
        let line = info_line(Category::CpuModel, &snapshot);
        assert_eq!(line.len(), INFO_LINE_MAX);
        assert!(line.starts_with("CPU:     ccc"));
    }

    #[test]
    fn bounded_writer_rejects_overflow() {
        let mut buf = [0u8; 8];
        let mut writer = BoundedWriter::new(&mut buf);
        writer.push(b"12345678").expect("fits exactly");
        assert!(matches!(
            writer.push(b"9"),
            Err(ReportError::Overflow {
                needed: 9,
                capacity: 8
            })
        ));
        assert_eq!(&buf, b"12345678");
    }
}
