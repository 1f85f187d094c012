use crate::state::Category;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub open_total: Counter,
    pub open_busy_total: Counter,
    pub write_total: Counter,
    pub read_total: Counter,
    pub copy_fault_total: Counter,
    pub collect_unavailable_total: CounterVec,
    pub last_report_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let open_total = Counter::with_opts(opts!(
            "sysfetch_open_total",
            "Successful device opens"
        ))?;
        let open_busy_total = Counter::with_opts(opts!(
            "sysfetch_open_busy_total",
            "Opens rejected because the device was already open"
        ))?;
        let write_total = Counter::with_opts(opts!(
            "sysfetch_write_total",
            "Completed report regenerations"
        ))?;
        let read_total = Counter::with_opts(opts!(
            "sysfetch_read_total",
            "Completed report reads"
        ))?;
        let copy_fault_total = Counter::with_opts(opts!(
            "sysfetch_copy_fault_total",
            "Write or read calls rejected with a copy fault"
        ))?;
        let collect_unavailable_total = CounterVec::new(
            opts!(
                "sysfetch_collect_unavailable_total",
                "Requested categories that could not be collected"
            ),
            &["category"],
        )?;
        let last_report_timestamp_seconds = Gauge::with_opts(opts!(
            "sysfetch_last_report_timestamp_seconds",
            "Unix time of the last generated report"
        ))?;

        register(&registry, &open_total)?;
        register(&registry, &open_busy_total)?;
        register(&registry, &write_total)?;
        register(&registry, &read_total)?;
        register(&registry, &copy_fault_total)?;
        register(&registry, &collect_unavailable_total)?;
        register(&registry, &last_report_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            open_total,
            open_busy_total,
            write_total,
            read_total,
            copy_fault_total,
            collect_unavailable_total,
            last_report_timestamp_seconds,
        }))
    }

    pub fn inc_unavailable(&self, category: Category) {
        self.collect_unavailable_total
            .with_label_values(&[category.name()])
            .inc();
    }

    pub fn mark_report_generated(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.last_report_timestamp_seconds.set(now);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
