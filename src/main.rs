mod client;
mod collectors;
mod config;
mod device;
mod gate;
mod metrics;
mod protocol;
mod report;
mod server;
mod state;

use clap::{Args, Parser, Subcommand};
use client::Client;
use collectors::system::SysinfoProbe;
use config::Config;
use device::Device;
use metrics::Metrics;
use report::{Report, REPORT_LEN};
use server::ServerConfig;
use state::{Category, Mask, Snapshot};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysfetchd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides socket_path from the config.
    #[arg(long)]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the device on its unix socket (default).
    Serve,
    /// Print a report, optionally selecting categories first.
    Fetch(FetchArgs),
    /// Collect every category in-process and print the raw values.
    Snapshot {
        #[arg(long)]
        json: bool,
    },
    /// Print the daemon's metrics.
    Stats,
}

#[derive(Args, Debug, Default)]
struct FetchArgs {
    #[arg(short = 'a', long = "all")]
    all: bool,
    #[arg(short = 'c', long = "cpu-model")]
    cpu_model: bool,
    #[arg(short = 'm', long = "mem")]
    mem: bool,
    #[arg(short = 'n', long = "num-cpus")]
    num_cpus: bool,
    #[arg(short = 'p', long = "num-procs")]
    num_procs: bool,
    #[arg(short = 'r', long = "release")]
    release: bool,
    #[arg(short = 'u', long = "uptime")]
    uptime: bool,
    /// Use an in-process device instead of the daemon.
    #[arg(long)]
    local: bool,
}

impl FetchArgs {
    fn mask(&self) -> Option<Mask> {
        if self.all {
            return Some(Mask::FULL);
        }
        let flags = [
            (self.release, Category::Release),
            (self.num_cpus, Category::NumCpus),
            (self.cpu_model, Category::CpuModel),
            (self.mem, Category::Mem),
            (self.uptime, Category::Uptime),
            (self.num_procs, Category::NumProcs),
        ];
        let mask = flags
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(Mask::EMPTY, |mask, (_, c)| mask.with(c));
        (!mask.is_empty()).then_some(mask)
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if let Some(socket) = cli.socket {
        cfg.socket_path = socket;
    }

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(cfg).await,
        Command::Fetch(args) => run_fetch(&cfg, &args).await,
        Command::Snapshot { json } => run_snapshot(&cfg, json),
        Command::Stats => run_stats(&cfg).await,
    };
    if let Err(err) = result {
        error!(error = %err, "команда завершилась с ошибкой");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_serve(cfg: Config) -> Result<(), String> {
    let idle_timeout = cfg.idle_timeout().map_err(|e| e.to_string())?;
    let metrics =
        Metrics::new().map_err(|e| format!("не удалось инициализировать метрики: {e}"))?;
    let device = Device::start(Box::new(SysinfoProbe::new(&cfg.sysfs_root)), metrics.clone());
    let listener = server::bind(&cfg.socket_path)
        .map_err(|e| format!("не удалось создать сокет {}: {e}", cfg.socket_path.display()))?;

    info!(
        socket = %cfg.socket_path.display(),
        idle_timeout = %humantime::format_duration(idle_timeout),
        "запуск sysfetchd"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server::serve(
        listener,
        device.clone(),
        metrics,
        ServerConfig {
            socket_path: cfg.socket_path.clone(),
            idle_timeout,
        },
        shutdown_rx,
    ));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);
    let _ = server_task.await;
    device.stop();
    Ok(())
}

async fn run_fetch(cfg: &Config, args: &FetchArgs) -> Result<(), String> {
    let mask = args.mask();
    let report = if args.local {
        fetch_local(cfg, mask)?
    } else {
        let mut client = Client::connect(&cfg.socket_path)
            .await
            .map_err(|e| format!("{}: {e}", cfg.socket_path.display()))?;
        if let Some(mask) = mask {
            client.write_mask(mask).await.map_err(|e| e.to_string())?;
        }
        client.read_report().await.map_err(|e| e.to_string())?
    };
    print!("{}", report.text());
    Ok(())
}

fn fetch_local(cfg: &Config, mask: Option<Mask>) -> Result<Report, String> {
    let metrics =
        Metrics::new().map_err(|e| format!("не удалось инициализировать метрики: {e}"))?;
    let device = Device::start(Box::new(SysinfoProbe::new(&cfg.sysfs_root)), metrics);
    let handle = device.open().map_err(|e| e.to_string())?;
    if let Some(mask) = mask {
        handle
            .write(&mask.bits().to_ne_bytes())
            .map_err(|e| e.to_string())?;
    }
    let mut buf = [0u8; REPORT_LEN];
    handle.read(&mut buf).map_err(|e| e.to_string())?;
    drop(handle);
    device.stop();
    Ok(Report::from_bytes(buf))
}

fn run_snapshot(cfg: &Config, json: bool) -> Result<(), String> {
    let mut probe = SysinfoProbe::new(&cfg.sysfs_root);
    let snapshot = collectors::collect(&mut probe, Mask::FULL);
    if json {
        let text = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(s: &Snapshot) {
    fn show<T: std::fmt::Display>(v: Option<T>) -> String {
        v.map(|v| v.to_string())
            .unwrap_or_else(|| report::UNAVAILABLE.to_string())
    }
    println!("host_name: {}", s.host_name);
    println!("kernel_release: {}", show(s.kernel_release.as_deref()));
    println!("cpu_model: {}", show(s.cpu_model.as_deref()));
    println!("cpus_online: {}", show(s.cpus.map(|c| c.online)));
    println!("cpus_total: {}", show(s.cpus.map(|c| c.total)));
    println!("mem_free_mb: {}", show(s.memory.map(|m| m.free_mb)));
    println!("mem_total_mb: {}", show(s.memory.map(|m| m.total_mb)));
    println!("process_count: {}", show(s.process_count));
    println!("uptime_minutes: {}", show(s.uptime_minutes));
}

async fn run_stats(cfg: &Config) -> Result<(), String> {
    let mut client = Client::connect(&cfg.socket_path)
        .await
        .map_err(|e| format!("{}: {e}", cfg.socket_path.display()))?;
    let text = client.stats().await.map_err(|e| e.to_string())?;
    print!("{text}");
    Ok(())
}
