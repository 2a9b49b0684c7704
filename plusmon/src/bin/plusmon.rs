use std::{
    fmt::{self, Display},
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
};

use clap::{ArgGroup, Args, Parser, Subcommand};
use jemallocator::Jemalloc;
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use plusmon::{
    agent,
    config::{self, Config},
    dimension::DimensionSet,
    manager::Manager,
    options::{self, Settings},
    sink::{self, CaptureSink, MetricsSink, Sink},
};
use regex::Regex;
use tokio::{
    runtime::Builder,
    signal,
    time::{self, Duration, MissedTickBehavior, sleep},
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to load plusmon config: {0}")]
    Config(#[from] config::Error),
    #[error("Invalid instance options: {0}")]
    Options(#[from] options::Error),
    #[error("Failed to configure agent: {0}")]
    Agent(#[from] agent::Error),
    #[error("Failed to open capture sink: {0}")]
    Sink(#[from] sink::Error),
    #[error("Parsing Prometheus address failed: {0}")]
    PrometheusAddr(#[from] std::net::AddrParseError),
    #[error("Failed to install Prometheus exporter: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
    #[error("Invalid capture path")]
    CapturePath,
}

fn default_config_path() -> String {
    "/etc/plusmon/plusmon.yaml".to_string()
}

/// `--global-labels`, kept in the order given. A repeated key keeps its last
/// value, as repeated `Dimension` options do.
#[derive(Default, Clone, Debug)]
struct CliKeyValues {
    inner: DimensionSet,
}

impl Display for CliKeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        Display::fmt(&self.inner, f)
    }
}

impl FromStr for CliKeyValues {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // Keys match `[[:alpha:]_.]+` and are followed by '='. Pairs are
        // separated by ',' but ',' may also appear inside a value, so the keys
        // act as delimiters and trailing commas are trimmed from each value.
        static RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"([[:alpha:]_.]+)=").expect("Invalid regex pattern provided")
        });

        let mut labels = DimensionSet::new();
        for cap in RE.captures_iter(input) {
            let (Some(whole), Some(key)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let start = whole.end();
            let end = RE.find_at(input, start).map_or(input.len(), |m| m.start());
            labels.insert(key.as_str(), input[start..end].trim_end_matches(','));
        }

        Ok(Self { inner: labels })
    }
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured NGINX Plus servers
    Run(Box<RunCommand>),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args)]
struct RunCommand {
    #[command(flatten)]
    args: PlusmonArgs,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
}

#[derive(clap::Args)]
#[clap(group(
    ArgGroup::new("telemetry")
        .required(true)
        .args(&["capture_path", "prometheus_addr"]),
))]
struct PlusmonArgs {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
    /// additional labels to apply to all metrics, format KEY=VAL,KEY2=VAL
    #[clap(long)]
    global_labels: Option<CliKeyValues>,
    /// path on disk to write captures, exclusive of prometheus-addr
    #[clap(long)]
    capture_path: Option<String>,
    /// socket to bind prometheus exporter to, exclusive of capture-path
    #[clap(long)]
    prometheus_addr: Option<String>,
    /// the time, in seconds, to poll before exiting; polls until ctrl-c when
    /// absent
    #[clap(long)]
    run_duration_seconds: Option<u64>,
}

/// Where emitted metrics go.
#[derive(Debug)]
enum Telemetry {
    Prometheus {
        addr: SocketAddr,
        global_labels: DimensionSet,
    },
    Capture {
        path: PathBuf,
        global_labels: DimensionSet,
    },
}

fn get_telemetry(args: &PlusmonArgs) -> Result<Telemetry, Error> {
    let global_labels = args.global_labels.clone().unwrap_or_default().inner;
    if let Some(ref prom_addr) = args.prometheus_addr {
        Ok(Telemetry::Prometheus {
            addr: prom_addr.parse()?,
            global_labels,
        })
    } else if let Some(ref capture_path) = args.capture_path {
        Ok(Telemetry::Capture {
            path: capture_path.parse().map_err(|_| Error::CapturePath)?,
            global_labels,
        })
    } else {
        unreachable!("clap ensures that exactly one telemetry option is selected");
    }
}

fn validate_config(config_path: &str) -> Result<Config, Error> {
    let config = config::load(config_path)?;
    for instance in &config.instances {
        Settings::from_nodes(&instance.options)?;
    }
    info!(
        "Configuration file is valid, {} instance(s)",
        config.instances.len()
    );
    Ok(config)
}

fn init_tracing(debug: bool) {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_ansi(false)
        .finish()
        .init();
}

async fn inner_main(
    config: Config,
    telemetry: Telemetry,
    run_duration: Option<Duration>,
) -> Result<(), Error> {
    // Set up the telemetry sub-system. Only one sink is active at a time.
    let mut sink: Box<dyn Sink> = match telemetry {
        Telemetry::Prometheus {
            addr,
            global_labels,
        } => {
            let mut builder = PrometheusBuilder::new().with_http_listener(addr);
            for (k, v) in global_labels.iter() {
                builder = builder.add_global_label(k, v);
            }
            builder.install()?;
            Box::new(MetricsSink::new())
        }
        Telemetry::Capture {
            path,
            global_labels,
        } => Box::new(CaptureSink::create(path, global_labels)?),
    };

    // Configuration errors abort startup.
    let mut manager: Manager = Manager::new();
    for instance in &config.instances {
        manager.configure(&instance.options).await?;
    }
    info!("Configured {} instance(s)", manager.len());

    let deadline = async move {
        match run_duration {
            Some(duration) => sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut interval = time::interval(Duration::from_secs(config.interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let emitted = manager.read(sink.as_mut()).await;
                sink.flush();
                debug!("Cycle complete, {emitted} records emitted");
            },
            _ = signal::ctrl_c() => {
                info!("received ctrl-c");
                break;
            },
            () = &mut deadline => {
                info!("run duration exceeded, shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let args = match cli.command {
        Commands::Run(run_cmd) => run_cmd.args,
        Commands::ConfigCheck(config_check_cmd) => {
            init_tracing(false);
            match validate_config(&config_check_cmd.config_path) {
                Ok(_) => std::process::exit(0),
                Err(err) => {
                    error!("Configuration is invalid: {err}");
                    std::process::exit(1)
                }
            }
        }
    };

    let config = config::load(&args.config_path)?;
    init_tracing(config.debug_log_level());

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting plusmon {version} run.");

    let telemetry = get_telemetry(&args)?;
    let run_duration = args.run_duration_seconds.map(Duration::from_secs);

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config, telemetry, run_duration));
    info!("Bye. :)");
    res
}
