use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{debug, error, info, warn};

use hostrelay::config::LogLevel;
use hostrelay::prelude::*;

/// Collect host telemetry or relay line streams to a sink
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional configuration file (toml, json or yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Milliseconds between local snapshots, 0 runs once
    #[arg(short = 'i', long)]
    interval: Option<u64>,

    /// Where to collect from: local or remote
    #[arg(short = 'm', long)]
    source_type: Option<String>,

    /// Remote source address (host:port)
    #[arg(short = 'a', long)]
    source_addr: Option<String>,

    /// Root of the proc filesystem
    #[arg(short = 'r', long)]
    proc_root: Option<PathBuf>,

    /// Monitoring agent URL, e.g. http://host:8080
    #[arg(short = 'c', long)]
    agent_url: Option<String>,

    /// Destination: kafka, spark or stdout
    #[arg(short = 'd', long)]
    dest: Option<String>,

    /// Comma separated server or broker addresses
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Topic to publish under
    #[arg(short = 't', long)]
    topic: Option<String>,

    /// Relay standard input instead of collecting
    #[arg(short = 'p', long)]
    pipe: bool,

    /// Also write sent payloads to local files
    #[arg(long)]
    enable_file_save: bool,

    /// Directory for locally saved payloads
    #[arg(long)]
    persist_dir: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
}

fn load(args: &Args) -> Result<ConnectorConfig> {
    let mut builder = ConfigBuilder::<ConnectorConfig>::new().use_defaults();
    if let Some(path) = &args.config {
        builder = builder.add_file(path);
    }

    let builder = builder
        .add_env(ENV_PREFIX)
        .set_opt("interval_ms", args.interval)
        .set_opt("source_type", args.source_type.clone())
        .set_opt("source_addr", args.source_addr.clone())
        .set_opt("proc_root", args.proc_root.as_ref().map(|p| p.display().to_string()))
        .set_opt("agent_url", args.agent_url.clone())
        .set_opt("dest", args.dest.as_ref().map(|d| d.to_lowercase()))
        .set_opt("server", args.server.clone())
        .set_opt("topic", args.topic.clone())
        .set_opt("persist_dir", args.persist_dir.as_ref().map(|p| p.display().to_string()))
        .set_opt("log_level", args.log_level.as_ref().map(|l| l.to_lowercase()));

    let builder = if args.pipe { builder.set("pipe", true) } else { builder };
    let builder = if args.enable_file_save {
        builder.set("disable_file_save", false)
    } else {
        builder
    };

    builder.build()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(args));
    // A pending stdin read holds a blocking thread that never returns
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match load(&args) {
        Ok(config) => {
            hostrelay::init_logging(&config.log_level);
            config
        }
        Err(e) => {
            hostrelay::init_logging(&LogLevel::Error);
            error!("Failed to load configuration: {}", e);
            return Ok(());
        }
    };
    debug!("Running with {:?}", config);

    let sink = match build_sink(config.dest, &config.persist_dir) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Cannot deliver to {}: {}", config.dest, e);
            return Ok(());
        }
    };

    let request = config.collection_request();
    let shutdown = Shutdown::new();
    let dispatcher = Dispatcher::new(sink, Arc::new(ProcfsProvider::new()))
        .with_shutdown(shutdown.clone());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal, shutting down...");
                shutdown.trigger();
            }
            Err(e) => warn!("Failed to listen for interrupt signal: {}", e),
        }
    });

    let outcome = dispatcher.run(&request).await;
    info!("{} run finished: {:?}", request.mode().name(), outcome);

    Ok(())
}
