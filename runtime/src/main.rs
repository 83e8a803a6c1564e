//! `blockrun` hosts one piece of a component bus deployment per process.
//!
//! ```bash
//! blockrun names --listen 0.0.0.0:7000 --machines machines.json
//! blockrun --names 10.0.0.1:7000 --topics hub:7001 scheduler --machine hub
//! blockrun --names 10.0.0.1:7000 --topics hub:7001 log-sink --config logs.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use component::{ComponentConfig, ComponentRuntime, LogSink, Scheduler, SystemMonitor};
use dotenvy::dotenv;
use registry::BusContext;
use runtime::{heartbeat_interval, logger, request_timeout, services};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Name service address, an IPv4 literal with port
    #[arg(long, env = "BLOCK_NAMES", global = true)]
    names: Option<String>,
    /// Topic service address; may use a machine name
    #[arg(long, env = "BLOCK_TOPICS", global = true)]
    topics: Option<String>,
    /// Naming service round trip bound in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Serve the name registry
    Names {
        #[arg(long, default_value = "0.0.0.0:7000")]
        listen: String,
        /// JSON file of `name@ip` entries
        #[arg(long)]
        machines: Option<PathBuf>,
    },
    /// Serve the topic registry
    Topics {
        #[arg(long, default_value = "0.0.0.0:7001")]
        listen: String,
    },
    /// Publish system heartbeats
    Scheduler {
        #[arg(long)]
        machine: String,
        #[arg(long, default_value_t = 0)]
        port: u16,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print debug data forwarded by other components
    LogSink(ComponentArgs),
    /// Report when all monitored components are up or down
    Monitor(ComponentArgs),
}

#[derive(Args)]
struct ComponentArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    hostname: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Scheduler host, `machine:port`
    #[arg(long)]
    scheduler: Option<String>,
    /// `topic@machine:port`, repeatable
    #[arg(long)]
    subscribe: Vec<String>,
    /// `external@internal`, repeatable
    #[arg(long)]
    publish: Vec<String>,
}

impl ComponentArgs {
    fn config(&self) -> anyhow::Result<ComponentConfig> {
        let mut config = match &self.config {
            Some(path) => ComponentConfig::load(path)?,
            None => ComponentConfig::new(),
        };
        if let Some(hostname) = &self.hostname {
            config.set("hostname", hostname.as_str());
        }
        if let Some(port) = self.port {
            config.set("port", port.to_string());
        }
        if let Some(scheduler) = &self.scheduler {
            config.set("scheduler", scheduler.as_str());
        }
        for entry in &self.subscribe {
            config.push("subscribe", entry.as_str());
        }
        for entry in &self.publish {
            config.push("publish", entry.as_str());
        }
        Ok(config)
    }
}

impl Cli {
    async fn context(&self) -> anyhow::Result<BusContext> {
        let names = self.names.as_deref().context("--names or BLOCK_NAMES is required")?;
        let topics = self.topics.as_deref().context("--topics or BLOCK_TOPICS is required")?;
        let ctx = BusContext::connect(names, topics, request_timeout(self.timeout_ms)).await?;
        Ok(ctx)
    }
}

async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("unable to listen for ctrl-c: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::init("info");
    let cli = Cli::parse();

    match &cli.cmd {
        Cmd::Names { listen, machines } => {
            let server = services::serve_names(listen, machines.as_deref()).await?;
            shutdown().await;
            server.close();
        }
        Cmd::Topics { listen } => {
            let server = services::serve_topics(listen).await?;
            shutdown().await;
            server.close();
        }
        Cmd::Scheduler {
            machine,
            port,
            interval_ms,
        } => {
            let ctx = cli.context().await?;
            let interval = heartbeat_interval(*interval_ms);
            let scheduler = Scheduler::open(machine, *port, interval, ctx.topics().clone()).await?;
            services::run_scheduler(scheduler, shutdown()).await;
        }
        Cmd::LogSink(args) => {
            let ctx = cli.context().await?;
            let runtime =
                ComponentRuntime::construct("LogSink", LogSink::new(), args.config()?, ctx).await?;
            services::run_component(runtime, shutdown()).await?;
        }
        Cmd::Monitor(args) => {
            let ctx = cli.context().await?;
            let runtime =
                ComponentRuntime::construct("SystemMonitor", SystemMonitor::new(), args.config()?, ctx)
                    .await?;
            services::run_component(runtime, shutdown()).await?;
        }
    }
    Ok(())
}
