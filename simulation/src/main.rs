//! Ferry - delay-tolerant routing simulator
//!
//! Replays a contact trace against one of the registered routing engines
//! and prints the delivery report.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferry_core::SimTime;
use ferry_routing::{EngineSection, ForwardingConfig};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ferry_simulation::{EngineRegistry, RandomTrace, ScenarioConfig, SimStats, replay};

#[derive(Parser)]
#[command(
    name = "ferry-sim",
    about = "Delay-tolerant network routing simulator",
    version
)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file
    Run {
        #[arg(short, long)]
        scenario: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        report_json: bool,
    },

    /// Run an engine over a random contact trace
    Demo {
        #[arg(short, long, default_value = "epidemic")]
        engine: String,

        /// Number of hosts
        #[arg(long, default_value = "20")]
        hosts: u32,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Simulated seconds
        #[arg(long, default_value = "3600")]
        duration: f64,
    },

    /// List the registered routing engines
    Engines,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn print_report(stats: &SimStats, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats.to_json())?);
    } else {
        println!("{stats}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json);
    let registry = EngineRegistry::builtin();

    match cli.command {
        Commands::Run {
            scenario,
            report_json,
        } => {
            let config = ScenarioConfig::load(&scenario)?;
            let stats = config
                .run(&registry)
                .with_context(|| format!("scenario {} failed", scenario.display()))?;
            print_report(&stats, report_json)?;
        }
        Commands::Demo {
            engine,
            hosts,
            seed,
            duration,
        } => {
            let trace = RandomTrace {
                hosts,
                duration,
                seed,
                ..RandomTrace::default()
            };
            let config = ScenarioConfig {
                hosts,
                transmit_speed: 250_000.0,
                tick_interval: 1.0,
                end_time: duration,
                message_ttl: duration,
                router: EngineSection::new(engine).with("seed", seed),
                forwarding: ForwardingConfig::default(),
                trace: PathBuf::new(),
            };
            config.validate()?;
            let engine = registry
                .build(&config.router)
                .context("invalid engine")?;
            let mut network = config.network(engine);
            let mut stats = SimStats::new();
            replay(
                &mut network,
                &trace.generate(),
                config.message_ttl,
                SimTime::from_secs(duration),
                &mut stats,
            )?;
            print_report(&stats, false)?;
        }
        Commands::Engines => {
            for entry in registry.entries() {
                println!("{:<16} {}", entry.name, entry.summary);
                if !entry.aliases.is_empty() {
                    println!("{:<16} aliases: {}", "", entry.aliases.join(", "));
                }
            }
        }
    }

    Ok(())
}
