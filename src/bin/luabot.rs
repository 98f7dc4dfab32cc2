//! LuaBot CLI - run a Lua robot program
//!
//! `luabot sim robot.lua` runs the program against the simulation host;
//! `luabot run robot.lua` runs it headless on the calling thread.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use luabot::config::LuabotConfig;
use luabot::engine::{EngineOptions, LuaEngine};
use luabot::{Host, LifecycleBridge, SimHost};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "luabot")]
#[command(about = "Run Lua robot programs", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Milliseconds to wait for the robot after the host loop exits
    #[arg(long, global = true)]
    join_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a robot program in the simulator
    Sim {
        /// Robot program
        script: PathBuf,
    },

    /// Run a robot program headless, without a host main loop
    Run {
        /// Robot program
        script: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if cli.version {
        match version_banner() {
            Ok(banner) => println!("{banner}"),
            Err(err) => {
                eprintln!("Error: {err:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        let _ = Cli::command().print_help();
        std::process::exit(2);
    };

    let code = match run(&cli, command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli, command: &Commands) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => LuabotConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LuabotConfig::default(),
    }
    .with_env_overrides();
    if let Some(timeout) = cli.join_timeout_ms {
        config.join_timeout_ms = timeout;
    }
    config.validate().context("invalid command-line settings")?;

    let (host, script) = match command {
        Commands::Sim { script } => (
            Arc::new(SimHost::new().with_extensions(config.sim.extensions.clone())),
            script,
        ),
        Commands::Run { script } => (Arc::new(SimHost::headless()), script),
    };

    if host.has_main_loop() {
        watch_interrupt(Arc::clone(&host)).context("installing Ctrl-C handler")?;
    }

    let bridge = LifecycleBridge::new(host, config.bridge_config());
    match bridge.run(script) {
        Ok(outcome) => {
            tracing::info!(
                termination = ?outcome.termination,
                join_wait_ms = u64::try_from(outcome.join_wait.as_millis()).unwrap_or(u64::MAX),
                "session finished"
            );
            Ok(outcome.exit_code())
        }
        Err(err) => {
            eprintln!("Error: {err}");
            Ok(err.exit_code())
        }
    }
}

/// Release the host main loop on Ctrl-C.
fn watch_interrupt(host: Arc<SimHost>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;

    std::thread::Builder::new()
        .name("luabot-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received; stopping host main loop");
                    host.request_exit();
                }
            });
        })
        .context("spawning signal thread")?;
    Ok(())
}

fn version_banner() -> Result<String> {
    let engine =
        LuaEngine::open(&EngineOptions::default()).context("opening Lua engine for version")?;
    Ok(format!(
        "LuaBot {} -- {}",
        luabot::VERSION,
        engine.lua_version()
    ))
}
