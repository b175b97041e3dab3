//! CLI argument definitions, shared statics and tracing setup.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "turret", version, about = "Turret rig controller")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Use simulated lines even when built with GPIO support
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the rig and read commands from stdin, one per line
    Run {
        /// Enable real-time mode (SCHED_FIFO, mlockall)
        #[arg(
            long,
            action = ArgAction::SetTrue,
            long_help = "Enable real-time mode on Linux.\n\nAttempts SCHED_FIFO priority for the process and locks memory with mlockall so the timer reactors do not page fault mid-period. Needs CAP_SYS_NICE / CAP_IPC_LOCK or root; failures are logged and the rig runs without them."
        )]
        rt: bool,
        /// SCHED_FIFO priority when --rt is enabled (clamped to the system range)
        #[arg(long, value_name = "PRIO")]
        rt_prio: Option<i32>,
        /// Memory locking mode for --rt
        #[arg(long, value_enum, value_name = "MODE", default_value = "current")]
        rt_lock: RtLock,
    },
    /// Apply 3-byte commands in order, print each outcome, then shut down
    Send {
        /// Commands such as U05, L10, P00, F00
        #[arg(required = true, value_name = "CMD")]
        commands: Vec<String>,
        /// Keep the rig running this long after the last command
        #[arg(long, value_name = "MS", default_value_t = 0)]
        hold_ms: u64,
    },
    /// Translate one remote message (or a stream of them on stdin)
    Bridge {
        /// Remote command index (0 fire, 1 prime, 2 up, 3 down, 4 left, 5 right)
        #[arg(long, required_unless_present = "stdin")]
        code: Option<u8>,
        /// Movement distance
        #[arg(long, default_value_t = 0)]
        magnitude: u8,
        /// Read 2-byte messages from stdin until EOF
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "code")]
        stdin: bool,
        /// Write to this device file instead of an in-process rig
        #[arg(long, value_name = "PATH")]
        device: Option<PathBuf>,
    },
    /// Turn a spoken phrase into a remote message
    Say {
        #[arg(required = true, value_name = "WORD")]
        words: Vec<String>,
        /// Write to this device file instead of an in-process rig
        #[arg(long, value_name = "PATH")]
        device: Option<PathBuf>,
    },
    /// Assemble the rig, report its status and tear it down
    SelfCheck,
}

fn rolling_writer(
    path: &std::path::Path,
    rotation: Option<&str>,
) -> eyre::Result<tracing_appender::rolling::RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let Some(name) = path.file_name() else {
        eyre::bail!("logging.file {path:?} has no file name");
    };
    Ok(match rotation.unwrap_or("never") {
        "daily" => tracing_appender::rolling::daily(dir, name),
        "hourly" => tracing_appender::rolling::hourly(dir, name),
        _ => tracing_appender::rolling::never(dir, name),
    })
}

/// Console logs go to stderr so stdout stays machine-readable. `RUST_LOG`
/// overrides the level.
pub fn init_tracing(
    json: bool,
    level: Option<&str>,
    logging: &turret_config::Logging,
) -> eyre::Result<()> {
    let level = level.or(logging.level.as_deref()).unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level)?,
    };

    let console: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let appender = rolling_writer(std::path::Path::new(path), logging.rotation.as_deref())?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()?;
    Ok(())
}
