mod cli;
mod error_fmt;
mod rt;
mod session;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use session::Messages;

fn load_config(cli: &Cli) -> eyre::Result<turret_config::Config> {
    match &cli.config {
        Some(path) => turret_config::load_file(path)
            .map_err(|e| eyre::eyre!("invalid config {}: {e}", path.display())),
        None => {
            let cfg = turret_config::Config::default();
            cfg.validate()
                .map_err(|e| eyre::eyre!("invalid built-in config: {e}"))?;
            Ok(cfg)
        }
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli)?;
    cli::init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
    tracing::debug!(config = ?cli.config, sim = cli.sim, "config loaded");

    match cli.cmd {
        Commands::Run {
            rt,
            rt_prio,
            rt_lock,
        } => session::run(&cfg, cli.sim, rt, rt_prio, rt_lock),
        Commands::Send { commands, hold_ms } => session::send(&cfg, cli.sim, &commands, hold_ms),
        Commands::Bridge {
            code,
            magnitude,
            stdin,
            device,
        } => {
            let msgs = match code {
                Some(code) if !stdin => Messages::One([code, magnitude]),
                _ => Messages::Stdin,
            };
            session::bridge(&cfg, cli.sim, device.as_deref(), msgs)
        }
        Commands::Say { words, device } => session::say(&cfg, cli.sim, &words, device.as_deref()),
        Commands::SelfCheck => session::self_check(&cfg, cli.sim),
    }
}

fn main() -> ExitCode {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            ExitCode::from(error_fmt::exit_code_for_error(&err))
        }
    }
}
