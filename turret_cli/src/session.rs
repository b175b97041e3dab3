//! Rig sessions: backend selection, the interactive loop and one-shot commands.

use std::io::BufRead;
use std::path::Path;

use crossbeam_channel as xch;
use eyre::WrapErr;
use turret_bridge::phrase::parse_phrase;
use turret_bridge::{Bridge, DeviceFile, pump_frames};
use turret_config::Config;
use turret_core::{ChannelId, Preset, TurretBuilder, TurretRuntime};
use turret_traits::{CommandSink, LineFactory};

use crate::cli::RtLock;
use crate::rt::setup_rt_once;

#[cfg(all(feature = "hardware", target_os = "linux"))]
type FeedbackGuard = Option<turret_hardware::gpio::FeedbackWatch>;
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
type FeedbackGuard = ();

/// A running rig. The feedback interrupt is dropped before the runtime.
pub struct Rig {
    _feedback: FeedbackGuard,
    runtime: TurretRuntime,
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_lines(cfg: &Config, sim: bool) -> eyre::Result<Box<dyn LineFactory>> {
    use turret_hardware::gpio::{GpioLines, PinMap};
    if sim {
        return Ok(Box::new(turret_hardware::SimulatedLines::new()));
    }
    let Some(p) = cfg.pins else {
        eyre::bail!("config: [pins] is required for the GPIO backend (or pass --sim)");
    };
    let lines = GpioLines::new(PinMap {
        pan: p.pan,
        tilt: p.tilt,
        stepper: p.stepper,
        solenoid: p.solenoid,
    })
    .wrap_err("open gpio lines")?;
    Ok(Box::new(lines))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_lines(_cfg: &Config, _sim: bool) -> eyre::Result<Box<dyn LineFactory>> {
    Ok(Box::new(turret_hardware::SimulatedLines::new()))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn watch_feedback(cfg: &Config, sim: bool, runtime: &TurretRuntime) -> eyre::Result<FeedbackGuard> {
    let Some(pin) = cfg.pins.and_then(|p| p.feedback).filter(|_| !sim) else {
        tracing::warn!("no feedback input; priming ends on the watchdog");
        return Ok(None);
    };
    let turret = std::sync::Arc::downgrade(&runtime.shared());
    let watch = turret_hardware::gpio::watch_feedback(pin, move || {
        if let Some(t) = turret.upgrade() {
            t.feedback();
        }
    })
    .wrap_err("watch feedback input")?;
    Ok(Some(watch))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn watch_feedback(_cfg: &Config, _sim: bool, _runtime: &TurretRuntime) -> eyre::Result<FeedbackGuard> {
    Ok(())
}

pub fn start_rig(cfg: &Config, sim: bool) -> eyre::Result<Rig> {
    let mut lines = open_lines(cfg, sim)?;
    let runtime = TurretRuntime::start(TurretBuilder::from_config(cfg), lines.as_mut())?;
    let feedback = watch_feedback(cfg, sim, &runtime)?;
    Ok(Rig {
        _feedback: feedback,
        runtime,
    })
}

impl Rig {
    pub fn runtime(&self) -> &TurretRuntime {
        &self.runtime
    }

    pub fn shutdown(mut self) -> eyre::Result<()> {
        self.runtime.shutdown()?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_line(rt: &TurretRuntime, line: &str) -> Flow {
    let mut words = line.split_whitespace();
    match words.next() {
        None => {}
        Some("quit" | "exit") => return Flow::Quit,
        Some("status") => println!("{}", rt.status()),
        Some("feedback") => {
            if rt.feedback() {
                println!("primed");
            } else {
                println!("feedback ignored");
            }
        }
        Some("preset") => {
            let channel = words.next().and_then(ChannelId::parse);
            let preset = words.next().and_then(Preset::parse);
            let (Some(channel), Some(preset)) = (channel, preset) else {
                println!("error: usage: preset <pan|tilt> <low|mid|high>");
                return Flow::Continue;
            };
            match rt.apply_preset(channel, preset) {
                Ok(adj) => println!("{channel} -> {}us", adj.to_us),
                Err(e) => println!("error: {e}"),
            }
        }
        Some(_) => match rt.submit(line.trim().as_bytes()) {
            Ok(outcome) => println!("{outcome}"),
            Err(e) => println!("error: {e}"),
        },
    }
    Flow::Continue
}

/// Interactive session: one command per stdin line until `quit`, EOF or Ctrl-C.
pub fn run(cfg: &Config, sim: bool, rt: bool, rt_prio: Option<i32>, rt_lock: RtLock) -> eyre::Result<()> {
    setup_rt_once(rt, rt_prio, rt_lock);

    let (stop_tx, stop_rx) = xch::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .wrap_err("install Ctrl-C handler")?;

    let rig = start_rig(cfg, sim)?;

    let (line_tx, line_rx) = xch::unbounded::<String>();
    std::thread::Builder::new()
        .name("turret-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .wrap_err("spawn stdin reader")?;

    loop {
        xch::select! {
            recv(line_rx) -> msg => match msg {
                Ok(line) => {
                    if handle_line(rig.runtime(), &line) == Flow::Quit {
                        break;
                    }
                }
                Err(_) => {
                    tracing::debug!("stdin closed");
                    break;
                }
            },
            recv(stop_rx) -> _ => {
                tracing::info!("interrupted");
                break;
            }
        }
    }
    rig.shutdown()
}

/// Apply `commands` in order; the first rejection aborts the session.
pub fn send(cfg: &Config, sim: bool, commands: &[String], hold_ms: u64) -> eyre::Result<()> {
    let rig = start_rig(cfg, sim)?;
    for cmd in commands {
        let outcome = rig.runtime().submit(cmd.as_bytes())?;
        println!("{cmd}: {outcome}");
    }
    if hold_ms > 0 {
        std::thread::sleep(std::time::Duration::from_millis(hold_ms));
    }
    println!("{}", rig.runtime().status());
    rig.shutdown()
}

/// Where remote messages come from.
#[derive(Debug, Clone, Copy)]
pub enum Messages {
    One([u8; 2]),
    Stdin,
}

fn forward_all<S: CommandSink>(bridge: &mut Bridge<S>, msgs: Messages) -> eyre::Result<()> {
    match msgs {
        Messages::One(m) => {
            let cmd = bridge.forward(&m)?;
            println!("forwarded {cmd}");
        }
        Messages::Stdin => {
            let frames = pump_frames(std::io::stdin().lock(), bridge).wrap_err("read stdin")?;
            println!(
                "frames={frames} handled={} failed={}",
                bridge.handled(),
                bridge.failed()
            );
        }
    }
    Ok(())
}

/// Forward remote messages to `device`, or to an in-process rig.
pub fn bridge(cfg: &Config, sim: bool, device: Option<&Path>, msgs: Messages) -> eyre::Result<()> {
    if let Some(path) = device {
        let sink = DeviceFile::open(path)
            .wrap_err_with(|| format!("open device {}", path.display()))?;
        return forward_all(&mut Bridge::new(sink), msgs);
    }
    let rig = start_rig(cfg, sim)?;
    forward_all(&mut Bridge::new(rig.runtime().turret()), msgs)?;
    println!("{}", rig.runtime().status());
    rig.shutdown()
}

pub fn say(cfg: &Config, sim: bool, words: &[String], device: Option<&Path>) -> eyre::Result<()> {
    let Some(phrase) = parse_phrase(words) else {
        eyre::bail!("no command found in phrase {:?}", words.join(" "));
    };
    let cmd = phrase.to_command()?;
    println!("heard {cmd}");
    bridge(cfg, sim, device, Messages::One(cmd.to_message()))
}

pub fn self_check(cfg: &Config, sim: bool) -> eyre::Result<()> {
    let rig = start_rig(cfg, sim)?;
    println!("{}", rig.runtime().status());
    rig.shutdown()?;
    println!("self-check ok");
    Ok(())
}
