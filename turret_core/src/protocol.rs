//! 3-byte textual commands: `[selector][digit][digit]`.
//!
//! | selector | effect            |
//! |----------|-------------------|
//! | `F`      | fire              |
//! | `P`      | prime             |
//! | `U`/`D`  | tilt up / down    |
//! | `L`/`R`  | pan left / right  |
//!
//! Parsing is total and side-effect free; a command is either applied as a
//! whole or rejected before anything is touched.

use std::sync::Arc;

use crate::actuation::ActuationController;
use crate::channel::{Adjustment, ChannelBank, ChannelId, Preset};
use crate::error::{CommandFault, TurretError};

pub const COMMAND_LEN: usize = 3;
pub const MAX_MAGNITUDE: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    Fire,
    Prime,
    TiltUp,
    TiltDown,
    PanLeft,
    PanRight,
}

impl Selector {
    pub const ALL: [Selector; 6] = [
        Selector::Fire,
        Selector::Prime,
        Selector::TiltUp,
        Selector::TiltDown,
        Selector::PanLeft,
        Selector::PanRight,
    ];

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'F' => Some(Selector::Fire),
            b'P' => Some(Selector::Prime),
            b'U' => Some(Selector::TiltUp),
            b'D' => Some(Selector::TiltDown),
            b'L' => Some(Selector::PanLeft),
            b'R' => Some(Selector::PanRight),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Selector::Fire => b'F',
            Selector::Prime => b'P',
            Selector::TiltUp => b'U',
            Selector::TiltDown => b'D',
            Selector::PanLeft => b'L',
            Selector::PanRight => b'R',
        }
    }

    /// Channel moved by this selector and the sign of the move.
    pub fn movement(self) -> Option<(ChannelId, i64)> {
        match self {
            Selector::TiltUp => Some((ChannelId::Tilt, 1)),
            Selector::TiltDown => Some((ChannelId::Tilt, -1)),
            Selector::PanLeft => Some((ChannelId::Pan, -1)),
            Selector::PanRight => Some((ChannelId::Pan, 1)),
            Selector::Fire | Selector::Prime => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub selector: Selector,
    pub magnitude: u8,
}

impl Command {
    pub fn new(selector: Selector, magnitude: u8) -> Result<Self, CommandFault> {
        if magnitude > MAX_MAGNITUDE {
            return Err(CommandFault::BadMagnitude);
        }
        Ok(Self {
            selector,
            magnitude,
        })
    }

    /// Wire form, e.g. `b"U05"`.
    pub fn to_bytes(self) -> [u8; COMMAND_LEN] {
        let m = self.magnitude.min(MAX_MAGNITUDE);
        [self.selector.as_byte(), b'0' + m / 10, b'0' + m % 10]
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{:02}", char::from(self.selector.as_byte()), self.magnitude)
    }
}

/// Decode one command buffer. A single trailing `\n` or `\r\n` is tolerated.
pub fn parse_command(raw: &[u8]) -> Result<Command, CommandFault> {
    let body = raw
        .strip_suffix(b"\r\n")
        .or_else(|| raw.strip_suffix(b"\n"))
        .unwrap_or(raw);
    let &[sel, d1, d0] = body else {
        return Err(CommandFault::WrongLength(body.len()));
    };
    let selector = Selector::from_byte(sel).ok_or(CommandFault::UnknownSelector(sel))?;
    if !d1.is_ascii_digit() || !d0.is_ascii_digit() {
        return Err(CommandFault::BadMagnitude);
    }
    Command::new(selector, (d1 - b'0') * 10 + (d0 - b'0'))
}

/// What an accepted command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Adjusted(Adjustment),
    Primed,
    Fired,
}

impl core::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandOutcome::Adjusted(a) if a.is_noop() => {
                write!(f, "{} already at {}us", a.channel, a.to_us)
            }
            CommandOutcome::Adjusted(a) => {
                write!(f, "{} {}us -> {}us", a.channel, a.from_us, a.to_us)?;
                if a.saturated {
                    f.write_str(" (clamped)")?;
                }
                Ok(())
            }
            CommandOutcome::Primed => f.write_str("priming"),
            CommandOutcome::Fired => f.write_str("firing"),
        }
    }
}

/// Routes decoded commands to the channel bank or the actuation controller.
#[derive(Debug, Clone)]
pub struct CommandProtocol {
    bank: Arc<ChannelBank>,
    actuation: Arc<ActuationController>,
}

impl CommandProtocol {
    pub fn new(bank: Arc<ChannelBank>, actuation: Arc<ActuationController>) -> Self {
        Self { bank, actuation }
    }

    /// Parse and apply one raw command buffer.
    pub fn submit(&self, raw: &[u8]) -> Result<CommandOutcome, TurretError> {
        let cmd = parse_command(raw).inspect_err(|fault| {
            tracing::debug!(len = raw.len(), %fault, "command rejected");
        })?;
        self.dispatch(cmd)
    }

    pub fn dispatch(&self, cmd: Command) -> Result<CommandOutcome, TurretError> {
        if let Some((channel, sign)) = cmd.selector.movement() {
            let limits = self.bank.limits(channel).ok_or_else(|| {
                TurretError::ResourceUnavailable(format!("{channel} channel not configured"))
            })?;
            let delta = i64::from(cmd.magnitude)
                .checked_mul(i64::from(limits.step_us))
                .and_then(|d| d.checked_mul(sign))
                .ok_or(CommandFault::Overflow)?;
            let adj = self.bank.adjust(channel, delta)?;
            if adj.is_noop() {
                tracing::debug!(%channel, width_us = adj.to_us, "already at bound");
            } else {
                tracing::info!(%channel, from_us = adj.from_us, to_us = adj.to_us, saturated = adj.saturated, "width adjusted");
            }
            return Ok(CommandOutcome::Adjusted(adj));
        }
        match cmd.selector {
            Selector::Prime => self.actuation.prime().map(|()| CommandOutcome::Primed),
            Selector::Fire => self.actuation.fire().map(|()| CommandOutcome::Fired),
            _ => Err(CommandFault::UnknownSelector(cmd.selector.as_byte()).into()),
        }
    }

    /// Jump a channel to one of its discrete positions.
    pub fn apply_preset(
        &self,
        channel: ChannelId,
        preset: Preset,
    ) -> Result<Adjustment, TurretError> {
        let limits = self.bank.limits(channel).ok_or_else(|| {
            TurretError::ResourceUnavailable(format!("{channel} channel not configured"))
        })?;
        let adj = self
            .bank
            .set_width(channel, preset.width_us(&limits))
            .ok_or_else(|| {
                TurretError::ResourceUnavailable(format!("{channel} channel not configured"))
            })?;
        tracing::info!(%channel, ?preset, to_us = adj.to_us, "preset applied");
        Ok(adj)
    }
}
