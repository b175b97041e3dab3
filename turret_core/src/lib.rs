#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core turret logic (hardware-agnostic).
//!
//! All hardware interactions go through the `turret_traits` seams:
//! `OutputLine` for every physical line and `CountdownTimer` for the two timers.
//!
//! ## Architecture
//!
//! - **Channels**: pan/tilt pulse widths behind one lock (`channel` module)
//! - **Scheduler**: N servo signals multiplexed onto one countdown timer (`scheduler`)
//! - **Actuation**: prime/fire interlock with a one-shot watchdog (`actuation`)
//! - **Protocol**: 3-byte textual commands (`protocol`)
//! - **Rig**: assembly, ordered shutdown, diagnostics (`rig`, `status`)
//! - **Runtime**: one reactor thread per timer (`runtime`)
//!
//! ## Time
//!
//! Pulse widths are integer microseconds (`u32`). Deadlines are `Instant`s from
//! the injected `Clock`, so tests can drive both reactors deterministically.

pub mod actuation;
pub mod channel;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod protocol;
pub mod rig;
pub mod runtime;
pub mod scheduler;
pub mod status;

pub use actuation::{Action, ActuationController, ActuationSnapshot, TurretState};
pub use channel::{Adjustment, ChannelBank, ChannelId, Preset, PulseChannel, PulseLimits};
pub use config::{ActuationCfg, ChannelCfg, SchedulerCfg, TurretCfg};
pub use error::{BuildError, CommandFault, TurretError};
pub use protocol::{Command, CommandOutcome, CommandProtocol, Selector, parse_command};
pub use rig::{Turret, TurretBuilder};
pub use runtime::TurretRuntime;
pub use scheduler::{Edge, EdgeKind, EdgeScheduler, SchedulerFault, Tick};
pub use status::TurretStatus;
