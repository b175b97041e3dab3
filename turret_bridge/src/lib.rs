#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Remote-control bridge.
//!
//! A remote client sends 2-byte messages `[command index][magnitude]`. The
//! bridge translates each into the 3-byte device command (`U05`, `F00`, ...)
//! and forwards it to a `CommandSink`. It never interprets what a command
//! does; the device decides whether to accept it.

pub mod device;
pub mod phrase;

use std::io::{ErrorKind, Read};

use thiserror::Error;
use turret_traits::CommandSink;

pub use device::DeviceFile;

pub const MESSAGE_LEN: usize = 2;
pub const MAX_MAGNITUDE: u8 = 99;

/// `handle` return codes.
pub const HANDLED: i32 = 0;
pub const MALFORMED: i32 = 1;
pub const DEVICE_REJECTED: i32 = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("expected 2-byte message, got {0} bytes")]
    WrongLength(usize),
    #[error("unknown command index {0}")]
    UnknownCode(u8),
    #[error("magnitude {0} exceeds {MAX_MAGNITUDE}")]
    MagnitudeOutOfRange(u32),
    #[error("device rejected command: {0}")]
    Device(String),
}

impl BridgeError {
    /// Return code reported by `Bridge::handle`.
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::Device(_) => DEVICE_REJECTED,
            _ => MALFORMED,
        }
    }
}

/// Remote command table; the discriminant is the wire index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Fire = 0,
    Prime = 1,
    TiltUp = 2,
    TiltDown = 3,
    PanLeft = 4,
    PanRight = 5,
}

impl RemoteOp {
    pub const ALL: [RemoteOp; 6] = [
        RemoteOp::Fire,
        RemoteOp::Prime,
        RemoteOp::TiltUp,
        RemoteOp::TiltDown,
        RemoteOp::PanLeft,
        RemoteOp::PanRight,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Device selector character.
    pub fn selector(self) -> u8 {
        match self {
            RemoteOp::Fire => b'F',
            RemoteOp::Prime => b'P',
            RemoteOp::TiltUp => b'U',
            RemoteOp::TiltDown => b'D',
            RemoteOp::PanLeft => b'L',
            RemoteOp::PanRight => b'R',
        }
    }

    /// Fire and prime carry no distance.
    pub fn takes_magnitude(self) -> bool {
        !matches!(self, RemoteOp::Fire | RemoteOp::Prime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCommand {
    pub op: RemoteOp,
    pub magnitude: u8,
}

impl RemoteCommand {
    pub fn new(op: RemoteOp, magnitude: u8) -> Result<Self, BridgeError> {
        let magnitude = if op.takes_magnitude() { magnitude } else { 0 };
        if magnitude > MAX_MAGNITUDE {
            return Err(BridgeError::MagnitudeOutOfRange(u32::from(magnitude)));
        }
        Ok(Self { op, magnitude })
    }

    /// Wire form sent by a remote client.
    pub fn to_message(self) -> [u8; MESSAGE_LEN] {
        [self.op.code(), self.magnitude]
    }

    /// Device form, e.g. `b"L16"`.
    pub fn to_device_bytes(self) -> [u8; 3] {
        [
            self.op.selector(),
            b'0' + self.magnitude / 10,
            b'0' + self.magnitude % 10,
        ]
    }
}

impl core::fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{:02}", char::from(self.op.selector()), self.magnitude)
    }
}

/// Decode one remote message. The magnitude of fire/prime is forced to 0.
pub fn decode_message(bytes: &[u8]) -> Result<RemoteCommand, BridgeError> {
    let &[code, magnitude] = bytes else {
        return Err(BridgeError::WrongLength(bytes.len()));
    };
    let op = RemoteOp::from_code(code).ok_or(BridgeError::UnknownCode(code))?;
    RemoteCommand::new(op, magnitude)
}

/// Translates remote messages and forwards them to the device.
#[derive(Debug)]
pub struct Bridge<S> {
    sink: S,
    handled: u64,
    failed: u64,
}

impl<S: CommandSink> Bridge<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            handled: 0,
            failed: 0,
        }
    }

    /// Translate and forward one message; `0` on success, nonzero otherwise
    /// (see `BridgeError::code`).
    pub fn handle(&mut self, bytes: &[u8]) -> i32 {
        match self.forward(bytes) {
            Ok(cmd) => {
                self.handled += 1;
                tracing::debug!(%cmd, "forwarded");
                HANDLED
            }
            Err(e) => {
                self.failed += 1;
                tracing::warn!(error = %e, len = bytes.len(), "unable to handle message");
                e.code()
            }
        }
    }

    /// Like `handle` but with the typed error.
    pub fn forward(&mut self, bytes: &[u8]) -> Result<RemoteCommand, BridgeError> {
        let cmd = decode_message(bytes)?;
        self.sink
            .submit(&cmd.to_device_bytes())
            .map_err(|e| BridgeError::Device(e.to_string()))?;
        Ok(cmd)
    }

    /// Messages forwarded successfully.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

/// Read buffer of one connection.
const CHUNK: usize = 256;

/// Serve one connection: every `read` is one message, handed to `handle`
/// as is. Failures are logged and the loop continues until EOF.
pub fn pump<R: Read, S: CommandSink>(mut reader: R, bridge: &mut Bridge<S>) -> std::io::Result<u64> {
    let mut buf = [0u8; CHUNK];
    let mut chunks = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        chunks += 1;
        bridge.handle(&buf[..n]);
    }
    tracing::info!(chunks, handled = bridge.handled(), failed = bridge.failed(), "connection closed");
    Ok(chunks)
}

/// Serve a byte stream with no message boundaries (a recording or a pipe):
/// split it into 2-byte frames. A dangling odd byte is handed over alone and
/// rejected.
pub fn pump_frames<R: Read, S: CommandSink>(
    mut reader: R,
    bridge: &mut Bridge<S>,
) -> std::io::Result<u64> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    let mut frames = 0;
    for frame in data.chunks(MESSAGE_LEN) {
        frames += 1;
        bridge.handle(frame);
    }
    tracing::info!(frames, handled = bridge.handled(), failed = bridge.failed(), "stream drained");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_remote_indices() {
        let sel: Vec<u8> = RemoteOp::ALL.iter().map(|op| op.selector()).collect();
        assert_eq!(sel, b"FPUDLR");
        for op in RemoteOp::ALL {
            assert_eq!(RemoteOp::from_code(op.code()), Some(op));
        }
        assert_eq!(RemoteOp::from_code(6), None);
    }

    #[test]
    fn fire_and_prime_drop_their_magnitude() {
        assert_eq!(
            decode_message(&[0, 200]).map(RemoteCommand::to_device_bytes),
            Ok(*b"F00")
        );
        assert_eq!(
            decode_message(&[1, 7]).map(RemoteCommand::to_device_bytes),
            Ok(*b"P00")
        );
    }

    #[test]
    fn left_sixteen_formats_like_the_device_expects() {
        let cmd = decode_message(&[4, 0x10]).expect("decode");
        assert_eq!(&cmd.to_device_bytes(), b"L16");
        assert_eq!(cmd.to_string(), "L16");
    }
}
