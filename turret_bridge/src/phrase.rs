//! Spoken-phrase front end: "tilt up 5 degrees" -> `[2, 5]`.
//!
//! The first word containing an operation keyword decides the operation;
//! movements then take the first integer word at or after it, which must
//! not be negative.

use crate::{BridgeError, RemoteCommand, RemoteOp};

const KEYWORDS: [(&str, RemoteOp); 6] = [
    ("fire", RemoteOp::Fire),
    ("prime", RemoteOp::Prime),
    ("up", RemoteOp::TiltUp),
    ("down", RemoteOp::TiltDown),
    ("left", RemoteOp::PanLeft),
    ("right", RemoteOp::PanRight),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phrase {
    pub op: RemoteOp,
    /// Absent for fire/prime.
    pub argument: Option<u32>,
}

impl Phrase {
    pub fn to_command(self) -> Result<RemoteCommand, BridgeError> {
        let arg = self.argument.unwrap_or(0);
        let magnitude = u8::try_from(arg).map_err(|_| BridgeError::MagnitudeOutOfRange(arg))?;
        RemoteCommand::new(self.op, magnitude)
    }
}

fn op_of(word: &str) -> Option<RemoteOp> {
    let w = word.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(kw, _)| w.contains(kw))
        .map(|(_, op)| *op)
}

/// `None` when no word names an operation, or a movement has no number.
pub fn parse_phrase<S: AsRef<str>>(words: &[S]) -> Option<Phrase> {
    let (at, op) = words
        .iter()
        .enumerate()
        .find_map(|(i, w)| op_of(w.as_ref()).map(|op| (i, op)))?;
    if !op.takes_magnitude() {
        return Some(Phrase { op, argument: None });
    }
    let first_number = words[at..]
        .iter()
        .find_map(|w| w.as_ref().parse::<i64>().ok())?;
    let argument = u32::try_from(first_number).ok()?;
    Some(Phrase {
        op,
        argument: Some(argument),
    })
}
