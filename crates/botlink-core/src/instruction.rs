//! The instruction catalog.
//!
//! [`Instruction`] is the closed set of commands the robot firmware
//! understands. Each variant has a fixed wire code assigned in an explicit
//! table, so reordering or extending the enum never changes the byte that
//! existing variants put on the wire.

use std::fmt;
use std::str::FromStr;

/// One discrete robot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// No-op sentinel. The firmware skips it.
    Nothing,
    Forward,
    Backward,
    Left,
    Right,
    Light,
    KillAllHumans,
}

impl Instruction {
    /// Every variant in the catalog.
    pub const ALL: [Instruction; 7] = [
        Instruction::Nothing,
        Instruction::Forward,
        Instruction::Backward,
        Instruction::Left,
        Instruction::Right,
        Instruction::Light,
        Instruction::KillAllHumans,
    ];

    /// Byte sent on the wire for this instruction.
    ///
    /// These values are shared with the deployed firmware and must never be
    /// renumbered.
    pub const fn wire_code(self) -> u8 {
        match self {
            Instruction::Nothing => 0,
            Instruction::Forward => 1,
            Instruction::Backward => 2,
            Instruction::Left => 3,
            Instruction::Right => 4,
            Instruction::Light => 5,
            Instruction::KillAllHumans => 6,
        }
    }

    /// Reverse lookup of [`wire_code`](Self::wire_code).
    pub fn from_wire_code(code: u8) -> Option<Instruction> {
        Instruction::ALL
            .into_iter()
            .find(|instruction| instruction.wire_code() == code)
    }

    /// Human-readable label for palette buttons and queue entries.
    pub const fn display_name(self) -> &'static str {
        match self {
            Instruction::Nothing => "Nothing",
            Instruction::Forward => "Forward",
            Instruction::Backward => "Backward",
            Instruction::Left => "Turn Left",
            Instruction::Right => "Turn Right",
            Instruction::Light => "Turn On Light",
            Instruction::KillAllHumans => "Kill All Humans",
        }
    }

    /// Instructions an operator can pick from. Excludes the no-op sentinel.
    pub fn palette() -> impl Iterator<Item = Instruction> {
        Instruction::ALL
            .into_iter()
            .filter(|instruction| *instruction != Instruction::Nothing)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Error returned when a string does not name an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instruction: {0}")]
pub struct ParseInstructionError(pub String);

impl FromStr for Instruction {
    type Err = ParseInstructionError;

    /// Parse an instruction name, ignoring case, `_` and `-`.
    ///
    /// Accepts the variant names (`forward`, `kill_all_humans`) and the
    /// hyphenated display names (`turn-left`, `turn-on-light`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let instruction = match key.as_str() {
            "nothing" | "noop" => Instruction::Nothing,
            "forward" => Instruction::Forward,
            "backward" => Instruction::Backward,
            "left" | "turnleft" => Instruction::Left,
            "right" | "turnright" => Instruction::Right,
            "light" | "turnonlight" => Instruction::Light,
            "killallhumans" => Instruction::KillAllHumans,
            _ => return Err(ParseInstructionError(s.to_string())),
        };
        Ok(instruction)
    }
}
