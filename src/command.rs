// AngleControlPanel
// Author: J Taylor
// Supplied without warranty.
// Use at your own risk.


// src/command.rs
//
// Outbound side of the serial protocol. One command per write:
//   "<angle>"                  bare
//   "<angle>\n"                newline terminated
//   "<angle>,<kp>,<ki>,<kd>\n" closed loop with gains

use serde::{Deserialize, Serialize};

// ---------------- Options ----------------

/// Accepted range for the target angle. Firmware builds disagree, so this
/// is a setting rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnglePolicy {
    NonNegative,
    FullTurn,
}

impl AnglePolicy {
    pub const ALL: [AnglePolicy; 2] = [AnglePolicy::NonNegative, AnglePolicy::FullTurn];

    pub fn accepts(self, angle: f64) -> bool {
        match self {
            AnglePolicy::NonNegative => angle >= 0.0,
            AnglePolicy::FullTurn => (0.0..=360.0).contains(&angle),
        }
    }
}

impl std::fmt::Display for AnglePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnglePolicy::NonNegative => write!(f, ">= 0°"),
            AnglePolicy::FullTurn => write!(f, "0 to 360°"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineEnding {
    Bare,
    Newline,
}

impl LineEnding {
    pub const ALL: [LineEnding; 2] = [LineEnding::Bare, LineEnding::Newline];

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Bare => "",
            LineEnding::Newline => "\n",
        }
    }
}

impl std::fmt::Display for LineEnding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineEnding::Bare => write!(f, "None"),
            LineEnding::Newline => write!(f, "\\n"),
        }
    }
}

/// Open loop sends the bare angle; closed loop also sends the PID gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    Open,
    Closed,
}

impl LoopMode {
    pub const ALL: [LoopMode; 2] = [LoopMode::Open, LoopMode::Closed];
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Open => write!(f, "Open loop"),
            LoopMode::Closed => write!(f, "Closed loop"),
        }
    }
}

// ---------------- Errors ----------------

#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    NotANumber(String),
    OutOfRange { angle: f64, policy: AnglePolicy },
    BadGain { name: &'static str, input: String },
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotANumber(input) => write!(f, "Invalid angle: '{}' is not a number", input),
            CommandError::OutOfRange { angle, policy } => {
                write!(f, "Invalid angle: {} is outside {}", angle, policy)
            }
            CommandError::BadGain { name, input } => {
                write!(f, "Invalid {}: '{}' is not a number", name, input)
            }
        }
    }
}

impl std::error::Error for CommandError {}

// ---------------- Command ----------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.6,
            ki: 0.003,
            kd: 0.8,
        }
    }
}

impl PidGains {
    pub fn parse(kp: &str, ki: &str, kd: &str) -> Result<Self, CommandError> {
        Ok(Self {
            kp: parse_gain("Kp", kp)?,
            ki: parse_gain("Ki", ki)?,
            kd: parse_gain("Kd", kd)?,
        })
    }
}

fn parse_gain(name: &'static str, input: &str) -> Result<f64, CommandError> {
    match input.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CommandError::BadGain {
            name,
            input: input.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub angle: f64,
    pub gains: Option<PidGains>,
}

impl Command {
    pub fn new(angle: f64, gains: Option<PidGains>) -> Self {
        Self { angle, gains }
    }

    /// Validate user text as a target angle under `policy`.
    pub fn parse_angle(input: &str, policy: AnglePolicy) -> Result<f64, CommandError> {
        let angle = match input.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => return Err(CommandError::NotANumber(input.to_string())),
        };

        if !policy.accepts(angle) {
            return Err(CommandError::OutOfRange { angle, policy });
        }
        Ok(angle)
    }

    /// Build the command the panel would send for this input text. Gains
    /// are parsed only in closed loop.
    pub fn from_input(
        angle: &str,
        gains: [&str; 3],
        policy: AnglePolicy,
        mode: LoopMode,
    ) -> Result<Self, CommandError> {
        let angle = Self::parse_angle(angle, policy)?;
        let gains = match mode {
            LoopMode::Open => None,
            LoopMode::Closed => Some(PidGains::parse(gains[0], gains[1], gains[2])?),
        };
        Ok(Self::new(angle, gains))
    }

    /// Wire form, e.g. `45\n` or `45,0.6,0.003,0.8\n`.
    pub fn encode(&self, ending: LineEnding) -> String {
        match self.gains {
            Some(g) => format!("{},{},{},{}{}", self.angle, g.kp, g.ki, g.kd, ending.as_str()),
            None => format!("{}{}", self.angle, ending.as_str()),
        }
    }
}
