//! Signal levels and the crosspoint command model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Router signal levels.
///
/// The discriminants are the bitmask values carried on the wire. A command
/// always selects exactly one level; values are never OR-ed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u32)]
pub enum Level {
    MdVideo = 1,
    SdiVideo = 2,
    AesAudio1 = 4,
    AesAudio2 = 8,
    AnalogVideo = 16,
    AnalogAudio1 = 32,
    AnalogAudio2 = 64,
    MachineControl = 128,
}

impl Level {
    /// All levels, in wire-value order
    pub const ALL: [Level; 8] = [
        Level::MdVideo,
        Level::SdiVideo,
        Level::AesAudio1,
        Level::AesAudio2,
        Level::AnalogVideo,
        Level::AnalogAudio1,
        Level::AnalogAudio2,
        Level::MachineControl,
    ];

    /// Bitmask value written into the level field
    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn from_bits(val: u32) -> Option<Self> {
        match val {
            1 => Some(Level::MdVideo),
            2 => Some(Level::SdiVideo),
            4 => Some(Level::AesAudio1),
            8 => Some(Level::AesAudio2),
            16 => Some(Level::AnalogVideo),
            32 => Some(Level::AnalogAudio1),
            64 => Some(Level::AnalogAudio2),
            128 => Some(Level::MachineControl),
            _ => None,
        }
    }

    /// Operator-facing label
    pub fn label(self) -> &'static str {
        match self {
            Level::MdVideo => "MD Video",
            Level::SdiVideo => "SDI Video",
            Level::AesAudio1 => "AES Audio 1",
            Level::AesAudio2 => "AES Audio 2",
            Level::AnalogVideo => "Analog Video",
            Level::AnalogAudio1 => "Analog Audio 1",
            Level::AnalogAudio2 => "Analog Audio 2",
            Level::MachineControl => "Machine Control",
        }
    }

    /// Look a level up by its label, ignoring case
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts either a label ("SDI Video") or a bitmask value ("2").
impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(level) = Self::from_label(s) {
            return Ok(level);
        }
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::from_bits)
            .ok_or_else(|| Error::UnknownLevel(s.to_string()))
    }
}

/// A single crosspoint change.
///
/// `destination` and `source` are 1-based, as presented to operators. They
/// are converted to zero-based indices only when encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrosspointCommand {
    pub level: Level,
    pub destination: u16,
    pub source: u16,
}

impl CrosspointCommand {
    pub fn new(level: Level, destination: u16, source: u16) -> Self {
        Self {
            level,
            destination,
            source,
        }
    }
}

impl fmt::Display for CrosspointCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dst {} <- src {}",
            self.level, self.destination, self.source
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bits_roundtrip() {
        for level in Level::ALL {
            assert_eq!(Level::from_bits(level.bits()), Some(level));
        }
        assert_eq!(Level::from_bits(3), None);
        assert_eq!(Level::from_bits(0), None);
    }

    #[test]
    fn test_level_bits_are_single_flags() {
        for level in Level::ALL {
            assert_eq!(level.bits().count_ones(), 1);
        }
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("SDI Video".parse::<Level>().unwrap(), Level::SdiVideo);
        assert_eq!("sdi video".parse::<Level>().unwrap(), Level::SdiVideo);
        assert_eq!("128".parse::<Level>().unwrap(), Level::MachineControl);
        assert!("Dolby E".parse::<Level>().is_err());
        assert!("3".parse::<Level>().is_err());
    }

    #[test]
    fn test_command_display() {
        let cmd = CrosspointCommand::new(Level::SdiVideo, 5, 10);
        assert_eq!(cmd.to_string(), "SDI Video dst 5 <- src 10");
    }
}
