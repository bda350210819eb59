// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! MIDI message classification and log formatting
//!
//! A pure decoder over the first (status) byte of a MIDI message. The
//! engine routes bytes without modelling full MIDI semantics, so the
//! taxonomy is deliberately small: the eight categories a route filter
//! can match on, plus the channel extracted from the status nibble.
//!
//! Running status is not handled here; the port backend is required to
//! deliver whole messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message categories a route filter can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageType {
    NoteOn,
    NoteOff,
    ControlChange,
    ProgramChange,
    PitchBend,
    SysEx,
    Clock,
    Unknown,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::NoteOn => "NoteOn",
            MessageType::NoteOff => "NoteOff",
            MessageType::ControlChange => "ControlChange",
            MessageType::ProgramChange => "ProgramChange",
            MessageType::PitchBend => "PitchBend",
            MessageType::SysEx => "SysEx",
            MessageType::Clock => "Clock",
            MessageType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Result of classifying a raw byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub message_type: MessageType,
    /// 0 for non-channel messages, 1..=16 otherwise.
    pub channel: u8,
    /// Expected message length in bytes; `None` for variable-length (SysEx).
    pub expected_len: Option<usize>,
}

impl Classification {
    const fn system(message_type: MessageType, expected_len: usize) -> Self {
        Self {
            message_type,
            channel: 0,
            expected_len: Some(expected_len),
        }
    }
}

/// Classify a MIDI message by its status byte.
///
/// Empty input yields `Unknown` with channel 0 and expected length 0.
///
/// ```
/// use midiroute_core::taxonomy::{classify, MessageType};
///
/// let c = classify(&[0x91, 60, 100]);
/// assert_eq!(c.message_type, MessageType::NoteOn);
/// assert_eq!(c.channel, 2);
/// ```
pub fn classify(data: &[u8]) -> Classification {
    let Some(&status) = data.first() else {
        return Classification {
            message_type: MessageType::Unknown,
            channel: 0,
            expected_len: Some(0),
        };
    };

    let channel = (status & 0x0F) + 1;
    match status & 0xF0 {
        0x80 => Classification {
            message_type: MessageType::NoteOff,
            channel,
            expected_len: Some(3),
        },
        0x90 => Classification {
            message_type: MessageType::NoteOn,
            channel,
            expected_len: Some(3),
        },
        // Polyphonic aftertouch: routed opaquely.
        0xA0 => Classification {
            message_type: MessageType::Unknown,
            channel,
            expected_len: Some(3),
        },
        0xB0 => Classification {
            message_type: MessageType::ControlChange,
            channel,
            expected_len: Some(3),
        },
        0xC0 => Classification {
            message_type: MessageType::ProgramChange,
            channel,
            expected_len: Some(2),
        },
        // Channel pressure: routed opaquely.
        0xD0 => Classification {
            message_type: MessageType::Unknown,
            channel,
            expected_len: Some(2),
        },
        0xE0 => Classification {
            message_type: MessageType::PitchBend,
            channel,
            expected_len: Some(3),
        },
        0xF0 => match status {
            0xF0 | 0xF7 => Classification {
                message_type: MessageType::SysEx,
                channel: 0,
                expected_len: None,
            },
            0xF8 | 0xFA | 0xFB | 0xFC => Classification::system(MessageType::Clock, 1),
            _ => Classification::system(MessageType::Unknown, 1),
        },
        // Data byte in status position: opaque.
        _ => Classification::system(MessageType::Unknown, 1),
    }
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Display name of a MIDI note number, e.g. 60 → `C4`.
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

/// Human-readable summary of a message for the operator log.
///
/// The output format is stable: monitoring surfaces key off these strings.
pub fn format_detail(message_type: MessageType, data: &[u8]) -> String {
    if data.is_empty() {
        return "Empty".to_string();
    }
    match message_type {
        MessageType::NoteOn | MessageType::NoteOff if data.len() >= 3 => {
            format!("{} {} Vel:{}", message_type, note_name(data[1]), data[2])
        }
        MessageType::ControlChange if data.len() >= 3 => {
            format!("CC#{} Val:{}", data[1], data[2])
        }
        MessageType::ProgramChange if data.len() >= 2 => {
            format!("Program {}", data[1])
        }
        MessageType::PitchBend if data.len() >= 3 => {
            let raw = (data[1] as i32) | ((data[2] as i32) << 7);
            format!("Pitch {}", raw - 8192)
        }
        MessageType::SysEx => format!("SysEx {} bytes", data.len()),
        MessageType::Clock => format!("Clock {:02X}", data[0]),
        _ => {
            let hex: Vec<String> = data.iter().map(|b| format!("{b:02X}")).collect();
            format!("{} [{}]", message_type, hex.join(" "))
        }
    }
}
