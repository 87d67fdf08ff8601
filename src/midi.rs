//! MIDI utilities and message types
//!
//! Provides MIDI 1.0 message encoding, the packed 32-bit event
//! representation exchanged with the presentation layer, and the structured
//! events delivered by the host enumeration subsystem.

use std::fmt;

/// Universal packet message type for MIDI 1.0 channel voice messages
const UMP_MIDI1_CHANNEL_VOICE: u32 = 0x2;

/// MIDI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Polyphonic Key Pressure: channel (0-15), note (0-127), pressure (0-127)
    PolyPressure { channel: u8, note: u8, pressure: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel Pressure: channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive: data bytes between 0xF0 and 0xF7
    SysEx { data: Vec<u8> },
}

impl MidiMessage {
    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                vec![0xA0 | (channel & 0x0F), note & 0x7F, pressure & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                vec![0xD0 | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => {
                let mut result = vec![0xF0];
                result.extend_from_slice(data);
                result.push(0xF7);
                result
            }
        }
    }

    /// Pack a channel voice message into a 32-bit universal packet word
    ///
    /// Layout: `0x2` message type, group, status, data1, data2. Returns
    /// `None` for SysEx, which does not fit a single word.
    pub fn to_packed(&self, group: u8) -> Option<u32> {
        if matches!(self, MidiMessage::SysEx { .. }) {
            return None;
        }

        let bytes = self.encode();
        let status = bytes[0] as u32;
        let data1 = bytes.get(1).copied().unwrap_or(0) as u32;
        let data2 = bytes.get(2).copied().unwrap_or(0) as u32;

        Some(
            (UMP_MIDI1_CHANNEL_VOICE << 28)
                | (((group & 0x0F) as u32) << 24)
                | (status << 16)
                | (data1 << 8)
                | data2,
        )
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", channel + 1, note, pressure)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => {
                write!(f, "SysEx {} bytes", data.len())
            }
        }
    }
}

/// Status byte carried by a packed event (second-most-significant byte)
pub fn packed_status(word: u32) -> u8 {
    ((word >> 16) & 0xFF) as u8
}

/// Whether a status byte carries a single data byte (program change, channel pressure)
pub fn has_single_data_byte(status: u8) -> bool {
    matches!(status & 0xF0, 0xC0 | 0xD0)
}

/// Convert a packed event into MIDI 1.0 bytes: status, data1 and data2 when
/// the opcode carries two data bytes
pub fn packed_to_bytes(word: u32) -> Vec<u8> {
    let status = packed_status(word);
    let data1 = ((word >> 8) & 0xFF) as u8;
    let data2 = (word & 0xFF) as u8;

    if has_single_data_byte(status) {
        vec![status, data1]
    } else {
        vec![status, data1, data2]
    }
}

/// Structured event as demultiplexed by the host enumeration subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniversalMessage {
    /// Utility message (no-op, jitter reduction)
    Utility,
    /// System common / real-time message
    System { status: u8 },
    /// MIDI 1.0 channel voice message; `status` is the high nibble (0x8-0xE)
    ChannelVoice1 {
        channel: u8,
        status: u8,
        data1: u8,
        data2: u8,
    },
    /// 7-bit system exclusive chunk with up to six payload bytes
    SysEx { channel: u8, data: [u8; 6] },
    /// MIDI 2.0 channel voice message
    ChannelVoice2,
    /// 8-bit data message
    Data128,
}

impl UniversalMessage {
    /// Demultiplex one MIDI 1.0 byte message as delivered by a host port
    pub fn from_midi1_bytes(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        match status {
            0x80..=0xEF => Some(UniversalMessage::ChannelVoice1 {
                channel: status & 0x0F,
                status: status >> 4,
                data1: rest.first().copied().unwrap_or(0) & 0x7F,
                data2: rest.get(1).copied().unwrap_or(0) & 0x7F,
            }),
            0xF0 => {
                let mut payload = [0u8; 6];
                let body = rest.iter().take_while(|&&b| b != 0xF7);
                for (slot, byte) in payload.iter_mut().zip(body) {
                    *slot = *byte;
                }
                Some(UniversalMessage::SysEx {
                    channel: status & 0x0F,
                    data: payload,
                })
            }
            0xF1..=0xFF => Some(UniversalMessage::System { status }),
            _ => None,
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format bytes as a comma separated list of `0xNN` literals
pub fn format_hex_list(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_note_on() {
        let msg = MidiMessage::NoteOn {
            channel: 9,
            note: 0x3C,
            velocity: 0x43,
        };
        let word = msg.to_packed(1).unwrap();

        assert_eq!(word, 0x2199_3C43);
        assert_eq!(packed_status(word), 0x99);
        assert_eq!(packed_to_bytes(word), vec![0x99, 0x3C, 0x43]);
    }

    #[test]
    fn test_pitch_bend_encodes_lsb_first() {
        let msg = MidiMessage::PitchBend { channel: 0, value: 8192 };
        assert_eq!(msg.encode(), vec![0xE0, 0x00, 0x40]);
        assert_eq!(msg.to_string(), "PitchBend ch:1 v:8192");
    }

    #[test]
    fn test_packed_program_change_drops_second_byte() {
        let msg = MidiMessage::ProgramChange { channel: 2, program: 5 };
        let word = msg.to_packed(0).unwrap();

        assert_eq!(packed_to_bytes(word), vec![0xC2, 5]);
        assert!(MidiMessage::SysEx { data: vec![1] }.to_packed(0).is_none());
    }

    #[test]
    fn test_universal_from_bytes() {
        assert_eq!(
            UniversalMessage::from_midi1_bytes(&[0xB3, 7, 100]),
            Some(UniversalMessage::ChannelVoice1 {
                channel: 3,
                status: 0xB,
                data1: 7,
                data2: 100,
            })
        );
        assert_eq!(
            UniversalMessage::from_midi1_bytes(&[0xF0, 0x43, 0x10, 0xF7]),
            Some(UniversalMessage::SysEx {
                channel: 0,
                data: [0x43, 0x10, 0, 0, 0, 0],
            })
        );
        assert_eq!(
            UniversalMessage::from_midi1_bytes(&[0xF8]),
            Some(UniversalMessage::System { status: 0xF8 })
        );
    }

    #[test]
    fn test_format_hex_list() {
        assert_eq!(format_hex_list(&[0xF5, 0x07]), "0xF5, 0x07");
        assert_eq!(format_hex(&[0x90, 0x3C]), "90 3C");
    }
}
