//! BLE-MIDI wire codec
//!
//! Translates between the timestamped wire representation exchanged over the
//! radio link, packed 32-bit events and human-readable descriptions.
//!
//! Wire units are laid out as `[ts-high, ts-low, status, data...]` and repeat
//! until the end of the buffer. The codec keeps no state; malformed input
//! produces a partial result and a [`Diagnostic`] on the injected sink.

use crate::catalog::MessageCatalog;
use crate::diagnostics::{Diagnostic, SharedSink};
use crate::midi::{format_hex_list, has_single_data_byte, packed_status, UniversalMessage};

/// Wire marker set on both timestamp bytes
const TIMESTAMP_MARKER: u8 = 0x80;

/// Timestamps carry 13 bits
const TIMESTAMP_MASK: u64 = 0x1FFF;

/// Bytes of a wire unit preceding the status byte
const HEADER_LEN: usize = 2;

/// Maximum number of SysEx bytes rendered from a wire buffer
const WIRE_SYSEX_PREVIEW: usize = 6;

/// Number of SysEx data bytes rendered from a structured event
const EVENT_SYSEX_PREVIEW: usize = 5;

/// Default packing bound when the link does not report one
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 256;

/// Stateless message codec bound to a catalog and a diagnostics sink
#[derive(Clone)]
pub struct MessageCodec {
    catalog: MessageCatalog,
    sink: SharedSink,
}

impl MessageCodec {
    pub fn new(catalog: MessageCatalog, sink: SharedSink) -> Self {
        Self { catalog, sink }
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    /// Decode a wire buffer into message descriptions
    ///
    /// The scan stops at the first truncated unit or unknown status and
    /// returns everything decoded before it.
    pub fn decode_wire(&self, packet: &[u8]) -> Vec<String> {
        let mut messages = Vec::new();
        let mut index = 0;

        while index + 1 < packet.len() {
            if packet.len() < index + HEADER_LEN + 2 {
                self.sink.record(Diagnostic::InvalidPacket {
                    packet: packet.to_vec(),
                });
                break;
            }

            let status_index = index + HEADER_LEN;
            let status = packet[status_index];
            let channel = status & 0x0F;

            let unit_len = match status >> 4 {
                0x8..=0xB | 0xE => HEADER_LEN + 3,
                0xC | 0xD => HEADER_LEN + 2,
                0xF => packet.len() - index,
                _ => {
                    self.sink.record(Diagnostic::InvalidStatus {
                        status,
                        index: status_index,
                        packet: packet.to_vec(),
                    });
                    break;
                }
            };

            if packet.len() < index + unit_len {
                self.sink.record(Diagnostic::InvalidPacket {
                    packet: packet.to_vec(),
                });
                break;
            }

            let data1 = packet[status_index + 1];
            let data2 = packet.get(status_index + 2).copied().unwrap_or(0);

            let description = match status >> 4 {
                0x8 => self.catalog.note_off(channel, data1, data2),
                0x9 => self.catalog.note_on(channel, data1, data2),
                0xA => self.catalog.poly_pressure(channel, data1, data2),
                0xB => self.catalog.control_change(channel, data1, data2),
                0xC => self.catalog.program_change(channel, data1),
                0xD => self.catalog.channel_pressure(channel, data1),
                0xE => self.catalog.pitch_bend(channel, pitch_bend_value(data1, data2)),
                _ => self.wire_sysex(&packet[status_index..]),
            };

            messages.push(description);
            index += unit_len;
        }

        messages
    }

    fn wire_sysex(&self, bytes: &[u8]) -> String {
        let shown = bytes.len().min(WIRE_SYSEX_PREVIEW);
        let mut sequence = format_hex_list(&bytes[..shown]);
        if bytes.len() > WIRE_SYSEX_PREVIEW {
            sequence.push_str(", ...");
        }
        self.catalog.system_exclusive(&sequence)
    }

    /// Describe a structured event delivered by the host subsystem
    ///
    /// Returns `None` for message types other than MIDI 1.0 channel voice and
    /// SysEx; an unrecognised channel voice status is described as unknown.
    pub fn decode_message(&self, message: &UniversalMessage) -> Option<String> {
        match *message {
            UniversalMessage::ChannelVoice1 {
                channel,
                status,
                data1,
                data2,
            } => Some(match status {
                0x8 => self.catalog.note_off(channel, data1, data2),
                0x9 => self.catalog.note_on(channel, data1, data2),
                0xA => self.catalog.poly_pressure(channel, data1, data2),
                0xB => self.catalog.control_change(channel, data1, data2),
                0xC => self.catalog.program_change(channel, data1),
                0xD => self.catalog.channel_pressure(channel, data1),
                0xE => self.catalog.pitch_bend(channel, pitch_bend_value(data1, data2)),
                _ => self.catalog.unknown_message.clone(),
            }),
            UniversalMessage::SysEx { channel, data } => {
                let sequence = format!(
                    "0xF{:X}, {}, ...",
                    channel & 0x0F,
                    format_hex_list(&data[..EVENT_SYSEX_PREVIEW])
                );
                Some(self.catalog.system_exclusive(&sequence))
            }
            _ => None,
        }
    }

    /// Encode packed events into wire units, one unit per event
    ///
    /// Every unit of one call carries the same timestamp, taken from the low
    /// 13 bits of `elapsed_ns`. `max_chunk_size` is the write bound the units
    /// will later be packed into; a unit that can never fit is reported.
    pub fn encode(&self, events: &[u32], max_chunk_size: usize, elapsed_ns: u64) -> Vec<Vec<u8>> {
        let timestamp = elapsed_ns & TIMESTAMP_MASK;
        let timestamp_msb = TIMESTAMP_MARKER | (timestamp >> 7) as u8;
        let timestamp_lsb = TIMESTAMP_MARKER | (timestamp & 0x7F) as u8;

        events
            .iter()
            .map(|&event| {
                let status = packed_status(event);
                let data1 = ((event >> 8) & 0xFF) as u8;
                let data2 = (event & 0xFF) as u8;

                let mut unit = vec![timestamp_msb, timestamp_lsb, status, data1];
                if !has_single_data_byte(status) {
                    unit.push(data2);
                }

                if unit.len() > max_chunk_size {
                    self.sink.record(Diagnostic::ChunkTooLarge {
                        len: unit.len(),
                        max: max_chunk_size,
                    });
                }
                unit
            })
            .collect()
    }
}

/// Combine pitch bend data bytes (LSB first on the wire) into a 14-bit value
fn pitch_bend_value(lsb: u8, msb: u8) -> u16 {
    ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F)
}

/// Pack wire units into writes no larger than `max_size`
///
/// Units are never split; a unit larger than `max_size` is written alone.
pub fn pack_units(units: Vec<Vec<u8>>, max_size: usize) -> Vec<Vec<u8>> {
    let mut writes: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for unit in units {
        if !current.is_empty() && current.len() + unit.len() > max_size {
            writes.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(&unit);
    }
    if !current.is_empty() {
        writes.push(current);
    }

    writes
}
