//! User-visible message catalog
//!
//! Every string shown to the presentation layer goes through a
//! [`MessageCatalog`] value handed to the components at construction. Templates
//! use `{name}` placeholders and can be overridden from the configuration file.

use serde::{Deserialize, Serialize};

/// Templates for decoded message descriptions and fallback names
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageCatalog {
    pub note_on: String,
    pub note_off: String,
    pub poly_pressure: String,
    pub control_change: String,
    pub program_change: String,
    pub channel_pressure: String,
    pub pitch_bend: String,
    pub system_exclusive: String,
    pub unknown_message: String,
    pub unknown_device: String,
    pub unknown_source_name: String,
    pub unknown_destination_name: String,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            note_on: "Note on: channel {channel}, key {key}, velocity {velocity}".to_string(),
            note_off: "Note off: channel {channel}, key {key}, velocity {velocity}".to_string(),
            poly_pressure: "Poly pressure: channel {channel}, key {key}, aftertouch {pressure}"
                .to_string(),
            control_change: "Control change: channel {channel}, control {control}, value {value}"
                .to_string(),
            program_change: "Program change: channel {channel}, program {program}".to_string(),
            channel_pressure: "Channel pressure: channel {channel}, aftertouch {pressure}"
                .to_string(),
            pitch_bend: "Pitch bend: channel {channel}, bend {bend}".to_string(),
            system_exclusive: "SysEx: {sequence}".to_string(),
            unknown_message: "Unknown message".to_string(),
            unknown_device: "Unknown device".to_string(),
            unknown_source_name: "Unknown source name for peripheral: {endpoint}".to_string(),
            unknown_destination_name: "Unknown destination name for peripheral: {id}"
                .to_string(),
        }
    }
}

/// Substitute `{name}` placeholders in a template
fn fill(template: &str, args: &[(&str, &dyn std::fmt::Display)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{}}}", name), &value.to_string());
    }
    out
}

// Channels are carried 0-based and displayed 1-based.
fn display_channel(channel: u8) -> u16 {
    channel as u16 + 1
}

impl MessageCatalog {
    pub fn note_on(&self, channel: u8, key: u8, velocity: u8) -> String {
        fill(
            &self.note_on,
            &[
                ("channel", &display_channel(channel)),
                ("key", &key),
                ("velocity", &velocity),
            ],
        )
    }

    pub fn note_off(&self, channel: u8, key: u8, velocity: u8) -> String {
        fill(
            &self.note_off,
            &[
                ("channel", &display_channel(channel)),
                ("key", &key),
                ("velocity", &velocity),
            ],
        )
    }

    pub fn poly_pressure(&self, channel: u8, key: u8, pressure: u8) -> String {
        fill(
            &self.poly_pressure,
            &[
                ("channel", &display_channel(channel)),
                ("key", &key),
                ("pressure", &pressure),
            ],
        )
    }

    pub fn control_change(&self, channel: u8, control: u8, value: u8) -> String {
        fill(
            &self.control_change,
            &[
                ("channel", &display_channel(channel)),
                ("control", &control),
                ("value", &value),
            ],
        )
    }

    pub fn program_change(&self, channel: u8, program: u8) -> String {
        fill(
            &self.program_change,
            &[("channel", &display_channel(channel)), ("program", &program)],
        )
    }

    pub fn channel_pressure(&self, channel: u8, pressure: u8) -> String {
        fill(
            &self.channel_pressure,
            &[("channel", &display_channel(channel)), ("pressure", &pressure)],
        )
    }

    pub fn pitch_bend(&self, channel: u8, bend: u16) -> String {
        fill(
            &self.pitch_bend,
            &[("channel", &display_channel(channel)), ("bend", &bend)],
        )
    }

    pub fn system_exclusive(&self, sequence: &str) -> String {
        fill(&self.system_exclusive, &[("sequence", &sequence)])
    }

    pub fn unknown_source_name(&self, endpoint: impl std::fmt::Display) -> String {
        fill(&self.unknown_source_name, &[("endpoint", &endpoint)])
    }

    pub fn unknown_destination_name(&self, id: impl std::fmt::Display) -> String {
        fill(&self.unknown_destination_name, &[("id", &id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions_use_one_based_channels() {
        let catalog = MessageCatalog::default();
        assert_eq!(
            catalog.note_on(5, 60, 127),
            "Note on: channel 6, key 60, velocity 127"
        );
        assert_eq!(
            catalog.pitch_bend(15, 8192),
            "Pitch bend: channel 16, bend 8192"
        );
        assert_eq!(catalog.system_exclusive("0xF0"), "SysEx: 0xF0");
    }

    #[test]
    fn test_partial_override_from_yaml() {
        let catalog: MessageCatalog =
            serde_yaml::from_str("note_on: \"Note {key} ({channel}) @ {velocity}\"").unwrap();
        assert_eq!(catalog.note_on(0, 64, 90), "Note 64 (1) @ 90");
        assert_eq!(catalog.unknown_device, "Unknown device");
    }
}
