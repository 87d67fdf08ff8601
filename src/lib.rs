//! MIDI central
//!
//! Discovers MIDI peer devices, reachable either as host-enumerated ports or
//! over a wireless link, keeps one registry of them, and exchanges MIDI with
//! the selected device. The wireless link carries BLE-MIDI packets, handled by
//! [`codec`].

pub mod catalog;
pub mod cli;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod host;
pub mod manager;
pub mod midi;
pub mod radio;
pub mod registry;
pub mod remote;
pub mod transport;
