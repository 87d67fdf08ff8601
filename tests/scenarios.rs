//! End-to-end behavior through the public API

use std::sync::Arc;

use midi_central::catalog::MessageCatalog;
use midi_central::codec::{MessageCodec, DEFAULT_MAX_CHUNK_SIZE};
use midi_central::diagnostics::{Diagnostic, RecordingSink};
use midi_central::host::StaticHost;
use midi_central::manager::{CommunicationManager, InboundBatch, ManagerActor, ManagerOptions};
use midi_central::midi::{MidiMessage, UniversalMessage};
use midi_central::radio::{LoopbackRadio, PowerState, RadioEvent};
use midi_central::remote::{EndpointRef, RemoteId, RemoteState, SessionHandle};
use midi_central::transport::{LocalTransport, Transport, WirelessOptions, WirelessTransport};
use parking_lot::Mutex;

fn codec() -> (MessageCodec, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    (MessageCodec::new(MessageCatalog::default(), sink.clone()), sink)
}

fn local_manager(host: StaticHost, sink: Arc<RecordingSink>) -> CommunicationManager {
    CommunicationManager::new(
        Transport::Local(LocalTransport::new()),
        Box::new(host),
        MessageCatalog::default(),
        sink,
        ManagerOptions::default(),
    )
}

#[test]
fn decodes_note_on_from_wireless_packet() {
    let (codec, sink) = codec();

    let messages = codec.decode_wire(&[0x00, 0x00, 0x95, 0x3C, 0x7F]);

    assert_eq!(messages, vec!["Note on: channel 6, key 60, velocity 127".to_string()]);
    assert!(sink.is_empty());
}

#[test]
fn short_packet_yields_nothing_and_one_diagnostic() {
    let (codec, sink) = codec();

    assert!(codec.decode_wire(&[0xA5, 0x22]).is_empty());
    assert_eq!(sink.len(), 1);
}

#[test]
fn connect_unknown_remote_reports_once() {
    let sink = Arc::new(RecordingSink::new());
    let mut manager = local_manager(StaticHost::default(), sink.clone());
    let id = RemoteId::new();

    manager.connect(id);

    assert!(manager.remotes().is_empty());
    assert_eq!(sink.entries(), vec![Diagnostic::CannotConnect(id)]);
}

#[test]
fn host_enumeration_merges_into_connected_wireless_remote() {
    let sink = Arc::new(RecordingSink::new());
    let radio = LoopbackRadio::new(PowerState::PoweredOn, 20);
    let transport =
        WirelessTransport::new(Box::new(radio), WirelessOptions::default(), sink.clone());
    let mut manager = CommunicationManager::new(
        Transport::Wireless(transport),
        Box::new(StaticHost::samples()),
        MessageCatalog::default(),
        sink.clone(),
        ManagerOptions::default(),
    );

    let id = RemoteId::new();
    manager.handle_radio_event(RadioEvent::Discovered {
        id,
        name: Some("Remote 1".to_string()),
        advertised_name: None,
        session: SessionHandle(7),
    });
    manager.handle_radio_event(RadioEvent::Connected {
        session: SessionHandle(7),
    });
    manager.refresh();

    let remote = manager.registry().find(id).unwrap();
    assert_eq!(remote.state, RemoteState::Connected);
    assert_eq!(remote.source, Some(EndpointRef(125)));
    assert_eq!(remote.destination, Some(EndpointRef(126)));
    assert_eq!(
        manager
            .remotes()
            .iter()
            .filter(|r| r.name == "Remote 1")
            .count(),
        1
    );
}

#[test]
fn encodes_note_on_with_13_bit_timestamp() {
    let (codec, sink) = codec();
    let event = MidiMessage::NoteOn {
        channel: 9,
        note: 0x3C,
        velocity: 0x43,
    }
    .to_packed(0)
    .unwrap();

    let units = codec.encode(&[event], DEFAULT_MAX_CHUNK_SIZE, 0x1A19);

    assert_eq!(units, vec![vec![0x80 | 0x34, 0x80 | 0x19, 0x99, 0x3C, 0x43]]);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn actor_delivers_host_input_to_listeners_and_sends_out() {
    let host = StaticHost::samples();
    let sink = Arc::new(RecordingSink::new());
    let handle = ManagerActor::spawn(local_manager(host.clone(), sink.clone()));

    let received: Arc<Mutex<Vec<InboundBatch>>> = Arc::new(Mutex::new(Vec::new()));
    let collector = received.clone();
    handle.add_listener(Arc::new(move |batch: &InboundBatch| {
        collector.lock().push(batch.clone());
    }));

    handle.refresh();
    let snapshot = handle.snapshot().await.unwrap();
    let remote = snapshot
        .remotes
        .iter()
        .find(|r| r.name == "Remote 2")
        .unwrap()
        .clone();

    handle.connect(remote.id);
    handle.select_destination(Some(remote.id));
    let word = MidiMessage::ControlChange {
        channel: 0,
        cc: 7,
        value: 90,
    }
    .to_packed(0)
    .unwrap();
    handle.send(vec![word]);
    handle.snapshot().await.unwrap();

    assert_eq!(host.sent(), vec![(EndpointRef(429), vec![word])]);

    let event = UniversalMessage::from_midi1_bytes(&[0x90, 0x40, 0x10]).unwrap();
    assert!(host.inject(EndpointRef(317), vec![event]));
    let snapshot = handle.snapshot().await.unwrap();

    assert_eq!(snapshot.last_source.as_deref(), Some("Remote 2"));
    assert_eq!(
        received.lock().clone(),
        vec![InboundBatch {
            source: "Remote 2".to_string(),
            messages: vec!["Note on: channel 1, key 64, velocity 16".to_string()],
        }]
    );
    assert!(sink.is_empty());

    handle.shutdown();
}
