//! End-to-end session scenarios against the virtual backend

use std::sync::Arc;

use midi_session::{
    status_byte, CcParams, ConnectionState, Error, InputHandle, MidiPort, MidiSession,
    NoteOffParams, NoteOnParams, OutcomeKind, OutputHandle, SessionConfig, Target, ValueQuery,
    VirtualAccess, VirtualInput, VirtualOutput, VirtualProvider,
};

async fn session_with(access: Arc<VirtualAccess>) -> MidiSession {
    let session = MidiSession::new(SessionConfig::default());
    session
        .initialize(&VirtualProvider::new(access))
        .await
        .expect("virtual access is always granted");
    session
}

#[tokio::test]
async fn note_on_then_note_off() {
    let access = Arc::new(VirtualAccess::new());
    let synth = access.add_output(VirtualOutput::new("synth", "Synth"));
    let session = session_with(access).await;

    let output = session.find_output("synth").unwrap();
    assert!(session.add_output(output.clone()).await);

    session
        .send_note_on(NoteOnParams::new(1, 60, 100, output.clone()))
        .unwrap();
    session
        .send_note_off(NoteOffParams::new(1, 60, output))
        .unwrap();

    assert_eq!(synth.sent(), vec![vec![0x91, 60, 100], vec![0x81, 60, 0]]);
}

#[tokio::test]
async fn cc_with_zero_value_is_stored() {
    let access = Arc::new(VirtualAccess::new());
    let synth = access.add_output(VirtualOutput::new("synth", "Synth"));
    let session = session_with(access).await;

    let outcome = session
        .send_cc(CcParams::new(1, 64, 0, synth.clone() as OutputHandle))
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Sent);
    assert_eq!(outcome.bytes, [0xB1, 64, 0]);
    assert_eq!(synth.last_sent(), Some(vec![0xB1, 64, 0]));

    let lookup = session.get_value(&ValueQuery::Controller { channel: 1, controller: 64 });
    assert_eq!(lookup.as_value(), Some(0));

    let records = session.get_value(&ValueQuery::device("synth"));
    assert_eq!(records.as_records().len(), 1);
    assert_eq!(records.as_records()[0].value, 0);
}

#[tokio::test]
async fn partial_delivery_still_updates_every_device() {
    let access = Arc::new(VirtualAccess::new());
    let good = access.add_output(VirtualOutput::new("good", "Good"));
    let bad = access.add_output(VirtualOutput::new("bad", "Bad"));
    bad.set_failing(true);
    let session = session_with(access).await;

    let target = Target::List(vec![good.clone() as OutputHandle, bad as OutputHandle]);
    let outcome = session.send_cc(CcParams::new(0, 7, 127, target)).unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Partial);
    assert_eq!(outcome.delivered, vec!["good".to_string()]);
    assert_eq!(good.last_sent(), Some(vec![0xB0, 7, 127]));
    assert_eq!(
        session
            .get_value(&ValueQuery::Device { id: "bad".to_string(), channel: Some(0), controller: Some(7) })
            .as_records()
            .len(),
        1
    );
}

#[tokio::test]
async fn unsupported_and_denied_initialization() {
    let session = MidiSession::default();
    assert!(matches!(
        session.initialize(&VirtualProvider::unsupported()).await,
        Err(Error::UnsupportedPlatform(_))
    ));
    assert!(matches!(
        session.initialize(&VirtualProvider::denied()).await,
        Err(Error::PermissionDenied(_))
    ));
    assert!(!session.is_ready());
}

#[tokio::test]
async fn input_without_open_capability() {
    let access = Arc::new(VirtualAccess::new());
    access.add_input(VirtualInput::new("stuck", "Stuck").without_open());
    let session = session_with(access).await;

    let input: InputHandle = session.find_input("stuck").unwrap();
    assert!(!session.open_input(input, None).await);
    assert!(session.connected_inputs().is_empty());
    assert_eq!(session.connection_state("stuck"), Some(ConnectionState::Closed));
}

#[tokio::test]
async fn registry_deduplicates_and_ignores_missing() {
    let access = Arc::new(VirtualAccess::new());
    access.add_output(VirtualOutput::new("synth", "Synth"));
    let session = session_with(access).await;

    let output = session.outputs()[0].clone();
    session.add_output(output.clone()).await;
    session.add_output(output).await;
    assert_eq!(session.connected_outputs().len(), 1);

    assert!(!session.remove_output("nobody").await);
    assert_eq!(session.connected_outputs().len(), 1);
}

#[tokio::test]
async fn incoming_messages_reach_the_event_channel() {
    let access = Arc::new(VirtualAccess::new());
    let keys = access.add_input(VirtualInput::new("keys", "Keys"));
    let session = session_with(access).await;
    let mut events = session.take_event_receiver().unwrap();

    assert!(session.open_input(session.inputs()[0].clone(), None).await);
    assert_eq!(
        session.connected_inputs().iter().map(|i| i.id().to_string()).collect::<Vec<_>>(),
        vec!["keys".to_string()]
    );

    keys.inject(&[0x90, 60, 100]);
    let event = events.recv().await.unwrap();
    assert_eq!(event.device_id, "keys");
    assert_eq!(event.bytes, vec![0x90, 60, 100]);
}

#[test]
fn unknown_type_has_null_status() {
    assert_eq!(status_byte("unknownType"), 0x00);
    assert_eq!(status_byte("cc"), 0xB0);
    assert_eq!(status_byte("afterTouch"), 0xA0);
}
