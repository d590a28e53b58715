//! End-to-end scenarios exercising invitation, clock sync, and MIDI
//! delivery across two session engines talking over real loopback sockets.

use std::net::UdpSocket;
use std::time::Duration;

use rtp_midi_core::MidiMessage;
use rtp_midi_net::midi::rtp::message::RtpMidiPayload;
use rtp_midi_net::{RtpHeader, SessionEngine, SyncPhase, SystemClock};

fn spawn_engine(name: &str) -> SessionEngine {
    SessionEngine::new(
        name.to_string(),
        "127.0.0.1:0".parse().unwrap(),
        Box::new(SystemClock::new()),
        Duration::from_secs(30),
    )
    .unwrap()
}

fn pump(engines: &mut [&mut SessionEngine], rounds: usize) {
    for _ in 0..rounds {
        for engine in engines.iter_mut() {
            let _ = engine.tick_receive(8);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn s1_invitation_establishes_a_peer_on_both_sides() {
    let mut initiator = spawn_engine("initiator");
    let mut responder = spawn_engine("responder");
    let responder_ctrl = responder.control_addr().unwrap();

    initiator.invite(responder_ctrl).unwrap();
    pump(&mut [&mut responder, &mut initiator], 8);

    assert_eq!(initiator.peer_ssrcs().len(), 1);
    assert_eq!(responder.peer_ssrcs().len(), 1);
}

#[test]
fn s2_clock_sync_converges_to_a_synced_phase() {
    let mut initiator = spawn_engine("initiator");
    let mut responder = spawn_engine("responder");
    let responder_ctrl = responder.control_addr().unwrap();

    initiator.invite(responder_ctrl).unwrap();
    pump(&mut [&mut responder, &mut initiator], 12);

    let peer_ssrc = initiator.peer_ssrcs()[0];
    assert_eq!(initiator.sync_phase(peer_ssrc), Some(SyncPhase::Synced));
    let (_, one_way_delay) = initiator.sync_stats(peer_ssrc).unwrap();
    assert!(one_way_delay < 1_000_000);
}

#[test]
fn s3_note_on_round_trips_to_scenario_bytes() {
    let payload = RtpMidiPayload::new(vec![MidiMessage::NoteOn { channel: 3, key: 60, velocity: 100 }]);
    let bytes = payload.serialize().unwrap();
    assert_eq!(bytes, vec![0x93, 0x3C, 0x64]);
}

#[test]
fn s4_raw_note_off_bytes_decode_through_the_real_receive_path() {
    let mut initiator = spawn_engine("initiator");
    let mut responder = spawn_engine("responder");
    let responder_ctrl = responder.control_addr().unwrap();

    initiator.invite(responder_ctrl).unwrap();
    pump(&mut [&mut responder, &mut initiator], 8);
    assert_eq!(responder.peer_ssrcs().len(), 1, "handshake must complete before S4 can exercise delivery");

    let initiator_ssrc = initiator.local_ssrc();
    let mut header_bytes = [0u8; 12];
    RtpHeader::new(0, 0, initiator_ssrc).serialize(&mut header_bytes).unwrap();
    let mut datagram = header_bytes.to_vec();
    datagram.extend_from_slice(&[0x83, 0x3C, 0x40]);

    let throwaway = UdpSocket::bind("127.0.0.1:0").unwrap();
    throwaway.send_to(&datagram, responder.data_addr().unwrap()).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    responder.tick_receive(4).unwrap();

    let received = responder.pop_incoming().expect("S4 datagram should have been delivered");
    assert_eq!(received.peer_ssrc, initiator_ssrc);
    assert_eq!(received.commands, vec![MidiMessage::NoteOff { channel: 3, key: 60, velocity: 64 }]);
}

#[test]
fn outgoing_queue_drop_newest_semantics_are_fail_fast() {
    let mut engine = spawn_engine("solo");
    for _ in 0..rtp_midi_net::midi::rtp::engine::DEFAULT_QUEUE_CAPACITY {
        engine.queue_outgoing(0xBEEF, MidiMessage::TuneRequest).unwrap();
    }
    assert!(engine.queue_outgoing(0xBEEF, MidiMessage::TuneRequest).is_err());
}

#[test]
fn teardown_drops_subsequent_rtp_midi_from_the_removed_peer() {
    let mut initiator = spawn_engine("initiator");
    let mut responder = spawn_engine("responder");
    let responder_ctrl = responder.control_addr().unwrap();

    initiator.invite(responder_ctrl).unwrap();
    pump(&mut [&mut responder, &mut initiator], 8);
    let initiator_ssrc = initiator.local_ssrc();
    assert_eq!(responder.peer_ssrcs().len(), 1);

    responder.end_session(initiator_ssrc).unwrap();
    assert!(responder.peer_ssrcs().is_empty());

    let mut header_bytes = [0u8; 12];
    RtpHeader::new(0, 0, initiator_ssrc).serialize(&mut header_bytes).unwrap();
    let mut datagram = header_bytes.to_vec();
    datagram.extend_from_slice(&[0x93, 0x3C, 0x64]);

    let throwaway = UdpSocket::bind("127.0.0.1:0").unwrap();
    throwaway.send_to(&datagram, responder.data_addr().unwrap()).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    responder.tick_receive(4).unwrap();

    assert!(responder.pop_incoming().is_none(), "RTP-MIDI from a torn-down peer must be dropped, not delivered");
}
