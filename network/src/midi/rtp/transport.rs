//! The RTP Transport layer (spec §4.2): a UDP socket, a peer table indexed
//! both by ssrc and by address, and sequence/journal bookkeeping. Owns no
//! threads — `try_receive`/`send_midi` are called from the host's tick
//! loop.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use log::{trace, warn};
use rtp_midi_core::MidiMessage;

use crate::error::TransportError;

use super::header::{RtpHeader, HEADER_LEN};
use super::message::RtpMidiPayload;
use super::peer::RtpPeer;
use super::seqnum::is_after;

/// Packets arriving more than this many sequence numbers behind the
/// expected next one are treated as stale duplicates rather than reordered.
pub const REORDER_TOLERANCE: i32 = 16;

const MAX_DATAGRAM_LEN: usize = 2048;

#[derive(Debug, PartialEq)]
pub struct ReceivedMidi {
    pub peer_ssrc: u32,
    pub commands: Vec<MidiMessage>,
}

pub struct RtpSession {
    socket: UdpSocket,
    local_ssrc: u32,
    peers_by_ssrc: BTreeMap<u32, RtpPeer>,
    address_index: HashMap<SocketAddr, u32>,
    recv_buf: [u8; MAX_DATAGRAM_LEN],
}

impl RtpSession {
    pub fn bind(addr: SocketAddr, local_ssrc: u32) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            local_ssrc,
            peers_by_ssrc: BTreeMap::new(),
            address_index: HashMap::new(),
            recv_buf: [0u8; MAX_DATAGRAM_LEN],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn add_peer(&mut self, ssrc: u32, address: SocketAddr, name: String) {
        self.address_index.insert(address, ssrc);
        self.peers_by_ssrc.insert(ssrc, RtpPeer::new(ssrc, address, name));
    }

    pub fn remove_peer(&mut self, ssrc: u32) -> Option<RtpPeer> {
        let peer = self.peers_by_ssrc.remove(&ssrc)?;
        self.address_index.remove(&peer.address);
        Some(peer)
    }

    pub fn find_peer_by_ssrc(&self, ssrc: u32) -> Option<&RtpPeer> {
        self.peers_by_ssrc.get(&ssrc)
    }

    pub fn find_peer_by_address(&self, addr: &SocketAddr) -> Option<&RtpPeer> {
        self.address_index.get(addr).and_then(|ssrc| self.peers_by_ssrc.get(ssrc))
    }

    pub fn peers(&self) -> impl Iterator<Item = &RtpPeer> {
        self.peers_by_ssrc.values()
    }

    pub fn peers_mut(&mut self) -> impl Iterator<Item = &mut RtpPeer> {
        self.peers_by_ssrc.values_mut()
    }

    /// Builds, journals, and sends one RTP-MIDI packet of `commands` to the
    /// named peer.
    pub fn send_midi(&mut self, peer_ssrc: u32, timestamp: u32, commands: Vec<MidiMessage>) -> Result<(), TransportError> {
        let peer = self.peers_by_ssrc.get_mut(&peer_ssrc).ok_or(TransportError::NoPeerSsrc(peer_ssrc))?;
        let sequence_number = peer.next_send_sequence();

        for message in &commands {
            peer.journal.append(sequence_number, 0, message.clone());
        }

        let payload = RtpMidiPayload::new(commands);

        let header = RtpHeader::new(sequence_number, timestamp, self.local_ssrc);
        let mut datagram = vec![0u8; HEADER_LEN];
        header.serialize(&mut datagram)?;
        datagram.extend_from_slice(&payload.serialize()?);

        self.socket.send_to(&datagram, peer.address)?;
        Ok(())
    }

    /// Sends a raw datagram (used for AppleMIDI control messages, which
    /// share the session's UDP socket on the data port but are not RTP
    /// framed).
    pub fn send_raw(&self, addr: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        self.socket.send_to(data, addr)?;
        Ok(())
    }

    /// Non-blocking receive: returns `Ok(None)` immediately if no datagram
    /// is waiting, per spec §5's zero-timeout readiness probe contract.
    pub fn try_receive_raw(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>, TransportError> {
        match self.socket.recv_from(&mut self.recv_buf) {
            Ok((len, addr)) => Ok(Some((self.recv_buf[..len].to_vec(), addr))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    /// Parses a datagram already known to be RTP-MIDI (as opposed to an
    /// AppleMIDI control message, which the caller distinguishes by the
    /// 0xFFFF preamble before routing here). Datagrams from an ssrc with no
    /// table entry (never invited, or already torn down) are rejected
    /// rather than delivered, per spec §4.3's teardown rule.
    pub fn handle_rtp_datagram(&mut self, data: &[u8], from: SocketAddr) -> Result<ReceivedMidi, TransportError> {
        let (header, body) = RtpHeader::parse(data)?;
        let peer_ssrc = self.address_index.get(&from).copied().unwrap_or(header.ssrc);
        let peer = self.peers_by_ssrc.get_mut(&peer_ssrc).ok_or(TransportError::NoPeerSsrc(peer_ssrc))?;

        if let Some(expected) = peer.recv_sequence {
            let delta = super::seqnum::wrapping_diff(header.sequence_number, expected);
            if delta < -REORDER_TOLERANCE {
                warn!("dropping stale RTP-MIDI packet seq={} (expected >= {})", header.sequence_number, expected);
                return Ok(ReceivedMidi { peer_ssrc, commands: Vec::new() });
            }
        }
        let new_expected = header.sequence_number.wrapping_add(1);
        let should_advance = peer
            .recv_sequence
            .map_or(true, |expected| new_expected == expected || is_after(new_expected, expected));
        if should_advance {
            peer.recv_sequence = Some(new_expected);
        }

        let payload = RtpMidiPayload::parse(body)?;
        trace!("received {} command(s) from peer {:#010x}", payload.commands.len(), peer_ssrc);
        Ok(ReceivedMidi { peer_ssrc, commands: payload.commands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtp_midi_core::MidiMessage;

    fn bound_pair() -> (RtpSession, RtpSession) {
        let a = RtpSession::bind("127.0.0.1:0".parse().unwrap(), 0xAAAA).unwrap();
        let b = RtpSession::bind("127.0.0.1:0".parse().unwrap(), 0xBBBB).unwrap();
        (a, b)
    }

    #[test]
    fn send_then_receive_round_trips_a_note_on() {
        let (mut a, mut b) = bound_pair();
        let b_addr = b.local_addr().unwrap();
        let a_addr = a.local_addr().unwrap();
        a.add_peer(0xBBBB, b_addr, "b".into());
        b.add_peer(0xAAAA, a_addr, "a".into());

        a.send_midi(0xBBBB, 0, vec![MidiMessage::NoteOn { channel: 3, key: 60, velocity: 100 }]).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        let (data, from) = b.try_receive_raw().unwrap().expect("datagram should have arrived");
        let received = b.handle_rtp_datagram(&data, from).unwrap();
        assert_eq!(received.peer_ssrc, 0xAAAA);
        assert_eq!(received.commands, vec![MidiMessage::NoteOn { channel: 3, key: 60, velocity: 100 }]);
    }

    #[test]
    fn sequence_numbers_increase_monotonically_per_peer() {
        let (mut a, b) = bound_pair();
        let b_addr = b.local_addr().unwrap();
        a.add_peer(0xBBBB, b_addr, "b".into());
        for _ in 0..5 {
            a.send_midi(0xBBBB, 0, vec![MidiMessage::TuneRequest]).unwrap();
        }
        assert_eq!(a.find_peer_by_ssrc(0xBBBB).unwrap().send_sequence, 5);
    }

    #[test]
    fn try_receive_raw_is_non_blocking_with_nothing_waiting() {
        let (mut a, _b) = bound_pair();
        assert!(a.try_receive_raw().unwrap().is_none());
    }

    #[test]
    fn datagrams_from_an_unknown_peer_are_rejected() {
        let (mut a, mut b) = bound_pair();
        let a_addr = a.local_addr().unwrap();
        // `b` never invited `a`: its peer table has no entry for `a`'s ssrc,
        // so the datagram below must be rejected rather than delivered.
        a.add_peer(0xBBBB, b.local_addr().unwrap(), "b".into());
        a.send_midi(0xBBBB, 0, vec![MidiMessage::TuneRequest]).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        let (data, from) = b.try_receive_raw().unwrap().expect("datagram should have arrived");
        assert_eq!(from, a_addr);
        let err = b.handle_rtp_datagram(&data, from).unwrap_err();
        assert!(matches!(err, TransportError::NoPeerSsrc(0xAAAA)));
    }
}
