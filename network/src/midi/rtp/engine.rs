//! The AppleMIDI Session Engine (spec §4.3): invitation, three-round clock
//! synchronization, teardown, and receiver feedback for every peer in a
//! session. Synchronous and single-threaded — the host drives it by
//! calling `tick_receive`/`tick_send`/`tick_idle` from its own loop (§5);
//! the engine spawns no tasks and blocks on nothing.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::Rng;
use rtp_midi_core::{BoundedQueue, MidiMessage};

use crate::clock::Clock;
use crate::error::SessionError;

use super::control_message::{AppleMidiMessage, Exit, Invitation, InvitationAccepted, ReceiverFeedback, Sync};
use super::transport::{ReceivedMidi, RtpSession};

/// Invitation round-trip timeout (spec §5).
pub const INVITATION_TIMEOUT: Duration = Duration::from_secs(5);
pub const INVITATION_MAX_ATTEMPTS: u32 = 3;
/// Clock-sync round-trip timeout (spec §5).
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(3);
/// Receiver feedback is sent at most this often per peer.
pub const FEEDBACK_MIN_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_TICK_BATCH: usize = 16;
pub const DEFAULT_SEND_BATCH: usize = 8;
/// Capacity of the engine's own in/out `BoundedQueue`s (spec §3, §4.4).
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Ck0Sent,
    Ck1Sent,
    Ck2Sent,
    Synced,
}

struct PeerSync {
    phase: SyncPhase,
    t1: u64,
    t2: u64,
    t3: u64,
    last_sync_at: Instant,
    offset: i64,
    one_way_delay: u64,
}

impl PeerSync {
    fn new(now: Instant) -> Self {
        Self { phase: SyncPhase::Idle, t1: 0, t2: 0, t3: 0, last_sync_at: now, offset: 0, one_way_delay: 0 }
    }
}

/// Invitation is a two-round handshake (spec §4.3): round one over the
/// control socket, round two over the data socket one port up. Sync never
/// starts until both rounds land.
enum InvitationState {
    /// Initiator, round one outstanding: control-port `IN` sent, no `OK` yet.
    Inviting { token: u32, attempt: u32, sent_at: Instant },
    /// Initiator, round one accepted: data-port `IN` sent, awaiting its `OK`.
    AwaitingDataAccept { token: u32, ssrc: u32, name: String },
    /// Responder, round one accepted: control-port `OK` sent, awaiting the
    /// peer's data-port `IN`.
    AwaitingDataInvite { token: u32, ssrc: u32, name: String },
    /// Both rounds complete.
    Established { name: String },
}

struct PendingPeer {
    state: InvitationState,
}

/// Drives one AppleMIDI session: a control-port socket for IN/OK/NO/BY/CK/RS
/// and a data-port [`RtpSession`] for RTP-MIDI payloads.
pub struct SessionEngine {
    local_name: String,
    local_ssrc: u32,
    control_socket: UdpSocket,
    data: RtpSession,
    clock: Box<dyn Clock>,
    pending: HashMap<SocketAddr, PendingPeer>,
    sync_state: BTreeMap<u32, PeerSync>,
    last_feedback_sent: HashMap<u32, Instant>,
    recv_buf: [u8; 2048],
    resync_period: Duration,
    in_queue: BoundedQueue<ReceivedMidi>,
    out_queue: BoundedQueue<(u32, MidiMessage)>,
}

impl SessionEngine {
    /// Binds the control socket to `control_addr` (AppleMIDI's port `P`) and
    /// the data socket to the adjacent port `P+1`, per the two-socket
    /// control+data pairing spec'd for every session participant.
    pub fn new(
        local_name: String,
        control_addr: SocketAddr,
        clock: Box<dyn Clock>,
        resync_period: Duration,
    ) -> Result<Self, SessionError> {
        let local_ssrc: u32 = rand::thread_rng().gen();
        let control_socket = UdpSocket::bind(control_addr).map_err(crate::error::TransportError::Io)?;
        control_socket.set_nonblocking(true).map_err(crate::error::TransportError::Io)?;
        let data_addr = peer_data_addr(control_socket.local_addr().map_err(crate::error::TransportError::Io)?);
        let data = RtpSession::bind(data_addr, local_ssrc)?;
        Ok(Self {
            local_name,
            local_ssrc,
            control_socket,
            data,
            clock,
            pending: HashMap::new(),
            sync_state: BTreeMap::new(),
            last_feedback_sent: HashMap::new(),
            recv_buf: [0u8; 2048],
            resync_period,
            in_queue: BoundedQueue::new(DEFAULT_QUEUE_CAPACITY),
            out_queue: BoundedQueue::new(DEFAULT_QUEUE_CAPACITY),
        })
    }

    pub fn local_ssrc(&self) -> u32 {
        self.local_ssrc
    }

    pub fn control_addr(&self) -> Result<SocketAddr, SessionError> {
        self.control_socket.local_addr().map_err(|e| crate::error::TransportError::Io(e).into())
    }

    pub fn data_addr(&self) -> Result<SocketAddr, SessionError> {
        self.data.local_addr().map_err(Into::into)
    }

    pub fn peer_ssrcs(&self) -> Vec<u32> {
        self.data.peers().map(|p| p.ssrc).collect()
    }

    /// Begins inviting a peer at `addr` (initiator side, round one of the
    /// §4.3 invitation state machine).
    pub fn invite(&mut self, addr: SocketAddr) -> Result<(), SessionError> {
        let token: u32 = rand::thread_rng().gen();
        let invitation = Invitation::new(token, self.local_ssrc, self.local_name.clone());
        self.control_socket.send_to(&invitation.serialize(), addr).map_err(crate::error::TransportError::Io)?;
        self.pending.insert(
            addr,
            PendingPeer { state: InvitationState::Inviting { token, attempt: 1, sent_at: self.clock.now() } },
        );
        info!("invited {}", addr);
        Ok(())
    }

    pub fn end_session(&mut self, peer_ssrc: u32) -> Result<(), SessionError> {
        if let Some(peer) = self.data.find_peer_by_ssrc(peer_ssrc) {
            let addr = peer.address;
            let exit = Exit::new(0, self.local_ssrc, self.local_name.clone());
            self.control_socket.send_to(&exit.serialize(), addr).map_err(crate::error::TransportError::Io)?;
        }
        self.data.remove_peer(peer_ssrc);
        self.sync_state.remove(&peer_ssrc);
        self.last_feedback_sent.remove(&peer_ssrc);
        Ok(())
    }

    pub fn sync_phase(&self, peer_ssrc: u32) -> Option<SyncPhase> {
        self.sync_state.get(&peer_ssrc).map(|s| s.phase)
    }

    /// Clock offset (in our own timestamp units) and one-way delay last
    /// established with a peer, once its phase reaches [`SyncPhase::Synced`].
    pub fn sync_stats(&self, peer_ssrc: u32) -> Option<(i64, u64)> {
        let state = self.sync_state.get(&peer_ssrc)?;
        (state.phase == SyncPhase::Synced).then_some((state.offset, state.one_way_delay))
    }

    /// Queues one command for `peer_ssrc`, to be sent on a later
    /// `tick_send`. Fails fast (drop-newest) when the out-queue is full.
    pub fn queue_outgoing(&mut self, peer_ssrc: u32, message: MidiMessage) -> Result<(), SessionError> {
        self.out_queue.push((peer_ssrc, message)).map_err(|_| SessionError::QueueFull)
    }

    /// Pops the next item the engine has assembled from incoming RTP-MIDI
    /// datagrams, in arrival order.
    pub fn pop_incoming(&mut self) -> Option<ReceivedMidi> {
        self.in_queue.pop()
    }

    /// Drains up to `max_datagrams` from each socket, dispatching control
    /// messages and queuing decoded RTP-MIDI for [`Self::pop_incoming`].
    /// The data socket is peeked for the AppleMIDI preamble before being
    /// assumed to carry RTP-MIDI (§4.3's dispatch rule) — the second
    /// `IN`/`OK` round of every invitation arrives there.
    pub fn tick_receive(&mut self, max_datagrams: usize) -> Result<(), SessionError> {
        for _ in 0..max_datagrams {
            let datagram = match self.control_socket.recv_from(&mut self.recv_buf) {
                Ok((len, from)) => (self.recv_buf[..len].to_vec(), from),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(SessionError::Transport(crate::error::TransportError::Io(e))),
            };
            self.handle_control_datagram(&datagram.0, datagram.1, false)?;
        }

        for _ in 0..max_datagrams {
            match self.data.try_receive_raw()? {
                Some((data, from)) => {
                    if AppleMidiMessage::looks_like_control(&data) {
                        if let Err(e) = self.handle_control_datagram(&data, from, true) {
                            warn!("error handling data-port control message from {}: {}", from, e);
                        }
                    } else {
                        match self.data.handle_rtp_datagram(&data, from) {
                            Ok(msg) => {
                                if self.in_queue.push(msg).is_err() {
                                    warn!("inbound queue full, dropping newest RTP-MIDI packet from {}", from);
                                }
                            }
                            Err(e) => warn!("dropping malformed or unknown-peer RTP-MIDI datagram from {}: {}", from, e),
                        }
                    }
                }
                None => break,
            }
        }
        Ok(())
    }

    /// `via_data` distinguishes the socket a control datagram arrived on,
    /// since the two-round invitation handshake replies on whichever
    /// socket the corresponding request arrived on.
    fn handle_control_datagram(&mut self, data: &[u8], from: SocketAddr, via_data: bool) -> Result<(), SessionError> {
        let message = match AppleMidiMessage::parse(data) {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping malformed AppleMIDI control message from {}: {}", from, e);
                return Ok(());
            }
        };
        match message {
            AppleMidiMessage::Invitation(inv) => {
                if via_data {
                    self.handle_data_invitation(inv, from)
                } else {
                    self.handle_invitation(inv, from)
                }
            }
            AppleMidiMessage::InvitationAccepted(ok) => {
                if via_data {
                    self.handle_data_invitation_accepted(ok, from)
                } else {
                    self.handle_invitation_accepted(ok, from)
                }
            }
            AppleMidiMessage::InvitationRejected(_) => {
                self.pending.remove(&from);
                Ok(())
            }
            AppleMidiMessage::Exit(exit) => {
                self.data.remove_peer(exit.header.ssrc);
                self.sync_state.remove(&exit.header.ssrc);
                Ok(())
            }
            AppleMidiMessage::Sync(sync) => self.handle_sync(sync, from),
            AppleMidiMessage::ReceiverFeedback(fb) => {
                if let Some(peer) = self.peer_mut(fb.ssrc) {
                    peer.journal.truncate(fb.seqnum as u16);
                }
                Ok(())
            }
        }
    }

    fn peer_mut(&mut self, ssrc: u32) -> Option<&mut super::peer::RtpPeer> {
        self.data_peers_mut().find(|p| p.ssrc == ssrc)
    }

    fn data_peers_mut(&mut self) -> impl Iterator<Item = &mut super::peer::RtpPeer> {
        self.data.peers_mut()
    }

    /// Responder, round one: the reference policy is "accept all" (§4.3).
    /// The peer is not added to the data session yet — that waits for
    /// round two's data-port `IN`.
    fn handle_invitation(&mut self, inv: Invitation, from: SocketAddr) -> Result<(), SessionError> {
        let accept = InvitationAccepted::new(inv.header.initiator_token, self.local_ssrc, self.local_name.clone());
        self.control_socket.send_to(&accept.serialize(), from).map_err(crate::error::TransportError::Io)?;
        self.pending.insert(
            from,
            PendingPeer {
                state: InvitationState::AwaitingDataInvite {
                    token: inv.header.initiator_token,
                    ssrc: inv.header.ssrc,
                    name: inv.name.clone(),
                },
            },
        );
        debug!("accepted control invitation from {} ({}); awaiting data-port invitation", from, inv.name);
        Ok(())
    }

    /// Responder, round two: the data-port `IN` that completes the
    /// handshake begun by [`Self::handle_invitation`].
    fn handle_data_invitation(&mut self, inv: Invitation, from: SocketAddr) -> Result<(), SessionError> {
        let control_addr = peer_control_addr(from);
        let matched = match self.pending.get(&control_addr) {
            Some(PendingPeer { state: InvitationState::AwaitingDataInvite { token, ssrc, name } })
                if *token == inv.header.initiator_token && *ssrc == inv.header.ssrc =>
            {
                Some(name.clone())
            }
            _ => None,
        };
        let Some(name) = matched else {
            warn!("data-port invitation from {} has no matching control-port invitation; ignoring", from);
            return Ok(());
        };
        let accept = InvitationAccepted::new(inv.header.initiator_token, self.local_ssrc, self.local_name.clone());
        self.data.send_raw(from, &accept.serialize())?;
        self.data.add_peer(inv.header.ssrc, from, name.clone());
        self.sync_state.insert(inv.header.ssrc, PeerSync::new(self.clock.now()));
        self.pending.insert(control_addr, PendingPeer { state: InvitationState::Established { name: name.clone() } });
        info!("session fully established with {} ({})", from, name);
        Ok(())
    }

    /// Initiator, round one: control-port `OK`. Sends the second, data-port
    /// `IN` rather than starting sync directly.
    fn handle_invitation_accepted(&mut self, ok: InvitationAccepted, from: SocketAddr) -> Result<(), SessionError> {
        let matches_token = matches!(
            self.pending.get(&from),
            Some(PendingPeer { state: InvitationState::Inviting { token, .. } }) if *token == ok.header.initiator_token
        );
        if !matches_token {
            return Ok(());
        }
        let data_addr = peer_data_addr(from);
        let second_invite = Invitation::new(ok.header.initiator_token, self.local_ssrc, self.local_name.clone());
        self.data.send_raw(data_addr, &second_invite.serialize())?;
        self.pending.insert(
            from,
            PendingPeer {
                state: InvitationState::AwaitingDataAccept {
                    token: ok.header.initiator_token,
                    ssrc: ok.header.ssrc,
                    name: ok.name.clone(),
                },
            },
        );
        debug!("control invitation accepted by {} ({}); sent data-port invitation to {}", from, ok.name, data_addr);
        Ok(())
    }

    /// Initiator, round two: the data-port `OK` that completes the
    /// handshake. Only now does clock sync begin.
    fn handle_data_invitation_accepted(&mut self, ok: InvitationAccepted, from: SocketAddr) -> Result<(), SessionError> {
        let control_addr = peer_control_addr(from);
        let matched = match self.pending.get(&control_addr) {
            Some(PendingPeer { state: InvitationState::AwaitingDataAccept { token, ssrc, name } })
                if *token == ok.header.initiator_token && *ssrc == ok.header.ssrc =>
            {
                Some(name.clone())
            }
            _ => None,
        };
        let Some(name) = matched else {
            warn!("data-port OK from {} has no matching pending invitation; ignoring", from);
            return Ok(());
        };
        self.data.add_peer(ok.header.ssrc, from, name.clone());
        self.sync_state.insert(ok.header.ssrc, PeerSync::new(self.clock.now()));
        self.pending.insert(control_addr, PendingPeer { state: InvitationState::Established { name: name.clone() } });
        info!("session established with {} ({})", from, name);
        self.initiate_sync(ok.header.ssrc, control_addr)
    }

    /// Sends the first round (`CK0`) of the three-round clock-sync exchange.
    fn initiate_sync(&mut self, peer_ssrc: u32, addr: SocketAddr) -> Result<(), SessionError> {
        let t1 = self.clock.timestamp(44_100);
        let sync = Sync::new(self.local_ssrc, 0, [t1, 0, 0]);
        self.control_socket.send_to(&sync.serialize(), addr).map_err(crate::error::TransportError::Io)?;
        if let Some(state) = self.sync_state.get_mut(&peer_ssrc) {
            state.phase = SyncPhase::Ck0Sent;
            state.t1 = t1;
            state.last_sync_at = self.clock.now();
        }
        Ok(())
    }

    /// Implements the exact three-round formula from spec §4.3: round 0
    /// fills t1, round 1 fills t2, round 2 fills t3 and computes the clock
    /// offset and one-way delay.
    fn handle_sync(&mut self, sync: Sync, from: SocketAddr) -> Result<(), SessionError> {
        let now = self.clock.timestamp(44_100);
        match sync.count {
            0 => {
                // We are the responder: reply CK1 echoing t1, filling our own t2.
                let reply = Sync::new(self.local_ssrc, 1, [sync.timestamps[0], now, 0]);
                self.control_socket.send_to(&reply.serialize(), from).map_err(crate::error::TransportError::Io)?;
            }
            1 => {
                // We are the initiator: had sent CK0 with our t1; this is our t2, reply CK2 with our t3.
                let entry = self.sync_state.entry(sync.ssrc).or_insert_with(|| PeerSync::new(self.clock.now()));
                entry.t1 = sync.timestamps[0];
                entry.t2 = sync.timestamps[1];
                entry.t3 = now;
                entry.phase = SyncPhase::Ck2Sent;
                let reply = Sync::new(self.local_ssrc, 2, [sync.timestamps[0], sync.timestamps[1], now]);
                self.control_socket.send_to(&reply.serialize(), from).map_err(crate::error::TransportError::Io)?;
                finalize_offset(entry);
                entry.last_sync_at = self.clock.now();
            }
            2 => {
                // We are the responder: peer sends back all three timestamps; compute our view too.
                let entry = self.sync_state.entry(sync.ssrc).or_insert_with(|| PeerSync::new(self.clock.now()));
                entry.t1 = sync.timestamps[0];
                entry.t2 = sync.timestamps[1];
                entry.t3 = sync.timestamps[2];
                finalize_offset(entry);
                entry.last_sync_at = self.clock.now();
            }
            _ => return Err(SessionError::Protocol("CK count out of range (expected 0..=2)")),
        }
        Ok(())
    }

    /// Resends timed-out invitations, re-initiates clock sync past its
    /// timeout, periodically resyncs established peers, and flushes
    /// throttled receiver feedback. No sockets block here.
    pub fn tick_idle(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now();

        let mut to_retry = Vec::new();
        let mut to_drop = Vec::new();
        for (addr, pending) in self.pending.iter() {
            if let InvitationState::Inviting { token, attempt, sent_at } = pending.state {
                if now.duration_since(sent_at) >= INVITATION_TIMEOUT {
                    if attempt >= INVITATION_MAX_ATTEMPTS {
                        to_drop.push((*addr, attempt));
                    } else {
                        to_retry.push((*addr, token, attempt + 1));
                    }
                }
            }
        }
        for (addr, attempt) in to_drop {
            self.pending.remove(&addr);
            return Err(SessionError::InvitationTimedOut(addr, attempt));
        }
        for (addr, token, attempt) in to_retry {
            let invitation = Invitation::new(token, self.local_ssrc, self.local_name.clone());
            self.control_socket.send_to(&invitation.serialize(), addr).map_err(crate::error::TransportError::Io)?;
            self.pending.insert(addr, PendingPeer { state: InvitationState::Inviting { token, attempt, sent_at: now } });
        }

        let mut sync_timeouts = Vec::new();
        let mut resync_due = Vec::new();
        for (ssrc, state) in self.sync_state.iter() {
            match state.phase {
                SyncPhase::Synced => {
                    if now.duration_since(state.last_sync_at) >= self.resync_period {
                        resync_due.push(*ssrc);
                    }
                }
                SyncPhase::Idle => {}
                _ => {
                    if now.duration_since(state.last_sync_at) >= SYNC_TIMEOUT {
                        sync_timeouts.push(*ssrc);
                    }
                }
            }
        }
        for ssrc in sync_timeouts {
            if let Some(state) = self.sync_state.get_mut(&ssrc) {
                state.phase = SyncPhase::Idle;
            }
            return Err(SessionError::SyncTimedOut(ssrc));
        }
        for ssrc in resync_due {
            if let Some(addr) = self.data.find_peer_by_ssrc(ssrc).map(|p| p.address) {
                self.initiate_sync(ssrc, peer_control_addr(addr))?;
            }
        }

        self.flush_receiver_feedback(now)
    }

    fn flush_receiver_feedback(&mut self, now: Instant) -> Result<(), SessionError> {
        let due: Vec<(u32, SocketAddr, u16)> = self
            .data
            .peers()
            .filter_map(|peer| {
                let last = self.last_feedback_sent.get(&peer.ssrc).copied();
                let due = last.map_or(true, |t| now.duration_since(t) >= FEEDBACK_MIN_INTERVAL);
                peer.recv_sequence.filter(|_| due).map(|seq| (peer.ssrc, peer.address, seq))
            })
            .collect();
        for (ssrc, addr, seq) in due {
            let fb = ReceiverFeedback::new(self.local_ssrc, seq as u32);
            self.control_socket.send_to(&fb.serialize(), peer_control_addr(addr)).map_err(crate::error::TransportError::Io)?;
            self.last_feedback_sent.insert(ssrc, now);
        }
        Ok(())
    }

    /// Sends queued outgoing MIDI, one command per packet, up to
    /// `max_batch` packets drained from the engine's own out-queue
    /// (spec §3's "two message queues", §4.4's `BoundedQueue`).
    pub fn tick_send(&mut self, timestamp: u32, max_batch: usize) -> Result<(), SessionError> {
        for _ in 0..max_batch {
            let Some((peer_ssrc, message)) = self.out_queue.pop() else { break };
            self.data.send_midi(peer_ssrc, timestamp, vec![message])?;
        }
        Ok(())
    }
}

fn finalize_offset(state: &mut PeerSync) {
    let t1 = state.t1 as i64;
    let t2 = state.t2 as i64;
    let t3 = state.t3 as i64;
    state.offset = ((t3 - t1) / 2) + (t2 - t3);
    state.one_way_delay = ((t3 - t1) / 2) as u64;
    state.phase = SyncPhase::Synced;
}

/// AppleMIDI's two-socket design pairs a peer's control port P with its
/// data port P+1; a peer reached at its control address is assumed to
/// listen for RTP-MIDI one port above it.
fn peer_data_addr(control_addr: SocketAddr) -> SocketAddr {
    let mut addr = control_addr;
    addr.set_port(control_addr.port() + 1);
    addr
}

/// Inverse of [`peer_data_addr`]: recovers a peer's control address from a
/// datagram's data-port source address, to correlate round two of the
/// invitation handshake with its round-one pending entry.
fn peer_control_addr(data_addr: SocketAddr) -> SocketAddr {
    let mut addr = data_addr;
    addr.set_port(data_addr.port() - 1);
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use rtp_midi_core::MidiMessage;
    use std::net::SocketAddr;

    fn engine_pair() -> (SessionEngine, SessionEngine, SocketAddr, SocketAddr) {
        let a = SessionEngine::new(
            "a".into(),
            "127.0.0.1:0".parse().unwrap(),
            Box::new(FakeClock::new()),
            Duration::from_secs(30),
        )
        .unwrap();
        let b = SessionEngine::new(
            "b".into(),
            "127.0.0.1:0".parse().unwrap(),
            Box::new(FakeClock::new()),
            Duration::from_secs(30),
        )
        .unwrap();
        let a_ctrl = a.control_socket.local_addr().unwrap();
        let b_ctrl = b.control_socket.local_addr().unwrap();
        (a, b, a_ctrl, b_ctrl)
    }

    fn pump(a: &mut SessionEngine, b: &mut SessionEngine, rounds: usize) {
        for _ in 0..rounds {
            std::thread::sleep(Duration::from_millis(15));
            a.tick_receive(8).unwrap();
            std::thread::sleep(Duration::from_millis(15));
            b.tick_receive(8).unwrap();
        }
    }

    #[test]
    fn invitation_handshake_completes_both_rounds_before_establishing_peers() {
        let (mut a, mut b, _a_ctrl, b_ctrl) = engine_pair();
        a.invite(b_ctrl).unwrap();
        // Round one (control): b accepts, a receives the OK and fires the
        // second, data-port IN.
        pump(&mut a, &mut b, 3);
        assert_eq!(a.data.peers().count(), 1, "peer should be added only once both rounds complete");
        assert_eq!(b.data.peers().count(), 1);
    }

    #[test]
    fn sync_phase_advances_only_after_the_second_round() {
        let (mut a, mut b, _a_ctrl, b_ctrl) = engine_pair();
        a.invite(b_ctrl).unwrap();
        pump(&mut a, &mut b, 3);
        let ssrc = b.local_ssrc();
        // `a` should have started sync with `b` once the data-port OK landed.
        assert!(a.sync_phase(ssrc).is_some());
    }

    #[test]
    fn queue_outgoing_then_tick_send_delivers_a_command() {
        let (mut a, mut b, _a_ctrl, b_ctrl) = engine_pair();
        a.invite(b_ctrl).unwrap();
        pump(&mut a, &mut b, 3);
        let b_ssrc = b.local_ssrc();
        a.queue_outgoing(b_ssrc, MidiMessage::NoteOn { channel: 0, key: 60, velocity: 100 }).unwrap();
        a.tick_send(0, 4).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        b.tick_receive(4).unwrap();
        let received = b.pop_incoming().expect("note-on should have arrived");
        assert_eq!(received.commands, vec![MidiMessage::NoteOn { channel: 0, key: 60, velocity: 100 }]);
    }

    #[test]
    fn out_queue_fails_fast_once_full() {
        let (mut a, _b, _a_ctrl, _b_ctrl) = engine_pair();
        for _ in 0..DEFAULT_QUEUE_CAPACITY {
            a.queue_outgoing(0xBEEF, MidiMessage::TuneRequest).unwrap();
        }
        assert!(a.queue_outgoing(0xBEEF, MidiMessage::TuneRequest).is_err());
    }
}
