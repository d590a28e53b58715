//! A single remote participant in an RTP-MIDI session, as tracked by the
//! transport layer (spec §3, §4.2). Clock-sync and invitation state live a
//! level up, in the Session Engine — Rust ownership replaces the reference
//! implementation's back-pointer from peer to session state.

use std::net::SocketAddr;

use super::journal::RecoveryJournal;

#[derive(Debug)]
pub struct RtpPeer {
    pub ssrc: u32,
    pub address: SocketAddr,
    pub name: String,
    pub send_sequence: u16,
    pub recv_sequence: Option<u16>,
    /// Offset (in local clock ticks) to add to our clock to estimate the
    /// peer's clock, as established by the three-round `CK` exchange.
    pub timestamp_diff: i64,
    pub journal: RecoveryJournal,
}

impl RtpPeer {
    pub fn new(ssrc: u32, address: SocketAddr, name: String) -> Self {
        Self {
            ssrc,
            address,
            name,
            send_sequence: 0,
            recv_sequence: None,
            timestamp_diff: 0,
            journal: RecoveryJournal::new(super::journal::MIN_CAPACITY),
        }
    }

    pub fn next_send_sequence(&mut self) -> u16 {
        let seq = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        seq
    }
}
