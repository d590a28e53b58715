//! Error taxonomy for the RTP transport and session engine (spec §7).

use std::net::SocketAddr;
use thiserror::Error;

use rtp_midi_core::CodecError;

/// Errors from the RTP Transport layer (§4.2).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no peer registered for address {0}")]
    NoPeer(SocketAddr),
    #[error("no peer registered with ssrc {0:#010x}")]
    NoPeerSsrc(u32),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed RTP header: {0}")]
    MalformedHeader(&'static str),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors from the AppleMIDI Session Engine (§4.3).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no peer registered with ssrc {0:#010x}")]
    NoPeer(u32),
    #[error("malformed control message: {0}")]
    Protocol(&'static str),
    #[error("invitation to {0} timed out after {1} attempts")]
    InvitationTimedOut(SocketAddr, u32),
    #[error("clock sync with peer {0:#010x} timed out")]
    SyncTimedOut(u32),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("send queue full")]
    QueueFull,
}
