//! RTP-MIDI transport and AppleMIDI session engine.
//!
//! Built on top of `rtp_midi_core`'s message codec, bounded queues, and
//! configuration types. Everything here is synchronous and single-threaded:
//! the host drives the engine by calling its `tick_*` methods from its own
//! loop, rather than the engine spawning tasks of its own.

pub mod clock;
pub mod error;
pub mod midi;

pub use clock::{Clock, SystemClock};
pub use error::{SessionError, TransportError};
pub use midi::rtp::control_message::{AppleMidiCommand, AppleMidiMessage};
pub use midi::rtp::engine::{SessionEngine, SyncPhase};
pub use midi::rtp::header::RtpHeader;
pub use midi::rtp::journal::RecoveryJournal;
pub use midi::rtp::peer::RtpPeer;
pub use midi::rtp::transport::RtpSession;
