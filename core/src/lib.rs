//! Message codec, bounded queues, and configuration shared by the RTP-MIDI
//! transport and session engine (see the `rtp_midi_net` crate).

pub mod config;
pub mod error;
pub mod midi;
pub mod queue;

pub use config::{Config, ConfigError};
pub use error::{CodecError, PropertyKey, QueueError};
pub use midi::{MessageKind, MidiMessage, PropertyValue, SysexFragment};
pub use queue::BoundedQueue;

