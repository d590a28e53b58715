pub mod control_message;
pub mod engine;
pub mod header;
pub mod journal;
pub mod message;
pub mod peer;
pub mod seqnum;
pub mod transport;
mod vlq;
