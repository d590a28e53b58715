use thiserror::Error;

/// Errors returned by the message codec (detect/size/get/set/encode/decode).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty buffer")]
    EmptyBuffer,
    #[error("unrecognized status byte 0x{0:02X}")]
    UnknownStatus(u8),
    #[error("buffer too short: need {needed} bytes, got {got}")]
    BufferTooShort { needed: usize, got: usize },
    #[error("output buffer too small: need {needed} bytes, got {got}")]
    InsufficientBuffer { needed: usize, got: usize },
    #[error("property {0:?} is not valid for this message variant")]
    InvalidProperty(PropertyKey),
    #[error("value {value} out of range for property {key:?} (0..={max})")]
    ValueOutOfRange { key: PropertyKey, value: u32, max: u32 },
    #[error("sysex payload allocation failed")]
    AllocFailure,
}

/// Errors from the bounded message queues (§4.4).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is at capacity")]
    Full,
}

/// Property keys accepted by `MidiMessage::get`/`set` (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Status,
    Channel,
    Key,
    Velocity,
    Pressure,
    Control,
    Value,
    ValueMsb,
    ValueLsb,
    Program,
    ManufacturerId,
    SysexSize,
    SysexFragment,
    SysexData,
    TimeCodeType,
}
