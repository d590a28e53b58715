//! AppleMIDI session-control messages (spec §4.3): invitation, clock sync,
//! teardown, and receiver feedback. All multi-byte fields are big-endian.

use anyhow::{anyhow, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub type AppleMidiCommand = [u8; 2];

/// Common header shared by IN/OK/NO/BY/CK/RS: the 0xFFFF preamble plus the
/// two-character command code, protocol version, initiator token and ssrc.
#[derive(Debug, Clone, PartialEq)]
pub struct AppleMidiHeader {
    pub command: AppleMidiCommand,
    pub protocol_version: u16,
    pub initiator_token: u32,
    pub ssrc: u32,
}

impl AppleMidiHeader {
    const PROTOCOL_VERSION: u16 = 2;

    fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8(0xFF);
        buf.put_u8(0xFF);
        buf.put_slice(&self.command);
        buf.put_u32(self.protocol_version.into());
        buf.put_u32(self.initiator_token);
        buf.put_u32(self.ssrc);
    }

    fn parse(reader: &mut Bytes) -> Result<Self> {
        if reader.len() < 12 {
            return Err(anyhow!("AppleMIDI header too short"));
        }
        let magic0 = reader.get_u8();
        let magic1 = reader.get_u8();
        if magic0 != 0xFF || magic1 != 0xFF {
            return Err(anyhow!("invalid AppleMIDI magic bytes"));
        }
        let command = [reader.get_u8(), reader.get_u8()];
        let protocol_version = reader.get_u32() as u16;
        let initiator_token = reader.get_u32();
        let ssrc = reader.get_u32();
        if protocol_version != Self::PROTOCOL_VERSION {
            return Err(anyhow!("unsupported AppleMIDI protocol version: {}", protocol_version));
        }
        Ok(Self { command, protocol_version, initiator_token, ssrc })
    }
}

/// Spec §4.3's session-name table caps the name field at 15 characters,
/// NUL-terminated.
pub const MAX_NAME_LEN: usize = 15;

fn serialize_named_body(header: &AppleMidiHeader, name: &str) -> Bytes {
    let truncated = if name.len() > MAX_NAME_LEN { &name[..MAX_NAME_LEN] } else { name };
    let mut buf = BytesMut::with_capacity(32 + truncated.len());
    header.serialize(&mut buf);
    buf.put_slice(truncated.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

fn parse_named_body(mut reader: Bytes, expect: AppleMidiCommand) -> Result<(AppleMidiHeader, String)> {
    let header = AppleMidiHeader::parse(&mut reader)?;
    if header.command != expect {
        return Err(anyhow!("expected command {:?}, got {:?}", expect, header.command));
    }
    if reader.is_empty() || reader[reader.len() - 1] != 0 {
        return Err(anyhow!("name field is not NUL-terminated"));
    }
    let name_bytes = reader.split_to(reader.len() - 1);
    if name_bytes.len() > MAX_NAME_LEN {
        return Err(anyhow!("name field exceeds {} characters", MAX_NAME_LEN));
    }
    let name = String::from_utf8(name_bytes.to_vec())?;
    Ok((header, name))
}

/// `IN`: session invitation, sent by the initiator on both the control and
/// data ports.
#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    pub header: AppleMidiHeader,
    pub name: String,
}

impl Invitation {
    pub fn new(initiator_token: u32, ssrc: u32, name: String) -> Self {
        Self {
            header: AppleMidiHeader {
                command: *b"IN",
                protocol_version: AppleMidiHeader::PROTOCOL_VERSION,
                initiator_token,
                ssrc,
            },
            name,
        }
    }

    pub fn serialize(&self) -> Bytes {
        serialize_named_body(&self.header, &self.name)
    }

    pub fn parse(reader: Bytes) -> Result<Self> {
        let (header, name) = parse_named_body(reader, *b"IN")?;
        Ok(Self { header, name })
    }
}

/// `OK`: invitation accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct InvitationAccepted {
    pub header: AppleMidiHeader,
    pub name: String,
}

impl InvitationAccepted {
    pub fn new(initiator_token: u32, ssrc: u32, name: String) -> Self {
        Self {
            header: AppleMidiHeader {
                command: *b"OK",
                protocol_version: AppleMidiHeader::PROTOCOL_VERSION,
                initiator_token,
                ssrc,
            },
            name,
        }
    }

    pub fn serialize(&self) -> Bytes {
        serialize_named_body(&self.header, &self.name)
    }

    pub fn parse(reader: Bytes) -> Result<Self> {
        let (header, name) = parse_named_body(reader, *b"OK")?;
        Ok(Self { header, name })
    }
}

/// `NO`: invitation rejected. Same body shape as `IN` (version, token, ssrc,
/// name) — the reference commonly leaves `name` empty but the field exists
/// on the wire regardless.
#[derive(Debug, Clone, PartialEq)]
pub struct InvitationRejected {
    pub header: AppleMidiHeader,
    pub name: String,
}

impl InvitationRejected {
    pub fn new(initiator_token: u32, ssrc: u32, name: String) -> Self {
        Self {
            header: AppleMidiHeader {
                command: *b"NO",
                protocol_version: AppleMidiHeader::PROTOCOL_VERSION,
                initiator_token,
                ssrc,
            },
            name,
        }
    }

    pub fn serialize(&self) -> Bytes {
        serialize_named_body(&self.header, &self.name)
    }

    pub fn parse(reader: Bytes) -> Result<Self> {
        let (header, name) = parse_named_body(reader, *b"NO")?;
        Ok(Self { header, name })
    }
}

/// `BY`: session teardown. Same body shape as `IN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exit {
    pub header: AppleMidiHeader,
    pub name: String,
}

impl Exit {
    pub fn new(initiator_token: u32, ssrc: u32, name: String) -> Self {
        Self {
            header: AppleMidiHeader {
                command: *b"BY",
                protocol_version: AppleMidiHeader::PROTOCOL_VERSION,
                initiator_token,
                ssrc,
            },
            name,
        }
    }

    pub fn serialize(&self) -> Bytes {
        serialize_named_body(&self.header, &self.name)
    }

    pub fn parse(reader: Bytes) -> Result<Self> {
        let (header, name) = parse_named_body(reader, *b"BY")?;
        Ok(Self { header, name })
    }
}

/// `CK`: one round of the three-round clock-synchronization handshake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sync {
    pub ssrc: u32,
    pub count: u8,
    pub timestamps: [u64; 3],
}

impl Sync {
    pub const WIRE_LEN: usize = 32;

    pub fn new(ssrc: u32, count: u8, timestamps: [u64; 3]) -> Self {
        Self { ssrc, count, timestamps }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_LEN);
        buf.put_u8(0xFF);
        buf.put_u8(0xFF);
        buf.put_slice(b"CK");
        buf.put_u32(self.ssrc);
        buf.put_u8(self.count);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u64(self.timestamps[0]);
        buf.put_u64(self.timestamps[1]);
        buf.put_u64(self.timestamps[2]);
        buf.freeze()
    }

    pub fn parse(mut reader: Bytes) -> Result<Self> {
        if reader.len() < Self::WIRE_LEN {
            return Err(anyhow!("Sync message too short"));
        }
        let magic0 = reader.get_u8();
        let magic1 = reader.get_u8();
        if magic0 != 0xFF || magic1 != 0xFF {
            return Err(anyhow!("invalid AppleMIDI magic bytes"));
        }
        let command = [reader.get_u8(), reader.get_u8()];
        if command != *b"CK" {
            return Err(anyhow!("not a Sync message"));
        }
        let ssrc = reader.get_u32();
        let count = reader.get_u8();
        reader.advance(3);
        let timestamps = [reader.get_u64(), reader.get_u64(), reader.get_u64()];
        Ok(Self { ssrc, count, timestamps })
    }
}

/// `RS`: receiver feedback — the largest sequence number the receiver has
/// (re)assembled so far, driving the sender's journal truncation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiverFeedback {
    pub ssrc: u32,
    pub seqnum: u32,
}

impl ReceiverFeedback {
    pub const WIRE_LEN: usize = 12;

    pub fn new(ssrc: u32, seqnum: u32) -> Self {
        Self { ssrc, seqnum }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_LEN);
        buf.put_u8(0xFF);
        buf.put_u8(0xFF);
        buf.put_slice(b"RS");
        buf.put_u32(self.ssrc);
        buf.put_u32(self.seqnum);
        buf.freeze()
    }

    pub fn parse(mut reader: Bytes) -> Result<Self> {
        if reader.len() < Self::WIRE_LEN {
            return Err(anyhow!("ReceiverFeedback message too short"));
        }
        let magic0 = reader.get_u8();
        let magic1 = reader.get_u8();
        if magic0 != 0xFF || magic1 != 0xFF {
            return Err(anyhow!("invalid AppleMIDI magic bytes"));
        }
        let command = [reader.get_u8(), reader.get_u8()];
        if command != *b"RS" {
            return Err(anyhow!("not a ReceiverFeedback message"));
        }
        let ssrc = reader.get_u32();
        let seqnum = reader.get_u32();
        Ok(Self { ssrc, seqnum })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppleMidiMessage {
    Invitation(Invitation),
    InvitationAccepted(InvitationAccepted),
    InvitationRejected(InvitationRejected),
    Exit(Exit),
    Sync(Sync),
    ReceiverFeedback(ReceiverFeedback),
}

impl AppleMidiMessage {
    /// Peeks a datagram for the 0xFFFF preamble and a recognized command
    /// code, without fully parsing it. The data socket uses this to route
    /// AppleMIDI control frames (the second `IN`/`OK` round, `CK`, `RS`,
    /// `BY`) away from the RTP-MIDI path per spec §4.3's dispatch rule.
    pub fn looks_like_control(data: &[u8]) -> bool {
        if data.len() < 4 || data[0] != 0xFF || data[1] != 0xFF {
            return false;
        }
        matches!(&[data[2], data[3]], b"IN" | b"OK" | b"NO" | b"BY" | b"CK" | b"RS")
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let reader = Bytes::copy_from_slice(data);
        if reader.len() < 4 {
            return Err(anyhow!("message too short for command detection"));
        }
        let command_bytes = [reader[2], reader[3]];
        match &command_bytes {
            b"IN" => Ok(AppleMidiMessage::Invitation(Invitation::parse(reader)?)),
            b"OK" => Ok(AppleMidiMessage::InvitationAccepted(InvitationAccepted::parse(reader)?)),
            b"NO" => Ok(AppleMidiMessage::InvitationRejected(InvitationRejected::parse(reader)?)),
            b"BY" => Ok(AppleMidiMessage::Exit(Exit::parse(reader)?)),
            b"CK" => Ok(AppleMidiMessage::Sync(Sync::parse(reader)?)),
            b"RS" => Ok(AppleMidiMessage::ReceiverFeedback(ReceiverFeedback::parse(reader)?)),
            _ => Err(anyhow!("unknown AppleMIDI command: {:?}", command_bytes)),
        }
    }

    pub fn serialize(&self) -> Bytes {
        match self {
            AppleMidiMessage::Invitation(msg) => msg.serialize(),
            AppleMidiMessage::InvitationAccepted(msg) => msg.serialize(),
            AppleMidiMessage::InvitationRejected(msg) => msg.serialize(),
            AppleMidiMessage::Exit(msg) => msg.serialize(),
            AppleMidiMessage::Sync(msg) => msg.serialize(),
            AppleMidiMessage::ReceiverFeedback(msg) => msg.serialize(),
        }
    }
}
