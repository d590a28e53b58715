//! The RTP-MIDI payload carried after the 12-byte RTP header (spec §4.2):
//! one or more encoded MIDI commands, concatenated back to back. No flags
//! byte, delta-times, or embedded journal — spec.md's S3/S4 scenarios fix
//! the wire bytes exactly, and nothing beyond the encoded commands fits.

use rtp_midi_core::MidiMessage;

use crate::error::TransportError;

/// The RTP-MIDI payload: a sequence of MIDI commands, each encoded at its
/// natural size and appended directly with no delimiter between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpMidiPayload {
    pub commands: Vec<MidiMessage>,
}

impl RtpMidiPayload {
    pub fn new(commands: Vec<MidiMessage>) -> Self {
        Self { commands }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, TransportError> {
        let total: usize = self.commands.iter().map(MidiMessage::size).sum();
        let mut out = Vec::with_capacity(total);
        for command in &self.commands {
            let mut wire = vec![0u8; command.size()];
            command.encode(&mut wire)?;
            out.extend_from_slice(&wire);
        }
        Ok(out)
    }

    /// Decodes commands back to back until the buffer is exhausted.
    pub fn parse(buf: &[u8]) -> Result<Self, TransportError> {
        let mut cursor = 0;
        let mut commands = Vec::new();
        while cursor < buf.len() {
            let message = MidiMessage::decode(&buf[cursor..])?;
            cursor += message.size();
            commands.push(message);
        }
        Ok(Self { commands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtp_midi_core::MidiMessage;

    #[test]
    fn single_note_on_round_trips_as_scenario_s3() {
        let payload = RtpMidiPayload::new(vec![MidiMessage::NoteOn { channel: 3, key: 60, velocity: 100 }]);
        let bytes = payload.serialize().unwrap();
        assert_eq!(bytes, vec![0x93, 0x3C, 0x64]);
        let parsed = RtpMidiPayload::parse(&bytes).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn multiple_commands_concatenate_without_framing() {
        let payload = RtpMidiPayload::new(vec![
            MidiMessage::NoteOn { channel: 0, key: 60, velocity: 100 },
            MidiMessage::NoteOff { channel: 0, key: 60, velocity: 64 },
        ]);
        let bytes = payload.serialize().unwrap();
        assert_eq!(bytes, vec![0x90, 0x3C, 0x64, 0x80, 0x3C, 0x40]);
        let parsed = RtpMidiPayload::parse(&bytes).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn scenario_s4_raw_note_off_bytes_decode_directly() {
        let parsed = RtpMidiPayload::parse(&[0x83, 0x3C, 0x40]).unwrap();
        assert_eq!(parsed.commands, vec![MidiMessage::NoteOff { channel: 3, key: 60, velocity: 64 }]);
    }
}
