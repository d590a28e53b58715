//! Recovery Journal (RFC 6295 §6.2.2, "Enhanced" format): a rolling log of
//! recently sent MIDI commands attached to outgoing packets so a peer that
//! missed one or more datagrams can recover the lost commands out of a
//! later one, instead of waiting for a retransmit that never comes.

use std::collections::{BTreeSet, VecDeque};

use rtp_midi_core::MidiMessage;

use super::seqnum::is_after;
use super::vlq;

/// Minimum number of recent sends every peer's journal must retain.
pub const MIN_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub sequence_nr: u16,
    pub delta_time: u32,
    pub message: MidiMessage,
}

impl JournalEntry {
    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sequence_nr.to_be_bytes());
        out.extend_from_slice(&vlq::encode(self.delta_time));
        let mut wire = vec![0u8; self.message.size()];
        // Encoding only fails for an undersized buffer, which cannot happen here.
        self.message.encode(&mut wire).expect("journal entry buffer sized from message.size()");
        out.extend_from_slice(&wire);
    }

    fn parse(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < 2 {
            return None;
        }
        let sequence_nr = u16::from_be_bytes([buf[0], buf[1]]);
        let (delta_time, vlq_len) = vlq::decode(&buf[2..])?;
        let body = &buf[2 + vlq_len..];
        let message = MidiMessage::decode(body).ok()?;
        let total = 2 + vlq_len + message.size();
        Some((Self { sequence_nr, delta_time, message }, total))
    }
}

/// A single RTP-MIDI packet's recovery journal, in the "Enhanced" channel
/// journal format: one checkpoint sequence number plus every command sent
/// since then, newest first is not required — entries are kept in send
/// order (oldest to newest).
#[derive(Debug, Clone, PartialEq)]
pub struct JournalData {
    pub a_bit: bool,
    pub channel: u8,
    pub checkpoint_sequence_number: u16,
    pub entries: Vec<JournalEntry>,
}

impl JournalData {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.entries.len() * 8);
        let s_bit = 1u8 << 7;
        let a_bit = (self.a_bit as u8) << 6;
        let totchan = 1u16;
        out.push(s_bit | a_bit | ((totchan >> 8) as u8 & 0x3F));
        out.push((totchan & 0xFF) as u8);
        out.extend_from_slice(&self.checkpoint_sequence_number.to_be_bytes());
        out.push(self.channel & 0x0F);
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in &self.entries {
            entry.serialize(&mut out);
        }
        out
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 7 {
            return None;
        }
        let a_bit = (buf[0] & 0x40) != 0;
        let checkpoint_sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let channel = buf[4] & 0x0F;
        let entry_count = u16::from_be_bytes([buf[5], buf[6]]) as usize;
        let mut cursor = 7;
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let (entry, consumed) = JournalEntry::parse(&buf[cursor..])?;
            cursor += consumed;
            entries.push(entry);
        }
        Some(Self { a_bit, channel, checkpoint_sequence_number, entries })
    }
}

/// Per-peer rolling history of sent commands, used to build each outgoing
/// packet's [`JournalData`] and truncated as the peer confirms receipt via
/// `RS` feedback.
#[derive(Debug, Clone)]
pub struct RecoveryJournal {
    capacity: usize,
    entries: VecDeque<JournalEntry>,
}

impl RecoveryJournal {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(MIN_CAPACITY), entries: VecDeque::with_capacity(capacity) }
    }

    pub fn append(&mut self, sequence_nr: u16, delta_time: u32, message: MidiMessage) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(JournalEntry { sequence_nr, delta_time, message });
    }

    /// Drops every entry at or before `up_to_seq`, called when the peer's
    /// `RS` feedback confirms it has recovered everything up to that point.
    pub fn truncate(&mut self, up_to_seq: u16) {
        while let Some(front) = self.entries.front() {
            if is_after(up_to_seq, front.sequence_nr) || up_to_seq == front.sequence_nr {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Snapshots the current history as a checkpoint journal to attach to
    /// the next outgoing packet.
    pub fn snapshot(&self, channel: u8) -> Option<JournalData> {
        let checkpoint = self.entries.front()?.sequence_nr;
        Some(JournalData {
            a_bit: true,
            channel,
            checkpoint_sequence_number: checkpoint,
            entries: self.entries.iter().cloned().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Given a peer's embedded journal and the set of sequence numbers we have
/// already seen, returns the commands that recover any gap it covers, in
/// ascending sequence order.
pub fn recover_missing(journal: &JournalData, seen: &BTreeSet<u16>) -> Vec<(u16, MidiMessage)> {
    journal
        .entries
        .iter()
        .filter(|entry| !seen.contains(&entry.sequence_nr))
        .map(|entry| (entry.sequence_nr, entry.message.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(n: u8) -> MidiMessage {
        MidiMessage::NoteOn { channel: 0, key: n, velocity: 100 }
    }

    #[test]
    fn journal_data_round_trips() {
        let data = JournalData {
            a_bit: true,
            channel: 2,
            checkpoint_sequence_number: 10,
            entries: vec![
                JournalEntry { sequence_nr: 11, delta_time: 0, message: note_on(60) },
                JournalEntry { sequence_nr: 12, delta_time: 480, message: note_on(62) },
            ],
        };
        let bytes = data.serialize();
        let parsed = JournalData::parse(&bytes).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn capacity_is_raised_to_the_minimum() {
        let journal = RecoveryJournal::new(8);
        assert_eq!(journal.capacity, MIN_CAPACITY);
    }

    #[test]
    fn append_evicts_oldest_beyond_capacity() {
        let mut journal = RecoveryJournal::new(MIN_CAPACITY);
        for i in 0..(MIN_CAPACITY as u16 + 10) {
            journal.append(i, 0, note_on(60));
        }
        assert_eq!(journal.len(), MIN_CAPACITY);
        assert_eq!(journal.entries.front().unwrap().sequence_nr, 10);
    }

    #[test]
    fn truncate_drops_confirmed_entries() {
        let mut journal = RecoveryJournal::new(MIN_CAPACITY);
        for i in 0..5u16 {
            journal.append(i, 0, note_on(60));
        }
        journal.truncate(2);
        assert_eq!(journal.entries.front().unwrap().sequence_nr, 3);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn recover_missing_skips_already_seen_sequence_numbers() {
        let data = JournalData {
            a_bit: true,
            channel: 0,
            checkpoint_sequence_number: 0,
            entries: vec![
                JournalEntry { sequence_nr: 1, delta_time: 0, message: note_on(60) },
                JournalEntry { sequence_nr: 2, delta_time: 0, message: note_on(61) },
            ],
        };
        let mut seen = BTreeSet::new();
        seen.insert(1u16);
        let recovered = recover_missing(&data, &seen);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].0, 2);
    }
}
