//! Record log seams.
//!
//! Processing a command never touches the log directly: follow-up records go
//! into a [`RecordBatch`], which the engine commits to the [`RecordLog`] once
//! the command has been processed without a defect.

use crate::intent::Intent;
use crate::record::{Record, RecordType, RecordValue, Rejection, RejectionType};
use crate::types::{Key, Position};

// ── Keys ──

/// Partition-prefixed, strictly increasing keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenerator {
    next: Key,
}

const PARTITION_BITS: u32 = 51;

impl KeyGenerator {
    pub fn new(partition_id: u16) -> Self {
        Self {
            next: ((partition_id as u64) << PARTITION_BITS) + 1,
        }
    }

    pub fn next_key(&mut self) -> Key {
        let key = self.next;
        self.next += 1;
        key
    }

    pub fn partition_of(key: Key) -> u16 {
        (key >> PARTITION_BITS) as u16
    }
}

// ── Writer ──

/// Appends the follow-up records of the command being processed.
/// Every append returns the position the record will have in the log.
pub trait RecordWriter {
    fn next_key(&mut self) -> Key;

    fn append_follow_up_event(&mut self, key: Key, intent: Intent, value: RecordValue)
        -> Position;

    fn append_follow_up_command(
        &mut self,
        key: Key,
        intent: Intent,
        value: RecordValue,
    ) -> Position;

    fn append_new_command(&mut self, intent: Intent, value: RecordValue) -> Position;

    fn append_rejection(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: String,
    ) -> Position;
}

/// Records produced by one command, not yet visible in the log.
pub struct RecordBatch<'k> {
    keys: &'k mut KeyGenerator,
    base_position: Position,
    records: Vec<Record>,
}

impl<'k> RecordBatch<'k> {
    /// `base_position` is the position of the last record already in the log.
    pub fn new(keys: &'k mut KeyGenerator, base_position: Position) -> Self {
        Self {
            keys,
            base_position,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn push(
        &mut self,
        key: Option<Key>,
        record_type: RecordType,
        intent: Intent,
        value: RecordValue,
        rejection: Option<Rejection>,
    ) -> Position {
        let position = self.base_position + self.records.len() as Position + 1;
        self.records.push(Record {
            position,
            key,
            record_type,
            intent,
            value,
            rejection,
        });
        position
    }
}

impl RecordWriter for RecordBatch<'_> {
    fn next_key(&mut self) -> Key {
        self.keys.next_key()
    }

    fn append_follow_up_event(
        &mut self,
        key: Key,
        intent: Intent,
        value: RecordValue,
    ) -> Position {
        self.push(Some(key), RecordType::Event, intent, value, None)
    }

    fn append_follow_up_command(
        &mut self,
        key: Key,
        intent: Intent,
        value: RecordValue,
    ) -> Position {
        self.push(Some(key), RecordType::Command, intent, value, None)
    }

    fn append_new_command(&mut self, intent: Intent, value: RecordValue) -> Position {
        self.push(None, RecordType::Command, intent, value, None)
    }

    fn append_rejection(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: String,
    ) -> Position {
        self.push(
            command.key,
            RecordType::Rejection,
            command.intent,
            command.value.clone(),
            Some(Rejection {
                rejection_type,
                reason,
            }),
        )
    }
}

// ── Log ──

pub trait RecordLog {
    /// Appends committed records; returns the position of the last one.
    fn append(&mut self, records: Vec<Record>) -> Position;

    /// Next command not yet handed out, in log order.
    fn next_command(&mut self) -> Option<Record>;

    fn last_position(&self) -> Position;

    fn records(&self) -> &[Record];
}

/// In-memory log. Positions start at 1.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    records: Vec<Record>,
    read_cursor: usize,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_after(&self, position: Position) -> &[Record] {
        let start = (position as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn has_pending_commands(&self) -> bool {
        self.records[self.read_cursor..].iter().any(Record::is_command)
    }
}

impl RecordLog for MemoryLog {
    fn append(&mut self, records: Vec<Record>) -> Position {
        for mut record in records {
            record.position = self.records.len() as Position + 1;
            self.records.push(record);
        }
        self.last_position()
    }

    fn next_command(&mut self) -> Option<Record> {
        while let Some(record) = self.records.get(self.read_cursor) {
            self.read_cursor += 1;
            if record.is_command() {
                return Some(record.clone());
            }
        }
        None
    }

    fn last_position(&self) -> Position {
        self.records.len() as Position
    }

    fn records(&self) -> &[Record] {
        &self.records
    }
}
