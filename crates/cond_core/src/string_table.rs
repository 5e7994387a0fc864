//! Variable-length string conditions.
//!
//! Two arenas back the table. The lookaside arena is an array of fixed-size
//! slot records, one per id, in id order. The contents arena holds the string
//! bytes back to back, also in id order:
//!
//! ```text
//! lookaside: [off=0 ext=7 len=7][off=7 ext=7 len=7][off=14 ext=7 len=7]
//! contents:  string1string2string3
//! ```
//!
//! A slot's extent is the span it owns; its length is how much of that span is
//! the current value. Extents are contiguous and never overlap. Writing a value
//! longer than the extent shifts every later slot's bytes right by the
//! difference (one bulk move) and bumps their offsets; ids never change.

use crate::bump_arena::{MemoryStats, TableMemory};
use crate::config::StringTableConfig;
use crate::consts::SLOT_RECORD_SIZE;
use crate::errors::{CondError, Result};
use crate::ids::StringConditionId;
use byteorder::{ByteOrder, LittleEndian as LE};
use serde::Serialize;
use std::ops::Range;

/// Lookaside record for one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub offset: u32,
    pub extent: u32,
    pub len: u32,
}

impl Slot {
    fn decode(rec: &[u8]) -> Self {
        Self {
            offset: LE::read_u32(&rec[0..4]),
            extent: LE::read_u32(&rec[4..8]),
            len: LE::read_u32(&rec[8..12]),
        }
    }

    fn encode(self, rec: &mut [u8]) {
        LE::write_u32(&mut rec[0..4], self.offset);
        LE::write_u32(&mut rec[4..8], self.extent);
        LE::write_u32(&mut rec[8..12], self.len);
    }

    /// Bytes of the current value.
    pub fn value_range(&self) -> Range<usize> {
        self.offset as usize..self.offset as usize + self.len as usize
    }

    /// Bytes the slot owns, value plus trailing slack.
    pub fn extent_range(&self) -> Range<usize> {
        self.offset as usize..self.offset as usize + self.extent as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StringTableStats {
    pub lookaside: MemoryStats,
    pub contents: MemoryStats,
}

#[derive(Debug)]
pub struct StringTable {
    lookaside: TableMemory,
    contents: TableMemory,
    len: u32,
}

impl StringTable {
    /// Reserve and fully commit the lookaside region, then reserve the contents
    /// region right after it (or wherever the OS likes when no base is given).
    pub fn init(cfg: &StringTableConfig) -> Result<Self> {
        cfg.validate()?;
        let lookaside = TableMemory::committed(cfg.base_address, cfg.lookaside_bytes)?;
        let contents_base = cfg.base_address.map(|b| b + cfg.lookaside_footprint());
        let contents = TableMemory::new(contents_base, cfg.contents_bytes(), cfg.initial_pages)?;
        Ok(Self { lookaside, contents, len: 0 })
    }

    pub fn add_condition(&mut self, initial_value: impl AsRef<[u8]>) -> Result<StringConditionId> {
        let value = initial_value.as_ref();
        // Both arenas are checked up front so a failed add leaves no half-written slot.
        self.lookaside.fits(SLOT_RECORD_SIZE)?;
        self.contents.fits(value.len())?;

        let offset = self.contents.push(value)?;
        let len = value.len() as u32;
        let slot = Slot { offset: offset as u32, extent: len, len };
        let mut rec = [0u8; SLOT_RECORD_SIZE];
        slot.encode(&mut rec);
        self.lookaside.push(&rec)?;

        let id = StringConditionId::from_index(self.len);
        self.len += 1;
        tracing::trace!(id = id.index(), offset, len, "added string condition");
        Ok(id)
    }

    pub fn query_condition(&self, id: StringConditionId) -> Result<&[u8]> {
        let slot = self.slot(id)?;
        Ok(&self.contents.bytes()[slot.value_range()])
    }

    pub fn query_str(&self, id: StringConditionId) -> Result<&str> {
        std::str::from_utf8(self.query_condition(id)?)
            .map_err(|_| CondError::InvalidUtf8(id.index()))
    }

    pub fn set_condition_value(
        &mut self,
        id: StringConditionId,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        let value = value.as_ref();
        let mut slot = self.slot(id)?;
        let start = slot.offset as usize;

        if value.len() <= slot.extent as usize {
            let bytes = self.contents.bytes_mut();
            bytes[start..start + value.len()].copy_from_slice(value);
            bytes[start + value.len()..slot.extent_range().end].fill(0);
            slot.len = value.len() as u32;
            self.write_slot(id.index(), slot);
            return Ok(());
        }

        let diff = value.len() - slot.extent as usize;
        let tail = slot.extent_range().end..self.contents.used();
        // Grows (and commits) before any byte moves.
        self.contents.extend(diff)?;
        let bytes = self.contents.bytes_mut();
        bytes.copy_within(tail.clone(), tail.start + diff);
        bytes[start..start + value.len()].copy_from_slice(value);

        for later in id.index() + 1..self.len {
            let mut s = self.read_slot(later);
            s.offset += diff as u32;
            self.write_slot(later, s);
        }
        slot.extent = value.len() as u32;
        slot.len = value.len() as u32;
        self.write_slot(id.index(), slot);
        tracing::debug!(
            id = id.index(),
            grew_by = diff,
            shifted_bytes = tail.len(),
            shifted_slots = self.len - id.index() - 1,
            "string slot grew"
        );
        Ok(())
    }

    /// The lookaside record for `id`.
    pub fn slot(&self, id: StringConditionId) -> Result<Slot> {
        if id.index() >= self.len {
            return Err(CondError::InvalidHandle { id: id.index(), len: self.len });
        }
        Ok(self.read_slot(id.index()))
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of the contents arena in use, slack included.
    pub fn contents_used(&self) -> usize {
        self.contents.used()
    }

    /// Conditions in id order.
    pub fn iter(&self) -> impl Iterator<Item = (StringConditionId, &[u8])> + '_ {
        let contents = self.contents.bytes();
        self.lookaside
            .bytes()
            .chunks_exact(SLOT_RECORD_SIZE)
            .enumerate()
            .map(move |(i, rec)| {
                let id = StringConditionId::from_index(i as u32);
                (id, &contents[Slot::decode(rec).value_range()])
            })
    }

    pub fn stats(&self) -> StringTableStats {
        StringTableStats { lookaside: self.lookaside.stats(), contents: self.contents.stats() }
    }

    fn read_slot(&self, index: u32) -> Slot {
        let at = index as usize * SLOT_RECORD_SIZE;
        Slot::decode(&self.lookaside.bytes()[at..at + SLOT_RECORD_SIZE])
    }

    fn write_slot(&mut self, index: u32, slot: Slot) {
        let at = index as usize * SLOT_RECORD_SIZE;
        slot.encode(&mut self.lookaside.bytes_mut()[at..at + SLOT_RECORD_SIZE]);
    }
}
