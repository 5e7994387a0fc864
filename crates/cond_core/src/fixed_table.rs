//! Fixed-size-record condition tables (bool, byte, float).
//!
//! Record `i` lives at byte offset `i * T::SIZE` of the table's arena. Tables
//! only grow by appending; records are updated in place and never freed.

use crate::bump_arena::{MemoryStats, TableMemory};
use crate::config::TableConfig;
use crate::consts::{BOOL_RECORD_SIZE, CHAR_RECORD_SIZE, FLOAT_RECORD_SIZE};
use crate::errors::{CondError, Result};
use crate::ids::ConditionId;
use byteorder::{ByteOrder, LittleEndian as LE};
use std::marker::PhantomData;

/// A value with a fixed on-arena encoding.
pub trait Record: Copy {
    const SIZE: usize;
    fn encode(self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Self;
}

impl Record for bool {
    const SIZE: usize = BOOL_RECORD_SIZE;
    fn encode(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Record for u8 {
    const SIZE: usize = CHAR_RECORD_SIZE;
    fn encode(self, out: &mut [u8]) {
        out[0] = self;
    }
    fn decode(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl Record for f32 {
    const SIZE: usize = FLOAT_RECORD_SIZE;
    fn encode(self, out: &mut [u8]) {
        LE::write_f32(out, self);
    }
    fn decode(bytes: &[u8]) -> Self {
        LE::read_f32(bytes)
    }
}

pub struct FixedTable<T: Record> {
    memory: TableMemory,
    len: u32,
    _record: PhantomData<T>,
}

pub type BoolTable = FixedTable<bool>;
pub type CharTable = FixedTable<u8>;
pub type FloatTable = FixedTable<f32>;

impl<T: Record> FixedTable<T> {
    pub fn init(cfg: &TableConfig) -> Result<Self> {
        cfg.validate("table")?;
        let memory = TableMemory::new(cfg.base_address, cfg.reserve_bytes, cfg.initial_pages)?;
        Ok(Self { memory, len: 0, _record: PhantomData })
    }

    /// Append a condition. The returned id addresses it for the table's lifetime.
    pub fn add_condition(&mut self, initial_value: T) -> Result<ConditionId<T>> {
        if self.len == u32::MAX {
            return Err(CondError::CapacityExceeded {
                requested: (self.len as usize + 1) * T::SIZE,
                capacity: self.memory.capacity(),
            });
        }
        let id = ConditionId::from_index(self.len);
        let range = self.memory.extend(T::SIZE)?;
        debug_assert_eq!(range.start, self.len as usize * T::SIZE);
        initial_value.encode(&mut self.memory.bytes_mut()[range]);
        self.len += 1;
        tracing::trace!(id = id.index(), "added condition");
        Ok(id)
    }

    pub fn query_condition(&self, id: ConditionId<T>) -> Result<T> {
        let off = self.offset_of(id)?;
        Ok(T::decode(&self.memory.bytes()[off..off + T::SIZE]))
    }

    pub fn set_condition_value(&mut self, id: ConditionId<T>, value: T) -> Result<()> {
        let off = self.offset_of(id)?;
        value.encode(&mut self.memory.bytes_mut()[off..off + T::SIZE]);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Conditions in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ConditionId<T>, T)> + '_ {
        self.memory
            .bytes()
            .chunks_exact(T::SIZE)
            .enumerate()
            .map(|(i, rec)| (ConditionId::from_index(i as u32), T::decode(rec)))
    }

    pub fn stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    fn offset_of(&self, id: ConditionId<T>) -> Result<usize> {
        if id.index() >= self.len {
            return Err(CondError::InvalidHandle { id: id.index(), len: self.len });
        }
        Ok(id.index() as usize * T::SIZE)
    }
}

impl<T: Record> std::fmt::Debug for FixedTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedTable")
            .field("len", &self.len)
            .field("memory", &self.memory)
            .finish()
    }
}
