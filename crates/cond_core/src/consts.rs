// crates/cond_core/src/consts.rs

use core::mem::size_of;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;
pub const GIB: usize = 1024 * MIB;

/// Used when the OS cannot report its page size.
pub const FALLBACK_PAGE_SIZE: usize = 4 * KIB;

pub const BOOL_RECORD_SIZE: usize = 1;
pub const CHAR_RECORD_SIZE: usize = 1;
pub const FLOAT_RECORD_SIZE: usize = 4;

/// Lookaside slot record: offset(4) extent(4) len(4), little endian.
pub const SLOT_RECORD_SIZE: usize = 12;

/// Average contents bytes budgeted per lookaside slot when sizing the contents reservation.
pub const DEFAULT_SLOT_HINT: usize = 32;

/// One boxed rule.
pub const RULE_RECORD_SIZE: usize = size_of::<Box<dyn FnMut()>>();

pub const DEFAULT_TABLE_BYTES: usize = MIB;
pub const DEFAULT_LOOKASIDE_BYTES: usize = 4 * KIB;
pub const DEFAULT_INITIAL_PAGES: usize = 1;

const _: () = { assert!(SLOT_RECORD_SIZE == 3 * size_of::<u32>()); };
const _: () = { assert!(FLOAT_RECORD_SIZE == size_of::<f32>()); };
