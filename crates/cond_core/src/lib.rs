pub mod consts;
pub mod errors;
pub mod platform;
pub mod page_arena;
pub mod bump_arena;
pub mod ids;
pub mod config;
pub mod fixed_table;
pub mod string_table;
pub mod rule_table;
pub mod store;

pub use bump_arena::{BumpArena, MemoryStats, TableMemory};
pub use config::{EngineConfig, StringTableConfig, TableConfig};
pub use errors::{CondError, OrFatal, Result};
pub use fixed_table::{BoolTable, CharTable, FixedTable, FloatTable, Record};
pub use ids::{
    BoolConditionId, CharConditionId, ConditionId, FloatConditionId, RuleId, StringConditionId,
};
pub use page_arena::PageArena;
pub use platform::page_size;
pub use rule_table::{Rule, RuleTable};
pub use store::{ConditionStore, Engine, Snapshot, StoreStats};
pub use string_table::{Slot, StringTable, StringTableStats};
