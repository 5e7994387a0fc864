use crate::bump_arena::MemoryStats;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::fixed_table::{BoolTable, CharTable, FloatTable};
use crate::ids::RuleId;
use crate::rule_table::{Rule, RuleTable};
use crate::string_table::{StringTable, StringTableStats};
use serde::Serialize;

/// One table of each condition type, each in its own reservation.
#[derive(Debug)]
pub struct ConditionStore {
    pub bools: BoolTable,
    pub chars: CharTable,
    pub floats: FloatTable,
    pub strings: StringTable,
}

/// Plain copy of every condition value, in id order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub bools: Vec<bool>,
    pub chars: Vec<u8>,
    pub floats: Vec<f32>,
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub bools: MemoryStats,
    pub chars: MemoryStats,
    pub floats: MemoryStats,
    pub strings: StringTableStats,
}

impl ConditionStore {
    /// Validate `cfg`, lay the tables out and reserve them.
    pub fn open(cfg: &EngineConfig) -> Result<Self> {
        cfg.validate()?;
        let plan = cfg.plan()?;
        let store = Self {
            bools: BoolTable::init(&plan.bools)?,
            chars: CharTable::init(&plan.chars)?,
            floats: FloatTable::init(&plan.floats)?,
            strings: StringTable::init(&plan.strings)?,
        };
        tracing::info!(base = ?plan.base_address, "condition store ready");
        Ok(store)
    }

    /// Strings that are not UTF-8 are rendered lossily.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bools: self.bools.iter().map(|(_, v)| v).collect(),
            chars: self.chars.iter().map(|(_, v)| v).collect(),
            floats: self.floats.iter().map(|(_, v)| v).collect(),
            strings: self
                .strings
                .iter()
                .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
                .collect(),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            bools: self.bools.stats(),
            chars: self.chars.stats(),
            floats: self.floats.stats(),
            strings: self.strings.stats(),
        }
    }
}

/// A condition store plus the rules that act on it.
pub struct Engine {
    pub store: ConditionStore,
    rules: RuleTable<ConditionStore>,
}

impl Engine {
    pub fn open(cfg: &EngineConfig) -> Result<Self> {
        let store = ConditionStore::open(cfg)?;
        let rules = RuleTable::init(&cfg.rules)?;
        Ok(Self { store, rules })
    }

    pub fn add_rule(&mut self, rule: impl Rule<ConditionStore> + 'static) -> Result<RuleId> {
        self.rules.add_rule(rule)
    }

    pub fn run_rule(&mut self, id: RuleId) -> Result<()> {
        self.rules.run_rule(id, &mut self.store)
    }

    pub fn run_all(&mut self) {
        self.rules.run_all(&mut self.store)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
