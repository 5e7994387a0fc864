use crate::consts::{
    DEFAULT_INITIAL_PAGES, DEFAULT_LOOKASIDE_BYTES, DEFAULT_SLOT_HINT, DEFAULT_TABLE_BYTES,
    SLOT_RECORD_SIZE,
};
use crate::errors::{CondError, Result};
use crate::platform::{page_size, pages_for};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

fn default_initial_pages() -> usize {
    DEFAULT_INITIAL_PAGES
}

fn default_slot_hint() -> usize {
    DEFAULT_SLOT_HINT
}

/// Placement and size of one fixed-record table (or the rule table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Where to reserve; `None` lets the OS choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_address: Option<usize>,
    pub reserve_bytes: usize,
    #[serde(default = "default_initial_pages")]
    pub initial_pages: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            base_address: None,
            reserve_bytes: DEFAULT_TABLE_BYTES,
            initial_pages: DEFAULT_INITIAL_PAGES,
        }
    }
}

impl TableConfig {
    pub fn with_base(mut self, base: usize) -> Self {
        self.base_address = Some(base);
        self
    }

    pub fn with_reserve_bytes(mut self, bytes: usize) -> Self {
        self.reserve_bytes = bytes;
        self
    }

    pub fn with_initial_pages(mut self, pages: usize) -> Self {
        self.initial_pages = pages;
        self
    }

    /// Address space the table claims, in bytes.
    pub fn footprint(&self) -> usize {
        pages_for(self.reserve_bytes) * page_size()
    }

    pub fn validate(&self, what: &str) -> Result<()> {
        if self.reserve_bytes == 0 {
            return Err(CondError::InvalidConfig(format!("{what}: reserve_bytes cannot be 0")));
        }
        if self.initial_pages > pages_for(self.reserve_bytes) {
            return Err(CondError::InvalidConfig(format!(
                "{what}: initial_pages {} exceeds the {} pages reserved",
                self.initial_pages,
                pages_for(self.reserve_bytes)
            )));
        }
        Ok(())
    }
}

/// Placement and size of the string table's two regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringTableConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_address: Option<usize>,
    /// Contents pages committed up front. The lookaside region is always fully committed.
    #[serde(default = "default_initial_pages")]
    pub initial_pages: usize,
    pub lookaside_bytes: usize,
    /// Contents bytes budgeted per lookaside slot.
    #[serde(default = "default_slot_hint")]
    pub slot_hint: usize,
}

impl Default for StringTableConfig {
    fn default() -> Self {
        Self {
            base_address: None,
            initial_pages: DEFAULT_INITIAL_PAGES,
            lookaside_bytes: DEFAULT_LOOKASIDE_BYTES,
            slot_hint: DEFAULT_SLOT_HINT,
        }
    }
}

impl StringTableConfig {
    pub fn with_base(mut self, base: usize) -> Self {
        self.base_address = Some(base);
        self
    }

    pub fn with_lookaside_bytes(mut self, bytes: usize) -> Self {
        self.lookaside_bytes = bytes;
        self
    }

    pub fn with_slot_hint(mut self, bytes: usize) -> Self {
        self.slot_hint = bytes;
        self
    }

    pub fn with_initial_pages(mut self, pages: usize) -> Self {
        self.initial_pages = pages;
        self
    }

    /// How many strings the lookaside region can index.
    pub fn max_conditions(&self) -> usize {
        self.lookaside_bytes / SLOT_RECORD_SIZE
    }

    pub fn contents_bytes(&self) -> usize {
        self.max_conditions().saturating_mul(self.slot_hint)
    }

    pub fn lookaside_footprint(&self) -> usize {
        pages_for(self.lookaside_bytes) * page_size()
    }

    /// Lookaside region followed by the contents region.
    pub fn footprint(&self) -> usize {
        self.lookaside_footprint() + pages_for(self.contents_bytes()) * page_size()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_conditions() == 0 {
            return Err(CondError::InvalidConfig(format!(
                "strings: lookaside_bytes must hold at least one {SLOT_RECORD_SIZE}-byte slot"
            )));
        }
        if self.slot_hint == 0 {
            return Err(CondError::InvalidConfig("strings: slot_hint cannot be 0".into()));
        }
        if self.contents_bytes() > u32::MAX as usize {
            return Err(CondError::InvalidConfig(format!(
                "strings: contents region of {} bytes cannot be addressed by 32-bit offsets",
                self.contents_bytes()
            )));
        }
        if self.initial_pages > pages_for(self.contents_bytes()) {
            return Err(CondError::InvalidConfig(format!(
                "strings: initial_pages {} exceeds the {} contents pages reserved",
                self.initial_pages,
                pages_for(self.contents_bytes())
            )));
        }
        Ok(())
    }
}

/// Configuration for a full set of tables.
///
/// With `base_address` set, `plan` lays every table out back to back from that
/// address, so their reservations never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_address: Option<usize>,
    #[serde(default)]
    pub bools: TableConfig,
    #[serde(default)]
    pub chars: TableConfig,
    #[serde(default)]
    pub floats: TableConfig,
    #[serde(default)]
    pub strings: StringTableConfig,
    #[serde(default)]
    pub rules: TableConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: EngineConfig = serde_json::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write via a temp file in the same directory, then rename over `path`.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut tmp = tempfile::Builder::new().prefix("cond_cfg_").tempfile_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.bools.validate("bools")?;
        self.chars.validate("chars")?;
        self.floats.validate("floats")?;
        self.strings.validate()?;
        self.rules.validate("rules")?;
        Ok(())
    }

    /// Resolve per-table base addresses.
    ///
    /// Tables that already carry an explicit base keep it; the others are placed
    /// consecutively from `base_address` in the order bools, chars, floats, strings.
    /// Without a global base every table is left to the OS.
    pub fn plan(&self) -> Result<Self> {
        let mut out = self.clone();
        let Some(mut cursor) = self.base_address else {
            return Ok(out);
        };
        let ps = page_size();
        if cursor % ps != 0 {
            return Err(CondError::InvalidConfig(format!(
                "base address {cursor:#x} is not aligned to the {ps}-byte page size"
            )));
        }
        let overflow =
            || CondError::InvalidConfig("table layout overflows the address space".into());
        for table in [&mut out.bools, &mut out.chars, &mut out.floats] {
            if table.base_address.is_none() {
                table.base_address = Some(cursor);
                cursor = cursor.checked_add(table.footprint()).ok_or_else(overflow)?;
            }
        }
        if out.strings.base_address.is_none() {
            out.strings.base_address = Some(cursor);
            cursor.checked_add(out.strings.footprint()).ok_or_else(overflow)?;
        }
        Ok(out)
    }
}
