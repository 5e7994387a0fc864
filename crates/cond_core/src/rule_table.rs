//! Explicitly invoked rules.
//!
//! A rule is any callable that reads and writes conditions through the context
//! handed to it. The table does not know which conditions a rule touches and
//! never fires one on its own: the host decides what runs and when.

use crate::config::TableConfig;
use crate::consts::RULE_RECORD_SIZE;
use crate::errors::{CondError, Result};
use crate::ids::RuleId;
use crate::platform::page_size;

pub trait Rule<C: ?Sized> {
    fn fire(&mut self, ctx: &mut C);
}

impl<C: ?Sized, F: FnMut(&mut C)> Rule<C> for F {
    fn fire(&mut self, ctx: &mut C) {
        self(ctx)
    }
}

/// Dense registry of rules over context `C`.
pub struct RuleTable<C: ?Sized> {
    rules: Vec<Box<dyn Rule<C>>>,
    max_rules: usize,
}

impl<C: ?Sized> RuleTable<C> {
    /// Room for `reserve_bytes / RULE_RECORD_SIZE` rules; `initial_pages` worth is preallocated.
    ///
    /// Rules own heap state of their own, so they live in a `Vec` rather than a
    /// page arena and `base_address` is not used.
    pub fn init(cfg: &TableConfig) -> Result<Self> {
        cfg.validate("rules")?;
        if let Some(base) = cfg.base_address {
            tracing::warn!(base, "rule tables are heap allocated, ignoring base_address");
        }
        let max_rules = cfg.reserve_bytes / RULE_RECORD_SIZE;
        if max_rules == 0 {
            return Err(CondError::InvalidConfig(format!(
                "rules: reserve_bytes must hold at least one {RULE_RECORD_SIZE}-byte rule"
            )));
        }
        let prealloc = (cfg.initial_pages * page_size() / RULE_RECORD_SIZE).min(max_rules);
        Ok(Self { rules: Vec::with_capacity(prealloc), max_rules })
    }

    pub fn add_rule(&mut self, rule: impl Rule<C> + 'static) -> Result<RuleId> {
        if self.rules.len() >= self.max_rules {
            return Err(CondError::CapacityExceeded {
                requested: (self.rules.len() + 1) * RULE_RECORD_SIZE,
                capacity: self.max_rules * RULE_RECORD_SIZE,
            });
        }
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Box::new(rule));
        tracing::trace!(rule = id.0, "added rule");
        Ok(id)
    }

    /// Invoke one rule, once.
    pub fn run_rule(&mut self, id: RuleId, ctx: &mut C) -> Result<()> {
        let len = self.rules.len() as u32;
        let rule = self
            .rules
            .get_mut(id.0 as usize)
            .ok_or(CondError::InvalidHandle { id: id.0, len })?;
        tracing::trace!(rule = id.0, "running rule");
        rule.fire(ctx);
        Ok(())
    }

    /// Invoke every rule once, in id order.
    pub fn run_all(&mut self, ctx: &mut C) {
        for rule in &mut self.rules {
            rule.fire(ctx);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn max_rules(&self) -> usize {
        self.max_rules
    }
}

impl<C: ?Sized> std::fmt::Debug for RuleTable<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTable")
            .field("len", &self.rules.len())
            .field("max_rules", &self.max_rules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OrFatal;
    use crate::fixed_table::BoolTable;

    #[test]
    fn rule_sets_conclusion_when_premises_hold() {
        let mut facts = BoolTable::init(&TableConfig::default()).unwrap();
        let a = facts.add_condition(true).unwrap();
        let b = facts.add_condition(true).unwrap();
        let c = facts.add_condition(false).unwrap();

        let mut rules: RuleTable<BoolTable> = RuleTable::init(&TableConfig::default()).unwrap();
        let r = rules
            .add_rule(move |t: &mut BoolTable| {
                if t.query_condition(a).or_fatal() && t.query_condition(b).or_fatal() {
                    t.set_condition_value(c, true).or_fatal();
                }
            })
            .unwrap();

        rules.run_rule(r, &mut facts).unwrap();
        let all: Vec<bool> = facts.iter().map(|(_, v)| v).collect();
        assert_eq!(all, vec![true, true, true]);
    }

    #[test]
    fn each_run_invokes_exactly_once() {
        let mut rules: RuleTable<u32> = RuleTable::init(&TableConfig::default()).unwrap();
        let inc = rules.add_rule(|n: &mut u32| *n += 1).unwrap();
        let dbl = rules.add_rule(|n: &mut u32| *n *= 2).unwrap();
        assert_eq!((inc, dbl), (RuleId(0), RuleId(1)));

        let mut n = 1;
        rules.run_rule(inc, &mut n).unwrap();
        assert_eq!(n, 2);
        rules.run_rule(dbl, &mut n).unwrap();
        assert_eq!(n, 4);
        rules.run_all(&mut n);
        assert_eq!(n, 10);
    }

    #[test]
    fn rules_keep_their_own_state() {
        let mut rules: RuleTable<Vec<u32>> = RuleTable::init(&TableConfig::default()).unwrap();
        let mut calls = 0;
        let r = rules
            .add_rule(move |log: &mut Vec<u32>| {
                calls += 1;
                log.push(calls);
            })
            .unwrap();
        let mut log = Vec::new();
        for _ in 0..3 {
            rules.run_rule(r, &mut log).unwrap();
        }
        assert_eq!(log, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_rule_is_invalid_handle() {
        let mut rules: RuleTable<()> = RuleTable::init(&TableConfig::default()).unwrap();
        assert!(matches!(
            rules.run_rule(RuleId(0), &mut ()),
            Err(CondError::InvalidHandle { id: 0, len: 0 })
        ));
    }

    #[test]
    fn base_address_is_accepted_but_unused() {
        let cfg = TableConfig::default().with_base(0x1000);
        let mut rules: RuleTable<u32> = RuleTable::init(&cfg).unwrap();
        let r = rules.add_rule(|n: &mut u32| *n += 1).unwrap();
        let mut n = 0;
        rules.run_rule(r, &mut n).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn reservation_bounds_the_rule_count() {
        let cfg =
            TableConfig::default().with_reserve_bytes(2 * RULE_RECORD_SIZE).with_initial_pages(0);
        let mut rules: RuleTable<()> = RuleTable::init(&cfg).unwrap();
        rules.add_rule(|_: &mut ()| {}).unwrap();
        rules.add_rule(|_: &mut ()| {}).unwrap();
        assert!(matches!(rules.add_rule(|_: &mut ()| {}), Err(CondError::CapacityExceeded { .. })));
        assert_eq!(rules.max_rules(), 2);
    }
}
