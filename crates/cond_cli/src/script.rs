//! JSON scripts: a list of table operations run in order against one engine.
//!
//! ```json
//! { "ops": [
//!     { "op": "add_bool", "value": true },
//!     { "op": "add_bool", "value": false },
//!     { "op": "rule", "rule": { "kind": "not", "input": 0, "output": 1 } },
//!     { "op": "run_rule", "id": 0 },
//!     { "op": "query", "table": "bool", "id": 1 }
//! ] }
//! ```

use anyhow::{bail, Context, Result};
use cond_core::{ConditionId, ConditionStore, Engine, EngineConfig, OrFatal, RuleId};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Overrides `--config` when present.
    #[serde(default)]
    pub config: Option<EngineConfig>,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Bool,
    Char,
    Float,
    String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    AddBool { value: bool },
    AddChar { value: u8 },
    AddFloat { value: f32 },
    AddString { value: String },
    SetBool { id: u32, value: bool },
    SetChar { id: u32, value: u8 },
    SetFloat { id: u32, value: f32 },
    SetString { id: u32, value: String },
    Query { table: TableKind, id: u32 },
    Rule { rule: BoolRule },
    RunRule { id: u32 },
    RunAll,
    Dump,
    Stats,
}

/// Built-in rules over the bool table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoolRule {
    /// `output = inputs[0] && inputs[1] && ...`
    All { inputs: Vec<u32>, output: u32 },
    /// `output = inputs[0] || inputs[1] || ...`
    Any { inputs: Vec<u32>, output: u32 },
    Not { input: u32, output: u32 },
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::AddBool { .. } => "add_bool",
            Op::AddChar { .. } => "add_char",
            Op::AddFloat { .. } => "add_float",
            Op::AddString { .. } => "add_string",
            Op::SetBool { .. } => "set_bool",
            Op::SetChar { .. } => "set_char",
            Op::SetFloat { .. } => "set_float",
            Op::SetString { .. } => "set_string",
            Op::Query { .. } => "query",
            Op::Rule { .. } => "rule",
            Op::RunRule { .. } => "run_rule",
            Op::RunAll => "run_all",
            Op::Dump => "dump",
            Op::Stats => "stats",
        }
    }
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }
}

pub fn run(engine: &mut Engine, ops: &[Op], out: &mut impl Write) -> Result<()> {
    for (n, op) in ops.iter().enumerate() {
        apply(engine, op, out).with_context(|| format!("op #{n} ({})", op.name()))?;
    }
    Ok(())
}

fn cid<T: ?Sized>(id: u32) -> ConditionId<T> {
    ConditionId::from_index(id)
}

fn apply(engine: &mut Engine, op: &Op, out: &mut impl Write) -> Result<()> {
    let store = &mut engine.store;
    match op {
        Op::AddBool { value } => {
            let id = store.bools.add_condition(*value)?;
            writeln!(out, "bool {id} added")?;
        }
        Op::AddChar { value } => {
            let id = store.chars.add_condition(*value)?;
            writeln!(out, "char {id} added")?;
        }
        Op::AddFloat { value } => {
            let id = store.floats.add_condition(*value)?;
            writeln!(out, "float {id} added")?;
        }
        Op::AddString { value } => {
            let id = store.strings.add_condition(value)?;
            writeln!(out, "string {id} added")?;
        }
        Op::SetBool { id, value } => store.bools.set_condition_value(cid(*id), *value)?,
        Op::SetChar { id, value } => store.chars.set_condition_value(cid(*id), *value)?,
        Op::SetFloat { id, value } => store.floats.set_condition_value(cid(*id), *value)?,
        Op::SetString { id, value } => store.strings.set_condition_value(cid(*id), value)?,
        Op::Query { table, id } => {
            let id = *id;
            match table {
                TableKind::Bool => {
                    writeln!(out, "bool #{id} = {}", store.bools.query_condition(cid(id))?)?
                }
                TableKind::Char => {
                    writeln!(out, "char #{id} = {}", store.chars.query_condition(cid(id))?)?
                }
                TableKind::Float => {
                    writeln!(out, "float #{id} = {}", store.floats.query_condition(cid(id))?)?
                }
                TableKind::String => {
                    let bytes = store.strings.query_condition(cid(id))?;
                    writeln!(out, "string #{id} = {:?}", String::from_utf8_lossy(bytes))?
                }
            }
        }
        Op::Rule { rule } => {
            check_bool_ids(store, rule)?;
            let id = engine.add_rule(compile(rule.clone()))?;
            writeln!(out, "{id} added")?;
        }
        Op::RunRule { id } => engine.run_rule(RuleId(*id))?,
        Op::RunAll => engine.run_all(),
        Op::Dump => {
            serde_json::to_writer_pretty(&mut *out, &engine.store.snapshot())?;
            writeln!(out)?;
        }
        Op::Stats => {
            serde_json::to_writer_pretty(&mut *out, &engine.store.stats())?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Conditions are never freed, so ids that exist now stay valid for every later run.
fn check_bool_ids(store: &ConditionStore, rule: &BoolRule) -> Result<()> {
    let (inputs, output) = match rule {
        BoolRule::All { inputs, output } | BoolRule::Any { inputs, output } => {
            (inputs.clone(), *output)
        }
        BoolRule::Not { input, output } => (vec![*input], *output),
    };
    let len = store.bools.len();
    for id in inputs.into_iter().chain([output]) {
        if id as usize >= len {
            bail!("rule references bool #{id} but only {len} bool conditions exist");
        }
    }
    Ok(())
}

fn compile(rule: BoolRule) -> impl FnMut(&mut ConditionStore) + 'static {
    move |s: &mut ConditionStore| {
        let get = |s: &ConditionStore, id: u32| s.bools.query_condition(cid(id)).or_fatal();
        let (value, output) = match &rule {
            BoolRule::All { inputs, output } => (inputs.iter().all(|i| get(s, *i)), *output),
            BoolRule::Any { inputs, output } => (inputs.iter().any(|i| get(s, *i)), *output),
            BoolRule::Not { input, output } => (!get(s, *input), *output),
        };
        s.bools.set_condition_value(cid(output), value).or_fatal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::open(&EngineConfig::default()).unwrap()
    }

    fn parse(json: &str) -> Vec<Op> {
        let script: Script = serde_json::from_str(json).unwrap();
        script.ops
    }

    #[test]
    fn all_rule_fires_on_request() {
        let ops = parse(
            r#"{ "ops": [
                { "op": "add_bool", "value": true },
                { "op": "add_bool", "value": true },
                { "op": "add_bool", "value": false },
                { "op": "rule", "rule": { "kind": "all", "inputs": [0, 1], "output": 2 } },
                { "op": "query", "table": "bool", "id": 2 },
                { "op": "run_rule", "id": 0 },
                { "op": "query", "table": "bool", "id": 2 }
            ] }"#,
        );
        let mut e = engine();
        let mut out = Vec::new();
        run(&mut e, &ops, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("rule #0 added\nbool #2 = false\n"));
        assert!(text.ends_with("bool #2 = true\n"));
        assert_eq!(e.store.snapshot().bools, vec![true, true, true]);
    }

    #[test]
    fn string_ops_shift_later_values() {
        let ops = parse(
            r#"{ "ops": [
                { "op": "add_string", "value": "string1" },
                { "op": "add_string", "value": "string2" },
                { "op": "set_string", "id": 0, "value": "stringOneLonger" },
                { "op": "query", "table": "string", "id": 1 }
            ] }"#,
        );
        let mut e = engine();
        let mut out = Vec::new();
        run(&mut e, &ops, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("string #1 = \"string2\""));
    }

    #[test]
    fn rule_with_unknown_condition_is_rejected_up_front() {
        let ops = parse(
            r#"{ "ops": [
                { "op": "rule", "rule": { "kind": "not", "input": 0, "output": 0 } }
            ] }"#,
        );
        let mut e = engine();
        let err = run(&mut e, &ops, &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("bool #0"));
        assert_eq!(e.rule_count(), 0);
    }

    #[test]
    fn bad_handle_surfaces_with_op_context() {
        let ops = parse(r#"{ "ops": [ { "op": "set_float", "id": 3, "value": 1.0 } ] }"#);
        let err = run(&mut engine(), &ops, &mut Vec::new()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("op #0 (set_float)"));
        assert!(msg.contains("Invalid handle #3"));
    }
}
