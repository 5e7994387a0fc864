use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

use cond_core::{ConditionStore, Engine, EngineConfig, OrFatal};

mod script;

use script::Script;

/// Script or config could not be read or parsed.
const EXIT_DATAERR: u8 = 65;
/// The engine rejected an operation.
const EXIT_SOFTWARE: u8 = 70;

#[derive(Parser)]
#[command(name = "cond", about = "Condition tables over reserved pages")]
struct Cli {
    /// Engine config (JSON). Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Place the tables back to back from this address (hex, page aligned).
    #[arg(long, global = true, value_parser = parse_addr)]
    base: Option<usize>,

    /// -v for debug, -vv for trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the effective config with every table placed.
    Config {
        /// Also write the (unplanned) config here.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Run the bool rule and string resize walkthroughs.
    Demo,

    /// Run a JSON script of table operations.
    Run {
        script: PathBuf,
        /// Print memory stats after the last op.
        #[arg(long, default_value_t = false)]
        stats: bool,
    },
}

enum Failure {
    Input(anyhow::Error),
    Runtime(anyhow::Error),
}

fn parse_addr(s: &str) -> std::result::Result<usize, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    usize::from_str_radix(digits, 16).map_err(|e| format!("bad address {s:?}: {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, base: Option<usize>) -> Result<EngineConfig> {
    let mut cfg = match path {
        Some(p) => {
            EngineConfig::load(p).with_context(|| format!("loading config {}", p.display()))?
        }
        None => EngineConfig::default(),
    };
    if base.is_some() {
        cfg.base_address = base;
    }
    Ok(cfg)
}

/// Reject a config the engine would refuse before anything is reserved.
fn check_config(cfg: &EngineConfig) -> Result<EngineConfig, Failure> {
    cfg.validate()
        .and_then(|()| cfg.plan())
        .context("checking config")
        .map_err(Failure::Input)
}

fn cmd_config(cfg: &EngineConfig, save: Option<&Path>) -> Result<(), Failure> {
    let planned = check_config(cfg)?;
    let json = serde_json::to_string_pretty(&planned).map_err(|e| Failure::Runtime(e.into()))?;
    println!("{json}");
    if let Some(path) = save {
        cfg.save_atomic(path)
            .with_context(|| format!("saving config to {}", path.display()))
            .map_err(Failure::Runtime)?;
        eprintln!("config: saved {}", path.display());
    }
    Ok(())
}

fn cmd_demo(cfg: &EngineConfig) -> Result<()> {
    let mut engine = Engine::open(cfg)?;

    let s = &mut engine.store;
    let c0 = s.bools.add_condition(true)?;
    let c1 = s.bools.add_condition(true)?;
    let c2 = s.bools.add_condition(false)?;
    println!("bools before: {:?}", engine.store.snapshot().bools);
    let rule = engine.add_rule(move |s: &mut ConditionStore| {
        let both = s.bools.query_condition(c0).or_fatal() && s.bools.query_condition(c1).or_fatal();
        s.bools.set_condition_value(c2, both).or_fatal();
    })?;
    engine.run_rule(rule)?;
    println!("bools after {rule}: {:?}", engine.store.snapshot().bools);

    let strings = &mut engine.store.strings;
    let ids = [
        strings.add_condition("string1")?,
        strings.add_condition("string2")?,
        strings.add_condition("string3")?,
    ];
    strings.set_condition_value(ids[1], "string4")?;
    strings.set_condition_value(ids[0], "stringOneLonger")?;
    for id in ids {
        let slot = strings.slot(id)?;
        println!(
            "string {id} = {:?} (offset {}, extent {})",
            strings.query_str(id)?,
            slot.offset,
            slot.extent
        );
    }
    println!("{}", serde_json::to_string_pretty(&engine.store.stats())?);
    Ok(())
}

fn cmd_run(cfg: EngineConfig, path: &Path, stats: bool) -> Result<(), Failure> {
    let script = Script::load(path).map_err(Failure::Input)?;
    let cfg = script.config.unwrap_or(cfg);
    check_config(&cfg)?;
    let mut engine = Engine::open(&cfg).context("opening engine").map_err(Failure::Runtime)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    script::run(&mut engine, &script.ops, &mut out).map_err(Failure::Runtime)?;
    if stats {
        serde_json::to_writer_pretty(&mut out, &engine.store.stats())
            .map_err(|e| Failure::Runtime(anyhow!(e)))?;
        writeln!(out).map_err(|e| Failure::Runtime(e.into()))?;
    }
    tracing::debug!(ops = script.ops.len(), rules = engine.rule_count(), "script finished");
    Ok(())
}

fn dispatch(cli: Cli) -> Result<(), Failure> {
    let cfg = load_config(cli.config.as_deref(), cli.base).map_err(Failure::Input)?;
    match cli.cmd {
        Cmd::Config { save } => cmd_config(&cfg, save.as_deref()),
        Cmd::Demo => {
            check_config(&cfg)?;
            cmd_demo(&cfg).map_err(Failure::Runtime)
        }
        Cmd::Run { script, stats } => cmd_run(cfg, &script, stats),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Input(e)) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_DATAERR)
        }
        Err(Failure::Runtime(e)) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_SOFTWARE)
        }
    }
}
