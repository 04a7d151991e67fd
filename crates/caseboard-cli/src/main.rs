// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;
mod shell;

use anyhow::{Context, Result, anyhow};
use caseboard_app::{Console, FilterSet, ListKind, RecordId, RecordList};
use caseboard_testkit::{CaseFaker, demo_user};
use config::Config;
use runtime::{MemoryStore, spawn_input_reader};
use shell::Shell;
use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_SEED: u64 = 42;
const DEMO_RECORDS: usize = 24;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `caseboard --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;
    init_logging(&config)?;

    let kind = config.list_kind()?;
    let tick_interval = config.tick_interval()?;
    let defaults = config.default_filters()?;
    let mut list = RecordList::new(FilterSet::for_list(kind), config.page_size())
        .with_defaults(defaults.iter().map(|(key, value)| (key.as_str(), value.clone())))
        .with_context(|| {
            format!(
                "invalid [list].default_filters in {}",
                options.config_path.display()
            )
        })?;
    let user = match config.current_user() {
        Some(user) => Some(user),
        None if options.demo => Some(demo_user()),
        None => None,
    };
    if let Some(user) = user {
        list = list.with_current_user(user);
    }

    let store = match (&options.records_path, options.demo) {
        (Some(path), _) => MemoryStore::from_json_file(path)?,
        (None, true) => demo_store(kind, OffsetDateTime::now_utc()),
        (None, false) => {
            return Err(anyhow!(
                "no records to show; pass --records <file.json> or --demo"
            ));
        }
    };
    if options.check_only {
        return Ok(());
    }

    info!(
        kind = kind.as_str(),
        records = store.records().len(),
        "console starting"
    );
    let console = Console::new(list).with_deadline_field(config.deadline_field());
    let (tx, rx) = mpsc::channel();
    spawn_input_reader(tx.clone());
    let mut shell = Shell::new(console, store, kind, tick_interval, tx, io::stdout());
    shell::run(&mut shell, &rx)
}

/// `CASEBOARD_LOG` wins over `[logging].filter`.
fn init_logging(config: &Config) -> Result<()> {
    let filter = match env::var("CASEBOARD_LOG") {
        Ok(raw) if !raw.trim().is_empty() => {
            EnvFilter::try_new(&raw).with_context(|| format!("invalid CASEBOARD_LOG {raw:?}"))?
        }
        _ => EnvFilter::try_new(config.log_filter())
            .with_context(|| format!("invalid [logging].filter {:?}", config.log_filter()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

fn demo_store(kind: ListKind, now: OffsetDateTime) -> MemoryStore {
    match kind {
        ListKind::Cases => MemoryStore::demo(DEMO_SEED, DEMO_RECORDS, now),
        ListKind::CaseActivities => {
            let case_id = RecordId::new("500000000000000001");
            MemoryStore::new(CaseFaker::new(DEMO_SEED).activities(&case_id, DEMO_RECORDS))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    records_path: Option<PathBuf>,
    print_config_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        records_path: None,
        print_config_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--records" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--records requires a JSON file path"))?;
                options.records_path = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("caseboard");
    println!("  --config <path>          Use a specific config path");
    println!("  --records <path>         Load records from a JSON array file");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Launch with seeded demo records (in-memory)");
    println!("  --check                  Validate config and records, then exit");
    println!("  --help                   Show this help");
    println!();
    println!("Set CASEBOARD_LOG to override the [logging] filter.");
}
