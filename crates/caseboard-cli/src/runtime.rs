// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use caseboard_app::{
    ListLoader, PicklistOption, Record, SLA_TARGET_FIELD, STATUS_FIELD, SaveOperation,
    ScheduleToken, parse_deadline,
};
use caseboard_testkit::{CaseFaker, reference_now, store_datetime};
use std::collections::BTreeSet;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

pub const LAST_MODIFIED_FIELD: &str = "LastModifiedDate";

/// Everything the shell loop waits on.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Line(String),
    InputClosed,
    Tick {
        token: ScheduleToken,
        now: OffsetDateTime,
    },
}

/// In-memory record store backing the list loader and the save operation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<Record>,
}

impl MemoryStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read records file {}", path.display()))?;
        let records = Record::list_from_json(&raw)
            .with_context(|| format!("decode records file {}", path.display()))?;
        Ok(Self::new(records))
    }

    /// Seeded demo cases with SLA targets shifted so they sit around `now`.
    pub fn demo(seed: u64, count: usize, now: OffsetDateTime) -> Self {
        let shift = now - reference_now();
        let records = CaseFaker::new(seed)
            .cases(count)
            .into_iter()
            .map(|record| {
                let deadline = record
                    .text(SLA_TARGET_FIELD)
                    .and_then(|raw| parse_deadline(&raw));
                match deadline {
                    Some(deadline) => {
                        record.with_field(SLA_TARGET_FIELD, store_datetime(deadline + shift))
                    }
                    None => record,
                }
            })
            .collect();
        Self::new(records)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Distinct non-empty values of `field`, sorted, as picklist options.
    pub fn picklist(&self, field: &str) -> Vec<PicklistOption> {
        let values: BTreeSet<String> = self
            .records
            .iter()
            .filter_map(|record| record.text(field))
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.into_owned())
            .collect();
        values
            .into_iter()
            .map(|value| PicklistOption::new(value.clone(), value))
            .collect()
    }
}

impl ListLoader for MemoryStore {
    fn load(&mut self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }
}

impl SaveOperation for MemoryStore {
    fn commit(&mut self, record: &Record) -> Result<Option<Record>> {
        let Some(slot) = self
            .records
            .iter_mut()
            .find(|stored| stored.id() == record.id())
        else {
            bail!("ENTITY_IS_DELETED: record {} no longer exists", record.id());
        };
        if slot.field(STATUS_FIELD).is_some()
            && record
                .text(STATUS_FIELD)
                .is_none_or(|status| status.trim().is_empty())
        {
            bail!("REQUIRED_FIELD_MISSING: {STATUS_FIELD} cannot be blank");
        }

        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format modification time")?;
        let mut saved = record.clone();
        saved.set_field(LAST_MODIFIED_FIELD, stamp)?;
        *slot = saved.clone();
        debug!(record = %saved.id(), "record committed");
        Ok(Some(saved))
    }
}

/// Background thread sending token-stamped ticks until cancelled. Dropping
/// the handle cancels it.
#[derive(Debug)]
pub struct Ticker {
    token: ScheduleToken,
    cancelled: Arc<AtomicBool>,
}

impl Ticker {
    pub fn spawn(tx: Sender<ShellEvent>, token: ScheduleToken, interval: Duration) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        thread::spawn(move || {
            loop {
                thread::sleep(interval);
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                let event = ShellEvent::Tick {
                    token,
                    now: OffsetDateTime::now_utc(),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!(token = token.get(), "ticker stopped");
        });
        Self { token, cancelled }
    }

    pub const fn token(&self) -> ScheduleToken {
        self.token
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Forwards stdin lines to the shell loop.
pub fn spawn_input_reader(tx: Sender<ShellEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!(%error, "stdin read failed");
                    break;
                }
            };
            if tx.send(ShellEvent::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(ShellEvent::InputClosed);
    });
}
