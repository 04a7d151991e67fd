// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use caseboard_app::{
    ACTIVITY_TYPE_FIELD, CASE_NUMBER_FIELD, CONTACT_FIELD, CONTEXT_FIELD, Console,
    ConsoleCommand, ConsoleEvent, FieldValue, FilterValue, ListKind, PRIORITY_FIELD,
    PicklistOption, PredicateKind, RecordId, STATUS_FIELD, SlotStatus,
};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

use crate::runtime::{MemoryStore, ShellEvent, Ticker};

const CASE_COLUMNS: [&str; 4] = [CASE_NUMBER_FIELD, STATUS_FIELD, PRIORITY_FIELD, CONTACT_FIELD];
const ACTIVITY_COLUMNS: [&str; 2] = [ACTIVITY_TYPE_FIELD, CONTEXT_FIELD];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Filter { key: String, value: Option<String> },
    Options(String),
    Reset,
    Next,
    Previous,
    Show,
    Select(String),
    Edit,
    Set { field: String, value: String },
    Save,
    Cancel,
    Countdown,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>> {
    let line = line.trim();
    let Some((verb, rest)) = split_word(line) else {
        return Ok(None);
    };

    let command = match verb {
        "filter" | "f" => {
            let (key, value) =
                split_word(rest).ok_or_else(|| anyhow!("usage: filter <key> [value]"))?;
            ShellCommand::Filter {
                key: key.to_owned(),
                value: (!value.is_empty()).then(|| value.to_owned()),
            }
        }
        "options" => {
            if rest.is_empty() {
                bail!("usage: options <key>");
            }
            ShellCommand::Options(rest.to_owned())
        }
        "reset" => ShellCommand::Reset,
        "next" | "n" => ShellCommand::Next,
        "prev" | "previous" | "p" => ShellCommand::Previous,
        "show" | "ls" => ShellCommand::Show,
        "select" | "open" => {
            if rest.is_empty() {
                bail!("usage: select <id|row>");
            }
            ShellCommand::Select(rest.to_owned())
        }
        "edit" => ShellCommand::Edit,
        "set" => {
            let (field, value) =
                split_word(rest).ok_or_else(|| anyhow!("usage: set <field> <value>"))?;
            ShellCommand::Set {
                field: field.to_owned(),
                value: value.to_owned(),
            }
        }
        "save" => ShellCommand::Save,
        "cancel" => ShellCommand::Cancel,
        "countdown" | "sla" => ShellCommand::Countdown,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        unknown => bail!("unknown command {unknown:?}; type `help` for the command list"),
    };
    Ok(Some(command))
}

fn split_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    Some(match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    })
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => bail!("expected on/off, got {raw:?}"),
    }
}

/// Line-driven front end over a [`Console`].
pub struct Shell<W: Write> {
    console: Console,
    store: MemoryStore,
    columns: &'static [&'static str],
    tick_interval: Duration,
    tick_tx: Sender<ShellEvent>,
    ticker: Option<Ticker>,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(
        console: Console,
        store: MemoryStore,
        kind: ListKind,
        tick_interval: Duration,
        tick_tx: Sender<ShellEvent>,
        out: W,
    ) -> Self {
        let columns: &'static [&'static str] = match kind {
            ListKind::Cases => &CASE_COLUMNS,
            ListKind::CaseActivities => &ACTIVITY_COLUMNS,
        };
        Self {
            console,
            store,
            columns,
            tick_interval,
            tick_tx,
            ticker: None,
            out,
        }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Loads the list, offers picklists for the choice filters and prints
    /// the first page.
    pub fn start(&mut self) -> Result<()> {
        let events = self.console.reload(&mut self.store)?;
        self.load_options();
        self.apply(events)
    }

    fn load_options(&mut self) {
        let choices: Vec<(String, Vec<PicklistOption>)> = self
            .console
            .list()
            .filters()
            .specs()
            .iter()
            .filter_map(|spec| {
                let values = self.store.picklist(&spec.field);
                match spec.kind {
                    PredicateKind::OpenStatus => {
                        Some((spec.key.clone(), PicklistOption::status_options(values)))
                    }
                    PredicateKind::Exact => Some((spec.key.clone(), values)),
                    PredicateKind::Contains { .. } | PredicateKind::Ownership => None,
                }
            })
            .collect();
        for (key, options) in choices {
            self.console.dispatch(ConsoleCommand::SetOptions { key, options });
        }
    }

    pub fn handle(&mut self, event: ShellEvent) -> Result<Flow> {
        match event {
            ShellEvent::Line(line) => self.handle_line(&line),
            ShellEvent::InputClosed => Ok(Flow::Quit),
            ShellEvent::Tick { token, now } => {
                let events = self.console.dispatch(ConsoleCommand::Tick { token, now });
                self.apply(events)?;
                Ok(Flow::Continue)
            }
        }
    }

    pub fn finish(&mut self) {
        self.ticker = None;
        self.console.dispose();
    }

    fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(error) => {
                writeln!(self.out, "error: {error:#}")?;
                return Ok(Flow::Continue);
            }
        };
        debug!(?command, "shell command");

        let events = match command {
            ShellCommand::Quit => return Ok(Flow::Quit),
            ShellCommand::Help => {
                self.print_help()?;
                return Ok(Flow::Continue);
            }
            ShellCommand::Show => {
                self.render_window()?;
                return Ok(Flow::Continue);
            }
            ShellCommand::Countdown => {
                self.render_countdown()?;
                return Ok(Flow::Continue);
            }
            ShellCommand::Options(key) => {
                self.render_options(&key)?;
                return Ok(Flow::Continue);
            }
            ShellCommand::Filter { key, value } => match self.filter_value(&key, value) {
                Ok(value) => self.console.dispatch(ConsoleCommand::SetFilter { key, value }),
                Err(error) => {
                    writeln!(self.out, "error: {error:#}")?;
                    return Ok(Flow::Continue);
                }
            },
            ShellCommand::Reset => self.console.dispatch(ConsoleCommand::ResetFilters),
            ShellCommand::Next => self.page(ConsoleCommand::NextPage, "already on the last page")?,
            ShellCommand::Previous => {
                self.page(ConsoleCommand::PreviousPage, "already on the first page")?
            }
            ShellCommand::Select(target) => {
                let id = self.resolve_target(&target);
                self.console.dispatch(ConsoleCommand::Select(id))
            }
            ShellCommand::Edit => self.console.dispatch(ConsoleCommand::BeginEdit),
            ShellCommand::Set { field, value } => self.console.dispatch(ConsoleCommand::EditField {
                field,
                value: FieldValue::Text(value),
            }),
            ShellCommand::Save => self.console.save_with(&mut self.store),
            ShellCommand::Cancel => self.console.dispatch(ConsoleCommand::CancelEdit),
        };
        self.apply(events)?;
        Ok(Flow::Continue)
    }

    fn page(&mut self, command: ConsoleCommand, at_edge: &str) -> Result<Vec<ConsoleEvent>> {
        let events = self.console.dispatch(command);
        if events.is_empty() {
            writeln!(self.out, "{at_edge}")?;
        }
        Ok(events)
    }

    fn filter_value(&self, key: &str, raw: Option<String>) -> Result<FilterValue> {
        let Some(spec) = self.console.list().filters().spec(key) else {
            return Ok(FilterValue::Text(raw.unwrap_or_default()));
        };
        match raw {
            None => Ok(spec.unset_value()),
            Some(raw) if spec.kind.takes_flag() => Ok(FilterValue::Flag(parse_flag(&raw)?)),
            Some(raw) => Ok(FilterValue::Text(raw)),
        }
    }

    /// A loaded record id wins; otherwise a number picks a row as printed.
    fn resolve_target(&self, target: &str) -> RecordId {
        let id = RecordId::new(target);
        if self.console.list().record(&id).is_some() {
            return id;
        }
        let list = self.console.list();
        target
            .parse::<usize>()
            .ok()
            .and_then(|row| row.checked_sub(list.row_offset() + 1))
            .and_then(|index| list.current_window().get(index).map(|record| record.id().clone()))
            .unwrap_or(id)
    }

    fn apply(&mut self, events: Vec<ConsoleEvent>) -> Result<()> {
        let mut queue = VecDeque::from(events);
        while let Some(event) = queue.pop_front() {
            match event {
                ConsoleEvent::WindowChanged { .. } => self.render_window()?,
                ConsoleEvent::SelectionChanged(_) => self.render_detail()?,
                ConsoleEvent::SelectionRevoked(id) => {
                    writeln!(self.out, "selection stays on {id}")?;
                }
                ConsoleEvent::SlotUpdated(status) => self.render_slot(&status)?,
                ConsoleEvent::Notify(notification) => writeln!(
                    self.out,
                    "[{}] {}: {}",
                    notification.severity.as_str(),
                    notification.title,
                    notification.message
                )?,
                ConsoleEvent::RefreshRequested(id) => {
                    debug!(record = %id, "reloading after save");
                    queue.extend(self.console.reload(&mut self.store)?);
                }
                ConsoleEvent::SaveRequested(ticket) => {
                    writeln!(self.out, "saving {}...", ticket.record().id())?;
                }
                ConsoleEvent::CountdownArmed(token) => {
                    self.ticker = Some(Ticker::spawn(
                        self.tick_tx.clone(),
                        token,
                        self.tick_interval,
                    ));
                    queue.extend(self.console.dispatch(ConsoleCommand::Tick {
                        token,
                        now: OffsetDateTime::now_utc(),
                    }));
                }
                ConsoleEvent::CountdownCleared => self.ticker = None,
                ConsoleEvent::CountdownTick(_) => {}
                ConsoleEvent::CountdownExpired => {
                    self.ticker = None;
                    let id = self
                        .console
                        .selected()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    writeln!(self.out, "[warning] SLA target passed for {id}")?;
                }
            }
        }
        Ok(())
    }

    fn render_window(&mut self) -> Result<()> {
        let list = self.console.list();
        let page = if list.page_count() == 0 {
            0
        } else {
            list.page_index() + 1
        };
        writeln!(
            self.out,
            "page {page}/{} | {} of {} records | {} filters active",
            list.page_count(),
            list.filtered_count(),
            list.source_len(),
            list.active_filter_count()
        )?;

        let window = list.current_window();
        if window.is_empty() {
            writeln!(self.out, "  (no records match the current filters)")?;
        }
        for (index, record) in window.into_iter().enumerate() {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|column| {
                    record
                        .field(column)
                        .map(FieldValue::display)
                        .unwrap_or_default()
                })
                .collect();
            writeln!(
                self.out,
                "{:>4}. {}  {}",
                list.row_offset() + index + 1,
                record.id(),
                cells.join(" | ")
            )?;
        }
        Ok(())
    }

    fn render_detail(&mut self) -> Result<()> {
        let Some(record) = self.console.binder().draft() else {
            return Ok(());
        };
        writeln!(self.out, "== {} ==", record.id())?;
        for (name, value) in record.fields() {
            writeln!(self.out, "  {name}: {}", value.display())?;
        }
        Ok(())
    }

    fn render_slot(&mut self, status: &SlotStatus) -> Result<()> {
        let Some(id) = &status.record else {
            return Ok(());
        };
        let mut flags = Vec::new();
        if status.editing {
            flags.push("editing");
        }
        if status.dirty {
            flags.push("unsaved changes");
        }
        if status.saving {
            flags.push(self.console.binder().save_label());
        }
        if flags.is_empty() {
            flags.push("clean");
        }
        writeln!(self.out, "{id}: {}", flags.join(", "))?;
        Ok(())
    }

    fn render_countdown(&mut self) -> Result<()> {
        let countdown = self.console.countdown();
        match countdown.deadline() {
            None => writeln!(self.out, "no SLA target on the selected record")?,
            Some(deadline) if countdown.is_expired() => {
                writeln!(self.out, "SLA target {deadline} has passed")?;
            }
            Some(deadline) => writeln!(
                self.out,
                "{} remaining until {deadline}",
                countdown.breakdown()
            )?,
        }
        Ok(())
    }

    fn render_options(&mut self, key: &str) -> Result<()> {
        let options = self.console.list().options(key);
        if options.is_empty() {
            writeln!(self.out, "no choices for {key:?}")?;
            return Ok(());
        }
        let labels: Vec<&str> = options.iter().map(|option| option.label.as_str()).collect();
        writeln!(self.out, "{key}: {}", labels.join(", "))?;
        Ok(())
    }

    fn print_help(&mut self) -> Result<()> {
        writeln!(self.out, "commands:")?;
        writeln!(self.out, "  filter <key> [value]   set a filter; no value clears it")?;
        writeln!(self.out, "  options <key>          list the choices for a filter")?;
        writeln!(self.out, "  reset                  clear every filter")?;
        writeln!(self.out, "  next | prev            move between pages")?;
        writeln!(self.out, "  show                   print the current page")?;
        writeln!(self.out, "  select <id|row>        open a record")?;
        writeln!(self.out, "  edit                   enter edit mode")?;
        writeln!(self.out, "  set <field> <value>    change a field on the open record")?;
        writeln!(self.out, "  save | cancel          commit or discard edits")?;
        writeln!(self.out, "  countdown              time left until the SLA target")?;
        writeln!(self.out, "  quit                   leave")?;
        let keys: Vec<&str> = self
            .console
            .list()
            .filters()
            .specs()
            .iter()
            .map(|spec| spec.key.as_str())
            .collect();
        writeln!(self.out, "filters: {}", keys.join(", "))?;
        Ok(())
    }
}

/// Drives `shell` from `events` until quit or end of input.
pub fn run<W: Write>(shell: &mut Shell<W>, events: &Receiver<ShellEvent>) -> Result<()> {
    shell.start()?;
    while let Ok(event) = events.recv() {
        let is_line = matches!(event, ShellEvent::Line(_));
        if shell.handle(event)? == Flow::Quit {
            break;
        }
        if is_line {
            write!(shell.out, "> ")?;
            shell.out.flush()?;
        }
    }
    shell.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Flow, Shell, ShellCommand, parse_command};
    use crate::runtime::{MemoryStore, ShellEvent};
    use anyhow::Result;
    use caseboard_app::{Console, FilterSet, ListKind, RecordList, UserId};
    use caseboard_testkit::{case, owned_case};
    use std::num::NonZeroUsize;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;
    use time::OffsetDateTime;

    fn shell(records: Vec<caseboard_app::Record>) -> (Shell<Vec<u8>>, Receiver<ShellEvent>) {
        let page_size = NonZeroUsize::new(2).expect("non-zero page size");
        let list = RecordList::new(FilterSet::for_list(ListKind::Cases), page_size)
            .with_current_user(UserId::new("005A"));
        let (tx, rx) = mpsc::channel();
        let shell = Shell::new(
            Console::new(list),
            MemoryStore::new(records),
            ListKind::Cases,
            Duration::from_secs(60),
            tx,
            Vec::new(),
        );
        (shell, rx)
    }

    fn line(shell: &mut Shell<Vec<u8>>, input: &str) -> Result<String> {
        let before = shell.output().len();
        shell.handle(ShellEvent::Line(input.to_owned()))?;
        Ok(String::from_utf8_lossy(&shell.output()[before..]).into_owned())
    }

    fn records() -> Vec<caseboard_app::Record> {
        vec![
            owned_case("1", "Open", "005A"),
            owned_case("2", "Closed", "005A"),
            owned_case("3", "Open", "005B"),
            case("4", "Working").with_field("SLATarget", "2099-01-01T00:00:00.000+0000"),
        ]
    }

    #[test]
    fn parse_command_handles_arguments() -> Result<()> {
        assert_eq!(parse_command("   ")?, None);
        assert_eq!(
            parse_command("filter status Not Closed")?,
            Some(ShellCommand::Filter {
                key: "status".to_owned(),
                value: Some("Not Closed".to_owned()),
            })
        );
        assert_eq!(
            parse_command("filter contact")?,
            Some(ShellCommand::Filter {
                key: "contact".to_owned(),
                value: None,
            })
        );
        assert_eq!(
            parse_command("set Subject  Printer on fire ")?,
            Some(ShellCommand::Set {
                field: "Subject".to_owned(),
                value: "Printer on fire".to_owned(),
            })
        );
        assert_eq!(parse_command("q")?, Some(ShellCommand::Quit));
        Ok(())
    }

    #[test]
    fn parse_command_rejects_unknown_and_incomplete_input() {
        let error = parse_command("frobnicate").expect_err("unknown verb");
        assert!(error.to_string().contains("help"));
        assert!(parse_command("select").is_err());
        assert!(parse_command("filter").is_err());
        assert!(parse_command("set").is_err());
    }

    #[test]
    fn start_prints_the_first_page() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;
        let output = String::from_utf8_lossy(shell.output()).into_owned();
        assert!(output.contains("page 1/2 | 4 of 4 records | 0 filters active"));
        assert!(output.contains("   1. 1 "));
        assert!(output.contains("| Open |"));
        Ok(())
    }

    #[test]
    fn filters_and_paging() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;

        let output = line(&mut shell, "filter status Not Closed")?;
        assert!(output.contains("3 of 4 records | 1 filters active"));

        let output = line(&mut shell, "filter mine on")?;
        assert!(output.contains("1 of 4 records | 2 filters active"));

        let output = line(&mut shell, "filter mine maybe")?;
        assert!(output.contains("expected on/off"));

        line(&mut shell, "reset")?;
        assert_eq!(shell.console().list().active_filter_count(), 0);

        let output = line(&mut shell, "next")?;
        assert!(output.contains("page 2/2"));
        let output = line(&mut shell, "next")?;
        assert!(output.contains("already on the last page"));
        Ok(())
    }

    #[test]
    fn options_come_from_the_loaded_records() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;

        let output = line(&mut shell, "options status")?;
        assert!(output.contains("status: Not Closed, Closed, Open, Working"));
        let output = line(&mut shell, "options contact")?;
        assert!(output.contains("no choices"));
        Ok(())
    }

    #[test]
    fn unknown_filter_reports_a_warning() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;
        let output = line(&mut shell, "filter bogus x")?;
        assert!(output.contains("[warning] Filter not applied"));
        Ok(())
    }

    #[test]
    fn select_by_row_number_and_guard_against_switching() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;

        let output = line(&mut shell, "select 2")?;
        assert!(output.contains("== 2 =="));

        line(&mut shell, "edit")?;
        let output = line(&mut shell, "set Status Reopened")?;
        assert!(output.contains("2: editing, unsaved changes"));

        let output = line(&mut shell, "select 1")?;
        assert!(output.contains("selection stays on 2"));
        assert!(output.contains("[warning] Unsaved changes"));

        let output = line(&mut shell, "save")?;
        assert!(output.contains("saving 2..."));
        assert!(output.contains("[success]"));
        assert_eq!(
            shell
                .console()
                .list()
                .record(&"2".into())
                .and_then(|record| record.text("Status"))
                .as_deref(),
            Some("Reopened")
        );

        let output = line(&mut shell, "select 1")?;
        assert!(output.contains("== 1 =="));
        Ok(())
    }

    #[test]
    fn failed_save_keeps_the_draft() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;
        line(&mut shell, "select 1")?;
        line(&mut shell, "edit")?;
        line(&mut shell, "set Status  ")?;
        let output = line(&mut shell, "save")?;
        assert!(output.contains("[error] Save failed"));
        assert!(output.contains("REQUIRED_FIELD_MISSING"));
        assert!(shell.console().slot_status().dirty);

        let output = line(&mut shell, "cancel")?;
        assert!(output.contains("1: clean"));
        Ok(())
    }

    #[test]
    fn countdown_reports_remaining_time() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        shell.start()?;

        let output = line(&mut shell, "countdown")?;
        assert!(output.contains("no SLA target"));

        line(&mut shell, "select 4")?;
        let token = shell.console().countdown().schedule().expect("countdown armed");
        let output = line(&mut shell, "countdown")?;
        assert!(output.contains("remaining until"));

        shell.handle(ShellEvent::Tick {
            token,
            now: OffsetDateTime::now_utc() + time::Duration::days(365 * 100),
        })?;
        let output = String::from_utf8_lossy(shell.output()).into_owned();
        assert!(output.contains("SLA target passed for 4"));
        let output = line(&mut shell, "countdown")?;
        assert!(output.contains("has passed"));
        Ok(())
    }

    #[test]
    fn quit_and_end_of_input_stop_the_loop() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        assert_eq!(shell.handle(ShellEvent::Line("quit".to_owned()))?, Flow::Quit);
        assert_eq!(shell.handle(ShellEvent::InputClosed)?, Flow::Quit);
        Ok(())
    }

    #[test]
    fn bad_command_is_reported_not_fatal() -> Result<()> {
        let (mut shell, _rx) = shell(records());
        let output = line(&mut shell, "launch rockets")?;
        assert!(output.starts_with("error: unknown command"));
        Ok(())
    }
}
