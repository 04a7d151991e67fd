// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::sync::mpsc::{self, Receiver};
use time::OffsetDateTime;
use tracing::debug;

use crate::binder::{BindOutcome, BinderSignal, RecordBinder, SaveOperation, SaveOutcome, SaveTicket};
use crate::countdown::{Breakdown, Countdown, ScheduleToken, TickOutcome};
use crate::filter::FilterValue;
use crate::ids::RecordId;
use crate::listing::RecordList;
use crate::model::{
    FieldValue, ListLoader, Notification, PicklistOption, Record, SLA_TARGET_FIELD,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Load(Vec<Record>),
    SetFilter { key: String, value: FilterValue },
    ResetFilters,
    /// Picklist choices offered for a filter key.
    SetOptions { key: String, options: Vec<PicklistOption> },
    NextPage,
    PreviousPage,
    Select(RecordId),
    BeginEdit,
    EditField { field: String, value: FieldValue },
    CancelEdit,
    Save,
    SaveFinished { ticket: u64, outcome: SaveOutcome },
    Tick { token: ScheduleToken, now: OffsetDateTime },
}

/// Binder flags as of the end of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub record: Option<RecordId>,
    pub dirty: bool,
    pub editing: bool,
    pub saving: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    WindowChanged {
        page: usize,
        pages: usize,
        rows: Vec<RecordId>,
    },
    SelectionChanged(RecordId),
    /// The selection was rolled back to this record.
    SelectionRevoked(RecordId),
    SlotUpdated(SlotStatus),
    Notify(Notification),
    RefreshRequested(RecordId),
    SaveRequested(SaveTicket),
    CountdownArmed(ScheduleToken),
    CountdownCleared,
    CountdownTick(Breakdown),
    CountdownExpired,
}

/// List, detail slot, and deadline countdown wired together.
#[derive(Debug)]
pub struct Console {
    list: RecordList,
    binder: RecordBinder,
    countdown: Countdown,
    selected: Option<RecordId>,
    signals: Receiver<BinderSignal>,
    deadline_field: String,
    deadline_value: Option<String>,
}

impl Console {
    pub fn new(list: RecordList) -> Self {
        let (signal_tx, signals) = mpsc::channel();
        Self {
            list,
            binder: RecordBinder::new(signal_tx),
            countdown: Countdown::new(),
            selected: None,
            signals,
            deadline_field: SLA_TARGET_FIELD.to_owned(),
            deadline_value: None,
        }
    }

    pub fn with_deadline_field(mut self, field: impl Into<String>) -> Self {
        self.deadline_field = field.into();
        self
    }

    pub fn list(&self) -> &RecordList {
        &self.list
    }

    pub fn binder(&self) -> &RecordBinder {
        &self.binder
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn selected(&self) -> Option<&RecordId> {
        self.selected.as_ref()
    }

    pub fn deadline_field(&self) -> &str {
        &self.deadline_field
    }

    pub fn slot_status(&self) -> SlotStatus {
        SlotStatus {
            record: self.binder.current_id().cloned(),
            dirty: self.binder.is_dirty(),
            editing: self.binder.is_editing(),
            saving: self.binder.is_saving(),
        }
    }

    pub fn dispatch(&mut self, command: ConsoleCommand) -> Vec<ConsoleEvent> {
        let mut events = Vec::new();
        match command {
            ConsoleCommand::Load(records) => {
                self.list.set_source(records);
                events.push(self.window_event());
                self.refresh_bound(&mut events);
            }
            ConsoleCommand::SetFilter { key, value } => match self.list.set_filter(&key, value) {
                Ok(()) => events.push(self.window_event()),
                Err(error) => events.push(ConsoleEvent::Notify(Notification::warning(
                    "Filter not applied",
                    format!("{error:#}"),
                ))),
            },
            ConsoleCommand::ResetFilters => {
                self.list.reset_filters();
                events.push(self.window_event());
            }
            ConsoleCommand::SetOptions { key, options } => {
                debug!(%key, count = options.len(), "picklist options updated");
                self.list.set_options(&key, options);
            }
            ConsoleCommand::NextPage => {
                if self.list.next_page() {
                    events.push(self.window_event());
                }
            }
            ConsoleCommand::PreviousPage => {
                if self.list.previous_page() {
                    events.push(self.window_event());
                }
            }
            ConsoleCommand::Select(id) => self.select(id, &mut events),
            ConsoleCommand::BeginEdit => {
                if self.binder.begin_edit() {
                    events.push(ConsoleEvent::SlotUpdated(self.slot_status()));
                } else {
                    events.push(ConsoleEvent::Notify(Notification::warning(
                        "Nothing selected",
                        "Select a record before editing",
                    )));
                }
            }
            ConsoleCommand::EditField { field, value } => {
                match self.binder.set_field(&field, value) {
                    Ok(()) => events.push(ConsoleEvent::SlotUpdated(self.slot_status())),
                    Err(error) => events.push(ConsoleEvent::Notify(Notification::warning(
                        "Field not changed",
                        format!("{error:#}"),
                    ))),
                }
            }
            ConsoleCommand::CancelEdit => {
                self.binder.cancel_edit();
                self.drain_signals(&mut events);
                events.push(ConsoleEvent::SlotUpdated(self.slot_status()));
            }
            ConsoleCommand::Save => {
                if let Ok(ticket) = self.binder.begin_save() {
                    events.push(ConsoleEvent::SaveRequested(ticket));
                    events.push(ConsoleEvent::SlotUpdated(self.slot_status()));
                }
                self.drain_signals(&mut events);
            }
            ConsoleCommand::SaveFinished { ticket, outcome } => {
                if self.binder.finish_save(ticket, outcome).is_ok() {
                    self.rearm_countdown(&mut events);
                }
                self.drain_signals(&mut events);
                events.push(ConsoleEvent::SlotUpdated(self.slot_status()));
            }
            ConsoleCommand::Tick { token, now } => match self.countdown.tick(token, now) {
                TickOutcome::Stale => {}
                TickOutcome::Running(breakdown) => {
                    events.push(ConsoleEvent::CountdownTick(breakdown));
                }
                TickOutcome::Expired => events.push(ConsoleEvent::CountdownExpired),
            },
        }
        events
    }

    /// Loads the list through `loader`.
    pub fn reload<L: ListLoader>(&mut self, loader: &mut L) -> Result<Vec<ConsoleEvent>> {
        let records = loader.load()?;
        debug!(count = records.len(), "records loaded");
        Ok(self.dispatch(ConsoleCommand::Load(records)))
    }

    /// Runs both save phases against a synchronous store.
    pub fn save_with<S: SaveOperation>(&mut self, store: &mut S) -> Vec<ConsoleEvent> {
        let mut events = self.dispatch(ConsoleCommand::Save);
        let ticket = events.iter().find_map(|event| match event {
            ConsoleEvent::SaveRequested(ticket) => Some(ticket.clone()),
            _ => None,
        });
        if let Some(ticket) = ticket {
            let outcome = match store.commit(ticket.record()) {
                Ok(refreshed) => SaveOutcome::Committed(refreshed),
                Err(error) => SaveOutcome::Failed(format!("{error:#}")),
            };
            events.extend(self.dispatch(ConsoleCommand::SaveFinished {
                ticket: ticket.id(),
                outcome,
            }));
        }
        events
    }

    /// Cancels the countdown schedule. Call when the console goes away.
    pub fn dispose(&mut self) {
        self.countdown.dispose();
    }

    fn select(&mut self, id: RecordId, events: &mut Vec<ConsoleEvent>) {
        let Some(record) = self.list.record(&id).cloned() else {
            events.push(ConsoleEvent::Notify(Notification::warning(
                "Record not found",
                format!("No record with id {id} is loaded"),
            )));
            return;
        };

        self.selected = Some(id.clone());
        let outcome = self.binder.bind(record);
        debug!(record = %id, ?outcome, "selection bound");
        if outcome == BindOutcome::Accepted {
            events.push(ConsoleEvent::SelectionChanged(id));
            self.rearm_countdown(events);
        }
        self.drain_signals(events);
        if outcome == BindOutcome::Accepted {
            events.push(ConsoleEvent::SlotUpdated(self.slot_status()));
        }
    }

    /// Picks up a fresh copy of the bound record after a reload. Records
    /// in edit mode keep their snapshot.
    fn refresh_bound(&mut self, events: &mut Vec<ConsoleEvent>) {
        if self.binder.is_editing() {
            return;
        }
        let Some(fresh) = self
            .binder
            .current_id()
            .and_then(|id| self.list.record(id))
            .cloned()
        else {
            return;
        };
        if self.binder.bind(fresh) == BindOutcome::Accepted {
            self.rearm_countdown(events);
        }
        self.drain_signals(events);
    }

    fn rearm_countdown(&mut self, events: &mut Vec<ConsoleEvent>) {
        let value = self
            .binder
            .current()
            .and_then(|record| record.text(&self.deadline_field))
            .map(|value| value.into_owned());
        if value == self.deadline_value {
            return;
        }

        match self.countdown.set_deadline(value.as_deref()) {
            Some(token) => events.push(ConsoleEvent::CountdownArmed(token)),
            None => events.push(ConsoleEvent::CountdownCleared),
        }
        self.deadline_value = value;
    }

    fn drain_signals(&mut self, events: &mut Vec<ConsoleEvent>) {
        while let Ok(signal) = self.signals.try_recv() {
            match signal {
                BinderSignal::Revoke(id) => {
                    self.selected = Some(id.clone());
                    events.push(ConsoleEvent::SelectionRevoked(id));
                }
                BinderSignal::Notify(notification) => {
                    events.push(ConsoleEvent::Notify(notification));
                }
                BinderSignal::RefreshRequested(id) => {
                    events.push(ConsoleEvent::RefreshRequested(id));
                }
            }
        }
    }

    fn window_event(&self) -> ConsoleEvent {
        ConsoleEvent::WindowChanged {
            page: self.list.page_index(),
            pages: self.list.page_count(),
            rows: self
                .list
                .current_window()
                .into_iter()
                .map(|record| record.id().clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Console, ConsoleCommand, ConsoleEvent};
    use crate::{
        FilterSet, FilterValue, ListKind, PicklistOption, Record, RecordId, RecordList,
        SaveOutcome, Severity,
    };
    use std::num::NonZeroUsize;
    use time::Duration;
    use time::macros::datetime;

    fn console(page_size: usize) -> Console {
        let page_size = NonZeroUsize::new(page_size).expect("non-zero page size");
        Console::new(RecordList::new(FilterSet::for_list(ListKind::Cases), page_size))
    }

    fn loaded(page_size: usize) -> Console {
        let mut console = console(page_size);
        console.dispatch(ConsoleCommand::Load(vec![
            Record::new("A")
                .with_field("Status", "Open")
                .with_field("SLATarget", "2026-02-20T12:00:00Z"),
            Record::new("B")
                .with_field("Status", "Closed")
                .with_field("SLATarget", "2026-02-21T12:00:00Z"),
            Record::new("C").with_field("Status", "Open"),
        ]));
        console
    }

    fn select(id: &str) -> ConsoleCommand {
        ConsoleCommand::Select(RecordId::new(id))
    }

    fn rows(ids: &[&str]) -> Vec<RecordId> {
        ids.iter().copied().map(RecordId::new).collect()
    }

    fn warnings(events: &[ConsoleEvent]) -> usize {
        events
            .iter()
            .filter(|event| {
                matches!(event, ConsoleEvent::Notify(note) if note.severity == Severity::Warning)
            })
            .count()
    }

    #[test]
    fn load_and_filter_emit_windows() {
        let mut console = console(2);
        let events = console.dispatch(ConsoleCommand::Load(vec![
            Record::new("1").with_field("Status", "Open"),
            Record::new("2").with_field("Status", "Closed"),
            Record::new("3").with_field("Status", "Open"),
        ]));
        assert_eq!(
            events,
            vec![ConsoleEvent::WindowChanged {
                page: 0,
                pages: 2,
                rows: rows(&["1", "2"]),
            }]
        );

        let events = console.dispatch(ConsoleCommand::SetFilter {
            key: "status".to_owned(),
            value: FilterValue::from("Not Closed"),
        });
        assert_eq!(
            events,
            vec![ConsoleEvent::WindowChanged {
                page: 0,
                pages: 1,
                rows: rows(&["1", "3"]),
            }]
        );
    }

    #[test]
    fn paging_past_the_end_is_silent() {
        let mut console = loaded(2);
        assert_eq!(console.dispatch(ConsoleCommand::PreviousPage), Vec::new());
        assert_eq!(console.dispatch(ConsoleCommand::NextPage).len(), 1);
        assert_eq!(console.dispatch(ConsoleCommand::NextPage), Vec::new());
    }

    #[test]
    fn unknown_filter_is_one_warning() {
        let mut console = loaded(2);
        let events = console.dispatch(ConsoleCommand::SetFilter {
            key: "bogus".to_owned(),
            value: FilterValue::from("x"),
        });
        assert_eq!(events.len(), 1);
        assert_eq!(warnings(&events), 1);
    }

    #[test]
    fn select_binds_and_arms_countdown() {
        let mut console = loaded(6);
        let events = console.dispatch(select("A"));

        assert_eq!(events[0], ConsoleEvent::SelectionChanged(RecordId::new("A")));
        assert!(matches!(events[1], ConsoleEvent::CountdownArmed(_)));
        assert_eq!(console.selected(), Some(&RecordId::new("A")));
        assert!(console.countdown().schedule().is_some());

        let events = console.dispatch(select("C"));
        assert!(events.contains(&ConsoleEvent::CountdownCleared));
        assert_eq!(console.countdown().schedule(), None);
    }

    #[test]
    fn dirty_slot_rolls_selection_back() {
        let mut console = loaded(6);
        console.dispatch(select("A"));
        console.dispatch(select("B"));
        console.dispatch(ConsoleCommand::BeginEdit);
        console.dispatch(ConsoleCommand::EditField {
            field: "Status".to_owned(),
            value: "Escalated".into(),
        });

        let events = console.dispatch(select("C"));
        assert_eq!(
            events[0],
            ConsoleEvent::SelectionRevoked(RecordId::new("B"))
        );
        assert_eq!(warnings(&events), 1);
        assert_eq!(events.len(), 2);
        assert_eq!(console.selected(), Some(&RecordId::new("B")));
        assert_eq!(console.binder().current_id(), Some(&RecordId::new("B")));
    }

    #[test]
    fn select_unknown_record_warns() {
        let mut console = loaded(6);
        let events = console.dispatch(select("Z"));
        assert_eq!(warnings(&events), 1);
        assert_eq!(console.selected(), None);
    }

    #[test]
    fn two_phase_save_round_trip() {
        let mut console = loaded(6);
        console.dispatch(select("A"));
        console.dispatch(ConsoleCommand::BeginEdit);
        console.dispatch(ConsoleCommand::EditField {
            field: "SLATarget".to_owned(),
            value: "2026-03-01T00:00:00Z".into(),
        });

        let events = console.dispatch(ConsoleCommand::Save);
        let ticket = events
            .iter()
            .find_map(|event| match event {
                ConsoleEvent::SaveRequested(ticket) => Some(ticket.clone()),
                _ => None,
            })
            .expect("save requested");
        assert!(console.slot_status().saving);
        assert_eq!(
            ticket.record().text("SLATarget").as_deref(),
            Some("2026-03-01T00:00:00Z")
        );

        let events = console.dispatch(ConsoleCommand::SaveFinished {
            ticket: ticket.id(),
            outcome: SaveOutcome::Committed(None),
        });
        assert!(events.contains(&ConsoleEvent::RefreshRequested(RecordId::new("A"))));
        assert!(
            events
                .iter()
                .any(|event| matches!(event, ConsoleEvent::CountdownArmed(_))),
            "the committed deadline re-arms the countdown"
        );
        let status = console.slot_status();
        assert!(!status.dirty && !status.editing && !status.saving);
    }

    #[test]
    fn ticks_drive_the_countdown() {
        let mut console = loaded(6);
        let events = console.dispatch(select("A"));
        let token = events
            .iter()
            .find_map(|event| match event {
                ConsoleEvent::CountdownArmed(token) => Some(*token),
                _ => None,
            })
            .expect("countdown armed");

        let now = datetime!(2026-02-20 11:00 UTC);
        let events = console.dispatch(ConsoleCommand::Tick { token, now });
        assert!(matches!(
            events.as_slice(),
            [ConsoleEvent::CountdownTick(breakdown)] if breakdown.hours == 1
        ));

        let later = now + Duration::hours(2);
        assert_eq!(
            console.dispatch(ConsoleCommand::Tick { token, now: later }),
            vec![ConsoleEvent::CountdownExpired]
        );
        assert_eq!(
            console.dispatch(ConsoleCommand::Tick { token, now: later }),
            Vec::new()
        );
    }

    #[test]
    fn reload_refreshes_a_clean_bound_record() {
        let mut console = loaded(6);
        console.dispatch(select("A"));
        console.dispatch(ConsoleCommand::Load(vec![
            Record::new("A")
                .with_field("Status", "Working")
                .with_field("SLATarget", "2026-02-20T12:00:00Z"),
        ]));
        assert_eq!(
            console
                .binder()
                .current()
                .and_then(|record| record.text("Status"))
                .as_deref(),
            Some("Working")
        );
    }

    #[test]
    fn reload_keeps_a_dirty_draft() {
        let mut console = loaded(6);
        console.dispatch(select("A"));
        console.dispatch(ConsoleCommand::BeginEdit);
        console.dispatch(ConsoleCommand::EditField {
            field: "Status".to_owned(),
            value: "Escalated".into(),
        });
        let events = console.dispatch(ConsoleCommand::Load(vec![
            Record::new("A").with_field("Status", "Working"),
        ]));
        assert_eq!(events.len(), 1, "only the window changes");
        assert_eq!(
            console
                .binder()
                .draft()
                .and_then(|record| record.text("Status"))
                .as_deref(),
            Some("Escalated")
        );
    }

    #[test]
    fn dispose_stops_ticks() {
        let mut console = loaded(6);
        console.dispatch(select("A"));
        let token = console.countdown().schedule().expect("armed");
        console.dispose();
        assert_eq!(
            console.dispatch(ConsoleCommand::Tick {
                token,
                now: datetime!(2026-02-20 11:00 UTC),
            }),
            Vec::new()
        );
    }

    #[test]
    fn picklist_options_are_stored_without_moving_the_window() {
        let mut console = loaded(2);
        console.dispatch(ConsoleCommand::NextPage);
        let events = console.dispatch(ConsoleCommand::SetOptions {
            key: "status".to_owned(),
            options: PicklistOption::status_options([PicklistOption::new("Open", "Open")]),
        });

        assert!(events.is_empty());
        assert_eq!(console.list().page_index(), 1);
        let labels: Vec<_> = console
            .list()
            .options("status")
            .iter()
            .map(|option| option.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Not Closed", "Open"]);
    }
}
