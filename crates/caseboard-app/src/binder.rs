// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::sync::mpsc::Sender;
use tracing::{debug, warn};

use crate::ids::RecordId;
use crate::model::{FieldValue, Notification, Record};

/// Upward signals emitted by a [`RecordBinder`].
#[derive(Debug, Clone, PartialEq)]
pub enum BinderSignal {
    /// The caller must roll its selection back to this record.
    Revoke(RecordId),
    Notify(Notification),
    /// Any cached read of this record is stale after a commit.
    RefreshRequested(RecordId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Accepted,
    /// Same record re-announced while dirty; nothing changed or emitted.
    Redundant,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error("no record is bound")]
    NothingBound,
    #[error("a save of {0} is already in progress")]
    InFlight(RecordId),
    #[error("save of {record} failed: {reason}")]
    Rejected { record: RecordId, reason: String },
    #[error("save ticket {0} is not pending")]
    UnknownTicket(u64),
}

/// One pending commit: the draft as it was when the save started.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    id: u64,
    record: Record,
}

impl SaveTicket {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Committed; the store may hand back its refreshed copy.
    Committed(Option<Record>),
    Failed(String),
}

/// External commit of a record.
pub trait SaveOperation {
    fn commit(&mut self, record: &Record) -> Result<Option<Record>>;
}

#[derive(Debug, Clone)]
struct PendingSave {
    ticket: u64,
    record: Record,
}

/// Single-record slot that refuses to be rebound while it holds unsaved
/// edits.
#[derive(Debug)]
pub struct RecordBinder {
    current: Option<Record>,
    draft: Option<Record>,
    dirty: bool,
    editing: bool,
    pending: Option<PendingSave>,
    next_ticket: u64,
    signals: Sender<BinderSignal>,
}

impl RecordBinder {
    pub fn new(signals: Sender<BinderSignal>) -> Self {
        Self {
            current: None,
            draft: None,
            dirty: false,
            editing: false,
            pending: None,
            next_ticket: 0,
            signals,
        }
    }

    pub fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&RecordId> {
        self.current.as_ref().map(Record::id)
    }

    /// The working copy, including local edits.
    pub fn draft(&self) -> Option<&Record> {
        self.draft.as_ref()
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub const fn is_editing(&self) -> bool {
        self.editing
    }

    pub const fn is_saving(&self) -> bool {
        self.pending.is_some()
    }

    pub const fn save_label(&self) -> &'static str {
        if self.is_saving() { "Saving..." } else { "Save" }
    }

    pub fn bind(&mut self, record: Record) -> BindOutcome {
        if self.dirty
            && let Some(current) = &self.current
        {
            if current.id() == record.id() {
                debug!(record = %record.id(), "ignoring re-announced record while dirty");
                return BindOutcome::Redundant;
            }

            let current_id = current.id().clone();
            debug!(current = %current_id, incoming = %record.id(), "rebind rejected: unsaved changes");
            self.emit(BinderSignal::Revoke(current_id.clone()));
            self.emit(BinderSignal::Notify(Notification::warning(
                "Unsaved changes",
                format!(
                    "Save or cancel your changes to {current_id} before opening {}",
                    record.id()
                ),
            )));
            return BindOutcome::Rejected;
        }

        let left_edit_mode = self.editing;
        let id = record.id().clone();
        self.editing = false;
        self.dirty = false;
        self.draft = Some(record.clone());
        self.current = Some(record);
        debug!(record = %id, left_edit_mode, "record bound");

        if left_edit_mode {
            self.emit(BinderSignal::Notify(Notification::info(
                "Edit mode closed",
                format!("Opened {id}; edit mode was closed"),
            )));
        }
        BindOutcome::Accepted
    }

    pub fn begin_edit(&mut self) -> bool {
        if self.current.is_none() {
            debug!("edit requested with no record bound");
            return false;
        }
        self.editing = true;
        true
    }

    /// Leaves edit mode and throws away the draft. Refused while the bound
    /// record is being saved.
    pub fn cancel_edit(&mut self) {
        if self.refuse_while_saving("cancel") {
            return;
        }
        let had_changes = self.dirty;
        let was_editing = self.editing;
        self.dirty = false;
        self.editing = false;
        self.draft = self.current.clone();

        if had_changes {
            self.emit(BinderSignal::Notify(Notification::info(
                "Changes discarded",
                "Unsaved changes were discarded",
            )));
        } else if was_editing {
            self.emit(BinderSignal::Notify(Notification::info(
                "Edit cancelled",
                "Edit mode was closed",
            )));
        }
    }

    pub fn mark_dirty(&mut self) {
        if self.current.is_none() {
            debug!("mark_dirty with no record bound");
            return;
        }
        if self.refuse_while_saving("edit") {
            return;
        }
        self.dirty = true;
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let Some(draft) = self.draft.as_mut() else {
            bail!("no record is bound -- select a record first");
        };
        if !self.editing {
            bail!("record {} is not in edit mode -- start editing first", draft.id());
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.record.id() == draft.id())
        {
            bail!("record {} is being saved -- wait for the save to finish", draft.id());
        }
        draft.set_field(name, value)?;
        self.dirty = true;
        Ok(())
    }

    /// Emits one warning and returns true when the bound record has a save
    /// pending.
    fn refuse_while_saving(&self, action: &str) -> bool {
        let Some(pending) = self
            .pending
            .as_ref()
            .filter(|pending| self.current_id() == Some(pending.record.id()))
        else {
            return false;
        };
        debug!(record = %pending.record.id(), action, "refused while saving");
        self.emit(BinderSignal::Notify(Notification::warning(
            "Save in progress",
            format!(
                "Cannot {action} {} until the pending save finishes",
                pending.record.id()
            ),
        )));
        true
    }

    /// Starts an asynchronous commit of the draft. A second save while one
    /// is pending is rejected.
    pub fn begin_save(&mut self) -> Result<SaveTicket, SaveError> {
        if let Some(pending) = &self.pending {
            let error = SaveError::InFlight(pending.record.id().clone());
            self.emit(BinderSignal::Notify(Notification::warning(
                "Save in progress",
                error.to_string(),
            )));
            return Err(error);
        }
        let Some(draft) = self.draft.clone() else {
            self.emit(BinderSignal::Notify(Notification::warning(
                "Nothing to save",
                "Select a record before saving",
            )));
            return Err(SaveError::NothingBound);
        };

        self.next_ticket = self.next_ticket.saturating_add(1);
        let ticket = SaveTicket {
            id: self.next_ticket,
            record: draft,
        };
        self.pending = Some(PendingSave {
            ticket: ticket.id,
            record: ticket.record.clone(),
        });
        debug!(record = %ticket.record.id(), ticket = ticket.id, "save started");
        Ok(ticket)
    }

    pub fn finish_save(&mut self, ticket: u64, outcome: SaveOutcome) -> Result<(), SaveError> {
        let Some(pending) = self.pending.take_if(|pending| pending.ticket == ticket) else {
            warn!(ticket, "completion for a save that is not pending");
            return Err(SaveError::UnknownTicket(ticket));
        };
        let record_id = pending.record.id().clone();
        let still_bound = self.current_id() == Some(&record_id);

        match outcome {
            SaveOutcome::Committed(refreshed) => {
                if still_bound {
                    let committed = match refreshed {
                        Some(record) if record.id() == &record_id => record,
                        Some(record) => {
                            warn!(
                                expected = %record_id,
                                got = %record.id(),
                                "store returned a different record; keeping the committed draft"
                            );
                            pending.record
                        }
                        None => pending.record,
                    };
                    self.current = Some(committed.clone());
                    self.draft = Some(committed);
                    self.dirty = false;
                    self.editing = false;
                }
                debug!(record = %record_id, still_bound, "save committed");
                self.emit(BinderSignal::Notify(Notification::success(
                    "Success",
                    format!("Record {record_id} updated successfully"),
                )));
                self.emit(BinderSignal::RefreshRequested(record_id));
                Ok(())
            }
            SaveOutcome::Failed(reason) => {
                if still_bound {
                    self.dirty = true;
                    self.editing = true;
                }
                warn!(record = %record_id, %reason, "save failed");
                self.emit(BinderSignal::Notify(Notification::error(
                    "Save failed",
                    format!("Could not save {record_id}: {reason}"),
                )));
                Err(SaveError::Rejected {
                    record: record_id,
                    reason,
                })
            }
        }
    }

    /// Runs a commit to completion against `operation`.
    pub fn save<S: SaveOperation>(&mut self, operation: &mut S) -> Result<(), SaveError> {
        let ticket = self.begin_save()?;
        let outcome = match operation.commit(ticket.record()) {
            Ok(refreshed) => SaveOutcome::Committed(refreshed),
            Err(error) => SaveOutcome::Failed(format!("{error:#}")),
        };
        self.finish_save(ticket.id(), outcome)
    }

    fn emit(&self, signal: BinderSignal) {
        if self.signals.send(signal).is_err() {
            debug!("binder signal dropped; receiver is gone");
        }
    }
}
