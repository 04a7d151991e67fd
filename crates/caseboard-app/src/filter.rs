// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::warn;

use crate::ids::UserId;
use crate::model::{
    ACTIVITY_TYPE_FIELD, CLOSED_STATUS, CONTACT_FIELD, CONTEXT_FIELD, ListKind, NOT_CLOSED_LABEL,
    OWNER_FIELD, PRIORITY_FIELD, RECORD_TYPE_FIELD, Record, STATUS_FIELD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateKind {
    /// Substring containment against the field's string form.
    Contains { case_sensitive: bool },
    /// Strict equality against the field's string form.
    Exact,
    /// "Not Closed" sentinel matches every non-closed status, any other
    /// value matches by equality.
    OpenStatus,
    /// A set flag keeps only records owned by the current user.
    Ownership,
}

impl PredicateKind {
    pub const fn takes_flag(self) -> bool {
        matches!(self, Self::Ownership)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub key: String,
    pub field: String,
    pub kind: PredicateKind,
}

impl FilterSpec {
    pub fn new(key: &str, field: &str, kind: PredicateKind) -> Self {
        Self {
            key: key.to_owned(),
            field: field.to_owned(),
            kind,
        }
    }

    pub fn contains(key: &str, field: &str, case_sensitive: bool) -> Self {
        Self::new(key, field, PredicateKind::Contains { case_sensitive })
    }

    pub fn exact(key: &str, field: &str) -> Self {
        Self::new(key, field, PredicateKind::Exact)
    }

    pub fn open_status(key: &str, field: &str) -> Self {
        Self::new(key, field, PredicateKind::OpenStatus)
    }

    pub fn ownership(key: &str, field: &str) -> Self {
        Self::new(key, field, PredicateKind::Ownership)
    }

    pub fn unset_value(&self) -> FilterValue {
        if self.kind.takes_flag() {
            FilterValue::Flag(false)
        } else {
            FilterValue::Text(String::new())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Text(String),
}

impl FilterValue {
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Flag(flag) => !flag,
            Self::Text(text) => text.is_empty(),
        }
    }

    const fn kind_name(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::Text(_) => "text",
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// Conditions that make a whole filter pass meaningless.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterFault {
    #[error("filter `{key}` holds a {found} value but expects a {expected} value")]
    ValueKind {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("filter `{key}` is set but no current user id is configured")]
    MissingCurrentUser { key: String },
}

/// The predicate set of one list plus the current value of every predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    specs: Vec<FilterSpec>,
    values: BTreeMap<String, FilterValue>,
}

impl FilterSet {
    pub fn new(specs: Vec<FilterSpec>) -> Self {
        let mut deduped: Vec<FilterSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            match deduped.iter_mut().find(|existing| existing.key == spec.key) {
                Some(existing) => *existing = spec,
                None => deduped.push(spec),
            }
        }
        let values = deduped
            .iter()
            .map(|spec| (spec.key.clone(), spec.unset_value()))
            .collect();
        Self {
            specs: deduped,
            values,
        }
    }

    pub fn for_list(kind: ListKind) -> Self {
        match kind {
            ListKind::Cases => Self::new(vec![
                FilterSpec::open_status("status", STATUS_FIELD),
                FilterSpec::exact("priority", PRIORITY_FIELD),
                FilterSpec::exact("recordType", RECORD_TYPE_FIELD),
                FilterSpec::contains("contact", CONTACT_FIELD, true),
                FilterSpec::ownership("mine", OWNER_FIELD),
            ]),
            ListKind::CaseActivities => Self::new(vec![
                FilterSpec::exact("activityType", ACTIVITY_TYPE_FIELD),
                FilterSpec::contains("context", CONTEXT_FIELD, false),
            ]),
        }
    }

    pub fn specs(&self) -> &[FilterSpec] {
        &self.specs
    }

    pub fn spec(&self, key: &str) -> Option<&FilterSpec> {
        self.specs.iter().find(|spec| spec.key == key)
    }

    pub fn value(&self, key: &str) -> Option<&FilterValue> {
        self.values.get(key)
    }

    /// Updates exactly one entry. Unknown keys leave the set untouched.
    pub fn set(&mut self, key: &str, value: FilterValue) -> Result<()> {
        let Some(slot) = self.values.get_mut(key) else {
            bail!(
                "unknown filter {key:?}; known filters: {}",
                self.specs
                    .iter()
                    .map(|spec| spec.key.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };
        *slot = value;
        Ok(())
    }

    pub fn reset(&mut self) {
        for spec in &self.specs {
            self.values.insert(spec.key.clone(), spec.unset_value());
        }
    }

    pub fn active_count(&self) -> usize {
        self.values.values().filter(|value| !value.is_unset()).count()
    }

    /// Record-independent checks, run once before a pass so that the
    /// outcome never depends on predicate order.
    pub fn check(&self, current_user: Option<&UserId>) -> Result<(), FilterFault> {
        for spec in &self.specs {
            let Some(value) = self.values.get(&spec.key) else {
                continue;
            };
            let expected = if spec.kind.takes_flag() { "flag" } else { "text" };
            if value.kind_name() != expected {
                return Err(FilterFault::ValueKind {
                    key: spec.key.clone(),
                    expected,
                    found: value.kind_name(),
                });
            }
            if spec.kind == PredicateKind::Ownership
                && !value.is_unset()
                && current_user.is_none()
            {
                return Err(FilterFault::MissingCurrentUser {
                    key: spec.key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Conjunction of every active predicate. Assumes `check` passed.
    pub fn matches(&self, record: &Record, current_user: Option<&UserId>) -> bool {
        self.specs.iter().all(|spec| {
            self.values
                .get(&spec.key)
                .is_none_or(|value| predicate_matches(spec, value, record, current_user))
        })
    }
}

fn predicate_matches(
    spec: &FilterSpec,
    value: &FilterValue,
    record: &Record,
    current_user: Option<&UserId>,
) -> bool {
    if value.is_unset() {
        return true;
    }

    match (spec.kind, value) {
        (PredicateKind::Ownership, FilterValue::Flag(_)) => {
            current_user.is_some_and(|user| field_text(record, &spec.field) == user.as_str())
        }
        (PredicateKind::Contains { case_sensitive }, FilterValue::Text(needle)) => {
            let haystack = field_text(record, &spec.field);
            if case_sensitive {
                haystack.contains(needle.as_str())
            } else {
                haystack
                    .to_lowercase()
                    .contains(needle.to_lowercase().as_str())
            }
        }
        (PredicateKind::Exact, FilterValue::Text(expected)) => {
            field_text(record, &spec.field) == expected.as_str()
        }
        (PredicateKind::OpenStatus, FilterValue::Text(expected)) => {
            let status = field_text(record, &spec.field);
            if expected == NOT_CLOSED_LABEL {
                status != CLOSED_STATUS
            } else {
                status == expected.as_str()
            }
        }
        _ => false,
    }
}

/// Missing and null fields read as empty; composite fields are a recovered
/// fault.
fn field_text<'r>(record: &'r Record, field: &str) -> Cow<'r, str> {
    match record.field(field) {
        None => Cow::Borrowed(""),
        Some(value) => value.text().unwrap_or_else(|| {
            warn!(
                record = %record.id(),
                field,
                "composite field cannot be filtered; treating it as empty"
            );
            Cow::Borrowed("")
        }),
    }
}
