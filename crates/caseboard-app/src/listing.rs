// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use tracing::{debug, error};

use crate::filter::{FilterSet, FilterValue};
use crate::ids::{RecordId, UserId};
use crate::model::{PicklistOption, Record};

pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(6) {
    Some(size) => size,
    None => unreachable!(),
};

/// Filter-and-paginate engine over an in-memory record collection.
///
/// `filtered` holds source indices in source order; the window is always
/// `filtered[cursor * page_size .. (cursor + 1) * page_size]`.
#[derive(Debug, Clone)]
pub struct RecordList {
    source: Vec<Record>,
    filtered: Vec<usize>,
    filters: FilterSet,
    options: BTreeMap<String, Vec<PicklistOption>>,
    current_user: Option<UserId>,
    page_size: NonZeroUsize,
    cursor: usize,
}

impl RecordList {
    pub fn new(filters: FilterSet, page_size: NonZeroUsize) -> Self {
        Self {
            source: Vec::new(),
            filtered: Vec::new(),
            filters,
            options: BTreeMap::new(),
            current_user: None,
            page_size,
            cursor: 0,
        }
    }

    pub fn with_current_user(mut self, user: UserId) -> Self {
        self.current_user = Some(user);
        self.rederive();
        self
    }

    /// Applies startup filter values. Unknown keys are errors.
    pub fn with_defaults<'a, I>(mut self, defaults: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, FilterValue)>,
    {
        for (key, value) in defaults {
            self.filters.set(key, value)?;
        }
        self.rederive();
        Ok(self)
    }

    pub fn set_source(&mut self, records: Vec<Record>) {
        self.source = records;
        self.rederive();
    }

    pub fn set_filter(&mut self, key: &str, value: impl Into<FilterValue>) -> Result<()> {
        self.filters.set(key, value.into())?;
        self.rederive();
        Ok(())
    }

    pub fn reset_filters(&mut self) {
        self.filters.reset();
        self.rederive();
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_advance() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.can_retreat() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn current_window(&self) -> Vec<&Record> {
        let start = self.row_offset().min(self.filtered.len());
        let end = start
            .saturating_add(self.page_size.get())
            .min(self.filtered.len());
        self.filtered[start..end]
            .iter()
            .map(|&index| &self.source[index])
            .collect()
    }

    pub fn filtered(&self) -> impl Iterator<Item = &Record> {
        self.filtered.iter().map(|&index| &self.source[index])
    }

    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    pub fn can_advance(&self) -> bool {
        self.cursor < self.max_cursor()
    }

    pub const fn can_retreat(&self) -> bool {
        self.cursor > 0
    }

    pub fn active_filter_count(&self) -> usize {
        self.filters.active_count()
    }

    pub fn max_cursor(&self) -> usize {
        match self.filtered.len() {
            0 => 0,
            len => (len - 1) / self.page_size.get(),
        }
    }

    pub const fn page_index(&self) -> usize {
        self.cursor
    }

    pub fn page_count(&self) -> usize {
        if self.filtered.is_empty() {
            0
        } else {
            self.max_cursor() + 1
        }
    }

    pub const fn page_size(&self) -> NonZeroUsize {
        self.page_size
    }

    pub const fn row_offset(&self) -> usize {
        self.cursor * self.page_size.get()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    pub fn record(&self, id: &RecordId) -> Option<&Record> {
        self.source.iter().find(|record| record.id() == id)
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn set_options(&mut self, key: &str, options: Vec<PicklistOption>) {
        self.options.insert(key.to_owned(), options);
    }

    pub fn options(&self, key: &str) -> &[PicklistOption] {
        self.options.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    fn rederive(&mut self) {
        self.cursor = 0;
        self.filtered = match self.filters.check(self.current_user.as_ref()) {
            Ok(()) => {
                let user = self.current_user.as_ref();
                self.source
                    .iter()
                    .enumerate()
                    .filter(|(_, record)| self.filters.matches(record, user))
                    .map(|(index, _)| index)
                    .collect()
            }
            Err(fault) => {
                error!(%fault, "filter pass aborted; showing no records");
                Vec::new()
            }
        };
        debug!(
            source = self.source.len(),
            filtered = self.filtered.len(),
            active_filters = self.filters.active_count(),
            "re-derived record list"
        );
    }
}
