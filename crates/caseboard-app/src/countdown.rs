// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_MINUTE: i64 = 60;

/// Time remaining split into whole days, then hours within the day, and so
/// on down to seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Breakdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Breakdown {
    pub const ZERO: Self = Self {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    /// Negative spans clamp to zero.
    pub fn from_remaining(remaining: time::Duration) -> Self {
        let total = remaining.whole_seconds().max(0);
        Self {
            days: total / SECONDS_PER_DAY,
            hours: (total % SECONDS_PER_DAY) / SECONDS_PER_HOUR,
            minutes: (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            seconds: total % SECONDS_PER_MINUTE,
        }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Identifies one recomputation schedule. Only the most recently issued
/// token is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleToken(u64);

impl ScheduleToken {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belongs to a cancelled schedule and changed nothing.
    Stale,
    Running(Breakdown),
    Expired,
}

/// Parses a deadline field value. Accepts RFC 3339, the store's
/// `2026-07-25T00:00:00.000+0000` form, a naive datetime (UTC), or a bare
/// date (midnight UTC).
pub fn parse_deadline(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(instant);
    }

    let store_format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    );
    if let Ok(instant) = OffsetDateTime::parse(raw, store_format) {
        return Some(instant);
    }

    let naive_format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(naive) = PrimitiveDateTime::parse(raw, naive_format) {
        return Some(naive.assume_utc());
    }

    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Deadline countdown. Pure state; the owner drives [`Countdown::tick`]
/// once per [`TICK_INTERVAL`] with the token it was handed.
#[derive(Debug, Clone, Default)]
pub struct Countdown {
    deadline: Option<OffsetDateTime>,
    breakdown: Breakdown,
    expired: bool,
    live: Option<ScheduleToken>,
    generation: u64,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline from a raw field value. Missing or unparsable input
    /// clears the countdown.
    pub fn set_deadline(&mut self, raw: Option<&str>) -> Option<ScheduleToken> {
        let instant = raw.and_then(|value| {
            let parsed = parse_deadline(value);
            if parsed.is_none() {
                debug!(value, "unparsable deadline; clearing countdown");
            }
            parsed
        });
        self.set_deadline_at(instant)
    }

    /// Replaces the deadline, cancelling any live schedule first. Returns the
    /// token for the new schedule.
    pub fn set_deadline_at(&mut self, deadline: Option<OffsetDateTime>) -> Option<ScheduleToken> {
        self.clear();
        let deadline = deadline?;

        self.generation = self.generation.wrapping_add(1);
        let token = ScheduleToken(self.generation);
        self.deadline = Some(deadline);
        self.live = Some(token);
        debug!(%deadline, token = token.get(), "countdown armed");
        Some(token)
    }

    pub fn clear(&mut self) {
        self.deadline = None;
        self.breakdown = Breakdown::ZERO;
        self.expired = false;
        self.live = None;
    }

    pub fn tick(&mut self, token: ScheduleToken, now: OffsetDateTime) -> TickOutcome {
        if self.live != Some(token) {
            return TickOutcome::Stale;
        }
        let Some(deadline) = self.deadline else {
            self.live = None;
            return TickOutcome::Stale;
        };

        let remaining = deadline - now;
        if remaining.is_negative() {
            self.live = None;
            self.expired = true;
            debug!(%deadline, token = token.get(), "countdown expired");
            return TickOutcome::Expired;
        }
        self.breakdown = Breakdown::from_remaining(remaining);
        TickOutcome::Running(self.breakdown)
    }

    /// Cancels the live schedule; later ticks are stale. State is kept.
    pub fn dispose(&mut self) {
        if let Some(token) = self.live.take() {
            debug!(token = token.get(), "countdown disposed");
        }
    }

    pub const fn deadline(&self) -> Option<OffsetDateTime> {
        self.deadline
    }

    pub const fn breakdown(&self) -> Breakdown {
        self.breakdown
    }

    pub const fn is_expired(&self) -> bool {
        self.expired
    }

    pub const fn schedule(&self) -> Option<ScheduleToken> {
        self.live
    }
}
