// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use caseboard_app::{
    ACTIVITY_TYPE_FIELD, CASE_NUMBER_FIELD, CONTACT_FIELD, CONTEXT_FIELD, OWNER_FIELD,
    PRIORITY_FIELD, RECORD_TYPE_FIELD, Record, RecordId, SLA_TARGET_FIELD, STATUS_FIELD, UserId,
};
use std::path::{Path, PathBuf};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const CASE_FIELD: &str = "Case__c";
pub const SUBJECT_FIELD: &str = "Subject";

const STATUSES: [&str; 5] = ["New", "Working", "Escalated", "On Hold", "Closed"];
const PRIORITIES: [&str; 3] = ["High", "Medium", "Low"];
const RECORD_TYPES: [&str; 4] = ["Support", "Billing", "Onboarding", "Technical"];
const ACTIVITY_TYPES: [&str; 5] = ["Call", "Email", "Meeting", "Note", "Site Visit"];
const OWNER_IDS: [&str; 4] = [
    "005000000000001AAA",
    "005000000000002AAA",
    "005000000000003AAA",
    "005000000000004AAA",
];

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of case and case-activity records. The same seed always
/// yields the same records.
#[derive(Debug, Clone)]
pub struct CaseFaker {
    rng: DeterministicRng,
    next_case: u64,
    next_activity: u64,
}

impl CaseFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_case: 0,
            next_activity: 0,
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn case(&mut self) -> Record {
        self.next_case += 1;
        let id = format!("500{:015}", self.next_case);
        let contact = format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES));
        let sla = self.sla_target();

        Record::new(id)
            .with_field(CASE_NUMBER_FIELD, format!("{:08}", 1000 + self.next_case))
            .with_field(SUBJECT_FIELD, self.subject())
            .with_field(STATUS_FIELD, self.pick(&STATUSES))
            .with_field(PRIORITY_FIELD, self.pick(&PRIORITIES))
            .with_field(RECORD_TYPE_FIELD, self.pick(&RECORD_TYPES))
            .with_field(CONTACT_FIELD, contact)
            .with_field(OWNER_FIELD, self.pick(&OWNER_IDS))
            .with_field(SLA_TARGET_FIELD, store_datetime(sla))
    }

    pub fn cases(&mut self, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.case()).collect()
    }

    pub fn activity(&mut self, case_id: &RecordId) -> Record {
        self.next_activity += 1;
        let id = format!("a0X{:015}", self.next_activity);
        let activity_type = self.pick(&ACTIVITY_TYPES);
        let context = format!(
            "{activity_type} with {} about {}",
            self.pick(&FIRST_NAMES),
            self.subject().to_lowercase()
        );

        Record::new(id)
            .with_field(CASE_FIELD, case_id.as_str())
            .with_field(ACTIVITY_TYPE_FIELD, activity_type)
            .with_field(CONTEXT_FIELD, context)
    }

    pub fn activities(&mut self, case_id: &RecordId, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.activity(case_id)).collect()
    }

    /// SLA targets land between two days before and two weeks after
    /// [`reference_now`], so a batch mixes expired and live deadlines.
    pub fn sla_target(&mut self) -> OffsetDateTime {
        let start = reference_now() - Duration::days(2);
        let span = Duration::days(16).whole_seconds() as u64;
        let offset = self.rng.next_u64() % span;
        start + Duration::seconds(offset as i64)
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn subject(&mut self) -> String {
        const PROBLEMS: [&str; 8] = [
            "Login failure",
            "Invoice mismatch",
            "Shipment delayed",
            "Password reset",
            "Data export stuck",
            "Duplicate charge",
            "Integration timeout",
            "Missing report",
        ];
        const AREAS: [&str; 6] = ["portal", "billing", "mobile app", "API", "dashboard", "SSO"];
        format!("{} in {}", self.pick(&PROBLEMS), self.pick(&AREAS))
    }
}

/// Simple case record with a status, for hand-written scenarios.
pub fn case(id: &str, status: &str) -> Record {
    Record::new(id).with_field(STATUS_FIELD, status)
}

/// Case record owned by `owner`.
pub fn owned_case(id: &str, status: &str, owner: &str) -> Record {
    case(id, status).with_field(OWNER_FIELD, owner)
}

pub fn owner_ids() -> &'static [&'static str] {
    &OWNER_IDS
}

pub fn case_statuses() -> &'static [&'static str] {
    &STATUSES
}

pub fn demo_user() -> UserId {
    UserId::new(OWNER_IDS[0])
}

pub fn reference_now() -> OffsetDateTime {
    datetime!(2026-02-19 12:34:56 UTC)
}

/// Formats an instant the way the record store serializes datetimes.
pub fn store_datetime(instant: OffsetDateTime) -> String {
    let utc = instant.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}+0000",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
        utc.millisecond()
    )
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}

/// Writes `records` as a JSON array under `dir` and returns the file path.
pub fn write_records(dir: &Path, records: &[Record]) -> Result<PathBuf> {
    let path = dir.join("records.json");
    let raw = serde_json::to_string_pretty(records).context("encode records")?;
    std::fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::{CaseFaker, case_statuses, owner_ids, reference_now, store_datetime};
    use caseboard_app::{Record, RecordId, parse_deadline};
    use std::collections::BTreeSet;

    #[test]
    fn new_deterministic_seed() {
        let mut left = CaseFaker::new(42);
        let mut right = CaseFaker::new(42);
        assert_eq!(left.cases(5), right.cases(5));
    }

    #[test]
    fn case_has_console_fields() {
        let mut faker = CaseFaker::new(1);
        let record = faker.case();

        assert_eq!(record.id().as_str().len(), 18);
        for field in ["CaseNumber", "Subject", "Priority", "RecordTypeName", "ContactName"] {
            assert!(record.text(field).is_some_and(|text| !text.is_empty()), "field {field}");
        }
        let status = record.text("Status").expect("status is set");
        assert!(case_statuses().contains(&&*status));
        let owner = record.text("OwnerId").expect("owner is set");
        assert!(owner_ids().contains(&&*owner));
    }

    #[test]
    fn case_ids_are_unique() {
        let mut faker = CaseFaker::new(2);
        let ids: BTreeSet<_> = faker.cases(50).iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn sla_targets_parse_and_straddle_now() {
        let mut faker = CaseFaker::new(3);
        let mut past = 0;
        let mut future = 0;
        for record in faker.cases(100) {
            let raw = record.text("SLATarget").expect("sla target is set");
            let deadline = parse_deadline(&raw).expect("store format parses");
            if deadline < reference_now() {
                past += 1;
            } else {
                future += 1;
            }
        }
        assert!(past > 0, "some deadlines have passed");
        assert!(future > past, "most deadlines are still ahead");
    }

    #[test]
    fn activities_point_at_their_case() {
        let mut faker = CaseFaker::new(4);
        let case_id = RecordId::new("500000000000000001");
        let activities = faker.activities(&case_id, 3);
        assert_eq!(activities.len(), 3);
        for activity in &activities {
            assert_eq!(activity.text("Case__c").as_deref(), Some(case_id.as_str()));
            assert!(activity.text("Activity_Type__c").is_some());
            assert!(activity.text("Context__c").is_some());
        }
    }

    #[test]
    fn variety_across_seeds() {
        let mut subjects = BTreeSet::new();
        for seed in 0_u64..20_u64 {
            let mut faker = CaseFaker::new(seed);
            if let Some(subject) = faker.case().text("Subject") {
                subjects.insert(subject.into_owned());
            }
        }
        assert!(subjects.len() >= 8, "got {}", subjects.len());
    }

    #[test]
    fn store_datetime_matches_record_store_format() {
        assert_eq!(store_datetime(reference_now()), "2026-02-19T12:34:56.000+0000");
    }

    #[test]
    fn int_n() {
        let mut faker = CaseFaker::new(42);
        for _ in 0..100 {
            assert!(faker.int_n(5) < 5);
        }
    }

    #[test]
    fn records_survive_a_json_file() -> anyhow::Result<()> {
        let (dir, _) = super::temp_config_path()?;
        let records = CaseFaker::new(5).cases(3);
        let path = super::write_records(dir.path(), &records)?;
        let raw = std::fs::read_to_string(path)?;
        assert_eq!(Record::list_from_json(&raw)?, records);
        Ok(())
    }
}
