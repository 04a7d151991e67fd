// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use caseboard_app::{
    DEFAULT_PAGE_SIZE, FilterSet, FilterValue, ListKind, NOT_CLOSED_LABEL, SLA_TARGET_FIELD,
    TICK_INTERVAL, UserId,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const APP_NAME: &str = "caseboard";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub list: List,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub countdown: Countdown,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            list: List::default(),
            user: User::default(),
            countdown: Countdown::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct List {
    pub kind: Option<String>,
    pub page_size: Option<i64>,
    pub default_filters: Option<BTreeMap<String, FilterValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Countdown {
    pub tick: Option<String>,
    pub deadline_field: Option<String>,
}

impl Default for Countdown {
    fn default() -> Self {
        Self {
            tick: Some("1s".to_owned()),
            deadline_field: Some(SLA_TARGET_FIELD.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    pub filter: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("CASEBOARD_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set CASEBOARD_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [list], [user], [countdown], and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let kind = self.list_kind()?;

        if let Some(page_size) = self.list.page_size
            && page_size <= 0
        {
            bail!(
                "list.page_size in {} must be positive, got {}",
                path.display(),
                page_size
            );
        }

        if let Some(filters) = &self.list.default_filters {
            let known = FilterSet::for_list(kind);
            for (key, value) in filters {
                let Some(spec) = known.spec(key) else {
                    bail!(
                        "list.default_filters.{key} in {} is not a {} filter",
                        path.display(),
                        kind.as_str()
                    );
                };
                if spec.kind.takes_flag() != matches!(value, FilterValue::Flag(_)) {
                    bail!(
                        "list.default_filters.{key} in {} has the wrong type; use {}",
                        path.display(),
                        if spec.kind.takes_flag() { "true/false" } else { "a string" }
                    );
                }
            }
        }

        if let Some(id) = &self.user.id
            && id.trim().is_empty()
        {
            bail!("user.id in {} must not be empty", path.display());
        }

        if let Some(tick) = &self.countdown.tick {
            let parsed = parse_duration(tick)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "countdown.tick in {} must be positive, got {}",
                    path.display(),
                    tick
                );
            }
        }

        if let Some(field) = &self.countdown.deadline_field
            && field.trim().is_empty()
        {
            bail!(
                "countdown.deadline_field in {} must name a record field",
                path.display()
            );
        }

        if let Some(filter) = &self.logging.filter {
            EnvFilter::try_new(filter).with_context(|| {
                format!("logging.filter in {} is not a valid filter", path.display())
            })?;
        }

        Ok(())
    }

    pub fn list_kind(&self) -> Result<ListKind> {
        match self.list.kind.as_deref() {
            None => Ok(ListKind::Cases),
            Some(raw) => ListKind::parse(raw).ok_or_else(|| {
                anyhow!(
                    "unknown list.kind {raw:?}; use one of {}",
                    ListKind::ALL.map(ListKind::as_str).join(", ")
                )
            }),
        }
    }

    pub fn page_size(&self) -> NonZeroUsize {
        self.list
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .and_then(NonZeroUsize::new)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Filters applied when the list opens. The case list defaults to open,
    /// high-priority cases.
    pub fn default_filters(&self) -> Result<Vec<(String, FilterValue)>> {
        if let Some(filters) = &self.list.default_filters {
            return Ok(filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect());
        }
        Ok(match self.list_kind()? {
            ListKind::Cases => vec![
                ("status".to_owned(), FilterValue::from(NOT_CLOSED_LABEL)),
                ("priority".to_owned(), FilterValue::from("High")),
            ],
            ListKind::CaseActivities => Vec::new(),
        })
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.user.id.as_deref().map(UserId::new)
    }

    pub fn tick_interval(&self) -> Result<Duration> {
        match self.countdown.tick.as_deref() {
            Some(raw) => parse_duration(raw),
            None => Ok(TICK_INTERVAL),
        }
    }

    pub fn deadline_field(&self) -> &str {
        self.countdown
            .deadline_field
            .as_deref()
            .unwrap_or(SLA_TARGET_FIELD)
    }

    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# caseboard config\n# Place this file at: {}\n\nversion = 1\n\n[list]\n# \"cases\" or \"activities\"\nkind = \"cases\"\npage_size = {}\n\n[list.default_filters]\nstatus = \"{}\"\npriority = \"High\"\n\n[user]\n# Required for the `mine` filter.\n# id = \"005000000000001AAA\"\n\n[countdown]\ntick = \"1s\"\ndeadline_field = \"{}\"\n\n[logging]\n# Overridden by CASEBOARD_LOG.\nfilter = \"{}\"\n",
            path.display(),
            DEFAULT_PAGE_SIZE,
            NOT_CLOSED_LABEL,
            SLA_TARGET_FIELD,
            DEFAULT_LOG_FILTER,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid tick duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid tick duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid tick duration {raw:?}"))?;
        let secs = mins
            .checked_mul(60)
            .ok_or_else(|| anyhow!("tick duration {raw:?} is too large"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 1s)")
}
