// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::ids::RecordId;

pub const ID_FIELD: &str = "Id";
pub const CASE_NUMBER_FIELD: &str = "CaseNumber";
pub const STATUS_FIELD: &str = "Status";
pub const PRIORITY_FIELD: &str = "Priority";
pub const RECORD_TYPE_FIELD: &str = "RecordTypeName";
pub const CONTACT_FIELD: &str = "ContactName";
pub const OWNER_FIELD: &str = "OwnerId";
pub const SLA_TARGET_FIELD: &str = "SLATarget";
pub const ACTIVITY_TYPE_FIELD: &str = "Activity_Type__c";
pub const CONTEXT_FIELD: &str = "Context__c";

pub const CLOSED_STATUS: &str = "Closed";
pub const NOT_CLOSED_LABEL: &str = "Not Closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListKind {
    Cases,
    CaseActivities,
}

impl ListKind {
    pub const ALL: [Self; 2] = [Self::Cases, Self::CaseActivities];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cases => "cases",
            Self::CaseActivities => "activities",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cases" => Some(Self::Cases),
            "activities" => Some(Self::CaseActivities),
            _ => None,
        }
    }
}

/// A single field value as delivered by the record store.
///
/// `Composite` holds nested data such as a related-record lookup; it has no
/// string form and filters treat it as a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Composite(Value),
}

impl FieldValue {
    /// String form used by predicates. `None` only for composite values.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => Some(Cow::Borrowed("")),
            Self::Bool(true) => Some(Cow::Borrowed("true")),
            Self::Bool(false) => Some(Cow::Borrowed("false")),
            Self::Number(number) => Some(Cow::Owned(number.to_string())),
            Self::Text(text) => Some(Cow::Borrowed(text)),
            Self::Composite(_) => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Composite(value) => value.to_string(),
            other => other.text().map(Cow::into_owned).unwrap_or_default(),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Number(number) => Value::Number(number.clone()),
            Self::Text(text) => Value::String(text.clone()),
            Self::Composite(value) => value.clone(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::Number(number),
            Value::String(text) => Self::Text(text),
            composite @ (Value::Array(_) | Value::Object(_)) => Self::Composite(composite),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

/// An opaque, field-addressable record with a stable identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        let id = id.into();
        let mut fields = BTreeMap::new();
        fields.insert(ID_FIELD.to_owned(), FieldValue::Text(id.as_str().to_owned()));
        Self { id, fields }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        if name != ID_FIELD {
            self.fields.insert(name.to_owned(), value.into());
        }
        self
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text of a field, or `None` when the field is absent, null, or composite.
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.field(name)
            .filter(|value| !value.is_null())
            .and_then(FieldValue::text)
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        if name == ID_FIELD {
            bail!("the {ID_FIELD} field is read-only");
        }
        self.fields.insert(name.to_owned(), value.into());
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            bail!("record must be a JSON object");
        };
        let id = match map.get(ID_FIELD) {
            Some(Value::String(id)) if !id.trim().is_empty() => RecordId::new(id.clone()),
            Some(Value::Number(id)) => RecordId::new(id.to_string()),
            _ => bail!("record is missing a string `{ID_FIELD}` field"),
        };

        let mut record = Self::new(id);
        for (name, value) in map {
            if name != ID_FIELD {
                record.fields.insert(name, FieldValue::from(value));
            }
        }
        Ok(record)
    }

    pub fn list_from_json(raw: &str) -> Result<Vec<Self>> {
        let value: Value = serde_json::from_str(raw).context("parse records JSON")?;
        let Value::Array(items) = value else {
            return Err(anyhow!("records JSON must be an array of objects"));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Self::from_json(item).with_context(|| format!("record #{index}")))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicklistOption {
    pub label: String,
    pub value: String,
}

impl PicklistOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// Status choices with the "Not Closed" sentinel in front of the
    /// provider's values.
    pub fn status_options(values: impl IntoIterator<Item = Self>) -> Vec<Self> {
        let mut options = vec![Self::new(NOT_CLOSED_LABEL, NOT_CLOSED_LABEL)];
        options.extend(values);
        options
    }
}

/// Supplies the raw record collection for a list.
pub trait ListLoader {
    fn load(&mut self) -> Result<Vec<Record>>;
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, ID_FIELD, PicklistOption, Record};
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn record_decodes_fields_and_id() -> Result<()> {
        let record = Record::from_json(json!({
            "Id": "500A",
            "Status": "Open",
            "IsEscalated": true,
            "Case__r": { "CaseNumber": "0001" },
            "ContactName": null
        }))?;
        assert_eq!(record.id().as_str(), "500A");
        assert_eq!(record.field("Status"), Some(&FieldValue::from("Open")));
        assert_eq!(record.text("IsEscalated").as_deref(), Some("true"));
        assert!(matches!(record.field("Case__r"), Some(FieldValue::Composite(_))));
        assert_eq!(record.text("ContactName"), None);
        Ok(())
    }

    #[test]
    fn record_without_id_is_rejected() {
        let error = Record::from_json(json!({ "Status": "Open" }))
            .expect_err("missing id should fail");
        assert!(error.to_string().contains(ID_FIELD));
    }

    #[test]
    fn list_decoding_names_the_bad_record() {
        let error = Record::list_from_json(r#"[{"Id":"1"},{"Status":"Open"}]"#)
            .expect_err("second record lacks an id");
        assert!(format!("{error:#}").contains("record #1"));
    }

    #[test]
    fn id_field_is_read_only() {
        let mut record = Record::new("1");
        assert!(record.set_field(ID_FIELD, "2").is_err());
        assert_eq!(record.id().as_str(), "1");
    }

    #[test]
    fn numeric_ids_are_accepted() -> Result<()> {
        let record = Record::from_json(json!({ "Id": 42 }))?;
        assert_eq!(record.id().as_str(), "42");
        Ok(())
    }

    #[test]
    fn status_options_lead_with_sentinel() {
        let options = PicklistOption::status_options([PicklistOption::new("Open", "Open")]);
        assert_eq!(options[0].value, "Not Closed");
        assert_eq!(options.len(), 2);
    }
}
