//! Canonical target schema and header reconciliation.
//!
//! Every loaded record is projected onto the ten [`CANONICAL_COLUMNS`] in their
//! fixed order. Source headers are matched through [`normalize_key`], so
//! `"wrap up"`, `"Wrap_UP"` and `"WRAP-UP"` all land on `Wrap-UP`. Columns the
//! source lacks are synthesized as empty strings and columns outside the schema
//! are dropped. Values are trimmed, have `\r`/`\n` replaced by spaces and are
//! silently truncated to the column's maximum length.

use std::borrow::Cow;

pub const COLUMN_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalColumn {
    pub name: &'static str,
    pub max_len: usize,
}

pub const CANONICAL_COLUMNS: [CanonicalColumn; COLUMN_COUNT] = [
    CanonicalColumn { name: "Date", max_len: 50 },
    CanonicalColumn { name: "MobileNo", max_len: 50 },
    CanonicalColumn { name: "AgentNameID", max_len: 100 },
    CanonicalColumn { name: "SkillsetName", max_len: 50 },
    CanonicalColumn { name: "StartTime", max_len: 50 },
    CanonicalColumn { name: "EndTime", max_len: 50 },
    CanonicalColumn { name: "HandlingTime", max_len: 50 },
    CanonicalColumn { name: "Wrap-UP", max_len: 100 },
    CanonicalColumn { name: "QRC", max_len: 50 },
    CanonicalColumn { name: "LOB", max_len: 50 },
];

pub fn canonical_names() -> impl Iterator<Item = &'static str> {
    CANONICAL_COLUMNS.iter().map(|column| column.name)
}

/// Case-folds a header and strips spaces, underscores and hyphens.
pub fn normalize_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns the canonical name a raw header maps to, or the trimmed header when
/// it matches nothing.
pub fn normalize_header(raw: &str) -> Cow<'_, str> {
    let key = normalize_key(raw);
    match CANONICAL_COLUMNS
        .iter()
        .find(|column| normalize_key(column.name) == key)
    {
        Some(column) => Cow::Borrowed(column.name),
        None => Cow::Borrowed(raw.trim()),
    }
}

pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|header| normalize_header(header).into_owned())
        .collect()
}

/// One record in canonical order. Always exactly [`COLUMN_COUNT`] fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetRow {
    fields: [String; COLUMN_COUNT],
}

impl TargetRow {
    pub fn fields(&self) -> &[String; COLUMN_COUNT] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        CANONICAL_COLUMNS
            .iter()
            .position(|column| column.name == name)
            .map(|idx| self.fields[idx].as_str())
    }

    pub fn into_fields(self) -> [String; COLUMN_COUNT] {
        self.fields
    }
}

/// Resolved mapping from canonical slot to source column index for one header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    sources: [Option<usize>; COLUMN_COUNT],
}

impl ColumnPlan {
    pub fn from_headers(headers: &[String]) -> Self {
        let normalized = normalize_headers(headers);
        let mut sources = [None; COLUMN_COUNT];
        for (slot, column) in CANONICAL_COLUMNS.iter().enumerate() {
            // First matching source column wins when several normalize alike.
            sources[slot] = normalized.iter().position(|header| header == column.name);
        }
        ColumnPlan { sources }
    }

    pub fn source_index(&self, canonical: &str) -> Option<usize> {
        CANONICAL_COLUMNS
            .iter()
            .position(|column| column.name == canonical)
            .and_then(|slot| self.sources[slot])
    }

    pub fn missing_columns(&self) -> Vec<&'static str> {
        CANONICAL_COLUMNS
            .iter()
            .zip(self.sources.iter())
            .filter(|(_, source)| source.is_none())
            .map(|(column, _)| column.name)
            .collect()
    }

    pub fn project(&self, raw: &[String]) -> TargetRow {
        let mut fields: [String; COLUMN_COUNT] = Default::default();
        for (slot, column) in CANONICAL_COLUMNS.iter().enumerate() {
            let value = self.sources[slot]
                .and_then(|idx| raw.get(idx))
                .map(|s| s.as_str())
                .unwrap_or("");
            fields[slot] = clean_value(value, column.max_len);
        }
        TargetRow { fields }
    }
}

/// Trims, replaces each carriage return and newline with a space and truncates
/// to `max_len` characters.
pub fn clean_value(value: &str, max_len: usize) -> String {
    value
        .trim()
        .chars()
        .map(|ch| match ch {
            '\r' | '\n' => ' ',
            other => other,
        })
        .take(max_len)
        .collect()
}

/// Projects a batch of raw rows onto the canonical schema.
pub fn reconcile(headers: &[String], rows: &[Vec<String>]) -> Vec<TargetRow> {
    let plan = ColumnPlan::from_headers(headers);
    rows.iter().map(|row| plan.project(row)).collect()
}
