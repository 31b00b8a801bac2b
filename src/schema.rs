use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::similarity::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default, rename = "type")]
    pub kind: ColumnType,
    /// Allowed values of a categorical column; empty means free-form.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            aliases: BTreeSet::new(),
            kind,
            categories: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.extend(categories.into_iter().map(Into::into));
        self
    }

    /// Name followed by aliases, the labels a raw header is compared against.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Target column structure, fixed for a processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalSchema {
    pub columns: Vec<ColumnDef>,
}

impl CanonicalSchema {
    #[must_use]
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// Columns of a parliamentary roll-call vote table.
    #[must_use]
    pub fn roll_call() -> Self {
        Self::new(vec![
            ColumnDef::new("Name", ColumnType::Text).with_aliases([
                "Namen",
                "Name des Abgeordneten",
                "Abgeordneter",
            ]),
            ColumnDef::new("District", ColumnType::Numeric).with_aliases([
                "Wahlkreis",
                "Wahlkr.",
                "Wahlkr",
                "Wkr.",
            ]),
            ColumnDef::new("Party", ColumnType::Text).with_aliases(["Partei", "Fraktion"]),
            ColumnDef::new("Vote", ColumnType::Categorical)
                .with_aliases(["Abstimmung", "Stimme", "Abgegebene Stimme"])
                .with_categories([
                    "Ja",
                    "Nein",
                    "Enthalten",
                    "Krank",
                    "Beurlaubt",
                    "Entschuldigt",
                ]),
        ])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Case-insensitive exact lookup by column name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let wanted = normalize(name);
        self.columns
            .iter()
            .position(|column| normalize(&column.name) == wanted)
    }

    pub(crate) fn validate(&self) -> Result<(), ReconError> {
        if self.columns.is_empty() {
            return Err(ReconError::InvalidConfig(
                "canonical schema must declare at least one column".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            let key = normalize(&column.name);
            if key.is_empty() {
                return Err(ReconError::InvalidConfig(
                    "canonical column names must be non-empty".to_string(),
                ));
            }
            if !seen.insert(key) {
                return Err(ReconError::InvalidConfig(format!(
                    "duplicate canonical column '{}'",
                    column.name
                )));
            }
            if column.aliases.iter().any(|alias| normalize(alias).is_empty()) {
                return Err(ReconError::InvalidConfig(format!(
                    "column '{}' declares an empty alias",
                    column.name
                )));
            }
            if column.kind != ColumnType::Categorical && !column.categories.is_empty() {
                return Err(ReconError::InvalidConfig(format!(
                    "column '{}' lists categories but is not categorical",
                    column.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::roll_call()
    }
}
