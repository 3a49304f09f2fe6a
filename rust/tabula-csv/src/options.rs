//! Conversion options shared by all conversion attempts for one column.

use serde::{Deserialize, Serialize};
use tabula_common::{Result, error::Error};

/// Read-only settings that control how raw text is turned into typed values.
///
/// A builder shares one `Arc<ConvertOptions>` across every conversion task, so the
/// options are effectively frozen once a builder has been made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Raw values that denote a null entry.
    pub null_values: Vec<String>,
    /// Raw values that convert to boolean `true`.
    pub true_values: Vec<String>,
    /// Raw values that convert to boolean `false`.
    pub false_values: Vec<String>,
    /// When `false`, type inference never tries the UTF-8 text type and stores
    /// non-numeric columns as binary.
    pub check_utf8: bool,
    /// When `true`, null tokens become nulls in text and binary columns as well.
    /// By default text columns keep every raw value, null tokens included, as a
    /// valid string.
    pub strings_can_be_null: bool,
}

impl ConvertOptions {
    pub fn defaults() -> ConvertOptions {
        ConvertOptions::default()
    }

    pub fn with_null_values<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            null_values: values.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_true_values<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            true_values: values.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_false_values<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            false_values: values.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_check_utf8(self, check_utf8: bool) -> Self {
        Self { check_utf8, ..self }
    }

    pub fn with_strings_can_be_null(self, strings_can_be_null: bool) -> Self {
        Self {
            strings_can_be_null,
            ..self
        }
    }

    /// Rejects option sets that make conversion ambiguous.
    pub fn validate(&self) -> Result<()> {
        if let Some(token) = self
            .true_values
            .iter()
            .find(|token| self.false_values.contains(token))
        {
            return Err(Error::invalid_arg(
                "true_values",
                format!("'{token}' is listed as both a true and a false value"),
            ));
        }
        Ok(())
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            null_values: DEFAULT_NULL_VALUES.iter().map(|s| s.to_string()).collect(),
            true_values: DEFAULT_TRUE_VALUES.iter().map(|s| s.to_string()).collect(),
            false_values: DEFAULT_FALSE_VALUES.iter().map(|s| s.to_string()).collect(),
            check_utf8: true,
            strings_can_be_null: false,
        }
    }
}

const DEFAULT_NULL_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "N/A", "NA", "NULL", "NaN", "n/a", "nan", "null",
];

const DEFAULT_TRUE_VALUES: &[&str] = &["true", "True", "TRUE"];

const DEFAULT_FALSE_VALUES: &[&str] = &["false", "False", "FALSE"];
