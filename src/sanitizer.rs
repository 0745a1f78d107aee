//! Cell cleaning driven by a declarative rule table.
//!
//! The rules are plain data ([`CleaningRules`]) so they can be serialized with the
//! rest of the configuration and tested on their own.

use crate::error::{PipelineError, Result};
use crate::record::{FieldValue, RawValue};
use crate::schema::ColumnKind;
use crate::utils::format_plain_number;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    #[schemars(description = "ASCII letters A-Z and a-z")]
    AsciiLetter,
    #[schemars(description = "ASCII digits 0-9")]
    AsciiDigit,
    Underscore,
    #[schemars(description = "Any Unicode whitespace character")]
    Whitespace,
}

impl CharClass {
    pub fn matches(self, c: char) -> bool {
        match self {
            CharClass::AsciiLetter => c.is_ascii_alphabetic(),
            CharClass::AsciiDigit => c.is_ascii_digit(),
            CharClass::Underscore => c == '_',
            CharClass::Whitespace => c.is_whitespace(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaseRule {
    Unchanged,
    #[schemars(description = "Uppercase the first character, leave the rest as is")]
    #[default]
    CapitalizeFirst,
    Lower,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextRule {
    #[schemars(description = "Character classes kept; every other character is removed")]
    pub allowed: Vec<CharClass>,

    #[schemars(description = "Strip leading and trailing whitespace after filtering")]
    pub trim: bool,

    pub case: CaseRule,

    #[schemars(description = "Value substituted for null text cells")]
    pub null_replacement: String,
}

impl Default for TextRule {
    fn default() -> Self {
        Self {
            allowed: vec![
                CharClass::AsciiLetter,
                CharClass::AsciiDigit,
                CharClass::Underscore,
                CharClass::Whitespace,
            ],
            trim: true,
            case: CaseRule::CapitalizeFirst,
            null_replacement: String::new(),
        }
    }
}

impl TextRule {
    pub fn allows(&self, c: char) -> bool {
        self.allowed.iter().any(|class| class.matches(c))
    }

    pub fn apply(&self, input: &str) -> String {
        let filtered: String = input.chars().filter(|c| self.allows(*c)).collect();
        let trimmed = if self.trim {
            filtered.trim()
        } else {
            filtered.as_str()
        };

        match self.case {
            CaseRule::Unchanged => trimmed.to_string(),
            CaseRule::Lower => trimmed.to_lowercase(),
            CaseRule::CapitalizeFirst => {
                let mut chars = trimmed.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NumericRule {
    #[schemars(description = "Value substituted for null numeric cells")]
    pub null_replacement: f64,

    #[serde(default = "default_null_markers")]
    #[schemars(description = "Cell spellings read as null, compared case-insensitively after trimming")]
    pub null_markers: Vec<String>,
}

fn default_null_markers() -> Vec<String> {
    ["nan", "na", "n/a", "null"].map(str::to_string).to_vec()
}

impl Default for NumericRule {
    fn default() -> Self {
        Self {
            null_replacement: 0.0,
            null_markers: default_null_markers(),
        }
    }
}

impl NumericRule {
    pub fn is_null_marker(&self, text: &str) -> bool {
        let text = text.trim();
        self.null_markers.iter().any(|m| m.eq_ignore_ascii_case(text))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct CleaningRules {
    #[serde(default)]
    pub text: TextRule,
    #[serde(default)]
    pub numeric: NumericRule,
}

/// Cleans single cells according to the column's declared kind.
pub struct FieldSanitizer<'a> {
    rules: &'a CleaningRules,
}

impl<'a> FieldSanitizer<'a> {
    pub fn new(rules: &'a CleaningRules) -> Self {
        Self { rules }
    }

    pub fn sanitize(
        &self,
        kind: ColumnKind,
        value: &RawValue,
        column: &str,
        row: usize,
    ) -> Result<FieldValue> {
        match kind {
            ColumnKind::Text => Ok(self.sanitize_text(value)),
            ColumnKind::Numeric => self.sanitize_numeric(value, column, row),
            ColumnKind::Timestamp => sanitize_timestamp(value, column, row),
        }
    }

    fn sanitize_text(&self, value: &RawValue) -> FieldValue {
        let text = match value {
            RawValue::Null => self.rules.text.null_replacement.clone(),
            RawValue::Text(s) => self.rules.text.apply(s),
            // Non-string cells in a text column are rendered, then cleaned like any text.
            RawValue::Number(n) => self.rules.text.apply(&format_plain_number(*n)),
            RawValue::Timestamp(t) => self
                .rules
                .text
                .apply(&t.format("%Y-%m-%d %H:%M:%S").to_string()),
        };
        FieldValue::Text(text)
    }

    fn sanitize_numeric(&self, value: &RawValue, column: &str, row: usize) -> Result<FieldValue> {
        let number = match value {
            RawValue::Null => self.rules.numeric.null_replacement,
            RawValue::Number(n) if n.is_nan() => self.rules.numeric.null_replacement,
            RawValue::Number(n) if n.is_infinite() => {
                return Err(type_mismatch(column, ColumnKind::Numeric, row, &n.to_string()))
            }
            RawValue::Number(n) => *n,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() || self.rules.numeric.is_null_marker(trimmed) {
                    self.rules.numeric.null_replacement
                } else {
                    match trimmed.parse::<f64>() {
                        Ok(n) if n.is_finite() => n,
                        _ => return Err(type_mismatch(column, ColumnKind::Numeric, row, s)),
                    }
                }
            }
            RawValue::Timestamp(t) => {
                return Err(type_mismatch(
                    column,
                    ColumnKind::Numeric,
                    row,
                    &t.to_string(),
                ))
            }
        };
        Ok(FieldValue::Number(number))
    }
}

fn sanitize_timestamp(value: &RawValue, column: &str, row: usize) -> Result<FieldValue> {
    match value {
        RawValue::Null => Ok(FieldValue::Null),
        RawValue::Timestamp(t) => Ok(FieldValue::Timestamp(*t)),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(FieldValue::Null)
            } else {
                Ok(FieldValue::Text(trimmed.to_string()))
            }
        }
        RawValue::Number(n) => Err(type_mismatch(
            column,
            ColumnKind::Timestamp,
            row,
            &format_plain_number(*n),
        )),
    }
}

fn type_mismatch(column: &str, kind: ColumnKind, row: usize, found: &str) -> PipelineError {
    PipelineError::TypeMismatch {
        column: column.to_string(),
        declared: kind.to_string(),
        row,
        found: found.to_string(),
    }
}
