use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Number of rows in the extra-items table of every card.
pub const EXTRA_ITEM_ROWS: usize = 6;

pub const DEFAULT_FEE: u32 = 3000;

/// One club member as it appears in the roster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub name: String,
    /// Monthly fee in yen. `None` falls back to the configured default.
    #[serde(default)]
    pub fee: Option<u32>,
    /// Never printed, only carried through import and export.
    #[serde(default)]
    pub note: String,
}

impl MemberRecord {
    pub fn new(name: impl Into<String>, fee: Option<u32>) -> Self {
        Self {
            name: name.into(),
            fee,
            note: String::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn resolved_fee(&self, config: &RosterConfiguration) -> u32 {
        self.fee.unwrap_or(config.default_fee)
    }
}

/// Rejects a dataset containing a member without a name. `row` in the error
/// is 1-based.
pub fn validate_members(members: &[MemberRecord]) -> Result<(), EnvelopeError> {
    for (index, member) in members.iter().enumerate() {
        if member.name.trim().is_empty() {
            return Err(EnvelopeError::BlankName { row: index + 1 });
        }
        if member.fee == Some(0) {
            return Err(EnvelopeError::InvalidFee {
                row: index + 1,
                value: "0".to_string(),
            });
        }
    }
    Ok(())
}

/// Per-sheet settings shared by every card.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RosterConfiguration {
    pub fiscal_year: i32,
    pub default_fee: u32,
    #[serde(default)]
    pub extra_item_labels: Vec<String>,
}

impl RosterConfiguration {
    pub fn new(
        fiscal_year: i32,
        default_fee: u32,
        extra_item_labels: Vec<String>,
    ) -> Result<Self, EnvelopeError> {
        let config = Self {
            fiscal_year,
            default_fee,
            extra_item_labels,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.extra_item_labels.len() > EXTRA_ITEM_ROWS {
            return Err(EnvelopeError::TooManyExtraItems {
                max: EXTRA_ITEM_ROWS,
                got: self.extra_item_labels.len(),
            });
        }
        if self.default_fee == 0 {
            return Err(EnvelopeError::InvalidDefaultFee);
        }
        Ok(())
    }

    /// Label for the given extra-items row, blank past the configured entries.
    pub fn extra_item_label(&self, row: usize) -> &str {
        self.extra_item_labels
            .get(row)
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl Default for RosterConfiguration {
    fn default() -> Self {
        Self {
            fiscal_year: current_fiscal_year(),
            default_fee: DEFAULT_FEE,
            extra_item_labels: default_extra_item_labels(),
        }
    }
}

pub fn default_extra_item_labels() -> Vec<String> {
    (0..EXTRA_ITEM_ROWS)
        .map(|i| {
            if i < 2 {
                format!("臨時集金{}", i + 1)
            } else {
                String::new()
            }
        })
        .collect()
}

/// Fiscal years start in April, so January to March belong to the previous year.
pub fn fiscal_year_of(date: NaiveDate) -> i32 {
    if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    }
}

pub fn current_fiscal_year() -> i32 {
    fiscal_year_of(Local::now().date_naive())
}

/// Roster a fresh session starts with.
pub fn sample_roster(default_fee: u32) -> Vec<MemberRecord> {
    vec![
        MemberRecord::new("山田 太郎", Some(default_fee)),
        MemberRecord::new("鈴木 次郎", Some(default_fee)),
        MemberRecord::new("佐藤 花子", Some(default_fee)).with_note("兄弟割引"),
    ]
}

/// Formats an amount with comma thousands separators, e.g. `3500` -> `3,500`.
pub fn group_thousands(amount: u32) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
