//! Natural keys
//!
//! Composite keys are structs with derived `Eq`/`Hash`, so a separator
//! character inside a name can never make two different keys collide.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Party registration number (natural key and primary key of `parties`)
pub type PartyNumber = i64;

/// Politician identity: legal name plus ballot nickname
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoliticianKey {
    pub full_name: String,
    pub nickname: String,
}

impl PoliticianKey {
    pub fn new(full_name: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            nickname: nickname.into(),
        }
    }
}

impl fmt::Display for PoliticianKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.full_name, self.nickname)
    }
}

/// Election identity: year, turn and election-type label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElectionKey {
    pub year: i32,
    pub turn: i32,
    pub type_label: String,
}

impl ElectionKey {
    pub fn new(year: i32, turn: i32, type_label: impl Into<String>) -> Self {
        Self {
            year,
            turn,
            type_label: type_label.into(),
        }
    }

    /// Election day: October 2 for the first turn, October 30 for any later one
    ///
    /// Returns `None` for turns below 1 or years chrono cannot represent.
    pub fn election_date(&self) -> Option<NaiveDate> {
        let day = match self.turn {
            1 => 2,
            t if t > 1 => 30,
            _ => return None,
        };
        NaiveDate::from_ymd_opt(self.year, 10, day)
    }
}

impl fmt::Display for ElectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/turn {}/{}", self.year, self.turn, self.type_label)
    }
}
