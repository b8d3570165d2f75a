//! Prefixed ULID identifiers.
//!
//! Every persisted entity is keyed by `<prefix><ULID>`, e.g.
//! `smv_01J8ZQ3M6W4Y5V2D7K9X0B1C3E`. The prefix names the entity type and the
//! ULID keeps ids sortable by creation time, so string comparison orders ids
//! chronologically within one prefix.

use std::fmt;
use std::str::FromStr;

use sea_orm::{DbErr, DeriveValueType, TryFromU64};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Errors produced when parsing an identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PulidError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier `{0}` has no prefix")]
    MissingPrefix(String),
    #[error("identifier `{value}` does not start with `{expected}`")]
    WrongPrefix { value: String, expected: String },
    #[error("identifier `{0}` does not end in a valid ULID")]
    InvalidUlid(String),
}

/// A prefixed ULID. The empty string is the nil id.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    DeriveValueType,
)]
#[serde(transparent)]
pub struct Pulid(String);

impl Pulid {
    /// Generates a new id. `prefix` includes the trailing underscore.
    pub fn new(prefix: &str) -> Self {
        Pulid(format!("{prefix}{}", Ulid::new()))
    }

    /// The nil id, used for children that have not been persisted yet.
    pub fn nil() -> Self {
        Pulid(String::new())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses any prefixed id.
    pub fn parse(value: &str) -> Result<Self, PulidError> {
        if value.is_empty() {
            return Err(PulidError::Empty);
        }
        let Some((_, ulid)) = value.rsplit_once('_') else {
            return Err(PulidError::MissingPrefix(value.to_string()));
        };
        Ulid::from_string(ulid).map_err(|_| PulidError::InvalidUlid(value.to_string()))?;
        Ok(Pulid(value.to_string()))
    }

    /// Parses an id and checks it carries `prefix`.
    pub fn parse_with_prefix(value: &str, prefix: &str) -> Result<Self, PulidError> {
        let id = Self::parse(value)?;
        if id.prefix() != prefix {
            return Err(PulidError::WrongPrefix {
                value: value.to_string(),
                expected: prefix.to_string(),
            });
        }
        Ok(id)
    }

    /// Prefix including the trailing underscore; empty for the nil id.
    pub fn prefix(&self) -> &str {
        match self.0.rfind('_') {
            Some(idx) => &self.0[..=idx],
            None => "",
        }
    }

    /// Millisecond timestamp encoded in the ULID part.
    pub fn timestamp_ms(&self) -> Option<u64> {
        let (_, ulid) = self.0.rsplit_once('_')?;
        Ulid::from_string(ulid).ok().map(|ulid| ulid.timestamp_ms())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Pulid {
    type Err = PulidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Pulid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFromU64 for Pulid {
    fn try_from_u64(_: u64) -> Result<Self, DbErr> {
        Err(DbErr::ConvertFromU64("Pulid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_carry_prefix_and_parse_back() {
        let id = Pulid::new("smv_");
        assert!(id.as_str().starts_with("smv_"));
        assert_eq!(id.prefix(), "smv_");
        assert_eq!(Pulid::parse(id.as_str()).unwrap(), id);
        assert_eq!(id.to_string().parse::<Pulid>().unwrap(), id);
        assert!(id.timestamp_ms().is_some());
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let first = Pulid::new("wrk_");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Pulid::new("wrk_");
        assert!(first < second);
    }

    #[test]
    fn nil_is_empty() {
        let nil = Pulid::nil();
        assert!(nil.is_nil());
        assert_eq!(nil.prefix(), "");
        assert_eq!(Pulid::default(), nil);
        assert!(!Pulid::new("stp_").is_nil());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(Pulid::parse(""), Err(PulidError::Empty));
        assert!(matches!(
            Pulid::parse("01J8ZQ3M6W4Y5V2D7K9X0B1C3E"),
            Err(PulidError::MissingPrefix(_))
        ));
        assert!(matches!(
            Pulid::parse("shp_not-a-ulid"),
            Err(PulidError::InvalidUlid(_))
        ));
    }

    #[test]
    fn checks_expected_prefix() {
        let id = Pulid::new("shp_");
        assert!(Pulid::parse_with_prefix(id.as_str(), "shp_").is_ok());
        assert!(matches!(
            Pulid::parse_with_prefix(id.as_str(), "smv_"),
            Err(PulidError::WrongPrefix { .. })
        ));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = Pulid::new("org_");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
