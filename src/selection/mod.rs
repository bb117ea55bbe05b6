//! Selection of the VMs a run backs up.
//!
//! A run either discovers servers through the compute service, narrowed by a
//! name glob and tag/metadata predicates, or works from an explicit list of
//! server names.

use std::collections::HashMap;

use glob::Pattern;
use thiserror::Error;

/// Server statuses from which a consistent backup can be taken.
pub const BACKUP_SUPPORTED_STATUSES: [&str; 4] = ["ACTIVE", "SHUTOFF", "PAUSED", "SUSPENDED"];

/// Returns `true` when a server in `status` may be backed up.
#[must_use]
pub fn is_backup_supported(status: &str) -> bool {
    BACKUP_SUPPORTED_STATUSES
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(status.trim()))
}

/// Errors raised while parsing selection filters.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SelectionError {
    /// Raised when the name filter is not a valid glob.
    #[error("invalid VM name filter '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern supplied by the caller.
        pattern: String,
        /// Parser message.
        message: String,
    },
    /// Raised when a tag predicate has no key.
    #[error("invalid VM tag filter '{raw}': every entry needs a key")]
    EmptyTagKey {
        /// Filter string supplied by the caller.
        raw: String,
    },
}

/// A single `key` or `key:value` tag predicate.
///
/// A key-only predicate matches a metadata entry with that key whatever its
/// value, including non-empty values. Use `key:` to match only an empty
/// metadata value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagPredicate {
    /// Tag name or metadata key.
    pub key: String,
    /// Expected metadata value, when given.
    pub value: Option<String>,
}

impl TagPredicate {
    /// Returns `true` when `key` is a server tag, or a metadata entry whose
    /// value matches (any value when the predicate carries none).
    #[must_use]
    pub fn matches(&self, tags: &[String], metadata: &HashMap<String, String>) -> bool {
        if tags.iter().any(|tag| tag == &self.key) {
            return true;
        }
        metadata.get(&self.key).is_some_and(|actual| {
            self.value
                .as_deref()
                .is_none_or(|expected| expected == actual)
        })
    }
}

/// Parses a comma-separated `key[:value]` list.
///
/// # Errors
///
/// Returns [`SelectionError::EmptyTagKey`] when an entry has no key.
pub fn parse_tag_predicates(raw: &str) -> Result<Vec<TagPredicate>, SelectionError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|entry| {
            let (key, value) = match entry.split_once(':') {
                Some((key, value)) => (key.trim(), Some(value.trim().to_owned())),
                None => (entry.trim(), None),
            };
            if key.is_empty() {
                return Err(SelectionError::EmptyTagKey {
                    raw: raw.to_owned(),
                });
            }
            Ok(TagPredicate {
                key: key.to_owned(),
                value,
            })
        })
        .collect()
}

/// Narrowing applied to discovered servers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VmFilter {
    name_pattern: Option<Pattern>,
    tags: Vec<TagPredicate>,
}

impl VmFilter {
    /// Builds a filter from an optional glob and an optional tag list.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] when either input fails to parse.
    pub fn new(name_pattern: Option<&str>, tags: Option<&str>) -> Result<Self, SelectionError> {
        let pattern = name_pattern
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| {
                Pattern::new(pattern).map_err(|err| SelectionError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    message: err.to_string(),
                })
            })
            .transpose()?;
        let predicates = tags.map(parse_tag_predicates).transpose()?.unwrap_or_default();
        Ok(Self {
            name_pattern: pattern,
            tags: predicates,
        })
    }

    /// Returns `true` when `name` matches the glob, or no glob is set.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_pattern
            .as_ref()
            .is_none_or(|pattern| pattern.matches(name))
    }

    /// Returns `true` when tag/metadata lookups are needed to evaluate the
    /// filter.
    #[must_use]
    pub fn has_tag_predicates(&self) -> bool {
        !self.tags.is_empty()
    }

    /// Returns `true` when every tag predicate matches.
    #[must_use]
    pub fn matches_tags(&self, tags: &[String], metadata: &HashMap<String, String>) -> bool {
        self.tags
            .iter()
            .all(|predicate| predicate.matches(tags, metadata))
    }

    /// Name glob as written by the user.
    #[must_use]
    pub fn name_pattern(&self) -> Option<&str> {
        self.name_pattern.as_ref().map(Pattern::as_str)
    }

    /// Parsed tag predicates.
    #[must_use]
    pub fn tag_predicates(&self) -> &[TagPredicate] {
        &self.tags
    }
}

/// How the set of VMs for a run is determined.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VmSelection {
    /// Ask the compute service for every matching server.
    Discover(VmFilter),
    /// Resolve each listed name to a server.
    Named(Vec<String>),
}

#[cfg(test)]
mod tests;
