//! A DNS domain name (spec §3): a case-insensitive, dot-terminated string.
//! Labels are 1-63 octets; a serialized name is at most 255 octets.

use crate::errors::DecodeError;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct Name(String);

impl Name {
    pub const MAX_NAME_LEN: usize = 255;
    pub const MAX_LABEL_LEN: usize = 63;

    /// Builds a [`Name`] from its dot-separated text form, validating each
    /// label's length and the overall serialized size. A trailing dot is
    /// added if missing.
    pub fn new(s: impl Into<String>) -> Result<Name, DecodeError> {
        let mut s = s.into();
        if !s.ends_with('.') {
            s.push('.');
        }

        let mut wire_len = 1usize; // root label terminator
        for label in s.split_terminator('.') {
            if label.is_empty() {
                return Err(DecodeError::UnterminatedName);
            }
            if label.len() > Name::MAX_LABEL_LEN {
                return Err(DecodeError::LabelTooLong);
            }
            wire_len += 1 + label.len();
        }

        if wire_len > Name::MAX_NAME_LEN {
            return Err(DecodeError::NameTooLong);
        }

        Ok(Name(s))
    }

    /// The root name ".".
    pub fn root() -> Name {
        Name(".".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Labels in order, without the trailing empty root label.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.split_terminator('.').filter(|l| !l.is_empty())
    }

    /// Lower-cased form used as a cache/lookup key (ASCII case folding,
    /// per spec §3 — `.local.` names are ASCII only).
    pub fn to_ascii_lowercase_key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// A new name formed by prefixing `self` with `prefix` (e.g. an
    /// instance name prefixed onto a registration pointer name to form a
    /// service name).
    pub fn prepend(&self, prefix: &str) -> Result<Name, DecodeError> {
        Name::new(format!("{}.{}", prefix, self.0))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name equality is case-insensitive (spec §3's `name⇓` comparison).
impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}
impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            b.to_ascii_lowercase().hash(state);
        }
    }
}

impl From<&Name> for String {
    fn from(n: &Name) -> String {
        n.0.clone()
    }
}
