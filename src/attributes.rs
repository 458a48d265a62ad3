//! TXT record key/value attributes (spec §3), encoded per RFC 6763 §6: each
//! entry as a length-prefixed string `key` or `key=value`.

use std::collections::BTreeMap;

/// Ordered mapping from a non-empty ASCII key to an optional opaque byte
/// value. Insertion order is preserved for encoding; on decode, duplicate
/// keys retain only the first occurrence and empty keys are discarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    // A Vec keeps insertion order for round-trip-stable encoding; lookups
    // are rare enough (one service's TXT record) that linear scan is fine.
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl Attributes {
    pub fn new() -> Attributes {
        Attributes::default()
    }

    /// Inserts or overwrites `key`. Returns `false` (and leaves the map
    /// unchanged) for an empty key.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<Vec<u8>>) -> bool {
        let key = key.into();
        if key.is_empty() {
            return false;
        }
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == &key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<Option<&[u8]>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&[u8]>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Encodes as the sequence of `<len><key>` or `<len><key>=<value>`
    /// strings that make up a TXT record's RDATA.
    pub fn to_wire(&self) -> Vec<u8> {
        if self.entries.is_empty() {
            // RFC 6763 §6.1: an empty TXT record contains a single zero byte.
            return vec![0];
        }

        let mut out = Vec::new();
        for (key, value) in &self.entries {
            let mut entry = Vec::with_capacity(key.len() + 1 + value.as_ref().map_or(0, |v| v.len()));
            entry.extend_from_slice(key.as_bytes());
            if let Some(value) = value {
                entry.push(b'=');
                entry.extend_from_slice(value);
            }
            debug_assert!(entry.len() <= 255, "TXT entry exceeds 255 octets");
            out.push(entry.len() as u8);
            out.extend_from_slice(&entry);
        }
        out
    }

    /// Decodes a TXT record's RDATA. Malformed length prefixes (running
    /// past the end of `buf`) are treated as the end of the attribute
    /// list rather than a hard failure, matching how lenient mDNS
    /// responders treat neighboring garbage.
    pub fn from_wire(buf: &[u8]) -> Attributes {
        let mut attrs = Attributes::new();
        let mut offset = 0;

        while offset < buf.len() {
            let len = buf[offset] as usize;
            offset += 1;

            let Some(entry) = buf.get(offset..offset + len) else {
                break;
            };
            offset += len;

            if entry.is_empty() {
                continue;
            }

            let (key, value) = match entry.iter().position(|&b| b == b'=') {
                Some(i) => (&entry[..i], Some(entry[i + 1..].to_vec())),
                None => (entry, None),
            };

            let Ok(key) = std::str::from_utf8(key) else {
                continue;
            };
            if key.is_empty() || attrs.contains_key(key) {
                continue;
            }

            attrs.insert(key, value);
        }

        attrs
    }

    /// A stable, sorted snapshot useful for equality-oriented tests and
    /// for clients that don't care about insertion order.
    pub fn as_sorted_map(&self) -> BTreeMap<String, Option<Vec<u8>>> {
        self.entries.iter().cloned().collect()
    }
}
