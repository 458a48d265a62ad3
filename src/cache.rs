//! The shared record cache (spec §4.2): a keyed multimap of live records
//! with lazy TTL expiry. No background reaper runs; expired records are
//! only ever treated as absent, and are physically dropped opportunistically
//! once they are stale well past their own TTL (`ttl_expiry_grace`).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::name::Name;
use crate::record::Record;
use crate::types::{Class, Type};

#[derive(Default)]
struct Bucket {
    records: Vec<Record>,
}

/// A concurrent, read-mostly store of resource records keyed by owner name.
pub struct Cache {
    buckets: RwLock<HashMap<String, Bucket>>,
    expiry_grace: std::time::Duration,
}

impl Cache {
    pub fn new(expiry_grace: std::time::Duration) -> Cache {
        Cache {
            buckets: RwLock::new(HashMap::new()),
            expiry_grace,
        }
    }

    /// Adds or refreshes a record (spec §4.2). A `ttl == 0` record is a
    /// goodbye: it removes the matching live record (by full protocol +
    /// payload equality) rather than ever being stored.
    pub fn add(&self, record: Record, now: Instant) {
        let key = record.name.to_ascii_lowercase_key();
        let mut buckets = self.buckets.write().unwrap();
        let bucket = buckets.entry(key).or_default();

        self.tidy_bucket(bucket, now);

        if record.is_goodbye() {
            bucket.records.retain(|r| !r.is_same_record(&record));
            return;
        }

        if let Some(existing) = bucket
            .records
            .iter_mut()
            .find(|r| r.is_same_record(&record))
        {
            *existing = record;
        } else {
            bucket.records.push(record);
        }
    }

    /// The first non-expired record matching `name`/`type`/`class`, where
    /// `Type::ANY`/`Class::Any` act as wildcards (spec §4.2).
    pub fn get_by_key(&self, name: &Name, r#type: Type, class: Class, now: Instant) -> Option<Record> {
        let key = name.to_ascii_lowercase_key();
        let buckets = self.buckets.read().unwrap();
        let bucket = buckets.get(&key)?;

        bucket
            .records
            .iter()
            .find(|r| {
                !r.is_expired(now)
                    && (r#type == Type::ANY || r.r#type() == r#type)
                    && (class == Class::Any || r.class == class)
            })
            .cloned()
    }

    /// All non-expired records stored under `name`, regardless of type or
    /// class.
    pub fn entries(&self, name: &Name, now: Instant) -> Vec<Record> {
        let key = name.to_ascii_lowercase_key();
        let buckets = self.buckets.read().unwrap();
        match buckets.get(&key) {
            Some(bucket) => bucket
                .records
                .iter()
                .filter(|r| !r.is_expired(now))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn clear(&self) {
        self.buckets.write().unwrap().clear();
    }

    /// Opportunistically drops records that have been expired for more
    /// than `expiry_grace`. This never changes the answer `get_by_key`/
    /// `entries` give (they already treat expired records as absent); it
    /// only bounds how long dead entries sit in memory.
    fn tidy_bucket(&self, bucket: &mut Bucket, now: Instant) {
        let grace = self.expiry_grace;
        bucket
            .records
            .retain(|r| now.saturating_duration_since(r.expires_at()) < grace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn a_record(name: &str, ttl_secs: u64, now: Instant) -> Record {
        Record::new(
            Name::new(name).unwrap(),
            Class::Internet,
            true,
            Duration::from_secs(ttl_secs),
            now,
            Payload::A(Ipv4Addr::new(127, 0, 0, 1)),
        )
    }

    #[test]
    fn get_by_key_is_absent_before_add_and_present_after() {
        let cache = Cache::new(Duration::from_secs(1000));
        let now = Instant::now();
        let name = Name::new("host.local").unwrap();

        assert!(cache.get_by_key(&name, Type::A, Class::Internet, now).is_none());

        cache.add(a_record("host.local", 120, now), now);
        assert!(cache.get_by_key(&name, Type::A, Class::Internet, now).is_some());
    }

    #[test]
    fn wildcard_type_and_class_match() {
        let cache = Cache::new(Duration::from_secs(1000));
        let now = Instant::now();
        let name = Name::new("host.local").unwrap();
        cache.add(a_record("host.local", 120, now), now);

        assert!(cache.get_by_key(&name, Type::ANY, Class::Internet, now).is_some());
        assert!(cache.get_by_key(&name, Type::A, Class::Any, now).is_some());
    }

    #[test]
    fn expired_records_are_treated_as_absent() {
        let cache = Cache::new(Duration::from_secs(1000));
        let now = Instant::now();
        let name = Name::new("host.local").unwrap();
        cache.add(a_record("host.local", 1, now), now);

        let later = now + Duration::from_secs(2);
        assert!(cache.get_by_key(&name, Type::A, Class::Internet, later).is_none());
    }

    #[test]
    fn goodbye_removes_the_matching_record() {
        let cache = Cache::new(Duration::from_secs(1000));
        let now = Instant::now();
        let name = Name::new("host.local").unwrap();
        cache.add(a_record("host.local", 120, now), now);

        let goodbye = a_record("host.local", 0, now);
        cache.add(goodbye, now);

        assert!(cache.get_by_key(&name, Type::A, Class::Internet, now).is_none());
    }

    #[test]
    fn refreshing_a_record_replaces_its_ttl_in_place() {
        let cache = Cache::new(Duration::from_secs(1000));
        let now = Instant::now();
        let name = Name::new("host.local").unwrap();
        cache.add(a_record("host.local", 120, now), now);

        let later = now + Duration::from_secs(10);
        cache.add(a_record("host.local", 120, later), later);

        let got = cache.get_by_key(&name, Type::A, Class::Internet, later).unwrap();
        assert_eq!(got.remaining_ttl(later), Duration::from_secs(120));
        assert_eq!(cache.entries(&name, later).len(), 1);
    }

    #[test]
    fn long_expired_entries_are_tidied_past_the_grace_window() {
        let cache = Cache::new(Duration::from_secs(5));
        let now = Instant::now();
        cache.add(a_record("host.local", 1, now), now);

        let name = Name::new("host.local").unwrap();
        let well_past_grace = now + Duration::from_secs(30);
        // Triggers tidy on the next add to the same bucket.
        cache.add(a_record("other.local", 1, well_past_grace), well_past_grace);
        // host.local's bucket is untouched by an add to a different key,
        // so force a tidy on it directly via another add to itself.
        cache.add(a_record("host.local", 1, well_past_grace), well_past_grace);

        assert_eq!(cache.entries(&name, well_past_grace).len(), 1);
    }
}
