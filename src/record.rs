//! The record tagged variant and its TTL lifecycle (spec §3, §4.6).

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use crate::attributes::Attributes;
use crate::name::Name;
use crate::types::{Class, Message, Type};

/// `{ priority, weight, port, server }` payload of an SRV record.
#[derive(Clone, Debug, PartialEq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub server: Name,
}

/// Per-variant payload, keyed by the record's [`Type`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    Ptr(Name),
    Srv(Srv),
    Txt(Attributes),
}

impl Payload {
    pub fn r#type(&self) -> Type {
        match self {
            Payload::A(_) => Type::A,
            Payload::AAAA(_) => Type::AAAA,
            Payload::Ptr(_) => Type::PTR,
            Payload::Srv(_) => Type::SRV,
            Payload::Txt(_) => Type::TXT,
        }
    }
}

/// A resource record. All variants share `{ name, class, ttl, created_at }`
/// plus a payload (spec §3). `ttl = 0` marks a goodbye notification — such
/// a record must never be cached as live (see [`Record::is_goodbye`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub name: Name,
    pub class: Class,
    pub unique: bool,
    pub ttl: Duration,
    pub created_at: Instant,
    pub payload: Payload,
}

impl Record {
    pub fn new(
        name: Name,
        class: Class,
        unique: bool,
        ttl: Duration,
        created_at: Instant,
        payload: Payload,
    ) -> Record {
        Record {
            name,
            class,
            unique,
            ttl,
            created_at,
            payload,
        }
    }

    pub fn r#type(&self) -> Type {
        self.payload.r#type()
    }

    pub fn is_goodbye(&self) -> bool {
        self.ttl.is_zero()
    }

    /// The instant this record stops being valid.
    pub fn expires_at(&self) -> Instant {
        self.created_at + self.ttl
    }

    /// Seconds remaining until expiry at `now`, clamped to zero. Monotone
    /// non-increasing in `now` (spec §8 property 3).
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.expires_at().saturating_duration_since(now)
    }

    /// Whether this record has expired as of `now`. Monotone in `now`
    /// (spec §8 property 3).
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }

    /// `(name⇓, type, class15)` equality, ignoring payload and the
    /// cache-flush bit (spec §3).
    pub fn protocol_eq(&self, other: &Record) -> bool {
        self.name == other.name && self.r#type() == other.r#type() && self.class == other.class
    }

    /// Full equality: protocol-equal and identical payload.
    pub fn is_same_record(&self, other: &Record) -> bool {
        self.protocol_eq(other) && self.payload == other.payload
    }

    /// Whether this record would be suppressed by a known-answer already
    /// present in `message` (spec §4.6): some record in the message's
    /// answers/authorities/additionals shares `(name⇓, type, class15)` and
    /// has `ttl >= self.ttl / 2`.
    pub fn suppressed_by(&self, message: &Message) -> bool {
        message
            .answers
            .iter()
            .chain(message.authorities.iter())
            .chain(message.additionals.iter())
            .any(|candidate| self.protocol_eq(candidate) && candidate.ttl >= self.ttl / 2)
    }

    /// Builds a copy of this record with its TTL rewritten to the amount
    /// remaining at `stamp`, for inclusion as a known-answer suppression
    /// hint in an outgoing query (spec §4.5, §4.1's "stamped answer").
    /// Returns `None` if the remaining TTL would be negative (already
    /// expired answers are dropped before encoding).
    pub fn stamped(&self, stamp: Instant) -> Option<Record> {
        if self.is_expired(stamp) {
            return None;
        }
        Some(Record {
            ttl: self.remaining_ttl(stamp),
            ..self.clone()
        })
    }
}
