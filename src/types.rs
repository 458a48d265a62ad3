//! Wire-level enums and the [`Question`]/[`Message`] structs (spec §3, §4.1).

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use strum_macros::{Display, EnumString};

use crate::name::Name;
use crate::record::Record;

/// Resource Record Type. Only the types this node speaks (spec §3) have a
/// variant; everything else is an "unsupported" raw code the codec skips
/// rather than a hard decode failure.
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, ToPrimitive, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u16)]
pub enum Type {
    A = 1,
    PTR = 12,
    TXT = 16,
    AAAA = 28,
    SRV = 33,

    /// Pseudo type, valid only in questions (§3): matches any record type.
    ANY = 255,
}

impl Type {
    /// Best-effort conversion used while decoding answer/authority/
    /// additional records: unsupported types return `None` so the caller
    /// can skip the record (honouring its rdlength) instead of failing
    /// the whole message (spec §4.1).
    pub fn from_wire(code: u16) -> Option<Type> {
        FromPrimitive::from_u16(code)
    }

    pub fn to_wire(self) -> u16 {
        ToPrimitive::to_u16(&self).expect("Type always fits in u16")
    }
}

/// Resource Record Class. The core only ever deals with `IN` and the
/// pseudo-class `ANY` (used in questions); the cache-flush/"unique" bit is
/// tracked separately as a `bool` rather than folded into this enum
/// (spec §3).
#[derive(Copy, Clone, Debug, Display, EnumString, FromPrimitive, ToPrimitive, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Class {
    #[strum(serialize = "IN")]
    Internet = 1,

    #[strum(serialize = "*")]
    Any = 255,
}

impl Class {
    /// The 15-bit class code with the cache-flush bit masked out.
    pub fn from_wire(code: u16) -> Option<Class> {
        FromPrimitive::from_u16(code & 0x7FFF)
    }

    /// Splits a raw wire class field into its 15-bit class and the
    /// cache-flush ("unique") bit.
    pub fn from_wire_with_unique(code: u16) -> Option<(Class, bool)> {
        Class::from_wire(code).map(|class| (class, code & 0x8000 != 0))
    }

    pub fn to_wire(self) -> u16 {
        ToPrimitive::to_u16(&self).expect("Class always fits in u16")
    }

    /// Combines this class with the cache-flush bit into the 16-bit wire
    /// representation used in an answer/authority/additional record.
    pub fn to_wire_with_unique(self, unique: bool) -> u16 {
        self.to_wire() | if unique { 0x8000 } else { 0 }
    }
}

/// A DNS question. Never cached (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Question {
    pub name: Name,
    pub r#type: Type,
    pub class: Class,
}

impl Question {
    pub fn new(name: Name, r#type: Type, class: Class) -> Question {
        Question {
            name,
            r#type,
            class,
        }
    }
}

/// The 16-bit flags field of an mDNS message: query-vs-response (the top
/// bit) and authoritative-answer. The transaction ID is always emitted as
/// zero and ignored on input (spec §3).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub response: bool,
    pub authoritative: bool,
}

impl Flags {
    pub fn query() -> Flags {
        Flags {
            response: false,
            authoritative: false,
        }
    }

    pub fn authoritative_response() -> Flags {
        Flags {
            response: true,
            authoritative: true,
        }
    }

    pub(crate) fn from_wire(bits: u16) -> Flags {
        Flags {
            response: bits & 0x8000 != 0,
            authoritative: bits & 0x0400 != 0,
        }
    }

    pub(crate) fn to_wire(self) -> u16 {
        let mut bits = 0u16;
        if self.response {
            bits |= 0x8000;
        }
        if self.authoritative {
            bits |= 0x0400;
        }
        bits
    }
}

/// A DNS message: a header plus the four sections (spec §3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Message {
    pub fn query() -> Message {
        Message {
            flags: Flags::query(),
            ..Default::default()
        }
    }

    pub fn authoritative_response() -> Message {
        Message {
            flags: Flags::authoritative_response(),
            ..Default::default()
        }
    }

    pub fn is_query(&self) -> bool {
        !self.flags.response
    }

    pub fn is_response(&self) -> bool {
        self.flags.response
    }

    pub fn add_question(&mut self, name: Name, r#type: Type, class: Class) {
        self.questions.push(Question::new(name, r#type, class));
    }
}
