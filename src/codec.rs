//! The binary DNS wire codec (spec §4.1): header, questions, and the three
//! record sections, with RFC 1035 §4.1.4 name compression on both paths.

use byteorder::{ReadBytesExt, BE};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use crate::attributes::Attributes;
use crate::errors::DecodeError;
use crate::name::Name;
use crate::record::{Payload, Record, Srv};
use crate::types::{Class, Flags, Message, Question, Type};

/// Maximum mDNS datagram size (spec §4.1, §6.1).
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// A 14-bit compression pointer can only reference the first 16KiB of the
/// message; offsets past that are never recorded for reuse.
const MAX_POINTER_OFFSET: usize = 0x3FFF;

// ---------------------------------------------------------------- decode --

struct Decoder<'a> {
    cur: Cursor<&'a [u8]>,
    received_at: Instant,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8], received_at: Instant) -> Decoder<'a> {
        Decoder {
            cur: Cursor::new(buf),
            received_at,
        }
    }

    fn position(&mut self) -> usize {
        self.cur.position() as usize
    }

    fn remaining(&self) -> usize {
        let buf = self.cur.get_ref();
        buf.len().saturating_sub(self.cur.position() as usize)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let mut out = vec![0u8; len];
        self.cur.read_exact(&mut out).map_err(DecodeError::from)?;
        Ok(out)
    }

    /// Reads a (possibly compressed) domain name starting at the cursor's
    /// current position, leaving the cursor positioned right after the
    /// name's own encoding (i.e. after the terminator or the 2-byte
    /// pointer, never after a followed jump).
    fn read_name(&mut self) -> Result<Name, DecodeError> {
        let mut labels: Vec<String> = Vec::new();
        let start = self.position();
        self.read_name_from(start, &mut labels, start)?;

        let text = if labels.is_empty() {
            ".".to_string()
        } else {
            let mut s = labels.join(".");
            s.push('.');
            s
        };
        Name::new(text)
    }

    /// Reads labels into `labels`, following compression pointers. `limit`
    /// is the position before which any pointer must land (RFC 1035
    /// forbids forward/self pointers; we require strictly-decreasing
    /// pointer targets to rule out loops).
    fn read_name_from(
        &mut self,
        entry_pos: usize,
        labels: &mut Vec<String>,
        mut limit: usize,
    ) -> Result<(), DecodeError> {
        loop {
            let label_pos = self.position();
            let len = self.cur.read_u8().map_err(DecodeError::from)?;

            if len == 0 {
                return Ok(());
            }

            match len & 0xC0 {
                0x00 => {
                    let len = len as usize;
                    if len > Name::MAX_LABEL_LEN {
                        return Err(DecodeError::LabelTooLong);
                    }
                    let raw = self.read_bytes(len)?;
                    let label = std::str::from_utf8(&raw)
                        .map_err(|_| DecodeError::LabelTooLong)?
                        .to_string();
                    labels.push(label);
                    limit = limit.max(label_pos);
                }
                0xC0 => {
                    let b2 = self.cur.read_u8().map_err(DecodeError::from)? as u16;
                    let ptr = (((len as u16) & 0x3F) << 8 | b2) as usize;

                    if ptr >= limit {
                        return Err(DecodeError::BadPointer { offset: entry_pos });
                    }

                    let resume = self.position();
                    self.cur.seek(SeekFrom::Start(ptr as u64)).ok();
                    self.read_name_from(entry_pos, labels, ptr)?;
                    self.cur
                        .seek(SeekFrom::Start(resume as u64))
                        .map_err(DecodeError::from)?;
                    return Ok(());
                }
                _ => return Err(DecodeError::UnterminatedName),
            }
        }
    }

    fn read_question(&mut self) -> Result<Option<Question>, DecodeError> {
        let name = self.read_name()?;
        let r#type = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;
        let class = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;

        Ok(match (Type::from_wire(r#type), Class::from_wire(class)) {
            (Some(r#type), Some(class)) => Some(Question::new(name, r#type, class)),
            // Unsupported question type/class: consumed correctly above,
            // just omitted from the result (spec §4.1's "skip" policy
            // extended to questions for leniency, see DESIGN.md).
            _ => None,
        })
    }

    fn read_record(&mut self) -> Result<Option<Record>, DecodeError> {
        let name = self.read_name()?;
        let r#type = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;
        let class_wire = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;
        let ttl_secs = self.cur.read_u32::<BE>().map_err(DecodeError::from)?;
        let rdlength = self.cur.read_u16::<BE>().map_err(DecodeError::from)? as usize;

        if rdlength > self.remaining() {
            return Err(DecodeError::Underflow(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "rdlength exceeds remaining buffer",
            )));
        }

        let rdata_start = self.position();
        let (r#type, class_and_unique) = (Type::from_wire(r#type), Class::from_wire_with_unique(class_wire));

        let (r#type, (class, unique)) = match (r#type, class_and_unique) {
            // ANY is a question-only pseudo type; seeing it on a concrete
            // record is treated the same as an unknown type.
            (Some(Type::ANY), _) | (None, _) | (_, None) => {
                // Unknown record type (or unsupported class): skip the
                // payload, honouring its length, and omit from the result.
                self.cur
                    .seek(SeekFrom::Start((rdata_start + rdlength) as u64))
                    .map_err(DecodeError::from)?;
                return Ok(None);
            }
            (Some(t), Some(cu)) => (t, cu),
        };

        let payload = match r#type {
            Type::A => {
                if rdlength != 4 {
                    return Err(DecodeError::UnterminatedName);
                }
                let bytes = self.read_bytes(4)?;
                Payload::A(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            Type::AAAA => {
                if rdlength != 16 {
                    return Err(DecodeError::UnterminatedName);
                }
                let bytes = self.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&bytes);
                Payload::AAAA(Ipv6Addr::from(octets))
            }
            Type::PTR => {
                let target = self.read_name()?;
                Payload::Ptr(target)
            }
            Type::SRV => {
                let priority = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;
                let weight = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;
                let port = self.cur.read_u16::<BE>().map_err(DecodeError::from)?;
                let server = self.read_name()?;
                Payload::Srv(Srv {
                    priority,
                    weight,
                    port,
                    server,
                })
            }
            Type::TXT => {
                let raw = self.read_bytes(rdlength)?;
                Payload::Txt(Attributes::from_wire(&raw))
            }
            Type::ANY => unreachable!("ANY is a question-only pseudo type"),
        };

        // Names inside rdata may have been shortened by a trailing
        // compression pointer; rdlength must match exactly what we
        // actually consumed from the rdata region.
        let consumed = self.position() - rdata_start;
        if consumed != rdlength {
            return Err(DecodeError::UnterminatedName);
        }

        Ok(Some(Record::new(
            name,
            class,
            unique,
            Duration::from_secs(ttl_secs as u64),
            self.received_at,
            payload,
        )))
    }
}

/// Decodes a raw mDNS datagram into a [`Message`] (spec §4.1). The 16-bit
/// transaction ID is read and discarded (mDNS always uses zero). `received_at`
/// stamps every decoded record's `created_at`, so TTL arithmetic never calls
/// the wall clock from inside decode logic itself.
pub fn decode(buf: &[u8], received_at: Instant) -> Result<Message, DecodeError> {
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(DecodeError::MessageTooLarge);
    }

    let mut d = Decoder::new(buf, received_at);

    let _id = d.cur.read_u16::<BE>().map_err(DecodeError::from)?;
    let raw_flags = d.cur.read_u16::<BE>().map_err(DecodeError::from)?;
    let flags = Flags::from_wire(raw_flags);

    let qd_count = d.cur.read_u16::<BE>().map_err(DecodeError::from)?;
    let an_count = d.cur.read_u16::<BE>().map_err(DecodeError::from)?;
    let ns_count = d.cur.read_u16::<BE>().map_err(DecodeError::from)?;
    let ar_count = d.cur.read_u16::<BE>().map_err(DecodeError::from)?;

    let mut message = Message {
        flags,
        ..Default::default()
    };

    for _ in 0..qd_count {
        if let Some(q) = d.read_question()? {
            message.questions.push(q);
        }
    }
    for _ in 0..an_count {
        if let Some(r) = d.read_record()? {
            message.answers.push(r);
        }
    }
    for _ in 0..ns_count {
        if let Some(r) = d.read_record()? {
            message.authorities.push(r);
        }
    }
    for _ in 0..ar_count {
        if let Some(r) = d.read_record()? {
            message.additionals.push(r);
        }
    }

    if d.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(d.remaining()));
    }

    Ok(message)
}

// ---------------------------------------------------------------- encode --

struct Encoder {
    buf: Vec<u8>,
    // Lower-cased dotted suffix -> offset it was first written at.
    offsets: HashMap<String, u16>,
}

impl Encoder {
    fn new() -> Encoder {
        Encoder {
            buf: Vec::with_capacity(512),
            offsets: HashMap::new(),
        }
    }

    fn write_name(&mut self, name: &Name) {
        let labels: Vec<&str> = name.labels().collect();

        for i in 0..labels.len() {
            let suffix = labels[i..].join(".").to_ascii_lowercase() + ".";

            if let Some(&offset) = self.offsets.get(&suffix) {
                let ptr = 0xC000u16 | offset;
                self.buf.extend_from_slice(&ptr.to_be_bytes());
                return;
            }

            if self.buf.len() <= MAX_POINTER_OFFSET {
                self.offsets.insert(suffix, self.buf.len() as u16);
            }

            let label = labels[i];
            self.buf.push(label.len() as u8);
            self.buf.extend_from_slice(label.as_bytes());
        }

        self.buf.push(0); // root terminator
    }

    fn write_question(&mut self, q: &Question) {
        self.write_name(&q.name);
        self.buf.extend_from_slice(&q.r#type.to_wire().to_be_bytes());
        self.buf.extend_from_slice(&q.class.to_wire().to_be_bytes());
    }

    /// Writes one record, stamping its TTL with the amount remaining at
    /// `stamp` (spec §4.1). Returns `false` (writing nothing) if the
    /// record's remaining TTL at `stamp` would be negative.
    fn write_record(&mut self, record: &Record, stamp: Instant) -> bool {
        let Some(stamped) = record.stamped(stamp) else {
            return false;
        };

        self.write_name(&stamped.name);
        self.buf
            .extend_from_slice(&stamped.r#type().to_wire().to_be_bytes());
        self.buf.extend_from_slice(
            &stamped
                .class
                .to_wire_with_unique(stamped.unique)
                .to_be_bytes(),
        );
        self.buf
            .extend_from_slice(&(stamped.ttl.as_secs() as u32).to_be_bytes());

        let len_pos = self.buf.len();
        self.buf.extend_from_slice(&[0, 0]); // placeholder, back-patched below

        let rdata_start = self.buf.len();
        match &stamped.payload {
            Payload::A(ip) => self.buf.extend_from_slice(&ip.octets()),
            Payload::AAAA(ip) => self.buf.extend_from_slice(&ip.octets()),
            Payload::Ptr(target) => self.write_name(target),
            Payload::Srv(srv) => {
                self.buf.extend_from_slice(&srv.priority.to_be_bytes());
                self.buf.extend_from_slice(&srv.weight.to_be_bytes());
                self.buf.extend_from_slice(&srv.port.to_be_bytes());
                self.write_name(&srv.server);
            }
            Payload::Txt(attrs) => self.buf.extend_from_slice(&attrs.to_wire()),
        }
        let rdlength = (self.buf.len() - rdata_start) as u16;
        self.buf[len_pos..len_pos + 2].copy_from_slice(&rdlength.to_be_bytes());

        true
    }
}

/// Encodes a [`Message`], stamping every record's TTL with the amount
/// remaining at `stamp` and dropping any record that has already expired
/// by then (spec §4.1). The transaction ID is always written as zero.
pub fn encode(message: &Message, stamp: Instant) -> Result<Vec<u8>, DecodeError> {
    let mut e = Encoder::new();

    e.buf.extend_from_slice(&0u16.to_be_bytes()); // ID
    e.buf.extend_from_slice(&message.flags.to_wire().to_be_bytes());

    // Counts are back-patched once we know how many records survive the
    // TTL stamp filter.
    let counts_pos = e.buf.len();
    e.buf.extend_from_slice(&[0u8; 8]);

    e.buf
        .extend_from_slice(&(message.questions.len() as u16).to_be_bytes());
    for q in &message.questions {
        e.write_question(q);
    }

    let mut write_section = |e: &mut Encoder, records: &[Record]| -> u16 {
        let mut count = 0u16;
        for r in records {
            if e.write_record(r, stamp) {
                count += 1;
            }
        }
        count
    };

    let an_count = write_section(&mut e, &message.answers);
    let ns_count = write_section(&mut e, &message.authorities);
    let ar_count = write_section(&mut e, &message.additionals);

    e.buf[counts_pos..counts_pos + 2]
        .copy_from_slice(&(message.questions.len() as u16).to_be_bytes());
    e.buf[counts_pos + 2..counts_pos + 4].copy_from_slice(&an_count.to_be_bytes());
    e.buf[counts_pos + 4..counts_pos + 6].copy_from_slice(&ns_count.to_be_bytes());
    e.buf[counts_pos + 6..counts_pos + 8].copy_from_slice(&ar_count.to_be_bytes());

    if e.buf.len() > MAX_MESSAGE_SIZE {
        return Err(DecodeError::MessageTooLarge);
    }

    Ok(e.buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Srv;

    fn name(s: &str) -> Name {
        Name::new(s).unwrap()
    }

    #[test]
    fn round_trips_a_query() {
        let mut msg = Message::query();
        msg.add_question(name("foo.local"), Type::A, Class::Internet);

        let stamp = Instant::now();
        let wire = encode(&msg, stamp).unwrap();
        let decoded = decode(&wire, stamp).unwrap();

        assert_eq!(decoded.questions.len(), 1);
        assert_eq!(decoded.questions[0].name, name("foo.local"));
        assert_eq!(decoded.questions[0].r#type, Type::A);
        assert!(decoded.is_query());
    }

    #[test]
    fn round_trips_an_authoritative_response_with_every_record_type() {
        let now = Instant::now();
        let mut msg = Message::authoritative_response();

        msg.answers.push(Record::new(
            name("host.local"),
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::A(Ipv4Addr::new(192, 168, 1, 5)),
        ));
        msg.answers.push(Record::new(
            name("host.local"),
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::AAAA(Ipv6Addr::LOCALHOST),
        ));
        msg.answers.push(Record::new(
            name("_music._tcp.local"),
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::Ptr(name("Living Room Speaker._music._tcp.local")),
        ));
        msg.answers.push(Record::new(
            name("Living Room Speaker._music._tcp.local"),
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::Srv(Srv {
                priority: 0,
                weight: 0,
                port: 9009,
                server: name("host.local"),
            }),
        ));
        let mut attrs = Attributes::new();
        attrs.insert("Some Text", Some(b"true".to_vec()));
        msg.answers.push(Record::new(
            name("Living Room Speaker._music._tcp.local"),
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::Txt(attrs),
        ));

        let wire = encode(&msg, now).unwrap();
        let decoded = decode(&wire, now).unwrap();

        assert_eq!(decoded.answers.len(), 5);
        assert!(decoded.flags.response && decoded.flags.authoritative);
        for (original, roundtripped) in msg.answers.iter().zip(decoded.answers.iter()) {
            assert_eq!(original.payload, roundtripped.payload);
            assert_eq!(original.name, roundtripped.name);
        }
    }

    #[test]
    fn repeated_name_compresses_to_a_two_byte_pointer() {
        let now = Instant::now();
        let mut msg = Message::authoritative_response();
        let owner = name("Living Room Speaker._music._tcp.local");

        msg.answers.push(Record::new(
            owner.clone(),
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::Srv(Srv {
                priority: 0,
                weight: 0,
                port: 9009,
                server: name("host.local"),
            }),
        ));
        let mut attrs = Attributes::new();
        attrs.insert("k", None);
        msg.answers.push(Record::new(
            owner,
            Class::Internet,
            true,
            Duration::from_secs(120),
            now,
            Payload::Txt(attrs),
        ));

        let wire = encode(&msg, now).unwrap();

        // The second answer's owner name must be a bare 2-byte pointer:
        // find where the SRV record's RDATA ends and assert the very next
        // two bytes (the second record's name) are a compression pointer.
        let decoded = decode(&wire, now).unwrap();
        assert_eq!(decoded.answers.len(), 2);
        assert_eq!(decoded.answers[0].name, decoded.answers[1].name);

        // Crude structural check: the encoded form must be smaller than
        // writing the (long) owner name out twice in full.
        let owner_len = "Living Room Speaker._music._tcp.local.".len();
        assert!(wire.len() < owner_len * 2);
    }

    #[test]
    fn ttl_is_stamped_with_remaining_time() {
        let now = Instant::now();
        let mut msg = Message::authoritative_response();
        msg.answers.push(Record::new(
            name("host.local"),
            Class::Internet,
            true,
            Duration::from_secs(100),
            now,
            Payload::A(Ipv4Addr::new(1, 2, 3, 4)),
        ));

        let stamp = now + Duration::from_secs(40);
        let wire = encode(&msg, stamp).unwrap();
        let decoded = decode(&wire, stamp).unwrap();

        assert_eq!(decoded.answers[0].ttl, Duration::from_secs(60));
    }

    #[test]
    fn expired_answers_are_dropped_before_encoding() {
        let now = Instant::now();
        let mut msg = Message::authoritative_response();
        msg.answers.push(Record::new(
            name("host.local"),
            Class::Internet,
            true,
            Duration::from_secs(10),
            now,
            Payload::A(Ipv4Addr::new(1, 2, 3, 4)),
        ));

        let stamp = now + Duration::from_secs(20);
        let wire = encode(&msg, stamp).unwrap();
        let decoded = decode(&wire, stamp).unwrap();

        assert!(decoded.answers.is_empty());
    }

    #[test]
    fn forward_pointer_is_rejected() {
        // A name whose single label is a pointer to an offset at or past
        // itself must fail to decode.
        let mut buf = vec![0u8; 12]; // header
        buf.extend_from_slice(&0xC00Cu16.to_be_bytes()); // pointer to offset 12 (itself)
        buf.extend_from_slice(&(Type::A.to_wire()).to_be_bytes());
        buf.extend_from_slice(&(Class::Internet.to_wire()).to_be_bytes());
        buf[4..6].copy_from_slice(&1u16.to_be_bytes()); // qdcount = 1

        assert!(decode(&buf, Instant::now()).is_err());
    }

    #[test]
    fn unknown_record_type_is_skipped_not_fatal() {
        let now = Instant::now();
        let mut msg = Message::authoritative_response();
        msg.answers.push(Record::new(
            name("host.local"),
            Class::Internet,
            true,
            Duration::from_secs(60),
            now,
            Payload::A(Ipv4Addr::new(1, 2, 3, 4)),
        ));
        let mut wire = encode(&msg, now).unwrap();

        // Splice in a synthetic CNAME (type 5) record with a 2-byte rdata
        // right after the header+question-less body; bump ancount to 2.
        wire[6..8].copy_from_slice(&2u16.to_be_bytes());
        wire.push(0); // root name
        wire.extend_from_slice(&5u16.to_be_bytes()); // CNAME
        wire.extend_from_slice(&1u16.to_be_bytes()); // IN
        wire.extend_from_slice(&0u32.to_be_bytes()); // ttl
        wire.extend_from_slice(&2u16.to_be_bytes()); // rdlength
        wire.extend_from_slice(&[0xAB, 0xCD]);

        let decoded = decode(&wire, now).unwrap();
        assert_eq!(decoded.answers.len(), 1);
    }
}
