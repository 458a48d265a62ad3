//! Probing and announcement (spec §4.4): before a service's records go
//! live, they're proposed in a handful of probe queries; any conflicting
//! response aborts registration outright. There is no tie-break: any
//! mismatched unique record observed while probing is treated as an
//! unconditional conflict, never resolved by comparing record contents.

use std::time::Instant;

use log::{debug, info};

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::record::{Payload, Record, Srv};
use crate::types::{Class, Message, Type};
use crate::service::Service;

/// Builds the full unique rrset a service would publish: SRV (and, if the
/// caller supplied addresses, A/AAAA), plus TXT and the registration-type
/// PTR, which are not conflict-checked (spec §4.4, §9).
pub fn service_records(service: &Service, config: &Config, now: Instant) -> Result<Vec<Record>> {
    let hostname = service.hostname.clone().ok_or(Error::UnknownAddressing)?;
    let service_name = service.service_name()?;
    let registration_pointer = service.registration_pointer_name()?;

    let mut records = vec![Record::new(
        service_name.clone(),
        Class::Internet,
        true,
        config.ttl_default,
        now,
        Payload::Srv(Srv {
            priority: service.priority,
            weight: service.weight,
            port: service.port,
            server: hostname.clone(),
        }),
    )];

    if let Some(ipv4) = service.ipv4 {
        records.push(Record::new(
            hostname.clone(),
            Class::Internet,
            true,
            config.ttl_default,
            now,
            Payload::A(ipv4),
        ));
    }
    if let Some(ipv6) = service.ipv6 {
        records.push(Record::new(
            hostname.clone(),
            Class::Internet,
            true,
            config.ttl_default,
            now,
            Payload::AAAA(ipv6),
        ));
    }
    if service.ipv4.is_none() && service.ipv6.is_none() {
        return Err(Error::UnknownAddressing);
    }

    records.push(Record::new(
        service_name.clone(),
        Class::Internet,
        false,
        config.ttl_default,
        now,
        Payload::Txt(service.attributes.clone().unwrap_or_default()),
    ));

    records.push(Record::new(
        registration_pointer,
        Class::Internet,
        false,
        config.ttl_default,
        now,
        Payload::Ptr(service_name),
    ));

    Ok(records)
}

/// A probe query: questions for `ANY` record at both the service name and
/// the hostname (a peer may own either independently), with the proposed
/// records carried as authorities for conflict detection (spec §4.4).
pub fn build_probe_query(service: &Service, records: &[Record]) -> Result<Message> {
    let mut message = Message::query();
    message.add_question(service.service_name()?, Type::ANY, Class::Internet);
    if let Some(hostname) = &service.hostname {
        message.add_question(hostname.clone(), Type::ANY, Class::Internet);
    }
    message.authorities = records.to_vec();
    Ok(message)
}

/// The authoritative response announcing `records` (spec §4.4).
pub fn build_announcement(records: &[Record]) -> Message {
    let mut message = Message::authoritative_response();
    message.answers = records.to_vec();
    message
}

/// Whether any unique record in `candidates` is contradicted by a record
/// in `message` that shares `(name⇓, type, class15)` but carries a
/// different payload. This is the crate's entire conflict policy: no
/// tie-break is attempted (spec §4.4, §9).
pub fn detects_conflict(candidates: &[Record], message: &Message) -> bool {
    let observed = message
        .answers
        .iter()
        .chain(message.authorities.iter())
        .chain(message.additionals.iter());

    candidates.iter().filter(|c| c.unique).any(|candidate| {
        observed
            .clone()
            .any(|seen| candidate.protocol_eq(seen) && candidate.payload != seen.payload)
    })
}

/// Drives probing then announcement for `service`. `send` enqueues a
/// message for transmission; `poll_inbound` is called after every wait
/// step and must return the messages observed since the previous call
/// (e.g. ones the engine's dispatch loop routed to this registration).
/// Returns the records that are now live, or [`Error::Conflict`] if
/// probing observed a mismatch.
pub async fn run<P>(
    config: &Config,
    service: &Service,
    channel: &(dyn crate::channel::Channel + Sync),
    mut poll_inbound: P,
) -> Result<Vec<Record>>
where
    P: FnMut() -> Vec<Message>,
{
    let now = Instant::now();
    let records = service_records(service, config, now)?;

    for attempt in 0..config.probing_number {
        debug!("mdns: probing {} ({}/{})", service.instance_name, attempt + 1, config.probing_number);
        channel.send(build_probe_query(service, &records)?).await?;
        tokio::time::sleep(config.probing_interval).await;

        for observed in poll_inbound() {
            if detects_conflict(&records, &observed) {
                return Err(Error::Conflict(format!(
                    "{} conflicts with an existing record during probing",
                    service.instance_name
                )));
            }
        }
    }

    info!("mdns: announcing {}", service.instance_name);
    channel.send(build_announcement(&records)).await?;
    // RFC 6762 §8.3 recommends a second, redundant announcement.
    tokio::time::sleep(config.probing_interval).await;
    channel.send(build_announcement(&records)).await?;

    Ok(records)
}
