//! The cooperative resolver (spec §4.5): fills from cache opportunistically,
//! then queries with exponential backoff until the service is fully
//! populated or the timeout elapses.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use log::trace;

use crate::cache::Cache;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::name::Name;
use crate::record::{Payload, Record};
use crate::service::Service;
use crate::types::{Class, Message, Type};

/// A service is "resolved" once its SRV target, at least one address, and
/// its attributes are all known (spec §4.5 step 2).
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedService {
    pub service_name: Name,
    pub hostname: Name,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub attributes: crate::attributes::Attributes,
}

/// Computes the resolver's exponential back-off schedule: `interval`,
/// `2*interval`, `4*interval`, ... capped so the schedule never overruns
/// `timeout` (the final step is shortened to exactly reach it) (spec
/// §4.5).
pub fn backoff_schedule(interval: Duration, timeout: Duration) -> Vec<Duration> {
    let mut schedule = Vec::new();
    let mut elapsed = Duration::ZERO;
    let mut step = interval;

    while elapsed < timeout {
        let remaining = timeout - elapsed;
        let this_step = step.min(remaining);
        schedule.push(this_step);
        elapsed += this_step;
        step *= 2;
    }

    schedule
}

/// Reads a currently-cached view of `service_name`, without sending
/// anything on the wire.
pub fn resolve_from_cache(cache: &Cache, service_name: &Name, now: Instant) -> Option<ResolvedService> {
    let srv = cache.get_by_key(service_name, Type::SRV, Class::Internet, now)?;
    let Payload::Srv(srv_data) = &srv.payload else {
        return None;
    };

    let ipv4 = cache
        .get_by_key(&srv_data.server, Type::A, Class::Internet, now)
        .and_then(|r| match r.payload {
            Payload::A(addr) => Some(addr),
            _ => None,
        });
    let ipv6 = cache
        .get_by_key(&srv_data.server, Type::AAAA, Class::Internet, now)
        .and_then(|r| match r.payload {
            Payload::AAAA(addr) => Some(addr),
            _ => None,
        });

    if ipv4.is_none() && ipv6.is_none() {
        return None;
    }

    let attributes = cache
        .get_by_key(service_name, Type::TXT, Class::Internet, now)
        .and_then(|r| match r.payload {
            Payload::Txt(attrs) => Some(attrs),
            _ => None,
        })?;

    Some(ResolvedService {
        service_name: service_name.clone(),
        hostname: srv_data.server.clone(),
        port: srv_data.port,
        priority: srv_data.priority,
        weight: srv_data.weight,
        ipv4,
        ipv6,
        attributes,
    })
}

/// Builds the next outgoing query for `service_name`: one question per
/// still-missing type (spec §4.5 step 3). SRV and TXT are always asked for
/// until they're cached; once the SRV's target hostname is known, an
/// address question is added too, for whichever of A/AAAA isn't cached yet
/// — a responder that only answers explicit address questions (rather than
/// attaching them as additionals) must still be satisfied. Already-cached
/// answers are attached as known-answer suppression hints (spec §4.6).
pub fn build_query(cache: &Cache, service_name: &Name, now: Instant) -> Message {
    let mut message = Message::query();

    let srv = cache.get_by_key(service_name, Type::SRV, Class::Internet, now);
    if srv.is_none() {
        message.add_question(service_name.clone(), Type::SRV, Class::Internet);
    }
    if cache.get_by_key(service_name, Type::TXT, Class::Internet, now).is_none() {
        message.add_question(service_name.clone(), Type::TXT, Class::Internet);
    }

    if let Some(Record {
        payload: Payload::Srv(srv_data),
        ..
    }) = &srv
    {
        let have_ipv4 = cache
            .get_by_key(&srv_data.server, Type::A, Class::Internet, now)
            .is_some();
        let have_ipv6 = cache
            .get_by_key(&srv_data.server, Type::AAAA, Class::Internet, now)
            .is_some();
        if !have_ipv4 {
            message.add_question(srv_data.server.clone(), Type::A, Class::Internet);
        }
        if !have_ipv6 {
            message.add_question(srv_data.server.clone(), Type::AAAA, Class::Internet);
        }
    }

    let known: Vec<Record> = cache
        .entries(service_name, now)
        .into_iter()
        .filter_map(|r| r.stamped(now))
        .collect();
    message.answers = known;

    message
}

/// Runs the cooperative resolver loop against a live [`Channel`]-backed
/// engine send/recv pair, driven by the caller's `config`. `send` enqueues
/// a query; `poll_cache` is called after every wait step to re-check
/// whether the answer has since arrived (e.g. via another task's inbound
/// dispatch updating the cache).
pub async fn resolve<P>(
    config: &Config,
    cache: &Cache,
    service_name: &Name,
    channel: &(dyn crate::channel::Channel + Sync),
    mut poll_cache: P,
) -> Result<ResolvedService>
where
    P: FnMut() -> Option<ResolvedService>,
{
    if let Some(resolved) = poll_cache() {
        return Ok(resolved);
    }

    let schedule = backoff_schedule(config.resolution_interval, config.resolution_timeout);
    for delay in schedule {
        let now = Instant::now();
        channel.send(build_query(cache, service_name, now)).await?;
        trace!("mdns: resolver querying {} (next wait {:?})", service_name, delay);

        tokio::time::sleep(delay).await;

        if let Some(resolved) = poll_cache() {
            return Ok(resolved);
        }
    }

    Err(Error::Unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Srv;

    #[test]
    fn backoff_schedule_doubles_and_caps_at_timeout() {
        let schedule = backoff_schedule(Duration::from_millis(200), Duration::from_millis(1000));
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(400),
            ]
        );
        let total: Duration = schedule.iter().sum();
        assert_eq!(total, Duration::from_millis(1000));
    }

    #[test]
    fn backoff_schedule_residual_step_exactly_reaches_timeout() {
        let schedule = backoff_schedule(Duration::from_millis(250), Duration::from_millis(900));
        let total: Duration = schedule.iter().sum();
        assert_eq!(total, Duration::from_millis(900));
    }

    #[test]
    fn resolve_from_cache_requires_srv_an_address_and_attributes() {
        let cache = Cache::new(Duration::from_secs(1000));
        let now = Instant::now();
        let name = Name::new("Speaker._music._tcp.local").unwrap();

        assert!(resolve_from_cache(&cache, &name, now).is_none());

        cache.add(
            Record::new(
                name.clone(),
                Class::Internet,
                true,
                Duration::from_secs(120),
                now,
                Payload::Srv(Srv {
                    priority: 0,
                    weight: 0,
                    port: 9009,
                    server: Name::new("host.local").unwrap(),
                }),
            ),
            now,
        );
        assert!(resolve_from_cache(&cache, &name, now).is_none());

        cache.add(
            Record::new(
                Name::new("host.local").unwrap(),
                Class::Internet,
                true,
                Duration::from_secs(120),
                now,
                Payload::A(Ipv4Addr::new(10, 0, 0, 9)),
            ),
            now,
        );
        assert!(
            resolve_from_cache(&cache, &name, now).is_none(),
            "no TXT record cached yet: attributes are still missing"
        );

        cache.add(
            Record::new(
                name.clone(),
                Class::Internet,
                false,
                Duration::from_secs(120),
                now,
                Payload::Txt(crate::attributes::Attributes::new()),
            ),
            now,
        );

        let resolved = resolve_from_cache(&cache, &name, now).unwrap();
        assert_eq!(resolved.port, 9009);
        assert_eq!(resolved.ipv4, Some(Ipv4Addr::new(10, 0, 0, 9)));
    }
}
