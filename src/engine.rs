//! The engine (spec §4.3, §5): owns the cache and the local service table,
//! turns inbound queries into responses, folds inbound responses into the
//! cache, and fans them out to registered listeners in registration order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::{info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::announcer;
use crate::cache::Cache;
use crate::channel::Channel;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::name::Name;
use crate::record::{Payload, Record};
use crate::resolver::{self, ResolvedService};
use crate::service::Service;
use crate::types::{Class, Message, Question, Type};

/// `_services._dns-sd._udp.local.` — the meta-query browsers use to
/// discover registration types (RFC 6763 §9).
fn discovery_name() -> Name {
    Name::new("_services._dns-sd._udp.local").expect("valid static name")
}

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<(Message, Instant)>,
}

/// Coordinates the cache, the local service table, and inbound dispatch.
/// One `Engine` is shared (behind an `Arc`) by the receive task, every
/// in-flight `register`/`resolve` call, and every announcer.
pub struct Engine {
    config: Config,
    cache: Cache,
    services: Mutex<HashMap<String, Service>>,
    listeners: Mutex<Vec<Listener>>,
    next_listener_id: AtomicU64,
    clock: Box<dyn Clock>,
}

impl Engine {
    pub fn new(config: Config) -> Engine {
        Engine::with_clock(config, Box::new(SystemClock))
    }

    /// Builds an engine against an explicit [`Clock`] instead of
    /// [`SystemClock`], for deterministic tests of the timestamps an
    /// engine stamps onto records it originates (registration/goodbye).
    pub fn with_clock(config: Config, clock: Box<dyn Clock>) -> Engine {
        Engine {
            cache: Cache::new(config.ttl_expiry_grace),
            config,
            services: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Registers a new inbound-message listener and returns its receiver.
    /// Fan-out is ordered by registration but never retroactive: a
    /// listener only ever sees messages dispatched after it was added
    /// (spec §5).
    pub async fn register_listener(&self) -> (u64, mpsc::UnboundedReceiver<(Message, Instant)>) {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().await.push(Listener { id, tx });
        (id, rx)
    }

    pub async fn deregister_listener(&self, id: u64) {
        self.listeners.lock().await.retain(|l| l.id != id);
    }

    /// The single inbound entry point: queries turn into an optional
    /// response, responses update the cache and fan out to listeners
    /// (spec §4.3).
    pub async fn handle_inbound(&self, message: Message, received_at: Instant) -> Option<Message> {
        if message.is_query() {
            self.build_response(&message, received_at).await
        } else {
            self.ingest_response(&message, received_at).await;
            self.notify_listeners(message, received_at).await;
            None
        }
    }

    async fn notify_listeners(&self, message: Message, received_at: Instant) {
        // Snapshot under the lock, then send outside it: a listener newly
        // registered while fan-out is in progress must not retroactively
        // receive this message.
        let listeners = self.listeners.lock().await;
        for listener in listeners.iter() {
            let _ = listener.tx.send((message.clone(), received_at));
        }
    }

    async fn ingest_response(&self, message: &Message, received_at: Instant) {
        for record in message
            .answers
            .iter()
            .chain(message.authorities.iter())
            .chain(message.additionals.iter())
        {
            self.cache.add(record.clone(), received_at);
        }
    }

    /// Builds the authoritative response to `query` (spec §4.3's six
    /// branches), applying known-answer suppression (§4.6) against
    /// answers the querier already listed.
    async fn build_response(&self, query: &Message, now: Instant) -> Option<Message> {
        let services = self.services.lock().await;
        let mut answers = Vec::new();
        let mut additionals = Vec::new();

        for question in &query.questions {
            self.answer_question(question, &services, now, &mut answers, &mut additionals);
        }

        answers.retain(|r: &Record| !r.suppressed_by(query));
        if answers.is_empty() {
            return None;
        }

        let mut response = Message::authoritative_response();
        response.answers = answers;
        response.additionals = additionals;
        Some(response)
    }

    fn answer_question(
        &self,
        question: &Question,
        services: &HashMap<String, Service>,
        now: Instant,
        answers: &mut Vec<Record>,
        additionals: &mut Vec<Record>,
    ) {
        // Branch 1: DNS-SD discovery meta-query.
        if question.name == discovery_name() && matches!(question.r#type, Type::PTR | Type::ANY) {
            let mut seen = std::collections::HashSet::new();
            for service in services.values() {
                if seen.insert(service.registration_type.clone()) {
                    if let Ok(registration_pointer) = service.registration_pointer_name() {
                        answers.push(Record::new(
                            discovery_name(),
                            Class::Internet,
                            false,
                            self.config.ttl_default,
                            now,
                            Payload::Ptr(registration_pointer),
                        ));
                    }
                }
            }
            return;
        }

        for service in services.values() {
            let Ok(registration_pointer) = service.registration_pointer_name() else {
                continue;
            };
            let Ok(service_name) = service.service_name() else {
                continue;
            };

            // Branch 2: browsing PTR query for this registration type.
            if question.name == registration_pointer && matches!(question.r#type, Type::PTR | Type::ANY) {
                answers.push(Record::new(
                    registration_pointer.clone(),
                    Class::Internet,
                    false,
                    self.config.ttl_default,
                    now,
                    Payload::Ptr(service_name.clone()),
                ));
                continue;
            }

            if question.name != service_name && Some(&question.name) != service.hostname.as_ref() {
                continue;
            }

            // Branch 3: SRV (plus A/AAAA additionals).
            if question.name == service_name && matches!(question.r#type, Type::SRV | Type::ANY) {
                if let Some(hostname) = &service.hostname {
                    answers.push(Record::new(
                        service_name.clone(),
                        Class::Internet,
                        true,
                        self.config.ttl_default,
                        now,
                        Payload::Srv(crate::record::Srv {
                            priority: service.priority,
                            weight: service.weight,
                            port: service.port,
                            server: hostname.clone(),
                        }),
                    ));
                    if let Some(ipv4) = service.ipv4 {
                        additionals.push(Record::new(
                            hostname.clone(),
                            Class::Internet,
                            true,
                            self.config.ttl_default,
                            now,
                            Payload::A(ipv4),
                        ));
                    }
                    if let Some(ipv6) = service.ipv6 {
                        additionals.push(Record::new(
                            hostname.clone(),
                            Class::Internet,
                            true,
                            self.config.ttl_default,
                            now,
                            Payload::AAAA(ipv6),
                        ));
                    }
                }
            }

            // Branch 4: TXT.
            if question.name == service_name && matches!(question.r#type, Type::TXT | Type::ANY) {
                answers.push(Record::new(
                    service_name.clone(),
                    Class::Internet,
                    false,
                    self.config.ttl_default,
                    now,
                    Payload::Txt(service.attributes.clone().unwrap_or_default()),
                ));
            }

            // Branches 5/6: A / AAAA at the service's hostname.
            if let Some(hostname) = &service.hostname {
                if question.name == *hostname {
                    if matches!(question.r#type, Type::A | Type::ANY) {
                        if let Some(ipv4) = service.ipv4 {
                            answers.push(Record::new(
                                hostname.clone(),
                                Class::Internet,
                                true,
                                self.config.ttl_default,
                                now,
                                Payload::A(ipv4),
                            ));
                        }
                    }
                    if matches!(question.r#type, Type::AAAA | Type::ANY) {
                        if let Some(ipv6) = service.ipv6 {
                            answers.push(Record::new(
                                hostname.clone(),
                                Class::Internet,
                                true,
                                self.config.ttl_default,
                                now,
                                Payload::AAAA(ipv6),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Registers `service`, probing and announcing it. On a name conflict,
    /// retries with [`Service::renamed`] when `allow_rename` is set;
    /// otherwise fails with [`Error::Conflict`] (spec §4.4, §6.2).
    pub async fn register(
        &self,
        mut service: Service,
        allow_rename: bool,
        channel: &(dyn Channel + Sync),
    ) -> Result<Service> {
        loop {
            let service_name = service.service_name().map_err(Error::MalformedMessage)?;
            let key = service_name.to_ascii_lowercase_key();

            let known_locally = self.services.lock().await.contains_key(&key);
            let known_on_the_network = self
                .cache
                .get_by_key(&service_name, Type::SRV, Class::Internet, self.clock.now())
                .is_some();

            if known_locally || known_on_the_network {
                if allow_rename {
                    service = service.renamed();
                    continue;
                }
                return Err(Error::Conflict(service.instance_name.clone()));
            }

            let (listener_id, mut inbound) = self.register_listener().await;

            let poll_inbound = || {
                let mut pending = Vec::new();
                while let Ok((msg, _)) = inbound.try_recv() {
                    pending.push(msg);
                }
                pending
            };

            let result = announcer::run(&self.config, &service, channel, poll_inbound).await;

            self.deregister_listener(listener_id).await;

            match result {
                Ok(records) => {
                    for record in &records {
                        self.cache.add(record.clone(), self.clock.now());
                    }
                    self.services.lock().await.insert(key, service.clone());
                    info!("mdns: registered {}", service.instance_name);
                    return Ok(service);
                }
                Err(Error::Conflict(_)) if allow_rename => {
                    service = service.renamed();
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Deregisters a previously registered service: sends
    /// `cancellation_number` goodbye responses spaced by
    /// `cancellation_interval`, then drops it from the table (spec §4.4,
    /// §9).
    pub async fn deregister(&self, service: &Service, channel: &(dyn Channel + Sync)) -> Result<()> {
        let service_name = service.service_name().map_err(Error::MalformedMessage)?;
        let key = service_name.to_ascii_lowercase_key();

        let now = self.clock.now();
        let live_records = announcer::service_records(service, &self.config, now)?;

        let mut goodbye = Message::authoritative_response();
        goodbye.answers = live_records
            .into_iter()
            .map(|r| Record {
                ttl: std::time::Duration::ZERO,
                ..r
            })
            .collect();

        for i in 0..self.config.cancellation_number {
            if let Err(e) = channel.send(goodbye.clone()).await {
                warn!("mdns: goodbye {}/{} failed: {:?}", i + 1, self.config.cancellation_number, e);
            }
            if i + 1 < self.config.cancellation_number {
                tokio::time::sleep(self.config.cancellation_interval).await;
            }
        }

        self.services.lock().await.remove(&key);
        Ok(())
    }

    /// Resolves `service_name` to its address/port/attributes (spec §4.5).
    pub async fn resolve(&self, service_name: &Name, channel: &(dyn Channel + Sync)) -> Result<ResolvedService> {
        let cache = &self.cache;
        let poll_cache = || resolver::resolve_from_cache(cache, service_name, self.clock.now());

        resolver::resolve(&self.config, cache, service_name, channel, poll_cache).await
    }
}
