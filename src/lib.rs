//! mdns-sd-rs is a multicast DNS Service Discovery engine, implementing the
//! subset of [RFC 6762] and [RFC 6763] needed to register a local service
//! and resolve others on the same `.local.` link.
//!
//! # Usage
//!
//! ```no_run
//! use mdns_sd_rs::{Config, Engine, Service};
//! use mdns_sd_rs::channel::UdpChannel;
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> mdns_sd_rs::errors::Result<()> {
//! let config = Config::default();
//! let channel = UdpChannel::bind(&config).await.map_err(|_| mdns_sd_rs::errors::Error::Shutdown)?;
//! let engine = Engine::new(config);
//!
//! let service = Service::new("Living Room Speaker", "_music._tcp", 9009)
//!     .with_hostname(mdns_sd_rs::name::Name::new("host.local").unwrap())
//!     .with_ipv4(Ipv4Addr::new(10, 0, 0, 9));
//!
//! let registered = engine.register(service, true, &channel).await?;
//! println!("registered as {}", registered.instance_name);
//! # Ok(())
//! # }
//! ```
//!
//! # Module map
//!
//! * [`name`] / [`attributes`] / [`types`] / [`record`] — the wire-level
//!   vocabulary (names, TXT key/value pairs, questions, records).
//! * [`codec`] — encodes/decodes raw datagrams, including RFC 1035 §4.1.4
//!   name compression.
//! * [`cache`] — the shared, lazily-expiring record cache.
//! * [`service`] — the local service description and its rename rule.
//! * [`announcer`] / [`resolver`] — probing/announcement and cooperative
//!   resolution.
//! * [`engine`] — ties all of the above together: inbound dispatch,
//!   registration, deregistration.
//! * [`channel`] — the transport abstraction, and the UDP multicast
//!   implementation.
//! * [`config`] — the single `Config` value threaded through everything
//!   above; never a process-wide global.
//! * [`clock`] — the seam pure TTL/suppression/rename logic uses instead of
//!   calling `Instant::now()` directly, so it stays unit-testable.
//!
//! [RFC 6762]: https://datatracker.ietf.org/doc/html/rfc6762
//! [RFC 6763]: https://datatracker.ietf.org/doc/html/rfc6763

pub mod announcer;
pub mod attributes;
pub mod cache;
pub mod channel;
pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod name;
pub mod record;
pub mod resolver;
pub mod service;
pub mod types;

#[doc(inline)]
pub use crate::config::Config;
#[doc(inline)]
pub use crate::engine::Engine;
#[doc(inline)]
pub use crate::errors::{Error, Result};
#[doc(inline)]
pub use crate::service::Service;
#[doc(inline)]
pub use crate::types::Message;
