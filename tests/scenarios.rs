//! End-to-end scenarios over an in-process loopback [`Channel`], exercising
//! registration, probing, and resolution the way two real nodes on the same
//! link would see them.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, Mutex};

use mdns_sd_rs::channel::Channel;
use mdns_sd_rs::config::Config;
use mdns_sd_rs::engine::Engine;
use mdns_sd_rs::errors::{Error, Result};
use mdns_sd_rs::name::Name;
use mdns_sd_rs::service::Service;
use mdns_sd_rs::types::Message;

/// A shared in-memory "multicast link": every [`LoopbackChannel`] built
/// from the same bus sees every other's sends, loopback included, the way
/// a real mDNS socket with multicast loopback enabled would.
struct LoopbackChannel {
    tx: broadcast::Sender<Message>,
    rx: Mutex<broadcast::Receiver<Message>>,
}

impl LoopbackChannel {
    fn new(bus: &broadcast::Sender<Message>) -> LoopbackChannel {
        LoopbackChannel {
            tx: bus.clone(),
            rx: Mutex::new(bus.subscribe()),
        }
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<()> {
        let _ = self.tx.send(message);
        Ok(())
    }

    async fn recv(&self) -> Result<(Message, Instant)> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(message) => return Ok((message, Instant::now())),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(Error::Shutdown),
            }
        }
    }
}

/// Pumps `channel.recv()` into `engine.handle_inbound`, sending back
/// whatever response (if any) the engine produces. Mirrors the receive
/// task an engine's owner would spawn (spec §5).
fn spawn_dispatch_loop(engine: Arc<Engine>, channel: Arc<dyn Channel>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match channel.recv().await {
                Ok((message, received_at)) => {
                    if let Some(response) = engine.handle_inbound(message, received_at).await {
                        let _ = channel.send(response).await;
                    }
                }
                Err(_) => return,
            }
        }
    })
}

fn speaker() -> Service {
    Service::new("Living Room Speaker", "_music._tcp", 9009)
        .with_hostname(Name::new("speaker.local").unwrap())
        .with_ipv4(Ipv4Addr::new(10, 0, 0, 9))
}

#[tokio::test(start_paused = true)]
async fn registers_and_is_then_resolvable_by_another_node() {
    let config = Config::default();
    let bus = broadcast::channel::<Message>(256).0;

    let responder = Arc::new(Engine::new(config.clone()));
    let responder_channel: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(responder.clone(), responder_channel.clone());

    let registered = responder
        .register(speaker(), true, responder_channel.as_ref())
        .await
        .expect("registration should succeed with no competing node");
    assert_eq!(registered.instance_name, "Living Room Speaker");

    let resolver_engine = Arc::new(Engine::new(config));
    let resolver_channel: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(resolver_engine.clone(), resolver_channel.clone());

    let service_name = speaker().service_name().unwrap();
    let resolved = resolver_engine
        .resolve(&service_name, resolver_channel.as_ref())
        .await
        .expect("resolution should succeed once the service is announced");

    assert_eq!(resolved.hostname, Name::new("speaker.local").unwrap());
    assert_eq!(resolved.port, 9009);
    assert_eq!(resolved.ipv4, Some(Ipv4Addr::new(10, 0, 0, 9)));
}

#[tokio::test(start_paused = true)]
async fn resolving_an_unregistered_service_times_out() {
    let config = Config::default();
    let bus = broadcast::channel::<Message>(256).0;

    let engine = Arc::new(Engine::new(config));
    let channel: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(engine.clone(), channel.clone());

    let ghost = Name::new("Nobody Home._music._tcp.local").unwrap();
    let err = engine
        .resolve(&ghost, channel.as_ref())
        .await
        .expect_err("nothing on the link answers this name");

    assert!(matches!(err, Error::Unresolved));
}

#[tokio::test(start_paused = true)]
async fn a_second_registration_with_the_same_name_is_renamed() {
    let config = Config::default();
    let bus = broadcast::channel::<Message>(256).0;

    let node_a = Arc::new(Engine::new(config.clone()));
    let channel_a: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(node_a.clone(), channel_a.clone());

    let first = node_a
        .register(speaker(), true, channel_a.as_ref())
        .await
        .unwrap();
    assert_eq!(first.instance_name, "Living Room Speaker");

    let node_b = Arc::new(Engine::new(config));
    let channel_b: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(node_b.clone(), channel_b.clone());

    let second = node_b
        .register(
            Service {
                port: 9010,
                ..speaker()
            },
            true,
            channel_b.as_ref(),
        )
        .await
        .unwrap();

    assert_eq!(second.instance_name, "Living Room Speaker (2)");
}

#[tokio::test(start_paused = true)]
async fn a_conflicting_registration_without_rename_fails() {
    let config = Config::default();
    let bus = broadcast::channel::<Message>(256).0;

    let node_a = Arc::new(Engine::new(config.clone()));
    let channel_a: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(node_a.clone(), channel_a.clone());
    node_a.register(speaker(), true, channel_a.as_ref()).await.unwrap();

    let node_b = Arc::new(Engine::new(config));
    let channel_b: Arc<dyn Channel> = Arc::new(LoopbackChannel::new(&bus));
    spawn_dispatch_loop(node_b.clone(), channel_b.clone());

    let err = node_b
        .register(
            Service {
                port: 9010,
                ..speaker()
            },
            false,
            channel_b.as_ref(),
        )
        .await
        .expect_err("node_a's SRV already answers this name with a diverging port");
    assert!(matches!(err, Error::Conflict(_)));
}
