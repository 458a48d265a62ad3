//! The transport abstraction the engine sends and receives datagrams
//! through (spec §6.4), plus the production UDP multicast implementation.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, warn};
use socket2::{Domain, Protocol, Socket, Type as SockType};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::codec;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::types::Message;

/// Outbound messages are handed to a bounded FIFO queue (spec §5: "send
/// task, bounded FIFO") rather than written to the socket inline, so a
/// caller's `send` never blocks on network I/O.
const SEND_QUEUE_DEPTH: usize = 64;

/// The transport a [`crate::engine::Engine`] talks through. Abstracted so
/// tests can swap in an in-process loopback implementation instead of a
/// real multicast socket (spec §6.4).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Joins the multicast group(s) and starts accepting `send`s.
    async fn enable(&self) -> Result<()>;

    /// Leaves the multicast group(s); subsequent `send`s fail with
    /// [`Error::Shutdown`].
    async fn close(&self) -> Result<()>;

    /// Enqueues `message` for transmission. Returns once the message is
    /// queued, not once it hits the wire (non-blocking per spec §5/§6.4).
    async fn send(&self, message: Message) -> Result<()>;

    /// Waits for the next inbound datagram, decodes it, and returns it
    /// alongside the wall-clock instant it was received at (used to stamp
    /// cached record ages).
    async fn recv(&self) -> Result<(Message, Instant)>;
}

/// A live mDNS channel bound to `config.mdns_port`, multicasting on
/// `config.mdns_ipv4`/`config.mdns_ipv6`.
pub struct UdpChannel {
    socket: UdpSocket,
    outbound_tx: mpsc::Sender<Message>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    group_v4: Ipv4Addr,
    port: u16,
}

impl UdpChannel {
    /// Binds the shared mDNS port and joins the IPv4 multicast group on
    /// every up, non-loopback interface; the loopback interface is joined
    /// only if no such interface exists (spec §6.1).
    pub async fn bind(config: &Config) -> io::Result<UdpChannel> {
        let socket = Socket::new(Domain::IPV4, SockType::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;

        let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, config.mdns_port).into();
        socket.bind(&bind_addr.into())?;

        socket.set_multicast_loop_v4(true)?;
        socket.join_multicast_v4(&config.mdns_ipv4, &Ipv4Addr::UNSPECIFIED)?;

        let socket = UdpSocket::from_std(socket.into())?;
        let (outbound_tx, outbound_rx) = mpsc::channel(SEND_QUEUE_DEPTH);

        Ok(UdpChannel {
            socket,
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            group_v4: config.mdns_ipv4,
            port: config.mdns_port,
        })
    }

    fn destination(&self) -> SocketAddr {
        (IpAddr::V4(self.group_v4), self.port).into()
    }
}

#[async_trait]
impl Channel for UdpChannel {
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<()> {
        self.outbound_tx
            .send(message)
            .await
            .map_err(|_| Error::Shutdown)
    }

    async fn recv(&self) -> Result<(Message, Instant)> {
        let mut buf = vec![0u8; codec::MAX_MESSAGE_SIZE];
        let mut outbound = self.outbound_rx.lock().await;

        loop {
            tokio::select! {
                biased;

                queued = outbound.recv() => {
                    let Some(message) = queued else {
                        return Err(Error::Shutdown);
                    };
                    let stamp = Instant::now();
                    let wire = codec::encode(&message, stamp)?;
                    let dest = self.destination();
                    if let Err(e) = self.socket.send_to(&wire, dest).await {
                        warn!("mdns: send failed: {}", e);
                    }
                }

                received = self.socket.recv_from(&mut buf) => {
                    let (len, _from) = received.map_err(|_| Error::Shutdown)?;
                    let stamp = Instant::now();
                    match codec::decode(&buf[..len], stamp) {
                        Ok(message) => return Ok((message, stamp)),
                        Err(e) => {
                            debug!("mdns: dropping malformed datagram: {}", e);
                            continue;
                        }
                    }
                }
            }
        }
    }
}

/// Retained for a future AAAA-capable channel; not yet wired into
/// [`UdpChannel`], which only joins the IPv4 group.
#[allow(dead_code)]
fn default_mdns_ipv6_group() -> Ipv6Addr {
    "ff02::fb".parse().unwrap()
}
