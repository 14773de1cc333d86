//! Packet-level test client.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use icb_proto::packet::tag;
use icb_proto::{Frame, IcbCodec, Packet};

/// A test client speaking the binary packet protocol.
pub struct TestClient {
    framed: Framed<TcpStream, IcbCodec>,
}

impl TestClient {
    /// Connect and consume the `j` protocol banner.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let mut client = Self {
            framed: Framed::new(stream, IcbCodec::new()),
        };
        let banner = client.recv().await?;
        anyhow::ensure!(banner.tag == tag::PROTO, "expected protocol banner");
        Ok(client)
    }

    /// Log in and wait for the login ack.
    ///
    /// Returns every packet received up to and including the ack, so tests
    /// can assert on MOTD/status traffic.
    pub async fn login(&mut self, nick: &str, group: &str) -> anyhow::Result<Vec<Frame>> {
        self.send(Packet::new(tag::LOGIN, [nick, nick, group, "login", ""]))
            .await?;
        self.recv_until(|frame| frame.tag == tag::LOGIN).await
    }

    /// Send one packet.
    pub async fn send(&mut self, pkt: Packet) -> anyhow::Result<()> {
        self.framed.send(pkt).await?;
        Ok(())
    }

    /// Send an open message.
    pub async fn open(&mut self, text: &str) -> anyhow::Result<()> {
        self.send(Packet::new(tag::OPEN, [text])).await
    }

    /// Send an `h` command.
    pub async fn command(&mut self, name: &str, args: &str) -> anyhow::Result<()> {
        self.send(Packet::new(tag::COMMAND, [name, args])).await
    }

    /// Receive one packet (5s timeout).
    pub async fn recv(&mut self) -> anyhow::Result<Frame> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive one packet with an explicit timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Frame> {
        match timeout(dur, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => anyhow::bail!("connection closed"),
            Err(_) => anyhow::bail!("timed out waiting for a packet"),
        }
    }

    /// Receive until a packet matches, returning everything seen so far
    /// (the matching packet last).
    pub async fn recv_until(
        &mut self,
        pred: impl Fn(&Frame) -> bool,
    ) -> anyhow::Result<Vec<Frame>> {
        let mut seen = Vec::new();
        let deadline = Duration::from_secs(5);
        loop {
            let frame = self.recv_timeout(deadline).await?;
            let done = pred(&frame);
            seen.push(frame);
            if done {
                return Ok(seen);
            }
        }
    }

    /// Receive until a status (`d`) packet in the given category contains
    /// the given text.
    pub async fn recv_status(&mut self, category: &str, contains: &str) -> anyhow::Result<Frame> {
        let mut frames = self
            .recv_until(|frame| {
                frame.tag == tag::STATUS && {
                    let fields = frame.text_fields();
                    fields.first().map(String::as_str) == Some(category)
                        && fields.get(1).is_some_and(|t| t.contains(contains))
                }
            })
            .await?;
        Ok(frames.pop().expect("recv_until returns the match last"))
    }

    /// Receive until an error (`e`) packet contains the given text.
    pub async fn recv_error(&mut self, contains: &str) -> anyhow::Result<Frame> {
        let mut frames = self
            .recv_until(|frame| {
                frame.tag == tag::ERROR
                    && frame
                        .text_fields()
                        .first()
                        .is_some_and(|t| t.contains(contains))
            })
            .await?;
        Ok(frames.pop().expect("recv_until returns the match last"))
    }
}
