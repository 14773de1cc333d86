//! Per-connection glue: socket framing in, dispatch, outbound drain, and
//! teardown.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use icb_proto::{Frame, IcbCodec, Packet};

use crate::error::HandlerError;
use crate::handlers::{helpers, Context, Registry};
use crate::state::session::SessionId;
use crate::state::switchboard::Switchboard;

/// Whether the event loop should keep serving this connection.
enum Flow {
    Continue,
    Shutdown,
}

/// One client connection.
pub struct Connection {
    sid: SessionId,
    addr: SocketAddr,
    board: Arc<Switchboard>,
    registry: Arc<Registry>,
    framed: Framed<TcpStream, IcbCodec>,
    outbound: mpsc::UnboundedReceiver<Packet>,
}

impl Connection {
    /// Register a fresh session for an accepted socket.
    pub async fn accept(
        stream: TcpStream,
        addr: SocketAddr,
        hostname: String,
        board: Arc<Switchboard>,
        registry: Arc<Registry>,
    ) -> Self {
        let (tx, outbound) = mpsc::unbounded_channel();
        let sid = {
            let mut core = board.core.lock().await;
            let sid = core
                .sessions
                .create(addr.ip().to_string(), hostname, false);
            core.broker.add_session(&sid, tx);
            sid
        };

        Self {
            sid,
            addr,
            board,
            registry,
            framed: Framed::new(stream, IcbCodec::new()),
            outbound,
        }
    }

    /// Serve the connection until it closes, then run teardown.
    ///
    /// Teardown happens exactly once regardless of how the loop ends: EOF,
    /// socket error, client quit, or a server-side removal that closed the
    /// outbound channel.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let result = self.event_loop().await;
        self.teardown().await;
        result
    }

    async fn event_loop(&mut self) -> anyhow::Result<()> {
        let banner = Packet::proto(&self.board.config.server.name, &self.board.config.server.id);
        self.framed.send(banner).await?;

        loop {
            tokio::select! {
                incoming = self.framed.next() => match incoming {
                    Some(Ok(frame)) => {
                        if let Flow::Shutdown = self.handle_frame(&frame).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        // Framing violation: report it and tell the client
                        // to terminate, but keep serving the stream.
                        warn!(session = %self.sid, addr = %self.addr, error = %e, "Protocol error");
                        self.framed.send(Packet::error(&e.to_string())).await?;
                        self.framed.send(Packet::exit()).await?;
                    }
                    None => {
                        debug!(session = %self.sid, "Connection closed by peer");
                        break;
                    }
                },
                queued = self.outbound.recv() => match queued {
                    Some(pkt) => self.framed.send(pkt).await?,
                    None => {
                        // Sink dropped: the server removed this session
                        // (idle disconnect, displaced login).
                        debug!(session = %self.sid, "Outbound channel closed by server");
                        break;
                    }
                },
            }
        }

        // Best-effort flush of anything still queued (e.g. the exit packet
        // enqueued just before a server-side removal).
        while let Ok(pkt) = self.outbound.try_recv() {
            let _ = self.framed.send(pkt).await;
        }
        Ok(())
    }

    /// Dispatch one decoded packet with the switchboard locked.
    async fn handle_frame(&self, frame: &Frame) -> Flow {
        let mut core = self.board.core.lock().await;
        if !core.sessions.contains(&self.sid) {
            // Removed while this packet was in flight.
            return Flow::Shutdown;
        }

        let mut ctx = Context {
            sid: self.sid.clone(),
            board: &self.board,
            core: &mut core,
        };

        match self.registry.dispatch(&mut ctx, frame).await {
            Ok(()) => Flow::Continue,
            Err(HandlerError::Quit) => Flow::Shutdown,
            Err(e) if !e.is_fatal() => {
                for pkt in e.to_replies() {
                    core.broker.deliver(&self.sid, pkt);
                }
                Flow::Continue
            }
            Err(e) => {
                // Unexpected failure: never leaks details to the client,
                // aborts only this connection.
                error!(session = %self.sid, addr = %self.addr, error = %e, "Fatal error handling packet");
                core.broker.deliver(&self.sid, Packet::error("Internal server error."));
                core.broker.deliver(&self.sid, Packet::exit());
                Flow::Shutdown
            }
        }
    }

    async fn teardown(&self) {
        let mut core = self.board.core.lock().await;
        helpers::sign_off(&self.board, &mut core, &self.sid).await;
        info!(session = %self.sid, addr = %self.addr, "Connection closed");
    }
}
