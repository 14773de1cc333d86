//! Gateway - TCP listener that accepts incoming connections.
//!
//! The Gateway binds the listen socket and spawns a Connection task for
//! each incoming client, after reverse-resolving the peer address.

use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::handlers::Registry;
use crate::network::Connection;
use crate::state::switchboard::Switchboard;

/// How long a reverse lookup may stall an incoming connection.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reverse DNS for client hostnames.
#[derive(Clone)]
pub struct ResolverService {
    resolver: Arc<TokioResolver>,
}

impl ResolverService {
    /// Create a resolver from system config, falling back to defaults.
    pub fn new() -> Self {
        let resolver = TokioResolver::builder_tokio()
            .map(|b| b.build())
            .unwrap_or_else(|_| {
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            });
        Self {
            resolver: Arc::new(resolver),
        }
    }

    /// Resolve an IP to a hostname, falling back to the bare IP text on
    /// timeout or failure.
    pub async fn reverse(&self, ip: IpAddr) -> String {
        let lookup = tokio::time::timeout(RESOLVE_TIMEOUT, self.resolver.reverse_lookup(ip));
        match lookup.await {
            Ok(Ok(names)) => names
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .unwrap_or_else(|| ip.to_string()),
            _ => ip.to_string(),
        }
    }
}

impl Default for ResolverService {
    fn default() -> Self {
        Self::new()
    }
}

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    board: Arc<Switchboard>,
    registry: Arc<Registry>,
    resolver: ResolverService,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        addr: SocketAddr,
        board: Arc<Switchboard>,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Listener bound");
        Ok(Self {
            listener,
            board,
            registry,
            resolver: ResolverService::new(),
        })
    }

    /// Run the gateway, accepting connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "Connection accepted");
                    let board = Arc::clone(&self.board);
                    let registry = Arc::clone(&self.registry);
                    let resolver = self.resolver.clone();

                    tokio::spawn(async move {
                        let hostname = resolver.reverse(addr.ip()).await;
                        let connection =
                            Connection::accept(stream, addr, hostname, board, registry).await;
                        if let Err(e) = connection.run().await {
                            error!(%addr, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
