//! `BrokerServer` builder and accept loop.
//!
//! This is the entry point for running a Wirebus broker. It ties
//! together all the layers: transport → protocol → session → router.

use wirebus_broker::{Router, RouterHandle};
use wirebus_session::{Session, SessionConfig};
use wirebus_transport::{TcpTransport, Transport};

use crate::WirebusError;

/// Builder for configuring and starting a broker.
///
/// # Example
///
/// ```rust,ignore
/// use wirebus::BrokerServer;
///
/// let server = BrokerServer::builder()
///     .bind("0.0.0.0:7450")
///     .broker_name("hub-1")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct BrokerServerBuilder {
    bind_addr: String,
    broker_name: String,
    session_config: SessionConfig,
}

impl BrokerServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:7450".to_string(),
            broker_name: "wirebus".to_string(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to bind the broker to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the name the broker announces in greetings and notices.
    pub fn broker_name(mut self, name: &str) -> Self {
        self.broker_name = name.to_string();
        self
    }

    /// Sets the per-session timing and limit configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener and builds the broker. Nothing is accepted
    /// until [`run`](BrokerServer::run).
    pub async fn build(self) -> Result<BrokerServer, WirebusError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        let (router, router_handle) = Router::new(self.broker_name);

        Ok(BrokerServer {
            transport,
            router,
            router_handle,
            session_config: self.session_config,
        })
    }
}

impl Default for BrokerServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound, not-yet-running broker.
///
/// Call [`run()`](Self::run) to start the router and the accept loop.
pub struct BrokerServer {
    transport: TcpTransport,
    router: Router,
    router_handle: RouterHandle,
    session_config: SessionConfig,
}

impl BrokerServer {
    /// Creates a new builder.
    pub fn builder() -> BrokerServerBuilder {
        BrokerServerBuilder::new()
    }

    /// Returns the local address the broker is bound to. Useful when
    /// binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the broker: spawns the router task and accepts connections
    /// until the process is terminated.
    ///
    /// Each accepted connection becomes one session task. The session's
    /// handle is registered with the router before the session task is
    /// spawned, so no event can be routed for an unknown session.
    pub async fn run(mut self) -> Result<(), WirebusError> {
        if let Ok(addr) = self.transport.local_addr() {
            tracing::info!(%addr, "broker running");
        }
        tokio::spawn(self.router.run());

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let (session, handle) = Session::new(
                        conn,
                        self.session_config.clone(),
                        self.router_handle.events_sender(),
                    );
                    self.router_handle.register(handle);
                    tokio::spawn(session.run());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
