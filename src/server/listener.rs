//! A TCP listener driving [`accept_with_config`] for every connection.

use std::fmt;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_global_executor::Task;
use async_io::{Async, Timer};
use log::{debug, error, info};

use super::accept_with_config;
use crate::{Error, ErrorKind, Handler, Result, ServerConfig};

/// A running HTTP/1.1 server.
///
/// Every accepted connection is served on its own task. Dropping the server,
/// or calling [`shutdown`](Server::shutdown), stops accepting and cancels
/// every connection still in flight.
pub struct Server {
    local_addr: SocketAddr,
    config: ServerConfig,
    task: Task<()>,
}

impl Server {
    /// Bind to the configured address and start serving with `handler`.
    pub fn bind<H: Handler>(config: ServerConfig, handler: H) -> Result<Server> {
        let addr = (config.host(), config.port())
            .to_socket_addrs()?
            .next()
            .ok_or(Error::IllegalState("server host did not resolve"))?;
        let listener = Async::<TcpListener>::bind(addr)?;
        let local_addr = listener.get_ref().local_addr()?;
        info!("{}", DisplayBound(&config, local_addr));

        let handler: Arc<dyn Handler> = Arc::new(handler);
        let task = async_global_executor::spawn(serve(listener, handler, config.clone()));
        Ok(Server {
            local_addr,
            config,
            task,
        })
    }

    /// The address the server actually listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The configuration the server was bound with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Stop accepting and cancel every in-flight connection.
    pub async fn shutdown(self) {
        self.task.cancel().await;
        debug!("server on {} shut down", self.local_addr);
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish()
    }
}

struct DisplayBound<'a>(&'a ServerConfig, SocketAddr);

impl fmt::Display for DisplayBound<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (bound to {})", self.0, self.1)
    }
}

async fn serve(listener: Async<TcpListener>, handler: Arc<dyn Handler>, config: ServerConfig) {
    // connection tasks are cancelled when this vector is dropped
    let mut connections: Vec<Task<()>> = Vec::new();

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("accept failed: {}", err);
                // usually fd exhaustion; give in-flight connections a moment
                Timer::after(Duration::from_millis(50)).await;
                continue;
            }
        };
        connections.retain(|task| !task.is_finished());
        debug!("accepted connection from {}", peer);

        let io = async_dup::Arc::new(stream);
        let handler = handler.clone();
        let config = config.clone();
        connections.push(async_global_executor::spawn(async move {
            match accept_with_config(io, &*handler, &config).await {
                Ok(()) => debug!("connection from {} closed", peer),
                Err(err) => match err.kind() {
                    ErrorKind::Disconnect | ErrorKind::Timeout => {
                        debug!("connection from {} ended: {}", peer, err)
                    }
                    _ => error!("connection from {} failed: {}", peer, err),
                },
            }
        }));
    }
}
