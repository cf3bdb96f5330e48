use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_io::Async;
use log::debug;

use crate::future::timeout;
use crate::inbound::{Inbound, SharedInbound};
use crate::{Error, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The transport shared between the writer and the inbound reader.
pub(crate) type Transport = async_dup::Arc<Async<TcpStream>>;

/// One client-side TCP connection.
pub struct Connection {
    id: u64,
    remote: SocketAddr,
    stream: Transport,
    inbound: SharedInbound<Transport>,
    last_activity: Instant,
}

impl Connection {
    /// Dial `remote`, giving up after `connect_timeout`.
    pub(crate) async fn dial(remote: SocketAddr, connect_timeout: Option<Duration>) -> Result<Self> {
        let stream = timeout(connect_timeout, Async::<TcpStream>::connect(remote))
            .await
            .map_err(|_| Error::Timeout("connect"))??;
        stream.get_ref().set_nodelay(true)?;
        let stream = async_dup::Arc::new(stream);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("connection {} to {} established", id, remote);
        Ok(Self {
            id,
            remote,
            inbound: Inbound::shared(stream.clone()),
            stream,
            last_activity: Instant::now(),
        })
    }

    /// A process-wide unique identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The peer address.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Time since the connection was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn writer(&self) -> Transport {
        self.stream.clone()
    }

    pub(crate) fn inbound(&self) -> &SharedInbound<Transport> {
        &self.inbound
    }

    /// Whether the connection can carry another exchange: the last body was
    /// read to its end, nothing unexpected is buffered, and the peer has not
    /// closed its side.
    pub(crate) fn is_reusable(&self) -> bool {
        if !self.inbound.lock().is_idle() {
            return false;
        }
        let mut buf = [0u8; 1];
        match self.stream.get_ref().peek(&mut buf) {
            // closed by the peer, or bytes nobody asked for
            Ok(_) => false,
            Err(err) => err.kind() == io::ErrorKind::WouldBlock,
        }
    }

    pub(crate) fn close(&self) {
        debug!("closing connection {} to {}", self.id, self.remote);
        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("idle_for", &self.idle_for())
            .finish()
    }
}
