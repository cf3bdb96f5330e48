//! A bounded pool of idle keep-alive connections, keyed by remote address.
//!
//! Capacity is enforced per address with a channel pre-filled with one
//! permit per allowed connection: a [`Lease`] holds a permit for as long as
//! it lives and hands it back when released or dropped. Idle connections
//! hold no permit, so they never block an acquisition.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender, TryRecvError};
use log::{debug, trace};

use super::connection::Connection;
use crate::config::{Exhausted, PoolConfig};
use crate::future::timeout;
use crate::{Error, Result};

/// A connection pool shared by any number of [`Client`](super::Client)s.
pub struct Pool {
    inner: async_dup::Mutex<Inner>,
}

struct Inner {
    config: PoolConfig,
    generation: u64,
    shut_down: bool,
    hosts: HashMap<SocketAddr, HostPool>,
}

struct HostPool {
    idle: VecDeque<Connection>,
    permits: Sender<()>,
    waiting: Receiver<()>,
}

impl HostPool {
    fn new(capacity: usize) -> Self {
        let (permits, waiting) = async_channel::bounded(capacity);
        for _ in 0..capacity {
            let _ = permits.try_send(());
        }
        Self {
            idle: VecDeque::new(),
            permits,
            waiting,
        }
    }

    fn close(&mut self) {
        for conn in self.idle.drain(..) {
            conn.close();
        }
        self.permits.close();
    }
}

enum Permit {
    Pooled(Sender<()>),
    Overflow,
}

impl Pool {
    /// Create an empty pool.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: async_dup::Mutex::new(Inner {
                config,
                generation: 0,
                shut_down: false,
                hosts: HashMap::new(),
            }),
        }
    }

    /// The current configuration.
    pub fn config(&self) -> PoolConfig {
        self.inner.lock().config.clone()
    }

    /// Hand out a connection to `addr`.
    ///
    /// The most recently released idle connection is reused first; idle
    /// connections that expired or were closed by the peer are discarded on
    /// the way. A new connection is dialed when none is left.
    pub async fn acquire(self: &Arc<Self>, addr: SocketAddr) -> Result<Lease> {
        self.acquire_with(addr, None, None).await
    }

    /// Like [`acquire`](Pool::acquire), but wait at most `deadline` for a
    /// connection to free up instead of the configured acquire timeout.
    pub async fn acquire_timeout(
        self: &Arc<Self>,
        addr: SocketAddr,
        deadline: Duration,
    ) -> Result<Lease> {
        self.acquire_with(addr, None, Some(deadline)).await
    }

    pub(crate) async fn acquire_with(
        self: &Arc<Self>,
        addr: SocketAddr,
        connect_timeout: Option<Duration>,
        deadline: Option<Duration>,
    ) -> Result<Lease> {
        loop {
            let (waiting, generation, config) = {
                let mut inner = self.inner.lock();
                if inner.shut_down {
                    return Err(Error::IllegalState("connection pool is shut down"));
                }
                let capacity = inner.config.max_connections_per_host();
                let host = inner
                    .hosts
                    .entry(addr)
                    .or_insert_with(|| HostPool::new(capacity));
                let waiting = host.waiting.clone();
                (waiting, inner.generation, inner.config.clone())
            };

            let granted = match config.on_exhausted() {
                Exhausted::Wait => {
                    let wait = deadline.unwrap_or_else(|| config.acquire_timeout());
                    match timeout(Some(wait), waiting.recv()).await {
                        Ok(Ok(())) => true,
                        // the pool was reset while we waited
                        Ok(Err(_)) => false,
                        Err(_) => {
                            debug!("no connection to {} became free in time", addr);
                            return Err(Error::Timeout("connection pool acquire"));
                        }
                    }
                }
                Exhausted::Overflow => match waiting.try_recv() {
                    Ok(()) => true,
                    Err(TryRecvError::Closed) => false,
                    Err(TryRecvError::Empty) => {
                        debug!("pool for {} exhausted, dialing an overflow connection", addr);
                        let conn = Connection::dial(addr, connect_timeout).await?;
                        return Ok(Lease::new(Some(self.clone()), conn, Permit::Overflow, generation));
                    }
                },
            };
            if !granted {
                continue;
            }

            let permits = match self.checkout(addr, generation) {
                Checkout::Stale => continue,
                Checkout::Reused(conn, permits) => {
                    trace!("reusing connection {} to {}", conn.id(), addr);
                    return Ok(Lease::new(
                        Some(self.clone()),
                        conn,
                        Permit::Pooled(permits),
                        generation,
                    ));
                }
                Checkout::Empty(permits) => permits,
            };

            return match Connection::dial(addr, connect_timeout).await {
                Ok(conn) => Ok(Lease::new(
                    Some(self.clone()),
                    conn,
                    Permit::Pooled(permits),
                    generation,
                )),
                Err(err) => {
                    let _ = permits.try_send(());
                    Err(err)
                }
            };
        }
    }

    /// Pop the freshest usable idle connection, discarding stale ones.
    fn checkout(&self, addr: SocketAddr, generation: u64) -> Checkout {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Checkout::Stale;
        }
        let idle_timeout = inner.config.idle_timeout();
        let host = match inner.hosts.get_mut(&addr) {
            Some(host) => host,
            None => return Checkout::Stale,
        };
        while let Some(conn) = host.idle.pop_back() {
            let expired = idle_timeout.map_or(false, |t| conn.idle_for() >= t);
            if expired || !conn.is_reusable() {
                debug!("discarding stale connection {} to {}", conn.id(), addr);
                conn.close();
                continue;
            }
            return Checkout::Reused(conn, host.permits.clone());
        }
        Checkout::Empty(host.permits.clone())
    }

    fn put_back(&self, mut conn: Connection, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.shut_down || inner.generation != generation {
            trace!("connection {} outlived its pool generation", conn.id());
            conn.close();
            return;
        }
        match inner.hosts.get_mut(&conn.remote()) {
            Some(host) => {
                conn.touch();
                trace!("connection {} returned to the pool", conn.id());
                host.idle.push_back(conn);
            }
            None => conn.close(),
        }
    }

    /// Close every idle connection and forget all addresses.
    ///
    /// Leases handed out before the reset are closed rather than pooled when
    /// released, and callers waiting for capacity start over. Calling it
    /// again is harmless.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        Self::reset_locked(&mut inner);
    }

    /// [`reset`](Pool::reset), then switch to `config`.
    pub fn reset_with(&self, config: PoolConfig) {
        let mut inner = self.inner.lock();
        Self::reset_locked(&mut inner);
        inner.config = config;
    }

    /// Reset and refuse any further acquisition.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        Self::reset_locked(&mut inner);
        inner.shut_down = true;
    }

    fn reset_locked(inner: &mut Inner) {
        for (addr, mut host) in inner.hosts.drain() {
            debug!("resetting pool for {}", addr);
            host.close();
        }
        inner.generation += 1;
    }

    /// Close idle connections past the idle timeout; returns how many.
    pub fn evict_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let idle_timeout = match inner.config.idle_timeout() {
            Some(t) => t,
            None => return 0,
        };
        let mut evicted = 0;
        for host in inner.hosts.values_mut() {
            host.idle.retain(|conn| {
                if conn.idle_for() >= idle_timeout {
                    conn.close();
                    evicted += 1;
                    false
                } else {
                    true
                }
            });
        }
        evicted
    }

    /// Number of idle connections to `addr`.
    pub fn idle_count(&self, addr: SocketAddr) -> usize {
        self.inner
            .lock()
            .hosts
            .get(&addr)
            .map_or(0, |host| host.idle.len())
    }
}

impl Default for Pool {
    fn default() -> Self {
        Pool::new(PoolConfig::default())
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Pool")
            .field("config", &inner.config)
            .field("generation", &inner.generation)
            .field("hosts", &inner.hosts.len())
            .finish()
    }
}

enum Checkout {
    Stale,
    Reused(Connection, Sender<()>),
    Empty(Sender<()>),
}

/// Exclusive use of one connection.
///
/// Dropping a lease closes the connection; only [`release`](Lease::release)
/// with `reusable = true` returns it to the pool.
pub struct Lease {
    pool: Option<Arc<Pool>>,
    conn: Option<Connection>,
    permit: Permit,
    generation: u64,
}

impl Lease {
    fn new(pool: Option<Arc<Pool>>, conn: Connection, permit: Permit, generation: u64) -> Self {
        Self {
            pool,
            conn: Some(conn),
            permit,
            generation,
        }
    }

    /// A lease on a connection that belongs to no pool.
    pub(crate) fn unpooled(conn: Connection) -> Self {
        Self::new(None, conn, Permit::Overflow, 0)
    }

    /// The leased connection.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// Give the connection back.
    ///
    /// It is pooled only when `reusable` is set, the lease holds a pool
    /// permit, and the connection is still clean and open; otherwise it is
    /// closed.
    pub fn release(mut self, reusable: bool) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };
        match (&self.pool, &self.permit) {
            (Some(pool), Permit::Pooled(_)) if reusable && conn.is_reusable() => {
                pool.put_back(conn, self.generation)
            }
            _ => conn.close(),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
        if let Permit::Pooled(permits) = &self.permit {
            let _ = permits.try_send(());
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("conn", &self.conn)
            .field("pooled", &matches!(self.permit, Permit::Pooled(_)))
            .field("generation", &self.generation)
            .finish()
    }
}
