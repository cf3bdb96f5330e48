use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_lite::{stream, StreamExt};
use h1_transport::client::{Client, Pool};
use h1_transport::server::Server;
use h1_transport::{
    Body, Error, ErrorKind, Exhausted, PoolConfig, Request, Response, Result, Router,
    ServerConfig,
};
use http_types::StatusCode;
use pretty_assertions::assert_eq;

async fn hello(_req: Request) -> Result<Response> {
    Ok(Response::new(StatusCode::Ok).with_body("hello"))
}

async fn failing(_req: Request) -> Result<Response> {
    let parts: Vec<Result<Bytes>> = vec![
        Ok(Bytes::from("ab")),
        Ok(Bytes::from("cd")),
        Err(Error::handler("producer gave up")),
    ];
    Ok(Response::new(StatusCode::Ok).with_body(Body::from_stream(stream::iter(parts))))
}

async fn endless(_req: Request) -> Result<Response> {
    let (tx, body) = Body::channel(1);
    async_std::task::spawn(async move {
        for _ in 0..1000 {
            if tx.send("tick").await.is_err() {
                return;
            }
            async_std::task::sleep(Duration::from_millis(5)).await;
        }
    });
    Ok(Response::new(StatusCode::Ok).with_body(body))
}

fn server() -> Result<Server> {
    let config = ServerConfig::builder().host("127.0.0.1").port(0).build()?;
    let router = Router::new()
        .get("/", hello)
        .get("/fail", failing)
        .get("/endless", endless);
    Server::bind(config, router)
}

#[async_std::test]
async fn shared_pool_of_one_is_reused() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let pool = Arc::new(Pool::new(PoolConfig::fixed(1)?));
    let first = Client::with_pool(addr, pool.clone());
    let second = Client::with_pool(addr, pool.clone());

    let res = first.get("/").await?;
    let id = res.connection_id();
    assert_eq!(res.body_string().await?, "hello");

    let res = second.get("/").await?;
    assert_eq!(res.connection_id(), id);
    assert_eq!(res.body_string().await?, "hello");

    let unpooled = Client::without_pool(addr);
    let res = unpooled.get("/").await?;
    assert_ne!(res.connection_id(), id);
    assert_eq!(res.body_string().await?, "hello");
    assert_eq!(pool.idle_count(addr), 1);

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn waiting_for_capacity_times_out() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let config = PoolConfig::builder()
        .max_connections_per_host(1)
        .acquire_timeout(Duration::from_millis(100))
        .build()?;
    let pool = Arc::new(Pool::new(config));

    let held = pool.acquire(addr).await?;
    let err = pool.acquire(addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // capacity comes back with the lease
    drop(held);
    let lease = pool.acquire(addr).await?;
    assert!(lease.connection().is_some());

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn caller_deadline_overrides_the_acquire_timeout() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    // the configured acquire timeout is 45 seconds
    let pool = Arc::new(Pool::new(PoolConfig::fixed(1)?));

    let held = pool.acquire(addr).await?;
    let started = Instant::now();
    let err = pool
        .acquire_timeout(addr, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));

    drop(held);
    let lease = pool.acquire_timeout(addr, Duration::from_millis(50)).await?;
    assert!(lease.connection().is_some());

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn waiter_gets_the_released_connection() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let pool = Arc::new(Pool::new(PoolConfig::fixed(1)?));

    let held = pool.acquire(addr).await?;
    let id = held.connection().map(|c| c.id());
    let waiter = {
        let pool = pool.clone();
        async_std::task::spawn(async move { pool.acquire(addr).await })
    };
    async_std::task::sleep(Duration::from_millis(20)).await;
    held.release(true);

    let lease = waiter.await?;
    assert_eq!(lease.connection().map(|c| c.id()), id);

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn overflow_connections_are_never_pooled() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let config = PoolConfig::builder()
        .max_connections_per_host(1)
        .on_exhausted(Exhausted::Overflow)
        .build()?;
    let pool = Arc::new(Pool::new(config));

    let pooled = pool.acquire(addr).await?;
    let overflow = pool.acquire(addr).await?;
    assert_ne!(
        pooled.connection().map(|c| c.id()),
        overflow.connection().map(|c| c.id())
    );

    overflow.release(true);
    assert_eq!(pool.idle_count(addr), 0);
    pooled.release(true);
    assert_eq!(pool.idle_count(addr), 1);

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn reset_closes_idle_and_outstanding_connections() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let pool = Arc::new(Pool::new(PoolConfig::default()));

    let idle = pool.acquire(addr).await?;
    let outstanding = pool.acquire(addr).await?;
    idle.release(true);
    assert_eq!(pool.idle_count(addr), 1);

    pool.reset();
    assert_eq!(pool.idle_count(addr), 0);
    pool.reset();

    // leased before the reset, so it is closed instead of pooled
    outstanding.release(true);
    assert_eq!(pool.idle_count(addr), 0);

    let fresh = pool.acquire(addr).await?;
    fresh.release(true);
    assert_eq!(pool.idle_count(addr), 1);

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn stale_idle_connection_is_discarded() -> Result<()> {
    let first = server()?;
    let addr = first.local_addr();
    let pool = Arc::new(Pool::new(PoolConfig::default()));
    let client = Client::with_pool(addr, pool.clone());

    let res = client.get("/").await?;
    let before = res.connection_id();
    res.body_bytes().await?;
    assert_eq!(pool.idle_count(addr), 1);

    // the server goes away and comes back; the pooled socket is now dead
    first.shutdown().await;
    let config = ServerConfig::builder().address(addr).build()?;
    let second = Server::bind(config, hello)?;
    async_std::task::sleep(Duration::from_millis(50)).await;

    let res = client.get("/").await?;
    assert_ne!(res.connection_id(), before);
    assert_eq!(res.body_string().await?, "hello");

    second.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn expired_idle_connections_are_evicted() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let config = PoolConfig::builder()
        .idle_timeout(Some(Duration::from_millis(10)))
        .build()?;
    let pool = Arc::new(Pool::new(config));

    pool.acquire(addr).await?.release(true);
    assert_eq!(pool.idle_count(addr), 1);
    async_std::task::sleep(Duration::from_millis(30)).await;
    assert_eq!(pool.evict_expired(), 1);
    assert_eq!(pool.idle_count(addr), 0);

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn shut_down_pool_refuses_to_acquire() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let pool = Arc::new(Pool::default());
    pool.shutdown();
    let err = pool.acquire(addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn mid_stream_failure_reaches_the_consumer() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let client = Client::new(addr);

    let res = client.get("/fail").await?;
    assert_eq!(res.status(), StatusCode::Ok);
    let mut body = res.into_body();
    assert_eq!(body.next().await.transpose()?, Some(Bytes::from("ab")));
    assert_eq!(body.next().await.transpose()?, Some(Bytes::from("cd")));
    let err = body.next().await.map(|item| item.unwrap_err());
    assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Disconnect));
    drop(body);

    // the broken connection was closed, not pooled
    assert_eq!(client.pool().map(|p| p.idle_count(addr)), Some(0));
    let res = client.get("/").await?;
    assert_eq!(res.body_string().await?, "hello");

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn dropping_a_body_early_closes_the_connection() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let client = Client::new(addr);

    let res = client.get("/endless").await?;
    let before = res.connection_id();
    let mut body = res.into_body();
    assert_eq!(body.next().await.transpose()?, Some(Bytes::from("tick")));
    drop(body);
    assert_eq!(client.pool().map(|p| p.idle_count(addr)), Some(0));

    let res = client.get("/").await?;
    assert_ne!(res.connection_id(), before);
    assert_eq!(res.body_string().await?, "hello");

    server.shutdown().await;
    Ok(())
}

#[async_std::test]
async fn reset_with_switches_capacity() -> Result<()> {
    let server = server()?;
    let addr = server.local_addr();
    let config = PoolConfig::builder()
        .max_connections_per_host(1)
        .acquire_timeout(Duration::from_millis(50))
        .build()?;
    let pool = Arc::new(Pool::new(config));

    let first = pool.acquire(addr).await?;
    pool.reset_with(PoolConfig::fixed(2)?);
    assert_eq!(pool.config().max_connections_per_host(), 2);

    // the new capacity applies right away, the old lease is not counted
    let second = pool.acquire(addr).await?;
    let third = pool.acquire(addr).await?;
    drop((first, second, third));

    server.shutdown().await;
    Ok(())
}
