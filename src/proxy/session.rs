//! Proxy session implementation
//!
//! A session wraps one REQ socket pointed at one worker. The socket lives
//! behind a mutex so request/reply pairs never interleave; `available`
//! and `closed` are atomics so callers can short-circuit without taking
//! the mutex.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::timeout;
use zeromq::{Socket, SocketRecv, SocketSend, ZmqMessage};

use super::config::ProxyConfig;
use super::error::ProxyError;

const HANDSHAKE_REQUEST: &str = "Hello";
const HANDSHAKE_RESPONSE: &str = "World";

#[derive(Serialize)]
struct HandshakeRequest {
    request: &'static str,
}

#[derive(Deserialize)]
struct HandshakeReply {
    response: String,
}

/// Outcome of one lazy-pirate attempt
enum Attempt {
    /// Reply received
    Done(Bytes),
    /// Recoverable transport failure; the socket has been destroyed
    Retry(String),
    /// Give up immediately
    Fatal(ProxyError),
}

/// A long-lived REQ/REP client session against one worker
pub struct ProxySession {
    nickname: String,
    hostname: String,
    port: u16,
    config: ProxyConfig,
    /// `None` between teardown and recreation of the socket
    socket: Mutex<Option<zeromq::ReqSocket>>,
    available: AtomicBool,
    closed: AtomicBool,
}

impl ProxySession {
    pub(super) fn new(
        nickname: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
        config: ProxyConfig,
    ) -> Self {
        Self {
            nickname: nickname.into(),
            hostname: hostname.into(),
            port,
            config,
            socket: Mutex::new(None),
            available: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Session nickname
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Worker hostname
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Worker port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the handshake has completed
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}:{}", self.hostname, self.port)
    }

    async fn open_socket(&self) -> Result<zeromq::ReqSocket, ProxyError> {
        let mut socket = zeromq::ReqSocket::new();
        socket
            .connect(&self.endpoint())
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;
        Ok(socket)
    }

    /// Greet the worker and mark the session available
    ///
    /// Runs under the session mutex with `handshake_timeout` bounding the
    /// connection, the send, and the receive. On any failure the session
    /// stays unavailable and the caller is expected to tear it down.
    pub(super) async fn handshake(&self) -> Result<(), ProxyError> {
        let deadline = self.config.handshake_timeout;
        let mut guard = self.socket.lock().await;

        if self.is_closed() {
            return Err(ProxyError::SessionClosed);
        }

        let mut socket = timeout(deadline, self.open_socket())
            .await
            .map_err(|_| ProxyError::Handshake("timed out connecting to worker".into()))??;

        let greeting = serde_json::to_vec(&HandshakeRequest {
            request: HANDSHAKE_REQUEST,
        })
        .map_err(|e| ProxyError::Handshake(e.to_string()))?;

        timeout(deadline, socket.send(ZmqMessage::from(greeting)))
            .await
            .map_err(|_| ProxyError::Handshake("timed out sending greeting".into()))?
            .map_err(|e| ProxyError::Handshake(e.to_string()))?;

        let reply = timeout(deadline, socket.recv())
            .await
            .map_err(|_| ProxyError::Handshake("timed out waiting for greeting reply".into()))?
            .map_err(|e| ProxyError::Handshake(e.to_string()))?;

        let frame = reply.get(0).cloned().unwrap_or_default();
        let parsed: HandshakeReply = serde_json::from_slice(&frame)
            .map_err(|e| ProxyError::Handshake(format!("malformed greeting reply: {}", e)))?;

        if parsed.response != HANDSHAKE_RESPONSE {
            return Err(ProxyError::Handshake(format!(
                "unexpected greeting reply: {}",
                parsed.response
            )));
        }

        // Subsequent exchanges run under msg_timeout instead.
        *guard = Some(socket);
        self.available.store(true, Ordering::Release);
        tracing::info!(nickname = %self.nickname, endpoint = %self.endpoint(), "Command proxy available");
        Ok(())
    }

    /// Perform one request/reply roundtrip with lazy-pirate recovery
    ///
    /// Rejects immediately when the session is closed or has never
    /// completed its handshake. Otherwise up to `max_retries` attempts
    /// run, each under the session mutex; a timed-out or failed exchange
    /// destroys the socket, and the next attempt connects a fresh one.
    pub async fn send(&self, payload: Bytes) -> Result<Bytes, ProxyError> {
        if self.is_closed() {
            return Err(ProxyError::SessionClosed);
        }
        if !self.is_available() {
            return Err(ProxyError::SessionUnavailable);
        }

        let max_retries = self.config.max_retries;
        for attempt in 1..=max_retries {
            match self.attempt(&payload).await {
                Attempt::Done(reply) => return Ok(reply),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retry(reason) => {
                    tracing::warn!(
                        nickname = %self.nickname,
                        attempt,
                        max_retries,
                        error = %reason,
                        "Command attempt failed, recreating socket"
                    );
                    if attempt < max_retries {
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                }
            }
        }

        Err(ProxyError::RetriesExhausted {
            attempts: max_retries,
        })
    }

    async fn attempt(&self, payload: &Bytes) -> Attempt {
        let msg_timeout = self.config.msg_timeout;
        let mut guard = self.socket.lock().await;

        if self.is_closed() {
            return Attempt::Fatal(ProxyError::SessionClosed);
        }

        // Take the socket out of the slot; it only goes back in after a
        // clean exchange, so every failure path below destroys it.
        let mut socket = match guard.take() {
            Some(socket) => socket,
            None => match timeout(msg_timeout, self.open_socket()).await {
                Ok(Ok(socket)) => socket,
                Ok(Err(e)) => return Attempt::Retry(format!("reconnect failed: {}", e)),
                Err(_) => return Attempt::Retry("reconnect timed out".into()),
            },
        };

        match timeout(msg_timeout, socket.send(ZmqMessage::from(payload.clone()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Attempt::Retry(format!("send failed: {}", e)),
            Err(_) => return Attempt::Retry("send timed out".into()),
        }

        match timeout(msg_timeout, socket.recv()).await {
            Ok(Ok(reply)) => {
                let frame = reply.get(0).cloned().unwrap_or_default();
                *guard = Some(socket);
                Attempt::Done(frame)
            }
            Ok(Err(e)) => Attempt::Retry(format!("receive failed: {}", e)),
            Err(_) => Attempt::Retry("receive timed out".into()),
        }
    }

    /// Tear the session down
    ///
    /// Idempotent: the first call flips `closed`, drops availability, and
    /// closes the socket; later calls return immediately. Every operation
    /// after the first close fails with a closed-session error.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.available.store(false, Ordering::Release);

        let socket = self.socket.lock().await.take();
        if let Some(socket) = socket {
            socket.close().await;
        }
        tracing::debug!(nickname = %self.nickname, "Command proxy session closed");
    }
}

impl std::fmt::Debug for ProxySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySession")
            .field("nickname", &self.nickname)
            .field("endpoint", &self.endpoint())
            .field("available", &self.is_available())
            .field("closed", &self.is_closed())
            .finish()
    }
}
