//! Proxy error types

/// Error type for proxy registry and session operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// No session registered under this nickname
    SessionNotFound(String),
    /// A session with this nickname already exists
    SessionAlreadyExists(String),
    /// The session has been closed
    SessionClosed,
    /// The session has not completed its handshake
    SessionUnavailable,
    /// Every lazy-pirate attempt failed; the session is dead
    RetriesExhausted { attempts: u32 },
    /// The worker did not complete the Hello/World handshake
    Handshake(String),
    /// Transport-level failure outside the retry loop
    Transport(String),
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::SessionNotFound(nickname) => {
                write!(f, "command proxy not found: {}", nickname)
            }
            ProxyError::SessionAlreadyExists(nickname) => {
                write!(f, "command proxy already started: {}", nickname)
            }
            ProxyError::SessionClosed => write!(f, "command proxy session is closed"),
            ProxyError::SessionUnavailable => {
                write!(f, "command proxy session has not completed its handshake")
            }
            ProxyError::RetriesExhausted { attempts } => {
                write!(f, "command timed out after {} attempts", attempts)
            }
            ProxyError::Handshake(reason) => write!(f, "handshake failed: {}", reason),
            ProxyError::Transport(reason) => write!(f, "transport error: {}", reason),
        }
    }
}

impl std::error::Error for ProxyError {}
