use std::fmt;

/// The host's one-bit connectivity signal, reused directly by the Offline
/// Manager's network-status observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Online,
    Offline,
    Unknown,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkState::Online => write!(f, "online"),
            NetworkState::Offline => write!(f, "offline"),
            NetworkState::Unknown => write!(f, "unknown"),
        }
    }
}

/// The reconciler's connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Initial list fetch in flight.
    Loading,
    /// Bootstrap applied; SSE connected; receiving events.
    Ready,
    /// SSE reported error or transport disconnect; attempting backoff.
    Reconnecting,
    /// Host reports offline; reconnects are deferred until online.
    Offline,
    /// Terminal within this session, after max reconnect attempts.
    Error,
}
