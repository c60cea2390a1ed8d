use crate::state::ConnectionStatus;

/// State-transition events broadcast to subscribers, feeding the
/// `onConnected`/`onDisconnected`/`onError` propagation slots.
#[derive(Debug, Clone)]
pub enum ReconcilerEvent {
    Connected { seq: u64 },
    Disconnected,
    Error(String),
    StatusChanged(ConnectionStatus),
}
