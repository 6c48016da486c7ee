//! Registry configuration.

use partyline_transport::DEFAULT_OUTBOX_CAPACITY;

/// Tunables for the room registry and its actor task.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of the registry's command mailbox. Senders wait when it
    /// is full.
    pub mailbox_size: usize,

    /// How many room codes to try before giving up on `createRoom`.
    pub max_code_attempts: usize,

    /// Undelivered events a connection may have queued. Events for a
    /// connection whose outbox is full are dropped.
    pub outbox_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_size: 256,
            max_code_attempts: 1024,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}
