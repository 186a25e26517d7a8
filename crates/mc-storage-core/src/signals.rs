use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity for a backend's signal stream.
const DEFAULT_CAPACITY: usize = 64;

/// An out-of-band change a backend reports about an account it stores.
///
/// Before emitting `AlteredOne` or `Toggled`, a backend must already return the
/// new value from its getters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "signal")]
pub enum StorageEvent {
    /// An external entity created an account.
    Created { account: String },
    /// An external entity altered one attribute (`DisplayName`) or
    /// parameter (`param-account`).
    AlteredOne { account: String, key: String },
    /// An external entity deleted an account.
    Deleted { account: String },
    /// An external entity enabled or disabled an account.
    Toggled { account: String, enabled: bool },
    /// Important parameters changed; the account should reconnect.
    Reconnect { account: String },
}

impl StorageEvent {
    pub fn account(&self) -> &str {
        match self {
            StorageEvent::Created { account }
            | StorageEvent::AlteredOne { account, .. }
            | StorageEvent::Deleted { account }
            | StorageEvent::Toggled { account, .. }
            | StorageEvent::Reconnect { account } => account,
        }
    }
}

/// Emitter for a backend's signals. Any number of listeners may subscribe.
#[derive(Debug, Clone)]
pub struct StorageSignals {
    name: String,
    sender: broadcast::Sender<StorageEvent>,
}

impl StorageSignals {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }

    /// Emit `event`. Returns the number of listeners that received it.
    pub fn emit(&self, event: StorageEvent) -> usize {
        debug!("{}: emitting {:?}", self.name, event);
        // No listener is not an error: nobody cares yet.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn emit_created(&self, account: &str) -> usize {
        self.emit(StorageEvent::Created {
            account: account.to_string(),
        })
    }

    pub fn emit_altered_one(&self, account: &str, key: &str) -> usize {
        self.emit(StorageEvent::AlteredOne {
            account: account.to_string(),
            key: key.to_string(),
        })
    }

    pub fn emit_deleted(&self, account: &str) -> usize {
        self.emit(StorageEvent::Deleted {
            account: account.to_string(),
        })
    }

    pub fn emit_toggled(&self, account: &str, enabled: bool) -> usize {
        self.emit(StorageEvent::Toggled {
            account: account.to_string(),
            enabled,
        })
    }

    pub fn emit_reconnect(&self, account: &str) -> usize {
        self.emit(StorageEvent::Reconnect {
            account: account.to_string(),
        })
    }
}
