//! Store events and their wire framing.
//!
//! `StoreEvent` is what the payload store emits, in mutation order.
//! `BroadcastMessage` is the JSON object sent to dev clients, one per frame:
//! `{"event": "snapshot"|"update"|"remove", "uuid"?, "version", "payload"?}`.

use serde::{Deserialize, Serialize};

use crate::extension::{ExtensionInstance, ExtensionPayload};
use crate::ids::ExtensionUuid;

/// State change emitted by the payload store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// An extension was created or its payload changed.
    Update {
        /// Extension uuid.
        uuid: ExtensionUuid,
        /// Version assigned to this payload.
        version: u64,
        /// New payload.
        payload: ExtensionPayload,
        /// `true` when this is the first payload for the uuid.
        is_full_snapshot: bool,
    },
    /// An extension was removed.
    Remove {
        /// Extension uuid.
        uuid: ExtensionUuid,
        /// Version assigned to the removal.
        version: u64,
    },
}

impl StoreEvent {
    /// Uuid the event refers to.
    pub fn uuid(&self) -> &ExtensionUuid {
        match self {
            Self::Update { uuid, .. } | Self::Remove { uuid, .. } => uuid,
        }
    }

    /// Version carried by the event.
    pub fn version(&self) -> u64 {
        match self {
            Self::Update { version, .. } | Self::Remove { version, .. } => *version,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
        }
    }
}

/// Server → client message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum BroadcastMessage {
    /// Full current state, sent once right after the handshake.
    Snapshot {
        /// Highest version included in the snapshot.
        version: u64,
        /// Every tracked extension, in store insertion order.
        payload: Vec<ExtensionInstance>,
    },
    /// One extension's new state.
    Update {
        /// Extension uuid.
        uuid: ExtensionUuid,
        /// Version of this payload.
        version: u64,
        /// The extension as it now stands.
        payload: ExtensionInstance,
    },
    /// One extension went away.
    Remove {
        /// Extension uuid.
        uuid: ExtensionUuid,
        /// Version assigned to the removal.
        version: u64,
    },
}

impl From<&StoreEvent> for BroadcastMessage {
    fn from(event: &StoreEvent) -> Self {
        match event {
            StoreEvent::Update {
                uuid,
                version,
                payload,
                ..
            } => Self::Update {
                uuid: uuid.clone(),
                version: *version,
                payload: ExtensionInstance {
                    uuid: uuid.clone(),
                    version: *version,
                    payload: payload.clone(),
                },
            },
            StoreEvent::Remove { uuid, version } => Self::Remove {
                uuid: uuid.clone(),
                version: *version,
            },
        }
    }
}
