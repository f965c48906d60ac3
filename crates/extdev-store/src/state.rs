//! Versioning and diffing logic, independent of the writer task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use extdev_core::{BroadcastMessage, ExtensionInstance, ExtensionPayload, ExtensionUuid, StoreEvent};
use indexmap::IndexMap;

/// One tracked extension plus when it last changed.
#[derive(Clone, Debug, PartialEq)]
pub struct PayloadStoreEntry {
    /// Current state.
    pub instance: ExtensionInstance,
    /// Time of the last create/update.
    pub last_updated: DateTime<Utc>,
}

/// Result of an upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First payload for the uuid.
    Created {
        /// Version assigned.
        version: u64,
    },
    /// Payload changed.
    Updated {
        /// Version assigned.
        version: u64,
    },
    /// Payload identical to the stored one; nothing emitted.
    Unchanged {
        /// Current (unchanged) version.
        version: u64,
    },
}

impl UpsertOutcome {
    /// Version of the entry after the upsert.
    pub fn version(self) -> u64 {
        match self {
            Self::Created { version } | Self::Updated { version } | Self::Unchanged { version } => {
                version
            }
        }
    }

    /// Whether an event was emitted.
    pub fn emitted(self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Point-in-time view of the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Entries in insertion order.
    pub entries: Vec<ExtensionInstance>,
    /// Highest version ever issued per uuid, including removed uuids.
    pub watermarks: HashMap<ExtensionUuid, u64>,
    /// Highest version among `entries` (0 when empty).
    pub version: u64,
}

impl StoreSnapshot {
    /// Whether an event is already reflected in this snapshot.
    pub fn covers(&self, event: &StoreEvent) -> bool {
        self.watermarks
            .get(event.uuid())
            .is_some_and(|seen| event.version() <= *seen)
    }

    /// Wire form of the snapshot.
    pub fn to_message(&self) -> BroadcastMessage {
        BroadcastMessage::Snapshot {
            version: self.version,
            payload: self.entries.clone(),
        }
    }
}

/// In-memory state: entries keyed by uuid plus per-uuid version high-water marks.
///
/// Not synchronized; the [`PayloadStore`](crate::PayloadStore) writer task is
/// its only mutator.
#[derive(Debug, Default)]
pub struct StoreState {
    entries: IndexMap<ExtensionUuid, PayloadStoreEntry>,
    watermarks: HashMap<ExtensionUuid, u64>,
}

impl StoreState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&mut self, uuid: &ExtensionUuid) -> u64 {
        let slot = self.watermarks.entry(uuid.clone()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Create or replace the payload for `uuid`.
    ///
    /// Returns the event to emit, if any. An unchanged payload leaves the
    /// version untouched and yields no event.
    pub fn upsert(
        &mut self,
        uuid: ExtensionUuid,
        payload: ExtensionPayload,
    ) -> (UpsertOutcome, Option<StoreEvent>) {
        if let Some(entry) = self.entries.get(&uuid) {
            if entry.instance.payload == payload {
                return (
                    UpsertOutcome::Unchanged {
                        version: entry.instance.version,
                    },
                    None,
                );
            }
        }

        let version = self.next_version(&uuid);
        let is_full_snapshot = !self.entries.contains_key(&uuid);
        let entry = PayloadStoreEntry {
            instance: ExtensionInstance {
                uuid: uuid.clone(),
                version,
                payload: payload.clone(),
            },
            last_updated: Utc::now(),
        };
        // Replacing an existing key keeps its original position.
        let _ = self.entries.insert(uuid.clone(), entry);

        let outcome = if is_full_snapshot {
            UpsertOutcome::Created { version }
        } else {
            UpsertOutcome::Updated { version }
        };
        let event = StoreEvent::Update {
            uuid,
            version,
            payload,
            is_full_snapshot,
        };
        (outcome, Some(event))
    }

    /// Remove `uuid`. Returns the removal event, or `None` if it was not tracked.
    pub fn remove(&mut self, uuid: &ExtensionUuid) -> Option<StoreEvent> {
        let _ = self.entries.shift_remove(uuid)?;
        let version = self.next_version(uuid);
        Some(StoreEvent::Remove {
            uuid: uuid.clone(),
            version,
        })
    }

    /// Current entry for `uuid`.
    pub fn get(&self, uuid: &str) -> Option<&PayloadStoreEntry> {
        self.entries.get(uuid)
    }

    /// Number of tracked extensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no extension is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest version ever issued for `uuid`.
    pub fn watermark(&self, uuid: &str) -> Option<u64> {
        self.watermarks.get(uuid).copied()
    }

    /// Capture a snapshot of all entries in insertion order.
    pub fn snapshot(&self) -> StoreSnapshot {
        let entries: Vec<ExtensionInstance> = self
            .entries
            .values()
            .map(|e| e.instance.clone())
            .collect();
        let version = entries.iter().map(|e| e.version).max().unwrap_or(0);
        StoreSnapshot {
            entries,
            watermarks: self.watermarks.clone(),
            version,
        }
    }
}
