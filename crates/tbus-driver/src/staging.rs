//! Multi-stage crosspoint staging
//!
//! Control surfaces often select level, destination and source with
//! separate buttons and then press "take". Each controller builds its
//! selection here one field at a time; a take reads all three at once.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tbus_core::{CrosspointCommand, Level};
use thiserror::Error;
use tracing::debug;

use crate::config::StagingConfig;

/// Opaque identifier of whoever builds a selection (e.g. a button bank)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ControllerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ControllerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields of a staged selection, in the order a take checks them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingField {
    Level,
    Destination,
    Source,
}

impl fmt::Display for StagingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StagingField::Level => "level",
            StagingField::Destination => "destination",
            StagingField::Source => "source",
        })
    }
}

/// A take was requested before the selection was complete
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no {missing} selected")]
pub struct StagingIncomplete {
    /// First missing field in level, destination, source order
    pub missing: StagingField,
}

/// A partially built selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingEntry {
    pub level: Option<Level>,
    pub destination: Option<u16>,
    pub source: Option<u16>,
}

impl StagingEntry {
    /// The command this selection describes, or the first missing field
    pub fn command(&self) -> Result<CrosspointCommand, StagingIncomplete> {
        let missing = |missing| StagingIncomplete { missing };

        let level = self.level.ok_or(missing(StagingField::Level))?;
        let destination = self.destination.ok_or(missing(StagingField::Destination))?;
        let source = self.source.ok_or(missing(StagingField::Source))?;

        Ok(CrosspointCommand {
            level,
            destination,
            source,
        })
    }
}

#[derive(Debug, Default)]
struct Slot {
    entry: StagingEntry,
    touched: u64,
}

/// Per-controller staged selections.
///
/// Updates to one controller are atomic with respect to each other and to
/// takes by the same controller; different controllers never contend beyond
/// a shard lock. The store holds at most `max_controllers` entries and
/// evicts the least recently touched one to make room.
#[derive(Debug)]
pub struct StagingStore {
    entries: DashMap<ControllerId, Slot>,
    clock: AtomicU64,
    max_controllers: usize,
    clear_on_commit: bool,
}

impl Default for StagingStore {
    fn default() -> Self {
        Self::new(StagingConfig::default())
    }
}

impl StagingStore {
    pub fn new(config: StagingConfig) -> Self {
        Self {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            max_controllers: config.max_controllers.max(1),
            clear_on_commit: config.clear_on_commit,
        }
    }

    pub fn set_level(&self, id: &ControllerId, level: Level) {
        self.update(id, |entry| entry.level = Some(level));
    }

    pub fn set_destination(&self, id: &ControllerId, destination: u16) {
        self.update(id, |entry| entry.destination = Some(destination));
    }

    pub fn set_source(&self, id: &ControllerId, source: u16) {
        self.update(id, |entry| entry.source = Some(source));
    }

    /// Read the selection for a take.
    ///
    /// The entry stays in place afterwards unless the store was configured
    /// with `clear_on_commit`, in which case a successful take removes it.
    pub fn try_commit(&self, id: &ControllerId) -> Result<CrosspointCommand, StagingIncomplete> {
        if !self.clear_on_commit {
            return self
                .entries
                .get(id)
                .map(|slot| slot.entry)
                .unwrap_or_default()
                .command();
        }

        match self.entries.entry(id.clone()) {
            Entry::Occupied(slot) => {
                let command = slot.get().entry.command()?;
                slot.remove();
                Ok(command)
            }
            Entry::Vacant(_) => StagingEntry::default().command(),
        }
    }

    /// Current selection of a controller
    pub fn get(&self, id: &ControllerId) -> Option<StagingEntry> {
        self.entries.get(id).map(|slot| slot.entry)
    }

    /// Forget a controller's selection
    pub fn clear(&self, id: &ControllerId) -> Option<StagingEntry> {
        self.entries.remove(id).map(|(_, slot)| slot.entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update(&self, id: &ControllerId, apply: impl FnOnce(&mut StagingEntry)) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.entries.contains_key(id) && self.entries.len() >= self.max_controllers {
            self.evict_oldest();
        }

        let mut slot = self.entries.entry(id.clone()).or_default();
        apply(&mut slot.entry);
        slot.touched = tick;
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|slot| slot.touched)
            .map(|slot| slot.key().clone());

        if let Some(id) = oldest {
            debug!(controller = %id, "Evicting staged selection");
            self.entries.remove(&id);
        }
    }
}
