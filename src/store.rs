//! Ephemeral per-entity state.
//!
//! Converters and event handlers stash values here that must survive between
//! callbacks for the same physical entity: polling task handles, the last
//! brightness before an off transition, partial multi-frame messages. Nothing
//! is persisted and nothing expires, callers clear what they put on teardown.
//!
//! The map is sharded by [`EntityKey`] so that handlers of unrelated devices
//! running on different worker threads never contend on one lock.

use crate::error::{DefinitionError, Result};
use crate::radio::Entity;
use log::warn;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use strum::{AsRefStr, EnumString};

const SHARDS: usize = 16;

/// Entity kinds the store can key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
pub enum EntityKind {
    Device,
    Endpoint,
    Group,
}

/// Identity of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Device { ieee_addr: String },
    Endpoint { ieee_addr: String, id: u8 },
    Group { id: u16 },
}

impl EntityKey {
    /// Derive the key of `entity`.
    ///
    /// Fails for any kind other than `Device`, `Endpoint` and `Group`, and for
    /// a known kind missing its identity fields. Guessing a key here could
    /// route one device's state to another.
    pub fn of(entity: &(impl Entity + ?Sized)) -> Result<Self> {
        let kind = EntityKind::from_str(entity.kind_name())
            .map_err(|_| DefinitionError::UnknownEntityKind(entity.kind_name().to_string()))?;

        let ieee = |kind: &'static str| {
            entity
                .ieee_address()
                .map(str::to_string)
                .ok_or(DefinitionError::MissingEntityIdentity {
                    kind,
                    field: "ieee address",
                })
        };

        match kind {
            EntityKind::Device => Ok(EntityKey::Device {
                ieee_addr: ieee("Device")?,
            }),
            EntityKind::Endpoint => Ok(EntityKey::Endpoint {
                ieee_addr: ieee("Endpoint")?,
                id: entity
                    .endpoint_id()
                    .ok_or(DefinitionError::MissingEntityIdentity {
                        kind: "Endpoint",
                        field: "endpoint id",
                    })?,
            }),
            EntityKind::Group => Ok(EntityKey::Group {
                id: entity
                    .group_id()
                    .ok_or(DefinitionError::MissingEntityIdentity {
                        kind: "Group",
                        field: "group id",
                    })?,
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Device { .. } => EntityKind::Device,
            EntityKey::Endpoint { .. } => EntityKind::Endpoint,
            EntityKey::Group { .. } => EntityKind::Group,
        }
    }

    fn shard(&self) -> usize {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % SHARDS
    }
}

type Bag = HashMap<String, Arc<dyn Any + Send + Sync>>;

#[derive(Default)]
struct Shard {
    values: HashMap<EntityKey, Bag>,
    queues: HashMap<EntityKey, HashMap<String, VecDeque<Value>>>,
}

/// Per-entity key/value bag, shared through [`crate::Context`].
pub struct Store {
    shards: Vec<RwLock<Shard>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(Shard::default())).collect(),
        }
    }

    fn shard(&self, key: &EntityKey) -> &RwLock<Shard> {
        &self.shards[key.shard()]
    }

    pub fn get_entity_key(&self, entity: &(impl Entity + ?Sized)) -> Result<EntityKey> {
        EntityKey::of(entity)
    }

    pub fn has_value(&self, entity: &(impl Entity + ?Sized), key: &str) -> Result<bool> {
        let entity_key = EntityKey::of(entity)?;
        let shard = self.shard(&entity_key).read();
        Ok(shard
            .values
            .get(&entity_key)
            .is_some_and(|bag| bag.contains_key(key)))
    }

    /// Stored value, or `None` when absent.
    ///
    /// A value stored under `key` with a different type counts as absent.
    pub fn get_value<T>(&self, entity: &(impl Entity + ?Sized), key: &str) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entity_key = EntityKey::of(entity)?;
        let shard = self.shard(&entity_key).read();
        let Some(value) = shard.values.get(&entity_key).and_then(|bag| bag.get(key)) else {
            return Ok(None);
        };

        match value.downcast_ref::<T>() {
            Some(value) => Ok(Some(value.clone())),
            None => {
                warn!(
                    "Store value '{}' of {:?} has a different type than {}",
                    key,
                    entity_key,
                    std::any::type_name::<T>()
                );
                Ok(None)
            }
        }
    }

    pub fn get_value_or<T>(&self, entity: &(impl Entity + ?Sized), key: &str, default: T) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Ok(self.get_value(entity, key)?.unwrap_or(default))
    }

    pub fn put_value<T>(&self, entity: &(impl Entity + ?Sized), key: &str, value: T) -> Result<()>
    where
        T: Send + Sync + 'static,
    {
        let entity_key = EntityKey::of(entity)?;
        let mut shard = self.shard(&entity_key).write();
        shard
            .values
            .entry(entity_key)
            .or_default()
            .insert(key.to_string(), Arc::new(value));
        Ok(())
    }

    /// Store `init()` under `key` unless a value is already there.
    ///
    /// The check and the insert happen under one lock, `init` runs at most
    /// once per absent key. Returns whether `init` ran.
    pub fn put_value_with<T, F>(&self, entity: &(impl Entity + ?Sized), key: &str, init: F) -> Result<bool>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let entity_key = EntityKey::of(entity)?;
        let mut shard = self.shard(&entity_key).write();
        let bag = shard.values.entry(entity_key).or_default();
        if bag.contains_key(key) {
            return Ok(false);
        }
        bag.insert(key.to_string(), Arc::new(init()));
        Ok(true)
    }

    pub fn clear_value(&self, entity: &(impl Entity + ?Sized), key: &str) -> Result<()> {
        let entity_key = EntityKey::of(entity)?;
        let mut shard = self.shard(&entity_key).write();
        if let Some(bag) = shard.values.get_mut(&entity_key) {
            bag.remove(key);
            if bag.is_empty() {
                shard.values.remove(&entity_key);
            }
        }
        Ok(())
    }

    /// Append to the queue stored under `key`.
    pub fn push_value(&self, entity: &(impl Entity + ?Sized), key: &str, value: Value) -> Result<()> {
        let entity_key = EntityKey::of(entity)?;
        let mut shard = self.shard(&entity_key).write();
        shard
            .queues
            .entry(entity_key)
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push_back(value);
        Ok(())
    }

    /// Take the oldest entry of the queue stored under `key`.
    pub fn pop_value(&self, entity: &(impl Entity + ?Sized), key: &str) -> Result<Option<Value>> {
        let entity_key = EntityKey::of(entity)?;
        let mut shard = self.shard(&entity_key).write();
        let Some(queues) = shard.queues.get_mut(&entity_key) else {
            return Ok(None);
        };
        let value = queues.get_mut(key).and_then(VecDeque::pop_front);
        if queues.get(key).is_some_and(VecDeque::is_empty) {
            queues.remove(key);
        }
        if queues.is_empty() {
            shard.queues.remove(&entity_key);
        }
        Ok(value)
    }

    /// Drop everything stored for `entity`, e.g. when the device leaves.
    pub fn clear(&self, entity: &(impl Entity + ?Sized)) -> Result<()> {
        let entity_key = EntityKey::of(entity)?;
        let mut shard = self.shard(&entity_key).write();
        shard.values.remove(&entity_key);
        shard.queues.remove(&entity_key);
        Ok(())
    }

    /// Number of entities with at least one value or queue entry.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let shard = shard.read();
                let queued_only = shard
                    .queues
                    .keys()
                    .filter(|key| !shard.values.contains_key(*key))
                    .count();
                shard.values.len() + queued_only
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
