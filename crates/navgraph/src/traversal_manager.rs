//! Pools of reusable traversals shared by many requesters
//!
//! Each pool holds a fixed number of traversals built from one configuration.
//! A requester that obtains a traversal keeps it as long as it asks for it
//! again at least once every `reclaim_after_frames` frames. Otherwise
//! [`TraversalManager::begin_frame`] stops the traversal and frees it.

use navgraph_common::{Error, Result};

use super::time_budget::TaskId;
use super::traversal::{GraphTraversal, Requester};

/// Configuration of the manager
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TraversalManagerConfig {
    /// Frames without a request after which an owned traversal is reclaimed
    pub reclaim_after_frames: u32,
}

impl Default for TraversalManagerConfig {
    fn default() -> Self {
        Self {
            reclaim_after_frames: 5,
        }
    }
}

impl TraversalManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reclaim_after_frames == 0 {
            return Err(Error::Config("reclaim_after_frames must be positive".to_string()));
        }
        Ok(())
    }
}

/// Configuration of one pool
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TraversalPoolConfig {
    pub name: String,
    pub instance_count: usize,
    /// Task every instance of the pool is time-sliced under
    pub task: Option<TaskId>,
}

impl TraversalPoolConfig {
    pub fn new(name: impl Into<String>, instance_count: usize) -> Self {
        Self {
            name: name.into(),
            instance_count,
            task: None,
        }
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("pool name must not be empty".to_string()));
        }
        if self.instance_count == 0 {
            return Err(Error::Config(format!(
                "pool '{}' must hold at least one traversal",
                self.name
            )));
        }
        Ok(())
    }
}

/// Identifier of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraversalConfigId(u32);

/// A traversal checked out of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraversalHandle {
    config: TraversalConfigId,
    slot: u32,
}

impl TraversalHandle {
    pub fn config_id(&self) -> TraversalConfigId {
        self.config
    }
}

struct TraversalPool {
    config: TraversalPoolConfig,
    instances: Vec<Box<dyn GraphTraversal>>,
}

/// Owner of all traversal pools
pub struct TraversalManager {
    config: TraversalManagerConfig,
    pools: Vec<TraversalPool>,
    frame: u64,
}

impl std::fmt::Debug for TraversalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalManager")
            .field("config", &self.config)
            .field("pools", &self.pools.iter().map(|p| &p.config.name).collect::<Vec<_>>())
            .field("frame", &self.frame)
            .finish()
    }
}

impl TraversalManager {
    pub fn new(config: TraversalManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pools: Vec::new(),
            frame: 0,
        })
    }

    pub fn config(&self) -> &TraversalManagerConfig {
        &self.config
    }

    /// Current frame number
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Creates a pool of `config.instance_count` traversals built by `factory`
    pub fn create_pool<F>(&mut self, config: TraversalPoolConfig, factory: F) -> Result<TraversalConfigId>
    where
        F: Fn() -> Result<Box<dyn GraphTraversal>>,
    {
        config.validate()?;
        if self.config_id(&config.name).is_some() {
            return Err(Error::Config(format!("pool '{}' already exists", config.name)));
        }

        let mut instances = Vec::with_capacity(config.instance_count);
        for _ in 0..config.instance_count {
            let mut traversal = factory()?;
            traversal.core_mut().set_task(config.task);
            instances.push(traversal);
        }

        log::info!(
            "Created traversal pool '{}' with {} instances",
            config.name,
            config.instance_count
        );

        self.pools.push(TraversalPool { config, instances });
        Ok(TraversalConfigId((self.pools.len() - 1) as u32))
    }

    /// Looks a pool up by name
    pub fn config_id(&self, name: &str) -> Option<TraversalConfigId> {
        self.pools
            .iter()
            .position(|p| p.config.name == name)
            .map(|i| TraversalConfigId(i as u32))
    }

    pub fn pool_config(&self, id: TraversalConfigId) -> Option<&TraversalPoolConfig> {
        self.pools.get(id.0 as usize).map(|p| &p.config)
    }

    /// Traversal owned by `requester`, or a free one it now owns
    ///
    /// Returns `None` when every traversal of the pool is owned by someone else.
    pub fn get_traversal(
        &mut self,
        id: TraversalConfigId,
        requester: Requester,
    ) -> Option<TraversalHandle> {
        let pool = self.pools.get_mut(id.0 as usize)?;

        if let Some(slot) = pool
            .instances
            .iter()
            .position(|t| t.core().current_user() == Some(requester))
        {
            pool.instances[slot].core_mut().record_computation();
            return Some(TraversalHandle {
                config: id,
                slot: slot as u32,
            });
        }

        let slot = pool
            .instances
            .iter()
            .position(|t| t.core().current_user().is_none())?;
        let traversal = &mut pool.instances[slot];
        traversal.stop();
        traversal.core_mut().set_current_user(Some(requester));
        log::debug!(
            "Traversal {} of pool '{}' assigned to {:?}",
            slot,
            pool.config.name,
            requester
        );
        Some(TraversalHandle {
            config: id,
            slot: slot as u32,
        })
    }

    /// Current owner of a handle's traversal
    pub fn owner(&self, handle: TraversalHandle) -> Option<Requester> {
        self.pools
            .get(handle.config.0 as usize)?
            .instances
            .get(handle.slot as usize)?
            .core()
            .current_user()
    }

    /// Traversal behind a handle, if `requester` still owns it
    pub fn traversal_mut(
        &mut self,
        handle: TraversalHandle,
        requester: Requester,
    ) -> Option<&mut dyn GraphTraversal> {
        let traversal = self
            .pools
            .get_mut(handle.config.0 as usize)?
            .instances
            .get_mut(handle.slot as usize)?;
        if traversal.core().current_user() != Some(requester) {
            return None;
        }
        traversal.core_mut().record_computation();
        Some(traversal.as_mut())
    }

    /// Like [`traversal_mut`](Self::traversal_mut), downcast to its concrete type
    pub fn traversal_as<T: GraphTraversal>(
        &mut self,
        handle: TraversalHandle,
        requester: Requester,
    ) -> Option<&mut T> {
        self.traversal_mut(handle, requester)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Stops a traversal and returns it to its pool
    pub fn release_traversal(&mut self, handle: TraversalHandle, requester: Requester) -> bool {
        let Some(traversal) = self
            .pools
            .get_mut(handle.config.0 as usize)
            .and_then(|p| p.instances.get_mut(handle.slot as usize))
        else {
            return false;
        };
        if traversal.core().current_user() != Some(requester) {
            return false;
        }
        traversal.stop();
        traversal.core_mut().set_current_user(None);
        true
    }

    /// Advances the frame and reclaims traversals their owners stopped asking for
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        let limit = self.config.reclaim_after_frames;

        for pool in &mut self.pools {
            for (slot, traversal) in pool.instances.iter_mut().enumerate() {
                let Some(user) = traversal.core().current_user() else {
                    continue;
                };
                if traversal.core_mut().age() >= limit {
                    log::debug!(
                        "Reclaiming traversal {} of pool '{}' from {:?}",
                        slot,
                        pool.config.name,
                        user
                    );
                    traversal.stop();
                    traversal.core_mut().set_current_user(None);
                }
            }
        }
    }

    /// Number of unowned traversals in a pool
    pub fn free_count(&self, id: TraversalConfigId) -> usize {
        self.pools
            .get(id.0 as usize)
            .map(|p| {
                p.instances
                    .iter()
                    .filter(|t| t.core().current_user().is_none())
                    .count()
            })
            .unwrap_or(0)
    }
}
