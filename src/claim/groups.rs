use crate::claim::model::{Group, GroupId, PlayerId};
use crate::persistence::store::{ClaimStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Fully-cached group registry.
///
/// The hot-path permission check resolves group membership through this
/// registry, so it must always hold every live group: it is warmed from the
/// store at startup and written through on every group mutation. A group id
/// that resolves to nothing grants nothing.
pub struct GroupRegistry {
    by_id: RwLock<HashMap<GroupId, Arc<Group>>>,
    by_owner: RwLock<HashMap<PlayerId, HashSet<GroupId>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        GroupRegistry {
            by_id: RwLock::new(HashMap::new()),
            by_owner: RwLock::new(HashMap::new()),
        }
    }

    /// Load every group from the store. Returns the number of groups held
    /// afterwards.
    pub fn warm(&self, store: &dyn ClaimStore) -> Result<usize, StoreError> {
        let groups = store.get_groups()?;
        let mut by_id = write_lock(&self.by_id);
        let mut by_owner = write_lock(&self.by_owner);
        by_id.clear();
        by_owner.clear();
        for group in groups {
            by_owner.entry(group.owner).or_default().insert(group.id);
            by_id.insert(group.id, Arc::new(group));
        }
        Ok(by_id.len())
    }

    pub fn get(&self, id: GroupId) -> Option<Arc<Group>> {
        read_lock(&self.by_id).get(&id).cloned()
    }

    pub fn get_by_owner(&self, owner: PlayerId) -> Vec<Arc<Group>> {
        let ids: Vec<GroupId> = {
            let by_owner = read_lock(&self.by_owner);
            by_owner
                .get(&owner)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default()
        };
        let by_id = read_lock(&self.by_id);
        ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
    }

    pub fn group_count(&self, owner: PlayerId) -> usize {
        read_lock(&self.by_owner)
            .get(&owner)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    /// Hot-path membership probe.
    pub fn is_member(&self, id: GroupId, player: PlayerId) -> bool {
        read_lock(&self.by_id)
            .get(&id)
            .map(|group| group.members.contains(&player))
            .unwrap_or(false)
    }

    pub fn put(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let mut by_id = write_lock(&self.by_id);
        let mut by_owner = write_lock(&self.by_owner);
        by_owner.entry(group.owner).or_default().insert(group.id);
        by_id.insert(group.id, Arc::clone(&group));
        group
    }

    pub fn remove(&self, id: GroupId) -> Option<Arc<Group>> {
        let mut by_id = write_lock(&self.by_id);
        let removed = by_id.remove(&id)?;
        let mut by_owner = write_lock(&self.by_owner);
        if let Some(ids) = by_owner.get_mut(&removed.owner) {
            ids.remove(&id);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        read_lock(&self.by_id).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
