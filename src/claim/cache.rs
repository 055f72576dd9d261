use crate::claim::model::{Claim, ClaimId, PlayerId};
use crate::claim::position::TilePosition;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64)
        }
    }
}

/// In-memory claim index: tile -> claim, id -> claim, owner -> claims.
///
/// This is the single source of truth for the hot-path permission check, so
/// reads never touch durable storage and never block behind administrative
/// writes for long: the three indices sit behind their own `RwLock`s and
/// writers hold them only for the map operation itself. Every entry mirrors
/// a durably committed claim; the service inserts strictly after the store
/// write is confirmed. Entries are never evicted.
///
/// Lock order for writers is by_id, by_tile, by_owner. A reader that
/// interleaves with a writer can observe one index a step ahead of another;
/// `get` treats a tile pointing at a missing id as a miss, which is the
/// correct answer for a claim mid-removal.
pub struct ClaimCache {
    by_id: RwLock<HashMap<ClaimId, Arc<Claim>>>,
    by_tile: RwLock<HashMap<TilePosition, ClaimId>>,
    by_owner: RwLock<HashMap<PlayerId, HashSet<ClaimId>>>,
    // owners whose full claim set has been loaded from the store; for them
    // an empty owner entry really means "no claims"
    warmed_owners: RwLock<HashSet<PlayerId>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClaimCache {
    pub fn new() -> Self {
        ClaimCache {
            by_id: RwLock::new(HashMap::new()),
            by_tile: RwLock::new(HashMap::new()),
            by_owner: RwLock::new(HashMap::new()),
            warmed_owners: RwLock::new(HashSet::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, tile: &TilePosition) -> Option<Arc<Claim>> {
        let id = {
            let by_tile = read_lock(&self.by_tile);
            by_tile.get(tile).copied()
        };
        let claim = match id {
            Some(id) => {
                let by_id = read_lock(&self.by_id);
                by_id.get(&id).cloned()
            }
            None => None,
        };
        match &claim {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        claim
    }

    pub fn get_by_id(&self, id: ClaimId) -> Option<Arc<Claim>> {
        let by_id = read_lock(&self.by_id);
        by_id.get(&id).cloned()
    }

    pub fn get_by_owner(&self, owner: PlayerId) -> Vec<Arc<Claim>> {
        let ids: Vec<ClaimId> = {
            let by_owner = read_lock(&self.by_owner);
            by_owner
                .get(&owner)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default()
        };
        let by_id = read_lock(&self.by_id);
        ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
    }

    /// Insert or replace a claim and re-index all of its tiles.
    pub fn put(&self, claim: Claim) -> Arc<Claim> {
        let claim = Arc::new(claim);
        let previous = {
            let mut by_id = write_lock(&self.by_id);
            by_id.insert(claim.id, Arc::clone(&claim))
        };
        {
            let mut by_tile = write_lock(&self.by_tile);
            if let Some(previous) = &previous {
                for tile in &previous.chunks {
                    if !claim.chunks.contains(tile) {
                        by_tile.remove(tile);
                    }
                }
            }
            for tile in &claim.chunks {
                by_tile.insert(tile.clone(), claim.id);
            }
        }
        {
            let mut by_owner = write_lock(&self.by_owner);
            if let Some(previous) = &previous {
                if previous.owner != claim.owner {
                    if let Some(ids) = by_owner.get_mut(&previous.owner) {
                        ids.remove(&claim.id);
                    }
                }
            }
            by_owner.entry(claim.owner).or_default().insert(claim.id);
        }
        claim
    }

    /// Replace-by-id; identical to `put` in this index, kept as a separate
    /// name so call sites state their intent.
    pub fn update(&self, claim: Claim) -> Arc<Claim> {
        self.put(claim)
    }

    pub fn remove(&self, id: ClaimId) -> Option<Arc<Claim>> {
        let removed = {
            let mut by_id = write_lock(&self.by_id);
            by_id.remove(&id)
        }?;
        {
            let mut by_tile = write_lock(&self.by_tile);
            for tile in &removed.chunks {
                by_tile.remove(tile);
            }
        }
        {
            let mut by_owner = write_lock(&self.by_owner);
            if let Some(ids) = by_owner.get_mut(&removed.owner) {
                ids.remove(&id);
            }
        }
        Some(removed)
    }

    pub fn plot_count(&self, owner: PlayerId) -> usize {
        let by_owner = read_lock(&self.by_owner);
        by_owner.get(&owner).map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn chunk_count(&self, owner: PlayerId) -> usize {
        self.get_by_owner(owner)
            .iter()
            .map(|claim| claim.chunks.len())
            .sum()
    }

    pub fn owner_warmed(&self, owner: PlayerId) -> bool {
        read_lock(&self.warmed_owners).contains(&owner)
    }

    pub fn mark_owner_warmed(&self, owner: PlayerId) {
        write_lock(&self.warmed_owners).insert(owner);
    }

    pub fn len(&self) -> usize {
        read_lock(&self.by_id).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        write_lock(&self.by_id).clear();
        write_lock(&self.by_tile).clear();
        write_lock(&self.by_owner).clear();
        write_lock(&self.warmed_owners).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ClaimCache {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock only means some writer panicked mid-operation; the maps
// themselves are still usable, so both sides recover the guard.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::position::WorldId;

    fn tile(x: i32, z: i32) -> TilePosition {
        TilePosition::new(WorldId::new("main"), x, z)
    }

    fn claim(id: u64, owner: u32, tiles: &[(i32, i32)]) -> Claim {
        let chunks = tiles.iter().map(|&(x, z)| tile(x, z)).collect();
        Claim::new(ClaimId(id), PlayerId(owner), chunks)
    }

    #[test]
    fn tile_lookup_hits_and_misses() {
        let cache = ClaimCache::new();
        cache.put(claim(1, 42, &[(2, 3), (2, 4)]));

        assert!(cache.get(&tile(2, 3)).is_some());
        assert!(cache.get(&tile(2, 4)).is_some());
        assert!(cache.get(&tile(9, 9)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn shared_reference_across_tiles() {
        let cache = ClaimCache::new();
        cache.put(claim(1, 42, &[(0, 0), (0, 1)]));

        let a = cache.get(&tile(0, 0)).unwrap();
        let b = cache.get(&tile(0, 1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn update_reindexes_removed_tiles() {
        let cache = ClaimCache::new();
        cache.put(claim(1, 42, &[(0, 0), (0, 1)]));
        cache.update(claim(1, 42, &[(0, 1)]));

        assert!(cache.get(&tile(0, 0)).is_none());
        assert!(cache.get(&tile(0, 1)).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_clears_every_index() {
        let cache = ClaimCache::new();
        cache.put(claim(1, 42, &[(0, 0), (0, 1)]));

        let removed = cache.remove(ClaimId(1)).expect("removed");
        assert_eq!(removed.id, ClaimId(1));
        assert!(cache.get(&tile(0, 0)).is_none());
        assert!(cache.get_by_id(ClaimId(1)).is_none());
        assert_eq!(cache.plot_count(PlayerId(42)), 0);
        assert!(cache.remove(ClaimId(1)).is_none());
    }

    #[test]
    fn owner_counts() {
        let cache = ClaimCache::new();
        cache.put(claim(1, 42, &[(0, 0), (0, 1)]));
        cache.put(claim(2, 42, &[(5, 5)]));
        cache.put(claim(3, 43, &[(9, 9)]));

        assert_eq!(cache.plot_count(PlayerId(42)), 2);
        assert_eq!(cache.chunk_count(PlayerId(42)), 3);
        assert_eq!(cache.plot_count(PlayerId(44)), 0);
        assert_eq!(cache.get_by_owner(PlayerId(42)).len(), 2);
    }

    #[test]
    fn warmed_owner_flag() {
        let cache = ClaimCache::new();
        assert!(!cache.owner_warmed(PlayerId(42)));
        cache.mark_owner_warmed(PlayerId(42));
        assert!(cache.owner_warmed(PlayerId(42)));
        cache.clear();
        assert!(!cache.owner_warmed(PlayerId(42)));
    }

    #[test]
    fn concurrent_reads_during_writes() {
        let cache = Arc::new(ClaimCache::new());
        cache.put(claim(1, 42, &[(0, 0)]));

        let reader = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let _ = cache.get(&tile(0, 0));
                }
            })
        };
        for i in 2..50 {
            cache.put(claim(i, 43, &[(i as i32, 0)]));
        }
        reader.join().unwrap();
        assert_eq!(cache.len(), 49);
    }
}
