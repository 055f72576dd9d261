use crate::claim::position::WorldId;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A 32x32-tile square of one world, the granularity at which area queries
/// are warmed from the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionCoord {
    pub world: WorldId,
    pub x: i32,
    pub z: i32,
}

pub const REGION_SIZE: i32 = 32;

impl RegionCoord {
    pub fn containing(world: &WorldId, tile_x: i32, tile_z: i32) -> Self {
        RegionCoord {
            world: world.clone(),
            x: tile_x.div_euclid(REGION_SIZE),
            z: tile_z.div_euclid(REGION_SIZE),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WarmStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Tracks which regions have already been fetched from the durable store.
///
/// This process is the store's only writer and every local mutation is
/// written through to the claim cache, so once a region has been warmed the
/// cache answers area queries over it without another store round trip.
/// Bounded LRU: evicting an entry only costs a refetch, never correctness.
pub struct WarmRegions {
    inner: Mutex<WarmInner>,
}

struct WarmInner {
    regions: LruCache<RegionCoord, ()>,
    stats: WarmStats,
}

impl WarmRegions {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        WarmRegions {
            inner: Mutex::new(WarmInner {
                regions: LruCache::new(capacity),
                stats: WarmStats::default(),
            }),
        }
    }

    /// All regions covering the inclusive tile window.
    pub fn regions_for_window(
        world: &WorldId,
        min_x: i32,
        max_x: i32,
        min_z: i32,
        max_z: i32,
    ) -> Vec<RegionCoord> {
        let mut regions = Vec::new();
        let mut rx = min_x.div_euclid(REGION_SIZE);
        while rx <= max_x.div_euclid(REGION_SIZE) {
            let mut rz = min_z.div_euclid(REGION_SIZE);
            while rz <= max_z.div_euclid(REGION_SIZE) {
                regions.push(RegionCoord {
                    world: world.clone(),
                    x: rx,
                    z: rz,
                });
                rz += 1;
            }
            rx += 1;
        }
        regions
    }

    /// True when every region is warm; touches entries so hot windows stay
    /// resident.
    pub fn covers(&self, regions: &[RegionCoord]) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut covered = true;
        for region in regions {
            if inner.regions.get(region).is_none() {
                covered = false;
            }
        }
        if covered {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        covered
    }

    pub fn mark(&self, regions: Vec<RegionCoord>) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        for region in regions {
            if inner.regions.put(region, ()).is_none() && inner.regions.len() == inner.regions.cap().get()
            {
                // cannot tell a replace from an eviction through put alone;
                // count it once the cache runs at capacity
                inner.stats.evictions += 1;
            }
        }
    }

    pub fn stats(&self) -> WarmStats {
        match self.inner.lock() {
            Ok(inner) => inner.stats.clone(),
            Err(poisoned) => poisoned.into_inner().stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> WorldId {
        WorldId::new("main")
    }

    #[test]
    fn window_region_coverage() {
        let regions = WarmRegions::regions_for_window(&world(), 0, 31, 0, 31);
        assert_eq!(regions.len(), 1);

        let regions = WarmRegions::regions_for_window(&world(), 30, 40, 0, 10);
        assert_eq!(regions.len(), 2);

        // negative coordinates land in their own regions
        let regions = WarmRegions::regions_for_window(&world(), -5, 5, 0, 0);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn cold_then_warm() {
        let warm = WarmRegions::new(16);
        let regions = WarmRegions::regions_for_window(&world(), 0, 40, 0, 40);

        assert!(!warm.covers(&regions));
        warm.mark(regions.clone());
        assert!(warm.covers(&regions));

        let stats = warm.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn eviction_forces_refetch() {
        let warm = WarmRegions::new(2);
        let a = vec![RegionCoord::containing(&world(), 0, 0)];
        let b = vec![RegionCoord::containing(&world(), 100, 0)];
        let c = vec![RegionCoord::containing(&world(), 200, 0)];

        warm.mark(a.clone());
        warm.mark(b);
        warm.mark(c);
        assert!(!warm.covers(&a));
    }

    #[test]
    fn worlds_are_distinct() {
        let warm = WarmRegions::new(16);
        let main = vec![RegionCoord::containing(&WorldId::new("main"), 0, 0)];
        let nether = vec![RegionCoord::containing(&WorldId::new("nether"), 0, 0)];

        warm.mark(main.clone());
        assert!(warm.covers(&main));
        assert!(!warm.covers(&nether));
    }
}
