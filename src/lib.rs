pub mod claim;
pub mod config;
pub mod persistence;
pub mod telemetry;

pub use claim::cache::{CacheStats, ClaimCache};
pub use claim::groups::GroupRegistry;
pub use claim::model::{Claim, ClaimId, Group, GroupId, PlayerId};
pub use claim::position::{TilePosition, WorldId};
pub use claim::regions::{RegionCoord, WarmStats, REGION_SIZE};
pub use claim::service::{
    ChunkRemoveResult, ClaimsService, GroupCreateResult, GroupDeleteResult, GroupTrustResult,
    GroupUntrustResult, MemberAddResult, MemberRemoveResult, PlotCreateResult, PlotDeleteResult,
    PlotRenameResult, TrustResult, UntrustResult,
};
pub use config::LimitsConfig;
pub use persistence::file_store::FileClaimStore;
pub use persistence::store::{ClaimStore, StoreError, StoreValidationReport};

/// Wire the engine together from a data directory: open the file store,
/// warm the group registry, and hand back a ready service. Claims are
/// warmed per world via [`ClaimsService::warm_world`] as worlds come up.
pub fn bootstrap(
    root: &std::path::Path,
    limits: LimitsConfig,
) -> Result<ClaimsService, StoreError> {
    let store = std::sync::Arc::new(FileClaimStore::open(root)?);
    let cache = std::sync::Arc::new(ClaimCache::new());
    let groups = std::sync::Arc::new(GroupRegistry::new());
    groups.warm(store.as_ref())?;
    Ok(ClaimsService::new(
        cache,
        groups,
        store as std::sync::Arc<dyn ClaimStore>,
        limits,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn bootstrap_survives_restart() {
        let root = std::env::temp_dir().join(format!("plotguard-boot-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        let world = WorldId::new("main");

        {
            let service = bootstrap(&root, LimitsConfig::default()).unwrap();
            let tiles: HashSet<TilePosition> =
                [TilePosition::new(world.clone(), 4, 4)].into_iter().collect();
            assert!(matches!(
                service.create_plot(PlayerId(1), tiles, None),
                PlotCreateResult::Created(_)
            ));
            assert!(matches!(
                service.create_group(PlayerId(1), "crew"),
                GroupCreateResult::Created(_)
            ));
        }

        let service = bootstrap(&root, LimitsConfig::default()).unwrap();
        assert_eq!(service.warm_world(&world).unwrap(), 1);
        assert!(!service.can_build(PlayerId(2), &TilePosition::new(world, 4, 4)));
    }
}
