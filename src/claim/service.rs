use crate::claim::cache::{CacheStats, ClaimCache};
use crate::claim::groups::GroupRegistry;
use crate::claim::model::{Claim, ClaimId, Group, GroupId, PlayerId};
use crate::claim::position::{TilePosition, WorldId};
use crate::claim::regions::{WarmRegions, WarmStats};
use crate::config::LimitsConfig;
use crate::persistence::store::{ClaimStore, StoreError};
use crate::telemetry::logging;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

const WARM_REGION_CAPACITY: usize = 1024;
const MAX_NAME_LEN: usize = 32;

// Shared rule for claim and group names; anything passing this is also
// representable in the store's record format.
fn name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.contains('"')
        && !name.contains('\n')
        && !name.contains('\r')
}

#[derive(Debug, Clone)]
pub enum PlotCreateResult {
    Created(Arc<Claim>),
    EmptySelection,
    InvalidName,
    AlreadyClaimed { tile: TilePosition, owner: PlayerId },
    ChunkLimitReached { requested: usize, max: usize },
    PlotLimitReached { current: usize, max: usize },
    TotalChunkLimitReached { current: usize, max: usize },
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum ChunkRemoveResult {
    /// Some tiles were removed (possibly none of the requested ones belonged
    /// to the claim); the claim survives.
    Removed(Arc<Claim>),
    /// The last tile was removed and the claim with it.
    Deleted,
    NotClaimed,
    NotOwned { owner: PlayerId },
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum PlotDeleteResult {
    Deleted,
    NotFound,
    NotOwner,
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum PlotRenameResult {
    Renamed(Arc<Claim>),
    NotFound,
    NotOwner,
    InvalidName,
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum TrustResult {
    Trusted(Arc<Claim>),
    NotFound,
    NotOwner,
    AlreadyTrusted,
    LimitReached { max: usize },
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum UntrustResult {
    Untrusted(Arc<Claim>),
    NotFound,
    NotOwner,
    NotTrusted,
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum GroupCreateResult {
    Created(Arc<Group>),
    InvalidName,
    LimitReached { current: usize, max: usize },
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum GroupDeleteResult {
    Deleted,
    NotFound,
    NotOwner,
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum MemberAddResult {
    Added(Arc<Group>),
    GroupNotFound,
    NotOwner,
    AlreadyMember,
    LimitReached { max: usize },
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum MemberRemoveResult {
    Removed(Arc<Group>),
    GroupNotFound,
    NotOwner,
    NotMember,
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum GroupTrustResult {
    Trusted(Arc<Claim>),
    ClaimNotFound,
    GroupNotFound,
    NotClaimOwner,
    AlreadyTrusted,
    StoreFailure(StoreError),
}

#[derive(Debug, Clone)]
pub enum GroupUntrustResult {
    Untrusted(Arc<Claim>),
    ClaimNotFound,
    NotClaimOwner,
    NotTrusted,
    StoreFailure(StoreError),
}

/// Orchestrates the claim engine: validates limits and ownership, performs
/// durable writes, and updates the cache only after a write is confirmed.
///
/// All dependencies arrive through the constructor. Mutating operations
/// serialize on an internal gate (per-process single-writer), so two
/// concurrent mutations of the same claim cannot interleave; the hot-path
/// `can_build` never takes that gate and never touches the store.
pub struct ClaimsService {
    cache: Arc<ClaimCache>,
    groups: Arc<GroupRegistry>,
    store: Arc<dyn ClaimStore>,
    warm: WarmRegions,
    limits: LimitsConfig,
    write_gate: Mutex<()>,
}

impl ClaimsService {
    pub fn new(
        cache: Arc<ClaimCache>,
        groups: Arc<GroupRegistry>,
        store: Arc<dyn ClaimStore>,
        limits: LimitsConfig,
    ) -> Self {
        ClaimsService {
            cache,
            groups,
            store,
            warm: WarmRegions::new(WARM_REGION_CAPACITY),
            limits,
            write_gate: Mutex::new(()),
        }
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        match self.write_gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn store_failure(&self, op: &str, err: StoreError) -> StoreError {
        logging::log_error(&format!("{}: {}", op, err));
        err
    }

    // -- hot path ---------------------------------------------------------

    /// Build-permission check, invoked on every protected world interaction.
    /// Cache-only: unclaimed land is open; claimed land requires the owner,
    /// a trusted player, or membership in a trusted group.
    pub fn can_build(&self, actor: PlayerId, tile: &TilePosition) -> bool {
        match self.cache.get(tile) {
            None => true,
            Some(claim) => {
                claim.grants_direct(actor)
                    || claim
                        .trusted_groups
                        .iter()
                        .any(|group| self.groups.is_member(*group, actor))
            }
        }
    }

    // -- two-tier reads (gate held by caller where it matters) ------------

    /// Cache first; on miss the store is consulted and the cache warmed.
    /// A cache miss alone never proves absence.
    fn claim_at_locked(&self, tile: &TilePosition) -> Result<Option<Arc<Claim>>, StoreError> {
        if let Some(claim) = self.cache.get(tile) {
            return Ok(Some(claim));
        }
        match self.store.get_claim_at(tile)? {
            Some(claim) => Ok(Some(self.cache.put(claim))),
            None => Ok(None),
        }
    }

    fn resolve_claim_locked(&self, id: ClaimId) -> Result<Option<Arc<Claim>>, StoreError> {
        if let Some(claim) = self.cache.get_by_id(id) {
            return Ok(Some(claim));
        }
        match self.store.get_claim_by_id(id)? {
            Some(claim) => Ok(Some(self.cache.put(claim))),
            None => Ok(None),
        }
    }

    fn plots_of_locked(&self, owner: PlayerId) -> Result<Vec<Arc<Claim>>, StoreError> {
        if self.cache.owner_warmed(owner) {
            return Ok(self.cache.get_by_owner(owner));
        }
        let claims = self.store.get_claims_by_owner(owner)?;
        let mut cached = Vec::with_capacity(claims.len());
        for claim in claims {
            cached.push(self.cache.put(claim));
        }
        self.cache.mark_owner_warmed(owner);
        Ok(cached)
    }

    /// All plots owned by `owner`.
    pub fn plots_of(&self, owner: PlayerId) -> Result<Vec<Arc<Claim>>, StoreError> {
        let _gate = self.gate();
        self.plots_of_locked(owner)
            .map_err(|err| self.store_failure("plots_of", err))
    }

    /// All plots where `player` is individually trusted.
    pub fn plots_where_trusted(&self, player: PlayerId) -> Result<Vec<Arc<Claim>>, StoreError> {
        let _gate = self.gate();
        let claims = self
            .store
            .get_claims_where_trusted(player)
            .map_err(|err| self.store_failure("plots_where_trusted", err))?;
        Ok(claims.into_iter().map(|c| self.cache.put(c)).collect())
    }

    /// Preload every claim of a world into the cache, typically at world
    /// start so `can_build` protects claimed land from the first tick.
    pub fn warm_world(&self, world: &WorldId) -> Result<usize, StoreError> {
        let _gate = self.gate();
        let claims = self
            .store
            .get_claims_by_world(world)
            .map_err(|err| self.store_failure("warm_world", err))?;
        let count = claims.len();
        for claim in claims {
            self.cache.put(claim);
        }
        Ok(count)
    }

    // -- plot lifecycle ---------------------------------------------------

    pub fn create_plot(
        &self,
        owner: PlayerId,
        chunks: HashSet<TilePosition>,
        name: Option<String>,
    ) -> PlotCreateResult {
        let _gate = self.gate();
        if chunks.is_empty() {
            return PlotCreateResult::EmptySelection;
        }
        let name = match name {
            Some(raw) => {
                let trimmed = raw.trim();
                if !name_is_valid(trimmed) {
                    return PlotCreateResult::InvalidName;
                }
                Some(trimmed.to_string())
            }
            None => None,
        };
        if chunks.len() > self.limits.max_chunks_per_plot {
            return PlotCreateResult::ChunkLimitReached {
                requested: chunks.len(),
                max: self.limits.max_chunks_per_plot,
            };
        }
        for tile in &chunks {
            match self.claim_at_locked(tile) {
                Ok(None) => {}
                Ok(Some(existing)) => {
                    return PlotCreateResult::AlreadyClaimed {
                        tile: tile.clone(),
                        owner: existing.owner,
                    }
                }
                Err(err) => {
                    return PlotCreateResult::StoreFailure(
                        self.store_failure("create_plot", err),
                    )
                }
            }
        }
        let existing = match self.plots_of_locked(owner) {
            Ok(existing) => existing,
            Err(err) => {
                return PlotCreateResult::StoreFailure(self.store_failure("create_plot", err))
            }
        };
        if existing.len() >= self.limits.max_plots_per_player {
            return PlotCreateResult::PlotLimitReached {
                current: existing.len(),
                max: self.limits.max_plots_per_player,
            };
        }
        let current_chunks: usize = existing.iter().map(|claim| claim.chunks.len()).sum();
        if current_chunks + chunks.len() > self.limits.max_total_chunks_per_player {
            return PlotCreateResult::TotalChunkLimitReached {
                current: current_chunks,
                max: self.limits.max_total_chunks_per_player,
            };
        }

        let id = match self.store.allocate_claim_id() {
            Ok(id) => id,
            Err(err) => {
                return PlotCreateResult::StoreFailure(self.store_failure("create_plot", err))
            }
        };
        let tile_count = chunks.len();
        let mut claim = Claim::new(id, owner, chunks);
        claim.name = name;
        if let Err(err) = self.store.create_claim(&claim) {
            return PlotCreateResult::StoreFailure(self.store_failure("create_plot", err));
        }
        let claim = self.cache.put(claim);
        logging::log_claim(&format!(
            "claim {} created by player {} ({} tiles)",
            id, owner, tile_count
        ));
        PlotCreateResult::Created(claim)
    }

    /// Remove tiles from a plot. Requested tiles that do not belong to the
    /// plot are ignored; removing the last tile deletes the plot.
    pub fn remove_chunks_from_plot(
        &self,
        owner: PlayerId,
        id: ClaimId,
        chunks: &HashSet<TilePosition>,
    ) -> ChunkRemoveResult {
        let _gate = self.gate();
        let claim = match self.resolve_claim_locked(id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return ChunkRemoveResult::NotClaimed,
            Err(err) => {
                return ChunkRemoveResult::StoreFailure(
                    self.store_failure("remove_chunks", err),
                )
            }
        };
        if claim.owner != owner {
            return ChunkRemoveResult::NotOwned { owner: claim.owner };
        }
        let removing: HashSet<TilePosition> = chunks
            .iter()
            .filter(|tile| claim.contains(tile))
            .cloned()
            .collect();
        if removing.is_empty() {
            return ChunkRemoveResult::Removed(claim);
        }
        if removing.len() == claim.chunks.len() {
            match self.store.delete_claim(id, owner) {
                Ok(true) => {}
                Ok(false) => return ChunkRemoveResult::NotClaimed,
                Err(err) => {
                    return ChunkRemoveResult::StoreFailure(
                        self.store_failure("remove_chunks", err),
                    )
                }
            }
            self.cache.remove(id);
            logging::log_claim(&format!("claim {} emptied and deleted by player {}", id, owner));
            return ChunkRemoveResult::Deleted;
        }
        match self.store.remove_chunks_from_claim(id, &removing) {
            Ok(true) => {}
            Ok(false) => return ChunkRemoveResult::NotClaimed,
            Err(err) => {
                return ChunkRemoveResult::StoreFailure(
                    self.store_failure("remove_chunks", err),
                )
            }
        }
        let mut updated = (*claim).clone();
        updated.chunks.retain(|tile| !removing.contains(tile));
        updated.touch();
        let updated = self.cache.update(updated);
        logging::log_claim(&format!(
            "claim {}: player {} removed {} tiles, {} remain",
            id,
            owner,
            removing.len(),
            updated.chunks.len()
        ));
        ChunkRemoveResult::Removed(updated)
    }

    pub fn delete_plot(&self, owner: PlayerId, id: ClaimId) -> PlotDeleteResult {
        let _gate = self.gate();
        let claim = match self.resolve_claim_locked(id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return PlotDeleteResult::NotFound,
            Err(err) => {
                return PlotDeleteResult::StoreFailure(self.store_failure("delete_plot", err))
            }
        };
        if claim.owner != owner {
            return PlotDeleteResult::NotOwner;
        }
        match self.store.delete_claim(id, owner) {
            Ok(true) => {}
            Ok(false) => return PlotDeleteResult::NotFound,
            Err(err) => {
                return PlotDeleteResult::StoreFailure(self.store_failure("delete_plot", err))
            }
        }
        self.cache.remove(id);
        logging::log_claim(&format!("claim {} deleted by player {}", id, owner));
        PlotDeleteResult::Deleted
    }

    pub fn rename_plot(
        &self,
        owner: PlayerId,
        id: ClaimId,
        name: Option<String>,
    ) -> PlotRenameResult {
        let _gate = self.gate();
        let name = match name {
            Some(raw) => {
                let trimmed = raw.trim();
                if !name_is_valid(trimmed) {
                    return PlotRenameResult::InvalidName;
                }
                Some(trimmed.to_string())
            }
            None => None,
        };
        let claim = match self.resolve_claim_locked(id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return PlotRenameResult::NotFound,
            Err(err) => {
                return PlotRenameResult::StoreFailure(self.store_failure("rename_plot", err))
            }
        };
        if claim.owner != owner {
            return PlotRenameResult::NotOwner;
        }
        match self.store.update_claim_name(id, name.as_deref()) {
            Ok(true) => {}
            Ok(false) => return PlotRenameResult::NotFound,
            Err(err) => {
                return PlotRenameResult::StoreFailure(self.store_failure("rename_plot", err))
            }
        }
        let mut updated = (*claim).clone();
        updated.name = name;
        updated.touch();
        PlotRenameResult::Renamed(self.cache.update(updated))
    }

    // -- trust ------------------------------------------------------------

    pub fn trust_player(&self, owner: PlayerId, id: ClaimId, target: PlayerId) -> TrustResult {
        let _gate = self.gate();
        let claim = match self.resolve_claim_locked(id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return TrustResult::NotFound,
            Err(err) => {
                return TrustResult::StoreFailure(self.store_failure("trust_player", err))
            }
        };
        if claim.owner != owner {
            return TrustResult::NotOwner;
        }
        // The owner is implicitly permitted and never enters the trust set.
        if target == owner {
            return TrustResult::Trusted(claim);
        }
        if claim.trusted_players.contains(&target) {
            return TrustResult::AlreadyTrusted;
        }
        if claim.trusted_players.len() >= self.limits.max_trusted_players_per_claim {
            return TrustResult::LimitReached {
                max: self.limits.max_trusted_players_per_claim,
            };
        }
        match self.store.add_trusted_player(id, target) {
            Ok(true) => {}
            Ok(false) => return TrustResult::NotFound,
            Err(err) => {
                return TrustResult::StoreFailure(self.store_failure("trust_player", err))
            }
        }
        let mut updated = (*claim).clone();
        updated.trusted_players.insert(target);
        updated.touch();
        logging::log_claim(&format!(
            "claim {}: player {} trusted player {}",
            id, owner, target
        ));
        TrustResult::Trusted(self.cache.update(updated))
    }

    pub fn untrust_player(&self, owner: PlayerId, id: ClaimId, target: PlayerId) -> UntrustResult {
        let _gate = self.gate();
        let claim = match self.resolve_claim_locked(id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return UntrustResult::NotFound,
            Err(err) => {
                return UntrustResult::StoreFailure(self.store_failure("untrust_player", err))
            }
        };
        if claim.owner != owner {
            return UntrustResult::NotOwner;
        }
        if !claim.trusted_players.contains(&target) {
            return UntrustResult::NotTrusted;
        }
        match self.store.remove_trusted_player(id, target) {
            Ok(true) => {}
            Ok(false) => return UntrustResult::NotFound,
            Err(err) => {
                return UntrustResult::StoreFailure(self.store_failure("untrust_player", err))
            }
        }
        let mut updated = (*claim).clone();
        updated.trusted_players.remove(&target);
        updated.touch();
        logging::log_claim(&format!(
            "claim {}: player {} untrusted player {}",
            id, owner, target
        ));
        UntrustResult::Untrusted(self.cache.update(updated))
    }

    // -- groups -----------------------------------------------------------

    pub fn create_group(&self, owner: PlayerId, name: &str) -> GroupCreateResult {
        let _gate = self.gate();
        let name = name.trim();
        if !name_is_valid(name) {
            return GroupCreateResult::InvalidName;
        }
        let current = self.groups.group_count(owner);
        if current >= self.limits.max_groups_per_player {
            return GroupCreateResult::LimitReached {
                current,
                max: self.limits.max_groups_per_player,
            };
        }
        let id = match self.store.allocate_group_id() {
            Ok(id) => id,
            Err(err) => {
                return GroupCreateResult::StoreFailure(self.store_failure("create_group", err))
            }
        };
        let group = Group::new(id, owner, name.to_string());
        if let Err(err) = self.store.create_group(&group) {
            return GroupCreateResult::StoreFailure(self.store_failure("create_group", err));
        }
        let group = self.groups.put(group);
        logging::log_claim(&format!(
            "group {} '{}' created by player {}",
            id, group.name, owner
        ));
        GroupCreateResult::Created(group)
    }

    /// Deletes a group and eagerly detaches it from every claim trusting it.
    pub fn delete_group(&self, owner: PlayerId, id: GroupId) -> GroupDeleteResult {
        let _gate = self.gate();
        let group = match self.groups.get(id) {
            Some(group) => group,
            None => return GroupDeleteResult::NotFound,
        };
        if group.owner != owner {
            return GroupDeleteResult::NotOwner;
        }
        let trusting = match self.store.get_claims_trusting_group(id) {
            Ok(trusting) => trusting,
            Err(err) => {
                return GroupDeleteResult::StoreFailure(self.store_failure("delete_group", err))
            }
        };
        for claim in trusting {
            if let Err(err) = self.store.untrust_group(claim.id, id) {
                return GroupDeleteResult::StoreFailure(self.store_failure("delete_group", err));
            }
            if let Some(cached) = self.cache.get_by_id(claim.id) {
                let mut updated = (*cached).clone();
                updated.trusted_groups.remove(&id);
                updated.touch();
                self.cache.update(updated);
            }
        }
        match self.store.delete_group(id, owner) {
            Ok(true) => {}
            Ok(false) => return GroupDeleteResult::NotFound,
            Err(err) => {
                return GroupDeleteResult::StoreFailure(self.store_failure("delete_group", err))
            }
        }
        self.groups.remove(id);
        logging::log_claim(&format!("group {} deleted by player {}", id, owner));
        GroupDeleteResult::Deleted
    }

    pub fn add_member(&self, owner: PlayerId, id: GroupId, player: PlayerId) -> MemberAddResult {
        let _gate = self.gate();
        let group = match self.groups.get(id) {
            Some(group) => group,
            None => return MemberAddResult::GroupNotFound,
        };
        if group.owner != owner {
            return MemberAddResult::NotOwner;
        }
        if group.members.contains(&player) {
            return MemberAddResult::AlreadyMember;
        }
        if group.members.len() >= self.limits.max_members_per_group {
            return MemberAddResult::LimitReached {
                max: self.limits.max_members_per_group,
            };
        }
        match self.store.add_group_member(id, player) {
            Ok(true) => {}
            Ok(false) => return MemberAddResult::GroupNotFound,
            Err(err) => {
                return MemberAddResult::StoreFailure(self.store_failure("add_member", err))
            }
        }
        let mut updated = (*group).clone();
        updated.members.insert(player);
        updated.touch();
        logging::log_claim(&format!(
            "group {}: player {} added member {}",
            id, owner, player
        ));
        MemberAddResult::Added(self.groups.put(updated))
    }

    pub fn remove_member(
        &self,
        owner: PlayerId,
        id: GroupId,
        player: PlayerId,
    ) -> MemberRemoveResult {
        let _gate = self.gate();
        let group = match self.groups.get(id) {
            Some(group) => group,
            None => return MemberRemoveResult::GroupNotFound,
        };
        if group.owner != owner {
            return MemberRemoveResult::NotOwner;
        }
        if !group.members.contains(&player) {
            return MemberRemoveResult::NotMember;
        }
        match self.store.remove_group_member(id, player) {
            Ok(true) => {}
            Ok(false) => return MemberRemoveResult::GroupNotFound,
            Err(err) => {
                return MemberRemoveResult::StoreFailure(self.store_failure("remove_member", err))
            }
        }
        let mut updated = (*group).clone();
        updated.members.remove(&player);
        updated.touch();
        logging::log_claim(&format!(
            "group {}: player {} removed member {}",
            id, owner, player
        ));
        MemberRemoveResult::Removed(self.groups.put(updated))
    }

    pub fn trust_group_to_claim(
        &self,
        owner: PlayerId,
        claim_id: ClaimId,
        group_id: GroupId,
    ) -> GroupTrustResult {
        let _gate = self.gate();
        let claim = match self.resolve_claim_locked(claim_id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return GroupTrustResult::ClaimNotFound,
            Err(err) => {
                return GroupTrustResult::StoreFailure(self.store_failure("trust_group", err))
            }
        };
        if self.groups.get(group_id).is_none() {
            return GroupTrustResult::GroupNotFound;
        }
        if claim.owner != owner {
            return GroupTrustResult::NotClaimOwner;
        }
        if claim.trusted_groups.contains(&group_id) {
            return GroupTrustResult::AlreadyTrusted;
        }
        match self.store.trust_group(claim_id, group_id) {
            Ok(true) => {}
            Ok(false) => return GroupTrustResult::ClaimNotFound,
            Err(err) => {
                return GroupTrustResult::StoreFailure(self.store_failure("trust_group", err))
            }
        }
        let mut updated = (*claim).clone();
        updated.trusted_groups.insert(group_id);
        updated.touch();
        logging::log_claim(&format!(
            "claim {}: player {} trusted group {}",
            claim_id, owner, group_id
        ));
        GroupTrustResult::Trusted(self.cache.update(updated))
    }

    pub fn untrust_group_from_claim(
        &self,
        owner: PlayerId,
        claim_id: ClaimId,
        group_id: GroupId,
    ) -> GroupUntrustResult {
        let _gate = self.gate();
        let claim = match self.resolve_claim_locked(claim_id) {
            Ok(Some(claim)) => claim,
            Ok(None) => return GroupUntrustResult::ClaimNotFound,
            Err(err) => {
                return GroupUntrustResult::StoreFailure(self.store_failure("untrust_group", err))
            }
        };
        if claim.owner != owner {
            return GroupUntrustResult::NotClaimOwner;
        }
        if !claim.trusted_groups.contains(&group_id) {
            return GroupUntrustResult::NotTrusted;
        }
        match self.store.untrust_group(claim_id, group_id) {
            Ok(true) => {}
            Ok(false) => return GroupUntrustResult::ClaimNotFound,
            Err(err) => {
                return GroupUntrustResult::StoreFailure(self.store_failure("untrust_group", err))
            }
        }
        let mut updated = (*claim).clone();
        updated.trusted_groups.remove(&group_id);
        updated.touch();
        logging::log_claim(&format!(
            "claim {}: player {} untrusted group {}",
            claim_id, owner, group_id
        ));
        GroupUntrustResult::Untrusted(self.cache.update(updated))
    }

    // -- spatial query ----------------------------------------------------

    /// All claimed tiles in the square window `[center-radius, center+radius)`
    /// on both axes. Keys are absolute world tile coordinates, not offsets
    /// into the window; callers rendering a map must subtract the window
    /// origin themselves. Tiles of one plot share a single `Arc<Claim>`.
    pub fn claims_in_area(
        &self,
        world: &WorldId,
        center_x: i32,
        center_z: i32,
        radius: i32,
    ) -> Result<HashMap<(i32, i32), Arc<Claim>>, StoreError> {
        let mut grid = HashMap::new();
        if radius <= 0 {
            return Ok(grid);
        }
        let (min_x, max_x) = (center_x - radius, center_x + radius - 1);
        let (min_z, max_z) = (center_z - radius, center_z + radius - 1);
        let regions = WarmRegions::regions_for_window(world, min_x, max_x, min_z, max_z);

        if !self.warm.covers(&regions) {
            // Gate the fetch so a concurrent mutation cannot be clobbered by
            // a stale store read being warmed into the cache.
            let _gate = self.gate();
            let claims = self
                .store
                .get_claims_in_area(world, min_x, max_x, min_z, max_z)
                .map_err(|err| self.store_failure("claims_in_area", err))?;
            for claim in claims {
                self.cache.put(claim);
            }
            self.warm.mark(regions);
        }

        for x in min_x..=max_x {
            for z in min_z..=max_z {
                let tile = TilePosition::new(world.clone(), x, z);
                if let Some(claim) = self.cache.get(&tile) {
                    grid.insert((x, z), claim);
                }
            }
        }
        Ok(grid)
    }

    // -- introspection ----------------------------------------------------

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn warm_stats(&self) -> WarmStats {
        self.warm.stats()
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }
}
