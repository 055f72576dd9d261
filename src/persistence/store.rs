use crate::claim::model::{Claim, ClaimId, Group, GroupId, PlayerId};
use crate::claim::position::{TilePosition, WorldId};
use std::collections::HashSet;
use std::path::PathBuf;

/// Errors surfaced by the durable store. Everything here is an I/O-level
/// fault; ownership and limit violations never reach this type.
#[derive(Debug, Clone)]
pub enum StoreError {
    ReadError(PathBuf, String),
    WriteError(PathBuf, String),
    ParseError(String),
    Corrupt(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ReadError(path, msg) => {
                write!(f, "failed to read {}: {}", path.display(), msg)
            }
            StoreError::WriteError(path, msg) => {
                write!(f, "failed to write {}: {}", path.display(), msg)
            }
            StoreError::ParseError(msg) => write!(f, "parse error: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "corrupt store: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Report produced by a startup scan of the durable store: every record is
/// parsed and cross-checked before the server starts trusting the data.
#[derive(Debug, Default)]
pub struct StoreValidationReport {
    pub claims: usize,
    pub groups: usize,
    pub errors: Vec<String>,
}

impl StoreValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The persistence boundary of the claims engine.
///
/// The cache is warmed from this store and written through to it; the store
/// is the source of truth across restarts. Methods block, so callers must
/// stay off the real-time simulation path; the hot-path permission check
/// never touches this trait.
///
/// Mutating methods that target an existing record return `Ok(true)` when
/// the record existed and was written, `Ok(false)` when it did not exist.
pub trait ClaimStore: Send + Sync {
    // -- claim reads --
    fn get_claim_at(&self, tile: &TilePosition) -> Result<Option<Claim>, StoreError>;
    fn get_claim_by_id(&self, id: ClaimId) -> Result<Option<Claim>, StoreError>;
    fn get_claims_by_owner(&self, owner: PlayerId) -> Result<Vec<Claim>, StoreError>;
    fn get_claims_where_trusted(&self, player: PlayerId) -> Result<Vec<Claim>, StoreError>;
    fn get_claims_trusting_group(&self, group: GroupId) -> Result<Vec<Claim>, StoreError>;
    fn get_claims_by_world(&self, world: &WorldId) -> Result<Vec<Claim>, StoreError>;
    fn get_claims_in_area(
        &self,
        world: &WorldId,
        min_x: i32,
        max_x: i32,
        min_z: i32,
        max_z: i32,
    ) -> Result<Vec<Claim>, StoreError>;
    fn get_plot_count(&self, owner: PlayerId) -> Result<usize, StoreError>;
    fn get_total_chunk_count(&self, owner: PlayerId) -> Result<usize, StoreError>;

    // -- claim writes --
    fn allocate_claim_id(&self) -> Result<ClaimId, StoreError>;
    fn create_claim(&self, claim: &Claim) -> Result<(), StoreError>;
    fn delete_claim(&self, id: ClaimId, owner: PlayerId) -> Result<bool, StoreError>;
    fn remove_chunks_from_claim(
        &self,
        id: ClaimId,
        tiles: &HashSet<TilePosition>,
    ) -> Result<bool, StoreError>;
    fn update_claim_name(&self, id: ClaimId, name: Option<&str>) -> Result<bool, StoreError>;
    fn add_trusted_player(&self, id: ClaimId, player: PlayerId) -> Result<bool, StoreError>;
    fn remove_trusted_player(&self, id: ClaimId, player: PlayerId) -> Result<bool, StoreError>;
    fn trust_group(&self, claim: ClaimId, group: GroupId) -> Result<bool, StoreError>;
    fn untrust_group(&self, claim: ClaimId, group: GroupId) -> Result<bool, StoreError>;

    // -- group reads --
    fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError>;
    fn get_groups(&self) -> Result<Vec<Group>, StoreError>;
    fn get_groups_by_owner(&self, owner: PlayerId) -> Result<Vec<Group>, StoreError>;

    // -- group writes --
    fn allocate_group_id(&self) -> Result<GroupId, StoreError>;
    fn create_group(&self, group: &Group) -> Result<(), StoreError>;
    fn delete_group(&self, id: GroupId, owner: PlayerId) -> Result<bool, StoreError>;
    fn add_group_member(&self, id: GroupId, player: PlayerId) -> Result<bool, StoreError>;
    fn remove_group_member(&self, id: GroupId, player: PlayerId) -> Result<bool, StoreError>;

    // -- maintenance --
    fn validate(&self) -> StoreValidationReport;
}
