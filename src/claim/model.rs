use crate::claim::position::TilePosition;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A player-owned plot: a non-empty set of tiles plus the trust grants
/// scoped to it. A claim whose tile set empties is deleted, never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub id: ClaimId,
    pub owner: PlayerId,
    pub chunks: HashSet<TilePosition>,
    pub name: Option<String>,
    pub trusted_players: HashSet<PlayerId>,
    pub trusted_groups: HashSet<GroupId>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Claim {
    pub fn new(id: ClaimId, owner: PlayerId, chunks: HashSet<TilePosition>) -> Self {
        let now = unix_timestamp();
        Claim {
            id,
            owner,
            chunks,
            name: None,
            trusted_players: HashSet::new(),
            trusted_groups: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn contains(&self, tile: &TilePosition) -> bool {
        self.chunks.contains(tile)
    }

    /// Direct trust only; group-granted access is resolved by the service
    /// against the group registry.
    pub fn grants_direct(&self, player: PlayerId) -> bool {
        player == self.owner || self.trusted_players.contains(&player)
    }

    pub fn touch(&mut self) {
        self.updated_at = unix_timestamp();
    }
}

/// A named, owner-managed set of players that claims can trust collectively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub owner: PlayerId,
    pub members: HashSet<PlayerId>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Group {
    pub fn new(id: GroupId, owner: PlayerId, name: String) -> Self {
        let now = unix_timestamp();
        Group {
            id,
            name,
            owner,
            members: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = unix_timestamp();
    }
}

pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::position::WorldId;

    fn tile(x: i32, z: i32) -> TilePosition {
        TilePosition::new(WorldId::new("main"), x, z)
    }

    #[test]
    fn owner_always_granted_directly() {
        let claim = Claim::new(ClaimId(1), PlayerId(42), [tile(0, 0)].into_iter().collect());
        assert!(claim.grants_direct(PlayerId(42)));
        assert!(!claim.grants_direct(PlayerId(7)));
    }

    #[test]
    fn trusted_player_granted_directly() {
        let mut claim = Claim::new(ClaimId(1), PlayerId(42), [tile(0, 0)].into_iter().collect());
        claim.trusted_players.insert(PlayerId(7));
        assert!(claim.grants_direct(PlayerId(7)));
        assert!(!claim.grants_direct(PlayerId(8)));
    }

    #[test]
    fn containment_is_per_tile() {
        let claim = Claim::new(
            ClaimId(1),
            PlayerId(42),
            [tile(2, 3), tile(2, 4)].into_iter().collect(),
        );
        assert!(claim.contains(&tile(2, 3)));
        assert!(!claim.contains(&tile(3, 3)));
    }
}
