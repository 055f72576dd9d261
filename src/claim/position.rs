use std::fmt;

/// Identifier of a game world. Servers usually run a handful of named
/// worlds, so the id is the world's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(pub String);

impl WorldId {
    pub fn new(name: impl Into<String>) -> Self {
        WorldId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One claimable tile of world space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TilePosition {
    pub world: WorldId,
    pub x: i32,
    pub z: i32,
}

impl TilePosition {
    pub fn new(world: WorldId, x: i32, z: i32) -> Self {
        TilePosition { world, x, z }
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{}", self.world, self.x, self.z)
    }
}
