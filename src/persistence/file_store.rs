use crate::claim::model::{Claim, ClaimId, Group, GroupId, PlayerId};
use crate::claim::position::{TilePosition, WorldId};
use crate::persistence::store::{ClaimStore, StoreError, StoreValidationReport};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const CLAIM_FILE: &str = "claim.dat";
const GROUP_FILE: &str = "group.dat";
const COUNTER_FILE: &str = "counters.dat";

/// File-backed durable store. Claims and groups live in line-oriented
/// `key = value` record files; every mutation rewrites the affected file
/// after copying the previous version to a `#`-suffixed backup, and loading
/// falls back to that backup when the primary is unreadable.
pub struct FileClaimStore {
    root: PathBuf,
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    claims: BTreeMap<u64, Claim>,
    groups: BTreeMap<u64, Group>,
    next_claim_id: u64,
    next_group_id: u64,
}

impl FileClaimStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)
            .map_err(|err| StoreError::WriteError(root.to_path_buf(), err.to_string()))?;

        let claims = match load_records(&root.join(CLAIM_FILE), parse_claims)? {
            Some(claims) => claims,
            None => Vec::new(),
        };
        let groups = match load_records(&root.join(GROUP_FILE), parse_groups)? {
            Some(groups) => groups,
            None => Vec::new(),
        };
        let (mut next_claim_id, mut next_group_id) =
            load_counters(&root.join(COUNTER_FILE))?.unwrap_or((1, 1));

        let mut state = StoreState::default();
        for claim in claims {
            if state.claims.insert(claim.id.0, claim).is_some() {
                return Err(StoreError::Corrupt(format!(
                    "{} contains a duplicate claim id",
                    CLAIM_FILE
                )));
            }
        }
        for group in groups {
            if state.groups.insert(group.id.0, group).is_some() {
                return Err(StoreError::Corrupt(format!(
                    "{} contains a duplicate group id",
                    GROUP_FILE
                )));
            }
        }

        // A stale or missing counter file must never hand out a live id.
        if let Some(max) = state.claims.keys().next_back() {
            next_claim_id = next_claim_id.max(max + 1);
        }
        if let Some(max) = state.groups.keys().next_back() {
            next_group_id = next_group_id.max(max + 1);
        }
        state.next_claim_id = next_claim_id;
        state.next_group_id = next_group_id;

        Ok(FileClaimStore {
            root: root.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Corrupt("store lock poisoned".to_string()))
    }

    fn persist_claims(&self, claims: &BTreeMap<u64, Claim>) -> Result<(), StoreError> {
        let data = serialize_claims(claims.values())?;
        write_with_backup(&self.root.join(CLAIM_FILE), &data)
    }

    fn persist_groups(&self, groups: &BTreeMap<u64, Group>) -> Result<(), StoreError> {
        let data = serialize_groups(groups.values())?;
        write_with_backup(&self.root.join(GROUP_FILE), &data)
    }

    fn persist_counters(&self, state: &StoreState) -> Result<(), StoreError> {
        let data = format!(
            "NextClaim = {}\nNextGroup = {}\n",
            state.next_claim_id, state.next_group_id
        );
        write_with_backup(&self.root.join(COUNTER_FILE), &data)
    }

    /// Clone-mutate-persist-commit: the in-memory record is replaced only
    /// if the file rewrite succeeded, so memory never runs ahead of disk.
    fn mutate_claim(
        &self,
        id: ClaimId,
        mutate: impl FnOnce(&mut Claim),
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(existing) = state.claims.get(&id.0) else {
            return Ok(false);
        };
        let mut updated = existing.clone();
        mutate(&mut updated);
        updated.touch();
        let keep = !updated.chunks.is_empty();
        let previous = if keep {
            state.claims.insert(id.0, updated)
        } else {
            // Emptied claims are deleted outright; the store never holds a
            // claim with no tiles.
            state.claims.remove(&id.0)
        };
        if let Err(err) = self.persist_claims(&state.claims) {
            if let Some(previous) = previous {
                state.claims.insert(id.0, previous);
            } else {
                state.claims.remove(&id.0);
            }
            return Err(err);
        }
        Ok(true)
    }

    fn mutate_group(
        &self,
        id: GroupId,
        mutate: impl FnOnce(&mut Group),
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(existing) = state.groups.get(&id.0) else {
            return Ok(false);
        };
        let mut updated = existing.clone();
        mutate(&mut updated);
        updated.touch();
        let previous = state.groups.insert(id.0, updated);
        if let Err(err) = self.persist_groups(&state.groups) {
            if let Some(previous) = previous {
                state.groups.insert(id.0, previous);
            } else {
                state.groups.remove(&id.0);
            }
            return Err(err);
        }
        Ok(true)
    }
}

impl ClaimStore for FileClaimStore {
    fn get_claim_at(&self, tile: &TilePosition) -> Result<Option<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .find(|claim| claim.contains(tile))
            .cloned())
    }

    fn get_claim_by_id(&self, id: ClaimId) -> Result<Option<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state.claims.get(&id.0).cloned())
    }

    fn get_claims_by_owner(&self, owner: PlayerId) -> Result<Vec<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| claim.owner == owner)
            .cloned()
            .collect())
    }

    fn get_claims_where_trusted(&self, player: PlayerId) -> Result<Vec<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| claim.trusted_players.contains(&player))
            .cloned()
            .collect())
    }

    fn get_claims_trusting_group(&self, group: GroupId) -> Result<Vec<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| claim.trusted_groups.contains(&group))
            .cloned()
            .collect())
    }

    fn get_claims_by_world(&self, world: &WorldId) -> Result<Vec<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| claim.chunks.iter().any(|tile| &tile.world == world))
            .cloned()
            .collect())
    }

    fn get_claims_in_area(
        &self,
        world: &WorldId,
        min_x: i32,
        max_x: i32,
        min_z: i32,
        max_z: i32,
    ) -> Result<Vec<Claim>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| {
                claim.chunks.iter().any(|tile| {
                    &tile.world == world
                        && tile.x >= min_x
                        && tile.x <= max_x
                        && tile.z >= min_z
                        && tile.z <= max_z
                })
            })
            .cloned()
            .collect())
    }

    fn get_plot_count(&self, owner: PlayerId) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| claim.owner == owner)
            .count())
    }

    fn get_total_chunk_count(&self, owner: PlayerId) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state
            .claims
            .values()
            .filter(|claim| claim.owner == owner)
            .map(|claim| claim.chunks.len())
            .sum())
    }

    fn allocate_claim_id(&self) -> Result<ClaimId, StoreError> {
        let mut state = self.lock()?;
        let id = state.next_claim_id;
        state.next_claim_id += 1;
        if let Err(err) = self.persist_counters(&state) {
            state.next_claim_id = id;
            return Err(err);
        }
        Ok(ClaimId(id))
    }

    fn create_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.claims.contains_key(&claim.id.0) {
            return Err(StoreError::Corrupt(format!(
                "claim id {} already exists",
                claim.id
            )));
        }
        state.claims.insert(claim.id.0, claim.clone());
        if let Err(err) = self.persist_claims(&state.claims) {
            state.claims.remove(&claim.id.0);
            return Err(err);
        }
        Ok(())
    }

    fn delete_claim(&self, id: ClaimId, owner: PlayerId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.claims.get(&id.0) {
            Some(claim) if claim.owner == owner => {}
            _ => return Ok(false),
        }
        let previous = state.claims.remove(&id.0);
        if let Err(err) = self.persist_claims(&state.claims) {
            if let Some(previous) = previous {
                state.claims.insert(id.0, previous);
            }
            return Err(err);
        }
        Ok(true)
    }

    fn remove_chunks_from_claim(
        &self,
        id: ClaimId,
        tiles: &HashSet<TilePosition>,
    ) -> Result<bool, StoreError> {
        self.mutate_claim(id, |claim| {
            claim.chunks.retain(|tile| !tiles.contains(tile));
        })
    }

    fn update_claim_name(&self, id: ClaimId, name: Option<&str>) -> Result<bool, StoreError> {
        self.mutate_claim(id, |claim| {
            claim.name = name.map(|name| name.to_string());
        })
    }

    fn add_trusted_player(&self, id: ClaimId, player: PlayerId) -> Result<bool, StoreError> {
        self.mutate_claim(id, |claim| {
            claim.trusted_players.insert(player);
        })
    }

    fn remove_trusted_player(&self, id: ClaimId, player: PlayerId) -> Result<bool, StoreError> {
        self.mutate_claim(id, |claim| {
            claim.trusted_players.remove(&player);
        })
    }

    fn trust_group(&self, claim: ClaimId, group: GroupId) -> Result<bool, StoreError> {
        self.mutate_claim(claim, |claim| {
            claim.trusted_groups.insert(group);
        })
    }

    fn untrust_group(&self, claim: ClaimId, group: GroupId) -> Result<bool, StoreError> {
        self.mutate_claim(claim, |claim| {
            claim.trusted_groups.remove(&group);
        })
    }

    fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        let state = self.lock()?;
        Ok(state.groups.get(&id.0).cloned())
    }

    fn get_groups(&self) -> Result<Vec<Group>, StoreError> {
        let state = self.lock()?;
        Ok(state.groups.values().cloned().collect())
    }

    fn get_groups_by_owner(&self, owner: PlayerId) -> Result<Vec<Group>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .groups
            .values()
            .filter(|group| group.owner == owner)
            .cloned()
            .collect())
    }

    fn allocate_group_id(&self) -> Result<GroupId, StoreError> {
        let mut state = self.lock()?;
        let id = state.next_group_id;
        state.next_group_id += 1;
        if let Err(err) = self.persist_counters(&state) {
            state.next_group_id = id;
            return Err(err);
        }
        Ok(GroupId(id))
    }

    fn create_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.groups.contains_key(&group.id.0) {
            return Err(StoreError::Corrupt(format!(
                "group id {} already exists",
                group.id
            )));
        }
        state.groups.insert(group.id.0, group.clone());
        if let Err(err) = self.persist_groups(&state.groups) {
            state.groups.remove(&group.id.0);
            return Err(err);
        }
        Ok(())
    }

    fn delete_group(&self, id: GroupId, owner: PlayerId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.groups.get(&id.0) {
            Some(group) if group.owner == owner => {}
            _ => return Ok(false),
        }
        let previous = state.groups.remove(&id.0);
        if let Err(err) = self.persist_groups(&state.groups) {
            if let Some(previous) = previous {
                state.groups.insert(id.0, previous);
            }
            return Err(err);
        }
        Ok(true)
    }

    fn add_group_member(&self, id: GroupId, player: PlayerId) -> Result<bool, StoreError> {
        self.mutate_group(id, |group| {
            group.members.insert(player);
        })
    }

    fn remove_group_member(&self, id: GroupId, player: PlayerId) -> Result<bool, StoreError> {
        self.mutate_group(id, |group| {
            group.members.remove(&player);
        })
    }

    fn validate(&self) -> StoreValidationReport {
        let mut report = StoreValidationReport::default();
        let state = match self.lock() {
            Ok(state) => state,
            Err(err) => {
                report.errors.push(err.to_string());
                return report;
            }
        };
        report.claims = state.claims.len();
        report.groups = state.groups.len();

        let mut seen: HashMap<&TilePosition, u64> = HashMap::new();
        for claim in state.claims.values() {
            if claim.chunks.is_empty() {
                report
                    .errors
                    .push(format!("claim {} has an empty tile set", claim.id));
            }
            if claim.trusted_players.contains(&claim.owner) {
                report
                    .errors
                    .push(format!("claim {} lists its owner as trusted", claim.id));
            }
            for tile in &claim.chunks {
                if let Some(other) = seen.insert(tile, claim.id.0) {
                    report.errors.push(format!(
                        "tile {} belongs to both claim {} and claim {}",
                        tile, other, claim.id
                    ));
                }
            }
            for group in &claim.trusted_groups {
                if !state.groups.contains_key(&group.0) {
                    report.errors.push(format!(
                        "claim {} trusts missing group {}",
                        claim.id, group
                    ));
                }
            }
        }
        report
    }
}

fn write_with_backup(path: &Path, data: &str) -> Result<(), StoreError> {
    if path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup)
            .map_err(|err| StoreError::WriteError(backup, err.to_string()))?;
    }
    fs::write(path, data).map_err(|err| StoreError::WriteError(path.to_path_buf(), err.to_string()))
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("#");
    PathBuf::from(name)
}

fn load_records<T>(
    path: &Path,
    parse: fn(&str) -> Result<Vec<T>, StoreError>,
) -> Result<Option<Vec<T>>, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => Some(data),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(StoreError::ReadError(path.to_path_buf(), err.to_string())),
    };
    if let Some(data) = data {
        match parse(&data) {
            Ok(records) => return Ok(Some(records)),
            Err(err) => {
                // Primary unreadable; the pre-write backup may still parse.
                let backup = backup_path(path);
                if let Ok(data) = fs::read_to_string(&backup) {
                    eprintln!(
                        "plotguard: {} corrupt, using backup: {}",
                        path.display(),
                        err
                    );
                    return parse(&data).map(Some);
                }
                return Err(err);
            }
        }
    }
    let backup = backup_path(path);
    match fs::read_to_string(&backup) {
        Ok(data) => parse(&data).map(Some),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::ReadError(backup, err.to_string())),
    }
}

fn load_counters(path: &Path) -> Result<Option<(u64, u64)>, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::ReadError(path.to_path_buf(), err.to_string())),
    };
    let mut next_claim = 1;
    let mut next_group = 1;
    for (index, raw_line) in data.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let line_no = index + 1;
        match key.trim() {
            "NextClaim" => next_claim = parse_u64(value.trim(), line_no, "NextClaim")?,
            "NextGroup" => next_group = parse_u64(value.trim(), line_no, "NextGroup")?,
            _ => {}
        }
    }
    Ok(Some((next_claim, next_group)))
}

// -- claim records --

fn serialize_claims<'a>(claims: impl Iterator<Item = &'a Claim>) -> Result<String, StoreError> {
    let mut out = String::new();
    for (index, claim) in claims.enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&format!("ID = {}\n", claim.id.0));
        out.push_str(&format!("Owner = {}\n", claim.owner.0));
        if let Some(name) = &claim.name {
            out.push_str(&format!("Name = {}\n", format_quoted(name)?));
        }
        out.push_str("Chunks = ");
        out.push_str(&serialize_tiles(&claim.chunks)?);
        out.push('\n');
        out.push_str("Trusted = ");
        out.push_str(&serialize_id_set(claim.trusted_players.iter().map(|p| p.0 as u64)));
        out.push('\n');
        out.push_str("Groups = ");
        out.push_str(&serialize_id_set(claim.trusted_groups.iter().map(|g| g.0)));
        out.push('\n');
        out.push_str(&format!("Created = {}\n", claim.created_at));
        out.push_str(&format!("Updated = {}\n", claim.updated_at));
    }
    Ok(out)
}

fn parse_claims(content: &str) -> Result<Vec<Claim>, StoreError> {
    let mut claims = Vec::new();
    let mut current = ClaimBuilder::default();
    let mut have_current = false;

    for (index, raw_line) in content.lines().enumerate() {
        let line = strip_inline_comment(raw_line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        let line_no = index + 1;

        if key == "ID" {
            if have_current {
                claims.push(current.build()?);
                current = ClaimBuilder::default();
            }
            have_current = true;
            current.id = Some(parse_u64(value, line_no, "ID")?);
            continue;
        }

        match key {
            "Owner" => current.owner = Some(parse_u32(value, line_no, "Owner")?),
            "Name" => current.name = Some(parse_quoted(value, line_no, "Name")?),
            "Chunks" => current.chunks = parse_tiles(value, line_no)?,
            "Trusted" => {
                current.trusted = parse_player_set(value, line_no, "Trusted")?
                    .into_iter()
                    .collect()
            }
            "Groups" => {
                current.groups = parse_id_set(value, line_no, "Groups")?
                    .into_iter()
                    .map(GroupId)
                    .collect()
            }
            "Created" => current.created = Some(parse_u64(value, line_no, "Created")?),
            "Updated" => current.updated = Some(parse_u64(value, line_no, "Updated")?),
            _ => {}
        }
    }

    if have_current {
        claims.push(current.build()?);
    }
    Ok(claims)
}

#[derive(Default)]
struct ClaimBuilder {
    id: Option<u64>,
    owner: Option<u32>,
    name: Option<String>,
    chunks: HashSet<TilePosition>,
    trusted: HashSet<PlayerId>,
    groups: HashSet<GroupId>,
    created: Option<u64>,
    updated: Option<u64>,
}

impl ClaimBuilder {
    fn build(self) -> Result<Claim, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::ParseError("claim record missing ID".to_string()))?;
        let owner = self
            .owner
            .ok_or_else(|| StoreError::ParseError(format!("claim {} missing Owner", id)))?;
        if self.chunks.is_empty() {
            return Err(StoreError::ParseError(format!(
                "claim {} has no Chunks",
                id
            )));
        }
        Ok(Claim {
            id: ClaimId(id),
            owner: PlayerId(owner),
            chunks: self.chunks,
            name: self.name,
            trusted_players: self.trusted,
            trusted_groups: self.groups,
            created_at: self
                .created
                .ok_or_else(|| StoreError::ParseError(format!("claim {} missing Created", id)))?,
            updated_at: self
                .updated
                .ok_or_else(|| StoreError::ParseError(format!("claim {} missing Updated", id)))?,
        })
    }
}

// -- group records --

fn serialize_groups<'a>(groups: impl Iterator<Item = &'a Group>) -> Result<String, StoreError> {
    let mut out = String::new();
    for (index, group) in groups.enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&format!("ID = {}\n", group.id.0));
        out.push_str(&format!("Owner = {}\n", group.owner.0));
        out.push_str(&format!("Name = {}\n", format_quoted(&group.name)?));
        out.push_str("Members = ");
        out.push_str(&serialize_id_set(group.members.iter().map(|p| p.0 as u64)));
        out.push('\n');
        out.push_str(&format!("Created = {}\n", group.created_at));
        out.push_str(&format!("Updated = {}\n", group.updated_at));
    }
    Ok(out)
}

fn parse_groups(content: &str) -> Result<Vec<Group>, StoreError> {
    let mut groups = Vec::new();
    let mut current = GroupBuilder::default();
    let mut have_current = false;

    for (index, raw_line) in content.lines().enumerate() {
        let line = strip_inline_comment(raw_line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        let line_no = index + 1;

        if key == "ID" {
            if have_current {
                groups.push(current.build()?);
                current = GroupBuilder::default();
            }
            have_current = true;
            current.id = Some(parse_u64(value, line_no, "ID")?);
            continue;
        }

        match key {
            "Owner" => current.owner = Some(parse_u32(value, line_no, "Owner")?),
            "Name" => current.name = Some(parse_quoted(value, line_no, "Name")?),
            "Members" => {
                current.members = parse_player_set(value, line_no, "Members")?
                    .into_iter()
                    .collect()
            }
            "Created" => current.created = Some(parse_u64(value, line_no, "Created")?),
            "Updated" => current.updated = Some(parse_u64(value, line_no, "Updated")?),
            _ => {}
        }
    }

    if have_current {
        groups.push(current.build()?);
    }
    Ok(groups)
}

#[derive(Default)]
struct GroupBuilder {
    id: Option<u64>,
    owner: Option<u32>,
    name: Option<String>,
    members: HashSet<PlayerId>,
    created: Option<u64>,
    updated: Option<u64>,
}

impl GroupBuilder {
    fn build(self) -> Result<Group, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::ParseError("group record missing ID".to_string()))?;
        Ok(Group {
            id: GroupId(id),
            name: self
                .name
                .ok_or_else(|| StoreError::ParseError(format!("group {} missing Name", id)))?,
            owner: PlayerId(self.owner.ok_or_else(|| {
                StoreError::ParseError(format!("group {} missing Owner", id))
            })?),
            members: self.members,
            created_at: self
                .created
                .ok_or_else(|| StoreError::ParseError(format!("group {} missing Created", id)))?,
            updated_at: self
                .updated
                .ok_or_else(|| StoreError::ParseError(format!("group {} missing Updated", id)))?,
        })
    }
}

// -- value syntax helpers --

fn serialize_tiles(tiles: &HashSet<TilePosition>) -> Result<String, StoreError> {
    let mut sorted: Vec<&TilePosition> = tiles.iter().collect();
    sorted.sort_by(|a, b| (&a.world, a.x, a.z).cmp(&(&b.world, b.x, b.z)));
    let mut out = String::from("{");
    for (index, tile) in sorted.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&format!(
            "[{},{},{}]",
            format_quoted(tile.world.as_str())?,
            tile.x,
            tile.z
        ));
    }
    out.push('}');
    Ok(out)
}

fn parse_tiles(raw: &str, line_no: usize) -> Result<HashSet<TilePosition>, StoreError> {
    let raw = raw.trim();
    if !raw.starts_with('{') || !raw.ends_with('}') {
        return Err(StoreError::ParseError(format!(
            "Chunks expected braces at line {}",
            line_no
        )));
    }
    let inner = &raw[1..raw.len() - 1];
    let mut tiles = HashSet::new();
    let mut in_bracket = false;
    let mut in_quotes = false;
    let mut buffer = String::new();

    for ch in inner.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                if in_bracket {
                    buffer.push(ch);
                }
            }
            '[' if !in_quotes => {
                in_bracket = true;
                buffer.clear();
            }
            ']' if !in_quotes => {
                if !in_bracket {
                    continue;
                }
                tiles.insert(parse_tile(&buffer, line_no)?);
                in_bracket = false;
            }
            _ => {
                if in_bracket {
                    buffer.push(ch);
                }
            }
        }
    }
    if in_bracket || in_quotes {
        return Err(StoreError::ParseError(format!(
            "Chunks missing closing bracket at line {}",
            line_no
        )));
    }
    Ok(tiles)
}

fn parse_tile(raw: &str, line_no: usize) -> Result<TilePosition, StoreError> {
    let parts = split_top_level(raw);
    if parts.len() != 3 {
        return Err(StoreError::ParseError(format!(
            "Chunks expected [world,x,z] at line {}",
            line_no
        )));
    }
    let world = parse_quoted(parts[0], line_no, "Chunks")?;
    let x = parse_i32(parts[1], line_no, "Chunks")?;
    let z = parse_i32(parts[2], line_no, "Chunks")?;
    Ok(TilePosition::new(WorldId::new(world), x, z))
}

fn serialize_id_set(ids: impl Iterator<Item = u64>) -> String {
    let mut sorted: Vec<u64> = ids.collect();
    sorted.sort_unstable();
    let mut out = String::from("{");
    for (index, id) in sorted.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&id.to_string());
    }
    out.push('}');
    out
}

fn parse_id_set(raw: &str, line_no: usize, label: &str) -> Result<Vec<u64>, StoreError> {
    let raw = raw.trim();
    if !raw.starts_with('{') || !raw.ends_with('}') {
        return Err(StoreError::ParseError(format!(
            "{} expected braces at line {}",
            label, line_no
        )));
    }
    let inner = raw[1..raw.len() - 1].trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| parse_u64(part.trim(), line_no, label))
        .collect()
}

// Player ids are u32 on the wire and in every record this store writes; an
// oversized id can only come from a hand-edited file and must not silently
// alias another player.
fn parse_player_set(raw: &str, line_no: usize, label: &str) -> Result<Vec<PlayerId>, StoreError> {
    parse_id_set(raw, line_no, label)?
        .into_iter()
        .map(|id| {
            u32::try_from(id).map(PlayerId).map_err(|_| {
                StoreError::ParseError(format!(
                    "{} id {} out of range at line {}",
                    label, id, line_no
                ))
            })
        })
        .collect()
}

fn strip_inline_comment(line: &str) -> String {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return line[..idx].to_string(),
            _ => {}
        }
    }
    line.to_string()
}

fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0usize;
    for (index, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    if start <= input.len() {
        parts.push(input[start..].trim());
    }
    parts
}

fn parse_quoted(raw: &str, line_no: usize, label: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Ok(raw[1..raw.len() - 1].to_string())
    } else {
        Err(StoreError::ParseError(format!(
            "{} expected quoted string at line {}",
            label, line_no
        )))
    }
}

fn format_quoted(value: &str) -> Result<String, StoreError> {
    if value.contains('"') {
        return Err(StoreError::Corrupt(
            "names cannot contain '\"'".to_string(),
        ));
    }
    if value.contains('\n') || value.contains('\r') {
        return Err(StoreError::Corrupt(
            "names cannot contain newlines".to_string(),
        ));
    }
    Ok(format!("\"{}\"", value))
}

fn parse_u32(raw: &str, line_no: usize, label: &str) -> Result<u32, StoreError> {
    raw.parse::<u32>()
        .map_err(|_| StoreError::ParseError(format!("{} invalid u32 at line {}", label, line_no)))
}

fn parse_u64(raw: &str, line_no: usize, label: &str) -> Result<u64, StoreError> {
    raw.parse::<u64>()
        .map_err(|_| StoreError::ParseError(format!("{} invalid u64 at line {}", label, line_no)))
}

fn parse_i32(raw: &str, line_no: usize, label: &str) -> Result<i32, StoreError> {
    raw.parse::<i32>()
        .map_err(|_| StoreError::ParseError(format!("{} invalid i32 at line {}", label, line_no)))
}
