//! The world model: rooms, exits, doors and entities derived from a [`State`].
//!
//! The `State` is the single source of truth. [`World`] keeps an id-keyed view of it
//! (rooms with their exits and doors, entities with their location and properties)
//! which is rebuilt whenever facts are added.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::knowledge::KnowledgeBase;
use crate::logic::{FreshNames, Proposition, State, Variable};

/// Compass directions an exit can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Order in which free exits are tried.
    pub const ALL: [Direction; 4] = [Direction::North, Direction::South, Direction::East, Direction::West];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// Predicate stating that its first room lies in this direction from its second.
    pub fn predicate(self) -> &'static str {
        match self {
            Direction::North => "north_of",
            Direction::South => "south_of",
            Direction::East => "east_of",
            Direction::West => "west_of",
        }
    }

    pub fn from_predicate(name: &str) -> Option<Direction> {
        Direction::ALL.into_iter().find(|d| d.predicate() == name)
    }

    /// Grid offset of one step in this direction.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an entity currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Location {
    Room(String),
    Inventory,
    In(String),
    On(String),
    #[default]
    Nowhere,
}

impl Location {
    pub fn is_nowhere(&self) -> bool {
        matches!(self, Location::Nowhere)
    }
}

/// A non-room entity: container, supporter, door, object, key, food...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEntity {
    pub var: Variable,
    pub location: Location,
    /// Unary facts that hold about this entity (`open`, `closed`, `locked`, `eaten`).
    pub properties: BTreeSet<String>,
}

impl WorldEntity {
    pub fn id(&self) -> &str {
        &self.var.name
    }

    pub fn is(&self, property: &str) -> bool {
        self.properties.contains(property)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldRoom {
    pub var: Variable,
    /// Neighbouring room id per direction.
    pub exits: BTreeMap<Direction, String>,
    /// Door id per direction, for exits that have one.
    pub doors: BTreeMap<Direction, String>,
    /// Grid cell, when the room could be laid out on the plane.
    pub position: Option<(i32, i32)>,
}

impl WorldRoom {
    pub fn id(&self) -> &str {
        &self.var.name
    }

    pub fn exit_towards(&self, room: &str) -> Option<Direction> {
        self.exits.iter().find(|(_, id)| *id == room).map(|(dir, _)| *dir)
    }
}

type ExitMap = BTreeMap<String, BTreeMap<Direction, String>>;

#[derive(Debug, Clone)]
pub struct World {
    kb: Arc<KnowledgeBase>,
    state: State,
    rooms: BTreeMap<String, WorldRoom>,
    entities: BTreeMap<String, WorldEntity>,
    player_room: Option<String>,
    positions: BTreeMap<String, (i32, i32)>,
    names: FreshNames,
}

impl World {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self {
            state: State::new(Arc::clone(&kb)),
            kb,
            rooms: BTreeMap::new(),
            entities: BTreeMap::new(),
            player_room: None,
            positions: BTreeMap::new(),
            names: FreshNames::new(),
        }
    }

    /// Build a world from facts; connections without direction facts are placed on free exits.
    ///
    /// The world's facts equal `facts` only when the input is already symmetric. One-directional
    /// input gains its reverse direction, `link` and `free` facts, and those completed facts
    /// round-trip unchanged.
    ///
    /// # Errors
    /// See [`World::add_facts`].
    pub fn from_facts(kb: Arc<KnowledgeBase>, facts: impl IntoIterator<Item = Proposition>) -> EngineResult<Self> {
        let mut world = Self::new(kb);
        world.add_facts(facts)?;
        info!(
            "world built: {} rooms, {} entities, {} facts",
            world.rooms.len(),
            world.entities.len(),
            world.state.len()
        );
        Ok(world)
    }

    /// View an existing state as a world, without adding anything to it.
    pub fn from_state(state: State) -> Self {
        let mut world = Self::new(Arc::clone(state.kb()));
        world.state = state;
        world.rebuild();
        world
    }

    /// Add facts incrementally.
    ///
    /// Direction facts get their opposite, `link` facts their reverse link and `free`
    /// facts their reverse passage. A `link` or `free` between two rooms with no direction
    /// fact is placed on the first free exit pair: a direction keeping the map planar is
    /// preferred, any free pair of exits is accepted otherwise.
    ///
    /// # Errors
    /// [`EngineError::InvalidFact`] for a fact that does not type-check and
    /// [`EngineError::NoFreeExit`] when no exit pair is left. The world is unchanged on error.
    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Proposition>) -> EngineResult<()> {
        let facts: Vec<Proposition> = facts.into_iter().collect();
        let mut staged = self.state.clone();
        staged.add_facts(facts.iter().cloned())?;

        let mut derived = Vec::new();
        for fact in staged.facts() {
            if let (Some(dir), [a, b]) = (Direction::from_predicate(&fact.name), fact.arguments.as_slice()) {
                derived.push(Proposition::new(dir.opposite().predicate(), vec![b.clone(), a.clone()]));
            }
        }
        staged.add_facts(derived)?;

        let mut exits = exit_map(&staged);
        let mut positions = self.positions.clone();
        layout(&staged, &exits, &mut positions);

        let mut pending: Vec<(Variable, Variable)> = Vec::new();
        for fact in &facts {
            let Some((a, b)) = connection(fact) else { continue };
            let placed = exits.get(&a.name).is_some_and(|e| e.values().any(|r| *r == b.name));
            let queued = pending
                .iter()
                .any(|(x, y)| (x == &a && y == &b) || (x == &b && y == &a));
            if !placed && !queued {
                pending.push((a, b));
            }
        }

        for (a, b) in pending {
            let dir = choose_direction(&exits, &mut positions, &a.name, &b.name)?;
            debug!("placing '{}' {} of '{}'", b.name, dir, a.name);
            staged.add_facts([
                Proposition::new(dir.predicate(), vec![b.clone(), a.clone()]),
                Proposition::new(dir.opposite().predicate(), vec![a.clone(), b.clone()]),
            ])?;
            exits.entry(a.name.clone()).or_default().insert(dir, b.name.clone());
            exits.entry(b.name.clone()).or_default().insert(dir.opposite(), a.name.clone());
        }

        let mut reverse = Vec::new();
        for fact in staged.facts() {
            match (fact.name.as_str(), fact.arguments.as_slice()) {
                ("link", [a, d, b]) => reverse.push(Proposition::new("link", vec![b.clone(), d.clone(), a.clone()])),
                ("free", [a, b]) => reverse.push(Proposition::new("free", vec![b.clone(), a.clone()])),
                _ => {},
            }
        }
        staged.add_facts(reverse)?;

        self.state = staged;
        self.positions = positions;
        self.rebuild();
        Ok(())
    }

    fn rebuild(&mut self) {
        let types = self.kb.types();
        self.rooms.clear();
        self.entities.clear();
        self.player_room = None;

        layout(&self.state, &exit_map(&self.state), &mut self.positions);

        for var in self.state.variables() {
            if types.is_descendant_of(&var.type_name, "r") {
                self.rooms.insert(
                    var.name.clone(),
                    WorldRoom {
                        var: var.clone(),
                        exits: BTreeMap::new(),
                        doors: BTreeMap::new(),
                        position: self.positions.get(&var.name).copied(),
                    },
                );
            } else if !types.is_descendant_of(&var.type_name, "P") && !types.is_descendant_of(&var.type_name, "I") {
                self.entities.insert(
                    var.name.clone(),
                    WorldEntity {
                        var: var.clone(),
                        location: Location::Nowhere,
                        properties: BTreeSet::new(),
                    },
                );
            }
        }

        let mut links = Vec::new();
        for fact in self.state.facts() {
            match (fact.name.as_str(), fact.arguments.as_slice()) {
                ("at", [thing, room]) if thing.type_name == "P" => self.player_room = Some(room.name.clone()),
                ("at", [thing, room]) => place(&mut self.entities, &thing.name, Location::Room(room.name.clone())),
                ("in", [thing, holder]) if holder.type_name == "I" => {
                    place(&mut self.entities, &thing.name, Location::Inventory);
                },
                ("in", [thing, holder]) => place(&mut self.entities, &thing.name, Location::In(holder.name.clone())),
                ("on", [thing, holder]) => place(&mut self.entities, &thing.name, Location::On(holder.name.clone())),
                ("link", [a, d, b]) => links.push((a.name.clone(), d.name.clone(), b.name.clone())),
                (name, [a, b]) => {
                    if let Some(dir) = Direction::from_predicate(name)
                        && let Some(room) = self.rooms.get_mut(&b.name)
                    {
                        room.exits.insert(dir, a.name.clone());
                    }
                },
                (name, [one]) => {
                    if let Some(entity) = self.entities.get_mut(&one.name) {
                        entity.properties.insert(name.to_string());
                    }
                },
                _ => {},
            }
        }
        for (a, d, b) in links {
            if let Some(room) = self.rooms.get_mut(&a)
                && let Some(dir) = room.exit_towards(&b)
            {
                room.doors.insert(dir, d);
            }
        }
    }

    pub fn kb(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn into_state(self) -> State {
        self.state
    }

    /// The facts of the underlying state.
    pub fn facts(&self) -> Vec<Proposition> {
        self.state.facts().cloned().collect()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &WorldRoom> {
        self.rooms.values()
    }

    pub fn room(&self, id: &str) -> Option<&WorldRoom> {
        self.rooms.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &WorldEntity> {
        self.entities.values()
    }

    pub fn entity(&self, id: &str) -> Option<&WorldEntity> {
        self.entities.get(id)
    }

    pub fn player_room(&self) -> Option<&WorldRoom> {
        self.player_room.as_ref().and_then(|id| self.rooms.get(id))
    }

    pub fn inventory(&self) -> Vec<&WorldEntity> {
        self.entities
            .values()
            .filter(|e| e.location == Location::Inventory)
            .collect()
    }

    /// Entities a player standing in `room` can see: everything on its floor, on visible
    /// supporters, and inside visible open containers.
    pub fn get_visible_objects_in(&self, room: &str) -> Vec<&WorldEntity> {
        let mut visible = Vec::new();
        let mut queue: VecDeque<&WorldEntity> = self
            .entities
            .values()
            .filter(|e| e.location == Location::Room(room.to_string()))
            .collect();
        while let Some(entity) = queue.pop_front() {
            visible.push(entity);
            let id = entity.id();
            let opened = entity.is("open");
            for child in self.entities.values() {
                match &child.location {
                    Location::On(holder) if holder == id => queue.push_back(child),
                    Location::In(holder) if holder == id && opened => queue.push_back(child),
                    _ => {},
                }
            }
        }
        visible
    }

    /// Mint a variable of `type_name` that no fact mentions yet.
    pub fn new_variable(&mut self, type_name: &str) -> Variable {
        let state = &self.state;
        self.names.mint(type_name, |name| state.has_variable_named(name))
    }

    /// Add `n` entities with random types and placements.
    ///
    /// Each step first gives a key to a closed or locked container or door that has none;
    /// otherwise it draws a type under `t` (weighted by `type_probs`) and places it.
    /// Containers get exactly one of open, closed or locked.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidWorld`] if there are no rooms, or a fact error.
    pub fn populate<R: Rng + ?Sized>(
        &mut self,
        n: usize,
        rng: &mut R,
        type_probs: Option<&BTreeMap<String, f64>>,
    ) -> EngineResult<Vec<Proposition>> {
        if self.rooms.is_empty() {
            return Err(EngineError::InvalidWorld("cannot populate a world without rooms".into()));
        }
        let defaults = default_type_probs();
        let probs = type_probs.unwrap_or(&defaults);

        let mut added = Vec::new();
        for _ in 0..n {
            let facts = if let Some(lock) = self.lockable_without_key() {
                let key = self.new_variable("k");
                let mut facts = vec![Proposition::new("match", vec![key.clone(), lock.clone()])];
                facts.push(self.placement(&key, rng, Some(&lock.name)));
                facts
            } else {
                let Some(ty) = self.kb.types().sample("t", rng, &["d"], Some(probs), false) else {
                    break;
                };
                let var = self.new_variable(&ty);
                self.entity_facts(&var, rng)
            };
            self.state.add_facts(facts.iter().cloned())?;
            self.rebuild();
            added.extend(facts);
        }
        info!("populated world with {} new facts", added.len());
        Ok(added)
    }

    fn lockable_without_key(&self) -> Option<Variable> {
        let types = self.kb.types();
        self.entities
            .values()
            .filter(|e| types.is_descendant_of(&e.var.type_name, "c") || types.is_descendant_of(&e.var.type_name, "d"))
            .filter(|e| e.is("closed") || e.is("locked"))
            .find(|e| !self.state.facts_named("match").any(|f| f.arguments.get(1) == Some(&e.var)))
            .map(|e| e.var.clone())
    }

    fn entity_facts<R: Rng + ?Sized>(&self, var: &Variable, rng: &mut R) -> Vec<Proposition> {
        let types = self.kb.types();
        let room_ids: Vec<&WorldRoom> = self.rooms.values().collect();
        let mut facts = Vec::new();
        if types.is_descendant_of(&var.type_name, "c") || types.is_descendant_of(&var.type_name, "s") {
            if let Some(room) = room_ids.choose(rng) {
                facts.push(Proposition::new("at", vec![var.clone(), room.var.clone()]));
            }
            if types.is_descendant_of(&var.type_name, "c") {
                let status = ["open", "closed", "locked"].choose(rng).copied().unwrap_or("open");
                facts.push(Proposition::new(status, vec![var.clone()]));
            }
        } else {
            facts.push(self.placement(var, rng, None));
        }
        facts
    }

    /// Where to put a portable object: a room floor, a supporter or a container.
    fn placement<R: Rng + ?Sized>(&self, var: &Variable, rng: &mut R, avoid: Option<&str>) -> Proposition {
        let types = self.kb.types();
        let mut holders: Vec<(&str, &Variable)> = self.rooms.values().map(|r| ("at", &r.var)).collect();
        for entity in self.entities.values() {
            if Some(entity.id()) == avoid || entity.location.is_nowhere() {
                continue;
            }
            if types.is_descendant_of(&entity.var.type_name, "s") {
                holders.push(("on", &entity.var));
            } else if types.is_descendant_of(&entity.var.type_name, "c") {
                holders.push(("in", &entity.var));
            }
        }
        match holders.choose(rng) {
            Some((name, holder)) => Proposition::new(*name, vec![var.clone(), (*holder).clone()]),
            None => Proposition::new("in", vec![var.clone(), Variable::new("I", "I")]),
        }
    }

    /// Check the world invariants: one player in one room, every thing in at most one place,
    /// exactly one state per container and door, consistent links and directions, and no
    /// violated constraint.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidWorld`] listing every problem found.
    pub fn check_invariants(&self) -> EngineResult<()> {
        let types = self.kb.types();
        let mut problems = Vec::new();

        let player_rooms = self
            .state
            .facts_named("at")
            .filter(|f| f.arguments[0].type_name == "P")
            .count();
        if player_rooms != 1 {
            problems.push(format!("player is in {player_rooms} rooms"));
        }

        for entity in self.entities.values() {
            let ty = &entity.var.type_name;
            if types.is_descendant_of(ty, "d") {
                if self.state.facts_with(&entity.var).any(|f| f.name == "at") {
                    problems.push(format!("door '{}' is placed in a room", entity.id()));
                }
            } else {
                let places = self
                    .state
                    .facts_with(&entity.var)
                    .filter(|f| matches!(f.name.as_str(), "at" | "in" | "on") && f.arguments[0] == entity.var)
                    .count();
                if places > 1 {
                    problems.push(format!("'{}' is in {places} places", entity.id()));
                }
            }
            if types.is_descendant_of(ty, "c") || types.is_descendant_of(ty, "d") {
                let states = ["open", "closed", "locked"].iter().filter(|s| entity.is(s)).count();
                if states != 1 {
                    problems.push(format!("'{}' has {states} of open/closed/locked", entity.id()));
                }
            }
        }

        for fact in self.state.facts_named("link") {
            if let [a, d, b] = fact.arguments.as_slice() {
                let reverse = Proposition::new("link", vec![b.clone(), d.clone(), a.clone()]);
                if !self.state.contains(&reverse) {
                    problems.push(format!("{fact} has no reverse link"));
                }
                let forward = self.rooms.get(&a.name).and_then(|r| r.exit_towards(&b.name));
                let back = self.rooms.get(&b.name).and_then(|r| r.exit_towards(&a.name));
                match (forward, back) {
                    (Some(f), Some(r)) if f.opposite() == r => {},
                    _ => problems.push(format!("{fact} has no consistent direction")),
                }
            }
        }

        for room in self.rooms.values() {
            for (dir, other) in &room.exits {
                let back = self.rooms.get(other).and_then(|r| r.exits.get(&dir.opposite()));
                if back.map(String::as_str) != Some(room.id()) {
                    problems.push(format!("exit {dir} of '{}' has no matching way back", room.id()));
                }
            }
        }

        if let Some(name) = self.state.violated_constraint() {
            problems.push(format!("constraint '{name}' is violated"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidWorld(problems.join("; ")))
        }
    }
}

impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

fn place(entities: &mut BTreeMap<String, WorldEntity>, id: &str, location: Location) {
    if let Some(entity) = entities.get_mut(id) {
        entity.location = location;
    }
}

fn default_type_probs() -> BTreeMap<String, f64> {
    [("c", 0.2), ("s", 0.2), ("o", 0.35), ("f", 0.25)]
        .into_iter()
        .map(|(ty, p)| (ty.to_string(), p))
        .collect()
}

/// The two rooms a `link` or `free` fact connects.
fn connection(fact: &Proposition) -> Option<(Variable, Variable)> {
    match (fact.name.as_str(), fact.arguments.as_slice()) {
        ("link", [a, _, b]) | ("free", [a, b]) if a != b => Some((a.clone(), b.clone())),
        _ => None,
    }
}

fn exit_map(state: &State) -> ExitMap {
    let mut exits = ExitMap::new();
    for fact in state.facts() {
        if let (Some(dir), [a, b]) = (Direction::from_predicate(&fact.name), fact.arguments.as_slice()) {
            exits.entry(b.name.clone()).or_default().insert(dir, a.name.clone());
        }
    }
    exits
}

fn step((x, y): (i32, i32), dir: Direction) -> (i32, i32) {
    let (dx, dy) = dir.offset();
    (x + dx, y + dy)
}

fn occupied(positions: &BTreeMap<String, (i32, i32)>, cell: (i32, i32)) -> bool {
    positions.values().any(|p| *p == cell)
}

/// A free cell to the east of everything laid out so far.
fn fresh_cell(positions: &BTreeMap<String, (i32, i32)>) -> (i32, i32) {
    match positions.values().map(|(x, _)| *x).max() {
        Some(x) => (x + 2, 0),
        None => (0, 0),
    }
}

/// Assign grid cells to rooms reachable from already placed ones, seeding the player's room
/// (or the first room) at the origin. Rooms whose cell would collide stay off-grid.
fn layout(state: &State, exits: &ExitMap, positions: &mut BTreeMap<String, (i32, i32)>) {
    let types = state.kb().types();
    let rooms: Vec<String> = state
        .variables()
        .filter(|v| types.is_descendant_of(&v.type_name, "r"))
        .map(|v| v.name.clone())
        .collect();
    if rooms.is_empty() {
        return;
    }
    if positions.is_empty() {
        let player_room = state
            .facts_named("at")
            .find(|f| f.arguments[0].type_name == "P")
            .map(|f| f.arguments[1].name.clone());
        let seed = player_room.unwrap_or_else(|| rooms[0].clone());
        positions.insert(seed, (0, 0));
    }

    let mut queue: VecDeque<String> = positions.keys().cloned().collect();
    while let Some(id) = queue.pop_front() {
        let Some(&origin) = positions.get(&id) else { continue };
        let Some(neighbours) = exits.get(&id) else { continue };
        for (dir, other) in neighbours {
            if positions.contains_key(other) {
                continue;
            }
            let cell = step(origin, *dir);
            if !occupied(positions, cell) {
                positions.insert(other.clone(), cell);
                queue.push_back(other.clone());
            }
        }
    }
}

/// Pick the exit of `a` leading to `b`.
fn choose_direction(
    exits: &ExitMap,
    positions: &mut BTreeMap<String, (i32, i32)>,
    a: &str,
    b: &str,
) -> EngineResult<Direction> {
    let exit_free = |room: &str, dir: Direction| exits.get(room).is_none_or(|e| !e.contains_key(&dir));
    let pair_free = |dir: Direction| exit_free(a, dir) && exit_free(b, dir.opposite());

    if !positions.contains_key(a) {
        if let Some(&pb) = positions.get(b) {
            for dir in Direction::ALL {
                let cell = step(pb, dir.opposite());
                if pair_free(dir) && !occupied(positions, cell) {
                    positions.insert(a.to_string(), cell);
                    return Ok(dir);
                }
            }
        } else {
            let cell = fresh_cell(positions);
            positions.insert(a.to_string(), cell);
        }
    }

    if let Some(&pa) = positions.get(a) {
        for dir in Direction::ALL {
            if !pair_free(dir) {
                continue;
            }
            let cell = step(pa, dir);
            match positions.get(b) {
                Some(&pb) if pb == cell => return Ok(dir),
                Some(_) => {},
                None if !occupied(positions, cell) => {
                    positions.insert(b.to_string(), cell);
                    return Ok(dir);
                },
                None => {},
            }
        }
    }

    Direction::ALL
        .into_iter()
        .find(|dir| pair_free(*dir))
        .ok_or_else(|| EngineError::NoFreeExit {
            room: a.to_string(),
            target: b.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn v(name: &str, ty: &str) -> Variable {
        Variable::new(name, ty)
    }

    fn fact(name: &str, args: &[(&str, &str)]) -> Proposition {
        Proposition::new(name, args.iter().map(|(n, t)| v(n, t)).collect())
    }

    /// Bedroom west of the kitchen, joined by an open door; chest in the kitchen.
    fn two_rooms() -> Vec<Proposition> {
        vec![
            fact("at", &[("P", "P"), ("bedroom", "r")]),
            fact("east_of", &[("kitchen", "r"), ("bedroom", "r")]),
            fact("west_of", &[("bedroom", "r"), ("kitchen", "r")]),
            fact("link", &[("bedroom", "r"), ("door", "d"), ("kitchen", "r")]),
            fact("link", &[("kitchen", "r"), ("door", "d"), ("bedroom", "r")]),
            fact("open", &[("door", "d")]),
            fact("free", &[("bedroom", "r"), ("kitchen", "r")]),
            fact("free", &[("kitchen", "r"), ("bedroom", "r")]),
            fact("at", &[("chest", "c"), ("kitchen", "r")]),
            fact("closed", &[("chest", "c")]),
            fact("in", &[("coin", "o"), ("chest", "c")]),
            fact("in", &[("carrot", "f"), ("I", "I")]),
        ]
    }

    #[test]
    fn facts_round_trip_through_world() {
        let facts = two_rooms();
        let world = World::from_facts(KnowledgeBase::builtin(), facts.clone()).unwrap();
        let expected: BTreeSet<Proposition> = facts.into_iter().collect();
        let actual: BTreeSet<Proposition> = world.facts().into_iter().collect();
        assert_eq!(actual, expected);
        world.check_invariants().unwrap();
    }

    #[test]
    fn one_directional_facts_gain_their_reverse() {
        let one_way = vec![
            fact("at", &[("P", "P"), ("bedroom", "r")]),
            fact("east_of", &[("kitchen", "r"), ("bedroom", "r")]),
            fact("link", &[("bedroom", "r"), ("door", "d"), ("kitchen", "r")]),
            fact("open", &[("door", "d")]),
            fact("free", &[("bedroom", "r"), ("kitchen", "r")]),
        ];
        let world = World::from_facts(KnowledgeBase::builtin(), one_way.clone()).unwrap();
        let actual: BTreeSet<Proposition> = world.facts().into_iter().collect();
        let mut expected: BTreeSet<Proposition> = one_way.into_iter().collect();
        expected.extend([
            fact("west_of", &[("bedroom", "r"), ("kitchen", "r")]),
            fact("link", &[("kitchen", "r"), ("door", "d"), ("bedroom", "r")]),
            fact("free", &[("kitchen", "r"), ("bedroom", "r")]),
        ]);
        assert_eq!(actual, expected);

        let again = World::from_facts(KnowledgeBase::builtin(), actual.iter().cloned()).unwrap();
        let completed: BTreeSet<Proposition> = again.facts().into_iter().collect();
        assert_eq!(completed, actual);
    }

    #[test]
    fn derived_graph_matches_facts() {
        let world = World::from_facts(KnowledgeBase::builtin(), two_rooms()).unwrap();
        let bedroom = world.room("bedroom").unwrap();
        assert_eq!(bedroom.exits.get(&Direction::East).map(String::as_str), Some("kitchen"));
        assert_eq!(bedroom.doors.get(&Direction::East).map(String::as_str), Some("door"));
        assert_eq!(world.player_room().map(WorldRoom::id), Some("bedroom"));
        assert_eq!(world.room("kitchen").unwrap().position, Some((1, 0)));
        assert_eq!(world.entity("coin").unwrap().location, Location::In("chest".into()));
        assert!(!world.entity("coin").unwrap().location.is_nowhere());
        assert!(Location::default().is_nowhere());
        assert_eq!(world.inventory().len(), 1);
    }

    #[test]
    fn closed_containers_hide_their_contents() {
        let mut world = World::from_facts(KnowledgeBase::builtin(), two_rooms()).unwrap();
        let ids = |w: &World| -> Vec<String> {
            w.get_visible_objects_in("kitchen")
                .iter()
                .map(|e| e.id().to_string())
                .collect()
        };
        assert_eq!(ids(&world), vec!["chest"]);

        let mut facts = world.facts();
        facts.retain(|f| f.name != "closed");
        facts.push(fact("open", &[("chest", "c")]));
        world = World::from_facts(KnowledgeBase::builtin(), facts).unwrap();
        assert_eq!(ids(&world), vec!["chest", "coin"]);
    }

    #[test]
    fn links_without_directions_take_the_first_free_exit() {
        let mut world = World::from_facts(
            KnowledgeBase::builtin(),
            vec![
                fact("at", &[("P", "P"), ("hall", "r")]),
                fact("free", &[("hall", "r"), ("attic", "r")]),
            ],
        )
        .unwrap();
        assert!(world.state().contains(&fact("north_of", &[("attic", "r"), ("hall", "r")])));
        assert!(world.state().contains(&fact("south_of", &[("hall", "r"), ("attic", "r")])));
        assert!(world.state().contains(&fact("free", &[("attic", "r"), ("hall", "r")])));

        world
            .add_facts(vec![
                fact("link", &[("hall", "r"), ("gate", "d"), ("yard", "r")]),
                fact("locked", &[("gate", "d")]),
            ])
            .unwrap();
        assert_eq!(world.room("hall").unwrap().exit_towards("yard"), Some(Direction::South));
        assert!(world.state().contains(&fact("link", &[("yard", "r"), ("gate", "d"), ("hall", "r")])));
        world.check_invariants().unwrap();
    }

    #[test]
    fn occupied_cells_force_a_relaxed_direction() {
        // cellar sits where a northern neighbour of the study would go
        let mut world = World::from_facts(
            KnowledgeBase::builtin(),
            vec![
                fact("at", &[("P", "P"), ("hall", "r")]),
                fact("north_of", &[("attic", "r"), ("hall", "r")]),
                fact("east_of", &[("study", "r"), ("hall", "r")]),
                fact("east_of", &[("cellar", "r"), ("attic", "r")]),
            ],
        )
        .unwrap();
        assert_eq!(world.room("cellar").unwrap().position, Some((1, 1)));
        world
            .add_facts(vec![fact("free", &[("study", "r"), ("garden", "r")])])
            .unwrap();
        // north is taken on the grid, so the garden goes south
        assert_eq!(world.room("study").unwrap().exit_towards("garden"), Some(Direction::South));
    }

    #[test]
    fn no_free_exit_is_reported_and_world_unchanged() {
        let mut facts = vec![fact("at", &[("P", "P"), ("hub", "r")])];
        for (i, dir) in Direction::ALL.into_iter().enumerate() {
            let name = format!("spoke{i}");
            facts.push(Proposition::new(dir.predicate(), vec![v(&name, "r"), v("hub", "r")]));
        }
        let mut world = World::from_facts(KnowledgeBase::builtin(), facts).unwrap();
        let before = world.facts();
        let err = world
            .add_facts(vec![fact("free", &[("hub", "r"), ("extra", "r")])])
            .unwrap_err();
        assert!(matches!(err, EngineError::NoFreeExit { ref room, .. } if room == "hub"));
        assert_eq!(world.facts(), before);
    }

    #[test]
    fn populate_gives_keys_first_and_keeps_invariants() {
        let mut world = World::from_facts(KnowledgeBase::builtin(), two_rooms()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let added = world.populate(8, &mut rng, None).unwrap();
        assert!(added.contains(&fact("match", &[("k_0", "k"), ("chest", "c")])));
        world.check_invariants().unwrap();
        assert!(world.entities().count() >= 8);
    }

    #[test]
    fn populate_is_deterministic() {
        let run = || {
            let mut world = World::from_facts(KnowledgeBase::builtin(), two_rooms()).unwrap();
            let mut rng = StdRng::seed_from_u64(3);
            world.populate(6, &mut rng, None).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn invariants_catch_missing_container_state() {
        let mut facts = two_rooms();
        facts.retain(|f| f.name != "closed");
        let world = World::from_facts(KnowledgeBase::builtin(), facts).unwrap();
        let err = world.check_invariants().unwrap_err();
        assert!(err.to_string().contains("chest"));
    }
}
