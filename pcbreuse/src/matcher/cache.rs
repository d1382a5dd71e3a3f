//! Placement arena and the per-session placement cache.
//!
//! Every placement lives once in the [`MatchArena`] and is referred to by
//! [`MatchId`]. The [`MatchCache`] keeps, per footprint, the full placement
//! list and its projections onto a connection (`<c>`) or onto a pin on a
//! connection (`<c>-pin-<pin>`). Full lists only depend on pad identity and
//! survive board mutations; projections depend on the connections map and are
//! dropped whenever the board revision moves.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;

use tracing::debug;

use super::{match_order, on_trace, ComponentMatch, ComponentMatcher};
use crate::board::Board;
use crate::core::MatchOptions;
use crate::footprint::Footprint;
use crate::geometry::Side;
use crate::ids::{ConnectionId, MatchId, PadId};

/// Footprint plus the pins allowed to dangle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FootprintKey {
    pub footprint: String,
    pub ignored_pins: Vec<String>,
}

impl FootprintKey {
    pub fn new(footprint: impl Into<String>, mut ignored_pins: Vec<String>) -> Self {
        ignored_pins.sort();
        ignored_pins.dedup();
        Self {
            footprint: footprint.into(),
            ignored_pins,
        }
    }

    pub fn full(footprint: impl Into<String>) -> Self {
        Self::new(footprint, Vec::new())
    }
}

impl fmt::Display for FootprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ignored_pins.is_empty() {
            write!(f, "{}", self.footprint)
        } else {
            write!(f, "{}[ignore {}]", self.footprint, self.ignored_pins.join(","))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CacheKey {
    Full,
    Trace(ConnectionId),
    Pin(ConnectionId, String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Full => write!(f, "full"),
            CacheKey::Trace(c) => write!(f, "{}", c),
            CacheKey::Pin(c, pin) => write!(f, "{}-pin-{}", c, pin),
        }
    }
}

type PlacementKey = (String, Side, Vec<(String, Vec<PadId>)>);

fn placement_key(m: &ComponentMatch) -> PlacementKey {
    (
        m.footprint.clone(),
        m.side,
        m.pin_pads.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    )
}

/// Owns every placement created during a session.
#[derive(Debug, Clone, Default)]
pub struct MatchArena {
    matches: Vec<ComponentMatch>,
    index: HashMap<PlacementKey, MatchId>,
}

impl MatchArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of an equal placement if one exists, else stores `m`.
    pub fn intern(&mut self, m: ComponentMatch) -> MatchId {
        let key = placement_key(&m);
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = MatchId::from_raw(self.matches.len() as u32);
        self.matches.push(m);
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: MatchId) -> Option<&ComponentMatch> {
        self.matches.get(id.index())
    }

    /// Recomputes every placement's connection annotations.
    pub fn refresh(&mut self, board: &Board) {
        for m in &mut self.matches {
            *m = m.update_traces(board);
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MatchId, &ComponentMatch)> + '_ {
        self.matches
            .iter()
            .enumerate()
            .map(|(i, m)| (MatchId::from_raw(i as u32), m))
    }
}

impl Index<MatchId> for MatchArena {
    type Output = ComponentMatch;

    fn index(&self, id: MatchId) -> &ComponentMatch {
        &self.matches[id.index()]
    }
}

/// `cm_data`: footprint key -> cache key -> placement ids.
#[derive(Debug, Clone, Default)]
pub struct MatchCache {
    entries: HashMap<FootprintKey, BTreeMap<CacheKey, Vec<MatchId>>>,
}

impl MatchCache {
    pub fn get(&self, footprint: &FootprintKey, key: &CacheKey) -> Option<&[MatchId]> {
        self.entries
            .get(footprint)
            .and_then(|e| e.get(key))
            .map(Vec::as_slice)
    }

    /// Existing lists are never replaced.
    pub fn insert(&mut self, footprint: &FootprintKey, key: CacheKey, ids: Vec<MatchId>) {
        self.entries
            .entry(footprint.clone())
            .or_default()
            .entry(key)
            .or_insert(ids);
    }

    pub fn drop_projections(&mut self) {
        for entry in self.entries.values_mut() {
            entry.retain(|k, _| *k == CacheKey::Full);
        }
    }

    /// Restores best-first order of the full lists once scores moved.
    pub fn resort_full(&mut self, arena: &MatchArena) {
        for entry in self.entries.values_mut() {
            if let Some(ids) = entry.get_mut(&CacheKey::Full) {
                ids.sort_by(|a, b| match_order(&arena[*a], &arena[*b]));
            }
        }
    }

    /// Rendered keys of one footprint, for diagnostics.
    pub fn keys(&self, footprint: &FootprintKey) -> Vec<String> {
        self.entries
            .get(footprint)
            .map(|e| e.keys().map(ToString::to_string).collect())
            .unwrap_or_default()
    }
}

/// Arena plus cache, kept in step with the board revision.
#[derive(Debug, Clone, Default)]
pub struct MatchStore {
    arena: MatchArena,
    cache: MatchCache,
    revision: u64,
    hits: usize,
    misses: usize,
}

impl MatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &MatchArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut MatchArena {
        &mut self.arena
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    pub fn intern(&mut self, m: ComponentMatch) -> MatchId {
        self.arena.intern(m)
    }

    /// `(hits, misses)` of cache lookups.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    /// Refreshes annotations and drops projections after a board mutation.
    pub fn sync(&mut self, board: &Board) {
        if board.revision() == self.revision {
            return;
        }
        self.arena.refresh(board);
        self.cache.drop_projections();
        self.cache.resort_full(&self.arena);
        self.revision = board.revision();
        debug!(revision = self.revision, placements = self.arena.len(), "match store refreshed");
    }

    /// Every placement of the footprint, best first.
    pub fn full(
        &mut self,
        board: &Board,
        options: &MatchOptions,
        footprint: &Footprint,
        key: &FootprintKey,
    ) -> Vec<MatchId> {
        self.sync(board);
        if let Some(ids) = self.cache.get(key, &CacheKey::Full) {
            self.hits += 1;
            return ids.to_vec();
        }
        self.misses += 1;
        let matcher = ComponentMatcher::new(footprint, board, options);
        let found = if key.ignored_pins.is_empty() {
            matcher.get_matches()
        } else {
            matcher.get_incomplete_matches(&key.ignored_pins)
        };
        let ids: Vec<MatchId> = found.into_iter().map(|m| self.arena.intern(m)).collect();
        self.cache.insert(key, CacheKey::Full, ids.clone());
        ids
    }

    /// Placements touching `connection` on any pin.
    pub fn on_trace(
        &mut self,
        board: &Board,
        options: &MatchOptions,
        footprint: &Footprint,
        key: &FootprintKey,
        connection: ConnectionId,
    ) -> Vec<MatchId> {
        let cache_key = CacheKey::Trace(connection);
        self.projection(board, options, footprint, key, cache_key, |m| {
            m.touched_connections.contains(&connection)
        })
    }

    /// Placements with `pin` on `connection`.
    pub fn on_pin(
        &mut self,
        board: &Board,
        options: &MatchOptions,
        footprint: &Footprint,
        key: &FootprintKey,
        connection: ConnectionId,
        pin: &str,
    ) -> Vec<MatchId> {
        let cache_key = CacheKey::Pin(connection, pin.to_string());
        let pins = [pin.to_string()];
        self.projection(board, options, footprint, key, cache_key, |m| on_trace(m, connection, &pins))
    }

    fn projection(
        &mut self,
        board: &Board,
        options: &MatchOptions,
        footprint: &Footprint,
        key: &FootprintKey,
        cache_key: CacheKey,
        keep: impl Fn(&ComponentMatch) -> bool,
    ) -> Vec<MatchId> {
        let full = self.full(board, options, footprint, key);
        if let Some(ids) = self.cache.get(key, &cache_key) {
            self.hits += 1;
            return ids.to_vec();
        }
        self.misses += 1;
        let ids: Vec<MatchId> = full.into_iter().filter(|id| keep(&self.arena[*id])).collect();
        self.cache.insert(key, cache_key, ids.clone());
        ids
    }
}
