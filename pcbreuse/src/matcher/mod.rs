//! Component Matcher
//!
//! Enumerates the placements of a footprint on the board. A placement is
//! found by anchoring one footprint pad on a board pad of the same size and
//! checking that every other pad's centre falls inside a free board pad of
//! matching size on the same side. Each placement carries the board pads it
//! occupies per pin and the connections those pads touch.

pub mod cache;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::board::{Board, Pad};
use crate::core::MatchOptions;
use crate::footprint::{Footprint, FootprintPad};
use crate::geometry::{Placement, Point, Polygon, Rotation, Side};
use crate::ids::{ConnectionId, PadId};

pub use cache::{CacheKey, FootprintKey, MatchArena, MatchCache, MatchStore};

/// Candidate placement of one footprint on the board.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentMatch {
    pub footprint: String,
    pub x: f64,
    pub y: f64,
    pub rotation: Rotation,
    pub side: Side,
    /// Board pads under each pin. Empty for a dangling (ignored) pin.
    pub pin_pads: BTreeMap<String, Vec<PadId>>,
    pub pin_connections: BTreeMap<String, Vec<ConnectionId>>,
    pub touched_connections: BTreeSet<ConnectionId>,
    /// Footprint contours in board coordinates, for overlays.
    pub fp_contours: Vec<Polygon>,
}

impl ComponentMatch {
    pub fn placement(&self) -> Placement {
        Placement::new(Point::new(self.x, self.y), self.rotation, self.side)
    }

    pub fn pads(&self) -> impl Iterator<Item = PadId> + '_ {
        self.pin_pads.values().flatten().copied()
    }

    pub fn pads_of(&self, pin: &str) -> &[PadId] {
        self.pin_pads.get(pin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn connections_of(&self, pin: &str) -> &[ConnectionId] {
        self.pin_connections.get(pin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pin_on_connection(&self, pin: &str, connection: ConnectionId) -> bool {
        self.connections_of(pin).contains(&connection)
    }

    /// Number of distinct connections the placement touches.
    pub fn score(&self) -> usize {
        self.touched_connections.len()
    }

    /// Same footprint on the same pads.
    pub fn same_placement(&self, other: &ComponentMatch) -> bool {
        self.footprint == other.footprint && self.side == other.side && self.pin_pads == other.pin_pads
    }

    /// Connection annotations recomputed from the (unchanged) pad ids.
    pub fn update_traces(&self, board: &Board) -> ComponentMatch {
        let mut pin_connections = BTreeMap::new();
        let mut touched = BTreeSet::new();
        for (pin, pads) in &self.pin_pads {
            let conns = board.connections_of_pads(pads);
            touched.extend(conns.iter().copied());
            pin_connections.insert(pin.clone(), conns.into_iter().collect());
        }
        ComponentMatch {
            pin_connections,
            touched_connections: touched,
            ..self.clone()
        }
    }
}

/// Orders by score (descending), then x, then y.
pub fn sort_matches(matches: &mut [ComponentMatch]) {
    matches.sort_by(match_order);
}

pub fn match_order(a: &ComponentMatch, b: &ComponentMatch) -> Ordering {
    b.score()
        .cmp(&a.score())
        .then_with(|| a.x.total_cmp(&b.x))
        .then_with(|| a.y.total_cmp(&b.y))
}

/// Whether one of `pins` sits on `connection`.
pub fn on_trace(m: &ComponentMatch, connection: ConnectionId, pins: &[String]) -> bool {
    pins.iter().any(|pin| m.pin_on_connection(pin, connection))
}

/// Keeps matches where one of `pins` sits on `connection`.
pub fn filter_for_matches_on_trace(
    matches: &[ComponentMatch],
    connection: ConnectionId,
    pins: &[String],
) -> Vec<ComponentMatch> {
    matches
        .iter()
        .filter(|m| on_trace(m, connection, pins))
        .cloned()
        .collect()
}

/// Drops matches touching any of `connections`.
pub fn filter_out_traces(matches: &[ComponentMatch], connections: &BTreeSet<ConnectionId>) -> Vec<ComponentMatch> {
    matches
        .iter()
        .filter(|m| m.touched_connections.is_disjoint(connections))
        .cloned()
        .collect()
}

/// Drops matches occupying any of `pads`.
pub fn filter_out_pads(matches: &[ComponentMatch], pads: &BTreeSet<PadId>) -> Vec<ComponentMatch> {
    matches
        .iter()
        .filter(|m| !m.pads().any(|p| pads.contains(&p)))
        .cloned()
        .collect()
}

/// Placement enumerator for one footprint on one board.
pub struct ComponentMatcher<'a> {
    footprint: &'a Footprint,
    board: &'a Board,
    options: &'a MatchOptions,
    ignored_pads: BTreeSet<PadId>,
}

impl<'a> ComponentMatcher<'a> {
    pub fn new(footprint: &'a Footprint, board: &'a Board, options: &'a MatchOptions) -> Self {
        Self {
            footprint,
            board,
            options,
            ignored_pads: BTreeSet::new(),
        }
    }

    /// Board pads that must never be occupied.
    pub fn with_ignored_pads(mut self, pads: impl IntoIterator<Item = PadId>) -> Self {
        self.ignored_pads.extend(pads);
        self
    }

    /// All valid placements, sorted.
    pub fn get_matches(&self) -> Vec<ComponentMatch> {
        self.enumerate(&BTreeSet::new())
    }

    /// Placements where `ignored_pins` may have no board pad beneath them.
    pub fn get_incomplete_matches(&self, ignored_pins: &[String]) -> Vec<ComponentMatch> {
        let ignored: BTreeSet<&str> = ignored_pins.iter().map(String::as_str).collect();
        self.enumerate(&ignored)
    }

    /// Returns `(on one of pins, on any pin, all)` for `connection`.
    pub fn get_matches_on_trace(
        &self,
        connection: ConnectionId,
        pins: &[String],
    ) -> (Vec<ComponentMatch>, Vec<ComponentMatch>, Vec<ComponentMatch>) {
        let full = self.get_matches();
        let on_pin = filter_for_matches_on_trace(&full, connection, pins);
        let on_any = full
            .iter()
            .filter(|m| m.touched_connections.contains(&connection))
            .cloned()
            .collect();
        (on_pin, on_any, full)
    }

    fn sides(&self) -> Vec<Side> {
        if self.options.allow_back_side && self.board.has_back() {
            vec![Side::Front, Side::Back]
        } else {
            vec![Side::Front]
        }
    }

    fn enumerate(&self, ignored_pins: &BTreeSet<&str>) -> Vec<ComponentMatch> {
        let Some(anchor) = self
            .footprint
            .pins
            .iter()
            .filter(|p| !ignored_pins.contains(p.name.as_str()))
            .find_map(|p| p.pads.first())
        else {
            return Vec::new();
        };

        let mut seen: HashSet<(Side, Vec<(String, Vec<PadId>)>)> = HashSet::new();
        let mut matches = Vec::new();
        for side in self.sides() {
            for &rotation in &self.options.rotations {
                let orient = Placement::new(Point::new(0.0, 0.0), rotation, side);
                let anchor_shape = anchor.shape.placed(&orient);
                let anchor_size = size_of(&anchor_shape);
                let anchor_centre = anchor_shape.centroid();

                for board_pad in self.board.pads_on(side) {
                    if self.ignored_pads.contains(&board_pad.id)
                        || !self.options.pad_sizes_match(anchor_size, (board_pad.width(), board_pad.height()))
                    {
                        continue;
                    }
                    let origin = Point::new(
                        board_pad.centroid.x - anchor_centre.x,
                        board_pad.centroid.y - anchor_centre.y,
                    );
                    let placement = Placement::new(origin, rotation, side);
                    let Some(m) = self.try_place(&placement, ignored_pins) else {
                        continue;
                    };
                    let key = (
                        m.side,
                        m.pin_pads.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    );
                    if seen.insert(key) {
                        matches.push(m);
                    }
                }
            }
        }
        sort_matches(&mut matches);
        debug!(
            footprint = %self.footprint.id(),
            placements = matches.len(),
            "component matches enumerated"
        );
        matches
    }

    fn try_place(&self, placement: &Placement, ignored_pins: &BTreeSet<&str>) -> Option<ComponentMatch> {
        let mut claimed: BTreeSet<PadId> = BTreeSet::new();
        let mut pin_pads = BTreeMap::new();
        for pin in &self.footprint.pins {
            let dangling_ok = ignored_pins.contains(pin.name.as_str());
            let mut pads = Vec::new();
            for fp_pad in &pin.pads {
                match self.claim(fp_pad, placement, &claimed) {
                    Some(found) => {
                        for id in found {
                            claimed.insert(id);
                            pads.push(id);
                        }
                    }
                    None if dangling_ok => {}
                    None => return None,
                }
            }
            pads.sort();
            pin_pads.insert(pin.name.clone(), pads);
        }

        let contours = self
            .footprint
            .contours()
            .into_iter()
            .map(|c| c.placed(placement))
            .collect();
        let m = ComponentMatch {
            footprint: self.footprint.id(),
            x: placement.origin.x,
            y: placement.origin.y,
            rotation: placement.rotation,
            side: placement.side,
            pin_pads,
            pin_connections: BTreeMap::new(),
            touched_connections: BTreeSet::new(),
            fp_contours: contours,
        };
        Some(m.update_traces(self.board))
    }

    /// Board pads taken by one footprint pad: the pad on the placement side,
    /// plus the opposite-side pad at the same spot for through-hole pads.
    fn claim(&self, fp_pad: &FootprintPad, placement: &Placement, claimed: &BTreeSet<PadId>) -> Option<Vec<PadId>> {
        let shape = fp_pad.shape.placed(placement);
        let centre = shape.centroid();
        let size = size_of(&shape);

        let free = |p: &&Pad| !claimed.contains(&p.id) && !self.ignored_pads.contains(&p.id);
        let main = self
            .board
            .pads_on(placement.side)
            .filter(free)
            .find(|p| p.polygon.contains(&centre) && self.options.pad_sizes_match(size, (p.width(), p.height())))?;

        let mut found = vec![main.id];
        if fp_pad.through_hole && self.board.has_back() {
            if let Some(twin) = self
                .board
                .pads_on(placement.side.opposite())
                .filter(free)
                .find(|p| p.polygon.contains(&centre))
            {
                found.push(twin.id);
            }
        }
        Some(found)
    }
}

fn size_of(shape: &Polygon) -> (f64, f64) {
    let b = shape.bbox();
    (b.width(), b.height())
}
