//! Board Model
//!
//! Owns the board geometry (pads, traces, drills on both sides) and the
//! derived [`ConnectionMap`]. The only mutation is [`Board::integrate_trace_cuts`];
//! search branches that cut copper take a [`BoardSnapshot`] first and
//! [`Board::restore`] it when they back out.
//!
//! Snapshots are cheap: traces are shared through `Arc` and only the
//! connection partition and the trace table are copied.

pub mod connections;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

pub use connections::{Connection, ConnectionMap};

use crate::core::PcbReuseError;
use crate::geometry::{BBox, Point, Polygon, Region, Side, CUT_MARGIN};
use crate::ids::{ConnectionId, PadId, TraceId, ViaId};

/// Solderable pad. Immutable once the board is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Pad {
    pub id: PadId,
    pub side: Side,
    pub polygon: Polygon,
    pub centroid: Point,
    pub bbox: BBox,
}

impl Pad {
    pub fn width(&self) -> f64 {
        self.bbox.width()
    }

    pub fn height(&self) -> f64 {
        self.bbox.height()
    }
}

/// Copper trace on one side.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub id: TraceId,
    pub side: Side,
    pub region: Region,
}

/// Drilled hole; only through-holes bridge the two sides.
#[derive(Debug, Clone, PartialEq)]
pub struct Via {
    pub id: ViaId,
    pub centroid: Point,
    pub is_through_hole: bool,
}

/// Drill file entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_through_hole")]
    pub through_hole: bool,
}

fn default_through_hole() -> bool {
    true
}

/// Raw board geometry as delivered by a PCB reader.
///
/// Pad ids are assigned front pads first, then back pads, in list order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardGeometry {
    #[serde(default)]
    pub front_pads: Vec<Polygon>,
    #[serde(default)]
    pub back_pads: Vec<Polygon>,
    #[serde(default)]
    pub front_traces: Vec<Region>,
    #[serde(default)]
    pub back_traces: Vec<Region>,
    #[serde(default)]
    pub drills: Vec<Drill>,
    /// Whether a back side was rendered; inferred from the data when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_back: Option<bool>,
}

impl BoardGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pad(mut self, side: Side, polygon: Polygon) -> Self {
        match side {
            Side::Front => self.front_pads.push(polygon),
            Side::Back => self.back_pads.push(polygon),
        }
        self
    }

    pub fn with_trace(mut self, side: Side, region: Region) -> Self {
        match side {
            Side::Front => self.front_traces.push(region),
            Side::Back => self.back_traces.push(region),
        }
        self
    }

    pub fn with_drill(mut self, x: f64, y: f64, through_hole: bool) -> Self {
        self.drills.push(Drill { x, y, through_hole });
        self
    }
}

/// Polygonal regions to remove from the copper, per side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceCuts {
    #[serde(rename = "front_cuts", default)]
    pub front: Vec<Polygon>,
    #[serde(rename = "back_cuts", default)]
    pub back: Vec<Polygon>,
}

impl TraceCuts {
    pub fn is_empty(&self) -> bool {
        self.front.is_empty() && self.back.is_empty()
    }

    pub fn on(&self, side: Side) -> &[Polygon] {
        match side {
            Side::Front => &self.front,
            Side::Back => &self.back,
        }
    }

    pub fn push(&mut self, side: Side, polygon: Polygon) {
        match side {
            Side::Front => self.front.push(polygon),
            Side::Back => self.back.push(polygon),
        }
    }

    pub fn extend(&mut self, other: &TraceCuts) {
        self.front.extend(other.front.iter().cloned());
        self.back.extend(other.back.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.front.len() + self.back.len()
    }
}

/// Opaque copy of the mutable board state.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    traces: BTreeMap<TraceId, Arc<Trace>>,
    next_trace: u32,
    connections: Arc<ConnectionMap>,
}

/// Physical board: geometry plus the connections map.
#[derive(Debug, Clone)]
pub struct Board {
    pads: Arc<Vec<Pad>>,
    vias: Arc<Vec<Via>>,
    traces: BTreeMap<TraceId, Arc<Trace>>,
    next_trace: u32,
    connections: Arc<ConnectionMap>,
    has_back: bool,
    revision: u64,
    original: BoardSnapshot,
}

impl Board {
    pub fn new(geometry: BoardGeometry) -> Result<Self, PcbReuseError> {
        let inferred_back = !geometry.back_pads.is_empty() || !geometry.back_traces.is_empty();
        let has_back = geometry.has_back.unwrap_or(inferred_back);
        if !has_back && inferred_back {
            return Err(PcbReuseError::MalformedInput(
                "back-side copper given for a single-sided board".to_string(),
            ));
        }

        let mut pads = Vec::with_capacity(geometry.front_pads.len() + geometry.back_pads.len());
        let sided_pads = geometry
            .front_pads
            .into_iter()
            .map(|p| (Side::Front, p))
            .chain(geometry.back_pads.into_iter().map(|p| (Side::Back, p)));
        for (side, polygon) in sided_pads {
            check_polygon(&polygon, "pad")?;
            let id = PadId::from_raw(pads.len() as u32);
            pads.push(Pad {
                id,
                side,
                centroid: polygon.centroid(),
                bbox: polygon.bbox(),
                polygon,
            });
        }

        let mut traces = BTreeMap::new();
        let mut next_trace = 0u32;
        let sided_traces = geometry
            .front_traces
            .into_iter()
            .map(|r| (Side::Front, r))
            .chain(geometry.back_traces.into_iter().map(|r| (Side::Back, r)));
        for (side, region) in sided_traces {
            check_polygon(&region.outer, "trace")?;
            for hole in &region.holes {
                check_polygon(hole, "trace hole")?;
            }
            let id = TraceId::from_raw(next_trace);
            next_trace += 1;
            traces.insert(id, Arc::new(Trace { id, side, region }));
        }

        let vias: Vec<Via> = geometry
            .drills
            .iter()
            .enumerate()
            .map(|(i, d)| Via {
                id: ViaId::from_raw(i as u32),
                centroid: Point::new(d.x, d.y),
                is_through_hole: d.through_hole,
            })
            .collect();

        for via in vias.iter().filter(|v| v.is_through_hole) {
            let on_trace = traces.values().any(|t| t.region.contains(&via.centroid));
            let on_pad = pads.iter().any(|p| p.polygon.contains(&via.centroid));
            if !on_trace && !on_pad {
                return Err(PcbReuseError::MalformedInput(format!(
                    "through-hole at ({}, {}) lies on no trace and no pad",
                    via.centroid.x, via.centroid.y
                )));
            }
        }

        let connections = Arc::new(ConnectionMap::build(&pads, &traces, &vias));
        debug!(
            pads = pads.len(),
            traces = traces.len(),
            vias = vias.len(),
            connections = connections.len(),
            "board loaded"
        );

        let original = BoardSnapshot {
            traces: traces.clone(),
            next_trace,
            connections: Arc::clone(&connections),
        };

        Ok(Self {
            pads: Arc::new(pads),
            vias: Arc::new(vias),
            traces,
            next_trace,
            connections,
            has_back,
            revision: 0,
            original,
        })
    }

    pub fn has_back(&self) -> bool {
        self.has_back
    }

    /// Bumped by every mutation, restores included.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn pad(&self, id: PadId) -> &Pad {
        &self.pads[id.index()]
    }

    pub fn pads_on(&self, side: Side) -> impl Iterator<Item = &Pad> + '_ {
        self.pads.iter().filter(move |p| p.side == side)
    }

    pub fn vias(&self) -> &[Via] {
        &self.vias
    }

    pub fn traces(&self) -> impl Iterator<Item = &Trace> + '_ {
        self.traces.values().map(|t| t.as_ref())
    }

    pub fn trace(&self, id: TraceId) -> Option<&Trace> {
        self.traces.get(&id).map(|t| t.as_ref())
    }

    pub fn connections(&self) -> &[Connection] {
        self.connections.connections()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_of_pad(&self, pad: PadId) -> ConnectionId {
        self.connections.of_pad(pad)
    }

    pub fn connection_of_trace(&self, trace: TraceId) -> Option<ConnectionId> {
        self.connections.of_trace(trace)
    }

    /// Distinct connections under the given pads.
    pub fn connections_of_pads(&self, pads: &[PadId]) -> BTreeSet<ConnectionId> {
        pads.iter().map(|p| self.connection_of_pad(*p)).collect()
    }

    /// Number of distinct pads across the named connections.
    pub fn pads_on_connections(&self, ids: &[ConnectionId]) -> usize {
        let pads: BTreeSet<PadId> = ids
            .iter()
            .filter_map(|id| self.connection(*id))
            .flat_map(|c| c.pads())
            .collect();
        pads.len()
    }

    /// Through-holes drilled inside the pad.
    pub fn through_holes_in(&self, pad: PadId) -> impl Iterator<Item = &Via> + '_ {
        let polygon = &self.pads[pad.index()].polygon;
        self.vias
            .iter()
            .filter(move |v| v.is_through_hole && polygon.contains(&v.centroid))
    }

    /// Traces of `connection` on `side` that share copper with the pad.
    pub fn traces_under_pad(&self, pad: PadId, connection: ConnectionId) -> Vec<&Trace> {
        let pad = self.pad(pad);
        let Some(conn) = self.connection(connection) else {
            return Vec::new();
        };
        conn.traces_on(pad.side)
            .iter()
            .filter_map(|id| self.trace(*id))
            .filter(|t| t.region.touches(&pad.polygon))
            .collect()
    }

    /// Subtracts every cut from the traces of its side and rebuilds the
    /// connections map. Returns the number of traces that were replaced.
    pub fn integrate_trace_cuts(&mut self, cuts: &TraceCuts) -> usize {
        let mut replaced = 0;
        for side in [Side::Front, Side::Back] {
            for cut in cuts.on(side) {
                let grown = cut.grown(CUT_MARGIN);
                let cut_bbox = grown.bbox();
                let hit: Vec<TraceId> = self
                    .traces
                    .values()
                    .filter(|t| t.side == side && t.region.bbox().overlaps(&cut_bbox))
                    .map(|t| t.id)
                    .collect();
                for id in hit {
                    let Some(trace) = self.traces.get(&id).cloned() else {
                        continue;
                    };
                    let pieces = trace.region.subtract(&grown);
                    if pieces.len() == 1 && pieces[0] == trace.region {
                        continue;
                    }
                    self.traces.remove(&id);
                    replaced += 1;
                    for region in pieces {
                        let new_id = TraceId::from_raw(self.next_trace);
                        self.next_trace += 1;
                        self.traces.insert(new_id, Arc::new(Trace { id: new_id, side, region }));
                    }
                }
            }
        }
        self.connections = Arc::new(ConnectionMap::build(&self.pads, &self.traces, &self.vias));
        self.revision += 1;
        debug!(
            cuts = cuts.len(),
            replaced,
            connections = self.connections.len(),
            "trace cuts integrated"
        );
        replaced
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            traces: self.traces.clone(),
            next_trace: self.next_trace,
            connections: Arc::clone(&self.connections),
        }
    }

    pub fn restore(&mut self, snapshot: BoardSnapshot) {
        self.traces = snapshot.traces;
        self.next_trace = snapshot.next_trace;
        self.connections = snapshot.connections;
        self.revision += 1;
    }

    /// Back to the as-loaded copper, before any cut.
    pub fn revert_original(&mut self) {
        let original = self.original.clone();
        self.restore(original);
    }

    /// Whether any cut is currently applied.
    pub fn is_modified(&self) -> bool {
        !Arc::ptr_eq(&self.connections, &self.original.connections)
    }
}

fn check_polygon(polygon: &Polygon, what: &str) -> Result<(), PcbReuseError> {
    if polygon.len() < 3 {
        return Err(PcbReuseError::MalformedInput(format!(
            "{} polygon has {} points",
            what,
            polygon.len()
        )));
    }
    if polygon.area() <= f64::EPSILON {
        return Err(PcbReuseError::MalformedInput(format!("{} polygon has zero area", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(cx: f64, cy: f64, w: f64, h: f64) -> Region {
        Region::new(Polygon::rect(cx, cy, w, h), Vec::new())
    }

    /// Three pads on one horizontal trace plus a lone pad.
    fn sample_board() -> Board {
        let geometry = BoardGeometry::new()
            .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(4.0, 0.0, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(8.0, 0.0, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(0.0, 10.0, 1.0, 1.0))
            .with_trace(Side::Front, strip(4.0, 0.0, 9.0, 0.6));
        Board::new(geometry).unwrap()
    }

    #[test]
    fn test_pads_on_same_trace_share_connection() {
        let board = sample_board();
        let c0 = board.connection_of_pad(PadId::from_raw(0));
        assert_eq!(c0, board.connection_of_pad(PadId::from_raw(1)));
        assert_eq!(c0, board.connection_of_pad(PadId::from_raw(2)));
        assert_ne!(c0, board.connection_of_pad(PadId::from_raw(3)));
        assert_eq!(board.connections().len(), 2);
        assert_eq!(board.pads_on_connections(&[c0]), 3);
    }

    #[test]
    fn test_connection_ids_follow_traces_first() {
        let board = sample_board();
        assert_eq!(board.connection_of_pad(PadId::from_raw(0)), ConnectionId::from_raw(0));
        assert_eq!(board.connection_of_pad(PadId::from_raw(3)), ConnectionId::from_raw(1));
    }

    #[test]
    fn test_cut_splits_connection_and_restore_undoes_it() {
        let mut board = sample_board();
        let before = board.snapshot();
        let revision = board.revision();

        let mut cuts = TraceCuts::default();
        cuts.push(Side::Front, Polygon::rect(4.0, 0.0, 1.6, 2.0));
        assert_eq!(board.integrate_trace_cuts(&cuts), 1);
        assert!(board.revision() > revision);
        assert!(board.is_modified());

        let left = board.connection_of_pad(PadId::from_raw(0));
        let middle = board.connection_of_pad(PadId::from_raw(1));
        let right = board.connection_of_pad(PadId::from_raw(2));
        assert_ne!(left, middle);
        assert_ne!(left, right);
        assert_ne!(middle, right);

        board.restore(before);
        assert_eq!(
            board.connection_of_pad(PadId::from_raw(0)),
            board.connection_of_pad(PadId::from_raw(2))
        );
    }

    #[test]
    fn test_revert_original_after_two_cuts() {
        let mut board = sample_board();
        let mut first = TraceCuts::default();
        first.push(Side::Front, Polygon::rect(2.0, 0.0, 0.5, 2.0));
        board.integrate_trace_cuts(&first);
        let mut second = TraceCuts::default();
        second.push(Side::Front, Polygon::rect(6.0, 0.0, 0.5, 2.0));
        board.integrate_trace_cuts(&second);
        assert_eq!(board.connections().len(), 4);

        board.revert_original();
        assert!(!board.is_modified());
        assert_eq!(board.connections().len(), 2);
    }

    #[test]
    fn test_through_hole_joins_sides() {
        let geometry = BoardGeometry::new()
            .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.5, 1.5))
            .with_pad(Side::Back, Polygon::rect(0.0, 0.0, 1.5, 1.5))
            .with_pad(Side::Back, Polygon::rect(5.0, 0.0, 1.0, 1.0))
            .with_trace(Side::Back, strip(2.5, 0.0, 6.0, 0.6))
            .with_drill(0.0, 0.0, true);
        let board = Board::new(geometry).unwrap();
        let front = board.connection_of_pad(PadId::from_raw(0));
        assert_eq!(front, board.connection_of_pad(PadId::from_raw(1)));
        assert_eq!(front, board.connection_of_pad(PadId::from_raw(2)));
        let conn = board.connection(front).unwrap();
        assert_eq!(conn.vias.len(), 1);
        assert_eq!(board.through_holes_in(PadId::from_raw(0)).count(), 1);
    }

    #[test]
    fn test_plated_hole_off_copper_is_malformed() {
        let geometry = BoardGeometry::new()
            .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
            .with_drill(20.0, 20.0, true);
        let err = Board::new(geometry).unwrap_err();
        assert!(matches!(err, PcbReuseError::MalformedInput(_)));
    }

    #[test]
    fn test_unplated_hole_does_not_bridge() {
        let geometry = BoardGeometry::new()
            .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.5, 1.5))
            .with_pad(Side::Back, Polygon::rect(0.0, 0.0, 1.5, 1.5))
            .with_drill(0.0, 0.0, false);
        let board = Board::new(geometry).unwrap();
        assert_ne!(
            board.connection_of_pad(PadId::from_raw(0)),
            board.connection_of_pad(PadId::from_raw(1))
        );
    }

    #[test]
    fn test_degenerate_pad_rejected() {
        let geometry = BoardGeometry::new().with_pad(
            Side::Front,
            Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]),
        );
        assert!(Board::new(geometry).is_err());
    }

    #[test]
    fn test_back_copper_on_single_sided_board_rejected() {
        let mut geometry = BoardGeometry::new().with_pad(Side::Back, Polygon::rect(0.0, 0.0, 1.0, 1.0));
        geometry.has_back = Some(false);
        assert!(Board::new(geometry).is_err());
    }
}
