//! Net Matcher
//!
//! Builds candidate realisations of one net on top of a partial solution.
//! Nodes are visited with already placed refs first, then by descending pin
//! count. An unplaced ref takes, in order of preference:
//!
//! 1. placements putting its pin on a connection the net already reached
//!    with spare pads left,
//! 2. placements on a connection brought in by a wire,
//! 3. placements on untouched copper, bridged with an [`Intervention::AddWire`].
//!
//! The last two only apply when wires are allowed. In the strict modes a
//! candidate may not touch copper owned by another net, a new placement's
//! other pins may not land on such copper either, and pins that belong to no
//! net stay off the candidate's copper unless dangling pins are allowed.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::circuit::{Intervention, NetMatch, NodeMatch, SearchState};
use super::planner::identify_trace_conflicts;
use super::validate::foreign_pins_clear;
use crate::board::{Board, TraceCuts};
use crate::core::MatchOptions;
use crate::footprint::{Footprint, FootprintSet};
use crate::ids::{ConnectionId, MatchId, PadId};
use crate::matcher::{ComponentMatch, FootprintKey, MatchStore};
use crate::netlist::{NetNode, Netlist};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Copper only.
    Ideal,
    /// Copper plus wires.
    Wires,
    /// Wires allowed and copper conflicts tolerated; the conflicts are
    /// resolved later with trace cuts.
    Relaxed,
}

impl MatchMode {
    fn wires(self) -> bool {
        !matches!(self, MatchMode::Ideal)
    }

    fn strict(self) -> bool {
        !matches!(self, MatchMode::Relaxed)
    }
}

struct Plan {
    net_index: usize,
    nodes: Vec<NetNode>,
    mode: MatchMode,
    placed: BTreeMap<String, MatchId>,
    used_pads: BTreeSet<PadId>,
    owners: BTreeMap<ConnectionId, String>,
    circuit_touched: BTreeSet<ConnectionId>,
    limit: usize,
}

#[derive(Debug, Clone, Default)]
struct Partial {
    nodes: Vec<NodeMatch>,
    connections: BTreeSet<ConnectionId>,
    wired: BTreeSet<ConnectionId>,
    interventions: Vec<Intervention>,
    placements: BTreeMap<String, MatchId>,
    pads: BTreeSet<PadId>,
}

impl Partial {
    fn placement_of(&self, plan: &Plan, reference: &str) -> Option<MatchId> {
        plan.placed
            .get(reference)
            .or_else(|| self.placements.get(reference))
            .copied()
    }
}

struct Target<'t> {
    node: &'t NetNode,
    footprint: &'t Footprint,
    key: FootprintKey,
}

/// Last candidate list a cursor walked, keyed by net and partial solution.
struct Cursor<T> {
    net_index: usize,
    state: SearchState,
    items: Vec<T>,
}

impl<T: Clone> Cursor<T> {
    fn nth(
        slot: &RefCell<Option<Cursor<T>>>,
        net_index: usize,
        state: &SearchState,
        index: usize,
        build: impl FnOnce() -> Vec<T>,
    ) -> Option<T> {
        let mut slot = slot.borrow_mut();
        let fresh = slot
            .as_ref()
            .is_some_and(|c| c.net_index == net_index && c.state == *state);
        if !fresh {
            *slot = Some(Cursor {
                net_index,
                state: state.clone(),
                items: build(),
            });
        }
        slot.as_ref().and_then(|c| c.items.get(index).cloned())
    }
}

pub struct NetMatcher<'a> {
    board: &'a Board,
    netlist: &'a Netlist,
    footprints: &'a FootprintSet,
    options: &'a MatchOptions,
    rank: HashMap<String, usize>,
    wired: RefCell<Option<Cursor<NetMatch>>>,
    cut: RefCell<Option<Cursor<(NetMatch, TraceCuts)>>>,
}

impl<'a> NetMatcher<'a> {
    pub fn new(
        board: &'a Board,
        netlist: &'a Netlist,
        footprints: &'a FootprintSet,
        options: &'a MatchOptions,
    ) -> Self {
        let rank = netlist
            .sorted_refs()
            .into_iter()
            .enumerate()
            .map(|(i, r)| (r, i))
            .collect();
        Self {
            board,
            netlist,
            footprints,
            options,
            rank,
            wired: RefCell::new(None),
            cut: RefCell::new(None),
        }
    }

    /// Candidates that need nothing but existing copper.
    pub fn search_net_matches(&self, store: &mut MatchStore, state: &SearchState, net_index: usize) -> Vec<NetMatch> {
        self.candidates(store, state, net_index, MatchMode::Ideal)
    }

    /// Candidates completed with jumpers and extra wired placements, fewest
    /// wires first. Empty when wires are disabled.
    pub fn find_wire_interventions(
        &self,
        store: &mut MatchStore,
        state: &SearchState,
        net_index: usize,
    ) -> Vec<NetMatch> {
        if !self.options.allow_wires {
            return Vec::new();
        }
        self.candidates(store, state, net_index, MatchMode::Wires)
    }

    /// The `search_index`-th wired candidate. The list is built once per
    /// (net, state) and kept until either changes, so walking it is linear.
    /// All calls on one matcher must share the same store.
    pub fn fwi_fifo(
        &self,
        store: &mut MatchStore,
        state: &SearchState,
        net_index: usize,
        search_index: usize,
    ) -> Option<NetMatch> {
        Cursor::nth(&self.wired, net_index, state, search_index, || {
            self.find_wire_interventions(store, state, net_index)
        })
    }

    /// Candidates that may overlap other nets' copper.
    pub fn relaxed_candidates(&self, store: &mut MatchStore, state: &SearchState, net_index: usize) -> Vec<NetMatch> {
        self.candidates(store, state, net_index, MatchMode::Relaxed)
    }

    /// Relaxed candidates paired with the cuts that isolate them. Candidates
    /// with nothing to cut, or with a conflict no cut can resolve, are dropped.
    pub fn trace_cut_candidates(
        &self,
        store: &mut MatchStore,
        state: &SearchState,
        net_index: usize,
    ) -> Vec<(NetMatch, TraceCuts)> {
        if !self.options.allow_cuts {
            return Vec::new();
        }
        let relaxed = self.relaxed_candidates(store, state, net_index);
        relaxed
            .into_iter()
            .filter_map(|candidate| {
                let cuts =
                    identify_trace_conflicts(self.board, self.netlist, store.arena(), state, &candidate, self.options)?;
                (!cuts.is_empty()).then_some((candidate, cuts))
            })
            .collect()
    }

    /// The `search_index`-th cut candidate, cached like [`Self::fwi_fifo`].
    pub fn trace_cut_fifo(
        &self,
        store: &mut MatchStore,
        state: &SearchState,
        net_index: usize,
        search_index: usize,
    ) -> Option<(NetMatch, TraceCuts)> {
        Cursor::nth(&self.cut, net_index, state, search_index, || {
            self.trace_cut_candidates(store, state, net_index)
        })
    }

    /// Exact realisation of a net whose refs are all placed already.
    pub fn trivial_realization(&self, store: &mut MatchStore, state: &SearchState, net_index: usize) -> Option<NetMatch> {
        let net = self.netlist.net(net_index);
        if net.nodes.iter().any(|n| state.placement_of(&n.reference).is_none()) {
            return None;
        }
        self.search_net_matches(store, state, net_index).into_iter().next()
    }

    /// Keeps candidates covering all `node_count` nodes.
    pub fn get_complete_matches(candidates: Vec<NetMatch>, node_count: usize) -> Vec<NetMatch> {
        candidates
            .into_iter()
            .filter(|c| c.nodes.len() == node_count)
            .collect()
    }

    pub fn candidates(
        &self,
        store: &mut MatchStore,
        state: &SearchState,
        net_index: usize,
        mode: MatchMode,
    ) -> Vec<NetMatch> {
        store.sync(self.board);
        let net = self.netlist.net(net_index);
        let placed = state.placements();
        let plan = Plan {
            net_index,
            nodes: self.ordered_nodes(&net.nodes, &placed),
            mode,
            used_pads: state.used_pads(store.arena()),
            owners: state.owners(),
            circuit_touched: state.circuit.touched_connections(),
            placed,
            limit: self.options.max_alternatives.max(1),
        };

        let mut out = Vec::new();
        self.extend(store, &plan, Partial::default(), &mut out);
        let mut complete = Self::get_complete_matches(out, net.nodes.len());
        complete.sort_by_key(NetMatch::intervention_count);
        debug!(net = %net.name, ?mode, candidates = complete.len(), "net candidates");
        complete
    }

    /// Footprint of a ref and the cache key it is matched under.
    pub(crate) fn footprint_for(&self, reference: &str) -> Option<(&'a Footprint, FootprintKey)> {
        let comp = self.netlist.component(reference)?;
        let footprint = self.footprints.get(&comp.footprint)?;
        let ignored = if self.options.allow_dangling_unconnected_pins {
            self.netlist
                .unconnected_pins(reference, footprint.pins.iter().map(|p| p.name.as_str()))
        } else {
            Vec::new()
        };
        Some((footprint.as_ref(), FootprintKey::new(comp.footprint.clone(), ignored)))
    }

    fn ordered_nodes(&self, nodes: &[NetNode], placed: &BTreeMap<String, MatchId>) -> Vec<NetNode> {
        let (mut first, mut rest): (Vec<NetNode>, Vec<NetNode>) =
            nodes.iter().cloned().partition(|n| placed.contains_key(&n.reference));
        rest.sort_by_key(|n| self.rank.get(&n.reference).copied().unwrap_or(usize::MAX));
        first.extend(rest);
        first
    }

    fn wires_enabled(&self, plan: &Plan) -> bool {
        plan.mode.wires() && self.options.allow_wires
    }

    fn extend(&self, store: &mut MatchStore, plan: &Plan, partial: Partial, out: &mut Vec<NetMatch>) {
        if out.len() >= plan.limit {
            return;
        }
        let Some(node) = plan.nodes.get(partial.nodes.len()) else {
            if let Some(done) = self.finish(store, plan, partial) {
                if !out.contains(&done) {
                    out.push(done);
                }
            }
            return;
        };
        match partial.placement_of(plan, &node.reference) {
            Some(id) => self.extend_placed(store, plan, partial, node, id, out),
            None => self.extend_unplaced(store, plan, partial, node, out),
        }
    }

    fn extend_placed(
        &self,
        store: &mut MatchStore,
        plan: &Plan,
        mut partial: Partial,
        node: &NetNode,
        id: MatchId,
        out: &mut Vec<NetMatch>,
    ) {
        let m = &store.arena()[id];
        let pads = m.pads_of(&node.pin).to_vec();
        if pads.is_empty() {
            return;
        }
        let conns: BTreeSet<ConnectionId> = m.connections_of(&node.pin).iter().copied().collect();

        if !partial.nodes.is_empty() && conns.is_disjoint(&partial.connections) {
            if !self.wires_enabled(plan) {
                return;
            }
            let intervention = match partial.nodes.iter().find(|n| n.node.reference == node.reference) {
                Some(sibling) => Intervention::Jumper {
                    nodes: vec![sibling.node.clone(), node.clone()],
                },
                None => Intervention::AddWire {
                    missing_node: node.clone(),
                    placement: id,
                },
            };
            partial.interventions.push(intervention);
            partial.wired.extend(conns.iter().copied());
        }
        partial.connections.extend(conns);
        partial.nodes.push(NodeMatch {
            node: node.clone(),
            placement: id,
            pads,
        });
        if plan.mode.strict() && !connections_free(plan, &partial.connections) {
            return;
        }
        self.extend(store, plan, partial, out);
    }

    fn extend_unplaced(
        &self,
        store: &mut MatchStore,
        plan: &Plan,
        partial: Partial,
        node: &NetNode,
        out: &mut Vec<NetMatch>,
    ) {
        let Some((footprint, key)) = self.footprint_for(&node.reference) else {
            return;
        };
        let target = Target { node, footprint, key };
        let candidates: Vec<(MatchId, bool)> = if partial.nodes.is_empty() {
            let ids = store.full(self.board, self.options, footprint, &target.key);
            self.admissible(store, plan, &partial, node, ids)
                .into_iter()
                .map(|id| (id, false))
                .collect()
        } else {
            self.unplaced_candidates(store, plan, &partial, &target)
        };

        for (id, wired) in candidates {
            if out.len() >= plan.limit {
                break;
            }
            let m = &store.arena()[id];
            let pads = m.pads_of(&node.pin).to_vec();
            if pads.is_empty() {
                continue;
            }
            let conns = m.connections_of(&node.pin).to_vec();
            let mut next = partial.clone();
            next.pads.extend(m.pads());
            next.placements.insert(node.reference.clone(), id);
            if wired {
                next.wired.extend(conns.iter().copied());
                next.interventions.push(Intervention::AddWire {
                    missing_node: node.clone(),
                    placement: id,
                });
            }
            next.connections.extend(conns);
            next.nodes.push(NodeMatch {
                node: node.clone(),
                placement: id,
                pads,
            });
            if plan.mode.strict() && !connections_free(plan, &next.connections) {
                continue;
            }
            self.extend(store, plan, next, out);
        }
    }

    /// Placements for a ref joining a non-empty partial net, tagged with
    /// whether they need a new wire.
    fn unplaced_candidates(
        &self,
        store: &mut MatchStore,
        plan: &Plan,
        partial: &Partial,
        target: &Target<'_>,
    ) -> Vec<(MatchId, bool)> {
        let base: Vec<ConnectionId> = partial.connections.difference(&partial.wired).copied().collect();
        let direct = self.on_connections(store, plan, partial, target, &base);
        if !direct.is_empty() || !self.wires_enabled(plan) {
            return direct.into_iter().map(|id| (id, false)).collect();
        }

        let wired: Vec<ConnectionId> = partial.wired.iter().copied().collect();
        let via_wires = self.on_connections(store, plan, partial, target, &wired);
        if !via_wires.is_empty() {
            return via_wires.into_iter().map(|id| (id, false)).collect();
        }

        let full = store.full(self.board, self.options, target.footprint, &target.key);
        let mut fresh: Vec<(ConnectionId, MatchId)> = full
            .into_iter()
            .filter_map(|id| {
                store.arena()[id]
                    .connections_of(&target.node.pin)
                    .iter()
                    .find(|c| !plan.circuit_touched.contains(*c) && !partial.connections.contains(*c))
                    .map(|c| (*c, id))
            })
            .collect();
        fresh.sort_by_key(|(c, _)| *c);
        let ids = fresh.into_iter().map(|(_, id)| id).collect();
        self.admissible(store, plan, partial, target.node, ids)
            .into_iter()
            .map(|id| (id, true))
            .collect()
    }

    /// Admissible placements with the target pin on one of `conns`, skipping
    /// connections whose pads are all taken.
    fn on_connections(
        &self,
        store: &mut MatchStore,
        plan: &Plan,
        partial: &Partial,
        target: &Target<'_>,
        conns: &[ConnectionId],
    ) -> Vec<MatchId> {
        let mut found = Vec::new();
        for &c in conns {
            let occupied = self
                .board
                .connection(c)
                .map(|conn| {
                    conn.pads()
                        .filter(|p| plan.used_pads.contains(p) || partial.pads.contains(p))
                        .count()
                })
                .unwrap_or(0);
            if self.board.pads_on_connections(&[c]) <= occupied {
                continue;
            }
            for id in store.on_pin(self.board, self.options, target.footprint, &target.key, c, &target.node.pin) {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        self.admissible(store, plan, partial, target.node, found)
    }

    fn admissible(
        &self,
        store: &MatchStore,
        plan: &Plan,
        partial: &Partial,
        node: &NetNode,
        ids: Vec<MatchId>,
    ) -> Vec<MatchId> {
        ids.into_iter()
            .filter(|id| {
                let m = &store.arena()[*id];
                if m.pads().any(|p| plan.used_pads.contains(&p) || partial.pads.contains(&p)) {
                    return false;
                }
                !plan.mode.strict() || self.other_pins_clear(plan, partial, node, m)
            })
            .collect()
    }

    /// The placement's other pins stay off copper owned by a different net;
    /// pins without a net also stay off the copper reached so far.
    fn other_pins_clear(&self, plan: &Plan, partial: &Partial, node: &NetNode, m: &ComponentMatch) -> bool {
        let dangling_ok = self.options.allow_dangling_unconnected_pins;
        for (pin, conns) in &m.pin_connections {
            if *pin == node.pin {
                continue;
            }
            let pin_net = self.netlist.net_of(&node.reference, pin);
            if pin_net.is_none() && dangling_ok {
                continue;
            }
            for c in conns {
                if let Some(owner) = plan.owners.get(c) {
                    if pin_net.map(|i| self.netlist.net(i).name.as_str()) != Some(owner.as_str()) {
                        return false;
                    }
                }
                if pin_net.is_none() && partial.connections.contains(c) {
                    return false;
                }
            }
        }
        true
    }

    fn finish(&self, store: &MatchStore, plan: &Plan, partial: Partial) -> Option<NetMatch> {
        let net = NetMatch {
            net: self.netlist.net(plan.net_index).name.clone(),
            nodes: partial.nodes,
            connections: partial.connections,
            interventions: (!partial.interventions.is_empty()).then_some(partial.interventions),
        };
        if plan.mode.strict() {
            let mut placements = plan.placed.clone();
            placements.extend(partial.placements);
            if !foreign_pins_clear(&net, &placements, self.netlist, store.arena(), self.options) {
                return None;
            }
        }
        Some(net)
    }
}

fn connections_free(plan: &Plan, conns: &BTreeSet<ConnectionId>) -> bool {
    conns.iter().all(|c| !plan.owners.contains_key(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardGeometry;
    use crate::core::PcbReuseCore;
    use crate::geometry::{Polygon, Region, Side};

    fn resistor() -> Footprint {
        Footprint::new("Passives", "R")
            .with_pad("1", Polygon::rect(-1.0, 0.0, 1.0, 1.0), false)
            .with_pad("2", Polygon::rect(1.0, 0.0, 1.0, 1.0), false)
    }

    /// R1 outline at y=0, R2 outline at y=10, left pads joined by a trace.
    fn ladder() -> Board {
        let geometry = BoardGeometry::new()
            .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(2.0, 0.0, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(0.0, 10.0, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(2.0, 10.0, 1.0, 1.0))
            .with_trace(Side::Front, Region::new(Polygon::rect(0.0, 5.0, 0.8, 11.2), Vec::new()));
        Board::new(geometry).unwrap()
    }

    fn netlist() -> Netlist {
        Netlist::builder()
            .component("R1", "Passives:R", 2)
            .component("R2", "Passives:R", 2)
            .net("A", &["R1-1", "R2-1"])
            .net("B", &["R1-2", "R2-2"])
            .build()
            .unwrap()
    }

    fn seeded(store: &mut MatchStore, board: &Board, fps: &FootprintSet, opts: &MatchOptions) -> SearchState {
        let fp = &fps["Passives:R"];
        let ids = store.full(board, opts, fp, &FootprintKey::full(fp.id()));
        let first = ids
            .into_iter()
            .find(|id| store.arena()[*id].y.abs() < 1e-9)
            .unwrap();
        let mut state = SearchState::default();
        state.pinned.insert("R1".to_string(), first);
        state
    }

    #[test]
    fn test_ideal_follows_copper() {
        let board = ladder();
        let nl = netlist();
        let fps = PcbReuseCore::footprint_set([resistor()]);
        let opts = MatchOptions::default();
        let mut store = MatchStore::new();
        let state = seeded(&mut store, &board, &fps, &opts);
        let matcher = NetMatcher::new(&board, &nl, &fps, &opts);

        let a = matcher.search_net_matches(&mut store, &state, 0);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].nodes.len(), 2);
        assert_eq!(a[0].connections.len(), 1);
        assert!(a[0].interventions.is_none());
        assert!((store.arena()[a[0].nodes[1].placement].y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_wire_added_when_copper_missing() {
        let board = ladder();
        let nl = netlist();
        let fps = PcbReuseCore::footprint_set([resistor()]);
        let opts = MatchOptions::default();
        let mut store = MatchStore::new();
        let mut state = seeded(&mut store, &board, &fps, &opts);
        let matcher = NetMatcher::new(&board, &nl, &fps, &opts);
        let a = matcher.search_net_matches(&mut store, &state, 0).remove(0);
        let r2 = a.nodes[1].placement;
        state.circuit.nets.push(a);

        assert!(matcher.search_net_matches(&mut store, &state, 1).is_empty());
        let b = matcher.find_wire_interventions(&mut store, &state, 1);
        assert_eq!(b.len(), 1);
        assert_eq!(
            b[0].interventions,
            Some(vec![Intervention::AddWire {
                missing_node: NetNode::new("R2", "2"),
                placement: r2,
            }])
        );
        assert_eq!(matcher.fwi_fifo(&mut store, &state, 1, 0), Some(b[0].clone()));
        assert!(matcher.fwi_fifo(&mut store, &state, 1, 1).is_none());
    }

    #[test]
    fn test_cursor_rebuilt_when_state_moves() {
        let board = ladder();
        let nl = netlist();
        let fps = PcbReuseCore::footprint_set([resistor()]);
        let opts = MatchOptions::default();
        let mut store = MatchStore::new();
        let mut state = seeded(&mut store, &board, &fps, &opts);
        let matcher = NetMatcher::new(&board, &nl, &fps, &opts);

        let early = matcher.find_wire_interventions(&mut store, &state, 0);
        assert_eq!(matcher.fwi_fifo(&mut store, &state, 0, 0), early.first().cloned());

        let a = matcher.search_net_matches(&mut store, &state, 0).remove(0);
        state.circuit.nets.push(a);
        let late = matcher.find_wire_interventions(&mut store, &state, 1);
        assert_eq!(matcher.fwi_fifo(&mut store, &state, 1, 0), late.first().cloned());
        assert_eq!(matcher.fwi_fifo(&mut store, &state, 1, 1), late.get(1).cloned());
        assert_eq!(matcher.wired.borrow().as_ref().map(|c| c.net_index), Some(1));
    }

    #[test]
    fn test_wires_disabled() {
        let board = ladder();
        let nl = netlist();
        let fps = PcbReuseCore::footprint_set([resistor()]);
        let opts = MatchOptions::ideal_only();
        let mut store = MatchStore::new();
        let state = seeded(&mut store, &board, &fps, &opts);
        let matcher = NetMatcher::new(&board, &nl, &fps, &opts);
        assert!(matcher.find_wire_interventions(&mut store, &state, 1).is_empty());
        assert!(matcher.trace_cut_candidates(&mut store, &state, 1).is_empty());
    }

    #[test]
    fn test_trivial_realization_needs_all_refs() {
        let board = ladder();
        let nl = netlist();
        let fps = PcbReuseCore::footprint_set([resistor()]);
        let opts = MatchOptions::default();
        let mut store = MatchStore::new();
        let state = seeded(&mut store, &board, &fps, &opts);
        let matcher = NetMatcher::new(&board, &nl, &fps, &opts);
        assert!(matcher.trivial_realization(&mut store, &state, 0).is_none());
    }

    #[test]
    fn test_complete_matches_filter() {
        let partial = NetMatch {
            net: "A".into(),
            nodes: Vec::new(),
            connections: BTreeSet::new(),
            interventions: None,
        };
        assert!(NetMatcher::get_complete_matches(vec![partial], 2).is_empty());
    }
}
