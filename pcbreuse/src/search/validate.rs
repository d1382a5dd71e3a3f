//! Consistency checks on combinations of net matches.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use petgraph::unionfind::UnionFind;
use tracing::trace;

use super::circuit::{CircuitMatch, Intervention, NetMatch, SearchState};
use crate::board::Board;
use crate::core::MatchOptions;
use crate::geometry::{Side, CUT_MARGIN};
use crate::ids::{ConnectionId, MatchId, PadId};
use crate::matcher::MatchArena;
use crate::netlist::{NetNode, Netlist};

/// Connections the net's node pads reach on `board` as it stands.
pub fn reached_connections(net: &NetMatch, board: &Board) -> BTreeSet<ConnectionId> {
    net.nodes
        .iter()
        .flat_map(|n| board.connections_of_pads(&n.pads))
        .collect()
}

/// Whether `net` accounts for sharing `connection` with `other`.
///
/// `board` carries every cut of the circuit. The two nets' pads must reach
/// disjoint connections on it, and one of `net`'s interventions must name
/// `connection`: a jumper or wired pin on it, or a cut over its copper.
pub fn justifies(
    net: &NetMatch,
    other: &NetMatch,
    connection: ConnectionId,
    board: &Board,
    arena: &MatchArena,
) -> bool {
    if !reached_connections(net, board).is_disjoint(&reached_connections(other, board)) {
        return false;
    }
    net.interventions().iter().any(|i| match i {
        Intervention::Jumper { nodes } => nodes.iter().any(|n| {
            net.node(n)
                .map(|nm| board.connections_of_pads(&nm.pads).contains(&connection))
                .unwrap_or(false)
        }),
        Intervention::AddWire { missing_node, placement } => arena
            .get(*placement)
            .map(|m| m.pin_on_connection(&missing_node.pin, connection))
            .unwrap_or(false),
        Intervention::TraceCut(cuts) => {
            let Some(conn) = board.connection(connection) else {
                return false;
            };
            [Side::Front, Side::Back].into_iter().any(|side| {
                let traces: Vec<_> = conn
                    .traces_on(side)
                    .iter()
                    .filter_map(|id| board.trace(*id))
                    .map(|t| t.region.bbox())
                    .collect();
                cuts.on(side).iter().any(|cut| {
                    let b = cut.bbox().expanded(CUT_MARGIN * 2.0);
                    traces.iter().any(|t| t.overlaps(&b))
                })
            })
        }
    })
}

/// Checks a set of nets against each other and the board:
/// no two nets' pads reach the same copper, a connection two nets record is
/// named by an intervention of one of them, each ref has one placement, no
/// pad sits under two refs, and every node's pads lie on its net's
/// connections.
pub fn net_combination_valid(nets: &[NetMatch], board: &Board, arena: &MatchArena) -> bool {
    let reached: Vec<BTreeSet<ConnectionId>> = nets.iter().map(|n| reached_connections(n, board)).collect();
    for (i, a) in nets.iter().enumerate() {
        for (j, b) in nets.iter().enumerate().skip(i + 1) {
            if let Some(c) = reached[i].intersection(&reached[j]).next() {
                trace!(net_a = %a.net, net_b = %b.net, connection = %c, "nets share copper");
                return false;
            }
            for c in a.connections.intersection(&b.connections) {
                if !justifies(a, b, *c, board, arena) && !justifies(b, a, *c, board, arena) {
                    trace!(net_a = %a.net, net_b = %b.net, connection = %c, "unjustified shared connection");
                    return false;
                }
            }
        }
    }

    let mut placements: BTreeMap<&str, MatchId> = BTreeMap::new();
    for net in nets {
        for node in &net.nodes {
            match placements.get(node.node.reference.as_str()) {
                Some(id) if *id != node.placement => {
                    trace!(reference = %node.node.reference, "ref placed twice");
                    return false;
                }
                Some(_) => {}
                None => {
                    placements.insert(&node.node.reference, node.placement);
                }
            }
        }
    }

    let mut pad_owner: BTreeMap<PadId, &str> = BTreeMap::new();
    for (reference, id) in &placements {
        let Some(m) = arena.get(*id) else {
            return false;
        };
        for pad in m.pads() {
            if let Some(other) = pad_owner.insert(pad, reference) {
                if other != *reference {
                    trace!(pad = %pad, "pad under two refs");
                    return false;
                }
            }
        }
    }

    for net in nets {
        for node in &net.nodes {
            let Some(m) = arena.get(node.placement) else {
                return false;
            };
            if m.pads_of(&node.node.pin) != node.pads.as_slice() {
                return false;
            }
            if !board.connections_of_pads(&node.pads).is_subset(&net.connections) {
                trace!(node = %node.node, net = %net.net, "node pads off the net");
                return false;
            }
        }
    }
    true
}

/// Groups of node indices joined by copper or by the net's wires.
pub fn node_groups(net: &NetMatch, board: &Board) -> Vec<Vec<usize>> {
    let n = net.nodes.len();
    let mut uf: UnionFind<usize> = UnionFind::new(n);
    let conns: Vec<BTreeSet<ConnectionId>> = net
        .nodes
        .iter()
        .map(|node| board.connections_of_pads(&node.pads))
        .collect();
    for i in 0..n {
        for j in i + 1..n {
            if !conns[i].is_disjoint(&conns[j]) {
                uf.union(i, j);
            }
        }
    }
    let position = |node: &NetNode| net.nodes.iter().position(|nm| &nm.node == node);
    for intervention in net.interventions() {
        match intervention {
            Intervention::Jumper { nodes } => {
                let idx: Vec<usize> = nodes.iter().filter_map(position).collect();
                for pair in idx.windows(2) {
                    uf.union(pair[0], pair[1]);
                }
            }
            Intervention::AddWire { missing_node, .. } => {
                if let Some(i) = position(missing_node) {
                    uf.union(0, i);
                }
            }
            Intervention::TraceCut(_) => {}
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        groups.entry(uf.find(i)).or_default().push(i);
    }
    let mut groups: Vec<Vec<usize>> = groups.into_values().collect();
    groups.sort_by_key(|g| g[0]);
    groups
}

/// [`net_combination_valid`] plus: every net is one electrical group once
/// its wires are counted.
pub fn intervention_combo_valid(nets: &[NetMatch], board: &Board, arena: &MatchArena) -> bool {
    net_combination_valid(nets, board, arena) && nets.iter().all(|n| node_groups(n, board).len() <= 1)
}

/// No placed pin that belongs to no net sits on the net's copper, unless
/// dangling pins are allowed. Pins of other nets are left to connection
/// ownership once their own net is realised.
pub fn foreign_pins_clear(
    net: &NetMatch,
    placements: &BTreeMap<String, MatchId>,
    netlist: &Netlist,
    arena: &MatchArena,
    options: &MatchOptions,
) -> bool {
    if options.allow_dangling_unconnected_pins {
        return true;
    }
    for (reference, id) in placements {
        let Some(m) = arena.get(*id) else {
            continue;
        };
        for (pin, conns) in &m.pin_connections {
            if netlist.net_of(reference, pin).is_none() && conns.iter().any(|c| net.connections.contains(c)) {
                trace!(reference = %reference, pin = %pin, net = %net.net, "unconnected pin on net copper");
                return false;
            }
        }
    }
    true
}

/// Nets of the netlist not yet realised, in netlist order.
pub fn get_missing_nets(circuit: &CircuitMatch, netlist: &Netlist) -> Vec<usize> {
    let covered = circuit.nets_covered();
    netlist
        .nets()
        .iter()
        .enumerate()
        .filter(|(_, n)| !covered.contains(n.name.as_str()))
        .map(|(i, _)| i)
        .collect()
}

/// Keeps the first of every set of equivalent matches.
pub fn filter_duplicates(matches: Vec<CircuitMatch>, arena: &MatchArena) -> Vec<CircuitMatch> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| seen.insert(m.duplicate_key(arena)))
        .collect()
}

/// Placements of `state` plus those of `nets`.
pub(crate) fn placements_with(state: &SearchState, nets: &[NetMatch]) -> BTreeMap<String, MatchId> {
    let mut all = state.placements();
    for net in nets {
        for node in &net.nodes {
            all.entry(node.node.reference.clone()).or_insert(node.placement);
        }
    }
    all
}
