//! Intervention Planner
//!
//! Works out the copper to remove so a net candidate stops sharing
//! connections with pins of other nets, the jumpers that rejoin nodes a cut
//! separated, and whole-circuit combinations of wired net candidates.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::circuit::{Intervention, NetMatch, SearchState};
use super::net_matcher::NetMatcher;
use super::validate::{intervention_combo_valid, node_groups, reached_connections};
use crate::board::{Board, TraceCuts};
use crate::core::MatchOptions;
use crate::geometry::{Polygon, Side};
use crate::ids::{ConnectionId, PadId};
use crate::matcher::{MatchArena, MatchStore};
use crate::netlist::{NetNode, Netlist};

/// Cuts separating `candidate` from pins that must not share its copper.
///
/// On a connection owned by another net the candidate's own pads are cut
/// loose; elsewhere the foreign pads are. Returns `None` when there is
/// nothing to cut or when a pad reaches the connection without a trace
/// that could be severed.
pub fn identify_trace_conflicts(
    board: &Board,
    netlist: &Netlist,
    arena: &MatchArena,
    state: &SearchState,
    candidate: &NetMatch,
    options: &MatchOptions,
) -> Option<TraceCuts> {
    let net_index = netlist.net_index(&candidate.net)?;
    let owners = state.owners();
    let mut placements = state.placements();
    for node in &candidate.nodes {
        placements
            .entry(node.node.reference.clone())
            .or_insert(node.placement);
    }
    let own_nodes: BTreeSet<&NetNode> = candidate.nodes.iter().map(|n| &n.node).collect();

    let mut conflicts: BTreeSet<(PadId, ConnectionId)> = BTreeSet::new();
    for &c in &candidate.connections {
        if owners.contains_key(&c) {
            for node in &candidate.nodes {
                conflicts.extend(
                    node.pads
                        .iter()
                        .filter(|p| board.connection_of_pad(**p) == c)
                        .map(|p| (*p, c)),
                );
            }
            continue;
        }
        for (reference, id) in &placements {
            let Some(m) = arena.get(*id) else {
                continue;
            };
            for (pin, pads) in &m.pin_pads {
                if own_nodes.contains(&NetNode::new(reference.as_str(), pin.as_str())) {
                    continue;
                }
                match netlist.net_of(reference, pin) {
                    Some(i) if i == net_index => continue,
                    None if options.allow_dangling_unconnected_pins => continue,
                    _ => {}
                }
                conflicts.extend(
                    pads.iter()
                        .filter(|p| board.connection_of_pad(**p) == c)
                        .map(|p| (*p, c)),
                );
            }
        }
    }
    if conflicts.is_empty() {
        return None;
    }

    let mut cuts = TraceCuts::default();
    for (pad, c) in conflicts {
        if pad_cuts(board, pad, c, options.cut_line_width, &mut cuts) == 0 {
            debug!(pad = %pad, connection = %c, "no trace to cut at pad");
            return None;
        }
    }
    debug!(net = %candidate.net, cuts = cuts.len(), "trace conflicts identified");
    Some(cuts)
}

/// Adds the cut ring around one pad: the pad grown by `width`, clipped to
/// each trace of the connection it touches. Through-hole pads are ringed on
/// the opposite side as well. Returns how many pieces were produced.
fn pad_cuts(board: &Board, pad_id: PadId, connection: ConnectionId, width: f64, cuts: &mut TraceCuts) -> usize {
    let pad = board.pad(pad_id);
    let ring = pad.polygon.dilated(width);
    let mut produced = 0;
    for trace in board.traces_under_pad(pad_id, connection) {
        for piece in ring.intersection(&trace.region.outer) {
            push_unique(cuts, pad.side, piece);
            produced += 1;
        }
    }
    if board.through_holes_in(pad_id).next().is_some() {
        let side = pad.side.opposite();
        if let Some(conn) = board.connection(connection) {
            for trace in conn.traces_on(side).iter().filter_map(|id| board.trace(*id)) {
                if !trace.region.touches(&ring) {
                    continue;
                }
                for piece in ring.intersection(&trace.region.outer) {
                    push_unique(cuts, side, piece);
                    produced += 1;
                }
            }
        }
    }
    produced
}

fn push_unique(cuts: &mut TraceCuts, side: Side, piece: Polygon) {
    if !cuts.on(side).contains(&piece) {
        cuts.push(side, piece);
    }
}

/// Net connections as the node pads see them on the current board.
pub fn recompute_connections(net: &mut NetMatch, board: &Board) {
    net.connections = reached_connections(net, board);
}

/// After cuts: refreshes every net's connections and, where a net fell
/// apart, adds one jumper joining the first node of each piece.
pub fn reconnect_after_cuts(nets: &mut [NetMatch], board: &Board) {
    for net in nets.iter_mut() {
        recompute_connections(net, board);
        let groups = node_groups(net, board);
        if groups.len() > 1 {
            let nodes: Vec<NetNode> = groups.iter().map(|g| net.nodes[g[0]].node.clone()).collect();
            debug!(net = %net.net, pieces = groups.len(), "jumper rejoins cut net");
            net.push_intervention(Intervention::Jumper { nodes });
        }
    }
}

/// Joint realisations of the `missing` nets when every ref is placed: the
/// product of each net's candidates, kept when the nets stay apart and the
/// whole circuit validates. Fewest interventions first, at most `limit`.
pub fn get_valid_intervention_combos(
    matcher: &NetMatcher<'_>,
    store: &mut MatchStore,
    state: &SearchState,
    missing: &[usize],
    board: &Board,
    limit: usize,
) -> Vec<Vec<NetMatch>> {
    let mut variants: Vec<Vec<NetMatch>> = Vec::with_capacity(missing.len());
    for &net in missing {
        let mut found = matcher.find_wire_interventions(store, state, net);
        if found.is_empty() {
            found = matcher.search_net_matches(store, state, net);
        }
        if found.is_empty() {
            return Vec::new();
        }
        variants.push(found);
    }
    if variants.is_empty() {
        return Vec::new();
    }

    let budget = limit.max(1).saturating_mul(64);
    let mut examined = 0usize;
    let mut odometer = vec![0usize; variants.len()];
    let mut combos = Vec::new();
    'product: loop {
        examined += 1;
        let combo: Vec<NetMatch> = odometer
            .iter()
            .zip(&variants)
            .map(|(i, v)| v[*i].clone())
            .collect();
        if pairwise_apart(&combo) {
            let mut all = state.circuit.nets.clone();
            all.extend(combo.iter().cloned());
            if intervention_combo_valid(&all, board, store.arena()) {
                combos.push(combo);
                if combos.len() >= limit.max(1) {
                    break;
                }
            }
        }
        if examined >= budget {
            break;
        }
        for pos in (0..odometer.len()).rev() {
            odometer[pos] += 1;
            if odometer[pos] < variants[pos].len() {
                continue 'product;
            }
            odometer[pos] = 0;
        }
        break;
    }
    combos.sort_by_key(|c| c.iter().map(NetMatch::intervention_count).sum::<usize>());
    debug!(nets = missing.len(), combos = combos.len(), "intervention combos");
    combos
}

fn pairwise_apart(nets: &[NetMatch]) -> bool {
    let mut owner: BTreeMap<ConnectionId, usize> = BTreeMap::new();
    for (i, net) in nets.iter().enumerate() {
        for c in &net.connections {
            if let Some(other) = owner.insert(*c, i) {
                if other != i {
                    return false;
                }
            }
        }
    }
    true
}
