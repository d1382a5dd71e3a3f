//! Circuit Matcher
//!
//! Depth-first search for complete realisations of a netlist on a board.
//! The ref with the most pins is seeded on each of its placements; nets are
//! then realised one at a time, trying exact candidates first, then wired
//! ones, then ones that need copper cut. The search runs on an explicit
//! stack so matches can be pulled one by one with [`CircuitMatching::next_match`].

pub mod best;
pub mod circuit;
pub(crate) mod frames;
pub mod net_matcher;
pub mod planner;
pub mod validate;

use std::collections::HashSet;

use tracing::{debug, info};

use crate::board::{Board, TraceCuts};
use crate::core::MatchOptions;
use crate::footprint::FootprintSet;
use crate::matcher::{MatchArena, MatchStore};
use crate::netlist::Netlist;
use crate::persist::SavedCircuit;
use frames::{Alternative, Frame, FrameKind, Phase, SearchStack};

pub use best::BestMatchHandle;
pub use circuit::{CircuitMatch, DuplicateKey, Intervention, NetMatch, NodeMatch, SearchState};
pub use net_matcher::{MatchMode, NetMatcher};
pub use planner::{get_valid_intervention_combos, identify_trace_conflicts, reconnect_after_cuts};
pub use validate::{
    filter_duplicates, foreign_pins_clear, get_missing_nets, intervention_combo_valid, justifies, net_combination_valid,
    reached_connections,
};

/// A matching session: owns the board it may cut, the placement store and
/// the search stack.
pub struct CircuitMatching {
    board: Board,
    netlist: Netlist,
    footprints: FootprintSet,
    options: MatchOptions,
    store: MatchStore,
    stack: SearchStack,
    best: BestMatchHandle,
    seen: HashSet<DuplicateKey>,
    search_refs: Vec<String>,
    started: bool,
    empty_pending: bool,
    pending_advance: bool,
    returned: usize,
}

impl CircuitMatching {
    pub fn new(board: Board, netlist: Netlist, footprints: FootprintSet, options: MatchOptions) -> Self {
        let search_refs = netlist
            .sorted_refs()
            .into_iter()
            .filter(|r| !netlist.nets_of_ref(r).is_empty())
            .collect();
        Self {
            board,
            netlist,
            footprints,
            options,
            store: MatchStore::new(),
            stack: SearchStack::default(),
            best: BestMatchHandle::new(),
            seen: HashSet::new(),
            search_refs,
            started: false,
            empty_pending: false,
            pending_advance: false,
            returned: 0,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    pub fn arena(&self) -> &MatchArena {
        self.store.arena()
    }

    /// Mutable arena, for loading saved matches into this session.
    pub fn arena_mut(&mut self) -> &mut MatchArena {
        self.store.arena_mut()
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    /// Current stack depth, for progress displays.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Handle another thread may poll for the best partial match.
    pub fn best_match_handle(&self) -> BestMatchHandle {
        self.best.clone()
    }

    pub fn current_best_match(&self) -> Option<SavedCircuit> {
        self.best.get()
    }

    /// Next complete match, or `None` once the search space is exhausted or
    /// `max_results` matches have been returned.
    pub fn next_match(&mut self) -> Option<CircuitMatch> {
        if self.limit_reached() {
            return None;
        }
        self.ensure_started();
        if self.empty_pending {
            self.empty_pending = false;
            self.returned += 1;
            return Some(CircuitMatch::default());
        }
        if self.pending_advance {
            self.pending_advance = false;
            self.stack.advance(&mut self.board, 1);
        }
        self.drive()
    }

    /// Resumes after skipping `search_index` alternatives of the top frame.
    pub fn recursive_search_from_match(&mut self, search_index: usize) -> Option<CircuitMatch> {
        self.ensure_started();
        if search_index > 0 {
            if self.empty_pending {
                self.empty_pending = false;
            } else if self.pending_advance {
                self.pending_advance = false;
                self.stack.advance(&mut self.board, 1 + search_index);
            } else {
                self.stack.advance(&mut self.board, search_index);
            }
        }
        self.next_match()
    }

    /// Every remaining match, duplicates removed, fewest interventions first.
    pub fn all_matches(&mut self) -> Vec<CircuitMatch> {
        let mut found = Vec::new();
        while let Some(m) = self.next_match() {
            found.push(m);
        }
        let mut unique = filter_duplicates(found, self.store.arena());
        unique.sort_by_key(CircuitMatch::intervention_count);
        info!(matches = unique.len(), "all matches collected");
        unique
    }

    fn limit_reached(&self) -> bool {
        self.options.max_results.is_some_and(|max| self.returned >= max)
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if self.netlist.nets().is_empty() {
            info!("netlist has no nets");
            self.empty_pending = true;
            return;
        }
        let frame = self.seed_frame();
        self.stack.push_frame(frame);
    }

    fn seed_frame(&mut self) -> Frame {
        let mut alternatives = Vec::new();
        if let Some(reference) = self.search_refs.first() {
            let matcher = NetMatcher::new(&self.board, &self.netlist, &self.footprints, &self.options);
            if let Some((footprint, key)) = matcher.footprint_for(reference) {
                for placement in self.store.full(&self.board, &self.options, footprint, &key) {
                    alternatives.push(Alternative::Seed {
                        reference: reference.clone(),
                        placement,
                    });
                }
            }
            info!(reference = %reference, placements = alternatives.len(), "search seeded");
        }
        Frame::new(FrameKind::Seed, SearchState::default(), alternatives)
    }

    fn drive(&mut self) -> Option<CircuitMatch> {
        loop {
            let step = match self.stack.top() {
                None => return None,
                Some(top) => top.current().map(|alt| (top.state.clone(), alt.clone())),
            };
            let Some((state, alternative)) = step else {
                self.stack.pop(&mut self.board);
                self.stack.advance(&mut self.board, 1);
                continue;
            };

            let Some(state) = self.apply(state, alternative) else {
                self.stack.advance(&mut self.board, 1);
                continue;
            };
            let state = self.locate_other_nets(state);
            self.offer_best(&state);

            let missing = get_missing_nets(&state.circuit, &self.netlist);
            if missing.is_empty() {
                let key = state.circuit.duplicate_key(self.store.arena());
                if !self.seen.insert(key) {
                    debug!("duplicate match skipped");
                    self.stack.advance(&mut self.board, 1);
                    continue;
                }
                self.pending_advance = true;
                self.returned += 1;
                info!(
                    index = self.returned,
                    interventions = state.circuit.intervention_count(),
                    "complete match found"
                );
                return Some(state.circuit);
            }
            let frame = self.next_frame(state, &missing);
            self.stack.push_frame(frame);
        }
    }

    fn apply(&mut self, mut state: SearchState, alternative: Alternative) -> Option<SearchState> {
        self.store.sync(&self.board);
        match alternative {
            Alternative::Seed { reference, placement } => {
                state.pinned.insert(reference, placement);
                Some(state)
            }
            Alternative::Net(net) => {
                state.circuit.nets.push(net);
                net_combination_valid(&state.circuit.nets, &self.board, self.store.arena()).then_some(state)
            }
            Alternative::Combo(nets) => {
                state.circuit.nets.extend(nets);
                intervention_combo_valid(&state.circuit.nets, &self.board, self.store.arena()).then_some(state)
            }
            Alternative::Cut { net, cuts } => self.apply_cuts(state, net, cuts),
        }
    }

    /// Cuts the board for `net`, re-derives every net's connections and
    /// keeps the result only if the nets stay apart and connected. On success
    /// the pre-cut board is parked in the top frame.
    fn apply_cuts(&mut self, mut state: SearchState, mut net: NetMatch, cuts: TraceCuts) -> Option<SearchState> {
        let snapshot = self.board.snapshot();
        self.board.integrate_trace_cuts(&cuts);
        self.store.sync(&self.board);

        let mut interventions = vec![Intervention::TraceCut(cuts)];
        interventions.extend(net.interventions.take().unwrap_or_default());
        net.interventions = Some(interventions);
        let name = net.net.clone();
        state.circuit.nets.push(net);
        reconnect_after_cuts(&mut state.circuit.nets, &self.board);

        let arena = self.store.arena();
        let placements = state.placements();
        let isolated = state
            .circuit
            .nets
            .iter()
            .all(|n| foreign_pins_clear(n, &placements, &self.netlist, arena, &self.options));
        let apart = state.circuit.nets.iter().enumerate().all(|(i, a)| {
            state.circuit.nets[i + 1..]
                .iter()
                .all(|b| a.connections.is_disjoint(&b.connections))
        });
        if isolated && apart && intervention_combo_valid(&state.circuit.nets, &self.board, arena) {
            debug!(net = %name, "trace cuts applied");
            if let Some(top) = self.stack.top_mut() {
                top.snapshot = Some(snapshot);
            }
            Some(state)
        } else {
            debug!(net = %name, "cut plan rejected");
            self.board.restore(snapshot);
            None
        }
    }

    fn all_placed(&self, state: &SearchState) -> bool {
        self.search_refs
            .iter()
            .all(|r| state.placement_of(r).is_some())
    }

    /// Adds every missing net that the fixed placements already realise.
    fn locate_other_nets(&mut self, mut state: SearchState) -> SearchState {
        if !self.all_placed(&state) {
            return state;
        }
        let matcher = NetMatcher::new(&self.board, &self.netlist, &self.footprints, &self.options);
        for net in get_missing_nets(&state.circuit, &self.netlist) {
            if let Some(found) = matcher.trivial_realization(&mut self.store, &state, net) {
                state.circuit.nets.push(found);
                if !net_combination_valid(&state.circuit.nets, &self.board, self.store.arena()) {
                    state.circuit.nets.pop();
                }
            }
        }
        state
    }

    fn offer_best(&self, state: &SearchState) {
        let arena = self.store.arena();
        if self
            .best
            .offer(state.circuit.len(), || state.circuit.to_saved(arena))
        {
            debug!(nets = state.circuit.len(), "best partial match improved");
        }
    }

    fn next_frame(&mut self, state: SearchState, missing: &[usize]) -> Frame {
        if self.all_placed(&state) {
            let matcher = NetMatcher::new(&self.board, &self.netlist, &self.footprints, &self.options);
            let combos = get_valid_intervention_combos(
                &matcher,
                &mut self.store,
                &state,
                missing,
                &self.board,
                self.options.max_alternatives,
            );
            if !combos.is_empty() {
                return Frame::new(
                    FrameKind::Combos,
                    state,
                    combos.into_iter().map(Alternative::Combo).collect(),
                );
            }
        }
        let net = missing
            .iter()
            .copied()
            .find(|&i| {
                self.netlist
                    .net(i)
                    .nodes
                    .iter()
                    .any(|n| state.placement_of(&n.reference).is_some())
            })
            .unwrap_or(missing[0]);
        self.net_frame(state, net)
    }

    fn net_frame(&mut self, state: SearchState, net: usize) -> Frame {
        let matcher = NetMatcher::new(&self.board, &self.netlist, &self.footprints, &self.options);
        let name = &self.netlist.net(net).name;

        let ideal = matcher.search_net_matches(&mut self.store, &state, net);
        if !ideal.is_empty() {
            return Frame::new(
                FrameKind::Net { net, phase: Phase::Ideal },
                state,
                ideal.into_iter().map(Alternative::Net).collect(),
            );
        }
        let wired = matcher.find_wire_interventions(&mut self.store, &state, net);
        if !wired.is_empty() {
            debug!(net = %name, candidates = wired.len(), "net needs wires");
            return Frame::new(
                FrameKind::Net { net, phase: Phase::Wires },
                state,
                wired.into_iter().map(Alternative::Net).collect(),
            );
        }
        let cut = matcher.trace_cut_candidates(&mut self.store, &state, net);
        if cut.is_empty() {
            debug!(net = %name, "net cannot be realised here");
        } else {
            debug!(net = %name, candidates = cut.len(), "net needs cuts");
        }
        Frame::new(
            FrameKind::Net { net, phase: Phase::Cuts },
            state,
            cut.into_iter()
                .map(|(net, cuts)| Alternative::Cut { net, cuts })
                .collect(),
        )
    }
}

impl Iterator for CircuitMatching {
    type Item = CircuitMatch;

    fn next(&mut self) -> Option<CircuitMatch> {
        self.next_match()
    }
}
