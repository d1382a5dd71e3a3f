//! Error taxonomy, match options and the top-level entry points shared by
//! the library users and the CLI.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::board::{Board, BoardGeometry};
use crate::footprint::{split_footprint_id, Footprint, FootprintCache, FootprintLibrary, FootprintSet};
use crate::geometry::Rotation;
use crate::netlist::Netlist;
use crate::parser::board::{merge_drills, parse_board_json, parse_excellon};
use crate::parser::kicad_net::KicadNetlistParser;
use crate::matcher::{ComponentMatch, ComponentMatcher, MatchArena};
use crate::persist::SavedCircuit;
use crate::search::{intervention_combo_valid, CircuitMatching};

#[derive(Debug, thiserror::Error)]
pub enum PcbReuseError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Footprint {library}:{footprint} could not be loaded after {attempts} attempt(s)")]
    RenderFailed {
        library: String,
        footprint: String,
        attempts: usize,
    },
    #[error("Unsupported footprint: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::parser::sexp::ParseError> for PcbReuseError {
    fn from(e: crate::parser::sexp::ParseError) -> Self {
        PcbReuseError::MalformedInput(e.to_string())
    }
}

impl From<crate::parser::kicad_net::NetlistParseError> for PcbReuseError {
    fn from(e: crate::parser::kicad_net::NetlistParseError) -> Self {
        PcbReuseError::MalformedInput(e.to_string())
    }
}

impl From<crate::parser::kicad_mod::FootprintParseError> for PcbReuseError {
    fn from(e: crate::parser::kicad_mod::FootprintParseError) -> Self {
        PcbReuseError::MalformedInput(e.to_string())
    }
}

/// Knobs for a matching session (CLI `--config` file or library callers).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Allow jumper wires and extra placements bridged in by wires.
    pub allow_wires: bool,
    /// Allow severing copper to isolate conflicting pads.
    pub allow_cuts: bool,
    /// Width added around a pad when building its cut polygon (board units).
    pub cut_line_width: f64,
    /// Relative tolerance when comparing footprint and board pad sizes.
    pub pad_size_tolerance: f64,
    /// Absolute tolerance when comparing pad sizes.
    pub pad_size_slack: f64,
    pub rotations: Vec<Rotation>,
    pub allow_back_side: bool,
    /// Pins that belong to no net may sit off-pad or on copper used by a net.
    pub allow_dangling_unconnected_pins: bool,
    /// Upper bound on alternatives kept per search frame.
    pub max_alternatives: usize,
    /// Stop after this many complete matches.
    pub max_results: Option<usize>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            allow_wires: true,
            allow_cuts: true,
            cut_line_width: 0.3,
            pad_size_tolerance: 0.15,
            pad_size_slack: 0.05,
            rotations: vec![Rotation::R0],
            allow_back_side: true,
            allow_dangling_unconnected_pins: false,
            max_alternatives: 512,
            max_results: None,
        }
    }
}

impl MatchOptions {
    /// Only exact matches: no wires, no cuts.
    pub fn ideal_only() -> Self {
        Self {
            allow_wires: false,
            allow_cuts: false,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PcbReuseError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether `a` and `b` (width, height) describe the same pad size.
    pub fn pad_sizes_match(&self, a: (f64, f64), b: (f64, f64)) -> bool {
        let close = |x: f64, y: f64| {
            let allowed = (x.abs().max(y.abs()) * self.pad_size_tolerance).max(self.pad_size_slack);
            (x - y).abs() <= allowed
        };
        close(a.0, b.0) && close(a.1, b.1)
    }
}

/// Result of a batch match.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    /// Complete matches, fewest interventions first.
    pub matches: Vec<SavedCircuit>,
    /// Deepest partial solution seen, reported when `matches` is empty.
    pub best_partial: Option<SavedCircuit>,
}

impl MatchReport {
    pub fn is_match(&self) -> bool {
        !self.matches.is_empty()
    }
}

/// Core API used by both library callers and the CLI.
pub struct PcbReuseCore;

impl PcbReuseCore {
    /// Load board geometry from JSON, optionally merging an Excellon drill file.
    pub fn load_board(path: &Path, drill: Option<&Path>) -> Result<Board, PcbReuseError> {
        let content = std::fs::read_to_string(path)?;
        let mut geometry: BoardGeometry = parse_board_json(&content)?;
        if let Some(drill_path) = drill {
            let drill_content = std::fs::read_to_string(drill_path)?;
            let plated = !drill_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_ascii_uppercase().contains("NPTH"))
                .unwrap_or(false);
            merge_drills(&mut geometry, parse_excellon(&drill_content, plated)?);
        }
        Board::new(geometry)
    }

    /// Load a netlist: KiCad `.net` export, or the JSON form for anything else.
    pub fn load_netlist(path: &Path) -> Result<Netlist, PcbReuseError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("net") => Ok(KicadNetlistParser::parse_str(&content)?),
            _ => Netlist::from_json_str(&content),
        }
    }

    /// Resolve every footprint the netlist uses. Unsupported footprints are
    /// skipped (their components then have no placement); load failures are fatal.
    pub fn load_footprints<L: FootprintLibrary>(
        netlist: &Netlist,
        cache: &mut FootprintCache<L>,
    ) -> Result<FootprintSet, PcbReuseError> {
        let mut set: FootprintSet = BTreeMap::new();
        for footprint_id in netlist.footprint_dict().keys() {
            let (library, name) = split_footprint_id(footprint_id);
            match cache.load(library, name) {
                Ok(fp) => {
                    set.insert(footprint_id.clone(), fp);
                }
                Err(PcbReuseError::Unsupported(reason)) => {
                    warn!(footprint = %footprint_id, %reason, "skipping unsupported footprint");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }

    /// Run the full search and collect every complete match.
    pub fn match_circuit(
        netlist: Netlist,
        board: Board,
        footprints: FootprintSet,
        options: MatchOptions,
    ) -> MatchReport {
        let mut session = CircuitMatching::new(board, netlist, footprints, options);
        let matches = session.all_matches();
        let saved: Vec<SavedCircuit> = matches.iter().map(|m| m.to_saved(session.arena())).collect();
        info!(matches = saved.len(), "search finished");
        let best_partial = if saved.is_empty() {
            session.current_best_match()
        } else {
            None
        };
        MatchReport {
            matches: saved,
            best_partial,
        }
    }

    /// Every placement of one footprint on the board, best first.
    pub fn find_placements(board: &Board, footprint: &Footprint, options: &MatchOptions) -> Vec<ComponentMatch> {
        ComponentMatcher::new(footprint, board, options).get_matches()
    }

    /// Re-checks a saved match against the board: the saved cuts are applied
    /// net by net, then placements, pads, connections and wires must still
    /// form a consistent circuit. `board` is left with the cuts applied.
    pub fn verify_circuit(board: &mut Board, saved: &SavedCircuit) -> Result<bool, PcbReuseError> {
        let mut arena = MatchArena::new();
        let circuit = saved.clone().into_circuit(&mut arena, board)?;
        for net in &circuit.nets {
            let cuts = net.trace_cuts();
            if !cuts.is_empty() {
                board.integrate_trace_cuts(&cuts);
            }
        }
        arena.refresh(board);
        let valid = intervention_combo_valid(&circuit.nets, board, &arena);
        if !valid {
            warn!(nets = circuit.len(), "saved match no longer fits the board");
        }
        Ok(valid)
    }

    /// Convenience: footprints shared behind `Arc` for a single footprint id.
    pub fn footprint_set<I>(items: I) -> FootprintSet
    where
        I: IntoIterator<Item = Footprint>,
    {
        items.into_iter().map(|fp| (fp.id(), Arc::new(fp))).collect()
    }
}
