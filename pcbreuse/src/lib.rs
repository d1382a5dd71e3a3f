//! pcbreuse - match a netlist onto an existing printed circuit board
//!
//! Given a circuit (components with footprints, nets tying their pins) and a
//! board whose pads and copper are known, this library decides whether the
//! circuit can be built on that board. Components are placed on board pads of
//! their footprint shape and every net is realised by existing copper,
//! possibly after adding jumper wires or cutting traces.
//!
//! # Quick Start
//!
//! ```no_run
//! use pcbreuse::{FootprintCache, KicadModLibrary, MatchOptions, PcbReuseCore};
//! use std::path::Path;
//!
//! let board = PcbReuseCore::load_board(Path::new("board.json"), None).unwrap();
//! let netlist = PcbReuseCore::load_netlist(Path::new("circuit.net")).unwrap();
//! let mut cache = FootprintCache::new(KicadModLibrary::new(["footprints"]));
//! let footprints = PcbReuseCore::load_footprints(&netlist, &mut cache).unwrap();
//!
//! let report = PcbReuseCore::match_circuit(netlist, board, footprints, MatchOptions::default());
//! for circuit in &report.matches {
//!     println!("{} nets, {} interventions", circuit.nets.len(), circuit.intervention_count());
//! }
//! ```
//!
//! # Features
//!
//! - **Component matching**: footprint placements over board pads, any quarter rotation, both sides
//! - **Net matching**: nets followed over copper, with jumper and add-wire repairs
//! - **Trace cuts**: conflicting copper isolated and the board rolled back on backtrack
//! - **Resumable search**: lazy iteration over complete matches, best partial match observable

pub mod board;
pub mod core;
pub mod footprint;
pub mod geometry;
pub mod ids;
pub mod matcher;
pub mod netlist;
pub mod parser;
pub mod persist;
pub mod search;

// Re-export main types
pub use board::{Board, BoardGeometry, TraceCuts};
pub use core::{MatchOptions, MatchReport, PcbReuseCore, PcbReuseError};
pub use footprint::{Footprint, FootprintCache, FootprintLibrary, FootprintSet, KicadModLibrary, MemoryLibrary};
pub use geometry::{Point, Polygon, Region, Rotation, Side};
pub use ids::{ConnectionId, MatchId, PadId, TraceId, ViaId};
pub use matcher::{ComponentMatch, ComponentMatcher, MatchArena};
pub use netlist::{NetNode, Netlist};
pub use persist::{load_matches, save_matches, SavedCircuit};
pub use search::{BestMatchHandle, CircuitMatch, CircuitMatching, Intervention, NetMatch};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Board, CircuitMatch, CircuitMatching, Intervention, MatchOptions, MatchReport, Netlist, PcbReuseCore,
        PcbReuseError, SavedCircuit,
    };
}
