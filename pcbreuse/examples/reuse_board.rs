//! Match a netlist onto a board and print every solution with its repairs.

use pcbreuse::persist::SavedIntervention;
use pcbreuse::prelude::*;
use pcbreuse::{FootprintCache, KicadModLibrary};
use std::path::Path;

fn main() -> Result<(), PcbReuseError> {
    let mut args = std::env::args().skip(1);
    let netlist_path = args.next().unwrap_or_else(|| "tests/fixtures/reuse.net".to_string());
    let board_path = args
        .next()
        .unwrap_or_else(|| "tests/fixtures/shorted_board.json".to_string());
    let library = args.next().unwrap_or_else(|| "tests/fixtures/footprints".to_string());

    for path in [&netlist_path, &board_path, &library] {
        if !Path::new(path).exists() {
            eprintln!("Not found: {}", path);
            eprintln!("Usage: cargo run --example reuse_board [netlist] [board.json] [footprint dir]");
            std::process::exit(1);
        }
    }

    let netlist = PcbReuseCore::load_netlist(Path::new(&netlist_path))?;
    let board = PcbReuseCore::load_board(Path::new(&board_path), None)?;
    let mut cache = FootprintCache::new(KicadModLibrary::new([library]));
    let footprints = PcbReuseCore::load_footprints(&netlist, &mut cache)?;

    let report = PcbReuseCore::match_circuit(netlist, board, footprints, MatchOptions::default());
    if !report.is_match() {
        println!("No match.");
        if let Some(best) = report.best_partial {
            println!("Best partial match covers {} net(s).", best.nets.len());
        }
        std::process::exit(2);
    }

    for (i, circuit) in report.matches.iter().enumerate() {
        println!("Match {} ({} interventions)", i + 1, circuit.intervention_count());
        for net in &circuit.nets {
            let nodes: Vec<String> = net.nodes.iter().map(|n| n.node.to_string()).collect();
            println!("  {}: {}", net.net, nodes.join(", "));
            for intervention in net.interventions.iter().flatten() {
                match intervention {
                    SavedIntervention::Jumper { nodes } => {
                        let names: Vec<String> = nodes.iter().map(ToString::to_string).collect();
                        println!("    jumper between {}", names.join(" and "));
                    }
                    SavedIntervention::AddWire { missing_node, placement } => {
                        println!("    wire to {} at ({}, {})", missing_node, placement.x, placement.y);
                    }
                    SavedIntervention::TraceCut { front_cuts, back_cuts } => {
                        let count = |s: &str| if s.is_empty() { 0 } else { s.split("//").count() };
                        println!("    cut {} front / {} back region(s)", count(front_cuts), count(back_cuts));
                    }
                }
            }
        }
    }
    Ok(())
}
