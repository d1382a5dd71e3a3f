//! pcbreuse CLI - match a netlist onto an existing PCB from the command line.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use pcbreuse::footprint::split_footprint_id;
use pcbreuse::persist::{SavedIntervention, SavedMatch};
use pcbreuse::{
    load_matches, save_matches, BestMatchHandle, Board, CircuitMatching, FootprintCache, KicadModLibrary,
    MatchOptions, PcbReuseCore, SavedCircuit,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXIT_MATCH: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NO_MATCH: i32 = 2;

#[derive(Parser)]
#[command(name = "pcbreuse")]
#[command(about = "Match a netlist onto an existing PCB, planning jumper wires and trace cuts", long_about = None)]
#[command(version)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for placements realising every net of a netlist
    Match {
        /// KiCad .net export or JSON netlist
        #[arg(short, long, value_name = "FILE")]
        netlist: PathBuf,

        /// Board geometry JSON
        #[arg(short, long, value_name = "FILE")]
        board: PathBuf,

        /// Excellon drill file merged into the board
        #[arg(long, value_name = "FILE")]
        drill: Option<PathBuf>,

        /// Footprint directory (repeatable, searched in order)
        #[arg(short, long = "library", value_name = "DIR", required = true)]
        libraries: Vec<PathBuf>,

        /// JSON file with match options
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Do not plan jumper wires
        #[arg(long)]
        no_wires: bool,

        /// Do not plan trace cuts
        #[arg(long)]
        no_cuts: bool,

        /// Stop after this many matches
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Save the matches as JSON
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Report the best partial match on stderr while searching
        #[arg(long)]
        progress: bool,
    },

    /// List the placements of one footprint on the board
    Place {
        /// Board geometry JSON
        #[arg(short, long, value_name = "FILE")]
        board: PathBuf,

        /// Excellon drill file merged into the board
        #[arg(long, value_name = "FILE")]
        drill: Option<PathBuf>,

        /// Footprint directory (repeatable, searched in order)
        #[arg(short, long = "library", value_name = "DIR", required = true)]
        libraries: Vec<PathBuf>,

        /// Footprint id, LIB:NAME
        #[arg(long, value_name = "LIB:NAME")]
        footprint: String,

        /// JSON file with match options
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Re-check saved matches against a board
    Verify {
        /// Board geometry JSON
        #[arg(short, long, value_name = "FILE")]
        board: PathBuf,

        /// Excellon drill file merged into the board
        #[arg(long, value_name = "FILE")]
        drill: Option<PathBuf>,

        /// Matches written by `match --output`
        #[arg(short, long, value_name = "FILE")]
        matches: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Match {
            netlist,
            board,
            drill,
            libraries,
            config,
            no_wires,
            no_cuts,
            limit,
            format,
            output,
            progress,
        } => {
            let options = load_options(config.as_deref()).map(|mut options| {
                if no_wires {
                    options.allow_wires = false;
                }
                if no_cuts {
                    options.allow_cuts = false;
                }
                if limit.is_some() {
                    options.max_results = limit;
                }
                options
            });
            options.and_then(|options| {
                handle_match(
                    &netlist,
                    &board,
                    drill.as_deref(),
                    &libraries,
                    options,
                    format,
                    output.as_deref(),
                    progress,
                )
            })
        }
        Commands::Place {
            board,
            drill,
            libraries,
            footprint,
            config,
            format,
        } => load_options(config.as_deref())
            .and_then(|options| handle_place(&board, drill.as_deref(), &libraries, &footprint, &options, format)),
        Commands::Verify {
            board,
            drill,
            matches,
            format,
        } => handle_verify(&board, drill.as_deref(), &matches, format),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn load_options(config: Option<&Path>) -> Result<MatchOptions> {
    match config {
        Some(path) => MatchOptions::from_json_file(path)
            .with_context(|| format!("reading options from {}", path.display())),
        None => Ok(MatchOptions::default()),
    }
}

fn load_board(board: &Path, drill: Option<&Path>) -> Result<Board> {
    PcbReuseCore::load_board(board, drill).with_context(|| format!("loading board {}", board.display()))
}

#[allow(clippy::too_many_arguments)]
fn handle_match(
    netlist_path: &Path,
    board_path: &Path,
    drill: Option<&Path>,
    libraries: &[PathBuf],
    options: MatchOptions,
    format: OutputFormat,
    output: Option<&Path>,
    progress: bool,
) -> Result<i32> {
    let netlist = PcbReuseCore::load_netlist(netlist_path)
        .with_context(|| format!("loading netlist {}", netlist_path.display()))?;
    let board = load_board(board_path, drill)?;
    let mut cache = FootprintCache::new(KicadModLibrary::new(libraries.iter().cloned()));
    let footprints = PcbReuseCore::load_footprints(&netlist, &mut cache).context("loading footprints")?;
    info!(
        nets = netlist.nets().len(),
        footprints = footprints.len(),
        pads = board.pads().len(),
        "inputs loaded"
    );

    let total_nets = netlist.nets().len();
    let mut session = CircuitMatching::new(board, netlist, footprints, options);
    let stop = Arc::new(AtomicBool::new(false));
    let observer = progress.then(|| watch_progress(session.best_match_handle(), total_nets, Arc::clone(&stop)));

    let matches = session.all_matches();
    stop.store(true, Ordering::Relaxed);
    if let Some(observer) = observer {
        let _ = observer.join();
    }

    let saved: Vec<SavedCircuit> = matches.iter().map(|m| m.to_saved(session.arena())).collect();
    let best_partial = if saved.is_empty() {
        session.current_best_match()
    } else {
        None
    };

    if let Some(path) = output {
        save_matches(path, &saved).with_context(|| format!("writing {}", path.display()))?;
    }

    match format {
        OutputFormat::Human => output_matches_human(&saved, best_partial.as_ref(), total_nets),
        OutputFormat::Json => output_matches_json(&saved, best_partial.as_ref())?,
    }
    Ok(if saved.is_empty() { EXIT_NO_MATCH } else { EXIT_MATCH })
}

/// Prints the best partial match whenever it grows, until `stop` is set.
fn watch_progress(handle: BestMatchHandle, total_nets: usize, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reported = 0;
        loop {
            let done = stop.load(Ordering::Relaxed);
            let nets = handle.net_count();
            if nets > reported {
                eprintln!("progress: {}/{} nets realised", nets, total_nets);
                reported = nets;
            }
            if done {
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }
    })
}

fn output_matches_human(matches: &[SavedCircuit], best_partial: Option<&SavedCircuit>, total_nets: usize) {
    if matches.is_empty() {
        println!("No match found.");
        if let Some(best) = best_partial {
            println!("Best partial match: {}/{} nets", best.nets.len(), total_nets);
            print_circuit(best);
        }
        return;
    }

    for (i, circuit) in matches.iter().enumerate() {
        println!("\nMatch {}", i + 1);
        println!("{}", "─".repeat(60));
        print_circuit(circuit);
        println!("  Interventions: {}", circuit.intervention_count());
    }
    println!("\n{} match(es) found", matches.len());
}

fn print_circuit(circuit: &SavedCircuit) {
    for net in &circuit.nets {
        println!("  {}", net.net);
        for node in &net.nodes {
            println!("    {} {}", node.node, describe_placement(&node.placement));
        }
        for intervention in net.interventions.iter().flatten() {
            match intervention {
                SavedIntervention::Jumper { nodes } => {
                    let names: Vec<String> = nodes.iter().map(ToString::to_string).collect();
                    println!("    + jumper {}", names.join(" - "));
                }
                SavedIntervention::AddWire { missing_node, placement } => {
                    println!("    + wire to {} {}", missing_node, describe_placement(placement));
                }
                SavedIntervention::TraceCut { front_cuts, back_cuts } => {
                    println!(
                        "    + cut {} front, {} back",
                        region_count(front_cuts),
                        region_count(back_cuts)
                    );
                }
            }
        }
    }
}

fn describe_placement(m: &SavedMatch) -> String {
    format!(
        "{} at ({:.3}, {:.3}) rot {} {}",
        m.footprint,
        m.x,
        m.y,
        u16::from(m.rotation),
        m.side
    )
}

fn region_count(packed: &str) -> usize {
    if packed.is_empty() {
        0
    } else {
        packed.split("//").count()
    }
}

fn output_matches_json(matches: &[SavedCircuit], best_partial: Option<&SavedCircuit>) -> Result<()> {
    let output = serde_json::json!({
        "matches": matches,
        "best_partial": best_partial,
        "summary": {
            "matches": matches.len(),
            "interventions": matches.iter().map(SavedCircuit::intervention_count).collect::<Vec<_>>(),
        }
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_place(
    board_path: &Path,
    drill: Option<&Path>,
    libraries: &[PathBuf],
    footprint_id: &str,
    options: &MatchOptions,
    format: OutputFormat,
) -> Result<i32> {
    let board = load_board(board_path, drill)?;
    let (library, name) = split_footprint_id(footprint_id);
    if name.is_empty() {
        bail!("footprint id '{}' has no name", footprint_id);
    }
    let mut cache = FootprintCache::new(KicadModLibrary::new(libraries.iter().cloned()));
    let footprint = cache
        .load(library, name)
        .with_context(|| format!("loading footprint {}", footprint_id))?;

    let placements: Vec<SavedMatch> = PcbReuseCore::find_placements(&board, &footprint, options)
        .iter()
        .map(SavedMatch::from_match)
        .collect();

    match format {
        OutputFormat::Human => {
            println!("{} placement(s) of {}", placements.len(), footprint_id);
            for (i, m) in placements.iter().enumerate() {
                let pins: Vec<String> = m
                    .pin_pads
                    .iter()
                    .map(|(pin, pads)| {
                        let ids: Vec<String> = pads.iter().map(ToString::to_string).collect();
                        format!("{}:{}", pin, ids.join("+"))
                    })
                    .collect();
                println!("  {:>3}. {}  [{}]", i + 1, describe_placement(m), pins.join(" "));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&placements)?),
    }
    Ok(if placements.is_empty() { EXIT_NO_MATCH } else { EXIT_MATCH })
}

fn handle_verify(board_path: &Path, drill: Option<&Path>, matches_path: &Path, format: OutputFormat) -> Result<i32> {
    let board = load_board(board_path, drill)?;
    let circuits = load_matches(matches_path).with_context(|| format!("reading {}", matches_path.display()))?;

    let mut verdicts = Vec::with_capacity(circuits.len());
    for (i, circuit) in circuits.iter().enumerate() {
        let mut scratch = board.clone();
        let valid = PcbReuseCore::verify_circuit(&mut scratch, circuit)
            .with_context(|| format!("checking match {}", i + 1))?;
        verdicts.push(valid);
    }
    let all_valid = !verdicts.is_empty() && verdicts.iter().all(|v| *v);

    match format {
        OutputFormat::Human => {
            for (i, valid) in verdicts.iter().enumerate() {
                println!("Match {}: {}", i + 1, if *valid { "valid" } else { "INVALID" });
            }
            if verdicts.is_empty() {
                println!("No matches in {}", matches_path.display());
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "results": verdicts,
                "valid": all_valid,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(if all_valid { EXIT_MATCH } else { EXIT_NO_MATCH })
}
