//! End-to-end matching scenarios for the pcbreuse library

use pcbreuse::matcher::MatchStore;
use pcbreuse::persist::{unpack_contours, SavedIntervention};
use pcbreuse::prelude::*;
use pcbreuse::search::{NetMatcher, NodeMatch, SearchState};
use pcbreuse::{
    BoardGeometry, ComponentMatcher, Footprint, FootprintCache, KicadModLibrary, MatchArena, NetMatch, NetNode, PadId,
    Polygon, Region, Side, TraceCuts,
};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn resistor() -> Footprint {
    Footprint::new("Passives", "R")
        .with_pad("1", Polygon::rect(-1.0, 0.0, 1.0, 1.0), false)
        .with_pad("2", Polygon::rect(1.0, 0.0, 1.0, 1.0), false)
}

fn cap() -> Footprint {
    Footprint::new("Passives", "C_Small")
        .with_pad("1", Polygon::rect(-1.0, 0.0, 1.0, 1.0), false)
        .with_pad("2", Polygon::rect(1.0, 0.0, 1.0, 1.0), false)
}

/// Pins 1 and 2 are small pads three units above pin 3.
fn sot3() -> Footprint {
    Footprint::new("Package", "SOT3")
        .with_pad("1", Polygon::rect(-1.0, -3.0, 0.8, 0.8), false)
        .with_pad("2", Polygon::rect(1.0, -3.0, 0.8, 0.8), false)
        .with_pad("3", Polygon::rect(0.0, 0.0, 1.0, 1.0), false)
}

/// Resistor outlines centred on each of `centres`, no copper between them.
fn outlines(centres: &[(f64, f64)]) -> Board {
    let mut geometry = BoardGeometry::new();
    for &(x, y) in centres {
        geometry = geometry
            .with_pad(Side::Front, Polygon::rect(x - 1.0, y, 1.0, 1.0))
            .with_pad(Side::Front, Polygon::rect(x + 1.0, y, 1.0, 1.0));
    }
    Board::new(geometry).unwrap()
}

fn single_net_netlist() -> Netlist {
    Netlist::builder()
        .component("R1", "Passives:R", 2)
        .net("N1", &["R1-1"])
        .build()
        .unwrap()
}

fn load_fixture_footprints(netlist: &Netlist) -> pcbreuse::FootprintSet {
    let mut cache = FootprintCache::new(KicadModLibrary::new([fixture_path("footprints")]));
    PcbReuseCore::load_footprints(netlist, &mut cache).unwrap()
}

#[test]
fn test_direct_single_component_match() {
    let board = outlines(&[(1.0, 0.0), (1.0, 10.0)]);
    let options = MatchOptions::default();
    let placements = ComponentMatcher::new(&resistor(), &board, &options).get_matches();
    assert_eq!(placements.len(), 2);

    let report = PcbReuseCore::match_circuit(
        single_net_netlist(),
        board,
        PcbReuseCore::footprint_set([resistor()]),
        options,
    );
    assert_eq!(report.matches.len(), 2);
    assert!(report.matches.iter().all(|m| m.intervention_count() == 0));
    assert!(report.best_partial.is_none());
}

#[test]
fn test_two_components_on_one_trace() {
    // C1-1 at (0,0), U1 with pin 3 at (0,5); a vertical strip joins them
    let geometry = BoardGeometry::new()
        .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(-1.0, 2.0, 0.8, 0.8))
        .with_pad(Side::Front, Polygon::rect(1.0, 2.0, 0.8, 0.8))
        .with_pad(Side::Front, Polygon::rect(0.0, 5.0, 1.0, 1.0))
        .with_trace(Side::Front, Region::new(Polygon::rect(0.0, 2.5, 0.6, 5.8), Vec::new()));
    let board = Board::new(geometry).unwrap();
    let netlist = Netlist::builder()
        .component("C1", "Passives:C_Small", 2)
        .component("U1", "Package:SOT3", 3)
        .net("N1", &["C1-1", "U1-3"])
        .build()
        .unwrap();

    let mut session = CircuitMatching::new(
        board,
        netlist,
        PcbReuseCore::footprint_set([cap(), sot3()]),
        MatchOptions::default(),
    );
    let matches = session.all_matches();
    assert_eq!(matches.len(), 1);
    let net = matches[0].net("N1").unwrap();
    assert_eq!(net.connections.len(), 1);
    assert!(net.interventions.is_none());
    assert_eq!(net.nodes.len(), 2);
}

#[test]
fn test_cut_isolates_pin_on_shared_trace() {
    let board = PcbReuseCore::load_board(&fixture_path("shorted_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("reuse.net")).unwrap();
    let footprints = load_fixture_footprints(&netlist);
    assert_eq!(footprints.len(), 2);

    let report = PcbReuseCore::match_circuit(netlist, board.clone(), footprints, MatchOptions::default());
    assert_eq!(report.matches.len(), 1);
    let circuit = &report.matches[0];

    let vout = circuit.net("VOUT").unwrap();
    let wires = vout.interventions.as_ref().unwrap();
    assert_eq!(wires.len(), 1);
    match &wires[0] {
        SavedIntervention::Jumper { nodes } => {
            assert!(nodes.contains(&NetNode::new("C1", "1")));
            assert!(nodes.contains(&NetNode::new("U1", "3")));
        }
        other => panic!("expected a jumper, got {:?}", other),
    }

    let iso = circuit.net("ISO").unwrap();
    let cuts = iso.interventions.as_ref().unwrap();
    assert_eq!(cuts.len(), 1);
    let SavedIntervention::TraceCut { front_cuts, back_cuts } = &cuts[0] else {
        panic!("expected a trace cut, got {:?}", cuts[0]);
    };
    assert!(back_cuts.is_empty());
    let front = unpack_contours(front_cuts).unwrap();
    assert_eq!(front.len(), 1);
    let b = front[0].bbox();
    assert!((b.min_x - 1.2).abs() < 1e-6 && (b.max_x - 2.8).abs() < 1e-6);
    assert!((b.min_y + 0.4).abs() < 1e-6 && (b.max_y - 0.4).abs() < 1e-6);

    // C1-2 is pad 1, C1-1 pad 0, U1-3 pad 4
    let mut cut_board = board;
    assert!(PcbReuseCore::verify_circuit(&mut cut_board, circuit).unwrap());
    let iso_conn = cut_board.connection_of_pad(PadId::from_raw(1));
    assert_ne!(iso_conn, cut_board.connection_of_pad(PadId::from_raw(0)));
    assert_ne!(iso_conn, cut_board.connection_of_pad(PadId::from_raw(4)));
}

#[test]
fn test_cut_not_attempted_when_disabled() {
    let board = PcbReuseCore::load_board(&fixture_path("shorted_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("reuse.net")).unwrap();
    let footprints = load_fixture_footprints(&netlist);
    let options = MatchOptions {
        allow_cuts: false,
        ..MatchOptions::default()
    };

    let report = PcbReuseCore::match_circuit(netlist, board, footprints, options);
    assert!(!report.is_match());
    let best = report.best_partial.unwrap();
    assert_eq!(best.nets.len(), 1);
    assert_eq!(best.nets[0].net, "VOUT");
}

#[test]
fn test_wire_bridges_missing_trace() {
    let board = PcbReuseCore::load_board(&fixture_path("ladder_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("ladder.json")).unwrap();
    let footprints = load_fixture_footprints(&netlist);

    let mut session = CircuitMatching::new(board, netlist, footprints, MatchOptions::default());
    let matches = session.all_matches();
    // the two outlines can be swapped between R1 and R2
    assert_eq!(matches.len(), 2);
    for m in &matches {
        assert!(m.net("A").unwrap().interventions.is_none());
        let b = m.net("B").unwrap();
        assert_eq!(b.connections.len(), 2);
        assert_eq!(
            b.interventions,
            Some(vec![Intervention::AddWire {
                missing_node: NetNode::new("R2", "2"),
                placement: m.placement_of("R2").unwrap(),
            }])
        );
    }
}

#[test]
fn test_wires_disabled_gives_no_match() {
    let board = PcbReuseCore::load_board(&fixture_path("ladder_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("ladder.json")).unwrap();
    let footprints = load_fixture_footprints(&netlist);

    let report = PcbReuseCore::match_circuit(netlist, board, footprints, MatchOptions::ideal_only());
    assert!(report.matches.is_empty());
    assert_eq!(report.best_partial.map(|b| b.nets.len()), Some(1));
}

#[test]
fn test_matches_pulled_one_by_one() {
    let board = outlines(&[(1.0, 0.0), (1.0, 10.0), (1.0, 20.0), (1.0, 30.0)]);
    let mut session = CircuitMatching::new(
        board,
        single_net_netlist(),
        PcbReuseCore::footprint_set([resistor()]),
        MatchOptions::default(),
    );

    let mut found = Vec::new();
    for _ in 0..4 {
        found.push(session.next_match().expect("four ideal solutions"));
    }
    assert!(session.next_match().is_none());

    let unique = pcbreuse::search::filter_duplicates(found.clone(), session.arena());
    assert_eq!(unique.len(), 4);
    let r1: std::collections::BTreeSet<_> = found.iter().map(|m| m.placement_of("R1").unwrap()).collect();
    assert_eq!(r1.len(), 4);
}

#[test]
fn test_result_limit_and_iterator() {
    let board = outlines(&[(1.0, 0.0), (1.0, 10.0), (1.0, 20.0)]);
    let options = MatchOptions {
        max_results: Some(2),
        ..MatchOptions::default()
    };
    let session = CircuitMatching::new(
        board,
        single_net_netlist(),
        PcbReuseCore::footprint_set([resistor()]),
        options,
    );
    assert_eq!(session.count(), 2);
}

#[test]
fn test_best_match_never_shrinks() {
    let board = PcbReuseCore::load_board(&fixture_path("ladder_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("ladder.json")).unwrap();
    let footprints = load_fixture_footprints(&netlist);

    let mut session = CircuitMatching::new(board, netlist, footprints, MatchOptions::default());
    let handle = session.best_match_handle();
    let mut last = handle.net_count();
    while session.next_match().is_some() {
        let now = handle.net_count();
        assert!(now >= last);
        last = now;
    }
    assert_eq!(last, 2);
    assert_eq!(handle.get().map(|c| c.nets.len()), Some(2));
}

#[test]
fn test_through_hole_placements_on_both_sides() {
    let geometry = BoardGeometry::new()
        .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Back, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Back, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_drill(0.0, 0.0, true)
        .with_drill(2.0, 0.0, true);
    let board = Board::new(geometry).unwrap();
    let front = board.connection_of_pad(PadId::from_raw(0));
    assert_eq!(front, board.connection_of_pad(PadId::from_raw(2)));

    let options = MatchOptions::default();
    let fp = resistor();
    let matcher = ComponentMatcher::new(&fp, &board, &options);
    let (_, on_any, full) = matcher.get_matches_on_trace(front, &["1".to_string()]);
    assert_eq!(full.len(), 2);
    assert!(on_any.iter().any(|m| m.side == Side::Front));
    assert!(on_any.iter().any(|m| m.side == Side::Back));
}

#[test]
fn test_empty_netlist_yields_one_empty_match() {
    let board = outlines(&[(1.0, 0.0)]);
    let netlist = Netlist::builder().build().unwrap();
    let mut session = CircuitMatching::new(board, netlist, Default::default(), MatchOptions::default());
    let first = session.next_match().unwrap();
    assert!(first.is_empty());
    assert!(session.next_match().is_none());
}

#[test]
fn test_first_ref_without_placements() {
    let board = outlines(&[(1.0, 0.0)]);
    let netlist = Netlist::builder()
        .component("U1", "Package:SOT3", 3)
        .net("N1", &["U1-3"])
        .build()
        .unwrap();
    let report = PcbReuseCore::match_circuit(
        netlist,
        board,
        PcbReuseCore::footprint_set([sot3()]),
        MatchOptions::default(),
    );
    assert!(!report.is_match());
    assert!(report.best_partial.is_none());
}

#[test]
fn test_duplicate_filter_is_idempotent() {
    let board = PcbReuseCore::load_board(&fixture_path("ladder_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("ladder.json")).unwrap();
    let footprints = load_fixture_footprints(&netlist);

    let mut session = CircuitMatching::new(board, netlist, footprints, MatchOptions::default());
    let once = session.all_matches();
    let mut doubled = once.clone();
    doubled.extend(once.iter().cloned());
    let twice = pcbreuse::search::filter_duplicates(doubled, session.arena());
    assert_eq!(twice, once);
}

#[test]
fn test_saved_matches_survive_a_file() {
    let board = PcbReuseCore::load_board(&fixture_path("shorted_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("reuse.net")).unwrap();
    let footprints = load_fixture_footprints(&netlist);
    let report = PcbReuseCore::match_circuit(netlist, board.clone(), footprints, MatchOptions::default());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches.json");
    pcbreuse::save_matches(&path, &report.matches).unwrap();

    // hand-edited keys stay in place
    let mut raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw[0][0]["note"] = serde_json::Value::from("checked");
    std::fs::write(&path, raw.to_string()).unwrap();

    let loaded = pcbreuse::load_matches(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].nets[0].extra["note"], "checked");
    assert_eq!(loaded[0].intervention_count(), report.matches[0].intervention_count());

    let mut arena = MatchArena::new();
    let circuit = loaded[0].clone().into_circuit(&mut arena, &board).unwrap();
    assert_eq!(circuit.len(), 2);
    assert_eq!(circuit.intervention_count(), 2);
    assert!(circuit.placement_of("U1").is_some());
}

#[test]
fn test_tampered_match_fails_verification() {
    let board = PcbReuseCore::load_board(&fixture_path("shorted_board.json"), None).unwrap();
    let netlist = PcbReuseCore::load_netlist(&fixture_path("reuse.net")).unwrap();
    let footprints = load_fixture_footprints(&netlist);
    let report = PcbReuseCore::match_circuit(netlist, board.clone(), footprints, MatchOptions::default());

    let mut tampered = report.matches[0].clone();
    let vout = tampered.nets.iter_mut().find(|n| n.net == "VOUT").unwrap();
    vout.interventions = None;
    let mut fresh = board;
    assert!(!PcbReuseCore::verify_circuit(&mut fresh, &tampered).unwrap());
}

/// Two-pin through-hole connector, pins two units apart.
fn header() -> Footprint {
    Footprint::new("Connector", "J")
        .with_pad("1", Polygon::rect(-1.0, 0.0, 1.0, 1.0), true)
        .with_pad("2", Polygon::rect(1.0, 0.0, 1.0, 1.0), true)
}

/// Resistor outlines at y=0 and y=10, each with both pads on one trace.
fn shorted_outlines() -> Board {
    let geometry = BoardGeometry::new()
        .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(0.0, 10.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(2.0, 10.0, 1.0, 1.0))
        .with_trace(Side::Front, Region::new(Polygon::rect(1.0, 0.0, 3.0, 0.4), Vec::new()))
        .with_trace(Side::Front, Region::new(Polygon::rect(1.0, 10.0, 3.0, 0.4), Vec::new()));
    Board::new(geometry).unwrap()
}

fn split_pins_netlist(reference: &str, footprint: &str) -> Netlist {
    let one = format!("{}-1", reference);
    let two = format!("{}-2", reference);
    Netlist::builder()
        .component(reference, footprint, 2)
        .net("A", &[one.as_str()])
        .net("B", &[two.as_str()])
        .build()
        .unwrap()
}

#[test]
fn test_notch_that_leaves_pads_joined_fails_verification() {
    // R1 pads share one long trace; the notch bites its edge far from both
    let geometry = BoardGeometry::new()
        .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_trace(Side::Front, Region::new(Polygon::rect(3.7, 0.0, 8.6, 0.8), Vec::new()));
    let board = Board::new(geometry).unwrap();
    let shared = board.connection_of_pad(PadId::from_raw(0));
    assert_eq!(shared, board.connection_of_pad(PadId::from_raw(1)));

    let options = MatchOptions::default();
    let mut arena = MatchArena::new();
    let placement = arena.intern(ComponentMatcher::new(&resistor(), &board, &options).get_matches().remove(0));
    let node = |pin: &str| NodeMatch {
        node: NetNode::new("R1", pin),
        placement,
        pads: arena[placement].pads_of(pin).to_vec(),
    };

    let mut notch = TraceCuts::default();
    notch.push(Side::Front, Polygon::rect(7.0, 0.4, 0.2, 0.2));
    let a = NetMatch {
        net: "A".into(),
        nodes: vec![node("1")],
        connections: BTreeSet::from([shared]),
        interventions: None,
    };
    let b = NetMatch {
        net: "B".into(),
        nodes: vec![node("2")],
        connections: BTreeSet::from([shared]),
        interventions: Some(vec![Intervention::TraceCut(notch)]),
    };
    let saved = CircuitMatch::new(vec![a, b]).to_saved(&arena);

    let mut checked = board.clone();
    assert!(!PcbReuseCore::verify_circuit(&mut checked, &saved).unwrap());
    assert_eq!(
        checked.connection_of_pad(PadId::from_raw(0)),
        checked.connection_of_pad(PadId::from_raw(1))
    );
}

#[test]
fn test_resume_skips_alternatives_of_the_seed() {
    let centres = [(1.0, 0.0), (1.0, 10.0), (1.0, 20.0), (1.0, 30.0)];
    let fps = || PcbReuseCore::footprint_set([resistor()]);

    let mut walk = CircuitMatching::new(outlines(&centres), single_net_netlist(), fps(), MatchOptions::default());
    let mut order = Vec::new();
    while let Some(m) = walk.next_match() {
        order.push(walk.arena()[m.placement_of("R1").unwrap()].y);
    }
    assert_eq!(order.len(), 4);

    let mut session = CircuitMatching::new(outlines(&centres), single_net_netlist(), fps(), MatchOptions::default());
    let y_of = |session: &CircuitMatching, m: &CircuitMatch| session.arena()[m.placement_of("R1").unwrap()].y;
    let first = session.next_match().unwrap();
    assert_eq!(y_of(&session, &first), order[0]);
    let skipped = session.recursive_search_from_match(1).unwrap();
    assert_eq!(y_of(&session, &skipped), order[2]);
    let last = session.next_match().unwrap();
    assert_eq!(y_of(&session, &last), order[3]);
    assert!(session.next_match().is_none());
}

#[test]
fn test_wire_cursor_walks_every_candidate() {
    let board = outlines(&[(1.0, 0.0), (1.0, 10.0)]);
    let netlist = Netlist::builder()
        .component("R1", "Passives:R", 2)
        .component("R2", "Passives:R", 2)
        .net("A", &["R1-1", "R2-1"])
        .build()
        .unwrap();
    let fps = PcbReuseCore::footprint_set([resistor()]);
    let options = MatchOptions::default();
    let matcher = NetMatcher::new(&board, &netlist, &fps, &options);
    let mut store = MatchStore::new();
    let state = SearchState::default();

    let all = matcher.find_wire_interventions(&mut store, &state, 0);
    assert!(all.len() >= 2);
    assert!(all.iter().all(|c| c.intervention_count() == 1));
    for (i, expected) in all.iter().enumerate() {
        assert_eq!(matcher.fwi_fifo(&mut store, &state, 0, i).as_ref(), Some(expected));
    }
    assert!(matcher.fwi_fifo(&mut store, &state, 0, all.len()).is_none());
}

#[test]
fn test_cut_cursor_walks_every_candidate() {
    let board = shorted_outlines();
    let netlist = split_pins_netlist("R1", "Passives:R");
    let fps = PcbReuseCore::footprint_set([resistor()]);
    let options = MatchOptions::default();
    let matcher = NetMatcher::new(&board, &netlist, &fps, &options);
    let mut store = MatchStore::new();
    let state = SearchState::default();
    let a = netlist.net_index("A").unwrap();

    let all = matcher.trace_cut_candidates(&mut store, &state, a);
    assert!(all.len() >= 2);
    for (i, (candidate, cuts)) in all.iter().enumerate() {
        let (got, got_cuts) = matcher.trace_cut_fifo(&mut store, &state, a, i).unwrap();
        assert_eq!(&got, candidate);
        assert_eq!(&got_cuts, cuts);
        assert!(!cuts.front.is_empty());
    }
    assert!(matcher.trace_cut_fifo(&mut store, &state, a, all.len()).is_none());
}

#[test]
fn test_dangling_pins_may_sit_off_pad() {
    // only pin 3 of the SOT3 has a board pad
    let geometry = BoardGeometry::new().with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0));
    let board = Board::new(geometry).unwrap();
    let netlist = Netlist::builder()
        .component("U1", "Package:SOT3", 3)
        .net("N1", &["U1-3"])
        .build()
        .unwrap();
    let fps = || PcbReuseCore::footprint_set([sot3()]);

    let strict = PcbReuseCore::match_circuit(netlist.clone(), board.clone(), fps(), MatchOptions::default());
    assert!(!strict.is_match());

    let options = MatchOptions {
        allow_dangling_unconnected_pins: true,
        ..MatchOptions::default()
    };
    let report = PcbReuseCore::match_circuit(netlist, board, fps(), options);
    assert_eq!(report.matches.len(), 1);
    let n1 = report.matches[0].net("N1").unwrap();
    assert_eq!(n1.nodes.len(), 1);
    assert_eq!(n1.nodes[0].pads, vec![PadId::from_raw(0)]);
    assert!(n1.interventions.is_none());
}

#[test]
fn test_through_hole_pin_cut_on_back_copper() {
    // J2 pads go through both sides; only the back trace shorts them
    let geometry = BoardGeometry::new()
        .with_pad(Side::Front, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Front, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Back, Polygon::rect(0.0, 0.0, 1.0, 1.0))
        .with_pad(Side::Back, Polygon::rect(2.0, 0.0, 1.0, 1.0))
        .with_drill(0.0, 0.0, true)
        .with_drill(2.0, 0.0, true)
        .with_trace(Side::Back, Region::new(Polygon::rect(1.0, 0.0, 3.0, 0.6), Vec::new()));
    let board = Board::new(geometry).unwrap();
    assert_eq!(
        board.connection_of_pad(PadId::from_raw(0)),
        board.connection_of_pad(PadId::from_raw(1))
    );

    let report = PcbReuseCore::match_circuit(
        split_pins_netlist("J2", "Connector:J"),
        board.clone(),
        PcbReuseCore::footprint_set([header()]),
        MatchOptions::default(),
    );
    assert!(report.is_match());
    for circuit in &report.matches {
        let cuts: Vec<&SavedIntervention> = circuit
            .nets
            .iter()
            .filter_map(|n| n.interventions.as_ref())
            .flatten()
            .collect();
        assert!(!cuts.is_empty());
        for cut in cuts {
            let SavedIntervention::TraceCut { front_cuts, back_cuts } = cut else {
                panic!("expected a trace cut, got {:?}", cut);
            };
            assert!(front_cuts.is_empty());
            assert!(!unpack_contours(back_cuts).unwrap().is_empty());
        }

        let mut cut_board = board.clone();
        assert!(PcbReuseCore::verify_circuit(&mut cut_board, circuit).unwrap());
        assert_ne!(
            cut_board.connection_of_pad(PadId::from_raw(0)),
            cut_board.connection_of_pad(PadId::from_raw(1))
        );
    }
}
