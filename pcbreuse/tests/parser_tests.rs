//! Parser and loader tests against the fixture files

use pcbreuse::footprint::FootprintLibrary;
use pcbreuse::parser::{parse_excellon, KicadModParser, KicadNetlistParser};
use pcbreuse::prelude::*;
use pcbreuse::{FootprintCache, KicadModLibrary, MemoryLibrary, PadId};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_parse_kicad_netlist_fixture() {
    let content = std::fs::read_to_string(fixture_path("reuse.net")).unwrap();
    let netlist = KicadNetlistParser::parse_str(&content).unwrap();
    assert_eq!(netlist.nets().len(), 2);
    assert_eq!(netlist.sorted_refs(), vec!["U1", "C1"]);
    assert_eq!(netlist.component("U1").unwrap().total_pins, 3);
    assert_eq!(netlist.component("C1").unwrap().footprint, "Passives:C_Small");
    assert_eq!(netlist.net_of("U1", "3"), netlist.net_index("VOUT"));
    assert_eq!(netlist.net_of("U1", "1"), None);
}

#[test]
fn test_load_netlist_by_extension() {
    let kicad = PcbReuseCore::load_netlist(&fixture_path("reuse.net")).unwrap();
    assert!(kicad.component("C1").is_some());
    let json = PcbReuseCore::load_netlist(&fixture_path("ladder.json")).unwrap();
    assert_eq!(json.nets().len(), 2);
    assert_eq!(json.footprint_dict()["Passives:R"], vec!["R1", "R2"]);
}

#[test]
fn test_footprint_fixtures_resolve() {
    let library = KicadModLibrary::new([fixture_path("footprints")]);
    let cap = library.load("Passives", "C_Small").unwrap();
    assert_eq!(cap.id(), "Passives:C_Small");
    assert_eq!(cap.pins.len(), 2);
    assert_eq!(cap.outline.len(), 1);

    let sot = library.load("Package", "SOT3").unwrap();
    assert_eq!(sot.pad_count(), 3);
    let small = sot.pin("1").unwrap().pads[0].shape.bbox();
    assert!((small.width() - 0.8).abs() < 1e-9);
}

#[test]
fn test_missing_footprint_reports_attempts() {
    let library = KicadModLibrary::new([fixture_path("footprints")]);
    let err = library.load("Passives", "L_0603").unwrap_err();
    match err {
        PcbReuseError::RenderFailed { footprint, attempts, .. } => {
            assert_eq!(footprint, "L_0603");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unsupported_footprint_is_skipped() {
    // only a mounting hole: parses, but nothing to solder
    let mut hole =
        KicadModParser::parse_str(r#"(footprint "Hole" (pad "" np_thru_hole circle (at 0 0) (size 3 3) (drill 3)))"#)
            .unwrap();
    hole.library = "Mech".to_string();
    let netlist = Netlist::builder()
        .component("H1", "Mech:Hole", 0)
        .component("R1", "Mech:Missing", 2)
        .net("N1", &["R1-1"])
        .build()
        .unwrap();

    let mut cache = FootprintCache::new(MemoryLibrary::new().with(hole));
    let err = PcbReuseCore::load_footprints(&netlist, &mut cache).unwrap_err();
    assert!(matches!(err, PcbReuseError::RenderFailed { .. }));

    let only_hole = Netlist::builder()
        .component("H1", "Mech:Hole", 0)
        .component("R1", "Mech:Hole", 2)
        .net("N1", &["R1-1"])
        .build()
        .unwrap();
    let set = PcbReuseCore::load_footprints(&only_hole, &mut cache).unwrap();
    assert!(set.is_empty());
}

#[test]
fn test_board_fixture_connections() {
    let board = PcbReuseCore::load_board(&fixture_path("shorted_board.json"), None).unwrap();
    assert_eq!(board.pads().len(), 5);
    assert!(!board.has_back());
    let shared = board.connection_of_pad(PadId::from_raw(0));
    assert_eq!(shared, board.connection_of_pad(PadId::from_raw(1)));
    assert_eq!(shared, board.connection_of_pad(PadId::from_raw(4)));
    assert_ne!(shared, board.connection_of_pad(PadId::from_raw(2)));
}

#[test]
fn test_malformed_board_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.json");
    std::fs::write(&path, r#"{"front_pads": "nope"}"#).unwrap();
    let err = PcbReuseCore::load_board(&path, None).unwrap_err();
    assert!(matches!(err, PcbReuseError::MalformedInput(_)));
}

#[test]
fn test_drill_file_merged_into_board() {
    let dir = tempfile::tempdir().unwrap();
    let board_path = dir.path().join("board.json");
    std::fs::write(
        &board_path,
        r#"{
  "front_pads": [[[-0.75, -0.75], [0.75, -0.75], [0.75, 0.75], [-0.75, 0.75]]],
  "back_pads": [[[-0.75, -0.75], [0.75, -0.75], [0.75, 0.75], [-0.75, 0.75]]]
}"#,
    )
    .unwrap();
    let drill_path = dir.path().join("board-PTH.drl");
    std::fs::write(&drill_path, "M48\nMETRIC\nT1C0.800\n%\nG90\nT1\nX0.0Y0.0\nM30\n").unwrap();

    let drills = parse_excellon(&std::fs::read_to_string(&drill_path).unwrap(), true).unwrap();
    assert_eq!(drills.len(), 1);

    let board = PcbReuseCore::load_board(&board_path, Some(&drill_path)).unwrap();
    assert_eq!(board.vias().len(), 1);
    assert_eq!(
        board.connection_of_pad(PadId::from_raw(0)),
        board.connection_of_pad(PadId::from_raw(1))
    );
}

#[test]
fn test_options_file() {
    let options = MatchOptions::from_json_file(&fixture_path("ladder_options.json")).unwrap();
    assert!(!options.allow_cuts);
    assert!(options.allow_wires);
    assert_eq!(options.max_results, Some(4));
    assert!((options.cut_line_width - 0.25).abs() < 1e-12);
}
