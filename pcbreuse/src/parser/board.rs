//! Board geometry readers: the JSON geometry document produced by the PCB
//! rendering step, and Excellon drill files.

use tracing::debug;

use crate::board::{BoardGeometry, Drill};
use crate::core::PcbReuseError;

/// Parses a [`BoardGeometry`] JSON document:
///
/// ```json
/// {
///   "front_pads": [[[0, 0], [1, 0], [1, 1], [0, 1]]],
///   "back_pads": [],
///   "front_traces": [{"outer": [[...]], "holes": [[[...]]]}],
///   "back_traces": [],
///   "drills": [{"x": 0.5, "y": 0.5, "through_hole": true}],
///   "has_back": false
/// }
/// ```
pub fn parse_board_json(content: &str) -> Result<BoardGeometry, PcbReuseError> {
    serde_json::from_str(content)
        .map_err(|e| PcbReuseError::MalformedInput(format!("board geometry: {}", e)))
}

/// Appends drills, skipping holes already present at the same spot.
pub fn merge_drills(geometry: &mut BoardGeometry, drills: Vec<Drill>) {
    for drill in drills {
        let dup = geometry
            .drills
            .iter()
            .any(|d| (d.x - drill.x).abs() < 1e-6 && (d.y - drill.y).abs() < 1e-6);
        if !dup {
            geometry.drills.push(drill);
        }
    }
}

/// Reads hole positions from an Excellon drill file.
///
/// Plating comes from the `TF.FileFunction` attribute when present, else
/// from `plated`. Inch files are converted to millimetres.
pub fn parse_excellon(content: &str, plated: bool) -> Result<Vec<Drill>, PcbReuseError> {
    let mut through_hole = plated;
    let mut scale = 1.0;
    let mut in_header = false;
    let mut x = 0.0;
    let mut y = 0.0;
    let mut drills = Vec::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix(';') {
            if comment.contains("TF.FileFunction") {
                if comment.contains("NonPlated") {
                    through_hole = false;
                } else if comment.contains("Plated") {
                    through_hole = true;
                }
            }
            continue;
        }
        match line {
            "M48" => in_header = true,
            "%" | "M95" => in_header = false,
            _ if line.starts_with("INCH") => scale = 25.4,
            _ if line.starts_with("METRIC") => scale = 1.0,
            _ if !in_header && (line.starts_with('X') || line.starts_with('Y')) => {
                let (nx, ny) = parse_coordinates(line).ok_or_else(|| {
                    PcbReuseError::MalformedInput(format!("drill line {}: '{}'", lineno + 1, line))
                })?;
                if let Some(v) = nx {
                    x = v * scale;
                }
                if let Some(v) = ny {
                    y = v * scale;
                }
                drills.push(Drill { x, y, through_hole });
            }
            _ => {}
        }
    }
    debug!(holes = drills.len(), "drill file parsed");
    Ok(drills)
}

fn parse_coordinates(line: &str) -> Option<(Option<f64>, Option<f64>)> {
    let (x_part, y_part) = match line.find('Y') {
        Some(i) => (&line[..i], Some(&line[i + 1..])),
        None => (line, None),
    };
    let x = match x_part.strip_prefix('X') {
        Some(v) => Some(v.parse().ok()?),
        None if x_part.is_empty() => None,
        None => return None,
    };
    let y = match y_part {
        Some(v) => Some(v.parse().ok()?),
        None => None,
    };
    Some((x, y))
}
