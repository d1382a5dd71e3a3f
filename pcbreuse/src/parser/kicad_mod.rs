//! KiCad footprint reader (`.kicad_mod`, KiCad 5+ `module` and 6+ `footprint` roots).
//!
//! Pad shapes are reduced to straight-edged polygons: every pad becomes its
//! `(size w h)` rectangle placed at `(at x y [angle])`. Round and oval pads
//! are approximated by that rectangle. The outline is taken from the
//! courtyard layer.

use thiserror::Error;

use crate::footprint::Footprint;
use crate::geometry::{BBox, Point, Polygon};
use crate::parser::sexp::{ParseError, SExp, SExpParser};

#[derive(Debug, Error)]
pub enum FootprintParseError {
    #[error("S-expression parse error: {0}")]
    SExpParse(#[from] ParseError),
    #[error("Invalid footprint format: {0}")]
    InvalidFormat(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

pub struct KicadModParser;

impl KicadModParser {
    /// Parses a footprint. The library name is left empty for the caller to fill.
    pub fn parse_str(content: &str) -> Result<Footprint, FootprintParseError> {
        let root = SExpParser::new(content).parse()?;
        match root.head() {
            Some("footprint") | Some("module") => {}
            other => {
                return Err(FootprintParseError::InvalidFormat(format!(
                    "expected footprint root, found {}",
                    other.unwrap_or("atom")
                )))
            }
        }
        let name = root
            .atom_at(1)
            .ok_or_else(|| FootprintParseError::MissingField("footprint name".to_string()))?;
        let mut footprint = Footprint::new("", name);

        for pad in root.find_all("pad") {
            let Some(pin) = pad.atom_at(1) else {
                continue;
            };
            let kind = pad.atom_at(2).unwrap_or("smd");
            // mechanical holes carry no copper to solder to
            if pin.is_empty() || kind == "np_thru_hole" {
                continue;
            }
            footprint.add_pad(pin, Self::pad_polygon(pad, pin)?, kind == "thru_hole");
        }

        if let Some(outline) = Self::courtyard(&root) {
            footprint.outline.extend(outline);
        }
        Ok(footprint)
    }

    fn pad_polygon(pad: &SExp, pin: &str) -> Result<Polygon, FootprintParseError> {
        let at = pad.numbers("at");
        let size = pad.numbers("size");
        if at.len() < 2 {
            return Err(FootprintParseError::MissingField(format!("(at) of pad {}", pin)));
        }
        if size.is_empty() {
            return Err(FootprintParseError::MissingField(format!("(size) of pad {}", pin)));
        }
        let (w, h) = (size[0], *size.get(1).unwrap_or(&size[0]));
        let angle = at.get(2).copied().unwrap_or(0.0);
        let (sin, cos) = angle.to_radians().sin_cos();
        let corners = [(-w / 2.0, -h / 2.0), (w / 2.0, -h / 2.0), (w / 2.0, h / 2.0), (-w / 2.0, h / 2.0)];
        let points = corners
            .iter()
            .map(|&(x, y)| {
                let (rx, ry) = (x * cos - y * sin, x * sin + y * cos);
                Point::new(snap(at[0] + rx), snap(at[1] + ry))
            })
            .collect();
        Ok(Polygon::new(points))
    }

    fn courtyard(root: &SExp) -> Option<Vec<Polygon>> {
        let on_courtyard = |item: &SExp| item.value("layer").map_or(false, |l| l.ends_with(".CrtYd"));
        let mut polygons = Vec::new();
        let mut loose: Vec<Point> = Vec::new();

        for item in root.as_list()? {
            if !on_courtyard(item) {
                continue;
            }
            match item.head() {
                Some("fp_line") | Some("fp_rect") => {
                    for key in ["start", "end"] {
                        let xy = item.numbers(key);
                        if xy.len() >= 2 {
                            loose.push(Point::new(xy[0], xy[1]));
                        }
                    }
                }
                Some("fp_poly") => {
                    let pts: Vec<Point> = item
                        .find("pts")
                        .map(|pts| {
                            pts.find_all("xy")
                                .filter_map(|xy| {
                                    let x = xy.atom_at(1)?.parse().ok()?;
                                    let y = xy.atom_at(2)?.parse().ok()?;
                                    Some(Point::new(x, y))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    if pts.len() >= 3 {
                        polygons.push(Polygon::new(pts));
                    }
                }
                _ => {}
            }
        }

        if loose.len() >= 2 {
            let mut bbox = BBox {
                min_x: f64::INFINITY,
                min_y: f64::INFINITY,
                max_x: f64::NEG_INFINITY,
                max_y: f64::NEG_INFINITY,
            };
            for p in &loose {
                bbox.min_x = bbox.min_x.min(p.x);
                bbox.min_y = bbox.min_y.min(p.y);
                bbox.max_x = bbox.max_x.max(p.x);
                bbox.max_y = bbox.max_y.max(p.y);
            }
            if bbox.width() > 0.0 && bbox.height() > 0.0 {
                polygons.push(bbox.to_polygon());
            }
        }
        (!polygons.is_empty()).then_some(polygons)
    }
}

/// Rounds away trigonometric noise (1e-16) from rotated corners.
fn snap(v: f64) -> f64 {
    (v * 1e9).round() / 1e9
}
