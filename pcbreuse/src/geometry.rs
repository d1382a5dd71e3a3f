//! Planar geometry used by the board model and the matchers.
//!
//! Polygons are closed, straight-edged and stored as plain point lists so
//! they serialize compactly (`[[x, y], ...]`). Boolean operations (cut
//! intersection and subtraction) go through `cavalier_contours`; the cheap
//! predicates (containment, bbox, centroid) are computed directly.

use cavalier_contours::polyline::{BooleanOp, BooleanResultInfo, PlineSource, PlineVertex, Polyline};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this absolute area a boolean result is treated as a sliver.
pub const MIN_PIECE_AREA: f64 = 1e-6;

/// How far cut polygons are pushed outward before subtraction, so a cut
/// flush with a trace edge severs it instead of leaving a zero-width bridge.
pub const CUT_MARGIN: f64 = 1e-3;

const EPS: f64 = 1e-9;

/// Board side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Front => write!(f, "front"),
            Side::Back => write!(f, "back"),
        }
    }
}

/// Footprint rotation, counter-clockwise, in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Whether the rotation swaps the bbox width and height.
    pub fn is_quarter(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }

    fn apply(self, p: Point) -> Point {
        match self {
            Rotation::R0 => p,
            Rotation::R90 => Point::new(-p.y, p.x),
            Rotation::R180 => Point::new(-p.x, -p.y),
            Rotation::R270 => Point::new(p.y, -p.x),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(r: Rotation) -> u16 {
        r.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            other => Err(format!("unsupported rotation {} (expected 0, 90, 180 or 270)", other)),
        }
    }
}

/// 2D point. Serializes as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn overlaps(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn expanded(&self, by: f64) -> BBox {
        BBox {
            min_x: self.min_x - by,
            min_y: self.min_y - by,
            max_x: self.max_x + by,
            max_y: self.max_y + by,
        }
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ])
    }
}

/// Rigid placement of footprint-local geometry onto the board: mirror
/// (back side), rotate, then translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub origin: Point,
    pub rotation: Rotation,
    pub side: Side,
}

impl Placement {
    pub fn new(origin: Point, rotation: Rotation, side: Side) -> Self {
        Self { origin, rotation, side }
    }

    /// Maps a footprint-local point into board coordinates.
    pub fn apply(&self, p: Point) -> Point {
        let local = self.orient(p);
        Point::new(local.x + self.origin.x, local.y + self.origin.y)
    }

    /// Mirror and rotation only.
    pub fn orient(&self, p: Point) -> Point {
        let mirrored = match self.side {
            Side::Front => p,
            Side::Back => Point::new(-p.x, p.y),
        };
        self.rotation.apply(mirrored)
    }
}

/// Closed straight-edged polygon. Serializes as `[[x, y], ...]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle centred on `(cx, cy)`.
    pub fn rect(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        BBox {
            min_x: cx - width / 2.0,
            min_y: cy - height / 2.0,
            max_x: cx + width / 2.0,
            max_y: cy + height / 2.0,
        }
        .to_polygon()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shoelace area; positive for counter-clockwise point order.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            acc += a.x * b.y - b.x * a.y;
        }
        acc / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area centroid, falling back to the vertex average for degenerate shapes.
    pub fn centroid(&self) -> Point {
        let n = self.points.len();
        if n == 0 {
            return Point::new(0.0, 0.0);
        }
        let a = self.signed_area();
        if a.abs() < EPS {
            let sx: f64 = self.points.iter().map(|p| p.x).sum();
            let sy: f64 = self.points.iter().map(|p| p.y).sum();
            return Point::new(sx / n as f64, sy / n as f64);
        }
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            let cross = p.x * q.y - q.x * p.y;
            cx += (p.x + q.x) * cross;
            cy += (p.y + q.y) * cross;
        }
        Point::new(cx / (6.0 * a), cy / (6.0 * a))
    }

    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for p in &self.points {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        bbox
    }

    /// Even-odd point containment.
    pub fn contains(&self, p: &Point) -> bool {
        let pts = &self.points;
        let n = pts.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (pi, pj) = (pts[i], pts[j]);
            if (pi.y > p.y) != (pj.y > p.y) {
                let x_cross = (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Polygon {
        Polygon::new(self.points.iter().map(|p| p.offset(dx, dy)).collect())
    }

    pub fn placed(&self, placement: &Placement) -> Polygon {
        Polygon::new(self.points.iter().map(|p| placement.apply(*p)).collect())
    }

    /// Bbox of the polygon grown by `width` on every side.
    pub fn dilated(&self, width: f64) -> Polygon {
        self.bbox().expanded(width).to_polygon()
    }

    /// Every vertex pushed `margin` further away from the centroid.
    pub fn grown(&self, margin: f64) -> Polygon {
        let c = self.centroid();
        Polygon::new(
            self.points
                .iter()
                .map(|p| {
                    let d = p.distance_to(&c);
                    if d < EPS {
                        *p
                    } else {
                        p.offset((p.x - c.x) / d * margin, (p.y - c.y) / d * margin)
                    }
                })
                .collect(),
        )
    }

    /// Counter-clockwise polyline for boolean operations.
    pub fn to_pline(&self) -> Polyline<f64> {
        let mut pl = Polyline::new_closed();
        if self.signed_area() < 0.0 {
            for p in self.points.iter().rev() {
                pl.vertex_data.push(PlineVertex::new(p.x, p.y, 0.0));
            }
        } else {
            for p in &self.points {
                pl.vertex_data.push(PlineVertex::new(p.x, p.y, 0.0));
            }
        }
        pl
    }

    pub fn from_pline(pl: &Polyline<f64>) -> Polygon {
        Polygon::new(pl.vertex_data.iter().map(|v| Point::new(v.x, v.y)).collect())
    }

    /// Pieces of `self ∩ other`.
    pub fn intersection(&self, other: &Polygon) -> Vec<Polygon> {
        if !self.bbox().overlaps(&other.bbox()) {
            return Vec::new();
        }
        let a = self.to_pline();
        let b = other.to_pline();
        let res = a.boolean(&b, BooleanOp::And);
        match res.result_info {
            BooleanResultInfo::Disjoint | BooleanResultInfo::InvalidInput => Vec::new(),
            _ => res
                .pos_plines
                .iter()
                .map(|p| Polygon::from_pline(&p.pline))
                .filter(|p| p.area() > MIN_PIECE_AREA)
                .collect(),
        }
    }
}

/// Copper region: an outer contour minus inner holes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub outer: Polygon,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Polygon>,
}

impl Region {
    pub fn new(outer: Polygon, holes: Vec<Polygon>) -> Self {
        Self { outer, holes }
    }

    pub fn bbox(&self) -> BBox {
        self.outer.bbox()
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.outer.contains(p) && !self.holes.iter().any(|h| h.contains(p))
    }

    /// Whether `shape` shares copper with the region, judged by its centroid
    /// and its vertices.
    pub fn touches(&self, shape: &Polygon) -> bool {
        if !self.bbox().overlaps(&shape.bbox()) {
            return false;
        }
        self.contains(&shape.centroid()) || shape.points.iter().any(|p| self.contains(p))
    }

    /// Removes `cut` from the region. Returns the surviving pieces with their
    /// holes; an untouched region comes back as a single piece.
    pub fn subtract(&self, cut: &Polygon) -> Vec<Region> {
        if !self.bbox().overlaps(&cut.bbox()) {
            return vec![self.clone()];
        }
        let res = self.outer.to_pline().boolean(&cut.to_pline(), BooleanOp::Not);
        let (mut pieces, mut holes): (Vec<Polyline<f64>>, Vec<Polyline<f64>>) = match res.result_info {
            BooleanResultInfo::Disjoint | BooleanResultInfo::InvalidInput => {
                return vec![self.clone()];
            }
            _ => (
                res.pos_plines.into_iter().map(|p| p.pline).collect(),
                res.neg_plines.into_iter().map(|p| p.pline).collect(),
            ),
        };

        for hole in &self.holes {
            let hole_pl = hole.to_pline();
            let mut next = Vec::with_capacity(pieces.len());
            for piece in pieces {
                let r = piece.boolean(&hole_pl, BooleanOp::Not);
                match r.result_info {
                    BooleanResultInfo::Disjoint | BooleanResultInfo::InvalidInput => next.push(piece),
                    _ => {
                        next.extend(r.pos_plines.into_iter().map(|p| p.pline));
                        holes.extend(r.neg_plines.into_iter().map(|p| p.pline));
                    }
                }
            }
            pieces = next;
        }

        let mut out: Vec<Region> = pieces
            .iter()
            .map(Polygon::from_pline)
            .filter(|p| p.area() > MIN_PIECE_AREA)
            .map(|outer| Region::new(outer, Vec::new()))
            .collect();
        for hole in holes.iter().map(Polygon::from_pline) {
            if hole.area() <= MIN_PIECE_AREA {
                continue;
            }
            let probe = hole.points[0];
            let owner = out.iter_mut().find(|r| {
                r.outer.contains(&probe) || r.outer.contains(&hole.centroid())
            });
            if let Some(region) = owner {
                region.holes.push(hole);
            }
        }
        out
    }
}
