//! Saved matches.
//!
//! A circuit match is written as a JSON list of net dicts:
//!
//! ```text
//! [{"connections": [..], "net": "N1",
//!   "nodes": [{"node": "C1-1", "match": {..}, "pads": [..]}],
//!   "interventions": [..]}]
//! ```
//!
//! A placement (`match`) carries its footprint, origin, rotation, side, the
//! pads under each pin and the footprint contours packed as text: points
//! `x,y` joined by `*`, contours joined by `//`. Keys this module does not
//! know are kept in `extra` and written back unchanged.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::board::{Board, TraceCuts};
use crate::core::PcbReuseError;
use crate::geometry::{Point, Polygon, Rotation, Side};
use crate::ids::{ConnectionId, PadId};
use crate::matcher::{ComponentMatch, MatchArena};
use crate::netlist::NetNode;
use crate::search::{CircuitMatch, Intervention, NetMatch, NodeMatch};

const POINT_SEPARATOR: char = '*';
const CONTOUR_SEPARATOR: &str = "//";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMatch {
    pub footprint: String,
    pub x: f64,
    pub y: f64,
    pub rotation: Rotation,
    pub side: Side,
    pub pin_pads: BTreeMap<String, Vec<PadId>>,
    #[serde(default)]
    pub fp_contours: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SavedMatch {
    pub fn from_match(m: &ComponentMatch) -> Self {
        Self {
            footprint: m.footprint.clone(),
            x: m.x,
            y: m.y,
            rotation: m.rotation,
            side: m.side,
            pin_pads: m.pin_pads.clone(),
            fp_contours: pack_contours(&m.fp_contours),
            extra: Map::new(),
        }
    }

    /// Rebuilds the placement on `board`, recomputing its connections.
    pub fn to_match(&self, board: &Board) -> Result<ComponentMatch, PcbReuseError> {
        check_pads(board, self.pin_pads.values().flatten())?;
        let m = ComponentMatch {
            footprint: self.footprint.clone(),
            x: self.x,
            y: self.y,
            rotation: self.rotation,
            side: self.side,
            pin_pads: self.pin_pads.clone(),
            pin_connections: BTreeMap::new(),
            touched_connections: Default::default(),
            fp_contours: unpack_contours(&self.fp_contours)?,
        };
        Ok(m.update_traces(board))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub node: NetNode,
    #[serde(rename = "match")]
    pub placement: SavedMatch,
    pub pads: Vec<PadId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedIntervention {
    Jumper {
        nodes: Vec<NetNode>,
    },
    AddWire {
        missing_node: NetNode,
        #[serde(rename = "match")]
        placement: SavedMatch,
    },
    TraceCut {
        #[serde(default)]
        front_cuts: String,
        #[serde(default)]
        back_cuts: String,
    },
}

impl SavedIntervention {
    fn from_intervention(intervention: &Intervention, arena: &MatchArena) -> Self {
        match intervention {
            Intervention::Jumper { nodes } => SavedIntervention::Jumper { nodes: nodes.clone() },
            Intervention::AddWire {
                missing_node,
                placement,
            } => SavedIntervention::AddWire {
                missing_node: missing_node.clone(),
                placement: SavedMatch::from_match(&arena[*placement]),
            },
            Intervention::TraceCut(cuts) => SavedIntervention::TraceCut {
                front_cuts: pack_contours(&cuts.front),
                back_cuts: pack_contours(&cuts.back),
            },
        }
    }

    fn to_intervention(&self, arena: &mut MatchArena, board: &Board) -> Result<Intervention, PcbReuseError> {
        Ok(match self {
            SavedIntervention::Jumper { nodes } => Intervention::Jumper { nodes: nodes.clone() },
            SavedIntervention::AddWire {
                missing_node,
                placement,
            } => Intervention::AddWire {
                missing_node: missing_node.clone(),
                placement: arena.intern(placement.to_match(board)?),
            },
            SavedIntervention::TraceCut {
                front_cuts,
                back_cuts,
            } => Intervention::TraceCut(TraceCuts {
                front: unpack_contours(front_cuts)?,
                back: unpack_contours(back_cuts)?,
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNet {
    pub connections: Vec<ConnectionId>,
    pub net: String,
    pub nodes: Vec<SavedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interventions: Option<Vec<SavedIntervention>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Self-contained copy of a circuit match, independent of any arena.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedCircuit {
    pub nets: Vec<SavedNet>,
}

impl SavedCircuit {
    pub fn net(&self, name: &str) -> Option<&SavedNet> {
        self.nets.iter().find(|n| n.net == name)
    }

    pub fn intervention_count(&self) -> usize {
        self.nets
            .iter()
            .map(|n| n.interventions.as_ref().map_or(0, Vec::len))
            .sum()
    }

    /// Placements and interventions are interned into `arena`. Pad ids are
    /// checked against `board`; connection ids are taken as saved. Unknown
    /// keys do not survive the conversion.
    pub fn into_circuit(self, arena: &mut MatchArena, board: &Board) -> Result<CircuitMatch, PcbReuseError> {
        let mut nets = Vec::with_capacity(self.nets.len());
        for saved in self.nets {
            let mut nodes = Vec::with_capacity(saved.nodes.len());
            for node in saved.nodes {
                check_pads(board, node.pads.iter())?;
                let placement = arena.intern(node.placement.to_match(board)?);
                nodes.push(NodeMatch {
                    node: node.node,
                    placement,
                    pads: node.pads,
                });
            }
            let interventions = match saved.interventions {
                Some(list) => Some(
                    list.iter()
                        .map(|i| i.to_intervention(arena, board))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => None,
            };
            nets.push(NetMatch {
                net: saved.net,
                nodes,
                connections: saved.connections.into_iter().collect(),
                interventions,
            });
        }
        Ok(CircuitMatch::new(nets))
    }
}

impl CircuitMatch {
    pub fn to_saved(&self, arena: &MatchArena) -> SavedCircuit {
        let nets = self
            .nets
            .iter()
            .map(|net| SavedNet {
                connections: net.connections.iter().copied().collect(),
                net: net.net.clone(),
                nodes: net
                    .nodes
                    .iter()
                    .map(|n| SavedNode {
                        node: n.node.clone(),
                        placement: SavedMatch::from_match(&arena[n.placement]),
                        pads: n.pads.clone(),
                        extra: Map::new(),
                    })
                    .collect(),
                interventions: net.interventions.as_ref().map(|list| {
                    list.iter()
                        .map(|i| SavedIntervention::from_intervention(i, arena))
                        .collect()
                }),
                extra: Map::new(),
            })
            .collect();
        SavedCircuit { nets }
    }
}

fn check_pads<'a>(board: &Board, pads: impl Iterator<Item = &'a PadId>) -> Result<(), PcbReuseError> {
    let count = board.pads().len();
    for pad in pads {
        if pad.as_raw() as usize >= count {
            return Err(PcbReuseError::MalformedInput(format!(
                "pad {} out of range (board has {} pads)",
                pad, count
            )));
        }
    }
    Ok(())
}

pub fn pack_contours(contours: &[Polygon]) -> String {
    contours
        .iter()
        .map(|c| {
            c.points
                .iter()
                .map(|p| format!("{},{}", p.x, p.y))
                .collect::<Vec<_>>()
                .join(&POINT_SEPARATOR.to_string())
        })
        .collect::<Vec<_>>()
        .join(CONTOUR_SEPARATOR)
}

pub fn unpack_contours(packed: &str) -> Result<Vec<Polygon>, PcbReuseError> {
    if packed.trim().is_empty() {
        return Ok(Vec::new());
    }
    packed
        .split(CONTOUR_SEPARATOR)
        .map(|contour| {
            contour
                .split(POINT_SEPARATOR)
                .filter(|p| !p.is_empty())
                .map(parse_point)
                .collect::<Result<Vec<_>, _>>()
                .map(Polygon::new)
        })
        .collect()
}

fn parse_point(s: &str) -> Result<Point, PcbReuseError> {
    let bad = || PcbReuseError::MalformedInput(format!("invalid contour point '{}'", s));
    let (x, y) = s.split_once(',').ok_or_else(bad)?;
    let x = x.trim().parse::<f64>().map_err(|_| bad())?;
    let y = y.trim().parse::<f64>().map_err(|_| bad())?;
    Ok(Point::new(x, y))
}

pub fn save_matches(path: &Path, circuits: &[SavedCircuit]) -> Result<(), PcbReuseError> {
    let json = serde_json::to_string_pretty(circuits)?;
    std::fs::write(path, json)?;
    debug!(path = %path.display(), circuits = circuits.len(), "matches saved");
    Ok(())
}

pub fn load_matches(path: &Path) -> Result<Vec<SavedCircuit>, PcbReuseError> {
    let content = std::fs::read_to_string(path)?;
    let circuits: Vec<SavedCircuit> = serde_json::from_str(&content)?;
    debug!(path = %path.display(), circuits = circuits.len(), "matches loaded");
    Ok(circuits)
}
