//! Net and circuit match values.

use std::collections::{BTreeMap, BTreeSet};

use crate::board::TraceCuts;
use crate::ids::{ConnectionId, MatchId, PadId};
use crate::matcher::MatchArena;
use crate::netlist::NetNode;

/// One netlist node realised by a placement.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMatch {
    pub node: NetNode,
    pub placement: MatchId,
    /// Board pads of the node's pin.
    pub pads: Vec<PadId>,
}

/// Physical modification needed to realise a net.
#[derive(Debug, Clone, PartialEq)]
pub enum Intervention {
    /// Wire between pins of already placed components.
    Jumper { nodes: Vec<NetNode> },
    /// Wire bringing `missing_node`, placed at `placement`, into the net.
    AddWire { missing_node: NetNode, placement: MatchId },
    /// Copper to remove.
    TraceCut(TraceCuts),
}

impl Intervention {
    pub fn kind(&self) -> &'static str {
        match self {
            Intervention::Jumper { .. } => "jumper",
            Intervention::AddWire { .. } => "add_wire",
            Intervention::TraceCut(_) => "trace_cut",
        }
    }

    /// Order-independent identity used for duplicate detection.
    pub fn key(&self, arena: &MatchArena) -> String {
        match self {
            Intervention::Jumper { nodes } => {
                let mut names: Vec<String> = nodes.iter().map(ToString::to_string).collect();
                names.sort();
                format!("jumper:{}", names.join(","))
            }
            Intervention::AddWire { missing_node, placement } => {
                let pads: Vec<String> = arena
                    .get(*placement)
                    .map(|m| m.pads().map(|p| p.to_string()).collect())
                    .unwrap_or_default();
                format!("wire:{}:{}", missing_node, pads.join(","))
            }
            Intervention::TraceCut(cuts) => {
                let render = |polys: &[crate::geometry::Polygon]| {
                    let mut parts: Vec<String> = polys
                        .iter()
                        .map(|p| {
                            p.points
                                .iter()
                                .map(|pt| format!("{:.4},{:.4}", pt.x, pt.y))
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect();
                    parts.sort();
                    parts.join("|")
                };
                format!("cut:{}/{}", render(&cuts.front), render(&cuts.back))
            }
        }
    }
}

/// Candidate realisation of one net (a "net dict").
#[derive(Debug, Clone, PartialEq)]
pub struct NetMatch {
    pub net: String,
    pub nodes: Vec<NodeMatch>,
    pub connections: BTreeSet<ConnectionId>,
    pub interventions: Option<Vec<Intervention>>,
}

impl NetMatch {
    pub fn node(&self, node: &NetNode) -> Option<&NodeMatch> {
        self.nodes.iter().find(|n| &n.node == node)
    }

    /// Placement per ref.
    pub fn refs(&self) -> BTreeMap<&str, MatchId> {
        self.nodes
            .iter()
            .map(|n| (n.node.reference.as_str(), n.placement))
            .collect()
    }

    pub fn interventions(&self) -> &[Intervention] {
        self.interventions.as_deref().unwrap_or(&[])
    }

    pub fn intervention_count(&self) -> usize {
        self.interventions().len()
    }

    pub fn push_intervention(&mut self, intervention: Intervention) {
        self.interventions.get_or_insert_with(Vec::new).push(intervention);
    }

    /// All cuts this net requires.
    pub fn trace_cuts(&self) -> TraceCuts {
        let mut all = TraceCuts::default();
        for i in self.interventions() {
            if let Intervention::TraceCut(cuts) = i {
                all.extend(cuts);
            }
        }
        all
    }
}

/// Candidate realisation of the whole netlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircuitMatch {
    pub nets: Vec<NetMatch>,
}

impl CircuitMatch {
    pub fn new(nets: Vec<NetMatch>) -> Self {
        Self { nets }
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn net(&self, name: &str) -> Option<&NetMatch> {
        self.nets.iter().find(|n| n.net == name)
    }

    /// Ref to placement across all nets.
    pub fn refs(&self) -> BTreeMap<String, MatchId> {
        let mut refs = BTreeMap::new();
        for net in &self.nets {
            for node in &net.nodes {
                refs.entry(node.node.reference.clone()).or_insert(node.placement);
            }
        }
        refs
    }

    pub fn placement_of(&self, reference: &str) -> Option<MatchId> {
        self.nets
            .iter()
            .flat_map(|n| n.nodes.iter())
            .find(|n| n.node.reference == reference)
            .map(|n| n.placement)
    }

    pub fn touched_connections(&self) -> BTreeSet<ConnectionId> {
        self.nets.iter().flat_map(|n| n.connections.iter().copied()).collect()
    }

    /// Every board pad under a placed component.
    pub fn touched_pads(&self, arena: &MatchArena) -> BTreeSet<PadId> {
        self.refs()
            .values()
            .filter_map(|id| arena.get(*id))
            .flat_map(|m| m.pads())
            .collect()
    }

    pub fn nets_covered(&self) -> BTreeSet<&str> {
        self.nets.iter().map(|n| n.net.as_str()).collect()
    }

    pub fn intervention_nets(&self) -> Vec<&str> {
        self.nets
            .iter()
            .filter(|n| n.intervention_count() > 0)
            .map(|n| n.net.as_str())
            .collect()
    }

    pub fn intervention_count(&self) -> usize {
        self.nets.iter().map(NetMatch::intervention_count).sum()
    }

    /// Identity used by duplicate filtering: net names, connection sets,
    /// per-ref pads and the set of interventions of each net.
    pub fn duplicate_key(&self, arena: &MatchArena) -> DuplicateKey {
        let mut nets: Vec<NetKey> = self
            .nets
            .iter()
            .map(|net| {
                let placements = net
                    .refs()
                    .into_iter()
                    .map(|(r, id)| {
                        let pads = arena.get(id).map(|m| m.pads().collect()).unwrap_or_default();
                        (r.to_string(), pads)
                    })
                    .collect();
                NetKey {
                    net: net.net.clone(),
                    connections: net.connections.iter().copied().collect(),
                    placements,
                    interventions: net.interventions().iter().map(|i| i.key(arena)).collect(),
                }
            })
            .collect();
        nets.sort();
        DuplicateKey(nets)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NetKey {
    net: String,
    connections: Vec<ConnectionId>,
    placements: Vec<(String, Vec<PadId>)>,
    interventions: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DuplicateKey(Vec<NetKey>);

/// Partial solution: the nets realised so far plus refs placed ahead of
/// their nets (the seed placement).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub circuit: CircuitMatch,
    pub pinned: BTreeMap<String, MatchId>,
}

impl SearchState {
    pub fn placement_of(&self, reference: &str) -> Option<MatchId> {
        self.circuit
            .placement_of(reference)
            .or_else(|| self.pinned.get(reference).copied())
    }

    pub fn placements(&self) -> BTreeMap<String, MatchId> {
        let mut all = self.pinned.clone();
        all.extend(self.circuit.refs());
        all
    }

    pub fn used_pads(&self, arena: &MatchArena) -> BTreeSet<PadId> {
        self.placements()
            .values()
            .filter_map(|id| arena.get(*id))
            .flat_map(|m| m.pads())
            .collect()
    }

    /// Connection to the first net using it.
    pub fn owners(&self) -> BTreeMap<ConnectionId, String> {
        let mut owners = BTreeMap::new();
        for net in &self.circuit.nets {
            for c in &net.connections {
                owners.entry(*c).or_insert_with(|| net.net.clone());
            }
        }
        owners
    }
}
