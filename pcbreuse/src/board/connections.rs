//! Connections map: partitions board copper into electrical groups.
//!
//! Pads, traces and through-hole vias are the union-find elements. Pads join
//! the traces of their side they sit on, through-holes join whatever copper
//! they pierce on either side. Connection ids follow the lowest member of each
//! group (traces by id, then pads, then vias) so a rebuild of unchanged
//! copper yields the same ids.

use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::{Pad, Trace, Via};
use crate::geometry::Side;
use crate::ids::{ConnectionId, PadId, TraceId, ViaId};

/// One electrically joined group of board copper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub front_traces: BTreeSet<TraceId>,
    pub back_traces: BTreeSet<TraceId>,
    pub front_pads: BTreeSet<PadId>,
    pub back_pads: BTreeSet<PadId>,
    pub vias: BTreeSet<ViaId>,
}

impl Connection {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            front_traces: BTreeSet::new(),
            back_traces: BTreeSet::new(),
            front_pads: BTreeSet::new(),
            back_pads: BTreeSet::new(),
            vias: BTreeSet::new(),
        }
    }

    pub fn pads(&self) -> impl Iterator<Item = PadId> + '_ {
        self.front_pads.iter().chain(self.back_pads.iter()).copied()
    }

    pub fn pad_count(&self) -> usize {
        self.front_pads.len() + self.back_pads.len()
    }

    pub fn pads_on(&self, side: Side) -> &BTreeSet<PadId> {
        match side {
            Side::Front => &self.front_pads,
            Side::Back => &self.back_pads,
        }
    }

    pub fn traces_on(&self, side: Side) -> &BTreeSet<TraceId> {
        match side {
            Side::Front => &self.front_traces,
            Side::Back => &self.back_traces,
        }
    }

    /// A connection with no trace is a lone pad (or a through-hole pad pair).
    pub fn has_traces(&self) -> bool {
        !self.front_traces.is_empty() || !self.back_traces.is_empty()
    }
}

/// Derived partition of the board copper.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMap {
    connections: Vec<Connection>,
    pad_connection: Vec<ConnectionId>,
    trace_connection: HashMap<TraceId, ConnectionId>,
    via_connection: Vec<Option<ConnectionId>>,
}

impl ConnectionMap {
    pub fn build(pads: &[Pad], traces: &BTreeMap<TraceId, Arc<Trace>>, vias: &[Via]) -> Self {
        let trace_list: Vec<&Trace> = traces.values().map(|t| t.as_ref()).collect();
        let t_count = trace_list.len();
        let p_count = pads.len();
        let pad_elem = |i: usize| t_count + i;
        let via_elem = |i: usize| t_count + p_count + i;

        let mut uf = UnionFind::<usize>::new(t_count + p_count + vias.len());

        for (pi, pad) in pads.iter().enumerate() {
            for (ti, trace) in trace_list.iter().enumerate() {
                if trace.side == pad.side && trace.region.touches(&pad.polygon) {
                    uf.union(pad_elem(pi), ti);
                }
            }
        }

        for (vi, via) in vias.iter().enumerate() {
            if !via.is_through_hole {
                continue;
            }
            for (ti, trace) in trace_list.iter().enumerate() {
                if trace.region.contains(&via.centroid) {
                    uf.union(via_elem(vi), ti);
                }
            }
            for (pi, pad) in pads.iter().enumerate() {
                if pad.polygon.contains(&via.centroid) {
                    uf.union(via_elem(vi), pad_elem(pi));
                }
            }
        }

        let mut root_to_id: HashMap<usize, ConnectionId> = HashMap::new();
        let mut connections: Vec<Connection> = Vec::new();
        let mut assign = |root: usize, connections: &mut Vec<Connection>| -> ConnectionId {
            *root_to_id.entry(root).or_insert_with(|| {
                let id = ConnectionId::from_raw(connections.len() as u32);
                connections.push(Connection::new(id));
                id
            })
        };

        let mut trace_connection = HashMap::new();
        for (ti, trace) in trace_list.iter().enumerate() {
            let id = assign(uf.find(ti), &mut connections);
            let conn = &mut connections[id.index()];
            match trace.side {
                Side::Front => conn.front_traces.insert(trace.id),
                Side::Back => conn.back_traces.insert(trace.id),
            };
            trace_connection.insert(trace.id, id);
        }

        let mut pad_connection = Vec::with_capacity(p_count);
        for (pi, pad) in pads.iter().enumerate() {
            let id = assign(uf.find(pad_elem(pi)), &mut connections);
            let conn = &mut connections[id.index()];
            match pad.side {
                Side::Front => conn.front_pads.insert(pad.id),
                Side::Back => conn.back_pads.insert(pad.id),
            };
            pad_connection.push(id);
        }

        // Vias never open a group of their own: a via-only group carries no copper
        // we can solder to.
        let mut via_connection = Vec::with_capacity(vias.len());
        for (vi, via) in vias.iter().enumerate() {
            let id = root_to_id.get(&uf.find(via_elem(vi))).copied();
            if let Some(id) = id {
                connections[id.index()].vias.insert(via.id);
            }
            via_connection.push(id);
        }

        Self {
            connections,
            pad_connection,
            trace_connection,
            via_connection,
        }
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.index())
    }

    pub fn of_pad(&self, pad: PadId) -> ConnectionId {
        self.pad_connection[pad.index()]
    }

    pub fn of_trace(&self, trace: TraceId) -> Option<ConnectionId> {
        self.trace_connection.get(&trace).copied()
    }

    pub fn of_via(&self, via: ViaId) -> Option<ConnectionId> {
        self.via_connection.get(via.index()).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
