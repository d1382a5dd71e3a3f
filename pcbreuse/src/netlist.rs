//! Netlist model: components with footprints and the nets tying their pins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::PcbReuseError;

/// `(ref, pin)` pair. Written `ref-pin`, split at the first `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetNode {
    pub reference: String,
    pub pin: String,
}

impl NetNode {
    pub fn new(reference: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            pin: pin.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (reference, pin) = s.split_once('-')?;
        if reference.is_empty() || pin.is_empty() {
            return None;
        }
        Some(Self::new(reference, pin))
    }
}

impl fmt::Display for NetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.reference, self.pin)
    }
}

impl TryFrom<String> for NetNode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        NetNode::parse(&s).ok_or_else(|| format!("invalid node '{}' (expected ref-pin)", s))
    }
}

impl From<NetNode> for String {
    fn from(n: NetNode) -> String {
        n.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
    pub nodes: Vec<NetNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    #[serde(rename = "ref")]
    pub reference: String,
    pub footprint: String,
    #[serde(default)]
    pub total_pins: usize,
}

#[derive(Deserialize, Serialize)]
struct NetlistDoc {
    #[serde(default)]
    components: Vec<ComponentDef>,
    #[serde(default)]
    nets: Vec<Net>,
}

/// Components and nets with derived lookup indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Netlist {
    components: BTreeMap<String, ComponentDef>,
    nets: Vec<Net>,
    node_net: HashMap<NetNode, usize>,
}

impl Netlist {
    /// Builds and checks a netlist. A component without an explicit pin
    /// count gets the number of its pins the nets mention.
    pub fn new(components: Vec<ComponentDef>, nets: Vec<Net>) -> Result<Self, PcbReuseError> {
        let mut by_ref = BTreeMap::new();
        for comp in components {
            if by_ref.contains_key(&comp.reference) {
                return Err(PcbReuseError::MalformedInput(format!(
                    "duplicate component {}",
                    comp.reference
                )));
            }
            by_ref.insert(comp.reference.clone(), comp);
        }

        let mut node_net = HashMap::new();
        let mut names = BTreeSet::new();
        let mut used_pins: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (i, net) in nets.iter().enumerate() {
            if !names.insert(net.name.as_str()) {
                return Err(PcbReuseError::MalformedInput(format!("duplicate net {}", net.name)));
            }
            if net.nodes.is_empty() {
                return Err(PcbReuseError::MalformedInput(format!("net {} has no nodes", net.name)));
            }
            for node in &net.nodes {
                if !by_ref.contains_key(&node.reference) {
                    return Err(PcbReuseError::MalformedInput(format!(
                        "net {} references unknown component {}",
                        net.name, node.reference
                    )));
                }
                if node_net.insert(node.clone(), i).is_some() {
                    return Err(PcbReuseError::MalformedInput(format!(
                        "node {} appears in more than one net",
                        node
                    )));
                }
                used_pins
                    .entry(node.reference.as_str())
                    .or_default()
                    .insert(node.pin.as_str());
            }
        }

        for comp in by_ref.values_mut() {
            let mentioned = used_pins.get(comp.reference.as_str()).map_or(0, |p| p.len());
            comp.total_pins = comp.total_pins.max(mentioned);
        }

        Ok(Self {
            components: by_ref,
            nets,
            node_net,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, PcbReuseError> {
        let doc: NetlistDoc = serde_json::from_str(content)?;
        Self::new(doc.components, doc.nets)
    }

    pub fn to_json_string(&self) -> Result<String, PcbReuseError> {
        let doc = NetlistDoc {
            components: self.components.values().cloned().collect(),
            nets: self.nets.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn builder() -> NetlistBuilder {
        NetlistBuilder::default()
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn net(&self, index: usize) -> &Net {
        &self.nets[index]
    }

    pub fn net_index(&self, name: &str) -> Option<usize> {
        self.nets.iter().position(|n| n.name == name)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentDef> + '_ {
        self.components.values()
    }

    pub fn component(&self, reference: &str) -> Option<&ComponentDef> {
        self.components.get(reference)
    }

    /// Index of the net containing `(reference, pin)`.
    pub fn net_of(&self, reference: &str, pin: &str) -> Option<usize> {
        self.node_net.get(&NetNode::new(reference, pin)).copied()
    }

    /// Nets the component takes part in, in netlist order.
    pub fn nets_of_ref(&self, reference: &str) -> Vec<usize> {
        self.nets
            .iter()
            .enumerate()
            .filter(|(_, n)| n.nodes.iter().any(|node| node.reference == reference))
            .map(|(i, _)| i)
            .collect()
    }

    /// Pins of `reference` that no net mentions.
    pub fn unconnected_pins<'a>(&self, reference: &str, pins: impl Iterator<Item = &'a str>) -> Vec<String> {
        pins.filter(|pin| self.net_of(reference, pin).is_none())
            .map(str::to_string)
            .collect()
    }

    /// All refs: descending pin count, ties by ref name.
    pub fn sorted_refs(&self) -> Vec<String> {
        let mut refs: Vec<&ComponentDef> = self.components.values().collect();
        refs.sort_by(|a, b| {
            b.total_pins
                .cmp(&a.total_pins)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        refs.into_iter().map(|c| c.reference.clone()).collect()
    }

    /// Footprint id to the refs using it.
    pub fn footprint_dict(&self) -> BTreeMap<String, Vec<String>> {
        let mut dict: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for comp in self.components.values() {
            dict.entry(comp.footprint.clone())
                .or_default()
                .push(comp.reference.clone());
        }
        dict
    }
}

/// Fluent construction, mostly for tests and examples.
#[derive(Debug, Default)]
pub struct NetlistBuilder {
    components: Vec<ComponentDef>,
    nets: Vec<Net>,
    bad_nodes: Vec<String>,
}

impl NetlistBuilder {
    pub fn component(mut self, reference: &str, footprint: &str, total_pins: usize) -> Self {
        self.components.push(ComponentDef {
            reference: reference.to_string(),
            footprint: footprint.to_string(),
            total_pins,
        });
        self
    }

    /// `nodes` are `ref-pin` strings.
    pub fn net(mut self, name: &str, nodes: &[&str]) -> Self {
        let mut parsed = Vec::with_capacity(nodes.len());
        for n in nodes {
            match NetNode::parse(n) {
                Some(node) => parsed.push(node),
                None => self.bad_nodes.push(n.to_string()),
            }
        }
        self.nets.push(Net {
            name: name.to_string(),
            nodes: parsed,
        });
        self
    }

    pub fn build(self) -> Result<Netlist, PcbReuseError> {
        if let Some(bad) = self.bad_nodes.first() {
            return Err(PcbReuseError::MalformedInput(format!("invalid node '{}'", bad)));
        }
        Netlist::new(self.components, self.nets)
    }
}
