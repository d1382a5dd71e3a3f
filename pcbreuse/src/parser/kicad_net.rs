//! KiCad netlist reader (`.net`, s-expression export format "E").
//!
//! Reads:
//! - `(components (comp (ref ..) (footprint ..) (libsource (lib ..) (part ..))))`
//! - `(libparts (libpart (lib ..) (part ..) (pins (pin (num ..)) ...)))` for pin counts
//! - `(nets (net (code ..) (name ..) (node (ref ..) (pin ..)) ...))`
//!
//! Components without a footprint cannot be placed and are rejected. Nets
//! with no node (KiCad emits them for unconnected labels) are dropped.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::netlist::{ComponentDef, Net, NetNode, Netlist};
use crate::parser::sexp::{ParseError, SExp, SExpParser};

#[derive(Debug, Error)]
pub enum NetlistParseError {
    #[error("S-expression parse error: {0}")]
    SExpParse(#[from] ParseError),
    #[error("Invalid netlist format: {0}")]
    InvalidFormat(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Inconsistent netlist: {0}")]
    Inconsistent(String),
}

pub struct KicadNetlistParser;

impl KicadNetlistParser {
    pub fn parse_str(content: &str) -> Result<Netlist, NetlistParseError> {
        let root = SExpParser::new(content).parse()?;
        match root.head() {
            Some("export") => {}
            Some(other) => {
                return Err(NetlistParseError::InvalidFormat(format!(
                    "expected export, found {}",
                    other
                )))
            }
            None => return Err(NetlistParseError::InvalidFormat("expected export root".to_string())),
        }

        let pin_counts = Self::libpart_pin_counts(&root);

        let mut components = Vec::new();
        if let Some(section) = root.find("components") {
            for comp in section.find_all("comp") {
                components.push(Self::parse_component(comp, &pin_counts)?);
            }
        }

        let mut nets = Vec::new();
        if let Some(section) = root.find("nets") {
            for net in section.find_all("net") {
                if let Some(net) = Self::parse_net(net)? {
                    nets.push(net);
                }
            }
        }

        debug!(components = components.len(), nets = nets.len(), "netlist parsed");
        Netlist::new(components, nets).map_err(|e| NetlistParseError::Inconsistent(e.to_string()))
    }

    fn libpart_pin_counts(root: &SExp) -> HashMap<(String, String), usize> {
        let mut counts = HashMap::new();
        let Some(section) = root.find("libparts") else {
            return counts;
        };
        for part in section.find_all("libpart") {
            let (Some(lib), Some(name)) = (part.value("lib"), part.value("part")) else {
                continue;
            };
            let pins = part.find("pins").map(|p| p.find_all("pin").count()).unwrap_or(0);
            counts.insert((lib.to_string(), name.to_string()), pins);
        }
        counts
    }

    fn parse_component(
        comp: &SExp,
        pin_counts: &HashMap<(String, String), usize>,
    ) -> Result<ComponentDef, NetlistParseError> {
        let reference = comp
            .value("ref")
            .ok_or_else(|| NetlistParseError::MissingField("comp ref".to_string()))?;
        let footprint = comp
            .value("footprint")
            .filter(|f| !f.is_empty())
            .ok_or_else(|| NetlistParseError::MissingField(format!("footprint of {}", reference)))?;
        let total_pins = comp
            .find("libsource")
            .and_then(|src| Some((src.value("lib")?.to_string(), src.value("part")?.to_string())))
            .and_then(|key| pin_counts.get(&key).copied())
            .unwrap_or(0);
        Ok(ComponentDef {
            reference: reference.to_string(),
            footprint: footprint.to_string(),
            total_pins,
        })
    }

    fn parse_net(net: &SExp) -> Result<Option<Net>, NetlistParseError> {
        let name = net
            .value("name")
            .ok_or_else(|| NetlistParseError::MissingField("net name".to_string()))?;
        let mut nodes = Vec::new();
        for node in net.find_all("node") {
            let reference = node
                .value("ref")
                .ok_or_else(|| NetlistParseError::MissingField(format!("node ref in net {}", name)))?;
            let pin = node
                .value("pin")
                .ok_or_else(|| NetlistParseError::MissingField(format!("node pin in net {}", name)))?;
            nodes.push(NetNode::new(reference, pin));
        }
        if nodes.is_empty() {
            return Ok(None);
        }
        Ok(Some(Net {
            name: name.to_string(),
            nodes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"(export (version "E")
  (components
    (comp (ref "C1") (value "100n") (footprint "Passives:C_Small")
      (libsource (lib "Device") (part "C")))
    (comp (ref "U1") (value "OPAMP") (footprint "Package:SOIC4")
      (libsource (lib "Amp") (part "OPA"))))
  (libparts
    (libpart (lib "Amp") (part "OPA")
      (pins (pin (num "1")) (pin (num "2")) (pin (num "3")) (pin (num "4")))))
  (nets
    (net (code "1") (name "N1") (node (ref "C1") (pin "1")) (node (ref "U1") (pin "3")))
    (net (code "2") (name "N2") (node (ref "C1") (pin "2")))
    (net (code "3") (name "unused"))))"#;

    #[test]
    fn test_parse_sample() {
        let nl = KicadNetlistParser::parse_str(SAMPLE).unwrap();
        assert_eq!(nl.nets().len(), 2);
        assert_eq!(nl.component("U1").unwrap().total_pins, 4);
        // no libpart for Device:C, the count comes from the nets
        assert_eq!(nl.component("C1").unwrap().total_pins, 2);
        assert_eq!(nl.sorted_refs(), vec!["U1", "C1"]);
        assert_eq!(nl.net_of("U1", "3"), Some(0));
    }

    #[test]
    fn test_wrong_root() {
        let err = KicadNetlistParser::parse_str("(kicad_pcb)").unwrap_err();
        assert!(matches!(err, NetlistParseError::InvalidFormat(_)));
    }

    #[test]
    fn test_component_without_footprint() {
        let err = KicadNetlistParser::parse_str("(export (components (comp (ref R1))))").unwrap_err();
        assert!(matches!(err, NetlistParseError::MissingField(_)));
    }
}
