//! Footprint model and loading.
//!
//! A footprint is the geometric template of a component: per-pin groups of
//! pad shapes in footprint-local coordinates plus an outline used for
//! overlays. Footprints are loaded through a [`FootprintLibrary`] and
//! memoized per `(library, name)` in a [`FootprintCache`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::PcbReuseError;
use crate::geometry::Polygon;
use crate::parser::kicad_mod::KicadModParser;

/// Footprints by id (`Library:Name`).
pub type FootprintSet = BTreeMap<String, Arc<Footprint>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintPad {
    pub shape: Polygon,
    pub through_hole: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintPin {
    pub name: String,
    pub pads: Vec<FootprintPad>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub library: String,
    pub name: String,
    pub pins: Vec<FootprintPin>,
    pub outline: Vec<Polygon>,
}

impl Footprint {
    pub fn new(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            name: name.into(),
            pins: Vec::new(),
            outline: Vec::new(),
        }
    }

    /// Adds a pad to `pin`, creating the pin on first use.
    pub fn with_pad(mut self, pin: &str, shape: Polygon, through_hole: bool) -> Self {
        self.add_pad(pin, shape, through_hole);
        self
    }

    pub fn with_outline(mut self, outline: Polygon) -> Self {
        self.outline.push(outline);
        self
    }

    pub fn add_pad(&mut self, pin: &str, shape: Polygon, through_hole: bool) {
        let pad = FootprintPad { shape, through_hole };
        match self.pins.iter_mut().find(|p| p.name == pin) {
            Some(existing) => existing.pads.push(pad),
            None => self.pins.push(FootprintPin {
                name: pin.to_string(),
                pads: vec![pad],
            }),
        }
    }

    /// `Library:Name`, the key used by netlists.
    pub fn id(&self) -> String {
        if self.library.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.library, self.name)
        }
    }

    pub fn pin(&self, name: &str) -> Option<&FootprintPin> {
        self.pins.iter().find(|p| p.name == name)
    }

    pub fn pad_count(&self) -> usize {
        self.pins.iter().map(|p| p.pads.len()).sum()
    }

    /// Contours drawn for overlays: the outline, or the pads when there is none.
    pub fn contours(&self) -> Vec<&Polygon> {
        if self.outline.is_empty() {
            self.pins
                .iter()
                .flat_map(|p| p.pads.iter().map(|pad| &pad.shape))
                .collect()
        } else {
            self.outline.iter().collect()
        }
    }

    /// Rejects shapes the matcher cannot handle.
    pub fn validate(&self) -> Result<(), PcbReuseError> {
        if self.pad_count() == 0 {
            return Err(PcbReuseError::Unsupported(format!("{} has no pads", self.id())));
        }
        for pin in &self.pins {
            for pad in &pin.pads {
                if pad.shape.len() < 3 || pad.shape.area() <= f64::EPSILON {
                    return Err(PcbReuseError::Unsupported(format!(
                        "{} pin {} has a zero-area pad",
                        self.id(),
                        pin.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Splits `Library:Name`; a bare name has an empty library.
pub fn split_footprint_id(id: &str) -> (&str, &str) {
    match id.split_once(':') {
        Some((lib, name)) => (lib, name),
        None => ("", id),
    }
}

/// Source of footprints.
pub trait FootprintLibrary {
    fn load(&self, library: &str, name: &str) -> Result<Footprint, PcbReuseError>;
}

/// Reads KiCad `.kicad_mod` files from one or more library roots.
///
/// Each root is tried in order as `<root>/<library>.pretty/<name>.kicad_mod`
/// and then `<root>/<name>.kicad_mod`.
#[derive(Debug, Clone, Default)]
pub struct KicadModLibrary {
    roots: Vec<PathBuf>,
}

impl KicadModLibrary {
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn candidates(&self, library: &str, name: &str) -> Vec<PathBuf> {
        let file = format!("{}.kicad_mod", name);
        let mut paths = Vec::new();
        for root in &self.roots {
            if !library.is_empty() {
                paths.push(root.join(format!("{}.pretty", library)).join(&file));
            }
            paths.push(root.join(&file));
        }
        paths
    }
}

impl FootprintLibrary for KicadModLibrary {
    fn load(&self, library: &str, name: &str) -> Result<Footprint, PcbReuseError> {
        let candidates = self.candidates(library, name);
        for (attempt, path) in candidates.iter().enumerate() {
            if !path.is_file() {
                debug!(path = %path.display(), attempt = attempt + 1, "footprint not found here");
                continue;
            }
            return load_kicad_mod(path, library);
        }
        Err(PcbReuseError::RenderFailed {
            library: library.to_string(),
            footprint: name.to_string(),
            attempts: candidates.len(),
        })
    }
}

fn load_kicad_mod(path: &Path, library: &str) -> Result<Footprint, PcbReuseError> {
    let content = std::fs::read_to_string(path)?;
    let mut footprint = KicadModParser::parse_str(&content)?;
    footprint.library = library.to_string();
    Ok(footprint)
}

/// In-memory footprints keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    footprints: HashMap<String, Footprint>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, footprint: Footprint) -> Self {
        self.footprints.insert(footprint.id(), footprint);
        self
    }
}

impl FootprintLibrary for MemoryLibrary {
    fn load(&self, library: &str, name: &str) -> Result<Footprint, PcbReuseError> {
        let id = if library.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", library, name)
        };
        self.footprints
            .get(&id)
            .cloned()
            .ok_or_else(|| PcbReuseError::RenderFailed {
                library: library.to_string(),
                footprint: name.to_string(),
                attempts: 1,
            })
    }
}

/// Memoizes validated footprints per `(library, name)`.
pub struct FootprintCache<L> {
    library: L,
    memo: HashMap<(String, String), Arc<Footprint>>,
}

impl<L: FootprintLibrary> FootprintCache<L> {
    pub fn new(library: L) -> Self {
        Self {
            library,
            memo: HashMap::new(),
        }
    }

    pub fn load(&mut self, library: &str, name: &str) -> Result<Arc<Footprint>, PcbReuseError> {
        let key = (library.to_string(), name.to_string());
        if let Some(fp) = self.memo.get(&key) {
            return Ok(Arc::clone(fp));
        }
        let footprint = self.library.load(library, name)?;
        footprint.validate()?;
        let footprint = Arc::new(footprint);
        self.memo.insert(key, Arc::clone(&footprint));
        Ok(footprint)
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingLibrary {
        inner: MemoryLibrary,
        calls: Cell<usize>,
    }

    impl FootprintLibrary for CountingLibrary {
        fn load(&self, library: &str, name: &str) -> Result<Footprint, PcbReuseError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.load(library, name)
        }
    }

    fn resistor() -> Footprint {
        Footprint::new("Passives", "R")
            .with_pad("1", Polygon::rect(-1.0, 0.0, 1.0, 1.0), false)
            .with_pad("2", Polygon::rect(1.0, 0.0, 1.0, 1.0), false)
    }

    #[test]
    fn test_cache_memoizes() {
        let lib = CountingLibrary {
            inner: MemoryLibrary::new().with(resistor()),
            calls: Cell::new(0),
        };
        let mut cache = FootprintCache::new(lib);
        let a = cache.load("Passives", "R").unwrap();
        let b = cache.load("Passives", "R").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.library.calls.get(), 1);
    }

    #[test]
    fn test_padless_footprint_unsupported() {
        let lib = MemoryLibrary::new().with(Footprint::new("Mech", "Hole"));
        let mut cache = FootprintCache::new(lib);
        assert!(matches!(cache.load("Mech", "Hole"), Err(PcbReuseError::Unsupported(_))));
    }

    #[test]
    fn test_split_footprint_id() {
        assert_eq!(split_footprint_id("Passives:R_0805"), ("Passives", "R_0805"));
        assert_eq!(split_footprint_id("R_0805"), ("", "R_0805"));
    }

    #[test]
    fn test_missing_footprint_reports_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let lib = KicadModLibrary::new([dir.path(), other.path()]);
        match lib.load("Passives", "R_0805") {
            Err(PcbReuseError::RenderFailed { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_pins_group_pads() {
        let fp = Footprint::new("", "SOT")
            .with_pad("1", Polygon::rect(0.0, 0.0, 1.0, 1.0), false)
            .with_pad("2", Polygon::rect(2.0, 0.0, 1.0, 1.0), false)
            .with_pad("1", Polygon::rect(0.0, 2.0, 1.0, 1.0), false);
        assert_eq!(fp.pins.len(), 2);
        assert_eq!(fp.pin("1").unwrap().pads.len(), 2);
        assert_eq!(fp.id(), "SOT");
    }
}
