// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Detector Description Handle
// Mirrors: DD4hep Detector + compact XML loader
// ─────────────────────────────────────────────────────────────────────
//! Opaque, read-only view of the loaded geometry.
//!
//! Volumes and materials are not modelled. The kernel only needs the
//! sub-detector names (to attach sensitive detectors) and the named
//! constants actions may read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use megat_types::units::{CM, EV, GEV, KEV, M, MEV, MM, NS, S, TEV, UM};
use megat_types::{SimError, SimResult};

/// A named sub-detector from the compact description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubDetector {
    pub name: String,
    pub type_name: String,
    pub readout: Option<String>,
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorDescription {
    pub name: String,
    /// File the description was loaded from, if any.
    pub source: Option<PathBuf>,
    constants: BTreeMap<String, String>,
    detectors: Vec<SubDetector>,
}

impl DetectorDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_constant(mut self, name: &str, value: &str) -> Self {
        self.constants.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_detector(mut self, name: &str, type_name: &str) -> Self {
        self.detectors.push(SubDetector {
            name: name.to_string(),
            type_name: type_name.to_string(),
            readout: None,
            id: None,
        });
        self
    }

    pub fn constant(&self, name: &str) -> Option<&str> {
        self.constants.get(name).map(String::as_str)
    }

    /// Numeric value of a constant in internal units.
    ///
    /// Accepts plain numbers and `*`-separated products of numbers and
    /// unit names, e.g. `"1.5*m"`.
    pub fn constant_f64(&self, name: &str) -> Option<f64> {
        self.constant(name).and_then(eval_product)
    }

    pub fn subdetector(&self, name: &str) -> Option<&SubDetector> {
        self.detectors.iter().find(|d| d.name == name)
    }

    pub fn subdetectors(&self) -> &[SubDetector] {
        &self.detectors
    }

    /// Log every sub-detector.
    pub fn print_detectors(&self) {
        log::info!("Detector {} ({} sub-detectors)", self.name, self.detectors.len());
        for d in &self.detectors {
            log::info!(
                "  {:<24} type={:<24} readout={}",
                d.name,
                d.type_name,
                d.readout.as_deref().unwrap_or("-")
            );
        }
    }

    /// Sub-detector names must be unique.
    pub fn validate(&self) -> SimResult<()> {
        for (i, d) in self.detectors.iter().enumerate() {
            if self.detectors[..i].iter().any(|o| o.name == d.name) {
                return Err(SimError::Configuration(format!(
                    "duplicate sub-detector '{}' in {}",
                    d.name, self.name
                )));
            }
        }
        Ok(())
    }
}

fn unit_value(token: &str) -> Option<f64> {
    Some(match token {
        "eV" => EV,
        "keV" => KEV,
        "MeV" => MEV,
        "GeV" => GEV,
        "TeV" => TEV,
        "um" => UM,
        "mm" => MM,
        "cm" => CM,
        "m" => M,
        "ns" => NS,
        "s" => S,
        _ => return None,
    })
}

fn eval_product(expr: &str) -> Option<f64> {
    let mut value = 1.0;
    for token in expr.split('*').map(str::trim) {
        value *= match token.parse::<f64>() {
            Ok(v) => v,
            Err(_) => unit_value(token)?,
        };
    }
    Some(value)
}

/// Source of detector descriptions.
pub trait GeometryLoader {
    fn load(&self, path: &Path) -> SimResult<DetectorDescription>;
}

/// Reads the `<constant>` and `<detector>` elements of a compact XML file.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactFileLoader;

impl CompactFileLoader {
    /// Parse compact text. `name` becomes the description name.
    pub fn parse(name: &str, text: &str) -> SimResult<DetectorDescription> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| SimError::Configuration(format!("malformed compact file {name}: {e}")))?;
        let mut desc = DetectorDescription::new(name);
        for node in doc.descendants().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "constant" => {
                    if let (Some(n), Some(v)) = (node.attribute("name"), node.attribute("value")) {
                        desc.constants.insert(n.to_string(), v.to_string());
                    }
                }
                "detector" => {
                    let Some(n) = node.attribute("name") else {
                        log::warn!("{name}: <detector> without a name ignored");
                        continue;
                    };
                    desc.detectors.push(SubDetector {
                        name: n.to_string(),
                        type_name: node.attribute("type").unwrap_or_default().to_string(),
                        readout: node.attribute("readout").map(str::to_string),
                        id: node.attribute("id").and_then(|v| v.parse().ok()),
                    });
                }
                _ => {}
            }
        }
        Ok(desc)
    }
}

impl GeometryLoader for CompactFileLoader {
    fn load(&self, path: &Path) -> SimResult<DetectorDescription> {
        if !path.is_file() {
            return Err(SimError::Configuration(format!(
                "geometry file {} does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("detector");
        let mut desc = Self::parse(name, &text)?;
        desc.source = Some(path.to_path_buf());
        desc.validate()?;
        log::info!(
            "Loaded geometry {} from {} ({} constants, {} sub-detectors)",
            desc.name,
            path.display(),
            desc.constants.len(),
            desc.detectors.len()
        );
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPACT: &str = r#"
<lccdd>
  <define>
    <constant name="world_side" value="30*m"/>
    <constant name="tracker_region_rmax" value="1.5*m"/>
    <constant name="tracker_region_zmax" value="2000*mm"/>
  </define>
  <detectors>
    <detector id="1" name="Calorimeter" type="Megat_Calorimeter" readout="CalHits" vis="CalVis">
    </detector>
    <detector name="Tracker" type="Megat_Tracker" readout='TrkHits'/>
  </detectors>
</lccdd>
"#;

    #[test]
    fn test_parse_compact() {
        let d = CompactFileLoader::parse("Megat", COMPACT).unwrap();
        assert_eq!(d.subdetectors().len(), 2);
        let cal = d.subdetector("Calorimeter").unwrap();
        assert_eq!(cal.type_name, "Megat_Calorimeter");
        assert_eq!(cal.readout.as_deref(), Some("CalHits"));
        assert_eq!(cal.id, Some(1));
        assert_eq!(d.subdetector("Tracker").unwrap().readout.as_deref(), Some("TrkHits"));
        assert_eq!(d.constant("world_side"), Some("30*m"));
    }

    #[test]
    fn test_constant_units() {
        let d = CompactFileLoader::parse("Megat", COMPACT).unwrap();
        assert_eq!(d.constant_f64("tracker_region_rmax"), Some(1500.0));
        assert_eq!(d.constant_f64("tracker_region_zmax"), Some(2000.0));
        let d = d.with_constant("bad", "3*furlong");
        assert_eq!(d.constant_f64("bad"), None);
    }

    #[test]
    fn test_duplicate_subdetector_rejected() {
        let d = DetectorDescription::new("x")
            .with_detector("Cal", "A")
            .with_detector("Cal", "B");
        assert!(matches!(d.validate(), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = CompactFileLoader.load(Path::new("/nonexistent/geometry/compact/Megat.xml"));
        assert!(matches!(err, Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_load_file_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Megat.xml");
        std::fs::write(&path, COMPACT).unwrap();
        let d = CompactFileLoader.load(&path).unwrap();
        assert_eq!(d.name, "Megat");
        assert_eq!(d.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_commented_out_detectors_ignored() {
        let text = r#"<detectors>
  <!-- <detector name="SiVertexBarrel" type="Old"/> -->
  <detector name="Calorimeter" type="Megat_Calorimeter"/>
</detectors>"#;
        let d = CompactFileLoader::parse("Megat", text).unwrap();
        let names: Vec<&str> = d.subdetectors().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Calorimeter"]);
    }

    #[test]
    fn test_attribute_entities_decoded() {
        let text =
            r#"<lccdd><detectors><detector name="Cal&amp;Trk" type="A"/></detectors></lccdd>"#;
        let d = CompactFileLoader::parse("Megat", text).unwrap();
        assert!(d.subdetector("Cal&Trk").is_some());
    }

    #[test]
    fn test_malformed_compact_rejected() {
        let err = CompactFileLoader::parse("Megat", "<detectors><detector name=\"Cal\">");
        assert!(matches!(err, Err(SimError::Configuration(_))));
    }
}
