//! Reading segmented images, seed files, label files and batch manifests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cropmas_core::director::seeds_from_json;
use cropmas_core::{ActivityMap, SimulationConfig};
use serde::Deserialize;

/// Load any format `image` can decode as an 8-bit activity map.
pub fn load_activity(path: &Path) -> Result<ActivityMap> {
    let img = image::open(path)
        .with_context(|| format!("Cannot open image {}", path.display()))?
        .to_luma8();
    let (w, h) = img.dimensions();
    let map = ActivityMap::from_raw(w as usize, h as usize, img.into_raw())
        .with_context(|| format!("Unusable image {}", path.display()))?;
    Ok(map)
}

pub fn load_seeds(path: &Path) -> Result<Vec<Vec<(i32, i32)>>> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    seeds_from_json(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// One hand-labelled plant.
#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    #[serde(alias = "instance_id")]
    pub id: String,
    pub x: i32,
    pub y: i32,
}

pub fn load_labels(path: &Path) -> Result<Vec<Label>> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse labels {}", path.display()))
}

pub fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    match path {
        None => Ok(SimulationConfig::default()),
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("Cannot read {}", p.display()))?;
            SimulationConfig::from_json(&text).with_context(|| format!("Invalid config {}", p.display()))
        }
    }
}

// ── Batch manifest ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub images: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub image: PathBuf,
    pub seeds: PathBuf,
    #[serde(default)]
    pub labels: Option<PathBuf>,
    /// Offset of this image inside the assembled field.
    #[serde(default)]
    pub field_offset: Option<[i32; 2]>,
}

/// Read a manifest, resolving relative paths against its directory.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_manifest(&text, base).with_context(|| format!("Failed to parse manifest {}", path.display()))
}

/// Parse manifest JSON; every entry path is joined onto `base`.
pub fn parse_manifest(text: &str, base: &Path) -> Result<Manifest> {
    let mut manifest: Manifest = serde_json::from_str(text)?;
    for entry in &mut manifest.images {
        entry.image = base.join(&entry.image);
        entry.seeds = base.join(&entry.seeds);
        entry.labels = entry.labels.as_ref().map(|l| base.join(l));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_paths_resolve_against_its_directory() {
        let base = Path::new("fields/plot_a");
        let text = r#"{"images": [
            {"name": "a", "image": "a.png", "seeds": "a.json", "labels": "l.json"},
            {"name": "b", "image": "/abs/b.png", "seeds": "b.json", "field_offset": [640, 0]}
        ]}"#;
        let manifest = parse_manifest(text, base).unwrap();
        let (a, b) = (&manifest.images[0], &manifest.images[1]);
        assert_eq!(a.image, base.join("a.png"));
        assert_eq!(a.labels.as_deref(), Some(base.join("l.json").as_path()));
        assert!(a.field_offset.is_none());
        assert_eq!(b.image, PathBuf::from("/abs/b.png"));
        assert_eq!(b.seeds, base.join("b.json"));
        assert!(b.labels.is_none());
        assert_eq!(b.field_offset, Some([640, 0]));
    }

    #[test]
    fn labels_accept_instance_id() {
        let labels: Vec<Label> = serde_json::from_str(r#"[{"instance_id": "p7", "x": 3, "y": 4}]"#).unwrap();
        assert_eq!(labels[0].id, "p7");
        assert_eq!((labels[0].x, labels[0].y), (3, 4));
    }
}
