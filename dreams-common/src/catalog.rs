//! Clip catalog
//!
//! Ordered, read-only list of pre-rendered chord clips. Catalog order is the
//! iteration order used by weighted selection, so it must stay stable for the
//! lifetime of the process.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Unique clip identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub u32);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pre-rendered fixed-length audio asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    /// Display label (chord name)
    pub name: String,
    /// Asset locator, relative to the audio directory
    #[serde(alias = "file")]
    pub asset: String,
}

impl Clip {
    pub fn new(id: u32, name: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            id: ClipId(id),
            name: name.into(),
            asset: asset.into(),
        }
    }
}

/// Built-in chord set: (id, name)
///
/// Asset file names follow the "<id> <name>.ogg" convention.
const DEFAULT_CHORDS: &[(u32, &str)] = &[
    (1, "Am"),
    (2, "Cmaj6"),
    (3, "Dm7 add11"),
    (4, "A#maj7"),
    (5, "Dm"),
    (6, "G#maj7"),
    (7, "Em9"),
    (8, "Cmaj9"),
    (9, "Dm7"),
    (10, "G#m7"),
    (11, "Em#5"),
    (12, "Cmaj7"),
    (13, "Am9"),
    (14, "Fadd9"),
    (15, "D7(sus4)"),
    (16, "Cadd11"),
    (17, "Cmaj7 add11"),
    (18, "Am7"),
    (19, "Em"),
    (20, "Cmaj"),
    (21, "A#"),
];

/// TOML catalog file layout
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "clip", default)]
    clips: Vec<Clip>,
}

/// Ordered clip catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    clips: Vec<Clip>,
}

impl Catalog {
    /// Build a catalog, rejecting empty lists and duplicate ids
    pub fn new(clips: Vec<Clip>) -> Result<Self> {
        if clips.is_empty() {
            return Err(Error::Config("Catalog contains no clips".to_string()));
        }

        let mut seen = HashSet::with_capacity(clips.len());
        for clip in &clips {
            if !seen.insert(clip.id) {
                return Err(Error::Config(format!("Duplicate clip id {} in catalog", clip.id)));
            }
        }

        Ok(Self { clips })
    }

    /// The built-in 21 chord catalog
    pub fn default_chords() -> Self {
        let clips = DEFAULT_CHORDS
            .iter()
            .map(|(id, name)| Clip::new(*id, *name, format!("{} {}.ogg", id, name)))
            .collect();
        Self { clips }
    }

    /// Parse a catalog from TOML (`[[clip]]` tables with id/name/file)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid catalog file: {}", e)))?;
        Self::new(file.clips)
    }

    /// Load a catalog file from disk
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        info!("Loaded {} clips from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load from file when given, otherwise use the built-in chord set
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_file(p),
            None => {
                debug!("No catalog file configured, using built-in chords");
                Ok(Self::default_chords())
            }
        }
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClipId> + '_ {
        self.clips.iter().map(|c| c.id)
    }

    /// Resolve a clip's asset against the audio directory
    pub fn asset_path(audio_dir: &Path, clip: &Clip) -> PathBuf {
        audio_dir.join(&clip.asset)
    }

    /// Clips whose asset file does not exist under `audio_dir`
    pub fn missing_assets(&self, audio_dir: &Path) -> Vec<&Clip> {
        let missing: Vec<&Clip> = self
            .clips
            .iter()
            .filter(|clip| !Self::asset_path(audio_dir, clip).exists())
            .collect();

        if missing.is_empty() {
            info!("All {} audio files found", self.len());
        } else {
            let names: Vec<&str> = missing.iter().map(|c| c.asset.as_str()).collect();
            warn!("Missing audio files: {:?}", names);
        }

        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = Catalog::default_chords();
        assert_eq!(catalog.len(), 21);
        assert_eq!(catalog.clips()[0].name, "Am");
        assert_eq!(catalog.clips()[0].asset, "1 Am.ogg");
        assert_eq!(catalog.get(ClipId(15)).unwrap().asset, "15 D7(sus4).ogg");
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = Catalog::new(vec![Clip::new(1, "Am", "a.ogg"), Clip::new(1, "Dm", "d.ogg")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(Catalog::new(Vec::new()), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_toml_preserves_order() {
        let toml = r#"
            [[clip]]
            id = 7
            name = "Em9"
            file = "7 Em9.ogg"

            [[clip]]
            id = 2
            name = "Cmaj6"
            file = "2 Cmaj6.ogg"
        "#;
        let catalog = Catalog::from_toml_str(toml).unwrap();
        let ids: Vec<ClipId> = catalog.ids().collect();
        assert_eq!(ids, vec![ClipId(7), ClipId(2)]);
        assert_eq!(catalog.get(ClipId(2)).unwrap().asset, "2 Cmaj6.ogg");
    }

    #[test]
    fn test_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1 Am.ogg"), b"x").unwrap();

        let catalog = Catalog::new(vec![
            Clip::new(1, "Am", "1 Am.ogg"),
            Clip::new(2, "Cmaj6", "2 Cmaj6.ogg"),
        ])
        .unwrap();

        let missing = catalog.missing_assets(dir.path());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, ClipId(2));
    }
}
