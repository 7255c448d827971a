//! Écriture des artefacts JSON sur disque
//!
//! Chaque fichier est écrit dans un fichier temporaire puis renommé, pour
//! qu'un lecteur concurrent (interface, script de suivi) ne voie jamais un
//! JSON tronqué.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use emprise::{ArtifactSink, CycleArtifact, ParcelArtifact, RankingEntry};

/// Réceptacle d'artefacts écrivant dans une arborescence de sortie :
/// `parcels/<slug>/placements.json`, `cycles/cycle_NNN.json`,
/// `parcels/best_parcels.json`
pub struct DirectoryArtifactSink {
    root: PathBuf,
}

impl DirectoryArtifactSink {
    pub fn new(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root.join("parcels"))?;
        fs::create_dir_all(root.join("cycles"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn parcel_path(&self, parcel_id: &str) -> PathBuf {
        self.root
            .join("parcels")
            .join(slugify(parcel_id))
            .join("placements.json")
    }

    fn write_parcel(&self, artifact: &ParcelArtifact) -> io::Result<()> {
        let path = self.parcel_path(&artifact.summary.parcel_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, artifact)?;
        debug!(path = %path.display(), "Parcel artifact written");
        Ok(())
    }
}

impl ArtifactSink for DirectoryArtifactSink {
    fn parcel_snapshot(&self, artifact: &ParcelArtifact) -> io::Result<()> {
        self.write_parcel(artifact)
    }

    fn parcel_final(&self, artifact: &ParcelArtifact) -> io::Result<()> {
        self.write_parcel(artifact)
    }

    fn cycle(&self, artifact: &CycleArtifact) -> io::Result<()> {
        let path = self
            .root
            .join("cycles")
            .join(format!("cycle_{:03}.json", artifact.cycle));
        write_atomic(&path, artifact)
    }

    fn ranking(&self, entries: &[RankingEntry]) -> io::Result<()> {
        let path = self.root.join("parcels").join("best_parcels.json");
        write_atomic(&path, &entries)
    }
}

/// Écriture atomique : fichier temporaire adjacent puis rename
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(io::Error::from)?;
    writer.flush()?;
    fs::rename(&tmp, path)
}

/// Identifiant de parcelle vers nom de répertoire sûr
fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    let trimmed = slug.trim_end_matches('-').to_string();
    if trimmed.is_empty() {
        "parcel".to_string()
    } else {
        trimmed
    }
}
