//! Journal d'événements NDJSON
//!
//! Les événements du crawl arrivent sur un canal mpsc et sont écrits ligne
//! par ligne dans un fichier, horodatés. Le thread d'écriture se termine
//! quand tous les émetteurs ont été libérés.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::warn;

use emprise::CrawlEvent;

/// Thread d'écriture du journal d'événements
pub struct EventLog {
    path: PathBuf,
    handle: JoinHandle<io::Result<()>>,
}

impl EventLog {
    /// Démarre le thread d'écriture sur `path`. Le thread s'arrête quand le
    /// canal est fermé (tous les `Sender` libérés).
    pub fn spawn(path: &Path, receiver: Receiver<CrawlEvent>) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Impossible de créer {}", path.display()))?;

        let handle = thread::spawn(move || write_events(file, receiver));

        Ok(Self {
            path: path.to_path_buf(),
            handle,
        })
    }

    /// Attend la fin du thread d'écriture et remonte ses erreurs d'E/S
    pub fn finish(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result
                .with_context(|| format!("Erreur d'écriture dans {}", self.path.display())),
            Err(_) => bail!("Le thread du journal d'événements a paniqué"),
        }
    }
}

fn write_events(file: File, receiver: Receiver<CrawlEvent>) -> io::Result<()> {
    let mut writer = BufWriter::new(file);

    for event in receiver {
        let mut value = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Événement non sérialisable, ignoré");
                continue;
            }
        };
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                serde_json::Value::String(
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
            );
        }
        serde_json::to_writer(&mut writer, &value).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_events_are_written_as_ndjson() {
        let dir = std::env::temp_dir().join(format!("emprise-events-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.ndjson");

        let (sender, receiver) = mpsc::channel();
        let log = EventLog::spawn(&path, receiver).unwrap();

        sender
            .send(CrawlEvent::OverallProgress {
                current: 1,
                total: 4,
            })
            .unwrap();
        sender
            .send(CrawlEvent::CycleProgress {
                cycle: 1,
                processed: 2,
                total: 3,
            })
            .unwrap();
        drop(sender);
        log.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "overall_progress");
        assert!(first["timestamp"].is_string());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "cycle_progress");
        assert_eq!(second["cycle"], 1);

        std::fs::remove_dir_all(dir).ok();
    }
}
