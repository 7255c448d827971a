//! Sorties du crawl : artefacts JSON et journal d'événements

pub mod artifacts;
pub mod events;

pub use artifacts::DirectoryArtifactSink;
pub use events::EventLog;
