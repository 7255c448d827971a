//! Rapport de fin de run

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use emprise::{CrawlReport, RankingEntry, Termination};

/// Nombre de parcelles mises en avant dans le rapport
const TOP_COUNT: usize = 5;

/// Synthèse d'un run de crawl, imprimée en fin d'exécution et écrite dans
/// `run_report.json`
#[derive(Debug, Serialize)]
pub struct CrawlRunReport {
    pub termination: Termination,
    pub completed_cycles: usize,
    pub parcels_visited: usize,
    pub parcels_evaluated: usize,
    pub duration_secs: f64,
    pub top_parcels: Vec<RankingEntry>,
}

impl CrawlRunReport {
    pub fn from_crawl(report: &CrawlReport, duration: Duration) -> Self {
        Self {
            termination: report.termination,
            completed_cycles: report.completed_cycles,
            parcels_visited: report.visited_order.len(),
            parcels_evaluated: report.results.len(),
            duration_secs: duration.as_secs_f64(),
            top_parcels: report.ranking.iter().take(TOP_COUNT).cloned().collect(),
        }
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("RAPPORT DE CRAWL");
        println!("{}", "=".repeat(60));
        println!("Arrêt               : {}", self.termination);
        println!("Cycles effectués    : {}", self.completed_cycles);
        println!("Parcelles visitées  : {}", self.parcels_visited);
        println!("Parcelles évaluées  : {}", self.parcels_evaluated);
        println!("Durée               : {:.1} s", self.duration_secs);

        if !self.top_parcels.is_empty() {
            println!("{}", "-".repeat(60));
            println!("Meilleures parcelles (score composite moyen) :");
            for (rank, entry) in self.top_parcels.iter().enumerate() {
                let address = if entry.address.is_empty() {
                    "(adresse inconnue)"
                } else {
                    entry.address.as_str()
                };
                println!(
                    "  {}. {} — {} : moy {:.1}, max {:.1}, {} poses",
                    rank + 1,
                    entry.parcel_id,
                    address,
                    entry.average_composite,
                    entry.max_composite,
                    entry.viable_count
                );
            }
        }
        println!("{}", "=".repeat(60));
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .context(format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_with_snake_case_termination() {
        let report = CrawlRunReport {
            termination: Termination::CycleCap,
            completed_cycles: 6,
            parcels_visited: 12,
            parcels_evaluated: 11,
            duration_secs: 4.2,
            top_parcels: vec![],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["termination"], "cycle_cap");
        assert_eq!(value["parcels_visited"], 12);
    }
}
