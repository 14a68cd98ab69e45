//! Watchlist Capability
//!
//! Match strategy mirrors a screening service: exact ID, exact name,
//! substring, then Jaro-Winkler fuzzy scoring, merged best-score-per-entity
//! and truncated to the top candidates. Grading happens downstream in the
//! risk stage.

use async_trait::async_trait;

use super::ToolError;
use crate::model::{ExtractedFields, WatchlistMatch};

const TOP_K: usize = 5;

const ID_EXACT_SCORE: f64 = 1.0;
const NAME_EXACT_SCORE: f64 = 0.95;
const NAME_LIKE_SCORE: f64 = 0.70;

/// Identity fields forwarded to the screening backend
#[derive(Debug, Clone, Default)]
pub struct IdentityQuery {
    pub name: Option<String>,
    pub id_number: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
}

impl IdentityQuery {
    pub fn from_fields(fields: &ExtractedFields) -> Self {
        Self {
            name: fields.name.clone(),
            id_number: fields.id_number.clone(),
            address: fields.address.clone(),
            email: fields.email.clone(),
        }
    }
}

/// Screening lookup over a watchlist
#[async_trait]
pub trait WatchlistIndex: Send + Sync {
    /// Search the list; matches come back ordered by descending score
    async fn search(&self, query: &IdentityQuery) -> Result<Vec<WatchlistMatch>, ToolError>;
}

/// One listed entity
#[derive(Debug, Clone)]
pub struct WatchlistEntry {
    pub full_name: String,
    pub id_number: String,
    pub source: String,
    pub notes: String,
}

impl WatchlistEntry {
    fn seed(full_name: &str, id_number: &str, notes: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            id_number: id_number.to_string(),
            source: "SEED".to_string(),
            notes: notes.to_string(),
        }
    }
}

/// In-memory watchlist with demo seed data.
///
/// A production deployment would swap this for a screening-service client;
/// the stage contract is the same either way.
#[derive(Debug, Clone)]
pub struct SeededWatchlist {
    entries: Vec<WatchlistEntry>,
}

impl SeededWatchlist {
    pub fn new(entries: Vec<WatchlistEntry>) -> Self {
        Self { entries }
    }

    /// Demo entities covering the common screening sources
    pub fn demo() -> Self {
        Self::new(vec![
            WatchlistEntry::seed("Rahul Menon", "SGP1234567Z", "Known mule recruiter"),
            WatchlistEntry::seed("Aisha Karim", "SGP7654321X", "Chargeback ring"),
            WatchlistEntry::seed("Wei Liang", "SGP9988776K", "Structuring alerts"),
            WatchlistEntry::seed("Ivan Petrov", "RUS5566778P", "PEP associate"),
            WatchlistEntry::seed("Maria Santos", "PHL1122334M", "Watch notice"),
            WatchlistEntry::seed("John Smith", "USA8899001A", "High-risk merchant ties"),
            WatchlistEntry::seed("Chen Li", "CHN7788990C", "Known alias"),
            WatchlistEntry::seed("Olivia Brown", "GBR4433221E", "Chargeback disputes"),
            WatchlistEntry::seed("Siti Rahmah", "MYS9988776H", "Watch notice"),
            WatchlistEntry::seed("Peter Chan", "HKG7788990M", "Shell company links"),
        ])
    }

    fn score_entry(&self, entry: &WatchlistEntry, name: &str, id_number: &str) -> f64 {
        let mut best: f64 = 0.0;
        if !id_number.is_empty() && entry.id_number.eq_ignore_ascii_case(id_number) {
            best = best.max(ID_EXACT_SCORE);
        }
        if !name.is_empty() {
            let listed = entry.full_name.to_lowercase();
            let query = name.to_lowercase();
            if listed == query {
                best = best.max(NAME_EXACT_SCORE);
            } else if listed.contains(&query) || query.contains(&listed) {
                best = best.max(NAME_LIKE_SCORE);
            }
            best = best.max(strsim::jaro_winkler(&listed, &query));
        }
        best
    }
}

#[async_trait]
impl WatchlistIndex for SeededWatchlist {
    async fn search(&self, query: &IdentityQuery) -> Result<Vec<WatchlistMatch>, ToolError> {
        let name = query.name.as_deref().unwrap_or("").trim();
        let id_number = query.id_number.as_deref().unwrap_or("").trim();

        let mut matches: Vec<WatchlistMatch> = self
            .entries
            .iter()
            .map(|entry| WatchlistMatch {
                candidate: entry.full_name.clone(),
                score: round4(self.score_entry(entry, name, id_number)),
                source: entry.source.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.candidate.cmp(&b.candidate))
        });
        matches.truncate(TOP_K);
        Ok(matches)
    }
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}
