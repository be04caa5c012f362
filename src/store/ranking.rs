//! Kill ranking backed by an append-only kill log

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Timestamp format of kill log lines
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counters of one ranked name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankEntry {
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    pub suicides: u32,
}

impl RankEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Best first: kills desc, deaths asc, name asc
    fn standing(&self, other: &Self) -> Ordering {
        other
            .kills
            .cmp(&self.kills)
            .then(self.deaths.cmp(&other.deaths))
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Kill/death counters per player name
pub struct RankingStore {
    /// Kill log; `None` keeps everything in memory
    path: Option<PathBuf>,
    entries: HashMap<String, RankEntry>,
}

impl RankingStore {
    /// Open the kill log and rebuild the counters from it
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RankingError> {
        let mut store = Self {
            path: Some(path.into()),
            entries: HashMap::new(),
        };
        store.refresh().await?;
        Ok(store)
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    /// Rebuild counters from the kill log; a missing log is an empty ranking
    pub async fn refresh(&mut self) -> Result<(), RankingError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(RankingError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        let mut entries = HashMap::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match line.splitn(3, '\t').collect::<Vec<_>>()[..] {
                [_, deader, killer] => count_death(&mut entries, deader, killer),
                _ => warn!(line = number + 1, "Malformed kill log line, skipping"),
            }
        }
        debug!(players = entries.len(), "Ranking refreshed");
        self.entries = entries;
        Ok(())
    }

    /// Count a death and append it to the kill log
    ///
    /// The counters are updated even when the log write fails.
    pub async fn record_death(&mut self, deader: &str, killer: &str) -> Result<(), RankingError> {
        count_death(&mut self.entries, deader, killer);

        let Some(path) = &self.path else {
            return Ok(());
        };
        let line = format!(
            "{}\t{}\t{}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            deader,
            killer
        );
        append_line(path, &line).await
    }

    /// All entries, best first
    pub fn standings(&self) -> Vec<&RankEntry> {
        let mut standings: Vec<_> = self.entries.values().collect();
        standings.sort_by(|a, b| a.standing(b));
        standings
    }

    /// The best `n` entries with their 1-based rank
    pub fn top(&self, n: usize) -> Vec<(usize, &RankEntry)> {
        self.standings()
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, entry)| (i + 1, entry))
            .collect()
    }

    /// 1-based rank of `name`
    pub fn rank_of(&self, name: &str) -> Option<(usize, &RankEntry)> {
        self.standings()
            .into_iter()
            .enumerate()
            .find(|(_, entry)| entry.name == name)
            .map(|(i, entry)| (i + 1, entry))
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

fn count_death(entries: &mut HashMap<String, RankEntry>, deader: &str, killer: &str) {
    let killer_entry = entries
        .entry(killer.to_string())
        .or_insert_with(|| RankEntry::new(killer));
    if deader == killer {
        killer_entry.suicides += 1;
    } else {
        killer_entry.kills += 1;
    }
    entries
        .entry(deader.to_string())
        .or_insert_with(|| RankEntry::new(deader))
        .deaths += 1;
}

/// Append one line, creating the file on first use
pub(crate) async fn append_line(path: &Path, line: &str) -> Result<(), RankingError> {
    let io_err = |source: std::io::Error| RankingError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.write_all(line.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)
}

/// Ranking and identity file errors
#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("Unable to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
