use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quiz::PlayerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: i64,
    pub first_name: String,
    pub best_score: u32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] serde_json::Error),
}

/// Where leaderboard records live between runs.
pub trait ScoreStore: Send + Sync {
    fn load(&self) -> Result<Vec<PlayerRecord>, StoreError>;
    fn save(&self, records: &[PlayerRecord]) -> Result<(), StoreError>;
}

/// Flat-file store: one JSON array, rewritten whole on every change.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScoreStore for JsonFileStore {
    fn load(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn save(&self, records: &[PlayerRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Keeps everything in memory; backs tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PlayerRecord>>,
}

impl ScoreStore for MemoryStore {
    fn load(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn save(&self, records: &[PlayerRecord]) -> Result<(), StoreError> {
        *self.records.lock().unwrap() = records.to_vec();
        Ok(())
    }
}

/// Best score per user. Records arrive in completion order and stay in that
/// order, which is what breaks ties in `top_scores`.
pub struct Leaderboard {
    store: Box<dyn ScoreStore>,
    records: Mutex<Vec<PlayerRecord>>,
}

impl Leaderboard {
    pub fn open(store: Box<dyn ScoreStore>) -> Self {
        let records = store.load().unwrap_or_else(|err| {
            warn!("failed to load leaderboard: {err}; starting empty");
            Vec::new()
        });
        Self { store, records: Mutex::new(records) }
    }

    /// Records a finished run. First sight of a user creates their record;
    /// afterwards only improvements over the stored best are kept.
    pub fn record_attempt(&self, user: PlayerId, first_name: &str, score: u32) {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == user.0) {
            Some(record) => {
                if score <= record.best_score {
                    return;
                }
                record.best_score = score;
            }
            None => records.push(PlayerRecord {
                id: user.0,
                first_name: first_name.to_string(),
                best_score: score,
                joined_at: Utc::now(),
            }),
        }
        if let Err(err) = self.store.save(&records) {
            warn!("failed to persist leaderboard: {err}");
        }
    }

    /// Top `n` users by best score, ties broken by arrival order. Users who
    /// never scored are hidden.
    pub fn top_scores(&self, n: usize) -> Vec<PlayerRecord> {
        let records = self.records.lock().unwrap();
        let mut best: Vec<PlayerRecord> =
            records.iter().filter(|r| r.best_score > 0).cloned().collect();
        best.sort_by(|a, b| b.best_score.cmp(&a.best_score));
        best.truncate(n);
        best
    }

    pub fn player_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}
