//! Refresh guard for low-frequency jobs.
//!
//! Slow-moving inputs (company metadata, analyst targets, weight refits)
//! do not need refreshing on every daily run. The guard keeps a JSON
//! ledger `{job -> last_run}` and answers "has `every` elapsed since this
//! job last ran". The clock is injected so tests control time.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("guard ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt guard ledger {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> GuardError + '_ {
    move |source| GuardError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct RefreshGuard<C: Clock> {
    path: PathBuf,
    clock: C,
    ledger: BTreeMap<String, DateTime<Utc>>,
}

impl<C: Clock> RefreshGuard<C> {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>, clock: C) -> Result<Self, GuardError> {
        let path = path.into();
        let ledger = if path.exists() {
            let content = fs::read_to_string(&path).map_err(io_err(&path))?;
            serde_json::from_str(&content).map_err(|source| GuardError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            clock,
            ledger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_run(&self, job: &str) -> Option<DateTime<Utc>> {
        self.ledger.get(job).copied()
    }

    /// True when `job` never ran or ran at least `every` ago.
    pub fn should_run(&self, job: &str, every: Duration) -> bool {
        match self.last_run(job) {
            None => true,
            Some(last) => {
                let elapsed = self.clock.now() - last;
                debug!(job, elapsed_secs = elapsed.num_seconds(), "refresh guard check");
                elapsed >= every
            }
        }
    }

    /// Record that `job` ran now and persist the ledger.
    pub fn mark_run(&mut self, job: &str) -> Result<(), GuardError> {
        self.ledger.insert(job.to_string(), self.clock.now());
        self.save()
    }

    /// Jobs and their last run, sorted by job name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.ledger.iter().map(|(job, at)| (job.as_str(), *at))
    }

    fn save(&self) -> Result<(), GuardError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let json = serde_json::to_string_pretty(&self.ledger).map_err(|source| {
            GuardError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap())
    }

    #[test]
    fn unknown_job_should_run() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RefreshGuard::open(dir.path().join("guard.json"), at(1, 9)).unwrap();
        assert!(guard.should_run("fundamentals", Duration::days(7)));
        assert_eq!(guard.last_run("fundamentals"), None);
    }

    #[test]
    fn job_waits_for_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("guard.json");

        let mut guard = RefreshGuard::open(&path, at(1, 9)).unwrap();
        guard.mark_run("analyst").unwrap();
        assert!(!guard.should_run("analyst", Duration::hours(24)));

        let later = RefreshGuard::open(&path, at(2, 8)).unwrap();
        assert!(!later.should_run("analyst", Duration::hours(24)));

        let next_day = RefreshGuard::open(&path, at(2, 9)).unwrap();
        assert!(next_day.should_run("analyst", Duration::hours(24)));
        assert_eq!(next_day.entries().count(), 1);
    }

    #[test]
    fn corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RefreshGuard::open(&path, SystemClock),
            Err(GuardError::Corrupt { .. })
        ));
    }
}
