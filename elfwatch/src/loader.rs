// elfwatch/src/loader.rs
//
// Table loader — reads the three workshop datasets into typed tables.
//
//   Elf_Behavior_Logs.csv       → BehaviorRecord
//   Elf_Communication_Logs.csv  → CommunicationRecord
//   Elf_Schedule.csv            → ScheduleRecord
//
// Required columns are checked against the header row before any record
// is decoded; extra columns are ignored. A missing file, missing column or
// unparsable row fails the whole load.
//
// TableSource wraps the loader with a reload policy: per-request (fresh read
// on every call) or startup (cached, swapped only by reload()).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ReloadPolicy;
use crate::records::{BehaviorRecord, CommunicationRecord, ScheduleRecord};

pub const BEHAVIOR_FILE:       &str = "Elf_Behavior_Logs.csv";
pub const COMMUNICATIONS_FILE: &str = "Elf_Communication_Logs.csv";
pub const SCHEDULE_FILE:       &str = "Elf_Schedule.csv";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("{}: missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Tables ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub behavior:       Vec<BehaviorRecord>,
    pub communications: Vec<CommunicationRecord>,
    pub schedule:       Vec<ScheduleRecord>,
}

impl Tables {
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        let tables = Self {
            behavior:       read_table(&dir.join(BEHAVIOR_FILE), BehaviorRecord::COLUMNS)?,
            communications: read_table(&dir.join(COMMUNICATIONS_FILE), CommunicationRecord::COLUMNS)?,
            schedule:       read_table(&dir.join(SCHEDULE_FILE), ScheduleRecord::COLUMNS)?,
        };
        debug!(
            "Loaded {} behavior / {} communication / {} schedule rows from {}",
            tables.behavior.len(), tables.communications.len(), tables.schedule.len(),
            dir.display()
        );
        Ok(tables)
    }

    pub fn behavior_for<'a>(&'a self, name: &str) -> Vec<&'a BehaviorRecord> {
        self.behavior.iter().filter(|r| r.elf_name == name).collect()
    }

    /// Up to `limit` messages for `name`, newest first. Equal send times,
    /// and unparsable ones, keep file order.
    pub fn recent_communications<'a>(&'a self, name: &str, limit: usize) -> Vec<&'a CommunicationRecord> {
        let mut rows: Vec<(_, &CommunicationRecord)> = self.communications.iter()
            .filter(|c| c.elf_name == name)
            .map(|c| (c.sent_at(), c))
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.into_iter().take(limit).map(|(_, c)| c).collect()
    }

    /// First schedule row for `name`, if any.
    pub fn schedule_for(&self, name: &str) -> Option<&ScheduleRecord> {
        self.schedule.iter().find(|s| s.elf_name == name)
    }

    /// Distinct elf names in behavior data, in first-seen order.
    pub fn elf_names(&self) -> Vec<&str> {
        let mut seen  = std::collections::HashSet::new();
        let mut names = Vec::new();
        for r in &self.behavior {
            if seen.insert(r.elf_name.as_str()) {
                names.push(r.elf_name.as_str());
            }
        }
        names
    }
}

fn read_table<T: DeserializeOwned>(path: &Path, required: &[&str]) -> Result<Vec<T>, LoadError> {
    if !path.is_file() {
        return Err(LoadError::MissingFile(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv { path: path.to_path_buf(), source })?;

    let headers = reader.headers()
        .map_err(|source| LoadError::Csv { path: path.to_path_buf(), source })?
        .clone();
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(LoadError::MissingColumn {
                path:   path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }

    reader.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| LoadError::Csv { path: path.to_path_buf(), source })
}

// ── TableSource ───────────────────────────────────────────────────────────────

pub struct TableSource {
    dir:    PathBuf,
    policy: ReloadPolicy,
    cached: RwLock<Arc<Tables>>,
}

impl TableSource {
    /// Validate the data directory with one full load. Callers treat an
    /// error here as fatal.
    pub fn open(dir: impl Into<PathBuf>, policy: ReloadPolicy) -> Result<Self, LoadError> {
        let dir    = dir.into();
        let tables = Tables::load(&dir)?;
        info!(
            "Data directory {} ready ({} behavior rows, reload={})",
            dir.display(), tables.behavior.len(), policy
        );
        Ok(Self { dir, policy, cached: RwLock::new(Arc::new(tables)) })
    }

    pub fn dir(&self) -> &Path { &self.dir }
    pub fn policy(&self) -> ReloadPolicy { self.policy }

    /// Tables for one request, honoring the reload policy.
    pub fn current(&self) -> Result<Arc<Tables>, LoadError> {
        match self.policy {
            ReloadPolicy::PerRequest => Ok(Arc::new(Tables::load(&self.dir)?)),
            ReloadPolicy::Startup    => Ok(self.cached.read().clone()),
        }
    }

    /// Re-read the directory and swap the cache. On failure the previous
    /// tables stay in place.
    pub fn reload(&self) -> Result<Arc<Tables>, LoadError> {
        let fresh = Arc::new(Tables::load(&self.dir)?);
        *self.cached.write() = Arc::clone(&fresh);
        info!("Reloaded {} ({} behavior rows)", self.dir.display(), fresh.behavior.len());
        Ok(fresh)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn write_dataset(behavior: &str, comms: &str, schedule: &str) -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(BEHAVIOR_FILE), behavior).unwrap();
        fs::write(dir.path().join(COMMUNICATIONS_FILE), comms).unwrap();
        fs::write(dir.path().join(SCHEDULE_FILE), schedule).unwrap();
        dir
    }

    pub(crate) const BEHAVIOR: &str = "\
Elf_Name,Date,Suspicious_Activity_Score,Tasks_Completed,Shift_Attendance,Materials_Accessed
Jingle,2024-12-01,2,8,9,10
Jingle,2024-12-02,4,6,7,30
Sprinkle,2024-12-01,0,10,10,0
";

    pub(crate) const COMMS: &str = "\
Elf_Name,Time_Sent,Message
Jingle,2024-12-01 09:00:00,first
Sprinkle,2024-12-03 09:00:00,not jingle
Jingle,2024-12-04 09:00:00,fourth
Jingle,2024-12-02 09:00:00,second
Jingle,2024-12-06 09:00:00,sixth
Jingle,2024-12-03 09:00:00,third
Jingle,2024-12-05 09:00:00,fifth
";

    pub(crate) const SCHEDULE: &str = "\
Elf_Name,Assigned_Production_Line,Days_Off
Jingle,Wrapping,Sunday
Jingle,Painting,Monday
";

    #[test]
    fn loads_typed_tables_and_ignores_extra_columns() {
        let dir = write_dataset(BEHAVIOR, COMMS, SCHEDULE);
        let t = Tables::load(dir.path()).unwrap();
        assert_eq!(t.behavior.len(), 3);
        assert_eq!(t.communications.len(), 7);
        assert_eq!(t.behavior[1].materials_accessed, Some(30.0));
        assert_eq!(t.elf_names(), vec!["Jingle", "Sprinkle"]);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BEHAVIOR_FILE), BEHAVIOR).unwrap();
        match Tables::load(dir.path()) {
            Err(LoadError::MissingFile(p)) => assert!(p.ends_with(COMMUNICATIONS_FILE)),
            other => panic!("expected MissingFile, got {:?}", other),
        }
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = write_dataset("Elf_Name,Tasks_Completed\nJingle,3\n", COMMS, SCHEDULE);
        match Tables::load(dir.path()) {
            Err(LoadError::MissingColumn { column, .. }) => {
                assert_eq!(column, "Suspicious_Activity_Score")
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn unparsable_number_fails_the_load() {
        let bad = "Elf_Name,Suspicious_Activity_Score,Tasks_Completed,Shift_Attendance,Materials_Accessed\nJingle,lots,1,1,1\n";
        let dir = write_dataset(bad, COMMS, SCHEDULE);
        assert!(matches!(Tables::load(dir.path()), Err(LoadError::Csv { .. })));
    }

    #[test]
    fn recent_communications_newest_first_and_capped() {
        let dir = write_dataset(BEHAVIOR, COMMS, SCHEDULE);
        let t = Tables::load(dir.path()).unwrap();
        let msgs: Vec<&str> = t.recent_communications("Jingle", 5)
            .iter().map(|c| c.message.as_str()).collect();
        assert_eq!(msgs, vec!["sixth", "fifth", "fourth", "third", "second"]);
        assert!(t.recent_communications("Nobody", 5).is_empty());
    }

    #[test]
    fn equal_send_times_keep_file_order() {
        let comms = "\
Elf_Name,Time_Sent,Message
Jingle,2024-12-01 09:00:00,zulu
Jingle,2024-12-01 09:00:00,alpha
Jingle,sometime,unparsed-b
Jingle,whenever,unparsed-a
Jingle,2024-12-02 09:00:00,newest
";
        let dir = write_dataset(BEHAVIOR, comms, SCHEDULE);
        let t = Tables::load(dir.path()).unwrap();
        let msgs: Vec<&str> = t.recent_communications("Jingle", 5)
            .iter().map(|c| c.message.as_str()).collect();
        assert_eq!(msgs, vec!["newest", "zulu", "alpha", "unparsed-b", "unparsed-a"]);
    }

    #[test]
    fn blank_days_off_is_none() {
        let schedule = "Elf_Name,Assigned_Production_Line,Days_Off\nJingle,Wrapping,\n";
        let dir = write_dataset(BEHAVIOR, COMMS, schedule);
        let t = Tables::load(dir.path()).unwrap();
        assert_eq!(t.schedule_for("Jingle").unwrap().days_off, None);
    }

    #[test]
    fn schedule_takes_first_match() {
        let dir = write_dataset(BEHAVIOR, COMMS, SCHEDULE);
        let t = Tables::load(dir.path()).unwrap();
        assert_eq!(t.schedule_for("Jingle").unwrap().production_line, "Wrapping");
        assert!(t.schedule_for("Sprinkle").is_none());
    }

    #[test]
    fn per_request_policy_sees_edits_and_startup_policy_waits_for_reload() {
        let dir = write_dataset(BEHAVIOR, COMMS, SCHEDULE);
        let live   = TableSource::open(dir.path(), ReloadPolicy::PerRequest).unwrap();
        let cached = TableSource::open(dir.path(), ReloadPolicy::Startup).unwrap();

        let more = format!("{}Tinsel,2024-12-01,1,1,1,1\n", BEHAVIOR);
        fs::write(dir.path().join(BEHAVIOR_FILE), more).unwrap();

        assert_eq!(live.current().unwrap().behavior.len(), 4);
        assert_eq!(cached.current().unwrap().behavior.len(), 3);
        cached.reload().unwrap();
        assert_eq!(cached.current().unwrap().behavior.len(), 4);
    }

    #[test]
    fn failed_reload_keeps_previous_tables() {
        let dir = write_dataset(BEHAVIOR, COMMS, SCHEDULE);
        let src = TableSource::open(dir.path(), ReloadPolicy::Startup).unwrap();
        fs::remove_file(dir.path().join(SCHEDULE_FILE)).unwrap();
        assert!(src.reload().is_err());
        assert_eq!(src.current().unwrap().behavior.len(), 3);
    }
}
