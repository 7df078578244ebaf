use crate::progress::format_duration;
use crate::state::ExpeditionState;
use crate::ExpeditionError;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_CHECKPOINT_FILE: &str = "expedition_checkpoint.json";

/// Result of reading the canonical checkpoint.
#[derive(Debug)]
pub enum CheckpointLoad {
    Missing,
    /// Present but unreadable or inconsistent; callers start fresh.
    Corrupt(String),
    Loaded(ExpeditionState),
}

/// Persists `ExpeditionState` as JSON with write-temp-then-rename.
pub struct CheckpointStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);
        Self { path, temp_path }
    }

    /// Store rooted in `base_dir` using the default file name.
    pub fn with_base_dir(base_dir: &Path) -> Self {
        Self::new(base_dir.join(DEFAULT_CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `state` atomically. The canonical file is always either the
    /// previous complete snapshot or this one.
    pub fn save(&self, state: &ExpeditionState) -> Result<(), ExpeditionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        {
            let file = File::create(&self.temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, state)?;
            writer.flush()?;
            writer
                .into_inner()
                .map_err(|e| ExpeditionError::Io(e.into_error()))?
                .sync_all()?;
        }

        fs::rename(&self.temp_path, &self.path)?;
        tracing::trace!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }

    pub fn load(&self) -> CheckpointLoad {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CheckpointLoad::Missing,
            Err(e) => return CheckpointLoad::Corrupt(format!("cannot open: {}", e)),
        };

        let state: ExpeditionState = match serde_json::from_reader(BufReader::new(file)) {
            Ok(state) => state,
            Err(e) => return CheckpointLoad::Corrupt(format!("cannot parse: {}", e)),
        };

        if let Err(e) = state.validate() {
            return CheckpointLoad::Corrupt(e.to_string());
        }

        CheckpointLoad::Loaded(state)
    }

    /// Delete the checkpoint once nothing is left to resume.
    pub fn remove(&self) -> Result<(), ExpeditionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Human-readable view of a checkpoint for the `status` command.
pub struct CheckpointSummary<'a> {
    pub path: &'a Path,
    pub state: &'a ExpeditionState,
}

impl fmt::Display for CheckpointSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state;
        let total = state.range.len();
        let completed = state.answers.len();
        let percent = if total == 0 {
            100.0
        } else {
            100.0 * completed as f64 / total as f64
        };

        writeln!(f, "Checkpoint: {}", self.path.display())?;
        writeln!(f, "Range: {}", state.range)?;
        writeln!(f, "Progress: {}/{} ({:.1}%)", completed, total, percent)?;
        writeln!(f, "Total elapsed: {}", format_duration(state.total_elapsed_seconds))?;
        writeln!(f, "Current batch size: {}", state.current_batch_width)?;

        if !state.searches.is_empty() {
            writeln!(f, "\nActive searches:")?;
            for (index, search) in &state.searches {
                let best = search
                    .best_candidate()
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    f,
                    "  F({}) > {} | best={} | pending={}",
                    index,
                    search.completed_boundary(),
                    best,
                    search.pending_ranges().len()
                )?;
            }
        }

        if !state.answers.is_empty() {
            writeln!(f, "\nCompleted results:")?;
            for (index, answer) in state.answers.iter().take(10) {
                writeln!(f, "  F({}) = {}", index, answer)?;
            }
            if state.answers.len() > 10 {
                writeln!(f, "  ... and {} more", state.answers.len() - 10)?;
            }
        }
        Ok(())
    }
}
