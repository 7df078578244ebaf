use crate::state::IndexRange;
use crate::ExpeditionError;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const SUMMARY_MARKER: &str = "\n## Results Summary";

/// Format seconds as `12.3s`, `4m 5s` or `2h 3m`.
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let total = seconds as u64;
        format!("{}m {}s", total / 60, total % 60)
    } else {
        let total = seconds as u64;
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}

/// Emitted once per index when its answer is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerEvent {
    pub index: u64,
    pub answer: u64,
    pub elapsed_seconds: f64,
    pub batch_width: u64,
    pub remaining: usize,
    /// Slot that delivered the completing result.
    pub finished_worker: Option<usize>,
    /// `(index, range start)` per worker slot at the time of the answer.
    pub assignments: Vec<Option<(u64, u64)>>,
}

/// Periodic snapshot of one active search.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub index: u64,
    pub completed_boundary: u64,
    pub best_candidate: Option<u64>,
    pub batch_width: u64,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishEvent<'a> {
    pub answers: &'a BTreeMap<u64, u64>,
    pub total_elapsed_seconds: f64,
    pub complete: bool,
}

/// Receives expedition events. Nothing in the scheduler depends on them.
pub trait ExpeditionObserver {
    fn on_answer(&mut self, event: &AnswerEvent);

    fn on_progress(&mut self, _event: &ProgressEvent) {}

    fn on_finish(&mut self, _event: &FinishEvent<'_>) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl ExpeditionObserver for LogObserver {
    fn on_answer(&mut self, event: &AnswerEvent) {
        tracing::info!(
            index = event.index,
            answer = event.answer,
            "F({}) = {:6} | batch={:4} | elapsed={} | remaining={}",
            event.index,
            event.answer,
            event.batch_width,
            format_duration(event.elapsed_seconds),
            event.remaining
        );
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        let best = event
            .best_candidate
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        tracing::debug!(
            index = event.index,
            "F({}) > {} | best={} | batch={} | elapsed={}",
            event.index,
            event.completed_boundary,
            best,
            event.batch_width,
            format_duration(event.elapsed_seconds)
        );
    }

    fn on_finish(&mut self, event: &FinishEvent<'_>) {
        if event.complete {
            tracing::info!(
                "Expedition complete: {} results in {}",
                event.answers.len(),
                format_duration(event.total_elapsed_seconds)
            );
        } else {
            tracing::info!(
                "Expedition paused: {} results saved after {}",
                event.answers.len(),
                format_duration(event.total_elapsed_seconds)
            );
        }
    }
}

/// Markdown table showing what every worker was doing when each answer landed.
pub struct WorkerLog {
    path: PathBuf,
    file: File,
    num_workers: usize,
}

impl WorkerLog {
    /// Open the log. On resume an existing file keeps its rows and loses
    /// only the trailing summary, which is rewritten at the end.
    pub fn open(
        path: &Path,
        range: IndexRange,
        num_workers: usize,
        resume: bool,
    ) -> Result<Self, ExpeditionError> {
        let file = if resume && path.exists() {
            truncate_at_summary(path)?;
            OpenOptions::new().append(true).open(path)?
        } else {
            let mut file = File::create(path)?;
            write_header(&mut file, range, num_workers)?;
            file
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            num_workers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_row(&mut self, event: &AnswerEvent) -> Result<(), ExpeditionError> {
        let cells = (0..self.num_workers)
            .map(|worker| {
                let cell = if event.finished_worker == Some(worker) {
                    format!("**{}**", event.index)
                } else {
                    match event.assignments.get(worker).copied().flatten() {
                        Some((index, start)) => format!("{}:{}", index, start),
                        None => "—".to_string(),
                    }
                };
                format!(" {:>5} |", cell)
            })
            .join("");

        writeln!(
            self.file,
            "| {:>5} | {} | {} |{}",
            format_duration(event.elapsed_seconds),
            event.index,
            event.answer,
            cells
        )?;
        self.file.flush()?;
        Ok(())
    }

    pub fn log_summary(
        &mut self,
        answers: &BTreeMap<u64, u64>,
        total_elapsed_seconds: f64,
    ) -> Result<(), ExpeditionError> {
        write!(self.file, "{}\n\n", SUMMARY_MARKER)?;
        writeln!(
            self.file,
            "**Total time**: {} | **Count**: {}\n",
            format_duration(total_elapsed_seconds),
            answers.len()
        )?;
        writeln!(self.file, "| n | F(n) |")?;
        writeln!(self.file, "|---:|-----:|")?;
        for (index, answer) in answers {
            writeln!(self.file, "| {} | {} |", index, answer)?;
        }
        self.file.flush()?;
        Ok(())
    }
}

impl ExpeditionObserver for WorkerLog {
    fn on_answer(&mut self, event: &AnswerEvent) {
        if let Err(e) = self.log_row(event) {
            tracing::warn!(path = %self.path.display(), "worker log write failed: {}", e);
        }
    }

    fn on_finish(&mut self, event: &FinishEvent<'_>) {
        if let Err(e) = self.log_summary(event.answers, event.total_elapsed_seconds) {
            tracing::warn!(path = %self.path.display(), "worker log summary failed: {}", e);
        }
    }
}

fn write_header(file: &mut File, range: IndexRange, num_workers: usize) -> Result<(), ExpeditionError> {
    writeln!(
        file,
        "# Expedition F({}-{}) Worker Log\n",
        range.first_index, range.last_index
    )?;
    writeln!(file, "Batch-based with checkpoint/resume, {} workers.\n", num_workers)?;
    writeln!(file, "**Worker cells**: `n:offset` = F(n) batch starting at offset.")?;
    writeln!(file, "**Bold** = worker that just confirmed this result.\n")?;

    let worker_headers = (1..=num_workers).map(|w| format!(" W{:02} |", w)).join("");
    let worker_separators = "--------:|".repeat(num_workers);
    writeln!(file, "| Time | n | F(n) |{}", worker_headers)?;
    writeln!(file, "|-----:|---:|-----:|{}", worker_separators)?;
    file.flush()?;
    Ok(())
}

fn truncate_at_summary(path: &Path) -> Result<(), ExpeditionError> {
    let content = fs::read_to_string(path)?;
    if let Some(position) = content.find(SUMMARY_MARKER) {
        fs::write(path, &content[..position + 1])?;
        tracing::info!(path = %path.display(), "truncated worker log at summary for resume");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(index: u64, value: u64, finished: Option<usize>) -> AnswerEvent {
        AnswerEvent {
            index,
            answer: value,
            elapsed_seconds: 3.0,
            batch_width: 100,
            remaining: 0,
            finished_worker: finished,
            assignments: vec![Some((index + 1, 40)), None],
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.04), "0.0s");
        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(245.0), "4m 5s");
        assert_eq!(format_duration(7380.0), "2h 3m");
        assert_eq!(format_duration(-1.0), "0.0s");
    }

    #[test]
    fn test_worker_log_rows_and_summary() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("workers.md");
        let mut log = WorkerLog::open(&path, IndexRange::new(1, 2), 2, false).unwrap();

        log.on_answer(&answer(1, 3, Some(1)));
        let answers: BTreeMap<u64, u64> = [(1, 3)].into_iter().collect();
        log.on_finish(&FinishEvent {
            answers: &answers,
            total_elapsed_seconds: 3.0,
            complete: false,
        });

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Expedition F(1-2) Worker Log"));
        assert!(content.contains("| Time | n | F(n) | W01 | W02 |"));
        assert!(content.contains("|  3.0s | 1 | 3 |  2:40 | **1** |"));
        assert!(content.contains("## Results Summary"));
        assert!(content.contains("| 1 | 3 |"));
    }

    #[test]
    fn test_worker_log_resume_truncates_summary() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("workers.md");
        let answers: BTreeMap<u64, u64> = [(1, 3)].into_iter().collect();
        {
            let mut log = WorkerLog::open(&path, IndexRange::new(1, 2), 2, false).unwrap();
            log.log_row(&answer(1, 3, Some(0))).unwrap();
            log.log_summary(&answers, 3.0).unwrap();
        }
        {
            let mut log = WorkerLog::open(&path, IndexRange::new(1, 2), 2, true).unwrap();
            log.log_row(&answer(2, 5, Some(0))).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("## Results Summary"));
        assert_eq!(content.matches("# Expedition").count(), 1);
        let rows: Vec<_> = content.lines().filter(|l| l.contains("**")).filter(|l| l.starts_with("|  3.0s")).collect();
        assert_eq!(rows.len(), 2);
    }
}
