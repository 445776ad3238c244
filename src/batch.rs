// batch.rs - Runs a batch one file at a time and collects the outcome

use crate::command::ConversionParameters;
use crate::engine::MediaEngine;
use crate::error::ValidationError;
use crate::pipeline::{convert_file, ConversionResult, FileFailure};
use crate::source::SourceFile;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// Every input file ends up in exactly one of the two lists, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<ConversionResult>,
    pub failures: Vec<FileFailure>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "Converted {} of {} images ({} failed)",
            self.results.len(),
            self.total(),
            self.failures.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Pause before each file so the interface can redraw between files.
    pub inter_file_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            inter_file_delay: Duration::from_millis(100),
        }
    }
}

/// Outcome of one file, handed back to the orchestrator.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub index: usize,
    pub outcome: Result<ConversionResult, FileFailure>,
}

/// The work for one file, detached from the orchestrator so it can run on
/// another task while the caller keeps ownership of the batch.
pub struct FileJob<E> {
    index: usize,
    file: SourceFile,
    params: ConversionParameters,
    engine: Arc<E>,
    delay: Duration,
}

impl<E: MediaEngine + 'static> FileJob<E> {
    #[cfg(test)]
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn execute(self) -> FileReport {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let FileJob {
            index,
            file,
            params,
            engine,
            ..
        } = self;
        let fallback = file.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            convert_file(engine.as_ref(), index, &file, &params)
        })
        .await
        .unwrap_or_else(|e| {
            Err(FileFailure {
                file: fallback,
                reason: format!("Conversion task failed: {e}"),
                attempts: 0,
            })
        });

        FileReport { index, outcome }
    }
}

/// Drives one batch at a time: `Idle -> Running -> Completed`.
///
/// Files are handed out strictly one after another; no job is issued while
/// the previous one is still out.
pub struct BatchOrchestrator<E> {
    engine: Arc<E>,
    settings: BatchSettings,
    state: BatchState,
    files: Vec<SourceFile>,
    file_states: Vec<FileState>,
    params: Option<ConversionParameters>,
    next: usize,
    in_flight: Option<usize>,
    outcome: BatchOutcome,
}

impl<E: MediaEngine + 'static> BatchOrchestrator<E> {
    pub fn new(engine: Arc<E>, settings: BatchSettings) -> Self {
        Self {
            engine,
            settings,
            state: BatchState::Idle,
            files: Vec::new(),
            file_states: Vec::new(),
            params: None,
            next: 0,
            in_flight: None,
            outcome: BatchOutcome::default(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn file_states(&self) -> &[FileState] {
        &self.file_states
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.next,
            total: self.files.len(),
        }
    }

    pub fn outcome(&self) -> &BatchOutcome {
        &self.outcome
    }

    /// Begin a run. Results of any previous run are dropped.
    pub fn start(
        &mut self,
        files: Vec<SourceFile>,
        params: ConversionParameters,
    ) -> Result<Progress, ValidationError> {
        if self.state == BatchState::Running {
            return Err(ValidationError::AlreadyRunning);
        }
        if files.is_empty() {
            return Err(ValidationError::NoFiles);
        }

        info!(
            files = files.len(),
            width = params.width,
            height = params.height,
            background = %params.background,
            mode = ?params.mode,
            "starting batch"
        );

        self.file_states = vec![FileState::Pending; files.len()];
        self.files = files;
        self.params = Some(params);
        self.next = 0;
        self.in_flight = None;
        self.outcome = BatchOutcome::default();
        self.state = BatchState::Running;
        Ok(self.progress())
    }

    /// The next file's job, or `None` if one is already out or nothing is left.
    pub fn next_job(&mut self) -> Option<FileJob<E>> {
        if self.state != BatchState::Running || self.in_flight.is_some() {
            return None;
        }
        let index = self.next;
        let file = self.files.get(index)?.clone();
        let params = self.params.clone()?;

        self.in_flight = Some(index);
        self.file_states[index] = FileState::InProgress;
        Some(FileJob {
            index,
            file,
            params,
            engine: Arc::clone(&self.engine),
            delay: self.settings.inter_file_delay,
        })
    }

    /// Fold a finished job back in. Reports for anything other than the
    /// outstanding job are ignored.
    pub fn record(&mut self, report: FileReport) -> Option<Progress> {
        if self.in_flight != Some(report.index) {
            warn!(index = report.index, "ignoring report for a file that is not in progress");
            return None;
        }
        self.in_flight = None;

        match report.outcome {
            Ok(result) => {
                info!(
                    file = result.source.name(),
                    output = %result.display_name,
                    produced_by = %result.produced_by,
                    attempts = result.attempts,
                    "converted"
                );
                self.file_states[report.index] = FileState::Succeeded;
                self.outcome.results.push(result);
            }
            Err(failure) => {
                warn!(file = failure.file.name(), reason = %failure.reason, "conversion failed");
                self.file_states[report.index] = FileState::Failed;
                self.outcome.failures.push(failure);
            }
        }

        self.next += 1;
        if self.next == self.files.len() {
            self.state = BatchState::Completed;
            info!(
                converted = self.outcome.results.len(),
                failed = self.outcome.failures.len(),
                "batch completed"
            );
        }
        Some(self.progress())
    }

    /// Drop the finished batch and its result buffers. Has no effect while running.
    pub fn reset(&mut self) {
        if self.state == BatchState::Running {
            return;
        }
        self.files.clear();
        self.file_states.clear();
        self.params = None;
        self.next = 0;
        self.outcome = BatchOutcome::default();
        self.state = BatchState::Idle;
    }

    /// Run a whole batch to completion, reporting progress after each file.
    /// The window drives the same steps itself through `next_job`/`record`.
    #[cfg(test)]
    pub async fn run(
        &mut self,
        files: Vec<SourceFile>,
        params: ConversionParameters,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<BatchOutcome, ValidationError> {
        self.start(files, params)?;
        while let Some(job) = self.next_job() {
            let report = job.execute().await;
            if let Some(progress) = self.record(report) {
                on_progress(progress);
            }
        }
        Ok(self.outcome.clone())
    }
}
