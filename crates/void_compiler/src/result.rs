//! Outcome of a single build attempt

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Identifier of one backend invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildId(pub u64);

/// Result of one build, produced exactly once and never modified
#[derive(Debug, Clone)]
pub struct CompilationResult {
    build_id: BuildId,
    source: PathBuf,
    success: bool,
    diagnostics: String,
    output_path: PathBuf,
    started_at: SystemTime,
    finished_at: SystemTime,
    superseded: bool,
}

impl CompilationResult {
    /// A successful build
    pub fn succeeded(
        build_id: BuildId,
        source: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        diagnostics: impl Into<String>,
        started_at: SystemTime,
    ) -> Self {
        Self {
            build_id,
            source: source.into(),
            success: true,
            diagnostics: diagnostics.into(),
            output_path: output_path.into(),
            started_at,
            finished_at: SystemTime::now(),
            superseded: false,
        }
    }

    /// A failed build
    pub fn failed(
        build_id: BuildId,
        source: impl Into<PathBuf>,
        diagnostics: impl Into<String>,
        started_at: SystemTime,
    ) -> Self {
        Self {
            build_id,
            source: source.into(),
            success: false,
            diagnostics: diagnostics.into(),
            output_path: PathBuf::new(),
            started_at,
            finished_at: SystemTime::now(),
            superseded: false,
        }
    }

    /// Same result, marked as overtaken by a queued newer build for its key
    pub fn into_superseded(self) -> Self {
        Self {
            superseded: true,
            ..self
        }
    }

    pub fn build_id(&self) -> BuildId {
        self.build_id
    }

    /// Primary source the build was keyed on
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    /// Built module path; only meaningful when the build succeeded
    pub fn output_path(&self) -> Option<&Path> {
        if self.success {
            Some(&self.output_path)
        } else {
            None
        }
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn finished_at(&self) -> SystemTime {
        self.finished_at
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }

    /// A newer build for the same key was queued while this one ran
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }
}
