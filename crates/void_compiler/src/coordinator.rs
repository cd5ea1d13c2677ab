//! Build coordination
//!
//! Serializes build requests per primary source. While a build for a key is
//! running, later requests for that key are coalesced into one queued
//! follow-up that starts when the running build reports back.

use crate::backend::{BuildCompletion, BuildRequest, CompilerBackend};
use crate::error::{CompilerError, Result};
use crate::result::{BuildId, CompilationResult};
use crate::settings::BuildSettings;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

/// Continuation invoked with the build result on the coordinator's thread
pub type BuildCallback = Box<dyn FnOnce(&CompilationResult)>;

/// What happened to a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The backend was invoked for this request
    Started(BuildId),
    /// A build for the key is running; this request joined the queued follow-up
    Coalesced,
}

/// Request waiting for the running build of its key
struct ParkedRequest {
    sources: Vec<PathBuf>,
    settings: BuildSettings,
    callbacks: Vec<BuildCallback>,
}

/// Bookkeeping for the running build of one key
struct BuildJob {
    id: BuildId,
    submitted: Instant,
    callbacks: Vec<BuildCallback>,
    parked: Option<ParkedRequest>,
}

/// Accepts build requests and guarantees one backend invocation per key
pub struct BuildCoordinator {
    backend: Box<dyn CompilerBackend>,
    jobs: HashMap<PathBuf, BuildJob>,
    sender: Sender<(PathBuf, CompilationResult)>,
    receiver: Receiver<(PathBuf, CompilationResult)>,
    next_build_id: u64,
}

impl BuildCoordinator {
    /// Create a coordinator driving `backend`
    pub fn new(backend: impl CompilerBackend + 'static) -> Self {
        Self::with_backend(Box::new(backend))
    }

    /// Create a coordinator from a boxed backend
    pub fn with_backend(backend: Box<dyn CompilerBackend>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            backend,
            jobs: HashMap::new(),
            sender,
            receiver,
            next_build_id: 1,
        }
    }

    /// Submit a build keyed on the first of `sources`.
    ///
    /// `on_complete` runs exactly once, from [`poll`](Self::poll).
    pub fn submit(
        &mut self,
        sources: Vec<PathBuf>,
        settings: BuildSettings,
        on_complete: impl FnOnce(&CompilationResult) + 'static,
    ) -> Result<Submission> {
        if sources.is_empty() {
            return Err(CompilerError::NoSources);
        }
        settings.validate()?;

        let key = sources[0].clone();
        let callback: BuildCallback = Box::new(on_complete);

        if let Some(job) = self.jobs.get_mut(&key) {
            match job.parked.as_mut() {
                Some(parked) => {
                    parked.sources = sources;
                    parked.settings = settings;
                    parked.callbacks.push(callback);
                }
                None => {
                    job.parked = Some(ParkedRequest {
                        sources,
                        settings,
                        callbacks: vec![callback],
                    });
                }
            }
            log::debug!("Build for {} already running, request queued", key.display());
            return Ok(Submission::Coalesced);
        }

        let id = self.start(key, sources, settings, vec![callback]);
        Ok(Submission::Started(id))
    }

    fn start(
        &mut self,
        key: PathBuf,
        sources: Vec<PathBuf>,
        settings: BuildSettings,
        callbacks: Vec<BuildCallback>,
    ) -> BuildId {
        let id = BuildId(self.next_build_id);
        self.next_build_id += 1;

        let started_at = SystemTime::now();
        self.jobs.insert(
            key.clone(),
            BuildJob {
                id,
                submitted: Instant::now(),
                callbacks,
                parked: None,
            },
        );

        log::info!("Building {} ({})", settings.get_module_name(), key.display());

        let completion = BuildCompletion::new(key, id, started_at, self.sender.clone());
        let request = BuildRequest {
            id,
            sources,
            settings,
            started_at,
        };
        self.backend.build(request, completion);
        id
    }

    /// Deliver finished builds. Returns the number of results delivered.
    ///
    /// Call from the thread that owns the requesters.
    pub fn poll(&mut self) -> usize {
        let mut delivered = 0;

        while let Ok((key, result)) = self.receiver.try_recv() {
            let job = match self.jobs.remove(&key) {
                Some(job) if job.id == result.build_id() => job,
                Some(job) => {
                    log::warn!(
                        "Ignoring result of build {} for {}; build {} is current",
                        result.build_id().0,
                        key.display(),
                        job.id.0
                    );
                    self.jobs.insert(key, job);
                    continue;
                }
                None => {
                    log::warn!("Ignoring result for unknown build {}", result.build_id().0);
                    continue;
                }
            };

            if result.is_success() {
                log::info!(
                    "Build {} for {} succeeded in {:.2?}",
                    result.build_id().0,
                    key.display(),
                    job.submitted.elapsed()
                );
            } else {
                log::warn!("Build {} for {} failed", result.build_id().0, key.display());
            }

            // Start the follow-up before running callbacks so the key stays
            // busy while requesters react to this result.
            let result = match job.parked {
                Some(parked) => {
                    self.start(key, parked.sources, parked.settings, parked.callbacks);
                    result.into_superseded()
                }
                None => result,
            };

            for callback in job.callbacks {
                callback(&result);
            }
            delivered += 1;
        }

        delivered
    }

    /// Whether a build for `key` is running
    pub fn in_flight(&self, key: &Path) -> bool {
        self.jobs.contains_key(key)
    }

    /// Whether a follow-up build is queued behind the running one for `key`
    pub fn has_queued(&self, key: &Path) -> bool {
        self.jobs.get(key).map(|job| job.parked.is_some()).unwrap_or(false)
    }

    /// Number of running builds
    pub fn pending_count(&self) -> usize {
        self.jobs.len()
    }
}
