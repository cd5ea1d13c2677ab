//! Compiler backend contract and a generic process backend
//!
//! The coordinator only knows "build these sources with these settings and
//! tell me when you're done". Toolchain syntax lives in the backend.

use crate::error::CompilerError;
use crate::result::{BuildId, CompilationResult};
use crate::settings::BuildSettings;
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

/// One build handed to a backend
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Identifier the result must carry
    pub id: BuildId,
    /// Sources to build; the first one is the primary source
    pub sources: Vec<PathBuf>,
    /// Settings snapshot for this build
    pub settings: BuildSettings,
    /// When the backend was asked to start
    pub started_at: SystemTime,
}

impl BuildRequest {
    /// The primary source (build key)
    pub fn primary_source(&self) -> &Path {
        &self.sources[0]
    }

    /// Result for a successful build of this request
    pub fn succeeded(&self, diagnostics: impl Into<String>) -> CompilationResult {
        CompilationResult::succeeded(
            self.id,
            self.primary_source(),
            self.settings.module_output_file(),
            diagnostics,
            self.started_at,
        )
    }

    /// Result for a failed build of this request
    pub fn failed(&self, diagnostics: impl Into<String>) -> CompilationResult {
        CompilationResult::failed(self.id, self.primary_source(), diagnostics, self.started_at)
    }
}

/// Completion token for one build. Can be sent to any thread.
///
/// Finishing consumes the token. Dropping it unfinished reports a failed
/// build, so the coordinator always hears back.
pub struct BuildCompletion {
    key: PathBuf,
    id: BuildId,
    started_at: SystemTime,
    sender: Option<Sender<(PathBuf, CompilationResult)>>,
}

impl BuildCompletion {
    pub(crate) fn new(
        key: PathBuf,
        id: BuildId,
        started_at: SystemTime,
        sender: Sender<(PathBuf, CompilationResult)>,
    ) -> Self {
        Self {
            key,
            id,
            started_at,
            sender: Some(sender),
        }
    }

    /// Build this completion reports for
    pub fn id(&self) -> BuildId {
        self.id
    }

    /// Deliver the result
    pub fn finish(mut self, result: CompilationResult) {
        if let Some(sender) = self.sender.take() {
            if sender.send((self.key.clone(), result)).is_err() {
                log::debug!("Build {} finished after its coordinator was dropped", self.id.0);
            }
        }
    }
}

impl Drop for BuildCompletion {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            log::warn!("Build {} for {} ended without a result", self.id.0, self.key.display());
            let result = CompilationResult::failed(
                self.id,
                &self.key,
                "backend dropped the build without reporting a result",
                self.started_at,
            );
            let _ = sender.send((self.key.clone(), result));
        }
    }
}

/// Something that can turn sources into a loadable module
pub trait CompilerBackend {
    /// Start a build. Must return promptly; report through `completion`.
    fn build(&self, request: BuildRequest, completion: BuildCompletion);
}

/// Backend running an external command on a worker thread.
///
/// Arguments are expanded with [`BuildSettings::expand`]; an argument equal
/// to `$(Sources)` becomes one argument per source file.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessBackend {
    /// Create a backend running `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append an argument template
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several argument templates
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from `dir`
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Expanded argument list for a request
    pub fn command_line(&self, request: &BuildRequest) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() + request.sources.len());
        for arg in &self.args {
            if arg == "$(Sources)" {
                out.extend(request.sources.iter().map(|p| p.display().to_string()));
            } else {
                out.push(request.settings.expand(arg));
            }
        }
        out
    }

    fn run(program: &str, args: &[String], working_dir: Option<&Path>, request: &BuildRequest) -> CompilationResult {
        for dir in [request.settings.get_output_path(), request.settings.get_intermediate_path()] {
            if !dir.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    return request.failed(format!("failed to create {}: {}", dir.display(), e));
                }
            }
        }

        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        match command.output() {
            Ok(output) => {
                let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
                diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    request.succeeded(diagnostics)
                } else {
                    diagnostics.push_str(&format!("\n{} exited with {}", program, output.status));
                    request.failed(diagnostics)
                }
            }
            Err(e) => request.failed(CompilerError::spawn(program, e).to_string()),
        }
    }
}

impl CompilerBackend for ProcessBackend {
    fn build(&self, request: BuildRequest, completion: BuildCompletion) {
        let args = self.command_line(&request);
        if request.settings.is_verbose() {
            log::info!("Building {}: {} {}", request.settings.get_module_name(), self.program, args.join(" "));
        }

        let program = self.program.clone();
        let working_dir = self.working_dir.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("build-{}", request.id.0))
            .spawn(move || {
                let result = Self::run(&program, &args, working_dir.as_deref(), &request);
                completion.finish(result);
            });

        // On spawn failure the closure (and the completion inside it) is
        // dropped, which reports a failed build.
        if let Err(e) = spawned {
            log::error!("Failed to start build thread: {}", e);
        }
    }
}
