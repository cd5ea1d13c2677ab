//! Build settings for live modules
//!
//! Describes how one source file is turned into a loadable module. Settings
//! are built fluently, cloned per build and never changed while a build runs.

use crate::error::{CompilerError, Result};
use crate::symbols::SymbolScheme;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Strip leading namespaces from a qualified type name (`a::b::Type` -> `Type`)
pub fn strip_namespace(type_name: &str) -> &str {
    type_name.rsplit("::").next().unwrap_or(type_name)
}

/// Options and arguments used when building a live module
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    includes: Vec<PathBuf>,
    library_paths: Vec<PathBuf>,
    libraries: Vec<String>,
    definitions: Vec<String>,
    forced_includes: Vec<String>,
    additional_sources: Vec<PathBuf>,
    object_files: Vec<PathBuf>,
    compiler_options: Vec<String>,
    linker_options: Vec<String>,
    output_path: PathBuf,
    intermediate_path: PathBuf,
    program_database: Option<PathBuf>,
    use_precompiled_header: bool,
    regenerate_precompiled_header: bool,
    link_app_objects: bool,
    generate_factory: bool,
    configuration: String,
    platform: String,
    platform_toolset: String,
    module_name: String,
    type_name: String,
    macros: BTreeMap<String, String>,
    symbol_scheme: SymbolScheme,
    verbose: bool,
}

impl BuildSettings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create settings populated with the usual defaults for the host
    pub fn with_defaults() -> Self {
        let configuration = if cfg!(debug_assertions) { "Debug" } else { "Release" };
        Self {
            intermediate_path: PathBuf::from("target").join("live"),
            use_precompiled_header: true,
            link_app_objects: true,
            generate_factory: true,
            configuration: configuration.to_string(),
            platform: std::env::consts::ARCH.to_string(),
            ..Self::default()
        }
    }

    /// Load settings from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text)
                .map_err(|e| CompilerError::config(path, e.to_string())),
            Some("json") => Self::from_json_str(&text)
                .map_err(|e| CompilerError::config(path, e.to_string())),
            _ => Err(CompilerError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Parse settings from JSON text
    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    // ========== Builder ==========

    /// Adds an include folder
    pub fn include(mut self, path: impl Into<PathBuf>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Adds a library search folder
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_paths.push(path.into());
        self
    }

    /// Adds a library to link
    pub fn library(mut self, name: impl Into<String>) -> Self {
        self.libraries.push(name.into());
        self
    }

    /// Adds a preprocessor definition
    pub fn define(mut self, definition: impl Into<String>) -> Self {
        self.definitions.push(definition.into());
        self
    }

    /// Adds a file included before the first line of every compiled source
    pub fn force_include(mut self, file: impl Into<String>) -> Self {
        self.forced_includes.push(file.into());
        self
    }

    /// Adds a source compiled and linked alongside the primary source
    pub fn additional_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.additional_sources.push(path.into());
        self
    }

    /// Adds several additional sources
    pub fn additional_sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.additional_sources.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Adds an object file to link
    pub fn link_object(mut self, path: impl Into<PathBuf>) -> Self {
        self.object_files.push(path.into());
        self
    }

    /// Whether the host application's objects are linked in
    pub fn link_app_objects(mut self, link: bool) -> Self {
        self.link_app_objects = link;
        self
    }

    /// Whether a class factory source is generated
    pub fn generate_factory(mut self, generate: bool) -> Self {
        self.generate_factory = generate;
        self
    }

    /// Adds a raw compiler option
    pub fn compiler_option(mut self, option: impl Into<String>) -> Self {
        self.compiler_options.push(option.into());
        self
    }

    /// Adds a raw linker option
    pub fn linker_option(mut self, option: impl Into<String>) -> Self {
        self.linker_options.push(option.into());
        self
    }

    /// Sets the directory the module is written to
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Sets the directory for intermediate files
    pub fn intermediate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.intermediate_path = path.into();
        self
    }

    /// Sets the debug database path
    pub fn program_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.program_database = Some(path.into());
        self
    }

    /// Build against the precompiled header
    pub fn use_precompiled_header(mut self, used: bool) -> Self {
        self.use_precompiled_header = used;
        self
    }

    /// Regenerate the precompiled header as part of the build
    pub fn regenerate_precompiled_header(mut self, regenerate: bool) -> Self {
        self.regenerate_precompiled_header = regenerate;
        self
    }

    /// Sets the build configuration (Debug, Release, ...)
    pub fn configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = configuration.into();
        self
    }

    /// Sets the target platform
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Sets the platform toolset
    pub fn platform_toolset(mut self, toolset: impl Into<String>) -> Self {
        self.platform_toolset = toolset.into();
        self
    }

    /// Sets the logical module name (used for file names)
    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Sets the fully qualified type name (used for symbol lookup)
    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = name.into();
        self
    }

    /// Defines a `$(name)` macro
    pub fn macro_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.insert(name.into(), value.into());
        self
    }

    /// Sets the vtable symbol naming scheme
    pub fn symbol_scheme(mut self, scheme: SymbolScheme) -> Self {
        self.symbol_scheme = scheme;
        self
    }

    /// Enables verbose logging of the settings
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    // ========== Accessors ==========

    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    pub fn library_paths(&self) -> &[PathBuf] {
        &self.library_paths
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn definitions(&self) -> &[String] {
        &self.definitions
    }

    pub fn forced_includes(&self) -> &[String] {
        &self.forced_includes
    }

    pub fn additional_sources_list(&self) -> &[PathBuf] {
        &self.additional_sources
    }

    pub fn object_files(&self) -> &[PathBuf] {
        &self.object_files
    }

    pub fn compiler_options(&self) -> &[String] {
        &self.compiler_options
    }

    pub fn linker_options(&self) -> &[String] {
        &self.linker_options
    }

    pub fn get_output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn get_intermediate_path(&self) -> &Path {
        &self.intermediate_path
    }

    pub fn get_program_database(&self) -> Option<&Path> {
        self.program_database.as_deref()
    }

    pub fn uses_precompiled_header(&self) -> bool {
        self.use_precompiled_header
    }

    pub fn regenerates_precompiled_header(&self) -> bool {
        self.regenerate_precompiled_header
    }

    pub fn links_app_objects(&self) -> bool {
        self.link_app_objects
    }

    pub fn generates_factory(&self) -> bool {
        self.generate_factory
    }

    pub fn get_configuration(&self) -> &str {
        &self.configuration
    }

    pub fn get_platform(&self) -> &str {
        &self.platform
    }

    pub fn get_platform_toolset(&self) -> &str {
        &self.platform_toolset
    }

    pub fn get_module_name(&self) -> &str {
        &self.module_name
    }

    pub fn get_type_name(&self) -> &str {
        &self.type_name
    }

    pub fn macros(&self) -> &BTreeMap<String, String> {
        &self.macros
    }

    pub fn get_symbol_scheme(&self) -> SymbolScheme {
        self.symbol_scheme
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    // ========== Derived values ==========

    /// Fill in module and type names from a watched type's identifier.
    ///
    /// Only empty names are replaced.
    pub fn apply_type_defaults(&mut self, type_name: &str) {
        if self.module_name.is_empty() {
            self.module_name = strip_namespace(type_name).to_string();
        }
        if self.type_name.is_empty() {
            self.type_name = type_name.to_string();
        }
    }

    /// Check the settings are complete enough to be submitted
    pub fn validate(&self) -> Result<()> {
        if self.module_name.is_empty() {
            return Err(CompilerError::InvalidSettings("module name is empty".into()));
        }
        if self.type_name.is_empty() {
            return Err(CompilerError::InvalidSettings("type name is empty".into()));
        }
        Ok(())
    }

    /// File name of the built module (`<ModuleName>.dll`, `.so`, `.dylib`)
    pub fn module_file_name(&self) -> String {
        format!("{}{}", self.module_name, std::env::consts::DLL_SUFFIX)
    }

    /// Full path the backend is expected to produce
    pub fn module_output_file(&self) -> PathBuf {
        self.output_path.join(self.module_file_name())
    }

    /// Vtable symbol name for the configured type
    pub fn vtable_symbol(&self) -> String {
        self.symbol_scheme.vtable_symbol(&self.type_name, &self.module_name)
    }

    /// Value of a `$(name)` macro, user macros taking precedence
    pub fn macro_lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.macros.get(name) {
            return Some(value.clone());
        }

        let value = match name {
            "ModuleName" => self.module_name.clone(),
            "TypeName" => self.type_name.clone(),
            "Configuration" => self.configuration.clone(),
            "Platform" => self.platform.clone(),
            "PlatformToolset" => self.platform_toolset.clone(),
            "OutputPath" => self.output_path.display().to_string(),
            "IntermediatePath" => self.intermediate_path.display().to_string(),
            "ModuleFile" => self.module_output_file().display().to_string(),
            "UsePch" => flag(self.use_precompiled_header),
            "RegeneratePch" => flag(self.regenerate_precompiled_header),
            _ => return None,
        };
        Some(value)
    }

    /// Substitute `$(name)` macros in `text`. Unknown macros are kept verbatim.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("$(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) => {
                    let name = &after[..end];
                    match self.macro_lookup(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("$(");
                            out.push_str(name);
                            out.push(')');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Human readable dump used by verbose logging
    pub fn describe(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "module: {} ({})", self.module_name, self.type_name);
        let _ = writeln!(
            s,
            "configuration: {} / {} / {}",
            self.configuration, self.platform, self.platform_toolset
        );
        let _ = writeln!(s, "output: {}", self.output_path.display());
        let _ = writeln!(s, "intermediate: {}", self.intermediate_path.display());
        let _ = writeln!(
            s,
            "pch: use={} regenerate={}",
            self.use_precompiled_header, self.regenerate_precompiled_header
        );
        for path in &self.includes {
            let _ = writeln!(s, "include: {}", path.display());
        }
        for path in &self.library_paths {
            let _ = writeln!(s, "library path: {}", path.display());
        }
        for lib in &self.libraries {
            let _ = writeln!(s, "library: {}", lib);
        }
        for def in &self.definitions {
            let _ = writeln!(s, "define: {}", def);
        }
        for file in &self.forced_includes {
            let _ = writeln!(s, "force include: {}", file);
        }
        for path in &self.additional_sources {
            let _ = writeln!(s, "source: {}", path.display());
        }
        for path in &self.object_files {
            let _ = writeln!(s, "object: {}", path.display());
        }
        for (name, value) in &self.macros {
            let _ = writeln!(s, "macro: {} = {}", name, value);
        }
        s
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
