//! Tool locations and run-wide settings.
//!
//! Everything here is built once at startup and handed to the coordinator;
//! no component reads process-global state after that point.

use crate::error::PipelineError;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// The external programs the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    QbfSolver,
    SatSolver,
    Tracecheck,
    ToFerp,
    FerpCheck,
    FerpCert,
    CertCheck,
    Compressor,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::QbfSolver,
        Tool::SatSolver,
        Tool::Tracecheck,
        Tool::ToFerp,
        Tool::FerpCheck,
        Tool::FerpCert,
        Tool::CertCheck,
        Tool::Compressor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::QbfSolver => "qbf_solver",
            Tool::SatSolver => "sat_solver",
            Tool::Tracecheck => "tracecheck",
            Tool::ToFerp => "toferp",
            Tool::FerpCheck => "ferpcheck",
            Tool::FerpCert => "ferpcert",
            Tool::CertCheck => "certcheck",
            Tool::Compressor => "compressor",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Tool::QbfSolver => "FERPMODELS_QBF_SOLVER",
            Tool::SatSolver => "FERPMODELS_SAT_SOLVER",
            Tool::Tracecheck => "FERPMODELS_TRACECHECK",
            Tool::ToFerp => "FERPMODELS_TOFERP",
            Tool::FerpCheck => "FERPMODELS_FERPCHECK",
            Tool::FerpCert => "FERPMODELS_FERPCERT",
            Tool::CertCheck => "FERPMODELS_CERTCHECK",
            Tool::Compressor => "FERPMODELS_COMPRESSOR",
        }
    }

    fn default_binary(self) -> &'static str {
        match self {
            Tool::QbfSolver => "ijtihad",
            Tool::SatSolver => "picosat",
            Tool::Tracecheck => "tracecheck",
            Tool::ToFerp => "toferp",
            Tool::FerpCheck => "ferpcheck",
            Tool::FerpCert => "ferpcert",
            Tool::CertCheck => "certcheck",
            Tool::Compressor => "gzip",
        }
    }
}

/// YAML tools file. Relative paths are taken relative to the file itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsFile {
    pub qbf_solver: Option<PathBuf>,
    pub sat_solver: Option<PathBuf>,
    pub tracecheck: Option<PathBuf>,
    pub toferp: Option<PathBuf>,
    pub ferpcheck: Option<PathBuf>,
    pub ferpcert: Option<PathBuf>,
    pub certcheck: Option<PathBuf>,
    pub compressor: Option<PathBuf>,
}

impl ToolsFile {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("reading tools file {}", path.display()), e))?;
        let mut file = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            file.rebase(base);
        }
        Ok(file)
    }

    pub fn parse(yaml: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config(format!("tools file: {}", e)))
    }

    fn get(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::QbfSolver => self.qbf_solver.as_ref(),
            Tool::SatSolver => self.sat_solver.as_ref(),
            Tool::Tracecheck => self.tracecheck.as_ref(),
            Tool::ToFerp => self.toferp.as_ref(),
            Tool::FerpCheck => self.ferpcheck.as_ref(),
            Tool::FerpCert => self.ferpcert.as_ref(),
            Tool::CertCheck => self.certcheck.as_ref(),
            Tool::Compressor => self.compressor.as_ref(),
        }
    }

    fn rebase(&mut self, base: &Path) {
        for slot in [
            &mut self.qbf_solver,
            &mut self.sat_solver,
            &mut self.tracecheck,
            &mut self.toferp,
            &mut self.ferpcheck,
            &mut self.ferpcert,
            &mut self.certcheck,
            &mut self.compressor,
        ] {
            if let Some(path) = slot {
                // bare names like "gzip" stay PATH lookups
                if path.is_relative() && path.components().count() > 1 {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

/// Resolved location of every tool.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    paths: Vec<(Tool, PathBuf)>,
}

impl ToolPaths {
    /// Tools file first, then `FERPMODELS_*` variables, then the tool
    /// directory (`FERPMODELS_TOOL_DIR` or the executable's directory).
    pub fn resolve(tools_file: Option<&Path>) -> Result<Self, PipelineError> {
        let file = match tools_file {
            Some(path) => Some(ToolsFile::load(path)?),
            None => None,
        };
        Ok(Self::resolve_with(file.as_ref(), |key| std::env::var_os(key)))
    }

    pub fn resolve_with<F>(file: Option<&ToolsFile>, env: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let tool_dir = env("FERPMODELS_TOOL_DIR").map(PathBuf::from).or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        });

        let paths = Tool::ALL
            .iter()
            .map(|&tool| {
                let path = file
                    .and_then(|f| f.get(tool).cloned())
                    .or_else(|| env(tool.env_var()).map(PathBuf::from))
                    .unwrap_or_else(|| match (tool, &tool_dir) {
                        (Tool::Compressor, _) => PathBuf::from(tool.default_binary()),
                        (_, Some(dir)) => dir.join(tool.default_binary()),
                        (_, None) => PathBuf::from(tool.default_binary()),
                    });
                (tool, path)
            })
            .collect();

        Self { paths }
    }

    /// Explicit table, mostly for tests and embedding.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        let mut resolved = Self::resolve_with(None, |_| None);
        for (tool, path) in pairs {
            resolved.set(tool, path);
        }
        resolved
    }

    pub fn set(&mut self, tool: Tool, path: PathBuf) {
        if let Some(slot) = self.paths.iter_mut().find(|(t, _)| *t == tool) {
            slot.1 = path;
        }
    }

    pub fn get(&self, tool: Tool) -> &Path {
        self.paths
            .iter()
            .find(|(t, _)| *t == tool)
            .map(|(_, p)| p.as_path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// Fails on the first tool that is not an executable file.
    pub fn check_available(&self, tools: &[Tool]) -> Result<(), PipelineError> {
        for &tool in tools {
            let path = self.get(tool);
            match locate_executable(path) {
                Some(found) => debug!(tool = tool.name(), path = %found.display(), "dependency found"),
                None => {
                    return Err(PipelineError::DependencyMissing {
                        tool: tool.name(),
                        path: path.to_path_buf(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Bare program names are searched on `PATH`.
pub fn locate_executable(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if path.components().count() > 1 || path.is_absolute() {
        return is_executable(path).then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Absolute form of `path`, creating the directory if needed.
pub fn ensure_dir(path: &Path) -> Result<PathBuf, PipelineError> {
    let absolute = absolutize(path)?;
    std::fs::create_dir_all(&absolute)
        .map_err(|e| PipelineError::io(format!("creating directory {}", absolute.display()), e))?;
    Ok(absolute)
}

pub fn absolutize(path: &Path) -> Result<PathBuf, PipelineError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| PipelineError::io("reading current directory", e))?;
    Ok(cwd.join(path))
}

/// Settings for one coordinator invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tools: ToolPaths,
    pub scratch_base: PathBuf,
    /// `--Keep`: every intermediate artifact.
    pub keep_all: Option<PathBuf>,
    /// `--keep`: only the FERP trace.
    pub keep_trace: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub tseitin_optimisation: bool,
    pub print_trace: bool,
    pub stage_timeout: Option<Duration>,
    pub report: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(tools: ToolPaths) -> Self {
        let scratch_base = std::env::var_os("FERPMODELS_SCRATCH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("ferpmodels"));
        Self {
            tools,
            scratch_base,
            keep_all: None,
            keep_trace: None,
            log_dir: None,
            tseitin_optimisation: true,
            print_trace: false,
            stage_timeout: None,
            report: None,
        }
    }

    pub fn with_scratch_base(mut self, dir: &Path) -> Result<Self, PipelineError> {
        self.scratch_base = absolutize(dir)?;
        Ok(self)
    }

    pub fn with_keep_all(mut self, dir: &Path) -> Result<Self, PipelineError> {
        self.keep_all = Some(ensure_dir(dir)?);
        Ok(self)
    }

    pub fn with_keep_trace(mut self, dir: &Path) -> Result<Self, PipelineError> {
        self.keep_trace = Some(ensure_dir(dir)?);
        Ok(self)
    }

    pub fn with_log_dir(mut self, dir: &Path) -> Result<Self, PipelineError> {
        self.log_dir = Some(ensure_dir(dir)?);
        Ok(self)
    }

    pub fn with_report(mut self, path: &Path) -> Result<Self, PipelineError> {
        self.report = Some(absolutize(path)?);
        Ok(self)
    }
}
