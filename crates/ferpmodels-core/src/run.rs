//! Run: identity and paths of one pipeline execution
use crate::config::{absolutize, ensure_dir, PipelineConfig};
use crate::error::PipelineError;
use std::path::{Path, PathBuf};

/// Immutable after construction. The scratch directory is derived from the
/// run id, so concurrent runs never share filesystem state.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: String,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub scratch_dir: PathBuf,
    pub keep_all: Option<PathBuf>,
    pub keep_trace: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Run {
    pub fn new(
        config: &PipelineConfig,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<Self, PipelineError> {
        let input = absolutize(input)?;
        if !input.is_file() {
            return Err(PipelineError::Config(format!(
                "Input file {} does not exist",
                input.display()
            )));
        }

        let output = match output {
            Some(path) => {
                let path = absolutize(path)?;
                if let Some(parent) = path.parent() {
                    ensure_dir(parent)?;
                }
                Some(path)
            }
            None => None,
        };

        let run_id = format!("run_{}", uuid::Uuid::new_v4());
        let scratch_dir = config.scratch_base.join(&run_id);
        let log_file = config
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", run_id)));

        Ok(Self {
            run_id,
            input,
            output,
            scratch_dir,
            keep_all: config.keep_all.clone(),
            keep_trace: config.keep_trace.clone(),
            log_file,
        })
    }

    pub fn certificate_requested(&self) -> bool {
        self.output.is_some()
    }

    /// Input file name without its last extension.
    pub fn formula_name(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPaths;

    fn config(base: &Path) -> PipelineConfig {
        PipelineConfig::new(ToolPaths::from_pairs([]))
            .with_scratch_base(&base.join("scratch"))
            .unwrap()
    }

    #[test]
    fn test_run_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("f.qdimacs");
        std::fs::write(&input, "p cnf 1 1\n").unwrap();
        let config = config(dir.path());

        let a = Run::new(&config, &input, None).unwrap();
        let b = Run::new(&config, &input, None).unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert_ne!(a.scratch_dir, b.scratch_dir);
        assert!(a.run_id.starts_with("run_"));
        assert_eq!(a.scratch_dir, dir.path().join("scratch").join(&a.run_id));
    }

    #[test]
    fn test_missing_input_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Run::new(&config(dir.path()), &dir.path().join("nope.qdimacs"), None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_output_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("f.qdimacs");
        std::fs::write(&input, "p cnf 1 1\n").unwrap();
        let output = dir.path().join("certs/deep/f.aag");

        let run = Run::new(&config(dir.path()), &input, Some(&output)).unwrap();
        assert!(run.certificate_requested());
        assert!(dir.path().join("certs/deep").is_dir());
        assert_eq!(run.formula_name(), "f");
    }

    #[test]
    fn test_log_file_named_by_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("f.qdimacs");
        std::fs::write(&input, "p cnf 1 1\n").unwrap();
        let config = config(dir.path()).with_log_dir(&dir.path().join("logs")).unwrap();

        let run = Run::new(&config, &input, None).unwrap();
        assert_eq!(
            run.log_file,
            Some(dir.path().join("logs").join(format!("{}.log", run.run_id)))
        );
    }
}
