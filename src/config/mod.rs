//! Pipeline configuration assembled from the system config, the run config and the command line
//!

mod run;
mod system;
mod variant_filtering;

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use simple_error::{SimpleResult, bail, try_with};

pub use self::run::RunConfig;
pub use self::system::{DEFAULT_QUEUE, SystemConfig, ToolResource};
pub use self::variant_filtering::VariantFilterSettings;
use crate::cli::{FilterOverrides, ProjectSettings, SharedSettings, SubmitSettings};

/// Read a yaml file into `T`, an empty file produces the default value
fn read_yaml_file<T>(filename: &Utf8Path, label: &str) -> SimpleResult<T>
where
    T: DeserializeOwned + Default,
{
    let content = try_with!(
        std::fs::read_to_string(filename),
        "Unable to read {label} file '{filename}'"
    );
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(try_with!(
        serde_yaml::from_str(&content),
        "Unable to parse {label} file '{filename}'"
    ))
}

/// Settings shared by every component of a run
///
/// Built once from config files and command-line overrides, then passed by reference.
///
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Absolute path of the bcbio final directory
    pub final_dir: Utf8PathBuf,

    pub sys_cnf: Option<Utf8PathBuf>,
    pub run_cnf: Option<Utf8PathBuf>,

    pub log_dir: Utf8PathBuf,

    pub steps: Vec<String>,
    pub threads: usize,

    /// Some(true) to overwrite intermediates, Some(false) to reuse them, None to defer to each tool
    pub overwrite: Option<bool>,
    pub reuse_intermediate: bool,
    pub verbose: bool,

    pub queue: String,
    pub qsub_runner: Option<Utf8PathBuf>,
    pub resources: BTreeMap<String, ToolResource>,

    /// Target regions overriding the per-sample value from the bcbio config
    pub bed: Option<Utf8PathBuf>,

    /// Restrict processing to these variant callers
    pub vcf_suffixes: Vec<String>,

    pub datahub_path: Option<String>,

    pub variant_filtering: VariantFilterSettings,
}

impl PipelineConfig {
    /// Load both config files and apply the shared command-line overrides
    ///
    /// Command-line settings are assumed validated already, so the log directory is set.
    ///
    pub fn load(shared: &SharedSettings, project: &ProjectSettings) -> SimpleResult<Self> {
        let system_config = match &project.sys_cnf {
            Some(x) => SystemConfig::from_file(x)?,
            None => SystemConfig::default(),
        };
        let run_config = match &project.run_cnf {
            Some(x) => RunConfig::from_file(x)?,
            None => RunConfig::default(),
        };

        let final_dir = try_with!(
            project.bcbio_final_dir.canonicalize_utf8(),
            "Can't resolve bcbio final directory '{}'",
            project.bcbio_final_dir
        );

        let log_dir = match &shared.log_dir {
            Some(x) => x.clone(),
            None => bail!("Log directory has not been resolved"),
        };

        let threads = match shared.thread_count_option.or(run_config.threads) {
            Some(0) => bail!("Thread count must be greater than 0"),
            Some(x) => x,
            None => num_cpus::get(),
        };

        let overwrite = if project.overwrite {
            Some(true)
        } else if project.reuse {
            Some(false)
        } else {
            None
        };
        let reuse_intermediate = match overwrite {
            Some(x) => !x,
            None => run_config.reuse_intermediate,
        };

        let mut variant_filtering = run_config.variant_filtering;
        if !project.controls.is_empty() {
            variant_filtering.control = project.controls.clone();
        }

        Ok(Self {
            final_dir,
            sys_cnf: project.sys_cnf.clone(),
            run_cnf: project.run_cnf.clone(),
            log_dir,
            steps: run_config.steps,
            threads,
            overwrite,
            reuse_intermediate,
            verbose: project.verbose || run_config.verbose,
            queue: system_config.queue,
            qsub_runner: system_config.qsub_runner,
            resources: system_config.resources,
            bed: project.bed.clone(),
            vcf_suffixes: project.vcf_suffix.clone(),
            datahub_path: project.datahub_path.clone(),
            variant_filtering,
        })
    }

    /// Apply settings only meaningful for job submission
    pub fn with_submit_settings(mut self, settings: &SubmitSettings) -> SimpleResult<Self> {
        if !settings.steps.is_empty() {
            self.steps = settings.steps.clone();
        }
        if let Some(queue) = &settings.queue {
            self.queue = queue.clone();
        }
        if let Some(runner) = &settings.runner {
            self.qsub_runner = Some(runner.clone());
        }
        match &self.qsub_runner {
            Some(runner) => {
                if !runner.is_file() {
                    bail!("Can't find qsub runner script: '{runner}'");
                }
            }
            None => bail!(
                "No qsub runner script configured. Set 'qsub_runner' in the system config or use --runner"
            ),
        }
        Ok(self)
    }

    pub fn with_filter_overrides(mut self, overrides: &FilterOverrides) -> Self {
        overrides.apply_to(&mut self.variant_filtering);
        self
    }

    /// Config file and common options forwarded to every per-sample and project script
    pub fn script_config_args(&self) -> String {
        let mut args = Vec::new();
        if let Some(x) = &self.sys_cnf {
            args.push(format!("--sys-cnf '{x}'"));
        }
        if let Some(x) = &self.run_cnf {
            args.push(format!("--run-cnf '{x}'"));
        }
        args.join(" ")
    }

    /// Overwrite/reuse flag forwarded to sub-scripts, empty when left to the script default
    pub fn overwrite_arg(&self) -> &'static str {
        match self.overwrite {
            Some(true) => "-w",
            Some(false) => "--reuse",
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ProjectSettings;

    fn temp_utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_load_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        let run_cnf = root.join("run.yaml");
        std::fs::write(&run_cnf, "threads: 3\nreuse_intermediate: true\nsteps: [VarQC]\n").unwrap();
        let sys_cnf = root.join("sys.yaml");
        std::fs::write(&sys_cnf, "").unwrap();

        let shared = SharedSettings {
            thread_count_option: None,
            log_dir: Some(root.join("log")),
            debug: false,
        };
        let mut project = ProjectSettings {
            bcbio_final_dir: root.clone(),
            sys_cnf: Some(sys_cnf),
            run_cnf: Some(run_cnf),
            controls: vec!["pool".to_string()],
            ..Default::default()
        };

        let config = PipelineConfig::load(&shared, &project).unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.overwrite, None);
        assert!(config.reuse_intermediate);
        assert_eq!(config.steps, vec!["VarQC".to_string()]);
        assert_eq!(config.queue, DEFAULT_QUEUE);
        assert_eq!(config.variant_filtering.control, vec!["pool".to_string()]);
        assert_eq!(config.overwrite_arg(), "");

        project.overwrite = true;
        let shared = SharedSettings {
            thread_count_option: Some(8),
            ..shared
        };
        let config = PipelineConfig::load(&shared, &project).unwrap();
        assert_eq!(config.threads, 8);
        assert!(!config.reuse_intermediate);
        assert_eq!(config.overwrite_arg(), "-w");
    }

    #[test]
    fn test_submit_requires_runner() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        let shared = SharedSettings {
            thread_count_option: Some(1),
            log_dir: Some(root.join("log")),
            debug: false,
        };
        let project = ProjectSettings {
            bcbio_final_dir: root.clone(),
            ..Default::default()
        };
        let config = PipelineConfig::load(&shared, &project).unwrap();

        let mut submit = SubmitSettings {
            project: project.clone(),
            ..Default::default()
        };
        assert!(config.clone().with_submit_settings(&submit).is_err());

        let runner = root.join("runner.sh");
        std::fs::write(&runner, "#!/bin/bash\n").unwrap();
        submit.runner = Some(runner.clone());
        submit.queue = Some("long.q".to_string());
        let config = config.with_submit_settings(&submit).unwrap();
        assert_eq!(config.qsub_runner, Some(runner));
        assert_eq!(config.queue, "long.q");
    }
}
