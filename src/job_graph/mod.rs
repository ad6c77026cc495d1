//! Static description of the post-processing work plan
//!

mod command_template;

use camino::Utf8PathBuf;
use simple_error::{SimpleResult, bail};

pub use self::command_template::{CommandTemplate, JobParam, JobParams, escape_literal};

/// One kind of job which can be submitted for a sample, a sample/caller pair, or the project
///
#[derive(Clone, Debug)]
pub struct JobSpec {
    /// Display name, also used to name log files
    pub name: String,

    /// Machine-safe name, upper-cased into the scheduler job name
    pub short_name: String,

    /// Tool resource name of the script to run
    pub script: String,

    /// Tool resource name of the executable wrapping the script, if any
    pub interpreter: Option<String>,

    /// Output location relative to the sample or project directory
    pub output_subdir: Utf8PathBuf,

    pub command_template: CommandTemplate,
}

impl JobSpec {
    /// # Arguments
    /// * `template` - Command line arguments with `{name}` placeholders for [JobParam] values
    ///
    pub fn new(
        name: &str,
        short_name: &str,
        script: &str,
        interpreter: Option<&str>,
        output_subdir: &str,
        template: &str,
    ) -> SimpleResult<Self> {
        let command_template = match CommandTemplate::parse(template) {
            Ok(x) => x,
            Err(e) => bail!("Invalid command template for step {name}: {e}"),
        };
        Ok(Self {
            name: name.to_string(),
            short_name: short_name.to_string(),
            script: script.to_string(),
            interpreter: interpreter.map(|x| x.to_string()),
            output_subdir: Utf8PathBuf::from(output_subdir),
            command_template,
        })
    }
}

/// Lower-case the name and drop `_` and `-`, so that "Var_QC" and "varqc" match
pub fn normalize_step_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Ordered set of the job specs enabled for this run
pub struct JobGraph {
    enabled_steps: Vec<String>,
    jobs: Vec<JobSpec>,
}

impl JobGraph {
    pub fn new(enabled_steps: &[String]) -> Self {
        Self {
            enabled_steps: enabled_steps
                .iter()
                .map(|x| normalize_step_name(x))
                .collect(),
            jobs: Vec::new(),
        }
    }

    /// True if `name` matches one of the enabled step names
    pub fn contains(&self, name: &str) -> bool {
        let name = normalize_step_name(name);
        self.enabled_steps.contains(&name)
    }

    /// Add the job if either of its names is enabled, returning true if it was added
    pub fn add(&mut self, job: JobSpec) -> SimpleResult<bool> {
        if !(self.contains(&job.short_name) || self.contains(&job.name)) {
            return Ok(false);
        }
        if self.jobs.iter().any(|x| x.short_name == job.short_name) {
            bail!("Duplicate step short name: {}", job.short_name);
        }
        self.jobs.push(job);
        Ok(true)
    }

    pub fn get(&self, short_name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|x| x.short_name == short_name)
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, short_name: &str) -> JobSpec {
        JobSpec::new(name, short_name, "script", None, "out", "-o {output_dir}").unwrap()
    }

    #[test]
    fn test_step_name_normalization() {
        let graph = JobGraph::new(&["VarQC".to_string()]);
        assert!(graph.contains("Var_QC"));
        assert!(graph.contains("varqc"));
        assert!(graph.contains("VAR-QC"));
        assert!(!graph.contains("VarQC_summary"));
    }

    #[test]
    fn test_add_filters_by_name_or_short_name() {
        let mut graph = JobGraph::new(&["varqc".to_string(), "va".to_string()]);
        assert!(graph.add(job("VarQC", "vq")).unwrap());
        assert!(graph.add(job("VarAnnotate", "va")).unwrap());
        assert!(!graph.add(job("VarFilter", "vfs")).unwrap());
        assert_eq!(graph.jobs().len(), 2);
        assert!(graph.get("va").is_some());
        assert!(graph.get("vfs").is_none());
        assert!(graph.add(job("VarQC", "vq")).is_err());
    }

    #[test]
    fn test_unknown_template_param_rejected() {
        assert!(JobSpec::new("X", "x", "s", None, "o", "{unknown}").is_err());
    }
}
