//! Submission of individual jobs to the grid scheduler
//!

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{debug, info};
use simple_error::{SimpleResult, bail};

use crate::config::PipelineConfig;
use crate::external_process::CommandRunner;
use crate::job_graph::{JobParam, JobParams, JobSpec};
use crate::os_utils::{create_dir_all, remove_file_if_exists, short_path_digest};
use crate::project_structure::ProjectStructure;
use crate::tools::{get_tool_cmdline, get_tool_path};

/// Placeholder for an empty dependency list, qsub requires a non-empty -hold_jid argument
const NO_DEPENDENCY: &str = "_";

/// Record of one accepted submission
#[derive(Clone, Debug, PartialEq)]
pub struct JobHandle {
    pub step_name: String,
    pub job_name: String,
    pub log_path: Utf8PathBuf,

    /// Command run by the job, as nested in the qsub command line
    pub cmdline: String,

    pub depends_on: Vec<String>,
}

/// Runtime context for one submission
pub struct JobRequest<'a> {
    pub sample: Option<&'a str>,
    pub caller: Option<&'a str>,

    /// Values taking precedence over the defaults derived from the sample, caller and output dir
    pub extra_params: JobParams,

    pub depends_on: Vec<String>,
    pub threads: usize,
}

impl<'a> JobRequest<'a> {
    pub fn project() -> Self {
        Self {
            sample: None,
            caller: None,
            extra_params: JobParams::new(),
            depends_on: Vec::new(),
            threads: 1,
        }
    }

    pub fn for_sample(sample: &'a str) -> Self {
        Self {
            sample: Some(sample),
            ..Self::project()
        }
    }

    pub fn caller(mut self, caller: &'a str) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn param(mut self, param: JobParam, value: impl Into<String>) -> Self {
        self.extra_params.insert(param, value.into());
        self
    }

    pub fn depends_on(mut self, job_names: Vec<String>) -> Self {
        self.depends_on = job_names;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Wrap `value` in double quotes for `sh -c`, escaping every character the shell expands there
fn shell_double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Short id of a run, derived from the final directory so that job names are stable across
/// re-submission of the same project
pub fn make_run_id(final_dir: &Utf8Path) -> String {
    short_path_digest(final_dir)
}

pub struct SubmissionEngine<'a> {
    config: &'a PipelineConfig,
    final_dir: Utf8PathBuf,
    project_dir: Utf8PathBuf,
    log_dir: Utf8PathBuf,
    run_id: String,
    runner: Box<dyn CommandRunner + 'a>,
    submitted: Vec<JobHandle>,
}

impl<'a> SubmissionEngine<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        project: &ProjectStructure,
        runner: Box<dyn CommandRunner + 'a>,
    ) -> Self {
        Self {
            config,
            final_dir: project.final_dir.clone(),
            project_dir: project.project_dir.clone(),
            log_dir: project.log_dir.clone(),
            run_id: make_run_id(&project.final_dir),
            runner,
            submitted: Vec::new(),
        }
    }

    /// Scheduler job name, also the dependency token used by later submissions
    pub fn job_name(&self, job: &JobSpec, sample: Option<&str>, caller: Option<&str>) -> String {
        let mut name = format!("{}_{}", job.short_name.to_uppercase(), self.run_id);
        for x in [sample, caller].into_iter().flatten() {
            name.push('_');
            name.push_str(x);
        }
        name
    }

    pub fn log_path(&self, job: &JobSpec, sample: Option<&str>, caller: Option<&str>) -> Utf8PathBuf {
        let mut name = job.name.clone();
        for x in [sample, caller].into_iter().flatten() {
            name.push('_');
            name.push_str(x);
        }
        self.log_dir.join(name + ".log")
    }

    /// Output directory of the job, under the sample directory or the project directory
    pub fn output_dir(&self, job: &JobSpec, sample: Option<&str>) -> Utf8PathBuf {
        match sample {
            Some(x) => self.final_dir.join(x).join(&job.output_subdir),
            None => self.project_dir.join(&job.output_subdir),
        }
    }

    /// Submit one job to the scheduler, returning its output directory
    ///
    /// Any log left by an earlier submission of the same job is removed first, so a log found
    /// after this call always belongs to this submission.
    ///
    pub fn submit(&mut self, job: &JobSpec, request: JobRequest) -> SimpleResult<Utf8PathBuf> {
        let output_dir = self.output_dir(job, request.sample);
        create_dir_all(&output_dir, "job output")?;

        let log_path = self.log_path(job, request.sample, request.caller);
        remove_file_if_exists(&log_path, "previous job log");

        let mut params = JobParams::new();
        params.insert(JobParam::OutputDir, output_dir.to_string());
        params.insert(JobParam::Threads, request.threads.to_string());
        if let Some(x) = request.sample {
            params.insert(JobParam::Sample, x.to_string());
        }
        if let Some(x) = request.caller {
            params.insert(JobParam::Caller, x.to_string());
        }
        params.extend(request.extra_params);

        let tool_cmdline =
            get_tool_cmdline(&self.config.resources, job.interpreter.as_deref(), &job.script)?;
        let cmdline = format!("{tool_cmdline} {}", job.command_template.format(&params)?);

        let qsub = get_tool_path(&self.config.resources, "qsub")?;
        let runner_script = match &self.config.qsub_runner {
            Some(x) => x.clone(),
            None => bail!("No qsub runner script configured"),
        };
        let job_name = self.job_name(job, request.sample, request.caller);
        let hold_jid = if request.depends_on.is_empty() {
            NO_DEPENDENCY.to_string()
        } else {
            request.depends_on.iter().join(",")
        };
        let quoted_log = shell_double_quote(log_path.as_str());
        let qsub_cmdline = format!(
            "{} -pe smp {} -S /bin/bash -q {} -j n -o {quoted_log} -e {quoted_log} -hold_jid {hold_jid} -N {} {} {}",
            shell_double_quote(qsub.as_str()),
            request.threads,
            self.config.queue,
            shell_double_quote(&job_name),
            shell_double_quote(runner_script.as_str()),
            shell_double_quote(&cmdline)
        );

        debug!("Submitting {job_name}: {cmdline}");
        self.runner.run_command(&qsub_cmdline, None, true, false)?;
        info!("Submitted {job_name}, log: {log_path}");

        self.submitted.push(JobHandle {
            step_name: job.name.clone(),
            job_name,
            log_path,
            cmdline,
            depends_on: request.depends_on,
        });
        Ok(output_dir)
    }

    pub fn submitted_jobs(&self) -> &[JobHandle] {
        &self.submitted
    }
}
