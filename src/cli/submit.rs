use camino::Utf8PathBuf;
use clap::Args;
use simple_error::SimpleResult;

use super::project::{ProjectSettings, validate_project_settings};
use super::utils::check_optional_filename;

#[derive(Args, Clone, Default)]
pub struct SubmitSettings {
    #[command(flatten)]
    pub project: ProjectSettings,

    /// Comma-separated names or short names of the steps to run, replacing the run config list
    #[arg(long, value_delimiter = ',', value_name = "STEPS")]
    pub steps: Vec<String>,

    /// Script used by qsub to run each job
    #[arg(long, value_name = "FILE")]
    pub runner: Option<Utf8PathBuf>,

    /// Scheduler queue
    #[arg(long)]
    pub queue: Option<String>,
}

pub fn validate_submit_settings(settings: &SubmitSettings) -> SimpleResult<()> {
    validate_project_settings(&settings.project)?;
    check_optional_filename(settings.runner.as_deref(), "qsub runner")?;
    Ok(())
}
