mod filter;
mod project;
mod shared;
mod submit;
mod utils;

use clap::{Parser, Subcommand};
use simple_error::SimpleResult;

pub use self::filter::{FilterOverrides, FilterSettings, FilterVcfSettings};
use self::filter::{validate_filter_settings, validate_filter_vcf_settings};
pub use self::project::ProjectSettings;
pub use self::shared::SharedSettings;
use self::shared::validate_shared_settings;
pub use self::submit::SubmitSettings;
use self::submit::validate_submit_settings;
use crate::project_structure::default_log_dir;

#[derive(Subcommand)]
pub enum Commands {
    /// Submit post-processing jobs for a bcbio project to the cluster scheduler
    Submit(SubmitSettings),

    /// Filter annotated variants of all samples in a bcbio project
    Filter(FilterSettings),

    /// Filter variants in a single VCF file
    FilterVcf(FilterVcfSettings),
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

/// Validate settings and update parameters that can't be processed by clap
///
/// No logger is configured at this point
///
pub fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    validate_shared_settings(&settings.shared)?;

    let project = match &settings.command {
        Commands::Submit(x) => {
            validate_submit_settings(x)?;
            Some(&x.project)
        }
        Commands::Filter(x) => {
            validate_filter_settings(x)?;
            Some(&x.project)
        }
        Commands::FilterVcf(x) => {
            validate_filter_vcf_settings(x)?;
            None
        }
    };

    // Project commands log next to the job logs unless told otherwise
    if let Some(project) = project {
        if settings.shared.log_dir.is_none() {
            settings.shared.log_dir = Some(default_log_dir(&project.bcbio_final_dir)?);
        }
    }

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(1);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Settings::command().debug_assert();
    }

    #[test]
    fn test_parse_submit_command() {
        let settings = Settings::try_parse_from([
            "ngs-post",
            "submit",
            "/data/final",
            "--steps",
            "VarQC,va",
            "-t",
            "4",
            "--reuse",
        ])
        .unwrap();
        assert_eq!(settings.shared.thread_count_option, Some(4));
        match settings.command {
            Commands::Submit(x) => {
                assert_eq!(x.project.bcbio_final_dir, "/data/final");
                assert_eq!(x.steps, vec!["VarQC".to_string(), "va".to_string()]);
                assert!(x.project.reuse);
                assert!(!x.project.overwrite);
            }
            _ => panic!("expected submit command"),
        }
    }

    #[test]
    fn test_overwrite_conflicts_with_reuse() {
        let result = Settings::try_parse_from(["ngs-post", "filter", "-w", "--reuse"]);
        assert!(result.is_err());
    }
}
