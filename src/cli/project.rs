use camino::Utf8PathBuf;
use clap::Args;
use simple_error::SimpleResult;

use super::utils::{check_optional_filename, check_required_dirname};

/// Settings locating a bcbio project and its configuration
#[derive(Args, Clone, Default)]
pub struct ProjectSettings {
    /// Path to the bcbio-nextgen final directory
    #[arg(value_name = "FINAL_DIR", default_value = ".")]
    pub bcbio_final_dir: Utf8PathBuf,

    /// System config in YAML format, providing the scheduler queue, runner script and tool paths
    #[arg(long, value_name = "FILE")]
    pub sys_cnf: Option<Utf8PathBuf>,

    /// Run config in YAML format, providing enabled steps and filtering thresholds
    #[arg(long, value_name = "FILE")]
    pub run_cnf: Option<Utf8PathBuf>,

    /// Overwrite existing intermediate results
    #[arg(short = 'w', long, conflicts_with = "reuse")]
    pub overwrite: bool,

    /// Reuse intermediate results from a previous run
    #[arg(long)]
    pub reuse: bool,

    /// Target regions in BED format, replacing the per-sample regions from the bcbio config
    #[arg(long, value_name = "FILE")]
    pub bed: Option<Utf8PathBuf>,

    /// Comma-separated variant callers to process. All callers are processed by default.
    #[arg(long, value_delimiter = ',', value_name = "CALLERS")]
    pub vcf_suffix: Vec<String>,

    /// Comma-separated control sample names for variant filtering
    #[arg(long, value_delimiter = ',', value_name = "SAMPLES")]
    pub controls: Vec<String>,

    /// Destination for filtered variant files, either a local directory or an scp target
    #[arg(long, value_name = "PATH")]
    pub datahub_path: Option<String>,

    /// Log every external command line
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

pub fn validate_project_settings(settings: &ProjectSettings) -> SimpleResult<()> {
    check_required_dirname(&settings.bcbio_final_dir, "bcbio final")?;
    check_optional_filename(settings.sys_cnf.as_deref(), "system config")?;
    check_optional_filename(settings.run_cnf.as_deref(), "run config")?;
    check_optional_filename(settings.bed.as_deref(), "target BED")?;
    Ok(())
}
