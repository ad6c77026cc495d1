use camino::Utf8PathBuf;
use clap::Args;
use simple_error::{SimpleResult, bail};

#[derive(Args, Clone, Default)]
pub struct SharedSettings {
    /// Number of threads per job. Defaults to the run config value, then to all logical cpus
    /// detected.
    #[arg(short = 't', long = "threads", global = true, value_name = "THREAD_COUNT")]
    pub thread_count_option: Option<usize>,

    /// Directory for the log file and scheduler output
    ///
    /// For project commands this defaults to the 'log' directory of the dated project directory.
    ///
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<Utf8PathBuf>,

    /// Turn on extra debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

pub fn validate_shared_settings(settings: &SharedSettings) -> SimpleResult<()> {
    if settings.thread_count_option == Some(0) {
        bail!("--threads argument must be greater than 0");
    }
    Ok(())
}
