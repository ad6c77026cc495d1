mod bed_utils;
mod cli;
mod cnv_symlinks;
mod config;
mod driver;
mod external_process;
mod globals;
mod job_graph;
mod logger;
mod os_utils;
mod pipeline_steps;
mod project_structure;
mod run_stats;
mod snpeff_effect;
mod submission;
mod tools;
mod variant_filtering;
mod varfilter_all;
mod vcf_record;
mod vcf_utils;

use std::{error, process};

use hhmmss::Hhmmss;
use log::info;

use crate::cli::Commands;
use crate::driver::run_submit;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_log_dir_and_logger;
use crate::varfilter_all::{run_filter_all, run_filter_vcf};

/// Run system configuration steps prior to starting any other program logic
///
fn system_configuration_prelude() {
    os_utils::attempt_max_open_file_limit();
}

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Submit(x) => {
            run_submit(&settings.shared, x)?;
        }
        Commands::Filter(x) => {
            run_filter_all(&settings.shared, x)?;
        }
        Commands::FilterVcf(x) => {
            run_filter_vcf(&settings.shared, x)?;
        }
    }

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    system_configuration_prelude();

    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the log directory:
    setup_log_dir_and_logger(settings.shared.log_dir.as_deref(), settings.shared.debug);

    if let Err(err) = run(&settings) {
        eprintln!("{err}");
        process::exit(1);
    }
}
