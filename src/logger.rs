//! Methods specific to the ngs-post logger
//!

use camino::Utf8Path;
use const_format::concatcp;

use crate::globals::PROGRAM_NAME;
use crate::os_utils::create_dir_all;

const LOG_FILENAME: &str = concatcp!(PROGRAM_NAME, ".log");

/// If debug is true set the default logger to the more verbose debug level
///
fn setup_logger(log_dir: Option<&Utf8Path>, debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                PROGRAM_NAME,
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    let logger = if let Some(log_dir) = log_dir {
        logger.chain(fern::log_file(log_dir.join(LOG_FILENAME))?)
    } else {
        logger
    };

    logger.apply()?;
    Ok(())
}

/// Create the optional log directory, then setup the logger to write to stderr and to a file there
///
/// # Arguments
/// * `log_dir` - If given, the log is additionally appended to a file in this directory
/// * `debug` - If true use debug log level, and info level otherwise
///
pub fn setup_log_dir_and_logger(log_dir: Option<&Utf8Path>, debug: bool) {
    // No logger exists yet, so any failure here is reported directly on stderr
    if let Some(log_dir) = log_dir {
        if let Err(msg) = create_dir_all(log_dir, "log") {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(1);
        }
    }
    if let Err(e) = setup_logger(log_dir, debug) {
        eprintln!("Unable to initialize logger: {e}");
        std::process::exit(1);
    }
}
