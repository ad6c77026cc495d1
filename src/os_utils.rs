//! Utilities pertaining to filesystem and other os-level settings
//!

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::warn;
use sha2::{Digest, Sha256};
use simple_error::{SimpleResult, bail, try_with};

/// Create a novel directory path if it does not exist already
///
/// If the directory already exists no operations are performed
///
/// * `label` - used to describe the directory in an error message
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) -> SimpleResult<()> {
    if !dir.is_dir() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            bail!("Can't create new {label} directory at '{dir}': {e}");
        }
    }
    Ok(())
}

/// Short filename-safe digest of a full path
///
pub fn short_path_digest(path: &Utf8Path) -> String {
    let digest = Sha256::digest(path.as_str().as_bytes());
    base64::encode_config(&digest[..8], base64::URL_SAFE_NO_PAD)
}

/// Remove a file if it exists, warning instead of failing when removal is refused
///
/// Returns true if no file remains at `path`
///
pub fn remove_file_if_exists(path: &Utf8Path, label: &str) -> bool {
    if !path.is_file() {
        return true;
    }
    match std::fs::remove_file(path) {
        Ok(_) => true,
        Err(e) => {
            warn!("Cannot remove {label} file '{path}', probably permission denied: {e}");
            false
        }
    }
}

/// True if the path is an existing file of non-zero size
pub fn is_non_empty_file(path: &Utf8Path) -> bool {
    path.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Write a file through a temporary sibling which is renamed into place only on success
///
/// A partially written file is never observed at `path`: if `write_fn` fails, the temporary file
/// is deleted and `path` is left untouched.
///
pub fn write_file_atomically<F>(path: &Utf8Path, write_fn: F) -> SimpleResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> SimpleResult<()>,
{
    let parent = match path.parent() {
        Some(x) if !x.as_str().is_empty() => x,
        _ => Utf8Path::new("."),
    };
    create_dir_all(parent, "output")?;

    let tmp_file = try_with!(
        tempfile::Builder::new().prefix(".tx.").tempfile_in(parent),
        "Unable to create temporary file in '{parent}'"
    );
    {
        let mut writer = BufWriter::new(try_with!(
            tmp_file.reopen(),
            "Unable to open temporary file for '{path}'"
        ));
        write_fn(&mut writer)?;
        try_with!(writer.flush(), "Unable to write file '{path}'");
    }
    try_with!(tmp_file.persist(path), "Unable to move finished file to '{path}'");
    Ok(())
}

/// Replace any existing file or link at `link` with a symlink to `target`
#[cfg(unix)]
pub fn replace_symlink(target: &Utf8Path, link: &Utf8Path) -> std::io::Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)
}

/// Attempt to increase open file limit to the system's hard limit on *nix-like systems
///
/// Splitting a combined VCF keeps one writer open per sample. This is an optional increase so
/// continue through all failure cases without error.
///
pub fn attempt_max_open_file_limit() {
    use rlimit::Resource;

    let (soft, hard) = match Resource::NOFILE.get() {
        Ok(x) => x,
        Err(_) => return,
    };

    if soft < hard {
        rlimit::setrlimit(Resource::NOFILE, hard, hard).unwrap_or_default();
    }
}
