//! Collection of copy number call files produced by bcbio
//!

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use simple_error::{SimpleResult, try_with};

use crate::os_utils::{create_dir_all, replace_symlink};
use crate::project_structure::{CNV_DIR, ProjectStructure};

const CNV_FILE_ENDINGS: [&str; 2] = ["-cn_mops.bed", "-ensemble.bed"];

fn is_cnv_file(name: &str) -> bool {
    CNV_FILE_ENDINGS.iter().any(|x| name.ends_with(x))
}

/// Move CNV files of one sample into its cnv directory and link them from the project cnv directory
fn collect_sample_cnv_files(
    sample_name: &str,
    sample_dir: &Utf8Path,
    project_cnv_dir: &Utf8Path,
) -> SimpleResult<usize> {
    let sample_cnv_dir = sample_dir.join(CNV_DIR);
    let mut sources = Vec::new();
    for dir in [sample_dir, sample_cnv_dir.as_path()] {
        if !dir.is_dir() {
            continue;
        }
        let entries = try_with!(dir.read_dir_utf8(), "Can't read directory '{dir}'");
        for entry in entries {
            let entry = try_with!(entry, "Can't read directory '{dir}'");
            if entry.path().is_file() && is_cnv_file(entry.file_name()) {
                sources.push(entry.path().to_path_buf());
            }
        }
    }

    let mut count = 0;
    for source in sources {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        create_dir_all(&sample_cnv_dir, "sample cnv")?;
        let target: Utf8PathBuf = sample_cnv_dir.join(file_name);
        if source != target {
            try_with!(
                std::fs::rename(&source, &target),
                "Can't move '{source}' to '{target}'"
            );
        }

        let link_name = if file_name.starts_with(sample_name) {
            file_name.to_string()
        } else {
            format!("{sample_name}-{file_name}")
        };
        let link = project_cnv_dir.join(link_name);
        try_with!(
            replace_symlink(&target, &link),
            "Can't link '{target}' to '{link}'"
        );
        debug!("Linked {link} -> {target}");
        count += 1;
    }
    Ok(count)
}

/// Gather CNV calls for all samples, logging and ignoring any failure
pub fn collect_cnv_files(project: &ProjectStructure) {
    let project_cnv_dir = project.project_dir.join(CNV_DIR);
    if let Err(e) = create_dir_all(&project_cnv_dir, "project cnv") {
        warn!("Skipping CNV file collection: {e}");
        return;
    }
    for sample in project.samples.iter() {
        match collect_sample_cnv_files(&sample.name, &sample.dir, &project_cnv_dir) {
            Ok(0) => {}
            Ok(count) => debug!("Collected {count} CNV files for sample {}", sample.name),
            Err(e) => warn!("Failed to collect CNV files for sample {}: {e}", sample.name),
        }
    }
}
