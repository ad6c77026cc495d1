//! Target region file handling
//!

use std::io::{BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use simple_error::{SimpleResult, try_with};

use crate::os_utils::{short_path_digest, write_file_atomically};

/// Convert one BED line to the 6-column form expected by QualiMap
///
/// Returns None for headers, comments and lines without numeric coordinates.
///
fn to_six_column_bed_line(line: &str) -> Option<String> {
    if line.starts_with('#') || line.starts_with("track") || line.starts_with("browser") {
        return None;
    }
    let fields = line.trim_end().split('\t').collect::<Vec<_>>();
    if fields.len() < 3 {
        return None;
    }
    if fields[1].parse::<u64>().is_err() || fields[2].parse::<u64>().is_err() {
        return None;
    }
    let name = fields.get(3).copied().unwrap_or("-");
    let score = fields.get(4).copied().unwrap_or("0");
    let strand = fields.get(5).copied().unwrap_or("+");
    Some(
        [fields[0], fields[1], fields[2], name, score, strand]
            .join("\t"),
    )
}

/// Work file name for the QualiMap copy of `bed`, unique per full input path
///
fn qualimap_bed_filename(bed: &Utf8Path) -> String {
    let stem = bed.file_stem().unwrap_or("regions");
    format!("{stem}.{}.qualimap.bed", short_path_digest(bed))
}

/// Write a 6-column copy of `bed` to the work directory and return its path
///
pub fn prepare_qualimap_bed(bed: &Utf8Path, work_dir: &Utf8Path) -> SimpleResult<Utf8PathBuf> {
    let output = work_dir.join(qualimap_bed_filename(bed));
    debug!("Preparing QualiMap BED {output} from {bed}");

    let file = try_with!(std::fs::File::open(bed), "Unable to open BED file '{bed}'");
    let reader = BufReader::new(file);
    write_file_atomically(&output, |writer| {
        for line in reader.lines() {
            let line = try_with!(line, "Unable to read BED file '{bed}'");
            if let Some(x) = to_six_column_bed_line(&line) {
                try_with!(writeln!(writer, "{x}"), "Unable to write '{output}'");
            }
        }
        Ok(())
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_column_conversion() {
        assert_eq!(
            to_six_column_bed_line("chr1\t10\t20"),
            Some("chr1\t10\t20\t-\t0\t+".to_string())
        );
        assert_eq!(
            to_six_column_bed_line("chr1\t10\t20\tBRCA1\t5\t-\textra"),
            Some("chr1\t10\t20\tBRCA1\t5\t-".to_string())
        );
        assert_eq!(to_six_column_bed_line("track name=x"), None);
        assert_eq!(to_six_column_bed_line("chr1\tstart\tend"), None);
        assert_eq!(to_six_column_bed_line("chr1\t10"), None);
    }

    #[test]
    fn test_prepare_qualimap_bed() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let bed = root.join("targets.bed");
        std::fs::write(&bed, "#header\nchr1\t1\t5\tG1\nchr2\t7\t9\n").unwrap();

        let output = prepare_qualimap_bed(&bed, &root.join("work")).unwrap();
        assert_eq!(output.parent(), Some(root.join("work").as_path()));
        assert!(output.as_str().ends_with(".qualimap.bed"));
        assert!(output.file_name().unwrap().starts_with("targets."));
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "chr1\t1\t5\tG1\t0\t+\nchr2\t7\t9\t-\t0\t+\n"
        );
    }

    #[test]
    fn test_same_named_beds_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let work_dir = root.join("work");
        let bed_a = root.join("a/targets.bed");
        let bed_b = root.join("b/targets.bed");
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(&bed_a, "chrA\t1\t100\n").unwrap();
        std::fs::write(&bed_b, "chrB\t1\t100\n").unwrap();

        let output_a = prepare_qualimap_bed(&bed_a, &work_dir).unwrap();
        let output_b = prepare_qualimap_bed(&bed_b, &work_dir).unwrap();
        assert_ne!(output_a, output_b);
        assert_eq!(
            std::fs::read_to_string(&output_a).unwrap(),
            "chrA\t1\t100\t-\t0\t+\n"
        );
        assert_eq!(
            std::fs::read_to_string(&output_b).unwrap(),
            "chrB\t1\t100\t-\t0\t+\n"
        );
    }
}
