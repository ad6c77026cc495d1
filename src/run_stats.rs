//! Track stats for a variant filtering run
//!

use std::collections::BTreeMap;
use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, try_with};

use crate::variant_filtering::FilterCounts;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FilterRunStats {
    pub vardict_mode: bool,

    /// Distinct samples contributing passing records to the population statistics
    pub population_sample_count: usize,

    pub record_count: usize,
    pub passed_record_count: usize,

    /// Pass and reject counts for every filter applied to at least one record
    pub filters: BTreeMap<String, FilterCounts>,
}

#[derive(Default, Deserialize, Serialize)]
pub struct CallerFilterStats {
    pub caller: String,
    pub input_vcf_count: usize,
    pub filtering: FilterRunStats,

    /// Passed record count for each sample split out of the filtered file
    pub passed_records_by_sample: BTreeMap<String, usize>,
}

/// Write filtering stats in json format
pub fn write_filter_stats<T: Serialize>(stats: &T, filename: &Utf8Path) -> SimpleResult<()> {
    info!("Writing filtering stats to file: '{filename}'");

    let f = try_with!(
        File::create(filename),
        "Unable to create filtering stats json file: '{filename}'"
    );
    try_with!(
        serde_json::to_writer_pretty(&f, stats),
        "Unable to write filtering stats json file: '{filename}'"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_filter_stats() {
        let dir = tempfile::tempdir().unwrap();
        let filename = camino::Utf8PathBuf::from_path_buf(dir.path().join("stats.json")).unwrap();

        let mut stats = FilterRunStats {
            record_count: 3,
            passed_record_count: 2,
            ..Default::default()
        };
        stats.filters.insert(
            "MULTI".to_string(),
            FilterCounts {
                passed: 2,
                rejected: 1,
            },
        );
        write_filter_stats(&stats, &filename).unwrap();

        let text = std::fs::read_to_string(&filename).unwrap();
        let read_back: FilterRunStats = serde_json::from_str(&text).unwrap();
        assert_eq!(read_back.passed_record_count, 2);
        assert_eq!(read_back.filters["MULTI"].rejected, 1);
    }
}
