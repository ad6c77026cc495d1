use camino::Utf8Path;
use serde::Deserialize;
use simple_error::SimpleResult;

use super::read_yaml_file;
use super::variant_filtering::VariantFilterSettings;

/// Per-run settings: which steps to submit and how filtering behaves
///
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Names (or short names) of the enabled post-processing steps
    pub steps: Vec<String>,

    pub threads: Option<usize>,

    pub verbose: bool,

    /// Keep intermediate files from a previous run instead of regenerating them
    pub reuse_intermediate: bool,

    pub variant_filtering: VariantFilterSettings,
}

impl RunConfig {
    pub fn from_file(filename: &Utf8Path) -> SimpleResult<Self> {
        read_yaml_file(filename, "run config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_config() {
        let yaml = "\
steps:
  - VarQC
  - va
threads: 4
reuse_intermediate: true
variant_filtering:
  bias: true
  sample_cnt: 3
";
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.steps, vec!["VarQC".to_string(), "va".to_string()]);
        assert_eq!(config.threads, Some(4));
        assert!(config.reuse_intermediate);
        assert!(!config.verbose);
        assert!(config.variant_filtering.bias);
        assert_eq!(config.variant_filtering.sample_cnt, Some(3));
        assert_eq!(config.variant_filtering.fraction, Some(0.4));
    }
}
