use camino::Utf8PathBuf;
use clap::Args;
use simple_error::{SimpleResult, bail};

use super::project::{ProjectSettings, validate_project_settings};
use super::utils::{check_optional_filename, check_required_filename};
use crate::config::VariantFilterSettings;

/// Command-line overrides for individual variant filter thresholds
///
/// Each given value replaces the corresponding run config setting.
///
#[derive(Args, Clone, Default)]
pub struct FilterOverrides {
    /// '|'-separated list of accepted snpEff impacts, e.g. "HIGH|MODERATE"
    #[arg(long, value_name = "IMPACTS")]
    pub impact: Option<String>,

    /// Enable the strand bias filter
    #[arg(long)]
    pub bias: bool,

    /// Minimum total depth
    #[arg(long, value_name = "DEPTH")]
    pub filt_depth: Option<f64>,

    /// Minimum mean base quality, applied in the first round
    #[arg(long, value_name = "QUAL")]
    pub filt_q_mean: Option<f64>,

    /// Minimum mean position in reads, applied in the first round
    #[arg(long, value_name = "POS")]
    pub filt_p_mean: Option<f64>,

    /// Minimum mean position in reads, applied in the second round
    #[arg(long, value_name = "POS")]
    pub min_p_mean: Option<f64>,

    /// Minimum mean base quality, applied in the second round
    #[arg(long, value_name = "QUAL")]
    pub min_q_mean: Option<f64>,

    /// Minimum allele frequency
    #[arg(long, value_name = "AF")]
    pub min_freq: Option<f64>,

    /// Minimum mean mapping quality
    #[arg(long, value_name = "MQ")]
    pub min_mq: Option<f64>,

    /// Minimum signal/noise ratio
    #[arg(long, value_name = "SN")]
    pub signal_noise: Option<f64>,

    /// Minimum variant depth
    #[arg(long, value_name = "VD")]
    pub min_vd: Option<f64>,

    /// GMAF threshold above which a variant is treated as dbSNP
    #[arg(long, value_name = "MAF")]
    pub maf: Option<f64>,

    /// Sample fraction threshold for recurrent Novel variants
    #[arg(long, value_name = "FRACTION")]
    pub fraction: Option<f64>,

    /// Mean allele frequency threshold for recurrent Novel variants
    #[arg(long, value_name = "AF")]
    pub freq: Option<f64>,

    /// Minimum sample count for recurrent Novel variants
    #[arg(long, value_name = "COUNT")]
    pub sample_cnt: Option<usize>,

    /// Sample fraction above which low frequency variants are rejected, even if in COSMIC
    #[arg(long, value_name = "FRACTION")]
    pub max_ratio: Option<f64>,

    /// Exclude samples named 'undetermined' from the population statistics
    #[arg(long)]
    pub no_count_undetermined: bool,
}

impl FilterOverrides {
    pub fn apply_to(&self, settings: &mut VariantFilterSettings) {
        fn set<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }
        set(&mut settings.impact, &self.impact);
        if self.bias {
            settings.bias = true;
        }
        set(&mut settings.filt_depth, &self.filt_depth);
        set(&mut settings.filt_q_mean, &self.filt_q_mean);
        set(&mut settings.filt_p_mean, &self.filt_p_mean);
        set(&mut settings.min_p_mean, &self.min_p_mean);
        set(&mut settings.min_q_mean, &self.min_q_mean);
        set(&mut settings.min_freq, &self.min_freq);
        set(&mut settings.min_mq, &self.min_mq);
        set(&mut settings.signal_noise, &self.signal_noise);
        set(&mut settings.min_vd, &self.min_vd);
        set(&mut settings.maf, &self.maf);
        set(&mut settings.fraction, &self.fraction);
        set(&mut settings.freq, &self.freq);
        set(&mut settings.sample_cnt, &self.sample_cnt);
        set(&mut settings.max_ratio, &self.max_ratio);
        if self.no_count_undetermined {
            settings.count_undetermined = false;
        }
    }
}

/// Filter the annotated VCFs of every sample in a bcbio project
#[derive(Args, Clone, Default)]
pub struct FilterSettings {
    #[command(flatten)]
    pub project: ProjectSettings,

    #[command(flatten)]
    pub overrides: FilterOverrides,
}

/// Filter a single VCF file
#[derive(Args, Clone, Default)]
pub struct FilterVcfSettings {
    /// Input VCF, optionally gzip-compressed
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Utf8PathBuf,

    /// Filtered output VCF
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_filename: Utf8PathBuf,

    /// Directory for intermediate files. Defaults to the output file's directory.
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<Utf8PathBuf>,

    /// Input is from VarDict, enabling the VarDict-specific rounds
    #[arg(long)]
    pub vardict_mode: bool,

    /// Run config in YAML format providing filtering thresholds
    #[arg(long, value_name = "FILE")]
    pub run_cnf: Option<Utf8PathBuf>,

    /// Comma-separated control sample names
    #[arg(long, value_delimiter = ',', value_name = "SAMPLES")]
    pub controls: Vec<String>,

    /// Write filter statistics in JSON format to this file
    #[arg(long, value_name = "FILE")]
    pub stats: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub overrides: FilterOverrides,
}

pub fn validate_filter_settings(settings: &FilterSettings) -> SimpleResult<()> {
    validate_project_settings(&settings.project)
}

pub fn validate_filter_vcf_settings(settings: &FilterVcfSettings) -> SimpleResult<()> {
    check_required_filename(&settings.vcf_filename, "input VCF")?;
    check_optional_filename(settings.run_cnf.as_deref(), "run config")?;
    if settings.output_filename.as_str().is_empty() {
        bail!("Must specify output VCF file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let overrides = FilterOverrides {
            min_vd: Some(5.0),
            sample_cnt: Some(2),
            no_count_undetermined: true,
            ..Default::default()
        };
        let mut settings = VariantFilterSettings::default();
        overrides.apply_to(&mut settings);
        assert_eq!(settings.min_vd, Some(5.0));
        assert_eq!(settings.sample_cnt, Some(2));
        assert!(!settings.count_undetermined);
        assert_eq!(settings.filt_depth, VariantFilterSettings::default().filt_depth);
        assert!(!settings.bias);
    }
}
