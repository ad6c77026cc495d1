use serde::{Deserialize, Serialize};

/// Thresholds and switches for the multi-round variant record filter
///
/// Any threshold left unset (`null` in the run config) disables the filter that reads it.
///
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct VariantFilterSettings {
    /// `|`-separated list of accepted snpEff impacts
    pub impact: Option<String>,

    /// Reject Novel or dbSNP variants with strand bias "2;1" or "2;0" and AF < 0.3
    pub bias: bool,

    /// Minimum total depth, round 1
    pub filt_depth: Option<f64>,

    /// Minimum mean base quality, round 1 (QUAL column outside of VarDict mode)
    pub filt_q_mean: Option<f64>,

    /// Minimum mean position in reads, round 1
    pub filt_p_mean: Option<f64>,

    /// Minimum mean position in reads, round 2
    pub min_p_mean: Option<f64>,

    /// Minimum mean base quality, round 2
    pub min_q_mean: Option<f64>,

    /// Minimum allele frequency, round 2
    pub min_freq: Option<f64>,

    /// Minimum mean mapping quality, round 2
    pub min_mq: Option<f64>,

    /// Minimum signal/noise ratio, round 2
    pub signal_noise: Option<f64>,

    /// Minimum variant depth, round 2. Records without a VD annotation pass this filter.
    pub min_vd: Option<f64>,

    /// A GMAF above this value reclassifies the variant as dbSNP, overriding COSMIC
    pub maf: Option<f64>,

    /// Novel variants present in more than this fraction of samples...
    pub fraction: Option<f64>,

    /// ...with mean allele frequency below this value...
    pub freq: Option<f64>,

    /// ...and found in at least this many samples are rejected as recurrent artifacts
    pub sample_cnt: Option<usize>,

    /// Variants present in more than this fraction of samples with AF < 0.3 are rejected, even
    /// if in COSMIC
    pub max_ratio: Option<f64>,

    /// Count samples named "undetermined" toward the population statistics
    pub count_undetermined: bool,

    /// Control sample names. Variants passing all round 2 filters in a control are rejected in
    /// every other sample, unless classified Novel in the control.
    pub control: Vec<String>,
}

impl Default for VariantFilterSettings {
    fn default() -> Self {
        Self {
            impact: Some("HIGH|MODERATE|LOW|MODIFIER".to_string()),
            bias: false,
            filt_depth: Some(3.0),
            filt_q_mean: Some(0.0),
            filt_p_mean: Some(2.0),
            min_p_mean: Some(5.0),
            min_q_mean: Some(25.0),
            min_freq: Some(0.075),
            min_mq: Some(10.0),
            signal_noise: Some(1.5),
            min_vd: Some(2.0),
            maf: Some(0.0025),
            fraction: Some(0.4),
            freq: Some(0.15),
            sample_cnt: Some(10),
            max_ratio: Some(1.0),
            count_undetermined: true,
            control: Vec::new(),
        }
    }
}

impl VariantFilterSettings {
    /// Upper-cased accepted impact values, or None if the impact filter is disabled
    pub fn required_impacts(&self) -> Option<Vec<String>> {
        let impact = self.impact.as_ref()?;
        let values = impact
            .split('|')
            .map(|x| x.trim().to_uppercase())
            .filter(|x| !x.is_empty())
            .collect::<Vec<_>>();
        if values.is_empty() { None } else { Some(values) }
    }

    pub fn is_control(&self, sample: &str) -> bool {
        self.control.iter().any(|x| x == sample)
    }
}
