//! Cross-sample variant statistics gathered during the second filtering pass, and the
//! population-aware rules applied with them in the third pass
//!

use std::collections::{HashMap, HashSet};

use statrs::statistics::Statistics;

use crate::config::VariantFilterSettings;
use crate::snpeff_effect::Effect;
use crate::vcf_record::{ClinicalSignificance, VariantClass};

/// Allele frequency below which bias and frequency-ratio rejections can apply
const LOW_ALLELE_FREQUENCY: f64 = 0.3;

/// Protein position beyond which a truncating effect is not considered damaging
const MAX_TRUNCATION_POSITION: f64 = 0.95;

#[derive(Clone, Debug, PartialEq)]
pub struct VariantProfile {
    /// Number of passing records of this variant in all samples
    pub count: usize,

    /// `count` over the number of distinct samples with any passing record
    pub fraction: f64,

    pub mean_af: f64,
}

#[derive(Debug, Default)]
pub struct PopulationStats {
    samples: HashSet<String>,
    af_by_var_id: HashMap<String, Vec<f64>>,
    control_seen: HashSet<String>,
    control_novel_exempt: HashSet<String>,
}

impl PopulationStats {
    pub fn add_occurrence(&mut self, sample: &str, var_id: String, af: f64) {
        if !self.samples.contains(sample) {
            self.samples.insert(sample.to_string());
        }
        self.af_by_var_id.entry(var_id).or_default().push(af);
    }

    /// Record a control sample variant after its second-pass filters were applied
    ///
    /// Novel control variants never cause CONTROL rejections.
    ///
    pub fn add_control_variant(&mut self, var_id: String, class: VariantClass, rejected: bool) {
        if class == VariantClass::Novel {
            self.control_novel_exempt.insert(var_id);
        } else if !rejected {
            self.control_seen.insert(var_id);
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_observed(&self, var_id: &str) -> bool {
        self.af_by_var_id.contains_key(var_id)
    }

    pub fn is_control_variant(&self, var_id: &str) -> bool {
        self.control_seen.contains(var_id) && !self.control_novel_exempt.contains(var_id)
    }

    pub fn profile(&self, var_id: &str) -> Option<VariantProfile> {
        let afs = self.af_by_var_id.get(var_id)?;
        if afs.is_empty() || self.samples.is_empty() {
            return None;
        }
        Some(VariantProfile {
            count: afs.len(),
            fraction: afs.len() as f64 / self.samples.len() as f64,
            mean_af: afs.mean(),
        })
    }
}

/// Reject novel variants recurring at low frequency across many samples
///
/// The rule is disabled unless the fraction, sample count and frequency thresholds are all set.
///
pub fn passes_multi_sample(
    profile: Option<&VariantProfile>,
    class: VariantClass,
    settings: &VariantFilterSettings,
) -> bool {
    let (Some(profile), Some(fraction), Some(sample_cnt), Some(freq)) = (
        profile,
        settings.fraction,
        settings.sample_cnt,
        settings.freq,
    ) else {
        return true;
    };
    !(class == VariantClass::Novel
        && profile.fraction > fraction
        && profile.count >= sample_cnt
        && profile.mean_af < freq)
}

/// Reject variants with zero position spread whose strand bias value ends in neither 0 nor 1
pub fn passes_duplicate(pstd: Option<f64>, bias: Option<&str>) -> bool {
    match (pstd, bias) {
        (Some(pstd), Some(bias)) => pstd != 0.0 || bias.ends_with(['0', '1']),
        _ => true,
    }
}

pub fn passes_max_ratio(profile: Option<&VariantProfile>, af: Option<f64>, max_ratio: f64) -> bool {
    match (profile, af) {
        (Some(profile), Some(af)) => !(profile.fraction > max_ratio && af < LOW_ALLELE_FREQUENCY),
        _ => true,
    }
}

/// Final classification after population frequency and truncating effect reclassification
pub fn effective_class(
    class: VariantClass,
    gmaf: Option<f64>,
    maf: Option<f64>,
    effects: &[Effect],
) -> VariantClass {
    let class = match (gmaf, maf) {
        (Some(gmaf), Some(maf)) if gmaf > maf => VariantClass::DbSnp,
        _ => class,
    };
    let early_truncation = effects.iter().any(|x| {
        x.is_truncating()
            && x
                .relative_protein_position()
                .is_some_and(|pos| pos < MAX_TRUNCATION_POSITION)
    });
    if class == VariantClass::DbSnp && early_truncation {
        VariantClass::DbSnpDel
    } else {
        class
    }
}

pub fn passes_bias(class: VariantClass, bias: Option<&str>, af: Option<f64>) -> bool {
    // VarDict uses ':' in place of ';' for this code in VCF output
    let biased = matches!(bias, Some("2;1" | "2;0" | "2:1" | "2:0"));
    let low_af = af.is_some_and(|x| x < LOW_ALLELE_FREQUENCY);
    !(matches!(class, VariantClass::Novel | VariantClass::DbSnp) && biased && low_af)
}

pub fn passes_clinical_significance(class: VariantClass, clnsig: ClinicalSignificance) -> bool {
    clnsig != ClinicalSignificance::NonPathogenic || class == VariantClass::Cosmic
}
