use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use strum::{AsRefStr, Display, EnumIter};

use crate::vcf_record::VcfRecord;

/// Tags written to the FILTER column of rejected records
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterTag {
    FiltDepth,
    FiltQMean,
    FiltPMean,
    MinQMean,
    MinPMean,
    MinFreq,
    MinMq,
    SignalNoise,
    MinVd,
    Impact,
    UndetSample,
    Multi,
    Dup,
    MaxRatio,
    Bias,
    #[strum(serialize = "NonClnSNP")]
    NonClnSnp,
    Control,
}

impl FilterTag {
    pub fn description(&self) -> &'static str {
        match self {
            Self::FiltDepth => "Total depth below threshold",
            Self::FiltQMean => "Mean base quality below threshold",
            Self::FiltPMean => "Mean position in reads below threshold",
            Self::MinQMean => "Mean base quality below threshold",
            Self::MinPMean => "Mean position in reads below threshold",
            Self::MinFreq => "Allele frequency below threshold",
            Self::MinMq => "Mean mapping quality below threshold",
            Self::SignalNoise => "Signal/noise ratio below threshold",
            Self::MinVd => "Variant depth below threshold",
            Self::Impact => "Effect impact not in the accepted set",
            Self::UndetSample => "Undetermined sample variant not found in any other sample",
            Self::Multi => "Novel variant recurring at low frequency in many samples",
            Self::Dup => "All supporting reads at one position in reads",
            Self::MaxRatio => "Low frequency variant present in too many samples",
            Self::Bias => "Strand bias at low frequency",
            Self::NonClnSnp => "Non-pathogenic clinical significance",
            Self::Control => "Variant present in a control sample",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FilterCounts {
    pub passed: usize,
    pub rejected: usize,
}

/// Pass/reject counts of every applied filter
#[derive(Clone, Debug, Default)]
pub struct FilterTally {
    counts: BTreeMap<FilterTag, FilterCounts>,
}

impl FilterTally {
    /// Counts keyed by tag name
    pub fn by_name(&self) -> BTreeMap<String, FilterCounts> {
        self.counts
            .iter()
            .map(|(tag, counts)| (tag.to_string(), counts.clone()))
            .collect()
    }

    /// Count a filter result and tag the record if it was rejected
    pub fn apply(&mut self, record: &mut VcfRecord, tag: FilterTag, passed: bool) {
        let counts = self.counts.entry(tag).or_default();
        if passed {
            counts.passed += 1;
        } else {
            counts.rejected += 1;
            record.add_filter(tag.as_ref());
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ValueSource {
    Info(&'static str),
    QualColumn,
}

/// Rejects records whose value is below a threshold
///
/// A record without the value is an error if the filter is required, and passes otherwise.
///
#[derive(Clone, Debug)]
pub struct ThresholdFilter {
    pub tag: FilterTag,
    source: ValueSource,
    threshold: f64,
    required: bool,
}

impl ThresholdFilter {
    /// Returns None when the threshold is unset, disabling the filter
    pub fn new(
        tag: FilterTag,
        source: ValueSource,
        threshold: Option<f64>,
        required: bool,
    ) -> Option<Self> {
        Some(Self {
            tag,
            source,
            threshold: threshold?,
            required,
        })
    }

    pub fn check(&self, record: &VcfRecord) -> SimpleResult<bool> {
        let (value, label) = match self.source {
            ValueSource::Info(key) => (record.info_f64(key)?, key),
            ValueSource::QualColumn => (record.qual()?, "QUAL column"),
        };
        match value {
            Some(x) => Ok(x >= self.threshold),
            None if self.required => bail!(
                "No {label} value in variant at {}, required to test {}",
                record.location(),
                self.tag
            ),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names() {
        assert_eq!(FilterTag::FiltQMean.to_string(), "FILT_Q_MEAN");
        assert_eq!(FilterTag::UndetSample.to_string(), "UNDET_SAMPLE");
        assert_eq!(FilterTag::NonClnSnp.to_string(), "NonClnSNP");
        assert_eq!(FilterTag::MinVd.as_ref(), "MIN_VD");
    }

    #[test]
    fn test_threshold_filter() {
        let record = VcfRecord::parse("chr1\t5\t.\tA\tC\t30\tPASS\tDP=10;VD=.", 1).unwrap();

        let depth = ThresholdFilter::new(FilterTag::FiltDepth, ValueSource::Info("DP"), Some(10.0), true).unwrap();
        assert!(depth.check(&record).unwrap());
        let depth = ThresholdFilter::new(FilterTag::FiltDepth, ValueSource::Info("DP"), Some(11.0), true).unwrap();
        assert!(!depth.check(&record).unwrap());

        let vd = ThresholdFilter::new(FilterTag::MinVd, ValueSource::Info("VD"), Some(3.0), false).unwrap();
        assert!(vd.check(&record).unwrap());
        let mq = ThresholdFilter::new(FilterTag::MinMq, ValueSource::Info("MQ"), Some(3.0), true).unwrap();
        assert!(mq.check(&record).is_err());

        let qual = ThresholdFilter::new(FilterTag::MinQMean, ValueSource::QualColumn, Some(31.0), false).unwrap();
        assert!(!qual.check(&record).unwrap());

        assert!(ThresholdFilter::new(FilterTag::MinMq, ValueSource::Info("MQ"), None, true).is_none());
    }

    #[test]
    fn test_tally() {
        let mut record = VcfRecord::parse("chr1\t5\t.\tA\tC\t30\tPASS\t.", 1).unwrap();
        let mut tally = FilterTally::default();
        tally.apply(&mut record, FilterTag::Dup, true);
        assert_eq!(record.filter(), "PASS");
        tally.apply(&mut record, FilterTag::Multi, false);
        tally.apply(&mut record, FilterTag::Dup, false);
        assert_eq!(record.filter(), "MULTI;DUP");
        let counts = tally.by_name();
        assert_eq!(counts["DUP"], FilterCounts { passed: 1, rejected: 1 });
        assert_eq!(counts["MULTI"].rejected, 1);
    }
}
