//! Four-pass variant filtering of a combined multi-sample VCF
//!
//! Each pass streams the whole file. The first pass resets the FILTER column, the second applies
//! per-record thresholds, the third gathers cross-sample statistics from the surviving records
//! and the fourth applies the population-aware rules using those statistics.
//!

mod filters;
mod population;

use std::collections::HashSet;
use std::io::{BufRead, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use simple_error::{SimpleResult, bail, try_with};
use strum::{Display, EnumIter, IntoEnumIterator};
use thousands::Separable;

use self::filters::{FilterTag, FilterTally, ThresholdFilter, ValueSource};
use self::population::{
    PopulationStats, effective_class, passes_bias, passes_clinical_significance, passes_duplicate,
    passes_max_ratio, passes_multi_sample,
};
use crate::config::VariantFilterSettings;
use crate::os_utils::write_file_atomically;
use crate::run_stats::FilterRunStats;
use crate::vcf_record::{VariantClass, VcfRecord};
use crate::vcf_utils::{
    declared_filter_id, filter_header_line, intermediate_vcf_path, is_program_header_line,
    open_vcf_reader, program_header_line,
};

pub use self::filters::FilterCounts;

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq)]
pub enum FilterPass {
    Reset,
    Round1,
    Round2,
    Round3,
}

impl FilterPass {
    /// Tag used to name the intermediate file written by this pass
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Reset => "rm",
            Self::Round1 => "r1",
            Self::Round2 => "r2",
            Self::Round3 => "r3",
        }
    }
}

fn is_undetermined(sample: &str) -> bool {
    sample.to_lowercase().contains("undetermined")
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> SimpleResult<()> {
    try_with!(writeln!(writer, "{line}"), "Unable to write VCF line");
    Ok(())
}

pub struct Filtering {
    settings: VariantFilterSettings,

    /// Use the VarDict INFO fields and enable the population-aware rules
    vardict_mode: bool,

    round1_filters: Vec<ThresholdFilter>,

    /// Applied to control sample records only
    control_filters: Vec<ThresholdFilter>,

    required_impacts: Option<Vec<String>>,
    population: PopulationStats,
    tally: FilterTally,
    record_count: usize,
    passed_record_count: usize,
}

impl Filtering {
    pub fn new(settings: &VariantFilterSettings, vardict_mode: bool) -> Self {
        let round1_filters = if vardict_mode {
            vec![
                ThresholdFilter::new(FilterTag::FiltDepth, ValueSource::Info("DP"), settings.filt_depth, true),
                ThresholdFilter::new(FilterTag::FiltQMean, ValueSource::Info("QUAL"), settings.filt_q_mean, true),
                ThresholdFilter::new(FilterTag::FiltPMean, ValueSource::Info("PMEAN"), settings.filt_p_mean, true),
            ]
        } else {
            vec![
                ThresholdFilter::new(FilterTag::FiltDepth, ValueSource::Info("DP"), settings.filt_depth, true),
                ThresholdFilter::new(FilterTag::MinQMean, ValueSource::QualColumn, settings.filt_q_mean, false),
            ]
        };
        let control_filters = vec![
            ThresholdFilter::new(FilterTag::MinPMean, ValueSource::Info("PMEAN"), settings.min_p_mean, true),
            ThresholdFilter::new(FilterTag::MinQMean, ValueSource::Info("QUAL"), settings.min_q_mean, true),
            ThresholdFilter::new(FilterTag::MinFreq, ValueSource::Info("AF"), settings.min_freq, true),
            ThresholdFilter::new(FilterTag::MinMq, ValueSource::Info("MQ"), settings.min_mq, true),
            ThresholdFilter::new(FilterTag::SignalNoise, ValueSource::Info("SN"), settings.signal_noise, true),
            ThresholdFilter::new(FilterTag::MinVd, ValueSource::Info("VD"), settings.min_vd, false),
        ];

        Self {
            settings: settings.clone(),
            vardict_mode,
            round1_filters: round1_filters.into_iter().flatten().collect(),
            control_filters: control_filters.into_iter().flatten().collect(),
            required_impacts: settings.required_impacts(),
            population: PopulationStats::default(),
            tally: FilterTally::default(),
            record_count: 0,
            passed_record_count: 0,
        }
    }

    pub fn stats(&self) -> FilterRunStats {
        FilterRunStats {
            vardict_mode: self.vardict_mode,
            population_sample_count: self.population.sample_count(),
            record_count: self.record_count,
            passed_record_count: self.passed_record_count,
            filters: self.tally.by_name(),
        }
    }

    fn apply_threshold_filters(
        filters: &[ThresholdFilter],
        tally: &mut FilterTally,
        record: &mut VcfRecord,
    ) -> SimpleResult<()> {
        for filter in filters {
            let passed = filter.check(record)?;
            tally.apply(record, filter.tag, passed);
        }
        Ok(())
    }

    fn gather_population_stats(&mut self, record: &mut VcfRecord) -> SimpleResult<()> {
        if !self.vardict_mode || record.is_rejected() {
            return Ok(());
        }
        let Some(sample) = record.sample().map(str::to_string) else {
            return Ok(());
        };

        if self.settings.is_control(&sample) {
            Self::apply_threshold_filters(&self.control_filters, &mut self.tally, record)?;
            self.population.add_control_variant(
                record.var_id(),
                record.classification(),
                record.is_rejected(),
            );
            if record.is_rejected() {
                return Ok(());
            }
        }

        if !is_undetermined(&sample) || self.settings.count_undetermined {
            let af = record.info_f64("AF")?.unwrap_or(0.0);
            self.population.add_occurrence(&sample, record.var_id(), af);
        }
        Ok(())
    }

    fn apply_population_rules(&mut self, record: &mut VcfRecord) -> SimpleResult<()> {
        if let Some(impacts) = &self.required_impacts {
            let Some(effects) = record.effects()? else {
                bail!("No EFF annotation in variant at {}", record.location());
            };
            let passed = effects
                .iter()
                .all(|x| impacts.contains(&x.impact.to_uppercase()));
            self.tally.apply(record, FilterTag::Impact, passed);
        }

        if !self.vardict_mode || record.is_rejected() {
            return Ok(());
        }

        let var_id = record.var_id();
        if record.sample().is_some_and(is_undetermined) {
            let passed = self.population.is_observed(&var_id);
            self.tally.apply(record, FilterTag::UndetSample, passed);
            if !passed {
                return Ok(());
            }
        }

        let settings = &self.settings;
        let profile = self.population.profile(&var_id);
        let af = record.info_f64("AF")?;
        let class = record.classification();

        let passed = passes_multi_sample(profile.as_ref(), class, settings);
        self.tally.apply(record, FilterTag::Multi, passed);

        let passed = passes_duplicate(record.info_f64("PSTD")?, record.info_value("BIAS"));
        self.tally.apply(record, FilterTag::Dup, passed);

        if let Some(max_ratio) = settings.max_ratio {
            let passed = passes_max_ratio(profile.as_ref(), af, max_ratio);
            self.tally.apply(record, FilterTag::MaxRatio, passed);
        }

        let effects = record.effects()?.unwrap_or_default();
        let class = effective_class(class, record.info_f64("GMAF")?, settings.maf, &effects);

        if settings.bias {
            let passed = passes_bias(class, record.info_value("BIAS"), af);
            self.tally.apply(record, FilterTag::Bias, passed);
        }

        if class != VariantClass::DbSnpDel {
            let passed = passes_clinical_significance(class, record.clinical_significance());
            self.tally.apply(record, FilterTag::NonClnSnp, passed);
        }

        if !settings.control.is_empty() {
            let passed = !self.population.is_control_variant(&var_id);
            self.tally.apply(record, FilterTag::Control, passed);
        }
        Ok(())
    }

    pub fn process_record(&mut self, pass: FilterPass, record: &mut VcfRecord) -> SimpleResult<()> {
        match pass {
            FilterPass::Reset => {
                record.set_pass();
            }
            FilterPass::Round1 => {
                Self::apply_threshold_filters(&self.round1_filters, &mut self.tally, record)?;
            }
            FilterPass::Round2 => {
                self.gather_population_stats(record)?;
            }
            FilterPass::Round3 => {
                self.apply_population_rules(record)?;
                self.record_count += 1;
                if !record.is_rejected() {
                    self.passed_record_count += 1;
                }
            }
        }
        Ok(())
    }

    /// Run one filtering pass from `reader` to `writer`
    ///
    /// Header lines are copied unchanged, except that the reset pass declares every filter tag
    /// and the program command line before the column header line if they are not already there.
    ///
    pub fn process_stream<R: BufRead, W: Write>(
        &mut self,
        pass: FilterPass,
        reader: R,
        writer: &mut W,
    ) -> SimpleResult<()> {
        let mut declared_filters = HashSet::new();
        let mut has_program_line = false;

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = try_with!(line, "Unable to read VCF line {line_number}");
            if line.starts_with("##") {
                if let Some(id) = declared_filter_id(&line) {
                    declared_filters.insert(id.to_string());
                }
                has_program_line |= is_program_header_line(&line);
                write_line(writer, &line)?;
            } else if line.starts_with('#') {
                if pass == FilterPass::Reset {
                    for tag in FilterTag::iter() {
                        if !declared_filters.contains(tag.as_ref()) {
                            write_line(writer, &filter_header_line(tag.as_ref(), tag.description()))?;
                        }
                    }
                    if !has_program_line {
                        write_line(writer, &program_header_line())?;
                    }
                }
                write_line(writer, &line)?;
            } else if !line.trim().is_empty() {
                let mut record = VcfRecord::parse(&line, line_number)?;
                self.process_record(pass, &mut record)?;
                write_line(writer, &record.to_line())?;
            }
        }
        Ok(())
    }

    /// Run all filtering passes on `input`, writing each intermediate file to `work_dir`
    ///
    /// Returns the path of the fully filtered file.
    ///
    pub fn run(&mut self, input: &Utf8Path, work_dir: &Utf8Path) -> SimpleResult<Utf8PathBuf> {
        let mut source = input.to_path_buf();
        for pass in FilterPass::iter() {
            let output = intermediate_vcf_path(work_dir, input, pass.file_suffix());
            debug!("Filtering pass {pass}: '{source}' to '{output}'");
            let reader = open_vcf_reader(&source)?;
            write_file_atomically(&output, |writer| self.process_stream(pass, reader, writer))?;
            source = output;
        }

        info!(
            "Filtered '{input}': {} of {} records passed",
            self.passed_record_count.separate_with_commas(),
            self.record_count.separate_with_commas()
        );
        for (tag, counts) in self.tally.by_name() {
            debug!(
                "  {tag}: {} rejected",
                counts.rejected.separate_with_commas()
            );
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "##fileformat=VCFv4.1\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO";

    fn record_line(sample: &str, pos: u32, id: &str, af: f64, extra: &str) -> String {
        format!(
            "chr1\t{pos}\t{id}\tA\tG\t60\t.\tSAMPLE={sample};DP=50;QUAL=35;PMEAN=20;AF={af};\
             MQ=60;SN=20;VD=10;EFF=INTRON(MODIFIER|||||GENE1){extra}"
        )
    }

    fn run_passes(filtering: &mut Filtering, records: &[String]) -> Vec<String> {
        let mut text = format!("{HEADER}\n{}\n", records.join("\n"));
        for pass in FilterPass::iter() {
            let mut out = Vec::new();
            filtering
                .process_stream(pass, text.as_bytes(), &mut out)
                .unwrap();
            text = String::from_utf8(out).unwrap();
        }
        text.lines().map(str::to_string).collect()
    }

    fn filter_of(lines: &[String], sample: &str, pos: u32) -> String {
        let sample_key = format!("SAMPLE={sample};");
        let line = lines
            .iter()
            .find(|x| {
                !x.starts_with('#')
                    && x.split('\t').nth(1) == Some(&pos.to_string())
                    && x.contains(&sample_key)
            })
            .unwrap();
        line.split('\t').nth(6).unwrap().to_string()
    }

    #[test]
    fn test_reset_is_idempotent() {
        let input = format!(
            "{HEADER}\n{}\n",
            record_line("s1", 100, ".", 0.5, "").replace("\t.\tSAMPLE", "\tMULTI;DUP\tSAMPLE")
        );
        let settings = VariantFilterSettings::default();

        let mut first = Vec::new();
        Filtering::new(&settings, true)
            .process_stream(FilterPass::Reset, input.as_bytes(), &mut first)
            .unwrap();
        let mut second = Vec::new();
        Filtering::new(&settings, true)
            .process_stream(FilterPass::Reset, first.as_slice(), &mut second)
            .unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        let data = text.lines().last().unwrap();
        assert_eq!(data.split('\t').nth(6), Some("PASS"));
        assert!(text.contains("##FILTER=<ID=MULTI,"));
        assert_eq!(text.matches("##FILTER=<ID=CONTROL,").count(), 1);
        let chrom_index = text.lines().position(|x| x.starts_with("#CHROM")).unwrap();
        assert_eq!(chrom_index, text.lines().count() - 2);
    }

    #[test]
    fn test_rejected_records_skip_population_stats() {
        let mut filtering = Filtering::new(&VariantFilterSettings::default(), true);
        let records = vec![
            record_line("s0", 100, ".", 0.9, "").replace("DP=50", "DP=1"),
            record_line("s1", 100, ".", 0.1, ""),
            record_line("s2", 100, ".", 0.2, ""),
        ];
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filter_of(&lines, "s0", 100), "FILT_DEPTH");

        let profile = filtering.population.profile("chr1:100:A:G").unwrap();
        assert_eq!(profile.count, 2);
        approx::assert_abs_diff_eq!(profile.mean_af, 0.15, epsilon = 1e-12);
        assert_eq!(filtering.population.sample_count(), 2);

        let stats = filtering.stats();
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.passed_record_count, 2);
        assert_eq!(stats.filters["FILT_DEPTH"].rejected, 1);
    }

    #[test]
    fn test_recurrent_low_frequency_variant() {
        let settings = VariantFilterSettings {
            fraction: Some(0.3),
            sample_cnt: Some(3),
            freq: Some(0.05),
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, true);
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(record_line(&format!("s{i}"), 100, ".", 0.02, ""));
        }
        for i in 5..10 {
            records.push(record_line(&format!("s{i}"), 200, ".", 0.4, ""));
        }
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filtering.population.sample_count(), 10);
        for i in 0..5 {
            assert_eq!(filter_of(&lines, &format!("s{i}"), 100), "MULTI");
        }
        for i in 5..10 {
            assert_eq!(filter_of(&lines, &format!("s{i}"), 200), "PASS");
        }
    }

    #[test]
    fn test_multi_and_max_ratio_both_tagged() {
        let settings = VariantFilterSettings {
            fraction: Some(0.3),
            sample_cnt: Some(3),
            freq: Some(0.05),
            max_ratio: Some(0.4),
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, true);
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(record_line(&format!("s{i}"), 100, ".", 0.02, ""));
        }
        for i in 5..10 {
            records.push(record_line(&format!("s{i}"), 200, ".", 0.4, ""));
        }
        let lines = run_passes(&mut filtering, &records);
        for i in 0..5 {
            assert_eq!(filter_of(&lines, &format!("s{i}"), 100), "MULTI;MAX_RATIO");
        }
        for i in 5..10 {
            assert_eq!(filter_of(&lines, &format!("s{i}"), 200), "PASS");
        }

        let stats = filtering.stats();
        assert_eq!(stats.filters["MULTI"].rejected, 5);
        assert_eq!(stats.filters["MAX_RATIO"].rejected, 5);
    }

    #[test]
    fn test_control_sample_variants() {
        let settings = VariantFilterSettings {
            control: vec!["ctrl".to_string()],
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, true);
        let records = vec![
            record_line("ctrl", 100, ".", 0.4, ""),
            record_line("tumor", 100, ".", 0.4, ""),
            record_line("ctrl", 200, "rs5", 0.4, ""),
            record_line("tumor", 200, "rs5", 0.4, ""),
        ];
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filter_of(&lines, "tumor", 100), "PASS");
        assert_eq!(filter_of(&lines, "tumor", 200), "CONTROL");
    }

    #[test]
    fn test_low_quality_control_variant_is_ignored() {
        let settings = VariantFilterSettings {
            control: vec!["ctrl".to_string()],
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, true);
        let records = vec![
            record_line("ctrl", 200, "rs5", 0.4, "").replace("MQ=60", "MQ=2"),
            record_line("tumor", 200, "rs5", 0.4, ""),
        ];
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filter_of(&lines, "ctrl", 200), "MIN_MQ");
        assert_eq!(filter_of(&lines, "tumor", 200), "PASS");
    }

    #[test]
    fn test_strand_bias() {
        let settings = VariantFilterSettings {
            bias: true,
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, true);
        let records = vec![
            record_line("s1", 100, "rs9", 0.4, ";BIAS=2:1"),
            record_line("s2", 200, "rs9", 0.1, ";BIAS=2:1"),
        ];
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filter_of(&lines, "s1", 100), "PASS");
        assert_eq!(filter_of(&lines, "s2", 200), "BIAS");
    }

    #[test]
    fn test_undetermined_sample() {
        let settings = VariantFilterSettings {
            count_undetermined: false,
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, true);
        let records = vec![
            record_line("Undetermined", 100, ".", 0.4, ""),
            record_line("Undetermined", 200, ".", 0.4, ""),
            record_line("s1", 200, ".", 0.4, ""),
        ];
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filter_of(&lines, "Undetermined", 100), "UNDET_SAMPLE");
        assert_eq!(filter_of(&lines, "Undetermined", 200), "PASS");
    }

    #[test]
    fn test_impact_filter() {
        let settings = VariantFilterSettings {
            impact: Some("high|moderate".to_string()),
            ..Default::default()
        };
        let mut filtering = Filtering::new(&settings, false);
        let records = vec![
            record_line("s1", 100, ".", 0.4, ""),
            record_line("s1", 200, ".", 0.4, "").replace(
                "EFF=INTRON(MODIFIER|||||GENE1)",
                "EFF=STOP_GAINED(HIGH|NONSENSE|Cag/Tag|Q50*|200|GENE1)",
            ),
        ];
        let lines = run_passes(&mut filtering, &records);
        assert_eq!(filter_of(&lines, "s1", 100), "IMPACT");
        assert_eq!(filter_of(&lines, "s1", 200), "PASS");
    }

    #[test]
    fn test_missing_required_value() {
        let mut filtering = Filtering::new(&VariantFilterSettings::default(), true);
        let input = format!(
            "{HEADER}\n{}\n",
            record_line("s1", 100, ".", 0.4, "").replace("PMEAN=20;", "")
        );
        let mut out = Vec::new();
        assert!(
            filtering
                .process_stream(FilterPass::Round1, input.as_bytes(), &mut out)
                .is_err()
        );
    }

    #[test]
    fn test_run_writes_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let input = dir.join("batch-vardict.vcf");
        std::fs::write(
            &input,
            format!("{HEADER}\n{}\n", record_line("s1", 100, ".", 0.4, "")),
        )
        .unwrap();

        let work_dir = dir.join("work");
        let mut filtering = Filtering::new(&VariantFilterSettings::default(), true);
        let output = filtering.run(&input, &work_dir).unwrap();
        assert_eq!(output, work_dir.join("batch-vardict.r3.vcf"));
        for suffix in ["rm", "r1", "r2", "r3"] {
            assert!(work_dir.join(format!("batch-vardict.{suffix}.vcf")).exists());
        }
        assert_eq!(filtering.stats().passed_record_count, 1);
    }
}
