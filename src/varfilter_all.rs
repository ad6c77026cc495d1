//! Project-level variant filtering: combine the annotated VCFs of every sample, filter them
//! together, then split the result back out per sample
//!

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{info, warn};
use simple_error::{SimpleResult, bail, try_with};
use tempfile::NamedTempFile;

use crate::cli::{FilterSettings, FilterVcfSettings, SharedSettings};
use crate::config::{PipelineConfig, RunConfig, VariantFilterSettings};
use crate::external_process::{CommandRunner, ExternalProcess};
use crate::os_utils::{create_dir_all, is_non_empty_file, replace_symlink, write_file_atomically};
use crate::project_structure::{ProjectStructure, VAR_DIR, VAR_FILTER_DIR};
use crate::run_stats::{CallerFilterStats, write_filter_stats};
use crate::variant_filtering::Filtering;
use crate::vcf_record::VcfRecord;
use crate::vcf_utils::open_vcf_reader;

const SAMPLE_INFO_HEADER: &str =
    "##INFO=<ID=SAMPLE,Number=1,Type=String,Description=\"Sample name\">";

fn write_line<W: Write>(writer: &mut W, line: &str, filename: &Utf8Path) -> SimpleResult<()> {
    try_with!(writeln!(writer, "{line}"), "Unable to write to '{filename}'");
    Ok(())
}

/// Callers with the VarDict INFO fields get the population-aware filters
fn is_vardict_caller(caller: &str) -> bool {
    caller.starts_with("vardict")
}

/// Annotated VCF of each sample called by `caller`, skipping samples whose file is missing
fn find_annotated_vcfs(project: &ProjectStructure, caller: &str) -> Vec<(String, Utf8PathBuf)> {
    let mut vcfs = Vec::new();
    let Some(variant_caller) = project.variant_caller(caller) else {
        return vcfs;
    };
    for sample in project.samples.iter() {
        if variant_caller.vcf_for_sample(&sample.name).is_none() {
            continue;
        }
        let anno_vcf = sample.anno_vcf_path(caller);
        let anno_vcf_gz = Utf8PathBuf::from(format!("{anno_vcf}.gz"));
        if anno_vcf.is_file() {
            vcfs.push((sample.name.clone(), anno_vcf));
        } else if anno_vcf_gz.is_file() {
            vcfs.push((sample.name.clone(), anno_vcf_gz));
        } else {
            warn!("Annotated VCF not found for sample {} and caller {caller}: '{anno_vcf}'", sample.name);
        }
    }
    vcfs
}

/// Concatenate per-sample VCFs into one stream, tagging each record with its sample
///
/// The header is taken from the first file.
///
fn combine_vcfs<W: Write>(
    vcfs: &[(String, Utf8PathBuf)],
    writer: &mut W,
    output_filename: &Utf8Path,
) -> SimpleResult<()> {
    for (file_index, (sample, filename)) in vcfs.iter().enumerate() {
        let is_first = file_index == 0;
        let mut has_sample_header = false;
        let reader = open_vcf_reader(filename)?;
        for (index, line) in reader.lines().enumerate() {
            let line = try_with!(line, "Unable to read VCF file '{filename}'");
            if line.starts_with('#') {
                if !is_first {
                    continue;
                }
                if line.starts_with("##") {
                    has_sample_header |= line.starts_with("##INFO=<ID=SAMPLE,");
                } else if !has_sample_header {
                    write_line(writer, SAMPLE_INFO_HEADER, output_filename)?;
                }
                write_line(writer, &line, output_filename)?;
            } else if !line.trim().is_empty() {
                let mut record = VcfRecord::parse(&line, index + 1)?;
                if record.sample().is_none() {
                    record.set_info("SAMPLE", sample);
                }
                write_line(writer, &record.to_line(), output_filename)?;
            }
        }
    }
    Ok(())
}

/// Output file which only appears at its final path once completely written
struct PendingOutput {
    filename: Utf8PathBuf,
    tmp_file: NamedTempFile,
    writer: BufWriter<File>,
}

impl PendingOutput {
    fn new(filename: Utf8PathBuf, header: &[String]) -> SimpleResult<Self> {
        let parent = filename
            .parent()
            .map(|x| x.to_path_buf())
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        create_dir_all(&parent, "output")?;
        let tmp_file = try_with!(
            tempfile::Builder::new().prefix(".tx.").tempfile_in(&parent),
            "Unable to create temporary file in '{parent}'"
        );
        let writer = BufWriter::new(try_with!(
            tmp_file.reopen(),
            "Unable to open temporary file for '{filename}'"
        ));
        let mut output = Self {
            filename,
            tmp_file,
            writer,
        };
        for line in header {
            output.write_line(line)?;
        }
        Ok(output)
    }

    fn write_line(&mut self, line: &str) -> SimpleResult<()> {
        write_line(&mut self.writer, line, &self.filename)
    }

    fn persist(self) -> SimpleResult<()> {
        let Self {
            filename,
            tmp_file,
            mut writer,
        } = self;
        try_with!(writer.flush(), "Unable to write file '{filename}'");
        drop(writer);
        try_with!(
            tmp_file.persist(&filename),
            "Unable to move finished file to '{filename}'"
        );
        Ok(())
    }
}

struct SampleOutputs {
    all: PendingOutput,
    passed: PendingOutput,
    passed_count: usize,
}

fn open_sample_outputs(
    project: &ProjectStructure,
    caller: &str,
    samples: &[String],
    header: &[String],
) -> SimpleResult<BTreeMap<String, SampleOutputs>> {
    let mut outputs = BTreeMap::new();
    for sample_name in samples {
        let Some(sample) = project.sample(sample_name) else {
            bail!("Unknown sample '{sample_name}'");
        };
        let sample_outputs = SampleOutputs {
            all: PendingOutput::new(sample.filt_vcf_path(caller), header)?,
            passed: PendingOutput::new(sample.pass_vcf_path(caller), header)?,
            passed_count: 0,
        };
        outputs.insert(sample_name.clone(), sample_outputs);
    }
    Ok(outputs)
}

/// Split a filtered multi-sample VCF into the filtered and PASS-only VCF of each sample
///
/// Returns the count of passing records per sample.
///
fn split_by_sample(
    filtered_vcf: &Utf8Path,
    project: &ProjectStructure,
    caller: &str,
    samples: &[String],
) -> SimpleResult<BTreeMap<String, usize>> {
    let mut header = Vec::new();

    // Outputs are opened once the complete header is known
    let mut outputs = None;

    let reader = open_vcf_reader(filtered_vcf)?;
    for (index, line) in reader.lines().enumerate() {
        let line = try_with!(line, "Unable to read VCF file '{filtered_vcf}'");
        if line.starts_with('#') {
            header.push(line);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        if outputs.is_none() {
            outputs = Some(open_sample_outputs(project, caller, samples, &header)?);
        }
        let Some(outputs) = outputs.as_mut() else {
            continue;
        };

        let record = VcfRecord::parse(&line, index + 1)?;
        let Some(sample) = record.sample() else {
            bail!("No SAMPLE in filtered variant at {}", record.location());
        };
        let Some(sample_outputs) = outputs.get_mut(sample) else {
            bail!("Unexpected sample '{sample}' in filtered variant at {}", record.location());
        };
        sample_outputs.all.write_line(&line)?;
        if !record.is_rejected() {
            sample_outputs.passed.write_line(&line)?;
            sample_outputs.passed_count += 1;
        }
    }

    let outputs = match outputs {
        Some(x) => x,
        None => open_sample_outputs(project, caller, samples, &header)?,
    };
    let mut passed_counts = BTreeMap::new();
    for (sample, sample_outputs) in outputs {
        sample_outputs.all.persist()?;
        sample_outputs.passed.persist()?;
        passed_counts.insert(sample, sample_outputs.passed_count);
    }
    Ok(passed_counts)
}

/// Link each sample's filtered outputs from the project variant directory
fn link_sample_outputs(project: &ProjectStructure, caller: &str, samples: &[String]) -> SimpleResult<()> {
    let var_dir = project.project_dir.join(VAR_DIR);
    create_dir_all(&var_dir, "project variant")?;
    for sample in samples.iter().filter_map(|x| project.sample(x)) {
        for target in [sample.filt_vcf_path(caller), sample.pass_vcf_path(caller)] {
            let Some(file_name) = target.file_name() else {
                continue;
            };
            let link = var_dir.join(file_name);
            try_with!(
                replace_symlink(&target, &link),
                "Can't link '{target}' to '{link}'"
            );
        }
    }
    Ok(())
}

/// Filter the annotated VCFs of all samples for one caller
///
/// Returns None if no sample has an annotated VCF for this caller.
///
/// # Arguments
/// * `reuse_intermediate` - Keep a combined VCF left by a previous run instead of rebuilding it
///
pub fn filter_caller_variants(
    settings: &VariantFilterSettings,
    project: &ProjectStructure,
    caller: &str,
    reuse_intermediate: bool,
) -> SimpleResult<Option<CallerFilterStats>> {
    let vcfs = find_annotated_vcfs(project, caller);
    if vcfs.is_empty() {
        warn!("No annotated VCFs found for caller {caller}, skipping");
        return Ok(None);
    }
    let samples = vcfs.iter().map(|(x, _)| x.clone()).collect::<Vec<_>>();
    info!(
        "Filtering {caller} variants of {} samples: {}",
        samples.len(),
        samples.iter().join(", ")
    );

    let work_dir = project.work_dir.join(format!("varfilter_{caller}"));
    let combined_vcf = work_dir.join(format!("{}-{caller}.combined.vcf", project.project_name));
    if reuse_intermediate && is_non_empty_file(&combined_vcf) {
        info!("Reusing combined VCF '{combined_vcf}'");
    } else {
        write_file_atomically(&combined_vcf, |writer| {
            combine_vcfs(&vcfs, writer, &combined_vcf)
        })?;
    }

    let vardict_mode = is_vardict_caller(caller);
    let mut filtering = Filtering::new(settings, vardict_mode);
    let filtered_vcf = filtering.run(&combined_vcf, &work_dir)?;

    let passed_records_by_sample = split_by_sample(&filtered_vcf, project, caller, &samples)?;
    link_sample_outputs(project, caller, &samples)?;

    Ok(Some(CallerFilterStats {
        caller: caller.to_string(),
        input_vcf_count: vcfs.len(),
        filtering: filtering.stats(),
        passed_records_by_sample,
    }))
}

/// Copy the PASS-only VCFs to the DataHub directory, using scp if the path is remote
///
/// Copy failures are logged but do not fail the run.
///
fn copy_to_datahub(
    runner: &mut dyn CommandRunner,
    project: &ProjectStructure,
    caller: &str,
    datahub_path: &str,
) -> SimpleResult<()> {
    info!("Copying {caller} filtered variants to DataHub: {datahub_path}");
    let copy_cmd = if datahub_path.contains(':') { "scp" } else { "cp" };
    let mut failed_count = 0;
    for sample in project.samples.iter() {
        let pass_vcf = sample.pass_vcf_path(caller);
        if !pass_vcf.is_file() {
            continue;
        }
        let cmdline = format!("{copy_cmd} '{pass_vcf}' '{datahub_path}'");
        if !runner.run_command(&cmdline, None, false, false)?.is_success() {
            failed_count += 1;
        }
    }
    if failed_count > 0 {
        warn!("Failed to copy {caller} variants of {failed_count} samples to DataHub");
    }
    Ok(())
}

fn filter_stats_filename(project: &ProjectStructure, caller: &str) -> Utf8PathBuf {
    project
        .project_dir
        .join(VAR_FILTER_DIR)
        .join(format!("{caller}.filter_stats.json"))
}

/// Filter the variants of every caller in the project, entry point of the `filter` subcommand
pub fn run_filter_all(shared: &SharedSettings, settings: &FilterSettings) -> SimpleResult<()> {
    let config = PipelineConfig::load(shared, &settings.project)?
        .with_filter_overrides(&settings.overrides);
    let project = ProjectStructure::discover(
        &config.final_dir,
        &config.log_dir,
        config.bed.as_deref(),
        &config.vcf_suffixes,
    )?;

    let mut runner = ExternalProcess::new(config.verbose);
    let mut filtered_caller_count = 0;
    for caller in project.variant_callers.iter() {
        let Some(stats) = filter_caller_variants(
            &config.variant_filtering,
            &project,
            &caller.name,
            config.reuse_intermediate,
        )?
        else {
            continue;
        };
        let stats_filename = filter_stats_filename(&project, &caller.name);
        create_dir_all(&project.project_dir.join(VAR_FILTER_DIR), "filter stats")?;
        write_filter_stats(&stats, &stats_filename)?;
        filtered_caller_count += 1;

        if let Some(datahub_path) = &config.datahub_path {
            copy_to_datahub(&mut runner, &project, &caller.name, datahub_path)?;
        }
    }

    if filtered_caller_count == 0 {
        warn!("No variants were filtered");
    }
    Ok(())
}

/// Filter one VCF file, entry point of the `filter-vcf` subcommand
pub fn run_filter_vcf(_shared: &SharedSettings, settings: &FilterVcfSettings) -> SimpleResult<()> {
    let mut filter_settings = match &settings.run_cnf {
        Some(x) => RunConfig::from_file(x)?.variant_filtering,
        None => VariantFilterSettings::default(),
    };
    if !settings.controls.is_empty() {
        filter_settings.control = settings.controls.clone();
    }
    settings.overrides.apply_to(&mut filter_settings);

    let output_filename = &settings.output_filename;
    let work_dir = match &settings.work_dir {
        Some(x) => x.clone(),
        None => match output_filename.parent() {
            Some(x) if !x.as_str().is_empty() => x.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        },
    };
    create_dir_all(&work_dir, "work")?;

    let mut filtering = Filtering::new(&filter_settings, settings.vardict_mode);
    let filtered_vcf = filtering.run(&settings.vcf_filename, &work_dir)?;

    write_file_atomically(output_filename, |writer| {
        let mut reader = open_vcf_reader(&filtered_vcf)?;
        try_with!(
            std::io::copy(&mut reader, writer),
            "Unable to write filtered VCF file '{output_filename}'"
        );
        Ok(())
    })?;
    info!("Wrote filtered VCF to '{output_filename}'");

    if let Some(stats_filename) = &settings.stats {
        write_filter_stats(&filtering.stats(), stats_filename)?;
    }
    Ok(())
}
