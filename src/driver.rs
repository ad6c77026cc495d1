//! Build and submit the post-processing job plan for a bcbio project
//!

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{error, info, warn};
use serde::Serialize;
use simple_error::{SimpleResult, bail, try_with};

use crate::bed_utils::prepare_qualimap_bed;
use crate::cli::{SharedSettings, SubmitSettings};
use crate::cnv_symlinks::collect_cnv_files;
use crate::config::PipelineConfig;
use crate::external_process::{CommandRunner, ExternalProcess};
use crate::job_graph::{JobGraph, JobParam};
use crate::pipeline_steps::{StepKind, build_job_graph};
use crate::project_structure::{Phenotype, ProjectStructure, Sample};
use crate::submission::{JobHandle, JobRequest, SubmissionEngine};

pub const SUBMITTED_JOBS_FILENAME: &str = "submitted_jobs.tsv";

const COVERAGE_STEPS: [StepKind; 3] = [StepKind::QualiMap, StepKind::TargetCov, StepKind::NgsCat];

/// Identifies one submission of a step: (sample, caller), both absent for project jobs
type JobKey<'a> = (Option<&'a str>, Option<&'a str>);

pub struct Driver<'a> {
    config: &'a PipelineConfig,
    project: ProjectStructure,
    graph: JobGraph,
    engine: SubmissionEngine<'a>,

    /// Input BED to its QualiMap-ready copy
    qualimap_beds: BTreeMap<Utf8PathBuf, Utf8PathBuf>,
}

impl<'a> Driver<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        project: ProjectStructure,
        runner: Box<dyn CommandRunner + 'a>,
    ) -> SimpleResult<Self> {
        let graph = build_job_graph(config, &project)?;
        let engine = SubmissionEngine::new(config, &project, runner);
        Ok(Self {
            config,
            project,
            graph,
            engine,
            qualimap_beds: BTreeMap::new(),
        })
    }

    fn is_enabled(&self, kind: StepKind) -> bool {
        self.graph.get(kind.short_name()).is_some()
    }

    /// Submit a step if it is enabled, returning its output directory
    fn submit(&mut self, kind: StepKind, request: JobRequest) -> SimpleResult<Option<Utf8PathBuf>> {
        let Some(job) = self.graph.get(kind.short_name()) else {
            return Ok(None);
        };
        Ok(Some(self.engine.submit(job, request)?))
    }

    /// Job names of an enabled step for each key, empty if the step is disabled
    fn job_names<'k>(&self, kind: StepKind, keys: impl IntoIterator<Item = JobKey<'k>>) -> Vec<String> {
        match self.graph.get(kind.short_name()) {
            Some(job) => keys
                .into_iter()
                .map(|(sample, caller)| self.engine.job_name(job, sample, caller))
                .collect(),
            None => Vec::new(),
        }
    }

    /// (sample, caller) pairs with a VCF, in submission order
    fn vcf_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for sample in self.project.samples.iter() {
            for caller in self.project.variant_callers.iter() {
                if sample.vcf_by_caller.contains_key(&caller.name) {
                    pairs.push((sample.name.clone(), caller.name.clone()));
                }
            }
        }
        pairs
    }

    fn samples_with_bed(&self) -> Vec<&Sample> {
        self.project.samples.iter().filter(|s| s.bed.is_some()).collect()
    }

    fn sample_keys<'s>(samples: &[&'s Sample]) -> Vec<JobKey<'s>> {
        samples.iter().map(|s| (Some(s.name.as_str()), None)).collect()
    }

    fn prepare_qualimap_beds(&mut self) -> SimpleResult<()> {
        if !self.is_enabled(StepKind::QualiMap) {
            return Ok(());
        }
        let beds = self
            .project
            .samples
            .iter()
            .filter_map(|s| s.bed.clone())
            .unique()
            .collect::<Vec<_>>();
        for bed in beds {
            let qualimap_bed = prepare_qualimap_bed(&bed, &self.project.work_dir)?;
            self.qualimap_beds.insert(bed, qualimap_bed);
        }
        Ok(())
    }

    fn submit_coverage_jobs(&mut self, sample: &Sample) -> SimpleResult<()> {
        if !COVERAGE_STEPS.iter().any(|x| self.is_enabled(*x)) {
            return Ok(());
        }
        let Some(bam) = &sample.bam else {
            bail!(
                "BAM file for sample {} not found, expected {}/{}-ready.bam",
                sample.name,
                sample.dir,
                sample.name
            );
        };
        let threads = self.config.threads;

        let gff = match sample.bed.as_ref().and_then(|x| self.qualimap_beds.get(x)) {
            Some(x) => format!("-gff '{x}'"),
            None => String::new(),
        };
        self.submit(
            StepKind::QualiMap,
            JobRequest::for_sample(&sample.name)
                .param(JobParam::Bam, bam.as_str())
                .param(JobParam::QualimapGff, gff)
                .threads(threads),
        )?;

        if self.is_enabled(StepKind::TargetCov) {
            let Some(bed) = &sample.bed else {
                bail!("TargetCov requires a BED file, none given for sample {}", sample.name);
            };
            self.submit(
                StepKind::TargetCov,
                JobRequest::for_sample(&sample.name)
                    .param(JobParam::Bam, bam.as_str())
                    .param(JobParam::Bed, bed.as_str())
                    .threads(threads),
            )?;
        }

        if self.is_enabled(StepKind::NgsCat) {
            match &sample.bed {
                Some(bed) => {
                    self.submit(
                        StepKind::NgsCat,
                        JobRequest::for_sample(&sample.name)
                            .param(JobParam::Bam, bam.as_str())
                            .param(JobParam::Bed, bed.as_str())
                            .threads(threads),
                    )?;
                }
                None => warn!("No BED file for sample {}, skipping ngsCAT", sample.name),
            }
        }
        Ok(())
    }

    fn submit_variant_jobs(&mut self, sample: &Sample) -> SimpleResult<()> {
        let callers = self
            .project
            .variant_callers
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>();
        for caller in sample.callers.iter() {
            if !callers.contains(caller) || !sample.vcf_by_caller.contains_key(caller) {
                match sample.phenotype {
                    Some(Phenotype::Normal) => {
                        info!("No {caller} VCF for normal sample {}", sample.name)
                    }
                    _ => error!("No {caller} VCF for sample {}, skipping", sample.name),
                }
            }
        }

        for caller in callers.iter() {
            let Some(vcf) = sample.vcf_by_caller.get(caller) else {
                continue;
            };
            self.submit(
                StepKind::VarQc,
                JobRequest::for_sample(&sample.name)
                    .caller(caller)
                    .param(JobParam::Vcf, vcf.as_str()),
            )?;

            let bam_cmdline = match &sample.bam {
                Some(x) => format!("--bam '{x}'"),
                None => String::new(),
            };
            let normal_match_cmdline = match &sample.normal_match {
                Some(x) => format!("--match-normal-sample-name '{x}'"),
                None => String::new(),
            };
            self.submit(
                StepKind::VarAnnotate,
                JobRequest::for_sample(&sample.name)
                    .caller(caller)
                    .param(JobParam::Vcf, vcf.as_str())
                    .param(JobParam::BamCmdline, bam_cmdline)
                    .param(JobParam::NormalMatchCmdline, normal_match_cmdline)
                    .threads(self.config.threads),
            )?;
        }
        Ok(())
    }

    fn submit_filtering_jobs(&mut self) -> SimpleResult<()> {
        let pairs = self.vcf_pairs();
        let anno_jobs = self.job_names(
            StepKind::VarAnnotate,
            pairs.iter().map(|(s, c)| (Some(s.as_str()), Some(c.as_str()))),
        );
        let batch_count = self.project.batches.len().max(1);
        self.submit(
            StepKind::VarFilter,
            JobRequest::project()
                .depends_on(anno_jobs)
                .threads(batch_count),
        )?;

        let filter_jobs = self.job_names(StepKind::VarFilter, [(None, None)]);
        for (sample_name, caller) in pairs.iter() {
            let Some(sample) = self.project.sample(sample_name) else {
                continue;
            };
            let filt_vcf = sample.filt_vcf_path(caller);
            let pass_vcf = sample.pass_vcf_path(caller);
            self.submit(
                StepKind::VarQcAfter,
                JobRequest::for_sample(sample_name)
                    .caller(caller)
                    .param(JobParam::Vcf, pass_vcf.as_str())
                    .depends_on(filter_jobs.clone()),
            )?;
            self.submit(
                StepKind::MongoLoader,
                JobRequest::for_sample(sample_name)
                    .caller(caller)
                    .param(JobParam::Project, self.project.project_name.as_str())
                    .param(JobParam::Path, filt_vcf.as_str())
                    .depends_on(filter_jobs.clone()),
            )?;
        }
        Ok(())
    }

    fn submit_summary_jobs(&mut self) -> SimpleResult<()> {
        let pairs = self.vcf_pairs();
        let pair_keys = pairs
            .iter()
            .map(|(s, c)| (Some(s.as_str()), Some(c.as_str())))
            .collect::<Vec<_>>();
        let all_samples = self.project.samples.iter().collect::<Vec<_>>();
        let bed_samples = self.samples_with_bed();

        let summaries = [
            (StepKind::VarQcSummary, self.job_names(StepKind::VarQc, pair_keys.clone())),
            (
                StepKind::VarQcAfterSummary,
                self.job_names(StepKind::VarQcAfter, pair_keys.clone()),
            ),
            (
                StepKind::TargetCovSummary,
                self.job_names(StepKind::TargetCov, Self::sample_keys(&all_samples)),
            ),
            (
                StepKind::Seq2C,
                self.job_names(StepKind::TargetCov, Self::sample_keys(&all_samples)),
            ),
            (
                StepKind::NgsCatSummary,
                self.job_names(StepKind::NgsCat, Self::sample_keys(&bed_samples)),
            ),
            (
                StepKind::QualiMapSummary,
                self.job_names(StepKind::QualiMap, Self::sample_keys(&all_samples)),
            ),
        ];

        let mut summary_jobs = Vec::new();
        for (kind, depends_on) in summaries {
            if self
                .submit(kind, JobRequest::project().depends_on(depends_on))?
                .is_some()
            {
                summary_jobs.extend(self.job_names(kind, [(None, None)]));
            }
        }

        self.submit(
            StepKind::CombinedReport,
            JobRequest::project().depends_on(summary_jobs),
        )?;
        Ok(())
    }

    /// Submit all enabled jobs in dependency order
    pub fn run(&mut self) -> SimpleResult<()> {
        collect_cnv_files(&self.project);

        if self.graph.is_empty() {
            info!("No post-processing steps enabled");
            return Ok(());
        }
        info!(
            "Enabled steps: {}",
            self.graph.jobs().iter().map(|x| x.name.as_str()).join(", ")
        );

        self.prepare_qualimap_beds()?;

        let samples = self.project.samples.clone();
        for sample in samples.iter() {
            self.submit_coverage_jobs(sample)?;
            self.submit_variant_jobs(sample)?;
        }
        self.submit_filtering_jobs()?;
        self.submit_summary_jobs()?;
        Ok(())
    }

    pub fn submitted_jobs(&self) -> &[JobHandle] {
        self.engine.submitted_jobs()
    }
}

#[derive(Serialize)]
struct SubmittedJobRow<'a> {
    step: &'a str,
    job_name: &'a str,
    log_path: &'a str,
    depends_on: String,
    cmdline: &'a str,
}

fn write_submitted_jobs_tsv(jobs: &[JobHandle], filename: &Utf8Path) -> SimpleResult<()> {
    let mut writer = try_with!(
        csv::WriterBuilder::new().delimiter(b'\t').from_path(filename),
        "Unable to create submitted jobs file '{filename}'"
    );
    for job in jobs.iter() {
        let row = SubmittedJobRow {
            step: &job.step_name,
            job_name: &job.job_name,
            log_path: job.log_path.as_str(),
            depends_on: job.depends_on.iter().join(","),
            cmdline: &job.cmdline,
        };
        try_with!(writer.serialize(row), "Unable to write '{filename}'");
    }
    try_with!(writer.flush(), "Unable to write '{filename}'");
    Ok(())
}

/// Log a table of submitted jobs and their logs, and write the same list as TSV
pub fn report_submitted_jobs(jobs: &[JobHandle], log_dir: &Utf8Path) -> SimpleResult<()> {
    if jobs.is_empty() {
        info!("No jobs submitted.");
        return Ok(());
    }
    let width = jobs.iter().map(|x| x.job_name.len()).max().unwrap_or(0);
    info!("Submitted {} jobs:", jobs.len());
    for job in jobs.iter() {
        info!("   {:width$}  {}", job.job_name, job.log_path);
    }

    let filename = log_dir.join(SUBMITTED_JOBS_FILENAME);
    write_submitted_jobs_tsv(jobs, &filename)?;
    info!("Job list written to {filename}");
    Ok(())
}

pub fn run_submit(shared: &SharedSettings, settings: &SubmitSettings) -> SimpleResult<()> {
    let config = PipelineConfig::load(shared, &settings.project)?.with_submit_settings(settings)?;
    let project = ProjectStructure::discover(
        &config.final_dir,
        &config.log_dir,
        config.bed.as_deref(),
        &config.vcf_suffixes,
    )?;

    let runner = Box::new(ExternalProcess::new(config.verbose));
    let mut driver = Driver::new(&config, project, runner)?;
    driver.run()?;
    report_submitted_jobs(driver.submitted_jobs(), &config.log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VariantFilterSettings;
    use crate::project_structure::tests::{temp_utf8_dir, write_test_project};
    use crate::submission::tests::{FakeScheduler, fake_resources};

    const SINGLE_SAMPLE_CONFIG: &str = "\
fc_date: '2014-08-20'
fc_name: proj
details:
  - description: s1
    algorithm: {variantcaller: vardict}
    metadata: {phenotype: tumor, batch: b1}
";

    const TWO_SAMPLE_CONFIG: &str = "\
fc_date: '2014-08-20'
fc_name: proj
details:
  - description: s1
    algorithm: {variantcaller: vardict, variant_regions: targets.bed}
    metadata: {phenotype: tumor, batch: b1}
  - description: s2
    algorithm: {variantcaller: vardict}
    metadata: {phenotype: tumor, batch: b2}
";

    fn test_config(root: &Utf8Path, final_dir: &Utf8Path, steps: &[&str]) -> PipelineConfig {
        let runner = root.join("runner.sh");
        std::fs::write(&runner, "").unwrap();
        PipelineConfig {
            final_dir: final_dir.to_path_buf(),
            sys_cnf: None,
            run_cnf: None,
            log_dir: root.join("log"),
            steps: steps.iter().map(|x| x.to_string()).collect(),
            threads: 2,
            overwrite: None,
            reuse_intermediate: false,
            verbose: false,
            queue: "test.q".to_string(),
            qsub_runner: Some(runner),
            resources: fake_resources(&root.join("tools")),
            bed: None,
            vcf_suffixes: Vec::new(),
            datahub_path: None,
            variant_filtering: VariantFilterSettings::default(),
        }
    }

    fn discover(config: &PipelineConfig) -> ProjectStructure {
        ProjectStructure::discover(&config.final_dir, &config.log_dir, None, &[]).unwrap()
    }

    fn write_vcf(final_dir: &Utf8Path, sample: &str) {
        let var_dir = final_dir.join(sample).join("var");
        std::fs::create_dir_all(&var_dir).unwrap();
        std::fs::write(var_dir.join(format!("{sample}-vardict.vcf")), "##fileformat=VCFv4.1\n").unwrap();
    }

    fn find_job<'a>(jobs: &'a [JobHandle], step: &str) -> &'a JobHandle {
        jobs.iter().find(|x| x.step_name == step).unwrap()
    }

    #[test]
    fn test_single_sample_qc_and_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        let final_dir = write_test_project(&root, SINGLE_SAMPLE_CONFIG, &["s1"]);
        write_vcf(&final_dir, "s1");

        let config = test_config(&root, &final_dir, &["VarQC", "VarAnnotate"]);
        let project = discover(&config);
        let mut driver = Driver::new(&config, project, Box::new(FakeScheduler)).unwrap();
        driver.run().unwrap();

        let jobs = driver.submitted_jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].step_name, "VarQC");
        assert_eq!(jobs[1].step_name, "VarAnnotate");
        assert!(jobs.iter().all(|x| x.depends_on.is_empty()));
        assert!(jobs[0].job_name.starts_with("VQ_"));
        assert!(jobs[0].job_name.ends_with("_s1_vardict"));
        assert_eq!(jobs[0].log_path, config.log_dir.join("VarQC_s1_vardict.log"));

        let qsub_cmdline = std::fs::read_to_string(&jobs[0].log_path).unwrap();
        assert!(qsub_cmdline.contains(" -hold_jid _ "));
        assert!(qsub_cmdline.contains(" -q test.q "));
        assert!(qsub_cmdline.contains(&format!(" -o \"{}\" ", jobs[0].log_path)));
        assert!(jobs[0].cmdline.contains("--vcf '"));
        assert!(final_dir.join("s1/qc/varQC").is_dir());
    }

    #[test]
    fn test_summary_dependencies_match_submitted_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        let final_dir = write_test_project(&root, TWO_SAMPLE_CONFIG, &["s1", "s2"]);
        std::fs::write(root.join("config/targets.bed"), "chr1\t1\t100\n").unwrap();
        for sample in ["s1", "s2"] {
            std::fs::write(final_dir.join(sample).join(format!("{sample}-ready.bam")), "bam").unwrap();
        }
        write_vcf(&final_dir, "s1");

        let steps = [
            "VarQC",
            "VarAnnotate",
            "VarFilter",
            "VarQC_postVarFilter",
            "ngsCAT",
            "QualiMap",
            "VarQC_summary",
            "TargetCov_summary",
            "ngsCAT_summary",
            "QualiMap_summary",
            "CombinedReport",
        ];
        let config = test_config(&root, &final_dir, &steps);
        let project = discover(&config);
        let mut driver = Driver::new(&config, project, Box::new(FakeScheduler)).unwrap();
        driver.run().unwrap();
        let jobs = driver.submitted_jobs();

        // No job may depend on one which was not submitted before it
        for (i, job) in jobs.iter().enumerate() {
            for dep in job.depends_on.iter() {
                assert!(jobs[..i].iter().any(|x| &x.job_name == dep), "{dep}");
            }
        }

        let names_of = |step: &str| {
            jobs.iter()
                .filter(|x| x.step_name == step)
                .map(|x| x.job_name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names_of("ngsCAT").len(), 1);
        assert_eq!(names_of("QualiMap").len(), 2);
        assert_eq!(find_job(jobs, "ngsCAT_summary").depends_on, names_of("ngsCAT"));
        assert_eq!(find_job(jobs, "QualiMap_summary").depends_on, names_of("QualiMap"));
        assert_eq!(find_job(jobs, "VarQC_summary").depends_on, names_of("VarQC"));
        assert!(find_job(jobs, "TargetCov_summary").depends_on.is_empty());
        assert_eq!(find_job(jobs, "VarFilter").depends_on, names_of("VarAnnotate"));
        assert_eq!(
            find_job(jobs, "VarQC_postVarFilter").depends_on,
            names_of("VarFilter")
        );

        let summary_names = ["VarQC_summary", "TargetCov_summary", "ngsCAT_summary", "QualiMap_summary"]
            .iter()
            .flat_map(|x| names_of(*x))
            .collect::<Vec<_>>();
        assert_eq!(find_job(jobs, "CombinedReport").depends_on, summary_names);

        let qualimap = find_job(jobs, "QualiMap");
        assert!(qualimap.cmdline.contains("-gff '"));
        assert!(qualimap.cmdline.contains(".qualimap.bed'"));
    }

    #[test]
    fn test_missing_bam_is_fatal_for_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        let final_dir = write_test_project(&root, SINGLE_SAMPLE_CONFIG, &["s1"]);
        let config = test_config(&root, &final_dir, &["TargetCov"]);
        let project = discover(&config);
        let mut driver = Driver::new(&config, project, Box::new(FakeScheduler)).unwrap();
        assert!(driver.run().is_err());
    }

    #[test]
    fn test_resubmission_replaces_stale_log() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        let final_dir = write_test_project(&root, SINGLE_SAMPLE_CONFIG, &["s1"]);
        write_vcf(&final_dir, "s1");
        let config = test_config(&root, &final_dir, &["VarQC"]);
        let project = discover(&config);
        let graph = build_job_graph(&config, &project).unwrap();
        let job = graph.get(StepKind::VarQc.short_name()).unwrap();

        let mut engine = SubmissionEngine::new(&config, &project, Box::new(FakeScheduler));
        let request = || {
            JobRequest::for_sample("s1")
                .caller("vardict")
                .param(JobParam::Vcf, "in.vcf")
        };
        engine.submit(job, request()).unwrap();
        engine.submit(job, request()).unwrap();

        let log_path = engine.log_path(job, Some("s1"), Some("vardict"));
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert_eq!(engine.submitted_jobs().len(), 2);
    }

    #[test]
    fn test_report_writes_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let root = temp_utf8_dir(&dir);
        report_submitted_jobs(&[], &root).unwrap();
        assert!(!root.join(SUBMITTED_JOBS_FILENAME).exists());

        let jobs = vec![JobHandle {
            step_name: "VarQC".to_string(),
            job_name: "VQ_x_s1".to_string(),
            log_path: root.join("VarQC_s1.log"),
            cmdline: "varqc --vcf a.vcf".to_string(),
            depends_on: vec!["A".to_string(), "B".to_string()],
        }];
        report_submitted_jobs(&jobs, &root).unwrap();
        let content = std::fs::read_to_string(root.join(SUBMITTED_JOBS_FILENAME)).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("step\tjob_name\tlog_path\tdepends_on\tcmdline")
        );
        assert!(lines.next().unwrap().contains("\tA,B\t"));
    }
}
