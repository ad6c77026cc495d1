//! Discovery of samples, batches and variant calls in a bcbio final directory
//!

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use simple_error::{SimpleResult, bail, try_with};
use strum::{Display, EnumString};
use unwrap::unwrap;

use crate::os_utils::{create_dir_all, is_non_empty_file};

pub const LOG_DIR: &str = "log";
pub const VAR_DIR: &str = "var";
pub const CNV_DIR: &str = "cnv";
pub const VAR_ANNOTATE_DIR: &str = "varAnnotate";
pub const VAR_FILTER_DIR: &str = "varFilter";
pub const VAR_QC_DIR: &str = "qc/varQC";
pub const VAR_QC_AFTER_DIR: &str = "qc/varQC_postVarFilter";
pub const TARGET_SEQ_DIR: &str = "targetSeq";
pub const NGSCAT_DIR: &str = "qc/ngscat";
pub const QUALIMAP_DIR: &str = "qc/qualimap";
pub const MONGO_LOADER_DIR: &str = "mongo_loader";
pub const VAR_QC_SUMMARY_DIR: &str = "varQC";
pub const VAR_QC_AFTER_SUMMARY_DIR: &str = "varQC_postVarFilter";
pub const TARGET_SEQ_SUMMARY_DIR: &str = "targetSeq";
pub const CNV_SUMMARY_DIR: &str = "cnv";
pub const NGSCAT_SUMMARY_DIR: &str = "ngscat";
pub const QUALIMAP_SUMMARY_DIR: &str = "qualimap";
pub const COMBINED_REPORT_DIR: &str = "report";

pub const ANNO_VCF_ENDING: &str = ".anno.vcf";
pub const FILT_VCF_ENDING: &str = ".anno.filt.vcf";
pub const PASS_VCF_ENDING: &str = ".anno.filt.pass.vcf";

#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phenotype {
    Tumor,
    Normal,
}

/// A yaml value given either as a single string or a list, `false` is read as empty
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(untagged)]
enum StringList {
    #[default]
    Empty,
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

impl StringList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Empty | Self::Flag(_) => Vec::new(),
            Self::One(x) => vec![x],
            Self::Many(x) => x,
        }
    }
}

/// Read a scalar that may be written as a number in yaml
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::String(x) => Ok(x),
        serde_yaml::Value::Number(x) => Ok(x.to_string()),
        _ => Err(serde::de::Error::custom("expected a string or number")),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AlgorithmDetails {
    variant_regions: Option<Utf8PathBuf>,

    #[serde(default)]
    variantcaller: StringList,
}

#[derive(Debug, Deserialize)]
struct SampleMetadata {
    phenotype: Option<Phenotype>,

    #[serde(default)]
    batch: StringList,
}

#[derive(Debug, Deserialize)]
struct SampleDetails {
    description: String,

    #[serde(default)]
    algorithm: AlgorithmDetails,

    metadata: Option<SampleMetadata>,
}

/// The subset of the bcbio project config used for discovery
#[derive(Debug, Deserialize)]
pub struct BcbioConfig {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    fc_date: String,

    #[serde(deserialize_with = "deserialize_string_or_number")]
    fc_name: String,

    details: Vec<SampleDetails>,
}

impl BcbioConfig {
    pub fn from_file(filename: &Utf8Path) -> SimpleResult<Self> {
        let content = try_with!(
            std::fs::read_to_string(filename),
            "Unable to read bcbio config file '{filename}'"
        );
        Ok(try_with!(
            serde_yaml::from_str(&content),
            "Unable to parse bcbio config file '{filename}'"
        ))
    }

    pub fn project_dir_name(&self) -> String {
        format!("{}_{}", self.fc_date, self.fc_name)
    }
}

/// Locate the bcbio project config in the config directory next to the final directory
///
/// Files named like the run or system configs are ignored. When several candidates remain, the
/// one named after a component of the final directory path is selected.
///
pub fn find_bcbio_config(final_dir: &Utf8Path) -> SimpleResult<Utf8PathBuf> {
    let final_dir = try_with!(
        final_dir.canonicalize_utf8(),
        "Can't resolve bcbio final directory '{final_dir}'"
    );
    let config_dir = match final_dir.parent() {
        Some(x) => x.join("config"),
        None => bail!("bcbio final directory '{final_dir}' has no parent directory"),
    };

    let entries = try_with!(
        config_dir.read_dir_utf8(),
        "Can't read bcbio config directory '{config_dir}'"
    );
    let mut yaml_files = Vec::new();
    for entry in entries {
        let entry = try_with!(entry, "Can't read bcbio config directory '{config_dir}'");
        if entry.file_name().ends_with(".yaml") {
            yaml_files.push(entry.path().to_path_buf());
        }
    }
    yaml_files.sort();

    if yaml_files.is_empty() {
        bail!("No YAML file in the config directory '{config_dir}'");
    }

    let config_files = yaml_files
        .iter()
        .filter(|x| {
            let name = x.file_name().unwrap_or_default();
            !name.contains("run_info") && !name.contains("system_info")
        })
        .collect::<Vec<_>>();

    let selected = match config_files.as_slice() {
        [] => bail!(
            "No bcbio YAMLs in the config directory '{config_dir}', only: {}",
            yaml_files
                .iter()
                .filter_map(|x| x.file_name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        [x] => (*x).clone(),
        _ => {
            let named = config_files
                .iter()
                .find(|x| x.file_stem().is_some_and(|s| final_dir.as_str().contains(s)));
            match named {
                Some(x) => (*x).clone(),
                None => bail!(
                    "More than one YAML file in the config directory '{config_dir}', and no YAML file named after the project"
                ),
            }
        }
    };
    Ok(selected)
}

/// Log directory of the project, derived from the bcbio config without creating anything
pub fn default_log_dir(final_dir: &Utf8Path) -> SimpleResult<Utf8PathBuf> {
    let config = BcbioConfig::from_file(&find_bcbio_config(final_dir)?)?;
    Ok(final_dir.join(config.project_dir_name()).join(LOG_DIR))
}

#[derive(Clone, Debug)]
pub struct Sample {
    pub name: String,
    pub dir: Utf8PathBuf,
    pub bam: Option<Utf8PathBuf>,
    pub bed: Option<Utf8PathBuf>,
    pub phenotype: Option<Phenotype>,

    /// Name of the normal sample paired with this tumor
    pub normal_match: Option<String>,

    /// Callers requested for this sample in the project config
    pub callers: Vec<String>,

    pub vcf_by_caller: BTreeMap<String, Utf8PathBuf>,
}

impl Sample {
    pub fn anno_vcf_path(&self, caller: &str) -> Utf8PathBuf {
        self.dir
            .join(VAR_ANNOTATE_DIR)
            .join(format!("{}-{caller}{ANNO_VCF_ENDING}", self.name))
    }

    pub fn filt_vcf_path(&self, caller: &str) -> Utf8PathBuf {
        self.dir
            .join(VAR_FILTER_DIR)
            .join(format!("{}-{caller}{FILT_VCF_ENDING}", self.name))
    }

    pub fn pass_vcf_path(&self, caller: &str) -> Utf8PathBuf {
        self.dir
            .join(VAR_FILTER_DIR)
            .join(format!("{}-{caller}{PASS_VCF_ENDING}", self.name))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub name: String,
    pub normal: Option<String>,
    pub tumors: Vec<String>,
    pub callers: Vec<String>,
}

impl Batch {
    pub fn is_paired(&self) -> bool {
        self.normal.is_some() && !self.tumors.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct VariantCaller {
    pub name: String,
    pub single_vcf_by_sample: BTreeMap<String, Utf8PathBuf>,
    pub paired_vcf_by_sample: BTreeMap<String, Utf8PathBuf>,
}

impl VariantCaller {
    pub fn vcf_for_sample(&self, sample: &str) -> Option<&Utf8PathBuf> {
        self.single_vcf_by_sample
            .get(sample)
            .or_else(|| self.paired_vcf_by_sample.get(sample))
    }
}

/// Samples, batches and callers of one bcbio project with the directories derived from it
///
#[derive(Clone, Debug)]
pub struct ProjectStructure {
    pub final_dir: Utf8PathBuf,
    pub project_name: String,

    /// Dated project directory, `<final>/<fc_date>_<fc_name>`
    pub project_dir: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,

    pub samples: Vec<Sample>,
    pub batches: Vec<Batch>,
    pub variant_callers: Vec<VariantCaller>,
}

lazy_static! {
    static ref TRAILING_NUMBER_REGEX: Regex =
        unwrap!(Regex::new(r"\d+$"), "Invalid trailing number regex");
}

/// Split a name into prefix and trailing number, if it has one
fn split_trailing_number(name: &str) -> Option<(&str, u64)> {
    let m = TRAILING_NUMBER_REGEX.find(name)?;
    let number = m.as_str().parse::<u64>().ok()?;
    Some((&name[..m.start()], number))
}

/// First of the conventional VCF locations for this sample and caller holding a non-empty file
fn find_sample_vcf(sample_dir: &Utf8Path, sample: &str, caller: &str) -> Option<Utf8PathBuf> {
    let base = format!("{sample}-{caller}.vcf");
    let var_dir = sample_dir.join(VAR_DIR);
    [
        var_dir.join(&base),
        var_dir.join(format!("{base}.gz")),
        sample_dir.join(&base),
        sample_dir.join(format!("{base}.gz")),
    ]
    .into_iter()
    .find(|x| is_non_empty_file(x))
}

impl ProjectStructure {
    /// Discover the project layout, creating the project, log and work directories
    ///
    /// # Arguments
    /// * `bed` - Target regions overriding every sample's value from the bcbio config
    /// * `caller_filter` - If non-empty, only these callers are considered
    ///
    pub fn discover(
        final_dir: &Utf8Path,
        log_dir: &Utf8Path,
        bed: Option<&Utf8Path>,
        caller_filter: &[String],
    ) -> SimpleResult<Self> {
        let config_filename = find_bcbio_config(final_dir)?;
        info!("Using bcbio YAML config {config_filename}");
        let config = BcbioConfig::from_file(&config_filename)?;
        let config_dir = config_filename
            .parent()
            .map(|x| x.to_path_buf())
            .unwrap_or_default();
        Self::from_bcbio_config(final_dir, log_dir, &config, &config_dir, bed, caller_filter)
    }

    /// # Arguments
    /// * `config_dir` - Relative target region paths are resolved from here
    ///
    pub fn from_bcbio_config(
        final_dir: &Utf8Path,
        log_dir: &Utf8Path,
        config: &BcbioConfig,
        config_dir: &Utf8Path,
        bed: Option<&Utf8Path>,
        caller_filter: &[String],
    ) -> SimpleResult<Self> {
        let project_dir = final_dir.join(config.project_dir_name());
        if !project_dir.is_dir() {
            info!("No project directory of format {{fc_date}}_{{fc_name}}, creating {project_dir}");
        }
        create_dir_all(&project_dir, "project")?;
        create_dir_all(log_dir, "log")?;

        let work_dir = match final_dir.parent() {
            Some(x) => x.join("work").join("post_processing"),
            None => bail!("bcbio final directory '{final_dir}' has no parent directory"),
        };
        create_dir_all(&work_dir, "work")?;

        let mut project = Self {
            final_dir: final_dir.to_path_buf(),
            project_name: config.fc_name.clone(),
            project_dir,
            log_dir: log_dir.to_path_buf(),
            work_dir,
            samples: Vec::new(),
            batches: Vec::new(),
            variant_callers: Vec::new(),
        };

        let mut missing_dirs = Vec::new();
        for details in config.details.iter() {
            let name = details.description.clone();
            let dir = final_dir.join(&name);
            if !dir.is_dir() {
                missing_dirs.push(dir);
                continue;
            }
            let sample_bed = match bed {
                Some(x) => Some(x.to_path_buf()),
                None => details.algorithm.variant_regions.as_ref().map(|x| {
                    if x.is_relative() {
                        config_dir.join(x)
                    } else {
                        x.clone()
                    }
                }),
            };
            let bam = dir.join(format!("{name}-ready.bam"));
            let bam = if bam.is_file() { Some(bam) } else { None };

            let callers = details
                .algorithm
                .variantcaller
                .clone()
                .into_vec()
                .into_iter()
                .filter(|x| caller_filter.is_empty() || caller_filter.contains(x))
                .collect::<Vec<_>>();

            let mut sample = Sample {
                name,
                dir,
                bam,
                bed: sample_bed,
                phenotype: None,
                normal_match: None,
                callers,
                vcf_by_caller: BTreeMap::new(),
            };

            if let Some(metadata) = &details.metadata {
                sample.phenotype = metadata.phenotype;
                for batch_name in metadata.batch.clone().into_vec() {
                    project.add_to_batch(&batch_name, &sample)?;
                }
            }
            project.samples.push(sample);
        }
        if !missing_dirs.is_empty() {
            bail!(
                "Sample directories not found: {}",
                missing_dirs
                    .iter()
                    .map(|x| x.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        project.promote_lone_normals();
        project.assign_normal_matches()?;

        if project
            .samples
            .iter()
            .all(|s| split_trailing_number(&s.name).is_some())
        {
            project
                .samples
                .sort_by(|a, b| split_trailing_number(&a.name).cmp(&split_trailing_number(&b.name)));
        }

        project.find_vcfs();
        Ok(project)
    }

    fn add_to_batch(&mut self, batch_name: &str, sample: &Sample) -> SimpleResult<()> {
        let index = match self.batches.iter().position(|b| b.name == batch_name) {
            Some(x) => x,
            None => {
                self.batches.push(Batch {
                    name: batch_name.to_string(),
                    ..Default::default()
                });
                self.batches.len() - 1
            }
        };
        let batch = &mut self.batches[index];
        match sample.phenotype {
            Some(Phenotype::Normal) => {
                if batch.normal.is_some() {
                    bail!("Multiple normal samples for batch {batch_name}");
                }
                batch.normal = Some(sample.name.clone());
            }
            Some(Phenotype::Tumor) => batch.tumors.push(sample.name.clone()),
            None => {}
        }
        for caller in sample.callers.iter() {
            if !batch.callers.contains(caller) {
                batch.callers.push(caller.clone());
            }
        }
        Ok(())
    }

    /// A batch holding only a normal sample is processed as a single tumor sample
    fn promote_lone_normals(&mut self) {
        for batch in self.batches.iter_mut() {
            if batch.tumors.is_empty() {
                if let Some(normal) = batch.normal.take() {
                    info!("Batch {} has only a normal sample, treating {normal} as tumor", batch.name);
                    if let Some(sample) = self.samples.iter_mut().find(|s| s.name == normal) {
                        sample.phenotype = Some(Phenotype::Tumor);
                    }
                    batch.tumors.push(normal);
                }
            }
        }
    }

    fn assign_normal_matches(&mut self) -> SimpleResult<()> {
        for batch in self.batches.iter() {
            let Some(normal) = &batch.normal else {
                continue;
            };
            for tumor in batch.tumors.iter() {
                let Some(sample) = self.samples.iter_mut().find(|s| &s.name == tumor) else {
                    continue;
                };
                match &sample.normal_match {
                    Some(x) if x != normal => {
                        bail!("Tumor sample {tumor} is paired with more than one normal: {x}, {normal}")
                    }
                    _ => sample.normal_match = Some(normal.clone()),
                }
            }
        }
        Ok(())
    }

    fn find_vcfs(&mut self) {
        for sample in self.samples.iter_mut() {
            for caller_name in sample.callers.iter() {
                let Some(vcf) = find_sample_vcf(&sample.dir, &sample.name, caller_name) else {
                    continue;
                };
                debug!("Found {caller_name} VCF for sample {}: {vcf}", sample.name);

                let paired = self
                    .batches
                    .iter()
                    .any(|b| b.is_paired() && b.tumors.contains(&sample.name));

                let index = match self.variant_callers.iter().position(|c| &c.name == caller_name) {
                    Some(x) => x,
                    None => {
                        self.variant_callers.push(VariantCaller {
                            name: caller_name.clone(),
                            ..Default::default()
                        });
                        self.variant_callers.len() - 1
                    }
                };
                let caller = &mut self.variant_callers[index];
                if paired {
                    caller.paired_vcf_by_sample.insert(sample.name.clone(), vcf.clone());
                } else {
                    caller.single_vcf_by_sample.insert(sample.name.clone(), vcf.clone());
                }
                sample.vcf_by_caller.insert(caller_name.clone(), vcf);
            }
        }
        if self.variant_callers.is_empty() {
            error!("No variant caller VCFs found in {}", self.final_dir);
        }
    }

    pub fn sample(&self, name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn variant_caller(&self, name: &str) -> Option<&VariantCaller> {
        self.variant_callers.iter().find(|c| c.name == name)
    }
}
