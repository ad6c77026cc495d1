//! Catalog of post-processing steps and their command lines
//!

use simple_error::SimpleResult;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::config::PipelineConfig;
use crate::globals::PROGRAM_NAME;
use crate::job_graph::{JobGraph, JobSpec, escape_literal};
use crate::project_structure::{self as ps, ProjectStructure};

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, PartialEq)]
pub enum StepKind {
    #[strum(serialize = "VarQC")]
    VarQc,
    #[strum(serialize = "VarAnnotate")]
    VarAnnotate,
    #[strum(serialize = "VarFilter")]
    VarFilter,
    #[strum(serialize = "VarQC_postVarFilter")]
    VarQcAfter,
    #[strum(serialize = "MongoLoader")]
    MongoLoader,
    #[strum(serialize = "TargetCov")]
    TargetCov,
    #[strum(serialize = "ngsCAT")]
    NgsCat,
    #[strum(serialize = "QualiMap")]
    QualiMap,
    #[strum(serialize = "VarQC_summary")]
    VarQcSummary,
    #[strum(serialize = "VarQC_postVarFilter_summary")]
    VarQcAfterSummary,
    #[strum(serialize = "TargetCov_summary")]
    TargetCovSummary,
    #[strum(serialize = "Seq2C")]
    Seq2C,
    #[strum(serialize = "ngsCAT_summary")]
    NgsCatSummary,
    #[strum(serialize = "QualiMap_summary")]
    QualiMapSummary,
    #[strum(serialize = "CombinedReport")]
    CombinedReport,
}

impl StepKind {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::VarQc => "vq",
            Self::VarAnnotate => "va",
            Self::VarFilter => "vfs",
            Self::VarQcAfter => "vqa",
            Self::MongoLoader => "ml",
            Self::TargetCov => "tc",
            Self::NgsCat => "nc",
            Self::QualiMap => "qm",
            Self::VarQcSummary => "vqs",
            Self::VarQcAfterSummary => "vqas",
            Self::TargetCovSummary => "tcs",
            Self::Seq2C => "seq2c",
            Self::NgsCatSummary => "ncs",
            Self::QualiMapSummary => "qms",
            Self::CombinedReport => "cr",
        }
    }
}

/// Build the spec for one step of the catalog
fn make_job_spec(
    kind: StepKind,
    config: &PipelineConfig,
    project: &ProjectStructure,
) -> SimpleResult<JobSpec> {
    let final_dir = escape_literal(project.final_dir.as_str());
    let work_dir = escape_literal(project.work_dir.as_str());
    let log_dir = escape_literal(project.log_dir.as_str());
    let cnfs = escape_literal(&config.script_config_args());
    let overwrite = config.overwrite_arg();

    let spec_params = format!("{cnfs} -t {{threads}} {overwrite} --log-dir '{log_dir}'");
    let summary_params = format!("'{final_dir}' {cnfs}");

    let name = kind.to_string();
    let short_name = kind.short_name();
    let python = Some("python");

    let (script, interpreter, output_subdir, template) = match kind {
        StepKind::VarQc => (
            "varqc",
            python,
            ps::VAR_QC_DIR,
            format!(
                "{spec_params} --vcf '{{vcf}}' -o '{{output_dir}}' -s '{{sample}}' -c {{caller}} \
                 --work-dir '{work_dir}/varQC_{{sample}}_{{caller}}'"
            ),
        ),
        StepKind::VarQcAfter => (
            "varqc",
            python,
            ps::VAR_QC_AFTER_DIR,
            format!(
                "{spec_params} --vcf '{{vcf}}' -o '{{output_dir}}' -s '{{sample}}' -c {{caller}} \
                 --work-dir '{work_dir}/varQC_postVarFilter_{{sample}}_{{caller}}' \
                 --proc-name varQC_postVarFilter"
            ),
        ),
        StepKind::VarAnnotate => (
            "varannotate",
            python,
            ps::VAR_ANNOTATE_DIR,
            format!(
                "{spec_params} --vcf '{{vcf}}' {{bam_cmdline}} {{normal_match_cmdline}} \
                 -o '{{output_dir}}' -s '{{sample}}' -c {{caller}} \
                 --work-dir '{work_dir}/varAnnotate_{{sample}}_{{caller}}'"
            ),
        ),
        StepKind::VarFilter => {
            let mut args = format!("filter '{final_dir}' {cnfs} -t {{threads}} {overwrite} --log-dir '{log_dir}'");
            if !config.vcf_suffixes.is_empty() {
                args += &format!(" --vcf-suffix {}", escape_literal(&config.vcf_suffixes.join(",")));
            }
            if !config.variant_filtering.control.is_empty() {
                args += &format!(
                    " --controls {}",
                    escape_literal(&config.variant_filtering.control.join(","))
                );
            }
            if let Some(x) = &config.datahub_path {
                args += &format!(" --datahub-path '{}'", escape_literal(x));
            }
            (PROGRAM_NAME, None, ps::VAR_FILTER_DIR, args)
        }
        StepKind::MongoLoader => (
            "vcf_loader",
            Some("java"),
            ps::MONGO_LOADER_DIR,
            "-module loader -project {project} -sample {sample} -path {path} -variantCaller {caller}"
                .to_string(),
        ),
        StepKind::TargetCov => (
            "targetcov",
            python,
            ps::TARGET_SEQ_DIR,
            format!(
                "{spec_params} --bam '{{bam}}' --bed '{{bed}}' -o '{{output_dir}}' -s '{{sample}}' \
                 --work-dir '{work_dir}/targetSeq_{{sample}}'"
            ),
        ),
        StepKind::NgsCat => (
            "ngscat",
            python,
            ps::NGSCAT_DIR,
            format!(
                "{spec_params} --bam '{{bam}}' --bed '{{bed}}' -o '{{output_dir}}' -s '{{sample}}' \
                 --saturation y --work-dir '{work_dir}/ngscat_{{sample}}'"
            ),
        ),
        StepKind::QualiMap => (
            "qualimap",
            None,
            ps::QUALIMAP_DIR,
            "bamqc -nt {threads} --java-mem-size=24G -nr 5000 -bam '{bam}' -outdir '{output_dir}' \
             {qualimap_gff} -c -gd HUMAN"
                .to_string(),
        ),
        StepKind::VarQcSummary => (
            "varqc_summary",
            python,
            ps::VAR_QC_SUMMARY_DIR,
            summary_params,
        ),
        StepKind::VarQcAfterSummary => (
            "varqc_summary",
            python,
            ps::VAR_QC_AFTER_SUMMARY_DIR,
            format!(
                "{summary_params} --name {} --dir {}",
                StepKind::VarQcAfter,
                ps::VAR_QC_AFTER_DIR
            ),
        ),
        StepKind::TargetCovSummary => (
            "targetcov_summary",
            python,
            ps::TARGET_SEQ_SUMMARY_DIR,
            summary_params,
        ),
        StepKind::Seq2C => ("seq2c", python, ps::CNV_SUMMARY_DIR, summary_params),
        StepKind::NgsCatSummary => (
            "ngscat_summary",
            python,
            ps::NGSCAT_SUMMARY_DIR,
            summary_params,
        ),
        StepKind::QualiMapSummary => (
            "qualimap_summary",
            python,
            ps::QUALIMAP_SUMMARY_DIR,
            summary_params,
        ),
        StepKind::CombinedReport => (
            "combined_report",
            python,
            ps::COMBINED_REPORT_DIR,
            summary_params,
        ),
    };

    JobSpec::new(&name, short_name, script, interpreter, output_subdir, &template)
}

/// Build the job graph holding every catalog step enabled in the configuration
pub fn build_job_graph(config: &PipelineConfig, project: &ProjectStructure) -> SimpleResult<JobGraph> {
    let mut graph = JobGraph::new(&config.steps);
    for kind in StepKind::iter() {
        graph.add(make_job_spec(kind, config, project)?)?;
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_names_are_unique() {
        let short_names = StepKind::iter().map(|x| x.short_name()).collect::<HashSet<_>>();
        let names = StepKind::iter().map(|x| x.to_string()).collect::<HashSet<_>>();
        assert_eq!(short_names.len(), StepKind::iter().count());
        assert_eq!(names.len(), StepKind::iter().count());
        assert_eq!(StepKind::VarQcAfter.to_string(), "VarQC_postVarFilter");
    }
}
