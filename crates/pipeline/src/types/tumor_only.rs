//! Tumor-only somatic variant analysis.
//!
//! Wraps the tumor pipeline shell script. Exactly one input modality must
//! be usable, checked in fixed precedence order: VCF, then BAM, then
//! uBAM, then FASTQ (paired or single-end). The script's exit code is
//! necessary but not sufficient: the expected artifacts must also exist
//! in the workspace before the job counts as completed.

use async_trait::async_trait;
use oncoflow_core::analysis::{self, FilterOperator};
use oncoflow_core::archive;
use oncoflow_core::command::{ErrorCodeMap, ExitAction};
use oncoflow_core::document::Document;
use oncoflow_core::error::ProcessingError;
use oncoflow_db::models::job::Job;
use serde_json::json;

use crate::context::{JobContext, PipelineEnv};
use crate::contract::{JobType, PatientInputState, SpecEntry};
use crate::validation::{FieldRule, Rule};

/// Registry discriminator for this variant.
pub const TUMOR_ONLY: &str = "tumor_only";

const PIPELINE_SCRIPT: &str = "pipeline_tumVSnormal.bash";

/// Tag written into `job_output.type`.
const OUTPUT_TYPE: &str = "tumor_only";

/// Typed view of the tumor-only parameter document. Unknown keys stay
/// addressable through the raw document.
#[derive(Debug, Clone)]
pub struct TumorOnlyParams {
    pub paired: bool,
    pub fastq1: Option<String>,
    pub fastq2: Option<String>,
    pub ubam: Option<String>,
    pub bam: Option<String>,
    pub vcf: Option<String>,
    pub genome: String,
    pub threads: i64,
    pub depth_filter: FilterParam,
    pub allele_fraction_filter: FilterParam,
}

/// One variant filter: a comparison operator and a numeric threshold.
#[derive(Debug, Clone, Copy)]
pub struct FilterParam {
    pub comparison: FilterOperator,
    pub value: f64,
}

impl TumorOnlyParams {
    /// Read the parameter document, applying the documented defaults.
    pub fn from_document(params: &Document) -> Self {
        let filter = |prefix: &str, default_value: f64| FilterParam {
            comparison: params
                .get_str(&format!("{prefix}.comparison"))
                .and_then(FilterOperator::parse)
                .unwrap_or(FilterOperator::Lt),
            value: params.get_f64_or(&format!("{prefix}.value"), default_value),
        };
        Self {
            paired: params.get_bool_or("paired", false),
            fastq1: params.get_str("fastq1").map(str::to_string),
            fastq2: params.get_str("fastq2").map(str::to_string),
            ubam: params.get_str("ubam").map(str::to_string),
            bam: params.get_str("bam").map(str::to_string),
            vcf: params.get_str("vcf").map(str::to_string),
            genome: params
                .get_str("genome")
                .unwrap_or(analysis::default_genome())
                .to_string(),
            threads: params.get_i64_or("threads", 1),
            depth_filter: filter("depthFilter", 0.0),
            allele_fraction_filter: filter("alleleFractionFilter", 0.4),
        }
    }
}

/// Exit codes the pipeline script reports, mapped to readable failures.
fn error_code_map() -> ErrorCodeMap {
    ErrorCodeMap::from([
        (1, ExitAction::Fail("An invalid parameter has been detected")),
        (100, ExitAction::Fail("Unable to convert uBAM to FASTQ")),
        (101, ExitAction::Fail("Unable to trim FASTQ file")),
        (102, ExitAction::Fail("Unable to align FASTQ file")),
        (103, ExitAction::Fail("Unable to add read groups to BAM file")),
        (104, ExitAction::Fail("Unable to sort BAM file")),
        (105, ExitAction::Fail("Unable to reorder BAM file")),
        (106, ExitAction::Fail("Unable to call variants")),
        (107, ExitAction::Fail("Unable to filter variants")),
        (108, ExitAction::Fail("Unable to select PASS variants")),
        (109, ExitAction::Fail("Unable to filter by Depth")),
        (110, ExitAction::Fail("Unable to filter by Depth")),
        (111, ExitAction::Fail("Unable to process Illumina VariantTable Format")),
        (112, ExitAction::Fail("Unable to split INDELs and SNPs")),
        (113, ExitAction::Fail("Unable to filter SNPs by Allele Frequency")),
        (114, ExitAction::Fail("Unable to merge filtered SNPs with INDELs")),
        (115, ExitAction::Fail("Unable to select PASS variants")),
        (116, ExitAction::Fail("Unable to extract Germline variants from VCF")),
        (117, ExitAction::Fail("Unable to extract Somatic variants from VCF")),
        (118, ExitAction::Fail("Unable to prepare variants file for annotation")),
        (119, ExitAction::Fail("Unable to prepare input file for annotation")),
        (120, ExitAction::Fail("Unable to build report output")),
        (121, ExitAction::Fail("Unable to clean unused folders")),
    ])
}

/// The tumor-only analysis job type.
pub struct TumorOnlyAnalysis;

impl TumorOnlyAnalysis {
    /// Relative and absolute paths of the per-run output directory,
    /// `output_<slugified job name>` inside the workspace.
    fn output_dir(&self, ctx: &JobContext) -> (String, std::path::PathBuf) {
        let name = ctx.job_name(self.display_name());
        let relative = ctx.workspace().named_file(&name, "output_", "");
        let absolute = ctx.workspace().absolute(&relative);
        (relative.to_string_lossy().into_owned(), absolute)
    }
}

#[async_trait]
impl JobType for TumorOnlyAnalysis {
    fn discriminator(&self) -> &'static str {
        TUMOR_ONLY
    }

    fn display_name(&self) -> &'static str {
        "Tumor Only"
    }

    fn description(&self) -> &'static str {
        "Runs the tumor-only analysis"
    }

    fn parameters_spec(&self) -> Vec<(&'static str, SpecEntry)> {
        vec![
            ("paired", SpecEntry::Help("A boolean value indicating whether the input is paired-end or not (OPTIONAL; default: FALSE)")),
            ("fastq1", SpecEntry::Help("The first FASTQ filename for the sample (Required if no uBAM, BAM, or VCF files are used)")),
            ("fastq2", SpecEntry::Help("The second FASTQ filename for the sample (Required if the input is paired-end and no uBAM, BAM, or VCF files are used)")),
            ("ubam", SpecEntry::Help("The uBAM filename for the sample (Required if no FASTQ, BAM, or VCF files are used)")),
            ("bam", SpecEntry::Help("The BAM filename for the sample (Required if no FASTQ, uBAM, or VCF files are used)")),
            ("vcf", SpecEntry::Help("A VCF filename for a custom analysis (Required if no FASTQ, uBAM, or BAM files are used)")),
            ("genome", SpecEntry::Help("The genome version (hg19 or hg38; OPTIONAL; default: hg19)")),
            ("threads", SpecEntry::Help("The number of threads to use for the analysis (OPTIONAL; default: 1)")),
            ("depthFilter", SpecEntry::Group(&[
                ("comparison", "The type of comparison to be done for the sequencing depth filter (One of: lt, lte, gt, gte; OPTIONAL; default: lt)"),
                ("value", "The value that will be used to filter the sequencing depth (OPTIONAL; default: 0)"),
            ])),
            ("alleleFractionFilter", SpecEntry::Group(&[
                ("comparison", "The type of comparison to be done for the allele fraction filter (One of: lt, lte, gt, gte; OPTIONAL; default: lt)"),
                ("value", "The value that will be used to filter the allele fraction (OPTIONAL; default: 0.4)"),
            ])),
        ]
    }

    fn output_spec(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("bamOutputFile", "The path and url of the BAM file produced by this analysis"),
            ("vcfOutputFile", "The path and url of the VCF file produced by this analysis"),
            ("vcfPASSOutputFile", "The path and url of the VCF file produced by this analysis filtered to keep only PASS variants"),
            ("textOutputFiles", "The path and url of an archive containing all text files generated by annotating the VCF file"),
            ("reportOutputFile", "The path and url of the final report produced by this analysis"),
        ]
    }

    fn validation_spec(&self) -> Vec<FieldRule> {
        vec![
            FieldRule::new("paired", Rule::Boolean),
            FieldRule::new("fastq1", Rule::RequiredWithoutAll(&["ubam", "bam", "vcf"])),
            FieldRule::new(
                "fastq2",
                Rule::RequiredIf {
                    when: "paired",
                    and_filled: "fastq1",
                },
            ),
            FieldRule::new("ubam", Rule::RequiredWithoutAll(&["fastq1", "bam", "vcf"])),
            FieldRule::new("bam", Rule::RequiredWithoutAll(&["fastq1", "ubam", "vcf"])),
            FieldRule::new("vcf", Rule::RequiredWithoutAll(&["fastq1", "bam", "ubam"])),
            FieldRule::new("genome", Rule::In(&analysis::VALID_GENOMES)),
            FieldRule::new("threads", Rule::Integer),
            FieldRule::new("depthFilter.comparison", Rule::In(&FilterOperator::KEYS)),
            FieldRule::new("depthFilter.value", Rule::Numeric),
            FieldRule::new(
                "alleleFractionFilter.comparison",
                Rule::In(&FilterOperator::KEYS),
            ),
            FieldRule::new("alleleFractionFilter.value", Rule::Numeric),
        ]
    }

    fn patient_input_state(&self) -> PatientInputState {
        PatientInputState::Required
    }

    /// Exactly one input modality must be usable: VCF, BAM, uBAM, or
    /// FASTQ (with its mate when paired). A filename that does not
    /// resolve to an existing workspace file counts as "not supplied";
    /// competing modalities are rejected.
    fn is_input_valid(&self, ctx: &JobContext) -> bool {
        let params = TumorOnlyParams::from_document(ctx.job().parameters());
        if !analysis::is_valid_genome(&params.genome) {
            return false;
        }
        if params.threads <= 0 {
            return false;
        }
        let ws = ctx.workspace();
        let fastq_usable = ws.resolve_input(params.fastq1.as_deref()).is_some()
            && (!params.paired || ws.resolve_input(params.fastq2.as_deref()).is_some());
        let usable = [
            ws.resolve_input(params.vcf.as_deref()).is_some(),
            ws.resolve_input(params.bam.as_deref()).is_some(),
            ws.resolve_input(params.ubam.as_deref()).is_some(),
            fastq_usable,
        ];
        usable.iter().filter(|present| **present).count() == 1
    }

    async fn handle(&self, ctx: &mut JobContext) -> Result<(), ProcessingError> {
        ctx.log("Starting analysis.").await?;

        let patient = ctx
            .patient()
            .cloned()
            .ok_or_else(|| {
                ProcessingError::new(
                    "This job is not tied to any patient. Unable to run the analysis.",
                )
            })?;

        let params = TumorOnlyParams::from_document(ctx.job().parameters());
        let (output_relative, output_absolute) = self.output_dir(ctx);
        std::fs::create_dir_all(&output_absolute).map_err(|_| {
            ProcessingError::new(format!(
                "Directory \"{}\" was not created",
                output_absolute.display()
            ))
        })?;

        let depth_filter = analysis::format_filter(
            "DP",
            params.depth_filter.comparison,
            params.depth_filter.value,
        );
        let af_filter = analysis::format_filter(
            "AF",
            params.allele_fraction_filter.comparison,
            params.allele_fraction_filter.value,
        );

        let mut command: Vec<String> = vec![
            "bash".into(),
            ctx.script_path(PIPELINE_SCRIPT).to_string_lossy().into_owned(),
            "-i".into(),
            patient.code.clone(),
            "-s".into(),
            patient.last_name.clone(),
            "-n".into(),
            patient.first_name.clone(),
            "-a".into(),
            patient.age.to_string(),
            "-g".into(),
            patient.gender.clone(),
            "-t".into(),
            patient.disease.clone(),
            "-pp".into(),
            output_absolute.to_string_lossy().into_owned(),
            "-th".into(),
            params.threads.to_string(),
            "-gn".into(),
            params.genome.clone(),
            "-dp".into(),
            depth_filter,
            "-af".into(),
            af_filter,
        ];

        // Exactly one modality flag group, in precedence order.
        let ws = ctx.workspace();
        if let Some(vcf) = params
            .vcf
            .as_deref()
            .filter(|f| ws.resolve_input(Some(f)).is_some())
        {
            command.extend(["-v".into(), vcf.to_string()]);
        } else if let Some(bam) = params
            .bam
            .as_deref()
            .filter(|f| ws.resolve_input(Some(f)).is_some())
        {
            command.extend(["-b".into(), bam.to_string()]);
        } else if let Some(ubam) = params
            .ubam
            .as_deref()
            .filter(|f| ws.resolve_input(Some(f)).is_some())
        {
            command.extend([
                "-ub".into(),
                ubam.to_string(),
                "-pr".into(),
                if params.paired { "yes" } else { "no" }.into(),
            ]);
        } else if let Some(fastq1) = params
            .fastq1
            .as_deref()
            .filter(|f| ws.resolve_input(Some(f)).is_some())
        {
            command.extend(["-fq1".into(), fastq1.to_string()]);
            if params.paired {
                let fastq2 = params
                    .fastq2
                    .as_deref()
                    .filter(|f| ws.resolve_input(Some(f)).is_some())
                    .ok_or_else(|| {
                        ProcessingError::new(
                            "Unable to validate second fastq files with a paired-end analysis.",
                        )
                    })?;
                command.extend(["-fq2".into(), fastq2.to_string()]);
            }
        } else {
            return Err(ProcessingError::new(
                "No valid input files have been specified.",
            ));
        }

        ctx.run_command(&command, None, &error_code_map()).await?;

        // Exit code 0 is necessary but not sufficient: the expected
        // artifacts must exist before the run counts as successful.
        let txt_relative = format!("{output_relative}/txt");
        if !ctx.workspace().exists(&txt_relative) {
            return Err(ProcessingError::new(
                "Unable to generate report intermediate files.",
            ));
        }
        let report_relative = format!("{output_relative}/output/report.html");
        if !ctx.workspace().exists(&report_relative) {
            return Err(ProcessingError::new(
                "Unable to generate report output file.",
            ));
        }

        ctx.log("Building intermediate archive").await?;
        let archive_relative = format!("{output_relative}/output/intermediate.zip");
        let txt_absolute = ctx.workspace().absolute(&txt_relative);
        let archive_absolute = ctx.workspace().absolute(&archive_relative);
        tokio::task::spawn_blocking(move || {
            archive::zip_directory(&txt_absolute, &archive_absolute)
        })
        .await
        .map_err(ProcessingError::wrap)?
        .map_err(ProcessingError::wrap)?;

        ctx.log("Writing output").await?;
        ctx.set_output_many([
            ("type", json!(OUTPUT_TYPE)),
            (
                "bamOutputFile",
                output_path(&format!("{output_relative}/bam_ordered/ordered.bam")),
            ),
            (
                "vcfOutputFile",
                output_path(&format!("{output_relative}/mutect/variants.vcf")),
            ),
            (
                "vcfPASSOutputFile",
                output_path(&format!("{output_relative}/pass_final/variants.vcf")),
            ),
            ("textOutputFiles", output_path(&archive_relative)),
            ("reportOutputFile", output_path(&report_relative)),
        ])
        .await?;
        ctx.log("Analysis completed.").await?;
        Ok(())
    }

    /// Attach a public URL next to every stored output path.
    fn mutate_output(&self, job: &Job, env: &PipelineEnv) -> Document {
        let mut output = job.output().clone();
        for (key, _) in self.output_spec() {
            if let Some(path) = output
                .get(&format!("{key}.path"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
            {
                output.set(&format!("{key}.url"), env.public_url(&path));
            }
        }
        output
    }
}

/// Output entry holding a storage-relative path.
fn output_path(relative: &str) -> serde_json::Value {
    json!({ "path": relative })
}
