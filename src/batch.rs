use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::align::align_fragments;
use crate::assemble::assemble_table;
use crate::error::ReconError;
use crate::fragment::extract_fragment;
use crate::model::{Fragment, PageText, ReconciledTable};
use crate::options::EngineConfig;
use crate::reconcile::{ReconcileStats, reconcile_rows};
use crate::rollcall::{RollCallHeading, find_roll_calls};
use crate::similarity::Similarity;
use crate::table_detect::detect_regions;
use crate::warning::{ReconWarning, WarningCode, emit};

/// One OCR page and the file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    pub source_file: String,
    pub page: PageText,
}

/// Everything known about one logical table. Pages go through region
/// detection; `fragments` (manual transcriptions, rosters) join after them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableInput {
    pub pages: Vec<SourcePage>,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableJob {
    pub name: String,
    pub input: TableInput,
    pub deadline: Option<Duration>,
}

impl TableJob {
    #[must_use]
    pub fn new(name: impl Into<String>, input: TableInput) -> Self {
        Self {
            name: name.into(),
            input,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub name: String,
    pub table: ReconciledTable,
    pub warnings: Vec<ReconWarning>,
    pub headings: Vec<RollCallHeading>,
    pub stats: ReconcileStats,
    pub region_count: usize,
    /// Every fragment the table was built from, page regions first. Provenance
    /// entries and warning rows index into these.
    pub fragments: Vec<Fragment>,
}

impl TableReport {
    pub fn to_json(&self) -> Result<String, ReconError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug)]
pub struct TableOutcome {
    pub name: String,
    pub result: Result<TableReport, ReconError>,
}

/// Validated configuration plus the similarity measure every stage shares.
pub struct Engine {
    config: EngineConfig,
    similarity: Box<dyn Similarity>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish_non_exhaustive()
    }
}

struct Deadline<'a> {
    table: &'a str,
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline<'_> {
    fn check(&self, stage: &str) -> Result<(), ReconError> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        if self.started.elapsed() >= limit {
            warn!(table = self.table, stage, ?limit, "table deadline exceeded");
            return Err(ReconError::Timeout {
                table: self.table.to_string(),
                limit,
            });
        }
        Ok(())
    }
}

impl Engine {
    /// Fails with a configuration error before any table is touched.
    pub fn new(config: EngineConfig) -> Result<Self, ReconError> {
        let similarity = config.similarity.build();
        Self::with_similarity(config, similarity)
    }

    pub fn with_similarity(
        config: EngineConfig,
        similarity: Box<dyn Similarity>,
    ) -> Result<Self, ReconError> {
        config.validate()?;
        Ok(Self { config, similarity })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one table through detection, extraction, alignment,
    /// reconciliation and assembly.
    pub fn run_table(&self, job: &TableJob) -> Result<TableReport, ReconError> {
        let deadline = Deadline {
            table: &job.name,
            started: Instant::now(),
            limit: job.deadline,
        };
        let config = &self.config;
        let sim = self.similarity.as_ref();
        let mut warnings = Vec::new();
        let mut headings = Vec::new();
        let mut fragments = Vec::new();
        let mut region_count = 0;

        for source in &job.input.pages {
            deadline.check("detect")?;
            let page = &source.page;
            headings.extend(find_roll_calls(page, &source.source_file, config, sim, &mut warnings));

            let regions = detect_regions(page, config, sim, &mut warnings);
            region_count += regions.len();
            for region in &regions {
                fragments.push(extract_fragment(
                    region,
                    page,
                    &source.source_file,
                    config,
                    &mut warnings,
                ));
            }
            debug!(
                file = %source.source_file,
                page = page.page_id,
                regions = regions.len(),
                "page scanned"
            );
        }
        fragments.extend(job.input.fragments.iter().cloned());

        if fragments.is_empty() {
            emit(
                &mut warnings,
                ReconWarning::new(
                    WarningCode::NoRegionsDetected,
                    format!("table '{}' produced no fragments", job.name),
                ),
            );
        }

        deadline.check("align")?;
        let aligned = align_fragments(&fragments, config, sim, &mut warnings);

        deadline.check("reconcile")?;
        let reconciled = reconcile_rows(&aligned, config, sim, &mut warnings);

        deadline.check("assemble")?;
        let table = assemble_table(reconciled.rows, config, &mut warnings);
        deadline.check("finish")?;

        info!(
            table = %job.name,
            rows = table.rows.len(),
            fragments = fragments.len(),
            warnings = warnings.len(),
            "table reconciled"
        );

        Ok(TableReport {
            name: job.name.clone(),
            table,
            warnings,
            headings,
            stats: reconciled.stats,
            region_count,
            fragments,
        })
    }

    /// Runs independent tables in parallel. Outcomes keep the order of `jobs`
    /// and one table failing never affects another.
    #[must_use]
    pub fn run_batch(&self, jobs: &[TableJob]) -> Vec<TableOutcome> {
        jobs.par_iter()
            .map(|job| TableOutcome {
                name: job.name.clone(),
                result: self.run_table(job),
            })
            .collect()
    }
}
