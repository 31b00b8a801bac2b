use serde::Deserialize;

use crate::error::ReconError;
use crate::schema::CanonicalSchema;
use crate::similarity::SimilarityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    #[default]
    AutoDetect,
    HasHeader,
    NoHeader,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub header_match: f64,
    pub identity_match: f64,
    pub min_region_confidence: f32,
    pub min_rows_per_region: usize,
    pub anchor_match: f64,
    pub category_match: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            header_match: 0.75,
            identity_match: 0.85,
            min_region_confidence: 0.30,
            min_rows_per_region: 3,
            anchor_match: 0.80,
            category_match: 0.70,
        }
    }
}

/// Geometry knobs for row banding and column clustering, in page units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegionOptions {
    pub row_height_tolerance: f32,
    pub column_alignment_tolerance: f32,
    /// Horizontal gap that separates two cells within a row.
    pub min_column_gap: f32,
    /// Vertical gap that ends an anchor-only region.
    pub max_row_gap: f32,
    pub alignment_weight: f32,
    pub anchor_weight: f32,
    pub anchor_keywords: Vec<String>,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            row_height_tolerance: 4.0,
            column_alignment_tolerance: 8.0,
            min_column_gap: 12.0,
            max_row_gap: 40.0,
            alignment_weight: 0.6,
            anchor_weight: 0.4,
            anchor_keywords: vec![
                "Namentliche Abstimmung".to_string(),
                "Zusammenstellung".to_string(),
                "Name".to_string(),
                "Wahlkreis".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlignmentOptions {
    pub header_mode: HeaderMode,
    pub header_row_index: usize,
    pub min_mapped_fraction: f32,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            header_mode: HeaderMode::AutoDetect,
            header_row_index: 0,
            min_mapped_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub identity_key: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            identity_key: vec!["Name".to_string(), "District".to_string()],
        }
    }
}

/// Where roll-call headings start and how far their date and topic may run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RollCallOptions {
    pub anchors: Vec<String>,
    /// Lines after the anchor searched for the sitting date.
    pub check_next: usize,
    pub max_topic_lines: usize,
    /// A line containing this marks the table header that ends the topic.
    pub topic_end: String,
}

impl Default for RollCallOptions {
    fn default() -> Self {
        Self {
            anchors: vec![
                "Namentliche Abstimmung".to_string(),
                "Zusammenstellung.".to_string(),
            ],
            check_next: 5,
            max_topic_lines: 100,
            topic_end: "Name".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    pub sort_by: Option<SortKey>,
}

/// Everything a run needs besides its input; read-only once validated.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub schema: CanonicalSchema,
    pub thresholds: Thresholds,
    pub region: RegionOptions,
    pub alignment: AlignmentOptions,
    pub reconcile: ReconcileOptions,
    pub assembly: AssemblyOptions,
    pub rollcall: RollCallOptions,
    pub similarity: SimilarityKind,
}

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges and that every column the config names exists in the
    /// schema.
    pub fn validate(&self) -> Result<(), ReconError> {
        self.schema.validate()?;

        let t = &self.thresholds;
        check_unit("thresholds.header_match", t.header_match)?;
        check_unit("thresholds.identity_match", t.identity_match)?;
        check_unit(
            "thresholds.min_region_confidence",
            f64::from(t.min_region_confidence),
        )?;
        check_unit("thresholds.anchor_match", t.anchor_match)?;
        check_unit("thresholds.category_match", t.category_match)?;
        if t.min_rows_per_region < 2 {
            return Err(ReconError::InvalidConfig(
                "thresholds.min_rows_per_region must be at least 2".to_string(),
            ));
        }

        let r = &self.region;
        check_positive("region.row_height_tolerance", r.row_height_tolerance)?;
        check_positive(
            "region.column_alignment_tolerance",
            r.column_alignment_tolerance,
        )?;
        check_positive("region.min_column_gap", r.min_column_gap)?;
        check_positive("region.max_row_gap", r.max_row_gap)?;
        check_unit("region.alignment_weight", f64::from(r.alignment_weight))?;
        check_unit("region.anchor_weight", f64::from(r.anchor_weight))?;
        if r.alignment_weight + r.anchor_weight <= 0.0 {
            return Err(ReconError::InvalidConfig(
                "region weights must not both be zero".to_string(),
            ));
        }

        check_unit(
            "alignment.min_mapped_fraction",
            f64::from(self.alignment.min_mapped_fraction),
        )?;

        let rc = &self.rollcall;
        if rc.check_next == 0 || rc.max_topic_lines == 0 {
            return Err(ReconError::InvalidConfig(
                "rollcall.check_next and rollcall.max_topic_lines must be at least 1".to_string(),
            ));
        }
        if rc.topic_end.trim().is_empty() {
            return Err(ReconError::InvalidConfig(
                "rollcall.topic_end must not be empty".to_string(),
            ));
        }

        if self.reconcile.identity_key.is_empty() {
            return Err(ReconError::InvalidConfig(
                "reconcile.identity_key must name at least one column".to_string(),
            ));
        }
        for name in &self.reconcile.identity_key {
            self.column_index("reconcile.identity_key", name)?;
        }
        if let Some(key) = &self.assembly.sort_by {
            self.column_index("assembly.sort_by", &key.column)?;
        }

        Ok(())
    }

    fn column_index(&self, field: &str, name: &str) -> Result<usize, ReconError> {
        self.schema.index_of(name).ok_or_else(|| {
            ReconError::InvalidConfig(format!("{field}: unknown column '{name}'"))
        })
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ReconError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ReconError::InvalidConfig(format!(
            "{field} must be within [0, 1], got {value}"
        )))
    }
}

fn check_positive(field: &str, value: f32) -> Result<(), ReconError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ReconError::InvalidConfig(format!(
            "{field} must be a positive number, got {value}"
        )))
    }
}
