use serde::Serialize;
use tracing::warn;

use crate::model::{Fragment, FragmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    LowRegionConfidence,
    NoRegionsDetected,
    UnmappedColumn,
    LowHeaderCoverage,
    HeaderInferenceLowConfidence,
    ContinuationInherited,
    EmptyIdentityKey,
    UnmatchedIdentity,
    StructuralViolation,
    RollCallIncomplete,
    RosterEntryIncomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    RecoverableAmbiguity,
    StructuralViolation,
}

impl WarningCode {
    #[must_use]
    pub fn category(self) -> WarningCategory {
        match self {
            Self::StructuralViolation => WarningCategory::StructuralViolation,
            _ => WarningCategory::RecoverableAmbiguity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconWarning {
    pub code: WarningCode,
    pub message: String,
    pub source_file: Option<String>,
    pub page: Option<u32>,
    pub fragment: Option<FragmentId>,
    pub row: Option<usize>,
    pub column: Option<usize>,
    pub confidence: Option<f32>,
}

impl ReconWarning {
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_file: None,
            page: None,
            fragment: None,
            row: None,
            column: None,
            confidence: None,
        }
    }

    #[must_use]
    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_fragment(mut self, fragment: &FragmentId) -> Self {
        self.fragment = Some(fragment.clone());
        self
    }

    /// Attaches the fragment's id, source file and page.
    #[must_use]
    pub fn for_fragment(mut self, fragment: &Fragment) -> Self {
        self.source_file = Some(fragment.source_file.clone());
        self.fragment = Some(fragment.id.clone());
        self.page = fragment.page_id;
        self
    }

    #[must_use]
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Logs `warning` and records it.
pub(crate) fn emit(warnings: &mut Vec<ReconWarning>, warning: ReconWarning) {
    warn!(
        code = ?warning.code,
        file = warning.source_file.as_deref().unwrap_or(""),
        page = warning.page,
        fragment = warning.fragment.as_ref().map(FragmentId::as_str),
        row = warning.row,
        column = warning.column,
        confidence = warning.confidence,
        "{}",
        warning.message
    );
    warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{ReconWarning, WarningCategory, WarningCode, emit};
    use crate::model::{Fragment, FragmentId};

    #[test]
    fn builder_fills_context() {
        let id = FragmentId::from_region("a.pdf", 2, 0);
        let warning = ReconWarning::new(WarningCode::UnmappedColumn, "no match")
            .with_fragment(&id)
            .with_page(2)
            .with_column(3)
            .with_confidence(0.4);
        assert_eq!(warning.fragment.as_ref(), Some(&id));
        assert_eq!(warning.page, Some(2));
        assert_eq!(warning.column, Some(3));
        assert_eq!(warning.row, None);
    }

    #[test]
    fn for_fragment_copies_origin() {
        let fragment = Fragment {
            id: FragmentId::from_region("b.pdf", 5, 1),
            source_file: "b.pdf".to_string(),
            page_id: Some(5),
            region_id: Some(1),
            rows: Vec::new(),
            excluded_rows: BTreeSet::new(),
        };
        let warning = ReconWarning::new(WarningCode::LowHeaderCoverage, "few columns")
            .for_fragment(&fragment);
        assert_eq!(warning.source_file.as_deref(), Some("b.pdf"));
        assert_eq!(warning.page, Some(5));
        assert_eq!(warning.fragment, Some(fragment.id.clone()));
    }

    #[test]
    fn emit_records_in_order() {
        let mut warnings = Vec::new();
        for code in [
            WarningCode::EmptyIdentityKey,
            WarningCode::StructuralViolation,
        ] {
            emit(&mut warnings, ReconWarning::new(code, "recorded"));
        }
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[1].code.category(),
            WarningCategory::StructuralViolation
        );
        assert_eq!(
            warnings[0].code.category(),
            WarningCategory::RecoverableAmbiguity
        );
    }
}
