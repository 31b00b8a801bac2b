use std::collections::BTreeSet;

use tracing::debug;

use crate::model::{AlignedFragment, Fragment, Row};
use crate::options::{EngineConfig, HeaderMode};
use crate::schema::{CanonicalSchema, ColumnDef};
use crate::similarity::{Similarity, normalize};
use crate::warning::{ReconWarning, WarningCode, emit};

/// Scores closer than this are treated as a tie.
const SCORE_EPSILON: f64 = 1e-9;
const HEADER_INFERENCE_FLOOR: f32 = 0.55;

fn looks_numeric(value: &str) -> bool {
    let value = value.trim();
    value.chars().any(|c| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
}

/// Share of a row's filled cells that read as numbers.
fn numeric_share(row: &Row) -> f32 {
    let (filled, numeric) = row
        .cells
        .iter()
        .filter(|cell| !cell.text.trim().is_empty())
        .fold((0_usize, 0_usize), |(filled, numeric), cell| {
            (filled + 1, numeric + usize::from(looks_numeric(&cell.text)))
        });
    if filled == 0 {
        0.0
    } else {
        numeric as f32 / filled as f32
    }
}

/// Guesses whether the first non-blank row is a header.
///
/// Member rows carry numbers (districts, seat counts) where header labels
/// carry none, so a header is a number-free row above one that has numbers.
/// A lone row is treated as data. The confidence is the header likelihood.
#[must_use]
pub fn infer_has_header(rows: &[Row]) -> (bool, f32) {
    let mut filled = rows.iter().filter(|row| !row.is_blank());
    let Some(first) = filled.next() else {
        return (false, 0.0);
    };
    let label_like = 1.0 - numeric_share(first);
    let Some(second) = filled.next() else {
        return (false, label_like * 0.5);
    };

    let below = numeric_share(second);
    let confidence = (label_like * 0.5 + below * 0.5).clamp(0.0, 1.0);
    (label_like >= 1.0 && below > 0.0, confidence)
}

fn best_label_score(header: &str, column: &ColumnDef, sim: &dyn Similarity) -> f64 {
    column
        .labels()
        .map(|label| sim.similarity(header, label))
        .fold(0.0, f64::max)
}

/// Maps each raw header onto the most similar canonical column at or above
/// `threshold`. Ties go to a column no earlier raw column has claimed, then
/// to schema order.
fn map_header(
    header: &Row,
    schema: &CanonicalSchema,
    threshold: f64,
    sim: &dyn Similarity,
) -> Vec<Option<usize>> {
    let mut claimed = vec![false; schema.len()];

    header
        .cells
        .iter()
        .map(|cell| {
            if normalize(&cell.text).is_empty() {
                return None;
            }

            let scores = schema
                .columns
                .iter()
                .map(|column| best_label_score(&cell.text, column, sim))
                .collect::<Vec<_>>();
            let best = scores.iter().copied().fold(0.0, f64::max);
            if best < threshold {
                return None;
            }

            let tied = scores
                .iter()
                .enumerate()
                .filter(|(_, score)| (best - **score).abs() <= SCORE_EPSILON)
                .map(|(index, _)| index)
                .collect::<Vec<_>>();
            let chosen = tied
                .iter()
                .copied()
                .find(|&index| !claimed[index])
                .or_else(|| tied.first().copied())?;
            claimed[chosen] = true;
            Some(chosen)
        })
        .collect()
}

fn coverage_of(column_map: &[Option<usize>]) -> f32 {
    if column_map.is_empty() {
        return 0.0;
    }
    column_map.iter().filter(|slot| slot.is_some()).count() as f32 / column_map.len() as f32
}

/// Excludes data rows wider than the column map, on top of the rows the
/// fragment already marks excluded.
fn exclude_ragged_rows(
    fragment: &Fragment,
    header_row: Option<usize>,
    width: usize,
    warnings: &mut Vec<ReconWarning>,
) -> BTreeSet<usize> {
    let first = header_row.map_or(0, |header| header + 1);
    let mut excluded = fragment.excluded_rows.clone();

    for (index, row) in fragment.rows.iter().enumerate().skip(first) {
        if excluded.contains(&index) {
            continue;
        }
        let used = row
            .cells
            .iter()
            .rposition(|cell| !cell.text.trim().is_empty())
            .map_or(0, |last| last + 1);
        if used > width {
            excluded.insert(index);
            emit(
                warnings,
                ReconWarning::new(
                    WarningCode::StructuralViolation,
                    format!("row has {used} cells but the fragment has {width} columns; excluded"),
                )
                .for_fragment(fragment)
                .with_row(index),
            );
        }
    }

    excluded
}

fn finish(
    fragment: &Fragment,
    column_map: Vec<Option<usize>>,
    header_row: Option<usize>,
    config: &EngineConfig,
    warnings: &mut Vec<ReconWarning>,
) -> AlignedFragment {
    let excluded_rows = exclude_ragged_rows(fragment, header_row, column_map.len(), warnings);
    let coverage = coverage_of(&column_map);
    let low_confidence = coverage < config.alignment.min_mapped_fraction;

    if low_confidence {
        emit(
            warnings,
            ReconWarning::new(
                WarningCode::LowHeaderCoverage,
                "too few columns matched the schema; fragment kept with low confidence",
            )
            .for_fragment(fragment)
            .with_confidence(coverage),
        );
    }

    AlignedFragment {
        fragment: fragment.clone(),
        column_map,
        header_row,
        excluded_rows,
        coverage,
        low_confidence,
    }
}

/// Aligns the fragment's configured header row against the schema.
///
/// Purely a column-level decision: cell values below the header are never
/// inspected, so aligning the same fragment twice gives the same result.
pub fn align_fragment(
    fragment: &Fragment,
    config: &EngineConfig,
    sim: &dyn Similarity,
    warnings: &mut Vec<ReconWarning>,
) -> AlignedFragment {
    let header_index = config.alignment.header_row_index;
    let Some(header) = fragment.rows.get(header_index) else {
        debug!(fragment = %fragment.id, "fragment has no header row");
        return finish(fragment, Vec::new(), Some(header_index), config, warnings);
    };

    let column_map = map_header(header, &config.schema, config.thresholds.header_match, sim);

    for (raw, slot) in column_map.iter().enumerate() {
        if slot.is_some() {
            continue;
        }
        emit(
            warnings,
            ReconWarning::new(
                WarningCode::UnmappedColumn,
                format!(
                    "header '{}' matches no canonical column; its values are ignored",
                    header.text(raw)
                ),
            )
            .for_fragment(fragment)
            .with_column(raw),
        );
    }

    debug!(
        fragment = %fragment.id,
        mapped = column_map.iter().filter(|slot| slot.is_some()).count(),
        columns = column_map.len(),
        "header aligned"
    );
    finish(fragment, column_map, Some(header_index), config, warnings)
}

fn inherited_map(
    previous: Option<&AlignedFragment>,
    width: usize,
    schema_len: usize,
) -> Vec<Option<usize>> {
    match previous {
        Some(previous) => (0..width)
            .map(|raw| previous.column_map.get(raw).copied().flatten())
            .collect(),
        None => (0..width)
            .map(|raw| (raw < schema_len).then_some(raw))
            .collect(),
    }
}

fn inherit(
    fragment: &Fragment,
    previous: Option<&AlignedFragment>,
    config: &EngineConfig,
    warnings: &mut Vec<ReconWarning>,
) -> AlignedFragment {
    let column_map = inherited_map(previous, fragment.width(), config.schema.len());
    finish(fragment, column_map, None, config, warnings)
}

/// Aligns fragments in order, honoring the configured header mode.
///
/// Fragments without a header (continuation pages) reuse the column mapping
/// of the latest fragment from the same source file, or a positional mapping
/// when there is none.
pub fn align_fragments(
    fragments: &[Fragment],
    config: &EngineConfig,
    sim: &dyn Similarity,
    warnings: &mut Vec<ReconWarning>,
) -> Vec<AlignedFragment> {
    let mut aligned: Vec<AlignedFragment> = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        let previous = aligned
            .iter()
            .rev()
            .find(|candidate| candidate.fragment.source_file == fragment.source_file);

        let next = match config.alignment.header_mode {
            HeaderMode::HasHeader => align_fragment(fragment, config, sim, warnings),
            HeaderMode::NoHeader => inherit(fragment, previous, config, warnings),
            HeaderMode::AutoDetect => {
                let mut scratch = Vec::new();
                let attempt = align_fragment(fragment, config, sim, &mut scratch);
                let (has_header, confidence) = infer_has_header(&fragment.rows);

                if attempt.low_confidence && !has_header && previous.is_some() {
                    emit(
                        warnings,
                        ReconWarning::new(
                            WarningCode::ContinuationInherited,
                            "first row looks like data; reusing the previous fragment's columns",
                        )
                        .for_fragment(fragment)
                        .with_confidence(confidence),
                    );
                    inherit(fragment, previous, config, warnings)
                } else {
                    if attempt.low_confidence && confidence < HEADER_INFERENCE_FLOOR {
                        emit(
                            warnings,
                            ReconWarning::new(
                                WarningCode::HeaderInferenceLowConfidence,
                                "header inference confidence is low; keeping the header row",
                            )
                            .for_fragment(fragment)
                            .with_confidence(confidence),
                        );
                    }
                    warnings.extend(scratch);
                    attempt
                }
            }
        };
        aligned.push(next);
    }

    aligned
}
