use tracing::debug;

use crate::layout::{Band, CellSpan, band_rows, split_band_into_cells};
use crate::model::{BoundingBox, PageText, TableRegion};
use crate::options::EngineConfig;
use crate::similarity::Similarity;
use crate::warning::{ReconWarning, WarningCode, emit};

/// Share of a row's cells that must land on known columns to continue a run.
const MIN_ROW_ALIGNMENT: f32 = 0.5;

struct ScannedBand<'a> {
    band: Band<'a>,
    cells: Vec<CellSpan>,
    anchor_score: f64,
}

struct ColumnAnchor {
    position: f32,
    hits: usize,
}

/// Consecutive bands whose cells keep landing on the same column positions.
struct AlignmentRun {
    bands: Vec<usize>,
    anchors: Vec<ColumnAnchor>,
}

impl AlignmentRun {
    fn start(index: usize, cells: &[CellSpan]) -> Self {
        Self {
            bands: vec![index],
            anchors: cells
                .iter()
                .map(|cell| ColumnAnchor {
                    position: cell.x0,
                    hits: 1,
                })
                .collect(),
        }
    }

    fn anchor_for(&self, x: f32, tolerance: f32) -> Option<usize> {
        self.anchors
            .iter()
            .position(|anchor| (anchor.position - x).abs() <= tolerance)
    }

    fn alignment(&self, cells: &[CellSpan], tolerance: f32) -> f32 {
        if cells.is_empty() {
            return 0.0;
        }
        let aligned = cells
            .iter()
            .filter(|cell| self.anchor_for(cell.x0, tolerance).is_some())
            .count();
        aligned as f32 / cells.len() as f32
    }

    fn extend(&mut self, index: usize, cells: &[CellSpan], tolerance: f32) {
        self.bands.push(index);
        for cell in cells {
            match self.anchor_for(cell.x0, tolerance) {
                Some(slot) => {
                    let anchor = &mut self.anchors[slot];
                    let n = anchor.hits as f32;
                    anchor.position = (anchor.position * n + cell.x0) / (n + 1.0);
                    anchor.hits += 1;
                }
                None => self.anchors.push(ColumnAnchor {
                    position: cell.x0,
                    hits: 1,
                }),
            }
        }
    }

    /// Fraction of the run's cells sitting on columns that recur in at least
    /// half of its rows; zero unless two such columns exist.
    fn stability(&self, scanned: &[ScannedBand<'_>], tolerance: f32) -> f32 {
        let needed = self.bands.len().div_ceil(2);
        let stable = self
            .anchors
            .iter()
            .filter(|anchor| anchor.hits >= needed)
            .map(|anchor| anchor.position)
            .collect::<Vec<_>>();
        if stable.len() < 2 {
            return 0.0;
        }

        let mut total = 0_usize;
        let mut aligned = 0_usize;
        for &index in &self.bands {
            for cell in &scanned[index].cells {
                total += 1;
                if stable.iter().any(|x| (x - cell.x0).abs() <= tolerance) {
                    aligned += 1;
                }
            }
        }

        if total == 0 {
            0.0
        } else {
            aligned as f32 / total as f32
        }
    }
}

struct Candidate {
    first: usize,
    last: usize,
    stability: f32,
}

fn anchor_score(
    band: &Band<'_>,
    cells: &[CellSpan],
    keywords: &[String],
    sim: &dyn Similarity,
) -> f64 {
    let line = band.text();
    keywords
        .iter()
        .flat_map(|keyword| {
            std::iter::once(sim.similarity(keyword, &line))
                .chain(cells.iter().map(|cell| sim.similarity(keyword, &cell.text)))
        })
        .fold(0.0, f64::max)
}

fn vertical_gap(above: &Band<'_>, below: &Band<'_>) -> f32 {
    (below.bbox.y0 - above.bbox.y1).max(0.0)
}

fn find_alignment_runs(scanned: &[ScannedBand<'_>], config: &EngineConfig) -> Vec<Candidate> {
    let tolerance = config.region.column_alignment_tolerance;
    let min_rows = config.thresholds.min_rows_per_region;
    let mut candidates = Vec::new();
    let mut run: Option<AlignmentRun> = None;

    let flush = |run: AlignmentRun, candidates: &mut Vec<Candidate>| {
        if run.bands.len() >= min_rows {
            let stability = run.stability(scanned, tolerance);
            if let (Some(&first), Some(&last)) = (run.bands.first(), run.bands.last()) {
                candidates.push(Candidate {
                    first,
                    last,
                    stability,
                });
            }
        }
    };

    for (index, current) in scanned.iter().enumerate() {
        let continues = run.as_ref().is_some_and(|active| {
            let previous = active.bands.last().map_or(index, |&last| last);
            let close = vertical_gap(&scanned[previous].band, &current.band)
                <= config.region.max_row_gap;
            let aligned = if current.cells.len() >= 2 {
                active.alignment(&current.cells, tolerance) >= MIN_ROW_ALIGNMENT
            } else {
                current
                    .cells
                    .first()
                    .is_some_and(|cell| active.anchor_for(cell.x0, tolerance).is_some())
            };
            close && aligned
        });

        if continues {
            if let Some(active) = run.as_mut() {
                active.extend(index, &current.cells, tolerance);
            }
            continue;
        }

        if let Some(finished) = run.take() {
            flush(finished, &mut candidates);
        }
        if current.cells.len() >= 2 {
            run = Some(AlignmentRun::start(index, &current.cells));
        }
    }

    if let Some(finished) = run.take() {
        flush(finished, &mut candidates);
    }
    candidates
}

/// Proposes table regions on one page.
///
/// A region is backed by recurring column positions across at least
/// `min_rows_per_region` consecutive rows, by a fuzzy anchor keyword hit, or
/// both. Its confidence weighs alignment stability against anchor strength;
/// candidates under `min_region_confidence` are dropped with a warning.
/// Malformed or empty pages yield no regions.
pub fn detect_regions(
    page: &PageText,
    config: &EngineConfig,
    sim: &dyn Similarity,
    warnings: &mut Vec<ReconWarning>,
) -> Vec<TableRegion> {
    let region = &config.region;
    let thresholds = &config.thresholds;

    let scanned = band_rows(&page.tokens, region.row_height_tolerance)
        .into_iter()
        .map(|band| {
            let cells = split_band_into_cells(&band, region.min_column_gap);
            let score = anchor_score(&band, &cells, &region.anchor_keywords, sim);
            ScannedBand {
                band,
                cells,
                anchor_score: score,
            }
        })
        .collect::<Vec<_>>();

    if scanned.is_empty() {
        debug!(page = page.page_id, "page has no usable tokens");
        return Vec::new();
    }

    let is_anchor = |index: usize| scanned[index].anchor_score >= thresholds.anchor_match;
    let mut covered = vec![false; scanned.len()];
    let mut candidates = find_alignment_runs(&scanned, config);

    for candidate in &mut candidates {
        if candidate.first > 0 {
            let header = candidate.first - 1;
            let close = vertical_gap(&scanned[header].band, &scanned[candidate.first].band)
                <= region.max_row_gap;
            if close && !covered[header] && is_anchor(header) {
                candidate.first = header;
            }
        }
        covered[candidate.first..=candidate.last].fill(true);
    }

    for start in 0..scanned.len() {
        if covered[start] || !is_anchor(start) {
            continue;
        }
        let mut last = start;
        while last + 1 < scanned.len()
            && !covered[last + 1]
            && vertical_gap(&scanned[last].band, &scanned[last + 1].band) <= region.max_row_gap
        {
            last += 1;
        }
        covered[start..=last].fill(true);
        if last > start {
            candidates.push(Candidate {
                first: start,
                last,
                stability: 0.0,
            });
        }
    }

    candidates.sort_by_key(|candidate| candidate.first);

    let mut regions = Vec::new();
    for candidate in candidates {
        let bands = &scanned[candidate.first..=candidate.last];
        let best_anchor = bands.iter().map(|band| band.anchor_score).fold(0.0, f64::max);
        let anchor_strength = if best_anchor >= thresholds.anchor_match {
            best_anchor as f32
        } else {
            0.0
        };
        let confidence = (region.alignment_weight * candidate.stability
            + region.anchor_weight * anchor_strength)
            .clamp(0.0, 1.0);

        let bbox = bands
            .iter()
            .map(|band| band.band.bbox)
            .reduce(BoundingBox::union)
            .unwrap_or(scanned[candidate.first].band.bbox);

        if confidence < thresholds.min_region_confidence {
            emit(
                warnings,
                ReconWarning::new(
                    WarningCode::LowRegionConfidence,
                    "candidate table region is below the confidence floor; skipped",
                )
                .with_page(page.page_id)
                .with_confidence(confidence),
            );
            continue;
        }

        debug!(
            page = page.page_id,
            rows = bands.len(),
            stability = candidate.stability,
            anchor = anchor_strength,
            confidence,
            "table region detected"
        );
        regions.push(TableRegion {
            page_id: page.page_id,
            region_id: regions.len(),
            bbox,
            confidence,
        });
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::detect_regions;
    use crate::model::{PageText, TextToken};
    use crate::options::EngineConfig;
    use crate::similarity::EditDistance;
    use crate::warning::WarningCode;

    fn token(text: &str, x: f32, y: f32) -> TextToken {
        TextToken::new(text, x, y, 6.0 * text.chars().count() as f32, 10.0)
    }

    fn grid_page(rows: &[&[&str]], columns: &[f32], top: f32) -> Vec<TextToken> {
        let mut tokens = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            let y = top + row_index as f32 * 16.0;
            for (cell, x) in row.iter().zip(columns) {
                tokens.push(token(cell, *x, y));
            }
        }
        tokens
    }

    #[test]
    fn detects_aligned_table() {
        let tokens = grid_page(
            &[
                &["Name", "District"],
                &["Smith", "12"],
                &["Jones", "7"],
                &["Brown", "3"],
            ],
            &[20.0, 200.0],
            100.0,
        );
        let page = PageText { page_id: 4, tokens };
        let mut warnings = Vec::new();
        let config = EngineConfig::default();
        let regions = detect_regions(&page, &config, &EditDistance, &mut warnings);

        assert_eq!(regions.len(), 1, "warnings: {warnings:?}");
        let region = &regions[0];
        assert_eq!(region.page_id, 4);
        assert!(region.confidence > 0.6, "confidence {}", region.confidence);
        assert!(region.bbox.y0 <= 100.0 && region.bbox.y1 >= 148.0);
    }

    #[test]
    fn prose_page_yields_no_region() {
        let tokens = vec![
            token("This", 20.0, 100.0),
            token("is", 48.0, 100.0),
            token("narrative", 64.0, 100.0),
            token("text", 20.0, 116.0),
            token("only.", 48.0, 116.0),
        ];
        let page = PageText { page_id: 1, tokens };
        let mut warnings = Vec::new();
        let config = EngineConfig::default();
        let regions = detect_regions(&page, &config, &EditDistance, &mut warnings);
        assert!(regions.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn empty_page_is_not_an_error() {
        let page = PageText {
            page_id: 1,
            tokens: Vec::new(),
        };
        let mut warnings = Vec::new();
        let config = EngineConfig::default();
        let regions = detect_regions(&page, &config, &EditDistance, &mut warnings);
        assert!(regions.is_empty());
    }

    #[test]
    fn anchor_keyword_confirms_unaligned_block() {
        let tokens = vec![
            token("Namentliche", 20.0, 50.0),
            token("Abstimung", 92.0, 50.0),
            token("Meyer", 20.0, 66.0),
            token("Schulze", 20.0, 82.0),
        ];
        let page = PageText { page_id: 2, tokens };
        let mut warnings = Vec::new();
        let config = EngineConfig::default();
        let regions = detect_regions(&page, &config, &EditDistance, &mut warnings);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].confidence >= 0.3);
    }

    #[test]
    fn weak_alignment_is_dropped_with_warning() {
        let mut config = EngineConfig::default();
        config.thresholds.min_region_confidence = 0.9;
        let tokens = grid_page(
            &[&["a1", "b1"], &["a2", "b2"], &["a3", "b3"]],
            &[20.0, 200.0],
            100.0,
        );
        let page = PageText { page_id: 9, tokens };
        let mut warnings = Vec::new();
        let regions = detect_regions(&page, &config, &EditDistance, &mut warnings);
        assert!(regions.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::LowRegionConfidence);
        assert_eq!(warnings[0].page, Some(9));
    }
}
