use std::collections::BTreeSet;

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use crate::error::ReconError;
use crate::layout::{band_rows, cluster_columns, nearest_column, split_band_into_cells};
use crate::model::{Fragment, FragmentId, PageText, Row, TableRegion};
use crate::options::EngineConfig;
use crate::warning::{ReconWarning, WarningCode, emit};

/// Tokens may overhang the detected box slightly after OCR jitter.
const CLIP_MARGIN: f32 = 1.0;

/// A cell further than this many alignment tolerances from every column does
/// not belong to the table grid.
const STRAY_CELL_FACTOR: f32 = 3.0;

/// Clips `page` to `region` and lays its tokens out as rows of cells.
///
/// Columns are the left-edge clusters supported by at least two rows. Cells
/// that collide in one column are joined; a row holding a cell far from every
/// column keeps its place but is marked excluded and reported, so row numbers
/// always index the page's bands. Columns a row does not reach stay empty.
pub fn extract_fragment(
    region: &TableRegion,
    page: &PageText,
    source_file: &str,
    config: &EngineConfig,
    warnings: &mut Vec<ReconWarning>,
) -> Fragment {
    let id = FragmentId::from_region(source_file, region.page_id, region.region_id);
    let clip = region.bbox.expanded(CLIP_MARGIN);
    let tolerance = config.region.column_alignment_tolerance;

    let inside = page.tokens.iter().filter(|token| {
        let (x, y) = token.center();
        clip.contains_point(x, y)
    });
    let banded = band_rows(inside, config.region.row_height_tolerance)
        .iter()
        .map(|band| split_band_into_cells(band, config.region.min_column_gap))
        .collect::<Vec<_>>();

    let starts = banded
        .iter()
        .flat_map(|cells| cells.iter().map(|cell| cell.x0))
        .collect::<Vec<_>>();
    let mut columns = cluster_columns(&starts, tolerance);
    if banded.len() >= 2 && columns.iter().any(|column| column.support >= 2) {
        columns.retain(|column| column.support >= 2);
    }

    let mut rows = Vec::with_capacity(banded.len());
    let mut excluded_rows = BTreeSet::new();
    for (band_index, cells) in banded.iter().enumerate() {
        let mut row = Row::from_texts(std::iter::repeat_n(String::new(), columns.len()));
        let mut stray = None;

        for cell in cells {
            match nearest_column(&columns, cell.x0) {
                Some((column, distance)) if distance <= tolerance * STRAY_CELL_FACTOR => {
                    let slot = &mut row.cells[column].text;
                    if !slot.is_empty() {
                        slot.push(' ');
                    }
                    slot.push_str(&cell.text);
                }
                _ => {
                    stray.get_or_insert_with(|| cell.text.clone());
                }
            }
        }

        if let Some(text) = stray {
            excluded_rows.insert(band_index);
            emit(
                warnings,
                ReconWarning::new(
                    WarningCode::StructuralViolation,
                    format!("row does not fit the columns (stray cell '{text}'); excluded"),
                )
                .with_source_file(source_file)
                .with_page(region.page_id)
                .with_fragment(&id)
                .with_row(band_index),
            );
        }
        rows.push(row);
    }

    debug!(
        file = source_file,
        page = region.page_id,
        fragment = %id,
        rows = rows.len(),
        columns = columns.len(),
        "fragment extracted"
    );

    Fragment {
        id,
        source_file: source_file.to_string(),
        page_id: Some(region.page_id),
        region_id: Some(region.region_id),
        rows,
        excluded_rows,
    }
}

/// Wraps an already-tabulated grid, such as a manual transcription, as a
/// fragment. Column hints follow cell positions.
#[must_use]
pub fn fragment_from_grid(
    source_file: &str,
    ordinal: usize,
    page_id: Option<u32>,
    grid: &[Vec<String>],
) -> Fragment {
    Fragment {
        id: FragmentId::from_transcription(source_file, ordinal),
        source_file: source_file.to_string(),
        page_id,
        region_id: None,
        rows: grid
            .iter()
            .map(|cells| Row::from_texts(cells.iter().cloned()))
            .collect(),
        excluded_rows: BTreeSet::new(),
    }
}

/// Parses best-effort CSV text from a manual transcription into a fragment.
/// Rows may have differing widths; alignment decides what fits.
pub fn fragment_from_csv(
    source_file: &str,
    ordinal: usize,
    csv_text: &str,
    delimiter: u8,
) -> Result<Fragment, ReconError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(csv_text.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(fragment_from_grid(source_file, ordinal, None, &grid))
}
