use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::schema::CanonicalSchema;

/// One OCR token with its top-left corner and extent in page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TextToken {
    #[must_use]
    pub fn new(content: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            content: content.into(),
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub(crate) fn is_usable(&self) -> bool {
        !self.content.trim().is_empty()
            && self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub page_id: u32,
    pub tokens: Vec<TextToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn of_token(token: &TextToken) -> Self {
        Self {
            x0: token.x,
            y0: token.y,
            x1: token.right(),
            y1: token.bottom(),
        }
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    #[must_use]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    #[must_use]
    pub fn expanded(self, margin: f32) -> Self {
        Self {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }
}

/// A hypothesized table location on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub page_id: u32,
    pub region_id: usize,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentId(String);

impl FragmentId {
    #[must_use]
    pub fn from_region(source_file: &str, page_id: u32, region_id: usize) -> Self {
        Self(format!("{source_file}:p{page_id}:r{region_id}"))
    }

    #[must_use]
    pub fn from_transcription(source_file: &str, ordinal: usize) -> Self {
        Self(format!("{source_file}:manual:{ordinal}"))
    }

    #[must_use]
    pub fn from_roster(source_file: &str, page_id: u32) -> Self {
        Self(format!("{source_file}:p{page_id}:roster"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FragmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub text: String,
    pub column_hint: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    /// Builds a row whose column hints are the cell positions.
    #[must_use]
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells = texts
            .into_iter()
            .enumerate()
            .map(|(column_hint, text)| Cell {
                text: text.into(),
                column_hint,
            })
            .collect();
        Self { cells }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn text(&self, column: usize) -> &str {
        self.cells.get(column).map_or("", |cell| cell.text.as_str())
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.text.trim().is_empty())
    }
}

/// Raw, unreconciled rows from one region or one manual transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub source_file: String,
    pub page_id: Option<u32>,
    pub region_id: Option<usize>,
    pub rows: Vec<Row>,
    /// Rows kept for numbering but unusable as data, e.g. rows that did not
    /// fit the extracted column grid.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_rows: BTreeSet<usize>,
}

impl Fragment {
    #[must_use]
    pub fn width(&self) -> usize {
        self.rows.iter().map(Row::width).max().unwrap_or(0)
    }
}

/// A fragment plus the decision of which canonical column each raw column feeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedFragment {
    pub fragment: Fragment,
    /// Indexed by raw column; `None` marks an unmapped column.
    pub column_map: Vec<Option<usize>>,
    /// Header row inside `fragment.rows`; rows up to and including it are not data.
    pub header_row: Option<usize>,
    /// Data rows excluded for structural reasons.
    pub excluded_rows: BTreeSet<usize>,
    pub coverage: f32,
    pub low_confidence: bool,
}

impl AlignedFragment {
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        let first = self.header_row.map_or(0, |header| header + 1);
        self.fragment
            .rows
            .iter()
            .enumerate()
            .skip(first)
            .filter(|(index, row)| !self.excluded_rows.contains(index) && !row.is_blank())
    }

    #[must_use]
    pub fn mapped_columns(&self) -> usize {
        self.column_map.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Points at one source row: `row_index` indexes `Fragment::rows`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub fragment: FragmentId,
    pub row_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRow {
    pub key: String,
    /// Canonical column index to resolved value; columns without contributors are absent.
    pub cells: BTreeMap<usize, String>,
    pub provenance: BTreeSet<RowRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub key: String,
    pub cells: Vec<String>,
    pub provenance: BTreeSet<RowRef>,
}

/// Terminal artifact handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledTable {
    pub schema: CanonicalSchema,
    pub rows: Vec<TableRow>,
}

impl ReconciledTable {
    #[must_use]
    pub fn headers(&self) -> Vec<String> {
        self.schema.names().map(str::to_string).collect()
    }

    /// Value of `column` (by schema name) in `row`, if both exist.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.schema.index_of(column)?;
        self.rows
            .get(row)
            .and_then(|row| row.cells.get(index))
            .map(String::as_str)
    }
}
