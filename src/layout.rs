//! Row banding and column clustering over positioned tokens.
//!
//! Region detection and fragment extraction both see a page through these
//! helpers, so a region's rows and columns are recovered the same way it was
//! found.

use std::cmp::Ordering;

use crate::model::{BoundingBox, PageText, TextToken};

/// Tokens sharing one horizontal line, ordered left to right.
#[derive(Debug, Clone)]
pub(crate) struct Band<'a> {
    pub tokens: Vec<&'a TextToken>,
    pub bbox: BoundingBox,
}

impl Band<'_> {
    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|token| token.content.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A run of horizontally adjacent tokens that reads as one cell.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CellSpan {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnCluster {
    pub position: f32,
    pub support: usize,
}

fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Groups tokens into rows: a token joins the current band while its vertical
/// center stays within `tolerance` of the band's first token.
pub(crate) fn band_rows<'a, I>(tokens: I, tolerance: f32) -> Vec<Band<'a>>
where
    I: IntoIterator<Item = &'a TextToken>,
{
    let mut sorted = tokens
        .into_iter()
        .filter(|token| token.is_usable())
        .collect::<Vec<_>>();
    sorted.sort_by(|a, b| cmp_f32(a.center().1, b.center().1).then(cmp_f32(a.x, b.x)));

    let mut bands: Vec<Band<'a>> = Vec::new();
    let mut anchor_y: Option<f32> = None;

    for token in sorted {
        let y = token.center().1;
        match (anchor_y, bands.last_mut()) {
            (Some(anchor), Some(band)) if (y - anchor).abs() <= tolerance => {
                band.bbox = band.bbox.union(BoundingBox::of_token(token));
                band.tokens.push(token);
            }
            _ => {
                bands.push(Band {
                    tokens: vec![token],
                    bbox: BoundingBox::of_token(token),
                });
                anchor_y = Some(y);
            }
        }
    }

    for band in &mut bands {
        band.tokens.sort_by(|a, b| cmp_f32(a.x, b.x));
    }
    bands
}

/// Splits a band wherever the horizontal gap between tokens reaches `min_gap`.
pub(crate) fn split_band_into_cells(band: &Band<'_>, min_gap: f32) -> Vec<CellSpan> {
    let mut cells: Vec<CellSpan> = Vec::new();

    for token in &band.tokens {
        let text = token.content.trim();
        match cells.last_mut() {
            Some(cell) if token.x - cell.x1 < min_gap => {
                cell.text.push(' ');
                cell.text.push_str(text);
                cell.x1 = cell.x1.max(token.right());
            }
            _ => cells.push(CellSpan {
                text: text.to_string(),
                x0: token.x,
                x1: token.right(),
            }),
        }
    }

    cells
}

/// Clusters left edges: sorted positions join a cluster while within
/// `tolerance` of its running mean.
pub(crate) fn cluster_columns(starts: &[f32], tolerance: f32) -> Vec<ColumnCluster> {
    let mut sorted = starts
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .collect::<Vec<_>>();
    sorted.sort_by(|a, b| cmp_f32(*a, *b));

    let mut clusters: Vec<ColumnCluster> = Vec::new();
    for x in sorted {
        match clusters.last_mut() {
            Some(cluster) if (x - cluster.position).abs() <= tolerance => {
                let n = cluster.support as f32;
                cluster.position = (cluster.position * n + x) / (n + 1.0);
                cluster.support += 1;
            }
            _ => clusters.push(ColumnCluster {
                position: x,
                support: 1,
            }),
        }
    }

    clusters
}

/// Index and distance of the cluster nearest to `x`.
pub(crate) fn nearest_column(clusters: &[ColumnCluster], x: f32) -> Option<(usize, f32)> {
    clusters
        .iter()
        .enumerate()
        .map(|(index, cluster)| (index, (cluster.position - x).abs()))
        .min_by(|a, b| cmp_f32(a.1, b.1))
}

/// Reading-order text lines of a page.
#[must_use]
pub fn page_lines(page: &PageText, row_height_tolerance: f32) -> Vec<String> {
    band_rows(&page.tokens, row_height_tolerance)
        .iter()
        .map(Band::text)
        .collect()
}
