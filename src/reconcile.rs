//! Cross-fragment row merging and per-column value consensus.
//!
//! Candidate pairs are rows from different fragments whose identity keys are
//! at least `identity_match` similar. Pairs are accepted best first, and two
//! entities only join when they share no fragment, so every entity holds at
//! most one row per fragment. Raising the threshold removes candidates from
//! the tail of the same ordering, which can only drop merges.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::model::{AlignedFragment, ReconciledRow, RowRef};
use crate::options::EngineConfig;
use crate::schema::{ColumnDef, ColumnType};
use crate::similarity::{Similarity, collapse_whitespace, normalize};
use crate::warning::{ReconWarning, WarningCode, emit};

const KEY_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReconcileStats {
    pub rows_in: usize,
    pub entities: usize,
    pub merges: usize,
    pub unmatched_rows: usize,
    pub empty_identity_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub rows: Vec<ReconciledRow>,
    pub stats: ReconcileStats,
}

/// One data row with its values already grouped by canonical column.
struct Contribution<'a> {
    source: &'a AlignedFragment,
    fragment_index: usize,
    row_ref: RowRef,
    values: BTreeMap<usize, Vec<String>>,
    key: String,
}

fn first_value(values: &BTreeMap<usize, Vec<String>>, column: usize) -> &str {
    values
        .get(&column)
        .and_then(|values| values.first())
        .map_or("", String::as_str)
}

struct Entities {
    parent: Vec<usize>,
    fragments: Vec<BTreeSet<usize>>,
}

impl Entities {
    fn new(fragment_of: impl Iterator<Item = usize>) -> Self {
        let fragments = fragment_of.map(|index| BTreeSet::from([index])).collect::<Vec<_>>();
        Self {
            parent: (0..fragments.len()).collect(),
            fragments,
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    /// Joins the entities of `a` and `b` unless they already share a fragment.
    /// The smaller index stays root so entities keep first-seen order.
    fn try_join(&mut self, a: usize, b: usize) -> bool {
        let (a, b) = (self.find(a), self.find(b));
        if a == b || !self.fragments[a].is_disjoint(&self.fragments[b]) {
            return false;
        }
        let (root, child) = if a < b { (a, b) } else { (b, a) };
        let absorbed = std::mem::take(&mut self.fragments[child]);
        self.fragments[root].extend(absorbed);
        self.parent[child] = root;
        true
    }
}

/// Merges same-entity rows of `aligned` and resolves each canonical column.
///
/// Entities are returned in the order their first row appears across the
/// input. Rows whose identity key is entirely empty never merge; rows with no
/// value in any mapped column contribute nothing and are skipped.
pub fn reconcile_rows(
    aligned: &[AlignedFragment],
    config: &EngineConfig,
    sim: &dyn Similarity,
    warnings: &mut Vec<ReconWarning>,
) -> Reconciliation {
    let identity = config
        .reconcile
        .identity_key
        .iter()
        .filter_map(|name| config.schema.index_of(name))
        .collect::<Vec<_>>();

    let contributions = collect_contributions(aligned, config, sim, &identity);
    let mut stats = ReconcileStats {
        rows_in: contributions.len(),
        ..ReconcileStats::default()
    };

    for contribution in contributions.iter().filter(|c| c.key.is_empty()) {
        stats.empty_identity_rows += 1;
        emit(
            warnings,
            ReconWarning::new(
                WarningCode::EmptyIdentityKey,
                "identity key is empty; row kept as its own entity",
            )
            .for_fragment(&contribution.source.fragment)
            .with_row(contribution.row_ref.row_index),
        );
    }

    let threshold = config.thresholds.identity_match;
    let mut candidates = Vec::new();
    for (i, left) in contributions.iter().enumerate() {
        if left.key.is_empty() {
            continue;
        }
        for (j, right) in contributions.iter().enumerate().skip(i + 1) {
            if right.key.is_empty() || right.fragment_index == left.fragment_index {
                continue;
            }
            let score = sim.similarity(&left.key, &right.key);
            if score >= threshold {
                candidates.push((score, i, j));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut entities = Entities::new(contributions.iter().map(|c| c.fragment_index));
    for (score, i, j) in candidates {
        if entities.try_join(i, j) {
            stats.merges += 1;
            debug!(
                left = %contributions[i].row_ref.fragment,
                right = %contributions[j].row_ref.fragment,
                score,
                "rows merged"
            );
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..contributions.len() {
        let root = entities.find(index);
        groups.entry(root).or_default().push(index);
    }

    let multi_fragment = aligned.len() > 1;
    let mut rows = Vec::with_capacity(groups.len());
    for members in groups.values() {
        if multi_fragment && members.len() == 1 {
            let lone = &contributions[members[0]];
            if !lone.key.is_empty() {
                stats.unmatched_rows += 1;
                emit(
                    warnings,
                    ReconWarning::new(
                        WarningCode::UnmatchedIdentity,
                        format!("'{}' matched no row in another fragment", lone.key),
                    )
                    .for_fragment(&lone.source.fragment)
                    .with_row(lone.row_ref.row_index),
                );
            }
        }
        rows.push(build_row(&contributions, members, &identity, sim));
    }

    stats.entities = rows.len();
    info!(
        rows_in = stats.rows_in,
        entities = stats.entities,
        merges = stats.merges,
        "rows reconciled"
    );

    Reconciliation { rows, stats }
}

fn collect_contributions<'a>(
    aligned: &'a [AlignedFragment],
    config: &EngineConfig,
    sim: &dyn Similarity,
    identity: &[usize],
) -> Vec<Contribution<'a>> {
    let mut contributions = Vec::new();

    for (fragment_index, source) in aligned.iter().enumerate() {
        for (row_index, row) in source.data_rows() {
            let mut values: BTreeMap<usize, Vec<String>> = BTreeMap::new();
            for (raw, slot) in source.column_map.iter().enumerate() {
                let Some(column) = *slot else { continue };
                let Some(def) = config.schema.columns.get(column) else {
                    continue;
                };
                let value =
                    prepare_value(row.text(raw), def, config.thresholds.category_match, sim);
                if !value.is_empty() {
                    values.entry(column).or_default().push(value);
                }
            }

            if values.is_empty() {
                debug!(
                    fragment = %source.fragment.id,
                    row = row_index,
                    "row has no mapped values; skipped"
                );
                continue;
            }
            let key = identity_key(identity, |column| first_value(&values, column));
            contributions.push(Contribution {
                source,
                fragment_index,
                row_ref: RowRef {
                    fragment: source.fragment.id.clone(),
                    row_index,
                },
                values,
                key,
            });
        }
    }

    contributions
}

/// Normalized identity values joined in key order; empty when every part is.
fn identity_key<'v>(identity: &[usize], value_of: impl Fn(usize) -> &'v str) -> String {
    let parts = identity
        .iter()
        .map(|&column| normalize(value_of(column)))
        .collect::<Vec<_>>();
    if parts.iter().all(String::is_empty) {
        String::new()
    } else {
        parts.join(KEY_SEPARATOR)
    }
}

fn build_row(
    contributions: &[Contribution<'_>],
    members: &[usize],
    identity: &[usize],
    sim: &dyn Similarity,
) -> ReconciledRow {
    let mut pooled: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut provenance = BTreeSet::new();

    for &member in members {
        let contribution = &contributions[member];
        provenance.insert(contribution.row_ref.clone());
        for (column, values) in &contribution.values {
            pooled.entry(*column).or_default().extend(values.iter().cloned());
        }
    }

    let cells = pooled
        .into_iter()
        .map(|(column, values)| (column, resolve_values(&values, sim)))
        .filter(|(_, value)| !value.is_empty())
        .collect::<BTreeMap<_, _>>();

    let key = identity_key(identity, |column| cells.get(&column).map_or("", String::as_str));
    let key = if key.is_empty() {
        let first = &contributions[members[0]].row_ref;
        format!("{}#{}", first.fragment, first.row_index)
    } else {
        key
    };

    ReconciledRow {
        key,
        cells,
        provenance,
    }
}

/// Picks the consensus among the non-empty `values`.
///
/// Values equal after normalization resolve to the first of them. Otherwise
/// the value with the largest summed similarity to the others wins; ties go
/// to the longer value, then the lexicographically first.
#[must_use]
pub fn resolve_values(values: &[String], sim: &dyn Similarity) -> String {
    let present = values
        .iter()
        .map(|value| collapse_whitespace(value))
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>();

    let Some(first) = present.first() else {
        return String::new();
    };
    let first_normalized = normalize(first);
    if present.iter().all(|value| normalize(value) == first_normalized) {
        return first.clone();
    }

    let mut best: Option<(f64, &String)> = None;
    for (i, candidate) in present.iter().enumerate() {
        let support = present
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| sim.similarity(candidate, other))
            .sum::<f64>();

        let better = match best {
            None => true,
            Some((best_support, current)) => {
                if (support - best_support).abs() > f64::EPSILON * 16.0 {
                    support > best_support
                } else {
                    let (len, best_len) = (candidate.chars().count(), current.chars().count());
                    len > best_len || (len == best_len && candidate < current)
                }
            }
        };
        if better {
            best = Some((support, candidate));
        }
    }

    best.map(|(_, value)| value.clone()).unwrap_or_default()
}

fn prepare_value(raw: &str, def: &ColumnDef, category_match: f64, sim: &dyn Similarity) -> String {
    let value = collapse_whitespace(raw);
    if value.is_empty() {
        return value;
    }
    match def.kind {
        ColumnType::Text => value,
        ColumnType::Numeric => repair_numeric(&value).unwrap_or(value),
        ColumnType::Categorical => {
            snap_category(&value, &def.categories, category_match, sim).unwrap_or(value)
        }
    }
}

/// Undoes the usual OCR letter-for-digit swaps when that leaves a number.
fn repair_numeric(value: &str) -> Option<String> {
    let repaired = value
        .chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'l' | 'I' | '|' => '1',
            other => other,
        })
        .collect::<String>();

    let numeric = repaired.chars().any(|c| c.is_ascii_digit())
        && repaired
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'));
    (numeric && repaired != value).then_some(repaired)
}

fn snap_category(
    value: &str,
    categories: &[String],
    threshold: f64,
    sim: &dyn Similarity,
) -> Option<String> {
    let mut best: Option<(f64, &String)> = None;
    for category in categories {
        let score = sim.similarity(value, category);
        if best.is_none_or(|(best_score, _)| score > best_score) {
            best = Some((score, category));
        }
    }
    best.filter(|(score, _)| *score >= threshold)
        .map(|(_, category)| category.clone())
}
