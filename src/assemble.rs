use std::cmp::Ordering;

use tracing::debug;

use crate::model::{ReconciledRow, ReconciledTable, TableRow};
use crate::options::EngineConfig;
use crate::schema::ColumnType;
use crate::similarity::normalize;
use crate::warning::{ReconWarning, WarningCode, emit};

/// Lays reconciled rows out as a full-width table over the configured schema.
///
/// Input order is kept unless `assembly.sort_by` names a column; sorting is
/// stable either way. Columns with no contributor become empty strings. A row
/// carrying a column outside the schema is excluded and reported.
pub fn assemble_table(
    rows: Vec<ReconciledRow>,
    config: &EngineConfig,
    warnings: &mut Vec<ReconWarning>,
) -> ReconciledTable {
    let schema = config.schema.clone();
    let width = schema.len();

    let mut table_rows = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(stray) = row.cells.keys().copied().find(|column| *column >= width) {
            let mut warning = ReconWarning::new(
                WarningCode::StructuralViolation,
                format!(
                    "row '{}' has column {stray} but the schema has {width}; excluded",
                    row.key
                ),
            )
            .with_column(stray);
            if let Some(first) = row.provenance.first() {
                warning = warning.with_fragment(&first.fragment).with_row(first.row_index);
            }
            emit(warnings, warning);
            continue;
        }

        let mut cells = vec![String::new(); width];
        for (column, value) in row.cells {
            cells[column] = value;
        }
        table_rows.push(TableRow {
            key: row.key,
            cells,
            provenance: row.provenance,
        });
    }

    let sort = config
        .assembly
        .sort_by
        .as_ref()
        .and_then(|key| schema.index_of(&key.column).map(|index| (index, key.descending)));
    if let Some((column, descending)) = sort {
        let numeric = schema
            .columns
            .get(column)
            .is_some_and(|def| def.kind == ColumnType::Numeric);
        table_rows.sort_by(|a, b| {
            compare_cells(&a.cells[column], &b.cells[column], numeric, descending)
        });
    }

    debug!(rows = table_rows.len(), columns = width, "table assembled");
    ReconciledTable {
        schema,
        rows: table_rows,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let compact = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect::<String>();
    compact.parse::<f64>().ok().filter(|number| number.is_finite())
}

/// Orders two sort-column cells; unparsable or empty values always sort last.
fn compare_cells(a: &str, b: &str, numeric: bool, descending: bool) -> Ordering {
    let directed = |ordering: Ordering| if descending { ordering.reverse() } else { ordering };

    if numeric {
        return match (parse_number(a), parse_number(b)) {
            (Some(x), Some(y)) => directed(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
    }

    let (a, b) = (normalize(a), normalize(b));
    match (a.is_empty(), b.is_empty()) {
        (false, false) => directed(a.cmp(&b)),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use pretty_assertions::assert_eq;

    use super::assemble_table;
    use crate::model::{FragmentId, ReconciledRow, RowRef};
    use crate::options::{EngineConfig, SortKey};
    use crate::warning::WarningCode;

    fn row(key: &str, cells: &[(usize, &str)]) -> ReconciledRow {
        ReconciledRow {
            key: key.to_string(),
            cells: cells
                .iter()
                .map(|(column, value)| (*column, (*value).to_string()))
                .collect::<BTreeMap<_, _>>(),
            provenance: BTreeSet::from([RowRef {
                fragment: FragmentId::from_transcription("t.csv", 0),
                row_index: 1,
            }]),
        }
    }

    #[test]
    fn fills_missing_columns_and_keeps_input_order() {
        let config = EngineConfig::default();
        let rows = vec![
            row("b", &[(0, "Bauer, Anna")]),
            row("a", &[(0, "Adler, Paul"), (3, "Ja")]),
        ];
        let mut warnings = Vec::new();
        let table = assemble_table(rows, &config, &mut warnings);

        assert!(warnings.is_empty());
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|row| row.cells.len() == config.schema.len()));
        assert_eq!(table.rows[0].cells, vec!["Bauer, Anna", "", "", ""]);
        assert_eq!(table.value(1, "Vote"), Some("Ja"));
    }

    #[test]
    fn excludes_row_outside_schema() {
        let config = EngineConfig::default();
        let rows = vec![row("ok", &[(0, "x")]), row("bad", &[(0, "y"), (9, "z")])];
        let mut warnings = Vec::new();
        let table = assemble_table(rows, &config, &mut warnings);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::StructuralViolation);
        assert_eq!(warnings[0].column, Some(9));
    }

    #[test]
    fn sorts_numeric_column_with_unparsable_last() {
        let mut config = EngineConfig::default();
        config.assembly.sort_by = Some(SortKey {
            column: "District".to_string(),
            descending: false,
        });
        let rows = vec![
            row("a", &[(1, "12")]),
            row("b", &[(1, "?")]),
            row("c", &[(1, "3")]),
            row("d", &[(0, "no district")]),
            row("e", &[(1, "12")]),
        ];
        let table = assemble_table(rows, &config, &mut Vec::new());
        let keys = table.rows.iter().map(|row| row.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["c", "a", "e", "b", "d"]);
    }

    #[test]
    fn sorts_text_descending_case_insensitively() {
        let mut config = EngineConfig::default();
        config.assembly.sort_by = Some(SortKey {
            column: "name".to_string(),
            descending: true,
        });
        let rows = vec![
            row("1", &[(0, "adler")]),
            row("2", &[(0, "Zeller")]),
            row("3", &[(0, "Bauer")]),
        ];
        let table = assemble_table(rows, &config, &mut Vec::new());
        let keys = table.rows.iter().map(|row| row.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["2", "3", "1"]);
    }
}
