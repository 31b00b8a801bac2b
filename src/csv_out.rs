use csv::WriterBuilder;

use crate::error::ReconError;
use crate::model::ReconciledTable;

/// Renders `table` as delimited text: schema names first, then one record per row.
pub fn write_table_csv_to_string(
    table: &ReconciledTable,
    delimiter: u8,
) -> Result<String, ReconError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::<u8>::new());
    writer.write_record(table.headers())?;
    for row in &table.rows {
        writer.write_record(&row.cells)?;
    }
    writer.flush().map_err(csv::Error::from)?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ReconError::Csv(error.into_error().into()))?;
    String::from_utf8(bytes)
        .map_err(|error| ReconError::Export(format!("invalid utf-8 csv output: {error}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::write_table_csv_to_string;
    use crate::model::{ReconciledTable, TableRow};
    use crate::schema::CanonicalSchema;

    #[test]
    fn writes_schema_header_and_quotes_names_with_commas() {
        let table = ReconciledTable {
            schema: CanonicalSchema::roll_call(),
            rows: vec![TableRow {
                key: "smith, john | 12".to_string(),
                cells: vec![
                    "Smith, John".to_string(),
                    "12".to_string(),
                    String::new(),
                    "Ja".to_string(),
                ],
                provenance: BTreeSet::new(),
            }],
        };

        let csv = write_table_csv_to_string(&table, b',').expect("csv should render");
        assert_eq!(csv, "Name,District,Party,Vote\n\"Smith, John\",12,,Ja\n");

        let tsv = write_table_csv_to_string(&table, b'\t').expect("tsv should render");
        assert!(tsv.starts_with("Name\tDistrict\tParty\tVote\n"));
    }
}
