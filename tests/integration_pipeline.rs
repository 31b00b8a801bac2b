mod common;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rollcall_recon::{
    Engine, EngineConfig, FragmentId, RowRef, TableInput, TableJob, WarningCode, fragment_from_csv,
    fragment_from_grid, parse_member_roster, write_table_csv_to_string,
};

use common::{grid, grid_tokens, init_tracing, line_tokens, source_page};

const COLUMNS: [f32; 4] = [20.0, 200.0, 300.0, 400.0];

fn vote_job() -> TableJob {
    let mut first_page = line_tokens(
        &[
            "Namentliche Abstimmung",
            "in der 12. Sitzung am Freitag den 3. März 1950",
            "über den Antrag betreffend Wohnungsbau",
        ],
        20.0,
        20.0,
    );
    first_page.extend(grid_tokens(
        &[
            &["Name", "Wahlkreis", "Partei", "Abstimmung"],
            &["Smith, John", "12", "CDU", "Ja"],
            &["Bauer, Anna", "3", "SPD", "Nein"],
            &["Klein, Otto", "l5", "FDP", "Ja"],
        ],
        &COLUMNS,
        200.0,
    ));
    let second_page = grid_tokens(
        &[
            &["Weber, Hans", "7", "SPD", "Ja"],
            &["Zimmer, Eva", "4", "CDU", "Neln"],
            &["Adler, Paul", "9", "CDU", "Enthalten"],
        ],
        &COLUMNS,
        100.0,
    );
    let transcription = fragment_from_csv(
        "bt-1950-manual.csv",
        0,
        "Nam,Wahlkrs,Parte,Abstimung\n\"Smith, Jon\",12,CDU,Ja\n\"Zimmer, Eva\",4,CDU,Nein\n",
        b',',
    )
    .expect("transcription should parse");

    TableJob::new(
        "vote-1950-03-03",
        TableInput {
            pages: vec![
                source_page("bt-1950.pdf", 1, first_page),
                source_page("bt-1950.pdf", 2, second_page),
            ],
            fragments: vec![transcription],
        },
    )
}

#[test]
fn reconciles_vote_table_across_pages_and_transcription() {
    init_tracing();
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let report = engine.run_table(&vote_job()).expect("table should reconcile");

    let rows = report
        .table
        .rows
        .iter()
        .map(|row| row.cells.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        rows,
        vec![
            vec!["Smith, John", "12", "CDU", "Ja"],
            vec!["Bauer, Anna", "3", "SPD", "Nein"],
            vec!["Klein, Otto", "15", "FDP", "Ja"],
            vec!["Weber, Hans", "7", "SPD", "Ja"],
            vec!["Zimmer, Eva", "4", "CDU", "Nein"],
            vec!["Adler, Paul", "9", "CDU", "Enthalten"],
        ]
    );
    assert_eq!(report.stats.merges, 2);
    assert_eq!(report.stats.entities, 6);

    assert_eq!(
        report.table.rows[0].provenance,
        BTreeSet::from([
            RowRef {
                fragment: FragmentId::from_transcription("bt-1950-manual.csv", 0),
                row_index: 1,
            },
            RowRef {
                fragment: FragmentId::from_region("bt-1950.pdf", 1, 1),
                row_index: 1,
            },
        ])
    );
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.code == WarningCode::ContinuationInherited && w.page == Some(2)),
        "{:?}",
        report.warnings
    );

    assert_eq!(report.headings.len(), 1);
    let heading = &report.headings[0];
    assert_eq!(heading.topic, "über den Antrag betreffend Wohnungsbau");
    assert_eq!(
        heading.sitting.as_ref().and_then(|sitting| sitting.date),
        NaiveDate::from_ymd_opt(1950, 3, 3)
    );
}

#[test]
fn provenance_resolves_against_reported_fragments() {
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let report = engine.run_table(&vote_job()).expect("table should reconcile");

    assert_eq!(report.fragments.len(), 4);
    for row in &report.table.rows {
        for entry in &row.provenance {
            let source = report
                .fragments
                .iter()
                .find(|fragment| fragment.id == entry.fragment)
                .expect("provenance names a reported fragment");
            let cited = source
                .rows
                .get(entry.row_index)
                .expect("provenance row exists in its fragment");
            assert!(!cited.is_blank());
            assert!(!source.excluded_rows.contains(&entry.row_index));
        }
    }

    let klein = &report.table.rows[2];
    let page_row = klein
        .provenance
        .iter()
        .find(|entry| entry.fragment == FragmentId::from_region("bt-1950.pdf", 1, 1))
        .expect("Klein comes from the first page");
    let fragment = report
        .fragments
        .iter()
        .find(|fragment| fragment.id == page_row.fragment)
        .expect("page fragment is reported");
    assert_eq!(fragment.rows[page_row.row_index].text(0), "Klein, Otto");
}

#[test]
fn exports_reconciled_table_as_csv_and_json() {
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let report = engine.run_table(&vote_job()).expect("table should reconcile");

    let csv = write_table_csv_to_string(&report.table, b',').expect("csv should render");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Name,District,Party,Vote"));
    assert_eq!(lines.next(), Some("\"Smith, John\",12,CDU,Ja"));
    assert_eq!(csv.lines().count(), 7);

    let json = report.to_json().expect("report should serialize");
    assert!(json.contains("\"vote-1950-03-03\""));
    assert!(json.contains("\"1950-03-03\""));
    assert!(json.contains("\"continuation_inherited\""));
}

#[test]
fn merges_noisy_headers_into_one_member() {
    let config = EngineConfig::from_toml(
        r#"
[[schema]]
name = "Name"

[[schema]]
name = "District"
type = "numeric"

[alignment]
header_mode = "has_header"
"#,
    )
    .expect("config should parse");
    let engine = Engine::new(config).expect("config is valid");

    let noisy = grid(&[&["Nam", "Distrct"], &["Jon Smith", "12"]]);
    let clean = grid(&[&["Name", "District"], &["John Smith", "12"]]);
    let first = fragment_from_grid("a.csv", 0, None, &noisy);
    let second = fragment_from_grid("b.csv", 0, None, &clean);
    let job = TableJob::new(
        "scenario",
        TableInput {
            pages: Vec::new(),
            fragments: vec![first.clone(), second.clone()],
        },
    );
    let report = engine.run_table(&job).expect("table should reconcile");

    assert_eq!(report.table.rows.len(), 1);
    assert_eq!(report.table.value(0, "Name"), Some("John Smith"));
    assert_eq!(report.table.value(0, "District"), Some("12"));

    let provenance = &report.table.rows[0].provenance;
    assert_eq!(provenance.len(), 2);
    for entry in provenance {
        let source = [&first, &second]
            .into_iter()
            .find(|fragment| fragment.id == entry.fragment)
            .expect("provenance names an input fragment");
        assert!(entry.row_index < source.rows.len());
    }
}

#[test]
fn unmapped_column_contributes_nothing() {
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let job = TableJob::new(
        "unmapped",
        TableInput {
            pages: Vec::new(),
            fragments: vec![fragment_from_grid(
                "x.csv",
                0,
                None,
                &grid(&[&["Name", "XYZ123"], &["Smith, John", "junk"]]),
            )],
        },
    );
    let report = engine.run_table(&job).expect("table should reconcile");

    assert_eq!(report.table.rows.len(), 1);
    assert_eq!(report.table.rows[0].cells, vec!["Smith, John", "", "", ""]);
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.code == WarningCode::UnmappedColumn && w.column == Some(1))
    );
}

#[test]
fn prose_page_yields_no_regions_and_no_error() {
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let page = line_tokens(
        &[
            "Der Bundestag wolle beschließen,",
            "die Bundesregierung zu ersuchen,",
            "einen Bericht vorzulegen.",
        ],
        20.0,
        100.0,
    );
    let job = TableJob::new(
        "prose",
        TableInput {
            pages: vec![source_page("prose.pdf", 1, page)],
            fragments: Vec::new(),
        },
    );
    let report = engine.run_table(&job).expect("prose is not an error");

    assert_eq!(report.region_count, 0);
    assert!(report.table.rows.is_empty());
    assert!(report.warnings.iter().any(|w| w.code == WarningCode::NoRegionsDetected));
    assert!(!report.warnings.iter().any(|w| w.code == WarningCode::LowRegionConfidence));
}

#[test]
fn rows_without_identity_remain_distinct() {
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let blank = grid(&[&["Name", "District", "Party"], &["", "", "SPD"]]);
    let job = TableJob::new(
        "blank-identity",
        TableInput {
            pages: Vec::new(),
            fragments: vec![
                fragment_from_grid("a.csv", 0, None, &blank),
                fragment_from_grid("b.csv", 0, None, &blank),
            ],
        },
    );
    let report = engine.run_table(&job).expect("table should reconcile");

    assert_eq!(report.table.rows.len(), 2);
    assert_eq!(report.stats.merges, 0);
    assert!(report.table.rows.iter().all(|row| row.cells[2] == "SPD"));
    assert_eq!(
        report
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::EmptyIdentityKey)
            .count(),
        2
    );
}

#[test]
fn roster_supplies_party_for_vote_rows() {
    let engine = Engine::new(EngineConfig::default()).expect("default config is valid");
    let mut warnings = Vec::new();
    let roster = parse_member_roster(
        "Adenauer, Dr. Konrad; Bundeskanzler, Wahlkr. 9 (Bonn) — CDU.\n\
         Ollenhauer, Erich; Parteivorsitzender, Wahlkr. 17 (Hannover) — SPD.\n",
        "names.pdf",
        3,
        &mut warnings,
    );
    assert!(warnings.is_empty(), "{warnings:?}");

    let votes = fragment_from_grid(
        "votes.csv",
        0,
        None,
        &grid(&[
            &["Name", "Wahlkreis", "Abstimmung"],
            &["Adenauer, Dr. Konrad", "9", "Ja"],
            &["Ollenhauer, Erich", "17", "Nein"],
        ]),
    );
    let job = TableJob::new(
        "with-roster",
        TableInput {
            pages: Vec::new(),
            fragments: vec![roster, votes],
        },
    );
    let report = engine.run_table(&job).expect("table should reconcile");

    let rows = report
        .table
        .rows
        .iter()
        .map(|row| row.cells.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        rows,
        vec![
            vec!["Adenauer, Dr. Konrad", "9", "CDU", "Ja"],
            vec!["Ollenhauer, Erich", "17", "SPD", "Nein"],
        ]
    );
}
