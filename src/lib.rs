//! Reconstructs roll-call vote tables from OCR'd parliamentary records.
//!
//! Pages of positioned tokens go through region detection, fragment
//! extraction, header alignment against a canonical schema, cross-fragment
//! row reconciliation and table assembly. Manual transcriptions and member
//! rosters enter as ready-made fragments. Per-row problems surface as
//! [`ReconWarning`]s on the table's [`TableReport`]; only configuration
//! errors and deadlines fail a table.

mod align;
mod assemble;
mod batch;
mod csv_out;
mod error;
mod fragment;
mod layout;
mod model;
mod options;
mod reconcile;
mod rollcall;
mod schema;
mod similarity;
mod table_detect;
mod warning;

pub use align::{align_fragment, align_fragments, infer_has_header};
pub use assemble::assemble_table;
pub use batch::{Engine, SourcePage, TableInput, TableJob, TableOutcome, TableReport};
pub use csv_out::write_table_csv_to_string;
pub use error::ReconError;
pub use fragment::{extract_fragment, fragment_from_csv, fragment_from_grid};
pub use layout::page_lines;
pub use model::{
    AlignedFragment, BoundingBox, Cell, Fragment, FragmentId, PageText, ReconciledRow,
    ReconciledTable, Row, RowRef, TableRegion, TableRow, TextToken,
};
pub use options::{
    AlignmentOptions, AssemblyOptions, EngineConfig, HeaderMode, ReconcileOptions, RegionOptions,
    RollCallOptions, SortKey, Thresholds,
};
pub use reconcile::{ReconcileStats, Reconciliation, reconcile_rows, resolve_values};
pub use rollcall::{
    ROSTER_HEADER, RollCallHeading, SittingDate, find_roll_calls, parse_member_roster,
    parse_sitting_date,
};
pub use schema::{CanonicalSchema, ColumnDef, ColumnType};
pub use similarity::{
    EditDistance, JaroWinkler, Similarity, SimilarityKind, TokenSet, collapse_whitespace,
    normalize,
};
pub use table_detect::detect_regions;
pub use warning::{ReconWarning, WarningCategory, WarningCode};
