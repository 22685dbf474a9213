pub mod aggregator;
pub mod converter;
pub mod header;
pub mod selection;
pub mod types;

pub use aggregator::aggregate;
pub use converter::{ConverterCache, ConverterKey, DayOffsetConverter};
pub use header::{default_columns, parse_columns, ColumnHeader, DEFAULT_COLUMNS};
pub use selection::{resolve, ResolvedSelection, SelectedItem};
pub use types::{
    merge_ranges, AgeRange, AgeSample, Report, ReportKind, ReportRow, RowId, NO_VALUE, TOTAL_LABEL,
};
