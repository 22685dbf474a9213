use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static RE_BELOW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.\.(-?\d+)$").unwrap());
static RE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+)\.\.(-?\d+)$").unwrap());
static RE_FROM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(-?\d+)\.\.$").unwrap());
static RE_SINGLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(-?\d+)$").unwrap());

/// Column spec used when a report request names none.
pub const DEFAULT_COLUMNS: &str = "..-10,-10..-5,-5..-2,-2,-1,0,1,2..5,5..10,10..";

/// One report column: the half-open age interval `[lower_limit, upper_limit)`.
///
/// `i32::MIN` as lower limit and `i32::MAX` as upper limit mean "unbounded".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub lower_limit: i32,
    pub upper_limit: i32,
    pub display_name: String,
}

impl ColumnHeader {
    pub fn new(lower_limit: i32, upper_limit: i32) -> Self {
        let display_name = display_for(lower_limit, upper_limit);
        Self {
            lower_limit,
            upper_limit,
            display_name,
        }
    }

    /// `[MIN, upper)`: catches everything below `upper`.
    pub fn below(upper_limit: i32) -> Self {
        Self::new(i32::MIN, upper_limit)
    }

    /// `[lower, MAX)`: catches everything from `lower` on.
    pub fn at_least(lower_limit: i32) -> Self {
        Self::new(lower_limit, i32::MAX)
    }

    /// `[day, day + 1)`
    pub fn single(day: i32) -> Self {
        Self::new(day, day.saturating_add(1))
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn is_unbounded_below(&self) -> bool {
        self.lower_limit == i32::MIN
    }

    pub fn is_unbounded_above(&self) -> bool {
        self.upper_limit == i32::MAX
    }

    /// Lower bound, `None` when unbounded.
    pub fn lower(&self) -> Option<i32> {
        (!self.is_unbounded_below()).then_some(self.lower_limit)
    }

    /// Exclusive upper bound, `None` when unbounded.
    pub fn upper(&self) -> Option<i32> {
        (!self.is_unbounded_above()).then_some(self.upper_limit)
    }

    /// Whether `age` falls into this column.
    pub fn fits(&self, age: i32) -> bool {
        self.lower().map_or(true, |lo| age >= lo) && self.upper().map_or(true, |hi| age < hi)
    }

    fn validate(&self) -> Result<()> {
        if self.lower_limit >= self.upper_limit {
            return Err(Error::invalid(format!(
                "column header '{}' has lower limit {} >= upper limit {}",
                self.display_name, self.lower_limit, self.upper_limit
            )));
        }
        Ok(())
    }
}

fn display_for(lower: i32, upper: i32) -> String {
    match (lower, upper) {
        (i32::MIN, i32::MAX) => "..".to_string(),
        (i32::MIN, hi) => format!("..{hi}"),
        (lo, i32::MAX) => format!("{lo}.."),
        (lo, hi) if hi == lo.saturating_add(1) => format!("{lo}"),
        (lo, hi) => format!("{lo}..{hi}"),
    }
}

/// Check that a header list is present and every interval is non-empty.
pub fn validate_headers(headers: &[ColumnHeader]) -> Result<()> {
    if headers.is_empty() {
        return Err(Error::invalid("column headers must not be empty"));
    }
    headers.iter().try_for_each(ColumnHeader::validate)
}

/// Parse a comma-separated column spec.
///
/// Tokens:
/// - `..N`: everything below `N`
/// - `A..B`: `[A, B)`
/// - `A..`: `A` and above
/// - `N`: exactly `N`
///
/// Each token doubles as the column's display name.
pub fn parse_columns(spec: &str) -> Result<Vec<ColumnHeader>> {
    let headers = spec
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(parse_column)
        .collect::<Result<Vec<_>>>()?;
    validate_headers(&headers)?;
    Ok(headers)
}

fn parse_column(token: &str) -> Result<ColumnHeader> {
    let num = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| Error::invalid(format!("column limit out of range: {s}")))
    };

    let header = if let Some(caps) = RE_BELOW.captures(token) {
        ColumnHeader::below(num(&caps[1])?)
    } else if let Some(caps) = RE_RANGE.captures(token) {
        ColumnHeader::new(num(&caps[1])?, num(&caps[2])?)
    } else if let Some(caps) = RE_FROM.captures(token) {
        ColumnHeader::at_least(num(&caps[1])?)
    } else if let Some(caps) = RE_SINGLE.captures(token) {
        ColumnHeader::single(num(&caps[1])?)
    } else {
        return Err(Error::invalid(format!("unrecognized column: {token}")));
    };
    Ok(header.with_display_name(token))
}

/// The built-in column set.
pub fn default_columns() -> Vec<ColumnHeader> {
    parse_columns(DEFAULT_COLUMNS).unwrap_or_default()
}
