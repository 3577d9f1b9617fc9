use rusqlite::types::ValueRef;
use std::cmp::Ordering;

/// Significant digits kept when comparing non-integral reals.
pub const REAL_SIGNIFICANT_DIGITS: i32 = 12;

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A normalized result cell.
///
/// Integral reals fold into `Integer` so `1` and `1.0` compare equal, other
/// reals are rounded to [`REAL_SIGNIFICANT_DIGITS`]. Text and blobs compare
/// byte for byte and `Null` only equals `Null`.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    pub fn real(value: f64) -> Cell {
        if value.is_nan() {
            return Cell::Real(f64::NAN);
        }
        if !value.is_finite() {
            return Cell::Real(value);
        }
        let rounded = round_significant(value, REAL_SIGNIFICANT_DIGITS);
        if rounded.fract() == 0.0 && rounded.abs() < MAX_EXACT_INTEGER {
            Cell::Integer(rounded as i64)
        } else {
            Cell::Real(rounded)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Integer(_) => 1,
            Cell::Real(_) => 2,
            Cell::Text(_) => 3,
            Cell::Blob(_) => 4,
        }
    }
}

fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits - 1 - magnitude);
    let rounded = (value * scale).round() / scale;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(f) => Cell::real(f),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Integer(a), Cell::Integer(b)) => a.cmp(b),
            (Cell::Real(a), Cell::Real(b)) => a.total_cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Blob(a), Cell::Blob(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

pub type Row = Vec<Cell>;

/// All rows returned by one statement. Columns are positional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: usize,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: usize, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Multiset equality of rows: row order is ignored, column order is not.
    pub fn same_rows(&self, other: &ResultSet) -> bool {
        if self.rows.len() != other.rows.len() {
            return false;
        }
        let mut left: Vec<&Row> = self.rows.iter().collect();
        let mut right: Vec<&Row> = other.rows.iter().collect();
        left.sort();
        right.sort();
        left == right
    }

    /// Row-by-row equality in the order the statements produced them.
    pub fn same_sequence(&self, other: &ResultSet) -> bool {
        self.rows == other.rows
    }

    pub fn matches(&self, other: &ResultSet, order_sensitive: bool) -> bool {
        if order_sensitive {
            self.same_sequence(other)
        } else {
            self.same_rows(other)
        }
    }
}
