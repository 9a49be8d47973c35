use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Row labels a layout may draw from. A layout with `rows = n` uses the first `n`.
const ROW_LABELS: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M',
    'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

pub const DEFAULT_ROWS: u8 = 7;
pub const DEFAULT_COLUMNS: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatParseError {
    #[error("Seat identifier is empty")]
    Empty,

    #[error("Invalid seat row in '{0}'")]
    InvalidRow(String),

    #[error("Invalid seat column in '{0}'")]
    InvalidColumn(String),

    #[error("Seat {seat} is outside the {rows}x{columns} grid")]
    OutOfGrid {
        seat: String,
        rows: u8,
        columns: u8,
    },

    #[error("Invalid layout: {rows} rows x {columns} columns")]
    InvalidLayout {
        rows: u8,
        columns: u8,
    },
}

/// One bookable seat: a zero-based row index and a column number.
///
/// Ordering is row-major, so the smallest seat of a set is the one a reader
/// meets first on the hall plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeatId {
    row: u8,
    column: u8,
}

impl SeatId {
    /// Builds a seat from raw indices. Bounds are checked by [`SeatLayout`].
    pub fn new(row: u8, column: u8) -> Self {
        Self { row, column }
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn column(&self) -> u8 {
        self.column
    }

    pub fn row_label(&self) -> Option<char> {
        ROW_LABELS.get(self.row as usize).copied()
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_label() {
            Some(label) => write!(f, "{}{}", label, self.column),
            None => write!(f, "#{}-{}", self.row, self.column),
        }
    }
}

/// Syntactic parse only: `<letter><number>`. Use [`SeatLayout::check`] to
/// also reject seats outside the hall.
impl FromStr for SeatId {
    type Err = SeatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let first = chars.next().ok_or(SeatParseError::Empty)?;

        let label = first.to_ascii_uppercase();
        let row = ROW_LABELS
            .iter()
            .position(|l| *l == label)
            .ok_or_else(|| SeatParseError::InvalidRow(trimmed.to_string()))?;

        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(SeatParseError::InvalidColumn(trimmed.to_string()));
        }
        let column: u8 = digits
            .parse()
            .map_err(|_| SeatParseError::InvalidColumn(trimmed.to_string()))?;

        Ok(Self::new(row as u8, column))
    }
}

impl Serialize for SeatId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fixed seat grid of a hall. Every show shares the venue's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatLayout {
    rows: u8,
    columns: u8,
}

impl SeatLayout {
    pub fn new(rows: u8, columns: u8) -> Result<Self, SeatParseError> {
        if rows == 0 || rows as usize > ROW_LABELS.len() || columns == 0 {
            return Err(SeatParseError::InvalidLayout { rows, columns });
        }
        Ok(Self { rows, columns })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn columns(&self) -> u8 {
        self.columns
    }

    pub fn row_labels(&self) -> &'static [char] {
        &ROW_LABELS[..self.rows as usize]
    }

    pub fn contains(&self, seat: SeatId) -> bool {
        seat.row < self.rows && seat.column < self.columns
    }

    pub fn check(&self, seat: SeatId) -> Result<SeatId, SeatParseError> {
        if self.contains(seat) {
            Ok(seat)
        } else {
            Err(SeatParseError::OutOfGrid {
                seat: seat.to_string(),
                rows: self.rows,
                columns: self.columns,
            })
        }
    }
}

impl Default for SeatLayout {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
        }
    }
}

/// Renders a seat set the way it is stored: `"A1,A2"`.
pub fn join_seats(seats: &BTreeSet<SeatId>) -> String {
    seats
        .iter()
        .map(|seat| seat.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_within_default_grid() {
        let layout = SeatLayout::default();

        assert_eq!(layout.check("A1".parse().unwrap()).unwrap(), SeatId::new(0, 1));
        assert_eq!(layout.check("g9".parse().unwrap()).unwrap(), SeatId::new(6, 9));
        assert_eq!(layout.check(" C0 ".parse().unwrap()).unwrap(), SeatId::new(2, 0));
    }

    #[test]
    fn test_out_of_grid_is_rejected() {
        let layout = SeatLayout::default();

        assert!(matches!(layout.check("H1".parse().unwrap()), Err(SeatParseError::OutOfGrid { .. })));
        assert!(matches!(layout.check("A10".parse().unwrap()), Err(SeatParseError::OutOfGrid { .. })));
    }

    #[test]
    fn test_malformed_identifiers() {
        assert_eq!("".parse::<SeatId>(), Err(SeatParseError::Empty));
        assert!(matches!("11".parse::<SeatId>(), Err(SeatParseError::InvalidRow(_))));
        assert!(matches!("A".parse::<SeatId>(), Err(SeatParseError::InvalidColumn(_))));
        assert!(matches!("A-1".parse::<SeatId>(), Err(SeatParseError::InvalidColumn(_))));
        assert!(matches!("A999".parse::<SeatId>(), Err(SeatParseError::InvalidColumn(_))));
    }

    #[test]
    fn test_join_seats_in_row_major_order() {
        let seats: BTreeSet<SeatId> = ["B0", "A2", "A1"].iter().map(|s| s.parse().unwrap()).collect();
        assert_eq!(join_seats(&seats), "A1,A2,B0");
    }

    #[test]
    fn test_row_major_ordering() {
        let a9: SeatId = "A9".parse().unwrap();
        let b0: SeatId = "B0".parse().unwrap();
        assert!(a9 < b0);
    }

    #[test]
    fn test_layout_bounds() {
        assert!(SeatLayout::new(0, 10).is_err());
        assert!(SeatLayout::new(27, 10).is_err());
        let widest = SeatLayout::new(26, 40).unwrap();
        assert!(widest.contains(SeatId::new(25, 39)));
        assert!(!widest.contains(SeatId::new(25, 40)));
    }

    #[test]
    fn test_serde_uses_label() {
        let seat = SeatId::new(1, 3);
        assert_eq!(serde_json::to_string(&seat).unwrap(), "\"B3\"");
        let back: SeatId = serde_json::from_str("\"B3\"").unwrap();
        assert_eq!(back, seat);
    }
}
