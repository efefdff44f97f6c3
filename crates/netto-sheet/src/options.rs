use std::fmt::{Display, Formatter};
use std::str::FromStr;

const TWIPS_PER_INCH: f64 = 1440.0;
const TWIPS_PER_CM: f64 = 1440.0 / 2.54;
const MAX_COLUMN_TWIPS: u32 = 22 * 1440;

/// Width of the appended column, stored in twentieths of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidth(u32);

impl ColumnWidth {
    #[must_use]
    pub const fn twips(self) -> u32 {
        self.0
    }

    pub fn from_twips(twips: u32) -> Result<Self, String> {
        if twips == 0 || twips > MAX_COLUMN_TWIPS {
            return Err(format!(
                "column width must be within 1..={MAX_COLUMN_TWIPS} twips, got {twips}"
            ));
        }
        Ok(Self(twips))
    }
}

impl Default for ColumnWidth {
    fn default() -> Self {
        Self(2160)
    }
}

impl Display for ColumnWidth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}tw", self.0)
    }
}

impl FromStr for ColumnWidth {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim().to_ascii_lowercase();
        let (number, twips_per_unit) = if let Some(number) = input.strip_suffix("in") {
            (number, TWIPS_PER_INCH)
        } else if let Some(number) = input.strip_suffix("cm") {
            (number, TWIPS_PER_CM)
        } else if let Some(number) = input.strip_suffix("tw") {
            (number, 1.0)
        } else {
            (input.as_str(), 1.0)
        };

        let value: f64 = number
            .trim()
            .replace(',', ".")
            .parse()
            .map_err(|_| format!("invalid column width: '{input}'"))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("column width must be positive: '{input}'"));
        }

        let twips = (value * twips_per_unit).round();
        if twips > f64::from(MAX_COLUMN_TWIPS) {
            return Err(format!("column width is too large: '{input}'"));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self::from_twips(twips as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    pub column_width: ColumnWidth,
    pub max_document_bytes: usize,
    pub max_xml_bytes: usize,
    pub max_table_rows: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            column_width: ColumnWidth::default(),
            max_document_bytes: 20 * 1024 * 1024,
            max_xml_bytes: 64 * 1024 * 1024,
            max_table_rows: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnWidth;
    use std::str::FromStr;

    #[test]
    fn parse_width_units() {
        assert_eq!(ColumnWidth::from_str("1.5in").map(ColumnWidth::twips), Ok(2160));
        assert_eq!(ColumnWidth::from_str("2,54cm").map(ColumnWidth::twips), Ok(1440));
        assert_eq!(ColumnWidth::from_str("720").map(ColumnWidth::twips), Ok(720));
        assert_eq!(ColumnWidth::default().twips(), 2160);
    }

    #[test]
    fn reject_invalid_width() {
        let err = ColumnWidth::from_str("wide").expect_err("text width should fail");
        assert!(err.contains("invalid column width"));
        assert!(ColumnWidth::from_str("0in").is_err());
        assert!(ColumnWidth::from_str("30in").is_err());
    }
}
