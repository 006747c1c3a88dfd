//! Parsing of the memory-map report a debugger prints for `info proc mappings`.
//!
//! The report starts with some banner lines, followed by a header naming the
//! columns and one row per mapped region:
//!
//! ```text
//! process 1234
//! Mapped address spaces:
//!
//!           Start Addr           End Addr       Size     Offset  Perms  objfile
//!             0x400000           0x401000     0x1000        0x0  r--p   /bin/app
//! ```
//!
//! Rows are kept as plain text tokens. Interpreting them is left to the caller.

use std::fmt;

use log::*;

use crate::{Error, Result};

/// Column labels that all have to occur on the header line.
pub const HEADER_COLUMNS: [&str; 6] =
    ["Start Addr", "End Addr", "Size", "Offset", "Perms", "objfile"];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error(
        "Memory-map report header not found, expected a line with the columns Start Addr, End Addr, Size, Offset, Perms and objfile"
    )]
    HeaderNotFound,
}

/// One row of a memory-map report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    fields: Vec<String>,
}

impl MappingRecord {
    fn from_line(line: &str) -> Self {
        Self {
            fields: line.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn start(&self) -> Option<&str> {
        self.field(0)
    }

    pub fn end(&self) -> Option<&str> {
        self.field(1)
    }

    pub fn size(&self) -> Option<&str> {
        self.field(2)
    }

    pub fn offset(&self) -> Option<&str> {
        self.field(3)
    }

    pub fn perms(&self) -> Option<&str> {
        self.field(4)
    }

    /// Backing file of the region, absent for anonymous mappings.
    pub fn objfile(&self) -> Option<&str> {
        self.field(5)
    }

    /// Checks whether `address` lies within `[start, end)`.
    ///
    /// Rows without an end column never contain anything.
    pub fn contains(&self, address: u64) -> Result<bool> {
        let (Some(start), Some(end)) = (self.start(), self.end()) else {
            return Ok(false);
        };
        let start = parse_hex_field(start)?;
        let end = parse_hex_field(end)?;

        Ok(start <= address && address < end)
    }
}

impl fmt::Display for MappingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field:?}")?;
        }
        write!(f, ")")
    }
}

fn parse_hex_field(field: &str) -> Result<u64> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);

    // from_str_radix tolerates a sign
    if digits.starts_with('+') {
        return Err(Error::InvalidAddressField(field.to_owned()));
    }

    u64::from_str_radix(digits, 16).map_err(|_| Error::InvalidAddressField(field.to_owned()))
}

/// All rows of a memory-map report in the order they were printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingReport {
    records: Vec<MappingRecord>,
}

impl MappingReport {
    pub fn records(&self) -> &[MappingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MappingRecord> {
        self.records.iter()
    }

    /// Finds the first mapping whose address range contains `address`.
    pub fn find_containing(&self, address: u64) -> Result<Option<&MappingRecord>> {
        for record in &self.records {
            if record.contains(address)? {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }
}

impl<'a> IntoIterator for &'a MappingReport {
    type Item = &'a MappingRecord;
    type IntoIter = std::slice::Iter<'a, MappingRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for MappingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}

fn is_header(line: &str) -> bool {
    HEADER_COLUMNS.iter().all(|column| line.contains(column))
}

/// Parses the text of a memory-map report.
///
/// Everything up to and including the first line containing all of
/// [`HEADER_COLUMNS`] is skipped. Each following non-blank line becomes one
/// [`MappingRecord`] with one field per whitespace separated token. Rows with
/// fewer tokens than there are columns are kept as they are.
pub fn parse_report(text: &str) -> std::result::Result<MappingReport, ParseError> {
    let mut lines = text.lines();

    let Some(header_index) = lines.position(is_header) else {
        warn!("No memory-map header found in {} lines of input", text.lines().count());
        return Err(ParseError::HeaderNotFound);
    };
    debug!("Found memory-map header on line {}", header_index + 1);

    let records: Vec<MappingRecord> = lines
        .map(MappingRecord::from_line)
        .filter(|record| !record.is_empty())
        .inspect(|record| {
            if record.len() < HEADER_COLUMNS.len() {
                debug!(
                    "Row {record} has only {} of {} columns",
                    record.len(),
                    HEADER_COLUMNS.len()
                );
            }
        })
        .collect();

    debug!("Parsed {} memory mappings", records.len());

    Ok(MappingReport { records })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Start Addr End Addr Size Offset Perms objfile";

    fn fields(record: &MappingRecord) -> Vec<&str> {
        record.fields().iter().map(String::as_str).collect()
    }

    #[test]
    fn parses_rows_after_header() {
        let text = "proc 1234\nStart Addr End Addr Size Offset Perms objfile\n0x1000 0x2000 0x1000 0x0 r-xp /bin/app\n0x3000 0x4000 0x1000 0x0 rw-p\n";

        let report = parse_report(text).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(
            fields(&report.records()[0]),
            ["0x1000", "0x2000", "0x1000", "0x0", "r-xp", "/bin/app"]
        );
        assert_eq!(fields(&report.records()[1]), ["0x3000", "0x4000", "0x1000", "0x0", "rw-p"]);
    }

    #[test]
    fn keeps_line_order() {
        let rows: Vec<String> = (0..10)
            .map(|i| format!("0x{i:x}000 0x{i:x}fff 0xfff 0x0 r--p /lib/{i}.so"))
            .collect();
        let text = format!("{HEADER}\n{}", rows.join("\n"));

        let report = parse_report(&text).unwrap();

        assert_eq!(report.len(), rows.len());
        for (record, row) in report.iter().zip(&rows) {
            assert_eq!(record.objfile(), row.split_whitespace().last());
        }
    }

    #[test]
    fn missing_header_is_an_error() {
        let text = "0x1000 0x2000 0x1000 0x0 r-xp /bin/app\n0x3000 0x4000 0x1000 0x0 rw-p\n";
        assert_eq!(parse_report(text), Err(ParseError::HeaderNotFound));
        assert_eq!(parse_report(""), Err(ParseError::HeaderNotFound));
    }

    #[test]
    fn incomplete_header_is_not_a_header() {
        // Older debuggers do not print the Perms column
        let text = "Start Addr End Addr Size Offset objfile\n0x1000 0x2000 0x1000 0x0 /bin/app\n";
        assert_eq!(parse_report(text), Err(ParseError::HeaderNotFound));
    }

    #[test]
    fn header_without_rows_is_empty_report() {
        let report = parse_report(&format!("process 1\n{HEADER}\n")).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.to_string(), "");
    }

    #[test]
    fn header_columns_may_appear_in_any_order() {
        let text = "objfile Perms Offset Size End Addr Start Addr\n0x1 0x2 0x1 0x0 r--p\n";
        assert_eq!(parse_report(text).unwrap().len(), 1);
    }

    #[test]
    fn arity_matches_token_count() {
        let text = format!(
            "{HEADER}\n0x1000\n0x1000 0x2000 0x1000\n0x1000 0x2000 0x1000 0x0 rw-p [heap] extra\n"
        );

        let report = parse_report(&text).unwrap();
        let arities: Vec<usize> = report.iter().map(MappingRecord::len).collect();

        assert_eq!(arities, [1, 3, 7]);
        assert_eq!(report.records()[1].perms(), None);
    }

    #[test]
    fn preamble_and_blank_lines_are_skipped() {
        let text = format!(
            "process 4242\nMapped address spaces:\n\n  {HEADER}\n\n   0x400000   0x401000   0x1000   0x0  r--p   /usr/bin/cat\n  \n"
        );

        let report = parse_report(&text).unwrap();

        assert_eq!(report.len(), 1);
        assert_eq!(report.records()[0].start(), Some("0x400000"));
        assert_eq!(report.records()[0].objfile(), Some("/usr/bin/cat"));
    }

    #[test]
    fn only_first_header_is_consumed() {
        let text = format!("{HEADER}\n0x1000 0x2000 0x1000 0x0 r--p\n{HEADER}\n");

        let report = parse_report(&text).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.records()[1].start(), Some("Start"));
    }

    #[test]
    fn displays_records_as_tuples() {
        let text = format!("{HEADER}\n0x3000 0x4000 0x1000 0x0 rw-p\n");
        let report = parse_report(&text).unwrap();

        assert_eq!(
            report.to_string(),
            "(\"0x3000\", \"0x4000\", \"0x1000\", \"0x0\", \"rw-p\")\n"
        );
    }

    #[test]
    fn finds_containing_mapping() {
        let text = format!(
            "{HEADER}\n0x1000 0x2000 0x1000 0x0 r-xp /bin/app\n0x3000 0x4000 0x1000 0x0 rw-p\n"
        );
        let report = parse_report(&text).unwrap();

        let found = report.find_containing(0x3abc).unwrap().unwrap();
        assert_eq!(found.start(), Some("0x3000"));

        assert_eq!(report.find_containing(0x1000).unwrap().unwrap().objfile(), Some("/bin/app"));
        assert!(report.find_containing(0x2000).unwrap().is_none());
        assert!(report.find_containing(0x0).unwrap().is_none());
    }

    #[test]
    fn lookup_skips_rows_without_end_and_rejects_garbage() {
        let text = format!("{HEADER}\n0x1000\nzzz 0x2000 0x1000 0x0 r--p\n");
        let report = parse_report(&text).unwrap();

        match report.find_containing(0x1500) {
            Err(Error::InvalidAddressField(field)) => assert_eq!(field, "zzz"),
            other => panic!("expected an invalid address field, got {other:?}"),
        }
    }

    #[test]
    fn lookup_rejects_signed_addresses() {
        let report = parse_report(&format!("{HEADER}\n0x+10 0x20 0x10 0x0 r--p\n")).unwrap();

        match report.find_containing(0x10) {
            Err(Error::InvalidAddressField(field)) => assert_eq!(field, "0x+10"),
            other => panic!("expected an invalid address field, got {other:?}"),
        }
    }
}
