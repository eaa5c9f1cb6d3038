use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::models::{sluggify, Adjustment, ReportRecord};

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

const FIXED_COLUMNS: [&str; 6] = [
    "first_name",
    "last_name",
    "email",
    "amount_donated",
    "amount_due",
    "amount_pledged",
];

const COL_FIRST_NAME: usize = 0;
const COL_LAST_NAME: usize = 1;
const COL_EMAIL: usize = 2;
const COL_DONATED: usize = 3;
const COL_DUE: usize = 4;
const COL_PLEDGED: usize = 5;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a currency cell. Thousands separators and a leading `$` are ignored,
/// and a blank cell is zero. Anything else that isn't a finite decimal is an
/// error for `row`/`column`.
pub fn parse_amount(raw: &str, row: usize, column: &str) -> Result<f64> {
    let s = raw.replace(',', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return Ok(0.0);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(SyncError::parse(row, column, format!("'{raw}' is not a valid amount"))),
    }
}

pub fn synthesize_email(first_name: &str, last_name: &str, domain: &str) -> String {
    format!("{first_name}.{last_name}@{domain}")
}

fn parse_adjustments(names: &[String], values: &[&str], row: usize) -> Result<Vec<Adjustment>> {
    let mut adjustments = Vec::new();
    for (name, value) in names.iter().zip(values) {
        if value.trim().is_empty() {
            continue;
        }
        let amount = parse_amount(value, row, name)?;
        if amount > 0.0 {
            adjustments.push(Adjustment::new(name, amount));
        }
    }
    Ok(adjustments)
}

// ---------------------------------------------------------------------------
// parse_report
// ---------------------------------------------------------------------------

/// Parse a collection report: a header row followed by
/// `first_name,last_name,email,amount_donated,amount_due,amount_pledged`
/// and any number of trailing adjustment columns, one per side program.
///
/// The reader is consumed; call once per source.
pub fn parse_report<R: Read>(reader: R, placeholder_domain: &str) -> Result<Vec<ReportRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.len() < FIXED_COLUMNS.len() {
        return Err(SyncError::parse(
            0,
            "header",
            format!(
                "expected at least {} columns ({}), found {}",
                FIXED_COLUMNS.len(),
                FIXED_COLUMNS.join(","),
                headers.len()
            ),
        ));
    }
    let adjustment_names = &headers[FIXED_COLUMNS.len()..];

    // Adjustments are stored per (donor, slug), so two columns may not share one.
    let mut seen_slugs: HashMap<String, &str> = HashMap::new();
    for name in adjustment_names {
        if let Some(previous) = seen_slugs.insert(sluggify(name), name) {
            return Err(SyncError::parse(
                0,
                name,
                format!("adjustment column duplicates '{previous}'"),
            ));
        }
    }

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let row = i + 1;
        let record = result?;
        if record.len() != headers.len() {
            return Err(SyncError::parse(
                row,
                "*",
                format!("expected {} cells, found {}", headers.len(), record.len()),
            ));
        }

        let first_name = record[COL_FIRST_NAME].trim().to_string();
        let last_name = record[COL_LAST_NAME].trim().to_string();
        let amount_donated = parse_amount(&record[COL_DONATED], row, FIXED_COLUMNS[COL_DONATED])?;
        let amount_due = parse_amount(&record[COL_DUE], row, FIXED_COLUMNS[COL_DUE])?;
        let amount_pledged = parse_amount(&record[COL_PLEDGED], row, FIXED_COLUMNS[COL_PLEDGED])?;

        let email_address = match record[COL_EMAIL].trim() {
            "" => synthesize_email(&first_name, &last_name, placeholder_domain),
            email => email.to_string(),
        };

        let values: Vec<&str> = record.iter().skip(FIXED_COLUMNS.len()).collect();
        let adjustments = parse_adjustments(adjustment_names, &values, row)?;

        records.push(ReportRecord {
            first_name,
            last_name,
            email_address,
            amount_donated,
            amount_due,
            amount_pledged,
            adjustments,
        });
    }
    Ok(records)
}

pub fn parse_report_file(path: &Path, placeholder_domain: &str) -> Result<Vec<ReportRecord>> {
    let file = std::fs::File::open(path).map_err(|e| {
        SyncError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read report {}: {e}", path.display()),
        ))
    })?;
    parse_report(std::io::BufReader::new(file), placeholder_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "first_name,last_name,email,amount_donated,amount_due,amount_pledged";

    fn parse(content: &str) -> Result<Vec<ReportRecord>> {
        parse_report(content.as_bytes(), "gmail.com")
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50", 1, "x").unwrap(), 1234.5);
        assert_eq!(parse_amount("", 1, "x").unwrap(), 0.0);
        assert_eq!(parse_amount("  ", 1, "x").unwrap(), 0.0);
        assert_eq!(parse_amount("$75", 1, "x").unwrap(), 75.0);
        assert!(parse_amount("abc", 1, "x").is_err());
        assert!(parse_amount("NaN", 1, "x").is_err());
    }

    #[test]
    fn test_blank_donated_is_zero() {
        let rows = parse(&format!("{HEADER}\nJane,Doe,jane@x.com,,0,200\n")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount_donated, 0.0);
        assert_eq!(rows[0].amount_pledged, 200.0);
    }

    #[test]
    fn test_thousands_separator() {
        let rows = parse(&format!("{HEADER}\nJane,Doe,jane@x.com,\"1,234.50\",0,\"2,000\"\n")).unwrap();
        assert_eq!(rows[0].amount_donated, 1234.5);
        assert_eq!(rows[0].amount_pledged, 2000.0);
    }

    #[test]
    fn test_non_numeric_amount_is_parse_error() {
        let err = parse(&format!("{HEADER}\nJane,Doe,jane@x.com,lots,0,200\n")).unwrap_err();
        match err {
            SyncError::Parse { row, column, .. } => {
                assert_eq!(row, 1);
                assert_eq!(column, "amount_donated");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_email_is_synthesized() {
        let rows = parse(&format!("{HEADER}\nJane,Doe,,150,0,200\n")).unwrap();
        assert_eq!(rows[0].email_address, "Jane.Doe@gmail.com");
    }

    #[test]
    fn test_adjustment_extraction() {
        let content = format!(
            "{HEADER},Spring Formal,Car Wash\nJane,Doe,jane@x.com,150,0,200,25,0\nJohn,Roe,john@x.com,10,0,50,,\n"
        );
        let rows = parse(&content).unwrap();
        assert_eq!(
            rows[0].adjustments,
            vec![Adjustment {
                display_name: "Spring Formal".to_string(),
                slug: "spring-formal".to_string(),
                amount: 25.0,
            }]
        );
        assert!(rows[1].adjustments.is_empty());
    }

    #[test]
    fn test_duplicate_adjustment_slug_is_rejected() {
        let content = format!("{HEADER},Car Wash,car wash\nJane,Doe,jane@x.com,150,0,200,10,5\n");
        let err = parse(&content).unwrap_err();
        match err {
            SyncError::Parse { row, column, message } => {
                assert_eq!(row, 0);
                assert_eq!(column, "car wash");
                assert!(message.contains("Car Wash"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_short_header_is_rejected() {
        let err = parse("first_name,last_name,email\nJane,Doe,jane@x.com\n").unwrap_err();
        assert!(matches!(err, SyncError::Parse { row: 0, .. }));
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let err = parse(&format!("{HEADER}\nJane,Doe,jane@x.com,150,0\n")).unwrap_err();
        assert!(matches!(err, SyncError::Parse { row: 1, .. }));
    }

    #[test]
    fn test_preserves_report_order() {
        let content = format!("{HEADER}\nB,Two,b@x.com,1,0,1\nA,One,a@x.com,2,0,2\n");
        let rows = parse(&content).unwrap();
        assert_eq!(rows[0].first_name, "B");
        assert_eq!(rows[1].first_name, "A");
    }

    #[test]
    fn test_parse_report_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_report_file(&dir.path().join("nope.csv"), "gmail.com").unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }

    #[test]
    fn test_parse_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        std::fs::write(&path, format!("{HEADER}\nJane,Doe,Jane.DOE@x.com,150,0,200\n")).unwrap();
        let rows = parse_report_file(&path, "gmail.com").unwrap();
        assert_eq!(rows[0].email_key(), "jane.doe@x.com");
    }
}
