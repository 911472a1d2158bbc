//! Delimited rendering of report tables.

use chrono::{DateTime, Utc};

use crate::resource::{header, ResourceRecord};

const DELIMITER: char = ',';

/// Quotes `field` when it contains the delimiter, a quote or a line break.
fn escape(field: &str) -> String {
    if field.contains(|c| c == DELIMITER || c == '"' || c == '\n' || c == '\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_line<'a, I>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut first = true;
    for field in fields {
        if !first {
            out.push(DELIMITER);
        }
        out.push_str(&escape(field));
        first = false;
    }
    out.push('\n');
}

/// Renders a header line followed by one line per row.
pub fn render_table<'h, 'r, H, R>(columns: H, rows: R) -> Vec<u8>
where
    H: IntoIterator<Item = &'h str>,
    R: IntoIterator<Item = Vec<&'r str>>,
{
    let mut out = String::new();
    push_line(&mut out, columns);
    for row in rows {
        push_line(&mut out, row);
    }
    out.into_bytes()
}

/// Renders audit records under the fixed column header.
pub fn render(records: &[ResourceRecord]) -> Vec<u8> {
    render_table(header(), records.iter().map(|record| record.values().collect()))
}

/// Object key for a report generated at `now`, e.g.
/// `reports/resource-audit-20240615093000.csv`.
pub fn report_key(prefix: &str, name: &str, now: DateTime<Utc>) -> String {
    let file = format!("{}-{}.csv", name, now.format("%Y%m%d%H%M%S"));
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file
    } else {
        format!("{prefix}/{file}")
    }
}
