// Survey responses for the "AI uses and its ethics" questionnaire.
// Collected with KoboToolbox, mirrored into Postgres on demand.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use log::{info, warn};
use postgres::types::ToSql;
use postgres::Transaction;
use reqwest::{blocking::Client, StatusCode};
use std::collections::HashMap;
use std::error::Error;

use crate::config::KoboAuth;

pub const SCHEMA_NAME: &str = "ai_uses_and_its_ethics";
pub const TABLE_NAME: &str = "ai_uses_and_its_ethics";

/// Columns that hold timestamps in the export.  Kobo metadata columns keep
/// their leading underscore.
const TIMESTAMP_FIELDS: [&str; 3] = ["start", "end", "_submission_time"];

#[derive(Clone)]
pub struct AiEthicsSurveyArchive {
    pub csv_url: String,
}

/// One value of a normalized record.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Timestamp(NaiveDateTime),
    Null,
}

/// One survey submission, canonical field name -> value.
pub type Record = HashMap<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExportStats {
    /// Records kept
    pub rows: usize,
    /// Records dropped because their field count didn't match the header
    pub skipped_rows: usize,
    /// Non-empty timestamp values that failed to parse and became NULL
    pub null_timestamps: usize,
}

pub struct Export {
    pub records: Vec<Record>,
    pub stats: ExportStats,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnType {
    Text,
    Integer,
    Timestamp,
}

/// Destination column -> source field in the normalized record.
pub struct FieldMapping {
    pub column: &'static str,
    pub source: &'static str,
    pub kind: ColumnType,
}

/// One entry per destination column, in table order.  The last five columns
/// come from Kobo submission metadata, whose field names don't follow the
/// survey-question naming convention.
pub const FIELD_MAPPING: &[FieldMapping] = &[
    FieldMapping { column: "start", source: "start", kind: ColumnType::Timestamp },
    FieldMapping { column: "\"end\"", source: "end", kind: ColumnType::Timestamp },
    FieldMapping { column: "names", source: "names", kind: ColumnType::Text },
    FieldMapping { column: "email", source: "email", kind: ColumnType::Text },
    FieldMapping { column: "phone", source: "phone", kind: ColumnType::Text },
    FieldMapping { column: "consent", source: "consent", kind: ColumnType::Text },
    FieldMapping { column: "age", source: "age", kind: ColumnType::Integer },
    FieldMapping { column: "gender", source: "gender", kind: ColumnType::Text },
    FieldMapping { column: "university", source: "university", kind: ColumnType::Text },
    FieldMapping { column: "field", source: "field", kind: ColumnType::Text },
    FieldMapping { column: "use_of_ai", source: "use_of_ai", kind: ColumnType::Text },
    FieldMapping { column: "policy", source: "policy", kind: ColumnType::Text },
    FieldMapping { column: "frequency", source: "frequency", kind: ColumnType::Text },
    FieldMapping { column: "dependent", source: "dependent", kind: ColumnType::Text },
    FieldMapping { column: "cirriculum", source: "cirriculum", kind: ColumnType::Text },
    FieldMapping { column: "submission_time", source: "_submission_time", kind: ColumnType::Timestamp },
    FieldMapping { column: "submitted_by", source: "_submitted_by", kind: ColumnType::Text },
    FieldMapping { column: "status", source: "_status", kind: ColumnType::Text },
    FieldMapping { column: "version", source: "__version__", kind: ColumnType::Text },
    FieldMapping { column: "index_no", source: "_index", kind: ColumnType::Integer },
];

impl FieldMapping {
    /// SQL parameter for this column.  An absent field, or a value that
    /// doesn't convert to the column type, becomes a typed NULL.
    fn param(&self, record: &Record) -> Box<dyn ToSql + Sync> {
        let value = record.get(self.source).unwrap_or(&Value::Null);
        match self.kind {
            ColumnType::Text => Box::new(text_param(value)),
            ColumnType::Integer => Box::new(integer_param(value)),
            ColumnType::Timestamp => Box::new(timestamp_param(value)),
        }
    }
}

fn text_param(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Timestamp(ts) => Some(ts.to_string()),
        Value::Null => None,
    }
}

fn integer_param(value: &Value) -> Option<i32> {
    match value {
        Value::Text(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

fn timestamp_param(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Text(s) => parse_timestamp(s),
        Value::Null => None,
    }
}

/// Normalize a column header: trim, lowercase, spaces and hyphens to
/// underscores, "&" to "and".  Applying it twice gives the same result.
pub fn canonicalize_header(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace('&', "and")
        .replace('-', "_")
}

/// Parse the timestamp shapes Kobo puts in exports.  An RFC 3339 offset is
/// dropped and the wall-clock time kept, since the table columns are
/// TIMESTAMP without time zone.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn insert_sql() -> String {
    let columns: Vec<&str> = FIELD_MAPPING.iter().map(|m| m.column).collect();
    let placeholders: Vec<String> = (1..=FIELD_MAPPING.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        SCHEMA_NAME,
        TABLE_NAME,
        columns.join(", "),
        placeholders.join(", ")
    )
}

impl AiEthicsSurveyArchive {
    /// Pull the `;`-delimited CSV export from KoboToolbox.  Any status other
    /// than 200 fails the job.
    pub fn download_export(&self, auth: &KoboAuth) -> Result<String, Box<dyn Error>> {
        info!("fetching survey export from KoboToolbox ...");
        let client = Client::new();
        let response = client
            .get(&self.csv_url)
            .basic_auth(&auth.username, Some(&auth.password))
            .send()?;
        if response.status() != StatusCode::OK {
            return Err(Box::from(format!(
                "failed to fetch survey export: HTTP {}",
                response.status()
            )));
        }
        let body = response.text()?;
        info!("fetched {} bytes", body.len());
        Ok(body)
    }

    /// Parse the raw export body into normalized records.  Rows with the
    /// wrong field count are dropped, unparseable timestamps become NULL;
    /// both are counted in the returned stats.
    pub fn read_export(&self, body: &str) -> Result<Export, Box<dyn Error>> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .has_headers(true)
            .from_reader(body.as_bytes());
        let headers: Vec<String> = rdr.headers()?.iter().map(canonicalize_header).collect();

        let mut records: Vec<Record> = Vec::new();
        let mut stats = ExportStats::default();
        for result in rdr.records() {
            // a row the reader can't parse is treated like a wrong field count
            let row = match result {
                Ok(row) => row,
                Err(_) => {
                    stats.skipped_rows += 1;
                    continue;
                }
            };
            if row.len() != headers.len() {
                stats.skipped_rows += 1;
                continue;
            }
            let mut record: Record = HashMap::new();
            for (name, raw) in headers.iter().zip(row.iter()) {
                let value = if TIMESTAMP_FIELDS.contains(&name.as_str()) {
                    match parse_timestamp(raw) {
                        Some(ts) => Value::Timestamp(ts),
                        None => {
                            if !raw.is_empty() {
                                stats.null_timestamps += 1;
                            }
                            Value::Null
                        }
                    }
                } else if raw.is_empty() {
                    Value::Null
                } else {
                    Value::Text(raw.to_string())
                };
                record.insert(name.clone(), value);
            }
            records.push(record);
        }
        stats.rows = records.len();

        info!("parsed {} records", stats.rows);
        if stats.skipped_rows > 0 {
            warn!("skipped {} rows with a wrong field count", stats.skipped_rows);
        }
        if stats.null_timestamps > 0 {
            warn!("nulled {} unparseable timestamp values", stats.null_timestamps);
        }

        Ok(Export { records, stats })
    }

    /// Recreate the destination table.  The previous contents are discarded;
    /// the table is a full-replace mirror of the latest export, not an
    /// append log.
    pub fn setup(&self, tx: &mut Transaction) -> Result<(), Box<dyn Error>> {
        info!("recreating table {}.{} ...", SCHEMA_NAME, TABLE_NAME);
        tx.batch_execute(&format!(
            r#"
CREATE SCHEMA IF NOT EXISTS {schema};
DROP TABLE IF EXISTS {schema}.{table};
CREATE TABLE {schema}.{table} (
    id SERIAL PRIMARY KEY,
    start TIMESTAMP,
    "end" TIMESTAMP,
    names TEXT,
    email TEXT,
    phone TEXT,
    consent TEXT,
    age INT,
    gender TEXT,
    university TEXT,
    field TEXT,
    use_of_ai TEXT,
    policy TEXT,
    frequency TEXT,
    dependent TEXT,
    cirriculum TEXT,
    submission_time TIMESTAMP,
    submitted_by TEXT,
    status TEXT,
    version TEXT,
    index_no INTEGER
);
"#,
            schema = SCHEMA_NAME,
            table = TABLE_NAME
        ))?;
        Ok(())
    }

    /// Insert the records in export order, one parameterized statement per
    /// row, inside the caller's transaction.  The serial id preserves the
    /// upstream ordering.
    pub fn insert_records(
        &self,
        tx: &mut Transaction,
        records: &[Record],
    ) -> Result<usize, Box<dyn Error>> {
        let stmt = tx.prepare(&insert_sql())?;
        for record in records {
            let params: Vec<Box<dyn ToSql + Sync>> =
                FIELD_MAPPING.iter().map(|m| m.param(record)).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&stmt, &refs)?;
        }
        info!(
            "inserted {} rows into {}.{}",
            records.len(),
            SCHEMA_NAME,
            TABLE_NAME
        );
        Ok(records.len())
    }
}
