//! Feed parsing and row validation
//!
//! Pure transformation from raw feed text to validated records plus a
//! defect list. Same input always yields the same output; rejected rows
//! never abort parsing of the rest of the feed.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use url::Url;

use crate::domain::book::NewBookRecord;
use crate::domain::sync::RowDefect;
use crate::pipeline::WatchError;

/// Header names looked up case-insensitively, in any column order
const COLUMN_ISBN: &str = "isbn";
const COLUMN_TITLE: &str = "title";
const COLUMN_AUTHOR: &str = "author";
const COLUMN_PRICE: &str = "price";
const COLUMN_URL: &str = "url";
const COLUMN_LAST_UPDATED: &str = "last-updated";

/// Validated records plus the rows that had to be excluded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub records: Vec<NewBookRecord>,
    pub defects: Vec<RowDefect>,
}

impl ParsedFeed {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Column positions resolved from the header row
struct ColumnIndex {
    isbn: usize,
    title: usize,
    author: usize,
    price: usize,
    url: usize,
    last_updated: usize,
}

pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw feed content. A missing required column is a feed-level
    /// failure; everything below that is a per-row defect.
    pub fn parse(&self, content: &str) -> Result<ParsedFeed, WatchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| WatchError::FeedMalformed(format!("unreadable header row: {e}")))?;
        let columns = resolve_columns(headers)?;

        let mut records = Vec::new();
        let mut defects = Vec::new();

        for (index, row) in reader.records().enumerate() {
            let row_number = (index + 1) as u32;

            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    defects.push(RowDefect::new(row_number, format!("unreadable row: {e}")));
                    continue;
                }
            };

            match validate_row(&row, &columns) {
                Ok(record) => records.push(record),
                Err(reason) => defects.push(RowDefect::new(row_number, reason)),
            }
        }

        tracing::debug!(
            "Parsed feed: {} valid records, {} defects",
            records.len(),
            defects.len()
        );

        Ok(ParsedFeed { records, defects })
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<ColumnIndex, WatchError> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (index, name) in headers.iter().enumerate() {
        positions.entry(name.trim().to_lowercase()).or_insert(index);
    }

    let find = |name: &str| positions.get(name).copied();
    let isbn = find(COLUMN_ISBN);
    let title = find(COLUMN_TITLE);
    let author = find(COLUMN_AUTHOR);
    let price = find(COLUMN_PRICE);
    let url = find(COLUMN_URL);
    // Underscore spelling accepted for the timestamp column since feed
    // exports disagree on it
    let last_updated = find(COLUMN_LAST_UPDATED).or_else(|| find("last_updated"));

    let mut missing = Vec::new();
    for (name, position) in [
        (COLUMN_ISBN, isbn),
        (COLUMN_TITLE, title),
        (COLUMN_AUTHOR, author),
        (COLUMN_PRICE, price),
        (COLUMN_URL, url),
        (COLUMN_LAST_UPDATED, last_updated),
    ] {
        if position.is_none() {
            missing.push(name);
        }
    }

    match (isbn, title, author, price, url, last_updated) {
        (Some(isbn), Some(title), Some(author), Some(price), Some(url), Some(last_updated)) => {
            Ok(ColumnIndex {
                isbn,
                title,
                author,
                price,
                url,
                last_updated,
            })
        }
        _ => Err(WatchError::FeedMalformed(format!(
            "missing required columns: {}",
            missing.join(", ")
        ))),
    }
}

fn validate_row(row: &csv::StringRecord, columns: &ColumnIndex) -> Result<NewBookRecord, String> {
    let isbn_raw = field(row, columns.isbn).ok_or("missing ISBN")?;
    let isbn = normalize_isbn(isbn_raw);
    if !is_valid_isbn(&isbn) {
        return Err(format!("invalid ISBN: {isbn_raw}"));
    }

    let title = field(row, columns.title).map(str::to_string);
    let author = field(row, columns.author).map(str::to_string);
    let price = field(row, columns.price).and_then(parse_price);
    let url = field(row, columns.url).and_then(parse_url);
    let feed_updated = field(row, columns.last_updated).and_then(parse_feed_timestamp);

    if title.is_none() && price.is_none() {
        return Err("row has neither title nor price".to_string());
    }

    let row_hash = compute_row_hash(&isbn, price, title.as_deref());

    Ok(NewBookRecord {
        isbn,
        title,
        author,
        price,
        url,
        feed_updated,
        row_hash,
    })
}

fn field(row: &csv::StringRecord, index: usize) -> Option<&str> {
    row.get(index).map(str::trim).filter(|s| !s.is_empty())
}

fn normalize_isbn(raw: &str) -> String {
    raw.replace(['-', ' '], "")
}

/// Structural check only: 10 or 13 digits after normalization.
fn is_valid_isbn(isbn: &str) -> bool {
    (isbn.len() == 10 || isbn.len() == 13) && isbn.bytes().all(|b| b.is_ascii_digit())
}

/// Non-negative decimal or nothing. A malformed price degrades the
/// field, never the row.
fn parse_price(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|price| price.is_finite() && *price >= 0.0)
}

fn parse_url(raw: &str) -> Option<String> {
    match Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => Some(raw.to_string()),
        _ => {
            tracing::debug!("Dropping malformed URL field: {}", raw);
            None
        }
    }
}

/// Advisory timestamp column; accepts RFC 3339, a naive datetime, or a
/// bare date.
fn parse_feed_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight));
    }
    None
}

/// Content hash over the fields that constitute a meaningful row change.
fn compute_row_hash(isbn: &str, price: Option<f64>, title: Option<&str>) -> String {
    let price_text = price.map(|p| p.to_string()).unwrap_or_default();
    let hash_input = format!("{}|{}|{}", isbn, price_text, title.unwrap_or_default());
    blake3::hash(hash_input.as_bytes()).to_hex().to_string()
}
