//! Rig log parser
//!
//! Reads the text exports written by test-rig acquisition software: an
//! optional free-text preamble, one header line naming the columns with their
//! units, then one row of samples per timestamp.
//!
//! ```text
//! Prüfstand 3  Lauf 17
//! Datum: 05.03.2024
//!
//! Messzeit [s]	Pressure [bar]	Flow [L/min]
//! 0,000	12,31	40,2
//! 0,010	12,35	40,1
//! ```
//!
//! The parser finds the first data row, takes the closest non-empty line
//! above it as the header, detects the delimiter from the header and the
//! decimal separator from a sample of numeric tokens. Missing tokens become
//! gaps; malformed tokens become gaps and count the row as malformed. Too
//! many malformed rows, or any row with the wrong column count, rejects the
//! file.

use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

use super::ParseError;
use crate::config::ParserConfig;

// ============================================================================
// Delimiters & Decimal Separators
// ============================================================================

/// Column delimiter, detected from the header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Semicolon,
    Comma,
    /// Runs of spaces
    Whitespace,
}

impl Delimiter {
    /// Tab wins over semicolon, semicolon over comma, comma over plain spaces.
    pub fn detect(header: &str) -> Self {
        if header.contains('\t') {
            Delimiter::Tab
        } else if header.contains(';') {
            Delimiter::Semicolon
        } else if header.contains(',') {
            Delimiter::Comma
        } else {
            Delimiter::Whitespace
        }
    }

    fn split<'a>(self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Tab => line.split('\t').map(str::trim).collect(),
            Delimiter::Semicolon => line.split(';').map(str::trim).collect(),
            Delimiter::Comma => line.split(',').map(str::trim).collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

/// Decimal separator used by numeric tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSeparator {
    Dot,
    Comma,
}

// ============================================================================
// Raw Table
// ============================================================================

/// Parsed but not yet registered log table.
///
/// `columns[i]` holds the samples of header cell `headers[i + 1]`; column 0
/// of the file is the time axis in `times`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    /// 1-based line number of the header
    pub header_line: usize,
    pub headers: Vec<String>,
    pub delimiter: Delimiter,
    pub decimal: DecimalSeparator,
    /// Time column values, in file units
    pub times: Vec<f64>,
    pub columns: Vec<Vec<Option<f64>>>,
    /// 1-based line number of every kept row
    pub row_lines: Vec<usize>,
    /// Data rows seen, including dropped ones
    pub total_rows: usize,
    /// Rows with at least one malformed token
    pub malformed_rows: usize,
}

enum Token {
    Value(f64),
    Missing,
    Bad,
}

// ============================================================================
// Parser
// ============================================================================

/// Parses rig-log text into a `RawLog`.
pub struct LogParser {
    malformed_row_threshold: f64,
    decimal_sample_size: usize,
    header_cell: Regex,
    comma_decimal: Regex,
    dot_decimal: Regex,
}

impl LogParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ParseError> {
        Ok(Self {
            malformed_row_threshold: config.malformed_row_threshold,
            decimal_sample_size: config.decimal_sample_size,
            // "Pressure [bar]" stays one cell when the header is space-separated
            header_cell: Regex::new(r"\S+\s*\[[^\]]*\]|\S+")?,
            comma_decimal: Regex::new(r"^[+-]?\d+,\d+(?:[eE][+-]?\d+)?$")?,
            dot_decimal: Regex::new(r"^[+-]?\d*\.\d+(?:[eE][+-]?\d+)?$")?,
        })
    }

    /// Read and parse a log file.
    ///
    /// Files that are not valid UTF-8 are decoded as Latin-1, which is what
    /// most rig acquisition PCs write.
    pub fn parse_file(&self, path: &Path) -> Result<RawLog, ParseError> {
        let bytes = std::fs::read(path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
        };
        debug!(path = %path.display(), bytes = text.len(), "Parsing log file");
        self.parse_str(&text)
    }

    /// Parse log text.
    pub fn parse_str(&self, text: &str) -> Result<RawLog, ParseError> {
        let text = text.trim_start_matches('\u{feff}');
        let lines: Vec<&str> = text.lines().collect();

        if lines.iter().all(|l| l.trim().is_empty()) {
            return Err(ParseError::Malformed {
                line: 1,
                reason: "empty file".to_string(),
            });
        }

        let (header_idx, data_idx) = self.locate_header(&lines)?;
        let header_text = lines[header_idx];
        let delimiter = Delimiter::detect(header_text);
        let headers = self.split_header(header_text, delimiter);
        if headers.len() < 2 {
            return Err(ParseError::UnsupportedFormat(format!(
                "header at line {} has {} column(s), need a time column and at least one channel",
                header_idx + 1,
                headers.len()
            )));
        }

        let decimal = self.detect_decimal(&lines[data_idx..], delimiter);
        debug!(
            header_line = header_idx + 1,
            columns = headers.len(),
            ?delimiter,
            ?decimal,
            "Detected log layout"
        );

        let mut raw = RawLog {
            header_line: header_idx + 1,
            columns: vec![Vec::new(); headers.len() - 1],
            headers,
            delimiter,
            decimal,
            times: Vec::new(),
            row_lines: Vec::new(),
            total_rows: 0,
            malformed_rows: 0,
        };
        let mut first_malformed: Option<usize> = None;

        for (idx, line) in lines.iter().enumerate().skip(data_idx) {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let fields = Self::fit_fields(delimiter.split(line), raw.headers.len());
            if fields.len() != raw.headers.len() {
                return Err(ParseError::Malformed {
                    line: line_no,
                    reason: format!(
                        "expected {} columns, found {}",
                        raw.headers.len(),
                        fields.len()
                    ),
                });
            }
            raw.total_rows += 1;

            // A row without a usable timestamp cannot be placed on the time axis
            let Token::Value(time) = parse_token(fields[0], decimal) else {
                raw.malformed_rows += 1;
                first_malformed.get_or_insert(line_no);
                debug!(line = line_no, token = fields[0], "Dropping row with unreadable timestamp");
                continue;
            };

            let mut row_malformed = false;
            for (column, field) in raw.columns.iter_mut().zip(&fields[1..]) {
                let value = match parse_token(field, decimal) {
                    Token::Value(v) => Some(v),
                    Token::Missing => None,
                    Token::Bad => {
                        row_malformed = true;
                        None
                    }
                };
                column.push(value);
            }
            if row_malformed {
                raw.malformed_rows += 1;
                first_malformed.get_or_insert(line_no);
            }
            raw.times.push(time);
            raw.row_lines.push(line_no);
        }

        if raw.total_rows == 0 {
            return Err(ParseError::Malformed {
                line: data_idx + 1,
                reason: "no data rows".to_string(),
            });
        }

        let fraction = raw.malformed_rows as f64 / raw.total_rows as f64;
        if fraction > self.malformed_row_threshold {
            return Err(ParseError::Malformed {
                line: first_malformed.unwrap_or(data_idx + 1),
                reason: format!(
                    "{} of {} rows malformed ({:.1}% exceeds {:.1}%)",
                    raw.malformed_rows,
                    raw.total_rows,
                    fraction * 100.0,
                    self.malformed_row_threshold * 100.0
                ),
            });
        }
        if raw.malformed_rows > 0 {
            warn!(
                malformed = raw.malformed_rows,
                rows = raw.total_rows,
                first_line = first_malformed.unwrap_or_default(),
                "Malformed tokens recorded as gaps"
            );
        }

        Ok(raw)
    }

    /// Find `(header_index, first_data_index)`.
    ///
    /// A data row is a line whose first token is numeric. Preamble lines can
    /// start with numbers too, so the first candidate whose column count
    /// matches the line above it wins; otherwise the first candidate is used
    /// and the column check reports the mismatch.
    fn locate_header(&self, lines: &[&str]) -> Result<(usize, usize), ParseError> {
        let candidates: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| first_token_is_numeric(l))
            .map(|(i, _)| i)
            .collect();

        let Some(&first) = candidates.first() else {
            return Err(ParseError::Malformed {
                line: lines.len(),
                reason: "no numeric data rows".to_string(),
            });
        };

        let header_above = |data_idx: usize| -> Option<usize> {
            (0..data_idx).rev().find(|&i| !lines[i].trim().is_empty())
        };

        for &data_idx in &candidates {
            let Some(header_idx) = header_above(data_idx) else {
                continue;
            };
            if first_token_is_numeric(lines[header_idx]) {
                continue;
            }
            let delimiter = Delimiter::detect(lines[header_idx]);
            let width = self.split_header(lines[header_idx], delimiter).len();
            let row_width = Self::fit_fields(delimiter.split(lines[data_idx]), width).len();
            if width >= 2 && width == row_width {
                return Ok((header_idx, data_idx));
            }
        }

        match header_above(first) {
            Some(header_idx) => Ok((header_idx, first)),
            None => Err(ParseError::UnsupportedFormat(format!(
                "no header line before the first data row (line {})",
                first + 1
            ))),
        }
    }

    fn split_header(&self, line: &str, delimiter: Delimiter) -> Vec<String> {
        let mut cells: Vec<String> = match delimiter {
            Delimiter::Whitespace => self
                .header_cell
                .find_iter(line)
                .map(|m| m.as_str().to_string())
                .collect(),
            _ => delimiter
                .split(line)
                .into_iter()
                .map(|c| c.trim_matches('"').trim().to_string())
                .collect(),
        };
        while cells.last().is_some_and(String::is_empty) {
            cells.pop();
        }
        cells
    }

    /// Drop trailing empty cells left by a delimiter at the end of the row.
    fn fit_fields(mut fields: Vec<&str>, width: usize) -> Vec<&str> {
        while fields.len() > width && fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        fields
    }

    /// Majority vote over the first `decimal_sample_size` numeric tokens.
    ///
    /// Comma-delimited files always use dot decimals. Ties go to dot.
    fn detect_decimal(&self, data_lines: &[&str], delimiter: Delimiter) -> DecimalSeparator {
        if delimiter == Delimiter::Comma {
            return DecimalSeparator::Dot;
        }

        let mut comma = 0usize;
        let mut dot = 0usize;
        let tokens = data_lines
            .iter()
            .flat_map(|line| delimiter.split(line))
            .filter(|t| !t.is_empty())
            .take(self.decimal_sample_size);
        for token in tokens {
            if self.comma_decimal.is_match(token) {
                comma += 1;
            } else if self.dot_decimal.is_match(token) {
                dot += 1;
            }
        }

        if comma > dot {
            DecimalSeparator::Comma
        } else {
            DecimalSeparator::Dot
        }
    }
}

fn first_token_is_numeric(line: &str) -> bool {
    line.split(|c: char| c.is_whitespace() || c == ';' || c == ',')
        .find(|t| !t.is_empty())
        .and_then(|t| t.trim_matches('"').parse::<f64>().ok())
        .is_some_and(f64::is_finite)
}

fn parse_token(raw: &str, decimal: DecimalSeparator) -> Token {
    let token = raw.trim().trim_matches('"');
    if token.is_empty()
        || token.eq_ignore_ascii_case("nan")
        || token.eq_ignore_ascii_case("n/a")
        || token == "-"
    {
        return Token::Missing;
    }

    let normalized: Cow<'_, str> = match decimal {
        DecimalSeparator::Comma => Cow::Owned(token.replace(',', ".")),
        DecimalSeparator::Dot => Cow::Borrowed(token),
    };
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => Token::Value(v),
        _ => Token::Bad,
    }
}
