use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Calendar-year total returns of QQQ in percent.
const QQQ_ANNUAL_RETURNS: [(i32, f64); 28] = [
    (1999, 78.94),
    (2000, -38.40),
    (2001, -27.18),
    (2002, -39.24),
    (2003, 43.60),
    (2004, 10.84),
    (2005, 2.64),
    (2006, 4.82),
    (2007, 18.81),
    (2008, -40.79),
    (2009, 48.28),
    (2010, 18.21),
    (2011, 1.94),
    (2012, 15.90),
    (2013, 32.43),
    (2014, 20.14),
    (2015, 9.76),
    (2016, 9.38),
    (2017, 31.45),
    (2018, -1.85),
    (2019, 38.41),
    (2020, 46.19),
    (2021, 29.24),
    (2022, -33.22),
    (2023, 55.83),
    (2024, 27.74),
    (2025, 20.58),
    (2026, 2.94),
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReturnsParseError {
    #[error("line {line}: expected `year,percent`, got {content:?}")]
    MalformedRow { line: usize, content: String },
    #[error("line {line}: invalid year {value:?}")]
    InvalidYear { line: usize, value: String },
    #[error("line {line}: invalid number {value:?}")]
    InvalidNumber { line: usize, value: String },
    #[error("line {line}: year {year} appears more than once")]
    DuplicateYear { line: usize, year: i32 },
    #[error("price history header must name `Date` and `Close` columns")]
    MissingColumns,
    #[error("line {line}: close price must be positive, got {value}")]
    NonPositiveClose { line: usize, value: f64 },
    #[error("line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("no return rows found")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualReturn {
    pub year: i32,
    pub return_percent: f64,
}

/// Sparse year -> percent table for the volatile asset.
///
/// `rate` and `rate_percent` are total: years without an entry return `0.0`, i.e. a flat
/// year. Callers never need to special-case gaps in the history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnTable {
    by_year: BTreeMap<i32, f64>,
}

impl ReturnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin_qqq() -> Self {
        QQQ_ANNUAL_RETURNS.into_iter().collect()
    }

    pub fn insert(&mut self, year: i32, percent: f64) -> Option<f64> {
        self.by_year.insert(year, percent)
    }

    pub fn rate_percent(&self, year: i32) -> f64 {
        self.by_year.get(&year).copied().unwrap_or(0.0)
    }

    /// Fractional return for `year` (`12.5` percent becomes `0.125`).
    pub fn rate(&self, year: i32) -> f64 {
        self.rate_percent(year) / 100.0
    }

    pub fn contains(&self, year: i32) -> bool {
        self.by_year.contains_key(&year)
    }

    pub fn len(&self) -> usize {
        self.by_year.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_year.is_empty()
    }

    pub fn entries(&self) -> Vec<AnnualReturn> {
        self.by_year
            .iter()
            .map(|(&year, &return_percent)| AnnualReturn {
                year,
                return_percent,
            })
            .collect()
    }

    /// Parses `year<delim>percent` lines. Delimiters may be `,` `;` tab or
    /// plain whitespace; `#` starts a comment. A first data line whose year
    /// field is not an integer is taken as a header and skipped.
    pub fn parse_two_column(text: &str) -> Result<Self, ReturnsParseError> {
        let mut table = Self::new();
        let mut seen_data = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            let fields = split_fields(line);
            let [year_field, percent_field] = fields.as_slice() else {
                return Err(ReturnsParseError::MalformedRow {
                    line: line_no,
                    content: line.to_string(),
                });
            };

            let year = match year_field.parse::<i32>() {
                Ok(year) => year,
                Err(_) if !seen_data && percent_field.parse::<f64>().is_err() => {
                    seen_data = true;
                    continue;
                }
                Err(_) => {
                    return Err(ReturnsParseError::InvalidYear {
                        line: line_no,
                        value: year_field.to_string(),
                    });
                }
            };
            seen_data = true;

            let percent = parse_number(percent_field, line_no)?;
            if table.insert(year, percent).is_some() {
                return Err(ReturnsParseError::DuplicateYear {
                    line: line_no,
                    year,
                });
            }
        }

        if table.is_empty() {
            return Err(ReturnsParseError::Empty);
        }
        Ok(table)
    }

    /// Reduces a daily price history (`Date,Open,High,Low,Close,...`) to
    /// calendar-year returns measured from the first to the last close of
    /// each year.
    pub fn from_price_history(text: &str) -> Result<Self, ReturnsParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(&e))?
            .iter()
            .map(str::to_ascii_lowercase)
            .collect();
        if columns.iter().all(String::is_empty) {
            return Err(ReturnsParseError::Empty);
        }
        let date_col = columns.iter().position(|c| c == "date");
        let close_col = columns
            .iter()
            .position(|c| c == "adj close")
            .or_else(|| columns.iter().position(|c| c == "close"));
        let (Some(date_col), Some(close_col)) = (date_col, close_col) else {
            return Err(ReturnsParseError::MissingColumns);
        };

        let mut closes: Vec<(String, i32, f64)> = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| csv_error(&e))?;
            let line_no = record
                .position()
                .map_or(0, |pos| usize::try_from(pos.line()).unwrap_or(usize::MAX));
            let (Some(date), Some(close)) = (record.get(date_col), record.get(close_col)) else {
                return Err(ReturnsParseError::MalformedRow {
                    line: line_no,
                    content: record.iter().collect::<Vec<_>>().join(","),
                });
            };
            if close.is_empty() || close.eq_ignore_ascii_case("null") {
                continue;
            }
            let year = date
                .get(..4)
                .and_then(|y| y.parse::<i32>().ok())
                .ok_or_else(|| ReturnsParseError::InvalidYear {
                    line: line_no,
                    value: date.to_string(),
                })?;
            let close = parse_number(close, line_no)?;
            if close <= 0.0 {
                return Err(ReturnsParseError::NonPositiveClose {
                    line: line_no,
                    value: close,
                });
            }
            closes.push((date.to_string(), year, close));
        }

        closes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut first_last: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
        for (_, year, close) in closes {
            first_last
                .entry(year)
                .and_modify(|(_, last)| *last = close)
                .or_insert((close, close));
        }

        if first_last.is_empty() {
            return Err(ReturnsParseError::Empty);
        }
        Ok(first_last
            .into_iter()
            .map(|(year, (first, last))| (year, (last / first - 1.0) * 100.0))
            .collect())
    }
}

impl FromIterator<(i32, f64)> for ReturnTable {
    fn from_iter<I: IntoIterator<Item = (i32, f64)>>(iter: I) -> Self {
        Self {
            by_year: iter.into_iter().collect(),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    let fields: Vec<&str> = if line.contains([',', ';', '\t']) {
        line.split([',', ';', '\t']).map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };
    // Tolerate a trailing delimiter such as `2001,-27.18,`.
    match fields.as_slice() {
        [head @ .., last] if last.is_empty() => head.to_vec(),
        _ => fields,
    }
}

fn csv_error(err: &csv::Error) -> ReturnsParseError {
    let line = err
        .position()
        .map_or(0, |pos| usize::try_from(pos.line()).unwrap_or(usize::MAX));
    ReturnsParseError::Csv {
        line,
        message: err.to_string(),
    }
}

fn parse_number(value: &str, line: usize) -> Result<f64, ReturnsParseError> {
    let cleaned = value.trim().trim_end_matches('%');
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ReturnsParseError::InvalidNumber {
            line,
            value: value.to_string(),
        }),
    }
}
