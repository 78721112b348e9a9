//! Simulator log parser
//!
//! Simulator output is line-oriented: a `Time = <step>` header opens a time
//! bucket, and each record inside a bucket starts with an observable name on
//! its own line. Three record shapes exist, distinguished by the lines that
//! follow the key (the key line counts as line 0):
//!
//! - **scalar** (3 lines): value line (first token is the mean, any further
//!   tokens are ignored), then a blank line.
//! - **vector** (6 lines): one component line that is ignored, three lines of
//!   exactly two tokens, then a blank line; the emitted value is the first
//!   token of the last 2-token line, the vector magnitude.
//! - **tensor** (5 lines): three lines of exactly six tokens, then a blank
//!   line; tensors are not folded into the store and are skipped whole.
//!
//! Every bucket must produce the same observable-name set as the first bucket
//! (or as `expected_observables` when the caller supplies one); a disagreement
//! is a schema error for the whole log, not a partial result.

use rustc_hash::FxHashMap;

use crate::{Error, Result};

/// Parsed contents of one simulator log.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLog {
    times: Vec<i64>,
    observables: Vec<String>,
    series: FxHashMap<i64, FxHashMap<String, f64>>,
}

impl ParsedLog {
    /// Time steps in order of appearance.
    #[must_use]
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    /// Observable names in first-bucket insertion order.
    #[must_use]
    pub fn observables(&self) -> &[String] {
        &self.observables
    }

    /// All parsed values, keyed by time step then observable name.
    #[must_use]
    pub const fn series(&self) -> &FxHashMap<i64, FxHashMap<String, f64>> {
        &self.series
    }

    /// Look up a single value.
    #[must_use]
    pub fn value(&self, time: i64, observable: &str) -> Option<f64> {
        self.series.get(&time).and_then(|b| b.get(observable)).copied()
    }
}

/// One record consumed from the cursor position.
enum Record {
    TimeHeader(i64),
    Scalar(f64),
    Vector(f64),
    Tensor,
}

/// Line-cursor over the raw log text.
struct Cursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    /// Line at an offset from the cursor, or a truncation error pointing at
    /// the index where the text ran out.
    fn line_at(&self, offset: usize, expect: &str) -> Result<&'a str> {
        self.lines
            .get(self.pos + offset)
            .copied()
            .ok_or_else(|| Error::MalformedLog {
                line: self.lines.len(),
                message: format!("unexpected end of input, expected {expect}"),
            })
    }

    fn malformed(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::MalformedLog {
            line: self.pos + offset,
            message: message.into(),
        }
    }

    fn parse_time_header(tokens: &[&str]) -> Option<i64> {
        match tokens {
            ["Time", "=", step] => step.parse().ok(),
            _ => None,
        }
    }

    /// Parse the record starting at the cursor and advance past it.
    fn next_record(&mut self) -> Result<Record> {
        let key_line = self.line_at(0, "a record")?;
        let key = key_line.trim();

        let tokens: Vec<&str> = key.split_whitespace().collect();
        if let Some(step) = Self::parse_time_header(&tokens) {
            self.pos += 1;
            return Ok(Record::TimeHeader(step));
        }

        let value_line = self.line_at(1, "a value line")?;
        let value_tokens: Vec<&str> = value_line.split_whitespace().collect();

        if value_tokens.len() == 6 {
            // Tensor: two more 6-token lines, then a blank.
            for offset in 2..=3 {
                let line = self.line_at(offset, "a 6-token tensor line")?;
                if line.split_whitespace().count() != 6 {
                    return Err(self.malformed(offset, "expected a 6-token tensor line"));
                }
            }
            let terminator = self.line_at(4, "a blank line after the tensor")?;
            if !terminator.trim().is_empty() {
                return Err(self.malformed(4, "expected a blank line after the tensor"));
            }
            self.pos += 5;
            return Ok(Record::Tensor);
        }

        if self.line_at(2, "the rest of the record")?.trim().is_empty() {
            // Scalar: first token of the value line is the mean.
            let token = value_tokens
                .first()
                .ok_or_else(|| self.malformed(1, "expected a value line, got a blank line"))?;
            let value: f64 = token
                .parse()
                .map_err(|_| self.malformed(1, format!("'{token}' is not a number")))?;
            self.pos += 3;
            return Ok(Record::Scalar(value));
        }

        // Vector: component line, three 2-token lines, blank terminator.
        for offset in 2..=4 {
            let line = self.line_at(offset, "a 2-token vector line")?;
            if line.split_whitespace().count() != 2 {
                return Err(self.malformed(offset, "expected a 2-token vector line"));
            }
        }
        let terminator = self.line_at(5, "a blank line after the vector")?;
        if !terminator.trim().is_empty() {
            return Err(self.malformed(5, "expected a blank line after the vector"));
        }
        let magnitude_line = self.line_at(4, "the vector magnitude line")?;
        let token = magnitude_line.split_whitespace().next().unwrap_or_default();
        let value: f64 = token
            .parse()
            .map_err(|_| self.malformed(4, format!("'{token}' is not a number")))?;
        self.pos += 6;
        Ok(Record::Vector(value))
    }
}

/// In-flight state for the bucket currently being filled.
struct Bucket {
    time: i64,
    values: FxHashMap<String, f64>,
    order: Vec<String>,
}

fn sorted_names<I: IntoIterator<Item = String>>(names: I) -> Vec<String> {
    let mut v: Vec<String> = names.into_iter().collect();
    v.sort();
    v
}

/// Parse one simulator log into per-time observable values.
///
/// When `expected_observables` is supplied, every time bucket is checked
/// against it (as a set); otherwise the first bucket defines the reference
/// set. An empty log parses to an empty [`ParsedLog`].
///
/// # Errors
///
/// Returns [`Error::MalformedLog`] when a record matches none of the three
/// shapes, appears before any `Time =` header, or is cut off by the end of
/// the text, and [`Error::SchemaMismatch`] when two buckets disagree on their
/// observable set.
pub fn parse(text: &str, expected_observables: Option<&[String]>) -> Result<ParsedLog> {
    let mut cursor = Cursor::new(text);

    let mut times: Vec<i64> = Vec::new();
    let mut observables: Vec<String> = Vec::new();
    let mut series: FxHashMap<i64, FxHashMap<String, f64>> = FxHashMap::default();

    let mut reference: Option<Vec<String>> = expected_observables.map(|e| sorted_names(e.to_vec()));
    let mut current: Option<Bucket> = None;

    let mut close_bucket = |bucket: Bucket,
                            reference: &mut Option<Vec<String>>,
                            observables: &mut Vec<String>|
     -> Result<()> {
        let found = sorted_names(bucket.order.iter().cloned());
        match reference {
            Some(expected) if *expected != found => {
                return Err(Error::SchemaMismatch(format!(
                    "time {}: observables {found:?} do not match {expected:?}",
                    bucket.time
                )));
            }
            Some(_) => {}
            None => *reference = Some(found),
        }
        if observables.is_empty() {
            *observables = bucket.order;
        }
        series.insert(bucket.time, bucket.values);
        Ok(())
    };

    while let Some(line) = cursor.peek() {
        if line.trim().is_empty() {
            cursor.pos += 1;
            continue;
        }
        let key = line.trim().to_string();
        let key_pos = cursor.pos;
        match cursor.next_record()? {
            Record::TimeHeader(step) => {
                if let Some(bucket) = current.take() {
                    close_bucket(bucket, &mut reference, &mut observables)?;
                }
                if times.contains(&step) {
                    return Err(Error::MalformedLog {
                        line: key_pos,
                        message: format!("duplicate time step {step}"),
                    });
                }
                times.push(step);
                current = Some(Bucket {
                    time: step,
                    values: FxHashMap::default(),
                    order: Vec::new(),
                });
            }
            Record::Scalar(value) | Record::Vector(value) => {
                let Some(bucket) = current.as_mut() else {
                    return Err(Error::MalformedLog {
                        line: key_pos,
                        message: format!("record '{key}' appears before any 'Time =' header"),
                    });
                };
                if bucket.values.insert(key.clone(), value).is_none() {
                    bucket.order.push(key);
                }
            }
            Record::Tensor => {
                if current.is_none() {
                    return Err(Error::MalformedLog {
                        line: key_pos,
                        message: format!("record '{key}' appears before any 'Time =' header"),
                    });
                }
            }
        }
    }

    if let Some(bucket) = current.take() {
        close_bucket(bucket, &mut reference, &mut observables)?;
    }
    if times.is_empty() {
        if let Some(expected) = expected_observables {
            observables = expected.to_vec();
        }
    }

    Ok(ParsedLog {
        times,
        observables,
        series,
    })
}
