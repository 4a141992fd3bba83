//! Per-frame measurement input
//!
//! Reads newline-delimited JSON from the landmark extractor:
//! `{"ear":0.27,"mar":0.31,"headPitchDeg":-3.2,"headYawDeg":4.0}` for a face,
//! `null` or `{"face":false}` when no face was found.

use dms::RawMeasurement;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

/// Measurement source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// One frame of input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Face(RawMeasurement),
    NoFace,
}

/// Parse one line; `Ok(None)` for a blank line
pub fn parse_line(line: &str, line_no: u64) -> Result<Option<Input>, SourceError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parse_err = |source| SourceError::Parse { line: line_no, source };
    let value: Value = serde_json::from_str(line).map_err(parse_err)?;
    if value.is_null() || value.get("face") == Some(&Value::Bool(false)) {
        return Ok(Some(Input::NoFace));
    }

    let raw: RawMeasurement = serde_json::from_value(value).map_err(parse_err)?;
    Ok(Some(Input::Face(raw)))
}

/// Line-oriented JSON measurement reader
pub struct MeasurementSource<R> {
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
}

impl MeasurementSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> MeasurementSource<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line_no: 0, skipped: 0 }
    }

    /// Next frame; `Ok(None)` at end of input. Malformed lines are logged and skipped.
    pub async fn next_input(&mut self) -> Result<Option<Input>, SourceError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            match parse_line(&line, self.line_no) {
                Ok(Some(input)) => return Ok(Some(input)),
                Ok(None) => {}
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, "Skipping malformed measurement");
                }
            }
        }
        Ok(None)
    }

    /// Lines read so far
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
