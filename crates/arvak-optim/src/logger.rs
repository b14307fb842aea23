//! Append-only iteration history.
//!
//! The CSV layout is positional and consumed by downstream plotting tools:
//!
//! ```text
//! iter,energy,gamma[0],beta[0],gamma[1],beta[1],...
//! ```
//!
//! Coordinates are interleaved by layer across all active vectors. Every
//! row is flushed as soon as it is written, so an interrupted run loses at
//! most the iteration in flight.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, OptimResult};
use crate::params::ParameterSet;

/// One accepted optimizer step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration index as reported by the driver.
    pub iteration: usize,
    /// Energy at the accepted point.
    pub energy: Complex64,
    /// Coordinates, interleaved by layer.
    pub values: Vec<f64>,
}

impl IterationRecord {
    /// Build a record from the current parameters.
    pub fn new(iteration: usize, energy: Complex64, params: &ParameterSet) -> OptimResult<Self> {
        Ok(Self {
            iteration,
            energy,
            values: params.interleaved()?,
        })
    }
}

/// Destination for accepted iterations.
pub trait IterationSink {
    /// Persist one record.
    fn record(&mut self, record: &IterationRecord) -> OptimResult<()>;
}

/// Keeps the history in memory.
impl IterationSink for Vec<IterationRecord> {
    fn record(&mut self, record: &IterationRecord) -> OptimResult<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl IterationSink for NullSink {
    fn record(&mut self, _record: &IterationRecord) -> OptimResult<()> {
        Ok(())
    }
}

/// Column layout derived from the active parameter vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    names: Vec<String>,
    depth: usize,
}

impl ColumnLayout {
    /// Layout for `params`. Requires uniform depth.
    pub fn from_params(params: &ParameterSet) -> OptimResult<Self> {
        Ok(Self {
            names: params.names().into_iter().map(String::from).collect(),
            depth: params.depth()?,
        })
    }

    /// Number of coordinate columns.
    pub fn coordinate_columns(&self) -> usize {
        self.names.len() * self.depth
    }

    /// Total number of columns, including `iter` and `energy`.
    pub fn width(&self) -> usize {
        2 + self.coordinate_columns()
    }

    /// Header cells.
    pub fn header(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(self.width());
        cells.push("iter".to_string());
        cells.push("energy".to_string());
        for layer in 0..self.depth {
            for name in &self.names {
                cells.push(format!("{name}[{layer}]"));
            }
        }
        cells
    }

    fn header_line(&self) -> String {
        self.header().join(",")
    }
}

/// Render an energy the way the plotting scripts parse it.
///
/// Real energies are written as plain numbers, anything with an imaginary
/// part as a Python complex literal such as `(-1.25+0.5j)`.
pub fn format_energy(energy: Complex64) -> String {
    if energy.im == 0.0 {
        energy.re.to_string()
    } else {
        format!("({}{:+}j)", energy.re, energy.im)
    }
}

/// CSV writer for iteration history.
pub struct IterationLogger<W: Write> {
    writer: BufWriter<W>,
    layout: ColumnLayout,
    rows: usize,
}

impl IterationLogger<File> {
    /// Open `path` for appending.
    ///
    /// The header is written only if the file is new or empty. An existing
    /// history with a different header is rejected rather than mixed.
    pub fn open(path: impl AsRef<Path>, layout: ColumnLayout) -> OptimResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        if file.metadata()?.len() == 0 {
            tracing::debug!(path = %path.display(), "starting new iteration log");
            return Self::from_writer(file, layout);
        }

        let mut existing = String::new();
        BufReader::new(File::open(path)?).read_line(&mut existing)?;
        let existing = existing.trim_end();
        if existing != layout.header_line() {
            return Err(OptimError::InvalidConfig(format!(
                "{} already holds a history with columns '{existing}'",
                path.display()
            )));
        }

        tracing::debug!(path = %path.display(), "appending to existing iteration log");
        Ok(Self {
            writer: BufWriter::new(file),
            layout,
            rows: 0,
        })
    }
}

impl<W: Write> IterationLogger<W> {
    /// Wrap a writer and emit the header immediately.
    pub fn from_writer(writer: W, layout: ColumnLayout) -> OptimResult<Self> {
        let mut writer = BufWriter::new(writer);
        writeln!(writer, "{}", layout.header_line())?;
        writer.flush()?;
        Ok(Self {
            writer,
            layout,
            rows: 0,
        })
    }

    /// Column layout in use.
    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Rows written through this logger.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> OptimResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| OptimError::Io(e.into_error()))
    }
}

impl<W: Write> IterationSink for IterationLogger<W> {
    fn record(&mut self, record: &IterationRecord) -> OptimResult<()> {
        let expected = self.layout.coordinate_columns();
        if record.values.len() != expected {
            return Err(OptimError::shape(
                "iteration log row",
                expected,
                record.values.len(),
            ));
        }

        let mut line = format!("{},{}", record.iteration, format_energy(record.energy));
        for value in &record.values {
            line.push(',');
            line.push_str(&value.to_string());
        }
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{PHI, THETA};

    fn layout(vectors: usize, depth: usize) -> ColumnLayout {
        let names = ["gamma", "beta", "phi", "theta"];
        let params = ParameterSet::from_vectors(
            names[..vectors]
                .iter()
                .map(|&n| (n, vec![0.0; depth])),
        );
        ColumnLayout::from_params(&params).unwrap()
    }

    #[test]
    fn test_header_interleaves_vectors() {
        let header = layout(4, 2).header();
        assert_eq!(
            header,
            vec![
                "iter", "energy", "gamma[0]", "beta[0]", "phi[0]", "theta[0]", "gamma[1]",
                "beta[1]", "phi[1]", "theta[1]",
            ]
        );
    }

    #[test]
    fn test_header_width() {
        for vectors in 2..=4 {
            for depth in 1..=5 {
                let l = layout(vectors, depth);
                assert_eq!(l.header().len(), 2 + vectors * depth);
                assert_eq!(l.width(), l.header().len());
            }
        }
    }

    #[test]
    fn test_rows_follow_header() {
        let params = ParameterSet::qaoa(vec![0.1, 0.2], vec![0.3, 0.4]);
        let mut logger =
            IterationLogger::from_writer(Vec::new(), ColumnLayout::from_params(&params).unwrap())
                .unwrap();

        logger
            .record(&IterationRecord::new(0, Complex64::new(-1.5, 0.0), &params).unwrap())
            .unwrap();
        logger
            .record(&IterationRecord::new(1, Complex64::new(-1.75, 0.125), &params).unwrap())
            .unwrap();
        assert_eq!(logger.rows_written(), 2);

        let text = String::from_utf8(logger.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "iter,energy,gamma[0],beta[0],gamma[1],beta[1]");
        assert_eq!(lines[1], "0,-1.5,0.1,0.3,0.2,0.4");
        assert_eq!(lines[2], "1,(-1.75+0.125j),0.1,0.3,0.2,0.4");
    }

    #[test]
    fn test_row_width_is_checked() {
        let mut logger = IterationLogger::from_writer(Vec::new(), layout(2, 2)).unwrap();
        let record = IterationRecord {
            iteration: 0,
            energy: Complex64::new(0.0, 0.0),
            values: vec![0.0; 3],
        };
        assert!(matches!(
            logger.record(&record),
            Err(OptimError::ShapeMismatch { .. })
        ));
        assert_eq!(logger.rows_written(), 0);
    }

    #[test]
    fn test_open_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let params = ParameterSet::qaoa(vec![0.5], vec![0.25])
            .with_vector(PHI, vec![1.0])
            .with_vector(THETA, vec![2.0]);
        let columns = ColumnLayout::from_params(&params).unwrap();

        {
            let mut logger = IterationLogger::open(&path, columns.clone()).unwrap();
            logger
                .record(&IterationRecord::new(0, Complex64::new(1.0, 0.0), &params).unwrap())
                .unwrap();
        }
        {
            let mut logger = IterationLogger::open(&path, columns).unwrap();
            logger
                .record(&IterationRecord::new(1, Complex64::new(0.5, 0.0), &params).unwrap())
                .unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "iter,energy,gamma[0],beta[0],phi[0],theta[0]");
        assert_eq!(lines[1], "0,1,0.5,0.25,1,2");
        assert_eq!(lines[2], "1,0.5,0.5,0.25,1,2");
    }

    #[test]
    fn test_open_rejects_foreign_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        std::fs::write(&path, "iter,energy,gamma[0],beta[0]\n0,1,0,0\n").unwrap();

        let err = IterationLogger::open(&path, layout(2, 3)).err().unwrap();
        assert!(matches!(err, OptimError::InvalidConfig(_)));
        // The existing history is untouched.
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "iter,energy,gamma[0],beta[0]\n0,1,0,0\n"
        );
    }

    #[test]
    fn test_format_energy() {
        assert_eq!(format_energy(Complex64::new(-0.5, 0.0)), "-0.5");
        assert_eq!(format_energy(Complex64::new(1.0, -2.0)), "(1-2j)");
    }
}
