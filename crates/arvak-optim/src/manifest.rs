//! JSON run manifest written next to an iteration log.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::OptimResult;
use crate::params::ParameterSet;

/// Which driver produced a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    GradientDescent,
    BoxedQuasiNewton,
}

/// Summary of a finished run.
///
/// A diverged run can end with NaN or infinite values, which JSON cannot
/// hold as numbers; those are written as the strings `"NaN"`, `"inf"` and
/// `"-inf"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(with = "lossless::complex")]
    pub energy: Complex64,
    pub iterations: u64,
    pub converged: bool,
    #[serde(with = "lossless::params")]
    pub params: ParameterSet,
}

mod lossless {
    use serde::{Deserialize, Serialize};

    /// A float that survives JSON even when it is not finite.
    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Number {
        Finite(f64),
        Text(String),
    }

    impl From<f64> for Number {
        fn from(v: f64) -> Self {
            if v.is_finite() {
                Number::Finite(v)
            } else {
                Number::Text(v.to_string())
            }
        }
    }

    impl Number {
        fn value<E: serde::de::Error>(self) -> Result<f64, E> {
            match self {
                Number::Finite(v) => Ok(v),
                Number::Text(t) => t
                    .parse()
                    .map_err(|_| E::custom(format!("not a number: {t}"))),
            }
        }
    }

    pub mod complex {
        use num_complex::Complex64;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::Number;

        #[derive(Serialize, Deserialize)]
        struct Parts {
            re: Number,
            im: Number,
        }

        pub fn serialize<S: Serializer>(value: &Complex64, s: S) -> Result<S::Ok, S::Error> {
            Parts {
                re: value.re.into(),
                im: value.im.into(),
            }
            .serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Complex64, D::Error> {
            let parts = Parts::deserialize(d)?;
            Ok(Complex64::new(
                parts.re.value::<D::Error>()?,
                parts.im.value::<D::Error>()?,
            ))
        }
    }

    pub mod params {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::Number;
        use crate::params::ParameterSet;

        #[derive(Serialize, Deserialize)]
        struct Vector {
            name: String,
            values: Vec<Number>,
        }

        pub fn serialize<S: Serializer>(value: &ParameterSet, s: S) -> Result<S::Ok, S::Error> {
            value
                .iter()
                .map(|(name, values)| Vector {
                    name: name.to_string(),
                    values: values.iter().map(|&v| v.into()).collect(),
                })
                .collect::<Vec<_>>()
                .serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ParameterSet, D::Error> {
            let vectors = Vec::<Vector>::deserialize(d)?;
            let mut set = ParameterSet::new();
            for v in vectors {
                let values = v
                    .values
                    .into_iter()
                    .map(Number::value::<D::Error>)
                    .collect::<Result<Vec<_>, _>>()?;
                set.insert(v.name, values);
            }
            Ok(set)
        }
    }
}

/// Metadata describing one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub driver: Driver,
    /// Layers per vector.
    pub depth: usize,
    pub initial: ParameterSet,
    pub config: RunConfig,
    /// Filled in once the driver returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl RunManifest {
    /// Manifest for a run starting now.
    pub fn new(driver: Driver, initial: &ParameterSet, config: &RunConfig) -> OptimResult<Self> {
        Ok(Self {
            created_at: Utc::now(),
            driver,
            depth: initial.depth()?,
            initial: initial.clone(),
            config: config.clone(),
            summary: None,
        })
    }

    /// Attach the result of the run.
    pub fn finish(mut self, summary: RunSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Conventional manifest path for a history file: `<log>.manifest.json`.
    pub fn path_for(log: impl AsRef<Path>) -> PathBuf {
        let mut name = log.as_ref().as_os_str().to_owned();
        name.push(".manifest.json");
        PathBuf::from(name)
    }

    /// Write as pretty-printed JSON, replacing any existing file.
    pub fn write(&self, path: impl AsRef<Path>) -> OptimResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a manifest back.
    pub fn read(path: impl AsRef<Path>) -> OptimResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{BETA, GAMMA};
    use crate::quasi_newton::Bounds;

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            RunManifest::path_for("runs/history.csv"),
            PathBuf::from("runs/history.csv.manifest.json")
        );
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.manifest.json");
        let config = RunConfig::default();
        let initial = ParameterSet::qaoa(vec![0.6, 0.6], vec![0.6, 0.6]);

        let manifest = RunManifest::new(Driver::GradientDescent, &initial, &config)
            .unwrap()
            .finish(RunSummary {
                energy: Complex64::new(-1.0, 0.0),
                iterations: 12,
                converged: true,
                params: initial.clone(),
            });
        manifest.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"driver\": \"gradient_descent\""));
        assert!(text.contains("\"depth\": 2"));

        let back = RunManifest::read(&path).unwrap();
        assert_eq!(back.created_at, manifest.created_at);
        assert_eq!(back.driver, Driver::GradientDescent);
        assert_eq!(back.initial.names(), vec!["gamma", "beta"]);
        let summary = back.summary.unwrap();
        assert_eq!(summary.iterations, 12);
        assert!(summary.converged);
    }

    #[test]
    fn test_infinite_bounds_and_diverged_summary_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.manifest.json");
        let mut config = RunConfig::default();
        config.quasi_newton.bounds = Some(Bounds::non_negative(2));
        let initial = ParameterSet::qaoa(vec![0.6], vec![0.6]);

        RunManifest::new(Driver::BoxedQuasiNewton, &initial, &config)
            .unwrap()
            .finish(RunSummary {
                energy: Complex64::new(f64::NAN, f64::NEG_INFINITY),
                iterations: 3,
                converged: false,
                params: ParameterSet::qaoa(vec![f64::INFINITY], vec![0.25]),
            })
            .write(&path)
            .unwrap();

        let back = RunManifest::read(&path).unwrap();
        assert_eq!(back.config.quasi_newton.bounds, Some(Bounds::non_negative(2)));
        let summary = back.summary.unwrap();
        assert!(summary.energy.re.is_nan());
        assert_eq!(summary.energy.im, f64::NEG_INFINITY);
        assert_eq!(summary.params.get(GAMMA), Some(&[f64::INFINITY][..]));
        assert_eq!(summary.params.get(BETA), Some(&[0.25][..]));
    }

    #[test]
    fn test_ragged_initial_rejected() {
        let initial = ParameterSet::qaoa(vec![0.6, 0.6], vec![0.6]);
        assert!(RunManifest::new(Driver::BoxedQuasiNewton, &initial, &RunConfig::default()).is_err());
    }
}
