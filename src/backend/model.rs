//! Query result types.

use std::collections::BTreeMap;
use std::fmt;

/// Label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A label set identifying one series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metric(pub BTreeMap<String, String>);

impl Metric {
    pub fn name(&self) -> Option<&str> {
        self.0.get(METRIC_NAME_LABEL).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metric {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Renders as `name{a="1", b="2"}`; the braces are dropped when only the name is present.
impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<_> = self
            .0
            .iter()
            .filter(|(k, _)| k.as_str() != METRIC_NAME_LABEL)
            .collect();

        match self.name() {
            Some(name) if labels.is_empty() => return f.write_str(name),
            Some(name) => f.write_str(name)?,
            None => {}
        }

        f.write_str("{")?;
        for (i, (k, v)) in labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        f.write_str("}")
    }
}

/// One value of one series at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Metric,
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl Sample {
    /// Render as `<label-set> <value> <timestamp>`.
    pub fn line(&self) -> String {
        format!(
            "{} {} {}",
            self.metric,
            format_value(self.value),
            self.timestamp_ms
        )
    }
}

/// One series with several points, as returned by range queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub metric: Metric,
    pub points: Vec<(i64, f64)>,
}

/// Discriminated query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Vector(Vec<Sample>),
    Matrix(Vec<Series>),
    Scalar { timestamp_ms: i64, value: f64 },
    String { timestamp_ms: i64, value: String },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
            Value::Scalar { .. } => "scalar",
            Value::String { .. } => "string",
        }
    }
}

/// Shortest decimal form, with `NaN`, `+Inf` and `-Inf` for the special values.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
