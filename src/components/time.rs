//! Training time strings such as `550000ba`, `1ep` or `0.5dur`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::Scalar;
use crate::instantiate::{FromResolved, Resolved};

/// A point or span in training time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainingTime {
    Epochs(u64),
    Batches(u64),
    Samples(u64),
    Tokens(u64),
    /// Fraction of the whole run, in (0, 1].
    Fraction(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("empty time string")]
    Empty,

    #[error("time `{0}` has no unit (expected one of ep, ba, sp, tok, dur)")]
    MissingUnit(String),

    #[error("time `{input}` has unknown unit `{unit}`")]
    UnknownUnit { input: String, unit: String },

    #[error("time `{0}` has an invalid number")]
    InvalidNumber(String),

    #[error("time `{0}` must be a fraction in (0, 1]")]
    FractionOutOfRange(String),
}

impl TrainingTime {
    pub fn unit(&self) -> &'static str {
        match self {
            TrainingTime::Epochs(_) => "ep",
            TrainingTime::Batches(_) => "ba",
            TrainingTime::Samples(_) => "sp",
            TrainingTime::Tokens(_) => "tok",
            TrainingTime::Fraction(_) => "dur",
        }
    }

    /// True for a zero count, e.g. `0ba`.
    pub fn is_zero(&self) -> bool {
        match *self {
            TrainingTime::Epochs(n)
            | TrainingTime::Batches(n)
            | TrainingTime::Samples(n)
            | TrainingTime::Tokens(n) => n == 0,
            TrainingTime::Fraction(_) => false,
        }
    }
}

impl FromStr for TrainingTime {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.trim().chars().filter(|c| *c != '_').collect();
        if compact.is_empty() {
            return Err(TimeParseError::Empty);
        }

        // The unit is the trailing alphabetic run, so `1e3ba` keeps its exponent.
        let split = compact
            .rfind(|c: char| !c.is_ascii_alphabetic())
            .map_or(0, |idx| idx + 1);
        let (number, unit) = compact.split_at(split);
        if unit.is_empty() {
            return Err(TimeParseError::MissingUnit(s.to_string()));
        }
        if number.is_empty() {
            return Err(TimeParseError::InvalidNumber(s.to_string()));
        }

        let count = || parse_count(number).ok_or_else(|| TimeParseError::InvalidNumber(s.to_string()));
        match unit.to_ascii_lowercase().as_str() {
            "ep" => Ok(TrainingTime::Epochs(count()?)),
            "ba" => Ok(TrainingTime::Batches(count()?)),
            "sp" => Ok(TrainingTime::Samples(count()?)),
            "tok" => Ok(TrainingTime::Tokens(count()?)),
            "dur" => {
                let fraction = number
                    .parse::<f64>()
                    .map_err(|_| TimeParseError::InvalidNumber(s.to_string()))?;
                if fraction > 0.0 && fraction <= 1.0 {
                    Ok(TrainingTime::Fraction(fraction))
                } else {
                    Err(TimeParseError::FractionOutOfRange(s.to_string()))
                }
            }
            other => Err(TimeParseError::UnknownUnit {
                input: s.to_string(),
                unit: other.to_string(),
            }),
        }
    }
}

/// A whole, non-negative count. Exponent forms (`1e3`, `2.5e3`) are accepted
/// when they denote an integer.
fn parse_count(number: &str) -> Option<u64> {
    if let Ok(n) = number.parse::<u64>() {
        return Some(n);
    }
    let value = number.parse::<f64>().ok()?;
    let integral = value.is_finite() && value >= 0.0 && value.fract() == 0.0;
    (integral && value <= u64::MAX as f64).then_some(value as u64)
}

impl fmt::Display for TrainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingTime::Epochs(n)
            | TrainingTime::Batches(n)
            | TrainingTime::Samples(n)
            | TrainingTime::Tokens(n) => write!(f, "{}{}", n, self.unit()),
            TrainingTime::Fraction(x) => write!(f, "{}{}", x, self.unit()),
        }
    }
}

impl Serialize for TrainingTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Strings parse with the unit grammar; a bare integer counts epochs.
impl FromResolved for TrainingTime {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Scalar(Scalar::String(s)) => Ok(s.parse()?),
            Resolved::Scalar(Scalar::Int(n)) => u64::try_from(n)
                .map(TrainingTime::Epochs)
                .map_err(|_| anyhow::anyhow!("epoch count {n} must not be negative")),
            other => anyhow::bail!("expected a time string like `10ep`, found {}", other.kind()),
        }
    }
}
