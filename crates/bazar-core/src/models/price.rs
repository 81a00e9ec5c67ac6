//! Listing price

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Non-negative decimal price with two fractional digits, stored as cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price {
    cents: i64,
}

impl Price {
    #[must_use]
    pub const fn from_cents(cents: i64) -> Option<Self> {
        if cents < 0 {
            None
        } else {
            Some(Self { cents })
        }
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.cents
    }

    /// Parse user-entered price text such as `12`, `12.5` or `12,50`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("price is required".to_string());
        }

        let normalized = text.replace(',', ".");
        let (units, fraction) = normalized
            .split_once('.')
            .unwrap_or((normalized.as_str(), ""));

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (units.is_empty() && fraction.is_empty())
            || !all_digits(units)
            || !all_digits(fraction)
        {
            return Err(format!("'{text}' is not a valid price"));
        }
        if fraction.len() > 2 {
            return Err(format!("'{text}' has more than two decimal places"));
        }

        let units: i64 = if units.is_empty() {
            0
        } else {
            units
                .parse()
                .map_err(|_| format!("'{text}' is too large"))?
        };
        let fraction_cents: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().unwrap_or(0) * 10,
            _ => fraction.parse::<i64>().unwrap_or(0),
        };

        units
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction_cents))
            .map(|cents| Self { cents })
            .ok_or_else(|| format!("'{text}' is too large"))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn from_f64(value: f64) -> Result<Self, String> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{value} is not a valid price"));
        }
        let cents = (value * 100.0).round();
        if cents > i64::MAX as f64 {
            return Err(format!("{value} is too large"));
        }
        Ok(Self {
            cents: cents as i64,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl FromStr for Price {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Self::from_f64(value),
            Raw::Text(text) => Self::parse(&text),
        }
        .map_err(serde::de::Error::custom)
    }
}
