use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// CPU share expressed in thousandths of a CPU.
///
/// The string form is what user code sees in `FN_CPUS`, so it is kept stable:
/// empty for zero and `"<n>m"` otherwise, whole CPUs included (`"2000m"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MilliCpus(pub u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid cpu quantity: {0:?}")]
pub struct ParseCpusError(pub String);

impl MilliCpus {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MilliCpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => Ok(()),
            m => write!(f, "{m}m"),
        }
    }
}

impl FromStr for MilliCpus {
    type Err = ParseCpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(MilliCpus(0));
        }
        let err = || ParseCpusError(s.to_string());

        if let Some(milli) = s.strip_suffix('m') {
            return milli.parse::<u64>().map(MilliCpus).map_err(|_| err());
        }

        // Decimal CPUs, at most millicpu precision.
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if frac.len() > 3 || (whole.is_empty() && frac.is_empty()) {
            return Err(err());
        }
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<3}");
            padded.parse().map_err(|_| err())?
        };
        whole
            .checked_mul(1000)
            .and_then(|w| w.checked_add(frac))
            .map(MilliCpus)
            .ok_or_else(err)
    }
}

impl TryFrom<String> for MilliCpus {
    type Error = ParseCpusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MilliCpus> for String {
    fn from(value: MilliCpus) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(MilliCpus(0).to_string(), "");
        assert_eq!(MilliCpus(2000).to_string(), "2000m");
        assert_eq!(MilliCpus(1500).to_string(), "1500m");
        assert_eq!(MilliCpus(100).to_string(), "100m");
    }

    #[test]
    fn test_parse() {
        assert_eq!("".parse::<MilliCpus>().unwrap(), MilliCpus(0));
        assert_eq!("500m".parse::<MilliCpus>().unwrap(), MilliCpus(500));
        assert_eq!("2".parse::<MilliCpus>().unwrap(), MilliCpus(2000));
        assert_eq!("1.5".parse::<MilliCpus>().unwrap(), MilliCpus(1500));
        assert_eq!("0.25".parse::<MilliCpus>().unwrap(), MilliCpus(250));
        assert!("1.2345".parse::<MilliCpus>().is_err());
        assert!("lots".parse::<MilliCpus>().is_err());
        assert!(".".parse::<MilliCpus>().is_err());
    }

    #[test]
    fn test_string_form_round_trips() {
        for m in [MilliCpus(0), MilliCpus(250), MilliCpus(2000)] {
            assert_eq!(m.to_string().parse::<MilliCpus>().unwrap(), m);
        }
        assert!(MilliCpus(0).is_zero());
        assert!(!MilliCpus(1).is_zero());
    }
}
