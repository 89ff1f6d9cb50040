use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One sample of container statistics collected while a call runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, u64>,
}

/// Bound a stats series to at most `max_samples` entries.
///
/// Samples are picked at evenly spaced positions across the whole series, so
/// the first and last samples always survive and chronological order is
/// preserved. A series already within the bound is returned untouched.
pub fn decimate(max_samples: usize, stats: Vec<Stat>) -> Vec<Stat> {
    let len = stats.len();
    if len <= max_samples {
        return stats;
    }
    match max_samples {
        0 => return Vec::new(),
        1 => return stats.into_iter().take(1).collect(),
        _ => {}
    }

    let last = len - 1;
    let step = max_samples - 1;
    let mut picks = (0..max_samples).map(|i| i * last / step).peekable();

    stats
        .into_iter()
        .enumerate()
        .filter_map(|(idx, stat)| match picks.peek() {
            Some(&pick) if pick == idx => {
                picks.next();
                Some(stat)
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(n: usize) -> Vec<Stat> {
        let start = Utc::now();
        (0..n)
            .map(|i| Stat {
                timestamp: start + Duration::milliseconds(i as i64 * 100),
                metrics: BTreeMap::from([("mem_usage".to_string(), i as u64)]),
            })
            .collect()
    }

    #[test]
    fn test_short_series_untouched() {
        let stats = series(10);
        assert_eq!(decimate(240, stats.clone()), stats);
    }

    #[test]
    fn test_long_series_bounded_and_ordered() {
        let stats = series(1000);
        let first = stats[0].clone();
        let last = stats[999].clone();

        let out = decimate(240, stats);
        assert_eq!(out.len(), 240);
        assert_eq!(out[0], first);
        assert_eq!(out[239], last);
        assert!(out.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_one_over_bound() {
        let out = decimate(240, series(241));
        assert_eq!(out.len(), 240);
    }

    #[test]
    fn test_degenerate_bounds() {
        assert!(decimate(0, series(5)).is_empty());
        assert_eq!(decimate(1, series(5)).len(), 1);
    }
}
