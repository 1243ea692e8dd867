//! Subsystem size rankings.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Big,
    Medium,
    Small,
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeBucket::Big => write!(f, "big"),
            SizeBucket::Medium => write!(f, "medium"),
            SizeBucket::Small => write!(f, "small"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeRanking {
    pub subsystem: String,
    pub total_lines: u64,
    /// 1-based
    pub rank: usize,
    pub total_subsystems: usize,
    /// Percentage of all ranked lines, two decimals
    pub share: f64,
    pub bucket: SizeBucket,
}

/// Rank subsystems by size, largest first (ties by name), and split them
/// into thirds. The remainder goes to `big` first, then `medium`.
/// Subsystems without lines are not ranked.
pub fn size_rankings<I, S>(sizes: I) -> Vec<SizeRanking>
where
    I: IntoIterator<Item = (S, u64)>,
    S: Into<String>,
{
    let mut sized: Vec<(String, u64)> = sizes
        .into_iter()
        .map(|(name, lines)| (name.into(), lines))
        .filter(|(_, lines)| *lines > 0)
        .collect();
    sized.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let n = sized.len();
    let base = n / 3;
    let remainder = n % 3;
    let big = base + usize::from(remainder >= 1);
    let medium = base + usize::from(remainder >= 2);
    let total: u64 = sized.iter().map(|(_, l)| l).sum();

    sized
        .into_iter()
        .enumerate()
        .map(|(i, (subsystem, total_lines))| {
            let bucket = if i < big {
                SizeBucket::Big
            } else if i < big + medium {
                SizeBucket::Medium
            } else {
                SizeBucket::Small
            };
            SizeRanking {
                subsystem,
                total_lines,
                rank: i + 1,
                total_subsystems: n,
                share: (total_lines as f64 * 10_000.0 / total as f64).round() / 100.0,
                bucket,
            }
        })
        .collect()
}
