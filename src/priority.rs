//! Priority mapping
//!
//! Two sources, two strategies:
//!
//! - Jira-based sources expose a priority *name*; [`map_priority_label`]
//!   looks it up in a fixed table.
//! - TestRail exposes numbered priorities with one flagged as the project
//!   default; [`rescale`] places every priority on the destination's small
//!   scale relative to that default.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Highest level a rescaled priority can reach
const MAX_LEVEL: i64 = 3;

/// Map a priority label to the destination priority
///
/// Total function: unknown labels map to `"normal"`.
///
/// ```
/// use testcase_migrator::priority::map_priority_label;
///
/// assert_eq!(map_priority_label("Blocker"), "Blocker");
/// assert_eq!(map_priority_label("Highest"), "important");
/// assert_eq!(map_priority_label("Foo"), "normal");
/// ```
pub fn map_priority_label(label: &str) -> &'static str {
    match label {
        "Critical" | "Blocker" => "Blocker",
        "Highest" => "important",
        "High" => "high",
        "Medium" => "normal",
        "Low" | "Lowest" => "low",
        _ => "normal",
    }
}

/// A numbered priority as defined by the source project
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourcePriority {
    pub id: u64,
    /// Position on the source scale; larger is more urgent
    #[serde(rename = "priority")]
    pub rank: i64,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Rank of the source's default priority
///
/// The priority flagged default wins, then one named "Medium", else 0.
pub fn default_rank(priorities: &[SourcePriority]) -> i64 {
    priorities
        .iter()
        .find(|p| p.is_default)
        .or_else(|| {
            priorities
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case("medium"))
        })
        .map(|p| p.rank)
        .unwrap_or(0)
}

/// Level of one rank relative to the default rank
pub fn rank_level(rank: i64, default_rank: i64) -> i8 {
    if rank < default_rank {
        -1
    } else {
        // Bounded to 0..=MAX_LEVEL, so the narrowing is lossless
        (rank - default_rank).min(MAX_LEVEL) as i8
    }
}

/// Rescale source priorities to destination levels, keyed by priority id
///
/// ```
/// use testcase_migrator::priority::{rescale, SourcePriority};
///
/// let priorities: Vec<SourcePriority> = (1..=5)
///     .map(|rank| SourcePriority {
///         id: rank as u64,
///         rank,
///         name: format!("P{rank}"),
///         is_default: rank == 3,
///     })
///     .collect();
/// let levels = rescale(&priorities);
/// assert_eq!(levels.values().copied().collect::<Vec<_>>(), vec![-1, -1, 0, 1, 2]);
/// ```
pub fn rescale(priorities: &[SourcePriority]) -> BTreeMap<u64, i8> {
    let default = default_rank(priorities);
    priorities
        .iter()
        .map(|p| (p.id, rank_level(p.rank, default)))
        .collect()
}

/// Destination priority name for a rescaled level
pub fn level_name(level: i8) -> &'static str {
    match level {
        i8::MIN..=-1 => "low",
        0 => "normal",
        1 => "high",
        2 => "important",
        _ => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ranked(ranks: impl IntoIterator<Item = i64>, default: i64) -> Vec<SourcePriority> {
        ranks
            .into_iter()
            .map(|rank| SourcePriority {
                id: rank as u64 * 10,
                rank,
                name: format!("P{rank}"),
                is_default: rank == default,
            })
            .collect()
    }

    #[test]
    fn test_label_table() {
        let cases = [
            ("Critical", "Blocker"),
            ("Blocker", "Blocker"),
            ("Highest", "important"),
            ("High", "high"),
            ("Medium", "normal"),
            ("Low", "low"),
            ("Lowest", "low"),
            ("Foo", "normal"),
            ("", "normal"),
        ];
        for (label, expected) in cases {
            assert_eq!(map_priority_label(label), expected, "{label}");
        }
    }

    #[test]
    fn test_rescale_five_levels() {
        let levels = rescale(&ranked(1..=5, 3));
        let expected: BTreeMap<u64, i8> =
            [(10, -1), (20, -1), (30, 0), (40, 1), (50, 2)].into_iter().collect();
        assert_eq!(levels, expected);
    }

    #[test]
    fn test_rescale_clamps_at_three() {
        let levels = rescale(&ranked(1..=7, 3));
        assert_eq!(levels[&70], 3);
        assert_eq!(levels[&60], 3);
        assert_eq!(levels[&50], 2);
    }

    #[test]
    fn test_default_falls_back_to_medium_then_zero() {
        let mut priorities = ranked(1..=3, 0);
        priorities[1].name = "Medium".to_string();
        assert_eq!(default_rank(&priorities), 2);

        let priorities = ranked(1..=3, 0);
        assert_eq!(default_rank(&priorities), 0);
        assert!(rescale(&priorities).values().all(|level| *level >= 1));
    }

    #[test]
    fn test_deserialize_source_priority() {
        let json = r#"{"id": 2, "is_default": true, "name": "2 - Medium", "priority": 2, "short_name": "2 - Med"}"#;
        let priority: SourcePriority = serde_json::from_str(json).expect("priority");
        assert_eq!(priority.rank, 2);
        assert!(priority.is_default);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_name(-1), "low");
        assert_eq!(level_name(0), "normal");
        assert_eq!(level_name(1), "high");
        assert_eq!(level_name(2), "important");
        assert_eq!(level_name(3), "critical");
    }

    proptest! {
        /// Levels stay within -1..=3 and grow with rank
        #[test]
        fn prop_rescale_bounded_and_monotonic(
            count in 1i64..20,
            default in 0i64..20,
        ) {
            let priorities = ranked(1..=count, default);
            let levels = rescale(&priorities);

            let mut previous = i8::MIN;
            for p in &priorities {
                let level = levels[&p.id];
                prop_assert!((-1..=3).contains(&level));
                prop_assert!(level >= previous);
                previous = level;
            }
        }
    }
}
