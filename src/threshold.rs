use serde::Serialize;

use crate::error::ConfigError;
use crate::models::AttainmentLevels;

pub const MAX_LEVEL: u8 = 3;

/// Ordered `(threshold, level)` table, descending by threshold and ending in
/// a `0 -> 0` catch-all, so classification is total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdTable {
    entries: Vec<(f64, u8)>,
}

impl ThresholdTable {
    pub fn new(entries: Vec<(f64, u8)>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyThresholds);
        }

        for (index, &(threshold, level)) in entries.iter().enumerate() {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
            if level > MAX_LEVEL {
                return Err(ConfigError::LevelOutOfRange(level));
            }
            if index > 0 && threshold > entries[index - 1].0 {
                return Err(ConfigError::UnorderedThresholds { index, threshold });
            }
        }

        match entries.last() {
            Some(&(threshold, 0)) if threshold == 0.0 => Ok(Self { entries }),
            _ => Err(ConfigError::MissingCatchAll),
        }
    }

    /// Table for a scheme's three level thresholds plus the catch-all.
    pub fn from_levels(levels: &AttainmentLevels) -> Result<Self, ConfigError> {
        let mut entries = vec![
            (levels.level_3, 3),
            (levels.level_2, 2),
            (levels.level_1, 1),
        ];
        entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        entries.push((0.0, 0));
        Self::new(entries)
    }

    /// Level of the first entry whose threshold is at or below `percentage`.
    /// Percentages above 100 are not clamped.
    pub fn classify(&self, percentage: f64) -> u8 {
        self.entries
            .iter()
            .find(|(threshold, _)| percentage >= *threshold)
            .map(|(_, level)| *level)
            .unwrap_or(0)
    }

    pub fn entries(&self) -> &[(f64, u8)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ThresholdTable {
        ThresholdTable::new(vec![(80.0, 3), (70.0, 2), (60.0, 1), (0.0, 0)])
            .expect("valid table")
    }

    #[test]
    fn classifies_on_inclusive_thresholds() {
        let table = table();
        assert_eq!(table.classify(80.0), 3);
        assert_eq!(table.classify(79.9), 2);
        assert_eq!(table.classify(70.0), 2);
        assert_eq!(table.classify(60.0), 1);
        assert_eq!(table.classify(50.0), 0);
        assert_eq!(table.classify(0.0), 0);
    }

    #[test]
    fn classification_is_total_over_non_negative_percentages() {
        let table = table();
        for step in 0..=300 {
            let level = table.classify(step as f64 * 0.5);
            assert!(level <= MAX_LEVEL);
        }
        assert_eq!(table.classify(250.0), 3);
    }

    #[test]
    fn rejects_malformed_tables() {
        assert_eq!(
            ThresholdTable::new(Vec::new()),
            Err(ConfigError::EmptyThresholds)
        );
        assert_eq!(
            ThresholdTable::new(vec![(70.0, 2), (80.0, 3), (0.0, 0)]),
            Err(ConfigError::UnorderedThresholds {
                index: 1,
                threshold: 80.0
            })
        );
        assert_eq!(
            ThresholdTable::new(vec![(70.0, 3), (50.0, 1)]),
            Err(ConfigError::MissingCatchAll)
        );
        assert_eq!(
            ThresholdTable::new(vec![(70.0, 4), (0.0, 0)]),
            Err(ConfigError::LevelOutOfRange(4))
        );
    }

    #[test]
    fn builds_from_scheme_levels_in_any_order() {
        let levels = AttainmentLevels {
            level_3: 70.0,
            level_2: 60.0,
            level_1: 50.0,
        };
        let table = ThresholdTable::from_levels(&levels).expect("valid levels");
        assert_eq!(
            table.entries(),
            &[(70.0, 3), (60.0, 2), (50.0, 1), (0.0, 0)]
        );
        assert_eq!(table.classify(65.0), 2);
    }
}
