//! Presentation-only statistics derived from ledger counts

use serde::Serialize;

/// XP needed per level
pub const XP_PER_LEVEL: i64 = 1000;

/// Baseline safety rating before accuracy is applied
const SAFETY_BASELINE: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievement {
    pub name: &'static str,
    pub description: &'static str,
    pub unlocked_at: i64,
    pub unlocked: bool,
}

const ACHIEVEMENTS: [(&str, &str, i64); 4] = [
    ("Novice Excavator", "First device dismantled", 0),
    ("Circuit Carver", "Earn 1000 XP from harvests", 1000),
    ("Silicon Sorcerer", "Expert Level (2500 XP)", 2500),
    ("Master Redistributor", "Top Tier (5000 XP)", 5000),
];

/// 1-based level
pub fn level_for(xp: i64) -> i64 {
    xp.max(0) / XP_PER_LEVEL + 1
}

/// Percent of the way to the next level
pub fn progress_to_next_level(xp: i64) -> f64 {
    (xp.max(0) % XP_PER_LEVEL) as f64 / 10.0
}

/// Rating in [5, 10], one decimal
///
/// accuracy = verified / (verified + rejected), 1 with no history.
pub fn safety_rating(verified: i64, rejected: i64) -> f64 {
    let total = verified + rejected;
    let accuracy = if total <= 0 {
        1.0
    } else {
        verified as f64 / total as f64
    };
    let rating = (SAFETY_BASELINE + accuracy * 2.0).clamp(5.0, 10.0);
    (rating * 10.0).round() / 10.0
}

pub fn achievements(xp: i64) -> Vec<Achievement> {
    ACHIEVEMENTS
        .iter()
        .map(|&(name, description, unlocked_at)| Achievement {
            name,
            description,
            unlocked_at,
            unlocked: xp >= unlocked_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(999), 1);
        assert_eq!(level_for(1000), 2);
        assert_eq!(level_for(2750), 3);
        assert_eq!(progress_to_next_level(2750), 75.0);
    }

    #[test]
    fn test_safety_rating_bounds() {
        assert_eq!(safety_rating(0, 0), 10.0);
        assert_eq!(safety_rating(4, 0), 10.0);
        assert_eq!(safety_rating(1, 1), 9.0);
        assert_eq!(safety_rating(0, 10), 8.0);
        for (v, r) in [(0, 1), (3, 7), (100, 1)] {
            let rating = safety_rating(v, r);
            assert!((5.0..=10.0).contains(&rating));
        }
    }

    #[test]
    fn test_achievements_unlock_by_xp() {
        let unlocked: Vec<&str> = achievements(2500)
            .into_iter()
            .filter(|a| a.unlocked)
            .map(|a| a.name)
            .collect();
        assert_eq!(unlocked, vec!["Novice Excavator", "Circuit Carver", "Silicon Sorcerer"]);
    }
}
