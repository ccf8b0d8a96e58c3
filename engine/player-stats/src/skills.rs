//! Canonical skill ordering.
//!
//! Position 0 is the synthetic `total`; the 23 real skills follow in the
//! order the hiscores endpoints report them. A stats vector stores one
//! `(rank, level, xp)` triple per entry, so skill `i` occupies columns
//! `3*i .. 3*i + 3`.

/// Skill names, `total` first
pub const SKILLS: [&str; NUM_SKILLS] = [
    "total",
    "attack",
    "defence",
    "strength",
    "hitpoints",
    "ranged",
    "prayer",
    "magic",
    "cooking",
    "woodcutting",
    "fletching",
    "fishing",
    "firemaking",
    "crafting",
    "smithing",
    "mining",
    "herblore",
    "agility",
    "thieving",
    "slayer",
    "farming",
    "runecraft",
    "hunter",
    "construction",
];

/// Number of entries in [`SKILLS`] including `total`
pub const NUM_SKILLS: usize = 24;

/// Length of a full stats vector: one `(rank, level, xp)` triple per skill
pub const NUM_STATS: usize = NUM_SKILLS * 3;

/// Sentinel for a stat the hiscores did not report (unranked skill)
pub const MISSING: i64 = -1;

/// The seven combat skills
pub const COMBAT_SKILLS: [&str; 7] =
    ["attack", "defence", "strength", "hitpoints", "ranged", "prayer", "magic"];

/// Offsets of the fields inside a skill's triple
pub const RANK: usize = 0;
pub const LEVEL: usize = 1;
pub const XP: usize = 2;

/// Column of `total` in [`SKILLS`]
pub const TOTAL: usize = 0;

/// Index of a skill name in [`SKILLS`]
pub fn skill_index(name: &str) -> Option<usize> {
    SKILLS.iter().position(|s| *s == name)
}

/// Real skill names (everything but `total`)
pub fn real_skills() -> impl Iterator<Item = &'static str> {
    SKILLS.iter().skip(1).copied()
}

/// Whether `name` is one of the combat skills
pub fn is_combat(name: &str) -> bool {
    COMBAT_SKILLS.contains(&name)
}

/// Column of `field` for skill `skill` in a flat stats vector
#[inline]
pub fn stat_column(skill: usize, field: usize) -> usize {
    skill * 3 + field
}

/// Header cells `<skill>_rank,<skill>_level,<skill>_xp` for every skill
pub fn stat_header_cells() -> Vec<String> {
    SKILLS
        .iter()
        .flat_map(|s| [format!("{s}_rank"), format!("{s}_level"), format!("{s}_xp")])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_layout() {
        assert_eq!(SKILLS.len(), 24);
        assert_eq!(real_skills().count(), 23);
        assert_eq!(skill_index("total"), Some(TOTAL));
        assert_eq!(skill_index("construction"), Some(23));
        assert_eq!(skill_index("sailing"), None);
        assert_eq!(stat_column(1, LEVEL), 4);
        assert_eq!(stat_header_cells().len(), NUM_STATS);
        assert_eq!(stat_header_cells()[0], "total_rank");
    }

    #[test]
    fn test_combat_split() {
        let combat = real_skills().filter(|s| is_combat(s)).count();
        assert_eq!(combat, 7);
        assert_eq!(real_skills().count() - combat, 16);
    }
}
