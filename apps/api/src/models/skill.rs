use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The fixed set of progression tracks every user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SkillName {
    Awareness,
    Charisma,
    Endurance,
    Intelligence,
    Strength,
    Wisdom,
    Resilience,
    Creativity,
}

impl SkillName {
    pub const ALL: [SkillName; 8] = [
        SkillName::Awareness,
        SkillName::Charisma,
        SkillName::Endurance,
        SkillName::Intelligence,
        SkillName::Strength,
        SkillName::Wisdom,
        SkillName::Resilience,
        SkillName::Creativity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillName::Awareness => "Awareness",
            SkillName::Charisma => "Charisma",
            SkillName::Endurance => "Endurance",
            SkillName::Intelligence => "Intelligence",
            SkillName::Strength => "Strength",
            SkillName::Wisdom => "Wisdom",
            SkillName::Resilience => "Resilience",
            SkillName::Creativity => "Creativity",
        }
    }
}

impl fmt::Display for SkillName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkillName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown skill '{s}'"))
    }
}

/// Per-user progression row. `xp` is the amount accumulated inside the current level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Skill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub level: i32,
    pub xp: i32,
    pub daily_xp_earned: i32,
    pub last_updated: DateTime<Utc>,
}

impl Skill {
    /// A fresh level-1 skill, as created at account provisioning.
    pub fn new(user_id: Uuid, name: SkillName, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            level: 1,
            xp: 0,
            daily_xp_earned: 0,
            last_updated: now,
        }
    }

    pub fn skill_name(&self) -> Option<SkillName> {
        self.name.parse().ok()
    }
}
