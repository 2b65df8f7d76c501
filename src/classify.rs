use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{AgeBand, Level};

/// Which free-text field a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    TaskType,
    TaskName,
}

#[derive(Debug, Clone, Copy)]
pub struct LevelRule {
    pub level: Level,
    pub source: Source,
    /// Lowercase substrings; any one of them fires the rule.
    pub patterns: &'static [&'static str],
}

/// Level rules in precedence order. The first rule with a matching pattern
/// decides the level; a record matching none is `Other`.
pub const LEVEL_RULES: &[LevelRule] = &[
    LevelRule {
        level: Level::NonTeaching,
        source: Source::TaskType,
        patterns: &["non teaching"],
    },
    LevelRule {
        level: Level::Private,
        source: Source::TaskType,
        patterns: &["private"],
    },
    LevelRule {
        level: Level::FirstTime,
        source: Source::TaskName,
        patterns: &["1st time", "first time"],
    },
    LevelRule {
        level: Level::Novice,
        source: Source::TaskName,
        patterns: &["novice"],
    },
    LevelRule {
        level: Level::Beginner,
        source: Source::TaskName,
        patterns: &["beginner"],
    },
    LevelRule {
        level: Level::Intermediate,
        source: Source::TaskName,
        patterns: &["intermediate"],
    },
    LevelRule {
        level: Level::Advanced,
        source: Source::TaskName,
        patterns: &["advanced"],
    },
    LevelRule {
        level: Level::Freestyle,
        source: Source::TaskName,
        patterns: &["freestyle"],
    },
    LevelRule {
        level: Level::MeetAndGreet,
        source: Source::TaskName,
        patterns: &["meet and greet", "meet & greet", "m&g", "m & g", "level lead"],
    },
    LevelRule {
        level: Level::Training,
        source: Source::TaskName,
        patterns: &["training"],
    },
    LevelRule {
        level: Level::Available,
        source: Source::TaskName,
        patterns: &["available", "showed up"],
    },
];

/// Task-name fragments marking a kids' lesson, matched case-insensitively.
pub const KIDS_SIGNALS: &[&str] = &[" KD ", "- KD", "Kids", "Youth", "Lowriders", "Skiwees"];

/// Private lessons for guests younger than this are Kids lessons.
pub const KIDS_AGE_LIMIT: u8 = 16;

static AGE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*(?:y/?o|yrs?|years?)\b").expect("valid age suffix pattern")
});
static AGE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:age|aged)\s*(\d{1,2})\b").expect("valid age prefix pattern"));

impl LevelRule {
    pub fn matches(&self, task_name: &str, task_type: &str) -> bool {
        let text = match self.source {
            Source::TaskType => task_type,
            Source::TaskName => task_name,
        }
        .to_lowercase();
        self.patterns.iter().any(|pattern| text.contains(pattern))
    }
}

pub fn classify(task_name: &str, task_type: &str) -> (AgeBand, Level) {
    (age_band(task_name), level(task_name, task_type))
}

pub fn age_band(task_name: &str) -> AgeBand {
    let name = task_name.to_lowercase();
    if KIDS_SIGNALS
        .iter()
        .any(|signal| name.contains(&signal.to_lowercase()))
    {
        AgeBand::Kids
    } else {
        AgeBand::Adults
    }
}

pub fn level(task_name: &str, task_type: &str) -> Level {
    LEVEL_RULES
        .iter()
        .find(|rule| rule.matches(task_name, task_type))
        .map_or(Level::Other, |rule| rule.level)
}

/// Guest age mentioned in free-text notes ("12yo", "9 y/o", "10 yrs", "age 7").
pub fn infer_age(notes: &str) -> Option<u8> {
    let notes = notes.to_lowercase();
    AGE_SUFFIX
        .captures(&notes)
        .or_else(|| AGE_PREFIX.captures(&notes))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First ability level named in free-text notes, without touching the record's level.
pub fn ability_hint(notes: &str) -> Option<Level> {
    LEVEL_RULES
        .iter()
        .filter(|rule| rule.source == Source::TaskName)
        .filter(|rule| (Level::FirstTime..=Level::Freestyle).contains(&rule.level))
        .find(|rule| rule.matches(notes, ""))
        .map(|rule| rule.level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kids_signals_set_age_band() {
        assert_eq!(age_band("Kids KD Lesson"), AgeBand::Kids);
        assert_eq!(age_band("Group - KD"), AgeBand::Kids);
        assert_eq!(age_band("Skiwees Morning"), AgeBand::Kids);
        assert_eq!(age_band("youth freestyle"), AgeBand::Kids);
        assert_eq!(age_band("Adult Intermediate Group"), AgeBand::Adults);
        assert_eq!(age_band(""), AgeBand::Adults);
    }

    #[test]
    fn non_teaching_type_wins_over_name() {
        assert_eq!(
            level("Advanced Freestyle Kids", "Non Teaching"),
            Level::NonTeaching
        );
        assert_eq!(level("Advanced Private", "Private Lesson"), Level::Private);
    }

    #[test]
    fn earlier_rule_wins_for_ambiguous_names() {
        assert_eq!(level("Beginner to Freestyle", "Group"), Level::Beginner);
        assert_eq!(level("First Time Novice", "Group"), Level::FirstTime);
        assert_eq!(level("Intermediate Training", "Group"), Level::Intermediate);
        assert_eq!(level("Training - Meet and Greet", "Group"), Level::MeetAndGreet);
    }

    #[test]
    fn unmatched_names_fall_back_to_other() {
        assert_eq!(level("Snow Park Patrol", "Group"), Level::Other);
        assert_eq!(level("", ""), Level::Other);
    }

    #[test]
    fn every_pattern_fires_its_own_rule() {
        for rule in LEVEL_RULES {
            for pattern in rule.patterns {
                let upper = pattern.to_uppercase();
                let got = match rule.source {
                    Source::TaskType => level("Lesson", &upper),
                    Source::TaskName => level(&format!("AM {upper} group"), "Group"),
                };
                assert_eq!(got, rule.level, "pattern {pattern:?}");
            }
        }
    }

    #[test]
    fn rules_follow_level_declaration_order() {
        let levels: Vec<Level> = LEVEL_RULES.iter().map(|rule| rule.level).collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
        assert!(!levels.contains(&Level::Other));
    }

    #[test]
    fn teaching_predicate_excludes_support_levels() {
        let non_teaching: Vec<Level> = Level::ALL
            .into_iter()
            .filter(|level| !level.is_teaching())
            .collect();
        assert_eq!(
            non_teaching,
            vec![
                Level::NonTeaching,
                Level::MeetAndGreet,
                Level::Training,
                Level::Available
            ]
        );
    }

    #[test]
    fn age_and_ability_come_from_notes() {
        assert_eq!(infer_age("Sophie 12yo, first time on skis"), Some(12));
        assert_eq!(infer_age("Two kids, 8 y/o and 10"), Some(8));
        assert_eq!(infer_age("aged 34, wants moguls"), Some(34));
        assert_eq!(infer_age("no details"), None);
        assert_eq!(ability_hint("Sophie 12yo, first time on skis"), Some(Level::FirstTime));
        assert_eq!(ability_hint("strong intermediate"), Some(Level::Intermediate));
        assert_eq!(ability_hint("meet and greet"), None);
    }
}
