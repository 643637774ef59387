//! Candidate scoring over narrative text
//!
//! A declarative table of phrase rules, compiled once into case-insensitive
//! regexes. Each matching rule adds its weight to the long or short score of an
//! instrument, at most once per text. [`rank_candidates`] orders a batch into
//! the top long and short lists.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum entries per side in a ranking
pub const RANKING_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreRule {
    pub pattern: &'static str,
    pub side: Side,
    pub weight: u8,
    pub reason: &'static str,
}

pub const SCORE_RULES: &[ScoreRule] = &[
    ScoreRule { pattern: r"рынок был под контролем быков", side: Side::Long, weight: 2, reason: "Бычий сентимент" },
    ScoreRule { pattern: r"цена закрытия .*? находится выше vwap", side: Side::Long, weight: 1, reason: "Цена выше VWAP" },
    ScoreRule { pattern: r"активный откуп на лоях", side: Side::Long, weight: 2, reason: "Активный откуп" },
    ScoreRule { pattern: r"кульминация продаж", side: Side::Long, weight: 3, reason: "Кульминация продаж" },
    ScoreRule {
        pattern: r"закол уровня poc.*?силе покупателей",
        side: Side::Long,
        weight: 2,
        reason: "Ложный пробой POC (сила покупателей)",
    },
    ScoreRule { pattern: r"медведи доминировали", side: Side::Short, weight: 2, reason: "Медвежий сентимент" },
    ScoreRule { pattern: r"цена закрытия .*? находится ниже vwap", side: Side::Short, weight: 1, reason: "Цена ниже VWAP" },
    ScoreRule { pattern: r"разгрузка на хаях", side: Side::Short, weight: 2, reason: "Разгрузка на хаях" },
    ScoreRule { pattern: r"кульминация покупок", side: Side::Short, weight: 3, reason: "Кульминация покупок" },
    ScoreRule {
        pattern: r"закол уровня poc.*?слабость покупателей",
        side: Side::Short,
        weight: 2,
        reason: "Ложный пробой POC (слабость покупателей)",
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub instrument: String,
    pub long_score: u32,
    pub short_score: u32,
    pub long_reasons: Vec<String>,
    pub short_reasons: Vec<String>,
}

impl Candidate {
    fn score(&self, side: Side) -> u32 {
        match side {
            Side::Long => self.long_score,
            Side::Short => self.short_score,
        }
    }

    fn reasons(&self, side: Side) -> &[String] {
        match side {
            Side::Long => &self.long_reasons,
            Side::Short => &self.short_reasons,
        }
    }
}

pub struct CandidateScorer {
    rules: Vec<(Regex, ScoreRule)>,
}

impl CandidateScorer {
    /// Compile the built-in rule table
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_rules(SCORE_RULES)
    }

    pub fn with_rules(rules: &[ScoreRule]) -> Result<Self, regex::Error> {
        let compiled = rules
            .iter()
            .map(|rule| {
                RegexBuilder::new(rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, *rule))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules: compiled })
    }

    pub fn score(&self, instrument: &str, text: &str) -> Candidate {
        let mut candidate = Candidate {
            instrument: instrument.to_string(),
            ..Default::default()
        };

        for (re, rule) in &self.rules {
            if !re.is_match(text) {
                continue;
            }
            match rule.side {
                Side::Long => {
                    candidate.long_score += u32::from(rule.weight);
                    candidate.long_reasons.push(rule.reason.to_string());
                }
                Side::Short => {
                    candidate.short_score += u32::from(rule.weight);
                    candidate.short_reasons.push(rule.reason.to_string());
                }
            }
        }

        log::debug!(
            "{}: long score {}, short score {}",
            instrument,
            candidate.long_score,
            candidate.short_score
        );
        candidate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub instrument: String,
    pub score: u32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub long: Vec<RankedEntry>,
    pub short: Vec<RankedEntry>,
}

impl Ranking {
    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.short.is_empty()
    }
}

impl fmt::Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (title, entries) in [("ЛОНГ", &self.long), ("ШОРТ", &self.short)] {
            writeln!(f, "ТОП-{} кандидатов в {}:", RANKING_SIZE, title)?;
            if entries.is_empty() {
                writeln!(f, "  нет кандидатов")?;
            }
            for (i, entry) in entries.iter().enumerate() {
                writeln!(
                    f,
                    "  {}. {} (оценка: {}) — {}",
                    i + 1,
                    entry.instrument,
                    entry.score,
                    entry.reasons.join(", ")
                )?;
            }
        }
        Ok(())
    }
}

/// Score every (instrument, narrative) pair and keep the top entries per side
pub fn rank_candidates<'a, I>(scorer: &CandidateScorer, narratives: I) -> Ranking
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let candidates: Vec<Candidate> = narratives
        .into_iter()
        .map(|(instrument, text)| scorer.score(instrument, text))
        .collect();

    let ranking = Ranking {
        long: top_for_side(&candidates, Side::Long),
        short: top_for_side(&candidates, Side::Short),
    };
    log::info!(
        "Ranked {} candidates: {} long, {} short",
        candidates.len(),
        ranking.long.len(),
        ranking.short.len()
    );
    ranking
}

fn top_for_side(candidates: &[Candidate], side: Side) -> Vec<RankedEntry> {
    let mut scored: Vec<&Candidate> = candidates.iter().filter(|c| c.score(side) > 0).collect();
    scored.sort_by(|a, b| b.score(side).cmp(&a.score(side)));

    scored
        .into_iter()
        .take(RANKING_SIZE)
        .map(|c| RankedEntry {
            instrument: c.instrument.clone(),
            score: c.score(side),
            reasons: c.reasons(side).to_vec(),
        })
        .collect()
}
