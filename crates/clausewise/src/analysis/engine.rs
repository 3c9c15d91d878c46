//! Rule engine: sentence segmentation, pattern-based categorization and
//! additive risk scoring. Pure and deterministic for a given input.

use std::borrow::Cow;

use regex::Regex;
use serde_json::{Map, Value};

use super::patterns::{
    category_advisories, CATEGORY_PATTERNS, CONFIDENCE_BASE, GENERAL_CONFIDENCE,
    HIGH_RISK_BANNER, HIGH_RISK_PHRASES, HIGH_RISK_WEIGHT, LEGAL_INDICATORS,
    LIABILITY_SUBCATEGORIES, LOW_RISK_PHRASES, LOW_RISK_WEIGHT, MAX_CATEGORY_ADVISORIES,
    MEDIUM_RISK_PHRASES, MEDIUM_RISK_WEIGHT, MIN_CLAUSE_WORDS, NO_RECOMMENDATIONS,
    TERMINATION_SUBCATEGORIES,
};
use super::types::{AnalysisSummary, Category, ClauseFinding, RiskLevel};
use crate::error::AnalysisError;

pub const ANALYSIS_METHOD: &str = "rule_based";

struct CategoryMatcher {
    category: Category,
    patterns: Vec<Regex>,
}

pub struct RuleEngine {
    matchers: Vec<CategoryMatcher>,
    whitespace: Regex,
    sentence_end: Regex,
    page_marker: Regex,
}

/// A sentence span within the normalized text.
#[derive(Debug, Clone, PartialEq)]
struct Sentence<'a> {
    text: Cow<'a, str>,
    byte_start: usize,
    start: usize,
    end: usize,
}

impl RuleEngine {
    pub fn new() -> Result<Self, AnalysisError> {
        let matchers = CATEGORY_PATTERNS
            .iter()
            .map(|(category, patterns)| {
                Ok(CategoryMatcher {
                    category: *category,
                    patterns: patterns
                        .iter()
                        .map(|p| compile(p))
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(Self {
            matchers,
            whitespace: compile(r"\s+")?,
            sentence_end: compile(r"[.!?]+")?,
            page_marker: compile(r"\[page (\d+)\]")?,
        })
    }

    /// Segments, filters, categorizes and scores `text`.
    pub fn analyze(&self, text: &str) -> (Vec<ClauseFinding>, AnalysisSummary) {
        let normalized = self.normalize(text);
        let pages = self.page_markers(&normalized);

        let clauses: Vec<ClauseFinding> = self
            .segment(&normalized)
            .into_iter()
            .filter_map(|sentence| self.strip_markers(sentence))
            .filter(|sentence| is_candidate(&sentence.text))
            .map(|sentence| {
                let page_number = pages
                    .iter()
                    .take_while(|(offset, _)| *offset <= sentence.byte_start)
                    .last()
                    .map(|(_, page)| *page);
                self.classify(&sentence, page_number)
            })
            .collect();

        let summary = AnalysisSummary::from_clauses(&clauses);
        (clauses, summary)
    }

    /// Collapses whitespace runs to one space, lower-cases and trims.
    pub fn normalize(&self, text: &str) -> String {
        self.whitespace
            .replace_all(text, " ")
            .to_lowercase()
            .trim()
            .to_string()
    }

    /// Splits on runs of terminal punctuation, dropping empty fragments.
    /// Offsets are in characters, tracked incrementally.
    fn segment<'a>(&self, normalized: &'a str) -> Vec<Sentence<'a>> {
        let mut sentences = Vec::new();
        let mut cursor_byte = 0;
        let mut cursor_char = 0;
        let mut fragment_start = 0;

        let boundaries = self
            .sentence_end
            .find_iter(normalized)
            .map(|m| (m.start(), m.end()))
            .chain(std::iter::once((normalized.len(), normalized.len())));

        for (boundary_start, boundary_end) in boundaries {
            let fragment = &normalized[fragment_start..boundary_start];
            let trimmed = fragment.trim();

            if !trimmed.is_empty() {
                let byte_start = fragment_start + (fragment.len() - fragment.trim_start().len());
                cursor_char += normalized[cursor_byte..byte_start].chars().count();
                cursor_byte = byte_start;

                let length = trimmed.chars().count();
                sentences.push(Sentence {
                    text: Cow::Borrowed(trimmed),
                    byte_start,
                    start: cursor_char,
                    end: cursor_char + length,
                });
            }

            fragment_start = boundary_end;
        }

        sentences
    }

    /// Removes page markers from a sentence. Leading and trailing markers
    /// shrink the span; interior ones are dropped from the text only.
    /// `None` when nothing but markers remains.
    fn strip_markers<'a>(&self, sentence: Sentence<'a>) -> Option<Sentence<'a>> {
        let mut body: &'a str = match sentence.text {
            Cow::Borrowed(text) => text,
            Cow::Owned(_) => return Some(sentence),
        };
        let mut byte_start = sentence.byte_start;
        let mut start = sentence.start;

        while let Some(marker) = self.page_marker.find(body).filter(|m| m.start() == 0) {
            let rest = body[marker.end()..].trim_start();
            let skipped = &body[..body.len() - rest.len()];
            byte_start += skipped.len();
            start += skipped.chars().count();
            body = rest;
        }

        while let Some(marker) = self
            .page_marker
            .find_iter(body)
            .last()
            .filter(|m| m.end() == body.len())
        {
            body = body[..marker.start()].trim_end();
        }

        if body.is_empty() {
            return None;
        }

        let end = start + body.chars().count();
        let text = if self.page_marker.is_match(body) {
            let without = self.page_marker.replace_all(body, "");
            Cow::Owned(self.whitespace.replace_all(&without, " ").trim().to_string())
        } else {
            Cow::Borrowed(body)
        };

        Some(Sentence {
            text,
            byte_start,
            start,
            end,
        })
    }

    fn page_markers(&self, normalized: &str) -> Vec<(usize, u32)> {
        self.page_marker
            .captures_iter(normalized)
            .filter_map(|caps| {
                let offset = caps.get(0)?.start();
                let page = caps.get(1)?.as_str().parse().ok()?;
                Some((offset, page))
            })
            .collect()
    }

    fn classify(&self, sentence: &Sentence<'_>, page_number: Option<u32>) -> ClauseFinding {
        let text: &str = &sentence.text;
        let (category, matched_patterns, total_patterns) = self.categorize(text);
        let risk_score = risk_score(text);
        let risk_level = RiskLevel::from_score(risk_score);

        let confidence_score = if category == Category::General {
            GENERAL_CONFIDENCE
        } else {
            (matched_patterns.len() as f64 / total_patterns as f64 + CONFIDENCE_BASE).min(1.0)
        };

        let mut metadata = Map::new();
        metadata.insert("analysis_method".to_string(), Value::from(ANALYSIS_METHOD));
        metadata.insert(
            "matched_patterns".to_string(),
            Value::from(matched_patterns),
        );

        ClauseFinding {
            text: text.to_string(),
            category,
            subcategory: subcategory(category, text).map(str::to_string),
            risk_score,
            risk_level,
            confidence_score,
            start_position: sentence.start,
            end_position: sentence.end,
            page_number,
            metadata,
            recommendations: recommendations(category, risk_level),
        }
    }

    /// First category with any matching pattern, its matched pattern sources
    /// and the size of its pattern set. No match is `General` with nothing matched.
    fn categorize(&self, text: &str) -> (Category, Vec<String>, usize) {
        for matcher in &self.matchers {
            let matched: Vec<String> = matcher
                .patterns
                .iter()
                .filter(|p| p.is_match(text))
                .map(|p| p.as_str().to_string())
                .collect();
            if !matched.is_empty() {
                return (matcher.category, matched, matcher.patterns.len());
            }
        }
        (Category::General, Vec::new(), 0)
    }
}

fn compile(pattern: &str) -> Result<Regex, AnalysisError> {
    Regex::new(pattern).map_err(|e| AnalysisError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn is_candidate(sentence: &str) -> bool {
    sentence.split_whitespace().count() >= MIN_CLAUSE_WORDS
        && LEGAL_INDICATORS.iter().any(|term| sentence.contains(term))
}

/// Additive phrase scoring clamped to [0, 1]. Phrases count once each.
pub fn risk_score(text: &str) -> f64 {
    let mut score = 0.0;
    for phrase in HIGH_RISK_PHRASES {
        if text.contains(phrase) {
            score += HIGH_RISK_WEIGHT;
        }
    }
    for phrase in MEDIUM_RISK_PHRASES {
        if text.contains(phrase) {
            score += MEDIUM_RISK_WEIGHT;
        }
    }
    for phrase in LOW_RISK_PHRASES {
        if text.contains(phrase) {
            score += LOW_RISK_WEIGHT;
        }
    }
    f64::clamp(score, 0.0, 1.0)
}

fn subcategory(category: Category, text: &str) -> Option<&'static str> {
    let table = match category {
        Category::Liability => LIABILITY_SUBCATEGORIES,
        Category::Termination => TERMINATION_SUBCATEGORIES,
        _ => return None,
    };

    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(name, _)| *name)
}

fn recommendations(category: Category, risk_level: RiskLevel) -> String {
    let mut items: Vec<&str> = Vec::new();
    if risk_level.is_high_or_critical() {
        items.push(HIGH_RISK_BANNER);
    }
    items.extend(
        category_advisories(category)
            .iter()
            .take(MAX_CATEGORY_ADVISORIES),
    );

    if items.is_empty() {
        NO_RECOMMENDATIONS.to_string()
    } else {
        items.join(" | ")
    }
}
