use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Clause categories, in the order the rule engine tests them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Liability,
    Termination,
    Payment,
    IntellectualProperty,
    Confidentiality,
    GoverningLaw,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Liability => "liability",
            Category::Termination => "termination",
            Category::Payment => "payment",
            Category::IntellectualProperty => "intellectual_property",
            Category::Confidentiality => "confidentiality",
            Category::GoverningLaw => "governing_law",
            Category::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "liability" => Some(Category::Liability),
            "termination" => Some(Category::Termination),
            "payment" => Some(Category::Payment),
            "intellectual_property" => Some(Category::IntellectualProperty),
            "confidentiality" => Some(Category::Confidentiality),
            "governing_law" => Some(Category::GoverningLaw),
            "general" => Some(Category::General),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal risk bucket. Always derived from a score, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            RiskLevel::Critical
        } else if score >= 0.5 {
            RiskLevel::High
        } else if score >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    pub fn is_high_or_critical(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clause found by analysis, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseFinding {
    pub text: String,
    pub category: Category,
    pub subcategory: Option<String>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence_score: f64,
    /// Character offsets into the normalized text.
    pub start_position: usize,
    pub end_position: usize,
    pub page_number: Option<u32>,
    pub metadata: Map<String, Value>,
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_clauses: usize,
    pub risk_distribution: BTreeMap<RiskLevel, usize>,
    pub category_breakdown: BTreeMap<Category, usize>,
    pub overall_risk_score: f64,
    pub high_risk_clauses: usize,
}

impl AnalysisSummary {
    pub fn from_clauses(clauses: &[ClauseFinding]) -> Self {
        let mut risk_distribution: BTreeMap<RiskLevel, usize> =
            RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
        let mut category_breakdown = BTreeMap::new();
        let mut high_risk_clauses = 0;
        let mut total_score = 0.0;

        for clause in clauses {
            *risk_distribution.entry(clause.risk_level).or_insert(0) += 1;
            *category_breakdown.entry(clause.category).or_insert(0) += 1;
            if clause.risk_level.is_high_or_critical() {
                high_risk_clauses += 1;
            }
            total_score += clause.risk_score;
        }

        let overall_risk_score = if clauses.is_empty() {
            0.0
        } else {
            total_score / clauses.len() as f64
        };

        Self {
            total_clauses: clauses.len(),
            risk_distribution,
            category_breakdown,
            overall_risk_score,
            high_risk_clauses,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub clauses: Vec<ClauseFinding>,
    pub summary: AnalysisSummary,
    pub metadata: Map<String, Value>,
}
