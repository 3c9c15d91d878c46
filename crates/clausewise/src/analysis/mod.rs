pub mod engine;
pub mod patterns;
pub mod strategy;
pub mod types;

pub use engine::RuleEngine;
pub use strategy::{
    AnalysisStrategy, MlModelStrategy, RuleBasedStrategy, StrategyRegistry, BUILTIN_STRATEGIES,
    ML_MODEL, RULE_BASED,
};
pub use types::{AnalysisResult, AnalysisSummary, Category, ClauseFinding, RiskLevel};
