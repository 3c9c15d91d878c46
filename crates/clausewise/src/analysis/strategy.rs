use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::engine::RuleEngine;
use super::types::AnalysisResult;
use crate::document::{DocumentId, Playbook};
use crate::error::AnalysisError;

pub const RULE_BASED: &str = "rule_based";
pub const ML_MODEL: &str = "ml_model";

/// Names registered by `StrategyRegistry::new`.
pub const BUILTIN_STRATEGIES: &[&str] = &[RULE_BASED, ML_MODEL];

pub const ML_FALLBACK_NOTE: &str = "Using rule-based fallback - ML implementation pending";
pub const PLAYBOOK_PENDING_NOTE: &str = "Playbook comparison logic pending implementation";
pub const PLAYBOOK_ANALYSIS_TYPE: &str = "playbook_comparison";

/// Texts shorter than this are analyzed but logged as suspicious.
const SHORT_TEXT_WARNING: usize = 50;

/// An interchangeable analysis algorithm, selected by name.
pub trait AnalysisStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, text: &str, document_id: &DocumentId)
        -> Result<AnalysisResult, AnalysisError>;
}

pub struct RuleBasedStrategy {
    engine: Arc<RuleEngine>,
}

impl RuleBasedStrategy {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self { engine }
    }
}

impl AnalysisStrategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        RULE_BASED
    }

    fn analyze(
        &self,
        text: &str,
        _document_id: &DocumentId,
    ) -> Result<AnalysisResult, AnalysisError> {
        let (clauses, summary) = self.engine.analyze(text);

        let mut metadata = serde_json::Map::new();
        metadata.insert("strategy".to_string(), Value::from(RULE_BASED));
        metadata.insert(
            "analysis_date".to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );
        metadata.insert(
            "total_text_length".to_string(),
            Value::from(text.chars().count() as u64),
        );
        metadata.insert(
            "processed_clauses".to_string(),
            Value::from(clauses.len() as u64),
        );

        Ok(AnalysisResult {
            clauses,
            summary,
            metadata,
        })
    }
}

/// Placeholder for a model-backed classifier. Delegates entirely to the
/// rule-based strategy and marks the result as a fallback.
pub struct MlModelStrategy {
    fallback: RuleBasedStrategy,
}

impl MlModelStrategy {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self {
            fallback: RuleBasedStrategy::new(engine),
        }
    }
}

impl AnalysisStrategy for MlModelStrategy {
    fn name(&self) -> &str {
        ML_MODEL
    }

    fn analyze(
        &self,
        text: &str,
        document_id: &DocumentId,
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut result = self.fallback.analyze(text, document_id)?;
        result
            .metadata
            .insert("strategy".to_string(), Value::from(ML_MODEL));
        result
            .metadata
            .insert("fallback".to_string(), Value::Bool(true));
        result
            .metadata
            .insert("note".to_string(), Value::from(ML_FALLBACK_NOTE));
        Ok(result)
    }
}

/// Name to strategy mapping with `rule_based` as the fixed default.
pub struct StrategyRegistry {
    strategies: HashMap<String, Box<dyn AnalysisStrategy>>,
}

impl StrategyRegistry {
    /// Registry with the built-in strategies sharing one compiled engine.
    pub fn new() -> Result<Self, AnalysisError> {
        let engine = Arc::new(RuleEngine::new()?);
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register(Box::new(RuleBasedStrategy::new(Arc::clone(&engine))));
        registry.register(Box::new(MlModelStrategy::new(engine)));
        Ok(registry)
    }

    /// Adds or replaces a strategy under its own name.
    pub fn register(&mut self, strategy: Box<dyn AnalysisStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn available_strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    fn resolve(&self, requested: Option<&str>) -> Result<&dyn AnalysisStrategy, AnalysisError> {
        if let Some(name) = requested {
            if let Some(strategy) = self.strategies.get(name) {
                return Ok(strategy.as_ref());
            }
            log::warn!("Unknown strategy '{}', using {}", name, RULE_BASED);
        }

        self.strategies
            .get(RULE_BASED)
            .map(|s| s.as_ref())
            .ok_or_else(|| AnalysisError::StrategyFailed {
                strategy: RULE_BASED.to_string(),
                reason: "default strategy is not registered".to_string(),
            })
    }

    /// Runs the named strategy, falling back to `rule_based` when the name is
    /// omitted or unknown. Blank text yields an empty result; callers that
    /// want to reject it call `validate_text` first.
    pub fn analyze(
        &self,
        text: &str,
        document_id: &DocumentId,
        strategy_name: Option<&str>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let strategy = self.resolve(strategy_name)?;
        log::debug!(
            "Analyzing document {} with strategy {}",
            document_id,
            strategy.name()
        );

        let mut result = strategy.analyze(text, document_id)?;
        result
            .metadata
            .insert("document_id".to_string(), Value::from(document_id.to_string()));
        result
            .metadata
            .insert("strategy_used".to_string(), Value::from(strategy.name()));
        Ok(result)
    }

    /// Runs the default strategy and tags the result with the playbook.
    /// Rule comparison against the playbook content does not happen yet.
    pub fn analyze_with_playbook(
        &self,
        text: &str,
        document_id: &DocumentId,
        playbook: &Playbook,
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut result = self.analyze(text, document_id, None)?;
        let metadata = &mut result.metadata;
        metadata.insert("playbook_id".to_string(), Value::from(playbook.id.to_string()));
        metadata.insert("playbook_name".to_string(), Value::from(playbook.name.clone()));
        metadata.insert(
            "analysis_type".to_string(),
            Value::from(PLAYBOOK_ANALYSIS_TYPE),
        );
        metadata.insert("note".to_string(), Value::from(PLAYBOOK_PENDING_NOTE));
        Ok(result)
    }

    pub fn validate_text(text: &str) -> Result<(), AnalysisError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AnalysisError::EmptyText);
        }
        if trimmed.chars().count() < SHORT_TEXT_WARNING {
            log::warn!(
                "Text is very short ({} characters), analysis may be unreliable",
                trimmed.chars().count()
            );
        }
        Ok(())
    }
}
