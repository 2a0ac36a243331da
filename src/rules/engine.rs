use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::{EvaluationError, RuleDeliveryFailure, RuleError};
use crate::logging::{LogContext, MetricsLogger};
use crate::models::{Alert, Transaction};
use crate::notify::Notifier;
use crate::rules::rule::AlertRule;

/// A rule plus its last-fired timestamp
struct RegisteredRule {
    rule: AlertRule,
    last_fired: Mutex<Option<DateTime<Utc>>>,
}

impl RegisteredRule {
    fn new(rule: AlertRule) -> Self {
        Self { rule, last_fired: Mutex::new(None) }
    }

    /// Record a fire at `now` unless the rule is still cooling down.
    ///
    /// Check and update happen under one lock, so two concurrent
    /// evaluations cannot both pass the cooldown.
    fn try_claim(&self, now: DateTime<Utc>) -> bool {
        let mut last_fired = self.last_fired.lock().unwrap_or_else(PoisonError::into_inner);
        let cooldown_seconds = self.rule.cooldown_seconds.min(i64::MAX as u64 / 1_000) as i64;

        if let Some(previous) = *last_fired {
            if cooldown_seconds > 0 && now - previous < chrono::Duration::seconds(cooldown_seconds) {
                return false;
            }
        }

        *last_fired = Some(now);
        true
    }

    fn last_fired(&self) -> Option<DateTime<Utc>> {
        *self.last_fired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Insertion-ordered rule set with unique names
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<Vec<Arc<RegisteredRule>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule`; a duplicate name leaves the registry untouched
    pub fn add(&self, rule: AlertRule) -> Result<(), RuleError> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.iter().any(|existing| existing.rule.name == rule.name) {
            return Err(RuleError::DuplicateRule(rule.name));
        }
        rules.push(Arc::new(RegisteredRule::new(rule)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<AlertRule> {
        self.read()
            .iter()
            .find(|registered| registered.rule.name == name)
            .map(|registered| registered.rule.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|registered| registered.rule.name.clone()).collect()
    }

    pub fn last_fired(&self, name: &str) -> Option<DateTime<Utc>> {
        self.read()
            .iter()
            .find(|registered| registered.rule.name == name)
            .and_then(|registered| registered.last_fired())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<RegisteredRule>>> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rules in insertion order; the read lock is released before returning
    fn snapshot(&self) -> Vec<Arc<RegisteredRule>> {
        self.read().clone()
    }
}

/// Evaluates transactions against every registered rule and hands fired
/// alerts to the notifier.
pub struct RuleEngine {
    registry: RuleRegistry,
    notifier: Arc<dyn Notifier>,
}

impl RuleEngine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { registry: RuleRegistry::new(), notifier }
    }

    /// Engine preloaded with `rules`, stopping at the first duplicate name
    pub fn with_rules(notifier: Arc<dyn Notifier>, rules: Vec<AlertRule>) -> Result<Self, RuleError> {
        let engine = Self::new(notifier);
        for rule in rules {
            engine.add_rule(rule)?;
        }
        Ok(engine)
    }

    pub fn add_rule(&self, rule: AlertRule) -> Result<(), RuleError> {
        let name = rule.name.clone();
        let result = self.registry.add(rule);

        let context = LogContext::new("rules", "add_rule").with_rule(&name);
        match &result {
            Ok(()) => context.info("Rule registered"),
            Err(error) => context.warn(&format!("Rule rejected: {}", error)),
        }

        result
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub async fn evaluate(&self, transaction: &Transaction) -> Result<Vec<Alert>, EvaluationError> {
        self.evaluate_at(transaction, Utc::now()).await
    }

    /// Evaluate with an explicit clock reading.
    ///
    /// Every fired alert is sent exactly once. Delivery failures are
    /// collected per rule and do not stop later rules from firing.
    pub async fn evaluate_at(
        &self,
        transaction: &Transaction,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, EvaluationError> {
        let mut fired = Vec::new();
        let mut failures = Vec::new();

        for registered in self.registry.snapshot() {
            let rule = &registered.rule;
            if !rule.matches(transaction) {
                continue;
            }

            if !registered.try_claim(now) {
                MetricsLogger::log_rule_suppressed(&rule.name, &transaction.hash);
                continue;
            }

            let alert = rule.build_alert(transaction, now);
            MetricsLogger::log_rule_fired(&rule.name, &alert.severity.to_string(), &transaction.hash);

            if let Err(error) = self.notifier.notify(&alert).await {
                LogContext::new("rules", "evaluate")
                    .with_rule(&rule.name)
                    .with_transaction_hash(&transaction.hash)
                    .error(&format!("Alert delivery failed: {}", error));
                failures.push(RuleDeliveryFailure { rule: rule.name.clone(), error });
            }

            fired.push(alert);
        }

        if failures.is_empty() {
            Ok(fired)
        } else {
            Err(EvaluationError { fired, failures })
        }
    }
}
