use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{Alert, Severity, Transaction};
use crate::rules::condition::RuleCondition;

/// Named rule: all conditions must hold for it to fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    /// Channel identifiers recorded on every alert this rule raises
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub severity: Severity,
}

impl AlertRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            conditions: Vec::new(),
            channels: Vec::new(),
            cooldown_seconds: 0,
            severity: Severity::default(),
        }
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    /// Cooldowns have whole-second resolution. A fractional part rounds up,
    /// so a non-zero cooldown never becomes "always fire".
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        let extra = u64::from(cooldown.subsec_nanos() > 0);
        self.cooldown_seconds = cooldown.as_secs().saturating_add(extra);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Every condition holds; a rule without conditions always matches
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.conditions.iter().all(|condition| condition.is_satisfied(transaction))
    }

    pub fn build_alert(&self, transaction: &Transaction, fired_at: DateTime<Utc>) -> Alert {
        let receiver = transaction.to.as_deref().unwrap_or("contract creation");
        let details = format!(
            "Transaction {} moved {} from {} to {} in block {}",
            transaction.hash, transaction.value, transaction.from, receiver, transaction.block_number
        );
        let message = match &self.description {
            Some(description) => format!("{}\n{}", description, details),
            None => details,
        };

        let mut alert = Alert::new(format!("Rule '{}' triggered", self.name), message, self.severity)
            .with_timestamp(fired_at)
            .with_metadata("rule", self.name.as_str())
            .with_metadata("tx_hash", transaction.hash.as_str())
            .with_metadata("from", transaction.from.as_str())
            .with_metadata("to", receiver)
            .with_metadata("value", transaction.value.to_string())
            .with_metadata("block_number", transaction.block_number.to_string());

        if !self.channels.is_empty() {
            alert = alert.with_metadata("channels", self.channels.join(","));
        }

        alert
    }
}
