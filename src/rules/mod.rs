pub mod condition;
pub mod engine;
pub mod rule;

pub use condition::{ConditionValue, Field, Operator, RuleCondition};
pub use engine::{RuleEngine, RuleRegistry};
pub use rule::AlertRule;
