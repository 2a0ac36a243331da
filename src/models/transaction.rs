use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One on-chain transfer extracted from a block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creation
    pub to: Option<String>,
    /// Native-unit amount (wei scaled down by 10^18)
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
}

impl Transaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// New-head notification as delivered by a header subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: u64,
}

/// Full block with its transactions in on-chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
}
