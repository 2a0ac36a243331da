use std::collections::HashSet;
use std::fmt;

use crate::error::WatcherError;
use crate::models::Transaction;

/// Normalize an address to lowercase with a `0x` prefix
pub fn normalize_address(address: &str) -> String {
    let addr = address.trim();
    let body = if addr.starts_with("0x") || addr.starts_with("0X") {
        &addr[2..]
    } else {
        addr
    };
    format!("0x{}", body.to_lowercase())
}

/// Validate that an address is a 20-byte hex account identifier
pub fn validate_address(address: &str) -> Result<(), WatcherError> {
    let normalized = normalize_address(address);
    let body = &normalized[2..];

    if body.len() != 40 {
        return Err(WatcherError::InvalidAddress(format!(
            "{}: must be 40 hex characters, got {}",
            address.trim(),
            body.len()
        )));
    }

    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WatcherError::InvalidAddress(format!(
            "{}: contains non-hexadecimal characters",
            address.trim()
        )));
    }

    Ok(())
}

/// A validated, normalized address under watch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchedAddress(String);

impl WatchedAddress {
    pub fn parse(address: &str) -> Result<Self, WatcherError> {
        validate_address(address)?;
        Ok(Self(normalize_address(address)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of watched addresses checked against sender and receiver
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    addresses: HashSet<String>,
}

impl WatchSet {
    /// Parse every address; the first invalid one fails the whole set
    pub fn parse<S: AsRef<str>>(addresses: &[S]) -> Result<Self, WatcherError> {
        let mut set = HashSet::new();
        for address in addresses {
            let watched = WatchedAddress::parse(address.as_ref())?;
            set.insert(watched.0);
        }
        Ok(Self { addresses: set })
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(&normalize_address(address))
    }

    /// Sender or receiver is watched. Contract creations never match,
    /// whoever sent them.
    pub fn is_relevant(&self, transaction: &Transaction) -> bool {
        match &transaction.to {
            Some(to) => self.contains(&transaction.from) || self.contains(to),
            None => false,
        }
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.addresses.iter().cloned().collect();
        addresses.sort();
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const WATCHED: &str = "0xF977814e90dA44bFA03b6295A0616a897441aceC";
    const OTHER: &str = "0x1234567890123456789012345678901234567890";

    fn transaction(from: &str, to: Option<&str>) -> Transaction {
        Transaction {
            hash: "0xabc".to_string(),
            from: from.to_string(),
            to: to.map(|s| s.to_string()),
            value: 1.0,
            timestamp: Utc::now(),
            block_number: 1,
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(WATCHED), "0xf977814e90da44bfa03b6295a0616a897441acec");
        assert_eq!(
            normalize_address("F977814e90dA44bFA03b6295A0616a897441aceC"),
            "0xf977814e90da44bfa03b6295a0616a897441acec"
        );
        assert_eq!(
            normalize_address("  0X455E53847F9F0F0B0FCF0B0B0B0B0B0B0B0B0B0B "),
            "0x455e53847f9f0f0b0fcf0b0b0b0b0b0b0b0b0b0b"
        );
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441acec").is_ok());
        assert!(validate_address("f977814e90da44bfa03b6295a0616a897441acec").is_ok());

        // Too short, too long, invalid hex, empty
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441ace").is_err());
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441acecc").is_err());
        assert!(validate_address("0xg977814e90da44bfa03b6295a0616a897441acec").is_err());
        assert!(matches!(validate_address(""), Err(WatcherError::InvalidAddress(_))));
    }

    #[test]
    fn test_watched_address_is_normalized() {
        let watched = WatchedAddress::parse(WATCHED).unwrap();
        assert_eq!(watched.as_str(), "0xf977814e90da44bfa03b6295a0616a897441acec");
        assert_eq!(watched, WatchedAddress::parse(&WATCHED.to_uppercase().replace("0X", "0x")).unwrap());
    }

    #[test]
    fn test_watch_set_relevance() {
        let set = WatchSet::parse(&[WATCHED]).unwrap();

        assert!(set.is_relevant(&transaction(WATCHED, Some(OTHER))));
        assert!(set.is_relevant(&transaction(OTHER, Some(WATCHED.to_lowercase().as_str()))));
        assert!(!set.is_relevant(&transaction(OTHER, Some(OTHER))));
        assert!(!set.is_relevant(&transaction(OTHER, None)));
    }

    #[test]
    fn test_contract_creation_from_watched_sender_is_ignored() {
        let set = WatchSet::parse(&[WATCHED]).unwrap();

        assert!(!set.is_relevant(&transaction(WATCHED, None)));
        assert!(!set.is_relevant(&transaction(&WATCHED.to_lowercase(), None)));
    }

    #[test]
    fn test_watch_set_rejects_any_invalid_address() {
        let result = WatchSet::parse(&[WATCHED, "0xnothex"]);
        assert!(matches!(result, Err(WatcherError::InvalidAddress(_))));
    }

    #[test]
    fn test_watch_set_deduplicates() {
        let set = WatchSet::parse(&[WATCHED, WATCHED.to_lowercase().as_str()]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.addresses(), vec!["0xf977814e90da44bfa03b6295a0616a897441acec".to_string()]);
    }
}
