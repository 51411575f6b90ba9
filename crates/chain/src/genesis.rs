//! Genesis parameters.
//!
//! The genesis block carries the chain's operating parameters: difficulty
//! and cost floors, the claim expiry window, the lookback window feeding
//! replay protection and the control loops, and the prefix bounds. The CLI
//! emits these as JSON; the VM parses them during initialization.

use crate::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use prefixvm_crypto::PUBLIC_KEY_LEN;

/// Chain parameters fixed at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    /// Floor for the per-transaction difficulty bound
    pub min_difficulty: u64,
    /// Floor for the aggregate block cost
    pub min_block_cost: u64,
    /// Seconds a fresh claim remains valid
    pub expiry_time: u64,
    /// Seconds of ancestry feeding replay protection and recalculation
    pub lookback_window: u64,
    /// Target seconds between blocks
    pub block_target: u64,
    /// Target (and maximum) transactions per block
    pub target_transactions: u64,
    /// Divisor applied to the lifeline renewal penalty
    pub prefix_renewal_discount: u64,
    /// Maximum prefix length in bytes
    pub max_prefix_len: u64,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            min_difficulty: 1,
            min_block_cost: 1,
            expiry_time: 3600,
            lookback_window: 60,
            block_target: 1,
            target_transactions: 10,
            prefix_renewal_discount: 5,
            max_prefix_len: 64,
        }
    }
}

impl Genesis {
    /// Load genesis parameters from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading genesis");
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChainError::InvalidGenesis(format!("read {}: {e}", path.display())))?;
        Self::from_json(content.as_bytes())
    }

    /// Save genesis parameters to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ChainError::InvalidGenesis(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ChainError::InvalidGenesis(format!("write {}: {e}", path.display())))
    }

    /// Parse genesis parameters from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let genesis: Genesis = serde_json::from_slice(bytes)
            .map_err(|e| ChainError::InvalidGenesis(e.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Validate the parameter set.
    pub fn validate(&self) -> Result<()> {
        debug!("validating genesis parameters");

        if self.expiry_time == 0 {
            return Err(ChainError::InvalidGenesis("expiry_time must be > 0".into()));
        }
        if self.block_target == 0 {
            return Err(ChainError::InvalidGenesis("block_target must be > 0".into()));
        }
        if self.lookback_window < self.block_target {
            return Err(ChainError::InvalidGenesis(
                "lookback_window must cover at least one block target".into(),
            ));
        }
        if self.target_transactions == 0 {
            return Err(ChainError::InvalidGenesis(
                "target_transactions must be > 0".into(),
            ));
        }
        if self.prefix_renewal_discount == 0 {
            return Err(ChainError::InvalidGenesis(
                "prefix_renewal_discount must be > 0".into(),
            ));
        }
        if self.max_prefix_len < PUBLIC_KEY_LEN as u64 {
            return Err(ChainError::InvalidGenesis(format!(
                "max_prefix_len must cover a serialized public key ({PUBLIC_KEY_LEN} bytes)"
            )));
        }
        Ok(())
    }

    /// The unit weight of a prefix.
    ///
    /// Monotone non-increasing in prefix length: short prefixes weigh more,
    /// which makes their lifeline renewals proportionally more expensive.
    pub fn prefix_units(&self, prefix: &[u8]) -> u64 {
        (self.max_prefix_len / prefix.len().max(1) as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_genesis_valid() {
        Genesis::default().validate().unwrap();
    }

    #[test]
    fn test_genesis_json_roundtrip() {
        let genesis = Genesis::default();
        let json = serde_json::to_vec(&genesis).unwrap();
        let decoded = Genesis::from_json(&json).unwrap();
        assert_eq!(genesis, decoded);
    }

    #[test]
    fn test_genesis_rejects_zero_discount() {
        let genesis = Genesis {
            prefix_renewal_discount: 0,
            ..Genesis::default()
        };
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn test_genesis_rejects_short_max_prefix() {
        let genesis = Genesis {
            max_prefix_len: 32,
            ..Genesis::default()
        };
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn test_prefix_units_monotone() {
        let genesis = Genesis::default();
        let mut last = u64::MAX;
        for len in 1..=genesis.max_prefix_len as usize {
            let units = genesis.prefix_units(&vec![b'a'; len]);
            assert!(units <= last);
            assert!(units >= 1);
            last = units;
        }
    }
}
