use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Transaction-level context: who initiated execution, how much gas it
/// may burn, and the block snapshot visible to the bytecode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    pub origin: Address,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub block_number: U256,
    pub block_timestamp: U256,
    /// Refunds accrued at the state-overlay boundary; settled by the
    /// transaction executor, not by the engine.
    pub refunded_gas: u64,
}

impl Environment {
    pub fn default_from_address(origin: Address) -> Self {
        Self {
            origin,
            gas_limit: u64::MAX,
            ..Default::default()
        }
    }
}
