use bytes::Bytes;
use ethereum_types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: U256,
    pub nonce: u64,
    pub bytecode: Bytes,
}

impl AccountInfo {
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && self.bytecode.is_empty()
    }

    pub fn has_code(&self) -> bool {
        !self.bytecode.is_empty()
    }
}

/// A storage slot keeps the value it had at the start of the
/// transaction next to the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub original_value: U256,
    pub current_value: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub info: AccountInfo,
    pub storage: HashMap<H256, StorageSlot>,
    /// Set by SELFDESTRUCT; never cleared within a transaction.
    pub destructed: bool,
}

impl Account {
    pub fn new(
        balance: U256,
        bytecode: Bytes,
        nonce: u64,
        storage: HashMap<H256, StorageSlot>,
    ) -> Self {
        Self {
            info: AccountInfo {
                balance,
                nonce,
                bytecode,
            },
            storage,
            destructed: false,
        }
    }

    /// An address is considered occupied for contract deployment when
    /// it already carries code or a non-zero nonce.
    pub fn has_code_or_nonce(&self) -> bool {
        self.info.has_code() || self.info.nonce != 0
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.info.balance = balance;
        self
    }

    pub fn with_bytecode(mut self, bytecode: Bytes) -> Self {
        self.info.bytecode = bytecode;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.info.nonce = nonce;
        self
    }
}
