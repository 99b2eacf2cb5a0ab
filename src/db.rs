use crate::{
    account::{Account, AccountInfo},
    utils::compute_host_address,
};
use ethereum_types::{Address, H256, U256};
use std::{collections::HashMap, fmt::Debug, sync::Arc};

/// Backing store the engine reads cold state from. Implementations are
/// expected to be snapshots: reads must be stable for the lifetime of a
/// transaction.
pub trait Database: Debug + Send + Sync {
    fn get_account_info(&self, address: Address) -> AccountInfo;
    fn get_storage_slot(&self, address: Address, key: H256) -> U256;
}

/// In-memory store. Accounts are keyed by the host-chain address
/// derived from their EVM address, the same layout a host-chain
/// integration would use.
#[derive(Debug, Clone, Default)]
pub struct Db {
    accounts: HashMap<H256, Account>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(compute_host_address(address), account);
    }

    pub fn get_account(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&compute_host_address(address))
    }
}

impl Database for Db {
    fn get_account_info(&self, address: Address) -> AccountInfo {
        self.get_account(address)
            .map(|account| account.info.clone())
            .unwrap_or_default()
    }

    fn get_storage_slot(&self, address: Address, key: H256) -> U256 {
        self.get_account(address)
            .and_then(|account| account.storage.get(&key))
            .map(|slot| slot.current_value)
            .unwrap_or_default()
    }
}

/// Transactional overlay over the store, keyed by EVM address. Cloning
/// it is what makes frame snapshots and reverts cheap to reason about.
pub type CacheDB = HashMap<Address, Account>;

pub mod cache {
    use super::{Account, Address, CacheDB};

    pub fn get_account<'c>(cache: &'c CacheDB, address: &Address) -> Option<&'c Account> {
        cache.get(address)
    }

    pub fn get_account_mut<'c>(
        cache: &'c mut CacheDB,
        address: &Address,
    ) -> Option<&'c mut Account> {
        cache.get_mut(address)
    }

    pub fn insert_account(cache: &mut CacheDB, address: Address, account: Account) {
        cache.insert(address, account);
    }

    pub fn remove_account(cache: &mut CacheDB, address: &Address) -> Option<Account> {
        cache.remove(address)
    }

    pub fn is_account_cached(cache: &CacheDB, address: &Address) -> bool {
        cache.contains_key(address)
    }
}

/// Store plus overlay, as handed to the VM.
#[derive(Debug, Clone)]
pub struct GeneralizedDatabase {
    pub store: Arc<dyn Database>,
    pub cache: CacheDB,
}

impl GeneralizedDatabase {
    pub fn new(store: Arc<dyn Database>, cache: CacheDB) -> Self {
        Self { store, cache }
    }

    /// Seed an account directly into the overlay. Mostly useful for
    /// tests and for host integrations that pre-warm state.
    pub fn add_account(&mut self, address: Address, account: Account) {
        cache::insert_account(&mut self.cache, address, account);
    }
}
