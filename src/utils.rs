use crate::{
    account::Account,
    db::{cache, CacheDB, Db, GeneralizedDatabase},
    environment::Environment,
    errors::{InternalError, VMError},
    operations::{ops_to_bytecode, Operation},
    vm::{TxKind, VM},
};
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};
use std::sync::Arc;

/// Domain tag mixed into the host-address derivation so account keys
/// cannot collide with other host-chain namespaces.
const HOST_ADDRESS_DOMAIN: &[u8] = b"hostevm/account";

pub fn keccak256(data: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(data))
}

/// Deterministic translation from a 160-bit EVM address to the 256-bit
/// key the host chain stores the account under.
pub fn compute_host_address(address: Address) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(HOST_ADDRESS_DOMAIN);
    hasher.update(address.as_bytes());
    H256::from_slice(&hasher.finalize())
}

pub fn address_to_word(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}

/// Low 160 bits of a word, interpreted as an address.
pub fn word_to_address(word: U256) -> Address {
    Address::from_slice(word.to_big_endian().get(12..).unwrap_or_default())
}

/// Split a word into its 128-bit halves, `(high, low)`.
pub fn split_u128(value: U256) -> (u128, u128) {
    let low = value.low_u128();
    let high = (value >> 128).low_u128();
    (high, low)
}

/// Join 128-bit halves back into a word.
pub fn u256_from_u128_halves(low: u128, high: u128) -> U256 {
    (U256::from(high) << 128) | U256::from(low)
}

/// Address of a contract deployed with CREATE:
/// `keccak256(rlp([sender_address, sender_nonce]))[12..]`.
pub fn calculate_create_address(
    sender_address: Address,
    sender_nonce: u64,
) -> Result<Address, VMError> {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender_address);
    stream.append(&sender_nonce);
    let hash = keccak256(&stream.out());
    address_from_hash(hash)
}

/// Address of a contract deployed with CREATE2:
/// `keccak256(0xff ++ sender_address ++ salt ++ keccak256(initialization_code))[12..]`.
pub fn calculate_create2_address(
    sender_address: Address,
    initialization_code: &Bytes,
    salt: U256,
) -> Result<Address, VMError> {
    let initialization_code_hash = Keccak256::digest(initialization_code);

    let mut hasher = Keccak256::new();
    hasher.update([0xff]);
    hasher.update(sender_address.as_bytes());
    hasher.update(salt.to_big_endian());
    hasher.update(initialization_code_hash);
    address_from_hash(H256::from_slice(&hasher.finalize()))
}

fn address_from_hash(hash: H256) -> Result<Address, VMError> {
    let tail = hash
        .as_bytes()
        .get(12..)
        .ok_or(VMError::Internal(InternalError::CouldNotComputeCreateAddress))?;
    Ok(Address::from_slice(tail))
}

/// Account lookup through the overlay, lazily pulling cold accounts in
/// from the backing store. Absent accounts materialize as the empty
/// default.
pub fn get_account(db: &mut GeneralizedDatabase, address: Address) -> Result<Account, VMError> {
    Ok(get_account_mut(db, address)?.clone())
}

pub fn get_account_mut<'db>(
    db: &'db mut GeneralizedDatabase,
    address: Address,
) -> Result<&'db mut Account, VMError> {
    if !cache::is_account_cached(&db.cache, &address) {
        let info = db.store.get_account_info(address);
        cache::insert_account(
            &mut db.cache,
            address,
            Account {
                info,
                ..Default::default()
            },
        );
    }
    cache::get_account_mut(&mut db.cache, &address)
        .ok_or(VMError::Internal(InternalError::AccountShouldHaveBeenCached))
}

pub fn increase_account_balance(
    db: &mut GeneralizedDatabase,
    address: Address,
    increase: U256,
) -> Result<(), VMError> {
    let account = get_account_mut(db, address)?;
    account.info.balance = account
        .info
        .balance
        .checked_add(increase)
        .ok_or(VMError::BalanceOverflow)?;
    Ok(())
}

pub fn decrease_account_balance(
    db: &mut GeneralizedDatabase,
    address: Address,
    decrease: U256,
) -> Result<(), VMError> {
    let account = get_account_mut(db, address)?;
    account.info.balance = account
        .info
        .balance
        .checked_sub(decrease)
        .ok_or(VMError::InsufficientBalance)?;
    Ok(())
}

/// Move `value` between two accounts. The paired updates keep the sum
/// of balances invariant; the caller checks the sender's funds first.
pub fn transfer(
    db: &mut GeneralizedDatabase,
    from: Address,
    to: Address,
    value: U256,
) -> Result<(), VMError> {
    decrease_account_balance(db, from, value)?;
    increase_account_balance(db, to, value)
}

pub fn increment_account_nonce(
    db: &mut GeneralizedDatabase,
    address: Address,
) -> Result<(), VMError> {
    let account = get_account_mut(db, address)?;
    account.info.nonce = account
        .info
        .nonce
        .checked_add(1)
        .ok_or(VMError::NonceOverflow)?;
    Ok(())
}

/// Gas limit used by the test constructors below.
pub const DEFAULT_TEST_GAS_LIMIT: u64 = 0xFFFF_FFFF;

/// Address the test constructors install the program at.
pub fn test_contract_address() -> Address {
    Address::from_low_u64_be(42)
}

/// VM executing `operations` with a generously funded default origin.
pub fn new_vm_with_ops(operations: &[Operation]) -> Result<VM, VMError> {
    new_vm_with_ops_addr_bal(
        ops_to_bytecode(operations),
        Address::from_low_u64_be(0x64),
        U256::from(100_000_000u64),
    )
}

/// VM executing `bytecode` at the test contract address, with
/// `sender_address` as the pre-funded transaction origin.
pub fn new_vm_with_ops_addr_bal(
    bytecode: Bytes,
    sender_address: Address,
    sender_balance: U256,
) -> Result<VM, VMError> {
    let mut store = Db::new();
    store.add_account(
        sender_address,
        Account::default().with_balance(sender_balance),
    );
    store.add_account(
        test_contract_address(),
        Account::default().with_bytecode(bytecode),
    );

    let db = GeneralizedDatabase::new(Arc::new(store), CacheDB::new());
    let env = Environment {
        origin: sender_address,
        gas_limit: DEFAULT_TEST_GAS_LIMIT,
        ..Default::default()
    };

    VM::new(
        env,
        db,
        TxKind::Call(test_contract_address()),
        U256::zero(),
        Bytes::new(),
    )
}
