//! Gas schedule of the interpreter. Dynamic costs use checked
//! arithmetic throughout; overflowing a cost computation is reported as
//! an out-of-gas condition rather than wrapping.

use crate::{
    call_frame::CallFrame,
    constants::WORD_SIZE,
    errors::{OutOfGasError, VMError},
};
use ethereum_types::U256;

pub const ADD: u64 = 3;
pub const MUL: u64 = 5;
pub const SUB: u64 = 3;
pub const DIV: u64 = 5;
pub const MODULO: u64 = 5;

pub const KECCAK256_STATIC: u64 = 30;
pub const KECCAK256_DYNAMIC_BASE: u64 = 6;

pub const ADDRESS: u64 = 2;
pub const BALANCE: u64 = 700;
pub const ORIGIN: u64 = 2;
pub const CALLER: u64 = 2;
pub const CALLVALUE: u64 = 2;
pub const CALLDATALOAD: u64 = 3;
pub const CALLDATASIZE: u64 = 2;
pub const CALLDATACOPY_STATIC: u64 = 3;
pub const CALLDATACOPY_DYNAMIC_BASE: u64 = 3;
pub const RETURNDATASIZE: u64 = 2;
pub const RETURNDATACOPY_STATIC: u64 = 3;
pub const RETURNDATACOPY_DYNAMIC_BASE: u64 = 3;

pub const NUMBER: u64 = 2;
pub const TIMESTAMP: u64 = 2;

pub const POP: u64 = 2;
pub const MLOAD_STATIC: u64 = 3;
pub const MSTORE_STATIC: u64 = 3;
pub const MSTORE8_STATIC: u64 = 3;
pub const SLOAD: u64 = 800;
pub const SSTORE_NOOP: u64 = 800;
pub const SSTORE_SET: u64 = 20000;
pub const SSTORE_RESET: u64 = 5000;
pub const JUMP: u64 = 8;
pub const JUMPI: u64 = 10;
pub const PC: u64 = 2;
pub const MSIZE: u64 = 2;
pub const GAS: u64 = 2;
pub const JUMPDEST: u64 = 1;

pub const PUSH0: u64 = 2;
pub const PUSHN: u64 = 3;
pub const DUPN: u64 = 3;
pub const SWAPN: u64 = 3;

pub const LOGN_STATIC: u64 = 375;
pub const LOGN_DYNAMIC_BASE: u64 = 375;
pub const LOGN_DYNAMIC_BYTE_BASE: u64 = 8;

pub const SELFDESTRUCT_STATIC: u64 = 5000;

/// Charged per word of init code on CREATE/CREATE2.
pub const INIT_CODE_WORD_COST: u64 = 2;
/// Charged per byte of deployed code on successful creation.
pub const CODE_DEPOSIT_COST: u64 = 200;

pub const SHA2_256_STATIC: u64 = 60;
pub const SHA2_256_DYNAMIC_BASE: u64 = 12;
pub const IDENTITY_STATIC: u64 = 15;
pub const IDENTITY_DYNAMIC_BASE: u64 = 3;

/// Number of 32-byte words needed to hold `size` bytes.
fn minimum_word_size(size: usize) -> Result<u64, OutOfGasError> {
    let words = size
        .checked_add(WORD_SIZE)
        .ok_or(OutOfGasError::ArithmeticOperationOverflow)?
        .saturating_sub(1)
        .checked_div(WORD_SIZE)
        .ok_or(OutOfGasError::ArithmeticOperationOverflow)?;
    u64::try_from(words).map_err(|_| OutOfGasError::ArithmeticOperationOverflow)
}

/// Quadratic memory price for a word-aligned size:
/// `3·w + w²/512` where `w` is the word count.
fn memory_cost(memory_size: usize) -> Result<u64, OutOfGasError> {
    let words = u64::try_from(
        memory_size
            .checked_div(WORD_SIZE)
            .ok_or(OutOfGasError::ArithmeticOperationOverflow)?,
    )
    .map_err(|_| OutOfGasError::ArithmeticOperationOverflow)?;

    let linear = words
        .checked_mul(3)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    let quadratic = words
        .checked_mul(words)
        .ok_or(OutOfGasError::GasCostOverflow)?
        .checked_div(512)
        .ok_or(OutOfGasError::ArithmeticOperationOverflow)?;

    linear
        .checked_add(quadratic)
        .ok_or(OutOfGasError::GasCostOverflow)
}

/// Cost of growing memory from `current_memory_size` to
/// `new_memory_size` (both word-aligned byte counts). Zero when the
/// high-water mark does not move.
pub fn memory_expansion_cost(
    new_memory_size: usize,
    current_memory_size: usize,
) -> Result<u64, OutOfGasError> {
    if new_memory_size <= current_memory_size {
        return Ok(0);
    }
    memory_cost(new_memory_size)?
        .checked_sub(memory_cost(current_memory_size)?)
        .ok_or(OutOfGasError::GasCostOverflow)
}

/// All-but-one-64th of the gas still available to `current_call_frame`.
/// This is both the CREATE reservation and the CALL forwarding cap.
pub fn max_message_call_gas(current_call_frame: &CallFrame) -> Result<u64, VMError> {
    let remaining_gas = current_call_frame.gas_left()?;
    remaining_gas
        .checked_sub(remaining_gas.checked_div(64).unwrap_or_default())
        .ok_or(VMError::OutOfGas(OutOfGasError::GasCostOverflow))
}

/// Upfront cost and forwarded gas of the CALL family.
///
/// Memory expansion is priced first; the forwarding cap applies to
/// whatever remains, and a request above the cap silently receives the
/// cap. The returned cost is `expansion + forwarded` and is charged to
/// the caller before the child frame is built.
pub fn call(
    new_memory_size: usize,
    current_memory_size: usize,
    requested_gas: U256,
    gas_left: u64,
) -> Result<(u64, u64), VMError> {
    let memory_expansion = memory_expansion_cost(new_memory_size, current_memory_size)?;

    let remaining = gas_left.saturating_sub(memory_expansion);
    let cap = remaining
        .checked_sub(remaining.checked_div(64).unwrap_or_default())
        .ok_or(OutOfGasError::GasCostOverflow)?;
    let forwarded = if requested_gas > U256::from(cap) {
        cap
    } else {
        requested_gas.low_u64()
    };

    let cost = memory_expansion
        .checked_add(forwarded)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    Ok((cost, forwarded))
}

/// Upfront cost of CREATE: memory expansion plus the per-word init-code
/// charge.
pub fn create(
    new_memory_size: usize,
    current_memory_size: usize,
    code_size_in_memory: usize,
) -> Result<u64, VMError> {
    compute_create_cost(new_memory_size, current_memory_size, code_size_in_memory, 0)
}

/// CREATE2 additionally pays for hashing the init code.
pub fn create_2(
    new_memory_size: usize,
    current_memory_size: usize,
    code_size_in_memory: usize,
) -> Result<u64, VMError> {
    compute_create_cost(
        new_memory_size,
        current_memory_size,
        code_size_in_memory,
        KECCAK256_DYNAMIC_BASE,
    )
}

fn compute_create_cost(
    new_memory_size: usize,
    current_memory_size: usize,
    code_size_in_memory: usize,
    hash_word_cost: u64,
) -> Result<u64, VMError> {
    let memory_expansion = memory_expansion_cost(new_memory_size, current_memory_size)?;
    let words = minimum_word_size(code_size_in_memory)?;

    let init_code_cost = words
        .checked_mul(INIT_CODE_WORD_COST)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    let hash_cost = words
        .checked_mul(hash_word_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?;

    memory_expansion
        .checked_add(init_code_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?
        .checked_add(hash_cost)
        .ok_or(OutOfGasError::GasCostOverflow.into())
}

/// RETURN and REVERT only pay for memory expansion.
pub fn exit_opcode(
    new_memory_size: usize,
    current_memory_size: usize,
) -> Result<u64, VMError> {
    Ok(memory_expansion_cost(new_memory_size, current_memory_size)?)
}

pub fn keccak256(
    new_memory_size: usize,
    current_memory_size: usize,
    size: usize,
) -> Result<u64, VMError> {
    dynamic_word_cost(
        new_memory_size,
        current_memory_size,
        size,
        KECCAK256_STATIC,
        KECCAK256_DYNAMIC_BASE,
    )
}

pub fn calldatacopy(
    new_memory_size: usize,
    current_memory_size: usize,
    size: usize,
) -> Result<u64, VMError> {
    dynamic_word_cost(
        new_memory_size,
        current_memory_size,
        size,
        CALLDATACOPY_STATIC,
        CALLDATACOPY_DYNAMIC_BASE,
    )
}

pub fn returndatacopy(
    new_memory_size: usize,
    current_memory_size: usize,
    size: usize,
) -> Result<u64, VMError> {
    dynamic_word_cost(
        new_memory_size,
        current_memory_size,
        size,
        RETURNDATACOPY_STATIC,
        RETURNDATACOPY_DYNAMIC_BASE,
    )
}

fn dynamic_word_cost(
    new_memory_size: usize,
    current_memory_size: usize,
    size: usize,
    static_cost: u64,
    word_cost: u64,
) -> Result<u64, VMError> {
    let memory_expansion = memory_expansion_cost(new_memory_size, current_memory_size)?;
    let words_cost = minimum_word_size(size)?
        .checked_mul(word_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    static_cost
        .checked_add(words_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow.into())
}

pub fn mload(new_memory_size: usize, current_memory_size: usize) -> Result<u64, VMError> {
    static_plus_expansion(new_memory_size, current_memory_size, MLOAD_STATIC)
}

pub fn mstore(new_memory_size: usize, current_memory_size: usize) -> Result<u64, VMError> {
    static_plus_expansion(new_memory_size, current_memory_size, MSTORE_STATIC)
}

pub fn mstore8(new_memory_size: usize, current_memory_size: usize) -> Result<u64, VMError> {
    static_plus_expansion(new_memory_size, current_memory_size, MSTORE8_STATIC)
}

fn static_plus_expansion(
    new_memory_size: usize,
    current_memory_size: usize,
    static_cost: u64,
) -> Result<u64, VMError> {
    let memory_expansion = memory_expansion_cost(new_memory_size, current_memory_size)?;
    static_cost
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow.into())
}

/// Flat storage-write schedule: zero→non-zero pays the set cost,
/// any other change pays the reset cost, no-ops pay the read cost.
pub fn sstore(current_value: U256, new_value: U256) -> u64 {
    if new_value == current_value {
        SSTORE_NOOP
    } else if current_value.is_zero() {
        SSTORE_SET
    } else {
        SSTORE_RESET
    }
}

pub fn log(
    new_memory_size: usize,
    current_memory_size: usize,
    size: usize,
    number_of_topics: u64,
) -> Result<u64, VMError> {
    let memory_expansion = memory_expansion_cost(new_memory_size, current_memory_size)?;
    let topics_cost = LOGN_DYNAMIC_BASE
        .checked_mul(number_of_topics)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    let bytes_cost = LOGN_DYNAMIC_BYTE_BASE
        .checked_mul(u64::try_from(size).map_err(|_| OutOfGasError::GasCostOverflow)?)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    LOGN_STATIC
        .checked_add(topics_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?
        .checked_add(bytes_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?
        .checked_add(memory_expansion)
        .ok_or(OutOfGasError::GasCostOverflow.into())
}

pub fn sha2_256(data_size: usize) -> Result<u64, OutOfGasError> {
    precompile_word_cost(data_size, SHA2_256_STATIC, SHA2_256_DYNAMIC_BASE)
}

pub fn identity(data_size: usize) -> Result<u64, OutOfGasError> {
    precompile_word_cost(data_size, IDENTITY_STATIC, IDENTITY_DYNAMIC_BASE)
}

fn precompile_word_cost(
    data_size: usize,
    static_cost: u64,
    word_cost: u64,
) -> Result<u64, OutOfGasError> {
    let words_cost = minimum_word_size(data_size)?
        .checked_mul(word_cost)
        .ok_or(OutOfGasError::GasCostOverflow)?;
    static_cost
        .checked_add(words_cost)
        .ok_or(OutOfGasError::GasCostOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_cost_is_quadratic_delta() {
        // One word: 3·1 + 1/512 = 3. Thirty-two words: 96 + 2 = 98.
        assert_eq!(memory_expansion_cost(32, 0).unwrap(), 3);
        assert_eq!(memory_expansion_cost(1024, 0).unwrap(), 98);
        assert_eq!(
            memory_expansion_cost(1024, 32).unwrap(),
            98 - 3
        );
        assert_eq!(memory_expansion_cost(32, 1024).unwrap(), 0);
    }

    #[test]
    fn forwarded_gas_is_capped_at_63_64ths() {
        let (cost, forwarded) =
            call(0, 0, U256::from(1_000_000), 640_000).unwrap();
        assert_eq!(forwarded, 630_000);
        assert_eq!(cost, 630_000);
    }

    #[test]
    fn requested_gas_below_cap_is_forwarded_verbatim() {
        let (cost, forwarded) = call(0, 0, U256::from(1_000), 640_000).unwrap();
        assert_eq!(forwarded, 1_000);
        assert_eq!(cost, 1_000);
    }

    #[test]
    fn memory_expansion_is_paid_before_the_cap() {
        // 32 words of fresh memory cost 98; the cap applies to the rest.
        let (cost, forwarded) =
            call(1024, 0, U256::MAX, 10_098).unwrap();
        assert_eq!(forwarded, 10_000 - 10_000 / 64);
        assert_eq!(cost, 98 + forwarded);
    }
}
