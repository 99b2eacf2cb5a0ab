use ethereum_types::U256;

pub const WORD_SIZE: usize = 32;
pub const WORD_SIZE_IN_BYTES_USIZE: usize = 32;

/// Maximum depth of the call-frame stack, and of the operand stack.
pub const CALL_DEPTH_LIMIT: usize = 1024;
pub const STACK_LIMIT: usize = 1024;

/// EIP-170 deployed-code cap; init code may be at most twice as large.
pub const MAX_CODE_SIZE: usize = 0x6000;
pub const INIT_CODE_MAX_SIZE: usize = MAX_CODE_SIZE * 2;

pub const MAX_NONCE: u64 = u64::MAX;

pub const SUCCESS_FOR_CALL: U256 = U256([1, 0, 0, 0]);
pub const REVERT_FOR_CALL: U256 = U256([0, 0, 0, 0]);
pub const CREATE_DEPLOYMENT_FAIL: U256 = U256([0, 0, 0, 0]);

/// Addresses of the lowest and highest precompiled contracts.
pub const FIRST_PRECOMPILE: u64 = 0x01;
pub const LAST_PRECOMPILE: u64 = 0x09;
