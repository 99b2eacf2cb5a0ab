use crate::{call_frame::Log, db::CacheDB};
use bytes::Bytes;
use ethereum_types::Address;
use thiserror::Error;

/// Errors that revert the current frame. Except for `RevertOpcode`,
/// raising one of these consumes all of the frame's remaining gas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    #[error("Stack Underflow")]
    StackUnderflow,
    #[error("Stack Overflow")]
    StackOverflow,
    #[error("Invalid Jump")]
    InvalidJump,
    #[error("Opcode Not Allowed In Static Context")]
    OpcodeNotAllowedInStaticContext,
    #[error("Opcode Not Found")]
    OpcodeNotFound,
    #[error("Invalid Opcode")]
    InvalidOpcode,
    #[error("Revert Opcode")]
    RevertOpcode,
    #[error("Out Of Gas: {0}")]
    OutOfGas(#[from] OutOfGasError),
    #[error("Very Large Number")]
    VeryLargeNumber,
    #[error("Out Of Offset")]
    OutOfOffset,
    #[error("Insufficient Balance")]
    InsufficientBalance,
    #[error("Balance Overflow")]
    BalanceOverflow,
    #[error("Nonce Overflow")]
    NonceOverflow,
    #[error("Address Already Occupied")]
    AddressAlreadyOccupied,
    #[error("Contract Output Too Big")]
    ContractOutputTooBig,
    #[error("Precompile execution error: {0}")]
    PrecompileError(#[from] PrecompileError),
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

impl VMError {
    /// Internal errors denote broken interpreter invariants. They abort
    /// the whole execution instead of reverting the current frame.
    pub fn is_internal(&self) -> bool {
        matches!(self, VMError::Internal(_))
    }

    /// Whether the error leaves the frame's unconsumed gas intact.
    pub fn should_consume_all_gas(&self) -> bool {
        !matches!(self, VMError::RevertOpcode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OutOfGasError {
    #[error("Gas Cost Overflow")]
    GasCostOverflow,
    #[error("Consumed Gas Overflow")]
    ConsumedGasOverflow,
    #[error("Max Gas Limit Exceeded")]
    MaxGasLimitExceeded,
    #[error("Arithmetic operation overflow in gas calculation")]
    ArithmeticOperationOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("Could not access last call frame")]
    CouldNotAccessLastCallframe,
    #[error("Could not pop call frame")]
    CouldNotPopCallframe,
    #[error("Arithmetic operation overflow")]
    ArithmeticOperationOverflow,
    #[error("Gas overflow")]
    GasOverflow,
    #[error("Could not compute create address")]
    CouldNotComputeCreateAddress,
    #[error("Account should have been cached")]
    AccountShouldHaveBeenCached,
    #[error("Slicing error")]
    SlicingError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PrecompileError {
    #[error("Not enough gas for precompile")]
    NotEnoughGas,
    #[error("Precompile not implemented")]
    NotImplemented,
}

/// Outcome of a single opcode: keep stepping this frame, or halt it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeResult {
    Continue { pc_increment: usize },
    Halt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    Success,
    Revert(VMError),
}

/// Terminal outcome of one frame (or of the whole transaction when the
/// halting frame is the root).
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub result: TxResult,
    /// Overlay after execution; its keys are the touched addresses.
    pub new_state: CacheDB,
    pub gas_used: u64,
    pub gas_refunded: u64,
    pub output: Bytes,
    pub logs: Vec<Log>,
    pub created_address: Option<Address>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.result, TxResult::Success)
    }
}
