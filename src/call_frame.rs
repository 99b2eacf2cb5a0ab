use crate::{
    constants::STACK_LIMIT,
    errors::{OutOfGasError, VMError},
    memory::Memory,
    opcodes::Opcode,
};
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Operand stack of 256-bit words, bounded at 1024 entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    pub stack: Vec<U256>,
}

impl Stack {
    pub fn pop(&mut self) -> Result<U256, VMError> {
        self.stack.pop().ok_or(VMError::StackUnderflow)
    }

    pub fn push(&mut self, value: U256) -> Result<(), VMError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VMError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Element `depth` positions below the top of the stack.
    pub fn get(&self, depth: usize) -> Result<&U256, VMError> {
        let index = self
            .stack
            .len()
            .checked_sub(1)
            .and_then(|top| top.checked_sub(depth))
            .ok_or(VMError::StackUnderflow)?;
        self.stack.get(index).ok_or(VMError::StackUnderflow)
    }

    /// Swap the top of the stack with the element `depth` below it.
    pub fn swap(&mut self, depth: usize) -> Result<(), VMError> {
        let top = self
            .stack
            .len()
            .checked_sub(1)
            .ok_or(VMError::StackUnderflow)?;
        let other = top.checked_sub(depth).ok_or(VMError::StackUnderflow)?;
        self.stack.swap(top, other);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

/// One activation record of the interpreter.
///
/// A frame owns its stack and memory; the state overlay is shared
/// through the VM and snapshotted when the frame is pushed, so a
/// reverting frame leaves its parent's view untouched.
#[derive(Debug, Clone, Default)]
pub struct CallFrame {
    /// Address whose context is executing (storage and balance owner).
    pub to: Address,
    pub msg_sender: Address,
    /// Address the bytecode was loaded from. Differs from `to` for
    /// CALLCODE and DELEGATECALL.
    pub code_address: Address,
    pub bytecode: Bytes,
    pub msg_value: U256,
    pub calldata: Bytes,
    pub is_static: bool,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub pc: usize,
    pub depth: usize,
    pub is_create: bool,
    pub stack: Stack,
    pub memory: Memory,
    /// Data returned by this frame when it halts.
    pub output: Bytes,
    /// Data returned by the most recent completed sub-context.
    pub sub_return_data: Bytes,
    pub logs: Vec<Log>,
    pub valid_jump_destinations: HashSet<usize>,
}

impl CallFrame {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        msg_sender: Address,
        to: Address,
        code_address: Address,
        bytecode: Bytes,
        msg_value: U256,
        calldata: Bytes,
        is_static: bool,
        gas_limit: u64,
        gas_used: u64,
        depth: usize,
        is_create: bool,
    ) -> Self {
        let valid_jump_destinations = get_valid_jump_destinations(&bytecode);
        Self {
            msg_sender,
            to,
            code_address,
            bytecode,
            msg_value,
            calldata,
            is_static,
            gas_limit,
            gas_used,
            depth,
            is_create,
            valid_jump_destinations,
            ..Default::default()
        }
    }

    /// Opcode under the program counter; running off the end of the
    /// bytecode behaves as STOP.
    pub fn next_opcode(&self) -> Opcode {
        self.bytecode
            .get(self.pc)
            .copied()
            .map(Opcode::from)
            .unwrap_or(Opcode::STOP)
    }

    pub fn increment_pc_by(&mut self, count: usize) -> Result<(), VMError> {
        self.pc = self
            .pc
            .checked_add(count)
            .ok_or(VMError::VeryLargeNumber)?;
        Ok(())
    }

    pub fn gas_left(&self) -> Result<u64, VMError> {
        self.gas_limit
            .checked_sub(self.gas_used)
            .ok_or(VMError::OutOfGas(OutOfGasError::ConsumedGasOverflow))
    }

    /// Charge `gas` against this frame's limit.
    pub fn increase_consumed_gas(&mut self, gas: u64) -> Result<(), VMError> {
        let potential_consumed_gas = self
            .gas_used
            .checked_add(gas)
            .ok_or(OutOfGasError::ConsumedGasOverflow)?;
        if potential_consumed_gas > self.gas_limit {
            return Err(VMError::OutOfGas(OutOfGasError::MaxGasLimitExceeded));
        }
        self.gas_used = potential_consumed_gas;
        Ok(())
    }
}

/// Positions of JUMPDEST bytes that are not part of PUSH immediates.
fn get_valid_jump_destinations(bytecode: &Bytes) -> HashSet<usize> {
    let mut destinations = HashSet::new();
    let mut pc = 0;
    while let Some(&byte) = bytecode.get(pc) {
        let opcode = Opcode::from(byte);
        if opcode == Opcode::JUMPDEST {
            destinations.insert(pc);
        }
        let skip = if (Opcode::PUSH1..=Opcode::PUSH32).contains(&opcode) {
            usize::from(byte)
                .checked_sub(usize::from(u8::from(Opcode::PUSH1)))
                .and_then(|n| n.checked_add(2))
                .unwrap_or(1)
        } else {
            1
        };
        pc = match pc.checked_add(skip) {
            Some(next) => next,
            None => break,
        };
    }
    destinations
}
