use crate::{
    call_frame::CallFrame,
    constants::{WORD_SIZE, WORD_SIZE_IN_BYTES_USIZE},
    errors::{OpcodeResult, VMError},
    gas_cost,
    memory::{self, calculate_memory_size},
    vm::VM,
};
use ethereum_types::{H256, U256};

// Stack, Memory, Storage and Flow Operations (12)
// Opcodes: POP, MLOAD, MSTORE, MSTORE8, SLOAD, SSTORE, JUMP, JUMPI, PC, MSIZE, GAS, JUMPDEST

impl VM {
    // POP operation
    pub fn op_pop(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::POP)?;
        current_call_frame.stack.pop()?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // MLOAD operation
    pub fn op_mload(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let offset = current_call_frame.stack.pop()?;

        let new_memory_size = calculate_memory_size(offset, WORD_SIZE_IN_BYTES_USIZE)?;

        current_call_frame.increase_consumed_gas(gas_cost::mload(
            new_memory_size,
            current_call_frame.memory.len(),
        )?)?;

        current_call_frame
            .stack
            .push(memory::load_word(&mut current_call_frame.memory, offset)?)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // MSTORE operation
    pub fn op_mstore(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let offset = current_call_frame.stack.pop()?;

        let new_memory_size = calculate_memory_size(offset, WORD_SIZE_IN_BYTES_USIZE)?;

        current_call_frame.increase_consumed_gas(gas_cost::mstore(
            new_memory_size,
            current_call_frame.memory.len(),
        )?)?;

        let value = current_call_frame.stack.pop()?;

        memory::try_store_data(
            &mut current_call_frame.memory,
            offset,
            &value.to_big_endian(),
        )?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // MSTORE8 operation
    pub fn op_mstore8(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let offset = current_call_frame.stack.pop()?;

        let new_memory_size = calculate_memory_size(offset, 1)?;

        current_call_frame.increase_consumed_gas(gas_cost::mstore8(
            new_memory_size,
            current_call_frame.memory.len(),
        )?)?;

        let value = current_call_frame.stack.pop()?;
        let bytes = value.to_big_endian();
        let lowest_byte = bytes
            .get(WORD_SIZE - 1..WORD_SIZE)
            .ok_or(VMError::VeryLargeNumber)?;

        memory::try_store_data(&mut current_call_frame.memory, offset, lowest_byte)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // SLOAD operation
    pub fn op_sload(&mut self) -> Result<OpcodeResult, VMError> {
        let (storage_slot_key, address) = {
            let current_call_frame = self.current_call_frame_mut()?;
            let storage_slot_key = current_call_frame.stack.pop()?;
            (storage_slot_key, current_call_frame.to)
        };

        let key = H256::from(storage_slot_key.to_big_endian());
        let storage_slot = self.access_storage_slot(address, key)?;

        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::SLOAD)?;
        current_call_frame.stack.push(storage_slot.current_value)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // SSTORE operation
    pub fn op_sstore(&mut self) -> Result<OpcodeResult, VMError> {
        if self.current_call_frame()?.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let (storage_slot_key, new_storage_slot_value, to) = {
            let current_call_frame = self.current_call_frame_mut()?;
            let storage_slot_key = current_call_frame.stack.pop()?;
            let new_storage_slot_value = current_call_frame.stack.pop()?;
            (storage_slot_key, new_storage_slot_value, current_call_frame.to)
        };

        let key = H256::from(storage_slot_key.to_big_endian());
        let storage_slot = self.access_storage_slot(to, key)?;

        self.current_call_frame_mut()?
            .increase_consumed_gas(gas_cost::sstore(
                storage_slot.current_value,
                new_storage_slot_value,
            ))?;

        self.update_account_storage(to, key, new_storage_slot_value)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // MSIZE operation
    pub fn op_msize(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::MSIZE)?;
        current_call_frame
            .stack
            .push(current_call_frame.memory.len().into())?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // GAS operation
    pub fn op_gas(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::GAS)?;

        let remaining_gas = current_call_frame.gas_left()?;
        current_call_frame.stack.push(remaining_gas.into())?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // JUMP operation
    pub fn op_jump(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::JUMP)?;

        let jump_address = current_call_frame.stack.pop()?;
        Self::jump(current_call_frame, jump_address)?;

        Ok(OpcodeResult::Continue { pc_increment: 0 })
    }

    /// Move the program counter to `jump_address`, which must be a
    /// JUMPDEST outside any PUSH immediate.
    pub fn jump(call_frame: &mut CallFrame, jump_address: U256) -> Result<(), VMError> {
        let jump_address_usize: usize = jump_address
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        if !call_frame.valid_jump_destinations.contains(&jump_address_usize) {
            return Err(VMError::InvalidJump);
        }
        call_frame.pc = jump_address_usize;
        Ok(())
    }

    // JUMPI operation
    pub fn op_jumpi(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let jump_address = current_call_frame.stack.pop()?;
        let condition = current_call_frame.stack.pop()?;

        current_call_frame.increase_consumed_gas(gas_cost::JUMPI)?;

        let pc_increment = if !condition.is_zero() {
            // Move the PC but don't increment it afterwards.
            Self::jump(current_call_frame, jump_address)?;
            0
        } else {
            1
        };
        Ok(OpcodeResult::Continue { pc_increment })
    }

    // JUMPDEST operation
    pub fn op_jumpdest(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::JUMPDEST)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // PC operation
    pub fn op_pc(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::PC)?;

        current_call_frame
            .stack
            .push(U256::from(current_call_frame.pc))?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
