use crate::{
    constants::WORD_SIZE,
    errors::{OpcodeResult, VMError},
    gas_cost,
    memory::{self, calculate_memory_size},
    utils::{address_to_word, get_account, word_to_address},
    vm::VM,
};
use ethereum_types::U256;

// Environmental Information (10)
// Opcodes: ADDRESS, BALANCE, ORIGIN, CALLER, CALLVALUE, CALLDATALOAD,
// CALLDATASIZE, CALLDATACOPY, RETURNDATASIZE, RETURNDATACOPY

impl VM {
    // ADDRESS operation
    pub fn op_address(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::ADDRESS)?;
        let address = current_call_frame.to;
        current_call_frame.stack.push(address_to_word(address))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // BALANCE operation
    pub fn op_balance(&mut self) -> Result<OpcodeResult, VMError> {
        let address = word_to_address(self.current_call_frame_mut()?.stack.pop()?);
        let balance = get_account(&mut self.db, address)?.info.balance;

        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::BALANCE)?;
        current_call_frame.stack.push(balance)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // ORIGIN operation
    pub fn op_origin(&mut self) -> Result<OpcodeResult, VMError> {
        let origin = self.env.origin;
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::ORIGIN)?;
        current_call_frame.stack.push(address_to_word(origin))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // CALLER operation
    pub fn op_caller(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::CALLER)?;
        let caller = current_call_frame.msg_sender;
        current_call_frame.stack.push(address_to_word(caller))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // CALLVALUE operation
    pub fn op_callvalue(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::CALLVALUE)?;
        let value = current_call_frame.msg_value;
        current_call_frame.stack.push(value)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // CALLDATALOAD operation
    pub fn op_calldataload(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::CALLDATALOAD)?;

        let offset: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .unwrap_or(usize::MAX);

        // Reads past the end of the calldata are zero-padded.
        let mut word = [0u8; WORD_SIZE];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = offset
                .checked_add(i)
                .and_then(|pos| current_call_frame.calldata.get(pos))
                .copied()
                .unwrap_or(0);
        }
        current_call_frame
            .stack
            .push(U256::from_big_endian(&word))?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // CALLDATASIZE operation
    pub fn op_calldatasize(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::CALLDATASIZE)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.calldata.len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // CALLDATACOPY operation
    pub fn op_calldatacopy(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let dest_offset = current_call_frame.stack.pop()?;
        let calldata_offset: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .unwrap_or(usize::MAX);
        let size: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        let new_memory_size = calculate_memory_size(dest_offset, size)?;

        current_call_frame.increase_consumed_gas(gas_cost::calldatacopy(
            new_memory_size,
            current_call_frame.memory.len(),
            size,
        )?)?;

        let mut data = vec![0u8; size];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = calldata_offset
                .checked_add(i)
                .and_then(|pos| current_call_frame.calldata.get(pos))
                .copied()
                .unwrap_or(0);
        }
        memory::try_store_data(&mut current_call_frame.memory, dest_offset, &data)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // RETURNDATASIZE operation
    pub fn op_returndatasize(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::RETURNDATASIZE)?;
        current_call_frame
            .stack
            .push(U256::from(current_call_frame.sub_return_data.len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // RETURNDATACOPY operation
    pub fn op_returndatacopy(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let dest_offset = current_call_frame.stack.pop()?;
        let returndata_offset: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;
        let size: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        let new_memory_size = calculate_memory_size(dest_offset, size)?;

        current_call_frame.increase_consumed_gas(gas_cost::returndatacopy(
            new_memory_size,
            current_call_frame.memory.len(),
            size,
        )?)?;

        // Unlike calldata, reading past the end of the return data is
        // an error.
        let copy_end = returndata_offset
            .checked_add(size)
            .ok_or(VMError::OutOfOffset)?;
        if copy_end > current_call_frame.sub_return_data.len() {
            return Err(VMError::OutOfOffset);
        }

        let data = current_call_frame
            .sub_return_data
            .slice(returndata_offset..copy_end);
        memory::try_store_data(&mut current_call_frame.memory, dest_offset, &data)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
