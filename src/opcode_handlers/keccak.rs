use crate::{
    errors::{OpcodeResult, VMError},
    gas_cost,
    memory::{self, calculate_memory_size},
    vm::VM,
};
use ethereum_types::U256;
use sha3::{Digest, Keccak256};

// KECCAK256 (1)

impl VM {
    // KECCAK256 operation
    pub fn op_keccak256(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let offset = current_call_frame.stack.pop()?;
        let size: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        let new_memory_size = calculate_memory_size(offset, size)?;

        current_call_frame.increase_consumed_gas(gas_cost::keccak256(
            new_memory_size,
            current_call_frame.memory.len(),
            size,
        )?)?;

        let data = memory::load_range(&mut current_call_frame.memory, offset, size)?;
        let hash = Keccak256::digest(data);
        current_call_frame.stack.push(U256::from_big_endian(&hash))?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
