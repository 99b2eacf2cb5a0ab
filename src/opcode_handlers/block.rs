use crate::{
    errors::{OpcodeResult, VMError},
    gas_cost,
    vm::VM,
};

// Block Information (2)
// Opcodes: NUMBER, TIMESTAMP

impl VM {
    // NUMBER operation
    pub fn op_number(&mut self) -> Result<OpcodeResult, VMError> {
        let block_number = self.env.block_number;
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::NUMBER)?;
        current_call_frame.stack.push(block_number)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // TIMESTAMP operation
    pub fn op_timestamp(&mut self) -> Result<OpcodeResult, VMError> {
        let block_timestamp = self.env.block_timestamp;
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::TIMESTAMP)?;
        current_call_frame.stack.push(block_timestamp)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
