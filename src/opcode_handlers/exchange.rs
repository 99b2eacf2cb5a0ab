use crate::{
    errors::{InternalError, OpcodeResult, VMError},
    gas_cost,
    opcodes::Opcode,
    vm::VM,
};

// Exchange Operations (16)
// Opcodes: SWAP1 ... SWAP16

impl VM {
    // SWAPn operation
    pub fn op_swap(&mut self, op: Opcode) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::SWAPN)?;

        let depth = usize::from(u8::from(op))
            .checked_sub(usize::from(u8::from(Opcode::SWAP1)))
            .and_then(|d| d.checked_add(1))
            .ok_or(InternalError::ArithmeticOperationOverflow)?;

        current_call_frame.stack.swap(depth)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
