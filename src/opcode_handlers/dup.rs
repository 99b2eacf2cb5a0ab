use crate::{
    errors::{InternalError, OpcodeResult, VMError},
    gas_cost,
    opcodes::Opcode,
    vm::VM,
};

// Duplication Operations (16)
// Opcodes: DUP1 ... DUP16

impl VM {
    // DUPn operation
    pub fn op_dup(&mut self, op: Opcode) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::DUPN)?;

        let depth = usize::from(u8::from(op))
            .checked_sub(usize::from(u8::from(Opcode::DUP1)))
            .ok_or(InternalError::ArithmeticOperationOverflow)?;

        let value = *current_call_frame.stack.get(depth)?;
        current_call_frame.stack.push(value)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
