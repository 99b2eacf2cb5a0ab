use crate::{
    errors::{InternalError, OpcodeResult, VMError},
    gas_cost,
    opcodes::Opcode,
    vm::VM,
};
use ethereum_types::U256;

// Push Operations (33)
// Opcodes: PUSH0, PUSH1 ... PUSH32

impl VM {
    // PUSH0 operation
    pub fn op_push0(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::PUSH0)?;
        current_call_frame.stack.push(U256::zero())?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // PUSHn operation
    pub fn op_push(&mut self, op: Opcode) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::PUSHN)?;

        let push_size = usize::from(u8::from(op))
            .checked_sub(usize::from(u8::from(Opcode::PUSH1)))
            .and_then(|size| size.checked_add(1))
            .ok_or(InternalError::ArithmeticOperationOverflow)?;

        let immediate_start = current_call_frame
            .pc
            .checked_add(1)
            .ok_or(InternalError::ArithmeticOperationOverflow)?;

        // Immediates truncated by the end of the bytecode read as if
        // padded with zeros on the right.
        let mut buffer = [0u8; 32];
        let available = current_call_frame
            .bytecode
            .get(immediate_start..)
            .unwrap_or_default();
        let copy_len = push_size.min(available.len());
        buffer
            .get_mut(..copy_len)
            .ok_or(InternalError::SlicingError)?
            .copy_from_slice(available.get(..copy_len).ok_or(InternalError::SlicingError)?);

        let value = U256::from_big_endian(
            buffer
                .get(..push_size)
                .ok_or(InternalError::SlicingError)?,
        );
        current_call_frame.stack.push(value)?;

        let pc_increment = push_size
            .checked_add(1)
            .ok_or(InternalError::ArithmeticOperationOverflow)?;
        Ok(OpcodeResult::Continue { pc_increment })
    }
}
