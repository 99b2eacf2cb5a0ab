use crate::{
    errors::{OpcodeResult, VMError},
    gas_cost,
    vm::VM,
};
use ethereum_types::U256;

// Arithmetic Operations (5)
// Opcodes: ADD, MUL, SUB, DIV, MOD

impl VM {
    // ADD operation
    pub fn op_add(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::ADD)?;

        let augend = current_call_frame.stack.pop()?;
        let addend = current_call_frame.stack.pop()?;
        let (sum, _overflowed) = augend.overflowing_add(addend);
        current_call_frame.stack.push(sum)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // MUL operation
    pub fn op_mul(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::MUL)?;

        let multiplicand = current_call_frame.stack.pop()?;
        let multiplier = current_call_frame.stack.pop()?;
        let (product, _overflowed) = multiplicand.overflowing_mul(multiplier);
        current_call_frame.stack.push(product)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // SUB operation
    pub fn op_sub(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::SUB)?;

        let minuend = current_call_frame.stack.pop()?;
        let subtrahend = current_call_frame.stack.pop()?;
        let (difference, _overflowed) = minuend.overflowing_sub(subtrahend);
        current_call_frame.stack.push(difference)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // DIV operation
    pub fn op_div(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::DIV)?;

        let dividend = current_call_frame.stack.pop()?;
        let divisor = current_call_frame.stack.pop()?;
        let quotient = dividend.checked_div(divisor).unwrap_or(U256::zero());
        current_call_frame.stack.push(quotient)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    // MOD operation
    pub fn op_mod(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        current_call_frame.increase_consumed_gas(gas_cost::MODULO)?;

        let dividend = current_call_frame.stack.pop()?;
        let divisor = current_call_frame.stack.pop()?;
        let remainder = dividend.checked_rem(divisor).unwrap_or(U256::zero());
        current_call_frame.stack.push(remainder)?;

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
