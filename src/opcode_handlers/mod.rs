use crate::{
    errors::{OpcodeResult, VMError},
    opcodes::Opcode,
    vm::VM,
};

pub mod arithmetic;
pub mod block;
pub mod dup;
pub mod environment;
pub mod exchange;
pub mod keccak;
pub mod logging;
pub mod push;
pub mod stack_memory_storage_flow;
pub mod system;

impl VM {
    /// Single dispatch point of the interpreter loop.
    pub fn handle_current_opcode(&mut self, opcode: Opcode) -> Result<OpcodeResult, VMError> {
        match opcode {
            Opcode::STOP => Ok(OpcodeResult::Halt),
            Opcode::ADD => self.op_add(),
            Opcode::MUL => self.op_mul(),
            Opcode::SUB => self.op_sub(),
            Opcode::DIV => self.op_div(),
            Opcode::MOD => self.op_mod(),
            Opcode::KECCAK256 => self.op_keccak256(),
            Opcode::ADDRESS => self.op_address(),
            Opcode::BALANCE => self.op_balance(),
            Opcode::ORIGIN => self.op_origin(),
            Opcode::CALLER => self.op_caller(),
            Opcode::CALLVALUE => self.op_callvalue(),
            Opcode::CALLDATALOAD => self.op_calldataload(),
            Opcode::CALLDATASIZE => self.op_calldatasize(),
            Opcode::CALLDATACOPY => self.op_calldatacopy(),
            Opcode::RETURNDATASIZE => self.op_returndatasize(),
            Opcode::RETURNDATACOPY => self.op_returndatacopy(),
            Opcode::NUMBER => self.op_number(),
            Opcode::TIMESTAMP => self.op_timestamp(),
            Opcode::POP => self.op_pop(),
            Opcode::MLOAD => self.op_mload(),
            Opcode::MSTORE => self.op_mstore(),
            Opcode::MSTORE8 => self.op_mstore8(),
            Opcode::SLOAD => self.op_sload(),
            Opcode::SSTORE => self.op_sstore(),
            Opcode::JUMP => self.op_jump(),
            Opcode::JUMPI => self.op_jumpi(),
            Opcode::PC => self.op_pc(),
            Opcode::MSIZE => self.op_msize(),
            Opcode::GAS => self.op_gas(),
            Opcode::JUMPDEST => self.op_jumpdest(),
            Opcode::PUSH0 => self.op_push0(),
            op if (Opcode::PUSH1..=Opcode::PUSH32).contains(&op) => self.op_push(op),
            op if (Opcode::DUP1..=Opcode::DUP16).contains(&op) => self.op_dup(op),
            op if (Opcode::SWAP1..=Opcode::SWAP16).contains(&op) => self.op_swap(op),
            op if (Opcode::LOG0..=Opcode::LOG4).contains(&op) => self.op_log(op),
            Opcode::CREATE => self.op_create(),
            Opcode::CALL => self.op_call(),
            Opcode::CALLCODE => self.op_callcode(),
            Opcode::RETURN => self.op_return(),
            Opcode::DELEGATECALL => self.op_delegatecall(),
            Opcode::CREATE2 => self.op_create2(),
            Opcode::STATICCALL => self.op_staticcall(),
            Opcode::REVERT => self.op_revert(),
            Opcode::SELFDESTRUCT => self.op_selfdestruct(),
            _ => self.op_invalid(),
        }
    }
}
