use crate::{
    call_frame::Log,
    errors::{InternalError, OpcodeResult, VMError},
    gas_cost,
    memory::{self, calculate_memory_size},
    opcodes::Opcode,
    vm::VM,
};
use bytes::Bytes;
use ethereum_types::H256;

// Logging Operations (5)
// Opcodes: LOG0 ... LOG4

impl VM {
    // LOGn operation
    pub fn op_log(&mut self, op: Opcode) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        if current_call_frame.is_static {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        let number_of_topics = u8::from(op)
            .checked_sub(u8::from(Opcode::LOG0))
            .ok_or(InternalError::ArithmeticOperationOverflow)?;

        let offset = current_call_frame.stack.pop()?;
        let size: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        let mut topics = Vec::with_capacity(usize::from(number_of_topics));
        for _ in 0..number_of_topics {
            let topic = current_call_frame.stack.pop()?;
            topics.push(H256::from(topic.to_big_endian()));
        }

        let new_memory_size = calculate_memory_size(offset, size)?;

        current_call_frame.increase_consumed_gas(gas_cost::log(
            new_memory_size,
            current_call_frame.memory.len(),
            size,
            u64::from(number_of_topics),
        )?)?;

        let data = memory::load_range(&mut current_call_frame.memory, offset, size)?.to_vec();
        let log = Log {
            address: current_call_frame.to,
            topics,
            data: Bytes::from(data),
        };
        current_call_frame.logs.push(log);

        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
