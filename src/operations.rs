use bytes::Bytes;
use ethereum_types::U256;

/// Assembler-level view of the supported instruction set, used to build
/// bytecode for tests and tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    Mod,
    Keccak256,
    Address,
    Balance,
    Origin,
    Caller,
    Callvalue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    ReturnDataSize,
    ReturnDataCopy,
    Number,
    Timestamp,
    Pop,
    Mload,
    Mstore,
    Mstore8,
    Sload,
    Sstore,
    Jump,
    Jumpi,
    PC,
    Msize,
    Gas,
    Jumpdest,
    Push0,
    /// `(n, value)` pushes the low `n` bytes of `value`.
    Push((u8, U256)),
    Dup(u8),
    Swap(u8),
    Log(u8),
    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,
    Invalid,
    SelfDestruct,
}

impl Operation {
    pub fn to_bytecode(&self) -> Bytes {
        match self {
            Operation::Stop => Bytes::copy_from_slice(&[0x00]),
            Operation::Add => Bytes::copy_from_slice(&[0x01]),
            Operation::Mul => Bytes::copy_from_slice(&[0x02]),
            Operation::Sub => Bytes::copy_from_slice(&[0x03]),
            Operation::Div => Bytes::copy_from_slice(&[0x04]),
            Operation::Mod => Bytes::copy_from_slice(&[0x06]),
            Operation::Keccak256 => Bytes::copy_from_slice(&[0x20]),
            Operation::Address => Bytes::copy_from_slice(&[0x30]),
            Operation::Balance => Bytes::copy_from_slice(&[0x31]),
            Operation::Origin => Bytes::copy_from_slice(&[0x32]),
            Operation::Caller => Bytes::copy_from_slice(&[0x33]),
            Operation::Callvalue => Bytes::copy_from_slice(&[0x34]),
            Operation::CallDataLoad => Bytes::copy_from_slice(&[0x35]),
            Operation::CallDataSize => Bytes::copy_from_slice(&[0x36]),
            Operation::CallDataCopy => Bytes::copy_from_slice(&[0x37]),
            Operation::ReturnDataSize => Bytes::copy_from_slice(&[0x3D]),
            Operation::ReturnDataCopy => Bytes::copy_from_slice(&[0x3E]),
            Operation::Timestamp => Bytes::copy_from_slice(&[0x42]),
            Operation::Number => Bytes::copy_from_slice(&[0x43]),
            Operation::Pop => Bytes::copy_from_slice(&[0x50]),
            Operation::Mload => Bytes::copy_from_slice(&[0x51]),
            Operation::Mstore => Bytes::copy_from_slice(&[0x52]),
            Operation::Mstore8 => Bytes::copy_from_slice(&[0x53]),
            Operation::Sload => Bytes::copy_from_slice(&[0x54]),
            Operation::Sstore => Bytes::copy_from_slice(&[0x55]),
            Operation::Jump => Bytes::copy_from_slice(&[0x56]),
            Operation::Jumpi => Bytes::copy_from_slice(&[0x57]),
            Operation::PC => Bytes::copy_from_slice(&[0x58]),
            Operation::Msize => Bytes::copy_from_slice(&[0x59]),
            Operation::Gas => Bytes::copy_from_slice(&[0x5A]),
            Operation::Jumpdest => Bytes::copy_from_slice(&[0x5B]),
            Operation::Push0 => Bytes::copy_from_slice(&[0x5F]),
            Operation::Push((n_bytes, value)) => {
                let n_bytes = usize::from(*n_bytes).clamp(1, 32);
                let opcode = 0x5F_u8.saturating_add(u8::try_from(n_bytes).unwrap_or(1));
                let word = value.to_big_endian();
                let mut bytecode = vec![opcode];
                bytecode.extend_from_slice(
                    word.get(32_usize.saturating_sub(n_bytes)..).unwrap_or_default(),
                );
                Bytes::from(bytecode)
            }
            Operation::Dup(n) => {
                let n = (*n).clamp(1, 16);
                Bytes::copy_from_slice(&[0x7F_u8.saturating_add(n)])
            }
            Operation::Swap(n) => {
                let n = (*n).clamp(1, 16);
                Bytes::copy_from_slice(&[0x8F_u8.saturating_add(n)])
            }
            Operation::Log(n) => {
                let n = (*n).min(4);
                Bytes::copy_from_slice(&[0xA0_u8.saturating_add(n)])
            }
            Operation::Create => Bytes::copy_from_slice(&[0xF0]),
            Operation::Call => Bytes::copy_from_slice(&[0xF1]),
            Operation::CallCode => Bytes::copy_from_slice(&[0xF2]),
            Operation::Return => Bytes::copy_from_slice(&[0xF3]),
            Operation::DelegateCall => Bytes::copy_from_slice(&[0xF4]),
            Operation::Create2 => Bytes::copy_from_slice(&[0xF5]),
            Operation::StaticCall => Bytes::copy_from_slice(&[0xFA]),
            Operation::Revert => Bytes::copy_from_slice(&[0xFD]),
            Operation::Invalid => Bytes::copy_from_slice(&[0xFE]),
            Operation::SelfDestruct => Bytes::copy_from_slice(&[0xFF]),
        }
    }
}

/// Concatenate a program into its bytecode.
pub fn ops_to_bytecode(operations: &[Operation]) -> Bytes {
    operations
        .iter()
        .flat_map(|op| op.to_bytecode())
        .collect::<Bytes>()
}
