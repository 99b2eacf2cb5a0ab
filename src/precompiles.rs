//! Precompiled contracts. The call machinery treats this registry as a
//! black box: `is_precompile` decides whether a callee short-circuits
//! the bytecode lookup, and `execute_precompile` runs the child frame
//! in place of the interpreter loop.

use crate::{
    call_frame::CallFrame,
    constants::{FIRST_PRECOMPILE, LAST_PRECOMPILE},
    errors::{PrecompileError, VMError},
    gas_cost,
};
use bytes::Bytes;
use ethereum_types::Address;
use sha2::{Digest, Sha256};

pub const SHA2_256_ADDRESS: u64 = 0x02;
pub const IDENTITY_ADDRESS: u64 = 0x04;

pub fn is_precompile(address: &Address) -> bool {
    (FIRST_PRECOMPILE..=LAST_PRECOMPILE)
        .any(|precompile| address == &Address::from_low_u64_be(precompile))
}

/// Run the precompile the frame is addressed to, charging its gas
/// against the frame and leaving its output in `frame.output`.
pub fn execute_precompile(current_call_frame: &mut CallFrame) -> Result<Bytes, VMError> {
    let callee = current_call_frame.code_address;
    let calldata = current_call_frame.calldata.clone();

    if callee == Address::from_low_u64_be(SHA2_256_ADDRESS) {
        current_call_frame.increase_consumed_gas(gas_cost::sha2_256(calldata.len())?)?;
        let hash = Sha256::digest(&calldata);
        return Ok(Bytes::copy_from_slice(&hash));
    }

    if callee == Address::from_low_u64_be(IDENTITY_ADDRESS) {
        current_call_frame.increase_consumed_gas(gas_cost::identity(calldata.len())?)?;
        return Ok(calldata);
    }

    Err(PrecompileError::NotImplemented.into())
}
