use crate::{
    constants::WORD_SIZE,
    errors::{InternalError, VMError},
};
use ethereum_types::U256;

/// Byte-addressable memory of a call frame. It only ever grows, in
/// 32-byte words, and reads beyond the current length zero-fill.
pub type Memory = Vec<u8>;

/// Word-aligned size the memory must reach for an access of `size`
/// bytes at `offset`. Offsets that do not fit a `usize` cannot be paid
/// for and are rejected here.
pub fn calculate_memory_size(offset: U256, size: usize) -> Result<usize, VMError> {
    if size == 0 {
        return Ok(0);
    }

    let offset: usize = offset.try_into().map_err(|_| VMError::VeryLargeNumber)?;

    let memory_size = offset
        .checked_add(size)
        .ok_or(VMError::VeryLargeNumber)?
        .checked_next_multiple_of(WORD_SIZE)
        .ok_or(VMError::VeryLargeNumber)?;

    Ok(memory_size)
}

fn resize(memory: &mut Memory, unaligned_new_size: usize) -> Result<(), VMError> {
    let new_size = unaligned_new_size
        .checked_next_multiple_of(WORD_SIZE)
        .ok_or(VMError::VeryLargeNumber)?;
    if new_size > memory.len() {
        memory.resize(new_size, 0);
    }
    Ok(())
}

pub fn load_word(memory: &mut Memory, offset: U256) -> Result<U256, VMError> {
    let bytes = load_range(memory, offset, WORD_SIZE)?;
    Ok(U256::from_big_endian(bytes))
}

pub fn load_range(memory: &mut Memory, offset: U256, size: usize) -> Result<&[u8], VMError> {
    if size == 0 {
        return Ok(&[]);
    }

    let offset: usize = offset.try_into().map_err(|_| VMError::VeryLargeNumber)?;
    let end = offset.checked_add(size).ok_or(VMError::VeryLargeNumber)?;
    resize(memory, end)?;

    memory
        .get(offset..end)
        .ok_or(VMError::Internal(InternalError::SlicingError))
}

pub fn try_store_data(memory: &mut Memory, offset: U256, data: &[u8]) -> Result<(), VMError> {
    if data.is_empty() {
        return Ok(());
    }

    let offset: usize = offset.try_into().map_err(|_| VMError::VeryLargeNumber)?;
    let end = offset
        .checked_add(data.len())
        .ok_or(VMError::VeryLargeNumber)?;
    resize(memory, end)?;

    memory
        .get_mut(offset..end)
        .ok_or(VMError::Internal(InternalError::SlicingError))?
        .copy_from_slice(data);
    Ok(())
}

/// Store at most `size` bytes of `data` at `offset`, truncating the
/// data when it is longer. Used when folding a child frame's output
/// back into the caller's memory.
pub fn try_store_range(
    memory: &mut Memory,
    offset: U256,
    size: usize,
    data: &[u8],
) -> Result<(), VMError> {
    let size = size.min(data.len());
    let data = data
        .get(..size)
        .ok_or(VMError::Internal(InternalError::SlicingError))?;
    try_store_data(memory, offset, data)
}
