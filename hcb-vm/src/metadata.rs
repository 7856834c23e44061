//! One-shot parse of the script's metadata block, grounded on the reference
//! engine's own hand-rolled `Parser::parser()` field order.

use log::debug;

use crate::error::ReaderError;
use crate::reader::Reader;

#[derive(Debug, Clone)]
pub struct SyscallDescriptor {
    pub name: String,
    pub arg_count: u8,
}

/// Immutable once parsed; shared read-only by a [`crate::context::ScriptContext`].
#[derive(Debug, Clone)]
pub struct ScriptMetadata {
    pub metadata_offset: u32,
    pub entry_point: u32,
    pub global_count: u16,
    pub volatile_global_count: u16,
    pub resolution_mode: u16,
    pub game_title: String,
    pub syscalls: Vec<SyscallDescriptor>,
}

impl ScriptMetadata {
    /// The code region is `[4, metadata_offset)`.
    pub fn code_region(&self) -> std::ops::Range<u32> {
        4..self.metadata_offset
    }

    pub fn is_code_address(&self, addr: u32) -> bool {
        self.code_region().contains(&addr)
    }
}

/// Parses the metadata block out of `reader`, which must be positioned at
/// offset 0. Leaves the reader's cursor inside the metadata block; callers
/// that want to continue decoding the code region should `seek_to` it
/// explicitly.
pub fn parse_metadata(reader: &mut Reader) -> Result<ScriptMetadata, ReaderError> {
    reader.seek_to(0);
    let metadata_offset = reader.read_u32()?;
    reader.seek_to(metadata_offset as usize);

    let entry_point = reader.read_u32()?;
    let global_count = reader.read_u16()?;
    let volatile_global_count = reader.read_u16()?;
    let resolution_mode = reader.read_u16()?;
    let game_title = reader.read_string()?;
    let syscall_count = reader.read_u8()?;

    let mut syscalls = Vec::with_capacity(syscall_count as usize);
    for _ in 0..syscall_count {
        let arg_count = reader.read_u8()?;
        let name = reader.read_string()?;
        syscalls.push(SyscallDescriptor { name, arg_count });
    }

    debug!(
        "parsed metadata: entry_point={:#x} globals={} volatile_globals={} syscalls={} title={:?}",
        entry_point,
        global_count,
        volatile_global_count,
        syscalls.len(),
        game_title
    );

    Ok(ScriptMetadata {
        metadata_offset,
        entry_point,
        global_count,
        volatile_global_count,
        resolution_mode,
        game_title,
        syscalls,
    })
}
