//! Single contiguous operand+frame buffer.
//!
//! Frame records are stored inline as sentinel slots in the same backing
//! sequence as operand values (the "second sum `{Value | FrameRecord}`"
//! option the design notes call out), grounded directly on the reference
//! engine's own `Context` stack layout: a saved-frame value sits at
//! `frame_base - 1`, and `get_local(-1)` reads it back to learn the active
//! frame's own `arg_count`/`local_count` without tracking them redundantly.

use crate::error::StackBreak;
use crate::value::Value;

/// A return address that is never actually jumped to: the sentinel seated
/// under the root frame. `pop_call` returning to `frame_base == 0` is how
/// the dispatcher recognizes "returned past the root" and halts instead of
/// resuming at this address.
pub const HALT_RETURN_ADDRESS: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    return_address: u32,
    arg_count: u8,
    local_count: u8,
    /// frame_base to restore when this frame's own invocation returns.
    frame_base: i32,
}

#[derive(Debug, Clone)]
enum Slot {
    Value(Value),
    Frame(FrameRecord),
}

#[derive(Debug)]
pub struct CallStack {
    slots: Vec<Slot>,
    frame_base: usize,
    frame_size: usize,
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            frame_base: 0,
            frame_size: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frame_base(&self) -> usize {
        self.frame_base
    }

    fn current_frame(&self) -> Result<FrameRecord, StackBreak> {
        if self.frame_base == 0 {
            return Err(StackBreak::NoFrame);
        }
        match self.slots[self.frame_base - 1] {
            Slot::Frame(rec) => Ok(rec),
            Slot::Value(_) => Err(StackBreak::Corrupt),
        }
    }

    pub fn push(&mut self, v: Value) {
        self.slots.push(Slot::Value(v));
        self.frame_size += 1;
    }

    pub fn pop(&mut self) -> Result<Value, StackBreak> {
        if self.frame_size == 0 {
            return Err(StackBreak::Underflow);
        }
        self.frame_size -= 1;
        match self.slots.pop() {
            Some(Slot::Value(v)) => Ok(v),
            _ => Err(StackBreak::Corrupt),
        }
    }

    pub fn peek(&self) -> Result<&Value, StackBreak> {
        if self.frame_size == 0 {
            return Err(StackBreak::Underflow);
        }
        match self.slots.last() {
            Some(Slot::Value(v)) => Ok(v),
            _ => Err(StackBreak::Corrupt),
        }
    }

    /// `-arg_count <= i < local_count`.
    ///
    /// Physically, the saved-frame sentinel sits at `frame_base - 1` (it was
    /// appended right after the caller's arguments, since those were already
    /// on the stack by the time `push_call` runs). Argument slots are
    /// therefore one slot further down than a naive `frame_base + i` would
    /// land: `i == -1` (the last-pushed argument) must resolve to
    /// `frame_base - 2`, skipping over the sentinel, not to the sentinel
    /// itself.
    pub fn get_local(&self, i: i32) -> Result<Value, StackBreak> {
        let frame = self.current_frame()?;
        let arg_count = frame.arg_count as i32;
        let local_count = frame.local_count as i32;
        if i < -arg_count || i >= local_count {
            return Err(StackBreak::BadLocalIndex {
                index: i,
                arg_count: frame.arg_count,
                local_count: frame.local_count,
            });
        }
        let shift: i64 = if i < 0 { -1 } else { 0 };
        let idx = (self.frame_base as i64 + i as i64 + shift) as usize;
        match &self.slots[idx] {
            Slot::Value(v) => Ok(v.clone()),
            Slot::Frame(_) => Err(StackBreak::Corrupt),
        }
    }

    /// `0 <= i < local_count`; writes below zero are rejected even though
    /// reads permit them (arguments are read-only in practice).
    pub fn set_local(&mut self, i: i32, v: Value) -> Result<(), StackBreak> {
        if i < 0 {
            return Err(StackBreak::WriteToArgument(i));
        }
        let frame = self.current_frame()?;
        let local_count = frame.local_count as i32;
        if i >= local_count {
            return Err(StackBreak::BadLocalIndex {
                index: i,
                arg_count: frame.arg_count,
                local_count: frame.local_count,
            });
        }
        let idx = self.frame_base + i as usize;
        self.slots[idx] = Slot::Value(v);
        Ok(())
    }

    /// Seats a new frame. `return_address` is either the address saved by
    /// the preceding `Call`, or [`HALT_RETURN_ADDRESS`] for the very first
    /// (root) invocation, where there is no preceding `Call`.
    pub fn push_call(&mut self, return_address: u32, arg_count: u8, local_count: u8) {
        self.slots.push(Slot::Frame(FrameRecord {
            return_address,
            arg_count,
            local_count,
            frame_base: self.frame_base as i32,
        }));
        self.frame_base = self.slots.len();
        for _ in 0..local_count {
            self.slots.push(Slot::Value(Value::Nil));
        }
        self.frame_size = 0;
    }

    /// Unwinds the active frame back to its caller, returning the saved
    /// return address (or [`HALT_RETURN_ADDRESS`] if this was the root
    /// frame, which the dispatcher must not follow).
    pub fn pop_call(&mut self) -> Result<u32, StackBreak> {
        if self.frame_size != 0 {
            return Err(StackBreak::NonEmptyReturn {
                remaining: self.frame_size,
            });
        }
        let rec = self.current_frame()?;
        let local_count = rec.local_count as usize;
        let arg_count = rec.arg_count as usize;
        let new_len = self
            .slots
            .len()
            .checked_sub(local_count + 1 + arg_count)
            .ok_or(StackBreak::Corrupt)?;
        self.slots.truncate(new_len);
        self.frame_base = rec.frame_base as usize;
        self.frame_size = if self.frame_base == 0 {
            0
        } else {
            let restored = self.current_frame()?;
            self.slots.len() - self.frame_base - restored.local_count as usize
        };
        Ok(rec.return_address)
    }

    /// True once the root frame itself has returned.
    pub fn is_halted(&self) -> bool {
        self.frame_base == 0 && self.slots.is_empty()
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}
