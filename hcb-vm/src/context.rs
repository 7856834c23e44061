//! The fetch-decode-execute dispatcher.
//!
//! Mirrors the reference engine's `Context::dispatch_opcode` one-opcode-at-a-
//! time loop and its per-instruction `anyhow::Result<()>` handlers, but reads
//! operands off a [`Reader`] instead of hand-rolled cursor arithmetic, and
//! keeps frames in a [`CallStack`] instead of a flat `Vec<Variant>` the
//! context indexes by hand.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use log::{debug, error, trace, warn};

use crate::call_stack::{CallStack, HALT_RETURN_ADDRESS};
use crate::error::{ScriptRuntimeException, VmError};
use crate::metadata::{parse_metadata, ScriptMetadata};
use crate::opcode::Opcode;
use crate::reader::Reader;
use crate::syscall::{SyscallHost, SyscallRegistry};
use crate::value::{compare, vm_add, vm_and, vm_div, vm_mod, vm_mul, vm_neg, vm_or, vm_sub, Table, TableRef, Value};

use hcb_nls::Decoder;

/// A fully resolved script image plus everything the dispatcher needs to run
/// it: its own call stack, its declared globals, and wherever its syscalls
/// are bound.
pub struct ScriptContext {
    reader: Reader,
    metadata: ScriptMetadata,
    call_stack: CallStack,
    globals: Vec<Option<Value>>,
    /// `None` means absent: `Ret` clears it, and `PushReturn` fails rather
    /// than push a stale or placeholder value.
    return_value: Option<Value>,
    pc: u32,
    /// Stashed by `Call`, consumed by the `InitStack` at its target. Seeded
    /// with [`HALT_RETURN_ADDRESS`] so the very first `InitStack` (the root
    /// frame, which has no preceding `Call`) has something to consume too.
    pending_return_address: Option<u32>,
    halted: bool,
    syscalls: SyscallRegistry,
}

impl ScriptContext {
    pub fn new(image: Vec<u8>, decoder: Decoder) -> Result<Self, ScriptRuntimeException> {
        let mut reader = Reader::new(image, decoder);
        let metadata = parse_metadata(&mut reader)
            .map_err(|e| ScriptRuntimeException::with_source(0, e.to_string(), e))?;
        let pc = metadata.entry_point;
        let globals = vec![None; metadata.global_count as usize];
        debug!(
            "loaded script {:?}: entry={:#x} globals={}",
            metadata.game_title, pc, metadata.global_count
        );
        Ok(Self {
            reader,
            metadata,
            call_stack: CallStack::new(),
            globals,
            return_value: None,
            pc,
            pending_return_address: Some(HALT_RETURN_ADDRESS),
            halted: false,
            syscalls: SyscallRegistry::new(),
        })
    }

    pub fn metadata(&self) -> &ScriptMetadata {
        &self.metadata
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn return_value(&self) -> Value {
        self.return_value.clone().unwrap_or(Value::Nil)
    }

    pub fn syscalls_mut(&mut self) -> &mut SyscallRegistry {
        &mut self.syscalls
    }

    pub fn register_syscall_host<H: SyscallHost>(
        &mut self,
        host: &H,
    ) -> Result<(), crate::error::SyscallError> {
        self.syscalls.register_reflective(host)
    }

    pub fn global(&self, id: u16) -> Value {
        self.globals
            .get(id as usize)
            .and_then(|v| v.clone())
            .unwrap_or(Value::Nil)
    }

    /// Runs until the root frame returns or a step fails.
    pub fn run(&mut self) -> Result<Value, ScriptRuntimeException> {
        while !self.halted {
            self.step()?;
        }
        Ok(self.return_value())
    }

    /// Executes exactly one instruction. A no-op once [`Self::is_halted`].
    pub fn step(&mut self) -> Result<(), ScriptRuntimeException> {
        if self.halted {
            return Ok(());
        }
        let pc = self.pc;
        self.reader.seek_to(pc as usize);
        let raw = self.reader.read_u8().map_err(|e| {
            let message = e.to_string();
            ScriptRuntimeException::with_source(pc, message, e)
        })?;
        let opcode = Opcode::try_from(raw).map_err(|byte| {
            ScriptRuntimeException::with_source(
                pc,
                format!("unimplemented opcode 0x{byte:02x}"),
                VmError::NotImplementedOpcode(byte),
            )
        })?;
        trace!("pc={:#x} op={}", pc, opcode.mnemonic());
        self.dispatch(pc, opcode).map_err(|e| {
            error!("pc={:#x} op={} failed: {}", pc, opcode.mnemonic(), e);
            crate::error::wrap(pc, e)
        })
    }

    fn dispatch(&mut self, pc: u32, opcode: Opcode) -> Result<()> {
        use Opcode::*;
        match opcode {
            Nop => {}
            InitStack => self.op_init_stack(pc)?,
            Call => {
                self.op_call()?;
                return Ok(());
            }
            Syscall => self.op_syscall()?,
            Ret => {
                self.op_ret()?;
                return Ok(());
            }
            RetV => {
                self.op_retv()?;
                return Ok(());
            }
            Jmp => {
                self.op_jmp()?;
                return Ok(());
            }
            Jz => {
                self.op_jz()?;
                return Ok(());
            }
            PushNil => self.call_stack.push(Value::Nil),
            PushTrue => self.call_stack.push(Value::Bool(true)),
            PushI8 => {
                let v = self.reader.read_i8()?;
                self.call_stack.push(Value::Int(v as i32));
            }
            PushI16 => {
                let v = self.reader.read_i16()?;
                self.call_stack.push(Value::Int(v as i32));
            }
            PushI32 => {
                let v = self.reader.read_i32()?;
                self.call_stack.push(Value::Int(v));
            }
            PushF32 => {
                let v = self.reader.read_f32()?;
                self.call_stack.push(Value::Float(v));
            }
            PushString => {
                let s = self.reader.read_string()?;
                self.call_stack.push(Value::string(s));
            }
            PushGlobal => self.op_push_global()?,
            PushLocal => self.op_push_local()?,
            PushGlobalTable => self.op_push_global_table()?,
            PushLocalTable => self.op_push_local_table()?,
            PushTop => {
                let v = self.call_stack.peek()?.clone();
                self.call_stack.push(v);
            }
            PushReturn => self.op_push_return()?,
            PopGlobal => self.op_pop_global()?,
            PopLocal => self.op_pop_local()?,
            PopGlobalTable => self.op_pop_global_table()?,
            PopLocalTable => self.op_pop_local_table()?,
            Neg => {
                let a = self.call_stack.pop()?;
                self.call_stack.push(vm_neg(&a)?);
            }
            Add => self.binop(vm_add)?,
            Sub => self.binop(vm_sub)?,
            Mul => self.binop(vm_mul)?,
            Div => self.binop(vm_div)?,
            Mod => self.binop(vm_mod)?,
            BitTest => self.op_bittest()?,
            And => {
                let a = self.call_stack.pop()?;
                let b = self.call_stack.pop()?;
                self.call_stack.push(vm_and(&a, &b));
            }
            Or => {
                let a = self.call_stack.pop()?;
                let b = self.call_stack.pop()?;
                self.call_stack.push(vm_or(&a, &b));
            }
            SetEq => {
                let top = self.call_stack.pop()?;
                let earlier = self.call_stack.pop()?;
                self.call_stack.push(Value::Bool(earlier == top));
            }
            SetNe => {
                let top = self.call_stack.pop()?;
                let earlier = self.call_stack.pop()?;
                self.call_stack.push(Value::Bool(earlier != top));
            }
            SetGt => self.op_compare(|o| o == std::cmp::Ordering::Greater)?,
            SetLe => self.op_compare(|o| o != std::cmp::Ordering::Greater)?,
            SetLt => self.op_compare(|o| o == std::cmp::Ordering::Less)?,
            SetGe => self.op_compare(|o| o != std::cmp::Ordering::Less)?,
        };
        self.pc = self.reader.position() as u32;
        Ok(())
    }

    /// Pops `top` then `earlier`, pushing `f(earlier, top)`. Shared by the
    /// four arithmetic opcodes; each `vm_*` function already takes its
    /// operands in `(earlier, top)` order.
    fn binop(&mut self, f: fn(&Value, &Value) -> Result<Value, VmError>) -> Result<()> {
        let top = self.call_stack.pop()?;
        let earlier = self.call_stack.pop()?;
        self.call_stack.push(f(&earlier, &top)?);
        Ok(())
    }

    fn op_compare(&mut self, matches_ordering: fn(std::cmp::Ordering) -> bool) -> Result<()> {
        let top = self.call_stack.pop()?;
        let earlier = self.call_stack.pop()?;
        let ordering = compare(&earlier, &top)?;
        self.call_stack.push(Value::Bool(matches_ordering(ordering)));
        Ok(())
    }

    fn op_init_stack(&mut self, pc: u32) -> Result<()> {
        let arg_count = self.reader.read_u8()?;
        let local_count = self.reader.read_u8()?;
        let return_address = self
            .pending_return_address
            .take()
            .ok_or(VmError::MisplacedInitStack { pc })?;
        trace!("init_stack: args={} locals={}", arg_count, local_count);
        self.call_stack.push_call(return_address, arg_count, local_count);
        Ok(())
    }

    fn op_call(&mut self) -> Result<()> {
        let addr = self.reader.read_u32()?;
        match self.reader.peek_u8_at(addr as usize) {
            Some(b) if b == Opcode::InitStack as u8 => {}
            _ => bail!(VmError::CallTargetNotInitStack { addr }),
        }
        let return_address = self.reader.position() as u32;
        trace!("call: target={:#x} return={:#x}", addr, return_address);
        self.pending_return_address = Some(return_address);
        self.pc = addr;
        Ok(())
    }

    fn op_syscall(&mut self) -> Result<()> {
        let id = self.reader.read_u16()?;
        let descriptor = self
            .metadata
            .syscalls
            .get(id as usize)
            .ok_or(VmError::NotImplementedSyscall(format!("id {id}")))?;
        let name = descriptor.name.clone();
        let arg_count = descriptor.arg_count;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(self.call_stack.pop()?);
        }
        args.reverse();
        debug!("syscall {} {:?}", name, args);
        self.return_value = Some(self.syscalls.invoke(&name, &args)?);
        Ok(())
    }

    fn op_ret(&mut self) -> Result<()> {
        self.return_value = None;
        let return_address = self.call_stack.pop_call()?;
        self.finish_return(return_address);
        Ok(())
    }

    fn op_retv(&mut self) -> Result<()> {
        self.return_value = Some(self.call_stack.pop()?);
        let return_address = self.call_stack.pop_call()?;
        self.finish_return(return_address);
        Ok(())
    }

    fn op_push_return(&mut self) -> Result<()> {
        let v = self
            .return_value
            .take()
            .ok_or_else(|| anyhow!("push_return with no return value present"))?;
        self.call_stack.push(v);
        Ok(())
    }

    fn finish_return(&mut self, return_address: u32) {
        if return_address == HALT_RETURN_ADDRESS {
            self.halted = true;
        } else {
            self.pc = return_address;
        }
    }

    fn op_jmp(&mut self) -> Result<()> {
        let addr = self.reader.read_u32()?;
        self.pc = addr;
        Ok(())
    }

    fn op_jz(&mut self) -> Result<()> {
        let addr = self.reader.read_u32()?;
        let next_pc = self.reader.position() as u32;
        let top = self.call_stack.pop()?;
        self.pc = if top.truthy() { next_pc } else { addr };
        Ok(())
    }

    fn op_push_global(&mut self) -> Result<()> {
        let id = self.reader.read_u16()?;
        let value = self
            .globals
            .get(id as usize)
            .and_then(|v| v.clone())
            .ok_or(VmError::UninitializedGlobal(id))?;
        self.call_stack.push(value);
        Ok(())
    }

    fn op_pop_global(&mut self) -> Result<()> {
        let id = self.reader.read_u16()?;
        let value = self.call_stack.pop()?;
        let idx = id as usize;
        if idx >= self.globals.len() {
            bail!("global index {} out of declared range {}", id, self.globals.len());
        }
        self.globals[idx] = Some(value);
        Ok(())
    }

    fn op_push_local(&mut self) -> Result<()> {
        let idx = self.reader.read_i8()?;
        let v = self.call_stack.get_local(idx as i32)?;
        self.call_stack.push(v);
        Ok(())
    }

    fn op_pop_local(&mut self) -> Result<()> {
        let idx = self.reader.read_i8()?;
        let v = self.call_stack.pop()?;
        self.call_stack.set_local(idx as i32, v)?;
        Ok(())
    }

    /// Keys must be `i32`; a non-int key is a `TypeError`, not a silent
    /// fallback. Only a missing key (the variable *is* a table but doesn't
    /// hold this key, or isn't a table at all yet) falls back to `Nil`.
    fn op_push_global_table(&mut self) -> Result<()> {
        let id = self.reader.read_u16()?;
        let key = self.call_stack.pop()?;
        let key = key
            .as_int()
            .ok_or_else(|| VmError::TypeError("table key must be an integer".into()))?;
        let result = match self.global(id) {
            Value::Table(t) => t.borrow().get(key),
            _ => {
                warn!("push_global_table: global {} is not a table", id);
                Value::Nil
            }
        };
        self.call_stack.push(result);
        Ok(())
    }

    fn op_pop_global_table(&mut self) -> Result<()> {
        let id = self.reader.read_u16()?;
        let value = self.call_stack.pop()?;
        let key = self.call_stack.pop()?;
        let key = key
            .as_int()
            .ok_or_else(|| VmError::TypeError("table key must be an integer".into()))?;
        let idx = id as usize;
        if idx >= self.globals.len() {
            bail!("global index {} out of declared range {}", id, self.globals.len());
        }
        let table = match &self.globals[idx] {
            Some(Value::Table(t)) => Rc::clone(t),
            _ => {
                let t: TableRef = Rc::new(RefCell::new(Table::new()));
                self.globals[idx] = Some(Value::Table(Rc::clone(&t)));
                t
            }
        };
        table.borrow_mut().set(key, value);
        Ok(())
    }

    fn op_push_local_table(&mut self) -> Result<()> {
        let idx = self.reader.read_i8()?;
        let key = self.call_stack.pop()?;
        let key = key
            .as_int()
            .ok_or_else(|| VmError::TypeError("table key must be an integer".into()))?;
        let local = self.call_stack.get_local(idx as i32)?;
        let result = match &local {
            Value::Table(t) => t.borrow().get(key),
            _ => {
                warn!("push_local_table: local {} is not a table", idx);
                Value::Nil
            }
        };
        self.call_stack.push(result);
        Ok(())
    }

    fn op_pop_local_table(&mut self) -> Result<()> {
        let idx = self.reader.read_i8()?;
        let value = self.call_stack.pop()?;
        let key = self.call_stack.pop()?;
        let key = key
            .as_int()
            .ok_or_else(|| VmError::TypeError("table key must be an integer".into()))?;
        let local = self.call_stack.get_local(idx as i32)?;
        let table = match local {
            Value::Table(t) => t,
            _ => {
                let t: TableRef = Rc::new(RefCell::new(Table::new()));
                self.call_stack.set_local(idx as i32, Value::Table(Rc::clone(&t)))?;
                t
            }
        };
        table.borrow_mut().set(key, value);
        Ok(())
    }

    /// Pops `bit` (top) then `val`; pushes `(val & (1 << bit)) != 0`. `bit`
    /// must be in `[0, 32)`.
    fn op_bittest(&mut self) -> Result<()> {
        let bit = self.call_stack.pop()?;
        let val = self.call_stack.pop()?;
        let (val, bit) = match (val.as_int(), bit.as_int()) {
            (Some(val), Some(bit)) => (val, bit),
            _ => return Err(VmError::TypeError("bittest requires two integers".into()).into()),
        };
        if !(0..32).contains(&bit) {
            return Err(VmError::TypeError(format!("bittest bit index {bit} out of range")).into());
        }
        self.call_stack.push(Value::Bool((val & (1 << bit)) != 0));
        Ok(())
    }
}
