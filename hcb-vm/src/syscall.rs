//! Host-callable syscall registration and dispatch.
//!
//! Grounded on the reference engine's `VmSyscall` trait (`do_syscall(name,
//! args) -> Result<Variant>`), generalized into a registry so a host can mix
//! direct closures with a reflective `syscall_host!` block instead of one
//! big match expression.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{ScriptRuntimeException, SyscallError, VmError};
use crate::value::Value;

/// `Nil` on either side of the boundary is represented as `None`: a target
/// accepts its native optional types instead of matching on `Value::Nil`,
/// and a target returning `None` surfaces as `Nil` back to the VM.
pub type SyscallFn = Box<dyn Fn(&[Option<Value>]) -> anyhow::Result<Option<Value>>>;

/// Describes one method a [`SyscallHost`] exposes, produced by the
/// `syscall_host!` macro.
pub struct SyscallMethodDescriptor {
    pub name: &'static str,
    pub call: SyscallFn,
}

/// A type that can expose a batch of syscalls, bound to a live instance, to
/// a [`SyscallRegistry`] in one shot. Implemented by invoking
/// [`syscall_host!`] inside an `impl` block, rather than by a derive: the
/// reference engine keeps its own attribute macros small and declarative,
/// and a hand-rolled proc-macro crate here would be unverifiable without
/// running the toolchain.
///
/// `Clone + 'static` lets the macro capture an owned handle per registered
/// method instead of threading a borrow through the registry's lifetime;
/// hosts are expected to be cheap to clone (e.g. an `Rc`-wrapped handle).
pub trait SyscallHost: Clone + 'static {
    fn syscall_methods(&self) -> Vec<SyscallMethodDescriptor>;
}

/// Declares a batch of syscall bindings for `$host`. Each arm names the
/// syscall as the engine sees it and the inherent method that implements
/// it; `syscall_methods` is called on a live `&self`, and each generated
/// closure clones that instance so it can be called later, independent of
/// the registry's own lifetime.
///
/// ```ignore
/// syscall_host!(GameHost {
///     "wait" => wait,
///     "fade_in" => fade_in,
/// });
/// ```
#[macro_export]
macro_rules! syscall_host {
    ($host:ty { $($name:literal => $method:ident),* $(,)? }) => {
        impl $crate::syscall::SyscallHost for $host {
            fn syscall_methods(&self) -> Vec<$crate::syscall::SyscallMethodDescriptor> {
                vec![
                    $(
                        {
                            let host = ::std::clone::Clone::clone(self);
                            $crate::syscall::SyscallMethodDescriptor {
                                name: $name,
                                call: Box::new(move |args: &[::std::option::Option<$crate::value::Value>]| {
                                    host.$method(args)
                                }),
                            }
                        }
                    ),*
                ]
            }
        }
    };
}

/// Maps syscall names to callables, tracking which reflective host type (if
/// any) claimed each name so a host re-registering its own methods is
/// idempotent while a genuine name collision from a different registrant
/// still fails.
#[derive(Default)]
pub struct SyscallRegistry {
    table: HashMap<String, SyscallFn>,
    /// Present only for names claimed via [`Self::register_reflective`];
    /// absent (and therefore never idempotent) for direct registrations.
    sources: HashMap<String, TypeId>,
}

impl SyscallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct registration: binds `name` to an arbitrary closure.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Option<Value>]) -> anyhow::Result<Option<Value>> + 'static,
    ) -> Result<(), SyscallError> {
        let name = name.into();
        if self.table.contains_key(&name) {
            return Err(SyscallError::DuplicateName(name));
        }
        self.table.insert(name, Box::new(f));
        Ok(())
    }

    /// Reflective registration: absorbs every method `host` declared via
    /// [`syscall_host!`]. Registering the same host type under the same
    /// name again is a no-op (the existing binding is kept); a different
    /// registrant claiming a name already bound is a [`SyscallError::DuplicateName`].
    pub fn register_reflective<H: SyscallHost>(&mut self, host: &H) -> Result<(), SyscallError> {
        let type_id = TypeId::of::<H>();
        for descriptor in host.syscall_methods() {
            match self.sources.get(descriptor.name) {
                Some(existing) if *existing == type_id => continue,
                Some(_) => return Err(SyscallError::DuplicateName(descriptor.name.to_string())),
                None => {
                    if self.table.contains_key(descriptor.name) {
                        return Err(SyscallError::DuplicateName(descriptor.name.to_string()));
                    }
                    self.sources.insert(descriptor.name.to_string(), type_id);
                    self.table.insert(descriptor.name.to_string(), descriptor.call);
                }
            }
        }
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Invokes `name` with `args`, raising [`VmError::NotImplementedSyscall`]
    /// if nothing is bound to it. `Nil` arguments are delivered to the
    /// target as `None`; a `None` return surfaces to the caller as `Nil`.
    /// The dispatcher is expected to wrap the result into a
    /// [`ScriptRuntimeException`] itself, since only it knows the current pc.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, VmError> {
        match self.table.get(name) {
            Some(f) => {
                let opt_args: Vec<Option<Value>> = args
                    .iter()
                    .cloned()
                    .map(|v| if v.is_nil() { None } else { Some(v) })
                    .collect();
                let result = f(&opt_args).map_err(|e| VmError::TypeError(e.to_string()))?;
                Ok(result.unwrap_or(Value::Nil))
            }
            None => Err(VmError::NotImplementedSyscall(name.to_string())),
        }
    }

    pub(crate) fn invoke_at(
        &self,
        pc: u32,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ScriptRuntimeException> {
        self.invoke(name, args)
            .map_err(|e| crate::error::wrap(pc, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn direct_registration_round_trips() {
        let mut reg = SyscallRegistry::new();
        reg.register("double", |args| {
            let n = args[0].clone().and_then(|v| v.as_int()).unwrap_or(0);
            Ok(Some(Value::Int(n * 2)))
        })
        .unwrap();
        let result = reg.invoke("double", &[Value::Int(21)]).unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn nil_argument_is_delivered_as_absent_and_absent_return_is_nil() {
        let mut reg = SyscallRegistry::new();
        reg.register("identity_or_absent", |args| {
            assert!(args[0].is_none());
            Ok(None)
        })
        .unwrap();
        let result = reg.invoke("identity_or_absent", &[Value::Nil]).unwrap();
        assert_eq!(result, Value::Nil);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = SyscallRegistry::new();
        reg.register("noop", |_| Ok(None)).unwrap();
        assert!(matches!(
            reg.register("noop", |_| Ok(None)),
            Err(SyscallError::DuplicateName(_))
        ));
    }

    #[test]
    fn unknown_syscall_reports_not_implemented() {
        let reg = SyscallRegistry::new();
        assert!(matches!(
            reg.invoke("ghost", &[]),
            Err(VmError::NotImplementedSyscall(_))
        ));
    }

    #[derive(Clone)]
    struct DemoHost;
    impl DemoHost {
        fn ping(&self, _args: &[Option<Value>]) -> anyhow::Result<Option<Value>> {
            Ok(Some(Value::Bool(true)))
        }
    }
    syscall_host!(DemoHost { "ping" => ping });

    #[derive(Clone)]
    struct OtherHost;
    impl OtherHost {
        fn ping(&self, _args: &[Option<Value>]) -> anyhow::Result<Option<Value>> {
            Ok(Some(Value::Bool(false)))
        }
    }
    syscall_host!(OtherHost { "ping" => ping });

    #[test]
    fn reflective_registration_round_trips() {
        let mut reg = SyscallRegistry::new();
        reg.register_reflective(&DemoHost).unwrap();
        assert_eq!(reg.invoke("ping", &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn reflective_registration_is_idempotent_for_same_host_type() {
        let mut reg = SyscallRegistry::new();
        reg.register_reflective(&DemoHost).unwrap();
        // Same host type registering the same (name, method) pair again is
        // a silent no-op, not a DuplicateName error.
        reg.register_reflective(&DemoHost).unwrap();
        assert_eq!(reg.invoke("ping", &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn duplicate_from_different_host_type_is_rejected_and_keeps_original() {
        let mut reg = SyscallRegistry::new();
        reg.register_reflective(&DemoHost).unwrap();
        assert!(matches!(
            reg.register_reflective(&OtherHost),
            Err(SyscallError::DuplicateName(_))
        ));
        // The rejected registrant must not have clobbered the original binding.
        assert_eq!(reg.invoke("ping", &[]).unwrap(), Value::Bool(true));
    }
}
