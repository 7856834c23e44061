//! The tagged value universe that circulates on the operand stack, in
//! globals, and inside tables.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::VmError;

/// A mutable, ordered-by-insertion mapping from `i32` keys to [`Value`].
/// Backed by a `Vec` rather than a hash map: scripts keep tables small and
/// insertion order is part of the observable contract, which a plain vector
/// gives for free without pulling in an ordered-map dependency the rest of
/// the stack doesn't otherwise need.
#[derive(Debug, Default, Clone)]
pub struct Table {
    entries: Vec<(i32, Value)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: i32) -> Value {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, key: i32, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to a [`Table`]; cloning a `Value::Table` aliases the same
/// underlying table, matching how a table reference behaves once pushed
/// through globals/locals/the operand stack.
pub type TableRef = Rc<RefCell<Table>>;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(Rc<str>),
    Table(TableRef),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn new_table() -> Self {
        Value::Table(Rc::new(RefCell::new(Table::new())))
    }

    /// Truthiness per the branch-condition rule: Nil is false, Bool is its
    /// own value, anything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Table(t) => write!(f, "table({})", t.borrow().len()),
        }
    }
}

/// Tag-and-value equality: no numeric coercion between int and float, and
/// all Nils compare equal to each other regardless of provenance.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Default comparator used by `<`, `<=`, `>`, `>=`: only two ints, two
/// floats, or two strings are comparable. Anything else is a `TypeError`.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering, VmError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).ok_or_else(|| {
            VmError::TypeError(format!("incomparable floats {x} and {y}"))
        }),
        (Value::Str(x), Value::Str(y)) => Ok(x.as_ref().cmp(y.as_ref())),
        _ => Err(VmError::TypeError(format!(
            "cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn type_error(op: &str, a: &Value, b: &Value) -> VmError {
    VmError::TypeError(format!(
        "cannot apply {op} to {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

/// `b + a`: int+int -> int, float/int mix -> float, string+string ->
/// concatenation. The dispatcher passes `(b, a)` in that order (`b` is the
/// value pushed earlier / second popped, `a` is the top / first popped).
pub fn vm_add(b: &Value, a: &Value) -> Result<Value, VmError> {
    match (b, a) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f32 + y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + *y as f32)),
        (Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::string(s))
        }
        _ => Err(type_error("add", b, a)),
    }
}

macro_rules! numeric_binop {
    ($name:ident, $op:tt, $int_op:expr) => {
        pub fn $name(b: &Value, a: &Value) -> Result<Value, VmError> {
            match (b, a) {
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int($int_op(*x, *y))),
                (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x $op y)),
                (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f32 $op y)),
                (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x $op *y as f32)),
                _ => Err(type_error(stringify!($name), b, a)),
            }
        }
    };
}

numeric_binop!(vm_sub, -, i32::wrapping_sub);
numeric_binop!(vm_mul, *, i32::wrapping_mul);

/// Division: fails `DivideByZero` when the right operand (`a`, the value
/// that was on top of the stack) is zero.
pub fn vm_div(b: &Value, a: &Value) -> Result<Value, VmError> {
    match (b, a) {
        (Value::Int(_), Value::Int(0)) => Err(VmError::DivideByZero),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_div(*y))),
        (Value::Float(_), Value::Float(y)) if *y == 0.0 => Err(VmError::DivideByZero),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x / y)),
        (Value::Int(_), Value::Float(y)) if *y == 0.0 => Err(VmError::DivideByZero),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f32 / y)),
        (Value::Float(_), Value::Int(0)) => Err(VmError::DivideByZero),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x / *y as f32)),
        _ => Err(type_error("div", b, a)),
    }
}

/// Mod is integer-only.
pub fn vm_mod(b: &Value, a: &Value) -> Result<Value, VmError> {
    match (b, a) {
        (Value::Int(_), Value::Int(0)) => Err(VmError::DivideByZero),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_rem(*y))),
        _ => Err(type_error("mod", b, a)),
    }
}

pub fn vm_neg(a: &Value) -> Result<Value, VmError> {
    match a {
        Value::Int(x) => Ok(Value::Int(x.wrapping_neg())),
        Value::Float(x) => Ok(Value::Float(-x)),
        _ => Err(VmError::TypeError(format!("cannot negate {}", a.type_name()))),
    }
}

/// `And(a,b) = (a == b) ∧ (a ≠ Nil)`. Deliberately not conventional
/// short-circuit logic; see the design notes this resolves.
pub fn vm_and(a: &Value, b: &Value) -> Value {
    Value::Bool(a == b && !a.is_nil())
}

/// `Or(a,b) = (a ≠ Nil) ∨ (b ≠ Nil)`.
pub fn vm_or(a: &Value, b: &Value) -> Value {
    Value::Bool(!a.is_nil() || !b.is_nil())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nils_compare_equal() {
        assert_eq!(Value::Nil, Value::Nil);
    }

    #[test]
    fn int_and_float_are_never_equal() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn int_and_bool_are_never_equal() {
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn add_strings_concatenates_in_b_a_order() {
        let b = Value::string("ab");
        let a = Value::string("cd");
        let result = vm_add(&b, &a).unwrap();
        assert_eq!(result.to_string(), "abcd");
    }

    #[test]
    fn add_mixed_int_float_widens_to_float() {
        let r = vm_add(&Value::Int(3), &Value::Float(4.5)).unwrap();
        match r {
            Value::Float(x) => assert_eq!(x, 7.5),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn div_by_zero_int_fails() {
        assert!(matches!(vm_div(&Value::Int(5), &Value::Int(0)), Err(VmError::DivideByZero)));
    }

    #[test]
    fn and_is_equality_and_not_nil() {
        assert_eq!(vm_and(&Value::Int(3), &Value::Int(3)), Value::Bool(true));
        assert_eq!(vm_and(&Value::Int(3), &Value::Int(4)), Value::Bool(false));
        assert_eq!(vm_and(&Value::Nil, &Value::Nil), Value::Bool(false));
    }

    #[test]
    fn or_is_either_not_nil() {
        assert_eq!(vm_or(&Value::Nil, &Value::Int(1)), Value::Bool(true));
        assert_eq!(vm_or(&Value::Nil, &Value::Nil), Value::Bool(false));
    }

    #[test]
    fn table_insertion_order_preserved_on_iteration() {
        let mut t = Table::new();
        t.set(5, Value::Int(1));
        t.set(1, Value::Int(2));
        t.set(5, Value::Int(3));
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(5), Value::Int(3));
        assert_eq!(t.get(1), Value::Int(2));
        assert_eq!(t.get(8), Value::Nil);
    }
}
