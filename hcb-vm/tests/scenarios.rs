//! Scenarios worked through end to end, mirroring the small hand-assembled
//! programs used to pin down the dispatcher's operand order and error
//! behavior during design.

use std::error::Error as _;

use hcb_nls::{Decoder, Encoding};
use hcb_vm::opcode::Opcode;
use hcb_vm::{ScriptContext, Value};

fn framed_string(s: &str) -> Vec<u8> {
    let mut out = vec![(s.len() + 1) as u8];
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}

/// Builds a full HCB image from a code region: `[metadata_offset:u32][code][metadata]`.
fn build_image(code: &[u8], entry_point: u32, global_count: u16) -> Vec<u8> {
    let mut metadata = Vec::new();
    metadata.extend_from_slice(&entry_point.to_le_bytes());
    metadata.extend_from_slice(&global_count.to_le_bytes());
    metadata.extend_from_slice(&0u16.to_le_bytes());
    metadata.extend_from_slice(&0u16.to_le_bytes());
    metadata.extend_from_slice(&framed_string("scenario"));
    metadata.push(0);

    let metadata_offset = 4 + code.len() as u32;
    let mut image = Vec::new();
    image.extend_from_slice(&metadata_offset.to_le_bytes());
    image.extend_from_slice(code);
    image.extend_from_slice(&metadata);
    image
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn run(code: &[u8], global_count: u16) -> ScriptContext {
    init_logging();
    let image = build_image(code, 4, global_count);
    let mut ctx = ScriptContext::new(image, Decoder::new(Encoding::Utf8)).unwrap();
    ctx.run().unwrap();
    ctx
}

fn push_i32(code: &mut Vec<u8>, v: i32) {
    code.push(Opcode::PushI32 as u8);
    code.extend_from_slice(&v.to_le_bytes());
}

#[test]
fn s1_add_returns_seven() {
    // InitStack 0 0; PushI32 3; PushI32 4; Add; RetV
    let mut code = vec![Opcode::InitStack as u8, 0, 0];
    push_i32(&mut code, 3);
    push_i32(&mut code, 4);
    code.push(Opcode::Add as u8);
    code.push(Opcode::RetV as u8);

    let ctx = run(&code, 0);
    assert_eq!(ctx.return_value(), Value::Int(7));
}

#[test]
fn s2_string_concat_is_b_then_a() {
    // InitStack 0 0; PushString "ab"; PushString "cd"; Add; RetV
    let mut code = vec![Opcode::InitStack as u8, 0, 0];
    code.push(Opcode::PushString as u8);
    code.extend_from_slice(&framed_string("ab"));
    code.push(Opcode::PushString as u8);
    code.extend_from_slice(&framed_string("cd"));
    code.push(Opcode::Add as u8);
    code.push(Opcode::RetV as u8);

    let ctx = run(&code, 0);
    assert_eq!(ctx.return_value().to_string(), "abcd");
}

#[test]
fn s3_divide_by_zero_reports_pc_of_div() {
    // InitStack 0 0; PushI32 5; PushI32 0; Div
    let mut code = vec![Opcode::InitStack as u8, 0, 0];
    push_i32(&mut code, 5);
    push_i32(&mut code, 0);
    let div_pc = code.len() as u32;
    code.push(Opcode::Div as u8);

    init_logging();
    let image = build_image(&code, 4, 0);
    let mut ctx = ScriptContext::new(image, Decoder::new(Encoding::Utf8)).unwrap();
    let err = ctx.run().unwrap_err();
    assert_eq!(err.pc, div_pc);
    assert!(err.message.contains("division by zero"));
    let source = err.source().expect("DivideByZero should be preserved as the inner cause");
    assert!(source.to_string().contains("division by zero"));
}

#[test]
fn s4_local_round_trips_through_pop_and_push() {
    // InitStack 0 1; PushI32 10; PopLocal 0; PushLocal 0; PushI32 1; Add; RetV
    let mut code = vec![Opcode::InitStack as u8, 0, 1];
    push_i32(&mut code, 10);
    code.push(Opcode::PopLocal as u8);
    code.push(0);
    code.push(Opcode::PushLocal as u8);
    code.push(0);
    push_i32(&mut code, 1);
    code.push(Opcode::Add as u8);
    code.push(Opcode::RetV as u8);

    let ctx = run(&code, 0);
    assert_eq!(ctx.return_value(), Value::Int(11));
}

#[test]
fn s5_local_table_set_then_get() {
    // InitStack 0 1; PushI32 7; PushI32 99; PopLocalTable 0; PushI32 7; PushLocalTable 0; RetV
    let mut code = vec![Opcode::InitStack as u8, 0, 1];
    push_i32(&mut code, 7);
    push_i32(&mut code, 99);
    code.push(Opcode::PopLocalTable as u8);
    code.push(0);
    push_i32(&mut code, 7);
    code.push(Opcode::PushLocalTable as u8);
    code.push(0);
    code.push(Opcode::RetV as u8);

    let ctx = run(&code, 0);
    assert_eq!(ctx.return_value(), Value::Int(99));
}

#[test]
fn s5_local_table_missing_key_is_nil() {
    let mut code = vec![Opcode::InitStack as u8, 0, 1];
    push_i32(&mut code, 7);
    push_i32(&mut code, 99);
    code.push(Opcode::PopLocalTable as u8);
    code.push(0);
    push_i32(&mut code, 8); // unrelated key
    code.push(Opcode::PushLocalTable as u8);
    code.push(0);
    code.push(Opcode::RetV as u8);

    let ctx = run(&code, 0);
    assert_eq!(ctx.return_value(), Value::Nil);
}

#[test]
fn s6_call_then_push_return_propagates_callee_value() {
    // entry: InitStack 0 0; Call ADDR; PushReturn; RetV
    // ADDR:  InitStack 0 0; PushI32 42; RetV
    let mut code = vec![Opcode::InitStack as u8, 0, 0];
    let call_addr_at = code.len() + 1;
    code.push(Opcode::Call as u8);
    code.extend_from_slice(&0u32.to_le_bytes());
    code.push(Opcode::PushReturn as u8);
    code.push(Opcode::RetV as u8);

    let func_addr = code.len() as u32;
    code[call_addr_at..call_addr_at + 4].copy_from_slice(&func_addr.to_le_bytes());
    code.push(Opcode::InitStack as u8);
    code.push(0);
    code.push(0);
    push_i32(&mut code, 42);
    code.push(Opcode::RetV as u8);

    let ctx = run(&code, 0);
    assert_eq!(ctx.return_value(), Value::Int(42));
    assert!(ctx.is_halted());
}
