//! End-to-end tests for the text pipeline: parse, resolve, convert, write,
//! and read back. Semantic content must survive the trip even though names
//! are erased.

use rstest::rstest;
use wasmith::binary::instruction::Instruction;
use wasmith::binary::types::{FunctionType, Limits, ValueType};
use wasmith::error::ErrorKind;
use wasmith::features::Features;
use wasmith::{binary, text, validate};

fn compile(source: &str) -> binary::Module {
    text::to_binary(source).expect("pipeline failed")
}

#[test]
fn text_to_binary_to_text_semantics() {
    let source = r#"
        (module
            (func $add (export "add") (param $a i32) (param $b i32) (result i32)
                (i32.add (local.get $a) (local.get $b)))
            (func (export "twice") (param i32) (result i32)
                (call $add (local.get 0) (local.get 0))))
    "#;
    let module = compile(source);
    let bytes = binary::write(&module);
    let back = binary::read(&bytes, &Features::mvp()).expect("read failed");

    // Names are gone, but the instruction sequences, types, and exports are
    // preserved exactly.
    assert_eq!(back.types, module.types);
    assert_eq!(back.functions, module.functions);
    assert_eq!(back.exports, module.exports);
    assert_eq!(back.code, module.code);
    assert_eq!(
        back.code[1].body,
        vec![
            Instruction::LocalGet { local_idx: 0 },
            Instruction::LocalGet { local_idx: 0 },
            Instruction::Call { func_idx: 0 },
        ]
    );
}

#[test]
fn implicit_type_dedup_across_functions() {
    let module = compile("(module (func (param i32)) (func (param i32)))");
    assert_eq!(module.types.len(), 1);
    assert_eq!(
        module.types[0],
        FunctionType::new(vec![ValueType::I32], vec![])
    );
    assert_eq!(module.functions, vec![0, 0]);
}

#[test]
fn explicit_duplicate_types_stay_distinct() {
    let module = compile(
        "(module
            (type (func (param i32)))
            (type (func (param i32)))
            (func (type 1)))",
    );
    assert_eq!(module.types.len(), 2);
    assert_eq!(module.functions, vec![1]);
}

#[test]
fn inline_element_expansion() {
    let module = compile(
        "(module
            (func $a) (func $b) (func $c)
            (table funcref (elem $a $b $c)))",
    );
    assert_eq!(module.tables[0].limits, Limits::new(3, Some(3)));
    assert_eq!(module.elements.len(), 1);
    match &module.elements[0].kind {
        binary::module::ElementKind::Active { table, offset } => {
            assert_eq!(*table, 0);
            assert_eq!(offset, &vec![Instruction::I32Const { value: 0 }]);
        }
        other => panic!("expected active segment, got {:?}", other),
    }
    assert_eq!(
        module.elements[0].items,
        binary::module::ElementItems::Functions(vec![0, 1, 2])
    );
}

#[test]
fn inline_memory_data_rounds_up_pages() {
    let module = compile(r#"(module (memory (data "hello world")))"#);
    assert_eq!(module.memories[0].limits, Limits::new(1, Some(1)));
    assert_eq!(module.data.len(), 1);
    assert_eq!(module.data[0].init, b"hello world".to_vec());
}

#[test]
fn block_label_mismatch_is_reported() {
    let err = text::parse("(module (func block $a nop end $b))").unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::LabelMismatch {
            expected: "a".to_string(),
            found: "b".to_string()
        }
    );
}

#[rstest]
#[case("(module (func (call $nope)))", "nope")]
#[case("(module (func (br $missing)))", "missing")]
#[case("(module (global i32 (global.get $g)))", "g")]
fn unknown_names_are_reported(#[case] source: &str, #[case] name: &str) {
    let mut module = text::parse(source).expect("parse failed");
    let errors = text::resolve(&mut module).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| e.kind == ErrorKind::UnknownName(name.to_string())));
}

#[rstest]
#[case("(module (func i32.const 1 drop))")]
#[case("(module (func (result i32) (i32.const 0) (if (result i32) (then (i32.const 1)) (else (i32.const 2)))))")]
#[case("(module (memory 1) (func (result i32) (i32.load (i32.const 0))))")]
#[case("(module (func (result f64) (f64.const 0x1.8p3)))")]
#[case("(module (func (result f32) (f32.const -nan:0x200000)))")]
#[case("(module (table 4 funcref) (func $f) (elem (i32.const 0) func $f))")]
fn compiles_and_round_trips(#[case] source: &str) {
    let module = compile(source);
    let bytes = binary::write(&module);
    let back = binary::read(&bytes, &Features::mvp()).expect("read failed");
    assert_eq!(binary::write(&back), bytes);
}

#[test]
fn hex_float_constant_bits() {
    let module = compile("(module (func (result f64) (f64.const 0x1.8p3)))");
    // 0x1.8p3 == 12.0
    assert_eq!(
        module.code[0].body,
        vec![Instruction::F64Const { value: 12.0 }]
    );
}

#[test]
fn nan_payload_survives_to_binary() {
    let module = compile("(module (func (result f32) (f32.const nan:0x200000)))");
    let Instruction::F32Const { value } = module.code[0].body[0] else {
        panic!("expected f32.const");
    };
    assert_eq!(value.to_bits(), 0x7fa0_0000);
}

#[test]
fn folded_and_linear_forms_agree() {
    let folded = compile("(module (func (result i32) (i32.add (i32.const 1) (i32.const 2))))");
    let linear = compile("(module (func (result i32) i32.const 1 i32.const 2 i32.add))");
    assert_eq!(folded.code, linear.code);
    assert_eq!(folded.types, linear.types);
}

#[test]
fn resolution_is_deterministic() {
    let source = "(module
        (type $t (func (param i32) (result i32)))
        (func $a (type $t) local.get 0)
        (func $b (param f64) (local $x i32)
            block $l (br $l) end)
        (table funcref (elem $a $b)))";
    let first = binary::write(&compile(source));
    let second = binary::write(&compile(source));
    assert_eq!(first, second);
}

#[test]
fn full_pipeline_validates() {
    let source = r#"
        (module
            (import "env" "print" (func $print (param i32)))
            (memory (export "mem") 1)
            (global $counter (mut i32) (i32.const 0))
            (func $bump (result i32)
                (global.set $counter (i32.add (global.get $counter) (i32.const 1)))
                (global.get $counter))
            (func (export "run")
                (call $print (call $bump)))
            (data (i32.const 0) "\01\02\03"))
    "#;
    let module = compile(source);
    validate::validate(&module, &Features::mvp()).expect("validation failed");

    let bytes = binary::write(&module);
    let back = binary::read(&bytes, &Features::mvp()).expect("read failed");
    validate::validate(&back, &Features::mvp()).expect("re-validation failed");
    assert_eq!(back, module);
}
