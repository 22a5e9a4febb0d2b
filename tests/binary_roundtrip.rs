//! Binary round-trip tests: for a valid module, `write(read(m))` reproduces
//! the input byte for byte, custom sections keep their placement, and
//! feature-gated constructs fail to read at the right offsets.

use wasmith::binary;
use wasmith::error::ErrorKind;
use wasmith::features::{Feature, Features};

/// A small but representative module: types, import, function, table,
/// memory, global, export, element segment, code, and data.
fn reference_module_bytes() -> Vec<u8> {
    let source = r#"
        (module
            (import "env" "log" (func $log (param i32)))
            (table 2 2 funcref)
            (memory 1 2)
            (global $g (mut i32) (i32.const 7))
            (func $main (export "main") (result i32)
                (call $log (global.get $g))
                (i32.load offset=4 (i32.const 0)))
            (elem (i32.const 0) func $main $main)
            (data (i32.const 8) "hi"))
    "#;
    let module = wasmith::text::to_binary(source).expect("compile failed");
    binary::write(&module)
}

#[test]
fn write_read_write_is_identity() {
    let bytes = reference_module_bytes();
    let features = Features::mvp();

    let module = binary::read(&bytes, &features).expect("read failed");
    let rewritten = binary::write(&module);
    assert_eq!(rewritten, bytes);

    // And once more through the pipe for good measure.
    let again = binary::read(&rewritten, &features).expect("re-read failed");
    assert_eq!(binary::write(&again), bytes);
}

#[test]
fn read_preserves_structure() {
    let bytes = reference_module_bytes();
    let module = binary::read(&bytes, &Features::mvp()).expect("read failed");

    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.tables.len(), 1);
    assert_eq!(module.memories.len(), 1);
    assert_eq!(module.globals.len(), 1);
    assert_eq!(module.exports.len(), 1);
    assert_eq!(module.elements.len(), 1);
    assert_eq!(module.data.len(), 1);
    assert_eq!(module.exports[0].name, "main");
}

#[test]
fn custom_sections_round_trip_verbatim() {
    let source = r#"
        (module
            (@custom "x" (before func) "\00\01")
            (@custom "y" (after last) "\ff")
            (func))
    "#;
    let module = wasmith::text::to_binary(source).expect("compile failed");
    let bytes = binary::write(&module);

    let back = binary::read(&bytes, &Features::mvp()).expect("read failed");
    assert_eq!(back.customs.len(), 2);
    let x = back.customs.iter().find(|c| c.name == "x").unwrap();
    assert_eq!(x.data, vec![0x00, 0x01]);
    let y = back.customs.iter().find(|c| c.name == "y").unwrap();
    assert_eq!(y.data, vec![0xff]);

    // Byte-exact on the second trip.
    assert_eq!(binary::write(&back), bytes);
}

#[test]
fn custom_section_sits_before_function_section() {
    let source = r#"(module (@custom "x" (before func) "\00\01") (func))"#;
    let module = wasmith::text::to_binary(source).expect("compile failed");
    let bytes = binary::write(&module);

    // Walk the section ids: custom (0) must appear between type (1) and
    // function (3).
    let mut ids = Vec::new();
    let mut offset = 8;
    while offset < bytes.len() {
        ids.push(bytes[offset]);
        let len = bytes[offset + 1] as usize;
        offset += 2 + len;
    }
    assert_eq!(ids, vec![1, 0, 3, 10]);
}

#[test]
fn truncated_input_reports_unexpected_end() {
    let bytes = reference_module_bytes();
    let truncated = &bytes[..bytes.len() - 3];
    let errors = binary::read(truncated, &Features::mvp()).unwrap_err();
    assert!(!errors.is_empty());
}

#[test]
fn bad_magic_is_fatal() {
    let errors = binary::read(b"\0asn\x01\0\0\0", &Features::mvp()).unwrap_err();
    assert_eq!(errors[0].kind, ErrorKind::BadMagicOrVersion);
    assert_eq!(errors[0].offset, 0);
}

#[test]
fn bad_version_reported_at_offset_four() {
    let errors = binary::read(b"\0asm\x02\0\0\0", &Features::mvp()).unwrap_err();
    assert_eq!(errors[0].kind, ErrorKind::BadMagicOrVersion);
    assert_eq!(errors[0].offset, 4);
}

#[test]
fn sign_extension_gated_at_instruction_offset() {
    // (func (result i32) i32.const 1; i32.extend8_s)
    let bytes: Vec<u8> = vec![
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x0a, 0x07, 0x01, 0x05, 0x00, 0x41, 0x01, 0xc0, 0x0b, // code
    ];
    let errors = binary::read(&bytes, &Features::mvp()).unwrap_err();
    let gate = errors
        .iter()
        .find(|e| e.kind == ErrorKind::FeatureDisabled(Feature::SignExtension))
        .expect("expected a feature gate error");
    // The i32.extend8_s opcode byte sits at offset 26.
    assert_eq!(gate.offset, 26);

    let features = Features {
        sign_extension: true,
        ..Features::mvp()
    };
    binary::read(&bytes, &features).expect("read with feature enabled");
}

#[test]
fn feature_gated_modules_read_with_features_enabled() {
    let cases: &[(&str, Features)] = &[
        (
            "(module (func (result i32) (i32.trunc_sat_f32_s (f32.const 1))))",
            Features {
                saturating_float_to_int: true,
                ..Features::mvp()
            },
        ),
        (
            "(module (func (result i32 i32) (i32.const 1) (i32.const 2)))",
            Features {
                multi_value: true,
                ..Features::mvp()
            },
        ),
        (
            "(module (memory 1) (func (memory.fill (i32.const 0) (i32.const 0) (i32.const 0))))",
            Features::mvp().enable_bulk_memory(),
        ),
        (
            "(module (func (result v128) (v128.const i32x4 1 2 3 4)))",
            Features::mvp().enable_simd(),
        ),
    ];

    for (source, features) in cases {
        let module = wasmith::text::to_binary(source).expect("compile failed");
        let bytes = binary::write(&module);
        // With the feature off, reading must fail with FeatureDisabled.
        let errors = binary::read(&bytes, &Features::mvp()).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e.kind, ErrorKind::FeatureDisabled(_))),
            "expected FeatureDisabled for {source}"
        );
        // With it on, the module round-trips.
        let back = binary::read(&bytes, features).expect("read failed");
        assert_eq!(binary::write(&back), bytes);
    }
}

#[test]
fn unknown_opcode_stops_entity_not_module() {
    // A module whose single function body contains an undefined opcode.
    let bytes: Vec<u8> = vec![
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, //
        0x03, 0x02, 0x01, 0x00, //
        0x0a, 0x05, 0x01, 0x03, 0x00, 0xf5, 0x0b,
    ];
    let errors = binary::read(&bytes, &Features::mvp()).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e.kind, ErrorKind::UnknownOpcode(0xf5))));
}

#[test]
fn empty_module_round_trips() {
    let bytes = b"\0asm\x01\0\0\0".to_vec();
    let module = binary::read(&bytes, &Features::mvp()).expect("read failed");
    assert_eq!(binary::write(&module), bytes);
}
