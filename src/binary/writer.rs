//! Binary module writer.
//!
//! The conceptual inverse of [`super::reader`]. Section bodies are buffered,
//! then emitted with their id and length prefix, in canonical order. Custom
//! sections are spliced into the gaps between standard sections according to
//! their placement hints; ties at the same gap keep source order.

use super::encoding;
use super::instruction::Instruction;
use super::module::{
    CustomAnchor, CustomSection, DataKind, ElementItems, ElementKind, ExternalKind, ImportDesc,
    Module, PlaceOrder,
};
use super::types::{Limits, RefType};
use crate::leb128;

// Gap g precedes the standard section with rank g; the final gap follows the
// last section. Ranks match the canonical emit order below.
const RANK_TYPE: usize = 0;
const RANK_IMPORT: usize = 1;
const RANK_FUNCTION: usize = 2;
const RANK_TABLE: usize = 3;
const RANK_MEMORY: usize = 4;
const RANK_TAG: usize = 5;
const RANK_GLOBAL: usize = 6;
const RANK_EXPORT: usize = 7;
const RANK_START: usize = 8;
const RANK_ELEMENT: usize = 9;
const RANK_DATA_COUNT: usize = 10;
const RANK_CODE: usize = 11;
const RANK_DATA: usize = 12;
const NUM_RANKS: usize = 13;

fn anchor_rank(anchor: CustomAnchor) -> usize {
    match anchor {
        CustomAnchor::First => 0,
        CustomAnchor::Type => RANK_TYPE,
        CustomAnchor::Import => RANK_IMPORT,
        CustomAnchor::Func => RANK_FUNCTION,
        CustomAnchor::Table => RANK_TABLE,
        CustomAnchor::Memory => RANK_MEMORY,
        CustomAnchor::Tag => RANK_TAG,
        CustomAnchor::Global => RANK_GLOBAL,
        CustomAnchor::Export => RANK_EXPORT,
        CustomAnchor::Start => RANK_START,
        CustomAnchor::Elem => RANK_ELEMENT,
        CustomAnchor::DataCount => RANK_DATA_COUNT,
        CustomAnchor::Code => RANK_CODE,
        CustomAnchor::Data => RANK_DATA,
        CustomAnchor::Last => NUM_RANKS,
    }
}

/// The gap index a custom section is emitted into.
fn gap_for(custom: &CustomSection) -> usize {
    match custom.place.anchor {
        CustomAnchor::First => 0,
        CustomAnchor::Last => NUM_RANKS,
        anchor => match custom.place.order {
            PlaceOrder::Before => anchor_rank(anchor),
            PlaceOrder::After => anchor_rank(anchor) + 1,
        },
    }
}

/// Encodes a module to WebAssembly binary format.
pub fn write(module: &Module) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&encoding::MAGIC);
    buf.extend_from_slice(&encoding::VERSION);

    for rank in 0..=NUM_RANKS {
        for custom in &module.customs {
            if gap_for(custom) == rank {
                encode_custom_section(&mut buf, custom);
            }
        }
        match rank {
            RANK_TYPE => encode_type_section(&mut buf, module),
            RANK_IMPORT => encode_import_section(&mut buf, module),
            RANK_FUNCTION => encode_function_section(&mut buf, module),
            RANK_TABLE => encode_table_section(&mut buf, module),
            RANK_MEMORY => encode_memory_section(&mut buf, module),
            RANK_TAG => encode_tag_section(&mut buf, module),
            RANK_GLOBAL => encode_global_section(&mut buf, module),
            RANK_EXPORT => encode_export_section(&mut buf, module),
            RANK_START => encode_start_section(&mut buf, module),
            RANK_ELEMENT => encode_element_section(&mut buf, module),
            RANK_DATA_COUNT => encode_data_count_section(&mut buf, module),
            RANK_CODE => encode_code_section(&mut buf, module),
            RANK_DATA => encode_data_section(&mut buf, module),
            _ => {}
        }
    }

    buf
}

// ===========================================================================
// Section encoders, in canonical order
// ===========================================================================

/// Wraps section contents with a section id and length prefix.
fn emit_section(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    buf.push(id);
    leb128::write_u32(buf, contents.len() as u32);
    buf.extend_from_slice(contents);
}

fn emit_name(buf: &mut Vec<u8>, name: &str) {
    leb128::write_u32(buf, name.len() as u32);
    buf.extend_from_slice(name.as_bytes());
}

fn emit_limits(buf: &mut Vec<u8>, limits: &Limits) {
    let flags = match (limits.max, limits.shared) {
        (None, _) => encoding::LIMITS_NO_MAX,
        (Some(_), false) => encoding::LIMITS_HAS_MAX,
        (Some(_), true) => encoding::LIMITS_HAS_MAX_SHARED,
    };
    buf.push(flags);
    leb128::write_u32(buf, limits.min);
    if let Some(max) = limits.max {
        leb128::write_u32(buf, max);
    }
}

/// Encodes an instruction sequence followed by the `end` marker.
fn emit_expression(buf: &mut Vec<u8>, instrs: &[Instruction]) {
    for instr in instrs {
        instr.encode(buf);
    }
    buf.push(encoding::OP_END);
}

fn external_kind_byte(kind: ExternalKind) -> u8 {
    match kind {
        ExternalKind::Func => encoding::DESC_FUNC,
        ExternalKind::Table => encoding::DESC_TABLE,
        ExternalKind::Memory => encoding::DESC_MEMORY,
        ExternalKind::Global => encoding::DESC_GLOBAL,
        ExternalKind::Tag => encoding::DESC_TAG,
    }
}

fn encode_type_section(buf: &mut Vec<u8>, module: &Module) {
    if module.types.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.types.len() as u32);
    for ty in &module.types {
        contents.push(encoding::TYPE_FUNC);
        leb128::write_u32(&mut contents, ty.params.len() as u32);
        for vt in &ty.params {
            contents.push(vt.to_byte());
        }
        leb128::write_u32(&mut contents, ty.results.len() as u32);
        for vt in &ty.results {
            contents.push(vt.to_byte());
        }
    }
    emit_section(buf, encoding::SECTION_TYPE, &contents);
}

fn encode_import_section(buf: &mut Vec<u8>, module: &Module) {
    if module.imports.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.imports.len() as u32);
    for import in &module.imports {
        emit_name(&mut contents, &import.module);
        emit_name(&mut contents, &import.name);
        match &import.desc {
            ImportDesc::Func(type_idx) => {
                contents.push(encoding::DESC_FUNC);
                leb128::write_u32(&mut contents, *type_idx);
            }
            ImportDesc::Table(table) => {
                contents.push(encoding::DESC_TABLE);
                contents.push(table.ref_type.to_byte());
                emit_limits(&mut contents, &table.limits);
            }
            ImportDesc::Memory(memory) => {
                contents.push(encoding::DESC_MEMORY);
                emit_limits(&mut contents, &memory.limits);
            }
            ImportDesc::Global(global) => {
                contents.push(encoding::DESC_GLOBAL);
                contents.push(global.value_type.to_byte());
                contents.push(if global.mutable {
                    encoding::MUT_VAR
                } else {
                    encoding::MUT_CONST
                });
            }
            ImportDesc::Tag(tag) => {
                contents.push(encoding::DESC_TAG);
                contents.push(encoding::TAG_ATTRIBUTE_EXCEPTION);
                leb128::write_u32(&mut contents, tag.type_idx);
            }
        }
    }
    emit_section(buf, encoding::SECTION_IMPORT, &contents);
}

fn encode_function_section(buf: &mut Vec<u8>, module: &Module) {
    if module.functions.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.functions.len() as u32);
    for type_idx in &module.functions {
        leb128::write_u32(&mut contents, *type_idx);
    }
    emit_section(buf, encoding::SECTION_FUNCTION, &contents);
}

fn encode_table_section(buf: &mut Vec<u8>, module: &Module) {
    if module.tables.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.tables.len() as u32);
    for table in &module.tables {
        contents.push(table.ref_type.to_byte());
        emit_limits(&mut contents, &table.limits);
    }
    emit_section(buf, encoding::SECTION_TABLE, &contents);
}

fn encode_memory_section(buf: &mut Vec<u8>, module: &Module) {
    if module.memories.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.memories.len() as u32);
    for memory in &module.memories {
        emit_limits(&mut contents, &memory.limits);
    }
    emit_section(buf, encoding::SECTION_MEMORY, &contents);
}

fn encode_tag_section(buf: &mut Vec<u8>, module: &Module) {
    if module.tags.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.tags.len() as u32);
    for tag in &module.tags {
        contents.push(encoding::TAG_ATTRIBUTE_EXCEPTION);
        leb128::write_u32(&mut contents, tag.type_idx);
    }
    emit_section(buf, encoding::SECTION_TAG, &contents);
}

fn encode_global_section(buf: &mut Vec<u8>, module: &Module) {
    if module.globals.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.globals.len() as u32);
    for global in &module.globals {
        contents.push(global.ty.value_type.to_byte());
        contents.push(if global.ty.mutable {
            encoding::MUT_VAR
        } else {
            encoding::MUT_CONST
        });
        emit_expression(&mut contents, &global.init);
    }
    emit_section(buf, encoding::SECTION_GLOBAL, &contents);
}

fn encode_export_section(buf: &mut Vec<u8>, module: &Module) {
    if module.exports.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.exports.len() as u32);
    for export in &module.exports {
        emit_name(&mut contents, &export.name);
        contents.push(external_kind_byte(export.kind));
        leb128::write_u32(&mut contents, export.index);
    }
    emit_section(buf, encoding::SECTION_EXPORT, &contents);
}

fn encode_start_section(buf: &mut Vec<u8>, module: &Module) {
    let Some(start) = module.start else { return };
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, start);
    emit_section(buf, encoding::SECTION_START, &contents);
}

fn encode_element_section(buf: &mut Vec<u8>, module: &Module) {
    if module.elements.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.elements.len() as u32);

    for elem in &module.elements {
        let expressions = matches!(elem.items, ElementItems::Expressions(_));
        let flags = match (&elem.kind, expressions) {
            (ElementKind::Active { table: 0, .. }, false) if elem.ref_type == RefType::Func => {
                encoding::ELEM_ACTIVE_FUNCS
            }
            (ElementKind::Active { .. }, false) => encoding::ELEM_ACTIVE_TABLE_FUNCS,
            (ElementKind::Passive, false) => encoding::ELEM_PASSIVE_FUNCS,
            (ElementKind::Declared, false) => encoding::ELEM_DECLARED_FUNCS,
            (ElementKind::Active { table: 0, .. }, true) if elem.ref_type == RefType::Func => {
                encoding::ELEM_ACTIVE_EXPRS
            }
            (ElementKind::Active { .. }, true) => encoding::ELEM_ACTIVE_TABLE_EXPRS,
            (ElementKind::Passive, true) => encoding::ELEM_PASSIVE_EXPRS,
            (ElementKind::Declared, true) => encoding::ELEM_DECLARED_EXPRS,
        };
        leb128::write_u32(&mut contents, flags);

        if let ElementKind::Active { table, offset } = &elem.kind {
            if flags == encoding::ELEM_ACTIVE_TABLE_FUNCS || flags == encoding::ELEM_ACTIVE_TABLE_EXPRS
            {
                leb128::write_u32(&mut contents, *table);
            }
            emit_expression(&mut contents, offset);
        }

        match flags {
            encoding::ELEM_PASSIVE_FUNCS
            | encoding::ELEM_ACTIVE_TABLE_FUNCS
            | encoding::ELEM_DECLARED_FUNCS => contents.push(encoding::ELEMKIND_FUNCREF),
            encoding::ELEM_PASSIVE_EXPRS
            | encoding::ELEM_ACTIVE_TABLE_EXPRS
            | encoding::ELEM_DECLARED_EXPRS => contents.push(elem.ref_type.to_byte()),
            _ => {}
        }

        match &elem.items {
            ElementItems::Functions(funcs) => {
                leb128::write_u32(&mut contents, funcs.len() as u32);
                for func_idx in funcs {
                    leb128::write_u32(&mut contents, *func_idx);
                }
            }
            ElementItems::Expressions(exprs) => {
                leb128::write_u32(&mut contents, exprs.len() as u32);
                for expr in exprs {
                    emit_expression(&mut contents, expr);
                }
            }
        }
    }
    emit_section(buf, encoding::SECTION_ELEMENT, &contents);
}

fn encode_data_count_section(buf: &mut Vec<u8>, module: &Module) {
    let Some(count) = module.data_count else { return };
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, count);
    emit_section(buf, encoding::SECTION_DATA_COUNT, &contents);
}

fn encode_code_section(buf: &mut Vec<u8>, module: &Module) {
    if module.code.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.code.len() as u32);
    for body in &module.code {
        let mut func_buf = Vec::new();
        leb128::write_u32(&mut func_buf, body.locals.len() as u32);
        for (count, vt) in &body.locals {
            leb128::write_u32(&mut func_buf, *count);
            func_buf.push(vt.to_byte());
        }
        emit_expression(&mut func_buf, &body.body);

        leb128::write_u32(&mut contents, func_buf.len() as u32);
        contents.extend_from_slice(&func_buf);
    }
    emit_section(buf, encoding::SECTION_CODE, &contents);
}

fn encode_data_section(buf: &mut Vec<u8>, module: &Module) {
    if module.data.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    leb128::write_u32(&mut contents, module.data.len() as u32);
    for segment in &module.data {
        match &segment.kind {
            DataKind::Active { memory: 0, offset } => {
                leb128::write_u32(&mut contents, encoding::DATA_ACTIVE);
                emit_expression(&mut contents, offset);
            }
            DataKind::Active { memory, offset } => {
                leb128::write_u32(&mut contents, encoding::DATA_ACTIVE_EXPLICIT);
                leb128::write_u32(&mut contents, *memory);
                emit_expression(&mut contents, offset);
            }
            DataKind::Passive => {
                leb128::write_u32(&mut contents, encoding::DATA_PASSIVE);
            }
        }
        leb128::write_u32(&mut contents, segment.init.len() as u32);
        contents.extend_from_slice(&segment.init);
    }
    emit_section(buf, encoding::SECTION_DATA, &contents);
}

fn encode_custom_section(buf: &mut Vec<u8>, custom: &CustomSection) {
    let mut contents = Vec::new();
    emit_name(&mut contents, &custom.name);
    contents.extend_from_slice(&custom.data);
    emit_section(buf, encoding::SECTION_CUSTOM, &contents);
}

#[cfg(test)]
mod tests {
    use super::super::module::CustomPlace;
    use super::super::types::{FunctionType, MemoryType, TableType};
    use super::*;
    use crate::binary::reader;
    use crate::features::Features;

    fn minimal_module() -> Module {
        let mut module = Module::new();
        module.types.push(FunctionType::default());
        module.functions.push(0);
        module.code.push(Default::default());
        module
    }

    #[test]
    fn writes_header() {
        let bytes = write(&Module::new());
        assert_eq!(&bytes[0..4], b"\0asm");
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn empty_sections_omitted() {
        let mut module = Module::new();
        module.types.push(FunctionType::default());
        let bytes = write(&module);
        // header + type section only
        assert_eq!(bytes[8], encoding::SECTION_TYPE);
        assert_eq!(bytes.len(), 8 + 2 + 4);
    }

    #[test]
    fn roundtrip_minimal_module() {
        let module = minimal_module();
        let bytes = write(&module);
        let back = reader::read(&bytes, &Features::mvp()).unwrap();
        assert_eq!(back, module);
        // And the re-encoding is byte-identical.
        assert_eq!(write(&back), bytes);
    }

    #[test]
    fn roundtrip_with_memory_and_data() {
        let mut module = minimal_module();
        module.memories.push(MemoryType {
            limits: Limits::new(1, Some(2)),
        });
        module.data.push(super::super::module::DataSegment {
            kind: DataKind::Active {
                memory: 0,
                offset: vec![Instruction::I32Const { value: 8 }],
            },
            init: b"hello".to_vec(),
        });
        let bytes = write(&module);
        let back = reader::read(&bytes, &Features::mvp()).unwrap();
        assert_eq!(back, module);
    }

    #[test]
    fn custom_section_before_function_section() {
        let mut module = minimal_module();
        module.customs.push(CustomSection {
            name: "x".to_string(),
            data: vec![0x00, 0x01],
            place: CustomPlace {
                order: PlaceOrder::Before,
                anchor: CustomAnchor::Func,
            },
        });
        let bytes = write(&module);

        // Find the custom section: it must sit between type (id 1) and
        // function (id 3) sections.
        let mut offset = 8;
        let mut ids = Vec::new();
        while offset < bytes.len() {
            let id = bytes[offset];
            ids.push(id);
            let len = bytes[offset + 1] as usize;
            offset += 2 + len;
        }
        assert_eq!(
            ids,
            vec![
                encoding::SECTION_TYPE,
                encoding::SECTION_CUSTOM,
                encoding::SECTION_FUNCTION,
                encoding::SECTION_CODE,
            ]
        );
    }

    #[test]
    fn custom_sections_round_trip_in_place() {
        let mut module = minimal_module();
        module.tables.push(TableType {
            ref_type: RefType::Func,
            limits: Limits::new(1, None),
        });
        module.customs.push(CustomSection {
            name: "early".to_string(),
            data: vec![1],
            place: CustomPlace {
                order: PlaceOrder::Before,
                anchor: CustomAnchor::First,
            },
        });
        module.customs.push(CustomSection {
            name: "late".to_string(),
            data: vec![2],
            place: CustomPlace::default(),
        });
        let bytes = write(&module);
        let back = reader::read(&bytes, &Features::mvp()).unwrap();
        // Placement survives: re-encoding produces identical bytes.
        assert_eq!(write(&back), bytes);
    }

    #[test]
    fn ties_keep_source_order() {
        let mut module = Module::new();
        for name in ["a", "b", "c"] {
            module.customs.push(CustomSection {
                name: name.to_string(),
                data: Vec::new(),
                place: CustomPlace::default(),
            });
        }
        let bytes = write(&module);
        let back = reader::read(&bytes, &Features::mvp()).unwrap();
        let names: Vec<_> = back.customs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn element_segment_flags_recomputed() {
        let mut module = minimal_module();
        module.tables.push(TableType {
            ref_type: RefType::Func,
            limits: Limits::new(3, Some(3)),
        });
        module.elements.push(super::super::module::ElementSegment {
            kind: ElementKind::Active {
                table: 0,
                offset: vec![Instruction::I32Const { value: 0 }],
            },
            ref_type: RefType::Func,
            items: ElementItems::Functions(vec![0, 0, 0]),
        });
        let bytes = write(&module);
        let back = reader::read(&bytes, &Features::mvp()).unwrap();
        assert_eq!(back.elements, module.elements);
    }
}
