//! Streaming binary module reader.
//!
//! The reader walks the input left to right, dispatching on section ids and
//! reporting every failure into its error channel. An error abandons the
//! entity (and usually the section) being decoded, but the caller still
//! receives everything that was decoded before it.
//!
//! Entity readers run inside context frames; the frame labels in effect when
//! an error is reported are attached to it, so a truncated memory type
//! produces the trail `memory: memory type: limits: flags: unable to read u8`.

use super::atomics::AtomicOp;
use super::encoding;
use super::instruction::{BlockType, Instruction, MemArg};
use super::module::{
    CustomAnchor, CustomPlace, CustomSection, DataKind, DataSegment, ElementItems, ElementKind,
    ElementSegment, Export, ExternalKind, FunctionBody, Global, Import, ImportDesc, Module,
    PlaceOrder,
};
use super::simd::{SimdImm, SimdImmKind, SimdOp};
use super::types::{
    FunctionType, GlobalType, Limits, MemoryType, RefType, TableType, TagType, ValueType,
};
use crate::error::{Error, ErrorKind};
use crate::features::{Feature, Features};
use crate::leb128::{self, LebError};
use crate::span::ByteSpan;

/// Reads a binary module.
///
/// Returns the decoded module, or every error reported during the scan, in
/// input order.
pub fn read(bytes: &[u8], features: &Features) -> Result<Module, Vec<Error>> {
    let mut reader = Reader::new(ByteSpan::new(bytes), *features);
    let module = reader.read_module();
    debug_assert!(reader.context.is_empty());
    if reader.errors.is_empty() {
        Ok(module)
    } else {
        Err(reader.errors)
    }
}

pub(crate) struct Reader<'a> {
    span: ByteSpan<'a>,
    features: Features,
    errors: Vec<Error>,
    context: Vec<&'static str>,
}

// ===========================================================================
// Error channel and primitives
// ===========================================================================

impl<'a> Reader<'a> {
    pub(crate) fn new(span: ByteSpan<'a>, features: Features) -> Self {
        Reader {
            span,
            features,
            errors: Vec::new(),
            context: Vec::new(),
        }
    }

    pub(crate) fn errors(&self) -> &[Error] {
        &self.errors
    }

    fn error(&mut self, kind: ErrorKind) {
        self.error_at(self.span.pos(), kind);
    }

    fn error_at(&mut self, offset: usize, kind: ErrorKind) {
        self.errors.push(Error {
            offset,
            kind,
            context: self.context.clone(),
        });
    }

    /// Runs `f` under a context label, releasing the label on every exit path.
    fn with_context<T>(
        &mut self,
        label: &'static str,
        f: impl FnOnce(&mut Self) -> Option<T>,
    ) -> Option<T> {
        self.context.push(label);
        let result = f(self);
        self.context.pop();
        result
    }

    fn require(&mut self, feature: Feature, at: usize) -> Option<()> {
        if self.features.has(feature) {
            Some(())
        } else {
            self.error_at(at, ErrorKind::FeatureDisabled(feature));
            None
        }
    }

    fn read_u8(&mut self) -> Option<u8> {
        match self.span.read_u8() {
            Some(byte) => Some(byte),
            None => {
                self.error(ErrorKind::UnexpectedEnd("u8"));
                None
            }
        }
    }

    fn leb_error(&mut self, err: LebError, what: &'static str) {
        match err {
            LebError::UnexpectedEnd => self.error(ErrorKind::UnexpectedEnd(what)),
            LebError::TooLarge => self.error(ErrorKind::IntegerTooLarge),
        }
    }

    fn read_leb_u32(&mut self, what: &'static str) -> Option<u32> {
        match leb128::read_u32(&mut self.span) {
            Ok(v) => Some(v),
            Err(e) => {
                self.leb_error(e, what);
                None
            }
        }
    }

    fn read_leb_s32(&mut self) -> Option<i32> {
        match leb128::read_s32(&mut self.span) {
            Ok(v) => Some(v),
            Err(e) => {
                self.leb_error(e, "s32");
                None
            }
        }
    }

    fn read_leb_s64(&mut self) -> Option<i64> {
        match leb128::read_s64(&mut self.span) {
            Ok(v) => Some(v),
            Err(e) => {
                self.leb_error(e, "s64");
                None
            }
        }
    }

    fn read_f32(&mut self) -> Option<f32> {
        match leb128::read_f32(&mut self.span) {
            Ok(v) => Some(v),
            Err(e) => {
                self.leb_error(e, "f32");
                None
            }
        }
    }

    fn read_f64(&mut self) -> Option<f64> {
        match leb128::read_f64(&mut self.span) {
            Ok(v) => Some(v),
            Err(e) => {
                self.leb_error(e, "f64");
                None
            }
        }
    }

    fn read_bytes(&mut self, n: usize, what: &'static str) -> Option<&'a [u8]> {
        match self.span.take_prefix(n) {
            Some(bytes) => Some(bytes),
            None => {
                self.error(ErrorKind::UnexpectedEnd(what));
                None
            }
        }
    }

    fn read_name(&mut self) -> Option<String> {
        self.with_context("name", |r| {
            let len = r.read_leb_u32("length")?;
            let at = r.span.pos();
            let bytes = r.read_bytes(len as usize, "name bytes")?;
            match std::str::from_utf8(bytes) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    r.error_at(at, ErrorKind::Syntax("invalid UTF-8 in name".to_string()));
                    None
                }
            }
        })
    }
}

// ===========================================================================
// Type-level entity readers
// ===========================================================================

impl<'a> Reader<'a> {
    pub(crate) fn read_value_type(&mut self) -> Option<ValueType> {
        self.with_context("value type", |r| {
            let at = r.span.pos();
            let byte = r.read_u8()?;
            let vt = match ValueType::from_byte(byte) {
                Some(vt) => vt,
                None => {
                    r.error_at(at, ErrorKind::UnknownValueType(byte));
                    return None;
                }
            };
            if let Some(feature) = vt.required_feature() {
                r.require(feature, at)?;
            }
            Some(vt)
        })
    }

    fn read_ref_type(&mut self) -> Option<RefType> {
        self.with_context("reference type", |r| {
            let at = r.span.pos();
            let byte = r.read_u8()?;
            let rt = match RefType::from_byte(byte) {
                Some(rt) => rt,
                None => {
                    r.error_at(at, ErrorKind::UnknownValueType(byte));
                    return None;
                }
            };
            if rt == RefType::Extern {
                r.require(Feature::ReferenceTypes, at)?;
            }
            Some(rt)
        })
    }

    pub(crate) fn read_limits(&mut self) -> Option<Limits> {
        self.with_context("limits", |r| {
            let flags_at = r.span.pos();
            let flags = r.with_context("flags", |r| r.read_u8())?;
            let shared = match flags {
                encoding::LIMITS_NO_MAX | encoding::LIMITS_HAS_MAX => false,
                encoding::LIMITS_HAS_MAX_SHARED => {
                    r.require(Feature::Threads, flags_at)?;
                    true
                }
                _ => {
                    r.error_at(
                        flags_at,
                        ErrorKind::BadFlags {
                            value: u32::from(flags),
                            context: "limits",
                        },
                    );
                    return None;
                }
            };
            let min = r.with_context("min", |r| r.read_leb_u32("u32"))?;
            let max = if flags == encoding::LIMITS_NO_MAX {
                None
            } else {
                Some(r.with_context("max", |r| r.read_leb_u32("u32"))?)
            };
            Some(Limits { min, max, shared })
        })
    }

    pub(crate) fn read_function_type(&mut self) -> Option<FunctionType> {
        self.with_context("function type", |r| {
            let at = r.span.pos();
            let form = r.read_u8()?;
            if form != encoding::TYPE_FUNC {
                r.error_at(
                    at,
                    ErrorKind::BadFlags {
                        value: u32::from(form),
                        context: "type form",
                    },
                );
                return None;
            }
            let params = r.read_value_type_vec()?;
            let results = r.read_value_type_vec()?;
            if results.len() > 1 {
                r.require(Feature::MultiValue, at)?;
            }
            Some(FunctionType::new(params, results))
        })
    }

    fn read_value_type_vec(&mut self) -> Option<Vec<ValueType>> {
        let count = self.read_leb_u32("count")?;
        let mut types = Vec::new();
        for _ in 0..count {
            types.push(self.read_value_type()?);
        }
        Some(types)
    }

    fn read_table_type(&mut self) -> Option<TableType> {
        self.with_context("table type", |r| {
            let ref_type = r.read_ref_type()?;
            let limits = r.read_limits()?;
            Some(TableType { ref_type, limits })
        })
    }

    pub(crate) fn read_memory_type(&mut self) -> Option<MemoryType> {
        self.with_context("memory type", |r| {
            let limits = r.read_limits()?;
            Some(MemoryType { limits })
        })
    }

    fn read_global_type(&mut self) -> Option<GlobalType> {
        self.with_context("global type", |r| {
            let value_type = r.read_value_type()?;
            let at = r.span.pos();
            let mutable = r.with_context("mutability", |r| {
                let byte = r.read_u8()?;
                match byte {
                    encoding::MUT_CONST => Some(false),
                    encoding::MUT_VAR => Some(true),
                    _ => {
                        r.error_at(
                            at,
                            ErrorKind::BadFlags {
                                value: u32::from(byte),
                                context: "mutability",
                            },
                        );
                        None
                    }
                }
            })?;
            Some(GlobalType {
                value_type,
                mutable,
            })
        })
    }

    fn read_tag_type(&mut self) -> Option<TagType> {
        self.with_context("tag type", |r| {
            let at = r.span.pos();
            let attribute = r.read_u8()?;
            if attribute != encoding::TAG_ATTRIBUTE_EXCEPTION {
                r.error_at(
                    at,
                    ErrorKind::BadFlags {
                        value: u32::from(attribute),
                        context: "tag attribute",
                    },
                );
                return None;
            }
            let type_idx = r.read_leb_u32("type index")?;
            Some(TagType { type_idx })
        })
    }

    fn read_block_type(&mut self) -> Option<BlockType> {
        self.with_context("block type", |r| {
            let at = r.span.pos();
            match r.span.peek(0) {
                Some(encoding::BLOCK_TYPE_EMPTY) => {
                    r.span.read_u8();
                    Some(BlockType::Empty)
                }
                Some(byte) if ValueType::from_byte(byte).is_some() => {
                    let vt = r.read_value_type()?;
                    Some(BlockType::Value(vt))
                }
                Some(_) => {
                    let value = match leb128::read_s33(&mut r.span) {
                        Ok(v) => v,
                        Err(e) => {
                            r.leb_error(e, "block type");
                            return None;
                        }
                    };
                    if value < 0 {
                        r.error_at(at, ErrorKind::UnknownValueType((value & 0x7f) as u8));
                        return None;
                    }
                    r.require(Feature::MultiValue, at)?;
                    Some(BlockType::Func(value as u32))
                }
                None => {
                    r.error(ErrorKind::UnexpectedEnd("u8"));
                    None
                }
            }
        })
    }
}

// ===========================================================================
// Instruction decoding
// ===========================================================================

impl<'a> Reader<'a> {
    fn read_memarg(&mut self) -> Option<MemArg> {
        self.with_context("memarg", |r| {
            let align = r.with_context("alignment", |r| r.read_leb_u32("u32"))?;
            let offset = r.with_context("offset", |r| r.read_leb_u32("u32"))?;
            Some(MemArg { align, offset })
        })
    }

    /// Reads an index that doubles as a reserved zero byte when `feature` is
    /// disabled.
    fn read_gated_index(&mut self, feature: Feature, what: &'static str) -> Option<u32> {
        let at = self.span.pos();
        let index = self.read_leb_u32(what)?;
        if index != 0 {
            self.require(feature, at)?;
        }
        Some(index)
    }

    pub(crate) fn read_instr(&mut self) -> Option<Instruction> {
        self.with_context("instruction", |r| r.read_instr_inner())
    }

    fn read_instr_inner(&mut self) -> Option<Instruction> {
        use Instruction::*;

        let at = self.span.pos();
        let opcode = self.read_u8()?;

        if let Some(instr) = Instruction::plain_from_opcode(opcode) {
            match opcode {
                0xc0..=0xc4 => self.require(Feature::SignExtension, at)?,
                0xd1 => self.require(Feature::ReferenceTypes, at)?,
                0x19 => self.require(Feature::Exceptions, at)?,
                _ => {}
            }
            return Some(instr);
        }

        match opcode {
            0x02 => Some(Block {
                block_type: self.read_block_type()?,
            }),
            0x03 => Some(Loop {
                block_type: self.read_block_type()?,
            }),
            0x04 => Some(If {
                block_type: self.read_block_type()?,
            }),
            0x06 => {
                self.require(Feature::Exceptions, at)?;
                Some(Try {
                    block_type: self.read_block_type()?,
                })
            }
            0x07 => {
                self.require(Feature::Exceptions, at)?;
                Some(Catch {
                    tag_idx: self.read_leb_u32("tag index")?,
                })
            }
            0x08 => {
                self.require(Feature::Exceptions, at)?;
                Some(Throw {
                    tag_idx: self.read_leb_u32("tag index")?,
                })
            }
            0x09 => {
                self.require(Feature::Exceptions, at)?;
                Some(Rethrow {
                    depth: self.read_leb_u32("label index")?,
                })
            }
            0x18 => {
                self.require(Feature::Exceptions, at)?;
                Some(Delegate {
                    depth: self.read_leb_u32("label index")?,
                })
            }
            0x0c => Some(Br {
                label_idx: self.read_leb_u32("label index")?,
            }),
            0x0d => Some(BrIf {
                label_idx: self.read_leb_u32("label index")?,
            }),
            0x0e => {
                let count = self.read_leb_u32("label count")?;
                let mut labels = Vec::new();
                for _ in 0..count {
                    labels.push(self.read_leb_u32("label index")?);
                }
                let default = self.read_leb_u32("label index")?;
                Some(BrTable { labels, default })
            }
            0x10 => Some(Call {
                func_idx: self.read_leb_u32("function index")?,
            }),
            0x11 => {
                let type_idx = self.read_leb_u32("type index")?;
                let table_idx = self.read_gated_index(Feature::ReferenceTypes, "table index")?;
                Some(CallIndirect {
                    type_idx,
                    table_idx,
                })
            }
            0x12 => {
                self.require(Feature::TailCall, at)?;
                Some(ReturnCall {
                    func_idx: self.read_leb_u32("function index")?,
                })
            }
            0x13 => {
                self.require(Feature::TailCall, at)?;
                let type_idx = self.read_leb_u32("type index")?;
                let table_idx = self.read_gated_index(Feature::ReferenceTypes, "table index")?;
                Some(ReturnCallIndirect {
                    type_idx,
                    table_idx,
                })
            }
            0x1c => {
                self.require(Feature::ReferenceTypes, at)?;
                let val_types = self.read_value_type_vec()?;
                Some(SelectTyped { val_types })
            }
            0x20 => Some(LocalGet {
                local_idx: self.read_leb_u32("local index")?,
            }),
            0x21 => Some(LocalSet {
                local_idx: self.read_leb_u32("local index")?,
            }),
            0x22 => Some(LocalTee {
                local_idx: self.read_leb_u32("local index")?,
            }),
            0x23 => Some(GlobalGet {
                global_idx: self.read_leb_u32("global index")?,
            }),
            0x24 => Some(GlobalSet {
                global_idx: self.read_leb_u32("global index")?,
            }),
            0x25 => {
                self.require(Feature::ReferenceTypes, at)?;
                Some(TableGet {
                    table_idx: self.read_leb_u32("table index")?,
                })
            }
            0x26 => {
                self.require(Feature::ReferenceTypes, at)?;
                Some(TableSet {
                    table_idx: self.read_leb_u32("table index")?,
                })
            }
            0x28 => Some(I32Load { memarg: self.read_memarg()? }),
            0x29 => Some(I64Load { memarg: self.read_memarg()? }),
            0x2a => Some(F32Load { memarg: self.read_memarg()? }),
            0x2b => Some(F64Load { memarg: self.read_memarg()? }),
            0x2c => Some(I32Load8S { memarg: self.read_memarg()? }),
            0x2d => Some(I32Load8U { memarg: self.read_memarg()? }),
            0x2e => Some(I32Load16S { memarg: self.read_memarg()? }),
            0x2f => Some(I32Load16U { memarg: self.read_memarg()? }),
            0x30 => Some(I64Load8S { memarg: self.read_memarg()? }),
            0x31 => Some(I64Load8U { memarg: self.read_memarg()? }),
            0x32 => Some(I64Load16S { memarg: self.read_memarg()? }),
            0x33 => Some(I64Load16U { memarg: self.read_memarg()? }),
            0x34 => Some(I64Load32S { memarg: self.read_memarg()? }),
            0x35 => Some(I64Load32U { memarg: self.read_memarg()? }),
            0x36 => Some(I32Store { memarg: self.read_memarg()? }),
            0x37 => Some(I64Store { memarg: self.read_memarg()? }),
            0x38 => Some(F32Store { memarg: self.read_memarg()? }),
            0x39 => Some(F64Store { memarg: self.read_memarg()? }),
            0x3a => Some(I32Store8 { memarg: self.read_memarg()? }),
            0x3b => Some(I32Store16 { memarg: self.read_memarg()? }),
            0x3c => Some(I64Store8 { memarg: self.read_memarg()? }),
            0x3d => Some(I64Store16 { memarg: self.read_memarg()? }),
            0x3e => Some(I64Store32 { memarg: self.read_memarg()? }),
            0x3f => Some(MemorySize {
                mem_idx: self.read_gated_index(Feature::MultiMemory, "memory index")?,
            }),
            0x40 => Some(MemoryGrow {
                mem_idx: self.read_gated_index(Feature::MultiMemory, "memory index")?,
            }),
            0x41 => Some(I32Const {
                value: self.read_leb_s32()?,
            }),
            0x42 => Some(I64Const {
                value: self.read_leb_s64()?,
            }),
            0x43 => Some(F32Const {
                value: self.read_f32()?,
            }),
            0x44 => Some(F64Const {
                value: self.read_f64()?,
            }),
            0xd0 => {
                self.require(Feature::ReferenceTypes, at)?;
                let ref_type = self.read_value_type()?;
                if !ref_type.is_ref() {
                    self.error_at(at, ErrorKind::UnknownValueType(ref_type.to_byte()));
                    return None;
                }
                Some(RefNull { ref_type })
            }
            0xd2 => {
                self.require(Feature::ReferenceTypes, at)?;
                Some(RefFunc {
                    func_idx: self.read_leb_u32("function index")?,
                })
            }
            encoding::PREFIX_MISC => self.read_misc_instr(at),
            encoding::PREFIX_SIMD => self.read_simd_instr(at),
            encoding::PREFIX_ATOMIC => self.read_atomic_instr(at),
            _ => {
                self.error_at(at, ErrorKind::UnknownOpcode(u32::from(opcode)));
                None
            }
        }
    }

    fn read_misc_instr(&mut self, at: usize) -> Option<Instruction> {
        use Instruction::*;

        let subopcode = self.read_leb_u32("sub-opcode")?;

        if let Some(instr) = Instruction::sat_trunc_from_subopcode(subopcode) {
            self.require(Feature::SaturatingFloatToInt, at)?;
            return Some(instr);
        }

        match subopcode {
            0x08 => {
                self.require(Feature::BulkMemory, at)?;
                let data_idx = self.read_leb_u32("data index")?;
                let mem_idx = self.read_gated_index(Feature::MultiMemory, "memory index")?;
                Some(MemoryInit { data_idx, mem_idx })
            }
            0x09 => {
                self.require(Feature::BulkMemory, at)?;
                Some(DataDrop {
                    data_idx: self.read_leb_u32("data index")?,
                })
            }
            0x0a => {
                self.require(Feature::BulkMemory, at)?;
                let dst_mem = self.read_gated_index(Feature::MultiMemory, "memory index")?;
                let src_mem = self.read_gated_index(Feature::MultiMemory, "memory index")?;
                Some(MemoryCopy { dst_mem, src_mem })
            }
            0x0b => {
                self.require(Feature::BulkMemory, at)?;
                Some(MemoryFill {
                    mem_idx: self.read_gated_index(Feature::MultiMemory, "memory index")?,
                })
            }
            0x0c => {
                self.require(Feature::BulkMemory, at)?;
                let elem_idx = self.read_leb_u32("element index")?;
                let table_idx = self.read_leb_u32("table index")?;
                Some(TableInit {
                    elem_idx,
                    table_idx,
                })
            }
            0x0d => {
                self.require(Feature::BulkMemory, at)?;
                Some(ElemDrop {
                    elem_idx: self.read_leb_u32("element index")?,
                })
            }
            0x0e => {
                self.require(Feature::BulkMemory, at)?;
                let dst_table = self.read_leb_u32("table index")?;
                let src_table = self.read_leb_u32("table index")?;
                Some(TableCopy {
                    dst_table,
                    src_table,
                })
            }
            0x0f => {
                self.require(Feature::ReferenceTypes, at)?;
                Some(TableGrow {
                    table_idx: self.read_leb_u32("table index")?,
                })
            }
            0x10 => {
                self.require(Feature::ReferenceTypes, at)?;
                Some(TableSize {
                    table_idx: self.read_leb_u32("table index")?,
                })
            }
            0x11 => {
                self.require(Feature::ReferenceTypes, at)?;
                Some(TableFill {
                    table_idx: self.read_leb_u32("table index")?,
                })
            }
            _ => {
                self.error_at(
                    at,
                    ErrorKind::UnknownPrefixedOpcode {
                        prefix: encoding::PREFIX_MISC,
                        opcode: subopcode,
                    },
                );
                None
            }
        }
    }

    fn read_simd_instr(&mut self, at: usize) -> Option<Instruction> {
        self.require(Feature::Simd, at)?;
        let subopcode = self.read_leb_u32("sub-opcode")?;
        let op = match SimdOp::from_code(subopcode) {
            Some(op) => op,
            None => {
                self.error_at(
                    at,
                    ErrorKind::UnknownPrefixedOpcode {
                        prefix: encoding::PREFIX_SIMD,
                        opcode: subopcode,
                    },
                );
                return None;
            }
        };
        let imm = match op.imm_kind() {
            SimdImmKind::None => SimdImm::None,
            SimdImmKind::MemArg => SimdImm::MemArg(self.read_memarg()?),
            SimdImmKind::MemArgLane => {
                let memarg = self.read_memarg()?;
                let lane = self.read_lane(op.lane_count())?;
                SimdImm::MemArgLane { memarg, lane }
            }
            SimdImmKind::Lane => SimdImm::Lane(self.read_lane(op.lane_count())?),
            SimdImmKind::Bytes => {
                let bytes = self.read_bytes(16, "v128 bytes")?;
                let mut value = [0u8; 16];
                value.copy_from_slice(bytes);
                SimdImm::Bytes(value)
            }
            SimdImmKind::Lanes => {
                let lanes_at = self.span.pos();
                let bytes = self.read_bytes(16, "shuffle lanes")?;
                let mut lanes = [0u8; 16];
                lanes.copy_from_slice(bytes);
                for (i, &lane) in lanes.iter().enumerate() {
                    if lane >= 32 {
                        self.error_at(
                            lanes_at + i,
                            ErrorKind::IndexOutOfRange {
                                space: "shuffle lane",
                                index: u32::from(lane),
                                max: 31,
                            },
                        );
                        return None;
                    }
                }
                SimdImm::Lanes(lanes)
            }
        };
        Some(Instruction::Simd { op, imm })
    }

    fn read_lane(&mut self, count: u8) -> Option<u8> {
        let at = self.span.pos();
        let lane = self.read_u8()?;
        if lane >= count {
            self.error_at(
                at,
                ErrorKind::IndexOutOfRange {
                    space: "lane",
                    index: u32::from(lane),
                    max: u32::from(count) - 1,
                },
            );
            return None;
        }
        Some(lane)
    }

    fn read_atomic_instr(&mut self, at: usize) -> Option<Instruction> {
        self.require(Feature::Threads, at)?;
        let subopcode = self.read_leb_u32("sub-opcode")?;
        let op = match AtomicOp::from_code(subopcode) {
            Some(op) => op,
            None => {
                self.error_at(
                    at,
                    ErrorKind::UnknownPrefixedOpcode {
                        prefix: encoding::PREFIX_ATOMIC,
                        opcode: subopcode,
                    },
                );
                return None;
            }
        };
        let memarg = if op.has_memarg() {
            Some(self.read_memarg()?)
        } else {
            let flags_at = self.span.pos();
            let flags = self.read_u8()?;
            if flags != 0 {
                self.error_at(
                    flags_at,
                    ErrorKind::BadFlags {
                        value: u32::from(flags),
                        context: "atomic.fence reserved byte",
                    },
                );
                return None;
            }
            None
        };
        Some(Instruction::Atomic { op, memarg })
    }

    /// Reads instructions up to and including the `end` that closes the
    /// implicit outermost level. The terminating `end` is not stored.
    pub(crate) fn read_expr(&mut self) -> Option<Vec<Instruction>> {
        #[derive(PartialEq)]
        enum Frame {
            Body,
            Block,
            If,
            Try,
        }

        let mut frames = vec![Frame::Body];
        let mut instrs = Vec::new();
        loop {
            let at = self.span.pos();
            let instr = self.read_instr()?;
            match &instr {
                Instruction::Block { .. } | Instruction::Loop { .. } => frames.push(Frame::Block),
                Instruction::If { .. } => frames.push(Frame::If),
                Instruction::Try { .. } => frames.push(Frame::Try),
                Instruction::Else => {
                    if frames.last() != Some(&Frame::If) {
                        self.error_at(
                            at,
                            ErrorKind::Validation("else outside of if".to_string()),
                        );
                        return None;
                    }
                }
                Instruction::Catch { .. } | Instruction::CatchAll => {
                    if frames.last() != Some(&Frame::Try) {
                        self.error_at(
                            at,
                            ErrorKind::Validation("catch outside of try".to_string()),
                        );
                        return None;
                    }
                }
                Instruction::Delegate { .. } => {
                    if frames.last() != Some(&Frame::Try) {
                        self.error_at(
                            at,
                            ErrorKind::Validation("delegate outside of try".to_string()),
                        );
                        return None;
                    }
                    // delegate closes its try without an end
                    frames.pop();
                    instrs.push(instr);
                    continue;
                }
                Instruction::End => {
                    frames.pop();
                    if frames.is_empty() {
                        return Some(instrs);
                    }
                }
                _ => {}
            }
            instrs.push(instr);
        }
    }
}

// ===========================================================================
// Sections
// ===========================================================================

fn section_rank(id: u8) -> i8 {
    match id {
        encoding::SECTION_TYPE => 0,
        encoding::SECTION_IMPORT => 1,
        encoding::SECTION_FUNCTION => 2,
        encoding::SECTION_TABLE => 3,
        encoding::SECTION_MEMORY => 4,
        encoding::SECTION_TAG => 5,
        encoding::SECTION_GLOBAL => 6,
        encoding::SECTION_EXPORT => 7,
        encoding::SECTION_START => 8,
        encoding::SECTION_ELEMENT => 9,
        encoding::SECTION_DATA_COUNT => 10,
        encoding::SECTION_CODE => 11,
        encoding::SECTION_DATA => 12,
        _ => i8::MAX,
    }
}

fn section_anchor(id: u8) -> CustomAnchor {
    match id {
        encoding::SECTION_TYPE => CustomAnchor::Type,
        encoding::SECTION_IMPORT => CustomAnchor::Import,
        encoding::SECTION_FUNCTION => CustomAnchor::Func,
        encoding::SECTION_TABLE => CustomAnchor::Table,
        encoding::SECTION_MEMORY => CustomAnchor::Memory,
        encoding::SECTION_TAG => CustomAnchor::Tag,
        encoding::SECTION_GLOBAL => CustomAnchor::Global,
        encoding::SECTION_EXPORT => CustomAnchor::Export,
        encoding::SECTION_START => CustomAnchor::Start,
        encoding::SECTION_ELEMENT => CustomAnchor::Elem,
        encoding::SECTION_DATA_COUNT => CustomAnchor::DataCount,
        encoding::SECTION_CODE => CustomAnchor::Code,
        encoding::SECTION_DATA => CustomAnchor::Data,
        _ => CustomAnchor::First,
    }
}

impl<'a> Reader<'a> {
    fn read_module(&mut self) -> Module {
        let mut module = Module::new();

        match self.span.take_prefix(4) {
            Some(magic) if magic == encoding::MAGIC => {}
            _ => {
                self.error_at(0, ErrorKind::BadMagicOrVersion);
                return module;
            }
        }
        match self.span.take_prefix(4) {
            Some(version) if version == encoding::VERSION => {}
            _ => {
                self.error_at(4, ErrorKind::BadMagicOrVersion);
                return module;
            }
        }

        let mut seen = [false; 14];
        let mut last_rank: i8 = -1;
        let mut anchor = CustomAnchor::First;

        while !self.span.is_empty() {
            let section_at = self.span.pos();
            let Some(id) = self.read_u8() else { break };
            let Some(size) = self.read_leb_u32("section length") else {
                break;
            };
            let Some(payload) = self.span.split_prefix(size as usize) else {
                self.error(ErrorKind::UnexpectedEnd("section contents"));
                break;
            };

            if id == encoding::SECTION_CUSTOM {
                let saved = std::mem::replace(&mut self.span, payload);
                self.read_custom_section(&mut module, anchor);
                self.span = saved;
                continue;
            }

            if section_rank(id) == i8::MAX {
                self.error_at(
                    section_at,
                    ErrorKind::BadFlags {
                        value: u32::from(id),
                        context: "section id",
                    },
                );
                continue;
            }
            if seen[id as usize] {
                self.error_at(section_at, ErrorKind::DuplicateSection);
                continue;
            }
            seen[id as usize] = true;
            if section_rank(id) <= last_rank {
                self.error_at(section_at, ErrorKind::SectionOrder);
                continue;
            }
            last_rank = section_rank(id);

            let saved = std::mem::replace(&mut self.span, payload);
            let complete = self.read_section(id, &mut module);
            if complete.is_some() && !self.span.is_empty() {
                self.error(ErrorKind::SectionTooLong);
            }
            self.span = saved;
            anchor = section_anchor(id);
        }

        module
    }

    fn read_custom_section(&mut self, module: &mut Module, anchor: CustomAnchor) {
        let custom = self.with_context("custom section", |r| {
            let name = r.read_name()?;
            let data = r.span.remaining().to_vec();
            r.span.strip_prefix(data.len());
            Some(CustomSection {
                name,
                data,
                place: CustomPlace {
                    order: if anchor == CustomAnchor::First {
                        PlaceOrder::Before
                    } else {
                        PlaceOrder::After
                    },
                    anchor,
                },
            })
        });
        if let Some(custom) = custom {
            module.customs.push(custom);
        }
    }

    fn read_section(&mut self, id: u8, module: &mut Module) -> Option<()> {
        match id {
            encoding::SECTION_TYPE => self.read_type_section(module),
            encoding::SECTION_IMPORT => self.read_import_section(module),
            encoding::SECTION_FUNCTION => self.read_function_section(module),
            encoding::SECTION_TABLE => self.read_table_section(module),
            encoding::SECTION_MEMORY => self.read_memory_section(module),
            encoding::SECTION_TAG => self.read_tag_section(module),
            encoding::SECTION_GLOBAL => self.read_global_section(module),
            encoding::SECTION_EXPORT => self.read_export_section(module),
            encoding::SECTION_START => self.read_start_section(module),
            encoding::SECTION_ELEMENT => self.read_element_section(module),
            encoding::SECTION_DATA_COUNT => self.read_data_count_section(module),
            encoding::SECTION_CODE => self.read_code_section(module),
            encoding::SECTION_DATA => self.read_data_section(module),
            _ => None,
        }
    }

    fn read_type_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let ty = self.read_function_type()?;
            module.types.push(ty);
        }
        Some(())
    }

    fn read_import_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let import = self.with_context("import", |r| {
                let module_name = r.read_name()?;
                let field_name = r.read_name()?;
                let kind_at = r.span.pos();
                let kind = r.read_u8()?;
                let desc = match kind {
                    encoding::DESC_FUNC => ImportDesc::Func(r.read_leb_u32("type index")?),
                    encoding::DESC_TABLE => ImportDesc::Table(r.read_table_type()?),
                    encoding::DESC_MEMORY => ImportDesc::Memory(r.read_memory_type()?),
                    encoding::DESC_GLOBAL => {
                        let gt = r.read_global_type()?;
                        if gt.mutable {
                            r.require(Feature::MutableGlobals, kind_at)?;
                        }
                        ImportDesc::Global(gt)
                    }
                    encoding::DESC_TAG => {
                        r.require(Feature::Exceptions, kind_at)?;
                        ImportDesc::Tag(r.read_tag_type()?)
                    }
                    _ => {
                        r.error_at(
                            kind_at,
                            ErrorKind::BadFlags {
                                value: u32::from(kind),
                                context: "import kind",
                            },
                        );
                        return None;
                    }
                };
                Some(Import {
                    module: module_name,
                    name: field_name,
                    desc,
                })
            })?;
            module.imports.push(import);
        }
        Some(())
    }

    fn read_function_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let type_idx = self.with_context("function", |r| r.read_leb_u32("type index"))?;
            module.functions.push(type_idx);
        }
        Some(())
    }

    fn read_table_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let table = self.with_context("table", |r| r.read_table_type())?;
            module.tables.push(table);
        }
        Some(())
    }

    fn read_memory_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let memory = self.read_memory()?;
            module.memories.push(memory);
        }
        Some(())
    }

    pub(crate) fn read_memory(&mut self) -> Option<MemoryType> {
        self.with_context("memory", |r| r.read_memory_type())
    }

    fn read_tag_section(&mut self, module: &mut Module) -> Option<()> {
        let at = self.span.pos();
        self.require(Feature::Exceptions, at)?;
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let tag = self.with_context("tag", |r| r.read_tag_type())?;
            module.tags.push(tag);
        }
        Some(())
    }

    fn read_global_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let global = self.with_context("global", |r| {
                let ty = r.read_global_type()?;
                let init = r.read_expr()?;
                Some(Global { ty, init })
            })?;
            module.globals.push(global);
        }
        Some(())
    }

    fn read_export_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let export = self.with_context("export", |r| {
                let name = r.read_name()?;
                let kind_at = r.span.pos();
                let kind_byte = r.read_u8()?;
                let kind = match kind_byte {
                    encoding::DESC_FUNC => ExternalKind::Func,
                    encoding::DESC_TABLE => ExternalKind::Table,
                    encoding::DESC_MEMORY => ExternalKind::Memory,
                    encoding::DESC_GLOBAL => ExternalKind::Global,
                    encoding::DESC_TAG => {
                        r.require(Feature::Exceptions, kind_at)?;
                        ExternalKind::Tag
                    }
                    _ => {
                        r.error_at(
                            kind_at,
                            ErrorKind::BadFlags {
                                value: u32::from(kind_byte),
                                context: "export kind",
                            },
                        );
                        return None;
                    }
                };
                let index = r.read_leb_u32("export index")?;
                Some(Export { name, kind, index })
            })?;
            module.exports.push(export);
        }
        Some(())
    }

    fn read_start_section(&mut self, module: &mut Module) -> Option<()> {
        let index = self.with_context("start", |r| r.read_leb_u32("function index"))?;
        module.start = Some(index);
        Some(())
    }

    fn read_element_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let segment = self.with_context("element segment", |r| r.read_element_segment())?;
            module.elements.push(segment);
        }
        Some(())
    }

    fn read_element_segment(&mut self) -> Option<ElementSegment> {
        let flags_at = self.span.pos();
        let flags = self.with_context("flags", |r| r.read_leb_u32("u32"))?;
        if flags > 7 {
            self.error_at(
                flags_at,
                ErrorKind::BadFlags {
                    value: flags,
                    context: "element segment",
                },
            );
            return None;
        }
        if flags != encoding::ELEM_ACTIVE_FUNCS {
            self.require(Feature::BulkMemory, flags_at)?;
        }

        let active = flags & 0b001 == 0;
        let explicit_table = flags & 0b010 != 0;
        let expressions = flags & 0b100 != 0;

        let kind = if active {
            let table = if explicit_table {
                self.read_leb_u32("table index")?
            } else {
                0
            };
            let offset = self.with_context("offset", |r| r.read_expr())?;
            ElementKind::Active { table, offset }
        } else if explicit_table {
            ElementKind::Declared
        } else {
            ElementKind::Passive
        };

        // The implicit-table active forms (0 and 4) carry neither an elemkind
        // byte nor a reftype.
        let ref_type = if flags == encoding::ELEM_ACTIVE_FUNCS || flags == encoding::ELEM_ACTIVE_EXPRS
        {
            RefType::Func
        } else if expressions {
            self.read_ref_type()?
        } else {
            let kind_at = self.span.pos();
            let elemkind = self.read_u8()?;
            if elemkind != encoding::ELEMKIND_FUNCREF {
                self.error_at(
                    kind_at,
                    ErrorKind::BadFlags {
                        value: u32::from(elemkind),
                        context: "element kind",
                    },
                );
                return None;
            }
            RefType::Func
        };

        let count = self.read_leb_u32("count")?;
        let items = if expressions {
            let mut exprs = Vec::new();
            for _ in 0..count {
                exprs.push(self.with_context("element expression", |r| r.read_expr())?);
            }
            ElementItems::Expressions(exprs)
        } else {
            let mut funcs = Vec::new();
            for _ in 0..count {
                funcs.push(self.read_leb_u32("function index")?);
            }
            ElementItems::Functions(funcs)
        };

        Some(ElementSegment {
            kind,
            ref_type,
            items,
        })
    }

    fn read_data_count_section(&mut self, module: &mut Module) -> Option<()> {
        let at = self.span.pos();
        self.require(Feature::BulkMemory, at)?;
        let count = self.read_leb_u32("count")?;
        module.data_count = Some(count);
        Some(())
    }

    fn read_code_section(&mut self, module: &mut Module) -> Option<()> {
        let count_at = self.span.pos();
        let count = self.read_leb_u32("count")?;
        if count as usize != module.functions.len() {
            self.error_at(
                count_at,
                ErrorKind::Validation(format!(
                    "function count mismatch, expected {}, got {}",
                    module.functions.len(),
                    count
                )),
            );
            return None;
        }
        for _ in 0..count {
            let body = self.with_context("code", |r| {
                let size = r.read_leb_u32("body size")?;
                let Some(payload) = r.span.split_prefix(size as usize) else {
                    r.error(ErrorKind::UnexpectedEnd("function body"));
                    return None;
                };
                let saved = std::mem::replace(&mut r.span, payload);
                let body = r.read_function_body();
                if body.is_some() && !r.span.is_empty() {
                    r.error(ErrorKind::SectionTooLong);
                }
                r.span = saved;
                body
            })?;
            module.code.push(body);
        }
        Some(())
    }

    fn read_function_body(&mut self) -> Option<FunctionBody> {
        let group_count = self.read_leb_u32("local count")?;
        let mut locals = Vec::new();
        for _ in 0..group_count {
            let n = self.with_context("locals", |r| r.read_leb_u32("count"))?;
            let vt = self.read_value_type()?;
            locals.push((n, vt));
        }
        let body = self.read_expr()?;
        Some(FunctionBody { locals, body })
    }

    fn read_data_section(&mut self, module: &mut Module) -> Option<()> {
        let count = self.read_leb_u32("count")?;
        for _ in 0..count {
            let segment = self.with_context("data segment", |r| {
                let flags_at = r.span.pos();
                let flags = r.with_context("flags", |r| r.read_leb_u32("u32"))?;
                let kind = match flags {
                    encoding::DATA_ACTIVE => DataKind::Active {
                        memory: 0,
                        offset: r.with_context("offset", |r| r.read_expr())?,
                    },
                    encoding::DATA_PASSIVE => {
                        r.require(Feature::BulkMemory, flags_at)?;
                        DataKind::Passive
                    }
                    encoding::DATA_ACTIVE_EXPLICIT => {
                        let memory = r.read_gated_index(Feature::MultiMemory, "memory index")?;
                        DataKind::Active {
                            memory,
                            offset: r.with_context("offset", |r| r.read_expr())?,
                        }
                    }
                    _ => {
                        r.error_at(
                            flags_at,
                            ErrorKind::BadFlags {
                                value: flags,
                                context: "data segment",
                            },
                        );
                        return None;
                    }
                };
                let len = r.read_leb_u32("length")?;
                let init = r.read_bytes(len as usize, "data bytes")?.to_vec();
                Some(DataSegment { kind, init })
            })?;
            module.data.push(segment);
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &[u8], features: Features) -> Reader<'_> {
        Reader::new(ByteSpan::new(bytes), features)
    }

    #[test]
    fn limits_with_max() {
        let mut r = reader(&[0x01, 0x01, 0x02], Features::mvp());
        assert_eq!(r.read_limits(), Some(Limits::new(1, Some(2))));
        assert!(r.errors().is_empty());
    }

    #[test]
    fn limits_without_max() {
        let mut r = reader(&[0x00, 0x05], Features::mvp());
        assert_eq!(r.read_limits(), Some(Limits::new(5, None)));
    }

    #[test]
    fn limits_bad_flags() {
        let mut r = reader(&[0x02, 0x01, 0x02], Features::mvp());
        assert_eq!(r.read_limits(), None);
        assert_eq!(
            r.errors()[0].kind,
            ErrorKind::BadFlags {
                value: 2,
                context: "limits"
            }
        );
        assert_eq!(r.errors()[0].context, vec!["limits"]);
    }

    #[test]
    fn limits_shared_requires_threads() {
        let mut r = reader(&[0x03, 0x01, 0x02], Features::mvp());
        assert_eq!(r.read_limits(), None);
        assert_eq!(
            r.errors()[0].kind,
            ErrorKind::FeatureDisabled(Feature::Threads)
        );

        let mut r = reader(&[0x03, 0x01, 0x02], Features::mvp().enable_threads());
        assert_eq!(
            r.read_limits(),
            Some(Limits {
                min: 1,
                max: Some(2),
                shared: true
            })
        );
    }

    #[test]
    fn empty_memory_error_trail() {
        let mut r = reader(&[], Features::mvp());
        assert_eq!(r.read_memory(), None);
        let err = &r.errors()[0];
        assert_eq!(err.kind, ErrorKind::UnexpectedEnd("u8"));
        assert_eq!(
            err.context,
            vec!["memory", "memory type", "limits", "flags"]
        );
        assert_eq!(err.offset, 0);
        // The context stack itself is back to empty.
        assert!(r.context.is_empty());
    }

    #[test]
    fn value_type_feature_gating() {
        let mut r = reader(&[0x7b], Features::mvp());
        assert_eq!(r.read_value_type(), None);
        assert_eq!(r.errors()[0].kind, ErrorKind::FeatureDisabled(Feature::Simd));
        assert_eq!(r.errors()[0].offset, 0);

        let mut r = reader(&[0x7b], Features::mvp().enable_simd());
        assert_eq!(r.read_value_type(), Some(ValueType::V128));
    }

    #[test]
    fn unknown_value_type() {
        let mut r = reader(&[0x17], Features::all());
        assert_eq!(r.read_value_type(), None);
        assert_eq!(r.errors()[0].kind, ErrorKind::UnknownValueType(0x17));
    }

    #[test]
    fn function_type_roundtrip() {
        // (i32, i32) -> i32
        let mut r = reader(&[0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f], Features::mvp());
        let ty = r.read_function_type().unwrap();
        assert_eq!(
            ty,
            FunctionType::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32])
        );
    }

    #[test]
    fn multi_value_gated() {
        let mut r = reader(&[0x60, 0x00, 0x02, 0x7f, 0x7f], Features::mvp());
        assert_eq!(r.read_function_type(), None);
        assert_eq!(
            r.errors()[0].kind,
            ErrorKind::FeatureDisabled(Feature::MultiValue)
        );
    }

    #[test]
    fn sign_extension_gated() {
        let mut r = reader(&[0xc0], Features::mvp());
        assert_eq!(r.read_instr(), None);
        assert_eq!(
            r.errors()[0].kind,
            ErrorKind::FeatureDisabled(Feature::SignExtension)
        );

        let mut r = reader(
            &[0xc0],
            Features {
                sign_extension: true,
                ..Features::mvp()
            },
        );
        assert_eq!(r.read_instr(), Some(Instruction::I32Extend8S));
    }

    #[test]
    fn expr_with_nested_blocks() {
        // block (empty) nop end | i32.const 1 | end
        let bytes = [0x02, 0x40, 0x01, 0x0b, 0x41, 0x01, 0x0b];
        let mut r = reader(&bytes, Features::mvp());
        let expr = r.read_expr().unwrap();
        assert_eq!(
            expr,
            vec![
                Instruction::Block {
                    block_type: BlockType::Empty
                },
                Instruction::Nop,
                Instruction::End,
                Instruction::I32Const { value: 1 },
            ]
        );
    }

    #[test]
    fn else_outside_if_rejected() {
        let bytes = [0x05, 0x0b];
        let mut r = reader(&bytes, Features::mvp());
        assert_eq!(r.read_expr(), None);
        assert!(matches!(r.errors()[0].kind, ErrorKind::Validation(_)));
    }

    #[test]
    fn unknown_opcode_reported_at_offset() {
        let bytes = [0x01, 0xf5];
        let mut r = reader(&bytes, Features::mvp());
        assert_eq!(r.read_instr(), Some(Instruction::Nop));
        assert_eq!(r.read_instr(), None);
        assert_eq!(r.errors()[0].kind, ErrorKind::UnknownOpcode(0xf5));
        assert_eq!(r.errors()[0].offset, 1);
    }

    #[test]
    fn simd_gated_at_prefix_offset() {
        let bytes = [0x01, 0xfd, 0x00, 0x00, 0x00];
        let mut r = reader(&bytes, Features::mvp());
        r.read_instr();
        assert_eq!(r.read_instr(), None);
        assert_eq!(r.errors()[0].kind, ErrorKind::FeatureDisabled(Feature::Simd));
        assert_eq!(r.errors()[0].offset, 1);
    }

    #[test]
    fn shuffle_lane_range_checked() {
        let mut bytes = vec![0xfd, 0x0d];
        bytes.extend_from_slice(&[0u8; 15]);
        bytes.push(32);
        let mut r = reader(&bytes, Features::mvp().enable_simd());
        assert_eq!(r.read_instr(), None);
        assert!(matches!(
            r.errors()[0].kind,
            ErrorKind::IndexOutOfRange {
                space: "shuffle lane",
                index: 32,
                ..
            }
        ));
    }

    #[test]
    fn call_indirect_reserved_byte() {
        // call_indirect type 0, table 1 without reference-types
        let bytes = [0x11, 0x00, 0x01];
        let mut r = reader(&bytes, Features::mvp());
        assert_eq!(r.read_instr(), None);
        assert_eq!(
            r.errors()[0].kind,
            ErrorKind::FeatureDisabled(Feature::ReferenceTypes)
        );
    }

    #[test]
    fn read_minimal_module() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section: () -> ()
            0x03, 0x02, 0x01, 0x00, // function section
            0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // code section
        ];
        let module = read(&bytes, &Features::mvp()).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.functions, vec![0]);
        assert_eq!(module.code.len(), 1);
        assert!(module.code[0].body.is_empty());
    }

    #[test]
    fn bad_magic() {
        let bytes = [0x00, 0x61, 0x73, 0x00, 0x01, 0x00, 0x00, 0x00];
        let errors = read(&bytes, &Features::mvp()).unwrap_err();
        assert_eq!(errors[0].kind, ErrorKind::BadMagicOrVersion);
        assert_eq!(errors[0].offset, 0);
    }

    #[test]
    fn duplicate_section_rejected() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section again
        ];
        let errors = read(&bytes, &Features::mvp()).unwrap_err();
        assert_eq!(errors[0].kind, ErrorKind::DuplicateSection);
    }

    #[test]
    fn out_of_order_section_rejected() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x03, 0x02, 0x01, 0x00, // function section
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section after it
        ];
        let errors = read(&bytes, &Features::mvp()).unwrap_err();
        assert_eq!(errors[0].kind, ErrorKind::SectionOrder);
    }

    #[test]
    fn section_too_long_reported() {
        // type section declares 5 bytes of payload but only uses 4
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x01, 0x05, 0x01, 0x60, 0x00, 0x00, 0x00,
        ];
        let errors = read(&bytes, &Features::mvp()).unwrap_err();
        assert_eq!(errors[0].kind, ErrorKind::SectionTooLong);
    }

    #[test]
    fn custom_section_records_placement() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x00, 0x03, 0x01, b'x', 0xaa, // custom "x" before any section
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
            0x00, 0x03, 0x01, b'y', 0xbb, // custom "y" after type
        ];
        let module = read(&bytes, &Features::mvp()).unwrap();
        assert_eq!(module.customs.len(), 2);
        assert_eq!(module.customs[0].name, "x");
        assert_eq!(module.customs[0].place.anchor, CustomAnchor::First);
        assert_eq!(module.customs[1].name, "y");
        assert_eq!(module.customs[1].place.anchor, CustomAnchor::Type);
        assert_eq!(module.customs[1].place.order, PlaceOrder::After);
        assert_eq!(module.customs[1].data, vec![0xbb]);
    }

    #[test]
    fn element_segment_flag_zero() {
        // table section + element section flag 0: offset i32.const 0, items [0]
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type
            0x03, 0x02, 0x01, 0x00, // function
            0x04, 0x04, 0x01, 0x70, 0x00, 0x01, // table funcref min 1
            0x09, 0x07, 0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, 0x00, // elem
            0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b, // code
        ];
        let module = read(&bytes, &Features::mvp()).unwrap();
        assert_eq!(module.elements.len(), 1);
        let elem = &module.elements[0];
        assert_eq!(
            elem.kind,
            ElementKind::Active {
                table: 0,
                offset: vec![Instruction::I32Const { value: 0 }],
            }
        );
        assert_eq!(elem.items, ElementItems::Functions(vec![0]));
    }

    #[test]
    fn passive_element_requires_bulk_memory() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x09, 0x05, 0x01, 0x01, 0x00, 0x01, 0x00, // elem flag 1
        ];
        let errors = read(&bytes, &Features::mvp()).unwrap_err();
        assert_eq!(
            errors[0].kind,
            ErrorKind::FeatureDisabled(Feature::BulkMemory)
        );
    }

    #[test]
    fn code_count_mismatch() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, //
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, //
            0x03, 0x02, 0x01, 0x00, //
            0x0a, 0x01, 0x00, // code section declares zero bodies
        ];
        let errors = read(&bytes, &Features::mvp()).unwrap_err();
        assert!(matches!(errors[0].kind, ErrorKind::Validation(_)));
    }
}
