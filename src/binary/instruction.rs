//! WebAssembly instruction representation and encoding.
//!
//! [`Instruction`] is a single sum type over every opcode in the combined
//! feature space, with immediates stored inline. Decoding lives in the binary
//! reader (it needs feature gates and the error channel); encoding lives here
//! because it is total.

use super::atomics::AtomicOp;
use super::simd::{SimdImm, SimdOp};
use super::types::ValueType;
use crate::leb128;

/// Alignment hint and static offset carried by memory access instructions.
///
/// `align` is the log2 of the access alignment in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    pub fn new(align: u32, offset: u32) -> Self {
        MemArg { align, offset }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        leb128::write_u32(buf, self.align);
        leb128::write_u32(buf, self.offset);
    }
}

/// The result shape of a structured control instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// No parameters or results.
    Empty,
    /// A single result value.
    Value(ValueType),
    /// A function type index (multi-value).
    Func(u32),
}

impl BlockType {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            BlockType::Empty => buf.push(super::encoding::BLOCK_TYPE_EMPTY),
            BlockType::Value(vt) => buf.push(vt.to_byte()),
            // Type indices are encoded as non-negative signed LEB128.
            BlockType::Func(idx) => leb128::write_s64(buf, i64::from(*idx)),
        }
    }
}

/// A decoded instruction with its immediates.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Control
    Unreachable,
    Nop,
    Block { block_type: BlockType },
    Loop { block_type: BlockType },
    If { block_type: BlockType },
    Else,
    End,
    Br { label_idx: u32 },
    BrIf { label_idx: u32 },
    BrTable { labels: Vec<u32>, default: u32 },
    Return,
    Call { func_idx: u32 },
    CallIndirect { type_idx: u32, table_idx: u32 },
    ReturnCall { func_idx: u32 },
    ReturnCallIndirect { type_idx: u32, table_idx: u32 },

    // Exception handling
    Try { block_type: BlockType },
    Catch { tag_idx: u32 },
    CatchAll,
    Throw { tag_idx: u32 },
    Rethrow { depth: u32 },
    Delegate { depth: u32 },

    // Reference
    RefNull { ref_type: ValueType },
    RefIsNull,
    RefFunc { func_idx: u32 },

    // Parametric
    Drop,
    Select,
    SelectTyped { val_types: Vec<ValueType> },

    // Variable
    LocalGet { local_idx: u32 },
    LocalSet { local_idx: u32 },
    LocalTee { local_idx: u32 },
    GlobalGet { global_idx: u32 },
    GlobalSet { global_idx: u32 },

    // Table
    TableGet { table_idx: u32 },
    TableSet { table_idx: u32 },
    TableInit { elem_idx: u32, table_idx: u32 },
    ElemDrop { elem_idx: u32 },
    TableCopy { dst_table: u32, src_table: u32 },
    TableGrow { table_idx: u32 },
    TableSize { table_idx: u32 },
    TableFill { table_idx: u32 },

    // Memory
    I32Load { memarg: MemArg },
    I64Load { memarg: MemArg },
    F32Load { memarg: MemArg },
    F64Load { memarg: MemArg },
    I32Load8S { memarg: MemArg },
    I32Load8U { memarg: MemArg },
    I32Load16S { memarg: MemArg },
    I32Load16U { memarg: MemArg },
    I64Load8S { memarg: MemArg },
    I64Load8U { memarg: MemArg },
    I64Load16S { memarg: MemArg },
    I64Load16U { memarg: MemArg },
    I64Load32S { memarg: MemArg },
    I64Load32U { memarg: MemArg },
    I32Store { memarg: MemArg },
    I64Store { memarg: MemArg },
    F32Store { memarg: MemArg },
    F64Store { memarg: MemArg },
    I32Store8 { memarg: MemArg },
    I32Store16 { memarg: MemArg },
    I64Store8 { memarg: MemArg },
    I64Store16 { memarg: MemArg },
    I64Store32 { memarg: MemArg },
    MemorySize { mem_idx: u32 },
    MemoryGrow { mem_idx: u32 },
    MemoryInit { data_idx: u32, mem_idx: u32 },
    DataDrop { data_idx: u32 },
    MemoryCopy { dst_mem: u32, src_mem: u32 },
    MemoryFill { mem_idx: u32 },

    // Constants
    I32Const { value: i32 },
    I64Const { value: i64 },
    F32Const { value: f32 },
    F64Const { value: f64 },

    // i32 comparison
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    // i64 comparison
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    // f32 comparison
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,

    // f64 comparison
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    // i32 arithmetic
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    // i64 arithmetic
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // f32 arithmetic
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    // f64 arithmetic
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // Conversions
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    // Sign extension
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // Saturating truncation (0xFC prefix)
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,

    // SIMD (0xFD prefix)
    Simd { op: SimdOp, imm: SimdImm },

    // Atomics (0xFE prefix)
    Atomic { op: AtomicOp, memarg: Option<MemArg> },
}

// The single-byte, immediate-free portion of the opcode space. One table
// drives byte decoding, byte encoding, and the text-format mnemonic lookup.
macro_rules! plain_ops {
    ($( $variant:ident = $code:literal, $mnemonic:literal; )*) => {
        impl Instruction {
            /// The wire byte for a single-byte immediate-free instruction.
            pub(crate) fn plain_opcode(&self) -> Option<u8> {
                match self {
                    $( Instruction::$variant => Some($code), )*
                    _ => None,
                }
            }

            /// Looks up a single-byte immediate-free instruction.
            pub(crate) fn plain_from_opcode(byte: u8) -> Option<Instruction> {
                match byte {
                    $( $code => Some(Instruction::$variant), )*
                    _ => None,
                }
            }

            /// Mnemonic table for the text parser.
            pub(crate) fn plain_mnemonics() -> &'static [(&'static str, Instruction)] {
                static TABLE: &[(&str, Instruction)] = &[
                    $( ($mnemonic, Instruction::$variant), )*
                ];
                TABLE
            }
        }
    };
}

plain_ops! {
    Unreachable = 0x00, "unreachable";
    Nop = 0x01, "nop";
    Else = 0x05, "else";
    CatchAll = 0x19, "catch_all";
    End = 0x0b, "end";
    Return = 0x0f, "return";
    Drop = 0x1a, "drop";
    Select = 0x1b, "select";
    RefIsNull = 0xd1, "ref.is_null";
    I32Eqz = 0x45, "i32.eqz";
    I32Eq = 0x46, "i32.eq";
    I32Ne = 0x47, "i32.ne";
    I32LtS = 0x48, "i32.lt_s";
    I32LtU = 0x49, "i32.lt_u";
    I32GtS = 0x4a, "i32.gt_s";
    I32GtU = 0x4b, "i32.gt_u";
    I32LeS = 0x4c, "i32.le_s";
    I32LeU = 0x4d, "i32.le_u";
    I32GeS = 0x4e, "i32.ge_s";
    I32GeU = 0x4f, "i32.ge_u";
    I64Eqz = 0x50, "i64.eqz";
    I64Eq = 0x51, "i64.eq";
    I64Ne = 0x52, "i64.ne";
    I64LtS = 0x53, "i64.lt_s";
    I64LtU = 0x54, "i64.lt_u";
    I64GtS = 0x55, "i64.gt_s";
    I64GtU = 0x56, "i64.gt_u";
    I64LeS = 0x57, "i64.le_s";
    I64LeU = 0x58, "i64.le_u";
    I64GeS = 0x59, "i64.ge_s";
    I64GeU = 0x5a, "i64.ge_u";
    F32Eq = 0x5b, "f32.eq";
    F32Ne = 0x5c, "f32.ne";
    F32Lt = 0x5d, "f32.lt";
    F32Gt = 0x5e, "f32.gt";
    F32Le = 0x5f, "f32.le";
    F32Ge = 0x60, "f32.ge";
    F64Eq = 0x61, "f64.eq";
    F64Ne = 0x62, "f64.ne";
    F64Lt = 0x63, "f64.lt";
    F64Gt = 0x64, "f64.gt";
    F64Le = 0x65, "f64.le";
    F64Ge = 0x66, "f64.ge";
    I32Clz = 0x67, "i32.clz";
    I32Ctz = 0x68, "i32.ctz";
    I32Popcnt = 0x69, "i32.popcnt";
    I32Add = 0x6a, "i32.add";
    I32Sub = 0x6b, "i32.sub";
    I32Mul = 0x6c, "i32.mul";
    I32DivS = 0x6d, "i32.div_s";
    I32DivU = 0x6e, "i32.div_u";
    I32RemS = 0x6f, "i32.rem_s";
    I32RemU = 0x70, "i32.rem_u";
    I32And = 0x71, "i32.and";
    I32Or = 0x72, "i32.or";
    I32Xor = 0x73, "i32.xor";
    I32Shl = 0x74, "i32.shl";
    I32ShrS = 0x75, "i32.shr_s";
    I32ShrU = 0x76, "i32.shr_u";
    I32Rotl = 0x77, "i32.rotl";
    I32Rotr = 0x78, "i32.rotr";
    I64Clz = 0x79, "i64.clz";
    I64Ctz = 0x7a, "i64.ctz";
    I64Popcnt = 0x7b, "i64.popcnt";
    I64Add = 0x7c, "i64.add";
    I64Sub = 0x7d, "i64.sub";
    I64Mul = 0x7e, "i64.mul";
    I64DivS = 0x7f, "i64.div_s";
    I64DivU = 0x80, "i64.div_u";
    I64RemS = 0x81, "i64.rem_s";
    I64RemU = 0x82, "i64.rem_u";
    I64And = 0x83, "i64.and";
    I64Or = 0x84, "i64.or";
    I64Xor = 0x85, "i64.xor";
    I64Shl = 0x86, "i64.shl";
    I64ShrS = 0x87, "i64.shr_s";
    I64ShrU = 0x88, "i64.shr_u";
    I64Rotl = 0x89, "i64.rotl";
    I64Rotr = 0x8a, "i64.rotr";
    F32Abs = 0x8b, "f32.abs";
    F32Neg = 0x8c, "f32.neg";
    F32Ceil = 0x8d, "f32.ceil";
    F32Floor = 0x8e, "f32.floor";
    F32Trunc = 0x8f, "f32.trunc";
    F32Nearest = 0x90, "f32.nearest";
    F32Sqrt = 0x91, "f32.sqrt";
    F32Add = 0x92, "f32.add";
    F32Sub = 0x93, "f32.sub";
    F32Mul = 0x94, "f32.mul";
    F32Div = 0x95, "f32.div";
    F32Min = 0x96, "f32.min";
    F32Max = 0x97, "f32.max";
    F32Copysign = 0x98, "f32.copysign";
    F64Abs = 0x99, "f64.abs";
    F64Neg = 0x9a, "f64.neg";
    F64Ceil = 0x9b, "f64.ceil";
    F64Floor = 0x9c, "f64.floor";
    F64Trunc = 0x9d, "f64.trunc";
    F64Nearest = 0x9e, "f64.nearest";
    F64Sqrt = 0x9f, "f64.sqrt";
    F64Add = 0xa0, "f64.add";
    F64Sub = 0xa1, "f64.sub";
    F64Mul = 0xa2, "f64.mul";
    F64Div = 0xa3, "f64.div";
    F64Min = 0xa4, "f64.min";
    F64Max = 0xa5, "f64.max";
    F64Copysign = 0xa6, "f64.copysign";
    I32WrapI64 = 0xa7, "i32.wrap_i64";
    I32TruncF32S = 0xa8, "i32.trunc_f32_s";
    I32TruncF32U = 0xa9, "i32.trunc_f32_u";
    I32TruncF64S = 0xaa, "i32.trunc_f64_s";
    I32TruncF64U = 0xab, "i32.trunc_f64_u";
    I64ExtendI32S = 0xac, "i64.extend_i32_s";
    I64ExtendI32U = 0xad, "i64.extend_i32_u";
    I64TruncF32S = 0xae, "i64.trunc_f32_s";
    I64TruncF32U = 0xaf, "i64.trunc_f32_u";
    I64TruncF64S = 0xb0, "i64.trunc_f64_s";
    I64TruncF64U = 0xb1, "i64.trunc_f64_u";
    F32ConvertI32S = 0xb2, "f32.convert_i32_s";
    F32ConvertI32U = 0xb3, "f32.convert_i32_u";
    F32ConvertI64S = 0xb4, "f32.convert_i64_s";
    F32ConvertI64U = 0xb5, "f32.convert_i64_u";
    F32DemoteF64 = 0xb6, "f32.demote_f64";
    F64ConvertI32S = 0xb7, "f64.convert_i32_s";
    F64ConvertI32U = 0xb8, "f64.convert_i32_u";
    F64ConvertI64S = 0xb9, "f64.convert_i64_s";
    F64ConvertI64U = 0xba, "f64.convert_i64_u";
    F64PromoteF32 = 0xbb, "f64.promote_f32";
    I32ReinterpretF32 = 0xbc, "i32.reinterpret_f32";
    I64ReinterpretF64 = 0xbd, "i64.reinterpret_f64";
    F32ReinterpretI32 = 0xbe, "f32.reinterpret_i32";
    F64ReinterpretI64 = 0xbf, "f64.reinterpret_i64";
    I32Extend8S = 0xc0, "i32.extend8_s";
    I32Extend16S = 0xc1, "i32.extend16_s";
    I64Extend8S = 0xc2, "i64.extend8_s";
    I64Extend16S = 0xc3, "i64.extend16_s";
    I64Extend32S = 0xc4, "i64.extend32_s";
}

// Saturating truncations: immediate-free but behind the 0xFC prefix.
macro_rules! sat_trunc_ops {
    ($( $variant:ident = $code:literal, $mnemonic:literal; )*) => {
        impl Instruction {
            pub(crate) fn sat_trunc_subopcode(&self) -> Option<u32> {
                match self {
                    $( Instruction::$variant => Some($code), )*
                    _ => None,
                }
            }

            pub(crate) fn sat_trunc_from_subopcode(code: u32) -> Option<Instruction> {
                match code {
                    $( $code => Some(Instruction::$variant), )*
                    _ => None,
                }
            }

            pub(crate) fn sat_trunc_mnemonics() -> &'static [(&'static str, Instruction)] {
                static TABLE: &[(&str, Instruction)] = &[
                    $( ($mnemonic, Instruction::$variant), )*
                ];
                TABLE
            }
        }
    };
}

sat_trunc_ops! {
    I32TruncSatF32S = 0x00, "i32.trunc_sat_f32_s";
    I32TruncSatF32U = 0x01, "i32.trunc_sat_f32_u";
    I32TruncSatF64S = 0x02, "i32.trunc_sat_f64_s";
    I32TruncSatF64U = 0x03, "i32.trunc_sat_f64_u";
    I64TruncSatF32S = 0x04, "i64.trunc_sat_f32_s";
    I64TruncSatF32U = 0x05, "i64.trunc_sat_f32_u";
    I64TruncSatF64S = 0x06, "i64.trunc_sat_f64_s";
    I64TruncSatF64U = 0x07, "i64.trunc_sat_f64_u";
}

impl Instruction {
    /// Appends this instruction's binary encoding to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        use Instruction::*;

        if let Some(code) = self.sat_trunc_subopcode() {
            buf.push(super::encoding::PREFIX_MISC);
            leb128::write_u32(buf, code);
            return;
        }

        match self {
            Block { block_type } => {
                buf.push(0x02);
                block_type.encode(buf);
            }
            Loop { block_type } => {
                buf.push(0x03);
                block_type.encode(buf);
            }
            If { block_type } => {
                buf.push(0x04);
                block_type.encode(buf);
            }
            Try { block_type } => {
                buf.push(0x06);
                block_type.encode(buf);
            }
            Catch { tag_idx } => {
                buf.push(0x07);
                leb128::write_u32(buf, *tag_idx);
            }
            Throw { tag_idx } => {
                buf.push(0x08);
                leb128::write_u32(buf, *tag_idx);
            }
            Rethrow { depth } => {
                buf.push(0x09);
                leb128::write_u32(buf, *depth);
            }
            Delegate { depth } => {
                buf.push(0x18);
                leb128::write_u32(buf, *depth);
            }
            Br { label_idx } => {
                buf.push(0x0c);
                leb128::write_u32(buf, *label_idx);
            }
            BrIf { label_idx } => {
                buf.push(0x0d);
                leb128::write_u32(buf, *label_idx);
            }
            BrTable { labels, default } => {
                buf.push(0x0e);
                leb128::write_u32(buf, labels.len() as u32);
                for label in labels {
                    leb128::write_u32(buf, *label);
                }
                leb128::write_u32(buf, *default);
            }
            Call { func_idx } => {
                buf.push(0x10);
                leb128::write_u32(buf, *func_idx);
            }
            CallIndirect { type_idx, table_idx } => {
                buf.push(0x11);
                leb128::write_u32(buf, *type_idx);
                leb128::write_u32(buf, *table_idx);
            }
            ReturnCall { func_idx } => {
                buf.push(0x12);
                leb128::write_u32(buf, *func_idx);
            }
            ReturnCallIndirect { type_idx, table_idx } => {
                buf.push(0x13);
                leb128::write_u32(buf, *type_idx);
                leb128::write_u32(buf, *table_idx);
            }
            RefNull { ref_type } => {
                buf.push(0xd0);
                buf.push(ref_type.to_byte());
            }
            RefFunc { func_idx } => {
                buf.push(0xd2);
                leb128::write_u32(buf, *func_idx);
            }
            SelectTyped { val_types } => {
                buf.push(0x1c);
                leb128::write_u32(buf, val_types.len() as u32);
                for vt in val_types {
                    buf.push(vt.to_byte());
                }
            }
            LocalGet { local_idx } => {
                buf.push(0x20);
                leb128::write_u32(buf, *local_idx);
            }
            LocalSet { local_idx } => {
                buf.push(0x21);
                leb128::write_u32(buf, *local_idx);
            }
            LocalTee { local_idx } => {
                buf.push(0x22);
                leb128::write_u32(buf, *local_idx);
            }
            GlobalGet { global_idx } => {
                buf.push(0x23);
                leb128::write_u32(buf, *global_idx);
            }
            GlobalSet { global_idx } => {
                buf.push(0x24);
                leb128::write_u32(buf, *global_idx);
            }
            TableGet { table_idx } => {
                buf.push(0x25);
                leb128::write_u32(buf, *table_idx);
            }
            TableSet { table_idx } => {
                buf.push(0x26);
                leb128::write_u32(buf, *table_idx);
            }
            I32Load { memarg } => encode_memory_op(buf, 0x28, memarg),
            I64Load { memarg } => encode_memory_op(buf, 0x29, memarg),
            F32Load { memarg } => encode_memory_op(buf, 0x2a, memarg),
            F64Load { memarg } => encode_memory_op(buf, 0x2b, memarg),
            I32Load8S { memarg } => encode_memory_op(buf, 0x2c, memarg),
            I32Load8U { memarg } => encode_memory_op(buf, 0x2d, memarg),
            I32Load16S { memarg } => encode_memory_op(buf, 0x2e, memarg),
            I32Load16U { memarg } => encode_memory_op(buf, 0x2f, memarg),
            I64Load8S { memarg } => encode_memory_op(buf, 0x30, memarg),
            I64Load8U { memarg } => encode_memory_op(buf, 0x31, memarg),
            I64Load16S { memarg } => encode_memory_op(buf, 0x32, memarg),
            I64Load16U { memarg } => encode_memory_op(buf, 0x33, memarg),
            I64Load32S { memarg } => encode_memory_op(buf, 0x34, memarg),
            I64Load32U { memarg } => encode_memory_op(buf, 0x35, memarg),
            I32Store { memarg } => encode_memory_op(buf, 0x36, memarg),
            I64Store { memarg } => encode_memory_op(buf, 0x37, memarg),
            F32Store { memarg } => encode_memory_op(buf, 0x38, memarg),
            F64Store { memarg } => encode_memory_op(buf, 0x39, memarg),
            I32Store8 { memarg } => encode_memory_op(buf, 0x3a, memarg),
            I32Store16 { memarg } => encode_memory_op(buf, 0x3b, memarg),
            I64Store8 { memarg } => encode_memory_op(buf, 0x3c, memarg),
            I64Store16 { memarg } => encode_memory_op(buf, 0x3d, memarg),
            I64Store32 { memarg } => encode_memory_op(buf, 0x3e, memarg),
            // The index doubles as the reserved zero byte for memory 0.
            MemorySize { mem_idx } => {
                buf.push(0x3f);
                leb128::write_u32(buf, *mem_idx);
            }
            MemoryGrow { mem_idx } => {
                buf.push(0x40);
                leb128::write_u32(buf, *mem_idx);
            }
            I32Const { value } => {
                buf.push(0x41);
                leb128::write_s32(buf, *value);
            }
            I64Const { value } => {
                buf.push(0x42);
                leb128::write_s64(buf, *value);
            }
            F32Const { value } => {
                buf.push(0x43);
                leb128::write_f32(buf, *value);
            }
            F64Const { value } => {
                buf.push(0x44);
                leb128::write_f64(buf, *value);
            }
            MemoryInit { data_idx, mem_idx } => {
                encode_misc(buf, 0x08);
                leb128::write_u32(buf, *data_idx);
                leb128::write_u32(buf, *mem_idx);
            }
            DataDrop { data_idx } => {
                encode_misc(buf, 0x09);
                leb128::write_u32(buf, *data_idx);
            }
            MemoryCopy { dst_mem, src_mem } => {
                encode_misc(buf, 0x0a);
                leb128::write_u32(buf, *dst_mem);
                leb128::write_u32(buf, *src_mem);
            }
            MemoryFill { mem_idx } => {
                encode_misc(buf, 0x0b);
                leb128::write_u32(buf, *mem_idx);
            }
            TableInit { elem_idx, table_idx } => {
                encode_misc(buf, 0x0c);
                leb128::write_u32(buf, *elem_idx);
                leb128::write_u32(buf, *table_idx);
            }
            ElemDrop { elem_idx } => {
                encode_misc(buf, 0x0d);
                leb128::write_u32(buf, *elem_idx);
            }
            TableCopy { dst_table, src_table } => {
                encode_misc(buf, 0x0e);
                leb128::write_u32(buf, *dst_table);
                leb128::write_u32(buf, *src_table);
            }
            TableGrow { table_idx } => {
                encode_misc(buf, 0x0f);
                leb128::write_u32(buf, *table_idx);
            }
            TableSize { table_idx } => {
                encode_misc(buf, 0x10);
                leb128::write_u32(buf, *table_idx);
            }
            TableFill { table_idx } => {
                encode_misc(buf, 0x11);
                leb128::write_u32(buf, *table_idx);
            }
            Simd { op, imm } => {
                buf.push(super::encoding::PREFIX_SIMD);
                leb128::write_u32(buf, op.code());
                match imm {
                    SimdImm::None => {}
                    SimdImm::MemArg(memarg) => memarg.encode(buf),
                    SimdImm::MemArgLane { memarg, lane } => {
                        memarg.encode(buf);
                        buf.push(*lane);
                    }
                    SimdImm::Lane(lane) => buf.push(*lane),
                    SimdImm::Bytes(bytes) => buf.extend_from_slice(bytes),
                    SimdImm::Lanes(lanes) => buf.extend_from_slice(lanes),
                }
            }
            Atomic { op, memarg } => {
                buf.push(super::encoding::PREFIX_ATOMIC);
                leb128::write_u32(buf, op.code());
                match memarg {
                    Some(memarg) => memarg.encode(buf),
                    // atomic.fence carries one reserved byte.
                    None => buf.push(0x00),
                }
            }
            other => {
                let code = other
                    .plain_opcode()
                    .unwrap_or_else(|| panic!("no encoding for {:?}", other));
                buf.push(code);
            }
        }
    }

    /// Whether this instruction is allowed in constant expressions.
    pub fn is_const(&self) -> bool {
        matches!(
            self,
            Instruction::I32Const { .. }
                | Instruction::I64Const { .. }
                | Instruction::F32Const { .. }
                | Instruction::F64Const { .. }
                | Instruction::GlobalGet { .. }
                | Instruction::RefNull { .. }
                | Instruction::RefFunc { .. }
                | Instruction::Simd {
                    op: SimdOp::V128Const,
                    ..
                }
        )
    }
}

fn encode_memory_op(buf: &mut Vec<u8>, opcode: u8, memarg: &MemArg) {
    buf.push(opcode);
    memarg.encode(buf);
}

fn encode_misc(buf: &mut Vec<u8>, subopcode: u32) {
    buf.push(super::encoding::PREFIX_MISC);
    leb128::write_u32(buf, subopcode);
}

/// Looks up an immediate-free instruction (plain or 0xFC saturating
/// truncation) by its text-format mnemonic.
pub(crate) fn plain_by_mnemonic(name: &str) -> Option<Instruction> {
    use once_cell::sync::OnceCell;
    use std::collections::HashMap;

    static MAP: OnceCell<HashMap<&'static str, Instruction>> = OnceCell::new();
    MAP.get_or_init(|| {
        Instruction::plain_mnemonics()
            .iter()
            .chain(Instruction::sat_trunc_mnemonics())
            .map(|(name, instr)| (*name, instr.clone()))
            .collect()
    })
    .get(name)
    .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_table_roundtrips() {
        for (_, instr) in Instruction::plain_mnemonics() {
            let code = instr.plain_opcode().unwrap();
            assert_eq!(Instruction::plain_from_opcode(code).as_ref(), Some(instr));
        }
    }

    #[test]
    fn plain_encoding_is_single_byte() {
        let mut buf = Vec::new();
        Instruction::I32Add.encode(&mut buf);
        assert_eq!(buf, vec![0x6a]);
    }

    #[test]
    fn sat_trunc_encodes_with_prefix() {
        let mut buf = Vec::new();
        Instruction::I64TruncSatF64U.encode(&mut buf);
        assert_eq!(buf, vec![0xfc, 0x07]);
    }

    #[test]
    fn const_encodings() {
        let mut buf = Vec::new();
        Instruction::I32Const { value: -1 }.encode(&mut buf);
        assert_eq!(buf, vec![0x41, 0x7f]);

        let mut buf = Vec::new();
        Instruction::I64Const { value: 624485 }.encode(&mut buf);
        assert_eq!(buf, vec![0x42, 0xe5, 0x8e, 0x26]);

        let mut buf = Vec::new();
        Instruction::F32Const { value: 6.283_185_5 }.encode(&mut buf);
        assert_eq!(buf, vec![0x43, 219, 15, 201, 64]);
    }

    #[test]
    fn br_table_encoding() {
        let mut buf = Vec::new();
        Instruction::BrTable {
            labels: vec![1, 2],
            default: 0,
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0x0e, 0x02, 0x01, 0x02, 0x00]);
    }

    #[test]
    fn memory_size_reserved_byte() {
        let mut buf = Vec::new();
        Instruction::MemorySize { mem_idx: 0 }.encode(&mut buf);
        assert_eq!(buf, vec![0x3f, 0x00]);
    }

    #[test]
    fn block_type_encodings() {
        let mut buf = Vec::new();
        BlockType::Empty.encode(&mut buf);
        BlockType::Value(ValueType::I32).encode(&mut buf);
        BlockType::Func(3).encode(&mut buf);
        assert_eq!(buf, vec![0x40, 0x7f, 0x03]);
    }

    #[test]
    fn simd_const_encoding() {
        let mut buf = Vec::new();
        Instruction::Simd {
            op: SimdOp::V128Const,
            imm: SimdImm::Bytes([1; 16]),
        }
        .encode(&mut buf);
        assert_eq!(buf[0], 0xfd);
        assert_eq!(buf[1], 0x0c);
        assert_eq!(buf.len(), 18);
    }

    #[test]
    fn atomic_fence_reserved_byte() {
        let mut buf = Vec::new();
        Instruction::Atomic {
            op: AtomicOp::AtomicFence,
            memarg: None,
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0xfe, 0x03, 0x00]);
    }

    #[test]
    fn mnemonic_lookup_covers_prefixed() {
        assert_eq!(plain_by_mnemonic("i32.add"), Some(Instruction::I32Add));
        assert_eq!(
            plain_by_mnemonic("i32.trunc_sat_f32_s"),
            Some(Instruction::I32TruncSatF32S)
        );
        assert_eq!(plain_by_mnemonic("bogus.op"), None);
    }

    #[test]
    fn is_const_subgrammar() {
        assert!(Instruction::I32Const { value: 0 }.is_const());
        assert!(Instruction::GlobalGet { global_idx: 0 }.is_const());
        assert!(Instruction::RefFunc { func_idx: 0 }.is_const());
        assert!(!Instruction::I32Add.is_const());
        assert!(!Instruction::LocalGet { local_idx: 0 }.is_const());
    }
}
