//! The 0xFD-prefixed SIMD instruction space.
//!
//! One declarative table drives everything: sub-opcode assignment, mnemonic
//! spelling, immediate kind, and lane count for the lane-indexed operations.
//! The decoder, encoder and text parser all read from it, so they cannot
//! drift apart.

use super::instruction::MemArg;
use once_cell::sync::OnceCell;
use std::collections::HashMap;

/// The immediate payload shapes used by SIMD instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdImmKind {
    /// No immediate.
    None,
    /// Alignment and offset.
    MemArg,
    /// Alignment, offset, and a lane index.
    MemArgLane,
    /// A lane index.
    Lane,
    /// 16 literal bytes (`v128.const`).
    Bytes,
    /// 16 lane selectors, each in `0..32` (`i8x16.shuffle`).
    Lanes,
}

/// A decoded SIMD immediate.
#[derive(Debug, Clone, PartialEq)]
pub enum SimdImm {
    None,
    MemArg(MemArg),
    MemArgLane { memarg: MemArg, lane: u8 },
    Lane(u8),
    Bytes([u8; 16]),
    Lanes([u8; 16]),
}

macro_rules! simd_ops {
    ($( $name:ident = $code:literal, $mnemonic:literal, $imm:ident, $lanes:literal; )*) => {
        /// A SIMD operation, one per 0xFD sub-opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SimdOp {
            $( $name, )*
        }

        impl SimdOp {
            /// Every defined SIMD operation, in sub-opcode order.
            pub const ALL: &'static [SimdOp] = &[ $( SimdOp::$name, )* ];

            /// Looks up an operation by its sub-opcode.
            pub fn from_code(code: u32) -> Option<SimdOp> {
                match code {
                    $( $code => Some(SimdOp::$name), )*
                    _ => None,
                }
            }

            /// The sub-opcode following the 0xFD prefix.
            pub fn code(self) -> u32 {
                match self {
                    $( SimdOp::$name => $code, )*
                }
            }

            /// The text-format mnemonic.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( SimdOp::$name => $mnemonic, )*
                }
            }

            /// The shape of this operation's immediate.
            pub fn imm_kind(self) -> SimdImmKind {
                match self {
                    $( SimdOp::$name => SimdImmKind::$imm, )*
                }
            }

            /// Number of addressable lanes; zero for non-lane operations.
            pub fn lane_count(self) -> u8 {
                match self {
                    $( SimdOp::$name => $lanes, )*
                }
            }
        }
    };
}

simd_ops! {
    V128Load = 0x00, "v128.load", MemArg, 0;
    V128Load8x8S = 0x01, "v128.load8x8_s", MemArg, 0;
    V128Load8x8U = 0x02, "v128.load8x8_u", MemArg, 0;
    V128Load16x4S = 0x03, "v128.load16x4_s", MemArg, 0;
    V128Load16x4U = 0x04, "v128.load16x4_u", MemArg, 0;
    V128Load32x2S = 0x05, "v128.load32x2_s", MemArg, 0;
    V128Load32x2U = 0x06, "v128.load32x2_u", MemArg, 0;
    V128Load8Splat = 0x07, "v128.load8_splat", MemArg, 0;
    V128Load16Splat = 0x08, "v128.load16_splat", MemArg, 0;
    V128Load32Splat = 0x09, "v128.load32_splat", MemArg, 0;
    V128Load64Splat = 0x0a, "v128.load64_splat", MemArg, 0;
    V128Store = 0x0b, "v128.store", MemArg, 0;
    V128Const = 0x0c, "v128.const", Bytes, 0;
    I8x16Shuffle = 0x0d, "i8x16.shuffle", Lanes, 0;
    I8x16Swizzle = 0x0e, "i8x16.swizzle", None, 0;
    I8x16Splat = 0x0f, "i8x16.splat", None, 0;
    I16x8Splat = 0x10, "i16x8.splat", None, 0;
    I32x4Splat = 0x11, "i32x4.splat", None, 0;
    I64x2Splat = 0x12, "i64x2.splat", None, 0;
    F32x4Splat = 0x13, "f32x4.splat", None, 0;
    F64x2Splat = 0x14, "f64x2.splat", None, 0;
    I8x16ExtractLaneS = 0x15, "i8x16.extract_lane_s", Lane, 16;
    I8x16ExtractLaneU = 0x16, "i8x16.extract_lane_u", Lane, 16;
    I8x16ReplaceLane = 0x17, "i8x16.replace_lane", Lane, 16;
    I16x8ExtractLaneS = 0x18, "i16x8.extract_lane_s", Lane, 8;
    I16x8ExtractLaneU = 0x19, "i16x8.extract_lane_u", Lane, 8;
    I16x8ReplaceLane = 0x1a, "i16x8.replace_lane", Lane, 8;
    I32x4ExtractLane = 0x1b, "i32x4.extract_lane", Lane, 4;
    I32x4ReplaceLane = 0x1c, "i32x4.replace_lane", Lane, 4;
    I64x2ExtractLane = 0x1d, "i64x2.extract_lane", Lane, 2;
    I64x2ReplaceLane = 0x1e, "i64x2.replace_lane", Lane, 2;
    F32x4ExtractLane = 0x1f, "f32x4.extract_lane", Lane, 4;
    F32x4ReplaceLane = 0x20, "f32x4.replace_lane", Lane, 4;
    F64x2ExtractLane = 0x21, "f64x2.extract_lane", Lane, 2;
    F64x2ReplaceLane = 0x22, "f64x2.replace_lane", Lane, 2;
    I8x16Eq = 0x23, "i8x16.eq", None, 0;
    I8x16Ne = 0x24, "i8x16.ne", None, 0;
    I8x16LtS = 0x25, "i8x16.lt_s", None, 0;
    I8x16LtU = 0x26, "i8x16.lt_u", None, 0;
    I8x16GtS = 0x27, "i8x16.gt_s", None, 0;
    I8x16GtU = 0x28, "i8x16.gt_u", None, 0;
    I8x16LeS = 0x29, "i8x16.le_s", None, 0;
    I8x16LeU = 0x2a, "i8x16.le_u", None, 0;
    I8x16GeS = 0x2b, "i8x16.ge_s", None, 0;
    I8x16GeU = 0x2c, "i8x16.ge_u", None, 0;
    I16x8Eq = 0x2d, "i16x8.eq", None, 0;
    I16x8Ne = 0x2e, "i16x8.ne", None, 0;
    I16x8LtS = 0x2f, "i16x8.lt_s", None, 0;
    I16x8LtU = 0x30, "i16x8.lt_u", None, 0;
    I16x8GtS = 0x31, "i16x8.gt_s", None, 0;
    I16x8GtU = 0x32, "i16x8.gt_u", None, 0;
    I16x8LeS = 0x33, "i16x8.le_s", None, 0;
    I16x8LeU = 0x34, "i16x8.le_u", None, 0;
    I16x8GeS = 0x35, "i16x8.ge_s", None, 0;
    I16x8GeU = 0x36, "i16x8.ge_u", None, 0;
    I32x4Eq = 0x37, "i32x4.eq", None, 0;
    I32x4Ne = 0x38, "i32x4.ne", None, 0;
    I32x4LtS = 0x39, "i32x4.lt_s", None, 0;
    I32x4LtU = 0x3a, "i32x4.lt_u", None, 0;
    I32x4GtS = 0x3b, "i32x4.gt_s", None, 0;
    I32x4GtU = 0x3c, "i32x4.gt_u", None, 0;
    I32x4LeS = 0x3d, "i32x4.le_s", None, 0;
    I32x4LeU = 0x3e, "i32x4.le_u", None, 0;
    I32x4GeS = 0x3f, "i32x4.ge_s", None, 0;
    I32x4GeU = 0x40, "i32x4.ge_u", None, 0;
    F32x4Eq = 0x41, "f32x4.eq", None, 0;
    F32x4Ne = 0x42, "f32x4.ne", None, 0;
    F32x4Lt = 0x43, "f32x4.lt", None, 0;
    F32x4Gt = 0x44, "f32x4.gt", None, 0;
    F32x4Le = 0x45, "f32x4.le", None, 0;
    F32x4Ge = 0x46, "f32x4.ge", None, 0;
    F64x2Eq = 0x47, "f64x2.eq", None, 0;
    F64x2Ne = 0x48, "f64x2.ne", None, 0;
    F64x2Lt = 0x49, "f64x2.lt", None, 0;
    F64x2Gt = 0x4a, "f64x2.gt", None, 0;
    F64x2Le = 0x4b, "f64x2.le", None, 0;
    F64x2Ge = 0x4c, "f64x2.ge", None, 0;
    V128Not = 0x4d, "v128.not", None, 0;
    V128And = 0x4e, "v128.and", None, 0;
    V128Andnot = 0x4f, "v128.andnot", None, 0;
    V128Or = 0x50, "v128.or", None, 0;
    V128Xor = 0x51, "v128.xor", None, 0;
    V128Bitselect = 0x52, "v128.bitselect", None, 0;
    V128AnyTrue = 0x53, "v128.any_true", None, 0;
    V128Load8Lane = 0x54, "v128.load8_lane", MemArgLane, 16;
    V128Load16Lane = 0x55, "v128.load16_lane", MemArgLane, 8;
    V128Load32Lane = 0x56, "v128.load32_lane", MemArgLane, 4;
    V128Load64Lane = 0x57, "v128.load64_lane", MemArgLane, 2;
    V128Store8Lane = 0x58, "v128.store8_lane", MemArgLane, 16;
    V128Store16Lane = 0x59, "v128.store16_lane", MemArgLane, 8;
    V128Store32Lane = 0x5a, "v128.store32_lane", MemArgLane, 4;
    V128Store64Lane = 0x5b, "v128.store64_lane", MemArgLane, 2;
    V128Load32Zero = 0x5c, "v128.load32_zero", MemArg, 0;
    V128Load64Zero = 0x5d, "v128.load64_zero", MemArg, 0;
    F32x4DemoteF64x2Zero = 0x5e, "f32x4.demote_f64x2_zero", None, 0;
    F64x2PromoteLowF32x4 = 0x5f, "f64x2.promote_low_f32x4", None, 0;
    I8x16Abs = 0x60, "i8x16.abs", None, 0;
    I8x16Neg = 0x61, "i8x16.neg", None, 0;
    I8x16Popcnt = 0x62, "i8x16.popcnt", None, 0;
    I8x16AllTrue = 0x63, "i8x16.all_true", None, 0;
    I8x16Bitmask = 0x64, "i8x16.bitmask", None, 0;
    I8x16NarrowI16x8S = 0x65, "i8x16.narrow_i16x8_s", None, 0;
    I8x16NarrowI16x8U = 0x66, "i8x16.narrow_i16x8_u", None, 0;
    F32x4Ceil = 0x67, "f32x4.ceil", None, 0;
    F32x4Floor = 0x68, "f32x4.floor", None, 0;
    F32x4Trunc = 0x69, "f32x4.trunc", None, 0;
    F32x4Nearest = 0x6a, "f32x4.nearest", None, 0;
    I8x16Shl = 0x6b, "i8x16.shl", None, 0;
    I8x16ShrS = 0x6c, "i8x16.shr_s", None, 0;
    I8x16ShrU = 0x6d, "i8x16.shr_u", None, 0;
    I8x16Add = 0x6e, "i8x16.add", None, 0;
    I8x16AddSatS = 0x6f, "i8x16.add_sat_s", None, 0;
    I8x16AddSatU = 0x70, "i8x16.add_sat_u", None, 0;
    I8x16Sub = 0x71, "i8x16.sub", None, 0;
    I8x16SubSatS = 0x72, "i8x16.sub_sat_s", None, 0;
    I8x16SubSatU = 0x73, "i8x16.sub_sat_u", None, 0;
    F64x2Ceil = 0x74, "f64x2.ceil", None, 0;
    F64x2Floor = 0x75, "f64x2.floor", None, 0;
    I8x16MinS = 0x76, "i8x16.min_s", None, 0;
    I8x16MinU = 0x77, "i8x16.min_u", None, 0;
    I8x16MaxS = 0x78, "i8x16.max_s", None, 0;
    I8x16MaxU = 0x79, "i8x16.max_u", None, 0;
    F64x2Trunc = 0x7a, "f64x2.trunc", None, 0;
    I8x16AvgrU = 0x7b, "i8x16.avgr_u", None, 0;
    I16x8ExtaddPairwiseI8x16S = 0x7c, "i16x8.extadd_pairwise_i8x16_s", None, 0;
    I16x8ExtaddPairwiseI8x16U = 0x7d, "i16x8.extadd_pairwise_i8x16_u", None, 0;
    I32x4ExtaddPairwiseI16x8S = 0x7e, "i32x4.extadd_pairwise_i16x8_s", None, 0;
    I32x4ExtaddPairwiseI16x8U = 0x7f, "i32x4.extadd_pairwise_i16x8_u", None, 0;
    I16x8Abs = 0x80, "i16x8.abs", None, 0;
    I16x8Neg = 0x81, "i16x8.neg", None, 0;
    I16x8Q15mulrSatS = 0x82, "i16x8.q15mulr_sat_s", None, 0;
    I16x8AllTrue = 0x83, "i16x8.all_true", None, 0;
    I16x8Bitmask = 0x84, "i16x8.bitmask", None, 0;
    I16x8NarrowI32x4S = 0x85, "i16x8.narrow_i32x4_s", None, 0;
    I16x8NarrowI32x4U = 0x86, "i16x8.narrow_i32x4_u", None, 0;
    I16x8ExtendLowI8x16S = 0x87, "i16x8.extend_low_i8x16_s", None, 0;
    I16x8ExtendHighI8x16S = 0x88, "i16x8.extend_high_i8x16_s", None, 0;
    I16x8ExtendLowI8x16U = 0x89, "i16x8.extend_low_i8x16_u", None, 0;
    I16x8ExtendHighI8x16U = 0x8a, "i16x8.extend_high_i8x16_u", None, 0;
    I16x8Shl = 0x8b, "i16x8.shl", None, 0;
    I16x8ShrS = 0x8c, "i16x8.shr_s", None, 0;
    I16x8ShrU = 0x8d, "i16x8.shr_u", None, 0;
    I16x8Add = 0x8e, "i16x8.add", None, 0;
    I16x8AddSatS = 0x8f, "i16x8.add_sat_s", None, 0;
    I16x8AddSatU = 0x90, "i16x8.add_sat_u", None, 0;
    I16x8Sub = 0x91, "i16x8.sub", None, 0;
    I16x8SubSatS = 0x92, "i16x8.sub_sat_s", None, 0;
    I16x8SubSatU = 0x93, "i16x8.sub_sat_u", None, 0;
    F64x2Nearest = 0x94, "f64x2.nearest", None, 0;
    I16x8Mul = 0x95, "i16x8.mul", None, 0;
    I16x8MinS = 0x96, "i16x8.min_s", None, 0;
    I16x8MinU = 0x97, "i16x8.min_u", None, 0;
    I16x8MaxS = 0x98, "i16x8.max_s", None, 0;
    I16x8MaxU = 0x99, "i16x8.max_u", None, 0;
    I16x8AvgrU = 0x9b, "i16x8.avgr_u", None, 0;
    I16x8ExtmulLowI8x16S = 0x9c, "i16x8.extmul_low_i8x16_s", None, 0;
    I16x8ExtmulHighI8x16S = 0x9d, "i16x8.extmul_high_i8x16_s", None, 0;
    I16x8ExtmulLowI8x16U = 0x9e, "i16x8.extmul_low_i8x16_u", None, 0;
    I16x8ExtmulHighI8x16U = 0x9f, "i16x8.extmul_high_i8x16_u", None, 0;
    I32x4Abs = 0xa0, "i32x4.abs", None, 0;
    I32x4Neg = 0xa1, "i32x4.neg", None, 0;
    I32x4AllTrue = 0xa3, "i32x4.all_true", None, 0;
    I32x4Bitmask = 0xa4, "i32x4.bitmask", None, 0;
    I32x4ExtendLowI16x8S = 0xa7, "i32x4.extend_low_i16x8_s", None, 0;
    I32x4ExtendHighI16x8S = 0xa8, "i32x4.extend_high_i16x8_s", None, 0;
    I32x4ExtendLowI16x8U = 0xa9, "i32x4.extend_low_i16x8_u", None, 0;
    I32x4ExtendHighI16x8U = 0xaa, "i32x4.extend_high_i16x8_u", None, 0;
    I32x4Shl = 0xab, "i32x4.shl", None, 0;
    I32x4ShrS = 0xac, "i32x4.shr_s", None, 0;
    I32x4ShrU = 0xad, "i32x4.shr_u", None, 0;
    I32x4Add = 0xae, "i32x4.add", None, 0;
    I32x4Sub = 0xb1, "i32x4.sub", None, 0;
    I32x4Mul = 0xb5, "i32x4.mul", None, 0;
    I32x4MinS = 0xb6, "i32x4.min_s", None, 0;
    I32x4MinU = 0xb7, "i32x4.min_u", None, 0;
    I32x4MaxS = 0xb8, "i32x4.max_s", None, 0;
    I32x4MaxU = 0xb9, "i32x4.max_u", None, 0;
    I32x4DotI16x8S = 0xba, "i32x4.dot_i16x8_s", None, 0;
    I32x4ExtmulLowI16x8S = 0xbc, "i32x4.extmul_low_i16x8_s", None, 0;
    I32x4ExtmulHighI16x8S = 0xbd, "i32x4.extmul_high_i16x8_s", None, 0;
    I32x4ExtmulLowI16x8U = 0xbe, "i32x4.extmul_low_i16x8_u", None, 0;
    I32x4ExtmulHighI16x8U = 0xbf, "i32x4.extmul_high_i16x8_u", None, 0;
    I64x2Abs = 0xc0, "i64x2.abs", None, 0;
    I64x2Neg = 0xc1, "i64x2.neg", None, 0;
    I64x2AllTrue = 0xc3, "i64x2.all_true", None, 0;
    I64x2Bitmask = 0xc4, "i64x2.bitmask", None, 0;
    I64x2ExtendLowI32x4S = 0xc7, "i64x2.extend_low_i32x4_s", None, 0;
    I64x2ExtendHighI32x4S = 0xc8, "i64x2.extend_high_i32x4_s", None, 0;
    I64x2ExtendLowI32x4U = 0xc9, "i64x2.extend_low_i32x4_u", None, 0;
    I64x2ExtendHighI32x4U = 0xca, "i64x2.extend_high_i32x4_u", None, 0;
    I64x2Shl = 0xcb, "i64x2.shl", None, 0;
    I64x2ShrS = 0xcc, "i64x2.shr_s", None, 0;
    I64x2ShrU = 0xcd, "i64x2.shr_u", None, 0;
    I64x2Add = 0xce, "i64x2.add", None, 0;
    I64x2Sub = 0xd1, "i64x2.sub", None, 0;
    I64x2Mul = 0xd5, "i64x2.mul", None, 0;
    I64x2Eq = 0xd6, "i64x2.eq", None, 0;
    I64x2Ne = 0xd7, "i64x2.ne", None, 0;
    I64x2LtS = 0xd8, "i64x2.lt_s", None, 0;
    I64x2GtS = 0xd9, "i64x2.gt_s", None, 0;
    I64x2LeS = 0xda, "i64x2.le_s", None, 0;
    I64x2GeS = 0xdb, "i64x2.ge_s", None, 0;
    I64x2ExtmulLowI32x4S = 0xdc, "i64x2.extmul_low_i32x4_s", None, 0;
    I64x2ExtmulHighI32x4S = 0xdd, "i64x2.extmul_high_i32x4_s", None, 0;
    I64x2ExtmulLowI32x4U = 0xde, "i64x2.extmul_low_i32x4_u", None, 0;
    I64x2ExtmulHighI32x4U = 0xdf, "i64x2.extmul_high_i32x4_u", None, 0;
    F32x4Abs = 0xe0, "f32x4.abs", None, 0;
    F32x4Neg = 0xe1, "f32x4.neg", None, 0;
    F32x4Sqrt = 0xe3, "f32x4.sqrt", None, 0;
    F32x4Add = 0xe4, "f32x4.add", None, 0;
    F32x4Sub = 0xe5, "f32x4.sub", None, 0;
    F32x4Mul = 0xe6, "f32x4.mul", None, 0;
    F32x4Div = 0xe7, "f32x4.div", None, 0;
    F32x4Min = 0xe8, "f32x4.min", None, 0;
    F32x4Max = 0xe9, "f32x4.max", None, 0;
    F32x4Pmin = 0xea, "f32x4.pmin", None, 0;
    F32x4Pmax = 0xeb, "f32x4.pmax", None, 0;
    F64x2Abs = 0xec, "f64x2.abs", None, 0;
    F64x2Neg = 0xed, "f64x2.neg", None, 0;
    F64x2Sqrt = 0xef, "f64x2.sqrt", None, 0;
    F64x2Add = 0xf0, "f64x2.add", None, 0;
    F64x2Sub = 0xf1, "f64x2.sub", None, 0;
    F64x2Mul = 0xf2, "f64x2.mul", None, 0;
    F64x2Div = 0xf3, "f64x2.div", None, 0;
    F64x2Min = 0xf4, "f64x2.min", None, 0;
    F64x2Max = 0xf5, "f64x2.max", None, 0;
    F64x2Pmin = 0xf6, "f64x2.pmin", None, 0;
    F64x2Pmax = 0xf7, "f64x2.pmax", None, 0;
    I32x4TruncSatF32x4S = 0xf8, "i32x4.trunc_sat_f32x4_s", None, 0;
    I32x4TruncSatF32x4U = 0xf9, "i32x4.trunc_sat_f32x4_u", None, 0;
    F32x4ConvertI32x4S = 0xfa, "f32x4.convert_i32x4_s", None, 0;
    F32x4ConvertI32x4U = 0xfb, "f32x4.convert_i32x4_u", None, 0;
    I32x4TruncSatF64x2SZero = 0xfc, "i32x4.trunc_sat_f64x2_s_zero", None, 0;
    I32x4TruncSatF64x2UZero = 0xfd, "i32x4.trunc_sat_f64x2_u_zero", None, 0;
    F64x2ConvertLowI32x4S = 0xfe, "f64x2.convert_low_i32x4_s", None, 0;
    F64x2ConvertLowI32x4U = 0xff, "f64x2.convert_low_i32x4_u", None, 0;
}

impl SimdOp {
    /// The natural alignment (log2 of access width in bytes) for memory
    /// operations; zero for everything else.
    pub fn natural_align(self) -> u32 {
        use SimdOp::*;
        match self {
            V128Load | V128Store => 4,
            V128Load8x8S | V128Load8x8U | V128Load16x4S | V128Load16x4U | V128Load32x2S
            | V128Load32x2U | V128Load64Splat | V128Load64Zero | V128Load64Lane
            | V128Store64Lane => 3,
            V128Load32Splat | V128Load32Zero | V128Load32Lane | V128Store32Lane => 2,
            V128Load16Splat | V128Load16Lane | V128Store16Lane => 1,
            V128Load8Splat | V128Load8Lane | V128Store8Lane => 0,
            _ => 0,
        }
    }
}

/// Looks up a SIMD operation by its text-format mnemonic.
pub fn simd_op_by_mnemonic(name: &str) -> Option<SimdOp> {
    static MAP: OnceCell<HashMap<&'static str, SimdOp>> = OnceCell::new();
    MAP.get_or_init(|| SimdOp::ALL.iter().map(|&op| (op.mnemonic(), op)).collect())
        .get(name)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for &op in SimdOp::ALL {
            assert_eq!(SimdOp::from_code(op.code()), Some(op));
        }
    }

    #[test]
    fn gaps_are_unknown() {
        assert_eq!(SimdOp::from_code(0x9a), None);
        assert_eq!(SimdOp::from_code(0xa2), None);
        assert_eq!(SimdOp::from_code(0x114), None);
    }

    #[test]
    fn mnemonic_lookup() {
        assert_eq!(simd_op_by_mnemonic("i8x16.shuffle"), Some(SimdOp::I8x16Shuffle));
        assert_eq!(simd_op_by_mnemonic("v128.load"), Some(SimdOp::V128Load));
        assert_eq!(simd_op_by_mnemonic("f64x2.pmax"), Some(SimdOp::F64x2Pmax));
        assert_eq!(simd_op_by_mnemonic("i8x16.shuffel"), None);
    }

    #[test]
    fn lane_counts() {
        assert_eq!(SimdOp::I8x16ExtractLaneS.lane_count(), 16);
        assert_eq!(SimdOp::I64x2ReplaceLane.lane_count(), 2);
        assert_eq!(SimdOp::V128Load32Lane.lane_count(), 4);
        assert_eq!(SimdOp::V128And.lane_count(), 0);
    }

    #[test]
    fn imm_kinds() {
        assert_eq!(SimdOp::V128Const.imm_kind(), SimdImmKind::Bytes);
        assert_eq!(SimdOp::I8x16Shuffle.imm_kind(), SimdImmKind::Lanes);
        assert_eq!(SimdOp::V128Load8Lane.imm_kind(), SimdImmKind::MemArgLane);
        assert_eq!(SimdOp::V128Load.imm_kind(), SimdImmKind::MemArg);
        assert_eq!(SimdOp::I8x16Add.imm_kind(), SimdImmKind::None);
    }

    #[test]
    fn natural_alignments() {
        assert_eq!(SimdOp::V128Load.natural_align(), 4);
        assert_eq!(SimdOp::V128Load8Splat.natural_align(), 0);
        assert_eq!(SimdOp::V128Load32Zero.natural_align(), 2);
        assert_eq!(SimdOp::V128Load8x8S.natural_align(), 3);
    }
}
