//! The 0xFE-prefixed atomic instruction space (threads proposal).
//!
//! Driven by a single declarative table, like [`super::simd`]. Every atomic
//! memory access carries a memarg whose alignment must equal the natural
//! alignment exactly; `atomic.fence` instead carries a single reserved byte.

use once_cell::sync::OnceCell;
use std::collections::HashMap;

macro_rules! atomic_ops {
    ($( $name:ident = $code:literal, $mnemonic:literal, $align:literal; )*) => {
        /// An atomic operation, one per 0xFE sub-opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AtomicOp {
            $( $name, )*
        }

        impl AtomicOp {
            /// Every defined atomic operation, in sub-opcode order.
            pub const ALL: &'static [AtomicOp] = &[ $( AtomicOp::$name, )* ];

            /// Looks up an operation by its sub-opcode.
            pub fn from_code(code: u32) -> Option<AtomicOp> {
                match code {
                    $( $code => Some(AtomicOp::$name), )*
                    _ => None,
                }
            }

            /// The sub-opcode following the 0xFE prefix.
            pub fn code(self) -> u32 {
                match self {
                    $( AtomicOp::$name => $code, )*
                }
            }

            /// The text-format mnemonic.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( AtomicOp::$name => $mnemonic, )*
                }
            }

            /// The natural alignment (log2 of access width in bytes).
            pub fn natural_align(self) -> u32 {
                match self {
                    $( AtomicOp::$name => $align, )*
                }
            }
        }
    };
}

atomic_ops! {
    MemoryAtomicNotify = 0x00, "memory.atomic.notify", 2;
    MemoryAtomicWait32 = 0x01, "memory.atomic.wait32", 2;
    MemoryAtomicWait64 = 0x02, "memory.atomic.wait64", 3;
    AtomicFence = 0x03, "atomic.fence", 0;
    I32AtomicLoad = 0x10, "i32.atomic.load", 2;
    I64AtomicLoad = 0x11, "i64.atomic.load", 3;
    I32AtomicLoad8U = 0x12, "i32.atomic.load8_u", 0;
    I32AtomicLoad16U = 0x13, "i32.atomic.load16_u", 1;
    I64AtomicLoad8U = 0x14, "i64.atomic.load8_u", 0;
    I64AtomicLoad16U = 0x15, "i64.atomic.load16_u", 1;
    I64AtomicLoad32U = 0x16, "i64.atomic.load32_u", 2;
    I32AtomicStore = 0x17, "i32.atomic.store", 2;
    I64AtomicStore = 0x18, "i64.atomic.store", 3;
    I32AtomicStore8 = 0x19, "i32.atomic.store8", 0;
    I32AtomicStore16 = 0x1a, "i32.atomic.store16", 1;
    I64AtomicStore8 = 0x1b, "i64.atomic.store8", 0;
    I64AtomicStore16 = 0x1c, "i64.atomic.store16", 1;
    I64AtomicStore32 = 0x1d, "i64.atomic.store32", 2;
    I32AtomicRmwAdd = 0x1e, "i32.atomic.rmw.add", 2;
    I64AtomicRmwAdd = 0x1f, "i64.atomic.rmw.add", 3;
    I32AtomicRmw8AddU = 0x20, "i32.atomic.rmw8.add_u", 0;
    I32AtomicRmw16AddU = 0x21, "i32.atomic.rmw16.add_u", 1;
    I64AtomicRmw8AddU = 0x22, "i64.atomic.rmw8.add_u", 0;
    I64AtomicRmw16AddU = 0x23, "i64.atomic.rmw16.add_u", 1;
    I64AtomicRmw32AddU = 0x24, "i64.atomic.rmw32.add_u", 2;
    I32AtomicRmwSub = 0x25, "i32.atomic.rmw.sub", 2;
    I64AtomicRmwSub = 0x26, "i64.atomic.rmw.sub", 3;
    I32AtomicRmw8SubU = 0x27, "i32.atomic.rmw8.sub_u", 0;
    I32AtomicRmw16SubU = 0x28, "i32.atomic.rmw16.sub_u", 1;
    I64AtomicRmw8SubU = 0x29, "i64.atomic.rmw8.sub_u", 0;
    I64AtomicRmw16SubU = 0x2a, "i64.atomic.rmw16.sub_u", 1;
    I64AtomicRmw32SubU = 0x2b, "i64.atomic.rmw32.sub_u", 2;
    I32AtomicRmwAnd = 0x2c, "i32.atomic.rmw.and", 2;
    I64AtomicRmwAnd = 0x2d, "i64.atomic.rmw.and", 3;
    I32AtomicRmw8AndU = 0x2e, "i32.atomic.rmw8.and_u", 0;
    I32AtomicRmw16AndU = 0x2f, "i32.atomic.rmw16.and_u", 1;
    I64AtomicRmw8AndU = 0x30, "i64.atomic.rmw8.and_u", 0;
    I64AtomicRmw16AndU = 0x31, "i64.atomic.rmw16.and_u", 1;
    I64AtomicRmw32AndU = 0x32, "i64.atomic.rmw32.and_u", 2;
    I32AtomicRmwOr = 0x33, "i32.atomic.rmw.or", 2;
    I64AtomicRmwOr = 0x34, "i64.atomic.rmw.or", 3;
    I32AtomicRmw8OrU = 0x35, "i32.atomic.rmw8.or_u", 0;
    I32AtomicRmw16OrU = 0x36, "i32.atomic.rmw16.or_u", 1;
    I64AtomicRmw8OrU = 0x37, "i64.atomic.rmw8.or_u", 0;
    I64AtomicRmw16OrU = 0x38, "i64.atomic.rmw16.or_u", 1;
    I64AtomicRmw32OrU = 0x39, "i64.atomic.rmw32.or_u", 2;
    I32AtomicRmwXor = 0x3a, "i32.atomic.rmw.xor", 2;
    I64AtomicRmwXor = 0x3b, "i64.atomic.rmw.xor", 3;
    I32AtomicRmw8XorU = 0x3c, "i32.atomic.rmw8.xor_u", 0;
    I32AtomicRmw16XorU = 0x3d, "i32.atomic.rmw16.xor_u", 1;
    I64AtomicRmw8XorU = 0x3e, "i64.atomic.rmw8.xor_u", 0;
    I64AtomicRmw16XorU = 0x3f, "i64.atomic.rmw16.xor_u", 1;
    I64AtomicRmw32XorU = 0x40, "i64.atomic.rmw32.xor_u", 2;
    I32AtomicRmwXchg = 0x41, "i32.atomic.rmw.xchg", 2;
    I64AtomicRmwXchg = 0x42, "i64.atomic.rmw.xchg", 3;
    I32AtomicRmw8XchgU = 0x43, "i32.atomic.rmw8.xchg_u", 0;
    I32AtomicRmw16XchgU = 0x44, "i32.atomic.rmw16.xchg_u", 1;
    I64AtomicRmw8XchgU = 0x45, "i64.atomic.rmw8.xchg_u", 0;
    I64AtomicRmw16XchgU = 0x46, "i64.atomic.rmw16.xchg_u", 1;
    I64AtomicRmw32XchgU = 0x47, "i64.atomic.rmw32.xchg_u", 2;
    I32AtomicRmwCmpxchg = 0x48, "i32.atomic.rmw.cmpxchg", 2;
    I64AtomicRmwCmpxchg = 0x49, "i64.atomic.rmw.cmpxchg", 3;
    I32AtomicRmw8CmpxchgU = 0x4a, "i32.atomic.rmw8.cmpxchg_u", 0;
    I32AtomicRmw16CmpxchgU = 0x4b, "i32.atomic.rmw16.cmpxchg_u", 1;
    I64AtomicRmw8CmpxchgU = 0x4c, "i64.atomic.rmw8.cmpxchg_u", 0;
    I64AtomicRmw16CmpxchgU = 0x4d, "i64.atomic.rmw16.cmpxchg_u", 1;
    I64AtomicRmw32CmpxchgU = 0x4e, "i64.atomic.rmw32.cmpxchg_u", 2;
}

impl AtomicOp {
    /// Whether this operation carries a memarg (all except `atomic.fence`).
    pub fn has_memarg(self) -> bool {
        !matches!(self, AtomicOp::AtomicFence)
    }
}

/// Looks up an atomic operation by its text-format mnemonic.
pub fn atomic_op_by_mnemonic(name: &str) -> Option<AtomicOp> {
    static MAP: OnceCell<HashMap<&'static str, AtomicOp>> = OnceCell::new();
    MAP.get_or_init(|| AtomicOp::ALL.iter().map(|&op| (op.mnemonic(), op)).collect())
        .get(name)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for &op in AtomicOp::ALL {
            assert_eq!(AtomicOp::from_code(op.code()), Some(op));
        }
    }

    #[test]
    fn gap_between_fence_and_loads() {
        assert_eq!(AtomicOp::from_code(0x04), None);
        assert_eq!(AtomicOp::from_code(0x0f), None);
        assert_eq!(AtomicOp::from_code(0x4f), None);
    }

    #[test]
    fn mnemonic_lookup() {
        assert_eq!(
            atomic_op_by_mnemonic("i32.atomic.rmw.cmpxchg"),
            Some(AtomicOp::I32AtomicRmwCmpxchg)
        );
        assert_eq!(
            atomic_op_by_mnemonic("memory.atomic.notify"),
            Some(AtomicOp::MemoryAtomicNotify)
        );
        assert_eq!(atomic_op_by_mnemonic("i32.atomic.rmw.nand"), None);
    }

    #[test]
    fn fence_has_no_memarg() {
        assert!(!AtomicOp::AtomicFence.has_memarg());
        assert!(AtomicOp::I64AtomicLoad.has_memarg());
    }
}
