//! The bytecode instruction format executed by the interpreter.
//!
//! Every instruction is one 64-bit word: the low 8 bits are the
//! [`OpCode`], the remaining 56 bits are opcode-specific operand
//! bitfields. Some opcodes are *wide* — they consume one or more
//! additional 64-bit words immediately following as inline immediates
//! (a function pointer, a type descriptor, an immediate wider than 32
//! bits) or as a packed array of 16-bit argument-source indices.
//!
//! **NOTE:** changing the declaration order of [`OpCode`] changes its
//! wire representation; the discriminants are load-bearing, not just
//! documentation.

/// Bit width of a stack slot operand (`BITS_PER_STACK_OPERAND` in the
/// stack/frame model — kept in sync with `vm::stack::Stack`).
pub const BITS_PER_STACK_OPERAND: u32 = 15;
const OPCODE_BITS: u32 = 8;

/// The set of instructions supported by the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Does nothing.
    Noop = 0,
    /// Pops the current frame without a return value. Stops execution if
    /// this was the root frame.
    Return,
    /// Copies `sizeof(type@src)` bytes from `value[src]` into the frame's
    /// return destination, then pops the frame.
    ReturnValue,
    /// Calls the function whose pointer is inlined as the word right
    /// after this one; argument sources follow as `ceil(argCount/4)`
    /// words of packed 16-bit slot indices. No return value is copied.
    CallImmediateNoReturn,
    /// Calls the function held in `src`; argument sources follow the
    /// same way as [`OpCode::CallImmediateNoReturn`]. No return value.
    CallSrcNoReturn,
    /// Like [`OpCode::CallImmediateNoReturn`], but also carries a
    /// `retDst` slot that receives the callee's return value.
    CallImmediateWithReturn,
    /// Like [`OpCode::CallSrcNoReturn`], but also carries a `retDst`
    /// slot that receives the callee's return value.
    CallSrcWithReturn,
    /// Zero-initializes a value; for non-scalar types, an extra word
    /// holds the type pointer.
    LoadDefault,
    /// Writes a constant into a slot; when the value itself doesn't fit
    /// the inline 32-bit immediate field (see
    /// [`ScalarTag::immediate_fits_inline`]), an extra word immediately
    /// following holds the full 64-bit immediate.
    LoadImmediateScalar,
    /// Fills a value's memory with `0xAA` ("undefined"); does not set a
    /// type tag.
    MemsetUninitialized,
    /// Forcibly sets the type tag at `dst`, overriding whatever was
    /// there; non-scalar types carry an extra word with the type
    /// pointer.
    SetType,
    /// Forcibly clears the type tag at `dst`.
    SetNullType,
    /// Unconditionally adjusts the instruction pointer by a signed
    /// amount.
    Jump,
    /// Adjusts the instruction pointer by a signed amount if `src` is
    /// false.
    JumpIfFalse,
    /// Runs the destructor of `src` and clears its type tag.
    Destruct,
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Self {
        debug_assert!(byte <= OpCode::Destruct as u8, "invalid opcode byte {byte}");
        // SAFETY: every discriminant in `0..=Destruct` is a valid variant,
        // and the debug_assert above catches out-of-range bytes in tests.
        unsafe { std::mem::transmute(byte) }
    }
}

/// The scalar value kinds the interpreter knows how to load/store
/// directly in a slot, independent of the full type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScalarTag {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    USize,
    F32,
    F64,
}

impl ScalarTag {
    /// Whether a value's raw bit pattern fits the instruction's inline
    /// 32-bit immediate field, or needs a following wide word. `F64`
    /// never fits (any truncation loses precision); `I64`/`U64`/`USize`
    /// fit whenever the actual value happens to be representable in 32
    /// bits (e.g. `return 0;` never needs a wide word even though `i64`
    /// is a 64-bit type); every other tag always fits.
    pub fn immediate_fits_inline(self, bits: u64) -> bool {
        match self {
            ScalarTag::F64 => false,
            ScalarTag::I64 => (bits as i64) >= i32::MIN as i64 && (bits as i64) <= i32::MAX as i64,
            ScalarTag::U64 | ScalarTag::USize => bits <= u32::MAX as u64,
            _ => true,
        }
    }

    pub fn from_u8(byte: u8) -> Self {
        debug_assert!(byte <= ScalarTag::F64 as u8, "invalid scalar tag byte {byte}");
        // SAFETY: every discriminant in `0..=F64` is a valid variant, and
        // the debug_assert above catches out-of-range bytes in tests.
        unsafe { std::mem::transmute(byte) }
    }
}

fn pack(value: u64, bit_offset: u32, width: u32) -> u64 {
    debug_assert!(value < (1u64 << width), "operand {value} does not fit in {width} bits");
    (value & ((1u64 << width) - 1)) << bit_offset
}

fn unpack(word: u64, bit_offset: u32, width: u32) -> u64 {
    (word >> bit_offset) & ((1u64 << width) - 1)
}

/// One 64-bit bytecode word. Zero-initializing yields a [`OpCode::Noop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bytecode(pub u64);

impl Bytecode {
    pub fn opcode(self) -> OpCode {
        OpCode::from_u8((self.0 & ((1 << OPCODE_BITS) - 1)) as u8)
    }
}

/// Per-opcode operand encodings. Each mirrors one instruction row of the
/// interpreter's instruction-set table: a typed constructor that packs
/// its fields into one [`Bytecode`] word, and an accessor per field.
pub mod operands {
    use super::*;

    macro_rules! slot_field {
        ($name:ident, $offset:expr) => {
            pub fn $name(self) -> u16 {
                unpack(self.0 .0, $offset, BITS_PER_STACK_OPERAND) as u16
            }
        };
    }

    #[derive(Debug, Clone, Copy)]
    pub struct ReturnValue(pub Bytecode);
    impl ReturnValue {
        pub fn new(src: u16) -> Self {
            Self(Bytecode(OpCode::ReturnValue as u64 | pack(src as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)))
        }
        slot_field!(src, OPCODE_BITS);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct CallImmediateNoReturn(pub Bytecode);
    impl CallImmediateNoReturn {
        pub fn new(arg_count: u16) -> Self {
            Self(Bytecode(OpCode::CallImmediateNoReturn as u64 | pack(arg_count as u64, OPCODE_BITS, 16)))
        }
        pub fn arg_count(self) -> u16 {
            unpack(self.0 .0, OPCODE_BITS, 16) as u16
        }
        /// Number of 64-bit words following the function pointer word
        /// that hold packed 16-bit argument source indices.
        pub fn arg_words(arg_count: u16) -> u32 {
            (arg_count as u32 + 3) / 4
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct CallSrcNoReturn(pub Bytecode);
    impl CallSrcNoReturn {
        pub fn new(src: u16, arg_count: u16) -> Self {
            Self(Bytecode(
                OpCode::CallSrcNoReturn as u64
                    | pack(src as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)
                    | pack(arg_count as u64, OPCODE_BITS + BITS_PER_STACK_OPERAND, 16),
            ))
        }
        slot_field!(src, OPCODE_BITS);
        pub fn arg_count(self) -> u16 {
            unpack(self.0 .0, OPCODE_BITS + BITS_PER_STACK_OPERAND, 16) as u16
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct CallImmediateWithReturn(pub Bytecode);
    impl CallImmediateWithReturn {
        pub fn new(arg_count: u16, ret_dst: u16) -> Self {
            Self(Bytecode(
                OpCode::CallImmediateWithReturn as u64
                    | pack(arg_count as u64, OPCODE_BITS, 16)
                    | pack(ret_dst as u64, OPCODE_BITS + 16, BITS_PER_STACK_OPERAND),
            ))
        }
        pub fn arg_count(self) -> u16 {
            unpack(self.0 .0, OPCODE_BITS, 16) as u16
        }
        slot_field!(ret_dst, OPCODE_BITS + 16);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct CallSrcWithReturn(pub Bytecode);
    impl CallSrcWithReturn {
        pub fn new(src: u16, arg_count: u16, ret_dst: u16) -> Self {
            Self(Bytecode(
                OpCode::CallSrcWithReturn as u64
                    | pack(src as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)
                    | pack(arg_count as u64, OPCODE_BITS + BITS_PER_STACK_OPERAND, 16)
                    | pack(ret_dst as u64, OPCODE_BITS + BITS_PER_STACK_OPERAND + 16, BITS_PER_STACK_OPERAND),
            ))
        }
        slot_field!(src, OPCODE_BITS);
        pub fn arg_count(self) -> u16 {
            unpack(self.0 .0, OPCODE_BITS + BITS_PER_STACK_OPERAND, 16) as u16
        }
        slot_field!(ret_dst, OPCODE_BITS + BITS_PER_STACK_OPERAND + 16);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct LoadDefault(pub Bytecode);
    impl LoadDefault {
        pub fn new(is_scalar: bool, scalar_tag: ScalarTag, dst: u16) -> Self {
            Self(Bytecode(
                OpCode::LoadDefault as u64
                    | pack(is_scalar as u64, OPCODE_BITS, 1)
                    | pack(scalar_tag as u64, OPCODE_BITS + 1, 6)
                    | pack(dst as u64, OPCODE_BITS + 1 + 6, BITS_PER_STACK_OPERAND),
            ))
        }
        pub fn is_scalar(self) -> bool {
            unpack(self.0 .0, OPCODE_BITS, 1) != 0
        }
        pub fn scalar_tag(self) -> u8 {
            unpack(self.0 .0, OPCODE_BITS + 1, 6) as u8
        }
        slot_field!(dst, OPCODE_BITS + 1 + 6);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct LoadImmediateScalar(pub Bytecode);
    impl LoadImmediateScalar {
        /// A load whose value fits the inline 32-bit immediate outright —
        /// see [`ScalarTag::immediate_fits_inline`].
        pub fn new(scalar_tag: ScalarTag, dst: u16, immediate: u32) -> Self {
            Self::new_inner(scalar_tag, dst, immediate, false)
        }

        /// A load whose value doesn't fit inline: `immediate` is left 0
        /// and the instruction is marked [`LoadImmediateScalar::is_wide`]
        /// so the interpreter knows to read the full value from the word
        /// immediately following.
        pub fn new_wide(scalar_tag: ScalarTag, dst: u16) -> Self {
            Self::new_inner(scalar_tag, dst, 0, true)
        }

        fn new_inner(scalar_tag: ScalarTag, dst: u16, immediate: u32, wide: bool) -> Self {
            Self(Bytecode(
                OpCode::LoadImmediateScalar as u64
                    | pack(scalar_tag as u64, OPCODE_BITS, 5)
                    | pack(wide as u64, OPCODE_BITS + 5, 1)
                    | pack(dst as u64, OPCODE_BITS + 6, BITS_PER_STACK_OPERAND)
                    | pack(immediate as u64, OPCODE_BITS + 6 + BITS_PER_STACK_OPERAND, 32),
            ))
        }

        pub fn scalar_tag(self) -> u8 {
            unpack(self.0 .0, OPCODE_BITS, 5) as u8
        }

        /// Whether a wide word carrying the full value follows this
        /// instruction.
        pub fn is_wide(self) -> bool {
            unpack(self.0 .0, OPCODE_BITS + 5, 1) != 0
        }

        slot_field!(dst, OPCODE_BITS + 6);
        pub fn immediate(self) -> u32 {
            unpack(self.0 .0, OPCODE_BITS + 6 + BITS_PER_STACK_OPERAND, 32) as u32
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct MemsetUninitialized(pub Bytecode);
    impl MemsetUninitialized {
        pub fn new(dst: u16, slots: u16) -> Self {
            Self(Bytecode(
                OpCode::MemsetUninitialized as u64
                    | pack(dst as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)
                    | pack(slots as u64, OPCODE_BITS + BITS_PER_STACK_OPERAND, 16),
            ))
        }
        slot_field!(dst, OPCODE_BITS);
        pub fn slots(self) -> u16 {
            unpack(self.0 .0, OPCODE_BITS + BITS_PER_STACK_OPERAND, 16) as u16
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct SetType(pub Bytecode);
    impl SetType {
        pub fn new(dst: u16) -> Self {
            Self(Bytecode(OpCode::SetType as u64 | pack(dst as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)))
        }
        slot_field!(dst, OPCODE_BITS);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct SetNullType(pub Bytecode);
    impl SetNullType {
        pub fn new(dst: u16) -> Self {
            Self(Bytecode(OpCode::SetNullType as u64 | pack(dst as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)))
        }
        slot_field!(dst, OPCODE_BITS);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct Jump(pub Bytecode);
    impl Jump {
        pub fn new(amount: i32) -> Self {
            Self(Bytecode(OpCode::Jump as u64 | pack(amount as u32 as u64, OPCODE_BITS, 32)))
        }
        pub fn amount(self) -> i32 {
            unpack(self.0 .0, OPCODE_BITS, 32) as u32 as i32
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct JumpIfFalse(pub Bytecode);
    impl JumpIfFalse {
        pub fn new(amount: i32, src: u16) -> Self {
            Self(Bytecode(
                OpCode::JumpIfFalse as u64
                    | pack(amount as u32 as u64, OPCODE_BITS, 32)
                    | pack(src as u64, OPCODE_BITS + 32, BITS_PER_STACK_OPERAND),
            ))
        }
        pub fn amount(self) -> i32 {
            unpack(self.0 .0, OPCODE_BITS, 32) as u32 as i32
        }
        slot_field!(src, OPCODE_BITS + 32);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct Destruct(pub Bytecode);
    impl Destruct {
        pub fn new(src: u16) -> Self {
            Self(Bytecode(OpCode::Destruct as u64 | pack(src as u64, OPCODE_BITS, BITS_PER_STACK_OPERAND)))
        }
        slot_field!(src, OPCODE_BITS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operands::*;

    #[test]
    fn return_value_roundtrips() {
        let bc = ReturnValue::new(1234).0;
        assert_eq!(bc.opcode(), OpCode::ReturnValue);
        assert_eq!(ReturnValue(bc).src(), 1234);
    }

    #[test]
    fn load_immediate_scalar_roundtrips() {
        let bc = LoadImmediateScalar::new(ScalarTag::I64, 7, 0xABCD_1234).0;
        assert_eq!(bc.opcode(), OpCode::LoadImmediateScalar);
        let op = LoadImmediateScalar(bc);
        assert_eq!(op.scalar_tag(), ScalarTag::I64 as u8);
        assert_eq!(op.dst(), 7);
        assert_eq!(op.immediate(), 0xABCD_1234);
    }

    #[test]
    fn jump_if_false_roundtrips_negative_amount() {
        let bc = JumpIfFalse::new(-42, 3).0;
        let op = JumpIfFalse(bc);
        assert_eq!(op.amount(), -42);
        assert_eq!(op.src(), 3);
    }

    #[test]
    fn call_src_with_return_roundtrips() {
        let bc = CallSrcWithReturn::new(100, 2, 200).0;
        let op = CallSrcWithReturn(bc);
        assert_eq!(op.src(), 100);
        assert_eq!(op.arg_count(), 2);
        assert_eq!(op.ret_dst(), 200);
    }

    #[test]
    fn small_i64_value_fits_inline() {
        assert!(ScalarTag::I64.immediate_fits_inline(0));
        assert!(!ScalarTag::I64.immediate_fits_inline(u64::MAX));
        assert!(!ScalarTag::F64.immediate_fits_inline(0));
    }

    #[test]
    fn load_immediate_scalar_wide_flag_roundtrips() {
        let narrow = LoadImmediateScalar::new(ScalarTag::I64, 3, 0).0;
        assert!(!LoadImmediateScalar(narrow).is_wide());

        let wide = LoadImmediateScalar::new_wide(ScalarTag::F64, 3).0;
        let op = LoadImmediateScalar(wide);
        assert!(op.is_wide());
        assert_eq!(op.scalar_tag(), ScalarTag::F64 as u8);
        assert_eq!(op.dst(), 3);
    }

    #[test]
    fn call_immediate_no_return_arg_words() {
        assert_eq!(CallImmediateNoReturn::arg_words(0), 0);
        assert_eq!(CallImmediateNoReturn::arg_words(1), 1);
        assert_eq!(CallImmediateNoReturn::arg_words(4), 1);
        assert_eq!(CallImmediateNoReturn::arg_words(5), 2);
    }
}
