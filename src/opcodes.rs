//! JVM opcodes that the reference crawler needs to recognise, and the operand
//! size table used to step over everything else.

use crate::error::ClassFileError;

pub(crate) const LDC: u8 = 0x12;
pub(crate) const LDC_W: u8 = 0x13;
pub(crate) const LDC2_W: u8 = 0x14;
pub(crate) const TABLESWITCH: u8 = 0xaa;
pub(crate) const LOOKUPSWITCH: u8 = 0xab;
pub(crate) const INVOKESTATIC: u8 = 0xb8;
pub(crate) const NEW: u8 = 0xbb;
pub(crate) const ANEWARRAY: u8 = 0xbd;
pub(crate) const CHECKCAST: u8 = 0xc0;
pub(crate) const INSTANCEOF: u8 = 0xc1;
pub(crate) const WIDE: u8 = 0xc4;
pub(crate) const MULTIANEWARRAY: u8 = 0xc5;
pub(crate) const IINC: u8 = 0x84;

/// Number of operand bytes following a fixed-size opcode.
/// `None` for the variable-length switch and `wide` forms.
pub(crate) fn operand_size(opcode: u8) -> Option<usize> {
    let size = match opcode {
        TABLESWITCH | LOOKUPSWITCH | WIDE => return None,
        // bipush, ldc, iload..aload, istore..astore, ret, newarray
        0x10 | LDC | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 1,
        // sipush, ldc_w, ldc2_w, iinc, branches, field and invoke ops,
        // new, anewarray, checkcast, instanceof, ifnull, ifnonnull
        0x11
        | LDC_W
        | LDC2_W
        | IINC
        | 0x99..=0xa8
        | 0xb2..=INVOKESTATIC
        | NEW
        | ANEWARRAY
        | CHECKCAST
        | INSTANCEOF
        | 0xc6
        | 0xc7 => 2,
        MULTIANEWARRAY => 3,
        // invokeinterface, invokedynamic, goto_w, jsr_w
        0xb9 | 0xba | 0xc8 | 0xc9 => 4,
        _ => 0,
    };
    Some(size)
}

/// Bytes of alignment after a switch opcode at `offset` (relative to code start).
pub(crate) fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32, ClassFileError> {
    code.get(offset..offset + 4)
        .map(|bytes| i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or_else(|| ClassFileError::malformed(format!("truncated code at offset {offset}")))
}

/// Total length of the instruction at `offset`, opcode included.
pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize, ClassFileError> {
    let opcode = *code
        .get(offset)
        .ok_or_else(|| ClassFileError::malformed(format!("truncated code at offset {offset}")))?;
    let length = match opcode {
        TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            let count = (high as i64) - (low as i64) + 1;
            if count < 0 {
                return Err(ClassFileError::malformed("invalid tableswitch range"));
            }
            base + 12 + count as usize * 4 - offset
        }
        LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let npairs = read_i32(code, base + 4)?;
            if npairs < 0 {
                return Err(ClassFileError::malformed("invalid lookupswitch pair count"));
            }
            base + 8 + npairs as usize * 8 - offset
        }
        WIDE => {
            let modified = *code.get(offset + 1).ok_or_else(|| {
                ClassFileError::malformed(format!("truncated wide at offset {offset}"))
            })?;
            if modified == IINC { 6 } else { 4 }
        }
        other => 1 + operand_size(other).unwrap_or(0),
    };
    if offset + length > code.len() {
        return Err(ClassFileError::malformed(format!(
            "instruction at offset {offset} runs past end of code"
        )));
    }
    Ok(length)
}
