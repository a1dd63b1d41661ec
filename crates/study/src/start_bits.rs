//! First-byte bitmap construction.
//!
//! Used when no single first character and no Boyer–Moore prefix exist:
//! collect every byte that could begin a match across all branches,
//! recursing through groups, positive lookaheads, and zero-minimum items.
//! Fails (returns false) whenever any branch start cannot be pinned down.

use sedge_common::op;
use sedge_common::tables::{ctype, Bitset, CharTables};

#[inline]
fn byte(code: &[u8], at: usize) -> u8 {
    code.get(at).copied().unwrap_or(op::END)
}

#[inline]
fn get16(code: &[u8], at: usize) -> usize {
    ((byte(code, at) as usize) << 8) | byte(code, at + 1) as usize
}

fn set_bit(bits: &mut Bitset, c: u8, caseless: bool, tables: &CharTables) {
    bits[(c >> 3) as usize] |= 1 << (c & 7);
    if caseless && tables.has_type(c, ctype::LETTER) {
        let f = tables.flip[c as usize];
        bits[(f >> 3) as usize] |= 1 << (f & 7);
    }
}

/// Type escapes map straight onto the class bitmaps: the ctypes bit index
/// n corresponds to the cbit table at offset 32·n.
fn or_type_bits(bits: &mut Bitset, type_bit: u8, negated: bool, tables: &CharTables) -> bool {
    if type_bit == 0 {
        return false; // `.` can start with anything: give up
    }
    let offset = 32 * type_bit as usize;
    if offset + 32 > tables.cbits.len() {
        return false;
    }
    for (i, b) in bits.iter_mut().enumerate() {
        let v = tables.cbits[offset + i];
        *b |= if negated { !v } else { v };
    }
    true
}

fn skip_group(code: &[u8], mut at: usize) -> Option<usize> {
    loop {
        let l = get16(code, at + 1);
        if l == 0 {
            return None;
        }
        at += l;
        if byte(code, at) != op::ALT {
            return Some(at + 3);
        }
    }
}

/// Accumulate the possible starting bytes of the bracket at `at`.
pub(crate) fn build(
    code: &[u8],
    at: usize,
    bits: &mut Bitset,
    mut caseless: bool,
    tables: &CharTables,
) -> bool {
    let mut branch = at;

    loop {
        let mut tcode = branch + 3;
        let mut carry_on = true;

        while carry_on {
            let c = byte(code, tcode);

            if c >= op::BRA || c == op::ASSERT {
                if !build(code, tcode, bits, caseless, tables) {
                    return false;
                }
                break; // the group accounts for this branch's start
            }

            match c {
                op::BRANUMBER => tcode += 3,

                op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT => {
                    match skip_group(code, tcode) {
                        Some(next) => tcode = next,
                        None => return false,
                    }
                }

                op::OPT => {
                    caseless = byte(code, tcode + 1) & 0x01 != 0;
                    tcode += 2;
                }

                op::BRAZERO | op::BRAMINZERO => {
                    if !build(code, tcode + 1, bits, caseless, tables) {
                        return false;
                    }
                    match skip_group(code, tcode + 1) {
                        Some(next) => tcode = next,
                        None => return false,
                    }
                }

                // Zero-minimum single characters contribute and let the
                // walk continue to the next item.
                op::MAXSTAR | op::MINSTAR | op::ONCESTAR | op::MAXQUERY | op::MINQUERY
                | op::ONCEQUERY => {
                    set_bit(bits, byte(code, tcode + 1), caseless, tables);
                    tcode += 2;
                }

                op::MAXUPTO | op::MINUPTO | op::ONCEUPTO => {
                    set_bit(bits, byte(code, tcode + 3), caseless, tables);
                    tcode += 4;
                }

                // Mandatory single characters pin the start down.
                op::EXACT => {
                    set_bit(bits, byte(code, tcode + 3), caseless, tables);
                    carry_on = false;
                }

                op::CHARS => {
                    set_bit(bits, byte(code, tcode + 2), caseless, tables);
                    carry_on = false;
                }

                op::MAXPLUS | op::MINPLUS | op::ONCEPLUS => {
                    set_bit(bits, byte(code, tcode + 1), caseless, tables);
                    carry_on = false;
                }

                op::TYPE | op::TYPEEXACT | op::TYPE_MAXPLUS | op::TYPE_MINPLUS
                | op::TYPE_ONCEPLUS => {
                    let operand = match c {
                        op::TYPE => byte(code, tcode + 1),
                        op::TYPEEXACT => byte(code, tcode + 3),
                        _ => byte(code, tcode + 1),
                    };
                    if !or_type_bits(bits, operand, false, tables) {
                        return false;
                    }
                    carry_on = false;
                }

                op::TYPENOT | op::TYPENOTEXACT | op::TYPENOT_MAXPLUS | op::TYPENOT_MINPLUS
                | op::TYPENOT_ONCEPLUS => {
                    let operand = match c {
                        op::TYPENOT => byte(code, tcode + 1),
                        op::TYPENOTEXACT => byte(code, tcode + 3),
                        _ => byte(code, tcode + 1),
                    };
                    if !or_type_bits(bits, operand, true, tables) {
                        return false;
                    }
                    carry_on = false;
                }

                // Zero-minimum type repeats contribute and continue.
                op::TYPE_MAXSTAR..=op::TYPE_ONCEQUERY => {
                    if !or_type_bits(bits, byte(code, tcode + 1), false, tables) {
                        return false;
                    }
                    tcode += 2;
                }
                op::TYPE_MAXUPTO..=op::TYPE_ONCEUPTO => {
                    if !or_type_bits(bits, byte(code, tcode + 3), false, tables) {
                        return false;
                    }
                    tcode += 4;
                }
                op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEQUERY => {
                    if !or_type_bits(bits, byte(code, tcode + 1), true, tables) {
                        return false;
                    }
                    tcode += 2;
                }
                op::TYPENOT_MAXUPTO..=op::TYPENOT_ONCEUPTO => {
                    if !or_type_bits(bits, byte(code, tcode + 3), true, tables) {
                        return false;
                    }
                    tcode += 4;
                }

                op::CLASS | op::CL_MAXSTAR..=op::CL_ONCERANGE => {
                    if tcode + 33 > code.len() {
                        return false;
                    }
                    for (i, b) in bits.iter_mut().enumerate() {
                        *b |= code[tcode + 1 + i];
                    }
                    let kind = c;
                    tcode += 33;
                    match kind {
                        // Zero-minimum class repeats continue.
                        op::CL_MAXSTAR..=op::CL_ONCEQUERY => {}
                        op::CL_MAXRANGE..=op::CL_ONCERANGE => {
                            let min = get16(code, tcode);
                            tcode += 4;
                            if min != 0 {
                                carry_on = false;
                            }
                        }
                        // CLASS and the at-least-one repeats stop here.
                        _ => carry_on = false,
                    }
                }

                // Anything else (anchors, `.`, back references, the closing
                // ket of an empty-capable branch) defeats the analysis.
                _ => return false,
            }
        }

        branch += get16(code, branch + 1);
        if byte(code, branch) != op::ALT {
            return true;
        }
    }
}
