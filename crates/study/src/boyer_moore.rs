//! Boyer–Moore table construction over the pattern's fixed prefix.
//!
//! The walk consumes items from the start of the pattern for as long as
//! every position has a knowable character set: literals, exact repeats,
//! types, classes, and at-least-one repeats of those. Each byte that can
//! appear at prefix distance `d` gets `table[b] = d`; the caller converts
//! the distances to skips afterwards. Anything optional or with
//! alternatives ends the prefix.

use sedge_common::op;
use sedge_common::tables::{ctype, CharTables};

#[inline]
fn byte(code: &[u8], at: usize) -> u8 {
    code.get(at).copied().unwrap_or(op::END)
}

#[inline]
fn get16(code: &[u8], at: usize) -> usize {
    ((byte(code, at) as usize) << 8) | byte(code, at + 1) as usize
}

fn set_entry(table: &mut [u8; 256], c: u8, length: usize, caseless: bool, tables: &CharTables) {
    let length = length.min(255) as u8;
    table[c as usize] = length;
    if caseless && tables.has_type(c, ctype::LETTER) {
        table[tables.flip[c as usize] as usize] = length;
    }
}

fn set_type_entries(
    table: &mut [u8; 256],
    type_bit: u8,
    negated: bool,
    length: usize,
    caseless: bool,
    tables: &CharTables,
) {
    let mask = 1u8 << type_bit;
    for i in 0..=255u8 {
        // A repeated `.` (negated type 0) admits every byte: whether it
        // takes newline depends on a runtime option, and a superset only
        // ever shortens the skip.
        let wanted = if negated {
            type_bit == 0 || !tables.has_type(i, mask)
        } else {
            type_bit != 0 && tables.has_type(i, mask)
        };
        if wanted {
            set_entry(table, i, length, caseless, tables);
        }
    }
}

fn set_class_entries(
    table: &mut [u8; 256],
    map: &[u8],
    length: usize,
    caseless: bool,
    tables: &CharTables,
) {
    for i in 0..=255u8 {
        if map[(i >> 3) as usize] & (1 << (i & 7)) != 0 {
            set_entry(table, i, length, caseless, tables);
        }
    }
}

/// Record the fixed prefix of the bracket at `at` into `table`, starting
/// at distance `length`. Returns the final prefix length.
pub(crate) fn build(
    code: &[u8],
    at: usize,
    table: &mut [u8; 256],
    mut length: usize,
    mut caseless: bool,
    tables: &CharTables,
) -> usize {
    // Alternatives at this level make the first byte ambiguous.
    let l = get16(code, at + 1);
    if l == 0 || byte(code, at + l) == op::ALT {
        return length;
    }

    let mut tcode = at + 3;
    let mut carry_on = true;

    while carry_on && length < 255 {
        let c = byte(code, tcode);

        if c >= op::BRA {
            // Recurse into the group; whatever prefix it yields is all we
            // can know.
            return build(code, tcode, table, length, caseless, tables);
        }

        match c {
            op::BRANUMBER => tcode += 3,

            op::ASSERTBACK | op::ASSERTBACK_NOT => {
                loop {
                    let l = get16(code, tcode + 1);
                    if l == 0 {
                        return length;
                    }
                    tcode += l;
                    if byte(code, tcode) != op::ALT {
                        break;
                    }
                }
                tcode += 3;
            }

            op::OPT => {
                caseless = byte(code, tcode + 1) & 0x01 != 0;
                tcode += 2;
            }

            op::BRAZERO | op::BRAMINZERO => carry_on = false,

            // At least one occurrence of a known character extends the
            // prefix by one and then stops: what follows is variable.
            op::MAXPLUS | op::MINPLUS | op::ONCEPLUS => {
                length += 1;
                set_entry(table, byte(code, tcode + 1), length, caseless, tables);
                carry_on = false;
            }

            op::MAXSTAR | op::MINSTAR | op::ONCESTAR | op::MAXQUERY | op::MINQUERY
            | op::ONCEQUERY | op::MAXUPTO | op::MINUPTO | op::ONCEUPTO => carry_on = false,

            op::EXACT => {
                length = (length + get16(code, tcode + 1)).min(255);
                set_entry(table, byte(code, tcode + 3), length, caseless, tables);
                tcode += 4;
            }

            op::CHARS => {
                let n = byte(code, tcode + 1) as usize;
                let n = n.min(255 - length);
                for k in 0..n {
                    length += 1;
                    set_entry(table, byte(code, tcode + 2 + k), length, caseless, tables);
                }
                tcode += 2 + byte(code, tcode + 1) as usize;
            }

            op::TYPE => {
                length += 1;
                set_type_entries(table, byte(code, tcode + 1), false, length, caseless, tables);
                tcode += 2;
            }

            op::TYPENOT => {
                length += 1;
                set_type_entries(table, byte(code, tcode + 1), true, length, caseless, tables);
                tcode += 2;
            }

            op::TYPEEXACT => {
                length = (length + get16(code, tcode + 1)).min(255);
                set_type_entries(table, byte(code, tcode + 3), false, length, caseless, tables);
                tcode += 4;
            }

            op::TYPENOTEXACT => {
                length = (length + get16(code, tcode + 1)).min(255);
                set_type_entries(table, byte(code, tcode + 3), true, length, caseless, tables);
                tcode += 4;
            }

            op::TYPE_MAXPLUS | op::TYPE_MINPLUS | op::TYPE_ONCEPLUS => {
                length += 1;
                set_type_entries(table, byte(code, tcode + 1), false, length, caseless, tables);
                carry_on = false;
            }

            op::TYPENOT_MAXPLUS | op::TYPENOT_MINPLUS | op::TYPENOT_ONCEPLUS => {
                length += 1;
                set_type_entries(table, byte(code, tcode + 1), true, length, caseless, tables);
                carry_on = false;
            }

            op::TYPE_MAXSTAR..=op::TYPE_ONCEQUERY
            | op::TYPE_MAXUPTO..=op::TYPE_ONCEUPTO
            | op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEQUERY
            | op::TYPENOT_MAXUPTO..=op::TYPENOT_ONCEUPTO => carry_on = false,

            op::CLASS => {
                length += 1;
                set_class_entries(table, &code[tcode + 1..tcode + 33], length, caseless, tables);
                tcode += 33;
            }

            op::CL_MAXPLUS | op::CL_MINPLUS | op::CL_ONCEPLUS => {
                length += 1;
                set_class_entries(table, &code[tcode + 1..tcode + 33], length, caseless, tables);
                carry_on = false;
            }

            op::CL_MAXRANGE | op::CL_MINRANGE | op::CL_ONCERANGE => {
                let min = get16(code, tcode + 33);
                if min > 0 {
                    length = (length + min).min(255);
                    set_class_entries(
                        table,
                        &code[tcode + 1..tcode + 33],
                        length,
                        caseless,
                        tables,
                    );
                }
                carry_on = false;
            }

            op::CL_MAXSTAR..=op::CL_ONCEQUERY => carry_on = false,

            // Anything else — assertions, alternately-shaped items, the
            // closing ket — ends the prefix.
            _ => return length,
        }
    }

    length
}
