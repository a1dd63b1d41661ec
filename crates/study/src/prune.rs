//! Backtracking-path pruning.
//!
//! For every position in a bracket, compute the set of characters the item
//! there can start and end with. When a repeatable item is followed by an
//! item whose start set is disjoint from it, giving characters back can
//! never let the next item match, so the repeat is rewritten to its
//! possessive (ONCE) form in place. Sets are tracked per capturing group
//! so back references inherit the referenced group's sets; assertions
//! prefix their set onto whatever follows. Anything unclear widens to the
//! full set, which simply prevents pruning.

use sedge_common::op;
use sedge_common::tables::{bit_set, Bitset, CharTables};

#[inline]
fn byte(code: &[u8], at: usize) -> u8 {
    code.get(at).copied().unwrap_or(op::END)
}

#[inline]
fn get16(code: &[u8], at: usize) -> usize {
    ((byte(code, at) as usize) << 8) | byte(code, at + 1) as usize
}

const ALL: Bitset = [0xFF; 32];
const NONE: Bitset = [0x00; 32];

fn disjoint(a: &Bitset, b: &Bitset) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x & y == 0)
}

fn or_into(dst: &mut Bitset, src: &Bitset) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d |= *s;
    }
}

fn class_from_cbits(tables: &CharTables, type_bit: u8, negated: bool) -> Bitset {
    if type_bit == 0 {
        return ALL;
    }
    let offset = 32 * type_bit as usize;
    let mut out = NONE;
    if offset + 32 <= tables.cbits.len() {
        for (i, b) in out.iter_mut().enumerate() {
            let v = tables.cbits[offset + i];
            *b = if negated { !v } else { v };
        }
    } else {
        out = ALL;
    }
    out
}

fn set_with_case(set: &mut Bitset, c: u8, caseless: bool, tables: &CharTables) {
    bit_set(set, c);
    if caseless {
        bit_set(set, tables.flip[c as usize]);
    }
}

/// The possessive sibling of a repeat opcode, or 0 if the opcode is not a
/// backtracking repeat.
fn possessive(c: u8) -> u8 {
    match c {
        op::MAXSTAR..=op::ONCESTAR => op::ONCESTAR,
        op::MAXPLUS..=op::ONCEPLUS => op::ONCEPLUS,
        op::MAXQUERY..=op::ONCEQUERY => op::ONCEQUERY,
        op::MAXUPTO..=op::ONCEUPTO => op::ONCEUPTO,
        op::NOT_MAXSTAR..=op::NOT_ONCESTAR => op::NOT_ONCESTAR,
        op::NOT_MAXPLUS..=op::NOT_ONCEPLUS => op::NOT_ONCEPLUS,
        op::NOT_MAXQUERY..=op::NOT_ONCEQUERY => op::NOT_ONCEQUERY,
        op::NOT_MAXUPTO..=op::NOT_ONCEUPTO => op::NOT_ONCEUPTO,
        op::TYPE_MAXSTAR..=op::TYPE_ONCESTAR => op::TYPE_ONCESTAR,
        op::TYPE_MAXPLUS..=op::TYPE_ONCEPLUS => op::TYPE_ONCEPLUS,
        op::TYPE_MAXQUERY..=op::TYPE_ONCEQUERY => op::TYPE_ONCEQUERY,
        op::TYPE_MAXUPTO..=op::TYPE_ONCEUPTO => op::TYPE_ONCEUPTO,
        op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCESTAR => op::TYPENOT_ONCESTAR,
        op::TYPENOT_MAXPLUS..=op::TYPENOT_ONCEPLUS => op::TYPENOT_ONCEPLUS,
        op::TYPENOT_MAXQUERY..=op::TYPENOT_ONCEQUERY => op::TYPENOT_ONCEQUERY,
        op::TYPENOT_MAXUPTO..=op::TYPENOT_ONCEUPTO => op::TYPENOT_ONCEUPTO,
        op::CL_MAXSTAR..=op::CL_ONCESTAR => op::CL_ONCESTAR,
        op::CL_MAXPLUS..=op::CL_ONCEPLUS => op::CL_ONCEPLUS,
        op::CL_MAXQUERY..=op::CL_ONCEQUERY => op::CL_ONCEQUERY,
        op::CL_MAXRANGE..=op::CL_ONCERANGE => op::CL_ONCERANGE,
        op::REF_MAXSTAR..=op::REF_ONCESTAR => op::REF_ONCESTAR,
        op::REF_MAXPLUS..=op::REF_ONCEPLUS => op::REF_ONCEPLUS,
        op::REF_MAXQUERY..=op::REF_ONCEQUERY => op::REF_ONCEQUERY,
        op::REF_MAXRANGE..=op::REF_ONCERANGE => op::REF_ONCERANGE,
        op::KET_MAXSTAR..=op::KET_ONCESTAR => op::KET_ONCESTAR,
        _ => 0,
    }
}

/// Is this the greedy member of its repeat triple? Only greedy repeats may
/// be pruned when they trail the whole pattern: a reluctant one could
/// still grow past a NOTEMPTY rejection.
fn is_greedy_max(c: u8) -> bool {
    match c {
        op::MAXSTAR..=op::ONCEUPTO => (c - op::MAXSTAR) % 3 == 0,
        op::NOT_MAXSTAR..=op::NOT_ONCEUPTO => (c - op::NOT_MAXSTAR) % 3 == 0,
        op::TYPE_MAXSTAR..=op::TYPE_ONCEUPTO => (c - op::TYPE_MAXSTAR) % 3 == 0,
        op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEUPTO => (c - op::TYPENOT_MAXSTAR) % 3 == 0,
        op::CL_MAXSTAR..=op::CL_ONCERANGE => (c - op::CL_MAXSTAR) % 3 == 0,
        op::REF_MAXSTAR..=op::REF_ONCERANGE => (c - op::REF_MAXSTAR) % 3 == 0,
        op::KET_MAXSTAR => true,
        _ => false,
    }
}

/// Prune the whole pattern in place.
pub(crate) fn prune(code: &mut [u8], top_bracket: u16, caseless: bool, tables: &CharTables) {
    let groups = top_bracket as usize + 1;
    let mut bracket_start = vec![NONE; groups];
    let mut bracket_end = vec![NONE; groups];
    let mut pos = 0usize;
    prune_bracket(
        code,
        &mut pos,
        &mut bracket_start,
        &mut bracket_end,
        caseless,
        tables,
        None,
        None,
    );
}

/// Prune one bracket, which starts at `*pos`; on return `*pos` is just
/// past its closing ket. `p_start`/`p_end` receive the union over all
/// alternatives of the bracket's starting and ending sets; `p_end` also
/// supplies, on entry, the set of the item immediately preceding the
/// bracket. Returns whether the bracket can match empty.
#[allow(clippy::too_many_arguments)]
fn prune_bracket(
    code: &mut [u8],
    pos: &mut usize,
    bracket_start: &mut [Bitset],
    bracket_end: &mut [Bitset],
    mut caseless: bool,
    tables: &CharTables,
    mut p_start: Option<&mut Bitset>,
    mut p_end: Option<&mut Bitset>,
) -> bool {
    let init_end: Option<Bitset> = p_end.as_deref().copied();
    // At the outermost level the continuation is the end of the pattern,
    // which never needs characters given back to it.
    let top_level = p_start.is_none() && init_end.is_none();

    let mut all_start = NONE;
    let mut all_end = NONE;
    let mut bracket_can_be_empty = false;

    let mut p = *pos + 3;
    // Step over reserved condition/extended-number data at the bracket
    // head; it is also handled as a node, but starting past it keeps the
    // first real item's bookkeeping clean.
    'branches: loop {
        let mut curr: Bitset = init_end.unwrap_or(NONE);
        let mut start = NONE;
        let mut end = ALL;
        let mut previous: Option<usize> = None;
        let mut found_start = false;

        loop {
            let current = p;
            let prev_class = curr;
            curr = NONE;
            let mut can_be_empty = true;
            let mut end_same_as_start = true;
            let mut previous_override: Option<usize> = None;

            let c = byte(code, p);

            match c {
                // End of an alternative, or of the bracket itself.
                op::END
                | op::KET
                | op::KET_MAXSTAR
                | op::KET_MINSTAR
                | op::KET_ONCESTAR
                | op::ALT => {
                    if top_level {
                        if let Some(prev) = previous {
                            let pc = byte(code, prev);
                            if is_greedy_max(pc) && prev < code.len() {
                                code[prev] = possessive(pc);
                            }
                        }
                    }
                    let is_final = c != op::ALT;
                    p += 3;
                    or_into(&mut all_start, &start);
                    or_into(&mut all_end, &end);

                    if !found_start {
                        // A branch of zero-width items: the bracket can be
                        // skipped over entirely, so widen both sets.
                        bracket_can_be_empty = true;
                        all_start = ALL;
                        match init_end {
                            Some(pe) => or_into(&mut all_end, &pe),
                            None => all_end = ALL,
                        }
                    }

                    if is_final {
                        if let Some(ps) = p_start.as_deref_mut() {
                            *ps = all_start;
                        }
                        if let Some(pe) = p_end.as_deref_mut() {
                            *pe = all_end;
                        }
                        *pos = p;
                        return bracket_can_be_empty;
                    }
                    continue 'branches;
                }

                op::REVERSE | op::CREF | op::BRANUMBER => p += 3,

                op::DOLL | op::EODN => {
                    // A dollar can hold only at the end or looking at a
                    // newline, so newline is the one byte a preceding
                    // repeat must keep its hands off.
                    end_same_as_start = false;
                    end = prev_class;
                    bit_set(&mut curr, b'\n');
                    p += 1;
                }

                op::ANCHOR_MATCH | op::SOD | op::CIRC | op::EOD => p += 1,

                op::NOT_WORD_BOUNDARY | op::WORD_BOUNDARY => {
                    end_same_as_start = false;
                    end = prev_class;
                    curr = ALL;
                    p += 1;
                }

                op::BEG_WORD => {
                    curr = class_from_cbits(tables, 3, false); // word chars
                    p += 1;
                }

                op::END_WORD => {
                    curr = class_from_cbits(tables, 3, true);
                    p += 1;
                }

                op::ASSERTBACK | op::ASSERTBACK_NOT | op::ASSERT_NOT => {
                    loop {
                        let l = get16(code, p + 1);
                        if l == 0 {
                            break;
                        }
                        p += l;
                        if byte(code, p) != op::ALT {
                            break;
                        }
                    }
                    p += 3;
                    curr = ALL;
                }

                op::ASSERT => {
                    // A lookahead constrains what the next item starts
                    // with but consumes nothing.
                    prune_bracket(
                        code,
                        &mut p,
                        bracket_start,
                        bracket_end,
                        caseless,
                        tables,
                        Some(&mut curr),
                        Some(&mut end),
                    );
                    end = prev_class;
                    end_same_as_start = false;
                }

                op::OPT => {
                    caseless = byte(code, p + 1) & 0x01 != 0;
                    p += 2;
                }

                op::BRAZERO | op::BRAMINZERO => {
                    p += 1;
                    prune_bracket(
                        code,
                        &mut p,
                        bracket_start,
                        bracket_end,
                        caseless,
                        tables,
                        Some(&mut curr),
                        Some(&mut end),
                    );
                    end_same_as_start = false;
                    curr = ALL;
                    or_into(&mut end, &prev_class);
                }

                op::RECURSE => {
                    curr = ALL;
                    end = ALL;
                    end_same_as_start = false;
                    p += 1;
                }

                op::CHARS => {
                    can_be_empty = false;
                    end_same_as_start = false;
                    let n = byte(code, p + 1) as usize;
                    set_with_case(&mut curr, byte(code, p + 2), caseless, tables);
                    end = NONE;
                    set_with_case(&mut end, byte(code, p + 1 + n), caseless, tables);
                    p += 2 + n;
                }

                op::ANY => {
                    can_be_empty = false;
                    curr = ALL;
                    p += 1;
                }

                op::NOT => {
                    can_be_empty = false;
                    set_with_case(&mut curr, byte(code, p + 1), caseless, tables);
                    for b in curr.iter_mut() {
                        *b = !*b;
                    }
                    p += 2;
                }

                // Single literal repeats.
                op::EXACT | op::MAXPLUS | op::MINPLUS | op::ONCEPLUS => {
                    can_be_empty = false;
                    let at = if c == op::EXACT { p + 3 } else { p + 1 };
                    set_with_case(&mut curr, byte(code, at), caseless, tables);
                    p += if c == op::EXACT { 4 } else { 2 };
                }
                op::MAXUPTO | op::MINUPTO | op::ONCEUPTO => {
                    set_with_case(&mut curr, byte(code, p + 3), caseless, tables);
                    p += 4;
                }
                op::MAXSTAR..=op::ONCEQUERY => {
                    set_with_case(&mut curr, byte(code, p + 1), caseless, tables);
                    p += 2;
                }

                // Negated literal repeats.
                op::NOTEXACT | op::NOT_MAXPLUS | op::NOT_MINPLUS | op::NOT_ONCEPLUS => {
                    can_be_empty = false;
                    let at = if c == op::NOTEXACT { p + 3 } else { p + 1 };
                    set_with_case(&mut curr, byte(code, at), caseless, tables);
                    for b in curr.iter_mut() {
                        *b = !*b;
                    }
                    p += if c == op::NOTEXACT { 4 } else { 2 };
                }
                op::NOT_MAXUPTO | op::NOT_MINUPTO | op::NOT_ONCEUPTO => {
                    set_with_case(&mut curr, byte(code, p + 3), caseless, tables);
                    for b in curr.iter_mut() {
                        *b = !*b;
                    }
                    p += 4;
                }
                op::NOT_MAXSTAR..=op::NOT_ONCEQUERY => {
                    set_with_case(&mut curr, byte(code, p + 1), caseless, tables);
                    for b in curr.iter_mut() {
                        *b = !*b;
                    }
                    p += 2;
                }

                // Character types.
                op::TYPE => {
                    can_be_empty = false;
                    curr = class_from_cbits(tables, byte(code, p + 1), false);
                    p += 2;
                }
                op::TYPENOT => {
                    can_be_empty = false;
                    curr = class_from_cbits(tables, byte(code, p + 1), true);
                    p += 2;
                }
                op::TYPEEXACT | op::TYPE_MAXPLUS | op::TYPE_MINPLUS | op::TYPE_ONCEPLUS => {
                    can_be_empty = false;
                    let at = if c == op::TYPEEXACT { p + 3 } else { p + 1 };
                    curr = class_from_cbits(tables, byte(code, at), false);
                    p += if c == op::TYPEEXACT { 4 } else { 2 };
                }
                op::TYPE_MAXUPTO | op::TYPE_MINUPTO | op::TYPE_ONCEUPTO => {
                    curr = class_from_cbits(tables, byte(code, p + 3), false);
                    p += 4;
                }
                op::TYPE_MAXSTAR..=op::TYPE_ONCEQUERY => {
                    curr = class_from_cbits(tables, byte(code, p + 1), false);
                    p += 2;
                }
                op::TYPENOTEXACT
                | op::TYPENOT_MAXPLUS
                | op::TYPENOT_MINPLUS
                | op::TYPENOT_ONCEPLUS => {
                    can_be_empty = false;
                    let at = if c == op::TYPENOTEXACT { p + 3 } else { p + 1 };
                    curr = class_from_cbits(tables, byte(code, at), true);
                    p += if c == op::TYPENOTEXACT { 4 } else { 2 };
                }
                op::TYPENOT_MAXUPTO | op::TYPENOT_MINUPTO | op::TYPENOT_ONCEUPTO => {
                    curr = class_from_cbits(tables, byte(code, p + 3), true);
                    p += 4;
                }
                op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEQUERY => {
                    curr = class_from_cbits(tables, byte(code, p + 1), true);
                    p += 2;
                }

                // Classes.
                op::CLASS | op::CL_MAXPLUS | op::CL_MINPLUS | op::CL_ONCEPLUS => {
                    can_be_empty = false;
                    for i in 0..32 {
                        curr[i] |= byte(code, p + 1 + i);
                    }
                    p += 33;
                }
                op::CL_MAXSTAR..=op::CL_ONCEQUERY => {
                    for i in 0..32 {
                        curr[i] |= byte(code, p + 1 + i);
                    }
                    p += 33;
                }
                op::CL_MAXRANGE..=op::CL_ONCERANGE => {
                    for i in 0..32 {
                        curr[i] |= byte(code, p + 1 + i);
                    }
                    if get16(code, p + 33) != 0 {
                        can_be_empty = false;
                    }
                    p += 37;
                }

                // Back references inherit the referenced group's sets.
                op::REF | op::REF_MAXSTAR..=op::REF_ONCERANGE => {
                    let n = get16(code, p + 1);
                    end_same_as_start = false;
                    if n < bracket_start.len() {
                        curr = bracket_start[n];
                        end = bracket_end[n];
                    } else {
                        curr = ALL;
                        end = ALL;
                    }
                    p += if (op::REF_MAXRANGE..=op::REF_ONCERANGE).contains(&c) {
                        7
                    } else {
                        3
                    };
                }

                // Nested brackets of any kind.
                _ => {
                    let backref = if c >= op::BRA {
                        let n = (c - op::BRA) as usize;
                        if n > op::EXTRACT_BASIC_MAX as usize {
                            get16(code, p + 4)
                        } else {
                            n
                        }
                    } else {
                        0 // ONCE and COND use the scratch slot
                    };
                    can_be_empty = prune_bracket(
                        code,
                        &mut p,
                        bracket_start,
                        bracket_end,
                        caseless,
                        tables,
                        Some(&mut curr),
                        Some(&mut end),
                    );
                    if backref < bracket_start.len() {
                        bracket_start[backref] = curr;
                        bracket_end[backref] = end;
                    }
                    end_same_as_start = false;
                    // A group closed by a repeating ket is itself a
                    // prunable item; backtracking into it re-enters at a
                    // position where the group started before.
                    if p >= 3 && possessive(byte(code, p - 3)) != 0 {
                        previous_override = Some(p - 3);
                    }
                }
            }

            // If nothing the previous repeat matched can also start this
            // item, giving characters back cannot help: make it possessive.
            if let Some(prev) = previous {
                if !can_be_empty && disjoint(&curr, &prev_class) {
                    let rewritten = possessive(byte(code, prev));
                    if rewritten != 0 && prev < code.len() {
                        code[prev] = rewritten;
                    }
                }
            }

            if end_same_as_start {
                if can_be_empty {
                    or_into(&mut end, &curr);
                } else {
                    end = curr;
                }
            }

            if !found_start {
                found_start = !can_be_empty;
                or_into(&mut start, &curr);
            }

            previous = previous_override.or({
                if possessive(byte(code, current)) != 0 {
                    Some(current)
                } else {
                    None
                }
            });
        }
    }
}
