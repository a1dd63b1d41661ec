//! Walks over finished code: anchoring, first-character, start-of-line,
//! ends-at-dollar, and fixed-length analysis.

use sedge_common::op;
use sedge_common::options::Options;

#[inline]
fn byte(code: &[u8], at: usize) -> u8 {
    code.get(at).copied().unwrap_or(op::END)
}

#[inline]
fn get16(code: &[u8], at: usize) -> usize {
    ((byte(code, at) as usize) << 8) | byte(code, at + 1) as usize
}

#[inline]
fn link(code: &[u8], at: usize) -> usize {
    get16(code, at + 1)
}

/// Skip over nodes at a branch start that do not affect what the branch
/// matches first: option settings, condition references, extended bracket
/// numbers, word-boundary assertions, and assertions that consume nothing.
///
/// When an OPT node changes a bit in `optbit`, either stop there (for
/// callers that cannot see past a change) or fold the change into
/// `options` and carry on.
fn first_significant_code(
    code: &[u8],
    mut at: usize,
    options: &mut Options,
    optbit: Options,
    optstop: bool,
) -> usize {
    loop {
        match byte(code, at) {
            op::OPT => {
                let new = Options::from_ims_byte(byte(code, at + 1));
                if !optbit.is_empty() && (new & optbit) != (*options & optbit) {
                    if optstop {
                        return at;
                    }
                    *options = (*options - Options::IMS) | new;
                }
                at += 2;
            }
            op::CREF | op::BRANUMBER => at += 3,
            op::WORD_BOUNDARY | op::NOT_WORD_BOUNDARY => at += 1,
            op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT => {
                loop {
                    let l = link(code, at);
                    if l == 0 {
                        return at;
                    }
                    at += l;
                    if byte(code, at) != op::ALT {
                        break;
                    }
                }
                at += 3;
            }
            _ => return at,
        }
    }
}

/// Is every branch forced to match only at the starting position? True when
/// each alternative starts with `\A`, `\G`, `^` (outside multiline), a
/// bracket that is itself anchored, or `.*` under DOTALL.
pub(crate) fn is_anchored(code: &[u8], options: Options) -> bool {
    let mut options = options;
    anchored_at(code, 0, &mut options)
}

fn anchored_at(code: &[u8], mut at: usize, options: &mut Options) -> bool {
    loop {
        let scode = first_significant_code(code, at + 3, options, Options::MULTILINE, false);
        let c = byte(code, scode);
        if c >= op::BRA || c == op::ASSERT || c == op::ONCE || c == op::COND {
            if !anchored_at(code, scode, options) {
                return false;
            }
        } else if (c == op::TYPENOT_MAXSTAR || c == op::TYPENOT_MINSTAR)
            && options.contains(Options::DOTALL)
        {
            // `.*` at the start tries every position by itself.
            if byte(code, scode + 1) != 0 {
                return false;
            }
        } else if c != op::SOD
            && c != op::ANCHOR_MATCH
            && (options.contains(Options::MULTILINE) || c != op::CIRC)
        {
            return false;
        }
        let l = link(code, at);
        if l == 0 {
            return true;
        }
        at += l;
        if byte(code, at) != op::ALT {
            return true;
        }
    }
}

/// Does every branch start with `^` (or `.*`, which restarts at line
/// boundaries for non-DOTALL patterns)?
pub(crate) fn is_startline(code: &[u8]) -> bool {
    startline_at(code, 0)
}

fn startline_at(code: &[u8], mut at: usize) -> bool {
    let mut ignore = Options::empty();
    loop {
        let scode = first_significant_code(code, at + 3, &mut ignore, Options::empty(), false);
        let c = byte(code, scode);
        if c >= op::BRA || c == op::ASSERT || c == op::ONCE || c == op::COND {
            if !startline_at(code, scode) {
                return false;
            }
        } else if c == op::TYPENOT_MAXSTAR || c == op::TYPENOT_MINSTAR {
            if byte(code, scode + 1) != 0 {
                return false;
            }
        } else if c != op::CIRC {
            return false;
        }
        let l = link(code, at);
        if l == 0 {
            return true;
        }
        at += l;
        if byte(code, at) != op::ALT {
            return true;
        }
    }
}

/// The single byte every match must start with, if there is one.
pub(crate) fn find_firstchar(code: &[u8], options: &mut Options) -> Option<u8> {
    firstchar_at(code, 0, options)
}

fn firstchar_at(code: &[u8], mut at: usize, options: &mut Options) -> Option<u8> {
    let mut c: i32 = -1;
    loop {
        let scode = first_significant_code(code, at + 3, options, Options::CASELESS, true);
        let mut opv = byte(code, scode);
        if opv >= op::BRA {
            opv = op::BRA;
        }

        let d: i32 = match opv {
            op::BRA | op::ASSERT | op::ONCE | op::COND => {
                firstchar_at(code, scode, options)? as i32
            }
            op::EXACT => byte(code, scode + 3) as i32,
            op::CHARS => byte(code, scode + 2) as i32,
            op::MAXPLUS | op::MINPLUS => byte(code, scode + 1) as i32,
            _ => return None,
        };
        if c < 0 {
            c = d;
        } else if c != d {
            return None;
        }

        let l = link(code, at);
        if l == 0 {
            break;
        }
        at += l;
        if byte(code, at) != op::ALT {
            break;
        }
    }
    u8::try_from(c).ok()
}

/// Does every branch end with `$` (compiled as EOD/EODN)? Used to decide
/// whether a bounded maximum match size lets matching start near the end
/// of the subject. Conservative: anything unclear answers no.
pub(crate) fn is_endline(code: &[u8]) -> bool {
    let mut was_dollar = false;
    let mut found_dollar = false;
    let mut at = 0usize;

    loop {
        let mut is_dollar = false;
        let c = byte(code, at);
        let folded = if c >= op::BRA { op::BRA } else { c };

        match folded {
            op::EOD | op::EODN => {
                is_dollar = true;
                found_dollar = true;
            }
            op::END => return found_dollar,
            op::ALT | op::KET | op::KET_MAXSTAR | op::KET_MINSTAR | op::KET_ONCESTAR => {
                if !was_dollar {
                    return false;
                }
            }
            _ => {}
        }

        let width = node_width(code, at);
        if width == 0 {
            return false;
        }
        at += width;
        was_dollar = is_dollar;
    }
}

/// Byte width of the node at `at`, walking linearly into group headers.
/// Returns 0 for anything unrecognizable.
fn node_width(code: &[u8], at: usize) -> usize {
    let c = byte(code, at);
    if c >= op::BRA {
        return 3;
    }
    match c {
        op::END => 1,
        op::BEG_WORD..=op::EOD | op::CIRC | op::DOLL | op::ANY | op::RECURSE => 1,
        op::OPT => 2,
        op::CHARS => 2 + byte(code, at + 1) as usize,
        op::MAXSTAR..=op::ONCEQUERY | op::NOT | op::NOT_MAXSTAR..=op::NOT_ONCEQUERY => 2,
        op::MAXUPTO..=op::EXACT | op::NOT_MAXUPTO..=op::NOTEXACT => 4,
        op::TYPE | op::TYPENOT | op::TYPE_MAXSTAR..=op::TYPE_ONCEQUERY
        | op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEQUERY => 2,
        op::TYPE_MAXUPTO..=op::TYPEEXACT | op::TYPENOT_MAXUPTO..=op::TYPENOTEXACT => 4,
        op::CLASS | op::CL_MAXSTAR..=op::CL_ONCEQUERY => 33,
        op::CL_MAXRANGE..=op::CL_ONCERANGE => 37,
        op::REF | op::REF_MAXSTAR..=op::REF_ONCEQUERY => 3,
        op::REF_MAXRANGE..=op::REF_ONCERANGE => 7,
        op::ALT | op::KET | op::KET_MAXSTAR | op::KET_MINSTAR | op::KET_ONCESTAR => 3,
        op::ASSERT | op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT | op::ONCE
        | op::COND => 3,
        op::REVERSE | op::CREF | op::BRANUMBER => 3,
        op::BRAZERO | op::BRAMINZERO => 1,
        _ => 0,
    }
}

/// Fixed length in bytes of the bracket starting at `at`, or `None` when
/// any branch can match a variable amount. Needed for lookbehind.
pub(crate) fn find_fixedlength(code: &[u8], at: usize) -> Option<usize> {
    let mut length: i64 = -1;
    let mut branchlength: i64 = 0;
    let mut cc = at + 3;

    loop {
        let c = byte(code, cc);
        let folded = if c >= op::BRA { op::BRA } else { c };

        match folded {
            op::BRA | op::ONCE | op::COND => {
                branchlength += find_fixedlength(code, cc)? as i64;
                loop {
                    let l = link(code, cc);
                    if l == 0 {
                        return None;
                    }
                    cc += l;
                    if byte(code, cc) != op::ALT {
                        break;
                    }
                }
                cc += 3;
            }

            // End of a branch: at a KET it closes a nested call, at an ALT
            // it starts the next alternative, at END it ends the pattern.
            op::ALT
            | op::KET
            | op::KET_MAXSTAR
            | op::KET_MINSTAR
            | op::KET_ONCESTAR
            | op::END => {
                if length < 0 {
                    length = branchlength;
                } else if length != branchlength {
                    return None;
                }
                if byte(code, cc) != op::ALT {
                    return usize::try_from(length).ok();
                }
                cc += 3;
                branchlength = 0;
            }

            op::ASSERT | op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT => {
                loop {
                    let l = link(code, cc);
                    if l == 0 {
                        return None;
                    }
                    cc += l;
                    if byte(code, cc) != op::ALT {
                        break;
                    }
                }
                cc += 3;
            }

            op::REVERSE | op::BRANUMBER | op::CREF => cc += 3,
            op::OPT => cc += 2,

            op::SOD | op::EOD | op::EODN | op::CIRC | op::DOLL | op::NOT_WORD_BOUNDARY
            | op::WORD_BOUNDARY | op::ANCHOR_MATCH | op::BEG_WORD | op::END_WORD => cc += 1,

            op::CHARS => {
                branchlength += byte(code, cc + 1) as i64;
                cc += 2 + byte(code, cc + 1) as usize;
            }

            op::EXACT | op::TYPEEXACT | op::NOTEXACT | op::TYPENOTEXACT => {
                branchlength += get16(code, cc + 1) as i64;
                cc += 4;
            }

            op::TYPE | op::TYPENOT | op::NOT => {
                branchlength += 1;
                cc += 2;
            }

            op::ANY => {
                branchlength += 1;
                cc += 1;
            }

            op::CLASS => {
                branchlength += 1;
                cc += 33;
            }

            op::CL_MAXRANGE | op::CL_MINRANGE | op::CL_ONCERANGE => {
                let min = get16(code, cc + 33);
                let max = get16(code, cc + 35);
                if min != max {
                    return None;
                }
                branchlength += min as i64;
                cc += 37;
            }

            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hand-assembled streams; links span from each bracket to its KET.
    fn bracketed(body: &[u8]) -> Vec<u8> {
        let mut code = vec![op::BRA, 0, 0];
        code.extend_from_slice(body);
        let l = code.len();
        code.extend_from_slice(&[op::KET, 0, 0, op::END]);
        op::put16(&mut code, 1, l);
        let last = code.len() - 4;
        op::put16(&mut code, last + 1, l);
        code
    }

    #[test]
    fn anchored_on_sod() {
        let code = bracketed(&[op::SOD, op::CHARS, 1, b'a']);
        assert!(is_anchored(&code, Options::empty()));
    }

    #[test]
    fn circumflex_anchors_only_outside_multiline() {
        let code = bracketed(&[op::CIRC, op::CHARS, 1, b'a']);
        assert!(is_anchored(&code, Options::empty()));
        assert!(!is_anchored(&code, Options::MULTILINE));
        assert!(is_startline(&code));
    }

    #[test]
    fn first_char_from_chars() {
        let code = bracketed(&[op::CHARS, 2, b'a', b'b']);
        let mut opts = Options::empty();
        assert_eq!(find_firstchar(&code, &mut opts), Some(b'a'));
    }

    #[test]
    fn fixed_length_sums_items() {
        // \d "ab" . inside a bracket: 1 + 2 + 1.
        let code = bracketed(&[op::TYPE, 1, op::CHARS, 2, b'a', b'b', op::ANY]);
        assert_eq!(find_fixedlength(&code, 0), Some(4));
    }

    #[test]
    fn variable_length_is_rejected() {
        let code = bracketed(&[op::MAXSTAR, b'a']);
        assert_eq!(find_fixedlength(&code, 0), None);
    }

    #[test]
    fn endline_detection() {
        let yes = bracketed(&[op::CHARS, 1, b'a', op::EOD]);
        assert!(is_endline(&yes));
        let no = bracketed(&[op::CHARS, 1, b'a']);
        assert!(!is_endline(&no));
    }
}
