//! Disassembler for compiled code streams.
//!
//! One node per line, `offset: MNEMONIC operands`. This is a development
//! and test aid; the output format is stable enough for snapshot tests but
//! not a public interface.

use crate::op;
use crate::pattern::CompiledPattern;
use std::fmt::Write;

/// Render the opcode stream of a compiled pattern.
pub fn dump(re: &CompiledPattern) -> String {
    dump_code(&re.code)
}

/// Render a raw code stream (must be END-terminated).
pub fn dump_code(code: &[u8]) -> String {
    let mut out = String::new();
    let mut pc = 0usize;

    while pc < code.len() {
        let c = code[pc];
        let _ = write!(out, "{pc:4}: ");
        pc = dump_node(code, pc, c, &mut out);
        out.push('\n');
        if c == op::END {
            break;
        }
    }
    out
}

fn dump_node(code: &[u8], pc: usize, c: u8, out: &mut String) -> usize {
    match c {
        op::CHARS => {
            let len = code[pc + 1] as usize;
            let _ = write!(out, "CHARS {}", printable(&code[pc + 2..pc + 2 + len]));
            pc + 2 + len
        }

        op::OPT => {
            let _ = write!(out, "OPT {:#04x}", code[pc + 1]);
            pc + 2
        }

        // Single characters and their repeats: char operand last.
        op::NOT | op::MAXSTAR..=op::ONCEQUERY | op::NOT_MAXSTAR..=op::NOT_ONCEQUERY => {
            let _ = write!(out, "{} '{}'", op::name(c), printable_byte(code[pc + 1]));
            pc + 2
        }
        op::MAXUPTO..=op::EXACT | op::NOT_MAXUPTO..=op::NOTEXACT => {
            let n = op::get16(code, pc + 1);
            let _ = write!(
                out,
                "{} {} '{}'",
                op::name(c),
                n,
                printable_byte(code[pc + 3])
            );
            pc + 4
        }

        op::TYPE | op::TYPENOT | op::TYPE_MAXSTAR..=op::TYPE_ONCEQUERY
        | op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEQUERY => {
            let _ = write!(out, "{} bit {}", op::name(c), code[pc + 1]);
            pc + 2
        }
        op::TYPE_MAXUPTO..=op::TYPEEXACT | op::TYPENOT_MAXUPTO..=op::TYPENOTEXACT => {
            let n = op::get16(code, pc + 1);
            let _ = write!(out, "{} {} bit {}", op::name(c), n, code[pc + 3]);
            pc + 4
        }

        op::CLASS | op::CL_MAXSTAR..=op::CL_ONCEQUERY => {
            let _ = write!(out, "{} {}", op::name(c), class_summary(&code[pc + 1..pc + 33]));
            pc + 33
        }
        op::CL_MAXRANGE..=op::CL_ONCERANGE => {
            let min = op::get16(code, pc + 33);
            let max = op::get16(code, pc + 35);
            let _ = write!(
                out,
                "{} {{{min},{max}}} {}",
                op::name(c),
                class_summary(&code[pc + 1..pc + 33])
            );
            pc + 37
        }

        op::REF | op::REF_MAXSTAR..=op::REF_ONCEQUERY => {
            let _ = write!(out, "{} \\{}", op::name(c), op::get16(code, pc + 1));
            pc + 3
        }
        op::REF_MAXRANGE..=op::REF_ONCERANGE => {
            let n = op::get16(code, pc + 1);
            let min = op::get16(code, pc + 3);
            let max = op::get16(code, pc + 5);
            let _ = write!(out, "{} \\{n} {{{min},{max}}}", op::name(c));
            pc + 7
        }

        op::ALT | op::KET | op::KET_MAXSTAR | op::KET_MINSTAR | op::KET_ONCESTAR => {
            let _ = write!(out, "{} back {}", op::name(c), op::link(code, pc));
            pc + 3
        }

        op::ASSERT | op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT | op::ONCE
        | op::COND => {
            let _ = write!(out, "{} next {}", op::name(c), op::link(code, pc));
            pc + 3
        }

        op::REVERSE | op::CREF | op::BRANUMBER => {
            let _ = write!(out, "{} {}", op::name(c), op::get16(code, pc + 1));
            pc + 3
        }

        _ if op::is_bra(c) => {
            let n = c - op::BRA;
            if n == 0 {
                let _ = write!(out, "BRA next {}", op::link(code, pc));
            } else if n > op::EXTRACT_BASIC_MAX {
                let _ = write!(out, "BRA (extended) next {}", op::link(code, pc));
            } else {
                let _ = write!(out, "BRA {} next {}", n, op::link(code, pc));
            }
            pc + 3
        }

        // END, assertions, BRAZERO and friends: no operands.
        _ => {
            let _ = write!(out, "{}", op::name(c));
            pc + 1
        }
    }
}

fn printable_byte(b: u8) -> String {
    if (0x20..0x7f).contains(&b) && b != b'\'' && b != b'\\' {
        (b as char).to_string()
    } else {
        format!("\\x{b:02x}")
    }
}

fn printable(bytes: &[u8]) -> String {
    let mut s = String::from("\"");
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            s.push(b as char);
        } else {
            let _ = write!(s, "\\x{b:02x}");
        }
    }
    s.push('"');
    s
}

fn class_summary(map: &[u8]) -> String {
    let mut s = String::from("[");
    let mut run: Option<(u8, u8)> = None;
    for i in 0..=255u8 {
        let set = map[(i >> 3) as usize] & (1 << (i & 7)) != 0;
        match (set, run) {
            (true, None) => run = Some((i, i)),
            (true, Some((lo, _))) => run = Some((lo, i)),
            (false, Some((lo, hi))) => {
                push_range(&mut s, lo, hi);
                run = None;
            }
            (false, None) => {}
        }
    }
    if let Some((lo, hi)) = run {
        push_range(&mut s, lo, hi);
    }
    s.push(']');
    s
}

fn push_range(s: &mut String, lo: u8, hi: u8) {
    if s.len() > 1 {
        s.push(' ');
    }
    if lo == hi {
        let _ = write!(s, "{:02x}", lo);
    } else {
        let _ = write!(s, "{:02x}-{:02x}", lo, hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op;

    #[test]
    fn dumps_a_simple_stream() {
        // BRA CHARS "ab" ANY KET END, with both links spanning the group.
        let code = vec![
            op::BRA,
            0,
            8,
            op::CHARS,
            2,
            b'a',
            b'b',
            op::ANY,
            op::KET,
            0,
            8,
            op::END,
        ];
        let text = dump_code(&code);
        assert!(text.contains("BRA next 8"));
        assert!(text.contains("CHARS \"ab\""));
        assert!(text.contains("ANY"));
        assert!(text.contains("KET back 8"));
        assert!(text.trim_end().ends_with("END"));
    }

    #[test]
    fn class_ranges_compress() {
        let mut map = [0u8; 32];
        for b in b'a'..=b'c' {
            map[(b >> 3) as usize] |= 1 << (b & 7);
        }
        map[(b'x' >> 3) as usize] |= 1 << (b'x' & 7);
        assert_eq!(class_summary(&map), "[61-63 78]");
    }
}
