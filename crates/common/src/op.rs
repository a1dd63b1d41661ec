//! Opcode values and layout of the compiled code stream.
//!
//! The code stream is a flat byte vector. Opcodes are `u8` constants rather
//! than an enum because the encoding is arithmetic in two ways: capture
//! groups are encoded as `BRA + n`, and each repeatable item family lays its
//! quantifier variants out in MAX/MIN/ONCE triples so that greediness is
//! `(op - family_base) % 3` and the optimizer can rewrite a MAX or MIN
//! opcode to its ONCE sibling by adding a fixed offset.
//!
//! Inline operands:
//! - Every `BRA*`, `ALT`, `KET*`, assertion, `ONCE`, and `COND` opcode is
//!   followed by a 16-bit big-endian offset to the next `ALT` or the
//!   closing `KET`.
//! - `CHARS` carries a length byte then that many literal bytes (max 255).
//! - `CLASS` and the `CL_*` family carry a 32-byte bitmap; `CL_*RANGE` adds
//!   two 16-bit counts after the bitmap.
//! - `EXACT`/`UPTO` counts, `REVERSE` distances, `CREF`/`BRANUMBER`/`REF`
//!   numbers are 16-bit big-endian.
//! - `TYPE`/`TYPENOT` carry the type-bit index (`1 << n` into ctypes); the
//!   `OPT` operand is an ims byte.

/// End of the whole pattern.
pub const END: u8 = 0;

// Backslashed assertions, in the same order as the escape codes that
// produce them.

/// `\<` start of word.
pub const BEG_WORD: u8 = 1;
/// `\>` end of word.
pub const END_WORD: u8 = 2;
/// `\G` match only at the original start offset.
pub const ANCHOR_MATCH: u8 = 3;
/// `\B`.
pub const NOT_WORD_BOUNDARY: u8 = 4;
/// `\b`.
pub const WORD_BOUNDARY: u8 = 5;
/// `\A` start of data.
pub const SOD: u8 = 6;
/// `\Z` end of data, or before a final newline.
pub const EODN: u8 = 7;
/// `\z` end of data.
pub const EOD: u8 = 8;

/// Change the runtime ims options; one operand byte.
pub const OPT: u8 = 9;
/// `^`, varies with MULTILINE.
pub const CIRC: u8 = 10;
/// `$`, varies with MULTILINE.
pub const DOLL: u8 = 11;
/// `.`.
pub const ANY: u8 = 12;

/// A run of literal bytes: length byte + bytes.
pub const CHARS: u8 = 13;

// Single literal character repeats. Triples of {MAX, MIN, ONCE} over
// STAR, PLUS, QUERY, UPTO; EXACT has no greediness.

pub const MAXSTAR: u8 = 14;
pub const MINSTAR: u8 = 15;
pub const ONCESTAR: u8 = 16;
pub const MAXPLUS: u8 = 17;
pub const MINPLUS: u8 = 18;
pub const ONCEPLUS: u8 = 19;
pub const MAXQUERY: u8 = 20;
pub const MINQUERY: u8 = 21;
pub const ONCEQUERY: u8 = 22;
pub const MAXUPTO: u8 = 23;
pub const MINUPTO: u8 = 24;
pub const ONCEUPTO: u8 = 25;
pub const EXACT: u8 = 26;

/// Match any byte except the operand.
pub const NOT: u8 = 27;

// Negated single character repeats, same layout as above.

pub const NOT_MAXSTAR: u8 = 28;
pub const NOT_MINSTAR: u8 = 29;
pub const NOT_ONCESTAR: u8 = 30;
pub const NOT_MAXPLUS: u8 = 31;
pub const NOT_MINPLUS: u8 = 32;
pub const NOT_ONCEPLUS: u8 = 33;
pub const NOT_MAXQUERY: u8 = 34;
pub const NOT_MINQUERY: u8 = 35;
pub const NOT_ONCEQUERY: u8 = 36;
pub const NOT_MAXUPTO: u8 = 37;
pub const NOT_MINUPTO: u8 = 38;
pub const NOT_ONCEUPTO: u8 = 39;
pub const NOTEXACT: u8 = 40;

/// Character type (`\d` and friends); operand is the ctypes bit index.
pub const TYPE: u8 = 41;

pub const TYPE_MAXSTAR: u8 = 42;
pub const TYPE_MINSTAR: u8 = 43;
pub const TYPE_ONCESTAR: u8 = 44;
pub const TYPE_MAXPLUS: u8 = 45;
pub const TYPE_MINPLUS: u8 = 46;
pub const TYPE_ONCEPLUS: u8 = 47;
pub const TYPE_MAXQUERY: u8 = 48;
pub const TYPE_MINQUERY: u8 = 49;
pub const TYPE_ONCEQUERY: u8 = 50;
pub const TYPE_MAXUPTO: u8 = 51;
pub const TYPE_MINUPTO: u8 = 52;
pub const TYPE_ONCEUPTO: u8 = 53;
pub const TYPEEXACT: u8 = 54;

/// Negated character type. Operand 0 is `.` rewritten by a repeat, which is
/// special: under DOTALL it matches everything.
pub const TYPENOT: u8 = 55;

pub const TYPENOT_MAXSTAR: u8 = 56;
pub const TYPENOT_MINSTAR: u8 = 57;
pub const TYPENOT_ONCESTAR: u8 = 58;
pub const TYPENOT_MAXPLUS: u8 = 59;
pub const TYPENOT_MINPLUS: u8 = 60;
pub const TYPENOT_ONCEPLUS: u8 = 61;
pub const TYPENOT_MAXQUERY: u8 = 62;
pub const TYPENOT_MINQUERY: u8 = 63;
pub const TYPENOT_ONCEQUERY: u8 = 64;
pub const TYPENOT_MAXUPTO: u8 = 65;
pub const TYPENOT_MINUPTO: u8 = 66;
pub const TYPENOT_ONCEUPTO: u8 = 67;
pub const TYPENOTEXACT: u8 = 68;

/// 32-byte class bitmap.
pub const CLASS: u8 = 69;

// Class repeats use RANGE instead of UPTO/EXACT: min and max counts follow
// the bitmap (max 0 means unbounded).

pub const CL_MAXSTAR: u8 = 70;
pub const CL_MINSTAR: u8 = 71;
pub const CL_ONCESTAR: u8 = 72;
pub const CL_MAXPLUS: u8 = 73;
pub const CL_MINPLUS: u8 = 74;
pub const CL_ONCEPLUS: u8 = 75;
pub const CL_MAXQUERY: u8 = 76;
pub const CL_MINQUERY: u8 = 77;
pub const CL_ONCEQUERY: u8 = 78;
pub const CL_MAXRANGE: u8 = 79;
pub const CL_MINRANGE: u8 = 80;
pub const CL_ONCERANGE: u8 = 81;

/// Back reference; 16-bit group number.
pub const REF: u8 = 82;

pub const REF_MAXSTAR: u8 = 83;
pub const REF_MINSTAR: u8 = 84;
pub const REF_ONCESTAR: u8 = 85;
pub const REF_MAXPLUS: u8 = 86;
pub const REF_MINPLUS: u8 = 87;
pub const REF_ONCEPLUS: u8 = 88;
pub const REF_MAXQUERY: u8 = 89;
pub const REF_MINQUERY: u8 = 90;
pub const REF_ONCEQUERY: u8 = 91;
pub const REF_MAXRANGE: u8 = 92;
pub const REF_MINRANGE: u8 = 93;
pub const REF_ONCERANGE: u8 = 94;

/// Match the whole pattern recursively at this point.
pub const RECURSE: u8 = 95;

/// Start of an alternative branch.
pub const ALT: u8 = 96;
/// End of a group with no unbounded outer repeat.
pub const KET: u8 = 97;
/// End of a group repeated greedily for ever. The three repeating kets
/// must stay adjacent and in MAX/MIN/ONCE order.
pub const KET_MAXSTAR: u8 = 98;
pub const KET_MINSTAR: u8 = 99;
pub const KET_ONCESTAR: u8 = 100;

// The assertions must come before ONCE and COND: a subpattern opcode
// >= ONCE is known not to be an assertion.

/// `(?=`.
pub const ASSERT: u8 = 101;
/// `(?!`.
pub const ASSERT_NOT: u8 = 102;
/// `(?<=`.
pub const ASSERTBACK: u8 = 103;
/// `(?<!`.
pub const ASSERTBACK_NOT: u8 = 104;
/// Step the subject pointer back; starts each lookbehind branch.
pub const REVERSE: u8 = 105;

/// `(?>` once-only group: no backtracking into it after it matches.
pub const ONCE: u8 = 106;
/// `(?(` conditional group.
pub const COND: u8 = 107;
/// Condition reference number inside a COND.
pub const CREF: u8 = 108;

/// Optional group, preferring to take it. Must stay adjacent to BRAMINZERO.
pub const BRAZERO: u8 = 109;
/// Optional group, preferring to skip it.
pub const BRAMINZERO: u8 = 110;

/// Carries a capture number too large to encode in the opcode itself.
pub const BRANUMBER: u8 = 111;

/// Non-capturing group; `BRA + n` is capture group n.
pub const BRA: u8 = 112;

/// Highest capture number encoded directly in the opcode. Groups above this
/// use `BRA + EXTRACT_BASIC_MAX + 1` followed by a BRANUMBER operand. The
/// opcode space above BRA caps this at 255 − BRA − 1; 100 leaves headroom.
pub const EXTRACT_BASIC_MAX: u8 = 100;

/// Quantifier greediness, encoded as the position inside each triple.
pub const KIND_MAX: u8 = 0;
pub const KIND_MIN: u8 = 1;
pub const KIND_ONCE: u8 = 2;

/// Read a 16-bit big-endian value at `at`.
#[inline]
pub fn get16(code: &[u8], at: usize) -> usize {
    ((code[at] as usize) << 8) | code[at + 1] as usize
}

/// Write a 16-bit big-endian value at `at`.
#[inline]
pub fn put16(code: &mut [u8], at: usize, value: usize) {
    debug_assert!(value <= 0xFFFF);
    code[at] = (value >> 8) as u8;
    code[at + 1] = (value & 0xFF) as u8;
}

/// The link offset stored just after a bracket/ALT opcode at `at`.
#[inline]
pub fn link(code: &[u8], at: usize) -> usize {
    get16(code, at + 1)
}

/// Is this opcode a bracket (capturing or not)?
#[inline]
pub fn is_bra(op: u8) -> bool {
    op >= BRA
}

/// Mnemonic for disassembly. All `BRA + n` values print as "BRA".
pub fn name(op: u8) -> &'static str {
    match op {
        END => "END",
        BEG_WORD => "BEG_WORD",
        END_WORD => "END_WORD",
        ANCHOR_MATCH => "ANCHOR_MATCH",
        NOT_WORD_BOUNDARY => "NOT_WORD_BOUNDARY",
        WORD_BOUNDARY => "WORD_BOUNDARY",
        SOD => "SOD",
        EODN => "EODN",
        EOD => "EOD",
        OPT => "OPT",
        CIRC => "CIRC",
        DOLL => "DOLL",
        ANY => "ANY",
        CHARS => "CHARS",
        MAXSTAR => "MAXSTAR",
        MINSTAR => "MINSTAR",
        ONCESTAR => "ONCESTAR",
        MAXPLUS => "MAXPLUS",
        MINPLUS => "MINPLUS",
        ONCEPLUS => "ONCEPLUS",
        MAXQUERY => "MAXQUERY",
        MINQUERY => "MINQUERY",
        ONCEQUERY => "ONCEQUERY",
        MAXUPTO => "MAXUPTO",
        MINUPTO => "MINUPTO",
        ONCEUPTO => "ONCEUPTO",
        EXACT => "EXACT",
        NOT => "NOT",
        NOT_MAXSTAR => "NOT_MAXSTAR",
        NOT_MINSTAR => "NOT_MINSTAR",
        NOT_ONCESTAR => "NOT_ONCESTAR",
        NOT_MAXPLUS => "NOT_MAXPLUS",
        NOT_MINPLUS => "NOT_MINPLUS",
        NOT_ONCEPLUS => "NOT_ONCEPLUS",
        NOT_MAXQUERY => "NOT_MAXQUERY",
        NOT_MINQUERY => "NOT_MINQUERY",
        NOT_ONCEQUERY => "NOT_ONCEQUERY",
        NOT_MAXUPTO => "NOT_MAXUPTO",
        NOT_MINUPTO => "NOT_MINUPTO",
        NOT_ONCEUPTO => "NOT_ONCEUPTO",
        NOTEXACT => "NOTEXACT",
        TYPE => "TYPE",
        TYPE_MAXSTAR => "TYPE_MAXSTAR",
        TYPE_MINSTAR => "TYPE_MINSTAR",
        TYPE_ONCESTAR => "TYPE_ONCESTAR",
        TYPE_MAXPLUS => "TYPE_MAXPLUS",
        TYPE_MINPLUS => "TYPE_MINPLUS",
        TYPE_ONCEPLUS => "TYPE_ONCEPLUS",
        TYPE_MAXQUERY => "TYPE_MAXQUERY",
        TYPE_MINQUERY => "TYPE_MINQUERY",
        TYPE_ONCEQUERY => "TYPE_ONCEQUERY",
        TYPE_MAXUPTO => "TYPE_MAXUPTO",
        TYPE_MINUPTO => "TYPE_MINUPTO",
        TYPE_ONCEUPTO => "TYPE_ONCEUPTO",
        TYPEEXACT => "TYPEEXACT",
        TYPENOT => "TYPENOT",
        TYPENOT_MAXSTAR => "TYPENOT_MAXSTAR",
        TYPENOT_MINSTAR => "TYPENOT_MINSTAR",
        TYPENOT_ONCESTAR => "TYPENOT_ONCESTAR",
        TYPENOT_MAXPLUS => "TYPENOT_MAXPLUS",
        TYPENOT_MINPLUS => "TYPENOT_MINPLUS",
        TYPENOT_ONCEPLUS => "TYPENOT_ONCEPLUS",
        TYPENOT_MAXQUERY => "TYPENOT_MAXQUERY",
        TYPENOT_MINQUERY => "TYPENOT_MINQUERY",
        TYPENOT_ONCEQUERY => "TYPENOT_ONCEQUERY",
        TYPENOT_MAXUPTO => "TYPENOT_MAXUPTO",
        TYPENOT_MINUPTO => "TYPENOT_MINUPTO",
        TYPENOT_ONCEUPTO => "TYPENOT_ONCEUPTO",
        TYPENOTEXACT => "TYPENOTEXACT",
        CLASS => "CLASS",
        CL_MAXSTAR => "CL_MAXSTAR",
        CL_MINSTAR => "CL_MINSTAR",
        CL_ONCESTAR => "CL_ONCESTAR",
        CL_MAXPLUS => "CL_MAXPLUS",
        CL_MINPLUS => "CL_MINPLUS",
        CL_ONCEPLUS => "CL_ONCEPLUS",
        CL_MAXQUERY => "CL_MAXQUERY",
        CL_MINQUERY => "CL_MINQUERY",
        CL_ONCEQUERY => "CL_ONCEQUERY",
        CL_MAXRANGE => "CL_MAXRANGE",
        CL_MINRANGE => "CL_MINRANGE",
        CL_ONCERANGE => "CL_ONCERANGE",
        REF => "REF",
        REF_MAXSTAR => "REF_MAXSTAR",
        REF_MINSTAR => "REF_MINSTAR",
        REF_ONCESTAR => "REF_ONCESTAR",
        REF_MAXPLUS => "REF_MAXPLUS",
        REF_MINPLUS => "REF_MINPLUS",
        REF_ONCEPLUS => "REF_ONCEPLUS",
        REF_MAXQUERY => "REF_MAXQUERY",
        REF_MINQUERY => "REF_MINQUERY",
        REF_ONCEQUERY => "REF_ONCEQUERY",
        REF_MAXRANGE => "REF_MAXRANGE",
        REF_MINRANGE => "REF_MINRANGE",
        REF_ONCERANGE => "REF_ONCERANGE",
        RECURSE => "RECURSE",
        ALT => "ALT",
        KET => "KET",
        KET_MAXSTAR => "KET_MAXSTAR",
        KET_MINSTAR => "KET_MINSTAR",
        KET_ONCESTAR => "KET_ONCESTAR",
        ASSERT => "ASSERT",
        ASSERT_NOT => "ASSERT_NOT",
        ASSERTBACK => "ASSERTBACK",
        ASSERTBACK_NOT => "ASSERTBACK_NOT",
        REVERSE => "REVERSE",
        ONCE => "ONCE",
        COND => "COND",
        CREF => "CREF",
        BRAZERO => "BRAZERO",
        BRAMINZERO => "BRAMINZERO",
        BRANUMBER => "BRANUMBER",
        _ => "BRA",
    }
}
