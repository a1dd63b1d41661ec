//! The per-branch emitters for the two front-ends, and the repeat and
//! character-class machinery they share.

use sedge_common::error::{CompileError, CompileErrorKind};
use sedge_common::op;
use sedge_common::options::Options;
use sedge_common::tables::{cbit, ctype};

use crate::emit::{BranchOut, Emitter};
use crate::escape::{check_escape_perl, check_escape_posix, esc, Escaped};
use crate::quant::{is_counted_repeat, read_repeat_counts};

/// POSIX class names. The first three must stay alpha, lower, upper: the
/// caseless collapse relies on their positions.
const POSIX_NAMES: [&[u8]; 14] = [
    b"alpha", b"lower", b"upper", b"alnum", b"ascii", b"cntrl", b"digit", b"graph", b"print",
    b"punct", b"space", b"word", b"xdigit", b"blank",
];

/// Up to three cbit maps that make up each named class; −1 ends the list.
const POSIX_CLASS_MAPS: [[i32; 3]; 14] = [
    [cbit::LOWER as i32, cbit::UPPER as i32, -1],                   // alpha
    [cbit::LOWER as i32, -1, -1],                                   // lower
    [cbit::UPPER as i32, -1, -1],                                   // upper
    [cbit::DIGIT as i32, cbit::LOWER as i32, cbit::UPPER as i32],   // alnum
    [cbit::PRINT as i32, cbit::CNTRL as i32, -1],                   // ascii
    [cbit::CNTRL as i32, -1, -1],                                   // cntrl
    [cbit::DIGIT as i32, -1, -1],                                   // digit
    [cbit::GRAPH as i32, -1, -1],                                   // graph
    [cbit::PRINT as i32, -1, -1],                                   // print
    [cbit::PUNCT as i32, -1, -1],                                   // punct
    [cbit::SPACE as i32, -1, -1],                                   // space
    [cbit::WORD as i32, -1, -1],                                    // word
    [cbit::XDIGIT as i32, -1, -1],                                  // xdigit
    [cbit::BLANK as i32, -1, -1],                                   // blank
];

/// `[:` / `[.` / `[=` followed by an optional `^`, letters, and the
/// matching `:]`-style terminator. Returns the terminator position.
fn check_posix_syntax(pat: &[u8], at: usize, tables: &sedge_common::CharTables) -> Option<usize> {
    let terminator = *pat.get(at + 1)?;
    let mut p = at + 2;
    if pat.get(p) == Some(&b'^') {
        p += 1;
    }
    while p + 1 < pat.len() && tables.has_type(pat[p], ctype::LETTER) {
        p += 1;
    }
    if p + 1 < pat.len() && pat[p] == terminator && pat[p + 1] == b']' {
        Some(p)
    } else {
        None
    }
}

fn check_posix_name(name: &[u8]) -> Option<usize> {
    POSIX_NAMES.iter().position(|&n| n == name)
}

#[inline]
fn add_max(ms: &mut Option<u64>, n: u64) {
    if let Some(v) = ms.as_mut() {
        *v += n;
    }
}

#[inline]
fn add_max_opt(ms: &mut Option<u64>, other: Option<u64>) {
    match (ms.as_mut(), other) {
        (Some(v), Some(o)) => *v += o,
        _ => *ms = None,
    }
}

impl<'a> Emitter<'a> {
    #[inline]
    pub(crate) fn set(&mut self, at: usize, b: u8) {
        if at < self.code.len() {
            self.code[at] = b;
        }
    }

    #[inline]
    pub(crate) fn byte_at(&self, at: usize) -> u8 {
        self.code.get(at).copied().unwrap_or(0)
    }

    #[inline]
    pub(crate) fn get16_at(&self, at: usize) -> usize {
        ((self.byte_at(at) as usize) << 8) | self.byte_at(at + 1) as usize
    }

    /// Compile one Perl-flavor branch, stopping at `|`, `)`, or the end of
    /// the pattern.
    pub(crate) fn compile_branch_perl(
        &mut self,
        mut options: Options,
        ptr: &mut usize,
        optchanged: &mut i32,
    ) -> Result<BranchOut, CompileError> {
        let len = self.pat.len();
        let greedy_default: u8 = options.contains(Options::UNGREEDY) as u8;

        let mut reqchar: i32 = -1;
        let mut prevreqchar: i32 = -1;
        let mut countlits: i64 = 0;
        let mut max_size: Option<u64> = Some(0);
        let mut previous: Option<usize> = None;
        // State of the most recent subgroup, kept outside the loop so a
        // following zero-min quantifier can back its effects off.
        let mut subreqchar: i32 = -1;
        let mut subcountlits: i64 = 0;
        let mut sub_max: Option<u64> = Some(0);

        loop {
            if *ptr >= len {
                break;
            }
            let c = self.pat[*ptr];

            if options.contains(Options::EXTENDED) {
                if self.tables.has_type(c, ctype::SPACE) {
                    *ptr += 1;
                    continue;
                }
                if c == b'#' {
                    while *ptr < len && self.pat[*ptr] != b'\n' {
                        *ptr += 1;
                    }
                    if *ptr < len {
                        *ptr += 1;
                    }
                    continue;
                }
            }

            match c {
                b'|' | b')' => break,

                b'^' => {
                    previous = None;
                    self.emit(op::CIRC);
                    *ptr += 1;
                }

                b'$' => {
                    previous = None;
                    self.emit(op::DOLL);
                    *ptr += 1;
                }

                b'.' => {
                    previous = Some(self.out);
                    self.emit(op::ANY);
                    add_max(&mut max_size, 1);
                    *ptr += 1;
                }

                b'[' => {
                    previous = Some(self.out);
                    self.compile_class(options, ptr)?;
                    add_max(&mut max_size, 1);
                    *ptr += 1;
                }

                b'{' if !is_counted_repeat(self.pat, *ptr + 1, self.tables) => {
                    self.literal_run_perl(
                        options,
                        ptr,
                        &mut reqchar,
                        &mut prevreqchar,
                        &mut countlits,
                        &mut max_size,
                        &mut previous,
                    )?;
                }

                b'*' | b'+' | b'?' | b'{' => {
                    let (repeat_min, repeat_max) = match c {
                        b'*' => (0, -1),
                        b'+' => (1, -1),
                        b'?' => (0, 1),
                        _ => {
                            let (mut mn, mut mx) = (1, 1);
                            *ptr = read_repeat_counts(
                                self.pat,
                                *ptr + 1,
                                &mut mn,
                                &mut mx,
                                self.tables,
                            )?;
                            (mn, mx)
                        }
                    };

                    let Some(prev) = previous else {
                        return Err(CompileError::new(CompileErrorKind::NothingToRepeat, *ptr));
                    };

                    let mut repeat_kind = greedy_default;
                    if *ptr + 1 < len && self.pat[*ptr + 1] == b'?' {
                        repeat_kind = 1 - greedy_default;
                        *ptr += 1;
                    }

                    self.apply_repeat(
                        prev,
                        repeat_kind,
                        repeat_min,
                        repeat_max,
                        true,
                        &mut reqchar,
                        prevreqchar,
                        &mut countlits,
                        subcountlits,
                        &mut max_size,
                        sub_max,
                        *ptr,
                    )?;
                    previous = None;
                    *ptr += 1;
                }

                b'(' => {
                    let mut skipbytes = 0usize;
                    let mut newoptions = options;
                    let mut condcount = 0usize;
                    let bravalue: u8;

                    if *ptr + 1 >= len {
                        return Err(CompileError::new(
                            CompileErrorKind::UnmatchedParentheses,
                            *ptr,
                        ));
                    }
                    *ptr += 1;

                    if self.pat[*ptr] == b'?' {
                        if *ptr + 1 >= len {
                            return Err(CompileError::new(
                                CompileErrorKind::UnmatchedParentheses,
                                *ptr,
                            ));
                        }
                        *ptr += 1;
                        match self.pat[*ptr] {
                            b'#' => {
                                *ptr += 1;
                                while *ptr < len && self.pat[*ptr] != b')' {
                                    *ptr += 1;
                                }
                                if *ptr < len {
                                    *ptr += 1;
                                }
                                continue;
                            }

                            b':' => {
                                bravalue = op::BRA;
                                *ptr += 1;
                            }

                            b'(' => {
                                bravalue = op::COND;
                                if *ptr + 1 < len
                                    && self.tables.has_type(self.pat[*ptr + 1], ctype::DIGIT)
                                {
                                    *ptr += 1;
                                    let mut condref = (self.pat[*ptr] - b'0') as usize;
                                    loop {
                                        *ptr += 1;
                                        if *ptr >= len || self.pat[*ptr] == b')' {
                                            break;
                                        }
                                        condref = condref * 10
                                            + (self.pat[*ptr].wrapping_sub(b'0')) as usize;
                                    }
                                    if condref == 0 {
                                        return Err(CompileError::new(
                                            CompileErrorKind::BadConditionZero,
                                            *ptr,
                                        ));
                                    }
                                    *ptr += 1;
                                    self.set(self.out + 3, op::CREF);
                                    self.put16_at(self.out + 4, condref.min(0xFFFF));
                                    skipbytes = 3;
                                }
                                // Otherwise the condition is an assertion,
                                // left in place to compile as the first
                                // item of the group.
                            }

                            b'=' => {
                                bravalue = op::ASSERT;
                                *ptr += 1;
                            }

                            b'!' => {
                                bravalue = op::ASSERT_NOT;
                                *ptr += 1;
                            }

                            b'<' => {
                                if *ptr + 1 < len {
                                    *ptr += 1;
                                }
                                match self.pat[*ptr] {
                                    b'=' => {
                                        bravalue = op::ASSERTBACK;
                                        *ptr += 1;
                                    }
                                    b'!' => {
                                        bravalue = op::ASSERTBACK_NOT;
                                        *ptr += 1;
                                    }
                                    _ => {
                                        return Err(CompileError::new(
                                            CompileErrorKind::BadLookbehindKind,
                                            *ptr,
                                        ));
                                    }
                                }
                            }

                            b'>' => {
                                bravalue = op::ONCE;
                                *ptr += 1;
                            }

                            b'R' => {
                                self.emit(op::RECURSE);
                                max_size = None;
                                *ptr += 2;
                                continue;
                            }

                            _ => {
                                // Inline option setting.
                                let mut set = Options::empty();
                                let mut unset = Options::empty();
                                let mut negating = false;
                                loop {
                                    if *ptr >= len {
                                        return Err(CompileError::new(
                                            CompileErrorKind::BadGroupKind,
                                            *ptr,
                                        ));
                                    }
                                    let ch = self.pat[*ptr];
                                    if ch == b')' || ch == b':' {
                                        break;
                                    }
                                    let target = if negating { &mut unset } else { &mut set };
                                    match ch {
                                        b'i' => *target |= Options::CASELESS,
                                        b'm' => *target |= Options::MULTILINE,
                                        b's' => *target |= Options::DOTALL,
                                        b'x' => *target |= Options::EXTENDED,
                                        b'U' => *target |= Options::UNGREEDY,
                                        b'X' => *target |= Options::EXTRA,
                                        b'-' => negating = true,
                                        _ => {
                                            return Err(CompileError::new(
                                                CompileErrorKind::BadGroupKind,
                                                *ptr,
                                            ));
                                        }
                                    }
                                    *ptr += 1;
                                }

                                newoptions = (options | set) - unset;

                                if *ptr < len && self.pat[*ptr] == b')' {
                                    // Freestanding setting: options change
                                    // at this level from here on.
                                    if options.contains(Options::INGROUP)
                                        && (options & Options::IMS)
                                            != (newoptions & Options::IMS)
                                    {
                                        self.emit(op::OPT);
                                        let b = newoptions.ims_byte();
                                        self.emit(b);
                                        *optchanged = b as i32;
                                    }
                                    options = newoptions;
                                    previous = None;
                                    *ptr += 1;
                                    continue;
                                }

                                // Ended with ':': a group with changed
                                // options.
                                bravalue = op::BRA;
                                *ptr += 1;
                            }
                        }
                    } else {
                        self.brackets += 1;
                        if self.brackets > op::EXTRACT_BASIC_MAX as u16 {
                            bravalue = op::BRA + op::EXTRACT_BASIC_MAX + 1;
                            self.set(self.out + 3, op::BRANUMBER);
                            self.put16_at(self.out + 4, self.brackets as usize);
                            skipbytes = 3;
                        } else {
                            bravalue = op::BRA + self.brackets as u8;
                        }
                    }

                    let start = self.out;
                    previous = if bravalue >= op::ONCE {
                        Some(start)
                    } else {
                        None
                    };
                    self.set(start, bravalue);

                    let pass_ims =
                        if (options & Options::IMS) != (newoptions & Options::IMS) {
                            (newoptions & Options::IMS).bits() as i32
                        } else {
                            -1
                        };
                    let lookbehind =
                        bravalue == op::ASSERTBACK || bravalue == op::ASSERTBACK_NOT;

                    let sub = self.compile_regex(
                        options | Options::INGROUP,
                        pass_ims,
                        ptr,
                        lookbehind,
                        skipbytes,
                    )?;

                    if bravalue == op::COND {
                        let mut tc = start;
                        loop {
                            condcount += 1;
                            let l = self.get16_at(tc + 1);
                            if l == 0 {
                                break;
                            }
                            tc += l;
                            if self.byte_at(tc) == op::KET {
                                break;
                            }
                        }
                        if condcount > 2 {
                            return Err(CompileError::new(
                                CompileErrorKind::CondTooManyBranches,
                                *ptr,
                            ));
                        }
                    }

                    subreqchar = sub.reqchar;
                    subcountlits = sub.countlits;
                    sub_max = sub.max_size;

                    if subreqchar > 0
                        && (op::is_bra(bravalue)
                            || bravalue == op::ONCE
                            || bravalue == op::ASSERT
                            || (bravalue == op::COND && condcount == 2))
                    {
                        prevreqchar = reqchar;
                        reqchar = subreqchar;
                        if bravalue != op::ASSERT {
                            countlits += subcountlits;
                        }
                    }

                    match bravalue {
                        op::ASSERT | op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT => {}
                        _ => add_max_opt(&mut max_size, sub.max_size),
                    }

                    if *ptr >= len || self.pat[*ptr] != b')' {
                        return Err(CompileError::new(
                            CompileErrorKind::UnmatchedParentheses,
                            (*ptr).min(len),
                        ));
                    }
                    *ptr += 1;
                }

                b'\\' => {
                    let save = *ptr;
                    let escaped = check_escape_perl(
                        self.pat,
                        ptr,
                        self.brackets,
                        options,
                        false,
                        self.tables,
                    )?;
                    match escaped {
                        Escaped::Backref(n) => {
                            previous = Some(self.out);
                            self.emit(op::REF);
                            self.emit16(n as usize);
                            max_size = None;
                            *ptr += 1;
                        }
                        Escaped::Special(e)
                            if (esc::FIRST_CONSUME..=esc::LAST_CONSUME).contains(&e) =>
                        {
                            let t = e - esc::FIRST_CONSUME;
                            previous = Some(self.out);
                            self.emit(if t & 1 != 0 { op::TYPE } else { op::TYPENOT });
                            self.emit((t >> 1) + 1);
                            add_max(&mut max_size, 1);
                            *ptr += 1;
                        }
                        Escaped::Special(e) => {
                            // Zero-width assertions compile to themselves.
                            previous = None;
                            self.emit(e);
                            *ptr += 1;
                        }
                        Escaped::Literal(_) => {
                            *ptr = save;
                            self.literal_run_perl(
                                options,
                                ptr,
                                &mut reqchar,
                                &mut prevreqchar,
                                &mut countlits,
                                &mut max_size,
                                &mut previous,
                            )?;
                        }
                    }
                }

                _ => {
                    self.literal_run_perl(
                        options,
                        ptr,
                        &mut reqchar,
                        &mut prevreqchar,
                        &mut countlits,
                        &mut max_size,
                        &mut previous,
                    )?;
                }
            }
        }

        Ok(BranchOut {
            reqchar,
            countlits,
            max_size,
        })
    }

    /// Compile one POSIX-flavor (ERE) branch. Quantifiers are collected
    /// and applied when the next non-quantifier is seen, so that stacked
    /// counts compose; everything is greedy.
    pub(crate) fn compile_branch_posix(
        &mut self,
        options: Options,
        ptr: &mut usize,
        _optchanged: &mut i32,
    ) -> Result<BranchOut, CompileError> {
        let len = self.pat.len();
        let greedy_default: u8 = options.contains(Options::UNGREEDY) as u8;

        let mut reqchar: i32 = -1;
        let mut prevreqchar: i32 = -1;
        let mut countlits: i64 = 0;
        let mut max_size: Option<u64> = Some(0);
        let mut previous: Option<usize> = None;
        let mut subreqchar: i32 = -1;
        let mut subcountlits: i64 = 0;
        let mut sub_max: Option<u64> = Some(0);
        let mut first = true;
        let mut repeat_min: i32 = 1;
        let mut repeat_max: i32 = 1;

        loop {
            let c = if *ptr < len { Some(self.pat[*ptr]) } else { None };

            // Apply a pending quantifier once it can no longer change.
            if (repeat_min != 1 || repeat_max != 1)
                && !matches!(c, Some(b'*' | b'+' | b'?' | b'{'))
            {
                let Some(prev) = previous else {
                    return Err(CompileError::new(
                        CompileErrorKind::UnexpectedRepeat,
                        (*ptr).min(len),
                    ));
                };

                let pv = self.byte_at(prev);
                if pv == op::CIRC || pv == op::DOLL || (1..=8).contains(&pv) {
                    // Quantified assertions: `^*` vanishes, `^{1,3}` is ^.
                    if repeat_min == 0 {
                        self.out = prev;
                    }
                } else {
                    self.apply_repeat(
                        prev,
                        greedy_default,
                        repeat_min,
                        repeat_max,
                        false,
                        &mut reqchar,
                        prevreqchar,
                        &mut countlits,
                        subcountlits,
                        &mut max_size,
                        sub_max,
                        (*ptr).min(len),
                    )?;
                }
                previous = None;
                repeat_min = 1;
                repeat_max = 1;
            }

            let Some(c) = c else { break };
            if c == b'|' || c == b')' {
                break;
            }

            match c {
                b'^' if first => {
                    previous = Some(self.out);
                    self.emit(op::CIRC);
                }

                b'$' if *ptr + 1 >= len
                    || self.pat[*ptr + 1] == b'|'
                    || self.pat[*ptr + 1] == b')' =>
                {
                    previous = None;
                    // POSIX dollars bind to the very end unless multiline.
                    self.emit(if options.contains(Options::MULTILINE) {
                        op::DOLL
                    } else {
                        op::EOD
                    });
                }

                b'.' => {
                    previous = Some(self.out);
                    self.emit(op::ANY);
                    add_max(&mut max_size, 1);
                }

                b'[' => {
                    previous = Some(self.out);
                    self.compile_class(options, ptr)?;
                    add_max(&mut max_size, 1);
                }

                b'{' if previous.is_some() => {
                    if !is_counted_repeat(self.pat, *ptr + 1, self.tables) {
                        return Err(CompileError::new(CompileErrorKind::UnmatchedBraces, *ptr));
                    }
                    *ptr = read_repeat_counts(
                        self.pat,
                        *ptr + 1,
                        &mut repeat_min,
                        &mut repeat_max,
                        self.tables,
                    )?;
                }

                b'*' if previous.is_some() => {
                    repeat_min = 0;
                    repeat_max = -1;
                }

                b'+' if previous.is_some() => {
                    repeat_max = -1;
                }

                b'?' if previous.is_some() => {
                    repeat_min = 0;
                }

                b'(' => {
                    let mut skipbytes = 0usize;
                    if *ptr + 1 >= len {
                        return Err(CompileError::new(
                            CompileErrorKind::UnmatchedParentheses,
                            *ptr,
                        ));
                    }
                    *ptr += 1;

                    self.brackets += 1;
                    let bravalue = if self.brackets > op::EXTRACT_BASIC_MAX as u16 {
                        self.set(self.out + 3, op::BRANUMBER);
                        self.put16_at(self.out + 4, self.brackets as usize);
                        skipbytes = 3;
                        op::BRA + op::EXTRACT_BASIC_MAX + 1
                    } else {
                        op::BRA + self.brackets as u8
                    };

                    previous = Some(self.out);
                    self.set(self.out, bravalue);

                    let sub =
                        self.compile_regex(options | Options::INGROUP, -1, ptr, false, skipbytes)?;

                    subreqchar = sub.reqchar;
                    subcountlits = sub.countlits;
                    sub_max = sub.max_size;

                    if subreqchar > 0 {
                        prevreqchar = reqchar;
                        reqchar = subreqchar;
                        countlits += subcountlits;
                    }
                    add_max_opt(&mut max_size, sub.max_size);

                    if *ptr >= len || self.pat[*ptr] != b')' {
                        return Err(CompileError::new(
                            CompileErrorKind::UnmatchedBraces,
                            (*ptr).min(len),
                        ));
                    }
                }

                b'\\' => {
                    let save = *ptr;
                    let escaped = check_escape_posix(self.pat, ptr, false, self.tables)?;
                    match escaped {
                        Escaped::Backref(n) => {
                            previous = Some(self.out);
                            self.emit(op::REF);
                            self.emit16(n as usize);
                            max_size = None;
                        }
                        Escaped::Special(e)
                            if (esc::FIRST_CONSUME..=esc::LAST_CONSUME).contains(&e) =>
                        {
                            let t = e - esc::FIRST_CONSUME;
                            previous = Some(self.out);
                            self.emit(if t & 1 != 0 { op::TYPE } else { op::TYPENOT });
                            self.emit((t >> 1) + 1);
                            add_max(&mut max_size, 1);
                        }
                        Escaped::Special(e) => {
                            previous = Some(self.out);
                            self.emit(e);
                        }
                        Escaped::Literal(_) => {
                            *ptr = save;
                            self.literal_run_posix(
                                ptr,
                                &mut reqchar,
                                &mut prevreqchar,
                                &mut countlits,
                                &mut max_size,
                                &mut previous,
                            )?;
                            first = false;
                            *ptr += 1;
                            continue;
                        }
                    }
                }

                _ => {
                    self.literal_run_posix(
                        ptr,
                        &mut reqchar,
                        &mut prevreqchar,
                        &mut countlits,
                        &mut max_size,
                        &mut previous,
                    )?;
                    first = false;
                    *ptr += 1;
                    continue;
                }
            }

            first = false;
            *ptr += 1;
        }

        Ok(BranchOut {
            reqchar,
            countlits,
            max_size,
        })
    }

    /// Apply a quantifier to the item starting at `prev`. `nested` selects
    /// the nested replication used by the Perl front-end for bounded group
    /// repeats; the POSIX front-end replicates flat.
    #[allow(clippy::too_many_arguments)]
    fn apply_repeat(
        &mut self,
        prev: usize,
        repeat_kind: u8,
        repeat_min: i32,
        repeat_max: i32,
        nested: bool,
        reqchar: &mut i32,
        prevreqchar: i32,
        countlits: &mut i64,
        subcountlits: i64,
        max_size: &mut Option<u64>,
        sub_max: Option<u64>,
        err_offset: usize,
    ) -> Result<(), CompileError> {
        let pv = self.byte_at(prev);

        match pv {
            op::CHARS => {
                let runlen = self.byte_at(prev + 1) as usize;
                if repeat_min == 0 {
                    *reqchar = prevreqchar;
                }
                *countlits += repeat_min as i64 - 1;
                let ch;
                if runlen == 1 {
                    ch = self.byte_at(prev + 2);
                    self.out = prev;
                } else {
                    ch = self.byte_at(prev + 1 + runlen);
                    let shorter = (runlen - 1) as u8;
                    self.set(prev + 1, shorter);
                    self.out -= 1;
                }
                self.single_max(max_size, repeat_max);
                self.single_repeat(0, repeat_kind, repeat_min, repeat_max, ch, op::CHARS, prev);
            }

            op::NOT => {
                let ch = self.byte_at(prev + 1);
                self.out = prev;
                self.single_max(max_size, repeat_max);
                self.single_repeat(
                    op::NOT - op::CHARS,
                    repeat_kind,
                    repeat_min,
                    repeat_max,
                    ch,
                    op::NOT,
                    prev,
                );
            }

            op::TYPE | op::TYPENOT | op::ANY => {
                let ch;
                if pv == op::ANY {
                    ch = 0;
                    self.set(prev, op::TYPENOT);
                } else {
                    ch = self.byte_at(prev + 1);
                }
                let prev_op = self.byte_at(prev);
                let op_type = prev_op - op::CHARS;
                self.out = prev;
                self.single_max(max_size, repeat_max);
                self.single_repeat(
                    op_type,
                    repeat_kind,
                    repeat_min,
                    repeat_max,
                    ch,
                    prev_op,
                    prev,
                );
            }

            op::CLASS | op::REF => {
                if repeat_max == 0 {
                    self.out = prev;
                    return Ok(());
                }
                let mut rt = repeat_kind;
                if pv == op::REF {
                    rt += op::REF - op::CLASS;
                } else {
                    self.single_max(max_size, repeat_max);
                }
                if repeat_min == 0 && repeat_max == -1 {
                    self.set(prev, op::CL_MAXSTAR + rt);
                } else if repeat_min == 1 && repeat_max == -1 {
                    self.set(prev, op::CL_MAXPLUS + rt);
                } else if repeat_min == 0 && repeat_max == 1 {
                    self.set(prev, op::CL_MAXQUERY + rt);
                } else {
                    self.set(prev, op::CL_MAXRANGE + rt);
                    self.emit16(repeat_min as usize);
                    let m = if repeat_max == -1 {
                        0
                    } else {
                        repeat_max as usize
                    };
                    self.emit16(m);
                }
            }

            _ if op::is_bra(pv) || pv == op::ONCE || pv == op::COND => {
                if repeat_min == 0 && subcountlits > 0 {
                    *reqchar = prevreqchar;
                    *countlits -= subcountlits;
                }
                if repeat_max < 0 {
                    *max_size = None;
                } else if repeat_max > 0 {
                    match (max_size.as_mut(), sub_max) {
                        (Some(v), Some(g)) => *v += g * (repeat_max as u64 - 1),
                        _ => *max_size = None,
                    }
                }
                self.repeat_group(prev, repeat_kind, repeat_min, repeat_max, nested);
            }

            _ => {
                return Err(CompileError::new(
                    CompileErrorKind::UnexpectedRepeat,
                    err_offset,
                ));
            }
        }
        Ok(())
    }

    /// Bump the branch maximum for a single consuming item that was counted
    /// once and now repeats up to `repeat_max` times.
    fn single_max(&mut self, max_size: &mut Option<u64>, repeat_max: i32) {
        if repeat_max < 0 {
            *max_size = None;
        } else if repeat_max > 1 {
            add_max(max_size, repeat_max as u64 - 1);
        }
    }

    /// Emit the repeat form of a single-character item. `op_type` is the
    /// opcode-family offset (0 literal, NOT, TYPE, TYPENOT); `prev_op` is
    /// the item's original opcode, needed to restore an item that a `{1,m}`
    /// bound cancelled.
    fn single_repeat(
        &mut self,
        op_type: u8,
        kind: u8,
        min: i32,
        max: i32,
        ch: u8,
        prev_op: u8,
        prev: usize,
    ) {
        if max == 0 {
            return; // {0,0}: the item vanishes entirely
        }
        let rt = kind + op_type;

        if min == 0 {
            if max == -1 {
                self.emit(op::MAXSTAR + rt);
            } else if max == 1 {
                self.emit(op::MAXQUERY + rt);
            } else {
                self.emit(op::MAXUPTO + rt);
                self.emit16(max as usize);
            }
        } else if min == 1 && max == -1 {
            self.emit(op::MAXPLUS + rt);
        } else {
            if min != 1 {
                self.emit(op::EXACT + op_type);
                self.emit16(min as usize);
            } else if prev_op == op::CHARS {
                // A one-char string was cancelled above; skip back over its
                // still-present header so it comes back into effect.
                if self.out == prev {
                    self.out += 2;
                } else {
                    let restored = self.byte_at(prev + 1) + 1;
                    self.set(prev + 1, restored);
                }
            } else if prev_op == op::NOT || prev_op == op::TYPE || prev_op == op::TYPENOT {
                self.out += 1;
            }

            if max < 0 {
                self.emit(ch);
                self.emit(op::MAXSTAR + rt);
            } else if max != min {
                self.emit(ch);
                self.emit(op::MAXUPTO + rt);
                self.emit16((max - min) as usize);
            }
        }

        self.emit(ch);
    }

    /// Replicate a bracket group for a counted repeat. Unlimited maxima
    /// retag the final KET; bounded maxima append optional copies, nested
    /// under chained brackets for the Perl flavor and flat for POSIX.
    fn repeat_group(&mut self, prev: usize, kind: u8, min: i32, max: i32, nested: bool) {
        let len = self.out - prev;
        let mut prev = prev;
        let mut max = max;

        // Locate the final KET now; an OPT reset may follow it, so the end
        // of the group is not simply the current position.
        let mut ketoffset = 0usize;
        if max == -1 {
            let mut ket = prev;
            loop {
                let l = self.get16_at(ket + 1);
                if l == 0 {
                    break;
                }
                ket += l;
                if self.byte_at(ket) == op::KET {
                    break;
                }
            }
            ketoffset = self.out - ket;
        }

        let mut bralink: Option<usize> = None;

        if min == 0 {
            if max == 0 {
                self.out = prev;
                return;
            }
            if !nested || max <= 1 {
                self.shift_up(prev, len, 1);
                self.set(prev, op::BRAZERO + kind);
                prev += 1;
            } else {
                // The original copy becomes the innermost of a chain of
                // optional brackets whose links are threaded through the
                // length fields until the ends are known.
                self.shift_up(prev, len, 4);
                self.set(prev, op::BRAZERO + kind);
                self.set(prev + 1, op::BRA);
                let link_at = prev + 2;
                let offset = bralink.map_or(0, |b| link_at - b);
                self.put16_at(link_at, offset);
                bralink = Some(link_at);
                prev += 4;
            }
            max -= 1;
        } else {
            for _ in 1..min {
                self.replicate(prev, len);
            }
            if max > 0 {
                max -= min;
            }
        }

        if max >= 0 {
            for i in (0..max).rev() {
                self.emit(op::BRAZERO + kind);
                if nested && i != 0 {
                    self.emit(op::BRA);
                    let link_at = self.out;
                    let offset = bralink.map_or(0, |b| link_at - b);
                    self.emit16(offset);
                    bralink = Some(link_at);
                }
                self.replicate(prev, len);
            }

            // Close the pending chain, giving each bracket its real length.
            while let Some(bl) = bralink {
                let offset = self.out - bl + 1;
                let old = self.get16_at(bl);
                bralink = if old == 0 { None } else { Some(bl - old) };
                self.emit(op::KET);
                self.emit16(offset);
                self.put16_at(bl, offset);
            }
        } else {
            let at = self.out - ketoffset;
            self.set(at, op::KET_MAXSTAR + kind);
        }
    }

    /// Compile a character class at `*ptr` (on the `[`), leaving `*ptr` on
    /// the closing `]`. A class with exactly one member collapses to a
    /// single-character (or negated single-character) item.
    fn compile_class(&mut self, options: Options, ptr: &mut usize) -> Result<(), CompileError> {
        let len = self.pat.len();
        let posix_flavor = self.flavor == crate::emit::Flavor::Posix;
        let start = self.out;
        self.emit(op::CLASS);

        *ptr += 1;
        let negate = *ptr < len && self.pat[*ptr] == b'^';
        if negate {
            *ptr += 1;
        }

        let mut map = [0u8; 32];
        let mut charcount: i32 = 0;
        let mut lastchar: i32 = -1;

        loop {
            if *ptr >= len
                || (*ptr == len - 1 && (self.pat[*ptr] != b']' || charcount == 0))
            {
                return Err(CompileError::new(
                    CompileErrorKind::UnterminatedClass,
                    (*ptr).min(len),
                ));
            }
            let mut c = self.pat[*ptr];
            let mut collated = false;

            // POSIX bracket expressions: [:name:], and the collating forms
            // [.ch.] and [=ch=].
            if c == b'[' && matches!(self.peek(*ptr + 1), b':' | b'.' | b'=') {
                if posix_flavor
                    && len - *ptr >= 5
                    && matches!(self.pat[*ptr + 1], b'.' | b'=')
                    && self.pat[*ptr + 3] == self.pat[*ptr + 1]
                    && self.pat[*ptr + 4] == b']'
                {
                    // A collating element of one character is just that
                    // character.
                    c = self.pat[*ptr + 2];
                    collated = true;
                    *ptr += 4;
                } else if let Some(endp) = check_posix_syntax(self.pat, *ptr, self.tables) {
                    if self.pat[*ptr + 1] != b':' {
                        return Err(CompileError::new(
                            CompileErrorKind::CollatingUnsupported,
                            *ptr,
                        ));
                    }
                    *ptr += 2;
                    let mut local_negate = false;
                    if !posix_flavor && self.pat[*ptr] == b'^' {
                        local_negate = true;
                        *ptr += 1;
                    }
                    let Some(mut class) = check_posix_name(&self.pat[*ptr..endp]) else {
                        return Err(CompileError::new(
                            CompileErrorKind::UnknownPosixClass,
                            *ptr,
                        ));
                    };

                    // Caseless matching folds upper and lower into alpha;
                    // the table order makes that a simple collapse.
                    if options.contains(Options::CASELESS) && class <= 2 {
                        class = 0;
                    }

                    for &taboffset in &POSIX_CLASS_MAPS[class] {
                        if taboffset < 0 {
                            break;
                        }
                        for (i, m) in map.iter_mut().enumerate() {
                            let bits = self.tables.cbits[i + taboffset as usize];
                            *m |= if local_negate { !bits } else { bits };
                        }
                    }

                    *ptr = endp + 1;
                    charcount = 10;
                    *ptr += 1;
                    if *ptr < len && self.pat[*ptr] == b']' {
                        break;
                    }
                    continue;
                }
                // Not valid POSIX syntax: fall through, '[' is a literal.
            }

            if c == b'\\' && !collated {
                let escaped = if posix_flavor {
                    check_escape_posix(self.pat, ptr, true, self.tables)?
                } else {
                    check_escape_perl(self.pat, ptr, self.brackets, options, true, self.tables)?
                };
                match escaped {
                    Escaped::Literal(x) => c = x,
                    Escaped::Special(esc::B) => c = 0x08, // backspace inside a class
                    Escaped::Special(e) => {
                        charcount = 10;
                        let (offset, invert) = match e {
                            esc::D => (cbit::DIGIT, false),
                            esc::BIG_D => (cbit::DIGIT, true),
                            esc::W => (cbit::WORD, false),
                            esc::BIG_W => (cbit::WORD, true),
                            esc::S => (cbit::SPACE, false),
                            esc::BIG_S => (cbit::SPACE, true),
                            _ => {
                                return Err(CompileError::new(
                                    CompileErrorKind::BadClassEscape,
                                    *ptr,
                                ));
                            }
                        };
                        for (i, m) in map.iter_mut().enumerate() {
                            let bits = self.tables.cbits[i + offset];
                            *m |= if invert { !bits } else { bits };
                        }
                        *ptr += 1;
                        if *ptr < len && self.pat[*ptr] == b']' {
                            break;
                        }
                        continue;
                    }
                    Escaped::Backref(_) => {
                        return Err(CompileError::new(
                            CompileErrorKind::BadClassEscape,
                            *ptr,
                        ));
                    }
                }
            }

            // A hyphen makes a range unless it would end at ']'.
            if self.peek(*ptr + 1) == b'-' && self.peek(*ptr + 2) != b']' && *ptr + 2 < len {
                *ptr += 2;
                let mut d = self.pat[*ptr];
                let mut range_ok = true;
                if d == b'\\' {
                    let oldptr = *ptr;
                    if posix_flavor {
                        d = match check_escape_posix(self.pat, ptr, true, self.tables)? {
                            Escaped::Literal(x) => x,
                            _ => b'\\',
                        };
                    } else {
                        match check_escape_perl(
                            self.pat,
                            ptr,
                            self.brackets,
                            options,
                            true,
                            self.tables,
                        )? {
                            Escaped::Literal(x) => d = x,
                            Escaped::Special(esc::B) => d = 0x08,
                            _ => {
                                // Not a single character: the hyphen was a
                                // literal after all.
                                *ptr = oldptr - 2;
                                range_ok = false;
                            }
                        }
                    }
                }

                if range_ok {
                    if d < c {
                        return Err(CompileError::new(
                            CompileErrorKind::RangeOutOfOrder,
                            *ptr,
                        ));
                    }
                    for k in c..=d {
                        sedge_common::tables::bit_set(&mut map, k);
                        if options.contains(Options::CASELESS) {
                            sedge_common::tables::bit_set(&mut map, self.tables.flip[k as usize]);
                        }
                        charcount += 1;
                        lastchar = k as i32;
                    }
                    *ptr += 1;
                    if *ptr < len && self.pat[*ptr] == b']' {
                        break;
                    }
                    continue;
                }
            }

            // A single character.
            sedge_common::tables::bit_set(&mut map, c);
            if options.contains(Options::CASELESS) {
                c = self.tables.flip[c as usize];
                sedge_common::tables::bit_set(&mut map, c);
            }
            charcount += 1;
            lastchar = c as i32;

            *ptr += 1;
            if *ptr < len && self.pat[*ptr] == b']' {
                break;
            }
        }

        if charcount == 1 && lastchar >= 0 {
            if negate {
                self.set(start, op::NOT);
            } else {
                self.set(start, op::CHARS);
                self.emit(1);
            }
            self.emit(lastchar as u8);
        } else {
            for i in 0..32 {
                self.emit(if negate { !map[i] } else { map[i] });
            }
        }
        Ok(())
    }

    /// Compile a run of literal characters for the Perl flavor, updating
    /// the required-character bookkeeping.
    #[allow(clippy::too_many_arguments)]
    fn literal_run_perl(
        &mut self,
        options: Options,
        ptr: &mut usize,
        reqchar: &mut i32,
        prevreqchar: &mut i32,
        countlits: &mut i64,
        max_size: &mut Option<u64>,
        previous: &mut Option<usize>,
    ) -> Result<(), CompileError> {
        let len = self.pat.len();
        let start = self.out;
        self.emit(op::CHARS);
        self.emit(0);
        let mut length = 0usize;

        loop {
            let c = self.pat[*ptr];

            if options.contains(Options::EXTENDED) {
                if self.tables.has_type(c, ctype::SPACE) {
                    *ptr += 1;
                    if *ptr >= len || self.tables.has_type(self.pat[*ptr], ctype::META) {
                        break;
                    }
                    continue;
                }
                if c == b'#' {
                    while *ptr < len && self.pat[*ptr] != b'\n' {
                        *ptr += 1;
                    }
                    if *ptr >= len {
                        break;
                    }
                    *ptr += 1;
                    if *ptr >= len || self.tables.has_type(self.pat[*ptr], ctype::META) {
                        break;
                    }
                    continue;
                }
            }

            let mut ch = c;
            if c == b'\\' {
                let save = *ptr;
                match check_escape_perl(
                    self.pat,
                    ptr,
                    self.brackets,
                    options,
                    false,
                    self.tables,
                )? {
                    Escaped::Literal(x) => ch = x,
                    _ => {
                        *ptr = save;
                        break;
                    }
                }
            }

            self.emit(ch);
            length += 1;
            *ptr += 1;
            if length >= 255 || *ptr >= len || self.tables.has_type(self.pat[*ptr], ctype::META)
            {
                break;
            }
        }

        self.set(start + 1, length as u8);
        *prevreqchar = if length > 1 {
            self.byte_at(self.out - 2) as i32
        } else {
            *reqchar
        };
        *reqchar = self.byte_at(self.out - 1) as i32;
        *countlits += length as i64;
        add_max(max_size, length as u64);
        *previous = Some(start);
        Ok(())
    }

    /// Compile a POSIX literal run. Escapes that decode to data characters
    /// join the run; the pointer is left on the run's final character.
    fn literal_run_posix(
        &mut self,
        ptr: &mut usize,
        reqchar: &mut i32,
        prevreqchar: &mut i32,
        countlits: &mut i64,
        max_size: &mut Option<u64>,
        previous: &mut Option<usize>,
    ) -> Result<(), CompileError> {
        let len = self.pat.len();
        let start = self.out;
        self.emit(op::CHARS);
        self.emit(0);
        let mut length = 0usize;

        loop {
            let mut ch = self.pat[*ptr];
            if ch == b'\\' {
                let save = *ptr;
                match check_escape_posix(self.pat, ptr, false, self.tables)? {
                    Escaped::Literal(x) => ch = x,
                    _ => {
                        *ptr = save;
                        break;
                    }
                }
            }
            self.emit(ch);
            length += 1;
            if length >= 255
                || *ptr + 1 >= len
                || self.tables.has_type(self.pat[*ptr + 1], ctype::META)
            {
                break;
            }
            *ptr += 1;
        }

        self.set(start + 1, length as u8);
        *prevreqchar = if length > 1 {
            self.byte_at(self.out - 2) as i32
        } else {
            *reqchar
        };
        *reqchar = self.byte_at(self.out - 1) as i32;
        *countlits += length as i64;
        add_max(max_size, length as u64);
        *previous = Some(start);
        Ok(())
    }
}
