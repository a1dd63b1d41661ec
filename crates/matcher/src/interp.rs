//! The recursive matcher: one attempt from a fixed starting position.
//!
//! `do_match` is a loop over the opcode at `ecode`, recursing for group
//! alternatives, assertions, and every backtracking point. Group state
//! lives in the caller's offset vector: completed captures in the low
//! pairs, in-progress entry offsets in the top slots. A chain of
//! stack-resident frames records the subject position at each group entry
//! so zero-length loop iterations can be cut off.

use sedge_common::error::ExecError;
use sedge_common::op;
use sedge_common::options::Options;
use sedge_common::tables::ctype;

pub(crate) const MATCH_CONDASSERT: u8 = 0x01;
pub(crate) const MATCH_ISGROUP: u8 = 0x02;
pub(crate) const MATCH_ISBRAZERO: u8 = 0x04;

/// Subject positions at bracket entries, linked through the host stack.
pub(crate) struct Frame<'f> {
    prev: Option<&'f Frame<'f>>,
    saved_eptr: usize,
    flags: u8,
}

/// Everything one exec call shares across the recursion.
pub(crate) struct MatchData<'a> {
    pub code: &'a [u8],
    pub subject: &'a [u8],
    pub lcc: &'a [u8; 256],
    pub ctypes: &'a [u8; 256],
    pub ovector: &'a mut [i32],
    /// Usable slots (a multiple of 3); the top third is working state.
    pub offset_end: usize,
    /// Data slots that may carry capture pairs.
    pub offset_max: usize,
    pub offset_overflow: bool,
    pub notbol: bool,
    pub noteol: bool,
    pub notempty: bool,
    pub endonly: bool,
    /// The caller's starting offset; `\G` anchors here.
    pub first_start: usize,
    /// Start of the current attempt.
    pub start_match: usize,
    pub end_match_ptr: usize,
    pub end_offset_top: usize,
}

/// A repeatable single-width item.
#[derive(Clone, Copy)]
enum Single {
    Char(u8),
    NotChar(u8),
    /// Resolved ctypes mask; a mask of 0 accepts anything.
    Type(u8),
    TypeNot(u8),
    /// Offset of a 32-byte bitmap in the code.
    Class(usize),
}

fn single_test(md: &MatchData<'_>, item: Single, ims: Options, eptr: usize) -> bool {
    let b = md.subject[eptr];
    match item {
        Single::Char(c) => {
            if ims.contains(Options::CASELESS) {
                md.lcc[b as usize] == md.lcc[c as usize]
            } else {
                b == c
            }
        }
        Single::NotChar(c) => {
            if ims.contains(Options::CASELESS) {
                md.lcc[b as usize] != md.lcc[c as usize]
            } else {
                b != c
            }
        }
        Single::Type(mask) => md.ctypes[b as usize] & mask != 0,
        Single::TypeNot(mask) => md.ctypes[b as usize] & mask == 0,
        Single::Class(data) => {
            md.code
                .get(data + (b >> 3) as usize)
                .is_some_and(|&m| m & (1 << (b & 7)) != 0)
        }
    }
}

impl<'a> MatchData<'a> {
    #[inline]
    fn byte(&self, at: usize) -> u8 {
        self.code.get(at).copied().unwrap_or(op::END)
    }

    #[inline]
    fn get16(&self, at: usize) -> usize {
        ((self.byte(at) as usize) << 8) | self.byte(at + 1) as usize
    }

    /// Skip an ALT chain to the node just after the closing ket.
    fn past_group(&self, mut at: usize) -> usize {
        loop {
            let l = self.get16(at + 1);
            if l == 0 {
                return at + 3;
            }
            at += l;
            if self.byte(at) != op::ALT {
                return at + 3;
            }
        }
    }

    /// Length the back reference for doubled group offset `offset` must
    /// match. An unset reference yields a length no subject can satisfy,
    /// so that repeats with a zero minimum still work.
    fn ref_length(&self, offset: usize, offset_top: usize, eptr: usize) -> usize {
        if offset >= offset_top
            || offset + 1 >= self.ovector.len()
            || self.ovector[offset] < 0
        {
            self.subject.len() - eptr + 1
        } else {
            (self.ovector[offset + 1] - self.ovector[offset]).max(0) as usize
        }
    }

    fn match_ref(&self, offset: usize, eptr: usize, length: usize, ims: Options) -> bool {
        if length > self.subject.len() - eptr {
            return false;
        }
        let start = self.ovector[offset] as usize;
        let group = &self.subject[start..start + length];
        let here = &self.subject[eptr..eptr + length];
        if ims.contains(Options::CASELESS) {
            group
                .iter()
                .zip(here)
                .all(|(&a, &b)| self.lcc[a as usize] == self.lcc[b as usize])
        } else {
            group == here
        }
    }

    /// Match the pattern at `ecode` against the subject at `eptr`.
    pub(crate) fn do_match(
        &mut self,
        eptr: usize,
        ecode: usize,
        offset_top: usize,
        ims: Options,
        eptrb: Option<&Frame<'_>>,
        flags: u8,
    ) -> Result<bool, ExecError> {
        let original_ims = ims;
        let mut eptr = eptr;
        let mut ecode = ecode;
        let mut offset_top = offset_top;
        let mut ims = ims;

        // Entering a bracketed group records the subject position so a
        // repeat of the group can detect an empty iteration.
        let frame;
        let mut eptrb = eptrb;
        if flags & MATCH_ISGROUP != 0 {
            frame = Frame {
                prev: eptrb,
                saved_eptr: eptr,
                flags,
            };
            eptrb = Some(&frame);
        }

        loop {
            let mut c = self.byte(ecode);
            let slen = self.subject.len();

            // Capturing bracket: save the completed pair and the working
            // slot, try each alternative, and restore all three on
            // failure. Without room in the vector it degrades to a plain
            // bracket.
            if c > op::BRA {
                let mut number = (c - op::BRA) as usize;
                if number > op::EXTRACT_BASIC_MAX as usize {
                    number = self.get16(ecode + 4);
                }
                let offset = number * 2;

                if offset < self.offset_max && number <= self.offset_end {
                    let save1 = self.ovector[offset];
                    let save2 = self.ovector[offset + 1];
                    let work = self.offset_end - number;
                    let save3 = self.ovector[work];
                    self.ovector[work] = eptr as i32;

                    let mut ec = ecode;
                    loop {
                        if self.do_match(eptr, ec + 3, offset_top, ims, eptrb, MATCH_ISGROUP)? {
                            return Ok(true);
                        }
                        ec += self.get16(ec + 1);
                        if self.byte(ec) != op::ALT {
                            break;
                        }
                    }

                    self.ovector[offset] = save1;
                    self.ovector[offset + 1] = save2;
                    self.ovector[work] = save3;
                    return Ok(false);
                }
                c = op::BRA;
            }

            match c {
                op::BRA => {
                    let mut ec = ecode;
                    loop {
                        if self.do_match(eptr, ec + 3, offset_top, ims, eptrb, MATCH_ISGROUP)? {
                            return Ok(true);
                        }
                        ec += self.get16(ec + 1);
                        if self.byte(ec) != op::ALT {
                            return Ok(false);
                        }
                    }
                }

                // Conditional group: two branches at most, checked at
                // compile time. A reference condition picks on whether
                // the group has matched; an assertion condition is
                // evaluated in condassert mode.
                op::COND => {
                    if self.byte(ecode + 3) == op::CREF {
                        let offset = self.get16(ecode + 4) * 2;
                        let set = offset < offset_top
                            && offset < self.ovector.len()
                            && self.ovector[offset] >= 0;
                        let next = if set {
                            ecode + 6
                        } else {
                            ecode + 3 + self.get16(ecode + 1)
                        };
                        return self.do_match(eptr, next, offset_top, ims, eptrb, MATCH_ISGROUP);
                    }

                    if self.do_match(
                        eptr,
                        ecode + 3,
                        offset_top,
                        ims,
                        None,
                        MATCH_CONDASSERT | MATCH_ISGROUP,
                    )? {
                        ecode += 3 + self.get16(ecode + 4);
                        while self.byte(ecode) == op::ALT {
                            let l = self.get16(ecode + 1);
                            if l == 0 {
                                break;
                            }
                            ecode += l;
                        }
                    } else {
                        ecode += self.get16(ecode + 1);
                    }
                    return self.do_match(eptr, ecode + 3, offset_top, ims, eptrb, MATCH_ISGROUP);
                }

                op::CREF | op::BRANUMBER => ecode += 3,

                op::END => {
                    if self.notempty && eptr == self.start_match {
                        return Ok(false);
                    }
                    self.end_match_ptr = eptr;
                    self.end_offset_top = offset_top;
                    return Ok(true);
                }

                op::OPT => {
                    ims = Options::from_ims_byte(self.byte(ecode + 1));
                    ecode += 2;
                }

                // Positive assertions: any branch may succeed; the subject
                // pointer does not move. Lookbehind branches begin with a
                // REVERSE that steps backwards.
                op::ASSERT | op::ASSERTBACK => {
                    let mut ec = ecode;
                    let mut matched = false;
                    loop {
                        if self.do_match(eptr, ec + 3, offset_top, ims, None, MATCH_ISGROUP)? {
                            matched = true;
                            break;
                        }
                        ec += self.get16(ec + 1);
                        if self.byte(ec) != op::ALT {
                            break;
                        }
                    }
                    if !matched {
                        return Ok(false);
                    }
                    if flags & MATCH_CONDASSERT != 0 {
                        return Ok(true);
                    }
                    ecode = self.past_group(ec);
                    offset_top = self.end_offset_top;
                }

                op::ASSERT_NOT | op::ASSERTBACK_NOT => {
                    let mut ec = ecode;
                    loop {
                        if self.do_match(eptr, ec + 3, offset_top, ims, None, MATCH_ISGROUP)? {
                            return Ok(false);
                        }
                        ec += self.get16(ec + 1);
                        if self.byte(ec) != op::ALT {
                            break;
                        }
                    }
                    if flags & MATCH_CONDASSERT != 0 {
                        return Ok(true);
                    }
                    ecode = ec + 3;
                }

                op::REVERSE => {
                    let back = self.get16(ecode + 1);
                    if back > eptr {
                        return Ok(false);
                    }
                    eptr -= back;
                    ecode += 3;
                }

                // Recurse into the whole pattern. In-progress group state
                // lives at the top of the vector and must survive the
                // nested match.
                op::RECURSE => {
                    let count = self.offset_max.min(self.offset_end);
                    let mut stack_save = [0i32; 16];
                    let mut heap_save: Vec<i32>;
                    let save: &mut [i32] = if count < 16 {
                        &mut stack_save
                    } else {
                        heap_save = vec![0; count + 1];
                        &mut heap_save
                    };
                    for i in 1..=count {
                        save[i] = self.ovector[self.offset_end - i];
                    }
                    let rc = self.do_match(eptr, 0, offset_top, ims, eptrb, MATCH_ISGROUP)?;
                    for i in 1..=count {
                        self.ovector[self.offset_end - i] = save[i];
                    }
                    if !rc {
                        return Ok(false);
                    }
                    offset_top = self.end_offset_top;
                    eptr = self.end_match_ptr;
                    ecode += 1;
                }

                // Once-only group: commit to the first branch that
                // matches; never back up into it.
                op::ONCE => {
                    let prev = ecode;
                    let saved_eptr = eptr;
                    let mut ec = ecode;
                    let mut matched = false;
                    loop {
                        if self.do_match(eptr, ec + 3, offset_top, ims, eptrb, MATCH_ISGROUP)? {
                            matched = true;
                            break;
                        }
                        ec += self.get16(ec + 1);
                        if self.byte(ec) != op::ALT {
                            break;
                        }
                    }
                    if !matched {
                        return Ok(false);
                    }

                    // Step from the successful branch to the closing ket.
                    loop {
                        let l = self.get16(ec + 1);
                        if l == 0 {
                            break;
                        }
                        ec += l;
                        if self.byte(ec) != op::ALT {
                            break;
                        }
                    }
                    offset_top = self.end_offset_top;
                    eptr = self.end_match_ptr;

                    if self.byte(ec) == op::KET || eptr == saved_eptr {
                        ecode = ec + 3;
                        continue;
                    }

                    if self.byte(ec + 3) == op::OPT {
                        ims = Options::from_ims_byte(self.byte(ec + 4));
                    }

                    if self.byte(ec) == op::KET_MINSTAR {
                        if self.do_match(eptr, ec + 3, offset_top, ims, eptrb, 0)? {
                            return Ok(true);
                        }
                        if self.do_match(eptr, prev, offset_top, ims, eptrb, MATCH_ISGROUP)? {
                            return Ok(true);
                        }
                    } else {
                        if self.do_match(eptr, prev, offset_top, ims, eptrb, MATCH_ISGROUP)? {
                            return Ok(true);
                        }
                        if self.do_match(eptr, ec + 3, offset_top, ims, eptrb, 0)? {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }

                op::ALT => {
                    loop {
                        let l = self.get16(ecode + 1);
                        if l == 0 {
                            return Err(ExecError::UnknownOpcode);
                        }
                        ecode += l;
                        if self.byte(ecode) != op::ALT {
                            break;
                        }
                    }
                }

                // Optional group, preferring to take it.
                op::BRAZERO => {
                    let next = ecode + 1;
                    if self.do_match(
                        eptr,
                        next,
                        offset_top,
                        ims,
                        eptrb,
                        MATCH_ISGROUP | MATCH_ISBRAZERO,
                    )? {
                        return Ok(true);
                    }
                    ecode = self.past_group(next);
                }

                // Optional group, preferring to skip it.
                op::BRAMINZERO => {
                    let next = ecode + 1;
                    let skip = self.past_group(next);
                    if self.do_match(eptr, skip, offset_top, ims, eptrb, MATCH_ISGROUP)? {
                        return Ok(true);
                    }
                    ecode += 1;
                }

                // Close a group. For assertions and once-groups, report
                // success upward; otherwise complete the capture, then
                // handle an unbounded outer repeat, breaking the loop if
                // the iteration matched nothing.
                op::KET | op::KET_MAXSTAR | op::KET_MINSTAR | op::KET_ONCESTAR => {
                    let prev = ecode - self.get16(ecode + 1);
                    let here = eptrb.ok_or(ExecError::UnknownOpcode)?;
                    let saved_eptr = here.saved_eptr;
                    let parent = here.prev;
                    eptrb = parent;

                    let prev_op = self.byte(prev);
                    if matches!(
                        prev_op,
                        op::ASSERT | op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT
                            | op::ONCE
                    ) {
                        self.end_match_ptr = eptr;
                        self.end_offset_top = offset_top;
                        return Ok(true);
                    }

                    if prev_op != op::COND {
                        let mut number =
                            if prev_op >= op::BRA { (prev_op - op::BRA) as usize } else { 0 };
                        if number > op::EXTRACT_BASIC_MAX as usize {
                            number = self.get16(prev + 4);
                        }
                        let offset = number * 2;

                        if number > 0 && number <= self.offset_end {
                            // An empty match is recorded only the first
                            // time, or when the group was not optional.
                            let brazero =
                                parent.is_some_and(|f| f.flags & MATCH_ISBRAZERO != 0);
                            let record = eptr > saved_eptr
                                || offset_top <= offset
                                || offset >= self.ovector.len()
                                || self.ovector[offset] == -1
                                || !brazero;
                            if record {
                                if offset >= self.offset_max {
                                    self.offset_overflow = true;
                                } else {
                                    if offset_top <= offset {
                                        offset_top = offset + 2;
                                    }
                                    self.ovector[offset] =
                                        self.ovector[self.offset_end - number];
                                    self.ovector[offset + 1] = eptr as i32;
                                }
                            }
                        }
                    }

                    ims = original_ims;

                    if self.byte(ecode) == op::KET || eptr == saved_eptr {
                        // A zero-length iteration ends the repetition,
                        // whatever its greediness.
                        ecode += 3;
                        continue;
                    }

                    if self.byte(ecode) == op::KET_MINSTAR {
                        if self.do_match(eptr, ecode + 3, offset_top, ims, parent, 0)? {
                            return Ok(true);
                        }
                        if self.do_match(eptr, prev, offset_top, ims, parent, MATCH_ISGROUP)? {
                            return Ok(true);
                        }
                    } else {
                        // KET_MAXSTAR; a possessive KET_ONCESTAR commits
                        // the same way once the group has matched.
                        if self.do_match(eptr, prev, offset_top, ims, parent, MATCH_ISGROUP)? {
                            return Ok(true);
                        }
                        if self.do_match(eptr, ecode + 3, offset_top, ims, parent, 0)? {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }

                op::CIRC => {
                    if self.notbol && eptr == 0 {
                        return Ok(false);
                    }
                    if ims.contains(Options::MULTILINE) {
                        if eptr != 0 && self.subject[eptr - 1] != b'\n' {
                            return Ok(false);
                        }
                    } else if eptr != 0 {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::SOD => {
                    if eptr != 0 {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::ANCHOR_MATCH => {
                    if eptr != self.first_start {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::DOLL => {
                    if ims.contains(Options::MULTILINE) {
                        if eptr < slen {
                            if self.subject[eptr] != b'\n' {
                                return Ok(false);
                            }
                        } else if self.noteol {
                            return Ok(false);
                        }
                        ecode += 1;
                    } else {
                        if self.noteol {
                            return Ok(false);
                        }
                        if !self.endonly {
                            if eptr + 1 < slen
                                || (eptr + 1 == slen && self.subject[eptr] != b'\n')
                            {
                                return Ok(false);
                            }
                        } else if eptr < slen {
                            return Ok(false);
                        }
                        ecode += 1;
                    }
                }

                op::EOD => {
                    if eptr < slen {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::EODN => {
                    if eptr + 1 < slen || (eptr + 1 == slen && self.subject[eptr] != b'\n') {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::WORD_BOUNDARY | op::NOT_WORD_BOUNDARY => {
                    let prev_word = eptr != 0
                        && self.ctypes[self.subject[eptr - 1] as usize] & ctype::WORD != 0;
                    let cur_word = eptr < slen
                        && self.ctypes[self.subject[eptr] as usize] & ctype::WORD != 0;
                    let fail = if c == op::WORD_BOUNDARY {
                        cur_word == prev_word
                    } else {
                        cur_word != prev_word
                    };
                    if fail {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::BEG_WORD | op::END_WORD => {
                    let prev_word = eptr != 0
                        && self.ctypes[self.subject[eptr - 1] as usize] & ctype::WORD != 0;
                    let cur_word = eptr < slen
                        && self.ctypes[self.subject[eptr] as usize] & ctype::WORD != 0;
                    let outside = if c == op::BEG_WORD { prev_word } else { cur_word };
                    if cur_word == prev_word || outside {
                        return Ok(false);
                    }
                    ecode += 1;
                }

                op::ANY => {
                    if eptr >= slen {
                        return Ok(false);
                    }
                    if !ims.contains(Options::DOTALL) && self.subject[eptr] == b'\n' {
                        return Ok(false);
                    }
                    eptr += 1;
                    ecode += 1;
                }

                op::TYPE => {
                    let mask = 1u8 << self.byte(ecode + 1);
                    if eptr >= slen || self.ctypes[self.subject[eptr] as usize] & mask == 0 {
                        return Ok(false);
                    }
                    eptr += 1;
                    ecode += 2;
                }

                op::TYPENOT => {
                    let t = self.byte(ecode + 1);
                    let mask = if t != 0 || !ims.contains(Options::DOTALL) {
                        1u8 << t
                    } else {
                        0
                    };
                    if eptr >= slen || self.ctypes[self.subject[eptr] as usize] & mask != 0 {
                        return Ok(false);
                    }
                    eptr += 1;
                    ecode += 2;
                }

                op::NOT => {
                    if eptr >= slen {
                        return Ok(false);
                    }
                    let d = self.byte(ecode + 1);
                    let (a, b) = if ims.contains(Options::CASELESS) {
                        (self.lcc[d as usize], self.lcc[self.subject[eptr] as usize])
                    } else {
                        (d, self.subject[eptr])
                    };
                    if a == b {
                        return Ok(false);
                    }
                    eptr += 1;
                    ecode += 2;
                }

                op::CHARS => {
                    let length = self.byte(ecode + 1) as usize;
                    let data = ecode + 2;
                    ecode = data + length;
                    if length > slen - eptr {
                        return Ok(false);
                    }
                    if ims.contains(Options::CASELESS) {
                        for i in 0..length {
                            if self.lcc[self.byte(data + i) as usize]
                                != self.lcc[self.subject[eptr + i] as usize]
                            {
                                return Ok(false);
                            }
                        }
                    } else {
                        for i in 0..length {
                            if self.byte(data + i) != self.subject[eptr + i] {
                                return Ok(false);
                            }
                        }
                    }
                    eptr += length;
                }

                op::CLASS => {
                    let data = ecode + 1;
                    ecode += 33;
                    if eptr >= slen || !single_test(self, Single::Class(data), ims, eptr) {
                        return Ok(false);
                    }
                    eptr += 1;
                }

                // A single back reference.
                op::REF => {
                    let offset = self.get16(ecode + 1) * 2;
                    ecode += 3;
                    let length = self.ref_length(offset, offset_top, eptr);
                    if !self.match_ref(offset, eptr, length, ims) {
                        return Ok(false);
                    }
                    eptr += length;
                }

                // Repeated back references: the unit of repetition is the
                // whole captured string.
                op::REF_MAXSTAR..=op::REF_ONCERANGE => {
                    let (kind, min, max, after) = match c {
                        op::REF_MAXSTAR..=op::REF_ONCESTAR => {
                            (c - op::REF_MAXSTAR, 0, usize::MAX, ecode + 3)
                        }
                        op::REF_MAXPLUS..=op::REF_ONCEPLUS => {
                            (c - op::REF_MAXPLUS, 1, usize::MAX, ecode + 3)
                        }
                        op::REF_MAXQUERY..=op::REF_ONCEQUERY => {
                            (c - op::REF_MAXQUERY, 0, 1, ecode + 3)
                        }
                        _ => {
                            let min = self.get16(ecode + 3);
                            let max = self.get16(ecode + 5);
                            let max = if max == 0 { usize::MAX } else { max };
                            (c - op::REF_MAXRANGE, min, max, ecode + 7)
                        }
                    };
                    let offset = self.get16(ecode + 1) * 2;
                    let length = self.ref_length(offset, offset_top, eptr);

                    // An empty reference repeats vacuously.
                    if length == 0 {
                        ecode = after;
                        continue;
                    }

                    for _ in 0..min {
                        if !self.match_ref(offset, eptr, length, ims) {
                            return Ok(false);
                        }
                        eptr += length;
                    }
                    if min == max {
                        ecode = after;
                        continue;
                    }

                    if kind == op::KIND_MIN {
                        let mut i = min;
                        loop {
                            if self.do_match(eptr, after, offset_top, ims, eptrb, 0)? {
                                return Ok(true);
                            }
                            if i >= max || !self.match_ref(offset, eptr, length, ims) {
                                return Ok(false);
                            }
                            eptr += length;
                            i += 1;
                        }
                    }

                    let pp = eptr;
                    let mut i = min;
                    while i < max && self.match_ref(offset, eptr, length, ims) {
                        eptr += length;
                        i += 1;
                    }
                    if kind == op::KIND_MAX {
                        loop {
                            if self.do_match(eptr, after, offset_top, ims, eptrb, 0)? {
                                return Ok(true);
                            }
                            if eptr < pp + length {
                                return Ok(false);
                            }
                            eptr -= length;
                        }
                    }
                    // Possessive: keep the greedy end.
                    ecode = after;
                }

                // Repeated single-width items share one engine; only the
                // membership test differs.
                op::MAXSTAR..=op::EXACT
                | op::NOT_MAXSTAR..=op::NOTEXACT
                | op::TYPE_MAXSTAR..=op::TYPEEXACT
                | op::TYPENOT_MAXSTAR..=op::TYPENOTEXACT
                | op::CL_MAXSTAR..=op::CL_ONCERANGE => {
                    let (kind, min, max, after, item) = self.decode_single(c, ecode, ims);

                    let mut i = 0;
                    while i < min {
                        if eptr >= slen || !single_test(self, item, ims, eptr) {
                            return Ok(false);
                        }
                        eptr += 1;
                        i += 1;
                    }
                    if min == max {
                        ecode = after;
                        continue;
                    }

                    if kind == op::KIND_MIN {
                        let mut i = min;
                        loop {
                            if self.do_match(eptr, after, offset_top, ims, eptrb, 0)? {
                                return Ok(true);
                            }
                            if i >= max || eptr >= slen || !single_test(self, item, ims, eptr) {
                                return Ok(false);
                            }
                            eptr += 1;
                            i += 1;
                        }
                    }

                    let pp = eptr;
                    let mut i = min;
                    while i < max && eptr < slen && single_test(self, item, ims, eptr) {
                        eptr += 1;
                        i += 1;
                    }
                    if kind == op::KIND_MAX {
                        loop {
                            if self.do_match(eptr, after, offset_top, ims, eptrb, 0)? {
                                return Ok(true);
                            }
                            if eptr == pp {
                                return Ok(false);
                            }
                            eptr -= 1;
                        }
                    }
                    // Possessive: never give anything back.
                    ecode = after;
                }

                _ => return Err(ExecError::UnknownOpcode),
            }
        }
    }

    /// Break a single-width repeat opcode into greediness, bounds, the
    /// continuation position, and the membership test.
    fn decode_single(&self, c: u8, ecode: usize, ims: Options) -> (u8, usize, usize, usize, Single) {
        let typenot_mask = |t: u8| {
            if t != 0 || !ims.contains(Options::DOTALL) {
                1u8 << t
            } else {
                0
            }
        };

        match c {
            op::EXACT => {
                let n = self.get16(ecode + 1);
                (op::KIND_MAX, n, n, ecode + 4, Single::Char(self.byte(ecode + 3)))
            }
            op::MAXUPTO..=op::ONCEUPTO => (
                c - op::MAXUPTO,
                0,
                self.get16(ecode + 1),
                ecode + 4,
                Single::Char(self.byte(ecode + 3)),
            ),
            op::MAXSTAR..=op::ONCESTAR => (
                c - op::MAXSTAR,
                0,
                usize::MAX,
                ecode + 2,
                Single::Char(self.byte(ecode + 1)),
            ),
            op::MAXPLUS..=op::ONCEPLUS => (
                c - op::MAXPLUS,
                1,
                usize::MAX,
                ecode + 2,
                Single::Char(self.byte(ecode + 1)),
            ),
            op::MAXQUERY..=op::ONCEQUERY => (
                c - op::MAXQUERY,
                0,
                1,
                ecode + 2,
                Single::Char(self.byte(ecode + 1)),
            ),

            op::NOTEXACT => {
                let n = self.get16(ecode + 1);
                (
                    op::KIND_MAX,
                    n,
                    n,
                    ecode + 4,
                    Single::NotChar(self.byte(ecode + 3)),
                )
            }
            op::NOT_MAXUPTO..=op::NOT_ONCEUPTO => (
                c - op::NOT_MAXUPTO,
                0,
                self.get16(ecode + 1),
                ecode + 4,
                Single::NotChar(self.byte(ecode + 3)),
            ),
            op::NOT_MAXSTAR..=op::NOT_ONCESTAR => (
                c - op::NOT_MAXSTAR,
                0,
                usize::MAX,
                ecode + 2,
                Single::NotChar(self.byte(ecode + 1)),
            ),
            op::NOT_MAXPLUS..=op::NOT_ONCEPLUS => (
                c - op::NOT_MAXPLUS,
                1,
                usize::MAX,
                ecode + 2,
                Single::NotChar(self.byte(ecode + 1)),
            ),
            op::NOT_MAXQUERY..=op::NOT_ONCEQUERY => (
                c - op::NOT_MAXQUERY,
                0,
                1,
                ecode + 2,
                Single::NotChar(self.byte(ecode + 1)),
            ),

            op::TYPEEXACT => {
                let n = self.get16(ecode + 1);
                (
                    op::KIND_MAX,
                    n,
                    n,
                    ecode + 4,
                    Single::Type(1u8 << self.byte(ecode + 3)),
                )
            }
            op::TYPE_MAXUPTO..=op::TYPE_ONCEUPTO => (
                c - op::TYPE_MAXUPTO,
                0,
                self.get16(ecode + 1),
                ecode + 4,
                Single::Type(1u8 << self.byte(ecode + 3)),
            ),
            op::TYPE_MAXSTAR..=op::TYPE_ONCESTAR => (
                c - op::TYPE_MAXSTAR,
                0,
                usize::MAX,
                ecode + 2,
                Single::Type(1u8 << self.byte(ecode + 1)),
            ),
            op::TYPE_MAXPLUS..=op::TYPE_ONCEPLUS => (
                c - op::TYPE_MAXPLUS,
                1,
                usize::MAX,
                ecode + 2,
                Single::Type(1u8 << self.byte(ecode + 1)),
            ),
            op::TYPE_MAXQUERY..=op::TYPE_ONCEQUERY => (
                c - op::TYPE_MAXQUERY,
                0,
                1,
                ecode + 2,
                Single::Type(1u8 << self.byte(ecode + 1)),
            ),

            op::TYPENOTEXACT => {
                let n = self.get16(ecode + 1);
                (
                    op::KIND_MAX,
                    n,
                    n,
                    ecode + 4,
                    Single::TypeNot(typenot_mask(self.byte(ecode + 3))),
                )
            }
            op::TYPENOT_MAXUPTO..=op::TYPENOT_ONCEUPTO => (
                c - op::TYPENOT_MAXUPTO,
                0,
                self.get16(ecode + 1),
                ecode + 4,
                Single::TypeNot(typenot_mask(self.byte(ecode + 3))),
            ),
            op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCESTAR => (
                c - op::TYPENOT_MAXSTAR,
                0,
                usize::MAX,
                ecode + 2,
                Single::TypeNot(typenot_mask(self.byte(ecode + 1))),
            ),
            op::TYPENOT_MAXPLUS..=op::TYPENOT_ONCEPLUS => (
                c - op::TYPENOT_MAXPLUS,
                1,
                usize::MAX,
                ecode + 2,
                Single::TypeNot(typenot_mask(self.byte(ecode + 1))),
            ),
            op::TYPENOT_MAXQUERY..=op::TYPENOT_ONCEQUERY => (
                c - op::TYPENOT_MAXQUERY,
                0,
                1,
                ecode + 2,
                Single::TypeNot(typenot_mask(self.byte(ecode + 1))),
            ),

            op::CL_MAXSTAR..=op::CL_ONCESTAR => (
                c - op::CL_MAXSTAR,
                0,
                usize::MAX,
                ecode + 33,
                Single::Class(ecode + 1),
            ),
            op::CL_MAXPLUS..=op::CL_ONCEPLUS => (
                c - op::CL_MAXPLUS,
                1,
                usize::MAX,
                ecode + 33,
                Single::Class(ecode + 1),
            ),
            op::CL_MAXQUERY..=op::CL_ONCEQUERY => (
                c - op::CL_MAXQUERY,
                0,
                1,
                ecode + 33,
                Single::Class(ecode + 1),
            ),
            _ => {
                // CL_MAXRANGE..=CL_ONCERANGE
                let min = self.get16(ecode + 33);
                let max = self.get16(ecode + 35);
                let max = if max == 0 { usize::MAX } else { max };
                (
                    c - op::CL_MAXRANGE,
                    min,
                    max,
                    ecode + 37,
                    Single::Class(ecode + 1),
                )
            }
        }
    }
}

impl<'a> MatchData<'a> {
    /// One attempt from `start_match` with the given runtime ims bits.
    pub(crate) fn attempt(&mut self, ims: Options) -> Result<bool, ExecError> {
        let start = self.start_match;
        self.do_match(start, 0, 2, ims, None, MATCH_ISGROUP)
    }
}
