//! Second pass: the code emitter and the alternation framing shared by
//! both front-ends.

use sedge_common::error::{CompileError, CompileErrorKind};
use sedge_common::op;
use sedge_common::options::Options;
use sedge_common::tables::CharTables;

use crate::analyze::find_fixedlength;

/// Which front-end drives the branch emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    Perl,
    Posix,
}

/// Mutable state of the second pass. The code buffer is allocated from the
/// first-pass estimate with a little slack; writes past the end are
/// swallowed and reported as a code-overflow error when compilation
/// finishes, so a sizing defect can never corrupt memory.
pub(crate) struct Emitter<'a> {
    pub(crate) pat: &'a [u8],
    pub(crate) code: Vec<u8>,
    pub(crate) out: usize,
    /// The first-pass size estimate; exceeding it is an internal error.
    pub(crate) limit: usize,
    pub(crate) brackets: u16,
    pub(crate) tables: &'a CharTables,
    pub(crate) flavor: Flavor,
}

/// Per-branch results handed back to the framing code.
pub(crate) struct BranchOut {
    /// Last literal character this branch requires, −1 unset, −2 mixed.
    pub reqchar: i32,
    /// Count of mandatory literal characters.
    pub countlits: i64,
    /// Maximum bytes this branch can consume, `None` when unbounded or
    /// not computable.
    pub max_size: Option<u64>,
}

/// Folded results for a whole group.
pub(crate) struct GroupOut {
    pub reqchar: i32,
    pub countlits: i64,
    pub max_size: Option<u64>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(
        pat: &'a [u8],
        estimate: usize,
        tables: &'a CharTables,
        flavor: Flavor,
    ) -> Emitter<'a> {
        Emitter {
            pat,
            code: vec![0; estimate + 64],
            out: 0,
            limit: estimate,
            brackets: 0,
            tables,
            flavor,
        }
    }

    #[inline]
    pub(crate) fn peek(&self, i: usize) -> u8 {
        self.pat.get(i).copied().unwrap_or(0)
    }

    #[inline]
    pub(crate) fn emit(&mut self, b: u8) {
        if self.out < self.code.len() {
            self.code[self.out] = b;
        }
        self.out += 1;
    }

    #[inline]
    pub(crate) fn emit16(&mut self, v: usize) {
        self.emit((v >> 8) as u8);
        self.emit((v & 0xFF) as u8);
    }

    /// Write a 16-bit value at an already-emitted position.
    #[inline]
    pub(crate) fn put16_at(&mut self, at: usize, v: usize) {
        if at + 1 < self.code.len() {
            op::put16(&mut self.code, at, v);
        }
    }

    /// Open a gap of `by` bytes at `start`, moving `count` bytes up.
    pub(crate) fn shift_up(&mut self, start: usize, count: usize, by: usize) {
        if start + count + by <= self.code.len() {
            self.code.copy_within(start..start + count, start + by);
        }
        self.out += by;
    }

    /// Append a copy of `count` bytes starting at `src`.
    pub(crate) fn replicate(&mut self, src: usize, count: usize) {
        if self.out + count <= self.code.len() && src + count <= self.code.len() {
            self.code.copy_within(src..src + count, self.out);
        }
        self.out += count;
    }

    /// Compile a sequence of alternatives. On entry the bracket opcode has
    /// been stored at `self.out` by the caller and `*ptr` is just past the
    /// opening parenthesis; on return `*ptr` is at the closing parenthesis
    /// or the end of the pattern.
    ///
    /// `optchanged` carries an ims-byte to re-establish at the start of the
    /// group and of every branch (−1 for none). `skipbytes` reserves room
    /// after the bracket header for CREF or BRANUMBER data the caller
    /// fills in.
    pub(crate) fn compile_regex(
        &mut self,
        mut options: Options,
        mut optchanged: i32,
        ptr: &mut usize,
        lookbehind: bool,
        skipbytes: usize,
    ) -> Result<GroupOut, CompileError> {
        let start_bracket = self.out;
        let mut last_branch = self.out;
        let old_ims = options & Options::IMS;
        let mut reqchar: i32 = -1;
        let mut countlits: i64 = i64::MAX;
        let mut max_size: Option<u64> = Some(0);
        let mut first_branch = true;

        self.out = start_bracket + 3 + skipbytes;

        loop {
            if optchanged >= 0 {
                self.emit(op::OPT);
                self.emit(optchanged as u8);
                options = (options - Options::IMS) | Options::from_ims_byte(optchanged as u8);
            }

            let reverse_at = if lookbehind {
                self.emit(op::REVERSE);
                let at = self.out;
                self.emit16(0);
                Some(at)
            } else {
                None
            };

            let branch = match self.flavor {
                Flavor::Perl => self.compile_branch_perl(options, ptr, &mut optchanged)?,
                Flavor::Posix => self.compile_branch_posix(options, ptr, &mut optchanged)?,
            };

            let length = self.out - last_branch;
            self.put16_at(last_branch + 1, length);

            // The group requires a last literal only if every branch agrees
            // on one.
            if reqchar != -2 {
                if branch.reqchar >= 0 {
                    if reqchar == -1 {
                        reqchar = branch.reqchar;
                    } else if reqchar != branch.reqchar {
                        reqchar = -2;
                    }
                } else {
                    reqchar = -2;
                }
            }
            if branch.countlits < countlits {
                countlits = branch.countlits;
            }
            max_size = match (max_size, branch.max_size, first_branch) {
                (_, b, true) => b,
                (Some(a), Some(b), false) => Some(a.max(b)),
                _ => None,
            };
            first_branch = false;

            if let Some(at) = reverse_at {
                // Mark the end so the fixed-length walk stops here; the
                // byte is overwritten by the KET or ALT below.
                if self.out < self.code.len() {
                    self.code[self.out] = op::END;
                }
                let fixed = find_fixedlength(&self.code, last_branch);
                match fixed {
                    Some(n) if n <= 0xFFFF => self.put16_at(at, n),
                    _ => {
                        return Err(CompileError::new(
                            CompileErrorKind::LookbehindNotFixedLength,
                            *ptr,
                        ))
                    }
                }
            }

            if *ptr >= self.pat.len() || self.pat[*ptr] != b'|' {
                let length = self.out - start_bracket;
                self.emit(op::KET);
                self.emit16(length);
                if optchanged >= 0 {
                    self.emit(op::OPT);
                    self.emit(old_ims.ims_byte());
                }
                return Ok(GroupOut {
                    reqchar,
                    countlits,
                    max_size,
                });
            }

            if self.out < self.code.len() {
                self.code[self.out] = op::ALT;
            }
            last_branch = self.out;
            self.out += 3;
            *ptr += 1;
        }
    }
}
