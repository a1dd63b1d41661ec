//! A POSIX-shaped wrapper: compile with `regcomp`-style flags, execute
//! with match reporting through `regmatch_t`-style pairs, and a closed set
//! of error codes with `"<message> at offset <n>"` formatting.

use bitflags::bitflags;
use thiserror::Error;

use sedge_common::error::{CompileErrorKind, ExecError};
use sedge_common::options::{ExecOptions, Options, StudyOptions};
use sedge_common::{CompiledPattern, ExtraInfo};

bitflags! {
    /// Compile-time flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompFlags: u32 {
        /// Caseless matching.
        const ICASE    = 0x01;
        /// Extended rather than basic POSIX syntax.
        const EXTENDED = 0x02;
        /// Newline-sensitive matching.
        const NEWLINE  = 0x04;
        /// `.` matches newline (Perl flavor only).
        const DOTALL   = 0x08;
        /// Use the Perl front-end instead of the POSIX one.
        const PERL     = 0x10;
        /// Accepted for interface compatibility; submatch reporting is
        /// cheap here and always available.
        const NOSUB    = 0x20;
    }
}

/// Run-time execution flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecFlags {
    /// The subject start is not the beginning of a line.
    pub notbol: bool,
    /// The subject end is not the end of a line.
    pub noteol: bool,
    /// Match only within this sub-range of the subject; reported offsets
    /// remain relative to the whole subject.
    pub startend: Option<(usize, usize)>,
}

/// POSIX error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PosixErrorCode {
    #[error("internal error")]
    Assert,
    #[error("invalid repeat counts in {{}}")]
    BadBr,
    #[error("pattern error")]
    BadPat,
    #[error("nothing to repeat")]
    BadRpt,
    #[error("unmatched braces")]
    EBrace,
    #[error("missing terminating ] for character class")]
    EBrack,
    #[error("bad collating element")]
    ECollate,
    #[error("unknown POSIX class name")]
    ECType,
    #[error("bad escape sequence")]
    EEscape,
    #[error("empty expression")]
    EmptyExpr,
    #[error("unmatched parentheses")]
    EParen,
    #[error("range out of order in character class")]
    ERange,
    #[error("regular expression too large")]
    ESize,
    #[error("failed to get memory")]
    ESpace,
    #[error("back reference to non-existent subpattern")]
    ESubReg,
    #[error("bad argument")]
    InvArg,
    #[error("match failed")]
    NoMatch,
}

impl PosixErrorCode {
    /// The conventional integer value of the code.
    pub fn code(self) -> i32 {
        match self {
            PosixErrorCode::Assert => 1,
            PosixErrorCode::BadBr => 2,
            PosixErrorCode::BadPat => 3,
            PosixErrorCode::BadRpt => 4,
            PosixErrorCode::EBrace => 5,
            PosixErrorCode::EBrack => 6,
            PosixErrorCode::ECollate => 7,
            PosixErrorCode::ECType => 8,
            PosixErrorCode::EEscape => 9,
            PosixErrorCode::EmptyExpr => 10,
            PosixErrorCode::EParen => 11,
            PosixErrorCode::ERange => 12,
            PosixErrorCode::ESize => 13,
            PosixErrorCode::ESpace => 14,
            PosixErrorCode::ESubReg => 15,
            PosixErrorCode::InvArg => 16,
            PosixErrorCode::NoMatch => 17,
        }
    }
}

/// An error with the offset where it was detected, formatted the way
/// `regerror` traditionally reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixError {
    pub code: PosixErrorCode,
    pub offset: Option<usize>,
}

impl std::error::Error for PosixError {}

impl std::fmt::Display for PosixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(n) => write!(f, "{} at offset {}", self.code, n),
            None => write!(f, "{}", self.code),
        }
    }
}

/// The compile-error mapping is total: every compiler diagnostic lands on
/// one of the closed POSIX codes.
fn map_compile_error(kind: CompileErrorKind) -> PosixErrorCode {
    use CompileErrorKind::*;
    match kind {
        TrailingBackslash | TrailingControl | BadEscape => PosixErrorCode::EEscape,
        RepeatCountsOutOfOrder | RepeatCountTooBig => PosixErrorCode::BadBr,
        UnterminatedClass => PosixErrorCode::EBrack,
        BadClassEscape => PosixErrorCode::ECType,
        RangeOutOfOrder => PosixErrorCode::ERange,
        NothingToRepeat => PosixErrorCode::BadRpt,
        UnexpectedRepeat | CodeOverflow => PosixErrorCode::Assert,
        BadGroupKind
        | BadLookbehindKind
        | LookbehindNotFixedLength
        | BadConditionNumber
        | CondTooManyBranches
        | CondAssertionExpected
        | BadRecursion
        | CollatingUnsupported
        | BadConditionZero => PosixErrorCode::BadPat,
        UnmatchedBraces | UnterminatedComment | UnmatchedParentheses => PosixErrorCode::EParen,
        BackrefOutOfRange => PosixErrorCode::ESubReg,
        BadOptionBits => PosixErrorCode::InvArg,
        NestingTooDeep | PatternTooLarge => PosixErrorCode::ESize,
        UnknownPosixClass => PosixErrorCode::ECType,
    }
}

fn map_exec_error(e: ExecError) -> PosixErrorCode {
    match e {
        ExecError::NoMatch => PosixErrorCode::NoMatch,
        ExecError::BadOption | ExecError::BadMagic => PosixErrorCode::InvArg,
        ExecError::UnknownOpcode | ExecError::NoSubstring => PosixErrorCode::Assert,
    }
}

/// A compiled-and-studied pattern behind the POSIX-style interface.
#[derive(Debug)]
pub struct Regex {
    re: CompiledPattern,
    extra: Option<ExtraInfo>,
    nsub: usize,
}

impl Regex {
    /// Compile a pattern. The POSIX front-end is the default; `PERL`
    /// selects the Perl syntax with `NEWLINE` and `DOTALL` honored, while
    /// without it `NEWLINE` decides between line-oriented matching and an
    /// implied dot-matches-newline.
    pub fn new(pattern: &[u8], flags: CompFlags) -> Result<Regex, PosixError> {
        let mut options = Options::empty();
        if flags.contains(CompFlags::ICASE) {
            options |= Options::CASELESS;
        }
        if flags.contains(CompFlags::EXTENDED) {
            options |= Options::EXTENDED;
        }

        let compiled = if flags.contains(CompFlags::PERL) {
            if flags.contains(CompFlags::NEWLINE) {
                options |= Options::MULTILINE;
            }
            if flags.contains(CompFlags::DOTALL) {
                options |= Options::DOTALL;
            }
            sedge_compiler::compile(pattern, options, None)
        } else {
            if flags.contains(CompFlags::NEWLINE) {
                options |= Options::MULTILINE;
            } else {
                options |= Options::DOTALL;
            }
            sedge_compiler::posix_compile(pattern, options, None)
        };

        let mut re = compiled.map_err(|e| PosixError {
            code: map_compile_error(e.kind),
            offset: Some(e.offset),
        })?;

        let extra = sedge_study::study(&mut re, StudyOptions::empty()).unwrap_or(None);
        let nsub = re.capture_count() as usize;
        Ok(Regex { re, extra, nsub })
    }

    /// Number of capturing subexpressions.
    pub fn nsub(&self) -> usize {
        self.nsub
    }

    /// Execute against a subject. On success returns up to `nmatch`
    /// (start, end) pairs, the whole match first; groups that did not
    /// participate hold (−1, −1).
    pub fn exec(
        &self,
        subject: &[u8],
        nmatch: usize,
        flags: ExecFlags,
    ) -> Result<Vec<(i32, i32)>, PosixError> {
        let mut options = ExecOptions::empty();
        if flags.notbol {
            options |= ExecOptions::NOTBOL;
        }
        if flags.noteol {
            options |= ExecOptions::NOTEOL;
        }

        let (window, start) = match flags.startend {
            Some((s, e)) => (&subject[..e.min(subject.len())], s),
            None => (subject, 0),
        };

        let mut ovector = vec![0i32; self.nsub * 3 + 3];
        let rc = sedge_matcher::exec(&self.re, self.extra.as_ref(), window, start, options, &mut ovector)
            .map_err(|e| PosixError {
                code: map_exec_error(e),
                offset: None,
            })?;

        let filled = rc.max(1).min(nmatch);
        let mut out = Vec::with_capacity(nmatch);
        for i in 0..filled {
            out.push((ovector[2 * i], ovector[2 * i + 1]));
        }
        out.resize(nmatch, (-1, -1));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bre_compile_and_exec() {
        let re = Regex::new(b"\\(a*\\)b", CompFlags::empty()).unwrap();
        assert_eq!(re.nsub(), 1);
        let m = re.exec(b"xxaab", 2, ExecFlags::default()).unwrap();
        assert_eq!(m, vec![(2, 5), (2, 4)]);
    }

    #[test]
    fn ere_flavor() {
        let re = Regex::new(b"(cat|dog)s?", CompFlags::EXTENDED).unwrap();
        let m = re.exec(b"two dogs", 2, ExecFlags::default()).unwrap();
        assert_eq!(m, vec![(4, 8), (4, 7)]);
    }

    #[test]
    fn perl_flavor() {
        let re = Regex::new(b"(?<=a)b+", CompFlags::PERL).unwrap();
        let m = re.exec(b"zabbc", 1, ExecFlags::default()).unwrap();
        assert_eq!(m, vec![(2, 4)]);
    }

    #[test]
    fn icase_flag() {
        let re = Regex::new(b"abc", CompFlags::ICASE | CompFlags::EXTENDED).unwrap();
        let m = re.exec(b"xABCy", 1, ExecFlags::default()).unwrap();
        assert_eq!(m, vec![(1, 4)]);
    }

    #[test]
    fn newline_flag_controls_line_matching() {
        // Without NEWLINE the POSIX flavor lets `.` cross lines.
        let re = Regex::new(b"a.c", CompFlags::EXTENDED).unwrap();
        assert!(re.exec(b"a\nc", 1, ExecFlags::default()).is_ok());

        let re = Regex::new(b"a.c", CompFlags::EXTENDED | CompFlags::NEWLINE).unwrap();
        assert_eq!(
            re.exec(b"a\nc", 1, ExecFlags::default()).unwrap_err().code,
            PosixErrorCode::NoMatch
        );
    }

    #[test]
    fn no_match_is_a_code() {
        let re = Regex::new(b"zzz", CompFlags::EXTENDED).unwrap();
        let err = re.exec(b"aaa", 1, ExecFlags::default()).unwrap_err();
        assert_eq!(err.code, PosixErrorCode::NoMatch);
        assert_eq!(err.code.code(), 17);
    }

    #[test]
    fn unset_groups_are_filled_with_minus_one() {
        let re = Regex::new(b"(a)|(b)", CompFlags::EXTENDED).unwrap();
        let m = re.exec(b"b", 4, ExecFlags::default()).unwrap();
        assert_eq!(m, vec![(0, 1), (-1, -1), (0, 1), (-1, -1)]);
    }

    #[test]
    fn startend_window() {
        let re = Regex::new(b"b+", CompFlags::EXTENDED).unwrap();
        let m = re
            .exec(
                b"bbabbb",
                1,
                ExecFlags {
                    startend: Some((2, 5)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(m, vec![(3, 5)]);
    }

    #[test]
    fn compile_errors_map_and_format() {
        let err = Regex::new(b"a[b", CompFlags::EXTENDED).unwrap_err();
        assert_eq!(err.code, PosixErrorCode::EBrack);
        let text = err.to_string();
        assert!(
            text.starts_with("missing terminating ] for character class at offset"),
            "{text}"
        );

        let err = Regex::new(b"(a", CompFlags::EXTENDED).unwrap_err();
        assert_eq!(err.code, PosixErrorCode::EParen);

        let err = Regex::new(b"a\\{2,1\\}", CompFlags::empty()).unwrap_err();
        assert_eq!(err.code, PosixErrorCode::BadBr);

        let err = Regex::new(b"[[:wrong:]]", CompFlags::EXTENDED).unwrap_err();
        assert_eq!(err.code, PosixErrorCode::ECType);

        let err = Regex::new(b"(a)(b)\\3", CompFlags::EXTENDED).unwrap_err();
        assert_eq!(err.code, PosixErrorCode::ESubReg);
    }

    #[test]
    fn notbol_flag() {
        let re = Regex::new(b"^a", CompFlags::EXTENDED).unwrap();
        let err = re
            .exec(
                b"abc",
                1,
                ExecFlags {
                    notbol: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.code, PosixErrorCode::NoMatch);
    }
}
