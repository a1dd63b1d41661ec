//! Error types shared across the engine.

use thiserror::Error;

/// The reason a pattern failed to compile.
///
/// Message texts are stable; the POSIX shim maps each variant to one of the
/// closed set of POSIX error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("\\ at end of pattern")]
    TrailingBackslash,

    #[error("\\c at end of pattern")]
    TrailingControl,

    #[error("unrecognized character follows \\")]
    BadEscape,

    #[error("numbers out of order in {{}} quantifier")]
    RepeatCountsOutOfOrder,

    #[error("number too big in {{}} quantifier")]
    RepeatCountTooBig,

    #[error("missing terminating ] for character class")]
    UnterminatedClass,

    #[error("invalid escape sequence in character class")]
    BadClassEscape,

    #[error("range out of order in character class")]
    RangeOutOfOrder,

    #[error("nothing to repeat")]
    NothingToRepeat,

    #[error("internal error: unexpected repeat")]
    UnexpectedRepeat,

    #[error("unrecognized character after (?")]
    BadGroupKind,

    #[error("unmatched braces")]
    UnmatchedBraces,

    #[error("back reference to non-existent subpattern")]
    BackrefOutOfRange,

    #[error("unknown option bit(s) set")]
    BadOptionBits,

    #[error("missing ) after comment")]
    UnterminatedComment,

    #[error("parentheses nested too deeply")]
    NestingTooDeep,

    #[error("regular expression too large")]
    PatternTooLarge,

    #[error("unmatched parentheses")]
    UnmatchedParentheses,

    #[error("internal error: code overflow")]
    CodeOverflow,

    #[error("unrecognized character after (?<")]
    BadLookbehindKind,

    #[error("lookbehind assertion is not fixed length")]
    LookbehindNotFixedLength,

    #[error("malformed number after (?(")]
    BadConditionNumber,

    #[error("conditional group contains more than two branches")]
    CondTooManyBranches,

    #[error("assertion expected after (?(")]
    CondAssertionExpected,

    #[error("(?R must be followed by )")]
    BadRecursion,

    #[error("unknown POSIX class name")]
    UnknownPosixClass,

    #[error("POSIX collating elements are not supported")]
    CollatingUnsupported,

    #[error("bad condition (?(0)")]
    BadConditionZero,
}

/// A compile failure, carrying the byte offset in the source pattern at
/// which it was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub offset: usize,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, offset: usize) -> CompileError {
        CompileError { kind, offset }
    }
}

/// Errors from `exec`. No-match is represented here too so that the whole
/// result contract fits one `Result`; it is a normal outcome, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecError {
    /// The pattern did not match the subject.
    #[error("no match")]
    NoMatch,

    /// Option bits outside the exec-time set were passed.
    #[error("unknown option bit(s) set")]
    BadOption,

    /// The pattern block does not carry the magic tag.
    #[error("compiled pattern has bad magic number")]
    BadMagic,

    /// The interpreter hit a byte it does not recognize as an opcode;
    /// the compiled block is corrupt.
    #[error("unknown opcode in compiled pattern")]
    UnknownOpcode,

    /// A requested capture group does not exist or did not match.
    #[error("no such substring")]
    NoSubstring,
}

impl ExecError {
    /// The conventional negative return code for this error. The −2 (null
    /// argument) and −6 (out of memory) code points of the original
    /// interface cannot occur here and stay reserved.
    pub fn code(self) -> i32 {
        match self {
            ExecError::NoMatch => -1,
            ExecError::BadOption => -3,
            ExecError::BadMagic => -4,
            ExecError::UnknownOpcode => -5,
            ExecError::NoSubstring => -7,
        }
    }
}

/// Errors from `study`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StudyError {
    #[error("argument is not a compiled regular expression")]
    BadMagic,

    #[error("unknown or incorrect option bit(s) set")]
    BadOption,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_display_carries_offset() {
        let e = CompileError::new(CompileErrorKind::UnterminatedClass, 4);
        assert_eq!(
            e.to_string(),
            "missing terminating ] for character class at offset 4"
        );
    }

    #[test]
    fn brace_messages_render_literal_braces() {
        assert_eq!(
            CompileErrorKind::RepeatCountsOutOfOrder.to_string(),
            "numbers out of order in {} quantifier"
        );
        assert_eq!(
            CompileErrorKind::RepeatCountTooBig.to_string(),
            "number too big in {} quantifier"
        );
    }

    #[test]
    fn exec_error_codes() {
        assert_eq!(ExecError::NoMatch.code(), -1);
        assert_eq!(ExecError::BadOption.code(), -3);
        assert_eq!(ExecError::BadMagic.code(), -4);
        assert_eq!(ExecError::UnknownOpcode.code(), -5);
        assert_eq!(ExecError::NoSubstring.code(), -7);
    }
}
