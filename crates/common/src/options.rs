//! Option bit sets for compile, exec, and study.

use bitflags::bitflags;

bitflags! {
    /// Compile-time options.
    ///
    /// The low bits are caller-settable; the high bits record facts the
    /// compiler discovered and are carried on the compiled pattern. Callers
    /// passing any bit outside [`Options::PUBLIC`] get a compile error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Options: u32 {
        /// Letters match both cases.
        const CASELESS       = 0x0001;
        /// `^` and `$` match at internal newlines.
        const MULTILINE      = 0x0002;
        /// `.` matches newline too.
        const DOTALL         = 0x0004;
        /// Ignore unescaped whitespace and `#` comments (Perl `/x`).
        const EXTENDED       = 0x0008;
        /// Match only at the starting offset.
        const ANCHORED       = 0x0010;
        /// `$` does not match before a trailing newline.
        const DOLLAR_ENDONLY = 0x0020;
        /// Strict escapes: an unknown alphanumeric escape is an error.
        const EXTRA          = 0x0040;
        /// Quantifiers are reluctant by default, `?` makes them greedy.
        const UNGREEDY       = 0x0200;
        /// Accepted for API compatibility; errors are always English here.
        const ENGLISH_ERRORS = 0x0800;

        // Private flags, set by the compiler on the finished pattern.

        /// `first_char` is known.
        const FIRSTSET  = 0x4000_0000;
        /// `req_char` is known.
        const REQCHSET  = 0x2000_0000;
        /// Every branch starts at a line start; skip to just past `\n`.
        const STARTLINE = 0x1000_0000;
        /// Compiling inside a group (transient, never on a pattern).
        const INGROUP   = 0x0800_0000;
        /// Case-sensitivity changes somewhere inside the pattern.
        const ICHANGED  = 0x0400_0000;
    }
}

impl Options {
    /// The caller-settable subset.
    pub const PUBLIC: Options = Options::CASELESS
        .union(Options::MULTILINE)
        .union(Options::DOTALL)
        .union(Options::EXTENDED)
        .union(Options::ANCHORED)
        .union(Options::DOLLAR_ENDONLY)
        .union(Options::EXTRA)
        .union(Options::UNGREEDY)
        .union(Options::ENGLISH_ERRORS);

    /// The subset that can vary mid-pattern via `(?ims)`. These fit in one
    /// byte, which is how an OPT opcode stores them.
    pub const IMS: Options = Options::CASELESS
        .union(Options::MULTILINE)
        .union(Options::DOTALL);

    /// The ims bits as an OPT operand byte.
    pub fn ims_byte(self) -> u8 {
        (self & Options::IMS).bits() as u8
    }

    /// Rebuild ims bits from an OPT operand byte.
    pub fn from_ims_byte(b: u8) -> Options {
        Options::from_bits_truncate(b as u32) & Options::IMS
    }
}

bitflags! {
    /// Run-time options for `exec`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExecOptions: u32 {
        /// Match only at the starting offset.
        const ANCHORED = 0x0010;
        /// The start of the subject is not the beginning of a line.
        const NOTBOL   = 0x0080;
        /// The end of the subject is not the end of a line.
        const NOTEOL   = 0x0100;
        /// An empty string is not a valid match.
        const NOTEMPTY = 0x0400;
    }
}

bitflags! {
    /// Options for `study`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StudyOptions: u32 {
        /// Skip the possessive-pruning pass.
        const NO_PRUNE = 0x04;
        /// Skip the start-of-match analyses (BM table, start bits).
        const NO_START = 0x08;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_mask_excludes_private_bits() {
        assert!(!Options::PUBLIC.contains(Options::FIRSTSET));
        assert!(!Options::PUBLIC.contains(Options::REQCHSET));
        assert!(!Options::PUBLIC.contains(Options::STARTLINE));
        assert!(!Options::PUBLIC.contains(Options::INGROUP));
        assert!(!Options::PUBLIC.contains(Options::ICHANGED));
    }

    #[test]
    fn ims_byte_roundtrip() {
        let opts = Options::CASELESS | Options::DOTALL;
        let b = opts.ims_byte();
        assert_eq!(Options::from_ims_byte(b), opts & Options::IMS);
        assert_eq!(Options::from_ims_byte(0), Options::empty());
    }

    #[test]
    fn ims_fits_in_a_byte() {
        assert!(Options::IMS.bits() <= 0xFF);
    }
}
