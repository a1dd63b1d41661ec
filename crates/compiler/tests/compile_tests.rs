//! Integration tests for the compiler: code-stream well-formedness, the
//! derived pattern facts, and error reporting.

use sedge_common::debug::dump;
use sedge_common::error::CompileErrorKind;
use sedge_common::op;
use sedge_common::options::Options;
use sedge_common::{CompiledPattern, FirstChar};
use sedge_compiler::{compile, posix_compile};

fn perl(pattern: &str) -> CompiledPattern {
    compile(pattern.as_bytes(), Options::empty(), None).unwrap()
}

fn perl_opts(pattern: &str, options: Options) -> CompiledPattern {
    compile(pattern.as_bytes(), options, None).unwrap()
}

fn perl_err(pattern: &str) -> CompileErrorKind {
    compile(pattern.as_bytes(), Options::empty(), None)
        .unwrap_err()
        .kind
}

// ---- Code-stream balance ----
//
// Every bracket must chain through ALTs to a KET whose back link equals
// the distance to the bracket; every node must have a well-defined width.

fn get16(code: &[u8], at: usize) -> usize {
    ((code[at] as usize) << 8) | code[at + 1] as usize
}

fn walk_node(code: &[u8], pos: usize) -> usize {
    let c = code[pos];
    if c >= op::BRA {
        return walk_group(code, pos);
    }
    match c {
        op::ASSERT | op::ASSERT_NOT | op::ASSERTBACK | op::ASSERTBACK_NOT | op::ONCE
        | op::COND => walk_group(code, pos),
        op::BRAZERO | op::BRAMINZERO => pos + 1,
        op::BEG_WORD..=op::EOD | op::CIRC | op::DOLL | op::ANY | op::RECURSE => pos + 1,
        op::OPT => pos + 2,
        op::CHARS => pos + 2 + code[pos + 1] as usize,
        op::MAXSTAR..=op::ONCEQUERY | op::NOT | op::NOT_MAXSTAR..=op::NOT_ONCEQUERY => pos + 2,
        op::MAXUPTO..=op::EXACT | op::NOT_MAXUPTO..=op::NOTEXACT => pos + 4,
        op::TYPE
        | op::TYPENOT
        | op::TYPE_MAXSTAR..=op::TYPE_ONCEQUERY
        | op::TYPENOT_MAXSTAR..=op::TYPENOT_ONCEQUERY => pos + 2,
        op::TYPE_MAXUPTO..=op::TYPEEXACT | op::TYPENOT_MAXUPTO..=op::TYPENOTEXACT => pos + 4,
        op::CLASS | op::CL_MAXSTAR..=op::CL_ONCEQUERY => pos + 33,
        op::CL_MAXRANGE..=op::CL_ONCERANGE => pos + 37,
        op::REF | op::REF_MAXSTAR..=op::REF_ONCEQUERY => pos + 3,
        op::REF_MAXRANGE..=op::REF_ONCERANGE => pos + 7,
        op::REVERSE | op::CREF | op::BRANUMBER => pos + 3,
        other => panic!("unexpected opcode {} ({}) at {}", other, op::name(other), pos),
    }
}

fn walk_group(code: &[u8], start: usize) -> usize {
    let mut branch = start;
    loop {
        let link = get16(code, branch + 1);
        assert!(link > 0, "zero link at {branch}");
        let next = branch + link;
        let mut pos = branch + 3;
        while pos < next {
            pos = walk_node(code, pos);
        }
        assert_eq!(pos, next, "branch at {branch} overruns its link");
        match code[next] {
            op::ALT => branch = next,
            op::KET | op::KET_MAXSTAR | op::KET_MINSTAR | op::KET_ONCESTAR => {
                assert_eq!(
                    get16(code, next + 1),
                    next - start,
                    "ket at {next} does not point back to {start}"
                );
                return next + 3;
            }
            other => panic!("expected ALT or KET at {next}, found {}", op::name(other)),
        }
    }
}

fn assert_balanced(re: &CompiledPattern) {
    let end = walk_group(&re.code, 0);
    assert_eq!(re.code[end], op::END, "END must follow the outer KET");
    assert_eq!(end + 1, re.code.len());
}

#[test]
fn streams_are_balanced() {
    for pattern in [
        "a",
        "abc",
        "a(b|c)d",
        "(a+)(b+)",
        "(a+?)(b+)",
        "^foo$",
        "(?:ab|ac)+",
        "(cat|dog)\\1",
        "a{2,4}",
        "a{3}",
        "a{2,}",
        "(ab){1,3}",
        "(ab){0,2}",
        "(ab)*",
        "(ab)+",
        "(a|b)?",
        "(?=x)y",
        "(?!x)y",
        "(?<=abc)def",
        "(?<!ab)cd",
        "(?>a+)b",
        "(a)(?(1)x|y)",
        "(?(?=a)ab|cd)",
        "((((a))))",
        "[a-z]+",
        "[^x]{2,}",
        "[]a]",
        "\\d+\\s\\w*",
        "\\bword\\b",
        "\\Aab\\Z",
        "x(?#note)y",
        "a.c",
        ".*",
        "a|b|c|d",
        "(?i)abc",
        "((a)|(b))\\2",
    ] {
        let re = perl(pattern);
        assert_balanced(&re);
    }
}

#[test]
fn posix_streams_are_balanced() {
    for (pattern, opts) in [
        ("\\(a\\)\\1", Options::empty()),
        ("a\\{2,4\\}", Options::empty()),
        ("^ab*c$", Options::empty()),
        ("(a|b)+c", Options::EXTENDED),
        ("[[:digit:]]+", Options::EXTENDED),
        ("(ab){2,3}", Options::EXTENDED),
        ("\\<word\\>", Options::EXTENDED),
    ] {
        let re = posix_compile(pattern.as_bytes(), opts, None).unwrap();
        assert_balanced(&re);
    }
}

#[test]
fn many_groups_use_extended_numbering() {
    let mut pattern = String::new();
    for _ in 0..105 {
        pattern.push_str("(a)");
    }
    pattern.push_str("\\101");
    let re = perl(&pattern);
    assert_eq!(re.capture_count(), 105);
    assert_eq!(re.backref_max(), 101);
    assert_balanced(&re);
    assert!(dump(&re).contains("BRANUMBER"));
}

// ---- Derived facts ----

#[test]
fn anchoring_is_detected() {
    assert!(perl("^abc").options.contains(Options::ANCHORED));
    assert!(perl("\\Aabc").options.contains(Options::ANCHORED));
    assert!(!perl("abc").options.contains(Options::ANCHORED));
    // Under multiline, ^ can match mid-subject: start-line instead.
    let re = perl_opts("^abc", Options::MULTILINE);
    assert!(!re.options.contains(Options::ANCHORED));
    assert_eq!(re.first_char(), FirstChar::AtLineStart);
}

#[test]
fn first_and_required_chars() {
    let re = perl("abc");
    assert_eq!(re.first_char(), FirstChar::Set(b'a'));
    assert_eq!(re.required_char(), Some(b'c'));

    let re = perl("a(b|c)d");
    assert_eq!(re.first_char(), FirstChar::Set(b'a'));
    assert_eq!(re.required_char(), Some(b'd'));

    // Branches that disagree on a last literal leave it unset.
    let re = perl("abc|abd");
    assert_eq!(re.required_char(), None);

    // A zero-minimum trailing repeat backs off to the previous literal.
    let re = perl("abcx*");
    assert_eq!(re.required_char(), Some(b'c'));
}

#[test]
fn quantifier_opcode_shapes() {
    let text = dump(&perl("ab+"));
    assert!(text.contains("CHARS \"a\""), "{text}");
    assert!(text.contains("MAXPLUS 'b'"), "{text}");

    let text = dump(&perl("a+?"));
    assert!(text.contains("MINPLUS 'a'"), "{text}");

    let text = dump(&perl("a{2,4}"));
    assert!(text.contains("EXACT 2 'a'"), "{text}");
    assert!(text.contains("MAXUPTO 2 'a'"), "{text}");

    let text = dump(&perl("a{3}"));
    assert!(text.contains("EXACT 3 'a'"), "{text}");
    assert!(!text.contains("UPTO"), "{text}");

    let text = dump(&perl(".*"));
    assert!(text.contains("TYPENOT_MAXSTAR bit 0"), "{text}");

    let text = dump(&perl("\\d{2,}"));
    assert!(text.contains("TYPEEXACT 2 bit 1"), "{text}");
    assert!(text.contains("TYPE_MAXSTAR bit 1"), "{text}");

    let text = dump(&perl("(?:ab|ac)+"));
    assert!(text.contains("KET_MAXSTAR"), "{text}");

    let text = dump(&perl("(?:ab)+?"));
    assert!(text.contains("KET_MINSTAR"), "{text}");
}

#[test]
fn ungreedy_swaps_polarity() {
    let text = dump(&perl_opts("a+", Options::UNGREEDY));
    assert!(text.contains("MINPLUS 'a'"), "{text}");
    let text = dump(&perl_opts("a+?", Options::UNGREEDY));
    assert!(text.contains("MAXPLUS 'a'"), "{text}");
}

#[test]
fn class_reductions() {
    let text = dump(&perl("[a]"));
    assert!(text.contains("CHARS \"a\""), "{text}");
    let text = dump(&perl("[^a]"));
    assert!(text.contains("NOT 'a'"), "{text}");
    let text = dump(&perl("[a-c]"));
    assert!(text.contains("CLASS [61-63]"), "{text}");
    let text = dump(&perl("[\\d]"));
    assert!(text.contains("CLASS [30-39]"), "{text}");
    // A negated class repeat uses the class repeat family.
    let text = dump(&perl("[a-c]{2,5}"));
    assert!(text.contains("CL_MAXRANGE {2,5}"), "{text}");
}

#[test]
fn extended_mode_ignores_whitespace_and_comments() {
    let plain = dump(&perl("abc"));
    let spaced = dump(&perl_opts("a b # trailing\nc", Options::EXTENDED));
    assert_eq!(plain, spaced);
}

#[test]
fn lookbehind_reverse_distance() {
    let text = dump(&perl("(?<=abc)def"));
    assert!(text.contains("ASSERTBACK"), "{text}");
    assert!(text.contains("REVERSE 3"), "{text}");
}

#[test]
fn conditional_group_layout() {
    let text = dump(&perl("(a)(?(1)x|y)"));
    assert!(text.contains("COND"), "{text}");
    assert!(text.contains("CREF 1"), "{text}");
}

// ---- Errors ----

#[test]
fn error_kinds() {
    assert_eq!(perl_err("a\\"), CompileErrorKind::TrailingBackslash);
    assert_eq!(perl_err("*a"), CompileErrorKind::NothingToRepeat);
    assert_eq!(perl_err("a{3,1}"), CompileErrorKind::RepeatCountsOutOfOrder);
    assert_eq!(perl_err("a{99999}"), CompileErrorKind::RepeatCountTooBig);
    assert_eq!(perl_err("[abc"), CompileErrorKind::UnterminatedClass);
    assert_eq!(perl_err("[z-a]"), CompileErrorKind::RangeOutOfOrder);
    assert_eq!(perl_err("(a"), CompileErrorKind::UnmatchedParentheses);
    assert_eq!(perl_err("a)"), CompileErrorKind::UnmatchedParentheses);
    assert_eq!(perl_err("\\2"), CompileErrorKind::BackrefOutOfRange);
    assert_eq!(perl_err("(?q)"), CompileErrorKind::BadGroupKind);
    assert_eq!(perl_err("(?<xy)"), CompileErrorKind::BadLookbehindKind);
    assert_eq!(perl_err("(?#x"), CompileErrorKind::UnterminatedComment);
    assert_eq!(perl_err("(?<=a+)b"), CompileErrorKind::LookbehindNotFixedLength);
    assert_eq!(
        perl_err("(a)(?(1)x|y|z)"),
        CompileErrorKind::CondTooManyBranches
    );
    assert_eq!(perl_err("(?(0)a)"), CompileErrorKind::BadConditionZero);
    assert_eq!(perl_err("(?(xy)a)"), CompileErrorKind::CondAssertionExpected);
    assert_eq!(perl_err("[[:foo:]]"), CompileErrorKind::UnknownPosixClass);
    assert_eq!(perl_err("[[.a.]]"), CompileErrorKind::CollatingUnsupported);
    assert_eq!(perl_err("(?R!"), CompileErrorKind::BadRecursion);
}

#[test]
fn error_offsets_point_into_the_pattern() {
    let err = compile(b"ab[cd", Options::empty(), None).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnterminatedClass);
    assert!(err.offset >= 2 && err.offset <= 5, "offset {}", err.offset);

    let err = compile(b"foo(", Options::empty(), None).unwrap_err();
    assert_eq!(err.offset, 3);
}

#[test]
fn bad_option_bits_are_rejected() {
    let bogus = Options::from_bits_retain(0x0100_0000);
    assert_eq!(
        compile(b"a", bogus, None).unwrap_err().kind,
        CompileErrorKind::BadOptionBits
    );
}

#[test]
fn nesting_depth_is_bounded() {
    let deep = "(".repeat(201);
    assert_eq!(perl_err(&deep), CompileErrorKind::NestingTooDeep);
}

// ---- POSIX front-end ----

#[test]
fn bre_groups_and_backrefs() {
    let re = posix_compile(b"\\(a\\)\\1", Options::empty(), None).unwrap();
    assert_eq!(re.capture_count(), 1);
    assert_eq!(re.backref_max(), 1);
}

#[test]
fn bre_error_offsets_map_to_the_original() {
    // In "a\{2,1\}" the out-of-order bound is inside the brace expression;
    // the reported offset must fall within the original pattern.
    let err = posix_compile(b"a\\{2,1\\}", Options::empty(), None).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::RepeatCountsOutOfOrder);
    assert!(err.offset <= 8, "offset {}", err.offset);
}

#[test]
fn posix_dollar_is_eod_outside_multiline() {
    let re = posix_compile(b"ab$", Options::EXTENDED, None).unwrap();
    assert!(dump(&re).contains("EOD"));
    let re = posix_compile(b"ab$", Options::EXTENDED | Options::MULTILINE, None).unwrap();
    assert!(dump(&re).contains("DOLL"));
}

#[test]
fn posix_bounded_endline_pattern_has_max_match_size() {
    let re = posix_compile(b"ab\\{1,3\\}c$", Options::empty(), None).unwrap();
    assert_eq!(re.max_match_size, Some(5));

    // Unbounded repeats and patterns not ending at $ have none.
    let re = posix_compile(b"ab*c$", Options::empty(), None).unwrap();
    assert_eq!(re.max_match_size, None);
    let re = posix_compile(b"abc", Options::empty(), None).unwrap();
    assert_eq!(re.max_match_size, None);
}

#[test]
fn posix_collating_single_chars() {
    let re = posix_compile(b"[[.a.]-c]x", Options::EXTENDED, None).unwrap();
    assert!(dump(&re).contains("CLASS [61-63]"));
}

#[test]
fn posix_quantifier_after_open_is_literal() {
    // `(*a)` keeps the star as data.
    let re = posix_compile(b"(*a)", Options::EXTENDED, None).unwrap();
    assert!(dump(&re).contains("CHARS \"*a\""));
}
