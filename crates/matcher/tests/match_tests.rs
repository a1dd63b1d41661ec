//! End-to-end matching tests: compile (optionally study) then exec.

use sedge_common::error::ExecError;
use sedge_common::options::{ExecOptions, Options, StudyOptions};
use sedge_common::CompiledPattern;
use sedge_compiler::{compile, posix_compile};
use sedge_matcher::exec;
use sedge_study::study;

const NSLOTS: usize = 45;

fn perl(pattern: &str) -> CompiledPattern {
    compile(pattern.as_bytes(), Options::empty(), None).unwrap()
}

fn perl_opts(pattern: &str, options: Options) -> CompiledPattern {
    compile(pattern.as_bytes(), options, None).unwrap()
}

/// Run and return the filled pairs, or None for no match.
fn run_at(re: &CompiledPattern, subject: &str, start: usize) -> Option<Vec<(i32, i32)>> {
    let mut offsets = [0i32; NSLOTS];
    match exec(re, None, subject.as_bytes(), start, ExecOptions::empty(), &mut offsets) {
        Ok(n) => {
            let n = n.max(1);
            Some((0..n).map(|i| (offsets[2 * i], offsets[2 * i + 1])).collect())
        }
        Err(ExecError::NoMatch) => None,
        Err(e) => panic!("exec failed: {e}"),
    }
}

fn run(re: &CompiledPattern, subject: &str) -> Option<Vec<(i32, i32)>> {
    run_at(re, subject, 0)
}

fn spans(pattern: &str, subject: &str) -> Option<Vec<(i32, i32)>> {
    run(&perl(pattern), subject)
}

// ---- Literal and alternation basics ----

#[test]
fn literal_match() {
    assert_eq!(spans("abc", "xxabcyy"), Some(vec![(2, 5)]));
    assert_eq!(spans("abc", "ab"), None);
}

#[test]
fn alternation_with_capture() {
    // a(b|c)d against several subjects.
    let re = perl("a(b|c)d");
    assert_eq!(run(&re, "abd ace acd"), Some(vec![(0, 3), (1, 2)]));
    assert_eq!(run(&re, "acd"), Some(vec![(0, 3), (1, 2)]));
    assert_eq!(run(&re, "aed"), None);
}

#[test]
fn greedy_and_reluctant_captures() {
    let re = perl("(a+)(b+)");
    assert_eq!(run(&re, "aaabbbc"), Some(vec![(0, 6), (0, 3), (3, 6)]));

    // The reluctant group still starts at the leftmost match and is
    // forced to grow until b+ can take over.
    let re = perl("(a+?)(b+)");
    assert_eq!(run(&re, "aaabbbc"), Some(vec![(0, 6), (0, 3), (3, 6)]));

    // Where reluctance is visible: a trailing single b.
    let re = perl("(a+?)b");
    assert_eq!(run(&re, "aab"), Some(vec![(0, 3), (0, 2)]));
}

#[test]
fn quantifier_bounds() {
    assert_eq!(spans("a{2,4}", "aaaaa"), Some(vec![(0, 4)]));
    assert_eq!(spans("a{2,4}", "a"), None);
    assert_eq!(spans("a{3}", "aaa"), Some(vec![(0, 3)]));
    assert_eq!(spans("a{2,}", "aaaa"), Some(vec![(0, 4)]));
    assert_eq!(spans("ab?c", "ac"), Some(vec![(0, 2)]));
}

#[test]
fn classes_and_types() {
    assert_eq!(spans("[0-9]+", "ab123cd"), Some(vec![(2, 5)]));
    assert_eq!(spans("[^b]+", "bbaacbb"), Some(vec![(2, 5)]));
    assert_eq!(spans("\\d+\\s\\w+", "x 42 abc"), Some(vec![(2, 8)]));
    assert_eq!(spans("[[:xdigit:]]+", "zzff09z"), Some(vec![(2, 6)]));
}

#[test]
fn dot_and_dotall() {
    assert_eq!(spans("a.c", "abc"), Some(vec![(0, 3)]));
    assert_eq!(spans("a.c", "a\nc"), None);
    let re = perl_opts("a.c", Options::DOTALL);
    assert_eq!(run(&re, "a\nc"), Some(vec![(0, 3)]));
}

// ---- Anchors and assertions ----

#[test]
fn multiline_anchors() {
    let re = perl_opts("^foo$", Options::MULTILINE);
    assert_eq!(run(&re, "x\nfoo\ny"), Some(vec![(2, 5)]));
    assert_eq!(run(&re, "xfoo\ny"), None);

    let re = perl_opts("o$", Options::MULTILINE);
    assert_eq!(run(&re, "foo\nbar"), Some(vec![(2, 3)]));
}

#[test]
fn dollar_and_trailing_newline() {
    assert_eq!(spans("abc$", "abc\n"), Some(vec![(0, 3)]));
    assert_eq!(spans("abc\\Z", "abc\n"), Some(vec![(0, 3)]));
    assert_eq!(spans("abc\\z", "abc\n"), None);
    assert_eq!(spans("abc\\z", "abc"), Some(vec![(0, 3)]));

    let re = perl_opts("abc$", Options::DOLLAR_ENDONLY);
    assert_eq!(run(&re, "abc\n"), None);
    assert_eq!(run(&re, "abc"), Some(vec![(0, 3)]));
}

#[test]
fn lookahead() {
    let re = perl("foo(?!bar)");
    assert_eq!(run(&re, "foobar foobaz"), Some(vec![(7, 10)]));
    let re = perl("foo(?=bar)");
    assert_eq!(run(&re, "foobaz foobar"), Some(vec![(7, 10)]));
}

#[test]
fn lookbehind() {
    let re = perl("(?<=abc)def");
    assert_eq!(run(&re, "xabcdef"), Some(vec![(4, 7)]));
    assert_eq!(run(&re, "abdef"), None);

    let re = perl("(?<!ab)cd");
    assert_eq!(run(&re, "abcd xcd"), Some(vec![(6, 8)]));
}

#[test]
fn word_boundaries() {
    let re = perl("\\b\\w+\\b");
    assert_eq!(run(&re, "hello, world!"), Some(vec![(0, 5)]));
    assert_eq!(run_at(&re, "hello, world!", 5), Some(vec![(7, 12)]));

    let re = perl("\\Bell\\B");
    assert_eq!(run(&re, "hello bell"), Some(vec![(1, 4)]));
}

#[test]
fn anchor_to_start_offset() {
    let re = perl("\\Ga");
    assert_eq!(run_at(&re, "aab", 0), Some(vec![(0, 1)]));
    assert_eq!(run_at(&re, "aab", 1), Some(vec![(1, 2)]));
    assert_eq!(run_at(&re, "aab", 2), None);
}

// ---- Groups, backrefs, conditionals, recursion ----

#[test]
fn backreferences() {
    let re = perl("(cat|dog)\\1");
    assert_eq!(run(&re, "catcat"), Some(vec![(0, 6), (0, 3)]));
    assert_eq!(run(&re, "catdog"), None);

    let re = perl("(a*)x\\1");
    assert_eq!(run(&re, "aaxaa"), Some(vec![(0, 5), (0, 2)]));
}

#[test]
fn repeated_backreference() {
    let re = perl("(ab)\\1{2}");
    assert_eq!(run(&re, "ababab"), Some(vec![(0, 6), (0, 2)]));
    assert_eq!(run(&re, "abab"), None);
}

#[test]
fn atomic_group_commits() {
    let re = perl("(?>a+)a");
    assert_eq!(run(&re, "aaa"), None);
    let re = perl("a+a");
    assert_eq!(run(&re, "aaa"), Some(vec![(0, 3)]));
}

#[test]
fn conditional_on_group() {
    let re = perl("(a)?(?(1)b|c)");
    assert_eq!(run(&re, "ab"), Some(vec![(0, 2), (0, 1)]));
    assert_eq!(run(&re, "c"), Some(vec![(0, 1)]));
    assert_eq!(run(&re, "b"), None);
}

#[test]
fn conditional_on_assertion() {
    let re = perl("(?(?=a)ab|cd)");
    assert_eq!(run(&re, "ab"), Some(vec![(0, 2)]));
    assert_eq!(run(&re, "cd"), Some(vec![(0, 2)]));
    assert_eq!(run(&re, "ad"), None);
}

#[test]
fn whole_pattern_recursion() {
    // Balanced parentheses via (?R).
    let re = perl("\\((?:[^()]|(?R))*\\)");
    assert_eq!(run(&re, "(a(b)c)"), Some(vec![(0, 7)]));
    assert_eq!(run(&re, "x((y))"), Some(vec![(1, 6)]));
    assert_eq!(run(&re, "(("), None);
}

#[test]
fn zero_length_group_loops_terminate() {
    assert_eq!(spans("(a*)*b", "b"), Some(vec![(0, 1), (0, 0)]));
    // The final, empty iteration of the outer star is what the group
    // retains.
    assert_eq!(spans("(a*)*b", "aab"), Some(vec![(0, 3), (2, 2)]));
    assert_eq!(spans("(?:a?)*y", "z"), None);
}

#[test]
fn group_repeats() {
    let re = perl("(?:ab|ac)+");
    assert_eq!(run(&re, "abacad"), Some(vec![(0, 4)]));

    let re = perl("(ab){1,3}");
    assert_eq!(run(&re, "abababab"), Some(vec![(0, 6), (4, 6)]));

    let re = perl("(ab){0,2}c");
    assert_eq!(run(&re, "ababc"), Some(vec![(0, 5), (2, 4)]));
    assert_eq!(run(&re, "c"), Some(vec![(0, 1)]));
}

// ---- Options ----

#[test]
fn caseless_matching() {
    let re = perl_opts("AbC", Options::CASELESS);
    assert_eq!(run(&re, "xxabcy"), Some(vec![(2, 5)]));
    assert_eq!(run(&re, "XABCY"), Some(vec![(1, 4)]));

    let re = perl_opts("[a-c]+", Options::CASELESS);
    assert_eq!(run(&re, "xBaC"), Some(vec![(1, 4)]));
}

#[test]
fn scoped_inline_options() {
    let re = perl("a(?i:bc)d");
    assert_eq!(run(&re, "aBCd"), Some(vec![(0, 4)]));
    assert_eq!(run(&re, "Abcd"), None);
    // The caseless state resets after the group.
    assert_eq!(run(&re, "abcD"), None);
}

#[test]
fn freestanding_inline_options() {
    let re = perl("(?i)abc");
    assert_eq!(run(&re, "ABC"), Some(vec![(0, 3)]));
}

#[test]
fn ungreedy_option() {
    let re = perl_opts("a+", Options::UNGREEDY);
    assert_eq!(run(&re, "aaa"), Some(vec![(0, 1)]));
    let re = perl_opts("a+?", Options::UNGREEDY);
    assert_eq!(run(&re, "aaa"), Some(vec![(0, 3)]));
}

#[test]
fn extended_mode() {
    let re = perl_opts("a b c # comment", Options::EXTENDED);
    assert_eq!(run(&re, "abc"), Some(vec![(0, 3)]));
}

#[test]
fn runtime_flags() {
    let re = perl("^a");
    let mut v = [0i32; 6];
    assert_eq!(
        exec(&re, None, b"abc", 0, ExecOptions::NOTBOL, &mut v),
        Err(ExecError::NoMatch)
    );

    let re = perl("c$");
    assert_eq!(
        exec(&re, None, b"abc", 0, ExecOptions::NOTEOL, &mut v),
        Err(ExecError::NoMatch)
    );

    let re = perl("a*");
    assert_eq!(
        exec(&re, None, b"", 0, ExecOptions::NOTEMPTY, &mut v),
        Err(ExecError::NoMatch)
    );
    assert_eq!(exec(&re, None, b"", 0, ExecOptions::empty(), &mut v), Ok(1));
    assert_eq!((v[0], v[1]), (0, 0));

    let re = perl("b");
    assert_eq!(
        exec(&re, None, b"ab", 0, ExecOptions::ANCHORED, &mut v),
        Err(ExecError::NoMatch)
    );
}

// ---- Vector handling ----

#[test]
fn vector_too_small_for_all_groups() {
    // Six slots: four usable data slots, so group 2 cannot be stored.
    let re = perl("(a)(b)");
    let mut v = [0i32; 6];
    assert_eq!(exec(&re, None, b"ab", 0, ExecOptions::empty(), &mut v), Ok(0));
    assert_eq!((v[0], v[1]), (0, 2));
}

#[test]
fn backrefs_with_tiny_vector_use_internal_store() {
    let re = perl("(cat|dog)\\1");
    let mut v = [0i32; 3];
    assert_eq!(
        exec(&re, None, b"catcat", 0, ExecOptions::empty(), &mut v),
        Ok(0)
    );
    assert_eq!((v[0], v[1]), (0, 6));
}

#[test]
fn unset_groups_are_minus_one() {
    let re = perl("(a)|(b)");
    let mut v = [0i32; 9];
    assert_eq!(exec(&re, None, b"b", 0, ExecOptions::empty(), &mut v), Ok(3));
    assert_eq!((v[0], v[1]), (0, 1));
    assert_eq!((v[2], v[3]), (-1, -1));
    assert_eq!((v[4], v[5]), (0, 1));
}

#[test]
fn bad_arguments() {
    let re = perl("a");
    let mut v = [0i32; 6];
    let bogus = ExecOptions::from_bits_retain(0x40);
    assert_eq!(
        exec(&re, None, b"a", 0, bogus, &mut v),
        Err(ExecError::BadOption)
    );

    let mut broken = perl("a");
    broken.magic = 0;
    assert_eq!(
        exec(&broken, None, b"a", 0, ExecOptions::empty(), &mut v),
        Err(ExecError::BadMagic)
    );
}

// ---- POSIX front-end behavior through exec ----

#[test]
fn bre_backreference() {
    let re = posix_compile(b"\\(a\\)\\1", Options::empty(), None).unwrap();
    let mut v = [0i32; 9];
    assert_eq!(exec(&re, None, b"aa", 0, ExecOptions::empty(), &mut v), Ok(2));
    assert_eq!((v[0], v[1]), (0, 2));
    assert_eq!((v[2], v[3]), (0, 1));
}

#[test]
fn posix_word_edges() {
    let re = posix_compile(b"\\<cat\\>", Options::EXTENDED, None).unwrap();
    let mut v = [0i32; 6];
    assert_eq!(
        exec(&re, None, b"the cat sat", 0, ExecOptions::empty(), &mut v),
        Ok(1)
    );
    assert_eq!((v[0], v[1]), (4, 7));
    assert_eq!(
        exec(&re, None, b"concatenate", 0, ExecOptions::empty(), &mut v),
        Err(ExecError::NoMatch)
    );
}

#[test]
fn posix_bounded_dollar_pattern_skips_ahead() {
    // max_match_size lets matching start near the end; the result must be
    // the same as a full scan.
    let re = posix_compile(b"a\\{1,2\\}$", Options::empty(), None).unwrap();
    let mut v = [0i32; 6];
    assert_eq!(
        exec(&re, None, b"xxxaa", 0, ExecOptions::empty(), &mut v),
        Ok(1)
    );
    assert_eq!((v[0], v[1]), (3, 5));
}

#[test]
fn bre_agrees_with_hand_translated_ere() {
    // Basic patterns and their extended spellings must accept the same
    // subjects with the same spans.
    let pairs: &[(&str, &str)] = &[
        ("a\\{1,2\\}b", "a{1,2}b"),
        ("\\(ab\\)*c", "(ab)*c"),
        ("x\\|y", "x|y"),
        ("\\(a\\)\\1", "(a)\\1"),
    ];
    for &(bre, ere) in pairs {
        let b = posix_compile(bre.as_bytes(), Options::empty(), None).unwrap();
        let e = posix_compile(ere.as_bytes(), Options::EXTENDED, None).unwrap();
        for subject in ["ab", "aab", "ababc", "x", "y", "aa", "zzz", ""] {
            let mut vb = [0i32; 15];
            let mut ve = [0i32; 15];
            let rb = exec(&b, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut vb);
            let re_ = exec(&e, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut ve);
            assert_eq!(rb, re_, "{bre} vs {ere} on {subject}");
            if let Ok(n) = rb {
                assert_eq!(vb[..2 * n], ve[..2 * n], "{bre} vs {ere} on {subject}");
            }
        }
    }
}

// ---- Study invariance and the possessive decision ----

#[test]
fn study_never_changes_results() {
    let cases: &[(&str, &[&str])] = &[
        ("a(b|c)d", &["abd ace acd", "acd", "xxx"]),
        ("(a+)(b+)", &["aaabbbc", "ab", "ba"]),
        ("(?:ab|ac)+", &["abacad", "acab", "zz"]),
        ("abcx*", &["zzabcxxq", "abc", "abx"]),
        ("[ab]x|cd", &["qqbxp", "pcd", "ax"]),
        ("(cat|dog)\\1", &["catcat", "dogdog", "catdog"]),
        ("\\d+", &["abc123", "no digits here", "9"]),
        ("b*c*b", &["ccb", "bbccb", "b", "c"]),
        ("(?<=abc)def", &["xabcdef", "abdef"]),
    ];

    for &(pattern, subjects) in cases {
        let plain = compile(pattern.as_bytes(), Options::empty(), None).unwrap();
        let mut studied = compile(pattern.as_bytes(), Options::empty(), None).unwrap();
        let extra = study(&mut studied, StudyOptions::empty()).unwrap();

        for &subject in subjects {
            let mut a = [-9i32; NSLOTS];
            let mut b = [-9i32; NSLOTS];
            let ra = exec(&plain, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut a);
            let rb = exec(
                &studied,
                extra.as_ref(),
                subject.as_bytes(),
                0,
                ExecOptions::empty(),
                &mut b,
            );
            assert_eq!(ra, rb, "{pattern} vs {subject}");
            if let Ok(n) = ra {
                assert_eq!(a[..2 * n], b[..2 * n], "{pattern} vs {subject}");
            }
        }
    }
}

#[test]
fn possessive_star_breaks_zero_length_iterations() {
    // A pruned group star: a zero-length iteration leaves the loop and
    // matching continues after the group.
    let mut re = perl("(?:a*)*x");
    let extra = study(&mut re, StudyOptions::empty()).unwrap();
    let mut v = [0i32; 9];
    assert_eq!(
        exec(&re, extra.as_ref(), b"aax", 0, ExecOptions::empty(), &mut v),
        Ok(1)
    );
    assert_eq!((v[0], v[1]), (0, 3));
    assert_eq!(
        exec(&re, extra.as_ref(), b"x", 0, ExecOptions::empty(), &mut v),
        Ok(1)
    );
    assert_eq!((v[0], v[1]), (0, 1));
}

// ---- Contract properties ----

#[test]
fn exec_is_idempotent() {
    let re = perl("(a+)(b+)");
    for _ in 0..3 {
        let mut v = [0i32; 9];
        assert_eq!(
            exec(&re, None, b"aaabbb", 0, ExecOptions::empty(), &mut v),
            Ok(3)
        );
        assert_eq!(v[..6], [0, 6, 0, 3, 3, 6]);
    }
}

#[test]
fn matched_span_rematches_anchored() {
    // Round trip: a whole match [a,b) matches anchored on its own text.
    for (pattern, subject) in [
        ("a(b|c)d", "xxacdyy"),
        ("\\d+", "ab123cd"),
        ("\\b\\w+", "  hello"),
    ] {
        let re = perl(pattern);
        let m = run(&re, subject).unwrap();
        let (a, b) = m[0];
        let piece = &subject[a as usize..b as usize];
        let mut v = [0i32; NSLOTS];
        let rc = exec(
            &re,
            None,
            piece.as_bytes(),
            0,
            ExecOptions::ANCHORED,
            &mut v,
        )
        .unwrap();
        assert!(rc >= 1);
        assert_eq!((v[0], v[1]), (0, b - a));
    }
}

#[test]
fn inferred_anchoring_matches_forced_anchoring() {
    let re = perl("^ab+");
    assert!(re.options.contains(Options::ANCHORED));
    for subject in ["abb", "xab", "", "ab"] {
        let mut v1 = [0i32; 6];
        let mut v2 = [0i32; 6];
        let r1 = exec(&re, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut v1);
        let r2 = exec(&re, None, subject.as_bytes(), 0, ExecOptions::ANCHORED, &mut v2);
        assert_eq!(r1, r2);
        assert_eq!(v1, v2);
    }
}

#[test]
fn required_char_is_really_required() {
    let re = perl("a[bc]+z");
    assert_eq!(re.required_char(), Some(b'z'));
    // No z anywhere: never a match, however many near-misses.
    assert_eq!(run(&re, "abcbcbc abcb acbc"), None);
    assert_eq!(run(&re, "abcz"), Some(vec![(0, 4)]));
}

#[test]
fn offset_vector_discipline() {
    let re = perl("(x*)(a(b|c)d)(y?)");
    let subject = "zzacdzz";
    let mut v = [-7i32; NSLOTS];
    let n = exec(&re, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut v).unwrap();
    assert!(n >= 1);
    assert!(v[0] <= v[1]);
    assert!(v[1] as usize <= subject.len());
    for i in 1..n {
        let (s, e) = (v[2 * i], v[2 * i + 1]);
        assert!((s == -1 && e == -1) || (0 <= s && s <= e));
    }
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Study must be invisible in results for arbitrary subjects.
        #[test]
        fn study_invariance(subject in "[abcdx ]{0,24}") {
            for pattern in ["a+b+", "(?:ab|ac)+", "abcx*", "[ab]x|cd"] {
                let plain = compile(pattern.as_bytes(), Options::empty(), None).unwrap();
                let mut studied = compile(pattern.as_bytes(), Options::empty(), None).unwrap();
                let extra = study(&mut studied, StudyOptions::empty()).unwrap();

                let mut a = [0i32; 15];
                let mut b = [0i32; 15];
                let ra = exec(&plain, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut a);
                let rb = exec(&studied, extra.as_ref(), subject.as_bytes(), 0,
                              ExecOptions::empty(), &mut b);
                prop_assert_eq!(ra, rb);
                if let Ok(n) = ra {
                    prop_assert_eq!(&a[..2 * n], &b[..2 * n]);
                }
            }
        }

        /// The whole-match span always lies inside the subject.
        #[test]
        fn spans_stay_in_bounds(subject in "[ab\\n]{0,16}") {
            let re = compile(b"(a+)(b|\\n)*", Options::empty(), None).unwrap();
            let mut v = [0i32; 15];
            if let Ok(n) = exec(&re, None, subject.as_bytes(), 0, ExecOptions::empty(), &mut v) {
                let n = n.max(1);
                prop_assert!(v[0] >= 0);
                prop_assert!(v[1] as usize <= subject.len());
                for i in 0..n {
                    let (s, e) = (v[2 * i], v[2 * i + 1]);
                    prop_assert!((s == -1 && e == -1) || s <= e);
                }
            }
        }
    }
}
