//! Tests for the study analyses, driven through the real compiler.

use sedge_common::debug::dump;
use sedge_common::options::{Options, StudyOptions};
use sedge_common::{CompiledPattern, ExtraInfo};
use sedge_compiler::compile;
use sedge_study::study;

fn studied(pattern: &str) -> (CompiledPattern, Option<ExtraInfo>) {
    let mut re = compile(pattern.as_bytes(), Options::empty(), None).unwrap();
    let extra = study(&mut re, StudyOptions::empty()).unwrap();
    (re, extra)
}

#[test]
fn literal_prefix_builds_a_skip_table() {
    let (_, extra) = studied("abcx*");
    let Some(ExtraInfo::Bm { table, prefix_len }) = extra else {
        panic!("expected a BM table, got {extra:?}");
    };
    assert_eq!(prefix_len, 3);
    // Bytes seen at distance d skip prefix_len - d; unseen bytes skip the
    // whole prefix.
    assert_eq!(table[b'a' as usize], 2);
    assert_eq!(table[b'b' as usize], 1);
    assert_eq!(table[b'c' as usize], 0);
    assert_eq!(table[b'z' as usize], 3);
}

#[test]
fn caseless_prefix_marks_both_cases() {
    let mut re = compile(b"abc", Options::CASELESS, None).unwrap();
    let extra = study(&mut re, StudyOptions::empty()).unwrap();
    let Some(ExtraInfo::Bm { table, .. }) = extra else {
        panic!("expected a BM table");
    };
    assert_eq!(table[b'a' as usize], table[b'A' as usize]);
    assert_eq!(table[b'c' as usize], table[b'C' as usize]);
}

#[test]
fn single_char_prefix_is_not_worth_a_table() {
    // Prefix length 1: the first-char scan already covers it.
    let (_, extra) = studied("ax*");
    assert_eq!(extra, None);
}

#[test]
fn alternation_falls_back_to_start_bits() {
    let (_, extra) = studied("[ab]x|cd");
    let Some(ExtraInfo::StartBits(bits)) = extra else {
        panic!("expected start bits, got {extra:?}");
    };
    for c in [b'a', b'b', b'c'] {
        assert!(bits[(c >> 3) as usize] & (1 << (c & 7)) != 0, "missing {c}");
    }
    assert!(bits[(b'd' >> 3) as usize] & (1 << (b'd' & 7)) == 0);
    assert!(bits[(b'x' >> 3) as usize] & (1 << (b'x' & 7)) == 0);
}

#[test]
fn zero_minimum_items_widen_start_bits() {
    let (_, extra) = studied("z?[0-1]a|q\\d");
    let Some(ExtraInfo::StartBits(bits)) = extra else {
        panic!("expected start bits, got {extra:?}");
    };
    for c in [b'z', b'0', b'1', b'q'] {
        assert!(bits[(c >> 3) as usize] & (1 << (c & 7)) != 0, "missing {c}");
    }
    // The class after the optional z is mandatory, so 'a' never starts.
    assert!(bits[(b'a' >> 3) as usize] & (1 << (b'a' & 7)) == 0);
}

#[test]
fn anchored_patterns_get_no_start_info() {
    let (_, extra) = studied("^abc");
    assert_eq!(extra, None);
}

#[test]
fn no_start_option_suppresses_tables() {
    let mut re = compile(b"abc", Options::empty(), None).unwrap();
    let extra = study(&mut re, StudyOptions::NO_START).unwrap();
    assert_eq!(extra, None);
}

#[test]
fn dot_star_start_cannot_be_mapped() {
    let (_, extra) = studied(".*x|.y");
    assert_eq!(extra, None);
}

#[test]
fn pruning_makes_disjoint_repeats_possessive() {
    // b cannot start with an a, so a+ never benefits from backtracking.
    let (re, _) = studied("a+b+");
    let text = dump(&re);
    assert!(text.contains("ONCEPLUS 'a'"), "{text}");
    // The trailing repeat is greedy and nothing follows: also possessive.
    assert!(text.contains("ONCEPLUS 'b'"), "{text}");
}

#[test]
fn pruning_leaves_overlapping_repeats_alone() {
    let (re, _) = studied("a+ab");
    let text = dump(&re);
    assert!(text.contains("MAXPLUS 'a'"), "{text}");
    assert!(!text.contains("ONCEPLUS 'a'"), "{text}");
}

#[test]
fn pruning_respects_possibly_empty_followers() {
    // c* can be empty; backtracking b* past it can still reach the final
    // b, so b* must stay backtrackable.
    let (re, _) = studied("b*c*b");
    let text = dump(&re);
    assert!(text.contains("MAXSTAR 'b'"), "{text}");
}

#[test]
fn pruning_converts_group_plus_to_possessive() {
    let (re, _) = studied("(?:ab|ac)+");
    let text = dump(&re);
    assert!(text.contains("KET_ONCESTAR"), "{text}");
}

#[test]
fn no_prune_option_keeps_the_code_intact() {
    let mut re = compile(b"a+b+", Options::empty(), None).unwrap();
    let before = re.code.clone();
    study(&mut re, StudyOptions::NO_PRUNE | StudyOptions::NO_START).unwrap();
    assert_eq!(re.code, before);
}

#[test]
fn class_prefix_contributes_to_the_table() {
    let (_, extra) = studied("[ab]cd");
    let Some(ExtraInfo::Bm { table, prefix_len }) = extra else {
        panic!("expected a BM table, got {extra:?}");
    };
    assert_eq!(prefix_len, 3);
    assert_eq!(table[b'a' as usize], 2);
    assert_eq!(table[b'b' as usize], 2);
    assert_eq!(table[b'c' as usize], 1);
    assert_eq!(table[b'd' as usize], 0);
}
