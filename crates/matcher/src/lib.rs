//! Pattern execution: apply a compiled pattern to a subject string.
//!
//! [`exec`] owns the outer retry loop and the start-of-match
//! optimizations (Boyer–Moore skipping, first-character and line-start
//! scans, start-bits scans, required-character presence); each attempt
//! runs the recursive interpreter in [`interp`].

mod interp;

use tracing::trace;

use sedge_common::error::ExecError;
use sedge_common::options::{ExecOptions, Options};
use sedge_common::tables::bit_test;
use sedge_common::{CompiledPattern, ExtraInfo};

use interp::MatchData;

enum Outcome {
    Matched {
        start: usize,
        end: usize,
        top: usize,
        overflow: bool,
    },
    NoMatch,
}

/// Match `re` against `subject` starting at `start_offset`.
///
/// On success, `offsets` receives (start, end) pairs — the whole match in
/// elements 0..2, capture groups after it — and the number of filled pairs
/// is returned. A return of `Ok(0)` means the pattern matched but the
/// vector was too small for every group; only the whole match is stored.
/// Unset groups hold −1 in both slots. Only `offsets.len()` rounded down
/// to a multiple of 3 is usable: the top third is working state during the
/// match.
pub fn exec(
    re: &CompiledPattern,
    extra: Option<&ExtraInfo>,
    subject: &[u8],
    start_offset: usize,
    options: ExecOptions,
    offsets: &mut [i32],
) -> Result<usize, ExecError> {
    if !(options - ExecOptions::all()).is_empty() {
        return Err(ExecError::BadOption);
    }
    if !re.magic_ok() {
        return Err(ExecError::BadMagic);
    }
    if start_offset > subject.len() {
        return Err(ExecError::NoMatch);
    }

    let end_subject = subject.len();
    let anchored =
        re.options.contains(Options::ANCHORED) || options.contains(ExecOptions::ANCHORED);
    let startline = re.options.contains(Options::STARTLINE);
    let ims = re.options & Options::IMS;

    let mut start_match = start_offset;

    // A pattern that must end at `$` and cannot consume more than
    // max_match_size bytes can only match near the end of the subject.
    if let Some(ms) = re.max_match_size {
        if end_subject.saturating_sub(ms) > start_offset {
            start_match = end_subject - ms;
        }
    }

    // Start-of-match hints. None of them apply to anchored matching, and
    // the study tables are not consulted for line-start patterns.
    let mut first_char: Option<u8> = None;
    let mut bmtable: Option<(&[u8; 256], u8)> = None;
    let mut start_bits: Option<&[u8; 32]> = None;
    if !anchored {
        if re.options.contains(Options::FIRSTSET) {
            let mut fc = re.first_char;
            if ims.contains(Options::CASELESS) {
                fc = re.tables.lower[fc as usize];
            }
            first_char = Some(fc);
        }
        if !startline {
            match extra {
                Some(ExtraInfo::Bm { table, prefix_len }) => {
                    if start_match + *prefix_len as usize > end_subject {
                        return Err(ExecError::NoMatch);
                    }
                    bmtable = Some((table, *prefix_len));
                }
                Some(ExtraInfo::StartBits(bits)) => start_bits = Some(bits),
                None => {}
            }
        }
    }

    // If the pattern has more back references than the caller's vector
    // can track, do the work in a temporary vector and copy back whatever
    // fits.
    let offsetcount = offsets.len();
    let ocount = offsetcount - offsetcount % 3;
    let needs_temp = re.top_backref > 0 && re.top_backref as usize >= ocount / 3;
    let ocount_used = if needs_temp {
        re.top_backref as usize * 3 + 3
    } else {
        ocount
    };
    let mut temp_store: Option<Vec<i32>> = if needs_temp {
        Some(vec![0; ocount_used])
    } else {
        None
    };

    // How many data slots to reset before each attempt; resetting only
    // what the pattern can set matters for patterns with few groups.
    let resetcount = {
        let rc = 2 + re.top_bracket as usize * 2;
        if rc > offsetcount {
            ocount_used
        } else {
            rc
        }
    };

    let (req_char, req_char2) = match re.required_char() {
        Some(rc) => {
            // The case state at the required character is unknown if it
            // can change anywhere, so look for both cases then.
            let rc2 = if re.options.intersects(Options::CASELESS | Options::ICHANGED) {
                re.tables.flip[rc as usize]
            } else {
                rc
            };
            (Some(rc), rc2)
        }
        None => (None, 0),
    };

    let outcome = {
        let ovector: &mut [i32] = match temp_store {
            Some(ref mut v) => v,
            None => &mut *offsets,
        };
        let offset_end = ocount_used;
        let offset_max = (2 * ocount_used) / 3;

        // Working slots are saved and restored around group entry, so
        // they must start initialized.
        let init_lo = (offset_end + 1).saturating_sub(resetcount / 2);
        for i in init_lo..offset_end {
            ovector[i] = -1;
        }

        let mut md = MatchData {
            code: &re.code,
            subject,
            lcc: &re.tables.lower,
            ctypes: &re.tables.ctypes,
            ovector,
            offset_end,
            offset_max,
            offset_overflow: false,
            notbol: options.contains(ExecOptions::NOTBOL),
            noteol: options.contains(ExecOptions::NOTEOL),
            notempty: options.contains(ExecOptions::NOTEMPTY),
            endonly: re.options.contains(Options::DOLLAR_ENDONLY),
            first_start: start_offset,
            start_match,
            end_match_ptr: 0,
            end_offset_top: 0,
        };

        let mut req_char_ptr: Option<usize> = None;
        let mut outcome = Outcome::NoMatch;

        loop {
            for i in 0..resetcount.min(md.ovector.len()) {
                md.ovector[i] = -1;
            }

            // Skip ahead to a plausible starting position.
            if let Some((table, prefix_len)) = bmtable {
                let back = prefix_len as usize - 1;
                start_match += back;
                while start_match < end_subject {
                    let skip = table[subject[start_match] as usize] as usize;
                    if skip != 0 {
                        start_match += skip;
                    } else {
                        start_match -= back;
                        break;
                    }
                }
                start_match = start_match.min(end_subject);
            } else if let Some(fc) = first_char {
                if ims.contains(Options::CASELESS) {
                    while start_match < end_subject
                        && re.tables.lower[subject[start_match] as usize] != fc
                    {
                        start_match += 1;
                    }
                } else {
                    while start_match < end_subject && subject[start_match] != fc {
                        start_match += 1;
                    }
                }
            } else if startline {
                if start_match > start_offset {
                    while start_match < end_subject && subject[start_match - 1] != b'\n' {
                        start_match += 1;
                    }
                }
            } else if let Some(bits) = start_bits {
                while start_match < end_subject && !bit_test(bits, subject[start_match]) {
                    start_match += 1;
                }
            }

            // A required character must still occur somewhere ahead; the
            // position found last time is good until the start passes it.
            if let Some(rq) = req_char {
                let p = start_match + usize::from(first_char.is_some());
                if req_char_ptr.map_or(true, |q| p > q) {
                    let found = (p..end_subject)
                        .find(|&i| subject[i] == rq || subject[i] == req_char2);
                    match found {
                        Some(at) => req_char_ptr = Some(at),
                        None => break,
                    }
                }
            }

            md.start_match = start_match;
            if md.attempt(ims)? {
                outcome = Outcome::Matched {
                    start: start_match,
                    end: md.end_match_ptr,
                    top: md.end_offset_top,
                    overflow: md.offset_overflow,
                };
                break;
            }

            if anchored || start_match >= end_subject {
                break;
            }
            start_match += 1;
        }

        outcome
    };

    match outcome {
        Outcome::NoMatch => Err(ExecError::NoMatch),
        Outcome::Matched {
            start,
            end,
            top,
            mut overflow,
        } => {
            if let Some(temp) = temp_store {
                if offsetcount >= 4 {
                    let n = (offsetcount - 2).min(temp.len() - 2);
                    offsets[2..2 + n].copy_from_slice(&temp[2..2 + n]);
                }
                if top > offsetcount {
                    overflow = true;
                }
            }

            let mut rc = if overflow { 0 } else { top / 2 };
            if offsetcount < 2 {
                rc = 0;
            } else {
                offsets[0] = start as i32;
                offsets[1] = end as i32;
            }
            trace!(start, end, pairs = rc, "match");
            Ok(rc)
        }
    }
}

/// The text of capture `n` after a successful [`exec`] that returned
/// `count` pairs. Substring 0 is the whole match; a group that exists but
/// did not participate yields [`ExecError::NoSubstring`] too.
pub fn get_substring<'s>(
    subject: &'s [u8],
    offsets: &[i32],
    count: usize,
    n: usize,
) -> Result<&'s [u8], ExecError> {
    if n >= count || 2 * n + 1 >= offsets.len() {
        return Err(ExecError::NoSubstring);
    }
    let (s, e) = (offsets[2 * n], offsets[2 * n + 1]);
    if s < 0 || e < s || e as usize > subject.len() {
        return Err(ExecError::NoSubstring);
    }
    Ok(&subject[s as usize..e as usize])
}

/// All captured substrings after a successful [`exec`], with `None` for
/// groups that did not participate.
pub fn get_substring_list<'s>(
    subject: &'s [u8],
    offsets: &[i32],
    count: usize,
) -> Vec<Option<&'s [u8]>> {
    (0..count)
        .map(|n| get_substring(subject, offsets, count, n).ok())
        .collect()
}
