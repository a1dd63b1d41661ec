//! The study pass: derive optional match-time hints from compiled code.
//!
//! Three independent analyses run over the finished code stream:
//!
//! - possessive pruning ([`prune`]) rewrites backtracking repeats in place
//!   wherever giving characters back provably cannot help;
//! - a Boyer–Moore skip table ([`boyer_moore`]) over the pattern's fixed
//!   prefix, when one of length ≥ 2 exists;
//! - a starting-byte bitmap ([`start_bits`]) as the fallback when neither
//!   a prefix nor a single first character is known.
//!
//! Study never changes what a pattern matches; it only speeds matching up.

mod boyer_moore;
mod prune;
mod start_bits;

use tracing::trace;

use sedge_common::error::StudyError;
use sedge_common::options::{Options, StudyOptions};
use sedge_common::{CompiledPattern, ExtraInfo};

/// Study a compiled pattern. Pruning rewrites the code in place; the
/// returned block, if any, is handed to `exec` alongside the pattern.
pub fn study(
    re: &mut CompiledPattern,
    options: StudyOptions,
) -> Result<Option<ExtraInfo>, StudyError> {
    if !re.magic_ok() {
        return Err(StudyError::BadMagic);
    }
    if !(options - (StudyOptions::NO_PRUNE | StudyOptions::NO_START)).is_empty() {
        return Err(StudyError::BadOption);
    }

    let caseless = re.options.contains(Options::CASELESS);
    let tables = re.tables.clone();

    if !options.contains(StudyOptions::NO_PRUNE) {
        prune::prune(&mut re.code, re.top_bracket, caseless, &tables);
    }

    // Anchored patterns (and multiline ones pinned to line starts) gain
    // nothing from start-of-match tables.
    if re.options.intersects(Options::ANCHORED | Options::STARTLINE)
        || options.contains(StudyOptions::NO_START)
    {
        return Ok(None);
    }

    let mut table = [0u8; 256];
    let prefix_len = boyer_moore::build(&re.code, 0, &mut table, 0, caseless, &tables);
    if prefix_len > 1 {
        let prefix_len = prefix_len.min(255) as u8;
        for b in table.iter_mut() {
            *b = prefix_len - *b;
        }
        trace!(prefix_len, "study built a skip table");
        return Ok(Some(ExtraInfo::Bm { table, prefix_len }));
    }

    // With a single known first byte the plain scan is already as good.
    if re.options.contains(Options::FIRSTSET) {
        return Ok(None);
    }

    let mut bits = [0u8; 32];
    if start_bits::build(&re.code, 0, &mut bits, caseless, &tables) {
        trace!("study built a start-bits map");
        return Ok(Some(ExtraInfo::StartBits(bits)));
    }

    Ok(None)
}
