//! The sedge regex compiler: two passes over the pattern text.
//!
//! The first pass ([`size`]) computes an upper bound on the code size and
//! catches most syntax errors; the second ([`emit`], [`branch`]) writes the
//! opcode stream into a buffer of that size. Two front-ends share the
//! emitter: [`compile`] accepts the Perl syntax, [`posix_compile`] accepts
//! POSIX basic or extended expressions, with BRE mechanically rewritten to
//! ERE ([`bre`]) first. After emission, [`analyze`] derives the anchoring,
//! first-character, start-line, and required-character facts recorded on
//! the pattern.

mod analyze;
mod branch;
mod bre;
mod emit;
mod escape;
mod quant;
mod size;

use std::sync::Arc;

use tracing::trace;

use sedge_common::error::{CompileError, CompileErrorKind};
use sedge_common::op;
use sedge_common::options::Options;
use sedge_common::pattern::MAGIC;
use sedge_common::{CharTables, CompiledPattern};

use emit::{Emitter, Flavor};

/// Compile a Perl-flavor pattern. `tables` defaults to the process-wide
/// character tables.
pub fn compile(
    pattern: &[u8],
    options: Options,
    tables: Option<Arc<CharTables>>,
) -> Result<CompiledPattern, CompileError> {
    if !(options - Options::PUBLIC).is_empty() {
        return Err(CompileError::new(CompileErrorKind::BadOptionBits, 0));
    }
    let tables = tables.unwrap_or_else(CharTables::default_tables);
    let estimate = size::estimate_perl(pattern, options, &tables)?;
    let (re, _) = run_second_pass(pattern, estimate, tables, Flavor::Perl)?;
    Ok(re)
}

/// Compile a POSIX pattern: basic syntax by default, extended when
/// `Options::EXTENDED` is set. Basic patterns are first rewritten into the
/// extended syntax; error offsets still refer to the original text.
pub fn posix_compile(
    pattern: &[u8],
    options: Options,
    tables: Option<Arc<CharTables>>,
) -> Result<CompiledPattern, CompileError> {
    if !(options - Options::PUBLIC).is_empty() {
        return Err(CompileError::new(CompileErrorKind::BadOptionBits, 0));
    }
    let tables = tables.unwrap_or_else(CharTables::default_tables);

    if !options.contains(Options::EXTENDED) {
        let translated = bre::basic_to_extended(pattern);
        return posix_compile_ere(&translated.ere, options | Options::EXTENDED, tables)
            .map_err(|e| CompileError::new(e.kind, translated.source_offset(e.offset)));
    }
    posix_compile_ere(pattern, options, tables)
}

fn posix_compile_ere(
    pattern: &[u8],
    options: Options,
    tables: Arc<CharTables>,
) -> Result<CompiledPattern, CompileError> {
    let estimate = size::estimate_posix(pattern, options, &tables)?;
    let (mut re, max_size) = run_second_pass(pattern, estimate, tables, Flavor::Posix)?;

    // A bounded pattern that must end at `$` lets matching begin near the
    // end of the subject.
    if analyze::is_endline(&re.code) {
        re.max_match_size = max_size.map(|v| v as usize);
    }
    Ok(re)
}

fn run_second_pass(
    pattern: &[u8],
    estimate: size::SizeEstimate,
    tables: Arc<CharTables>,
    flavor: Flavor,
) -> Result<(CompiledPattern, Option<u64>), CompileError> {
    let mut em = Emitter::new(pattern, estimate.length, &tables, flavor);

    // The whole pattern compiles as one outer non-capturing bracket.
    em.set(0, op::BRA);
    let mut ptr = 0usize;
    let out = em.compile_regex(estimate.options, -1, &mut ptr, false, 0)?;

    // Anything left over is a parenthesis with no opener.
    if ptr < pattern.len() {
        return Err(CompileError::new(
            CompileErrorKind::UnmatchedParentheses,
            ptr,
        ));
    }
    em.emit(op::END);

    if em.out > em.limit {
        return Err(CompileError::new(CompileErrorKind::CodeOverflow, 0));
    }
    if estimate.top_backref > em.brackets {
        return Err(CompileError::new(
            CompileErrorKind::BackrefOutOfRange,
            pattern.len(),
        ));
    }

    let top_bracket = em.brackets;
    let code_len = em.out;
    let mut code = em.code;
    code.truncate(code_len);

    let mut re = CompiledPattern {
        magic: MAGIC,
        options: estimate.options,
        top_bracket,
        top_backref: estimate.top_backref,
        first_char: 0,
        req_char: 0,
        max_match_size: None,
        tables,
        code,
    };
    finish_flags(&mut re, out.reqchar, out.countlits);

    trace!(
        bytes = re.code.len(),
        groups = re.top_bracket,
        options = ?re.options,
        "pattern compiled"
    );
    Ok((re, out.max_size))
}

/// Derive the start-of-match facts the matcher uses to skip ahead.
fn finish_flags(re: &mut CompiledPattern, reqchar: i32, countlits: i64) {
    if !re.options.contains(Options::ANCHORED) {
        if analyze::is_anchored(&re.code, re.options) {
            re.options |= Options::ANCHORED;
        } else {
            let mut topts = re.options;
            if let Some(ch) = analyze::find_firstchar(&re.code, &mut topts) {
                re.first_char = ch;
                re.options |= Options::FIRSTSET;
            } else if analyze::is_startline(&re.code) {
                re.options |= Options::STARTLINE;
            }
        }
    }

    // Keep the last required literal when it is useful: either there are
    // at least two mandatory literals, or no first character is known.
    if reqchar >= 0 && (countlits > 1 || !re.options.contains(Options::FIRSTSET)) {
        re.req_char = reqchar as u8;
        re.options |= Options::REQCHSET;
    }
}
