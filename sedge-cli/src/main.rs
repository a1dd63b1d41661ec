//! sgrep — grep with the sedge regex engine.
//!
//! Exit codes:
//! - 0: at least one line selected
//! - 1: no lines selected
//! - 2: usage, pattern, or file error

mod grep;

use std::fs::File;
use std::io::{self, BufReader};
use std::process;

use sedge_common::options::{Options, StudyOptions};

#[derive(Clone, Copy, PartialEq)]
enum Syntax {
    Basic,
    Extended,
    Perl,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SEDGE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    let mut config = grep::Config::default();
    let mut syntax = Syntax::Perl;
    let mut options = Options::empty();
    let mut show_filenames = true;

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if !arg.starts_with('-') || arg == "-" {
            break;
        }
        for ch in arg.chars().skip(1) {
            match ch {
                'b' => syntax = Syntax::Basic,
                'e' => syntax = Syntax::Extended,
                'p' => syntax = Syntax::Perl,
                'c' => config.count_only = true,
                'h' => show_filenames = false,
                'i' => options |= Options::CASELESS,
                'l' => config.filenames_only = true,
                'n' => config.number = true,
                's' => config.silent = true,
                'v' => config.invert = true,
                'x' => {
                    config.whole_lines = true;
                    options |= Options::ANCHORED;
                }
                other => {
                    eprintln!("sgrep: unknown option {other}");
                    return usage(2);
                }
            }
        }
        i += 1;
    }

    if i >= args.len() {
        return usage(2);
    }
    let pattern = args[i].as_bytes();
    i += 1;

    let compiled = match syntax {
        Syntax::Basic => sedge_compiler::posix_compile(pattern, options, None),
        Syntax::Extended => {
            sedge_compiler::posix_compile(pattern, options | Options::EXTENDED, None)
        }
        Syntax::Perl => sedge_compiler::compile(pattern, options, None),
    };
    let mut re = match compiled {
        Ok(re) => re,
        Err(e) => {
            eprintln!("sgrep: error in regex at offset {}: {}", e.offset, e.kind);
            return 2;
        }
    };
    let hints = sedge_study::study(&mut re, StudyOptions::empty()).unwrap_or(None);

    let files = &args[i..];
    let mut rc = 1;

    if files.is_empty() {
        let stdin = io::stdin();
        match grep::grep_input(stdin.lock(), None, &re, hints.as_ref(), &config) {
            Ok(true) => rc = 0,
            Ok(false) => {}
            Err(e) => {
                eprintln!("sgrep: error reading stdin: {e}");
                rc = 2;
            }
        }
        return rc;
    }

    config.show_filenames = show_filenames && files.len() > 1;
    for path in files {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("sgrep: failed to open {path}: {e}");
                rc = 2;
                continue;
            }
        };
        let name = Some(path.as_str());
        match grep::grep_input(BufReader::new(file), name, &re, hints.as_ref(), &config) {
            Ok(true) => {
                if rc == 1 {
                    rc = 0;
                }
            }
            Ok(false) => {}
            Err(e) => {
                eprintln!("sgrep: error reading {path}: {e}");
                rc = 2;
            }
        }
    }
    rc
}

fn usage(rc: i32) -> i32 {
    eprintln!("Usage: sgrep [-bcehilnpsvx] pattern [file] ...");
    eprintln!();
    eprintln!("  -b  pattern is a POSIX basic regular expression");
    eprintln!("  -e  pattern is a POSIX extended regular expression");
    eprintln!("  -p  pattern is a Perl-style regular expression (default)");
    eprintln!("  -c  print only a count of matching lines");
    eprintln!("  -h  suppress file names in output");
    eprintln!("  -i  match case-insensitively");
    eprintln!("  -l  print only names of files with matches");
    eprintln!("  -n  prefix each line with its line number");
    eprintln!("  -s  no output; the exit status says whether anything matched");
    eprintln!("  -v  select non-matching lines");
    eprintln!("  -x  select only whole-line matches");
    rc
}
