//! Per-file matching loop for sgrep.

use std::io::{self, BufRead};

use sedge_common::options::ExecOptions;
use sedge_common::{CompiledPattern, ExtraInfo};
use sedge_matcher::exec;

#[derive(Default, Clone)]
pub struct Config {
    pub count_only: bool,
    pub filenames_only: bool,
    pub invert: bool,
    pub number: bool,
    pub silent: bool,
    pub whole_lines: bool,
    /// Prefix output lines with the file name (set when several files are
    /// searched and -h was not given).
    pub show_filenames: bool,
}

/// Grep one input. Returns whether anything was selected.
pub fn grep_input<R: BufRead>(
    mut input: R,
    name: Option<&str>,
    re: &CompiledPattern,
    extra: Option<&ExtraInfo>,
    config: &Config,
) -> io::Result<bool> {
    let mut selected = false;
    let mut linenumber = 0u64;
    let mut count = 0u64;
    let mut offsets = [0i32; 99];
    let mut line = Vec::new();

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        linenumber += 1;

        let mut matched = exec(re, extra, &line, 0, ExecOptions::empty(), &mut offsets).is_ok();
        if matched && config.whole_lines && offsets[1] as usize != line.len() {
            matched = false;
        }

        if matched != config.invert {
            selected = true;

            if config.count_only {
                count += 1;
            } else if config.filenames_only {
                println!("{}", name.unwrap_or("<stdin>"));
                return Ok(true);
            } else if config.silent {
                return Ok(true);
            } else {
                if config.show_filenames {
                    if let Some(name) = name {
                        print!("{name}:");
                    }
                }
                if config.number {
                    print!("{linenumber}:");
                }
                println!("{}", String::from_utf8_lossy(&line));
            }
        }
    }

    if config.count_only {
        if config.show_filenames {
            if let Some(name) = name {
                print!("{name}:");
            }
        }
        println!("{count}");
    }

    Ok(selected)
}
