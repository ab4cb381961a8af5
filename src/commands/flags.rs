//! Flag parsing for builtin commands.
//!
//! Chat users type single-dash long flags (`-limit=1`,
//! `-user someone`); they are rewritten to `--limit=1` before handing the
//! arguments to a `clap` parser.

use crate::error::{Error, Result};
use clap::Parser;

/// Rewrite single-dash long flags to the double-dash form. Negative numbers
/// and everything after a bare `--` are left alone.
pub fn normalize(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut passthrough = false;
    for arg in args {
        if passthrough {
            out.push(arg.clone());
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg.clone());
            continue;
        }
        let single_dash = arg.starts_with('-')
            && !arg.starts_with("--")
            && arg[1..].starts_with(|c: char| c.is_ascii_alphabetic());
        if single_dash {
            out.push(format!("-{arg}"));
        } else {
            out.push(arg.clone());
        }
    }
    out
}

/// Parse `args` into `T`. Parsers are expected to set
/// `no_binary_name = true`.
pub fn parse<T: Parser>(args: &[String]) -> Result<T> {
    T::try_parse_from(normalize(args)).map_err(|e| Error::invalid(e.render().to_string().trim_end()))
}

/// A `-limit` value as a scan bound; zero and negative limits match nothing.
pub fn limit(raw: i64) -> usize {
    usize::try_from(raw).unwrap_or(0)
}
