//! Single-dash long flag compatibility
//!
//! The tool has always been driven as `if-inject netns -ns kube-system -pod
//! coredns-0`. clap only understands `--ns`, so known long flags written with
//! one dash are rewritten before parsing. Anything else, including short
//! flags like `-h`, is left alone.

use std::ffi::OsString;

const LONG_FLAGS: &[&str] = &[
    "ns",
    "pod",
    "interface",
    "spec",
    "loglevel",
    "version",
    "help",
    "runtime-endpoint",
    "config",
    "timeout",
    "format",
];

/// Rewrite `-flag` and `-flag=value` to their `--` form
pub fn normalize<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;

    for arg in args {
        if passthrough {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }

        let rewritten = arg.to_str().and_then(rewrite);
        out.push(rewritten.map(OsString::from).unwrap_or(arg));
    }
    out
}

fn rewrite(arg: &str) -> Option<String> {
    let body = arg.strip_prefix('-')?;
    if body.starts_with('-') {
        return None;
    }
    let name = body.split_once('=').map_or(body, |(name, _)| name);
    LONG_FLAGS.contains(&name).then(|| format!("-{}", arg))
}
