//! Creation-site provenance capture and filtering.
//!
//! A raw backtrace is captured once, at the moment a future is wrapped, and
//! stored as text. The filters here are pure line-oriented functions: they
//! drop frames belonging to the capture machinery, the standard library, the
//! async runtime, and registry dependencies, leaving the frames that point at
//! the code that actually created the future.

use backtrace::Backtrace;

/// Capture the current call stack as a formatted string.
///
/// Symbol resolution happens eagerly; this is the expensive part of tracking
/// a future, and the reason instrumentation is opt-in.
pub(crate) fn capture_raw() -> String {
    format!("{:?}", Backtrace::new())
}

/// Frame substrings that identify noise: capture machinery, runtime
/// internals, and scheduling plumbing that never points at user code.
const NOISE: &[&str] = &[
    "backtrace::",
    "backtrace_rs",
    "std::backtrace",
    "std::sys",
    "std::rt::lang_start",
    "std::panicking",
    "std::thread",
    "core::ops::function",
    "oubli::trace",
    "oubli::instrument",
    "tokio::runtime",
    "tokio::task",
    "tokio::park",
    "mio::poll",
    "mio::sys",
    "__rust_begin_short_backtrace",
    "_pthread_",
    "pthread_",
    "<unknown>",
];

/// Path substrings that identify third-party or toolchain source locations
/// on `at file:line` continuation lines.
const NOISE_PATHS: &[&str] = &[
    ".cargo/registry",
    "/registry/src/",
    "/rustc/",
    "library/std",
    "library/core",
    "library/alloc",
    "oubli/src/trace.rs",
    "oubli/src/instrument.rs",
];

fn is_noise(line: &str) -> bool {
    NOISE.iter().any(|n| line.contains(n)) || NOISE_PATHS.iter().any(|n| line.contains(n))
}

/// Strip a leading `N: ` frame index, if present.
fn strip_frame_number(line: &str) -> &str {
    if let Some(idx) = line.find(": ")
        && !line[..idx].is_empty()
        && line[..idx].trim().chars().all(|c| c.is_ascii_digit())
    {
        return line[idx + 2..].trim();
    }
    line
}

/// Filter a raw multi-line backtrace down to the frames worth reporting.
///
/// Splits into lines, drops noise frames, trims what survives, rejoins.
/// Deterministic and side-effect free; empty input yields an empty string.
pub fn filter_trace(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_noise(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the single most representative frame from a raw backtrace.
///
/// Prefers a conventional symbol frame (`N: module::function`), skipping
/// `at file:line` continuation lines; falls back to the first surviving line
/// of any shape when no symbol frame remains.
pub fn top_frame(raw: &str) -> Option<String> {
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("at ") || trimmed.starts_with("stack ") {
            continue;
        }
        let frame = strip_frame_number(trimmed);
        if frame.is_empty() || is_noise(frame) {
            continue;
        }
        return Some(frame.to_string());
    }

    // Nothing symbol-shaped survived; fall back to the first line the
    // filters keep at all.
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !is_noise(line))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"   0: backtrace::backtrace::trace
             at /home/user/.cargo/registry/src/index.crates.io/backtrace-0.3.74/src/lib.rs:66
   1: oubli::trace::capture_raw
             at ./crates/oubli/src/trace.rs:16
   2: myapp::pipeline::fetch_records
             at ./src/pipeline.rs:41
   3: myapp::main::{{closure}}
             at ./src/main.rs:12
   4: tokio::runtime::park::CachedParkThread::block_on
             at /home/user/.cargo/registry/src/index.crates.io/tokio-1.49.0/src/runtime/park.rs:285
   5: std::rt::lang_start
             at /rustc/abc123/library/std/src/rt.rs:195
"#;

    #[test]
    fn filter_drops_runtime_and_dependency_frames() {
        let filtered = filter_trace(SAMPLE);
        assert!(filtered.contains("myapp::pipeline::fetch_records"));
        assert!(filtered.contains("at ./src/pipeline.rs:41"));
        assert!(!filtered.contains("backtrace::"));
        assert!(!filtered.contains("tokio::runtime"));
        assert!(!filtered.contains(".cargo/registry"));
        assert!(!filtered.contains("std::rt"));
    }

    #[test]
    fn filter_trims_lines() {
        for line in filter_trace(SAMPLE).lines() {
            assert_eq!(line, line.trim());
        }
    }

    #[test]
    fn filter_tolerates_empty_input() {
        assert_eq!(filter_trace(""), "");
    }

    #[test]
    fn top_frame_prefers_first_application_symbol() {
        assert_eq!(
            top_frame(SAMPLE).as_deref(),
            Some("myapp::pipeline::fetch_records")
        );
    }

    #[test]
    fn top_frame_strips_frame_number() {
        let frame = top_frame("  7: myapp::worker::run\n").unwrap();
        assert_eq!(frame, "myapp::worker::run");
    }

    #[test]
    fn top_frame_falls_back_to_first_surviving_line() {
        // No symbol frames at all, but one line survives filtering.
        let raw = "at ./src/main.rs:3\n";
        assert_eq!(top_frame(raw).as_deref(), Some("at ./src/main.rs:3"));
    }

    #[test]
    fn top_frame_empty_when_everything_is_noise() {
        let raw = "   0: tokio::runtime::scheduler::run\n";
        assert_eq!(top_frame(raw), None);
        assert_eq!(top_frame(""), None);
    }
}
