//! Interpreter command line patching.
//!
//! Given an interpreter invocation like:
//!
//! ```text
//! py -R -Q warn -m app
//! ```
//!
//! the patched invocation keeps the same meaning but runs under the debugger:
//!
//! ```text
//! py -R -Q warn -m ptvsd --host localhost --port 0 ... -m app
//! ```
//!
//! The first `-m` is handled by the interpreter, the second one by the debugger.
//! Command lines that can't be interpreted are returned unchanged, such processes
//! run without debugging.

use crate::listener::SubprocessListener;
use crate::options::Options;

/// Default module started by the interpreter in place of the target.
pub const DEFAULT_DEBUGGER_MODULE: &str = "ptvsd";

/// Read program from standard input.
const STDIN_MARKER: &str = "-";
/// Switches that make the next token (or rest of the command line) a target.
const TARGET_SWITCHES: [&str; 2] = ["-c", "-m"];
/// Long switches with a value in the next token.
const LONG_SWITCHES_WITH_VALUE: [&str; 1] = ["--check-hash-based-pycs"];
/// Short switches with a value, attached or in the next token.
const SHORT_SWITCHES_WITH_VALUE: [char; 3] = ['Q', 'W', 'X'];
/// Extension of a source file target.
const SOURCE_SUFFIX: &str = ".py";

/// Scanner state, one transition per token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    Scanning,
    ExpectingValue,
    FoundTarget(usize),
    Unsupported,
}

impl ScanState {
    fn is_final(self) -> bool {
        matches!(self, ScanState::FoundTarget(_) | ScanState::Unsupported)
    }

    fn next(self, idx: usize, token: &str) -> ScanState {
        match self {
            ScanState::FoundTarget(_) | ScanState::Unsupported => self,
            // debugging of a program from stdin is not supported
            _ if token == STDIN_MARKER => ScanState::Unsupported,
            ScanState::ExpectingValue => ScanState::Scanning,
            ScanState::Scanning => {
                if !token.starts_with('-') || TARGET_SWITCHES.contains(&token) {
                    ScanState::FoundTarget(idx)
                } else if token.starts_with("--") {
                    if LONG_SWITCHES_WITH_VALUE.contains(&token) {
                        ScanState::ExpectingValue
                    } else {
                        ScanState::Scanning
                    }
                } else if short_block_expects_value(token) {
                    ScanState::ExpectingValue
                } else {
                    ScanState::Scanning
                }
            }
        }
    }
}

/// Short switches may be combined, `-RBQ old` is `-R -B -Q old`. A switch with
/// a value eats the rest of the token, `-RQold` is `-R -Q old`. Value is in the
/// next token only if nothing follows the first switch with a value.
fn short_block_expects_value(token: &str) -> bool {
    let block = &token[1..];
    match block.find(SHORT_SWITCHES_WITH_VALUE) {
        Some(pos) => pos + 1 == block.len(),
        None => false,
    }
}

/// Return index of the invocation target (a file name, `-m` or `-c`),
/// `None` if there is no target or the invocation is unsupported.
pub fn locate_target<S: AsRef<str>>(args: &[S]) -> Option<usize> {
    let mut state = ScanState::Scanning;
    // args[0] is the interpreter binary
    for (idx, token) in args.iter().enumerate().skip(1) {
        state = state.next(idx, token.as_ref());
        if state.is_final() {
            break;
        }
    }

    match state {
        ScanState::FoundTarget(idx) => Some(idx),
        _ => None,
    }
}

/// Linkage of patched subprocesses to the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchContext {
    /// Id of the process that spawns a subprocess.
    pub process_id: u32,
    /// Port of the root process announcement listener.
    pub notify_port: u16,
    pub debugger_module: String,
}

impl PatchContext {
    pub fn new(process_id: u32, notify_port: u16) -> Self {
        Self {
            process_id,
            notify_port,
            debugger_module: DEFAULT_DEBUGGER_MODULE.to_string(),
        }
    }

    /// Return context for the current process. Root process uses port of its
    /// own `listener`. Return `None` if multiprocess debugging is off or root port is unknown.
    pub fn current(options: &Options, listener: Option<&SubprocessListener>) -> Option<Self> {
        if !options.multiprocess {
            return None;
        }
        let notify_port = options
            .subprocess_notify
            .or_else(|| listener.and_then(SubprocessListener::port))?;
        Some(Self::new(std::process::id(), notify_port))
    }

    pub fn with_debugger_module(mut self, module: impl Into<String>) -> Self {
        self.debugger_module = module.into();
        self
    }

    fn debugger_args(&self) -> [String; 12] {
        [
            "-m".to_string(),
            self.debugger_module.clone(),
            "--host".to_string(),
            "localhost".to_string(),
            "--port".to_string(),
            "0".to_string(),
            "--wait".to_string(),
            "--multiprocess".to_string(),
            "--subprocess-of".to_string(),
            self.process_id.to_string(),
            "--subprocess-notify".to_string(),
            self.notify_port.to_string(),
        ]
    }
}

/// Patch an interpreter command line so the process runs under the debugger.
/// Unsupported command lines are returned unchanged.
pub fn patch_args<S: AsRef<str>>(args: &[S], ctx: &PatchContext) -> Vec<String> {
    let mut args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();

    let Some(target_idx) = locate_target(&args) else {
        return args;
    };

    // a file name may be a source file, a directory or a zip archive,
    // only the first one is supported
    let target = &args[target_idx];
    if !target.starts_with('-') && !target.ends_with(SOURCE_SUFFIX) {
        return args;
    }

    // debugger accepts the same target forms as the interpreter, target stays as is
    args.splice(target_idx..target_idx, ctx.debugger_args());
    args
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx() -> PatchContext {
        PatchContext::new(100, 5678)
    }

    fn injected() -> Vec<String> {
        ctx().debugger_args().to_vec()
    }

    fn with_injection(before: &[&str], after: &[&str]) -> Vec<String> {
        before
            .iter()
            .map(|s| s.to_string())
            .chain(injected())
            .chain(after.iter().map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn test_locate_target() {
        struct TestCase {
            args: &'static [&'static str],
            expected: Option<usize>,
        }

        let cases = [
            TestCase {
                args: &["py", "script.py"],
                expected: Some(1),
            },
            TestCase {
                args: &["py", "-B", "-c", "print(1)"],
                expected: Some(2),
            },
            TestCase {
                args: &["py", "-Rv", "-m", "app"],
                expected: Some(2),
            },
            TestCase {
                args: &["py", "-Q", "warn", "-m", "app"],
                expected: Some(3),
            },
            TestCase {
                args: &["py", "-RBQ", "old", "x.py"],
                expected: Some(3),
            },
            TestCase {
                args: &["py", "-Qwarn", "x.py"],
                expected: Some(2),
            },
            TestCase {
                args: &["py", "-RQv", "x.py"],
                expected: Some(2),
            },
            TestCase {
                args: &["py", "-X", "-c", "x.py"],
                expected: Some(3),
            },
            TestCase {
                args: &["py", "--check-hash-based-pycs", "always", "x.py"],
                expected: Some(3),
            },
            TestCase {
                args: &["py", "--version", "x.py"],
                expected: Some(2),
            },
            TestCase {
                args: &["py", "-B", "-"],
                expected: None,
            },
            TestCase {
                args: &["py", "-X", "-"],
                expected: None,
            },
            TestCase {
                args: &["py", "-B", "-W"],
                expected: None,
            },
            TestCase {
                args: &["py"],
                expected: None,
            },
        ];

        for tc in cases {
            assert_eq!(locate_target(tc.args), tc.expected, "args: {:?}", tc.args);
        }
    }

    #[test]
    fn test_unsupported_unchanged() {
        let cases: [&[&str]; 6] = [
            &["py", "-"],
            &["py", "app.zip"],
            &["py", "some/dir"],
            &["py", "-B", "-v"],
            &["py", "-W"],
            &["py"],
        ];

        for args in cases {
            assert_eq!(patch_args(args, &ctx()), args, "args: {args:?}");
        }
    }

    #[test]
    fn test_patch_script() {
        let patched = patch_args(&["py", "script.py", "--flag"], &ctx());
        assert_eq!(patched, with_injection(&["py"], &["script.py", "--flag"]));
    }

    #[test]
    fn test_patch_module_and_code() {
        let patched = patch_args(&["py", "-Rv", "-m", "app"], &ctx());
        assert_eq!(patched, with_injection(&["py", "-Rv"], &["-m", "app"]));

        let patched = patch_args(&["py", "-Q", "warn", "-m", "app"], &ctx());
        assert_eq!(
            patched,
            with_injection(&["py", "-Q", "warn"], &["-m", "app"])
        );

        let patched = patch_args(&["py", "-c", "import os", "-"], &ctx());
        assert_eq!(patched, with_injection(&["py"], &["-c", "import os", "-"]));
    }

    #[test]
    fn test_injected_linkage() {
        let ctx = PatchContext::new(42, 9000).with_debugger_module("dbg");
        let patched = patch_args(&["/usr/bin/py", "a.py"], &ctx);
        assert_eq!(
            patched,
            [
                "/usr/bin/py",
                "-m",
                "dbg",
                "--host",
                "localhost",
                "--port",
                "0",
                "--wait",
                "--multiprocess",
                "--subprocess-of",
                "42",
                "--subprocess-notify",
                "9000",
                "a.py",
            ]
        );
    }

    #[test]
    fn test_context_from_options() {
        let options = Options::default();
        assert!(PatchContext::current(&options, None).is_none());

        let options = Options {
            multiprocess: true,
            ..Default::default()
        };
        assert!(PatchContext::current(&options, None).is_none());

        let options = Options {
            multiprocess: true,
            subprocess_of: Some(1),
            subprocess_notify: Some(4321),
            handshake_timeout: None,
        };
        let ctx = PatchContext::current(&options, None).unwrap();
        assert_eq!(ctx.notify_port, 4321);
        assert_eq!(ctx.process_id, std::process::id());
    }
}
