use crate::patch::{patch_args, PatchContext};
use itertools::Itertools;

/// Quoting of command line tokens for the host process creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quoting {
    /// Tokens are passed to the new process as a vector, no quoting needed.
    Posix,
    /// Tokens are joined into a single command line and parsed back by the
    /// MSVC runtime of the new process.
    Windows,
}

impl Quoting {
    pub fn host() -> Self {
        if cfg!(windows) {
            Quoting::Windows
        } else {
            Quoting::Posix
        }
    }

    pub fn quote(self, arg: &str) -> String {
        match self {
            Quoting::Posix => arg.to_string(),
            Quoting::Windows => quote_windows(arg),
        }
    }

    pub fn quote_all<S: AsRef<str>>(self, args: &[S]) -> Vec<String> {
        args.iter().map(|a| self.quote(a.as_ref())).collect()
    }

    /// Quote every token and join them with spaces.
    pub fn command_line<S: AsRef<str>>(self, args: &[S]) -> String {
        self.quote_all(args).iter().join(" ")
    }
}

fn quote_windows(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // escape all preceding backslashes and the quote itself
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // backslashes before the closing quote are escaped
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

/// Patch a command line with [`patch_args`] and quote result for the host.
pub fn patch_and_quote_args<S: AsRef<str>>(
    args: &[S],
    ctx: &PatchContext,
    quoting: Quoting,
) -> Vec<String> {
    quoting.quote_all(&patch_args(args, ctx))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_windows_quoting() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let cases = [
            TestCase {
                input: "script.py",
                expected: "script.py",
            },
            TestCase {
                input: "",
                expected: r#""""#,
            },
            TestCase {
                input: "C:\\Program Files\\py.exe",
                expected: r#""C:\Program Files\py.exe""#,
            },
            TestCase {
                input: r#"print("hi")"#,
                expected: r#""print(\"hi\")""#,
            },
            TestCase {
                input: "dir with space\\",
                expected: r#""dir with space\\""#,
            },
            TestCase {
                input: r#"a\"b"#,
                expected: r#""a\\\"b""#,
            },
        ];

        for tc in cases {
            assert_eq!(Quoting::Windows.quote(tc.input), tc.expected);
            assert_eq!(Quoting::Posix.quote(tc.input), tc.input);
        }
    }

    #[test]
    fn test_patch_and_quote() {
        let ctx = PatchContext::new(1, 2);
        let quoted = patch_and_quote_args(&["py", "-c", "import os; print(1)"], &ctx, Quoting::Windows);
        assert_eq!(quoted.first().map(String::as_str), Some("py"));
        assert_eq!(
            quoted.last().map(String::as_str),
            Some(r#""import os; print(1)""#)
        );
        assert_eq!(quoted.len(), 3 + 12);

        assert_eq!(
            Quoting::Windows.command_line(&["py", "-c", "print(1)", "a b"]),
            r#"py -c print(1) "a b""#
        );
    }
}
