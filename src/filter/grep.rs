use std::fmt;
use std::io::{BufRead, Write};
use std::sync::OnceLock;

use regex::bytes::Regex;

use super::{Filter, FilterError, PatternError, compile, for_each_line};

/// Keep only the lines that match a pattern.
///
/// The pattern is compiled on the first [`Filter::apply`] and the outcome is
/// cached for the lifetime of the instance: a bad pattern fails every call
/// with an equal error and is never recompiled.
///
/// Matched lines are written without their line separator, so consecutive
/// matches run together in the output. Use [`Grep::keep_newlines`] to
/// terminate each matched line with `\n` instead.
#[derive(Debug)]
pub struct Grep {
    pattern: String,
    compiled: OnceLock<Result<Regex, PatternError>>,
    keep_newlines: bool,
}

impl Grep {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: OnceLock::new(),
            keep_newlines: false,
        }
    }

    /// Terminate every matched line with `\n` in the output.
    #[must_use]
    pub fn keep_newlines(mut self, keep: bool) -> Self {
        self.keep_newlines = keep;
        self
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn regex(&self) -> Result<&Regex, PatternError> {
        self.compiled
            .get_or_init(|| compile(&self.pattern))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl Filter for Grep {
    fn apply(&self, dst: &mut dyn Write, src: &mut dyn BufRead) -> Result<(), FilterError> {
        let re = self.regex()?;
        for_each_line(src, |line| {
            if re.is_match(line) {
                dst.write_all(line)?;
                if self.keep_newlines {
                    dst.write_all(b"\n")?;
                }
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl fmt::Display for Grep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grep '{}'", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grep(filter: &Grep, input: &str) -> String {
        let mut out = Vec::new();
        filter.apply(&mut out, &mut input.as_bytes()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_grep_concatenates_matches() {
        let filter = Grep::new(r"_test\.go$");
        assert_eq!(
            grep(&filter, "a.go\nb_test.go\nc_test.go\n"),
            "b_test.goc_test.go"
        );
    }

    #[test]
    fn test_grep_preserves_order_and_drops_non_matches() {
        let filter = Grep::new("o").keep_newlines(true);
        assert_eq!(grep(&filter, "one\ntwo\nthree\nfour"), "one\ntwo\nfour\n");
    }

    #[test]
    fn test_grep_no_matches() {
        let filter = Grep::new("zzz");
        assert_eq!(grep(&filter, "alpha\nbeta\n"), "");
    }

    #[test]
    fn test_grep_reuses_compiled_pattern() {
        let filter = Grep::new("b");
        assert_eq!(grep(&filter, "a\nb\n"), "b");
        assert_eq!(grep(&filter, "bb\nc\n"), "bb");
        assert!(filter.compiled.get().is_some_and(Result::is_ok));
    }

    #[test]
    fn test_grep_bad_pattern_returns_same_error() {
        let filter = Grep::new("(unterminated");
        let first = filter.apply(&mut std::io::sink(), &mut &b""[..]);
        let second = filter.apply(&mut std::io::sink(), &mut &b""[..]);
        match (first, second) {
            (Err(FilterError::Pattern(a)), Err(FilterError::Pattern(b))) => {
                assert_eq!(a, b);
                assert_eq!(a.pattern, "(unterminated");
            }
            other => panic!("Expected two pattern errors, got: {other:?}"),
        }
    }

    #[test]
    fn test_grep_matches_non_utf8_lines() {
        let filter = Grep::new("ok").keep_newlines(true);
        let mut out = Vec::new();
        filter
            .apply(&mut out, &mut &b"\xff ok\nskip\n"[..])
            .unwrap();
        assert_eq!(out, b"\xff ok\n");
    }
}
