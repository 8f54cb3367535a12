use std::fmt;
use std::io::{BufRead, Write};

use super::{Filter, FilterError, compile, for_each_line};

/// Replace every match of a pattern on each line with a literal string.
///
/// Unlike [`super::Grep`], the pattern is compiled again on every
/// [`Filter::apply`] and a compile failure is not remembered. The replacement
/// is inserted as-is; `$1` style group references are not expanded.
///
/// Every output line ends with `\n`, whether or not it matched.
#[derive(Debug, Clone)]
pub struct Sed {
    pattern: String,
    replace: String,
}

impl Sed {
    #[must_use]
    pub fn new(pattern: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replace: replace.into(),
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn replacement(&self) -> &str {
        &self.replace
    }
}

impl Filter for Sed {
    fn apply(&self, dst: &mut dyn Write, src: &mut dyn BufRead) -> Result<(), FilterError> {
        let re = compile(&self.pattern)?;
        let replace = self.replace.as_bytes();
        for_each_line(src, |line| {
            let mut last = 0;
            for m in re.find_iter(line) {
                dst.write_all(&line[last..m.start()])?;
                dst.write_all(replace)?;
                last = m.end();
            }
            dst.write_all(&line[last..])?;
            dst.write_all(b"\n")
        })?;
        Ok(())
    }
}

impl fmt::Display for Sed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sed 's/{}/{}/g'", self.pattern, self.replace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sed(filter: &Sed, input: &str) -> String {
        let mut out = Vec::new();
        filter.apply(&mut out, &mut input.as_bytes()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_sed_replaces_every_match() {
        let filter = Sed::new("hello", "こんにちわ");
        assert_eq!(
            sed(&filter, "hello foo\nbar hello\nherro baz\n"),
            "こんにちわ foo\nbar こんにちわ\nherro baz\n"
        );
    }

    #[test]
    fn test_sed_multiple_matches_on_one_line() {
        let filter = Sed::new("[0-9]+", "N");
        assert_eq!(sed(&filter, "a1b22c333d"), "aNbNcNd\n");
    }

    #[test]
    fn test_sed_unmatched_line_gets_newline() {
        let filter = Sed::new("x", "y");
        assert_eq!(sed(&filter, "abc"), "abc\n");
    }

    #[test]
    fn test_sed_replacement_is_literal() {
        let filter = Sed::new("(a)(b)", "$2$1");
        assert_eq!(sed(&filter, "xaby"), "x$2$1y\n");
    }

    #[test]
    fn test_sed_match_at_line_edges() {
        let filter = Sed::new("^a|z$", "-");
        assert_eq!(sed(&filter, "abcz\n"), "-bc-\n");
    }

    #[test]
    fn test_sed_bad_pattern_fails_every_call() {
        let filter = Sed::new("[broken", "x");
        for _ in 0..2 {
            let err = filter
                .apply(&mut std::io::sink(), &mut &b"line\n"[..])
                .unwrap_err();
            match err {
                FilterError::Pattern(e) => assert_eq!(e.pattern, "[broken"),
                other => panic!("Expected pattern error, got: {other:?}"),
            }
        }
    }
}
