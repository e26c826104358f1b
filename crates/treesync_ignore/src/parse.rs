//! Line-by-line parsing of a `.treesyncignore` file into [`Rule`]s and
//! [`SizeRule`]s.

use unicode_normalization::UnicodeNormalization;

use crate::rule::{Class, Matcher, RegexCase, Rule, Scope, SizeRule, Target};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: empty directive")]
    EmptyDirective { line: usize },
    #[error("line {line}: missing ':' separator")]
    MissingSeparator { line: usize },
    #[error("line {line}: unknown class '{found}', expected '+' or '-'")]
    UnknownClass { line: usize, found: char },
    #[error("line {line}: unknown target '{found}', expected one of a/d/f")]
    UnknownTarget { line: usize, found: char },
    #[error("line {line}: unknown scope/matcher flag '{found}'")]
    UnknownFlag { line: usize, found: char },
    #[error("line {line}: empty pattern")]
    EmptyPattern { line: usize },
    #[error("line {line}: invalid glob pattern: {source}")]
    Glob {
        line: usize,
        #[source]
        source: globset::Error,
    },
    #[error("line {line}: invalid regex pattern: {source}")]
    Regex {
        line: usize,
        #[source]
        source: regex::Error,
    },
    #[error("line {line}: invalid size value '{value}'")]
    InvalidSize { line: usize, value: String },
}

/// One logical line of the ignore file, already classified.
pub enum Directive {
    Rule(Rule),
    Size(SizeRule),
}

/// Parses the full contents of a `.treesyncignore` file. On any error the
/// whole file fails to load — callers are expected to retain whatever
/// chain was previously loaded rather than apply a partial one.
pub fn parse_file(contents: &str) -> Result<Vec<Directive>, ParseError> {
    let mut directives = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let normalized: String = raw_line.nfc().collect();
        let line = normalized.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("exclude-larger:") {
            directives.push(Directive::Size(SizeRule::ExcludeLarger(parse_size(
                rest, line_no,
            )?)));
            continue;
        }
        if let Some(rest) = line.strip_prefix("exclude-smaller:") {
            directives.push(Directive::Size(SizeRule::ExcludeSmaller(parse_size(
                rest, line_no,
            )?)));
            continue;
        }
        directives.push(Directive::Rule(parse_rule_line(line, line_no)?));
    }
    Ok(directives)
}

fn parse_size(value: &str, line: usize) -> Result<u64, ParseError> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('k') | Some('K') => (&value[..value.len() - 1], 1024u64),
        Some('m') | Some('M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    digits
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| ParseError::InvalidSize {
            line,
            value: value.to_string(),
        })
}

fn parse_rule_line(line: &str, line_no: usize) -> Result<Rule, ParseError> {
    let sep = line
        .find(':')
        .ok_or(ParseError::MissingSeparator { line: line_no })?;
    let (header, pattern) = line.split_at(sep);
    let pattern = &pattern[1..];
    if pattern.is_empty() {
        return Err(ParseError::EmptyPattern { line: line_no });
    }
    if header.is_empty() {
        return Err(ParseError::EmptyDirective { line: line_no });
    }

    let mut chars = header.chars();
    let class = match chars.next().unwrap() {
        '+' => Class::Include,
        '-' => Class::Exclude,
        other => return Err(ParseError::UnknownClass { line: line_no, found: other }),
    };
    let target = match chars.next() {
        Some('a') => Target::All,
        Some('d') => Target::Dirs,
        Some('f') => Target::Files,
        Some(other) => return Err(ParseError::UnknownTarget { line: line_no, found: other }),
        None => Target::All,
    };

    let mut scope = Scope::FullPath;
    let mut matcher_flag = None;
    for c in chars {
        match c {
            'N' => scope = Scope::LocalOnly,
            'n' => scope = Scope::NameSubtree,
            'p' => scope = Scope::FullPath,
            'G' | 'g' | 'R' | 'r' => matcher_flag = Some(c),
            other => return Err(ParseError::UnknownFlag { line: line_no, found: other }),
        }
    }

    let matcher = match matcher_flag {
        Some('G') => Matcher::glob(pattern, true).map_err(|source| ParseError::Glob { line: line_no, source })?,
        None | Some('g') => {
            Matcher::glob(pattern, false).map_err(|source| ParseError::Glob { line: line_no, source })?
        }
        Some('R') => Matcher::regex(pattern, RegexCase::Sensitive)
            .map_err(|source| ParseError::Regex { line: line_no, source })?,
        Some('r') => Matcher::regex(pattern, RegexCase::Insensitive)
            .map_err(|source| ParseError::Regex { line: line_no, source })?,
        Some(other) => return Err(ParseError::UnknownFlag { line: line_no, found: other }),
    };

    Ok(Rule {
        class,
        target,
        scope,
        matcher,
        pattern: pattern.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_exclude_glob() {
        let directives = parse_file("-:*.tmp\n").unwrap();
        assert_eq!(directives.len(), 1);
        match &directives[0] {
            Directive::Rule(rule) => {
                assert_eq!(rule.class, Class::Exclude);
                assert_eq!(rule.target, Target::All);
                assert!(rule.matches(false, "a.tmp", "a.tmp"));
                assert!(!rule.matches(false, "a.txt", "a.txt"));
            }
            _ => panic!("expected a rule"),
        }
    }

    #[test]
    fn parses_size_thresholds_with_suffix() {
        let directives = parse_file("exclude-larger:10m\nexclude-smaller:0\n").unwrap();
        assert_eq!(directives.len(), 2);
        match directives[0] {
            Directive::Size(SizeRule::ExcludeLarger(n)) => assert_eq!(n, 10 * 1024 * 1024),
            _ => panic!("expected ExcludeLarger"),
        }
    }

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let directives = parse_file("# comment\n\n   \n-:*.tmp\n").unwrap();
        assert_eq!(directives.len(), 1);
    }

    #[test]
    fn rejects_unknown_class() {
        let err = parse_file("x:*.tmp\n").unwrap_err();
        assert!(matches!(err, ParseError::UnknownClass { .. }));
    }

    #[test]
    fn dirs_only_rule_does_not_match_files() {
        let directives = parse_file("-d:build\n").unwrap();
        match &directives[0] {
            Directive::Rule(rule) => {
                assert!(rule.matches(true, "build", "build"));
                assert!(!rule.matches(false, "build", "build"));
            }
            _ => panic!(),
        }
    }
}
