//! The sum-type rule model: a rule is a `(class, target, scope, matcher)`
//! tuple plus its source pattern, or a size bound. Keeping these as small
//! enums (rather than a trait per matcher kind) lets the evaluator dispatch
//! on data instead of virtual calls, and makes every rule trivially
//! `Clone`/`Debug` for the reload-on-change cache key.

use globset::{Glob, GlobMatcher};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Dirs,
    Files,
}

/// How much of the path a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Matches only the entry name, only in the directory holding the
    /// ignore file (no recursion into subdirectories for this rule).
    LocalOnly,
    /// Matches the entry name anywhere in the subtree rooted at the
    /// directory holding the ignore file.
    NameSubtree,
    /// Matches the full path relative to the sync root.
    FullPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexCase {
    Sensitive,
    Insensitive,
}

/// A compiled matcher. `Clone` is by re-derivation from the stored source,
/// since `GlobMatcher`/`Regex` don't implement `Clone` cheaply in a way
/// that's worth relying on here — rules are built once per reload, not
/// cloned per row.
pub enum Matcher {
    Glob {
        case_sensitive: bool,
        compiled: GlobMatcher,
    },
    Regex {
        case: RegexCase,
        compiled: Regex,
    },
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Glob { case_sensitive, .. } => f
                .debug_struct("Glob")
                .field("case_sensitive", case_sensitive)
                .finish(),
            Matcher::Regex { case, .. } => f.debug_struct("Regex").field("case", case).finish(),
        }
    }
}

impl Matcher {
    pub fn glob(pattern: &str, case_sensitive: bool) -> Result<Self, globset::Error> {
        let compiled = Glob::builder(pattern)
            .case_insensitive(!case_sensitive)
            .build()?
            .compile_matcher();
        Ok(Matcher::Glob {
            case_sensitive,
            compiled,
        })
    }

    pub fn regex(pattern: &str, case: RegexCase) -> Result<Self, regex::Error> {
        let compiled = match case {
            RegexCase::Sensitive => Regex::new(pattern)?,
            RegexCase::Insensitive => Regex::new(&format!("(?i){pattern}"))?,
        };
        Ok(Matcher::Regex { case, compiled })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            Matcher::Glob { compiled, .. } => compiled.is_match(candidate),
            Matcher::Regex { compiled, .. } => compiled.is_match(candidate),
        }
    }
}

/// One parsed `[+|-][a|d|f][N|n|p][G|g|R|r]:<pattern>` directive.
#[derive(Debug)]
pub struct Rule {
    pub class: Class,
    pub target: Target,
    pub scope: Scope,
    pub matcher: Matcher,
    pub pattern: String,
}

impl Rule {
    /// Does this rule apply to an entry of the given directory-ness, and if
    /// so, does its pattern match the appropriate candidate string (name
    /// for `LocalOnly`/`NameSubtree`, full relative path for `FullPath`)?
    pub fn matches(&self, is_dir: bool, name: &str, relative_path: &str) -> bool {
        let target_ok = match self.target {
            Target::All => true,
            Target::Dirs => is_dir,
            Target::Files => !is_dir,
        };
        if !target_ok {
            return false;
        }
        let candidate = match self.scope {
            Scope::LocalOnly | Scope::NameSubtree => name,
            Scope::FullPath => relative_path,
        };
        self.matcher.is_match(candidate)
    }
}

/// A file-size threshold directive: `exclude-larger:<N>[k|m|g]` /
/// `exclude-smaller:<N>[k|m|g]`.
#[derive(Debug, Clone, Copy)]
pub enum SizeRule {
    ExcludeLarger(u64),
    ExcludeSmaller(u64),
}
