//! `.treesyncignore` parsing and evaluation.
//!
//! Grammar (one directive per line):
//!
//! ```text
//! [+|-][a|d|f][N|n|p][G|g|R|r]:<pattern>
//! exclude-larger:<N>[k|m|g]
//! exclude-smaller:<N>[k|m|g]
//! ```
//!
//! `#` starts a comment, blank lines are ignored, and every line is
//! normalized to NFC before parsing. Later rules override earlier ones for
//! the same row — the chain keeps rules in file order and the evaluator
//! walks them picking the *last* match, exactly like a `.gitignore`-style
//! engine but with an explicit include/exclude class instead of relying on
//! negation prefixes alone.

mod chain;
mod loader;
mod parse;
mod rule;

pub use chain::{Decision, FilterChain};
pub use loader::IgnoreFileLoader;
pub use parse::{parse_file, Directive, ParseError};
pub use rule::{Class, Matcher, RegexCase, Rule, Scope, SizeRule, Target};

/// Entry names that are always excluded regardless of any rule — platform
/// resource files that should never participate in sync.
pub const ALWAYS_EXCLUDED: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "Icon\r"];

pub fn is_always_excluded(name: &str) -> bool {
    ALWAYS_EXCLUDED.contains(&name)
}
