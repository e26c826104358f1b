//! The evaluated form of a parsed ignore file: an ordered rule list plus
//! size bounds, with last-match-wins evaluation.

use crate::parse::Directive;
use crate::rule::{Class, Rule, SizeRule};
use crate::is_always_excluded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Include,
    Exclude,
}

/// One `.treesyncignore` file's worth of compiled rules.
pub struct FilterChain {
    rules: Vec<Rule>,
    lower_bound: u64,
    upper_bound: u64,
}

impl FilterChain {
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            lower_bound: 0,
            upper_bound: u64::MAX,
        }
    }

    pub fn from_directives(directives: Vec<Directive>) -> Self {
        let mut rules = Vec::new();
        let mut lower_bound = 0u64;
        let mut upper_bound = u64::MAX;
        for directive in directives {
            match directive {
                Directive::Rule(rule) => rules.push(rule),
                Directive::Size(SizeRule::ExcludeSmaller(n)) => lower_bound = lower_bound.max(n),
                Directive::Size(SizeRule::ExcludeLarger(n)) => upper_bound = upper_bound.min(n),
            }
        }
        Self {
            rules,
            lower_bound,
            upper_bound,
        }
    }

    /// Evaluates one entry. `size` is `None` for directories (size bounds
    /// only ever apply to files).
    pub fn evaluate(
        &self,
        is_dir: bool,
        name: &str,
        relative_path: &str,
        size: Option<u64>,
    ) -> Decision {
        if is_always_excluded(name) {
            return Decision::Exclude;
        }
        if let Some(size) = size {
            if size < self.lower_bound || size > self.upper_bound {
                return Decision::Exclude;
            }
        }
        let mut decision = Decision::Include;
        for rule in &self.rules {
            if rule.matches(is_dir, name, relative_path) {
                decision = match rule.class {
                    Class::Include => Decision::Include,
                    Class::Exclude => Decision::Exclude,
                };
            }
        }
        decision
    }
}
