//! Marking policies (§4.8): an immutable list of rules deciding whether a
//! probed event makes its window "interesting" enough to persist.

use regex::{Regex, RegexBuilder};

/// What a rule's pattern is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    Symbol,
    Message,
}

/// How a rule's pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Literal,
    Regex,
}

/// One marking rule, as supplied by the caller before compilation.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub target: MatchTarget,
    pub match_kind: MatchKind,
    pub case_sensitive: bool,
    pub pattern: String,
    pub module_name: Option<String>,
}

/// A compiled rule. Regexes are pre-compiled at construction; an invalid
/// pattern fails soft to a literal-equality comparison of the raw pattern
/// text rather than rejecting the whole policy.
struct Rule {
    target: MatchTarget,
    case_sensitive: bool,
    pattern: String,
    module_name: Option<String>,
    compiled: Option<Regex>,
}

impl Rule {
    fn compile(spec: RuleSpec) -> Self {
        let compiled = match spec.match_kind {
            MatchKind::Regex if !spec.pattern.is_empty() => RegexBuilder::new(&spec.pattern)
                .case_insensitive(!spec.case_sensitive)
                .build()
                .ok(),
            _ => None,
        };
        Self {
            target: spec.target,
            case_sensitive: spec.case_sensitive,
            pattern: spec.pattern,
            module_name: spec.module_name,
            compiled,
        }
    }

    fn text_matches(&self, haystack: &str) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        if let Some(re) = &self.compiled {
            return re.is_match(haystack);
        }
        case_aware_eq(haystack, &self.pattern, self.case_sensitive)
    }

    fn matches(&self, probe: &Probe<'_>) -> bool {
        let haystack = match self.target {
            MatchTarget::Symbol => Some(probe.symbol_name),
            MatchTarget::Message => probe.message,
        };
        let Some(haystack) = haystack else {
            return false;
        };
        if !self.text_matches(haystack) {
            return false;
        }
        match (&self.module_name, probe.module_name) {
            (None, _) => true,
            (Some(want), Some(got)) => case_aware_eq(got, want, self.case_sensitive),
            (Some(_), None) => false,
        }
    }
}

fn case_aware_eq(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// The probe a marking policy evaluates an event against.
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    pub symbol_name: &'a str,
    pub module_name: Option<&'a str>,
    pub message: Option<&'a str>,
}

impl<'a> Probe<'a> {
    #[must_use]
    pub fn symbol(symbol_name: &'a str) -> Self {
        Self {
            symbol_name,
            module_name: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_module(mut self, module_name: &'a str) -> Self {
        self.module_name = Some(module_name);
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: &'a str) -> Self {
        self.message = Some(message);
        self
    }
}

/// An immutable, freely shareable set of marking rules plus an `enabled`
/// flag. A disabled policy never matches.
pub struct MarkingPolicy {
    rules: Vec<Rule>,
    enabled: bool,
}

impl MarkingPolicy {
    #[must_use]
    pub fn new(rules: Vec<RuleSpec>, enabled: bool) -> Self {
        Self {
            rules: rules.into_iter().map(Rule::compile).collect(),
            enabled,
        }
    }

    /// A policy with no rules; matches nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), true)
    }

    /// Convenience constructor for a single literal-symbol rule, the
    /// common case in scenario tests (S4).
    #[must_use]
    pub fn literal_symbol(pattern: impl Into<String>, case_sensitive: bool) -> Self {
        Self::new(
            vec![RuleSpec {
                target: MatchTarget::Symbol,
                match_kind: MatchKind::Literal,
                case_sensitive,
                pattern: pattern.into(),
                module_name: None,
            }],
            true,
        )
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn matches(&self, probe: &Probe<'_>) -> bool {
        self.enabled && self.rules.iter().any(|r| r.matches(probe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_symbol_rule_matches_exactly() {
        let policy = MarkingPolicy::literal_symbol("crash", true);
        assert!(policy.matches(&Probe::symbol("crash")));
        assert!(!policy.matches(&Probe::symbol("Crash")));
        assert!(!policy.matches(&Probe::symbol("info")));
    }

    #[test]
    fn case_insensitive_rule_ignores_case() {
        let policy = MarkingPolicy::literal_symbol("crash", false);
        assert!(policy.matches(&Probe::symbol("CRASH")));
    }

    #[test]
    fn module_filter_requires_identical_module() {
        let policy = MarkingPolicy::new(
            vec![RuleSpec {
                target: MatchTarget::Symbol,
                match_kind: MatchKind::Literal,
                case_sensitive: true,
                pattern: "panic".into(),
                module_name: Some("core".into()),
            }],
            true,
        );
        assert!(policy.matches(&Probe::symbol("panic").with_module("core")));
        assert!(!policy.matches(&Probe::symbol("panic").with_module("std")));
        assert!(!policy.matches(&Probe::symbol("panic")));
    }

    #[test]
    fn empty_pattern_never_matches() {
        let policy = MarkingPolicy::literal_symbol("", true);
        assert!(!policy.matches(&Probe::symbol("")));
    }

    #[test]
    fn invalid_regex_falls_back_to_literal_match() {
        let policy = MarkingPolicy::new(
            vec![RuleSpec {
                target: MatchTarget::Symbol,
                match_kind: MatchKind::Regex,
                case_sensitive: true,
                pattern: "(unclosed".into(),
                module_name: None,
            }],
            true,
        );
        assert!(policy.matches(&Probe::symbol("(unclosed")));
        assert!(!policy.matches(&Probe::symbol("unclosed")));
    }

    #[test]
    fn disabled_policy_never_matches() {
        let policy = MarkingPolicy::new(
            vec![RuleSpec {
                target: MatchTarget::Symbol,
                match_kind: MatchKind::Literal,
                case_sensitive: true,
                pattern: "crash".into(),
                module_name: None,
            }],
            false,
        );
        assert!(!policy.matches(&Probe::symbol("crash")));
    }

    #[test]
    fn message_rule_requires_a_message_on_the_probe() {
        let policy = MarkingPolicy::new(
            vec![RuleSpec {
                target: MatchTarget::Message,
                match_kind: MatchKind::Literal,
                case_sensitive: true,
                pattern: "oom".into(),
                module_name: None,
            }],
            true,
        );
        assert!(policy.matches(&Probe::symbol("x").with_message("oom")));
        assert!(!policy.matches(&Probe::symbol("x")));
    }
}
