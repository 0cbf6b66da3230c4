//! Include / exclude rules and route threshold resolution
//!
//! A rule matches a channel name either exactly (case-sensitive) or through
//! a wildcard pattern (`*` any run, `?` one character, case-insensitive).
//! When several rules of one list match, the last one wins.

use super::error::{LoggerError, Result};
use super::level::{Policy, Threshold};
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Wildcard(Regex),
}

/// One include or exclude entry
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    matcher: Matcher,
    threshold: Threshold,
}

impl Rule {
    pub fn new(pattern: &str, threshold: Threshold) -> Result<Self> {
        let matcher = if pattern.contains(['*', '?']) {
            let expr = regex::escape(pattern)
                .replace("\\*", ".*")
                .replace("\\?", ".");
            let regex = RegexBuilder::new(&format!("^{}$", expr))
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    LoggerError::config("rules", format!("Bad pattern '{}': {}", pattern, e))
                })?;
            Matcher::Wildcard(regex)
        } else {
            Matcher::Exact(pattern.to_string())
        };
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            threshold,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn matches(&self, channel: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(name) => name == channel,
            Matcher::Wildcard(regex) => regex.is_match(channel),
        }
    }
}

/// Ordered include or exclude list
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn with(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Threshold of the last rule matching `channel`
    pub fn matching(&self, channel: &str) -> Option<Threshold> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(channel))
            .map(Rule::threshold)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Combine two include matches: the lower threshold, `Always` beats any rank
pub fn merge_include(a: Option<Threshold>, b: Option<Threshold>) -> Option<Threshold> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(Threshold::Always), _) | (_, Some(Threshold::Always)) => Some(Threshold::Always),
        (Some(Threshold::Rank(x)), Some(Threshold::Rank(y))) => Some(Threshold::Rank(x.min(y))),
    }
}

/// Combine two exclude matches: the higher threshold, `Always` beats any rank
pub fn merge_exclude(a: Option<Threshold>, b: Option<Threshold>) -> Option<Threshold> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(Threshold::Always), _) | (_, Some(Threshold::Always)) => Some(Threshold::Always),
        (Some(Threshold::Rank(x)), Some(Threshold::Rank(y))) => Some(Threshold::Rank(x.max(y))),
    }
}

/// Engine-wide filter settings
#[derive(Debug, Clone, Default)]
pub struct GlobalFilter {
    /// Global level; rank 0 when unset
    pub floor: Option<usize>,
    pub policy: Policy,
    pub include: RuleSet,
    pub exclude: RuleSet,
}

/// Per-route overrides of the global filter
#[derive(Debug, Clone, Default)]
pub struct RouteFilter {
    pub level: Option<usize>,
    pub policy: Option<Policy>,
    /// Replaces the global include list; `include_extra` is then ignored
    pub include: Option<RuleSet>,
    /// Merged with the global include list when `include` is unset
    pub include_extra: RuleSet,
    /// Replaces the global exclude list; `exclude_extra` is then ignored
    pub exclude: Option<RuleSet>,
    /// Merged with the global exclude list when `exclude` is unset
    pub exclude_extra: RuleSet,
}

impl RouteFilter {
    /// Level a route admits when no rule applies
    pub fn base_level(&self, global: &GlobalFilter) -> usize {
        self.level.or(global.floor).unwrap_or(0)
    }
}

/// Lowest rank a route delivers for `channel`, or `None` when it never does.
///
/// Under `Everything` the route starts at its level, an exclude match raises
/// that past the excluded rank (or closes the route for `Always`), and an
/// include match lowers it again (`Always` reopens it from rank 0).
/// Under `Nothing` the route starts closed, an include match opens it and
/// an exclude match can only raise or close it.
pub fn resolve_route_level(
    global: &GlobalFilter,
    route: &RouteFilter,
    channel: &str,
    level_count: usize,
) -> Option<usize> {
    let include = match &route.include {
        Some(set) => set.matching(channel),
        None => merge_include(
            global.include.matching(channel),
            route.include_extra.matching(channel),
        ),
    };
    let exclude = match &route.exclude {
        Some(set) => set.matching(channel),
        None => merge_exclude(
            global.exclude.matching(channel),
            route.exclude_extra.matching(channel),
        ),
    };
    let start = route.base_level(global);

    let base = match route.policy.unwrap_or(global.policy) {
        Policy::Everything => {
            let mut base = Some(start);
            if let Some(threshold) = exclude {
                base = match threshold {
                    Threshold::Rank(rank) => Some(rank + 1),
                    Threshold::Always => None,
                };
            }
            if let Some(threshold) = include {
                base = match threshold {
                    Threshold::Rank(rank) => base.map(|b| b.min(rank)),
                    Threshold::Always => Some(0),
                };
            }
            base
        }
        Policy::Nothing => {
            let mut base = None;
            if let Some(threshold) = include {
                base = match threshold {
                    Threshold::Rank(rank) if rank > 0 => Some(rank),
                    _ => Some(start),
                };
            }
            if let (Some(current), Some(threshold)) = (base, exclude) {
                base = match threshold {
                    Threshold::Rank(rank) => Some(current.max(rank)),
                    Threshold::Always => None,
                };
            }
            base
        }
    };

    base.filter(|rank| *rank < level_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVELS: usize = 5;

    fn rules(entries: &[(&str, Threshold)]) -> RuleSet {
        entries.iter().fold(RuleSet::new(), |set, (pattern, threshold)| {
            set.with(Rule::new(pattern, *threshold).unwrap())
        })
    }

    fn global(floor: usize, policy: Policy) -> GlobalFilter {
        GlobalFilter {
            floor: Some(floor),
            policy,
            ..GlobalFilter::default()
        }
    }

    #[test]
    fn test_exact_and_wildcard_matching() {
        let rule = Rule::new("db", Threshold::Always).unwrap();
        assert!(rule.matches("db"));
        assert!(!rule.matches("DB"));

        let rule = Rule::new("db*", Threshold::Always).unwrap();
        assert!(rule.matches("db-pool"));
        assert!(rule.matches("DB.Pool"));
        assert!(!rule.matches("my-db"));

        let rule = Rule::new("a?c.*.x", Threshold::Always).unwrap();
        assert!(rule.matches("abc.mid.x"));
        assert!(!rule.matches("abcXmidXx"));
    }

    #[test]
    fn test_last_matching_rule_wins() {
        let set = rules(&[
            ("db*", Threshold::Rank(1)),
            ("web", Threshold::Rank(2)),
            ("db-*", Threshold::Rank(3)),
        ]);
        assert_eq!(set.matching("db-pool"), Some(Threshold::Rank(3)));
        assert_eq!(set.matching("dbx"), Some(Threshold::Rank(1)));
        assert_eq!(set.matching("other"), None);
    }

    #[test]
    fn test_merge() {
        use Threshold::*;
        assert_eq!(merge_include(Some(Rank(3)), Some(Rank(1))), Some(Rank(1)));
        assert_eq!(merge_include(Some(Rank(3)), Some(Always)), Some(Always));
        assert_eq!(merge_include(None, Some(Rank(2))), Some(Rank(2)));
        assert_eq!(merge_exclude(Some(Rank(3)), Some(Rank(1))), Some(Rank(3)));
        assert_eq!(merge_exclude(Some(Always), Some(Rank(4))), Some(Always));
        assert_eq!(merge_exclude(None, None), None);
    }

    #[test]
    fn test_everything_exclude_always_closes_route() {
        let mut g = global(1, Policy::Everything);
        g.exclude = rules(&[("db*", Threshold::Always)]);
        let route = RouteFilter::default();

        assert_eq!(resolve_route_level(&g, &route, "db-pool", LEVELS), None);
        assert_eq!(resolve_route_level(&g, &route, "web", LEVELS), Some(1));
    }

    #[test]
    fn test_everything_exclude_rank_raises_threshold() {
        let mut g = global(1, Policy::Everything);
        g.exclude = rules(&[("db*", Threshold::Rank(2))]);
        let route = RouteFilter::default();

        assert_eq!(resolve_route_level(&g, &route, "db-pool", LEVELS), Some(3));
    }

    #[test]
    fn test_everything_include_always_beats_exclude() {
        let mut g = global(2, Policy::Everything);
        g.exclude = rules(&[("db*", Threshold::Always)]);
        g.include = rules(&[("db-audit", Threshold::Always)]);
        let route = RouteFilter::default();

        assert_eq!(resolve_route_level(&g, &route, "db-audit", LEVELS), Some(0));
        assert_eq!(resolve_route_level(&g, &route, "db-pool", LEVELS), None);
    }

    #[test]
    fn test_everything_include_rank_lowers_threshold() {
        let mut g = global(3, Policy::Everything);
        g.include = rules(&[("api", Threshold::Rank(1))]);
        let route = RouteFilter::default();

        assert_eq!(resolve_route_level(&g, &route, "api", LEVELS), Some(1));
    }

    #[test]
    fn test_exclude_past_last_level_closes_route() {
        let mut g = global(0, Policy::Everything);
        g.exclude = rules(&[("noisy", Threshold::Rank(4))]);
        assert_eq!(
            resolve_route_level(&g, &RouteFilter::default(), "noisy", LEVELS),
            None
        );
    }

    #[test]
    fn test_nothing_without_include_is_closed() {
        let g = global(0, Policy::Nothing);
        assert_eq!(
            resolve_route_level(&g, &RouteFilter::default(), "anything", LEVELS),
            None
        );
    }

    #[test]
    fn test_nothing_include_opens_route() {
        let mut g = global(1, Policy::Nothing);
        g.include = rules(&[("api", Threshold::Always), ("db", Threshold::Rank(3))]);
        let route = RouteFilter::default();

        assert_eq!(resolve_route_level(&g, &route, "api", LEVELS), Some(1));
        assert_eq!(resolve_route_level(&g, &route, "db", LEVELS), Some(3));
    }

    #[test]
    fn test_nothing_include_rank_zero_falls_back_to_level() {
        let mut g = global(2, Policy::Nothing);
        g.include = rules(&[("api", Threshold::Rank(0))]);
        assert_eq!(
            resolve_route_level(&g, &RouteFilter::default(), "api", LEVELS),
            Some(2)
        );
    }

    #[test]
    fn test_nothing_exclude_raises_or_closes() {
        let mut g = global(0, Policy::Nothing);
        g.include = rules(&[("*", Threshold::Rank(1))]);
        g.exclude = rules(&[("db", Threshold::Rank(3)), ("tmp", Threshold::Always)]);
        let route = RouteFilter::default();

        assert_eq!(resolve_route_level(&g, &route, "db", LEVELS), Some(3));
        assert_eq!(resolve_route_level(&g, &route, "tmp", LEVELS), None);
        assert_eq!(resolve_route_level(&g, &route, "web", LEVELS), Some(1));
    }

    #[test]
    fn test_route_overrides() {
        let mut g = global(1, Policy::Everything);
        g.exclude = rules(&[("db", Threshold::Always)]);

        let route = RouteFilter {
            level: Some(3),
            exclude: Some(RuleSet::new()),
            ..RouteFilter::default()
        };
        assert_eq!(resolve_route_level(&g, &route, "db", LEVELS), Some(3));

        let route = RouteFilter {
            policy: Some(Policy::Nothing),
            ..RouteFilter::default()
        };
        assert_eq!(resolve_route_level(&g, &route, "web", LEVELS), None);
    }

    #[test]
    fn test_route_policy_override_to_everything() {
        let g = global(1, Policy::Nothing);
        let route = RouteFilter {
            policy: Some(Policy::Everything),
            ..RouteFilter::default()
        };
        assert_eq!(resolve_route_level(&g, &route, "web", LEVELS), Some(1));
    }

    #[test]
    fn test_additive_rules_merge_with_global() {
        let mut g = global(2, Policy::Everything);
        g.exclude = rules(&[("db", Threshold::Rank(1))]);
        g.include = rules(&[("api", Threshold::Rank(3))]);

        let route = RouteFilter {
            exclude_extra: rules(&[("db", Threshold::Rank(3))]),
            include_extra: rules(&[("api", Threshold::Rank(0))]),
            ..RouteFilter::default()
        };
        // exclude max(1, 3) = 3, so only rank 4 remains
        assert_eq!(resolve_route_level(&g, &route, "db", LEVELS), Some(4));
        // include min(3, 0) = 0
        assert_eq!(resolve_route_level(&g, &route, "api", LEVELS), Some(0));
    }

    #[test]
    fn test_route_include_replaces_additive() {
        let g = global(2, Policy::Everything);
        let route = RouteFilter {
            include: Some(rules(&[("db", Threshold::Rank(2))])),
            include_extra: rules(&[("db", Threshold::Rank(0))]),
            ..RouteFilter::default()
        };
        assert_eq!(resolve_route_level(&g, &route, "db", LEVELS), Some(2));
    }

    #[test]
    fn test_route_exclude_replaces_additive() {
        let mut g = global(0, Policy::Everything);
        g.exclude = rules(&[("db", Threshold::Rank(3))]);
        let route = RouteFilter {
            exclude: Some(rules(&[("db", Threshold::Rank(1))])),
            exclude_extra: rules(&[("db", Threshold::Always)]),
            ..RouteFilter::default()
        };
        assert_eq!(resolve_route_level(&g, &route, "db", LEVELS), Some(2));
    }

    #[test]
    fn test_floor_defaults_to_zero() {
        let g = GlobalFilter::default();
        assert_eq!(
            resolve_route_level(&g, &RouteFilter::default(), "x", LEVELS),
            Some(0)
        );
    }
}
