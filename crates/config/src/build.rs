//! Per-build configuration: how pages are ranked and which files the
//! catalog keeps.

use crate::error::{ErrorKind, Result};
use docsync_catalog::{PatternSet, RankRule, Ranker};
use exn::ResultExt;
use serde::de::value::SeqAccessDeserializer;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Ranks accepted from configuration.
pub const RANK_RANGE: RangeInclusive<i32> = -10..=10;

/// Pages that exist in every build but make poor search results.
pub const DEFAULT_SEARCH_IGNORE: [&str; 4] = ["search.html", "search/index.html", "404.html", "404/index.html"];

/// One ordered ranking rule.
///
/// Written either as `{pattern: "api/*", rank: 3}` or as the shorthand
/// single-entry map `{"api/*": 3}`. A list of rules keeps its order; a single
/// map with several globs would not, so the shorthand allows one glob only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RankingRuleRepr", into = "RankingRuleRepr")]
pub struct RankingRule {
    pub pattern: String,
    pub rank: i32,
}
impl RankingRule {
    pub fn new(pattern: impl Into<String>, rank: i32) -> Self {
        Self { pattern: pattern.into(), rank }
    }
}
impl From<&RankingRule> for RankRule {
    fn from(rule: &RankingRule) -> Self {
        RankRule::new(rule.pattern.clone(), rule.rank)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RankingRuleRepr {
    Explicit { pattern: String, rank: i32 },
    Shorthand(BTreeMap<String, i32>),
}
impl TryFrom<RankingRuleRepr> for RankingRule {
    type Error = String;
    fn try_from(repr: RankingRuleRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            RankingRuleRepr::Explicit { pattern, rank } => Ok(Self { pattern, rank }),
            RankingRuleRepr::Shorthand(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((pattern, rank)), None) => Ok(Self { pattern, rank }),
                    _ => Err("a ranking rule must map exactly one pattern to a rank".to_string()),
                }
            },
        }
    }
}
impl From<RankingRule> for RankingRuleRepr {
    fn from(rule: RankingRule) -> Self {
        Self::Explicit { pattern: rule.pattern, rank: rule.rank }
    }
}

/// `search.ranking` is either a list of rules or one mapping of globs to
/// ranks, taken in the order it is written.
///
/// Mapping order survives only where the source is parsed directly, as
/// [`load_build_config`](crate::load_build_config) does for YAML and JSON.
/// Layered configuration sorts mapping keys, so the application config
/// should use the list form.
fn ranking<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<RankingRule>, D::Error> {
    struct RankingVisitor;
    impl<'de> Visitor<'de> for RankingVisitor {
        type Value = Vec<RankingRule>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a list of ranking rules or a mapping of patterns to ranks")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> std::result::Result<Self::Value, A::Error> {
            Vec::deserialize(SeqAccessDeserializer::new(seq))
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut rules = Vec::new();
            while let Some((pattern, rank)) = map.next_entry::<String, i32>()? {
                rules.push(RankingRule { pattern, rank });
            }
            Ok(rules)
        }
    }
    deserializer.deserialize_any(RankingVisitor)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Evaluated in order; the last matching rule decides a page's rank.
    #[serde(deserialize_with = "ranking")]
    pub ranking: Vec<RankingRule>,
    /// Pages matching any of these globs are not indexed for search.
    pub ignore: Vec<String>,
}
impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            ranking: Vec::new(),
            ignore: DEFAULT_SEARCH_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Project-level switches that change what gets cataloged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Index pages even when they match the search ignore list.
    pub index_all_pages: bool,
    /// Catalog every file for serving, not only pages.
    pub cdn_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub search: SearchConfig,
    pub project: ProjectConfig,
}
impl BuildConfig {
    /// Check bounds that the types alone cannot express.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.search.ranking {
            if rule.pattern.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid("ranking pattern must not be empty".to_string()));
            }
            if !RANK_RANGE.contains(&rule.rank) {
                exn::bail!(ErrorKind::Invalid(format!(
                    "rank {} for `{}` is outside {}..={}",
                    rule.rank,
                    rule.pattern,
                    RANK_RANGE.start(),
                    RANK_RANGE.end()
                )));
            }
        }
        self.ranker()?;
        self.ignore_patterns()?;
        Ok(())
    }

    /// The ranking rules, in configured order.
    pub fn rank_rules(&self) -> Vec<RankRule> {
        self.search.ranking.iter().map(RankRule::from).collect()
    }

    pub fn ranker(&self) -> Result<Ranker> {
        Ranker::new(&self.rank_rules()).or_raise(|| ErrorKind::Invalid("search.ranking".to_string()))
    }

    pub fn ignore_patterns(&self) -> Result<PatternSet> {
        PatternSet::new(&self.search.ignore).or_raise(|| ErrorKind::Invalid("search.ignore".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;
    use figment::providers::{Format, Yaml};
    use rstest::rstest;

    fn parse(yaml: &str) -> std::result::Result<BuildConfig, figment::Error> {
        Figment::from(Yaml::string(yaml)).extract()
    }

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert!(config.search.ranking.is_empty());
        assert_eq!(config.search.ignore, DEFAULT_SEARCH_IGNORE);
        assert!(!config.project.index_all_pages);
        assert!(!config.project.cdn_enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_ranking_keeps_order_across_forms() {
        let config = parse(
            r#"
            search:
              ranking:
                - "*.html": 5
                - pattern: "api/index.html"
                  rank: 2
                - "_sources/*": -10
            project:
              cdn_enabled: true
            "#,
        )
        .unwrap();
        assert_eq!(
            config.search.ranking,
            [
                RankingRule::new("*.html", 5),
                RankingRule::new("api/index.html", 2),
                RankingRule::new("_sources/*", -10),
            ]
        );
        assert_eq!(config.search.ignore, DEFAULT_SEARCH_IGNORE, "unset keys keep their default");
        assert!(config.project.cdn_enabled);
        let ranker = config.ranker().unwrap();
        assert_eq!(ranker.rank("api/index.html"), 2);
        assert_eq!(ranker.rank("test.html"), 5);
    }

    #[test]
    fn test_ranking_as_single_mapping() {
        let config = parse("search:\n  ranking:\n    '*.html': 5\n").unwrap();
        assert_eq!(config.search.ranking, [RankingRule::new("*.html", 5)]);
        assert!(parse("search:\n  ranking: 5\n").is_err());
    }

    #[test]
    fn test_shorthand_with_several_patterns_is_rejected() {
        let result = parse(
            r#"
            search:
              ranking:
                - "*.html": 5
                  "api/*": 2
            "#,
        );
        assert!(result.is_err());
    }

    #[rstest]
    #[case(RankingRule::new("*.html", 11))]
    #[case(RankingRule::new("*.html", -11))]
    #[case(RankingRule::new("  ", 1))]
    #[case(RankingRule::new("[z-a]", 1))]
    fn test_invalid_ranking(#[case] rule: RankingRule) {
        let mut config = BuildConfig::default();
        config.search.ranking.push(rule);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_rank_bounds_are_inclusive() {
        let mut config = BuildConfig::default();
        config.search.ranking = vec![RankingRule::new("a", -10), RankingRule::new("b", 10)];
        config.validate().unwrap();
    }

    #[test]
    fn test_ignore_patterns() {
        let config = parse("search:\n  ignore: ['genindex.html']\n").unwrap();
        let ignore = config.ignore_patterns().unwrap();
        assert!(ignore.is_match("genindex.html"));
        assert!(!ignore.is_match("search.html"), "an explicit list replaces the defaults");
    }
}
