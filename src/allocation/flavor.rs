//! Daily content flavor
//!
//! Each day emphasizes one content type and avoids another. Defaults come
//! from a weekday preference table; content rankings and trend signals can
//! override them.

use serde::{Deserialize, Serialize};

use crate::models::{ContentRankings, ContentTier};

/// Content emphasized and avoided for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayFlavor {
    pub emphasis: String,
    pub avoid: String,
}

/// Default (emphasis, avoid) per weekday, Monday first
pub const DEFAULT_FLAVORS: [(&str, &str); 7] = [
    ("lingerie", "couples"),
    ("solo", "feet"),
    ("shower", "cosplay"),
    ("toys", "lingerie"),
    ("couples", "behind_the_scenes"),
    ("cosplay", "solo"),
    ("behind_the_scenes", "toys"),
];

/// Content types assumed when no rankings are available
pub fn default_content_types() -> Vec<String> {
    let mut types: Vec<String> = DEFAULT_FLAVORS
        .iter()
        .flat_map(|(e, a)| [e.to_string(), a.to_string()])
        .collect();
    types.sort();
    types.dedup();
    types
}

/// Rankings used when the collaborator returned none: every default content type at MID
pub fn fallback_rankings() -> ContentRankings {
    ContentRankings::new(default_content_types().into_iter().map(|c| (c, ContentTier::Mid)))
}

/// Signals that may override the default table
#[derive(Debug, Clone, Copy)]
pub struct FlavorSignals {
    pub opportunity: f64,
    pub confidence: f64,
}

impl FlavorSignals {
    /// Strong upside with trustworthy data
    fn favors_top_content(&self) -> bool {
        self.opportunity >= 70.0 && self.confidence >= 0.6
    }
}

/// Resolve the week's flavors, Monday first
pub fn resolve_week(rankings: &ContentRankings, signals: FlavorSignals) -> [DayFlavor; 7] {
    let top = rankings.with_tier(ContentTier::Top);
    let avoided = rankings.with_tier(ContentTier::Avoid);
    let usable = rankings.usable();

    let mut previous: Option<String> = None;
    std::array::from_fn(|day| {
        let (default_emphasis, default_avoid) = DEFAULT_FLAVORS[day];

        let weak = |content: &str| {
            matches!(
                rankings.tier_of(content),
                None | Some(ContentTier::Low) | Some(ContentTier::Avoid)
            )
        };

        let emphasis = if signals.favors_top_content() && !top.is_empty() {
            top[day % top.len()].to_string()
        } else if weak(default_emphasis) {
            usable
                .iter()
                .map(|(name, _)| *name)
                .find(|name| previous.as_deref() != Some(*name))
                .or_else(|| usable.first().map(|(name, _)| *name))
                .unwrap_or(default_emphasis)
                .to_string()
        } else {
            default_emphasis.to_string()
        };

        let avoid = if !avoided.is_empty() {
            avoided[day % avoided.len()].to_string()
        } else if default_avoid != emphasis {
            default_avoid.to_string()
        } else {
            usable
                .iter()
                .rev()
                .map(|(name, _)| *name)
                .find(|name| *name != emphasis)
                .unwrap_or(default_avoid)
                .to_string()
        };

        previous = Some(emphasis.clone());
        DayFlavor { emphasis, avoid }
    })
}

/// Content candidates for a day: emphasis first, then best-ranked, never the avoided type
pub fn content_candidates(rankings: &ContentRankings, flavor: &DayFlavor) -> Vec<String> {
    let mut candidates = Vec::new();
    if rankings
        .tier_of(&flavor.emphasis)
        .is_some_and(|t| t != ContentTier::Avoid)
        && flavor.emphasis != flavor.avoid
    {
        candidates.push(flavor.emphasis.clone());
    }
    for (name, _) in rankings.usable() {
        if name != flavor.avoid && name != flavor.emphasis {
            candidates.push(name.to_string());
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral() -> FlavorSignals {
        FlavorSignals {
            opportunity: 50.0,
            confidence: 0.8,
        }
    }

    #[test]
    fn test_defaults_with_fallback_rankings() {
        let week = resolve_week(&fallback_rankings(), neutral());
        for (day, flavor) in week.iter().enumerate() {
            assert_eq!(flavor.emphasis, DEFAULT_FLAVORS[day].0);
            assert_eq!(flavor.avoid, DEFAULT_FLAVORS[day].1);
        }
    }

    #[test]
    fn test_weak_emphasis_is_replaced() {
        let rankings = ContentRankings::new([
            ("lingerie".to_string(), ContentTier::Low),
            ("shower".to_string(), ContentTier::Top),
            ("solo".to_string(), ContentTier::Mid),
        ]);
        let week = resolve_week(&rankings, neutral());
        assert_eq!(week[0].emphasis, "shower");
    }

    #[test]
    fn test_opportunity_rotates_top_content() {
        let rankings = ContentRankings::new([
            ("shower".to_string(), ContentTier::Top),
            ("toys".to_string(), ContentTier::Top),
            ("solo".to_string(), ContentTier::Mid),
        ]);
        let signals = FlavorSignals {
            opportunity: 80.0,
            confidence: 0.9,
        };
        let week = resolve_week(&rankings, signals);
        assert_eq!(week[0].emphasis, "shower");
        assert_eq!(week[1].emphasis, "toys");
        assert_eq!(week[2].emphasis, "shower");
    }

    #[test]
    fn test_avoid_ranked_content_becomes_avoid() {
        let rankings = ContentRankings::new([
            ("feet".to_string(), ContentTier::Avoid),
            ("solo".to_string(), ContentTier::Top),
        ]);
        let week = resolve_week(&rankings, neutral());
        assert!(week.iter().all(|f| f.avoid == "feet"));
    }

    #[test]
    fn test_candidates_never_include_avoid_tier() {
        let rankings = ContentRankings::new([
            ("feet".to_string(), ContentTier::Avoid),
            ("solo".to_string(), ContentTier::Top),
            ("toys".to_string(), ContentTier::Low),
        ]);
        let flavor = DayFlavor {
            emphasis: "toys".into(),
            avoid: "feet".into(),
        };
        let candidates = content_candidates(&rankings, &flavor);
        assert_eq!(candidates, vec!["toys".to_string(), "solo".to_string()]);
    }
}
