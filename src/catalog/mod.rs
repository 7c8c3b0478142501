//! Send-type catalog
//!
//! The catalog describes every send type the planner may schedule: its
//! category, which page types may use it, spacing and volume caps, price
//! bounds for revenue types, and followup anchoring rules.

use serde::{Deserialize, Serialize};

use crate::models::{Category, PageType};

/// Price bounds for a revenue send type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub default: f64,
    pub floor: f64,
    pub ceiling: f64,
}

/// Followup anchoring rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupRule {
    /// Send types that may act as parent
    pub parents: Vec<String>,
    /// Offset range after the parent, in minutes (inclusive)
    pub min_offset_minutes: u32,
    pub max_offset_minutes: u32,
}

/// A single send type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendType {
    pub key: String,
    pub category: Category,
    /// Restricts the type to one page type
    #[serde(default)]
    pub page_restriction: Option<PageType>,
    pub min_hours_between: f64,
    pub max_per_day: u32,
    pub max_per_week: u32,
    #[serde(default)]
    pub price: Option<PriceBounds>,
    #[serde(default)]
    pub requires_media: bool,
    #[serde(default)]
    pub requires_price: bool,
    #[serde(default)]
    pub requires_link: bool,
    /// Time-to-live after send
    #[serde(default)]
    pub ttl_hours: Option<u32>,
    #[serde(default)]
    pub followup: Option<FollowupRule>,
}

impl SendType {
    fn new(key: &str, category: Category, min_hours_between: f64, max_per_day: u32, max_per_week: u32) -> Self {
        Self {
            key: key.to_string(),
            category,
            page_restriction: None,
            min_hours_between,
            max_per_day,
            max_per_week,
            price: None,
            requires_media: false,
            requires_price: false,
            requires_link: false,
            ttl_hours: None,
            followup: None,
        }
    }

    fn only(mut self, page_type: PageType) -> Self {
        self.page_restriction = Some(page_type);
        self
    }

    fn priced(mut self, default: f64, floor: f64, ceiling: f64) -> Self {
        self.price = Some(PriceBounds {
            default,
            floor,
            ceiling,
        });
        self.requires_price = true;
        self
    }

    fn media(mut self) -> Self {
        self.requires_media = true;
        self
    }

    fn link(mut self) -> Self {
        self.requires_link = true;
        self
    }

    fn ttl(mut self, hours: u32) -> Self {
        self.ttl_hours = Some(hours);
        self
    }

    fn follows(mut self, parents: &[&str], min_offset: u32, max_offset: u32) -> Self {
        self.followup = Some(FollowupRule {
            parents: parents.iter().map(|p| p.to_string()).collect(),
            min_offset_minutes: min_offset,
            max_offset_minutes: max_offset,
        });
        self
    }

    pub fn allowed_on(&self, page_type: PageType) -> bool {
        self.page_restriction.map_or(true, |p| p == page_type)
    }

    pub fn is_followup(&self) -> bool {
        self.followup.is_some()
    }

    /// Types whose spacing cannot be honoured across a single night
    pub fn needs_rest_day(&self) -> bool {
        self.min_hours_between > 7.0
    }

    pub fn min_gap_minutes(&self) -> u32 {
        (self.min_hours_between * 60.0).round() as u32
    }
}

/// Ordered collection of send types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTypeCatalog {
    pub types: Vec<SendType>,
}

impl SendTypeCatalog {
    pub fn new(types: Vec<SendType>) -> Self {
        Self { types }
    }

    pub fn get(&self, key: &str) -> Option<&SendType> {
        self.types.iter().find(|t| t.key == key)
    }

    /// Catalog position, used for deterministic tie breaking
    pub fn position(&self, key: &str) -> usize {
        self.types
            .iter()
            .position(|t| t.key == key)
            .unwrap_or(usize::MAX)
    }

    pub fn eligible(&self, page_type: PageType) -> impl Iterator<Item = &SendType> {
        self.types.iter().filter(move |t| t.allowed_on(page_type))
    }

    pub fn eligible_in(&self, page_type: PageType, category: Category) -> Vec<&SendType> {
        self.eligible(page_type)
            .filter(|t| t.category == category)
            .collect()
    }

    pub fn followup_types(&self) -> impl Iterator<Item = &SendType> {
        self.types.iter().filter(|t| t.is_followup())
    }

    /// True when `key` may parent a followup
    pub fn is_parent_type(&self, key: &str) -> bool {
        self.followup_types()
            .filter_map(|t| t.followup.as_ref())
            .any(|rule| rule.parents.iter().any(|p| p == key))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for SendTypeCatalog {
    fn default() -> Self {
        use Category::{Engagement, Retention, Revenue};
        use PageType::{Free, Paid};

        Self::new(vec![
            // Revenue
            SendType::new("ppv_unlock", Revenue, 2.0, 4, 20).priced(12.0, 5.0, 100.0).media(),
            SendType::new("ppv_wall", Revenue, 3.0, 2, 10).only(Free).priced(10.0, 5.0, 60.0).media(),
            SendType::new("tip_goal", Revenue, 4.0, 1, 6).only(Paid).priced(25.0, 10.0, 100.0).media().ttl(24),
            SendType::new("bundle", Revenue, 4.0, 2, 8).priced(30.0, 15.0, 100.0).media(),
            SendType::new("flash_bundle", Revenue, 6.0, 1, 4).priced(20.0, 10.0, 80.0).media().ttl(12),
            SendType::new("game_post", Revenue, 4.0, 2, 7).priced(10.0, 5.0, 50.0).media().ttl(24),
            SendType::new("first_to_tip", Revenue, 4.0, 1, 6).priced(20.0, 5.0, 75.0).media().ttl(24),
            SendType::new("vip_program", Revenue, 24.0, 1, 2).only(Paid).priced(50.0, 25.0, 200.0).link(),
            SendType::new("snapchat_bundle", Revenue, 24.0, 1, 2).only(Free).priced(35.0, 20.0, 100.0).media(),
            // Engagement
            SendType::new("link_drop", Engagement, 2.0, 2, 10).link().ttl(24),
            SendType::new("wall_link_drop", Engagement, 3.0, 2, 8).link().media(),
            SendType::new("bump_normal", Engagement, 1.0, 3, 14).media(),
            SendType::new("bump_descriptive", Engagement, 2.0, 2, 10).media(),
            SendType::new("bump_text_only", Engagement, 2.0, 2, 10),
            SendType::new("bump_flyer", Engagement, 3.0, 2, 7).media(),
            SendType::new("dm_farm", Engagement, 4.0, 1, 5),
            SendType::new("like_farm", Engagement, 6.0, 1, 4),
            SendType::new("live_promo", Engagement, 6.0, 1, 3).media().ttl(2),
            // Retention
            SendType::new("renew_on_post", Retention, 12.0, 1, 4).only(Paid).media(),
            SendType::new("renew_on_message", Retention, 12.0, 1, 4).only(Paid),
            SendType::new("ppv_followup", Retention, 2.0, 3, 14).follows(&["ppv_unlock", "ppv_wall"], 50, 90),
            SendType::new("expired_winback", Retention, 24.0, 1, 2).only(Paid),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_shape() {
        let catalog = SendTypeCatalog::default();
        assert_eq!(catalog.len(), 22);
        assert_eq!(catalog.eligible_in(PageType::Paid, Category::Revenue).len(), 7);
        assert_eq!(catalog.eligible_in(PageType::Free, Category::Revenue).len(), 7);
        assert_eq!(catalog.eligible_in(PageType::Free, Category::Retention).len(), 1);
        assert_eq!(catalog.eligible_in(PageType::Paid, Category::Retention).len(), 4);
    }

    #[test]
    fn test_revenue_types_are_priced() {
        let catalog = SendTypeCatalog::default();
        for t in catalog.types.iter().filter(|t| t.category == Category::Revenue) {
            let bounds = t.price.expect("revenue type without price bounds");
            assert!(bounds.floor <= bounds.default && bounds.default <= bounds.ceiling, "{}", t.key);
        }
    }

    #[test]
    fn test_page_restrictions() {
        let catalog = SendTypeCatalog::default();
        assert!(!catalog.get("tip_goal").unwrap().allowed_on(PageType::Free));
        assert!(!catalog.get("ppv_wall").unwrap().allowed_on(PageType::Paid));
        assert!(catalog.get("ppv_unlock").unwrap().allowed_on(PageType::Free));
    }

    #[test]
    fn test_followup_parents() {
        let catalog = SendTypeCatalog::default();
        assert!(catalog.is_parent_type("ppv_unlock"));
        assert!(catalog.is_parent_type("ppv_wall"));
        assert!(!catalog.is_parent_type("bundle"));
        let rule = catalog.get("ppv_followup").unwrap().followup.as_ref().unwrap();
        assert!(rule.min_offset_minutes >= 45);
    }

    #[test]
    fn test_rest_day_types() {
        let catalog = SendTypeCatalog::default();
        assert!(catalog.get("renew_on_post").unwrap().needs_rest_day());
        assert!(!catalog.get("like_farm").unwrap().needs_rest_day());
    }
}
