//! Price optimization
//!
//! Prices every revenue item from its type's default:
//!
//! ```text
//! price = default × tier × content × saturation × confidence
//! ```
//!
//! then clamps to the type's bounds, applies the optional weekday multiplier,
//! rounds to a clean price point and re-clamps.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{PriceBounds, SendTypeCatalog};
use crate::config::PricingSettings;
use crate::error::{SendplanErrorTrait, Severity};
use crate::models::{Category, ContentRankings, ContentTier, WeeklySchedule};
use crate::volume::VolumeConfig;

/// Pricing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Item {item_id} carries AVOID-ranked content '{content_type}'")]
    AvoidedContent { item_id: u32, content_type: String },

    #[error("Send type '{0}' has no price bounds")]
    Unpriced(String),

    #[error("Creator tier {0} has no price multiplier")]
    UnknownTier(u8),
}

impl SendplanErrorTrait for PricingError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        match self {
            Self::UnknownTier(_) => Severity::Blocking,
            _ => Severity::Structural,
        }
    }
}

/// Price multiplier per creator tier (index = tier - 1)
pub const TIER_MULTIPLIERS: [f64; 5] = [1.0, 1.1, 1.2, 1.35, 1.5];

pub fn content_multiplier(tier: ContentTier) -> Option<f64> {
    match tier {
        ContentTier::Top => Some(1.30),
        ContentTier::Mid => Some(1.00),
        ContentTier::Low => Some(0.85),
        ContentTier::Avoid => None,
    }
}

pub fn saturation_multiplier(saturation: f64) -> f64 {
    if saturation >= 70.0 {
        0.85
    } else if saturation <= 30.0 {
        1.10
    } else {
        1.0
    }
}

pub fn confidence_multiplier(confidence: f64) -> f64 {
    if confidence >= 0.8 {
        1.0
    } else if confidence >= 0.6 {
        0.95
    } else if confidence >= 0.4 {
        0.90
    } else {
        0.85
    }
}

pub fn weekday_multiplier(day: Weekday) -> f64 {
    match day {
        Weekday::Sat | Weekday::Sun => 1.10,
        Weekday::Mon => 0.95,
        _ => 1.0,
    }
}

/// Round to a clean price point
///
/// Below `low` prices round to whole dollars, up to `mid` to the nearest $5,
/// above it to the nearest $10.
pub fn round_price_point(price: f64, low: f64, mid: f64) -> f64 {
    if price < low {
        price.round()
    } else if price <= mid {
        (price / 5.0).round() * 5.0
    } else {
        (price / 10.0).round() * 10.0
    }
}

fn clamp_to(price: f64, bounds: &PriceBounds) -> f64 {
    price.clamp(bounds.floor, bounds.ceiling)
}

/// Signals shared by every quote in a run
#[derive(Debug, Clone, Copy)]
pub struct PricingContext {
    pub creator_tier: u8,
    pub saturation: f64,
    pub confidence: f64,
    pub purchase_rate: f64,
}

impl PricingContext {
    pub fn from_volume(creator_tier: u8, volume: &VolumeConfig) -> Self {
        Self {
            creator_tier,
            saturation: volume.fused_saturation,
            confidence: volume.confidence_score,
            purchase_rate: volume.fused_purchase_rate,
        }
    }
}

/// One priced item
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub raw: f64,
    pub rationale: String,
}

/// Revenue projection over the priced items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSummary {
    pub total_projected_revenue: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Lowest confidence across priced items
    pub confidence: f64,
    pub priced_items: usize,
}

pub struct PricingOptimizer<'a> {
    catalog: &'a SendTypeCatalog,
    settings: PricingSettings,
}

impl<'a> PricingOptimizer<'a> {
    pub fn new(catalog: &'a SendTypeCatalog, settings: PricingSettings) -> Self {
        Self { catalog, settings }
    }

    /// Quote a single item
    pub fn quote(
        &self,
        bounds: &PriceBounds,
        content: ContentTier,
        day: Weekday,
        ctx: &PricingContext,
    ) -> Result<Quote, PricingError> {
        let tier = TIER_MULTIPLIERS
            .get(usize::from(ctx.creator_tier).wrapping_sub(1))
            .copied()
            .ok_or(PricingError::UnknownTier(ctx.creator_tier))?;
        let Some(content_mult) = content_multiplier(content) else {
            // Item context is filled in by `price`
            return Err(PricingError::AvoidedContent {
                item_id: 0,
                content_type: String::new(),
            });
        };
        let saturation = saturation_multiplier(ctx.saturation);
        let confidence = confidence_multiplier(ctx.confidence);

        let raw = bounds.default * tier * content_mult * saturation * confidence;
        let mut price = clamp_to(raw, bounds);
        let mut rationale = format!(
            "base ${:.0} × tier {:.2} × content {:?} {:.2} × saturation {:.2} × confidence {:.2}",
            bounds.default, tier, content, content_mult, saturation, confidence
        );

        if self.settings.day_of_week_pricing {
            let dow = weekday_multiplier(day);
            price *= dow;
            rationale.push_str(&format!(" × {day} {dow:.2}"));
        }

        let rounded = round_price_point(price, self.settings.low_price_threshold, self.settings.mid_price_threshold);
        let price = clamp_to(rounded, bounds);
        rationale.push_str(&format!(
            " = ${raw:.2}, clamped [{:.0}, {:.0}], rounded ${price:.0}",
            bounds.floor, bounds.ceiling
        ));

        Ok(Quote { price, raw, rationale })
    }

    /// Price every revenue item and project revenue
    pub fn price(
        &self,
        mut schedule: WeeklySchedule,
        rankings: &ContentRankings,
        ctx: &PricingContext,
    ) -> Result<(WeeklySchedule, PricingSummary), PricingError> {
        let mut total = 0.0;
        let mut priced = 0;

        for item in schedule.items.iter_mut() {
            if item.category != Category::Revenue {
                continue;
            }
            let Some(send_type) = self.catalog.get(&item.send_type) else {
                return Err(PricingError::Unpriced(item.send_type.clone()));
            };
            let Some(bounds) = send_type.price else {
                return Err(PricingError::Unpriced(item.send_type.clone()));
            };

            let content = match item.content_type.as_deref() {
                Some(c) => rankings.tier_of(c).unwrap_or(ContentTier::Mid),
                None => ContentTier::Mid,
            };
            let quote = self.quote(&bounds, content, item.day, ctx).map_err(|e| match e {
                PricingError::AvoidedContent { .. } => PricingError::AvoidedContent {
                    item_id: item.id,
                    content_type: item.content_type.clone().unwrap_or_default(),
                },
                other => other,
            })?;

            debug!(item = item.id, send_type = %item.send_type, raw = quote.raw, price = quote.price, "Priced item");
            total += quote.price * ctx.purchase_rate;
            priced += 1;
            item.price = Some(quote.price);
            item.price_rationale = Some(quote.rationale);
        }

        let band = self.settings.projection_band;
        let summary = PricingSummary {
            total_projected_revenue: total,
            lower_bound: total * (1.0 - band),
            upper_bound: total * (1.0 + band),
            confidence: if priced == 0 { 1.0 } else { ctx.confidence },
            priced_items: priced,
        };
        info!(
            priced_items = priced,
            projected = summary.total_projected_revenue,
            "Pricing complete"
        );
        Ok((schedule, summary))
    }
}
