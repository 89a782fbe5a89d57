//! Credit cost calculation.
//!
//! Maps a per-model pricing strategy plus the usage metrics a provider
//! reported to the credit charge, the provider's USD cost, and the realized
//! profit. Pure arithmetic, no I/O.

use serde::{Deserialize, Serialize};

/// How provider usage is converted into billable units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcType {
    /// One flat unit per generation.
    Fixed,
    /// Billed per produced item (images, frames).
    PerUnit,
    /// Billed per second of generated media.
    PerSecond,
    /// Billed per token consumed.
    PerToken,
}

/// Pricing strategy attached to a model/provider link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostStrategy {
    pub calc_type: CalcType,
    /// Provider list price per unit, in USD.
    pub provider_unit_price_usd: f64,
    /// Retail markup applied on top of the provider cost.
    pub markup_multiplier: f64,
    /// Credits per retail USD.
    pub credit_conversion_rate: f64,
    /// Minimum credit charge per generation.
    pub min_credit_limit: i64,
}

/// Usage metrics reported by a provider call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Seconds of generated media (video/audio).
    pub duration_seconds: f64,
    /// Number of produced items (images).
    pub unit_count: u32,
    /// Tokens consumed (LLM-backed providers).
    pub token_count: u64,
}

/// The outcome of pricing one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    /// Credits to debit from the user.
    pub credits: i64,
    /// What the provider charges the platform, in USD.
    pub provider_cost_usd: f64,
    /// Realized profit: what the charged credits are worth minus the
    /// provider cost. Computed from the possibly-floored credit charge so
    /// profit reporting matches what was actually billed.
    pub profit_usd: f64,
}

impl CostBreakdown {
    /// A zero-cost breakdown, used when a model has no pricing strategy.
    pub fn zero() -> Self {
        Self {
            credits: 0,
            provider_cost_usd: 0.0,
            profit_usd: 0.0,
        }
    }
}

/// Calculate the cost of one generation.
///
/// A model without a configured strategy is a zero-cost generation. That is
/// an explicit product decision, not a fallback.
pub fn calculate(strategy: Option<&CostStrategy>, metrics: &UsageMetrics) -> CostBreakdown {
    let Some(strategy) = strategy else {
        return CostBreakdown::zero();
    };

    let units = match strategy.calc_type {
        CalcType::Fixed => 1.0,
        CalcType::PerUnit => f64::from(metrics.unit_count),
        CalcType::PerSecond => metrics.duration_seconds,
        CalcType::PerToken => metrics.token_count as f64,
    };

    let provider_cost_usd = units * strategy.provider_unit_price_usd;
    let retail_usd = provider_cost_usd * strategy.markup_multiplier;

    let credits = if strategy.credit_conversion_rate > 0.0 {
        let raw = (retail_usd * strategy.credit_conversion_rate).ceil() as i64;
        raw.max(strategy.min_credit_limit)
    } else {
        0
    };

    let profit_usd = if strategy.credit_conversion_rate > 0.0 {
        (credits as f64 / strategy.credit_conversion_rate) - provider_cost_usd
    } else {
        -provider_cost_usd
    };

    CostBreakdown {
        credits,
        provider_cost_usd,
        profit_usd,
    }
}

/// Credits chargeable before the provider is called, for strategies whose
/// price does not depend on reported usage. `None` when the cost is only
/// known after the call.
pub fn upfront_credits(strategy: Option<&CostStrategy>) -> Option<i64> {
    match strategy {
        None => Some(0),
        Some(s) if s.calc_type == CalcType::Fixed => {
            Some(calculate(strategy, &UsageMetrics::default()).credits)
        }
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(calc_type: CalcType) -> CostStrategy {
        CostStrategy {
            calc_type,
            provider_unit_price_usd: 0.04,
            markup_multiplier: 1.5,
            credit_conversion_rate: 10.0,
            min_credit_limit: 5,
        }
    }

    #[test]
    fn per_unit_floors_at_min_credits() {
        // ceil(0.04 * 1.5 * 10) = 1, floored to min_credit_limit = 5.
        let breakdown = calculate(
            Some(&strategy(CalcType::PerUnit)),
            &UsageMetrics {
                unit_count: 1,
                ..Default::default()
            },
        );
        assert_eq!(breakdown.credits, 5);
        assert!((breakdown.provider_cost_usd - 0.04).abs() < 1e-9);
    }

    #[test]
    fn profit_uses_realized_credits() {
        let breakdown = calculate(
            Some(&strategy(CalcType::PerUnit)),
            &UsageMetrics {
                unit_count: 1,
                ..Default::default()
            },
        );
        // 5 credits / 10 credits-per-USD = 0.50 realized, minus 0.04 cost.
        assert!((breakdown.profit_usd - 0.46).abs() < 1e-9);
    }

    #[test]
    fn per_second_scales_with_duration() {
        let breakdown = calculate(
            Some(&strategy(CalcType::PerSecond)),
            &UsageMetrics {
                duration_seconds: 8.0,
                ..Default::default()
            },
        );
        // 8 * 0.04 = 0.32 cost, * 1.5 * 10 = 4.8, ceil = 5.
        assert_eq!(breakdown.credits, 5);
        assert!((breakdown.provider_cost_usd - 0.32).abs() < 1e-9);
    }

    #[test]
    fn fixed_ignores_metrics() {
        let a = calculate(Some(&strategy(CalcType::Fixed)), &UsageMetrics::default());
        let b = calculate(
            Some(&strategy(CalcType::Fixed)),
            &UsageMetrics {
                unit_count: 100,
                duration_seconds: 500.0,
                token_count: 10_000,
            },
        );
        assert_eq!(a, b);
    }

    #[test]
    fn per_token_charges_above_floor() {
        let breakdown = calculate(
            Some(&strategy(CalcType::PerToken)),
            &UsageMetrics {
                token_count: 1000,
                ..Default::default()
            },
        );
        // 1000 * 0.04 = 40 USD cost, retail 60, credits 600.
        assert_eq!(breakdown.credits, 600);
    }

    #[test]
    fn upfront_credits_known_only_for_metrics_free_pricing() {
        // Fixed: ceil(0.04 * 1.5 * 10) = 1, floored to 5.
        assert_eq!(upfront_credits(Some(&strategy(CalcType::Fixed))), Some(5));
        assert_eq!(upfront_credits(Some(&strategy(CalcType::PerSecond))), None);
        assert_eq!(upfront_credits(Some(&strategy(CalcType::PerToken))), None);
        assert_eq!(upfront_credits(None), Some(0));
    }

    #[test]
    fn no_strategy_is_zero_cost() {
        let breakdown = calculate(
            None,
            &UsageMetrics {
                unit_count: 3,
                ..Default::default()
            },
        );
        assert_eq!(breakdown, CostBreakdown::zero());
    }
}
