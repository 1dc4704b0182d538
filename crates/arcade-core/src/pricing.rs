//! Price computation

use arcade_api::{Discount, PricingMode};
use arcade_util::{div_round_half_up, Amount};

/// Settlement figures for a terminated session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBreakdown {
    /// Price before discount
    pub gross: Amount,
    pub discount_amount: Amount,
    pub amount_due: Amount,
}

/// Turns chargeable minutes into money.
///
/// Every price is carried as an exact fraction of cents and rounded half-up
/// exactly once, so repeated evaluation and discounts never compound
/// rounding error.
pub struct PricingResolver;

impl PricingResolver {
    /// Running price with no discount.
    ///
    /// Hourly sessions pay `minutes / 60 * rate`; fixed plans pay the plan
    /// price no matter how long they ran.
    pub fn price_for(pricing: &PricingMode, elapsed_minutes: i64) -> Amount {
        let (numerator, denominator) = Self::exact(pricing, elapsed_minutes);
        Amount::from_cents(div_round_half_up(numerator, denominator).max(0))
    }

    /// Final figures with an optional percentage discount.
    ///
    /// The discounted amount is derived from the unrounded price.
    pub fn settle(
        pricing: &PricingMode,
        elapsed_minutes: i64,
        discount: Option<&Discount>,
    ) -> PriceBreakdown {
        let gross = Self::price_for(pricing, elapsed_minutes);

        let Some(discount) = discount else {
            return PriceBreakdown {
                gross,
                discount_amount: Amount::ZERO,
                amount_due: gross,
            };
        };

        let (numerator, denominator) = Self::exact(pricing, elapsed_minutes);
        let kept = 100 - i128::from(discount.percentage.min(100));
        let amount_due =
            Amount::from_cents(div_round_half_up(numerator * kept, denominator * 100).max(0));

        PriceBreakdown {
            gross,
            discount_amount: gross - amount_due,
            amount_due,
        }
    }

    /// Price in cents as `numerator / denominator`
    fn exact(pricing: &PricingMode, elapsed_minutes: i64) -> (i128, i128) {
        match pricing {
            PricingMode::Hourly { rate } => {
                let minutes = i128::from(elapsed_minutes.max(0));
                (minutes * i128::from(rate.cents()), 60)
            }
            PricingMode::FixedPlan(plan) => (i128::from(plan.price.cents()), 1),
        }
    }
}
