use albaran_core::ReconcileConfig;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Cross-check `weight × price ≈ value`, recomputing the weight from the line's
/// price and value when the identity does not hold. The recomputed weight is
/// rounded to one decimal, exact halves to even.
///
/// Returns `weight` untouched when price or value is missing or not positive.
pub fn reconcile_weight(
    weight: Option<Decimal>,
    price: Option<Decimal>,
    value: Option<Decimal>,
    config: &ReconcileConfig,
) -> Option<Decimal> {
    let (Some(price), Some(value)) = (price, value) else {
        return weight;
    };
    if price <= Decimal::ZERO || value <= Decimal::ZERO {
        return weight;
    }

    let min_tolerance = Decimal::from_f64(config.min_tolerance).unwrap_or(Decimal::ZERO);
    let relative = Decimal::from_f64(config.relative_tolerance).unwrap_or(Decimal::ZERO);
    let tolerance = min_tolerance.max(value * relative);

    let consistent = weight
        .and_then(|w| w.checked_mul(price))
        .is_some_and(|expected| (expected - value).abs() <= tolerance);
    if consistent {
        return weight;
    }

    match value.checked_div(price) {
        Some(q) => {
            let recomputed = q.round_dp_with_strategy(1, RoundingStrategy::MidpointNearestEven);
            tracing::debug!(?weight, %price, %value, %recomputed, "Weight recomputed from value / price");
            Some(recomputed)
        }
        None => weight,
    }
}
