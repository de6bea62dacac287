use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::{
    entities::cart_item,
    services::{cart::subtotal, orders::price_items},
    sites::SiteConfig,
};
use uuid::Uuid;

fn line(cents: i64, quantity: i32) -> cart_item::Model {
    cart_item::Model {
        id: Uuid::new_v4(),
        cart_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        variant_id: None,
        quantity,
        unit_price: Decimal::new(cents, 2),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn site(rate_bp: Option<i64>, shipping_cents: Option<i64>) -> SiteConfig {
    SiteConfig {
        key: "default".into(),
        name: "prop".into(),
        currency: "USD".into(),
        // basis points of a percent, scale 4: 825 -> 0.0825
        tax_rate: rate_bp.map(|bp| Decimal::new(bp, 4)),
        shipping_cost: shipping_cents.map(|c| Decimal::new(c, 2)),
    }
}

proptest! {
    /// The stored money invariant: total reconstructs exactly from its parts,
    /// with zero epsilon, for any cart and any configured rates.
    #[test]
    fn total_equals_subtotal_plus_tax_plus_shipping(
        lines in prop::collection::vec((1i64..100_000, 1i32..50), 0..12),
        rate_bp in prop::option::of(0i64..2_500),
        shipping_cents in prop::option::of(0i64..5_000),
    ) {
        let items: Vec<cart_item::Model> =
            lines.iter().map(|&(cents, qty)| line(cents, qty)).collect();
        let pricing = price_items(&items, &site(rate_bp, shipping_cents));

        prop_assert_eq!(
            pricing.total,
            pricing.subtotal + pricing.tax + pricing.shipping
        );
    }

    /// The subtotal is exactly the sum of line totals at captured prices:
    /// no drift, regardless of how many lines or how awkward the cents.
    #[test]
    fn subtotal_is_reconstructible_from_lines(
        lines in prop::collection::vec((1i64..100_000, 1i32..50), 0..12),
    ) {
        let items: Vec<cart_item::Model> =
            lines.iter().map(|&(cents, qty)| line(cents, qty)).collect();

        let expected: Decimal = items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();

        prop_assert_eq!(subtotal(&items), expected);
    }

    /// Tax always lands on a representable cent amount.
    #[test]
    fn tax_has_at_most_two_decimal_places(
        lines in prop::collection::vec((1i64..100_000, 1i32..50), 1..12),
        rate_bp in 0i64..2_500,
    ) {
        let items: Vec<cart_item::Model> =
            lines.iter().map(|&(cents, qty)| line(cents, qty)).collect();
        let pricing = price_items(&items, &site(Some(rate_bp), None));

        prop_assert!(pricing.tax.scale() <= 2);
    }

    /// Minor-unit conversion is exact for any 2-decimal total.
    #[test]
    fn minor_units_match_cents(
        lines in prop::collection::vec((1i64..100_000, 1i32..50), 0..12),
        shipping_cents in 0i64..5_000,
    ) {
        let items: Vec<cart_item::Model> =
            lines.iter().map(|&(cents, qty)| line(cents, qty)).collect();
        // No tax: subtotal and shipping are both exact cents
        let pricing = price_items(&items, &site(None, Some(shipping_cents)));

        let expected_cents: i64 = lines
            .iter()
            .map(|&(cents, qty)| cents * i64::from(qty))
            .sum::<i64>()
            + shipping_cents;

        prop_assert_eq!(pricing.total_minor_units().unwrap(), expected_cents);
    }
}
