use std::collections::HashMap;

use clinicdesk_core::domain::plans::{
    check_limit, format_price, BillingInterval, PlanCatalog, PlanId, StripePrices, Subscription,
    SubscriptionStatus,
};

fn priced_catalog() -> PlanCatalog {
    let mut prices = HashMap::new();
    prices.insert(
        PlanId::Professional,
        StripePrices {
            monthly: Some("price_pro_m".to_string()),
            yearly: Some("price_pro_y".to_string()),
        },
    );
    PlanCatalog::standard().with_stripe_prices(&prices)
}

#[test]
fn standard_catalog_has_three_tiers() {
    let catalog = PlanCatalog::standard();
    let ids: Vec<PlanId> = catalog.list().iter().map(|p| p.id).collect();
    assert_eq!(ids, PlanId::ALL.to_vec());

    let basic = catalog.get(PlanId::Basic).unwrap();
    assert_eq!(basic.monthly_price_cents, 4_900);
    assert_eq!(basic.price_cents(BillingInterval::Yearly), 49_000);
    assert_eq!(basic.limits.max_patients, Some(500));
    assert!(!basic.limits.calendar_sync);

    let enterprise = catalog.get(PlanId::Enterprise).unwrap();
    assert_eq!(enterprise.limits.max_users, None);
}

#[test]
fn yearly_billing_saves_two_months() {
    let pro = PlanCatalog::standard().get(PlanId::Professional).cloned().unwrap();
    assert_eq!(pro.yearly_savings_cents(), 19_800);
    assert!((pro.yearly_discount_pct() - 16.666).abs() < 0.01);
}

#[test]
fn stripe_price_maps_back_to_plan_and_interval() {
    let catalog = priced_catalog();

    let (plan, interval) = catalog.find_by_stripe_price(" price_pro_y ").unwrap();
    assert_eq!(plan.id, PlanId::Professional);
    assert_eq!(interval, BillingInterval::Yearly);

    assert!(catalog.find_by_stripe_price("price_unknown").is_none());
    assert!(catalog.find_by_stripe_price("").is_none());
    assert_eq!(catalog.get(PlanId::Basic).unwrap().stripe_price(BillingInterval::Monthly), None);
}

#[test]
fn limit_checks() {
    let full = check_limit(Some(3), 3);
    assert!(!full.allowed);
    assert_eq!(full.remaining, Some(0));

    let over = check_limit(Some(5), 7);
    assert_eq!(over.remaining, Some(0));

    let open = check_limit(None, 10_000);
    assert!(open.allowed);
    assert_eq!(open.remaining, None);

    assert_eq!(check_limit(Some(10), 4).remaining, Some(6));
}

#[test]
fn prices_are_formatted_with_symbol_and_grouping() {
    assert_eq!(format_price(123_456, "usd"), "$1,234.56");
    assert_eq!(format_price(4_900, "EUR"), "€49.00");
    assert_eq!(format_price(100_000_000, "mxn"), "MX$1,000,000.00");
    assert_eq!(format_price(-150, "usd"), "-$1.50");
    assert_eq!(format_price(5, "chf"), "CHF 0.05");
    assert_eq!(format_price(9_900, "gbp"), "GBP 99.00");
}

#[test]
fn trial_and_access_rules() {
    let trial = Subscription::trial(4, 1_000);
    assert_eq!(trial.plan_id, PlanId::Basic);
    assert_eq!(trial.status, SubscriptionStatus::Trialing);

    assert!(SubscriptionStatus::PastDue.grants_access());
    assert!(!SubscriptionStatus::Canceled.grants_access());
    assert!(!SubscriptionStatus::Unpaid.grants_access());
}

#[test]
fn plan_ids_parse() {
    assert_eq!("enterprise".parse::<PlanId>().unwrap(), PlanId::Enterprise);
    assert!("gold".parse::<PlanId>().is_err());
    assert_eq!("past_due".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::PastDue);
}
