use std::any::TypeId;
use std::sync::Arc;

use rule_forge::engine::FactSpace;
use rule_forge::{ClosureRule, RuleSetBuilder};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("🦀 rule-forge demo");
    println!("==================\n");

    println!("🛒 Demo 1: order discount rules");
    demo_order_discounts()?;

    println!("\n🛡️  Demo 2: order validation");
    demo_order_validation()?;

    Ok(())
}

struct Order {
    total: f64,
}

struct Customer {
    is_premium: bool,
}

fn demo_order_discounts() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let premium_discount = ClosureRule::new(
        "PremiumDiscount",
        vec![TypeId::of::<Order>(), TypeId::of::<Customer>()],
        |tuple, _ctx| {
            let order = tuple.facts()[0].downcast_ref::<Order>().unwrap();
            let customer = tuple.facts()[1].downcast_ref::<Customer>().unwrap();
            customer.is_premium && order.total > 100.0
        },
        |_rule, _tuple, ctx| {
            ctx.affirm(15);
            ctx.shared_set("discount_rate", serde_json::json!(0.15));
            Ok(())
        },
    )
    .with_salience(800);

    let standard_discount = ClosureRule::new(
        "StandardDiscount",
        vec![TypeId::of::<Order>()],
        |tuple, _ctx| {
            let order = tuple.facts()[0].downcast_ref::<Order>().unwrap();
            order.total > 200.0
        },
        |_rule, _tuple, ctx| {
            ctx.affirm(5);
            Ok(())
        },
    )
    .with_salience(200);

    let rule_set = RuleSetBuilder::new()
        .with_rule(Arc::new(premium_discount))
        .with_rule(Arc::new(standard_discount))
        .build();

    let mut facts = FactSpace::new();
    facts.add(Order { total: 250.0 })?;
    facts.add(Customer { is_premium: true })?;

    let results = rule_set.evaluate(facts)?;
    println!("✅ evaluation finished");
    println!("   - rules fired: {}", results.fired_rules.len());
    println!("   - score: {}", results.score());
    for (namespace, name) in &results.fired_rules {
        if namespace.is_empty() {
            println!("   - fired: {name}");
        } else {
            println!("   - fired: {namespace}::{name}");
        }
    }

    Ok(())
}

fn demo_order_validation() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let min_total = ClosureRule::new(
        "MinimumOrderTotal",
        vec![TypeId::of::<Order>()],
        |tuple, _ctx| {
            let order = tuple.facts()[0].downcast_ref::<Order>().unwrap();
            order.total < 10.0
        },
        |rule, _tuple, ctx| {
            ctx.veto(1);
            ctx.event(
                rule,
                rule_forge::EventCategory::Violation,
                Some("orders".to_string()),
                "order total is below the allowed minimum",
                &[],
            );
            Ok(())
        },
    )
    .with_salience(1000);

    let rule_set = RuleSetBuilder::new().with_rule(Arc::new(min_total)).build();

    let mut facts = FactSpace::new();
    facts.add(Order { total: 2.5 })?;

    let validation = rule_set.validate(facts)?;
    println!("✅ validation finished");
    println!("   - is_valid: {}", validation.is_valid);
    println!("   - violation count: {}", validation.violation_count());
    for (group, violations) in &validation.violations_by_group {
        println!("   - group '{group}': {} violation(s)", violations.len());
    }

    Ok(())
}
