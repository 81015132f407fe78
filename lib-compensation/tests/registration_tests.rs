//! Registration and upgrade flows through the public ledger API

mod common;

use common::*;
use lib_compensation::*;
use proptest::prelude::*;

const TENTH: Amount = UNIT / 10;

#[test]
fn test_first_registration_split() -> anyhow::Result<()> {
    let mut ledger = ledger();
    let a = addr(1);
    let receipt = join(&mut ledger, a, root(), 1)?;
    let breakdown = receipt.value.breakdown;

    assert_eq!(breakdown.amount, tokens(30));
    assert_eq!(breakdown.direct_credit, tokens(12));
    // One existing level out of ten
    assert_eq!(breakdown.level_credits, 3 * TENTH);
    assert_eq!(breakdown.upline_credits, tokens(3));
    assert_eq!(breakdown.forfeited_to_community, 27 * TENTH);
    assert_eq!(breakdown.accounted()?, tokens(30));

    let root_account = ledger.user(&root()).unwrap();
    assert_eq!(root_account.balance, 153 * TENTH);
    assert_eq!(root_account.direct_referral_count, 1);
    assert_eq!(root_account.team_size, 1);

    let account = ledger.user(&a).unwrap();
    assert_eq!(account.sponsor, Some(root()));
    assert_eq!(account.total_invested, tokens(30));
    assert_eq!(account.earnings_cap, tokens(120));
    assert_eq!(account.balance, 0);

    assert_eq!(ledger.pool(PoolKind::Leadership).balance, tokens(3));
    assert_eq!(ledger.pool(PoolKind::Community).balance, 117 * TENTH);
    assert_eq!(ledger.pool(PoolKind::Club).balance, 0);
    assert_eq!(ledger.total_users(), 2);
    assert_eq!(ledger.gateway().custody_balance(Asset::Stable), tokens(30));
    assert_eq!(ledger.referrals_of(&root()), vec![a]);

    assert!(receipt.events.iter().any(|e| matches!(
        e,
        LedgerEvent::UserRegistered { user, tier: 1, .. } if *user == a
    )));
    Ok(())
}

#[test]
fn test_third_user_shortfall_goes_to_community() -> anyhow::Result<()> {
    let mut ledger = ledger();
    let (a, b) = (addr(1), addr(2));
    join(&mut ledger, a, root(), 1)?;
    let community_before = ledger.pool(PoolKind::Community).balance;

    let receipt = join(&mut ledger, b, a, 1)?;
    let breakdown = receipt.value.breakdown;

    assert_eq!(ledger.ancestors_of(&b, MAX_CHAIN_DEPTH), vec![a, root()]);
    assert_eq!(breakdown.level_credits, 6 * TENTH);
    // Upline share divided between the two ancestors that exist
    assert_eq!(breakdown.upline_credits, tokens(3));
    // Eight missing levels
    assert_eq!(breakdown.forfeited_to_community, 24 * TENTH);
    assert_eq!(breakdown.accounted()?, tokens(30));

    assert_eq!(
        ledger.pool(PoolKind::Community).balance - community_before,
        tokens(9) + 24 * TENTH
    );
    assert_eq!(ledger.user(&a).unwrap().balance, 138 * TENTH);

    // Nothing was credited to an address outside the chain
    for event in &receipt.events {
        if let LedgerEvent::RewardCredited { recipient, .. } = event {
            assert!(*recipient == a || *recipient == root());
        }
    }
    assert!(receipt.events.iter().any(|e| matches!(
        e,
        LedgerEvent::Forfeited { intended: None, reason: ForfeitReason::MissingAncestor, .. }
    )));
    assert_eq!(ledger.team_size_of(&root())?, 2);
    assert_eq!(ledger.team_size_of(&a)?, 1);
    assert_eq!(ledger.direct_referral_count_of(&a)?, 1);
    Ok(())
}

#[test]
fn test_upline_division_remainder_swept() -> anyhow::Result<()> {
    let config = LedgerConfig {
        token_decimals: 6,
        ..LedgerConfig::default()
    };
    let mut ledger = ledger_with(config);
    let (a, b, c) = (addr(1), addr(2), addr(3));
    join(&mut ledger, a, root(), 1)?;
    join(&mut ledger, b, a, 1)?;

    // Three ancestors share 5_000_000 → 1_666_666 each, remainder 2
    let breakdown = join(&mut ledger, c, b, 2)?.value.breakdown;
    assert_eq!(breakdown.amount, 50_000_000);
    assert_eq!(breakdown.upline_credits, 4_999_998);
    assert_eq!(breakdown.level_credits, 1_500_000);
    assert_eq!(breakdown.forfeited_to_community, 3_500_000 + 2);
    assert_eq!(breakdown.accounted()?, 50_000_000);
    Ok(())
}

#[test]
fn test_earnings_cap_clamps_credits() -> anyhow::Result<()> {
    let config = LedgerConfig {
        earnings_cap_multiplier: 1,
        ..LedgerConfig::default()
    };
    let mut ledger = ledger_with(config);
    let a = addr(1);
    join(&mut ledger, a, root(), 1)?;
    assert_eq!(ledger.user(&a).unwrap().earnings_cap, tokens(30));

    // Direct bonus of 80 against 30 of headroom
    let receipt = join(&mut ledger, addr(2), a, 4)?;
    let sponsor = ledger.user(&a).unwrap();
    assert_eq!(sponsor.total_earned, tokens(30));
    assert_eq!(sponsor.balance, tokens(30));
    assert_eq!(receipt.value.breakdown.direct_credit, tokens(30));
    assert_eq!(receipt.value.breakdown.accounted()?, tokens(200));
    assert!(receipt
        .events
        .iter()
        .any(|e| matches!(e, LedgerEvent::EarningsCapReached { user, .. } if *user == a)));
    assert!(receipt.events.iter().any(|e| matches!(
        e,
        LedgerEvent::Forfeited { intended: Some(who), reason: ForfeitReason::CapReached, .. } if *who == a
    )));

    // Further rewards are forfeited entirely
    let receipt = join(&mut ledger, addr(3), a, 1)?;
    assert_eq!(receipt.value.breakdown.direct_credit, 0);
    assert_eq!(ledger.user(&a).unwrap().total_earned, tokens(30));
    Ok(())
}

#[test]
fn test_failed_pull_changes_nothing() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 2)?;
    join(&mut ledger, addr(2), addr(1), 1)?;

    let users_before: Vec<UserAccount> = ledger.users().cloned().collect();
    let pools_before = *ledger.pools();
    let system_before = ledger.system().clone();
    let custody_before = ledger.gateway().custody_balance(Asset::Stable);

    let newcomer = addr(3);
    ledger.gateway_mut().mint(Asset::Stable, &newcomer, tokens(30))?;
    ledger
        .gateway_mut()
        .fail_pulls(Some("allowance revoked".to_string()));
    let err = ledger
        .register(ctx(newcomer, GENESIS + 100), addr(2), 1, PaymentMethod::Stable)
        .unwrap_err();

    assert!(matches!(err, LedgerError::PaymentFailed(TransferError::Rejected(_))));
    assert!(err.is_retryable());
    assert_eq!(ledger.total_users(), 3);
    assert_eq!(ledger.users().cloned().collect::<Vec<_>>(), users_before);
    assert_eq!(*ledger.pools(), pools_before);
    assert_eq!(*ledger.system(), system_before);
    assert_eq!(ledger.gateway().custody_balance(Asset::Stable), custody_before);
    assert_eq!(ledger.gateway().balance_of(Asset::Stable, &newcomer), tokens(30));
    assert!(!ledger.is_registered(&newcomer));
    assert!(ledger.store().get_user(&newcomer)?.is_none());
    Ok(())
}

#[test]
fn test_unfunded_registration_rejected() {
    let mut ledger = ledger();
    let err = ledger
        .register(ctx(addr(1), GENESIS), root(), 1, PaymentMethod::Stable)
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::PaymentFailed(TransferError::InsufficientFunds { available: 0, .. })
    ));
    assert_eq!(ledger.total_users(), 1);
}

#[test]
fn test_sponsor_and_tier_validation() -> anyhow::Result<()> {
    let mut ledger = ledger();
    let a = addr(1);
    join(&mut ledger, a, root(), 1)?;
    ledger.gateway_mut().mint(Asset::Stable, &addr(2), tokens(1_000))?;
    let now = GENESIS + 10;

    let err = ledger
        .register(ctx(addr(2), now), addr(9), 1, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InvalidSponsor { sponsor: addr(9), reason: SponsorRejection::NotRegistered }
    );

    let err = ledger
        .register(ctx(addr(2), now), addr(2), 1, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InvalidSponsor { sponsor: addr(2), reason: SponsorRejection::SelfReferral }
    );

    let err = ledger
        .register(ctx(a, now), root(), 1, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(err, LedgerError::AlreadyRegistered(a));

    for tier in [0, 5] {
        let err = ledger
            .register(ctx(addr(2), now), a, tier, PaymentMethod::Stable)
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidPackageTier(tier));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    ledger.blacklist(ctx(owner(), now), a)?;
    let err = ledger
        .register(ctx(addr(2), now), a, 1, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InvalidSponsor { sponsor: a, reason: SponsorRejection::Blacklisted }
    );

    ledger.pause(ctx(owner(), now))?;
    let err = ledger
        .register(ctx(addr(2), now), root(), 1, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(err, LedgerError::ContractPaused);

    assert_eq!(ledger.total_users(), 2);
    Ok(())
}

#[test]
fn test_blacklisted_sponsor_reward_forfeited() -> anyhow::Result<()> {
    let mut ledger = ledger();
    let (a, b) = (addr(1), addr(2));
    join(&mut ledger, a, root(), 1)?;
    join(&mut ledger, b, a, 1)?;
    ledger.blacklist(ctx(owner(), GENESIS + 10), a)?;

    let balance_before = ledger.user(&a).unwrap().balance;
    let receipt = join(&mut ledger, addr(3), b, 1)?;
    assert_eq!(ledger.user(&a).unwrap().balance, balance_before);
    assert!(receipt.events.iter().any(|e| matches!(
        e,
        LedgerEvent::Forfeited { intended: Some(who), reason: ForfeitReason::Blacklisted, .. } if *who == a
    )));
    assert_eq!(receipt.value.breakdown.accounted()?, tokens(30));
    Ok(())
}

#[test]
fn test_incremental_upgrade() -> anyhow::Result<()> {
    let mut ledger = ledger();
    let a = addr(1);
    join(&mut ledger, a, root(), 1)?;
    let root_before = ledger.user(&root()).unwrap().clone();

    ledger.gateway_mut().mint(Asset::Stable, &a, tokens(70))?;
    let receipt = ledger.upgrade_package(ctx(a, GENESIS + 100), 3, PaymentMethod::Stable)?;

    assert_eq!(receipt.value.from_tier, 1);
    assert_eq!(receipt.value.to_tier, 3);
    assert_eq!(receipt.value.payment.pulled, tokens(70));
    assert_eq!(receipt.value.breakdown.direct_credit, tokens(28));
    assert_eq!(receipt.value.breakdown.accounted()?, tokens(70));

    let account = ledger.user(&a).unwrap();
    assert_eq!(account.package_level, 3);
    assert_eq!(account.total_invested, tokens(100));
    assert_eq!(account.earnings_cap, tokens(400));

    // Upgrades do not grow the team
    let root_after = ledger.user(&root()).unwrap();
    assert_eq!(root_after.direct_referral_count, root_before.direct_referral_count);
    assert_eq!(root_after.team_size, root_before.team_size);
    assert_eq!(ledger.gateway().balance_of(Asset::Stable, &a), 0);

    let err = ledger
        .upgrade_package(ctx(a, GENESIS + 200), 3, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(err, LedgerError::TierNotHigher { current: 3, requested: 3 });

    let err = ledger
        .upgrade_package(ctx(addr(9), GENESIS + 200), 4, PaymentMethod::Stable)
        .unwrap_err();
    assert_eq!(err, LedgerError::NotRegistered(addr(9)));
    Ok(())
}

#[test]
fn test_full_price_upgrade() -> anyhow::Result<()> {
    let config = LedgerConfig {
        upgrade_pricing: UpgradePricing::FullPrice,
        ..LedgerConfig::default()
    };
    let mut ledger = ledger_with(config);
    let a = addr(1);
    join(&mut ledger, a, root(), 1)?;

    ledger.gateway_mut().mint(Asset::Stable, &a, tokens(100))?;
    let receipt = ledger.upgrade_package(ctx(a, GENESIS + 100), 3, PaymentMethod::Stable)?;
    assert_eq!(receipt.value.payment.pulled, tokens(100));

    let account = ledger.user(&a).unwrap();
    assert_eq!(account.total_invested, tokens(130));
    assert_eq!(account.earnings_cap, tokens(520));
    Ok(())
}

#[test]
fn test_native_payment() -> anyhow::Result<()> {
    let now = GENESIS + 500;
    let mut ledger =
        ledger().with_price_feed(feed_id(), Box::new(FixedPriceOracle::new(1_000 * 100_000_000, now - 60)));
    let a = addr(1);
    let native = 30 * UNIT / 1_000;
    ledger.gateway_mut().mint(Asset::Native, &a, native)?;

    let receipt = ledger.register(ctx(a, now), root(), 1, PaymentMethod::Native)?;
    assert_eq!(receipt.value.payment.pulled, native);
    assert_eq!(receipt.value.payment.stable_value, tokens(30));
    assert_eq!(ledger.user(&a).unwrap().total_invested, tokens(30));
    assert_eq!(ledger.gateway().custody_balance(Asset::Native), native);
    assert_eq!(ledger.gateway().custody_balance(Asset::Stable), 0);
    Ok(())
}

#[test]
fn test_native_payment_rejects_stale_or_missing_price() -> anyhow::Result<()> {
    let now = GENESIS + 10_000;
    let a = addr(1);

    let mut ledger = ledger();
    let err = ledger
        .register(ctx(a, now), root(), 1, PaymentMethod::Native)
        .unwrap_err();
    assert_eq!(err, LedgerError::NativePaymentUnavailable);
    assert!(!err.is_retryable());

    ledger.attach_price_feed(feed_id(), Box::new(FixedPriceOracle::new(1_000 * 100_000_000, now - 1_801)));
    ledger.gateway_mut().mint(Asset::Native, &a, UNIT)?;
    let err = ledger
        .register(ctx(a, now), root(), 1, PaymentMethod::Native)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::PriceFeed(OracleError::StalePrice { age: 1_801, max_age: 1_800 })
    );
    assert!(err.is_retryable());
    assert_eq!(ledger.total_users(), 1);
    assert_eq!(ledger.gateway().balance_of(Asset::Native, &a), UNIT);
    Ok(())
}

#[test]
fn test_unapproved_feed_is_ignored() -> anyhow::Result<()> {
    let now = GENESIS + 500;
    let a = addr(1);
    let mut ledger = ledger().with_price_feed(addr(0xB0), Box::new(FixedPriceOracle::new(1_000 * 100_000_000, now)));
    ledger.gateway_mut().mint(Asset::Native, &a, UNIT)?;
    assert_eq!(
        ledger.register(ctx(a, now), root(), 1, PaymentMethod::Native).unwrap_err(),
        LedgerError::NativePaymentUnavailable
    );

    let receipt = ledger.add_oracle(ctx(owner(), now), addr(0xB0))?;
    assert_eq!(receipt.events, vec![LedgerEvent::OracleAdded { oracle: addr(0xB0) }]);
    ledger.register(ctx(a, now), root(), 1, PaymentMethod::Native)?;
    assert!(ledger.is_registered(&a));
    Ok(())
}

#[test]
fn test_native_price_aggregates_approved_feeds() -> anyhow::Result<()> {
    let now = GENESIS + 500;
    let usd = 100_000_000u128;
    let mut ledger = ledger()
        .with_price_feed(feed_id(), Box::new(FixedPriceOracle::new(1_000 * usd, now)))
        .with_price_feed(addr(0xB1), Box::new(FixedPriceOracle::new(1_200 * usd, now)))
        .with_price_feed(addr(0xB2), Box::new(FixedPriceOracle::failing("feed offline")));

    assert_eq!(
        ledger.add_oracle(ctx(addr(1), now), addr(0xB1)).unwrap_err(),
        LedgerError::Unauthorized(addr(1))
    );
    assert!(matches!(
        ledger.add_oracle(ctx(owner(), now), Address::zero()),
        Err(LedgerError::InvalidAddress(_))
    ));
    ledger.add_oracle(ctx(owner(), now), addr(0xB1))?;
    ledger.add_oracle(ctx(owner(), now), addr(0xB2))?;
    // Offline feed skipped, median of the other two
    assert_eq!(ledger.native_price(now)?.price, 1_100 * usd);

    let receipt = ledger.set_min_oracles(ctx(owner(), now), 3)?;
    assert_eq!(receipt.events, vec![LedgerEvent::MinOraclesUpdated { min_oracles: 3 }]);
    assert_eq!(
        ledger.native_price(now).unwrap_err(),
        LedgerError::PriceFeed(OracleError::InsufficientOracles { valid: 2, required: 3 })
    );
    assert_eq!(
        ledger.set_min_oracles(ctx(owner(), now), 0).unwrap_err(),
        LedgerError::InvalidParameter("at least one price feed must be required")
    );

    ledger.set_min_oracles(ctx(owner(), now), 2)?;
    ledger.remove_oracle(ctx(owner(), now), feed_id())?;
    assert_eq!(
        ledger.native_price(now).unwrap_err(),
        LedgerError::PriceFeed(OracleError::InsufficientOracles { valid: 1, required: 2 })
    );
    assert_eq!(ledger.system().oracles.len(), 2);
    assert_eq!(ledger.system_health(now).approved_oracles, 2);
    Ok(())
}

#[test]
fn test_matrix_placement_at_registration() -> anyhow::Result<()> {
    let mut ledger = ledger();
    for n in 1..=5 {
        join(&mut ledger, addr(n), root(), 1)?;
    }
    assert_eq!(ledger.matrix_children(&root()), [Some(addr(1)), Some(addr(2))]);
    assert_eq!(ledger.matrix_children(&addr(1)), [Some(addr(3)), Some(addr(4))]);
    let seat = ledger.matrix_position(&addr(5)).unwrap();
    assert_eq!((seat.parent, seat.side), (addr(3), MatrixSide::Left));
    assert_eq!(seat.placed_at, GENESIS + 60);

    // Sponsor tree is unaffected by spillover
    assert_eq!(ledger.user(&addr(5)).unwrap().sponsor, Some(root()));

    let receipt = join(&mut ledger, addr(6), addr(2), 1)?;
    assert!(receipt.events.contains(&LedgerEvent::MatrixPlaced {
        user: addr(6),
        parent: addr(2),
        side: MatrixSide::Left,
    }));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_registrations_conserve_value(
        multiplier in 1u32..=4,
        joins in prop::collection::vec((1u8..=4, any::<prop::sample::Index>()), 1..20),
    ) {
        let config = LedgerConfig { earnings_cap_multiplier: multiplier, ..LedgerConfig::default() };
        let mut ledger = ledger_with(config);
        let mut members = vec![root()];

        for (i, (tier, sponsor)) in joins.iter().enumerate() {
            let user = addr(i as u8 + 1);
            let sponsor = *sponsor.get(&members);
            let receipt = join(&mut ledger, user, sponsor, *tier).unwrap();
            let price = ledger.package_catalog().require(*tier).unwrap().price;
            prop_assert_eq!(receipt.value.breakdown.accounted().unwrap(), price);
            members.push(user);
        }

        prop_assert_eq!(ledger_liabilities(&ledger), ledger.gateway().custody_balance(Asset::Stable));
        for user in ledger.users() {
            prop_assert!(user.total_earned <= user.earnings_cap);
        }
        prop_assert_eq!(ledger.total_users(), members.len() as u64);
        prop_assert_eq!(ledger.team_size_of(&root()).unwrap(), joins.len() as u64);
    }
}
