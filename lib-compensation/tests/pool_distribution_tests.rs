//! Caller-triggered pool distribution

mod common;

use common::*;
use lib_compensation::*;

const TENTH: Amount = UNIT / 10;

#[test]
fn test_community_pool_weighted_by_investment() -> anyhow::Result<()> {
    let mut ledger = ledger();
    let (a, b) = (addr(1), addr(2));
    join(&mut ledger, a, root(), 1)?;
    join(&mut ledger, b, root(), 4)?;
    assert_eq!(ledger.pool(PoolKind::Community).balance, 897 * TENTH);

    let at = GENESIS + 7 * DAY;
    let receipt = ledger.trigger_distribution(ctx(addr(99), at), PoolKind::Community)?;
    assert_eq!(
        receipt.value,
        DistributionOutcome::Distributed {
            distributed: 897 * TENTH,
            recipients: 2,
            carried_forward: 0,
        }
    );
    assert_eq!(ledger.user(&a).unwrap().balance, 117 * TENTH);
    assert_eq!(ledger.user(&b).unwrap().balance, tokens(78));

    let pool = ledger.pool(PoolKind::Community);
    assert_eq!(pool.balance, 0);
    assert_eq!(pool.last_distribution_at, at);
    assert_eq!(pool.distribution_count, 1);
    assert_eq!(pool.total_distributed_lifetime, 897 * TENTH);

    // The root never shares in pools
    assert!(!receipt.events.iter().any(|e| matches!(
        e,
        LedgerEvent::RewardCredited { recipient, .. } if *recipient == root()
    )));
    Ok(())
}

#[test]
fn test_second_trigger_in_interval_is_noop() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 2)?;
    join(&mut ledger, addr(2), addr(1), 1)?;

    let at = GENESIS + 7 * DAY;
    ledger.trigger_distribution(ctx(addr(2), at), PoolKind::Community)?;

    let users_before: Vec<UserAccount> = ledger.users().cloned().collect();
    let pools_before = *ledger.pools();

    let receipt = ledger.trigger_distribution(ctx(addr(2), at + 60), PoolKind::Community)?;
    assert_eq!(
        receipt.value,
        DistributionOutcome::NotDue { next_due_at: at + 7 * DAY }
    );
    assert!(receipt.events.is_empty());
    assert_eq!(ledger.users().cloned().collect::<Vec<_>>(), users_before);
    assert_eq!(*ledger.pools(), pools_before);
    Ok(())
}

#[test]
fn test_first_distribution_due_one_interval_after_genesis() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 1)?;
    let receipt = ledger.trigger_distribution(ctx(addr(1), GENESIS + 7 * DAY - 1), PoolKind::Community)?;
    assert_eq!(
        receipt.value,
        DistributionOutcome::NotDue { next_due_at: GENESIS + 7 * DAY }
    );
    assert_eq!(ledger.pool(PoolKind::Community).balance, 117 * TENTH);
    Ok(())
}

#[test]
fn test_no_eligible_recipients_carries_balance() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 1)?;

    let at = GENESIS + 15 * DAY;
    let receipt = ledger.trigger_distribution(ctx(addr(1), at), PoolKind::Leadership)?;
    assert_eq!(
        receipt.value,
        DistributionOutcome::NoEligibleRecipients { carried_forward: tokens(3) }
    );
    let pool = ledger.pool(PoolKind::Leadership);
    assert_eq!(pool.balance, tokens(3));
    assert_eq!(pool.last_distribution_at, at);

    let receipt = ledger.trigger_distribution(ctx(addr(1), at + 1), PoolKind::Leadership)?;
    assert!(matches!(receipt.value, DistributionOutcome::NotDue { .. }));
    Ok(())
}

#[test]
fn test_empty_pool_advances_schedule() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 3)?;
    // Standard packages allocate nothing to the club pool
    let at = GENESIS + 15 * DAY;
    let receipt = ledger.trigger_distribution(ctx(addr(1), at), PoolKind::Club)?;
    assert_eq!(receipt.value, DistributionOutcome::EmptyPool);
    assert_eq!(ledger.pool(PoolKind::Club).next_due_at(), at + 15 * DAY);
    Ok(())
}

#[test]
fn test_club_pool_restricted_to_high_tiers() -> anyhow::Result<()> {
    let club_package = |price_tokens| PackageSpec {
        help_pool_bps: 2000,
        club_pool_bps: 1000,
        ..PackageSpec::standard(price_tokens)
    };
    let config = LedgerConfig {
        packages: Some(vec![club_package(30), club_package(50), club_package(100), club_package(200)]),
        ..LedgerConfig::default()
    };
    let mut ledger = ledger_with(config);
    let (a, b) = (addr(1), addr(2));
    join(&mut ledger, a, root(), 2)?;
    join(&mut ledger, b, root(), 3)?;
    assert_eq!(ledger.pool(PoolKind::Club).balance, tokens(15));

    let receipt = ledger.trigger_distribution(ctx(a, GENESIS + 15 * DAY), PoolKind::Club)?;
    assert_eq!(
        receipt.value,
        DistributionOutcome::Distributed {
            distributed: tokens(15),
            recipients: 1,
            carried_forward: 0,
        }
    );
    assert_eq!(ledger.user(&a).unwrap().balance, 0);
    assert_eq!(ledger.user(&b).unwrap().balance, tokens(15));
    Ok(())
}

#[test]
fn test_leadership_pool_weighted_by_rank() -> anyhow::Result<()> {
    let config = LedgerConfig {
        ranks: RankThresholds {
            shining_star_team: 2,
            shining_star_directs: 2,
            silver_star_team: 4,
            silver_star_directs: 0,
        },
        ..LedgerConfig::default()
    };
    let mut ledger = ledger_with(config);
    let (a, b, c, d, e) = (addr(1), addr(2), addr(3), addr(4), addr(5));
    join(&mut ledger, a, root(), 1)?;
    join(&mut ledger, b, a, 1)?;
    let receipt = join(&mut ledger, c, a, 1)?;
    assert!(receipt.events.iter().any(|ev| matches!(
        ev,
        LedgerEvent::RankChanged { user, from: Rank::Member, to: Rank::ShiningStar } if *user == a
    )));
    join(&mut ledger, d, b, 1)?;
    join(&mut ledger, e, b, 1)?;

    assert_eq!(ledger.user(&a).unwrap().rank, Rank::SilverStar);
    assert_eq!(ledger.user(&b).unwrap().rank, Rank::ShiningStar);
    assert_eq!(ledger.user(&c).unwrap().rank, Rank::Member);
    assert_eq!(ledger.pool(PoolKind::Leadership).balance, tokens(15));

    let balance_a = ledger.user(&a).unwrap().balance;
    let balance_b = ledger.user(&b).unwrap().balance;
    let receipt = ledger.trigger_distribution(ctx(c, GENESIS + 15 * DAY), PoolKind::Leadership)?;
    assert_eq!(
        receipt.value,
        DistributionOutcome::Distributed {
            distributed: tokens(15),
            recipients: 2,
            carried_forward: 0,
        }
    );
    assert_eq!(ledger.user(&a).unwrap().balance - balance_a, tokens(10));
    assert_eq!(ledger.user(&b).unwrap().balance - balance_b, tokens(5));
    Ok(())
}

#[test]
fn test_capped_users_excluded() -> anyhow::Result<()> {
    let config = LedgerConfig {
        earnings_cap_multiplier: 1,
        ..LedgerConfig::default()
    };
    let mut ledger = ledger_with(config);
    let (a, b) = (addr(1), addr(2));
    join(&mut ledger, a, root(), 1)?;
    join(&mut ledger, b, a, 4)?;
    assert!(ledger.user(&a).unwrap().is_capped_out());

    let pool_balance = ledger.pool(PoolKind::Community).balance;
    let receipt = ledger.trigger_distribution(ctx(b, GENESIS + 7 * DAY), PoolKind::Community)?;
    assert!(matches!(receipt.value, DistributionOutcome::Distributed { recipients: 1, .. }));
    assert_eq!(ledger.user(&b).unwrap().balance, pool_balance);
    assert_eq!(ledger.user(&a).unwrap().total_earned, tokens(30));
    Ok(())
}

#[test]
fn test_admin_only_policy() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 1)?;
    ledger.set_distribution_policy(ctx(owner(), GENESIS), DistributionPolicy::AdminOnly)?;

    let at = GENESIS + 7 * DAY;
    let err = ledger
        .trigger_distribution(ctx(addr(1), at), PoolKind::Community)
        .unwrap_err();
    assert_eq!(err, LedgerError::Unauthorized(addr(1)));

    let receipt = ledger.trigger_distribution(ctx(owner(), at), PoolKind::Community)?;
    assert!(matches!(receipt.value, DistributionOutcome::Distributed { .. }));
    Ok(())
}

#[test]
fn test_distribution_allowed_while_paused() -> anyhow::Result<()> {
    let mut ledger = ledger();
    join(&mut ledger, addr(1), root(), 1)?;
    ledger.pause(ctx(owner(), GENESIS))?;
    let receipt = ledger.trigger_distribution(ctx(addr(1), GENESIS + 7 * DAY), PoolKind::Community)?;
    assert!(matches!(receipt.value, DistributionOutcome::Distributed { .. }));
    Ok(())
}
