//! Operator controls
//!
//! Every function here requires the caller to be the owner or a listed
//! admin; `add_admin`/`remove_admin` require the owner.

use lib_types::{Address, Amount};
use tracing::{info, warn};

use crate::config::DistributionPolicy;
use crate::errors::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::state::{Env, LedgerTxn};

fn require_admin(txn: &LedgerTxn<'_>, env: &Env<'_>) -> LedgerResult<()> {
    if txn.system().is_admin(&env.ctx.caller) {
        Ok(())
    } else {
        warn!("admin operation refused for {}", env.ctx.caller);
        Err(LedgerError::Unauthorized(env.ctx.caller))
    }
}

fn require_owner(txn: &LedgerTxn<'_>, env: &Env<'_>) -> LedgerResult<()> {
    if txn.system().owner == env.ctx.caller {
        Ok(())
    } else {
        warn!("owner operation refused for {}", env.ctx.caller);
        Err(LedgerError::Unauthorized(env.ctx.caller))
    }
}

pub(crate) fn pause(txn: &mut LedgerTxn<'_>, env: &Env<'_>) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if !txn.system().paused {
        txn.system_mut().paused = true;
        txn.emit(LedgerEvent::Paused { by: env.ctx.caller });
        info!("ledger paused by {}", env.ctx.caller);
    }
    Ok(())
}

pub(crate) fn unpause(txn: &mut LedgerTxn<'_>, env: &Env<'_>) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if txn.system().paused {
        txn.system_mut().paused = false;
        txn.emit(LedgerEvent::Unpaused { by: env.ctx.caller });
        info!("ledger unpaused by {}", env.ctx.caller);
    }
    Ok(())
}

pub(crate) fn set_treasury(txn: &mut LedgerTxn<'_>, env: &Env<'_>, treasury: Address) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if treasury.is_zero() {
        return Err(LedgerError::InvalidAddress("treasury cannot be the zero address"));
    }
    let old = txn.system().treasury;
    txn.system_mut().treasury = treasury;
    txn.emit(LedgerEvent::TreasuryUpdated { old, new: treasury });
    Ok(())
}

/// `threshold` in base units; 0 disables the breaker
pub(crate) fn set_circuit_breaker(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    threshold: Amount,
    window_secs: u64,
) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if threshold > 0 && window_secs == 0 {
        return Err(LedgerError::InvalidParameter("circuit breaker window must be positive"));
    }
    let system = txn.system_mut();
    system.circuit_breaker_threshold = threshold;
    system.circuit_breaker_window_secs = window_secs;
    txn.emit(LedgerEvent::CircuitBreakerUpdated { threshold, window_secs });
    Ok(())
}

pub(crate) fn set_daily_withdrawal_limit(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    limit: Option<Amount>,
) -> LedgerResult<()> {
    require_admin(txn, env)?;
    txn.system_mut().daily_withdrawal_limit = limit;
    txn.emit(LedgerEvent::DailyLimitUpdated { limit });
    Ok(())
}

pub(crate) fn set_distribution_policy(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    policy: DistributionPolicy,
) -> LedgerResult<()> {
    require_admin(txn, env)?;
    txn.system_mut().distribution_policy = policy;
    txn.emit(LedgerEvent::DistributionPolicyUpdated { policy });
    Ok(())
}

pub(crate) fn set_blacklisted(
    txn: &mut LedgerTxn<'_>,
    env: &Env<'_>,
    user: Address,
    blacklisted: bool,
) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if user == txn.system().root {
        return Err(LedgerError::RootProtected(user, "blacklisted"));
    }
    let account = txn.user_mut(&user)?;
    if account.is_blacklisted == blacklisted {
        return Ok(());
    }
    account.is_blacklisted = blacklisted;
    if blacklisted {
        txn.emit(LedgerEvent::Blacklisted { user });
        warn!("{} blacklisted by {}", user, env.ctx.caller);
    } else {
        txn.emit(LedgerEvent::Unblacklisted { user });
        info!("{} removed from blacklist by {}", user, env.ctx.caller);
    }
    Ok(())
}

pub(crate) fn add_admin(txn: &mut LedgerTxn<'_>, env: &Env<'_>, admin: Address) -> LedgerResult<()> {
    require_owner(txn, env)?;
    if admin.is_zero() {
        return Err(LedgerError::InvalidAddress("admin cannot be the zero address"));
    }
    if txn.system_mut().admins.insert(admin) {
        txn.emit(LedgerEvent::AdminAdded { admin });
    }
    Ok(())
}

pub(crate) fn remove_admin(txn: &mut LedgerTxn<'_>, env: &Env<'_>, admin: Address) -> LedgerResult<()> {
    require_owner(txn, env)?;
    if txn.system_mut().admins.remove(&admin) {
        txn.emit(LedgerEvent::AdminRemoved { admin });
    }
    Ok(())
}

/// Approve a price feed for native pricing
pub(crate) fn add_oracle(txn: &mut LedgerTxn<'_>, env: &Env<'_>, oracle: Address) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if oracle.is_zero() {
        return Err(LedgerError::InvalidAddress("oracle cannot be the zero address"));
    }
    if txn.system_mut().oracles.insert(oracle) {
        txn.emit(LedgerEvent::OracleAdded { oracle });
        info!("price feed {} approved by {}", oracle, env.ctx.caller);
    }
    Ok(())
}

pub(crate) fn remove_oracle(txn: &mut LedgerTxn<'_>, env: &Env<'_>, oracle: Address) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if txn.system_mut().oracles.remove(&oracle) {
        txn.emit(LedgerEvent::OracleRemoved { oracle });
        let system = txn.system();
        if (system.oracles.len() as u32) < system.min_oracles {
            warn!(
                "{} price feeds approved, {} required: native pricing unavailable",
                system.oracles.len(),
                system.min_oracles
            );
        }
    }
    Ok(())
}

/// Valid quotes required before a native price is accepted
pub(crate) fn set_min_oracles(txn: &mut LedgerTxn<'_>, env: &Env<'_>, min_oracles: u32) -> LedgerResult<()> {
    require_admin(txn, env)?;
    if min_oracles == 0 {
        return Err(LedgerError::InvalidParameter("at least one price feed must be required"));
    }
    if txn.system().min_oracles != min_oracles {
        txn.system_mut().min_oracles = min_oracles;
        txn.emit(LedgerEvent::MinOraclesUpdated { min_oracles });
    }
    Ok(())
}
