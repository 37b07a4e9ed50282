//! # Barrel Expiry
//!
//! Optional TTL cleanup for death barrels. When a TTL is configured, every
//! stamped barrel gets a one-shot expiry check scheduled at creation. A
//! barrel is expired strictly after its TTL: a barrel exactly at the
//! boundary survives, which is why checks fire with one second of slack.
//!
//! A check can only act on a barrel whose chunk is resident in memory. For
//! non-resident chunks the check hands off to [`crate::chunk_fetch`], which
//! brings the chunk in and re-enters the evaluation synchronously. Chunk
//! load events also sweep their chunk's barrels, so barrels whose check
//! fired while the chunk was out never linger past a revisit.

use spacetimedb::spacetimedb_lib::ScheduleAt;
use spacetimedb::{ReducerContext, Table};
use std::time::Duration;
use log;

use crate::config::get_barrel_config;
use crate::death_barrel::{barrel_age_seconds, remove_barrel};
use crate::death_barrel::death_barrel as DeathBarrelTableTrait;
use crate::chunk_fetch::request_chunk_for_expiry;

/// Checks fire this long after the TTL elapses, so that "exactly at TTL"
/// never races the strict age comparison.
const EXPIRY_FIRE_SLACK_SECS: u64 = 1;

/// Which chunks currently have their contents loaded. Absence means not
/// resident.
#[spacetimedb::table(name = chunk_state, public)]
#[derive(Clone, Debug)]
pub struct ChunkState {
    #[primary_key]
    pub chunk_index: u32,
    pub resident: bool,
}

#[spacetimedb::table(name = barrel_expiry_schedule, scheduled(process_barrel_expiry))]
pub struct BarrelExpirySchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub barrel_id: u64,
    pub scheduled_at: ScheduleAt,
}

pub fn chunk_resident(ctx: &ReducerContext, chunk_index: u32) -> bool {
    ctx.db
        .chunk_state()
        .chunk_index()
        .find(chunk_index)
        .map(|state| state.resident)
        .unwrap_or(false)
}

pub(crate) fn set_chunk_resident(ctx: &ReducerContext, chunk_index: u32, resident: bool) {
    let states = ctx.db.chunk_state();
    match states.chunk_index().find(chunk_index) {
        Some(mut state) => {
            state.resident = resident;
            states.chunk_index().update(state);
        }
        None => {
            if let Err(e) = states.try_insert(ChunkState { chunk_index, resident }) {
                log::error!("[ChunkState] Failed to record chunk {}: {}", chunk_index, e);
            }
        }
    }
}

/// Strict expiry test on raw micros. Age exactly equal to the TTL is not
/// expired; a missing creation time (legacy barrel) never expires; a
/// non-positive TTL disables expiry entirely.
pub fn is_expired(created_at_micros: Option<i64>, now_micros: i64, ttl_seconds: i64) -> bool {
    if ttl_seconds <= 0 {
        return false;
    }
    match created_at_micros {
        None => false,
        Some(created) => (now_micros - created) > ttl_seconds * 1_000_000,
    }
}

/// Queues the one-shot expiry check for a freshly stamped barrel.
pub(crate) fn schedule_barrel_expiry(ctx: &ReducerContext, barrel_id: u64, ttl_seconds: i64) {
    if ttl_seconds <= 0 {
        return;
    }
    let fire_at = ctx.timestamp + Duration::from_secs(ttl_seconds as u64 + EXPIRY_FIRE_SLACK_SECS);
    crate::try_insert_schedule!(
        ctx.db.barrel_expiry_schedule(),
        BarrelExpirySchedule {
            id: 0,
            barrel_id,
            scheduled_at: ScheduleAt::Time(fire_at),
        },
        "Barrel expiry"
    );
    log::debug!(
        "[BarrelExpiry] Scheduled expiry check for barrel {} in {}s.",
        barrel_id, ttl_seconds as u64 + EXPIRY_FIRE_SLACK_SECS
    );
}

/// Decides a single barrel's fate right now. Idempotent: a vanished barrel,
/// a legacy barrel, a disabled TTL or an under-age barrel are all quiet
/// no-ops, so repeated checks for the same barrel are harmless.
pub(crate) fn evaluate_barrel_expiry(ctx: &ReducerContext, barrel_id: u64) {
    let Some(barrel) = ctx.db.death_barrel().id().find(barrel_id) else {
        return;
    };
    if !barrel.is_death_barrel {
        return;
    }

    let config = get_barrel_config(ctx);
    if !config.expiry_enabled() {
        return;
    }

    match barrel_age_seconds(&barrel, ctx.timestamp) {
        None => {
            // No recorded creation time: exempt.
            log::debug!("[BarrelExpiry] Barrel {} has no creation time, skipping.", barrel_id);
        }
        Some(age) => {
            if age > config.remove_barrels_after_seconds {
                log::info!(
                    "[BarrelExpiry] Barrel {} aged {}s (limit {}s), removing.",
                    barrel_id, age, config.remove_barrels_after_seconds
                );
                remove_barrel(ctx, barrel_id, "expired");
            }
        }
    }
}

/// Scheduled one-shot: runs a barrel's expiry check. If the barrel's chunk
/// is not resident, the check defers to a chunk fetch instead of touching a
/// block in unloaded space.
#[spacetimedb::reducer]
pub fn process_barrel_expiry(
    ctx: &ReducerContext,
    schedule: BarrelExpirySchedule,
) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("process_barrel_expiry may only be invoked by the scheduler.".to_string());
    }

    let Some(barrel) = ctx.db.death_barrel().id().find(schedule.barrel_id) else {
        // Already broken, emptied away or swept by a chunk load.
        return Ok(());
    };

    if !chunk_resident(ctx, barrel.chunk_index) {
        log::debug!(
            "[BarrelExpiry] Chunk {} not resident for barrel {}, requesting fetch.",
            barrel.chunk_index, schedule.barrel_id
        );
        request_chunk_for_expiry(ctx, barrel.chunk_index, schedule.barrel_id);
        return Ok(());
    }

    evaluate_barrel_expiry(ctx, schedule.barrel_id);
    Ok(())
}

/// A chunk came into memory. Freshly generated chunks cannot hold barrels
/// yet; for the rest, every barrel in the chunk gets an immediate expiry
/// sweep so checks missed while the chunk was out are caught up.
#[spacetimedb::reducer]
pub fn mark_chunk_loaded(
    ctx: &ReducerContext,
    chunk_index: u32,
    newly_generated: bool,
) -> Result<(), String> {
    set_chunk_resident(ctx, chunk_index, true);
    if newly_generated {
        return Ok(());
    }

    let config = get_barrel_config(ctx);
    if !config.expiry_enabled() {
        return Ok(());
    }

    let barrel_ids: Vec<u64> = ctx
        .db
        .death_barrel()
        .chunk_index()
        .filter(chunk_index)
        .map(|barrel| barrel.id)
        .collect();
    for barrel_id in barrel_ids {
        evaluate_barrel_expiry(ctx, barrel_id);
    }
    Ok(())
}

#[spacetimedb::reducer]
pub fn mark_chunk_unloaded(ctx: &ReducerContext, chunk_index: u32) -> Result<(), String> {
    set_chunk_resident(ctx, chunk_index, false);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: i64 = 300;
    const CREATED: i64 = 1_000_000_000;

    #[test]
    fn age_equal_to_ttl_is_not_expired() {
        let now = CREATED + TTL * 1_000_000;
        assert!(!is_expired(Some(CREATED), now, TTL));
    }

    #[test]
    fn age_just_past_ttl_is_expired() {
        let now = CREATED + TTL * 1_000_000 + 1;
        assert!(is_expired(Some(CREATED), now, TTL));
    }

    #[test]
    fn young_barrels_are_not_expired() {
        let now = CREATED + 10 * 1_000_000;
        assert!(!is_expired(Some(CREATED), now, TTL));
    }

    #[test]
    fn missing_creation_time_never_expires() {
        assert!(!is_expired(None, CREATED + 1_000_000_000_000, TTL));
    }

    #[test]
    fn non_positive_ttl_disables_expiry() {
        let now = CREATED + 1_000_000_000_000;
        assert!(!is_expired(Some(CREATED), now, -1));
        assert!(!is_expired(Some(CREATED), now, 0));
    }
}
