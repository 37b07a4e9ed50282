//! Asynchronous chunk fetches for expiry checks that land on a barrel in a
//! non-resident chunk. The fetch is a scheduled one-shot: the completion
//! reducer marks the chunk resident and re-enters the expiry evaluation in
//! the same transaction, so the check always runs against loaded state.

use spacetimedb::spacetimedb_lib::ScheduleAt;
use spacetimedb::{ReducerContext, Table};
use std::time::Duration;
use log;

use crate::expiry::{evaluate_barrel_expiry, set_chunk_resident};

/// Simulated chunk load latency.
const CHUNK_FETCH_DELAY_MS: u64 = 100;

#[spacetimedb::table(name = chunk_fetch_schedule, scheduled(process_chunk_fetch))]
pub struct ChunkFetchSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub chunk_index: u32,
    /// The barrel whose expiry check is waiting on this chunk.
    pub barrel_id: u64,
    pub scheduled_at: ScheduleAt,
}

/// Queues a chunk load on behalf of a deferred expiry check.
pub(crate) fn request_chunk_for_expiry(ctx: &ReducerContext, chunk_index: u32, barrel_id: u64) {
    let fire_at = ctx.timestamp + Duration::from_millis(CHUNK_FETCH_DELAY_MS);
    crate::try_insert_schedule!(
        ctx.db.chunk_fetch_schedule(),
        ChunkFetchSchedule {
            id: 0,
            chunk_index,
            barrel_id,
            scheduled_at: ScheduleAt::Time(fire_at),
        },
        "Chunk fetch"
    );
}

/// Fetch completion: the chunk is now resident, and the waiting barrel's
/// expiry check runs immediately. The barrel having disappeared in the
/// meantime is fine; the evaluation is a no-op then.
#[spacetimedb::reducer]
pub fn process_chunk_fetch(ctx: &ReducerContext, fetch: ChunkFetchSchedule) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("process_chunk_fetch may only be invoked by the scheduler.".to_string());
    }

    log::debug!(
        "[ChunkFetch] Chunk {} loaded for barrel {} expiry check.",
        fetch.chunk_index, fetch.barrel_id
    );
    set_chunk_resident(ctx, fetch.chunk_index, true);
    evaluate_barrel_expiry(ctx, fetch.barrel_id);
    Ok(())
}
