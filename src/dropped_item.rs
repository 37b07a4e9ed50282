//! Ground drops.
//!
//! The fallback destination for items that could not be stored in a death
//! barrel (refused placement, full inventory on withdrawal) and for contents
//! spilled when a barrel is broken. Drops despawn on a periodic sweep.

use spacetimedb::{ReducerContext, Table, Timestamp, TimeDuration};
use spacetimedb::spacetimedb_lib::ScheduleAt;
use std::time::Duration;
use log;
use rand::Rng;

use crate::models::ItemStack;
use crate::items::add_item_to_player_inventory;
use crate::player as PlayerTableTrait;
use crate::utils::{calculate_chunk_index, clamp_to_world, get_distance_squared};

const PICKUP_RADIUS: f32 = 120.0;
const PICKUP_RADIUS_SQUARED: f32 = PICKUP_RADIUS * PICKUP_RADIUS;
/// Ground drops vanish after half an hour.
const DROP_LIFETIME_SECS: i64 = 1800;
const DESPAWN_CHECK_INTERVAL_SECS: u64 = 60;

#[spacetimedb::table(name = dropped_item, public)]
#[derive(Clone, Debug)]
pub struct DroppedItem {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub stack: ItemStack,
    pub pos_x: f32,
    pub pos_y: f32,
    #[index(btree)]
    pub chunk_index: u32,
    pub created_at: Timestamp,
}

#[spacetimedb::table(name = dropped_item_despawn_schedule, scheduled(despawn_expired_drops))]
#[derive(Clone)]
pub struct DroppedItemDespawnSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

/// Arms the periodic despawn sweep. Called once from module init.
pub fn init_dropped_item_schedule(ctx: &ReducerContext) -> Result<(), String> {
    let schedule_table = ctx.db.dropped_item_despawn_schedule();
    if schedule_table.iter().count() == 0 {
        log::info!(
            "Initializing dropped item despawn sweep (every {}s).",
            DESPAWN_CHECK_INTERVAL_SECS
        );
        crate::try_insert_schedule!(
            schedule_table,
            DroppedItemDespawnSchedule {
                id: 0,
                scheduled_at: ScheduleAt::Interval(TimeDuration::from(Duration::from_secs(
                    DESPAWN_CHECK_INTERVAL_SECS,
                ))),
            },
            "Dropped item despawn"
        );
    }
    Ok(())
}

pub fn create_dropped_item_entity(
    ctx: &ReducerContext,
    stack: ItemStack,
    pos_x: f32,
    pos_y: f32,
) -> Result<(), String> {
    let chunk_index = calculate_chunk_index(pos_x, pos_y);
    ctx.db
        .dropped_item()
        .try_insert(DroppedItem {
            id: 0,
            stack,
            pos_x,
            pos_y,
            chunk_index,
            created_at: ctx.timestamp,
        })
        .map_err(|e| format!("Failed to create dropped item: {}", e))?;
    Ok(())
}

/// Scatters a list of stacks on the ground around a point, spreading them in
/// a loose ring so they do not pile on one pixel.
pub fn scatter_drops(ctx: &ReducerContext, drops: Vec<ItemStack>, center_x: f32, center_y: f32) {
    let count = drops.len().max(1);
    for (index, stack) in drops.into_iter().enumerate() {
        let angle = (index as f32) * (2.0 * std::f32::consts::PI / count as f32)
            + ctx.rng().gen_range(-0.5..0.5);
        let distance = ctx.rng().gen_range(30.0..60.0);
        // Deaths at the world border must not scatter past it.
        let (drop_x, drop_y) = clamp_to_world(
            center_x + angle.cos() * distance,
            center_y + angle.sin() * distance,
        );
        if let Err(e) = create_dropped_item_entity(ctx, stack, drop_x, drop_y) {
            log::error!("[Drops] Failed to scatter drop: {}", e);
        }
    }
}

/// Called by the client when a player tries to pick up a ground drop.
#[spacetimedb::reducer]
pub fn pickup_dropped_item(ctx: &ReducerContext, dropped_item_id: u64) -> Result<(), String> {
    let sender_id = ctx.sender;
    let dropped_items = ctx.db.dropped_item();

    let player = ctx
        .db
        .player()
        .identity()
        .find(&sender_id)
        .ok_or_else(|| "Player not found.".to_string())?;

    let dropped_item = dropped_items
        .id()
        .find(dropped_item_id)
        .ok_or_else(|| format!("Dropped item {} not found.", dropped_item_id))?;

    let distance_sq = get_distance_squared(
        player.position_x,
        player.position_y,
        dropped_item.pos_x,
        dropped_item.pos_y,
    );
    if distance_sq > PICKUP_RADIUS_SQUARED {
        return Err("Too far away to pick up the item.".to_string());
    }

    let stack = dropped_item.stack.clone();
    let added = add_item_to_player_inventory(ctx, sender_id, stack.clone())?;
    if added {
        dropped_items.id().delete(dropped_item_id);
        log::info!(
            "[PickupDropped] Player {:?} picked up drop {} (item {}, qty {}).",
            sender_id, dropped_item_id, stack.item_def_id, stack.quantity
        );
        Ok(())
    } else {
        Err("Inventory is full.".to_string())
    }
}

/// Periodic sweep removing drops past their lifetime.
#[spacetimedb::reducer]
pub fn despawn_expired_drops(
    ctx: &ReducerContext,
    _schedule: DroppedItemDespawnSchedule,
) -> Result<(), String> {
    if ctx.sender != ctx.identity() {
        return Err("despawn_expired_drops may only be called by the scheduler.".to_string());
    }

    let now_micros = ctx.timestamp.to_micros_since_unix_epoch();
    let dropped_items = ctx.db.dropped_item();

    let expired: Vec<u64> = dropped_items
        .iter()
        .filter(|drop| {
            let age_secs =
                (now_micros - drop.created_at.to_micros_since_unix_epoch()) / 1_000_000;
            age_secs > DROP_LIFETIME_SECS
        })
        .map(|drop| drop.id)
        .collect();

    let removed = expired.len();
    for id in expired {
        dropped_items.id().delete(id);
    }
    if removed > 0 {
        log::info!("[Drops] Despawned {} expired ground drops.", removed);
    }
    Ok(())
}
