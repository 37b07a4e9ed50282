//! # Death Barrel System
//!
//! When a player dies, their dropped items are packed into one or more
//! placed storage barrels at the death site instead of spilling on the
//! ground. Barrels carry their identity (owner, creation time, schema
//! version) on the row itself, so recognition survives restarts without a
//! separate registry.
//!
//! ## Key Features:
//! - Multi-barrel packing: drops are split across ceil(n / capacity)
//!   barrels stacked at increasing vertical offsets
//! - Placement respects external build protection (refusal stops packing,
//!   remaining drops fall to the ground)
//! - One-time identity stamp: owner and creation time are immutable
//! - Optional TTL expiry scheduling at creation

use spacetimedb::{Identity, ReducerContext, Table, Timestamp};
use log;

use crate::models::ItemStack;
use crate::config::get_barrel_config;
use crate::permissions::{has_permission, PERM_USE};
use crate::messages::{send_templated_message, MSG_BARREL_CREATED, MSG_DEATH_LOCATION};
use crate::items::collect_death_drops;
use crate::dropped_item::scatter_drops;
use crate::expiry::{schedule_barrel_expiry, set_chunk_resident};
use crate::utils::calculate_chunk_index;
use crate::{Player, TILE_SIZE_PX, WORLD_HEIGHT_PX, WORLD_WIDTH_PX};

/// Slots per barrel. A deployment constant: every barrel has exactly this
/// many slots and packing math assumes it is positive.
pub const BARREL_CAPACITY: usize = 27;
/// Vertical spacing between stacked barrels from one death.
pub const BARREL_STACK_OFFSET_PX: f32 = 48.0;
/// Written into each barrel's identity at stamp time.
pub const BARREL_SCHEMA_VERSION: &str = env!("CARGO_PKG_VERSION");

#[spacetimedb::table(name = death_barrel, public)]
#[derive(Clone, Debug)]
pub struct DeathBarrel {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub pos_x: f32,
    pub pos_y: f32,
    #[index(btree)]
    pub chunk_index: u32,
    /// Presence flag. False only in the short window between placement and
    /// stamping; every interaction checks it.
    pub is_death_barrel: bool,
    pub schema_version: String,
    /// None marks a legacy barrel with no recorded creation time; such
    /// barrels are exempt from expiry.
    pub created_at: Option<Timestamp>,
    pub owner_identity: Option<Identity>,
    /// Fixed-size ordered slot array of length [`BARREL_CAPACITY`].
    pub slots: Vec<Option<ItemStack>>,
}

/// Rectangular regions where block placement is externally vetoed
/// (build-protected land claims, monument clearances and the like).
#[spacetimedb::table(name = protected_zone, public)]
#[derive(Clone, Debug)]
pub struct ProtectedZone {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// Admin reducer to register a build-protected region.
#[spacetimedb::reducer]
pub fn add_protected_zone(
    ctx: &ReducerContext,
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
) -> Result<(), String> {
    ctx.db
        .protected_zone()
        .try_insert(ProtectedZone { id: 0, min_x, min_y, max_x, max_y })
        .map_err(|e| format!("Failed to add protected zone: {}", e))?;
    log::info!(
        "[ProtectedZone] Added zone ({:.1},{:.1})-({:.1},{:.1})",
        min_x, min_y, max_x, max_y
    );
    Ok(())
}

// --- Placement ---

/// The external placement veto: out-of-world positions and positions inside
/// a protected zone are refused. Refusal is an expected outcome, not an
/// error, and is never retried.
pub fn placement_allowed(ctx: &ReducerContext, _actor: Identity, pos_x: f32, pos_y: f32) -> bool {
    if pos_x < 0.0 || pos_y < 0.0 || pos_x >= WORLD_WIDTH_PX || pos_y >= WORLD_HEIGHT_PX {
        return false;
    }
    for zone in ctx.db.protected_zone().iter() {
        if pos_x >= zone.min_x && pos_x <= zone.max_x && pos_y >= zone.min_y && pos_y <= zone.max_y {
            return false;
        }
    }
    true
}

/// Places an empty, not-yet-stamped barrel block at the given position,
/// going through the external veto as `actor`. Returns None on refusal.
fn place_barrel(ctx: &ReducerContext, actor: Identity, pos_x: f32, pos_y: f32) -> Option<DeathBarrel> {
    if !placement_allowed(ctx, actor, pos_x, pos_y) {
        log::info!(
            "[BarrelPlace] Placement refused at ({:.1}, {:.1}) for {:?}.",
            pos_x, pos_y, actor
        );
        return None;
    }

    let chunk_index = calculate_chunk_index(pos_x, pos_y);
    let barrel = DeathBarrel {
        id: 0,
        pos_x,
        pos_y,
        chunk_index,
        is_death_barrel: false,
        schema_version: String::new(),
        created_at: None,
        owner_identity: None,
        slots: vec![None; BARREL_CAPACITY],
    };

    match ctx.db.death_barrel().try_insert(barrel) {
        Ok(inserted) => {
            // The placing player is standing here, so the chunk is loaded.
            set_chunk_resident(ctx, chunk_index, true);
            Some(inserted)
        }
        Err(e) => {
            log::error!("[BarrelPlace] Failed to insert barrel: {}", e);
            None
        }
    }
}

// --- ContainerIdentity ---

/// One-time write of the identity fields, immediately after placement.
/// Stamping an already-stamped barrel is a logged no-op: owner and creation
/// time are immutable for the barrel's lifetime.
pub fn stamp(ctx: &ReducerContext, barrel_id: u64, owner: Identity) -> Result<(), String> {
    let barrels = ctx.db.death_barrel();
    let mut barrel = barrels
        .id()
        .find(barrel_id)
        .ok_or_else(|| format!("Barrel {} not found for stamping.", barrel_id))?;

    if barrel.is_death_barrel {
        log::warn!("[BarrelStamp] Barrel {} is already stamped, ignoring.", barrel_id);
        return Ok(());
    }

    barrel.is_death_barrel = true;
    barrel.schema_version = BARREL_SCHEMA_VERSION.to_string();
    barrel.created_at = Some(ctx.timestamp);
    barrel.owner_identity = Some(owner);
    barrels.id().update(barrel);
    Ok(())
}

/// True iff a barrel row exists at this id and carries the presence flag.
/// Safe to call with any id; a missing or unstamped row is simply not a
/// death barrel.
pub fn is_death_barrel(ctx: &ReducerContext, barrel_id: u64) -> bool {
    ctx.db
        .death_barrel()
        .id()
        .find(barrel_id)
        .map(|barrel| barrel.is_death_barrel)
        .unwrap_or(false)
}

/// The stamped owner, or None for unstamped and legacy barrels.
pub fn owner_of(ctx: &ReducerContext, barrel_id: u64) -> Option<Identity> {
    ctx.db
        .death_barrel()
        .id()
        .find(barrel_id)
        .and_then(|barrel| barrel.owner_identity)
}

/// Seconds since the barrel was stamped, or None for legacy barrels with no
/// recorded creation time.
pub fn barrel_age_seconds(barrel: &DeathBarrel, now: Timestamp) -> Option<i64> {
    barrel.created_at.map(|created| {
        (now.to_micros_since_unix_epoch() - created.to_micros_since_unix_epoch()) / 1_000_000
    })
}

pub fn barrel_is_empty(barrel: &DeathBarrel) -> bool {
    barrel.slots.iter().all(|slot| slot.is_none())
}

/// Terminal removal: the barrel block reverts to empty space and its
/// identity ceases to exist. Safe to call twice; the second call is a no-op.
pub(crate) fn remove_barrel(ctx: &ReducerContext, barrel_id: u64, reason: &str) {
    let barrels = ctx.db.death_barrel();
    if barrels.id().find(barrel_id).is_some() {
        barrels.id().delete(barrel_id);
        log::info!("[BarrelRemove] Removed barrel {} ({}).", barrel_id, reason);
    }
}

// --- DropPacker ---

/// Containers needed for `n` drops at the given capacity.
pub fn required_barrels(drop_count: usize, capacity: usize) -> usize {
    drop_count.div_ceil(capacity)
}

/// Removes up to `capacity` stacks from the front of the drop list and lays
/// them into a fresh slot array, preserving order. The remainder stays in
/// the list for the next barrel (or for ground-drop fallback).
pub fn fill_partition(drops: &mut Vec<ItemStack>, capacity: usize) -> Vec<Option<ItemStack>> {
    let mut slots: Vec<Option<ItemStack>> = vec![None; capacity];
    let take = capacity.min(drops.len());
    for (slot, stack) in drops.drain(..take).enumerate() {
        slots[slot] = Some(stack);
    }
    slots
}

/// Creates death barrels at the death site and moves drops into them.
///
/// Barrels stack upward from `origin` in [`BARREL_STACK_OFFSET_PX`] steps. A
/// refused placement stops the loop immediately: drops for that barrel and
/// all later ones remain in `drops`, untouched and in order, for the caller
/// to handle. Returns the number of barrels actually placed.
pub fn create_death_barrels(
    ctx: &ReducerContext,
    owner: Identity,
    drops: &mut Vec<ItemStack>,
    origin_x: f32,
    origin_y: f32,
) -> Result<u32, String> {
    if drops.is_empty() {
        return Ok(0);
    }

    let config = get_barrel_config(ctx);
    let barrel_count = required_barrels(drops.len(), BARREL_CAPACITY);
    let mut placed_count: u32 = 0;

    for i in 0..barrel_count {
        let pos_y = origin_y - (i as f32) * BARREL_STACK_OFFSET_PX;
        let Some(barrel) = place_barrel(ctx, owner, origin_x, pos_y) else {
            // Refusal is terminal for this death; leftover drops fall to the
            // ground via the caller.
            break;
        };
        placed_count += 1;

        stamp(ctx, barrel.id, owner)?;

        let slots = fill_partition(drops, BARREL_CAPACITY);
        let barrels = ctx.db.death_barrel();
        if let Some(mut stored) = barrels.id().find(barrel.id) {
            stored.slots = slots;
            barrels.id().update(stored);
        }

        if config.expiry_enabled() {
            schedule_barrel_expiry(ctx, barrel.id, config.remove_barrels_after_seconds);
        }

        log::info!(
            "[BarrelPlace] Placed death barrel {} at ({:.1}, {:.1}) for {:?}.",
            barrel.id, origin_x, pos_y, owner
        );
    }

    Ok(placed_count)
}

/// Death entry point: drains the dead player's inventory, packs it into
/// barrels, and scatters whatever could not be stored. Gated on the use
/// permission; without it the drops go straight to the ground.
pub fn handle_player_death(ctx: &ReducerContext, player: &Player) -> Result<(), String> {
    let death_x = player.position_x;
    let death_y = player.position_y;

    let mut drops = collect_death_drops(ctx, player.identity);

    let placed = if has_permission(ctx, player.identity, PERM_USE) {
        create_death_barrels(ctx, player.identity, &mut drops, death_x, death_y)?
    } else {
        log::debug!(
            "[Death] Player {:?} lacks '{}', skipping barrel creation.",
            player.identity, PERM_USE
        );
        0
    };

    if !drops.is_empty() {
        log::info!(
            "[Death] {} drop stacks did not fit in barrels, scattering on the ground.",
            drops.len()
        );
        scatter_drops(ctx, drops, death_x, death_y);
    }

    let tile_x = ((death_x / TILE_SIZE_PX as f32).floor() as i32).to_string();
    let tile_y = ((death_y / TILE_SIZE_PX as f32).floor() as i32).to_string();
    let chunk = calculate_chunk_index(death_x, death_y).to_string();
    send_templated_message(
        ctx,
        player.identity,
        MSG_DEATH_LOCATION,
        &[tile_x.as_str(), tile_y.as_str(), chunk.as_str()],
    );
    if placed > 0 {
        send_templated_message(ctx, player.identity, MSG_BARREL_CREATED, &[]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(def: u64) -> ItemStack {
        ItemStack { item_def_id: def, quantity: 1, item_data: None }
    }

    fn drop_list(n: u64) -> Vec<ItemStack> {
        (0..n).map(stack).collect()
    }

    #[test]
    fn required_barrels_is_ceiling_division() {
        assert_eq!(required_barrels(0, 27), 0);
        assert_eq!(required_barrels(1, 27), 1);
        assert_eq!(required_barrels(27, 27), 1);
        assert_eq!(required_barrels(28, 27), 2);
        assert_eq!(required_barrels(54, 27), 2);
        assert_eq!(required_barrels(55, 27), 3);
    }

    #[test]
    fn fill_partition_takes_from_the_front_in_order() {
        let mut drops = drop_list(5);
        let slots = fill_partition(&mut drops, 3);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].as_ref().unwrap().item_def_id, 0);
        assert_eq!(slots[1].as_ref().unwrap().item_def_id, 1);
        assert_eq!(slots[2].as_ref().unwrap().item_def_id, 2);
        // Remainder untouched and in original order.
        assert_eq!(drops.len(), 2);
        assert_eq!(drops[0].item_def_id, 3);
        assert_eq!(drops[1].item_def_id, 4);
    }

    #[test]
    fn fill_partition_pads_the_tail_with_empty_slots() {
        let mut drops = drop_list(2);
        let slots = fill_partition(&mut drops, 27);
        assert!(drops.is_empty());
        assert_eq!(slots.iter().filter(|slot| slot.is_some()).count(), 2);
        assert!(slots[2..].iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn fill_partition_on_empty_list_is_all_empty() {
        let mut drops: Vec<ItemStack> = Vec::new();
        let slots = fill_partition(&mut drops, 27);
        assert!(slots.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn fifty_drops_pack_into_two_ordered_barrels() {
        // capacity 27, 50 drops: barrel 1 holds items 0..=26, barrel 2 holds
        // 27..=49, list ends empty.
        let mut drops = drop_list(50);
        assert_eq!(required_barrels(drops.len(), BARREL_CAPACITY), 2);

        let first = fill_partition(&mut drops, BARREL_CAPACITY);
        let second = fill_partition(&mut drops, BARREL_CAPACITY);
        assert!(drops.is_empty());

        for (slot, item) in first.iter().enumerate() {
            assert_eq!(item.as_ref().unwrap().item_def_id, slot as u64);
        }
        for (slot, item) in second.iter().take(23).enumerate() {
            assert_eq!(item.as_ref().unwrap().item_def_id, 27 + slot as u64);
        }
        assert!(second[23..].iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn refusal_leaves_later_partitions_untouched() {
        // Simulates the k-th placement being refused: the packer simply stops
        // calling fill_partition, so the remainder must be intact.
        let mut drops = drop_list(60);
        let _first = fill_partition(&mut drops, BARREL_CAPACITY);
        assert_eq!(drops.len(), 33);
        for (index, item) in drops.iter().enumerate() {
            assert_eq!(item.item_def_id, 27 + index as u64);
        }
    }

    #[test]
    fn age_is_none_for_legacy_barrels() {
        let barrel = DeathBarrel {
            id: 1,
            pos_x: 0.0,
            pos_y: 0.0,
            chunk_index: 0,
            is_death_barrel: true,
            schema_version: "1.0.0".to_string(),
            created_at: None,
            owner_identity: None,
            slots: vec![None; BARREL_CAPACITY],
        };
        let now = Timestamp::from_micros_since_unix_epoch(1_000_000_000);
        assert_eq!(barrel_age_seconds(&barrel, now), None);
    }

    #[test]
    fn age_counts_whole_seconds_since_stamp() {
        let created = Timestamp::from_micros_since_unix_epoch(10_000_000);
        let barrel = DeathBarrel {
            id: 1,
            pos_x: 0.0,
            pos_y: 0.0,
            chunk_index: 0,
            is_death_barrel: true,
            schema_version: "1.0.0".to_string(),
            created_at: Some(created),
            owner_identity: None,
            slots: vec![None; BARREL_CAPACITY],
        };
        let now = Timestamp::from_micros_since_unix_epoch(10_000_000 + 90 * 1_000_000);
        assert_eq!(barrel_age_seconds(&barrel, now), Some(90));
    }

    #[test]
    fn emptiness_checks_every_slot() {
        let mut barrel = DeathBarrel {
            id: 1,
            pos_x: 0.0,
            pos_y: 0.0,
            chunk_index: 0,
            is_death_barrel: true,
            schema_version: "1.0.0".to_string(),
            created_at: None,
            owner_identity: None,
            slots: vec![None; BARREL_CAPACITY],
        };
        assert!(barrel_is_empty(&barrel));
        barrel.slots[26] = Some(stack(7));
        assert!(!barrel_is_empty(&barrel));
    }
}
