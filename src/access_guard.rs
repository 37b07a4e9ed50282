//! # Barrel Access Guard
//!
//! Mediates every interaction with a death barrel: opening, breaking,
//! slot clicks, drags and automated transfers. Death barrels are
//! withdraw-only — no one, the owner included, may insert items. With
//! protection enabled, non-owners without the bypass permission may not
//! open or break a barrel at all.
//!
//! The decision logic is pure (no database access) so the allow/deny
//! tables can be tested exhaustively; the reducers wrap those decisions
//! with row lookups and distance checks.

use spacetimedb::{ReducerContext, Table};
use log;

use crate::models::{AccessDecision, ClickAction, DenyReason, ItemStack};
use crate::config::get_barrel_config;
use crate::death_barrel::{
    barrel_is_empty, remove_barrel, DeathBarrel, BARREL_CAPACITY,
};
use crate::death_barrel::death_barrel as DeathBarrelTableTrait;
use crate::dropped_item::scatter_drops;
use crate::dropped_item::dropped_item as DroppedItemTableTrait;
use crate::items::add_item_to_player_inventory;
use crate::messages::{send_templated_message, MSG_PROTECTED_BREAK, MSG_PROTECTED_OPEN};
use crate::permissions::{has_permission, PERM_BYPASS_PROTECTION};
use crate::utils::get_distance_squared;
use crate::{Player, player as PlayerTableTrait};

/// How far away a player can interact with a barrel.
const BARREL_INTERACTION_DISTANCE: f32 = 96.0;
const BARREL_INTERACTION_DISTANCE_SQUARED: f32 =
    BARREL_INTERACTION_DISTANCE * BARREL_INTERACTION_DISTANCE;

/// How far from a player an explosive can be set off.
const DETONATION_TRIGGER_RANGE: f32 = 256.0;
const DETONATION_TRIGGER_RANGE_SQUARED: f32 =
    DETONATION_TRIGGER_RANGE * DETONATION_TRIGGER_RANGE;

// --- Pure decision logic ---

/// Owner/protection gate for opening or breaking a barrel. With protection
/// off everyone passes; with it on, only the owner and bypass holders do.
pub fn decide_guarded_access(
    is_owner: bool,
    protection_enabled: bool,
    has_bypass: bool,
) -> AccessDecision {
    if !protection_enabled || is_owner || has_bypass {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny(DenyReason::NotOwner)
    }
}

/// Per-click verdict for an open barrel UI. `clicked_container_slot` is true
/// when the clicked slot belongs to the barrel rather than the player's own
/// inventory.
///
/// Anything that would land items in a barrel slot is denied; taking items
/// out, inspecting and cursor-only actions pass. Dropping straight from a
/// slot is denied on both sides while the barrel view is open, cursor drops
/// are not. Unrecognized actions are denied outright rather than risking a
/// silent insertion.
pub fn decide_click(action: ClickAction, clicked_container_slot: bool) -> AccessDecision {
    use ClickAction::*;
    let denied = match action {
        // Insertions into a barrel slot.
        PlaceAll | PlaceSome | PlaceOne | SwapWithCursor | HotbarSwap => clicked_container_slot,
        // Shift-click from the player's own inventory would land in the barrel.
        MoveToOtherInventory => !clicked_container_slot,
        DropAllSlot | DropOneSlot | Unknown => true,
        // Withdrawals, cursor drops and cursor-only actions.
        PickupAll | PickupSome | PickupOne | PickupHalf | CloneStack | CollectToCursor
        | HotbarMoveAndReadd | DropAllCursor | DropOneCursor | Nothing => false,
    };
    if denied {
        AccessDecision::Deny(DenyReason::InsertForbidden)
    } else {
        AccessDecision::Allow
    }
}

/// Verdict for a drag spanning `raw_slots`. Slot indices below the barrel's
/// capacity address barrel slots, so any such index means the drag would
/// deposit items there.
pub fn decide_drag(raw_slots: &[u16], capacity: u16) -> AccessDecision {
    if raw_slots.iter().any(|&slot| slot < capacity) {
        AccessDecision::Deny(DenyReason::InsertForbidden)
    } else {
        AccessDecision::Allow
    }
}

/// Verdict for an automated (hopper-style) item move. Any transfer touching
/// a death barrel on either end is cancelled: pushing in breaks the
/// withdraw-only invariant, and automated pull-out would drain a death's
/// loot with nobody present.
pub fn decide_automated_transfer(source_is_barrel: bool, dest_is_barrel: bool) -> AccessDecision {
    if source_is_barrel || dest_is_barrel {
        AccessDecision::Deny(DenyReason::TransferForbidden)
    } else {
        AccessDecision::Allow
    }
}

/// Whether a player standing at (player_x, player_y) may set off an
/// explosive centered at (blast_x, blast_y).
pub fn within_detonation_trigger_range(
    player_x: f32,
    player_y: f32,
    blast_x: f32,
    blast_y: f32,
) -> bool {
    get_distance_squared(player_x, player_y, blast_x, blast_y)
        <= DETONATION_TRIGGER_RANGE_SQUARED
}

// --- Reducer plumbing ---

/// Common validation for barrel interactions: sender is a live registered
/// player, the barrel exists and is stamped, and the player is close enough.
fn validate_barrel_interaction(
    ctx: &ReducerContext,
    barrel_id: u64,
) -> Result<(Player, DeathBarrel), String> {
    let player = ctx
        .db
        .player()
        .identity()
        .find(ctx.sender)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Cannot interact while dead.".to_string());
    }

    let barrel = ctx
        .db
        .death_barrel()
        .id()
        .find(barrel_id)
        .ok_or_else(|| format!("Barrel {} not found.", barrel_id))?;
    if !barrel.is_death_barrel {
        return Err(format!("Barrel {} is not a death barrel.", barrel_id));
    }

    let dist_sq = get_distance_squared(
        player.position_x,
        player.position_y,
        barrel.pos_x,
        barrel.pos_y,
    );
    if dist_sq > BARREL_INTERACTION_DISTANCE_SQUARED {
        return Err("Too far away.".to_string());
    }

    Ok((player, barrel))
}

/// Applies the configured protection policy for this player and barrel.
/// A barrel with no stamped owner treats everyone as a non-owner
/// (fail-closed), so only bypass holders reach protected legacy barrels.
fn guard_access(ctx: &ReducerContext, player: &Player, barrel: &DeathBarrel) -> AccessDecision {
    let config = get_barrel_config(ctx);
    let is_owner = barrel.owner_identity.map_or(false, |owner| owner == player.identity);
    let has_bypass = has_permission(ctx, player.identity, PERM_BYPASS_PROTECTION);
    decide_guarded_access(is_owner, config.protect_from_other_players, has_bypass)
}

/// Opens a barrel. The actual UI lives client-side; this reducer is the
/// authorization check, and a denial also notifies the player.
#[spacetimedb::reducer]
pub fn open_barrel(ctx: &ReducerContext, barrel_id: u64) -> Result<(), String> {
    let (player, barrel) = validate_barrel_interaction(ctx, barrel_id)?;

    if !guard_access(ctx, &player, &barrel).is_allowed() {
        send_templated_message(ctx, player.identity, MSG_PROTECTED_OPEN, &[]);
        return Err("This barrel is protected.".to_string());
    }

    log::debug!("[BarrelOpen] Player {:?} opened barrel {}.", player.identity, barrel_id);
    Ok(())
}

/// Closes a barrel. With remove-on-empty enabled, closing an emptied barrel
/// removes the block. The barrel having already vanished is not an error.
#[spacetimedb::reducer]
pub fn close_barrel(ctx: &ReducerContext, barrel_id: u64) -> Result<(), String> {
    let barrels = ctx.db.death_barrel();
    let Some(barrel) = barrels.id().find(barrel_id) else {
        return Ok(());
    };
    if !barrel.is_death_barrel {
        return Ok(());
    }

    let config = get_barrel_config(ctx);
    if config.remove_on_empty && barrel_is_empty(&barrel) {
        remove_barrel(ctx, barrel_id, "emptied and closed");
    }
    Ok(())
}

/// Takes the stack in `slot_index` out of the barrel and into the caller's
/// inventory. Fails without side effects when the inventory has no room.
#[spacetimedb::reducer]
pub fn withdraw_from_barrel(
    ctx: &ReducerContext,
    barrel_id: u64,
    slot_index: u16,
) -> Result<(), String> {
    let (player, mut barrel) = validate_barrel_interaction(ctx, barrel_id)?;

    if !guard_access(ctx, &player, &barrel).is_allowed() {
        send_templated_message(ctx, player.identity, MSG_PROTECTED_OPEN, &[]);
        return Err("This barrel is protected.".to_string());
    }

    let slot = slot_index as usize;
    if slot >= BARREL_CAPACITY {
        return Err(format!("Invalid barrel slot {}.", slot_index));
    }
    let stack = barrel.slots[slot]
        .clone()
        .ok_or_else(|| format!("Barrel slot {} is empty.", slot_index))?;

    if !add_item_to_player_inventory(ctx, player.identity, stack)? {
        return Err("Inventory is full.".to_string());
    }

    barrel.slots[slot] = None;
    ctx.db.death_barrel().id().update(barrel);
    log::debug!(
        "[BarrelWithdraw] Player {:?} withdrew slot {} from barrel {}.",
        player.identity, slot_index, barrel_id
    );
    Ok(())
}

/// Depositing is never allowed, for anyone. Present as an explicit reducer so
/// clients get a definitive refusal rather than a missing endpoint.
#[spacetimedb::reducer]
pub fn deposit_into_barrel(
    ctx: &ReducerContext,
    barrel_id: u64,
    _slot_index: u16,
    _stack: ItemStack,
) -> Result<(), String> {
    validate_barrel_interaction(ctx, barrel_id)?;
    Err("Death barrels are withdraw-only.".to_string())
}

/// Server-side check of a single UI click against the withdraw-only policy.
#[spacetimedb::reducer]
pub fn validate_barrel_click(
    ctx: &ReducerContext,
    barrel_id: u64,
    action: ClickAction,
    clicked_container_slot: bool,
) -> Result<(), String> {
    validate_barrel_interaction(ctx, barrel_id)?;
    match decide_click(action, clicked_container_slot) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Deny(_) => Err("Cannot place items into a death barrel.".to_string()),
    }
}

/// Server-side check of a drag gesture against the withdraw-only policy.
#[spacetimedb::reducer]
pub fn validate_barrel_drag(
    ctx: &ReducerContext,
    barrel_id: u64,
    raw_slots: Vec<u16>,
) -> Result<(), String> {
    validate_barrel_interaction(ctx, barrel_id)?;
    match decide_drag(&raw_slots, BARREL_CAPACITY as u16) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Deny(_) => Err("Cannot drag items into a death barrel.".to_string()),
    }
}

/// Server-side check of an automated (hopper-style) transfer between two
/// inventories, each endpoint optionally a placed container. A death barrel
/// on either end cancels the transfer.
#[spacetimedb::reducer]
pub fn validate_automated_transfer(
    ctx: &ReducerContext,
    source_container_id: Option<u64>,
    dest_container_id: Option<u64>,
) -> Result<(), String> {
    let is_barrel = |container_id: Option<u64>| {
        container_id.is_some_and(|id| crate::death_barrel::is_death_barrel(ctx, id))
    };
    match decide_automated_transfer(is_barrel(source_container_id), is_barrel(dest_container_id)) {
        AccessDecision::Allow => Ok(()),
        AccessDecision::Deny(_) => {
            Err("Automated transfers cannot touch a death barrel.".to_string())
        }
    }
}

/// Breaks a barrel block. The contents spill on the ground at the barrel's
/// position; the block itself never yields a barrel item, so death barrels
/// cannot be harvested.
#[spacetimedb::reducer]
pub fn break_barrel(ctx: &ReducerContext, barrel_id: u64) -> Result<(), String> {
    let (player, barrel) = validate_barrel_interaction(ctx, barrel_id)?;

    if !guard_access(ctx, &player, &barrel).is_allowed() {
        send_templated_message(ctx, player.identity, MSG_PROTECTED_BREAK, &[]);
        return Err("This barrel is protected.".to_string());
    }

    let contents: Vec<ItemStack> = barrel.slots.iter().flatten().cloned().collect();
    if !contents.is_empty() {
        scatter_drops(ctx, contents, barrel.pos_x, barrel.pos_y);
    }
    remove_barrel(ctx, barrel_id, "broken by player");
    log::info!(
        "[BarrelBreak] Player {:?} broke barrel {} (no block item dropped).",
        player.identity, barrel_id
    );
    Ok(())
}

/// An explosion centered at (x, y). Death barrels are blast-immune: any
/// stamped barrel in the radius is excluded from destruction so a death's
/// loot cannot be erased by a stray explosive. Loose dropped items in the
/// radius are destroyed.
#[spacetimedb::reducer]
pub fn detonate_explosive(
    ctx: &ReducerContext,
    pos_x: f32,
    pos_y: f32,
    radius: f32,
) -> Result<(), String> {
    let player = ctx
        .db
        .player()
        .identity()
        .find(ctx.sender)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Cannot detonate while dead.".to_string());
    }
    if !within_detonation_trigger_range(player.position_x, player.position_y, pos_x, pos_y) {
        return Err("Too far away to detonate there.".to_string());
    }

    let radius_sq = radius * radius;

    let shielded_barrels = ctx
        .db
        .death_barrel()
        .iter()
        .filter(|barrel| {
            barrel.is_death_barrel
                && get_distance_squared(pos_x, pos_y, barrel.pos_x, barrel.pos_y) <= radius_sq
        })
        .count();

    let destroyed_drops: Vec<u64> = ctx
        .db
        .dropped_item()
        .iter()
        .filter(|item| get_distance_squared(pos_x, pos_y, item.pos_x, item.pos_y) <= radius_sq)
        .map(|item| item.id)
        .collect();
    let destroyed_count = destroyed_drops.len();
    for item_id in destroyed_drops {
        ctx.db.dropped_item().id().delete(item_id);
    }

    log::info!(
        "[Explosion] Blast at ({:.1}, {:.1}) r={:.1}: {} barrels shielded, {} dropped items destroyed.",
        pos_x, pos_y, radius, shielded_barrels, destroyed_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClickAction::*;

    const ALL_ACTIONS: [ClickAction; 19] = [
        PickupAll, PickupSome, PickupOne, PickupHalf, CloneStack, CollectToCursor,
        HotbarMoveAndReadd, Nothing, MoveToOtherInventory, SwapWithCursor, HotbarSwap,
        PlaceAll, PlaceSome, PlaceOne, DropAllCursor, DropOneCursor, DropAllSlot,
        DropOneSlot, Unknown,
    ];

    #[test]
    fn guard_allows_everyone_when_protection_is_off() {
        assert!(decide_guarded_access(false, false, false).is_allowed());
        assert!(decide_guarded_access(true, false, false).is_allowed());
    }

    #[test]
    fn guard_with_protection_admits_owner_and_bypass_only() {
        assert!(decide_guarded_access(true, true, false).is_allowed());
        assert!(decide_guarded_access(false, true, true).is_allowed());
        assert_eq!(
            decide_guarded_access(false, true, false),
            AccessDecision::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn placement_actions_are_denied_on_barrel_slots_only() {
        for action in [PlaceAll, PlaceSome, PlaceOne, SwapWithCursor, HotbarSwap] {
            assert!(!decide_click(action, true).is_allowed(), "{:?} into barrel", action);
            assert!(decide_click(action, false).is_allowed(), "{:?} in own inventory", action);
        }
    }

    #[test]
    fn shift_click_is_denied_only_from_the_player_side() {
        // From the barrel it withdraws, from the player's inventory it would insert.
        assert!(decide_click(MoveToOtherInventory, true).is_allowed());
        assert!(!decide_click(MoveToOtherInventory, false).is_allowed());
    }

    #[test]
    fn unknown_actions_are_always_denied() {
        assert!(!decide_click(Unknown, true).is_allowed());
        assert!(!decide_click(Unknown, false).is_allowed());
    }

    #[test]
    fn withdrawals_and_cursor_drops_are_always_allowed() {
        for action in [
            PickupAll, PickupSome, PickupOne, PickupHalf, CloneStack, CollectToCursor,
            HotbarMoveAndReadd, DropAllCursor, DropOneCursor, Nothing,
        ] {
            assert!(decide_click(action, true).is_allowed(), "{:?} on barrel slot", action);
            assert!(decide_click(action, false).is_allowed(), "{:?} on own slot", action);
        }
    }

    #[test]
    fn slot_drops_are_denied_on_both_sides() {
        for action in [DropAllSlot, DropOneSlot] {
            assert!(!decide_click(action, true).is_allowed(), "{:?} on barrel slot", action);
            assert!(!decide_click(action, false).is_allowed(), "{:?} on own slot", action);
        }
    }

    #[test]
    fn every_action_has_a_verdict_on_both_sides() {
        for action in ALL_ACTIONS {
            for container in [true, false] {
                // Must not panic; both outcomes are legitimate.
                let _ = decide_click(action, container);
            }
        }
    }

    #[test]
    fn drag_is_denied_when_any_slot_touches_the_barrel() {
        assert!(decide_drag(&[27, 30, 50], 27).is_allowed());
        assert!(!decide_drag(&[26, 30], 27).is_allowed());
        assert!(!decide_drag(&[0], 27).is_allowed());
        assert!(decide_drag(&[], 27).is_allowed());
    }

    #[test]
    fn detonation_is_limited_to_nearby_blasts() {
        assert!(within_detonation_trigger_range(100.0, 100.0, 100.0, 100.0));
        assert!(within_detonation_trigger_range(100.0, 100.0, 100.0 + DETONATION_TRIGGER_RANGE, 100.0));
        assert!(!within_detonation_trigger_range(
            100.0,
            100.0,
            100.0 + DETONATION_TRIGGER_RANGE + 1.0,
            100.0
        ));
    }

    #[test]
    fn automated_transfers_touching_a_barrel_are_denied() {
        for (source, dest) in [(false, true), (true, false), (true, true)] {
            assert_eq!(
                decide_automated_transfer(source, dest),
                AccessDecision::Deny(DenyReason::TransferForbidden)
            );
        }
        assert!(decide_automated_transfer(false, false).is_allowed());
    }
}
