//! Item catalog and player-side inventory.
//!
//! The catalog (`item_definition`) is static data seeded once on module init.
//! Player items live in `player_item` rows; a death drains them, in slot
//! order, into the drop list handed to the barrel packer.

use spacetimedb::{Identity, ReducerContext, Table};
use log;

use crate::models::ItemStack;

/// Slots in a player inventory (main grid plus hotbar).
pub const NUM_PLAYER_SLOTS: u16 = 30;

#[spacetimedb::table(name = item_definition, public)]
#[derive(Clone, Debug)]
pub struct ItemDefinition {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[unique]
    pub name: String,
    pub is_stackable: bool,
    pub stack_size: u32,
}

#[spacetimedb::table(name = player_item, public)]
#[derive(Clone, Debug)]
pub struct PlayerItem {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub owner: Identity,
    pub slot: u16,
    pub stack: ItemStack,
}

/// Seeds the item catalog if it is empty. Idempotent.
#[spacetimedb::reducer]
pub fn seed_items(ctx: &ReducerContext) -> Result<(), String> {
    let items = ctx.db.item_definition();
    if items.iter().count() > 0 {
        log::debug!("Item definitions already seeded. Skipping.");
        return Ok(());
    }

    log::info!("Seeding initial item definitions...");

    // (name, stackable, stack_size)
    let initial_items = [
        ("Wood", true, 50),
        ("Stone", true, 50),
        ("Rope", true, 20),
        ("Cloth Scrap", true, 30),
        ("Bandage", true, 10),
        ("Torch", false, 1),
        ("Stone Hatchet", false, 1),
        ("Hunting Knife", false, 1),
        ("Wooden Arrow", true, 30),
        ("Dried Fish", true, 15),
        ("Water Flask", false, 1),
        ("Metal Fragments", true, 40),
    ];

    let mut seeded_count = 0;
    for (name, is_stackable, stack_size) in initial_items {
        let def = ItemDefinition {
            id: 0,
            name: name.to_string(),
            is_stackable,
            stack_size,
        };
        match items.try_insert(def) {
            Ok(_) => seeded_count += 1,
            Err(e) => log::error!("Failed to insert item definition '{}': {}", name, e),
        }
    }

    log::info!("Finished seeding {} item definitions.", seeded_count);
    Ok(())
}

/// Compares opaque per-item JSON payloads. Two stacks may only merge when the
/// payloads are structurally equal; malformed payloads fall back to a plain
/// string comparison.
pub fn same_item_data(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            match (
                serde_json::from_str::<serde_json::Value>(a),
                serde_json::from_str::<serde_json::Value>(b),
            ) {
                (Ok(va), Ok(vb)) => va == vb,
                _ => a == b,
            }
        }
        _ => false,
    }
}

fn find_free_slot(ctx: &ReducerContext, owner: Identity) -> Option<u16> {
    let occupied: Vec<u16> = ctx
        .db
        .player_item()
        .owner()
        .filter(owner)
        .map(|item| item.slot)
        .collect();
    (0..NUM_PLAYER_SLOTS).find(|slot| !occupied.contains(slot))
}

/// Adds a stack to a player's inventory, merging onto existing stacks of the
/// same definition (and identical `item_data`) first. Returns `Ok(false)`
/// when the inventory cannot hold the remainder; the caller decides what to
/// do with it (typically scatter it on the ground).
pub fn add_item_to_player_inventory(
    ctx: &ReducerContext,
    owner: Identity,
    mut stack: ItemStack,
) -> Result<bool, String> {
    let item_defs = ctx.db.item_definition();
    let player_items = ctx.db.player_item();

    let def = item_defs
        .id()
        .find(stack.item_def_id)
        .ok_or_else(|| format!("Item definition {} not found", stack.item_def_id))?;

    if def.is_stackable {
        let candidates: Vec<PlayerItem> = player_items.owner().filter(owner).collect();
        for mut existing in candidates {
            if existing.stack.item_def_id != stack.item_def_id
                || existing.stack.quantity >= def.stack_size
                || !same_item_data(&existing.stack.item_data, &stack.item_data)
            {
                continue;
            }
            let space = def.stack_size - existing.stack.quantity;
            let moved = space.min(stack.quantity);
            existing.stack.quantity += moved;
            player_items.id().update(existing);
            stack.quantity -= moved;
            if stack.quantity == 0 {
                return Ok(true);
            }
        }
    }

    while stack.quantity > 0 {
        let Some(slot) = find_free_slot(ctx, owner) else {
            log::warn!(
                "[Inventory] Player {:?} has no free slot for {} x item {}",
                owner, stack.quantity, stack.item_def_id
            );
            return Ok(false);
        };
        let placed_quantity = stack.quantity.min(def.stack_size);
        player_items.insert(PlayerItem {
            id: 0,
            owner,
            slot,
            stack: ItemStack {
                item_def_id: stack.item_def_id,
                quantity: placed_quantity,
                item_data: stack.item_data.clone(),
            },
        });
        stack.quantity -= placed_quantity;
    }

    Ok(true)
}

/// Gives a freshly registered player their starting kit. Missing catalog
/// entries are logged and skipped rather than failing registration.
pub fn grant_starting_items(ctx: &ReducerContext, owner: Identity) -> Result<(), String> {
    let item_defs = ctx.db.item_definition();
    let starting_kit = [("Torch", 1u32), ("Bandage", 3), ("Wood", 10)];

    for (name, quantity) in starting_kit {
        let Some(def) = item_defs.name().find(&name.to_string()) else {
            log::error!("[Inventory] Starting item '{}' is missing from the catalog.", name);
            continue;
        };
        let granted = add_item_to_player_inventory(
            ctx,
            owner,
            ItemStack { item_def_id: def.id, quantity, item_data: None },
        )?;
        if !granted {
            log::warn!("[Inventory] No room for starting item '{}' for {:?}.", name, owner);
        }
    }
    Ok(())
}

/// Drains a player's entire inventory into an ordered drop list. Items come
/// out in slot order so later packing is deterministic; the source rows are
/// deleted.
pub fn collect_death_drops(ctx: &ReducerContext, owner: Identity) -> Vec<ItemStack> {
    let player_items = ctx.db.player_item();
    let mut rows: Vec<PlayerItem> = player_items.owner().filter(owner).collect();
    rows.sort_by_key(|item| item.slot);

    let mut drops = Vec::with_capacity(rows.len());
    for row in rows {
        drops.push(row.stack.clone());
        player_items.id().delete(row.id);
    }

    log::info!("[Death] Collected {} drop stacks from player {:?}", drops.len(), owner);
    drops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_data_none_matches_none_only() {
        assert!(same_item_data(&None, &None));
        assert!(!same_item_data(&None, &Some("{}".to_string())));
        assert!(!same_item_data(&Some("{}".to_string()), &None));
    }

    #[test]
    fn item_data_compares_structurally() {
        let a = Some(r#"{"water":3,"dirty":false}"#.to_string());
        let b = Some(r#"{"dirty":false,"water":3}"#.to_string());
        assert!(same_item_data(&a, &b));

        let c = Some(r#"{"water":4}"#.to_string());
        assert!(!same_item_data(&a, &c));
    }

    #[test]
    fn malformed_item_data_falls_back_to_string_equality() {
        let a = Some("not json".to_string());
        let b = Some("not json".to_string());
        let c = Some("also not json".to_string());
        assert!(same_item_data(&a, &b));
        assert!(!same_item_data(&a, &c));
    }
}
