use spacetimedb::SpacetimeType;
use serde::{Serialize, Deserialize};

/// A stack of items as stored in barrel slots, player inventories and ground
/// drops. `item_data` carries opaque per-instance JSON (durability, water
/// content, etc.) and must match exactly for two stacks to merge.
#[derive(SpacetimeType, Clone, Debug, PartialEq)]
pub struct ItemStack {
    pub item_def_id: u64,
    pub quantity: u32,
    pub item_data: Option<String>,
}

/// The kind of GUI interaction a player performed on an open container view.
/// Mirrors the client's inventory action vocabulary; the server only cares
/// about which of these may move items *into* a death barrel.
#[derive(SpacetimeType, Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub enum ClickAction {
    PickupAll,
    PickupSome,
    PickupOne,
    PickupHalf,
    CloneStack,
    CollectToCursor,
    HotbarMoveAndReadd,
    Nothing,
    MoveToOtherInventory,
    SwapWithCursor,
    HotbarSwap,
    PlaceAll,
    PlaceSome,
    PlaceOne,
    DropAllCursor,
    DropOneCursor,
    DropAllSlot,
    DropOneSlot,
    Unknown,
}

/// Why an interaction was refused.
#[derive(SpacetimeType, Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub enum DenyReason {
    /// Protection is on and the actor is neither the owner nor a bypass holder.
    NotOwner,
    /// The action would insert items into a death barrel (withdraw-only vault).
    InsertForbidden,
    /// Automated item transfer with a death barrel endpoint.
    TransferForbidden,
}

/// Outcome of an access check. Pure data so the rules can be unit tested
/// without a reducer context.
#[derive(SpacetimeType, Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}
