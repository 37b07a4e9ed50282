//! User-facing notice templates and delivery.
//!
//! Templates are externally configurable strings with positional `{0}`,
//! `{1}`, ... placeholders. Substitution is plain text replacement: an
//! unresolved placeholder stays verbatim, and a missing template never
//! panics the caller (a visible sentinel is substituted instead).

use spacetimedb::{Identity, ReducerContext, Table};
use log;

use crate::PrivateMessage;
use crate::private_message as PrivateMessageTableTrait;

pub const MSG_DEATH_LOCATION: &str = "deathLocation";
pub const MSG_BARREL_CREATED: &str = "barrelCreated";
pub const MSG_PROTECTED_BREAK: &str = "barrelProtectedBreak";
pub const MSG_PROTECTED_OPEN: &str = "barrelProtectedOpen";

pub const SYSTEM_SENDER: &str = "SYSTEM";

#[spacetimedb::table(name = message_template, public)]
#[derive(Clone, Debug)]
pub struct MessageTemplate {
    #[primary_key]
    pub key: String,
    pub template: String,
}

/// Seeds default templates for any key that is missing. Idempotent, and
/// deliberately per-key so operator overrides survive module updates.
pub fn seed_message_templates(ctx: &ReducerContext) -> Result<(), String> {
    let templates = ctx.db.message_template();

    let defaults = [
        (MSG_DEATH_LOCATION, "You died at [{0}, {1}, {2}]"),
        (MSG_BARREL_CREATED, "Created death barrel."),
        (
            MSG_PROTECTED_BREAK,
            "This barrel is locked. Only the owner can break it.",
        ),
        (
            MSG_PROTECTED_OPEN,
            "This barrel is locked. Only the owner can access it.",
        ),
    ];

    for (key, template) in defaults {
        if templates.key().find(key.to_string()).is_none() {
            templates
                .try_insert(MessageTemplate {
                    key: key.to_string(),
                    template: template.to_string(),
                })
                .map_err(|e| format!("Failed to seed message template '{}': {}", key, e))?;
        }
    }
    Ok(())
}

/// Admin reducer to override a notice template.
#[spacetimedb::reducer]
pub fn set_message_template(ctx: &ReducerContext, key: String, template: String) -> Result<(), String> {
    let templates = ctx.db.message_template();
    if templates.key().find(key.clone()).is_some() {
        templates.key().update(MessageTemplate { key: key.clone(), template });
    } else {
        templates
            .try_insert(MessageTemplate { key: key.clone(), template })
            .map_err(|e| format!("Failed to insert message template '{}': {}", key, e))?;
    }
    log::info!("[Messages] Template '{}' updated.", key);
    Ok(())
}

pub fn get_template(ctx: &ReducerContext, key: &str) -> Option<String> {
    ctx.db
        .message_template()
        .key()
        .find(key.to_string())
        .map(|row| row.template)
}

/// Substitutes positional args into a raw template. `None` yields a visible
/// invalid-message sentinel rather than crashing the caller; placeholders
/// with no matching arg are left verbatim.
pub fn fill_args(raw: Option<&str>, args: &[&str]) -> String {
    let Some(raw) = raw else {
        return "Invalid message: null".to_string();
    };
    if raw.is_empty() {
        return String::new();
    }
    let mut filled = raw.to_string();
    for (i, arg) in args.iter().enumerate() {
        filled = filled.replace(&format!("{{{}}}", i), arg);
    }
    filled
}

/// Renders a template by key and delivers it to one player as a private
/// system message.
pub fn send_templated_message(ctx: &ReducerContext, recipient: Identity, key: &str, args: &[&str]) {
    let template = get_template(ctx, key);
    let text = fill_args(template.as_deref(), args);
    send_private_message(ctx, recipient, text);
}

pub fn send_private_message(ctx: &ReducerContext, recipient: Identity, text: String) {
    let messages = ctx.db.private_message();
    match messages.try_insert(PrivateMessage {
        id: 0,
        recipient_identity: recipient,
        sender_display_name: SYSTEM_SENDER.to_string(),
        text,
        sent: ctx.timestamp,
    }) {
        Ok(_) => {}
        Err(e) => log::error!("[Messages] Failed to deliver private message to {:?}: {}", recipient, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_positional_args_in_order() {
        assert_eq!(
            fill_args(Some("You died at [{0}, {1}, {2}]"), &["10", "64", "-3"]),
            "You died at [10, 64, -3]"
        );
    }

    #[test]
    fn missing_template_substitutes_sentinel() {
        assert_eq!(fill_args(None, &["1"]), "Invalid message: null");
    }

    #[test]
    fn empty_template_stays_empty() {
        assert_eq!(fill_args(Some(""), &["1"]), "");
    }

    #[test]
    fn unresolved_placeholders_are_left_verbatim() {
        assert_eq!(fill_args(Some("at {0} and {5}"), &["here"]), "at here and {5}");
    }

    #[test]
    fn no_args_returns_template_unchanged() {
        assert_eq!(fill_args(Some("Created death barrel."), &[]), "Created death barrel.");
    }

    #[test]
    fn repeated_placeholder_is_replaced_everywhere() {
        assert_eq!(fill_args(Some("{0}/{0}"), &["x"]), "x/x");
    }
}
