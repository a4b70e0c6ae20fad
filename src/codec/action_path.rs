//! Action path and step identifier encoding.
//!
//! An action path addresses a step between the definition pull and the
//! result push. Top-level steps and group placements use 8 lowercase hex
//! characters. Group members use 16: the placement prefix followed by the
//! member id. Each 8-char component encodes one 32-bit id, so paths cannot
//! collide for ids in that range.
//!
//! Step identifiers are the human-facing companion: decimal for top-level
//! steps, `"{group};{member}"` in unpadded hex for group members.

use std::borrow::Cow;

/// Length of a top-level or group-placement path
pub const LEAF_PATH_LEN: usize = 8;

/// Length of a group-member path
pub const MEMBER_PATH_LEN: usize = 16;

/// Separator between the group and member part of a member identifier
pub const IDENTIFIER_SEPARATOR: char = ';';

/// Encode a top-level step id as an 8-char zero-padded lowercase hex path.
pub fn encode_leaf(id: u32) -> String {
    format!("{:08x}", id)
}

/// Encode a group placement id as the 8-char prefix shared by its members.
pub fn encode_group_prefix(placement_id: u32) -> String {
    encode_leaf(placement_id)
}

/// Append a member id to a group prefix, giving a 16-char path.
///
/// A prefix of the wrong width is zero-padded or cut to 8 chars first.
pub fn encode_member_path(prefix: &str, member_id: u32) -> String {
    format!("{}{}", fit_prefix(prefix), encode_leaf(member_id))
}

fn fit_prefix(prefix: &str) -> Cow<'_, str> {
    let width = prefix.chars().count();
    if width == LEAF_PATH_LEN {
        return Cow::Borrowed(prefix);
    }
    log::warn!(
        "Group prefix '{}' is {} chars, expected {}",
        prefix,
        width,
        LEAF_PATH_LEN
    );
    if width < LEAF_PATH_LEN {
        Cow::Owned(format!("{:0>width$}", prefix, width = LEAF_PATH_LEN))
    } else {
        Cow::Owned(prefix.chars().take(LEAF_PATH_LEN).collect())
    }
}

/// Identifier for a group member, e.g. `(2, 10)` -> `"2;a"`.
pub fn encode_member_identifier(ref_id: u32, member_id: u32) -> String {
    format!("{:x}{}{:x}", ref_id, IDENTIFIER_SEPARATOR, member_id)
}

/// Parse a hex component back to its id.
pub fn parse_hex(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > LEAF_PATH_LEN {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

pub fn is_leaf_path(path: &str) -> bool {
    path.len() == LEAF_PATH_LEN
}

pub fn is_member_path(path: &str) -> bool {
    path.len() == MEMBER_PATH_LEN
}

/// The 8-char group prefix of a path, or `None` for malformed paths.
pub fn group_prefix_of(path: &str) -> Option<&str> {
    if is_leaf_path(path) || is_member_path(path) {
        path.get(..LEAF_PATH_LEN)
    } else {
        None
    }
}

/// Part of an identifier before the member separator.
pub fn identifier_head(identifier: &str) -> &str {
    identifier
        .split_once(IDENTIFIER_SEPARATOR)
        .map_or(identifier, |(head, _)| head)
}

/// Bring an id from the markup into the 32-bit range, logging when it was out of range.
pub fn clamp_id(raw: i64) -> u32 {
    match u32::try_from(raw) {
        Ok(id) => id,
        Err(_) => {
            let clamped = if raw < 0 { 0 } else { u32::MAX };
            log::warn!("Step id {} outside 32-bit range, clamped to {}", raw, clamped);
            clamped
        }
    }
}
