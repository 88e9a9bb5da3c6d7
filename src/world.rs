//! Local mirror of server-asserted state: online users and known channels.
//!
//! Entities are keyed by [`NameKey`], a case-normalized name, because the
//! server treats character and channel names case-insensitively. Channels
//! reference users by key only; removing a user removes its key from every
//! channel in the same call.
//!
//! Mutations are crate-private and driven by the
//! [`dispatch`](crate::dispatch) module. Callers get read access through
//! [`FChatSession::world`](crate::session::FChatSession::world).

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::Inconsistency;
use crate::protocol::{ChannelMode, Status};

// ── Keys ────────────────────────────────────────────────────────────

/// Case-normalized lookup key for users and channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameKey(String);

impl NameKey {
    /// Normalize `name` into a key.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// Whether two names refer to the same character or channel.
    pub fn same(a: &str, b: &str) -> bool {
        Self::new(a) == Self::new(b)
    }

    /// The normalized key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NameKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Entities ────────────────────────────────────────────────────────

/// An online character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Name as the server spelled it.
    pub name: String,
    pub gender: String,
    pub status: Status,
    pub status_message: String,
}

/// A chat channel, public or private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel id. Equals `title` for public channels.
    pub id: String,
    /// Display name.
    pub title: String,
    /// `None` until the server reports a mode.
    pub mode: Option<ChannelMode>,
    /// Population. Tracks `members.len()` after membership changes; channel
    /// lists overwrite it with the server's count.
    pub member_count: usize,
    members: Vec<NameKey>,
    /// Owner name, if any. May refer to an offline character.
    pub owner: Option<String>,
    /// Channel operator names in the order the server reported them.
    pub operators: Vec<String>,
    pub description: String,
}

impl Channel {
    /// Create an empty channel.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            mode: None,
            member_count: 0,
            members: Vec::new(),
            owner: None,
            operators: Vec::new(),
            description: String::new(),
        }
    }

    /// Member keys in join order.
    pub fn members(&self) -> &[NameKey] {
        &self.members
    }

    /// Whether `name` is currently a member.
    pub fn is_member(&self, name: &str) -> bool {
        self.members.contains(&NameKey::new(name))
    }

    /// Whether `name` is listed as a channel operator.
    pub fn is_operator(&self, name: &str) -> bool {
        self.operators
            .iter()
            .any(|op| NameKey::same(op, name))
    }

    fn join(&mut self, key: NameKey) -> bool {
        let added = if self.members.contains(&key) {
            false
        } else {
            self.members.push(key);
            true
        };
        self.member_count = self.members.len();
        added
    }

    fn leave(&mut self, key: &NameKey) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != key);
        self.member_count = self.members.len();
        self.members.len() != before
    }

    fn clear_members(&mut self) {
        self.members.clear();
        self.member_count = 0;
    }

    fn add_operator(&mut self, name: &str) {
        if !name.is_empty() && !self.is_operator(name) {
            self.operators.push(name.to_string());
        }
    }
}

// ── World state ─────────────────────────────────────────────────────

/// Everything the session knows about the chat world.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    users: HashMap<NameKey, User>,
    channels: HashMap<NameKey, Channel>,
    server_vars: HashMap<String, Value>,
    friends: Vec<String>,
    ignored: Vec<String>,
    global_ops: Vec<String>,
    connected_count: Option<u64>,
}

impl WorldState {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Read access ─────────────────────────────────────────────────

    /// Look up an online user by name, case-insensitively.
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(&NameKey::new(name))
    }

    /// All online users.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Number of online users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Look up a channel by key or, failing that, by id.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        let key = self.resolve_channel(name)?;
        self.channels.get(&key)
    }

    /// All known channels.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Number of known channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Users currently in `channel`, in join order.
    pub fn channel_members(&self, channel: &str) -> Vec<&User> {
        self.channel(channel)
            .map(|ch| {
                ch.members
                    .iter()
                    .filter_map(|key| self.users.get(key))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw value of a server variable, if the server sent it.
    pub fn server_var(&self, name: &str) -> Option<&Value> {
        self.server_vars.get(name)
    }

    /// Friends list from the last FRL frame.
    pub fn friends(&self) -> &[String] {
        &self.friends
    }

    /// Names on the ignore list.
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Whether `name` is on the ignore list.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|n| NameKey::same(n, name))
    }

    /// Global chat operators.
    pub fn global_ops(&self) -> &[String] {
        &self.global_ops
    }

    /// Last user count reported by the server.
    pub fn connected_count(&self) -> Option<u64> {
        self.connected_count
    }

    /// Forget a channel the caller no longer cares about.
    pub fn evict_channel(&mut self, name: &str) -> Option<Channel> {
        let key = self.resolve_channel(name)?;
        self.channels.remove(&key)
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Insert or overwrite a user.
    pub(crate) fn upsert_user(&mut self, name: &str, gender: &str, status: Status, message: &str) {
        self.users.insert(
            NameKey::new(name),
            User {
                name: name.to_string(),
                gender: gender.to_string(),
                status,
                status_message: message.to_string(),
            },
        );
    }

    /// Insert a user unless one with the same key already exists.
    pub(crate) fn add_user_if_absent(&mut self, name: &str, gender: &str, status: Status) -> bool {
        let key = NameKey::new(name);
        if self.users.contains_key(&key) {
            return false;
        }
        self.users.insert(
            key,
            User {
                name: name.to_string(),
                gender: gender.to_string(),
                status,
                status_message: String::new(),
            },
        );
        true
    }

    /// Remove a user and every channel membership it holds.
    pub(crate) fn remove_user(&mut self, name: &str) -> Result<User, Inconsistency> {
        let key = NameKey::new(name);
        let user = self
            .users
            .remove(&key)
            .ok_or_else(|| Inconsistency::UnknownUser(name.to_string()))?;
        for channel in self.channels.values_mut() {
            channel.leave(&key);
        }
        Ok(user)
    }

    /// Update a known user's status.
    pub(crate) fn set_status(
        &mut self,
        name: &str,
        status: Status,
        message: &str,
    ) -> Result<(), Inconsistency> {
        let user = self
            .users
            .get_mut(&NameKey::new(name))
            .ok_or_else(|| Inconsistency::UnknownUser(name.to_string()))?;
        user.status = status;
        user.status_message = message.to_string();
        Ok(())
    }

    // ── Channel lists ───────────────────────────────────────────────

    /// Record a public channel. Mode is only set when the channel is new.
    pub(crate) fn upsert_public_channel(
        &mut self,
        name: &str,
        mode: Option<ChannelMode>,
        count: usize,
    ) {
        let channel = self
            .channels
            .entry(NameKey::new(name))
            .or_insert_with(|| {
                let mut channel = Channel::new(name, name);
                channel.mode = mode;
                channel
            });
        channel.id = name.to_string();
        channel.title = name.to_string();
        channel.member_count = count;
    }

    /// Record an open private room, keyed by title with its id preserved.
    pub(crate) fn upsert_private_channel(&mut self, id: &str, title: &str, count: usize) {
        let channel = self
            .channels
            .entry(NameKey::new(title))
            .or_insert_with(|| Channel::new(id, title));
        channel.id = id.to_string();
        channel.title = title.to_string();
        channel.member_count = count;
    }

    /// Create a channel unless it is already known.
    pub(crate) fn ensure_channel(&mut self, id: &str, title: &str) {
        if self.resolve_channel(id).is_none() {
            self.channels
                .insert(NameKey::new(id), Channel::new(id, title));
        }
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Add an online user to a known channel.
    pub(crate) fn join_channel(&mut self, channel: &str, name: &str) -> Result<bool, Inconsistency> {
        let key = self.known_user(name)?;
        Ok(self.channel_mut(channel)?.join(key))
    }

    /// Remove a user from a channel. Unknown users are an inconsistency even
    /// though removal could proceed by key.
    pub(crate) fn leave_channel(&mut self, channel: &str, name: &str) -> Result<bool, Inconsistency> {
        let key = self.known_user(name)?;
        Ok(self.channel_mut(channel)?.leave(&key))
    }

    /// Replace a channel's roster with the given names.
    ///
    /// Names that are not online are reported after the known ones are added.
    pub(crate) fn reset_roster<'a, I>(
        &mut self,
        channel: &str,
        names: I,
        mode: Option<ChannelMode>,
    ) -> Result<(), Inconsistency>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys = Vec::new();
        let mut missing = None;
        for name in names {
            match self.known_user(name) {
                Ok(key) => keys.push(key),
                Err(e) => {
                    missing.get_or_insert(e);
                }
            }
        }

        let ch = self.channel_mut(channel)?;
        ch.clear_members();
        for key in keys {
            ch.join(key);
        }
        if mode.is_some() {
            ch.mode = mode;
        }

        missing.map_or(Ok(()), Err)
    }

    // ── Channel roles and metadata ──────────────────────────────────

    /// Apply a COL op list: the first non-empty entry is the owner, the rest
    /// are appended as operators.
    pub(crate) fn apply_op_list(&mut self, channel: &str, oplist: &[String]) -> Result<(), Inconsistency> {
        let ch = self.channel_mut(channel)?;
        let mut names = oplist.iter().filter(|name| !name.is_empty());
        if let Some(owner) = oplist.first().filter(|name| !name.is_empty()) {
            ch.owner = Some(owner.clone());
            names.next();
        }
        for name in names {
            ch.add_operator(name);
        }
        Ok(())
    }

    pub(crate) fn add_channel_op(&mut self, channel: &str, name: &str) -> Result<(), Inconsistency> {
        self.channel_mut(channel)?.add_operator(name);
        Ok(())
    }

    pub(crate) fn remove_channel_op(&mut self, channel: &str, name: &str) -> Result<(), Inconsistency> {
        self.channel_mut(channel)?
            .operators
            .retain(|op| !NameKey::same(op, name));
        Ok(())
    }

    pub(crate) fn set_owner(&mut self, channel: &str, name: &str) -> Result<(), Inconsistency> {
        self.channel_mut(channel)?.owner = (!name.is_empty()).then(|| name.to_string());
        Ok(())
    }

    pub(crate) fn set_description(&mut self, channel: &str, description: &str) -> Result<(), Inconsistency> {
        self.channel_mut(channel)?.description = description.to_string();
        Ok(())
    }

    pub(crate) fn set_mode(&mut self, channel: &str, mode: Option<ChannelMode>) -> Result<(), Inconsistency> {
        self.channel_mut(channel)?.mode = mode;
        Ok(())
    }

    // ── Ancillary ───────────────────────────────────────────────────

    pub(crate) fn set_server_var(&mut self, name: &str, value: Value) {
        self.server_vars.insert(name.to_string(), value);
    }

    pub(crate) fn set_friends(&mut self, friends: Vec<String>) {
        self.friends = friends;
    }

    pub(crate) fn set_ignored(&mut self, names: Vec<String>) {
        self.ignored = names;
    }

    pub(crate) fn add_ignored(&mut self, name: &str) {
        if !name.is_empty() && !self.is_ignored(name) {
            self.ignored.push(name.to_string());
        }
    }

    pub(crate) fn remove_ignored(&mut self, name: &str) {
        self.ignored.retain(|n| !NameKey::same(n, name));
    }

    pub(crate) fn set_global_ops(&mut self, ops: Vec<String>) {
        self.global_ops = ops;
    }

    pub(crate) fn add_global_op(&mut self, name: &str) {
        if !self.global_ops.iter().any(|op| NameKey::same(op, name)) {
            self.global_ops.push(name.to_string());
        }
    }

    pub(crate) fn remove_global_op(&mut self, name: &str) {
        self.global_ops.retain(|op| !NameKey::same(op, name));
    }

    pub(crate) fn set_connected_count(&mut self, count: u64) {
        self.connected_count = Some(count);
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Map a channel name or id to its storage key.
    fn resolve_channel(&self, name: &str) -> Option<NameKey> {
        let key = NameKey::new(name);
        if self.channels.contains_key(&key) {
            return Some(key);
        }
        self.channels
            .iter()
            .find(|(_, ch)| NameKey::new(&ch.id) == key)
            .map(|(k, _)| k.clone())
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut Channel, Inconsistency> {
        let key = self
            .resolve_channel(name)
            .ok_or_else(|| Inconsistency::UnknownChannel(name.to_string()))?;
        self.channels
            .get_mut(&key)
            .ok_or_else(|| Inconsistency::UnknownChannel(name.to_string()))
    }

    fn known_user(&self, name: &str) -> Result<NameKey, Inconsistency> {
        let key = NameKey::new(name);
        if self.users.contains_key(&key) {
            Ok(key)
        } else {
            Err(Inconsistency::UnknownUser(name.to_string()))
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn world_with(names: &[&str]) -> WorldState {
        let mut world = WorldState::new();
        for name in names {
            world.upsert_user(name, "Female", Status::Online, "");
        }
        world
    }

    fn assert_counts_consistent(world: &WorldState) {
        for channel in world.channels() {
            assert_eq!(
                channel.member_count,
                channel.members().len(),
                "count drift in {}",
                channel.title
            );
        }
    }

    #[test]
    fn name_keys_are_case_insensitive() {
        let world = world_with(&["Alice"]);
        assert_eq!(world.user("alice").unwrap().name, "Alice");
        assert_eq!(world.user("ALICE").unwrap().name, "Alice");
        assert_eq!(NameKey::new("Frontpage").as_str(), "frontpage");
    }

    #[test]
    fn join_and_leave_keep_count_in_sync() {
        let mut world = world_with(&["Alice", "Bob", "Carol"]);
        world.ensure_channel("Frontpage", "Frontpage");

        assert!(world.join_channel("Frontpage", "Alice").unwrap());
        assert!(world.join_channel("frontpage", "Bob").unwrap());
        assert!(!world.join_channel("Frontpage", "alice").unwrap());
        assert_counts_consistent(&world);
        assert_eq!(world.channel("Frontpage").unwrap().member_count, 2);

        assert!(world.leave_channel("Frontpage", "Alice").unwrap());
        assert!(!world.leave_channel("Frontpage", "Alice").unwrap());
        world.join_channel("Frontpage", "Carol").unwrap();
        assert_counts_consistent(&world);

        let members: Vec<_> = world
            .channel_members("Frontpage")
            .iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(members, ["Bob", "Carol"]);
    }

    #[test]
    fn join_by_unknown_user_is_inconsistent() {
        let mut world = world_with(&[]);
        world.ensure_channel("Frontpage", "Frontpage");
        assert_eq!(
            world.join_channel("Frontpage", "Ghost"),
            Err(Inconsistency::UnknownUser("Ghost".into()))
        );
        assert_eq!(world.channel("Frontpage").unwrap().member_count, 0);
    }

    #[test]
    fn join_unknown_channel_is_inconsistent() {
        let mut world = world_with(&["Alice"]);
        assert_eq!(
            world.join_channel("Nowhere", "Alice"),
            Err(Inconsistency::UnknownChannel("Nowhere".into()))
        );
    }

    #[test]
    fn removing_user_leaves_no_dangling_members() {
        let mut world = world_with(&["Alice", "Bob"]);
        world.ensure_channel("A", "A");
        world.ensure_channel("B", "B");
        for ch in ["A", "B"] {
            world.join_channel(ch, "Alice").unwrap();
            world.join_channel(ch, "Bob").unwrap();
        }

        world.remove_user("alice").unwrap();

        for channel in world.channels() {
            assert!(!channel.is_member("Alice"));
            assert!(channel.is_member("Bob"));
        }
        assert_counts_consistent(&world);
        assert!(world.remove_user("Alice").is_err());
    }

    #[test]
    fn public_channel_mode_only_set_on_creation() {
        let mut world = WorldState::new();
        world.upsert_public_channel("Frontpage", Some(ChannelMode::Both), 42);
        world.upsert_public_channel("Frontpage", Some(ChannelMode::Chat), 40);

        let ch = world.channel("frontpage").unwrap();
        assert_eq!(ch.mode, Some(ChannelMode::Both));
        assert_eq!(ch.member_count, 40);
        assert!(ch.members().is_empty());
    }

    #[test]
    fn private_rooms_resolve_by_title_and_id() {
        let mut world = WorldState::new();
        world.upsert_private_channel("ADH-c7fc4c15", "Test Room", 3);

        assert_eq!(world.channel("test room").unwrap().id, "ADH-c7fc4c15");
        assert_eq!(world.channel("ADH-c7fc4c15").unwrap().title, "Test Room");

        world.upsert_private_channel("ADH-c7fc4c15", "Test Room", 5);
        assert_eq!(world.channel_count(), 1);
        assert_eq!(world.channel("Test Room").unwrap().member_count, 5);

        world.ensure_channel("ADH-c7fc4c15", "Test Room");
        assert_eq!(world.channel_count(), 1);
    }

    #[test]
    fn roster_reset_replaces_members() {
        let mut world = world_with(&["Alice", "Bob"]);
        world.ensure_channel("Frontpage", "Frontpage");
        world.join_channel("Frontpage", "Alice").unwrap();

        let result = world.reset_roster(
            "Frontpage",
            ["Bob", "Ghost"],
            Some(ChannelMode::Chat),
        );
        assert_eq!(result, Err(Inconsistency::UnknownUser("Ghost".into())));

        let ch = world.channel("Frontpage").unwrap();
        assert!(!ch.is_member("Alice"));
        assert!(ch.is_member("Bob"));
        assert_eq!(ch.mode, Some(ChannelMode::Chat));
        assert_counts_consistent(&world);
    }

    #[test]
    fn op_list_sets_owner_and_appends_without_duplicates() {
        let mut world = WorldState::new();
        world.ensure_channel("Frontpage", "Frontpage");

        let oplist = vec!["Owner".to_string(), "Mod".to_string(), String::new()];
        world.apply_op_list("Frontpage", &oplist).unwrap();
        world.apply_op_list("Frontpage", &oplist).unwrap();

        let ch = world.channel("Frontpage").unwrap();
        assert_eq!(ch.owner.as_deref(), Some("Owner"));
        assert_eq!(ch.operators, ["Mod"]);
    }

    #[test]
    fn op_list_without_owner() {
        let mut world = WorldState::new();
        world.ensure_channel("Frontpage", "Frontpage");
        world
            .apply_op_list("Frontpage", &[String::new(), "Mod".into()])
            .unwrap();

        let ch = world.channel("Frontpage").unwrap();
        assert_eq!(ch.owner, None);
        assert_eq!(ch.operators, ["Mod"]);
    }

    #[test]
    fn status_update_on_unknown_user() {
        let mut world = WorldState::new();
        assert!(world.set_status("Ghost", Status::Away, "").is_err());
        assert_eq!(world.user_count(), 0);
    }

    #[test]
    fn ignore_list_is_case_insensitive() {
        let mut world = WorldState::new();
        world.set_ignored(vec!["Spammer".into()]);
        world.add_ignored("spammer");
        world.add_ignored("Troll");
        assert_eq!(world.ignored(), ["Spammer", "Troll"]);
        world.remove_ignored("SPAMMER");
        assert!(!world.is_ignored("spammer"));
    }

    #[test]
    fn evict_channel_by_id() {
        let mut world = WorldState::new();
        world.upsert_private_channel("ADH-1", "Room", 0);
        assert!(world.evict_channel("adh-1").is_some());
        assert_eq!(world.channel_count(), 0);
    }
}
