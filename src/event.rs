//! High-level events emitted by the session.
//!
//! Every recognized inbound command produces one [`ChatEvent`] after the
//! world state has been updated, so a handler that reads
//! [`FChatSession::world`](crate::session::FChatSession::world) sees the
//! post-frame state. `Connected`, `Identified`, and `Disconnected` are
//! synthesized by the session itself.

use std::fmt;

use serde_json::Value;

use crate::protocol::{ChannelMode, Status, TypingStatus};

/// Why a session stopped being active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller asked for the session to close.
    ClientClosed,
    /// The server closed the connection.
    ServerClosed,
    /// No keepalive arrived within the watchdog threshold.
    Stale,
    /// The transport failed.
    Transport(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("closed by client"),
            Self::ServerClosed => f.write_str("closed by server"),
            Self::Stale => f.write_str("connection went stale"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// One entry of a public channel list or private room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListing {
    /// Channel id. Equals `title` for public channels.
    pub id: String,
    /// Display name.
    pub title: String,
    /// Mode, when the list carries one.
    pub mode: Option<ChannelMode>,
    /// Population reported by the server.
    pub characters: u32,
}

/// Outcome of an RLL frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollOutcome {
    /// A dice roll.
    Dice {
        results: Vec<i64>,
        rolls: Vec<String>,
        endresult: i64,
    },
    /// A bottle spin landing on `target`.
    Bottle { target: String },
}

/// Real-time bridge notifications (RTB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotice {
    TrackAdd { name: String },
    TrackRemove { name: String },
    FriendAdd { name: String },
    FriendRemove { name: String },
    FriendRequest { name: String },
    Note {
        sender: String,
        id: i64,
        subject: String,
    },
    /// A bridge type this client does not model.
    Other { kind: String },
}

/// Server uptime statistics (UPT).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Uptime {
    pub time: u64,
    pub start_time: u64,
    pub start_string: String,
    pub accepted: u64,
    pub channels: u64,
    pub users: u64,
    pub max_users: u64,
}

/// Events delivered on the receiver returned by
/// [`FChatSession::connect`](crate::session::FChatSession::connect).
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    // ── Synthetic ───────────────────────────────────────────────────
    /// The transport opened and the identify frame was sent.
    Connected,
    /// The server accepted the identify frame (IDN).
    Identified { character: String },
    /// The session is no longer active. Always the last event.
    Disconnected { reason: DisconnectReason },

    // ── Roster ──────────────────────────────────────────────────────
    /// A batch of the online roster (LIS).
    Roster { characters: Vec<String> },
    /// A character came online (NLN).
    UserOnline {
        character: String,
        gender: String,
        status: Status,
    },
    /// A character went offline (FLN).
    UserOffline { character: String },
    /// A character changed status (STA).
    StatusChanged {
        character: String,
        status: Status,
        message: String,
    },
    /// Number of connected users (CON).
    UserCount { count: u64 },
    /// Friends list (FRL).
    Friends { characters: Vec<String> },
    /// Ignore list change (IGN).
    IgnoreList {
        action: String,
        characters: Vec<String>,
    },
    /// Global chat operator list (ADL).
    ChatOps { ops: Vec<String> },
    /// A character became a chat operator (AOP).
    ChatOpAdded { character: String },
    /// A character stopped being a chat operator (DOP).
    ChatOpRemoved { character: String },

    // ── Channels ────────────────────────────────────────────────────
    /// Public channel list (CHA).
    PublicChannels { channels: Vec<ChannelListing> },
    /// Open private room list (ORS).
    PrivateRooms { channels: Vec<ChannelListing> },
    /// Someone joined a channel (JCH).
    ChannelJoined {
        channel: String,
        title: String,
        character: String,
    },
    /// Someone left a channel (LCH).
    ChannelLeft { channel: String, character: String },
    /// Initial channel roster (ICH).
    ChannelRoster {
        channel: String,
        users: Vec<String>,
        mode: Option<ChannelMode>,
    },
    /// Channel description (CDS).
    ChannelDescription {
        channel: String,
        description: String,
    },
    /// Channel mode changed (RMO).
    ChannelModeChanged {
        channel: String,
        mode: Option<ChannelMode>,
    },
    /// Channel operator list (COL).
    ChannelOps { channel: String, oplist: Vec<String> },
    /// Channel operator promoted (COA).
    ChannelOpAdded { channel: String, character: String },
    /// Channel operator demoted (COR).
    ChannelOpRemoved { channel: String, character: String },
    /// Channel owner changed (CSO).
    ChannelOwner { channel: String, character: String },
    /// Invitation to a channel (CIU).
    Invited {
        sender: String,
        title: String,
        channel: String,
    },
    /// Someone was kicked from a channel (CKU).
    ChannelKick {
        operator: String,
        channel: String,
        character: String,
    },
    /// Someone was banned from a channel (CBU).
    ChannelBan {
        operator: String,
        channel: String,
        character: String,
    },
    /// Someone was timed out of a channel (CTU).
    ChannelTimeout {
        operator: String,
        channel: String,
        character: String,
        minutes: u32,
    },

    // ── Messages ────────────────────────────────────────────────────
    /// Channel message (MSG).
    ChannelMessage {
        channel: String,
        character: String,
        message: String,
    },
    /// Channel ad (LRP).
    ChannelAd {
        channel: String,
        character: String,
        message: String,
    },
    /// Private message (PRI).
    PrivateMessage { character: String, message: String },
    /// Typing status of a private-message partner (TPN).
    Typing {
        character: String,
        status: Option<TypingStatus>,
    },
    /// Dice roll or bottle spin (RLL).
    Roll {
        channel: String,
        character: String,
        message: String,
        outcome: RollOutcome,
    },

    // ── Server ──────────────────────────────────────────────────────
    /// Keepalive received (PIN). The reply is sent automatically.
    Ping,
    /// Server hello (HLO).
    Hello { message: String },
    /// Admin broadcast (BRO).
    Broadcast { message: String },
    /// System message (SYS).
    System {
        message: String,
        channel: Option<String>,
    },
    /// Server error (ERR).
    Error { number: i64, message: String },
    /// Server variable (VAR).
    Variable { variable: String, value: Value },
    /// Server uptime statistics (UPT).
    Uptime(Uptime),
    /// Character search results (FKS).
    SearchResults {
        characters: Vec<String>,
        kinks: Vec<Value>,
    },
    /// Kink data block (KID).
    KinkData {
        kind: String,
        message: String,
        key: Value,
        value: Value,
    },
    /// Profile data block (PRD).
    ProfileData {
        kind: String,
        message: String,
        key: Value,
        value: Value,
    },
    /// Real-time bridge notification (RTB).
    Bridge(BridgeNotice),
    /// Staff report notification (SFC), passed through unparsed.
    Report { payload: Value },
}
