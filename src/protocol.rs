//! Wire types for the F-Chat protocol.
//!
//! Every frame is a three-letter command code, optionally followed by a space
//! and a JSON object:
//!
//! ```text
//! PIN
//! MSG {"channel":"Frontpage","message":"hi"}
//! ```
//!
//! Inbound payloads are decoded leniently: a missing or malformed JSON object
//! becomes an empty object, and every payload struct is `#[serde(default)]` so
//! absent fields take their defaults instead of failing the frame. Fields are
//! also lenient one at a time: a field of the wrong type (`null` included)
//! takes its default, and a list drops the entries it cannot read, so the
//! rest of the frame survives.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;

/// Length of a command code in characters.
pub const CODE_LEN: usize = 3;

// ── Frame codec ─────────────────────────────────────────────────────

/// One discrete protocol message: command code plus JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Three-letter command code, e.g. `"MSG"`.
    pub code: String,
    /// Payload object. Always a JSON object; empty when absent or malformed.
    pub payload: Value,
}

impl Frame {
    /// Parse a raw text frame.
    ///
    /// Never fails: an unparseable payload yields an empty object.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let split = raw
            .char_indices()
            .nth(CODE_LEN)
            .map_or(raw.len(), |(idx, _)| idx);
        let (code, rest) = raw.split_at(split);

        let payload = match serde_json::from_str::<Value>(rest.trim()) {
            Ok(obj @ Value::Object(_)) => obj,
            _ => Value::Object(Map::new()),
        };

        Self {
            code: code.to_string(),
            payload,
        }
    }

    /// Encode a code and payload into wire text. `None` omits the JSON part.
    pub fn encode(code: &str, payload: Option<&Value>) -> String {
        match payload {
            Some(value) => format!("{code} {value}"),
            None => code.to_string(),
        }
    }

    /// Decode the payload into a typed shape, falling back to defaults.
    pub fn decode<T: DeserializeOwned + Default>(&self) -> T {
        match T::deserialize(&self.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(code = %self.code, "malformed payload, using defaults: {e}");
                T::default()
            }
        }
    }
}

// ── Enums ───────────────────────────────────────────────────────────

/// Character status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Online,
    Looking,
    Busy,
    Dnd,
    Idle,
    Away,
    /// Set by an admin reward; cannot be chosen by the user.
    Crown,
    /// A status string this client does not recognize.
    #[serde(other)]
    Unknown,
}

impl Status {
    /// Parse a wire status string. Unrecognized values map to [`Status::Unknown`].
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "online" => Self::Online,
            "looking" => Self::Looking,
            "busy" => Self::Busy,
            "dnd" => Self::Dnd,
            "idle" => Self::Idle,
            "away" => Self::Away,
            "crown" => Self::Crown,
            _ => Self::Unknown,
        }
    }

    /// The wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Looking => "looking",
            Self::Busy => "busy",
            Self::Dnd => "dnd",
            Self::Idle => "idle",
            Self::Away => "away",
            Self::Crown => "crown",
            Self::Unknown => "unknown",
        }
    }
}

/// Which message kinds a channel accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Only `MSG`.
    Chat,
    /// Only `LRP`.
    Ads,
    /// Both `MSG` and `LRP`.
    Both,
}

impl ChannelMode {
    /// Parse a wire mode string; `None` when empty or unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "ads" => Some(Self::Ads),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

/// Private-message typing indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingStatus {
    Clear,
    Paused,
    Typing,
}

impl TypingStatus {
    /// Parse a wire typing status; `None` when unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clear" => Some(Self::Clear),
            "paused" => Some(Self::Paused),
            "typing" => Some(Self::Typing),
            _ => None,
        }
    }
}

/// Ignore-list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreAction {
    Add,
    Delete,
    /// Tell the server a PRI sender was ignored.
    Notify,
    /// Request the full ignore list.
    List,
}

/// Private room visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Invite only.
    Private,
    /// Anybody can join.
    Public,
}

// ── Inbound payloads ────────────────────────────────────────────────

/// Read a field, falling back to its default when it has the wrong type.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Read a list, skipping entries that do not fit. A non-array is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| T::deserialize(item).ok())
        .collect())
}

/// `{"character": ...}` — AOP, DOP, FLN, IDN.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CharacterPayload {
    #[serde(deserialize_with = "lenient")]
    pub character: String,
}

/// `{"message": ...}` — BRO, HLO.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagePayload {
    #[serde(deserialize_with = "lenient")]
    pub message: String,
}

/// ADL — list of global chat operators.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpsPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub ops: Vec<String>,
}

/// CDS — channel description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DescriptionPayload {
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(deserialize_with = "lenient")]
    pub description: String,
}

/// One entry of a CHA public channel list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublicChannelEntry {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub mode: String,
    #[serde(deserialize_with = "lenient")]
    pub characters: u32,
}

/// CHA — public channel list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublicChannelsPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub channels: Vec<PublicChannelEntry>,
}

/// One entry of an ORS private room list. `name` is the room id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrivateChannelEntry {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub characters: u32,
}

/// ORS — open private room list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrivateChannelsPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub channels: Vec<PrivateChannelEntry>,
}

/// CIU — channel invite.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvitePayload {
    #[serde(deserialize_with = "lenient")]
    pub sender: String,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
}

/// CBU, CKU, CTU — an operator removed someone from a channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModerationPayload {
    #[serde(deserialize_with = "lenient")]
    pub operator: String,
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    /// Timeout length in minutes (CTU only).
    #[serde(deserialize_with = "lenient")]
    pub length: Option<u32>,
}

/// COA, COR, CSO — channel role change for a character.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelCharacterPayload {
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
}

/// COL — channel operator list; the first entry is the owner or `""`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpListPayload {
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(deserialize_with = "lenient_list")]
    pub oplist: Vec<String>,
}

/// CON — connected user count.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CountPayload {
    #[serde(deserialize_with = "lenient")]
    pub count: u64,
}

/// ERR — error notification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorPayload {
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    #[serde(deserialize_with = "lenient")]
    pub number: i64,
}

/// FKS — search results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchResultsPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub characters: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub kinks: Vec<Value>,
}

/// `{"identity": ...}` as used by JCH and ICH.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Identity {
    #[serde(deserialize_with = "lenient")]
    pub identity: String,
}

/// ICH — initial channel roster after joining.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InitialChannelPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub users: Vec<Identity>,
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(deserialize_with = "lenient")]
    pub mode: String,
}

/// JCH — someone (possibly us) joined a channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JoinPayload {
    #[serde(deserialize_with = "lenient")]
    pub character: Identity,
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(deserialize_with = "lenient")]
    pub title: String,
}

/// KID and PRD — multi-frame kink / profile data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileDataPayload {
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    pub key: Value,
    pub value: Value,
}

/// LCH — someone left a channel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeavePayload {
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(deserialize_with = "lenient")]
    pub character: String,
}

/// LIS — roster snapshot of `[name, gender, status, message]` tuples.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RosterPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub characters: Vec<Vec<String>>,
}

/// NLN — a character came online.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectedPayload {
    #[serde(deserialize_with = "lenient")]
    pub identity: String,
    #[serde(deserialize_with = "lenient")]
    pub gender: String,
    #[serde(deserialize_with = "lenient")]
    pub status: String,
}

/// IGN — ignore list update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IgnorePayload {
    #[serde(deserialize_with = "lenient")]
    pub action: String,
    #[serde(deserialize_with = "lenient_list")]
    pub characters: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub character: String,
}

/// FRL — friends list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FriendsPayload {
    #[serde(deserialize_with = "lenient_list")]
    pub characters: Vec<String>,
}

/// PRI — private message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrivateMessagePayload {
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    #[serde(deserialize_with = "lenient")]
    pub message: String,
}

/// MSG and LRP — channel message or ad.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelMessagePayload {
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
}

/// RLL — dice roll or bottle spin result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RollPayload {
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    #[serde(deserialize_with = "lenient_list")]
    pub results: Vec<i64>,
    #[serde(deserialize_with = "lenient_list")]
    pub rolls: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub endresult: i64,
    #[serde(deserialize_with = "lenient")]
    pub target: String,
}

/// RMO — channel mode change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModePayload {
    #[serde(deserialize_with = "lenient")]
    pub mode: String,
    #[serde(deserialize_with = "lenient")]
    pub channel: String,
}

/// RTB — real-time bridge notification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgePayload {
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub sender: String,
    #[serde(deserialize_with = "lenient")]
    pub id: i64,
    #[serde(deserialize_with = "lenient")]
    pub subject: String,
}

/// STA — status change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusPayload {
    #[serde(deserialize_with = "lenient")]
    pub status: String,
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    #[serde(deserialize_with = "lenient")]
    pub statusmsg: String,
}

/// SYS — server-generated message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemPayload {
    #[serde(deserialize_with = "lenient")]
    pub message: String,
    #[serde(deserialize_with = "lenient")]
    pub channel: Option<String>,
}

/// TPN — typing status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TypingPayload {
    #[serde(deserialize_with = "lenient")]
    pub character: String,
    #[serde(deserialize_with = "lenient")]
    pub status: String,
}

/// UPT — server uptime statistics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UptimePayload {
    #[serde(deserialize_with = "lenient")]
    pub time: u64,
    #[serde(deserialize_with = "lenient")]
    pub starttime: u64,
    #[serde(deserialize_with = "lenient")]
    pub startstring: String,
    #[serde(deserialize_with = "lenient")]
    pub accepted: u64,
    #[serde(deserialize_with = "lenient")]
    pub channels: u64,
    #[serde(deserialize_with = "lenient")]
    pub users: u64,
    #[serde(deserialize_with = "lenient")]
    pub maxusers: u64,
}

/// VAR — server variable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VariablePayload {
    #[serde(deserialize_with = "lenient")]
    pub variable: String,
    pub value: Value,
}

// ── Outbound commands ───────────────────────────────────────────────

/// Optional filters for a character search (FKS).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub genders: Vec<String>,
    pub orientations: Vec<String>,
    pub languages: Vec<String>,
    pub furryprefs: Vec<String>,
    pub roles: Vec<String>,
}

impl ClientCommand {
    /// Build an FKS search command.
    pub fn search(kinks: Vec<String>, filters: SearchFilters) -> Self {
        let SearchFilters {
            genders,
            orientations,
            languages,
            furryprefs,
            roles,
        } = filters;
        Self::Search {
            kinks,
            genders,
            orientations,
            languages,
            furryprefs,
            roles,
        }
    }
}

/// Commands sent from client to server.
///
/// Serializes to the payload object only; the command code comes from
/// [`code`](Self::code). Variants without fields have no payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientCommand {
    /// IDN — identify with a ticket. Must be the first frame.
    Identify {
        method: &'static str,
        account: String,
        ticket: String,
        character: String,
        cname: String,
        cversion: String,
    },
    /// PIN — keepalive reply.
    Ping,
    /// STA — set own status.
    SetStatus { status: Status, statusmsg: String },
    /// JCH — join a channel.
    JoinChannel { channel: String },
    /// LCH — leave a channel.
    LeaveChannel { channel: String },
    /// PRI — private message.
    PrivateMessage { recipient: String, message: String },
    /// MSG — channel message.
    ChannelMessage { channel: String, message: String },
    /// LRP — channel ad.
    ChannelAd { channel: String, message: String },
    /// RLL — roll dice (`"2d6+1"`) or spin the bottle (`"bottle"`).
    Roll { channel: String, dice: String },
    /// TPN — typing status towards a private-message partner.
    Typing {
        character: String,
        status: TypingStatus,
    },
    /// IGN — ignore list operation.
    Ignore {
        action: IgnoreAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        character: Option<String>,
    },
    /// CKU — kick from channel.
    ChannelKick { channel: String, character: String },
    /// CBU — ban from channel.
    ChannelBan { channel: String, character: String },
    /// CUB — unban from channel.
    ChannelUnban { channel: String, character: String },
    /// CTU — channel timeout in minutes.
    ChannelTimeout {
        channel: String,
        character: String,
        length: u32,
    },
    /// COA — promote channel operator.
    PromoteChannelOp { channel: String, character: String },
    /// COR — demote channel operator.
    DemoteChannelOp { channel: String, character: String },
    /// CSO — set channel owner.
    SetChannelOwner { character: String, channel: String },
    /// CDS — set channel description.
    SetChannelDescription {
        channel: String,
        description: String,
    },
    /// RMO — set channel mode.
    SetChannelMode { channel: String, mode: ChannelMode },
    /// RST — open or close a private room.
    SetRoomStatus { channel: String, status: RoomStatus },
    /// CIU — invite to channel.
    Invite { channel: String, character: String },
    /// COL — request channel operator list.
    ChannelOpList { channel: String },
    /// CBL — request channel ban list.
    ChannelBanList { channel: String },
    /// CCR — create a private, invite-only channel.
    CreatePrivateChannel { channel: String },
    /// CHA — request public channel list.
    PublicChannels,
    /// ORS — request open private rooms.
    PrivateRooms,
    /// UPT — request server uptime.
    Uptime,
    /// PRO — request profile tags.
    ProfileTags { character: String },
    /// KIN — request kink list.
    Kinks { character: String },
    /// FKS — search for characters.
    Search {
        kinks: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        genders: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        orientations: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        languages: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        furryprefs: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        roles: Vec<String>,
    },
    /// SFC — report a character to moderators.
    Report {
        action: &'static str,
        report: String,
        character: String,
    },
    /// ACB — account ban (chat op).
    AccountBan { character: String },
    /// AOP — promote chat op (admin).
    PromoteChatOp { character: String },
    /// AWC — list alts of a character (chat op).
    Alts { character: String },
    /// BRO — broadcast (admin).
    Broadcast { message: String },
    /// CRC — create official channel (admin).
    CreateOfficialChannel { channel: String },
    /// DOP — demote chat op (admin).
    DemoteChatOp { character: String },
    /// KIC — delete a channel (chat op).
    DeleteChannel { channel: String },
    /// KIK — kick from server (chat op).
    ServerKick { character: String },
    /// RWD — reward with crown status (admin).
    Reward { character: String },
    /// TMO — server timeout in minutes (chat op).
    ServerTimeout {
        character: String,
        time: u32,
        reason: String,
    },
    /// UNB — unban an account (chat op).
    Unban { character: String },
}

impl ClientCommand {
    /// The three-letter command code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "IDN",
            Self::Ping => "PIN",
            Self::SetStatus { .. } => "STA",
            Self::JoinChannel { .. } => "JCH",
            Self::LeaveChannel { .. } => "LCH",
            Self::PrivateMessage { .. } => "PRI",
            Self::ChannelMessage { .. } => "MSG",
            Self::ChannelAd { .. } => "LRP",
            Self::Roll { .. } => "RLL",
            Self::Typing { .. } => "TPN",
            Self::Ignore { .. } => "IGN",
            Self::ChannelKick { .. } => "CKU",
            Self::ChannelBan { .. } => "CBU",
            Self::ChannelUnban { .. } => "CUB",
            Self::ChannelTimeout { .. } => "CTU",
            Self::PromoteChannelOp { .. } => "COA",
            Self::DemoteChannelOp { .. } => "COR",
            Self::SetChannelOwner { .. } => "CSO",
            Self::SetChannelDescription { .. } => "CDS",
            Self::SetChannelMode { .. } => "RMO",
            Self::SetRoomStatus { .. } => "RST",
            Self::Invite { .. } => "CIU",
            Self::ChannelOpList { .. } => "COL",
            Self::ChannelBanList { .. } => "CBL",
            Self::CreatePrivateChannel { .. } => "CCR",
            Self::PublicChannels => "CHA",
            Self::PrivateRooms => "ORS",
            Self::Uptime => "UPT",
            Self::ProfileTags { .. } => "PRO",
            Self::Kinks { .. } => "KIN",
            Self::Search { .. } => "FKS",
            Self::Report { .. } => "SFC",
            Self::AccountBan { .. } => "ACB",
            Self::PromoteChatOp { .. } => "AOP",
            Self::Alts { .. } => "AWC",
            Self::Broadcast { .. } => "BRO",
            Self::CreateOfficialChannel { .. } => "CRC",
            Self::DemoteChatOp { .. } => "DOP",
            Self::DeleteChannel { .. } => "KIC",
            Self::ServerKick { .. } => "KIK",
            Self::Reward { .. } => "RWD",
            Self::ServerTimeout { .. } => "TMO",
            Self::Unban { .. } => "UNB",
        }
    }

    /// Whether this is a keepalive reply.
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Self::Ping)
    }

    /// Serialize into wire text.
    ///
    /// # Errors
    ///
    /// Returns [`FChatError::Serialization`](crate::FChatError::Serialization)
    /// if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<String> {
        let payload = serde_json::to_value(self)?;
        let payload = (!payload.is_null()).then_some(payload);
        Ok(Frame::encode(self.code(), payload.as_ref()))
    }
}

/// Undo the HTML entity escaping the server applies to echoed text.
pub(crate) fn unescape_entities(text: &str, ampersand: bool) -> String {
    let text = text.replace("&lt;", "<").replace("&gt;", ">");
    if ampersand {
        text.replace("&amp;", "&")
    } else {
        text
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

    #[test]
    fn parse_splits_code_and_payload() {
        let frame = Frame::parse(r#"MSG {"channel":"Frontpage","message":"hi"}"#);
        assert_eq!(frame.code, "MSG");
        assert_eq!(frame.payload["channel"], "Frontpage");
        assert_eq!(frame.payload["message"], "hi");
    }

    #[test]
    fn parse_bare_code_has_empty_payload() {
        let frame = Frame::parse("PIN");
        assert_eq!(frame.code, "PIN");
        assert_eq!(frame.payload, Value::Object(Map::new()));
    }

    #[test]
    fn parse_malformed_json_yields_empty_payload() {
        let frame = Frame::parse("STA {not json");
        assert_eq!(frame.code, "STA");
        assert_eq!(frame.payload, Value::Object(Map::new()));

        let frame = Frame::parse("VAR [1,2,3]");
        assert_eq!(frame.payload, Value::Object(Map::new()));
    }

    #[test]
    fn parse_short_and_multibyte_input_does_not_panic() {
        assert_eq!(Frame::parse("").code, "");
        assert_eq!(Frame::parse("PI").code, "PI");
        assert_eq!(Frame::parse("ÄÖÜ {}").code, "ÄÖÜ");
    }

    #[test]
    fn decode_fills_missing_fields_with_defaults() {
        let frame = Frame::parse(r#"STA {"character":"Alice"}"#);
        let payload: StatusPayload = frame.decode();
        assert_eq!(payload.character, "Alice");
        assert_eq!(payload.status, "");
        assert_eq!(payload.statusmsg, "");
    }

    #[test]
    fn decode_mistyped_field_falls_back_to_default() {
        let frame = Frame::parse(r#"CON {"count":"many"}"#);
        let payload: CountPayload = frame.decode();
        assert_eq!(payload.count, 0);
    }

    #[test]
    fn null_field_keeps_the_rest_of_the_payload() {
        let frame = Frame::parse(r#"STA {"character":"Bob","status":"busy","statusmsg":null}"#);
        let payload: StatusPayload = frame.decode();
        assert_eq!(payload.character, "Bob");
        assert_eq!(payload.status, "busy");
        assert_eq!(payload.statusmsg, "");
    }

    #[test]
    fn list_skips_unreadable_entries() {
        let frame = Frame::parse(
            r#"CHA {"channels":[{"name":"Frontpage","mode":"both","characters":null},7,{"name":"Dev","mode":"chat","characters":3}]}"#,
        );
        let payload: PublicChannelsPayload = frame.decode();
        let names: Vec<_> = payload.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Frontpage", "Dev"]);
        assert_eq!(payload.channels[0].characters, 0);
        assert_eq!(payload.channels[0].mode, "both");

        let frame = Frame::parse(r#"FRL {"characters":"nobody"}"#);
        let payload: FriendsPayload = frame.decode();
        assert!(payload.characters.is_empty());
    }

    #[test]
    fn zero_payload_commands_omit_json() {
        assert_eq!(ClientCommand::Ping.to_frame().unwrap(), "PIN");
        assert_eq!(ClientCommand::PublicChannels.to_frame().unwrap(), "CHA");
        assert_eq!(ClientCommand::Uptime.to_frame().unwrap(), "UPT");
    }

    #[test]
    fn commands_serialize_wire_keys() {
        let frame = ClientCommand::SetStatus {
            status: Status::Busy,
            statusmsg: "brb".into(),
        }
        .to_frame()
        .unwrap();
        let parsed = Frame::parse(&frame);
        assert_eq!(parsed.code, "STA");
        assert_eq!(parsed.payload["status"], "busy");
        assert_eq!(parsed.payload["statusmsg"], "brb");
    }

    #[test]
    fn ignore_list_omits_character() {
        let frame = ClientCommand::Ignore {
            action: IgnoreAction::List,
            character: None,
        }
        .to_frame()
        .unwrap();
        assert_eq!(frame, r#"IGN {"action":"list"}"#);
    }

    #[test]
    fn search_flattens_non_empty_filters() {
        let frame = ClientCommand::search(
            vec!["523".into()],
            SearchFilters {
                genders: vec!["Male".into()],
                ..SearchFilters::default()
            },
        )
        .to_frame()
        .unwrap();
        let parsed = Frame::parse(&frame);
        assert_eq!(parsed.code, "FKS");
        assert_eq!(parsed.payload["kinks"][0], "523");
        assert_eq!(parsed.payload["genders"][0], "Male");
        assert!(parsed.payload.get("roles").is_none());
    }

    #[test]
    fn status_parse_is_lenient() {
        assert_eq!(Status::parse("DND"), Status::Dnd);
        assert_eq!(Status::parse("sleeping"), Status::Unknown);
        assert_eq!(Status::parse("crown").as_str(), "crown");
    }

    #[test]
    fn channel_mode_parse() {
        assert_eq!(ChannelMode::parse("both"), Some(ChannelMode::Both));
        assert_eq!(ChannelMode::parse(""), None);
    }

    #[test]
    fn unescape_matches_server_escaping() {
        assert_eq!(unescape_entities("&lt;b&gt; &amp;", true), "<b> &");
        assert_eq!(unescape_entities("&lt;b&gt; &amp;", false), "<b> &amp;");
    }
}
