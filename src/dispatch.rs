//! Inbound frame dispatch.
//!
//! [`Dispatcher::handle_frame`] parses one raw frame, applies its effect on
//! the [`WorldState`], and returns the caller-facing [`ChatEvent`] together
//! with any [`Effect`]s the session engine has to carry out (keepalive reply,
//! pacing change, identification). The state update always happens before the
//! event is handed back, so the event observes the post-frame world.
//!
//! A frame that references an unknown user or channel is logged at warn and
//! its state change is skipped; the event is still produced.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Inconsistency;
use crate::event::{BridgeNotice, ChannelListing, ChatEvent, RollOutcome, Uptime};
use crate::protocol::{
    BridgePayload, ChannelCharacterPayload, ChannelMessagePayload, ChannelMode,
    CharacterPayload, ConnectedPayload, CountPayload, DescriptionPayload, ErrorPayload, Frame,
    FriendsPayload, IgnorePayload, InitialChannelPayload, InvitePayload, JoinPayload, LeavePayload,
    MessagePayload, ModePayload, ModerationPayload, OpListPayload, OpsPayload,
    PrivateChannelsPayload, PrivateMessagePayload, ProfileDataPayload, PublicChannelsPayload,
    RollPayload, RosterPayload, SearchResultsPayload, Status, StatusPayload, SystemPayload,
    TypingPayload, TypingStatus, UptimePayload, VariablePayload,
};
use crate::world::{NameKey, WorldState};

/// Server variable that tunes outbound pacing.
const MSG_FLOOD: &str = "msg_flood";

/// Multiplier applied to `msg_flood` to get the outgoing delay.
const FLOOD_SAFETY_FACTOR: f64 = 2.5;

/// Work the session engine must do in response to a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Queue a PIN reply.
    ReplyKeepalive,
    /// Record that a keepalive arrived now.
    KeepaliveSeen,
    /// Retune outbound pacing.
    SetOutgoingDelay(Duration),
    /// The server accepted our identification.
    Identified,
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Command code of the frame.
    pub code: String,
    /// Event for the caller; `None` for unknown codes.
    pub event: Option<ChatEvent>,
    /// Engine effects, in order.
    pub effects: Vec<Effect>,
}

/// Per-frame handler context.
struct Ctx<'a> {
    world: &'a mut WorldState,
    character: &'a str,
    code: &'a str,
    effects: Vec<Effect>,
}

impl Ctx<'_> {
    fn note<T>(&self, result: Result<T, Inconsistency>) {
        if let Err(e) = result {
            warn!(code = self.code, "state out of sync, skipping update: {e}");
        }
    }
}

type Handler = fn(&mut Ctx<'_>, &Frame) -> ChatEvent;

/// Code → handler lookup table.
static HANDLERS: &[(&str, Handler)] = &[
    ("ADL", on_adl),
    ("AOP", on_aop),
    ("BRO", on_bro),
    ("CBU", on_cbu),
    ("CDS", on_cds),
    ("CHA", on_cha),
    ("CIU", on_ciu),
    ("CKU", on_cku),
    ("COA", on_coa),
    ("COL", on_col),
    ("CON", on_con),
    ("COR", on_cor),
    ("CSO", on_cso),
    ("CTU", on_ctu),
    ("DOP", on_dop),
    ("ERR", on_err),
    ("FKS", on_fks),
    ("FLN", on_fln),
    ("FRL", on_frl),
    ("HLO", on_hlo),
    ("ICH", on_ich),
    ("IDN", on_idn),
    ("IGN", on_ign),
    ("JCH", on_jch),
    ("KID", on_kid),
    ("LCH", on_lch),
    ("LIS", on_lis),
    ("LRP", on_lrp),
    ("MSG", on_msg),
    ("NLN", on_nln),
    ("ORS", on_ors),
    ("PIN", on_pin),
    ("PRD", on_prd),
    ("PRI", on_pri),
    ("RLL", on_rll),
    ("RMO", on_rmo),
    ("RTB", on_rtb),
    ("SFC", on_sfc),
    ("STA", on_sta),
    ("SYS", on_sys),
    ("TPN", on_tpn),
    ("UPT", on_upt),
    ("VAR", on_var),
];

/// Applies inbound frames to a [`WorldState`] on behalf of one character.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    character: String,
}

impl Dispatcher {
    /// Create a dispatcher for the logged-in `character`.
    pub fn new(character: impl Into<String>) -> Self {
        Self {
            character: character.into(),
        }
    }

    /// Parse and dispatch one raw frame.
    pub fn handle_frame(&self, world: &mut WorldState, raw: &str) -> Dispatch {
        self.handle(world, &Frame::parse(raw))
    }

    /// Dispatch an already-parsed frame.
    pub fn handle(&self, world: &mut WorldState, frame: &Frame) -> Dispatch {
        let Some(handler) = lookup(&frame.code) else {
            debug!(code = %frame.code, "ignoring unknown command");
            return Dispatch {
                code: frame.code.clone(),
                ..Dispatch::default()
            };
        };

        let mut ctx = Ctx {
            world,
            character: &self.character,
            code: &frame.code,
            effects: Vec::new(),
        };
        let event = handler(&mut ctx, frame);

        Dispatch {
            code: frame.code.clone(),
            event: Some(event),
            effects: ctx.effects,
        }
    }
}

fn lookup(code: &str) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, handler)| *handler)
}

// ── Roster ──────────────────────────────────────────────────────────

fn on_lis(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: RosterPayload = frame.decode();
    let mut names = Vec::with_capacity(p.characters.len());
    for entry in &p.characters {
        let field = |i: usize| entry.get(i).map_or("", String::as_str);
        let name = field(0);
        if name.is_empty() {
            continue;
        }
        ctx.world
            .upsert_user(name, field(1), Status::parse(field(2)), field(3));
        names.push(name.to_string());
    }
    ChatEvent::Roster { characters: names }
}

fn on_nln(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ConnectedPayload = frame.decode();
    let status = if p.status.is_empty() {
        Status::Online
    } else {
        Status::parse(&p.status)
    };
    if p.identity.is_empty() {
        ctx.note::<()>(Err(Inconsistency::UnknownUser(p.identity.clone())));
    } else {
        ctx.world.add_user_if_absent(&p.identity, &p.gender, status);
    }
    ChatEvent::UserOnline {
        character: p.identity,
        gender: p.gender,
        status,
    }
}

fn on_fln(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: CharacterPayload = frame.decode();
    let result = ctx.world.remove_user(&p.character);
    ctx.note(result);
    ChatEvent::UserOffline {
        character: p.character,
    }
}

fn on_sta(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: StatusPayload = frame.decode();
    let status = Status::parse(&p.status);
    // Status changes for characters we have not seen are not worth a warning.
    let _ = ctx.world.set_status(&p.character, status, &p.statusmsg);
    ChatEvent::StatusChanged {
        character: p.character,
        status,
        message: p.statusmsg,
    }
}

fn on_con(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: CountPayload = frame.decode();
    ctx.world.set_connected_count(p.count);
    ChatEvent::UserCount { count: p.count }
}

fn on_frl(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: FriendsPayload = frame.decode();
    ctx.world.set_friends(p.characters.clone());
    ChatEvent::Friends {
        characters: p.characters,
    }
}

fn on_ign(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: IgnorePayload = frame.decode();
    let characters = match p.action.as_str() {
        "init" | "list" => {
            ctx.world.set_ignored(p.characters.clone());
            p.characters
        }
        "add" => {
            ctx.world.add_ignored(&p.character);
            vec![p.character]
        }
        "delete" => {
            ctx.world.remove_ignored(&p.character);
            vec![p.character]
        }
        other => {
            debug!(action = other, "unhandled ignore action");
            if p.character.is_empty() {
                p.characters
            } else {
                vec![p.character]
            }
        }
    };
    ChatEvent::IgnoreList {
        action: p.action,
        characters,
    }
}

fn on_adl(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: OpsPayload = frame.decode();
    ctx.world.set_global_ops(p.ops.clone());
    ChatEvent::ChatOps { ops: p.ops }
}

fn on_aop(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: CharacterPayload = frame.decode();
    ctx.world.add_global_op(&p.character);
    ChatEvent::ChatOpAdded {
        character: p.character,
    }
}

fn on_dop(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: CharacterPayload = frame.decode();
    ctx.world.remove_global_op(&p.character);
    ChatEvent::ChatOpRemoved {
        character: p.character,
    }
}

// ── Channels ────────────────────────────────────────────────────────

fn on_cha(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: PublicChannelsPayload = frame.decode();
    let channels = p
        .channels
        .into_iter()
        .filter(|entry| !entry.name.is_empty())
        .map(|entry| {
            let mode = ChannelMode::parse(&entry.mode);
            ctx.world
                .upsert_public_channel(&entry.name, mode, entry.characters as usize);
            ChannelListing {
                id: entry.name.clone(),
                title: entry.name,
                mode,
                characters: entry.characters,
            }
        })
        .collect();
    ChatEvent::PublicChannels { channels }
}

fn on_ors(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: PrivateChannelsPayload = frame.decode();
    let channels = p
        .channels
        .into_iter()
        .filter(|entry| !entry.title.is_empty())
        .map(|entry| {
            ctx.world
                .upsert_private_channel(&entry.name, &entry.title, entry.characters as usize);
            ChannelListing {
                id: entry.name,
                title: entry.title,
                mode: None,
                characters: entry.characters,
            }
        })
        .collect();
    ChatEvent::PrivateRooms { channels }
}

fn on_jch(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: JoinPayload = frame.decode();
    let name = p.character.identity;
    if NameKey::same(&name, ctx.character) {
        let title = if p.title.is_empty() {
            &p.channel
        } else {
            &p.title
        };
        ctx.world.ensure_channel(&p.channel, title);
    }
    let result = ctx.world.join_channel(&p.channel, &name);
    ctx.note(result);
    ChatEvent::ChannelJoined {
        channel: p.channel,
        title: p.title,
        character: name,
    }
}

fn on_lch(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: LeavePayload = frame.decode();
    let result = ctx.world.leave_channel(&p.channel, &p.character);
    ctx.note(result);
    ChatEvent::ChannelLeft {
        channel: p.channel,
        character: p.character,
    }
}

fn on_ich(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: InitialChannelPayload = frame.decode();
    let mode = ChannelMode::parse(&p.mode);
    let users: Vec<String> = p.users.into_iter().map(|u| u.identity).collect();
    let result = ctx
        .world
        .reset_roster(&p.channel, users.iter().map(String::as_str), mode);
    ctx.note(result);
    ChatEvent::ChannelRoster {
        channel: p.channel,
        users,
        mode,
    }
}

fn on_col(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: OpListPayload = frame.decode();
    let result = ctx.world.apply_op_list(&p.channel, &p.oplist);
    ctx.note(result);
    ChatEvent::ChannelOps {
        channel: p.channel,
        oplist: p.oplist,
    }
}

fn on_coa(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ChannelCharacterPayload = frame.decode();
    let result = ctx.world.add_channel_op(&p.channel, &p.character);
    ctx.note(result);
    ChatEvent::ChannelOpAdded {
        channel: p.channel,
        character: p.character,
    }
}

fn on_cor(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ChannelCharacterPayload = frame.decode();
    let result = ctx.world.remove_channel_op(&p.channel, &p.character);
    ctx.note(result);
    ChatEvent::ChannelOpRemoved {
        channel: p.channel,
        character: p.character,
    }
}

fn on_cso(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ChannelCharacterPayload = frame.decode();
    let result = ctx.world.set_owner(&p.channel, &p.character);
    ctx.note(result);
    ChatEvent::ChannelOwner {
        channel: p.channel,
        character: p.character,
    }
}

fn on_cds(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: DescriptionPayload = frame.decode();
    let result = ctx.world.set_description(&p.channel, &p.description);
    ctx.note(result);
    ChatEvent::ChannelDescription {
        channel: p.channel,
        description: p.description,
    }
}

fn on_rmo(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ModePayload = frame.decode();
    let mode = ChannelMode::parse(&p.mode);
    let result = ctx.world.set_mode(&p.channel, mode);
    ctx.note(result);
    ChatEvent::ChannelModeChanged {
        channel: p.channel,
        mode,
    }
}

/// Shared removal for kick, ban, and timeout.
fn remove_from_channel(ctx: &mut Ctx<'_>, p: &ModerationPayload) {
    let result = ctx.world.leave_channel(&p.channel, &p.character);
    ctx.note(result);
}

fn on_cku(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ModerationPayload = frame.decode();
    remove_from_channel(ctx, &p);
    ChatEvent::ChannelKick {
        operator: p.operator,
        channel: p.channel,
        character: p.character,
    }
}

fn on_cbu(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ModerationPayload = frame.decode();
    remove_from_channel(ctx, &p);
    ChatEvent::ChannelBan {
        operator: p.operator,
        channel: p.channel,
        character: p.character,
    }
}

fn on_ctu(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ModerationPayload = frame.decode();
    remove_from_channel(ctx, &p);
    ChatEvent::ChannelTimeout {
        minutes: p.length.unwrap_or_default(),
        operator: p.operator,
        channel: p.channel,
        character: p.character,
    }
}

fn on_ciu(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: InvitePayload = frame.decode();
    ChatEvent::Invited {
        sender: p.sender,
        title: p.title,
        channel: p.name,
    }
}

// ── Messages ────────────────────────────────────────────────────────

fn on_msg(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ChannelMessagePayload = frame.decode();
    ChatEvent::ChannelMessage {
        channel: p.channel,
        character: p.character,
        message: p.message,
    }
}

fn on_lrp(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ChannelMessagePayload = frame.decode();
    ChatEvent::ChannelAd {
        channel: p.channel,
        character: p.character,
        message: p.message,
    }
}

fn on_pri(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: PrivateMessagePayload = frame.decode();
    ChatEvent::PrivateMessage {
        character: p.character,
        message: p.message,
    }
}

fn on_tpn(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: TypingPayload = frame.decode();
    ChatEvent::Typing {
        status: TypingStatus::parse(&p.status),
        character: p.character,
    }
}

fn on_rll(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: RollPayload = frame.decode();
    let outcome = if p.kind == "bottle" {
        RollOutcome::Bottle { target: p.target }
    } else {
        RollOutcome::Dice {
            results: p.results,
            rolls: p.rolls,
            endresult: p.endresult,
        }
    };
    ChatEvent::Roll {
        channel: p.channel,
        character: p.character,
        message: p.message,
        outcome,
    }
}

// ── Server ──────────────────────────────────────────────────────────

fn on_idn(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: CharacterPayload = frame.decode();
    ctx.effects.push(Effect::Identified);
    ChatEvent::Identified {
        character: p.character,
    }
}

fn on_pin(ctx: &mut Ctx<'_>, _frame: &Frame) -> ChatEvent {
    ctx.effects.push(Effect::ReplyKeepalive);
    ctx.effects.push(Effect::KeepaliveSeen);
    ChatEvent::Ping
}

fn on_var(ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: VariablePayload = frame.decode();
    if p.variable == MSG_FLOOD {
        match flood_delay(&p.value) {
            Some(delay) => {
                debug!(?delay, "tuned outgoing delay");
                ctx.effects.push(Effect::SetOutgoingDelay(delay));
            }
            None => warn!(value = %p.value, "unusable msg_flood value"),
        }
    }
    ctx.world.set_server_var(&p.variable, p.value.clone());
    ChatEvent::Variable {
        variable: p.variable,
        value: p.value,
    }
}

/// Outgoing delay derived from a `msg_flood` value, numeric or string.
fn flood_delay(value: &Value) -> Option<Duration> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Duration::try_from_secs_f64(seconds * FLOOD_SAFETY_FACTOR).ok()
}

fn on_hlo(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: MessagePayload = frame.decode();
    ChatEvent::Hello { message: p.message }
}

fn on_bro(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: MessagePayload = frame.decode();
    ChatEvent::Broadcast { message: p.message }
}

fn on_sys(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: SystemPayload = frame.decode();
    ChatEvent::System {
        message: p.message,
        channel: p.channel,
    }
}

fn on_err(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ErrorPayload = frame.decode();
    warn!(number = p.number, "server error: {}", p.message);
    ChatEvent::Error {
        number: p.number,
        message: p.message,
    }
}

fn on_upt(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: UptimePayload = frame.decode();
    ChatEvent::Uptime(Uptime {
        time: p.time,
        start_time: p.starttime,
        start_string: p.startstring,
        accepted: p.accepted,
        channels: p.channels,
        users: p.users,
        max_users: p.maxusers,
    })
}

fn on_fks(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: SearchResultsPayload = frame.decode();
    ChatEvent::SearchResults {
        characters: p.characters,
        kinks: p.kinks,
    }
}

fn on_kid(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ProfileDataPayload = frame.decode();
    ChatEvent::KinkData {
        kind: p.kind,
        message: p.message,
        key: p.key,
        value: p.value,
    }
}

fn on_prd(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: ProfileDataPayload = frame.decode();
    ChatEvent::ProfileData {
        kind: p.kind,
        message: p.message,
        key: p.key,
        value: p.value,
    }
}

fn on_rtb(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    let p: BridgePayload = frame.decode();
    let notice = match p.kind.as_str() {
        "trackadd" => BridgeNotice::TrackAdd { name: p.name },
        "trackrem" => BridgeNotice::TrackRemove { name: p.name },
        "friendadd" => BridgeNotice::FriendAdd { name: p.name },
        "friendremove" => BridgeNotice::FriendRemove { name: p.name },
        "friendrequest" => BridgeNotice::FriendRequest { name: p.name },
        "note" => BridgeNotice::Note {
            sender: p.sender,
            id: p.id,
            subject: p.subject,
        },
        _ => BridgeNotice::Other { kind: p.kind },
    };
    ChatEvent::Bridge(notice)
}

fn on_sfc(_ctx: &mut Ctx<'_>, frame: &Frame) -> ChatEvent {
    ChatEvent::Report {
        payload: frame.payload.clone(),
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

    fn dispatcher() -> Dispatcher {
        Dispatcher::new("Me")
    }

    #[test]
    fn every_handler_code_is_three_letters_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for (code, _) in HANDLERS {
            assert_eq!(code.len(), 3, "{code}");
            assert!(seen.insert(*code), "duplicate handler for {code}");
        }
    }

    #[test]
    fn unknown_code_yields_no_event() {
        let mut world = WorldState::new();
        let out = dispatcher().handle_frame(&mut world, r#"XYZ {"a":1}"#);
        assert_eq!(out.code, "XYZ");
        assert!(out.event.is_none());
        assert!(out.effects.is_empty());
    }

    #[test]
    fn ping_requests_reply_and_records_keepalive() {
        let mut world = WorldState::new();
        let out = dispatcher().handle_frame(&mut world, "PIN");
        assert_eq!(out.event, Some(ChatEvent::Ping));
        assert_eq!(out.effects, [Effect::ReplyKeepalive, Effect::KeepaliveSeen]);
    }

    #[test]
    fn identify_confirmation_produces_effect() {
        let mut world = WorldState::new();
        let out = dispatcher().handle_frame(&mut world, r#"IDN {"character":"Me"}"#);
        assert_eq!(out.effects, [Effect::Identified]);
        assert_eq!(
            out.event,
            Some(ChatEvent::Identified {
                character: "Me".into()
            })
        );
    }

    #[test]
    fn msg_flood_retunes_delay() {
        let mut world = WorldState::new();
        let out =
            dispatcher().handle_frame(&mut world, r#"VAR {"variable":"msg_flood","value":0.5}"#);
        assert_eq!(
            out.effects,
            [Effect::SetOutgoingDelay(Duration::from_millis(1250))]
        );
        assert_eq!(world.server_var("msg_flood"), Some(&serde_json::json!(0.5)));
    }

    #[test]
    fn msg_flood_accepts_string_values() {
        assert_eq!(
            flood_delay(&Value::String("2".into())),
            Some(Duration::from_secs(5))
        );
        assert_eq!(flood_delay(&serde_json::json!(-1)), None);
        assert_eq!(flood_delay(&Value::Null), None);
    }

    #[test]
    fn other_variables_only_stored() {
        let mut world = WorldState::new();
        let out = dispatcher()
            .handle_frame(&mut world, r#"VAR {"variable":"chat_max","value":4096}"#);
        assert!(out.effects.is_empty());
        assert_eq!(world.server_var("chat_max"), Some(&serde_json::json!(4096)));
    }

    #[test]
    fn own_join_creates_unknown_channel() {
        let mut world = WorldState::new();
        let d = dispatcher();
        d.handle_frame(&mut world, r#"NLN {"identity":"Me","gender":"Male","status":"online"}"#);
        d.handle_frame(
            &mut world,
            r#"JCH {"character":{"identity":"Me"},"channel":"ADH-1","title":"My Room"}"#,
        );

        let ch = world.channel("ADH-1").unwrap();
        assert_eq!(ch.title, "My Room");
        assert!(ch.is_member("Me"));
        assert_eq!(ch.member_count, 1);
    }

    #[test]
    fn foreign_join_to_unknown_channel_still_emits_event() {
        let mut world = WorldState::new();
        let d = dispatcher();
        d.handle_frame(&mut world, r#"NLN {"identity":"Bob","gender":"Male"}"#);
        let out = d.handle_frame(
            &mut world,
            r#"JCH {"character":{"identity":"Bob"},"channel":"Nowhere","title":"Nowhere"}"#,
        );
        assert!(matches!(out.event, Some(ChatEvent::ChannelJoined { .. })));
        assert_eq!(world.channel_count(), 0);
    }

    #[test]
    fn nln_defaults_status_to_online() {
        let mut world = WorldState::new();
        dispatcher().handle_frame(&mut world, r#"NLN {"identity":"Bob","gender":"Male"}"#);
        assert_eq!(world.user("bob").unwrap().status, Status::Online);
    }

    #[test]
    fn ign_init_add_delete() {
        let mut world = WorldState::new();
        let d = dispatcher();
        d.handle_frame(&mut world, r#"IGN {"action":"init","characters":["A","B"]}"#);
        d.handle_frame(&mut world, r#"IGN {"action":"add","character":"C"}"#);
        d.handle_frame(&mut world, r#"IGN {"action":"delete","character":"a"}"#);
        assert_eq!(world.ignored(), ["B", "C"]);
    }

    #[test]
    fn global_ops_track_promotions() {
        let mut world = WorldState::new();
        let d = dispatcher();
        d.handle_frame(&mut world, r#"ADL {"ops":["Admin"]}"#);
        d.handle_frame(&mut world, r#"AOP {"character":"Helper"}"#);
        d.handle_frame(&mut world, r#"DOP {"character":"admin"}"#);
        assert_eq!(world.global_ops(), ["Helper"]);
    }

    #[test]
    fn rll_bottle_and_dice() {
        let mut world = WorldState::new();
        let d = dispatcher();
        let out = d.handle_frame(
            &mut world,
            r#"RLL {"channel":"c","type":"bottle","character":"A","message":"m","target":"B"}"#,
        );
        assert!(matches!(
            out.event,
            Some(ChatEvent::Roll { outcome: RollOutcome::Bottle { ref target }, .. }) if target == "B"
        ));

        let out = d.handle_frame(
            &mut world,
            r#"RLL {"channel":"c","type":"dice","character":"A","message":"m","results":[3,4],"rolls":["2d6"],"endresult":7}"#,
        );
        assert!(matches!(
            out.event,
            Some(ChatEvent::Roll { outcome: RollOutcome::Dice { endresult: 7, .. }, .. })
        ));
    }

    #[test]
    fn rtb_note() {
        let mut world = WorldState::new();
        let out = dispatcher().handle_frame(
            &mut world,
            r#"RTB {"type":"note","sender":"Bob","id":12,"subject":"hi"}"#,
        );
        assert_eq!(
            out.event,
            Some(ChatEvent::Bridge(BridgeNotice::Note {
                sender: "Bob".into(),
                id: 12,
                subject: "hi".into(),
            }))
        );
    }

    #[test]
    fn malformed_payload_still_dispatches() {
        let mut world = WorldState::new();
        let out = dispatcher().handle_frame(&mut world, "FLN not-json");
        assert_eq!(
            out.event,
            Some(ChatEvent::UserOffline {
                character: String::new()
            })
        );
    }
}
