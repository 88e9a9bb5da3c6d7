#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

//! World-state scenarios driven through the public dispatcher.

use std::time::Duration;

use fchat_session::dispatch::{Dispatcher, Effect};
use fchat_session::event::{ChannelListing, RollOutcome};
use fchat_session::{ChannelMode, ChatEvent, Status, WorldState};

fn run(world: &mut WorldState, frames: &[&str]) -> Vec<Option<ChatEvent>> {
    let dispatcher = Dispatcher::new("Me");
    frames
        .iter()
        .map(|raw| dispatcher.handle_frame(world, raw).event)
        .collect()
}

#[test]
fn roster_then_offline_removes_user_everywhere() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[
            r#"LIS {"characters":[["Me","Male","online",""],["Alice","Female","looking","hi"],["Bob","Male","online",""]]}"#,
            r#"JCH {"character":{"identity":"Me"},"channel":"Frontpage","title":"Frontpage"}"#,
            r#"JCH {"character":{"identity":"Alice"},"channel":"Frontpage","title":"Frontpage"}"#,
            r#"FLN {"character":"Alice"}"#,
        ],
    );

    assert!(world.user("Alice").is_none());
    assert!(world.user("bob").is_some());
    let channel = world.channel("frontpage").unwrap();
    assert_eq!(channel.member_count, 1);
    assert!(!channel.is_member("Alice"));
}

#[test]
fn offline_user_leaves_only_the_rest_of_the_roster() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[
            r#"LIS {"characters":[["Alice","Female","online",""],["Bob","Male","busy","brb"]]}"#,
            r#"FLN {"character":"Alice"}"#,
        ],
    );

    assert_eq!(world.user_count(), 1);
    let bob = world.user("Bob").unwrap();
    assert_eq!(bob.status, Status::Busy);
    assert_eq!(bob.status_message, "brb");
}

#[test]
fn public_channel_list_sets_mode_and_population() {
    let mut world = WorldState::new();
    let events = run(
        &mut world,
        &[r#"CHA {"channels":[{"name":"Frontpage","mode":"both","characters":42}]}"#],
    );

    assert_eq!(
        events[0],
        Some(ChatEvent::PublicChannels {
            channels: vec![ChannelListing {
                id: "Frontpage".into(),
                title: "Frontpage".into(),
                mode: Some(ChannelMode::Both),
                characters: 42,
            }]
        })
    );
    let channel = world.channel("Frontpage").unwrap();
    assert_eq!(channel.mode, Some(ChannelMode::Both));
    assert_eq!(channel.member_count, 42);
    assert!(channel.members().is_empty());
}

#[test]
fn private_rooms_resolve_by_id() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[r#"ORS {"channels":[{"name":"ADH-9f1c","title":"Tea Room","characters":3}]}"#],
    );

    let by_title = world.channel("Tea Room").unwrap();
    assert_eq!(by_title.id, "ADH-9f1c");
    assert_eq!(world.channel("ADH-9f1c").unwrap().title, "Tea Room");
}

#[test]
fn flood_variable_yields_scaled_delay() {
    let dispatcher = Dispatcher::new("Me");
    let mut world = WorldState::new();
    let out = dispatcher.handle_frame(&mut world, r#"VAR {"variable":"msg_flood","value":0.5}"#);
    assert_eq!(
        out.effects,
        [Effect::SetOutgoingDelay(Duration::from_millis(1250))]
    );
}

#[test]
fn join_and_leave_track_counts() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[
            r#"NLN {"identity":"Me","gender":"Male","status":"online"}"#,
            r#"NLN {"identity":"Carol","gender":"Female","status":"online"}"#,
            r#"JCH {"character":{"identity":"Me"},"channel":"ADH-1","title":"Lounge"}"#,
            r#"JCH {"character":{"identity":"Carol"},"channel":"ADH-1","title":"Lounge"}"#,
        ],
    );
    assert_eq!(world.channel("ADH-1").unwrap().member_count, 2);

    run(&mut world, &[r#"LCH {"channel":"ADH-1","character":"Carol"}"#]);
    let channel = world.channel("ADH-1").unwrap();
    assert_eq!(channel.member_count, 1);
    assert_eq!(world.channel_members("ADH-1").len(), 1);
}

#[test]
fn join_from_stranger_for_unknown_channel_is_tolerated() {
    let mut world = WorldState::new();
    let events = run(
        &mut world,
        &[
            r#"NLN {"identity":"Dave","gender":"Male","status":"online"}"#,
            r#"JCH {"character":{"identity":"Dave"},"channel":"Nowhere","title":"Nowhere"}"#,
        ],
    );
    assert!(matches!(events[1], Some(ChatEvent::ChannelJoined { .. })));
    assert!(world.channel("Nowhere").is_none());
}

#[test]
fn status_change_updates_user() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[
            r#"NLN {"identity":"Alice","gender":"Female","status":"online"}"#,
            r#"STA {"status":"away","character":"Alice","statusmsg":"brb"}"#,
        ],
    );
    let alice = world.user("alice").unwrap();
    assert_eq!(alice.status, Status::Away);
    assert_eq!(alice.status_message, "brb");
}

#[test]
fn bottle_spin_reports_target() {
    let mut world = WorldState::new();
    let events = run(
        &mut world,
        &[r#"RLL {"channel":"Frontpage","type":"bottle","character":"Alice","message":"spins","target":"Bob"}"#],
    );
    assert!(matches!(
        &events[0],
        Some(ChatEvent::Roll { outcome: RollOutcome::Bottle { target }, .. }) if target == "Bob"
    ));
}

#[test]
fn inbound_messages_are_delivered_verbatim() {
    let mut world = WorldState::new();
    let events = run(
        &mut world,
        &[r#"MSG {"character":"Alice","message":"a &lt;b&gt; &amp;","channel":"Frontpage"}"#],
    );
    assert_eq!(
        events[0],
        Some(ChatEvent::ChannelMessage {
            channel: "Frontpage".into(),
            character: "Alice".into(),
            message: "a &lt;b&gt; &amp;".into(),
        })
    );
}

// ── Channel roster and roles ────────────────────────────────────────

/// Me, Alice, Bob and Carol online; the public channel "Lounge" known.
fn lounge() -> WorldState {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[
            r#"LIS {"characters":[["Me","Male","online",""],["Alice","Female","online",""],["Bob","Male","online",""],["Carol","Female","online",""]]}"#,
            r#"CHA {"channels":[{"name":"Lounge","mode":"chat","characters":0}]}"#,
        ],
    );
    world
}

#[test]
fn initial_roster_replaces_members_and_sets_mode() {
    let mut world = lounge();
    let events = run(
        &mut world,
        &[
            r#"JCH {"character":{"identity":"Carol"},"channel":"Lounge","title":"Lounge"}"#,
            r#"ICH {"users":[{"identity":"Me"},{"identity":"Alice"},{"identity":"Ghost"}],"channel":"Lounge","mode":"both"}"#,
        ],
    );

    assert_eq!(
        events[1],
        Some(ChatEvent::ChannelRoster {
            channel: "Lounge".into(),
            users: vec!["Me".into(), "Alice".into(), "Ghost".into()],
            mode: Some(ChannelMode::Both),
        })
    );
    let channel = world.channel("Lounge").unwrap();
    assert_eq!(channel.member_count, 2);
    assert!(channel.is_member("alice"));
    assert!(!channel.is_member("Carol"));
    assert!(!channel.is_member("Ghost"));
    assert_eq!(channel.mode, Some(ChannelMode::Both));
}

#[test]
fn op_list_sets_owner_and_operators() {
    let mut world = lounge();
    run(
        &mut world,
        &[r#"COL {"channel":"Lounge","oplist":["Alice","Bob","Carol"]}"#],
    );
    let channel = world.channel("Lounge").unwrap();
    assert_eq!(channel.owner.as_deref(), Some("Alice"));
    assert_eq!(channel.operators, ["Bob", "Carol"]);

    let mut world = lounge();
    run(&mut world, &[r#"COL {"channel":"Lounge","oplist":["","Bob"]}"#]);
    let channel = world.channel("Lounge").unwrap();
    assert_eq!(channel.owner, None);
    assert_eq!(channel.operators, ["Bob"]);
}

#[test]
fn operator_promotion_and_demotion() {
    let mut world = lounge();
    let events = run(
        &mut world,
        &[
            r#"COA {"character":"Bob","channel":"Lounge"}"#,
            r#"COA {"character":"bob","channel":"Lounge"}"#,
            r#"COA {"character":"Carol","channel":"Lounge"}"#,
            r#"COR {"character":"BOB","channel":"Lounge"}"#,
        ],
    );
    assert_eq!(
        events[3],
        Some(ChatEvent::ChannelOpRemoved {
            channel: "Lounge".into(),
            character: "BOB".into(),
        })
    );
    let channel = world.channel("Lounge").unwrap();
    assert_eq!(channel.operators, ["Carol"]);
    assert!(channel.is_operator("carol"));
    assert!(!channel.is_operator("Bob"));
}

#[test]
fn owner_description_and_mode_updates() {
    let mut world = lounge();
    let events = run(
        &mut world,
        &[
            r#"CSO {"character":"Alice","channel":"Lounge"}"#,
            r#"CDS {"channel":"Lounge","description":"[b]Welcome[/b]"}"#,
            r#"RMO {"mode":"ads","channel":"Lounge"}"#,
        ],
    );
    assert_eq!(
        events[2],
        Some(ChatEvent::ChannelModeChanged {
            channel: "Lounge".into(),
            mode: Some(ChannelMode::Ads),
        })
    );
    let channel = world.channel("Lounge").unwrap();
    assert_eq!(channel.owner.as_deref(), Some("Alice"));
    assert_eq!(channel.description, "[b]Welcome[/b]");
    assert_eq!(channel.mode, Some(ChannelMode::Ads));
}

#[test]
fn role_updates_for_unknown_channel_change_nothing() {
    let mut world = lounge();
    let events = run(
        &mut world,
        &[
            r#"CSO {"character":"Alice","channel":"Elsewhere"}"#,
            r#"CDS {"channel":"Elsewhere","description":"x"}"#,
        ],
    );
    assert!(events.iter().all(Option::is_some));
    assert!(world.channel("Elsewhere").is_none());
    assert_eq!(world.channel("Lounge").unwrap().owner, None);
}

#[test]
fn kick_ban_and_timeout_remove_the_member() {
    let mut world = lounge();
    run(
        &mut world,
        &[
            r#"JCH {"character":{"identity":"Me"},"channel":"Lounge","title":"Lounge"}"#,
            r#"JCH {"character":{"identity":"Alice"},"channel":"Lounge","title":"Lounge"}"#,
            r#"JCH {"character":{"identity":"Bob"},"channel":"Lounge","title":"Lounge"}"#,
            r#"JCH {"character":{"identity":"Carol"},"channel":"Lounge","title":"Lounge"}"#,
        ],
    );
    assert_eq!(world.channel("Lounge").unwrap().member_count, 4);

    let events = run(
        &mut world,
        &[
            r#"CKU {"operator":"Me","channel":"Lounge","character":"Alice"}"#,
            r#"CBU {"operator":"Me","channel":"Lounge","character":"Bob"}"#,
            r#"CTU {"operator":"Me","channel":"Lounge","character":"Carol","length":30}"#,
        ],
    );

    assert_eq!(
        events[0],
        Some(ChatEvent::ChannelKick {
            operator: "Me".into(),
            channel: "Lounge".into(),
            character: "Alice".into(),
        })
    );
    assert_eq!(
        events[1],
        Some(ChatEvent::ChannelBan {
            operator: "Me".into(),
            channel: "Lounge".into(),
            character: "Bob".into(),
        })
    );
    assert_eq!(
        events[2],
        Some(ChatEvent::ChannelTimeout {
            operator: "Me".into(),
            channel: "Lounge".into(),
            character: "Carol".into(),
            minutes: 30,
        })
    );
    let channel = world.channel("Lounge").unwrap();
    assert_eq!(channel.member_count, 1);
    assert!(channel.is_member("Me"));
    // Removal from a channel does not take the user offline.
    assert!(world.user("Alice").is_some());
}

#[test]
fn friends_list_replaces_previous() {
    let mut world = WorldState::new();
    let events = run(
        &mut world,
        &[
            r#"FRL {"characters":["Alice","Bob"]}"#,
            r#"FRL {"characters":["Carol"]}"#,
        ],
    );
    assert_eq!(
        events[1],
        Some(ChatEvent::Friends {
            characters: vec!["Carol".into()]
        })
    );
    assert_eq!(world.friends(), ["Carol"]);
}

// ── Malformed input ─────────────────────────────────────────────────

#[test]
fn nameless_online_notice_adds_no_user() {
    let mut world = WorldState::new();
    let events = run(
        &mut world,
        &[
            "NLN",
            r#"NLN {"gender":"Male","status":"online"}"#,
            r#"NLN {"identity":"Bob","gender":"Male","status":7}"#,
        ],
    );
    assert!(events.iter().all(Option::is_some));
    assert_eq!(world.user_count(), 1);
    assert!(world.user("").is_none());
    assert_eq!(world.user("Bob").unwrap().status, Status::Online);
}

#[test]
fn null_status_message_still_applies_status() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[
            r#"NLN {"identity":"Bob","gender":"Male","status":"online"}"#,
            r#"STA {"character":"Bob","status":"busy","statusmsg":null}"#,
        ],
    );
    let bob = world.user("Bob").unwrap();
    assert_eq!(bob.status, Status::Busy);
    assert_eq!(bob.status_message, "");
}

#[test]
fn channel_list_keeps_entries_with_null_fields() {
    let mut world = WorldState::new();
    run(
        &mut world,
        &[r#"CHA {"channels":[{"name":"Frontpage","mode":"both","characters":null},{"name":"Dev","mode":"chat","characters":4}]}"#],
    );
    assert_eq!(world.channel("Frontpage").unwrap().member_count, 0);
    assert_eq!(world.channel("Dev").unwrap().member_count, 4);
}

// ── Name matching ───────────────────────────────────────────────────

#[test]
fn non_ascii_names_match_case_insensitively() {
    let dispatcher = Dispatcher::new("Émile");
    let mut world = WorldState::new();
    for raw in [
        r#"NLN {"identity":"Émile","gender":"Male","status":"online"}"#,
        r#"NLN {"identity":"Zoë","gender":"Female","status":"online"}"#,
        r#"JCH {"character":{"identity":"éMILE"},"channel":"ADH-7","title":"Salon"}"#,
        r#"COA {"character":"Zoë","channel":"ADH-7"}"#,
        r#"IGN {"action":"add","character":"Zoë"}"#,
        r#"AOP {"character":"Zoë"}"#,
    ] {
        dispatcher.handle_frame(&mut world, raw);
    }

    let channel = world.channel("ADH-7").unwrap();
    assert_eq!(channel.title, "Salon");
    assert!(channel.is_member("ÉMILE"));
    assert!(channel.is_operator("ZOË"));
    assert!(world.is_ignored("zoË"));

    for raw in [
        r#"COR {"character":"ZOË","channel":"ADH-7"}"#,
        r#"IGN {"action":"delete","character":"ZOË"}"#,
        r#"DOP {"character":"zoë"}"#,
    ] {
        dispatcher.handle_frame(&mut world, raw);
    }
    let channel = world.channel("ADH-7").unwrap();
    assert!(channel.operators.is_empty());
    assert!(world.ignored().is_empty());
    assert!(world.global_ops().is_empty());
}
