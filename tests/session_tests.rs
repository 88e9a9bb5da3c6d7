#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    connected, idn_frame, next_event, test_config, tickets, wait_for_event, FakeAccountService,
    MockConnector,
};
use fchat_session::protocol::SearchFilters;
use fchat_session::{
    ChatEvent, DisconnectReason, FChatError, FChatSession, SessionState, Status, TicketManager,
};
use serde_json::Value;
use tokio::time::Instant;

fn payload(frame: &str) -> Value {
    let (_, json) = frame.split_at(4);
    serde_json::from_str(json).unwrap()
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_identifies_with_ticket() {
    let (connector, mut handle) = MockConnector::single();
    handle.push(idn_frame());

    let config = test_config().with_client("test-client", "9.9");
    let (session, mut events) = FChatSession::connect(&connector, &tickets(), config)
        .await
        .unwrap();

    assert_eq!(connector.last_url().as_deref(), Some("ws://mock"));
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.is_active());
    assert_eq!(session.character(), "Me");

    let identify = handle.next_sent().await;
    assert!(identify.starts_with("IDN "));
    let body = payload(&identify);
    assert_eq!(body["method"], "ticket");
    assert_eq!(body["account"], "acct");
    assert_eq!(body["ticket"], "ticket-0");
    assert_eq!(body["character"], "Me");
    assert_eq!(body["cname"], "test-client");
    assert_eq!(body["cversion"], "9.9");

    assert_eq!(next_event(&mut events).await, ChatEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        ChatEvent::Identified {
            character: "Me".into()
        }
    );
}

#[tokio::test]
async fn refused_ticket_never_opens_transport() {
    let (connector, _handle) = MockConnector::single();
    let tickets = TicketManager::new(Arc::new(FakeAccountService::refusing()), "acct", "hunter2");

    let err = FChatSession::connect(&connector, &tickets, test_config())
        .await
        .unwrap_err();
    assert!(matches!(err, FChatError::Auth(_)), "{err:?}");
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn open_failure_is_connect_error() {
    let connector = MockConnector::failing();
    let err = FChatSession::connect(&connector, &tickets(), test_config())
        .await
        .unwrap_err();
    assert!(matches!(err, FChatError::Connect(_)), "{err:?}");
}

#[tokio::test]
async fn server_hang_up_before_identification() {
    let (connector, handle) = MockConnector::single();
    handle.hang_up();

    let err = FChatSession::connect(&connector, &tickets(), test_config())
        .await
        .unwrap_err();
    assert!(matches!(err, FChatError::TransportClosed), "{err:?}");
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn missing_identification_times_out() {
    let (connector, handle) = MockConnector::single();
    let config = test_config().with_identify_timeout(Duration::from_secs(5));

    let started = Instant::now();
    let err = FChatSession::connect(&connector, &tickets(), config)
        .await
        .unwrap_err();
    assert!(matches!(err, FChatError::Timeout), "{err:?}");
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn settle_delay_elapses_before_connect_returns() {
    let (connector, handle) = MockConnector::single();
    handle.push(idn_frame());
    let config = test_config().with_settle_delay(Duration::from_secs(3));

    let started = Instant::now();
    let (_session, _events) = FChatSession::connect(&connector, &tickets(), config)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
}

// ── Keepalive ───────────────────────────────────────────────────────

#[tokio::test]
async fn ping_is_answered() {
    let (_session, mut events, mut handle) = connected(test_config()).await;

    handle.push("PIN");
    assert_eq!(handle.next_sent().await, "PIN");
    wait_for_event(&mut events, |e| *e == ChatEvent::Ping).await;
}

#[tokio::test(start_paused = true)]
async fn silent_connection_goes_stale() {
    let config = test_config()
        .with_stale_after(Duration::from_secs(90))
        .with_watchdog_interval(Duration::from_secs(1));
    let (session, mut events, handle) = connected(config).await;

    let started = Instant::now();
    let reason = tokio::time::timeout(Duration::from_secs(300), session.closed())
        .await
        .unwrap();
    assert_eq!(reason, DisconnectReason::Stale);
    assert!(started.elapsed() >= Duration::from_secs(90));
    assert!(handle.is_closed());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.request_uptime(),
        Err(FChatError::StaleConnection)
    ));

    let last = tokio::time::timeout(
        Duration::from_secs(300),
        wait_for_event(&mut events, |e| matches!(e, ChatEvent::Disconnected { .. })),
    )
    .await
    .unwrap();
    assert_eq!(
        last,
        ChatEvent::Disconnected {
            reason: DisconnectReason::Stale
        }
    );
}

#[tokio::test(start_paused = true)]
async fn pings_keep_connection_alive() {
    let config = test_config()
        .with_stale_after(Duration::from_secs(30))
        .with_watchdog_interval(Duration::from_secs(1));
    let (session, _events, mut handle) = connected(config).await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.push("PIN");
        assert_eq!(handle.next_sent().await, "PIN");
    }
    assert!(session.is_active());
    assert_eq!(session.disconnect_reason(), None);
}

// ── Outgoing queue ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn commands_are_sent_in_order_with_spacing() {
    let config = test_config().with_outgoing_delay(Duration::from_secs(1));
    let (session, _events, mut handle) = connected(config).await;

    session.join_channel("Frontpage").unwrap();
    session.send_channel_message("Frontpage", "hello").unwrap();
    session.leave_channel("Frontpage").unwrap();

    let first = handle.next_sent().await;
    let t0 = Instant::now();
    let second = handle.next_sent().await;
    let t1 = Instant::now();
    let third = handle.next_sent().await;
    let t2 = Instant::now();

    assert!(first.starts_with("JCH "), "{first}");
    assert!(second.starts_with("MSG "), "{second}");
    assert!(third.starts_with("LCH "), "{third}");
    assert!(t1 - t0 >= Duration::from_secs(1));
    assert!(t2 - t1 >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn slow_write_does_not_shorten_the_next_gap() {
    let delay = Duration::from_secs(1);
    let config = test_config().with_outgoing_delay(delay);
    let (session, _events, mut handle) = connected(config).await;

    handle.stall_next_send(Duration::from_secs(3));
    for channel in ["A", "B", "C", "D"] {
        session.join_channel(channel).unwrap();
    }

    let mut arrivals = Vec::new();
    for _ in 0..4 {
        let frame = handle.next_sent().await;
        arrivals.push((payload(&frame)["channel"].clone(), Instant::now()));
    }

    let order: Vec<_> = arrivals.iter().map(|(c, _)| c.clone()).collect();
    assert_eq!(order, ["A", "B", "C", "D"]);
    for pair in arrivals.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap >= delay, "gap {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_keep_their_own_order() {
    let delay = Duration::from_millis(100);
    let config = test_config().with_outgoing_delay(delay);
    let (session, _events, mut handle) = connected(config).await;
    let session = Arc::new(session);

    let callers: Vec<_> = (0..3)
        .map(|caller| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                for step in ["A", "B", "C"] {
                    session.join_channel(&format!("{caller}-{step}")).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap();
    }

    let mut arrivals = Vec::new();
    for _ in 0..9 {
        let frame = handle.next_sent().await;
        let channel = payload(&frame)["channel"].as_str().unwrap().to_string();
        arrivals.push((channel, Instant::now()));
    }

    for caller in 0..3 {
        let steps: Vec<_> = arrivals
            .iter()
            .filter_map(|(c, _)| c.strip_prefix(&format!("{caller}-")).map(str::to_string))
            .collect();
        assert_eq!(steps, ["A", "B", "C"], "caller {caller}");
    }
    for pair in arrivals.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= delay);
    }
}

#[tokio::test(start_paused = true)]
async fn flood_variable_retunes_delay() {
    let (session, mut events, mut handle) = connected(test_config()).await;

    handle.push(r#"VAR {"variable":"msg_flood","value":0.5}"#);
    wait_for_event(&mut events, |e| matches!(e, ChatEvent::Variable { .. })).await;
    assert_eq!(session.outgoing_delay(), Duration::from_millis(1250));
    assert_eq!(
        session.world().await.server_var("msg_flood"),
        Some(&serde_json::json!(0.5))
    );

    session.request_uptime().unwrap();
    session.request_public_channels().unwrap();
    let _ = handle.next_non_ping().await;
    let t0 = Instant::now();
    let _ = handle.next_non_ping().await;
    assert!(t0.elapsed() >= Duration::from_millis(1250));
}

#[tokio::test]
async fn outbound_text_is_unescaped() {
    let (session, _events, mut handle) = connected(test_config()).await;

    session
        .send_channel_message("Frontpage", "a &lt;b&gt; &amp; c")
        .unwrap();
    let frame = handle.next_non_ping().await;
    assert_eq!(payload(&frame)["message"], "a <b> & c");

    session
        .send_private_message("Bob", "a &lt;b&gt; &amp; c")
        .unwrap();
    let frame = handle.next_non_ping().await;
    assert!(frame.starts_with("PRI "));
    assert_eq!(payload(&frame)["recipient"], "Bob");
    assert_eq!(payload(&frame)["message"], "a <b> &amp; c");
}

#[tokio::test]
async fn admin_and_query_commands_reach_the_wire() {
    let (session, _events, mut handle) = connected(test_config()).await;

    session.server_timeout("Troll", 30, "spam").unwrap();
    session.spin_bottle("Frontpage").unwrap();
    session
        .search(
            vec!["523".into()],
            SearchFilters {
                genders: vec!["Female".into()],
                ..SearchFilters::default()
            },
        )
        .unwrap();
    session.request_ignore_list().unwrap();

    let tmo = handle.next_non_ping().await;
    assert!(tmo.starts_with("TMO "));
    assert_eq!(payload(&tmo)["time"], 30);
    assert_eq!(payload(&tmo)["reason"], "spam");

    let rll = handle.next_non_ping().await;
    assert_eq!(payload(&rll)["dice"], "bottle");

    let fks = handle.next_non_ping().await;
    assert!(fks.starts_with("FKS "));
    assert_eq!(payload(&fks)["kinks"], serde_json::json!(["523"]));
    assert_eq!(payload(&fks)["genders"], serde_json::json!(["Female"]));
    assert!(payload(&fks).get("roles").is_none());

    let ign = handle.next_non_ping().await;
    assert_eq!(payload(&ign), serde_json::json!({ "action": "list" }));
}

// ── Validation ──────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_arguments_are_rejected_before_queueing() {
    let (session, _events, _handle) = connected(test_config()).await;

    assert!(matches!(
        session.join_channel(""),
        Err(FChatError::InvalidArgument("channel"))
    ));
    assert!(matches!(
        session.send_private_message("Bob", ""),
        Err(FChatError::InvalidArgument("message"))
    ));
    assert!(matches!(
        session.timeout("Frontpage", "Troll", 0),
        Err(FChatError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.set_status(Status::Crown, "hi"),
        Err(FChatError::InvalidArgument("status"))
    ));
    assert!(matches!(
        session.search(Vec::new(), SearchFilters::default()),
        Err(FChatError::InvalidArgument("kinks"))
    ));
    assert_eq!(session.queued(), 0);
}

// ── World state ─────────────────────────────────────────────────────

#[tokio::test]
async fn inbound_frames_update_world_before_event() {
    let (session, mut events, handle) = connected(test_config()).await;

    handle.push(
        r#"LIS {"characters":[["Me","Male","online",""],["Alice","Female","online",""],["Bob","Male","busy","afk"]]}"#,
    );
    handle.push(r#"JCH {"character":{"identity":"Me"},"channel":"ADH-1234","title":"Room"}"#);
    handle.push(r#"JCH {"character":{"identity":"Alice"},"channel":"ADH-1234","title":"Room"}"#);

    let joined = wait_for_event(&mut events, |e| {
        matches!(e, ChatEvent::ChannelJoined { character, .. } if character == "Alice")
    })
    .await;
    assert!(matches!(joined, ChatEvent::ChannelJoined { .. }));

    let world = session.world().await;
    assert_eq!(world.user_count(), 3);
    assert_eq!(world.user("bob").unwrap().status, Status::Busy);
    let channel = world.channel("ADH-1234").unwrap();
    assert_eq!(channel.member_count, 2);
    assert!(channel.is_member("alice"));
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test]
async fn close_is_idempotent_and_final() {
    let (mut session, mut events, handle) = connected(test_config()).await;
    for _ in 0..5 {
        session.request_uptime().unwrap();
    }

    session.close().await;
    session.close().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.queued(), 0);
    assert_eq!(
        session.disconnect_reason(),
        Some(DisconnectReason::ClientClosed)
    );
    assert_eq!(session.closed().await, DisconnectReason::ClientClosed);
    assert!(handle.is_closed());
    assert!(matches!(
        session.join_channel("Frontpage"),
        Err(FChatError::NotConnected)
    ));

    let last = wait_for_event(&mut events, |e| matches!(e, ChatEvent::Disconnected { .. })).await;
    assert_eq!(
        last,
        ChatEvent::Disconnected {
            reason: DisconnectReason::ClientClosed
        }
    );
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn server_close_ends_session() {
    let (session, mut events, handle) = connected(test_config()).await;

    handle.hang_up();
    assert_eq!(session.closed().await, DisconnectReason::ServerClosed);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_active());
    assert!(matches!(
        session.request_uptime(),
        Err(FChatError::NotConnected)
    ));

    wait_for_event(&mut events, |e| {
        *e == ChatEvent::Disconnected {
            reason: DisconnectReason::ServerClosed,
        }
    })
    .await;
}

#[tokio::test]
async fn transport_error_ends_session() {
    let (session, _events, handle) = connected(test_config()).await;

    handle.fail("reset by peer");
    let reason = session.closed().await;
    assert!(
        matches!(&reason, DisconnectReason::Transport(msg) if msg.contains("reset by peer")),
        "{reason:?}"
    );
}

#[tokio::test]
async fn dropping_session_closes_event_stream() {
    let (session, mut events, _handle) = connected(test_config()).await;
    drop(session);

    tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await
    .unwrap();
}
