mod common;

use common::{OUTSIDER, STUDENT, SUPERVISOR, harness, seed_thread};
use serde_json::json;
use thesis_comm::{
    comm::protocol::HubEvent,
    db::{self, MediaKind},
    gate,
};

#[tokio::test]
async fn gate_tracks_membership_and_enablement() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, false).await;

    for user in [SUPERVISOR, STUDENT, OUTSIDER] {
        assert!(!gate::is_participant(&h.pool, thread_id, user, true).await.unwrap());
    }
    assert!(gate::is_participant(&h.pool, thread_id, STUDENT, false).await.unwrap());
    assert!(!gate::is_participant(&h.pool, thread_id, OUTSIDER, false).await.unwrap());

    db::threads::set_enabled(&h.pool, thread_id, true).await.unwrap();
    assert!(gate::is_participant(&h.pool, thread_id, SUPERVISOR, true).await.unwrap());
    assert!(gate::is_participant(&h.pool, thread_id, STUDENT, true).await.unwrap());
    assert!(!gate::is_participant(&h.pool, thread_id, OUTSIDER, true).await.unwrap());

    assert!(!gate::is_participant(&h.pool, 9999, SUPERVISOR, false).await.unwrap());
}

#[tokio::test]
async fn disabled_thread_refuses_every_operation_for_everyone() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, false).await;

    for user in [SUPERVISOR, STUDENT, OUTSIDER] {
        let client = h.client(Some(user)).await;
        let ops = [
            ("JoinThread", vec![json!(thread_id)]),
            ("SendMessage", vec![json!(thread_id), json!("hi")]),
            ("SendOffer", vec![json!(thread_id), json!({"sdp": "v=0"})]),
            ("SendAnswer", vec![json!(thread_id), json!({"sdp": "v=0"})]),
            ("SendIceCandidate", vec![json!(thread_id), json!({"candidate": "c"})]),
            ("StartCall", vec![json!(thread_id), json!("Audio")]),
        ];
        for (target, args) in ops {
            assert_eq!(client.call(target, args).await.as_deref(), Some("not allowed"), "{user} {target}");
        }
    }

    assert!(db::messages::recent(&h.pool, thread_id, 50).await.unwrap().is_empty());
    assert!(db::calls::open_sessions(&h.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn enabled_thread_admits_exactly_its_two_members() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;

    for user in [SUPERVISOR, STUDENT] {
        let client = h.client(Some(user)).await;
        assert_eq!(client.call("JoinThread", vec![json!(thread_id)]).await, None);
    }

    let outsider = h.client(Some(OUTSIDER)).await;
    assert_eq!(
        outsider.call("JoinThread", vec![json!(thread_id)]).await.as_deref(),
        Some("not allowed")
    );
    assert_eq!(
        outsider.call("SendMessage", vec![json!(thread_id), json!("let me in")]).await.as_deref(),
        Some("not allowed")
    );
}

#[tokio::test]
async fn anonymous_connections_are_unauthenticated() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;
    let anon = h.client(None).await;

    assert_eq!(anon.call("JoinThread", vec![json!(thread_id)]).await.as_deref(), Some("unauthenticated"));
    assert_eq!(anon.call("EndCall", vec![json!(1)]).await.as_deref(), Some("unauthenticated"));
}

#[tokio::test]
async fn missing_thread_is_not_allowed() {
    let h = harness().await;
    let client = h.client(Some(SUPERVISOR)).await;

    assert_eq!(client.call("JoinThread", vec![json!(404)]).await.as_deref(), Some("not allowed"));
}

#[tokio::test]
async fn malformed_invocations_are_bad_requests() {
    let h = harness().await;
    let client = h.client(Some(SUPERVISOR)).await;

    let error = client.call("JoinThread", vec![json!("forty-two")]).await.unwrap();
    assert!(error.starts_with("bad request"), "{error}");

    let error = client.call("Teleport", vec![]).await.unwrap();
    assert!(error.starts_with("bad request"), "{error}");
}

// T1 joins thread 42, S1 sends "Hello": persisted and broadcast to the group.
#[tokio::test]
async fn scenario_join_then_receive() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;

    let mut supervisor = h.client(Some(SUPERVISOR)).await;
    let student = h.client(Some(STUDENT)).await;

    assert_eq!(supervisor.call("JoinThread", vec![json!(thread_id)]).await, None);
    assert_eq!(student.call("SendMessage", vec![json!(thread_id), json!("Hello")]).await, None);

    let stored = db::messages::recent(&h.pool, thread_id, 50).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "Hello");
    assert_eq!(stored[0].sender_user_id, STUDENT);

    match supervisor.next_event().await {
        HubEvent::ReceiveMessage(view) => {
            assert_eq!(view.text, "Hello");
            assert_eq!(view.sender_user_id, STUDENT);
            assert_eq!(view.sender_name, "Sam Student");
            assert_eq!(view.thread_id, thread_id);
            assert_eq!(view.id, stored[0].id);
        }
        other => panic!("unexpected {other:?}"),
    }
}

// Same pair, thread disabled between two sends on one open connection.
#[tokio::test]
async fn scenario_disable_mid_connection() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;

    let mut supervisor = h.client(Some(SUPERVISOR)).await;
    let student = h.client(Some(STUDENT)).await;
    supervisor.call("JoinThread", vec![json!(thread_id)]).await;
    student.call("JoinThread", vec![json!(thread_id)]).await;

    assert_eq!(student.call("SendMessage", vec![json!(thread_id), json!("first")]).await, None);
    assert!(matches!(supervisor.next_event().await, HubEvent::ReceiveMessage(_)));

    db::threads::set_enabled(&h.pool, thread_id, false).await.unwrap();
    h.clock.advance(std::time::Duration::from_secs(2));

    assert_eq!(
        student.call("SendMessage", vec![json!(thread_id), json!("second")]).await.as_deref(),
        Some("not allowed")
    );
    supervisor.assert_silent().await;

    let stored = db::messages::recent(&h.pool, thread_id, 50).await.unwrap();
    assert_eq!(stored.len(), 1);
}

// Thread disabled: S1 cannot start a video call and no session is recorded.
#[tokio::test]
async fn scenario_start_call_on_disabled_thread() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, false).await;
    let student = h.client(Some(STUDENT)).await;

    assert_eq!(
        student.call("StartCall", vec![json!(thread_id), json!("Video")]).await.as_deref(),
        Some("not allowed")
    );

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM call_sessions")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// T1 starts an audio call, S1 ends it, X is refused and the end time stays S1's.
#[tokio::test]
async fn scenario_end_call_by_peer_then_outsider() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;

    let mut supervisor = h.client(Some(SUPERVISOR)).await;
    let student = h.client(Some(STUDENT)).await;
    supervisor.call("JoinThread", vec![json!(thread_id)]).await;
    student.call("JoinThread", vec![json!(thread_id)]).await;

    assert_eq!(supervisor.call("StartCall", vec![json!(thread_id), json!("Audio")]).await, None);
    let call_id = match supervisor.next_event().await {
        HubEvent::CallStarted(started) => {
            assert_eq!(started.kind, MediaKind::Audio);
            started.call_id
        }
        other => panic!("unexpected {other:?}"),
    };
    assert!(db::calls::find(&h.pool, call_id).await.unwrap().unwrap().is_open());

    assert_eq!(student.call("EndCall", vec![json!(call_id)]).await, None);
    match supervisor.next_event().await {
        HubEvent::CallEnded(ended) => assert_eq!(ended.call_id, call_id),
        other => panic!("unexpected {other:?}"),
    }
    let ended_at = db::calls::find(&h.pool, call_id).await.unwrap().unwrap().ended_at;
    assert!(ended_at.is_some());

    let outsider = h.client(Some(OUTSIDER)).await;
    assert_eq!(outsider.call("EndCall", vec![json!(call_id)]).await.as_deref(), Some("not allowed"));

    let call = db::calls::find(&h.pool, call_id).await.unwrap().unwrap();
    assert_eq!(call.ended_at, ended_at);
    supervisor.assert_silent().await;
}

#[tokio::test]
async fn outsider_cannot_end_an_open_call() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;

    let mut supervisor = h.client(Some(SUPERVISOR)).await;
    supervisor.call("JoinThread", vec![json!(thread_id)]).await;
    assert_eq!(supervisor.call("StartCall", vec![json!(thread_id), json!("Video")]).await, None);

    let call_id = match supervisor.next_event().await {
        HubEvent::CallStarted(started) => started.call_id,
        other => panic!("unexpected {other:?}"),
    };

    let outsider = h.client(Some(OUTSIDER)).await;
    assert_eq!(outsider.call("EndCall", vec![json!(call_id)]).await.as_deref(), Some("not allowed"));

    let call = db::calls::find(&h.pool, call_id).await.unwrap().unwrap();
    assert!(call.is_open());
    supervisor.assert_silent().await;
}

#[tokio::test]
async fn participants_cannot_end_calls_once_the_thread_is_disabled() {
    let h = harness().await;
    let thread_id = seed_thread(&h.pool, true).await;
    let supervisor = h.client(Some(SUPERVISOR)).await;

    assert_eq!(supervisor.call("StartCall", vec![json!(thread_id), json!("Audio")]).await, None);
    let call = db::calls::open_sessions(&h.pool).await.unwrap().remove(0);

    db::threads::set_enabled(&h.pool, thread_id, false).await.unwrap();
    for user in [SUPERVISOR, STUDENT] {
        let client = h.client(Some(user)).await;
        assert_eq!(client.call("EndCall", vec![json!(call.id)]).await.as_deref(), Some("not allowed"));
    }
    assert!(db::calls::find(&h.pool, call.id).await.unwrap().unwrap().is_open());
}

#[tokio::test]
async fn thread_creation_is_idempotent_and_starts_disabled() {
    let h = harness().await;
    let supervisor = db::profiles::create(&h.pool, SUPERVISOR, "Dr. Tanaka").await.unwrap();
    let student = db::profiles::create(&h.pool, STUDENT, "Sam Student").await.unwrap();

    let first = db::threads::create(&h.pool, supervisor, student).await.unwrap();
    let again = db::threads::create(&h.pool, supervisor, student).await.unwrap();
    assert_eq!(first, again);

    let thread = db::threads::find(&h.pool, first).await.unwrap().unwrap();
    assert!(!thread.enabled);
    assert_eq!(thread.supervisor_profile_id, supervisor);
    assert_eq!(thread.student_profile_id, student);

    assert!(db::threads::set_enabled(&h.pool, first, true).await.unwrap());
    assert!(db::threads::find(&h.pool, first).await.unwrap().unwrap().enabled);
    assert!(!db::threads::set_enabled(&h.pool, 777, true).await.unwrap());
}
