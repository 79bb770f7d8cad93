use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;
use uuid::Uuid;

use quorum_api::{AppState, AppStateInner, router};
use quorum_db::Database;
use quorum_gateway::Dispatcher;
use quorum_types::Fraction;
use quorum_types::api::{Claims, CreateSessionRequest, OptionInput, UnitRegistration};
use quorum_types::models::{Privacy, Role, WeightingMode};
use quorum_voting::minutes::DEFAULT_LEGAL_BASIS;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "gateway-test-secret";
const TENANT: &str = "condo-1";

fn token(participant: Uuid, name: &str, role: Role) -> String {
    let claims = Claims {
        sub: participant,
        name: name.into(),
        role,
        tenant_id: TENANT.into(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Serve the router on an ephemeral port with one open session.
async fn serve(resident: Uuid) -> (AppState, String, Uuid) {
    let db = Database::open_in_memory().unwrap();
    db.register_units(
        TENANT,
        &[UnitRegistration {
            unit_id: "101".into(),
            owner_participant_id: resident,
            fraction: Fraction::from_ppm(40_000),
        }],
    )
    .unwrap();
    let now = Utc::now();
    let session = db
        .create_session(
            TENANT,
            Uuid::new_v4(),
            &CreateSessionRequest {
                title: "AGE".into(),
                description: String::new(),
                scheduled_start: now - chrono::Duration::minutes(1),
                scheduled_end: now + chrono::Duration::hours(1),
                privacy: Privacy::Open,
                options: ["Sim", "Não"]
                    .iter()
                    .map(|l| OptionInput { id: None, label: l.to_string() })
                    .collect(),
                live_stream_ref: None,
                attachment_ref: None,
            },
            now,
        )
        .unwrap();

    let state = Arc::new(AppStateInner {
        db: Arc::new(db),
        dispatcher: Dispatcher::new(),
        jwt_secret: SECRET.into(),
        weighting: WeightingMode::PerUnit,
        legal_basis: DEFAULT_LEGAL_BASIS.into(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, format!("ws://{}/gateway", addr), session.id)
}

async fn send(ws: &mut Socket, command: Value) {
    ws.send(Message::text(command.to_string())).await.unwrap();
}

/// Read until an event of `kind` arrives, skipping everything else.
async fn next_event(ws: &mut Socket, kind: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = ws.next().await.expect("socket closed").unwrap();
            if let Message::Text(text) = msg {
                let event: Value = serde_json::from_str(text.as_str()).unwrap();
                if event["type"] == kind {
                    return event;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
}

#[tokio::test]
async fn chat_and_tally_reach_session_subscribers() {
    let resident = Uuid::new_v4();
    let (state, url, session_id) = serve(resident).await;
    let resident_token = token(resident, "Maria", Role::Resident);

    let (mut alice, _) = connect_async(format!("{}?token={}", url, resident_token)).await.unwrap();
    let ready = next_event(&mut alice, "READY").await;
    assert_eq!(ready["data"]["display_name"], "Maria");

    let (mut bob, _) = connect_async(format!(
        "{}?token={}",
        url,
        token(Uuid::new_v4(), "Síndico", Role::Manager)
    ))
    .await
    .unwrap();
    next_event(&mut bob, "READY").await;

    for ws in [&mut alice, &mut bob] {
        send(ws, json!({ "type": "SUBSCRIBE", "data": { "session_id": session_id } })).await;
        next_event(ws, "SUBSCRIBED").await;
    }

    send(
        &mut alice,
        json!({ "type": "SEND_CHAT", "data": { "session_id": session_id, "content": " bom dia " } }),
    )
    .await;
    let echo = next_event(&mut alice, "CHAT").await;
    assert_eq!(echo["data"]["message"]["content"], "bom dia");
    let relayed = next_event(&mut bob, "CHAT").await;
    assert_eq!(relayed["data"]["message"]["id"], echo["data"]["message"]["id"]);

    let cast = Request::builder()
        .method("POST")
        .uri(format!("/sessions/{}/ballots", session_id))
        .header("authorization", format!("Bearer {}", resident_token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "option_id": "opt-1", "unit_ids": ["101"] }).to_string()))
        .unwrap();
    let response = router(state.clone()).oneshot(cast).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let changed = next_event(&mut bob, "TALLY_CHANGED").await;
    assert_eq!(changed["data"]["present_units"], 1);
    assert_eq!(changed["data"]["weighted_fraction"], 40_000);

    // History over REST matches what the socket delivered.
    let history = state.db.chat_history(TENANT, session_id, 50, None).unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn identify_handshake_and_rejections() {
    let resident = Uuid::new_v4();
    let (_state, url, session_id) = serve(resident).await;

    let bad = connect_async(format!("{}?token=garbage", url)).await;
    assert!(bad.is_err());

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    send(
        &mut ws,
        json!({ "type": "IDENTIFY", "data": { "token": token(resident, "Maria", Role::Resident) } }),
    )
    .await;
    next_event(&mut ws, "READY").await;

    // Chat requires a subscription first.
    send(
        &mut ws,
        json!({ "type": "SEND_CHAT", "data": { "session_id": session_id, "content": "oi" } }),
    )
    .await;
    let err = next_event(&mut ws, "ERROR").await;
    assert_eq!(err["data"]["code"], "NOT_SUBSCRIBED");

    send(&mut ws, json!({ "type": "SUBSCRIBE", "data": { "session_id": Uuid::new_v4() } })).await;
    let err = next_event(&mut ws, "ERROR").await;
    assert_eq!(err["data"]["code"], "SESSION_NOT_FOUND");

    ws.send(Message::text("not json")).await.unwrap();
    let err = next_event(&mut ws, "ERROR").await;
    assert_eq!(err["data"]["code"], "BAD_COMMAND");
}
