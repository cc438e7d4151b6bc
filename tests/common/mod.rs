//! In-process PulseKV server for integration tests
//!
//! Implements the command set over a real WebSocket listener: a shared
//! in-memory store, per-connection subscriptions with push delivery, the
//! password challenge handshake, and counters for the subscribe commands so
//! tests can assert on interest transitions.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Counters for server-side subscription commands
#[derive(Default)]
pub struct ServerStats {
    pub subscribe_keys: AtomicUsize,
    pub unsubscribe_keys: AtomicUsize,
    pub subscribe_prefixes: AtomicUsize,
    pub unsubscribe_prefixes: AtomicUsize,
}

struct Shared {
    store: Mutex<HashMap<String, String>>,
    writes: broadcast::Sender<(String, String)>,
    password: Option<String>,
    stats: Arc<ServerStats>,
}

/// A listening test server
pub struct TestServer {
    /// HTTP-style endpoint, handed straight to `Client::connect`
    pub endpoint: String,
    pub stats: Arc<ServerStats>,
}

impl TestServer {
    /// Bind an ephemeral port and start serving
    pub async fn spawn(password: Option<&str>) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stats = Arc::new(ServerStats::default());
        let (writes, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            store: Mutex::new(HashMap::new()),
            writes,
            password: password.map(str::to_string),
            stats: Arc::clone(&stats),
        });

        tokio::spawn(async move {
            let mut next_id: i64 = 1;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let conn_id = next_id;
                next_id += 1;
                tokio::spawn(handle_connection(stream, Arc::clone(&shared), conn_id));
            }
        });

        TestServer {
            endpoint: format!("http://{}", addr),
            stats,
        }
    }
}

/// Per-connection session state
struct Session {
    conn_id: i64,
    authed: bool,
    challenge: Option<(Vec<u8>, Vec<u8>)>,
    key_subs: HashSet<String>,
    prefix_subs: HashSet<String>,
}

async fn handle_connection(stream: TcpStream, shared: Arc<Shared>, conn_id: i64) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut sink, mut source) = ws.split();
    let mut writes = shared.writes.subscribe();

    let mut session = Session {
        conn_id,
        authed: shared.password.is_none(),
        challenge: None,
        key_subs: HashSet::new(),
        prefix_subs: HashSet::new(),
    };

    loop {
        tokio::select! {
            frame = source.next() => {
                let Some(Ok(message)) = frame else { return };
                match message {
                    Message::Text(text) => {
                        for line in text.lines() {
                            if line.is_empty() {
                                continue;
                            }
                            match handle_request(line, &shared, &mut session) {
                                Reply::Send(reply) => {
                                    if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                        return;
                                    }
                                }
                                Reply::SendThenGarbage(reply) => {
                                    let _ = sink.send(Message::Text(reply.to_string())).await;
                                    let _ = sink.send(Message::Text("!!! not json".into())).await;
                                }
                                Reply::Sever => return,
                            }
                        }
                    }
                    Message::Close(_) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                    _ => {}
                }
            }
            write = writes.recv() => {
                let Ok((key, value)) = write else { continue };
                let interested = session.key_subs.contains(&key)
                    || session.prefix_subs.iter().any(|p| key.starts_with(p.as_str()));
                if interested {
                    let push = json!({ "cmdType": "push", "key": key, "newValue": value });
                    if sink.send(Message::Text(push.to_string())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// What the connection loop should do with a handled request
enum Reply {
    Send(Value),
    /// Used by the `emit-garbage` test command: a well-formed reply
    /// followed by an unparseable frame
    SendThenGarbage(Value),
    /// Used by the `drop-connection` test command: sever without replying
    Sever,
}

fn ok_reply(request_id: &str, data: Value) -> Reply {
    Reply::Send(json!({ "requestId": request_id, "ok": true, "data": data }))
}

fn error_reply(request_id: &str, code: &str, details: &str) -> Reply {
    Reply::Send(json!({ "requestId": request_id, "ok": false, "error": code, "details": details }))
}

fn handle_request(line: &str, shared: &Shared, session: &mut Session) -> Reply {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return error_reply("", "malformed request", &e.to_string()),
    };
    let request_id = request["requestId"].as_str().unwrap_or_default().to_string();
    let cmd_name = request["cmdName"].as_str().unwrap_or_default();
    let data = &request["data"];

    if !session.authed
        && cmd_name != "auth-challenge-request"
        && cmd_name != "auth-challenge-response"
    {
        return error_reply(&request_id, "authentication required", "log in first");
    }

    match cmd_name {
        "read-key" => {
            let key = data["key"].as_str().unwrap_or_default();
            let value = shared.store.lock().get(key).cloned().unwrap_or_default();
            ok_reply(&request_id, json!(value))
        }
        "read-bulk" => {
            let store = shared.store.lock();
            let mut out = serde_json::Map::new();
            for key in data["keys"].as_array().cloned().unwrap_or_default() {
                let Some(key) = key.as_str() else { continue };
                let value = store.get(key).cloned().unwrap_or_default();
                out.insert(key.to_string(), json!(value));
            }
            ok_reply(&request_id, Value::Object(out))
        }
        "read-prefix" => {
            let prefix = data["prefix"].as_str().unwrap_or_default();
            let store = shared.store.lock();
            let out: serde_json::Map<String, Value> = store
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), json!(value)))
                .collect();
            ok_reply(&request_id, Value::Object(out))
        }
        "write-key" => {
            let key = data["key"].as_str().unwrap_or_default().to_string();
            let value = data["data"].as_str().unwrap_or_default().to_string();
            shared.store.lock().insert(key.clone(), value.clone());
            let _ = shared.writes.send((key, value));
            ok_reply(&request_id, Value::Null)
        }
        "write-bulk" => {
            let Some(entries) = data.as_object() else {
                return error_reply(&request_id, "invalid payload", "expected an object");
            };
            for (key, value) in entries {
                let value = value.as_str().unwrap_or_default().to_string();
                shared.store.lock().insert(key.clone(), value.clone());
                let _ = shared.writes.send((key.clone(), value));
            }
            ok_reply(&request_id, Value::Null)
        }
        "list-keys" => {
            let prefix = data["prefix"].as_str().unwrap_or_default();
            let store = shared.store.lock();
            let keys: Vec<Value> = store
                .keys()
                .filter(|key| key.starts_with(prefix))
                .map(|key| json!(key))
                .collect();
            ok_reply(&request_id, Value::Array(keys))
        }
        "subscribe-key" => {
            let key = data["key"].as_str().unwrap_or_default().to_string();
            session.key_subs.insert(key);
            shared.stats.subscribe_keys.fetch_add(1, Ordering::SeqCst);
            ok_reply(&request_id, Value::Null)
        }
        "unsubscribe-key" => {
            let key = data["key"].as_str().unwrap_or_default();
            session.key_subs.remove(key);
            shared.stats.unsubscribe_keys.fetch_add(1, Ordering::SeqCst);
            ok_reply(&request_id, Value::Null)
        }
        "subscribe-prefix" => {
            let prefix = data["prefix"].as_str().unwrap_or_default().to_string();
            session.prefix_subs.insert(prefix);
            shared.stats.subscribe_prefixes.fetch_add(1, Ordering::SeqCst);
            ok_reply(&request_id, Value::Null)
        }
        "unsubscribe-prefix" => {
            let prefix = data["prefix"].as_str().unwrap_or_default();
            session.prefix_subs.remove(prefix);
            shared.stats.unsubscribe_prefixes.fetch_add(1, Ordering::SeqCst);
            ok_reply(&request_id, Value::Null)
        }
        "internal-client-id" => ok_reply(&request_id, json!(session.conn_id)),
        "drop-connection" => Reply::Sever,
        "emit-garbage" => Reply::SendThenGarbage(
            json!({ "requestId": request_id, "ok": true, "data": Value::Null }),
        ),
        "auth-challenge-request" => {
            let challenge: [u8; 32] = rand::random();
            let salt: [u8; 16] = rand::random();
            session.challenge = Some((challenge.to_vec(), salt.to_vec()));
            ok_reply(
                &request_id,
                json!({ "challenge": BASE64.encode(challenge), "salt": BASE64.encode(salt) }),
            )
        }
        "auth-challenge-response" => {
            let Some(password) = &shared.password else {
                // Unprotected server; accept anything
                session.authed = true;
                return ok_reply(&request_id, Value::Null);
            };
            let Some((challenge, salt)) = session.challenge.take() else {
                return error_reply(&request_id, "no challenge outstanding", "request one first");
            };
            let mut key = password.as_bytes().to_vec();
            key.extend_from_slice(&salt);
            let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
            mac.update(&challenge);
            let expected = BASE64.encode(mac.finalize().into_bytes());

            if data["hash"].as_str() == Some(expected.as_str()) {
                session.authed = true;
                ok_reply(&request_id, Value::Null)
            } else {
                error_reply(&request_id, "authentication failed", "bad credentials")
            }
        }
        other => error_reply(&request_id, "unknown command", other),
    }
}
