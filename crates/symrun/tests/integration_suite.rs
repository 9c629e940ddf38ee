//! Integration tests for the symrun bridge.
//!
//! Each test wires a guest-side caller (or a full execution host) to a mock
//! host task speaking the envelope protocol over an in-memory pipe.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

use symrpc::Envelope;
use symrpc::Fault;
use symrpc::Kind;
use symrpc::ReplyPayload;
use symrpc::reply::codes;

use symrun::Caller;
use symrun::CallerConfig;
use symrun::ConnectionState;
use symrun::Guest;
use symrun::GuestContext;
use symrun::HostBridge;
use symrun::HostBuilder;
use symrun::Lifecycle;
use symrun::Pipe;
use symrun::Runtime;
use symrun::SandboxMode;
use symrun::Teardown;
use symrun::Transport;
use symrun::UserFacade;
use symrun::caller;

// --- Shared test plumbing ---

/// What the mock host observed.
#[derive(Default)]
struct HostLog {
    connects: AtomicUsize,
    fired: Mutex<Vec<(String, Value)>>,
}

impl HostLog {
    fn fired_methods(&self) -> Vec<String> {
        self.fired
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }
}

async fn respond(transport: &dyn Transport, id: &str, method: &str, payload: Value) {
    let envelope = Envelope::response(id, method, payload);
    let _ = transport.send(&envelope.to_bytes().unwrap()).await;
}

/// Spawns a protocol-speaking mock host:
/// - answers `connect` with `base_info`,
/// - answers `app:call` by guest-chosen method: `echo` returns the args,
///   `boom` returns a fault, `slow` never answers, anything else `null`,
/// - records every event envelope.
fn spawn_protocol_host(transport: Arc<dyn Transport>, base_info: Value) -> Arc<HostLog> {
    let log = Arc::new(HostLog::default());
    let state = Arc::clone(&log);

    tokio::spawn(async move {
        while let Ok(Some(frame)) = transport.recv().await {
            let Ok(envelope) = Envelope::from_bytes(&frame) else {
                continue;
            };
            match envelope.kind {
                Kind::Call => {
                    let id = envelope.correlation_id.clone().unwrap();
                    match envelope.method.as_str() {
                        "connect" => {
                            state.connects.fetch_add(1, Ordering::SeqCst);
                            respond(
                                transport.as_ref(),
                                &id,
                                "connect",
                                ReplyPayload::ok(base_info.clone()),
                            )
                            .await;
                        }
                        "app:call" => {
                            let method = envelope.payload["method"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string();
                            match method.as_str() {
                                "echo" => {
                                    respond(
                                        transport.as_ref(),
                                        &id,
                                        "app:call",
                                        ReplyPayload::ok(envelope.payload["args"].clone()),
                                    )
                                    .await;
                                }
                                "boom" => {
                                    respond(
                                        transport.as_ref(),
                                        &id,
                                        "app:call",
                                        ReplyPayload::err(Fault::new("app_error", "exploded")),
                                    )
                                    .await;
                                }
                                "slow" => {}
                                _ => {
                                    respond(
                                        transport.as_ref(),
                                        &id,
                                        "app:call",
                                        ReplyPayload::ok(Value::Null),
                                    )
                                    .await;
                                }
                            }
                        }
                        other => {
                            respond(transport.as_ref(), &id, other, ReplyPayload::ok(Value::Null))
                                .await;
                        }
                    }
                }
                Kind::Event => {
                    state
                        .fired
                        .lock()
                        .unwrap()
                        .push((envelope.method, envelope.payload));
                }
                Kind::Response => {}
            }
        }
    });

    log
}

/// Polls `predicate` until it holds or two seconds elapse.
async fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !predicate() {
        if Instant::now() > deadline {
            panic!("condition not reached within deadline");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn connected_pair(base_info: Value) -> (Caller, Pipe, Arc<HostLog>) {
    let (guest_end, host_end) = Pipe::pair();
    let pusher = host_end.clone();
    let log = spawn_protocol_host(Arc::new(host_end), base_info);
    (Caller::new(Box::new(guest_end)), pusher, log)
}

async fn push_event(pusher: &Pipe, channel: &str, payload: Value) {
    let envelope = Envelope::event(channel, payload);
    pusher.send(&envelope.to_bytes().unwrap()).await.unwrap();
}

// --- Test 1: Handshake ---

#[tokio::test]
async fn test_handshake_merges_base_info() {
    let (caller, _pusher, log) =
        connected_pair(json!({ "id": "p1", "settings": { "theme": "dark" } }));

    let info = caller
        .connect(json!({ "settings": { "disabled": false } }))
        .await
        .unwrap();

    assert_eq!(info["id"], "p1");
    assert_eq!(info["settings"]["theme"], "dark");
    assert_eq!(info["settings"]["disabled"], false);
    assert_eq!(caller.state(), ConnectionState::Connected);
    assert_eq!(log.connects.load(Ordering::SeqCst), 1);
}

// --- Test 2: Handshake idempotence ---

#[tokio::test]
async fn test_second_connect_returns_cache_without_sending() {
    let (caller, _pusher, log) = connected_pair(json!({ "id": "p1" }));

    let first = caller.connect(json!({})).await.unwrap();
    let second = caller.connect(json!({ "ignored": true })).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(log.connects.load(Ordering::SeqCst), 1);
}

// --- Test 3: Handshake timeout ---

#[tokio::test]
async fn test_handshake_timeout_leaves_caller_dead() {
    let (guest_end, host_end) = Pipe::pair();
    // A host that reads frames but never answers anything.
    tokio::spawn(async move { while let Ok(Some(_)) = host_end.recv().await {} });

    let caller = Caller::with_config(
        Box::new(guest_end),
        CallerConfig {
            handshake_timeout: Duration::from_millis(50),
            ..CallerConfig::default()
        },
    );

    match caller.connect(json!({})).await {
        Err(caller::Error::HandshakeTimeout) => {}
        other => panic!("Expected HandshakeTimeout, got {:?}", other),
    }
    assert_eq!(caller.state(), ConnectionState::Disconnected);

    // A new caller instance is required to reconnect.
    assert!(matches!(
        caller.connect(json!({})).await,
        Err(caller::Error::ConnectionLost(_))
    ));
}

// --- Test 4: Correlation under out-of-order responses ---

#[tokio::test]
async fn test_concurrent_calls_resolve_by_correlation_id() {
    let (guest_end, host_end) = Pipe::pair();

    // Answers the handshake, then buffers three calls and replies to them
    // in reverse arrival order.
    tokio::spawn(async move {
        let mut buffered: Vec<Envelope> = Vec::new();
        while let Ok(Some(frame)) = host_end.recv().await {
            let envelope = Envelope::from_bytes(&frame).unwrap();
            if envelope.kind != Kind::Call {
                continue;
            }
            if envelope.method == "connect" {
                let id = envelope.correlation_id.unwrap();
                respond(&host_end, &id, "connect", ReplyPayload::ok(json!({}))).await;
                continue;
            }
            buffered.push(envelope);
            if buffered.len() == 3 {
                for envelope in buffered.drain(..).rev() {
                    let id = envelope.correlation_id.unwrap();
                    respond(
                        &host_end,
                        &id,
                        "app:call",
                        ReplyPayload::ok(envelope.payload["args"].clone()),
                    )
                    .await;
                }
            }
        }
    });

    let caller = Caller::new(Box::new(guest_end));
    caller.connect(json!({})).await.unwrap();

    let call = |i: u64| {
        caller.call_async(
            "app:call",
            json!({ "method": "echo", "args": [i] }),
            Some(Duration::from_secs(5)),
        )
    };

    let (a, b, c) = tokio::join!(call(1), call(2), call(3));

    assert_eq!(a.unwrap(), json!([1]));
    assert_eq!(b.unwrap(), json!([2]));
    assert_eq!(c.unwrap(), json!([3]));
    assert_eq!(caller.pending_count(), 0);
}

// --- Test 5: Call timeout bound ---

#[tokio::test]
async fn test_call_timeout_rejects_only_that_call() {
    let (caller, _pusher, _log) = connected_pair(json!({}));
    caller.connect(json!({})).await.unwrap();

    let timeout = Duration::from_millis(50);
    let started = Instant::now();
    let result = caller
        .call_async(
            "app:call",
            json!({ "method": "slow", "args": [] }),
            Some(timeout),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(caller::Error::CallTimeout)));
    assert!(elapsed >= timeout, "rejected early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "rejected late: {:?}", elapsed);

    // The connection survives; the timed-out entry is gone.
    assert_eq!(caller.state(), ConnectionState::Connected);
    assert_eq!(caller.pending_count(), 0);
    let echoed = caller
        .call_async("app:call", json!({ "method": "echo", "args": [9] }), None)
        .await
        .unwrap();
    assert_eq!(echoed, json!([9]));
}

// --- Test 6: Remote fault ---

#[tokio::test]
async fn test_remote_error_payload_rejects_with_detail() {
    let (caller, _pusher, _log) = connected_pair(json!({}));
    caller.connect(json!({})).await.unwrap();

    match caller
        .call_async("app:call", json!({ "method": "boom", "args": [] }), None)
        .await
    {
        Err(caller::Error::Remote(fault)) => {
            assert_eq!(fault.code, "app_error");
            assert_eq!(fault.message, "exploded");
        }
        other => panic!("Expected Remote fault, got {:?}", other),
    }
}

// --- Test 7: Disconnect drains every pending call exactly once ---

#[tokio::test]
async fn test_disconnect_drains_all_pending_calls() {
    let (guest_end, host_end) = Pipe::pair();

    // Answers the handshake, swallows three calls, then drops the pipe.
    tokio::spawn(async move {
        let mut swallowed = 0;
        while let Ok(Some(frame)) = host_end.recv().await {
            let envelope = Envelope::from_bytes(&frame).unwrap();
            if envelope.method == "connect" {
                let id = envelope.correlation_id.unwrap();
                respond(&host_end, &id, "connect", ReplyPayload::ok(json!({}))).await;
                continue;
            }
            swallowed += 1;
            if swallowed == 3 {
                return;
            }
        }
    });

    let caller = Arc::new(Caller::new(Box::new(guest_end)));
    caller.connect(json!({})).await.unwrap();

    let call = |caller: Arc<Caller>, i: u64| async move {
        caller
            .call_async(
                "app:call",
                json!({ "method": "void", "args": [i] }),
                Some(Duration::from_secs(10)),
            )
            .await
    };

    let (a, b, c) = tokio::join!(
        call(Arc::clone(&caller), 1),
        call(Arc::clone(&caller), 2),
        call(Arc::clone(&caller), 3)
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(caller::Error::ConnectionLost(_))));
    }
    assert_eq!(caller.pending_count(), 0);
    assert_eq!(caller.state(), ConnectionState::Disconnected);

    // A second disconnect signal (explicit close) is a no-op.
    caller.close();
    assert!(matches!(
        caller.call_async("app:call", json!({}), None).await,
        Err(caller::Error::ConnectionLost(_))
    ));
}

// --- Test 8: Fire-and-forget and event hooks ---

#[tokio::test]
async fn test_facade_forwarders_and_host_events() {
    let (caller, pusher, log) = connected_pair(json!({}));
    let facade = UserFacade::new(Arc::new(caller), json!({}));

    // Not connected yet: logged and dropped, nothing on the wire.
    facade.provide_theme(json!({ "name": "noir", "url": "noir.css" }));

    facade.ready(json!({})).await.unwrap();

    facade.provide_theme(json!({ "name": "noir", "url": "noir.css" }));
    facade.provide_style(json!(".block { color: red }"));
    facade.show_main_ui();
    facade.toggle_main_ui();

    // Shape validation failures are swallowed without sending.
    facade.provide_theme(json!({ "name": "missing-url" }));
    facade.provide_ui(json!({ "template": "<b/>" }));

    wait_until(|| log.fired.lock().unwrap().len() >= 4).await;
    assert_eq!(
        log.fired_methods(),
        vec![
            "provider:theme",
            "provider:style",
            "main-ui:visible",
            "main-ui:visible"
        ]
    );
    let fired = log.fired.lock().unwrap();
    assert_eq!(fired[2].1, json!({ "visible": true }));
    assert_eq!(fired[3].1, json!({ "toggle": true }));
    drop(fired);

    // Host-pushed events reach subscribers in order.
    let (tx, mut rx) = mpsc::unbounded_channel();
    facade.caller().on(
        "hook:app:current_graph_changed",
        Arc::new(move |payload| {
            let _ = tx.send(payload);
        }),
    );
    push_event(&pusher, "hook:app:current_graph_changed", json!({ "graph": "g1" })).await;
    let seen = rx.recv().await.unwrap();
    assert_eq!(seen["graph"], "g1");
}

// --- Test 9: Dynamic surface hook derivation ---

#[tokio::test]
async fn test_app_proxy_hooks_and_invoke() {
    let (caller, pusher, _log) = connected_pair(json!({}));
    let facade = UserFacade::new(Arc::new(caller), json!({}));
    facade.ready(json!({})).await.unwrap();

    let app = facade.app();

    // A generic invocation round-trips through app:call.
    let result = app.invoke("echo", vec![json!("x")]).await.unwrap();
    assert_eq!(result, json!(["x"]));

    // once: fires for the first push only.
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    assert!(app.hook(
        "oncePageFileMounted",
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    ));
    push_event(&pusher, "hook:app:page_file_mounted", json!({})).await;
    push_event(&pusher, "hook:app:page_file_mounted", json!({})).await;
    wait_until(|| hits.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // on + off with the same handler reference.
    let themed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&themed);
    let handler: symrun::HookHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(app.hook("onThemeModeChanged", Arc::clone(&handler)));
    push_event(&pusher, "hook:app:theme_mode_changed", json!({ "mode": "dark" })).await;
    wait_until(|| themed.load(Ordering::SeqCst) == 1).await;

    assert!(app.hook("offThemeModeChanged", handler));
    push_event(&pusher, "hook:app:theme_mode_changed", json!({ "mode": "light" })).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(themed.load(Ordering::SeqCst), 1);

    // Non-hook names are not registered.
    assert!(!app.hook("getUserState", Arc::new(|_| {})));
}

// --- Test 10: Settings pushes and updates ---

#[tokio::test]
async fn test_settings_changed_merges_into_facade_cache() {
    let (caller, pusher, log) = connected_pair(json!({ "settings": { "theme": "dark" } }));
    let facade = UserFacade::new(Arc::new(caller), json!({}));
    facade.ready(json!({})).await.unwrap();
    assert_eq!(facade.settings()["theme"], "dark");

    push_event(&pusher, "settings:changed", json!({ "fontSize": 14 })).await;
    wait_until(|| facade.settings()["fontSize"] == 14).await;
    assert_eq!(facade.settings()["theme"], "dark");

    facade.update_settings(json!({ "theme": "light" }));
    assert_eq!(facade.settings()["theme"], "light");
    wait_until(|| log.fired_methods().contains(&"settings:update".to_string())).await;
}

// --- Test 11: Guest-served methods ---

#[tokio::test]
async fn test_host_calls_guest_provided_method() {
    let (guest_end, host_end) = Pipe::pair();
    let caller = Caller::new(Box::new(guest_end));

    caller.provide_method(
        "greet",
        Arc::new(|args| {
            let name = args["name"].as_str().unwrap_or("?");
            Ok(json!(format!("hello {}", name)))
        }),
    );

    let call = Envelope::call("42", "greet", json!({ "name": "host" }));
    host_end.send(&call.to_bytes().unwrap()).await.unwrap();

    let frame = host_end.recv().await.unwrap().unwrap();
    let response = Envelope::from_bytes(&frame).unwrap();
    assert_eq!(response.kind, Kind::Response);
    assert_eq!(response.correlation_id.as_deref(), Some("42"));
    match ReplyPayload::decode(&response.payload).unwrap() {
        ReplyPayload::Ok(value) => assert_eq!(value, json!("hello host")),
        ReplyPayload::Err(fault) => panic!("Expected success, got {}", fault),
    }

    // Unknown methods get exactly one fault response.
    let call = Envelope::call("43", "no_such_method", json!(null));
    host_end.send(&call.to_bytes().unwrap()).await.unwrap();

    let frame = host_end.recv().await.unwrap().unwrap();
    let response = Envelope::from_bytes(&frame).unwrap();
    assert_eq!(response.correlation_id.as_deref(), Some("43"));
    match ReplyPayload::decode(&response.payload).unwrap() {
        ReplyPayload::Err(fault) => assert_eq!(fault.code, codes::METHOD_NOT_FOUND),
        ReplyPayload::Ok(_) => panic!("Expected a fault"),
    }
}

// --- Test 12: Outstanding-call cap ---

#[tokio::test]
async fn test_pending_cap_rejects_with_resource_exhausted() {
    let (guest_end, host_end) = Pipe::pair();
    let log = spawn_protocol_host(Arc::new(host_end), json!({}));

    let caller = Arc::new(Caller::with_config(
        Box::new(guest_end),
        CallerConfig {
            max_pending: Some(1),
            ..CallerConfig::default()
        },
    ));
    caller.connect(json!({})).await.unwrap();

    let slow_caller = Arc::clone(&caller);
    let in_flight = tokio::spawn(async move {
        slow_caller
            .call_async(
                "app:call",
                json!({ "method": "slow", "args": [] }),
                Some(Duration::from_secs(5)),
            )
            .await
    });

    wait_until(|| caller.pending_count() == 1).await;

    match caller
        .call_async("app:call", json!({ "method": "echo", "args": [] }), None)
        .await
    {
        Err(caller::Error::ResourceExhausted { limit }) => assert_eq!(limit, 1),
        other => panic!("Expected ResourceExhausted, got {:?}", other),
    }

    in_flight.abort();
    let _ = log;
}

// --- Test 13: Execution-host lifecycle ---

struct TestGuest {
    teardowns: Arc<AtomicUsize>,
    ready_info: Arc<Mutex<Value>>,
}

#[async_trait::async_trait]
impl Guest for TestGuest {
    async fn main(&self, ctx: GuestContext) -> anyhow::Result<Option<Teardown>> {
        let info = ctx
            .facade
            .ready(json!({ "settings": { "disabled": false } }))
            .await?;
        *self.ready_info.lock().unwrap() = info;

        let counter = Arc::clone(&self.teardowns);
        Ok(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })))
    }
}

struct TestBridge {
    base_info: Value,
    logs: Mutex<Vec<Arc<HostLog>>>,
}

impl TestBridge {
    fn new(base_info: Value) -> Arc<Self> {
        Arc::new(Self {
            base_info,
            logs: Mutex::new(Vec::new()),
        })
    }
}

impl HostBridge for TestBridge {
    fn attach(&self, _identity: &str, transport: Box<dyn Transport>) {
        let log = spawn_protocol_host(Arc::from(transport), self.base_info.clone());
        self.logs.lock().unwrap().push(log);
    }
}

#[tokio::test]
async fn test_inline_host_mounts_and_destroys_idempotently() {
    let rt = Arc::new(Runtime::new());
    let teardowns = Arc::new(AtomicUsize::new(0));
    let ready_info = Arc::new(Mutex::new(Value::Null));

    let guest_id = rt.register_guest(Arc::new(TestGuest {
        teardowns: Arc::clone(&teardowns),
        ready_info: Arc::clone(&ready_info),
    }));
    let bridge = TestBridge::new(json!({ "id": "p1", "settings": { "theme": "dark" } }));

    let (host_id, host) = HostBuilder::new(Arc::clone(&rt), guest_id)
        .identity("p1")
        .bridge(bridge.clone())
        .mount()
        .await
        .unwrap();

    assert_eq!(host.lifecycle(), Lifecycle::Mounted);
    assert_eq!(host.mode(), SandboxMode::Inline);

    // The guest saw host base info merged into its local model.
    let info = ready_info.lock().unwrap().clone();
    assert_eq!(info["id"], "p1");
    assert_eq!(info["settings"]["disabled"], false);
    assert_eq!(info["settings"]["theme"], "dark");

    // Loading the mounted instance again is a no-op: one handshake total.
    host.load().await.unwrap();
    let log = bridge.logs.lock().unwrap()[0].clone();
    assert_eq!(log.connects.load(Ordering::SeqCst), 1);

    let mut lifecycle = host.watch_lifecycle();
    assert_eq!(*lifecycle.borrow(), Lifecycle::Mounted);

    host.destroy();
    host.destroy();
    assert_eq!(host.lifecycle(), Lifecycle::Unmounted);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);

    lifecycle.changed().await.unwrap();
    assert_eq!(*lifecycle.borrow(), Lifecycle::Unmounted);

    // The registry drops the instance without re-running hooks.
    rt.destroy_host(host_id).unwrap();
    assert!(rt.get_host(host_id).is_err());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

// --- Test 14: Thread-sandbox host ---

#[tokio::test]
async fn test_thread_host_runs_guest_on_its_own_runtime() {
    let rt = Arc::new(Runtime::new());
    let teardowns = Arc::new(AtomicUsize::new(0));
    let ready_info = Arc::new(Mutex::new(Value::Null));

    let guest_id = rt.register_guest(Arc::new(TestGuest {
        teardowns: Arc::clone(&teardowns),
        ready_info: Arc::clone(&ready_info),
    }));
    let bridge = TestBridge::new(json!({ "id": "p2" }));

    let (_, host) = HostBuilder::new(Arc::clone(&rt), guest_id)
        .mode(SandboxMode::Thread)
        .bridge(bridge)
        .mount()
        .await
        .unwrap();

    assert_eq!(host.lifecycle(), Lifecycle::Mounted);
    assert_eq!(ready_info.lock().unwrap()["id"], "p2");

    // The guest-side caller stays usable across the thread boundary.
    let caller = host.caller().unwrap();
    let echoed = caller
        .call_async("app:call", json!({ "method": "echo", "args": [1] }), None)
        .await
        .unwrap();
    assert_eq!(echoed, json!([1]));

    host.destroy();
    assert_eq!(host.lifecycle(), Lifecycle::Unmounted);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

// --- Test 15: Builder validation ---

#[tokio::test]
async fn test_builder_requires_a_bridge_and_known_guest() {
    let rt = Arc::new(Runtime::new());
    let guest_id = rt.register_guest(Arc::new(TestGuest {
        teardowns: Arc::new(AtomicUsize::new(0)),
        ready_info: Arc::new(Mutex::new(Value::Null)),
    }));

    match HostBuilder::new(Arc::clone(&rt), guest_id).mount().await {
        Err(symrun::runtime::Error::MissingBridge) => {}
        other => panic!("Expected MissingBridge, got {:?}", other.map(|_| ())),
    }

    let unknown = symrun::GuestId(999);
    match HostBuilder::new(Arc::clone(&rt), unknown)
        .bridge(TestBridge::new(json!({})))
        .mount()
        .await
    {
        Err(symrun::runtime::Error::GuestNotFound(id)) => assert_eq!(id, unknown),
        other => panic!("Expected GuestNotFound, got {:?}", other.map(|_| ())),
    }
}

// --- Test 16: Guest failure aborts the mount ---

struct FailingGuest;

#[async_trait::async_trait]
impl Guest for FailingGuest {
    async fn main(&self, _ctx: GuestContext) -> anyhow::Result<Option<Teardown>> {
        anyhow::bail!("entry point exploded")
    }
}

#[tokio::test]
async fn test_failing_guest_leaves_host_unmounted() {
    let rt = Arc::new(Runtime::new());
    let guest_id = rt.register_guest(Arc::new(FailingGuest));

    for mode in [SandboxMode::Inline, SandboxMode::Thread] {
        let result = HostBuilder::new(Arc::clone(&rt), guest_id)
            .mode(mode)
            .bridge(TestBridge::new(json!({})))
            .mount()
            .await;

        match result {
            Err(symrun::runtime::Error::Host(symrun::host::Error::Guest(msg))) => {
                assert!(msg.contains("entry point exploded"));
            }
            other => panic!("Expected a guest error, got {:?}", other.map(|_| ())),
        }
    }
}
