// src/bridge/control.rs
//! Control plane: engine hooks in, controller commands in, events out
//!
//! Shared mutable state (registry, rule tables, active profile) lives
//! behind the component objects built here; the hooks run one per
//! in-flight exchange while the command dispatcher runs on the single
//! reader task. Sleeps and suspensions happen only on exchange tasks, so
//! a stuck breakpoint never stalls the reader or other exchanges.

use crate::breakpoint::controller::{BreakpointController, BreakpointRule, Phase};
use crate::bridge::command::Command;
use crate::bridge::event::{BreakpointMeta, BreakpointState, EventKind, EventSink, FlowEvent};
use crate::engine::EngineHandle;
use crate::flow::exchange::{is_loopback_host, FlowHandle, HttpResponse, RequestEdit, ResponseEdit};
use crate::flow::registry::FlowRegistry;
use crate::mock::engine::{MapLocalEngine, OverrideRule};
use crate::replay::orchestrator::RetryOrchestrator;
use crate::shaping::shaper::{Downlink, TrafficShaper, LOSS_BODY, LOSS_STATUS, PROFILE_HEADER};
use crate::utils::config::CoreConfig;
use bytes::Bytes;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The control plane object owning all shared state
pub struct ControlPlane {
    config: CoreConfig,
    registry: Arc<FlowRegistry>,
    mock: Arc<MapLocalEngine>,
    breakpoints: Arc<BreakpointController>,
    shaper: Arc<TrafficShaper>,
    retry: RetryOrchestrator,
    engine: Arc<dyn EngineHandle>,
    events: Arc<dyn EventSink>,

    /// Back-reference for tasks spawned by the control plane itself
    self_ref: Weak<ControlPlane>,
}

impl ControlPlane {
    pub fn new(
        config: CoreConfig,
        engine: Arc<dyn EngineHandle>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let registry = Arc::new(FlowRegistry::new(config.registry_capacity));
        let shaper = match config.shaper_seed {
            Some(seed) => Arc::new(TrafficShaper::with_seed(seed)),
            None => Arc::new(TrafficShaper::new()),
        };
        let retry = RetryOrchestrator::new(Arc::clone(&registry), Arc::clone(&engine));

        Arc::new_cyclic(|weak| Self {
            config,
            registry,
            mock: Arc::new(MapLocalEngine::new()),
            breakpoints: Arc::new(BreakpointController::new()),
            shaper,
            retry,
            engine,
            events,
            self_ref: weak.clone(),
        })
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    pub fn shaper(&self) -> &TrafficShaper {
        &self.shaper
    }

    pub fn breakpoints(&self) -> &BreakpointController {
        &self.breakpoints
    }

    /// Engine hook: a request arrived on some proxy connection.
    ///
    /// Runs on the task handling that exchange; any shaping delay or
    /// breakpoint suspension blocks only this exchange.
    pub async fn on_request(&self, handle: FlowHandle) {
        let (id, key, host) = {
            let exchange = handle.read();
            (
                exchange.id.clone(),
                exchange.key(),
                exchange.request.host().to_string(),
            )
        };

        if is_loopback_host(&host) {
            debug!(id = %id, host = %host, "ignoring loopback flow");
            return;
        }

        self.registry.register(&handle);

        let waiting = self.breakpoints.should_break(&key, Phase::Request);
        if waiting {
            self.breakpoints.mark_waiting(&id, Phase::Request);
            // A suspended exchange must not be evicted out from under
            // its pending release
            self.registry.pin(&id);
            self.engine.suspend(&id);
            self.arm_release_timeout(&id, Phase::Request);
        }

        let mocked = self.mock.apply_if_matched(&handle);
        if !mocked {
            let request_bytes = handle.read().request.body.len();
            self.shaper.shape_upstream(request_bytes).await;
        }

        let meta = waiting.then(|| BreakpointMeta {
            phase: Phase::Request,
            state: BreakpointState::Waiting,
            key,
        });
        self.emit(EventKind::Request, &handle, meta);
    }

    /// Engine hook: a response arrived for a live exchange
    pub async fn on_response(&self, handle: FlowHandle) {
        let (id, key, host) = {
            let exchange = handle.read();
            (
                exchange.id.clone(),
                exchange.key(),
                exchange.request.host().to_string(),
            )
        };

        if is_loopback_host(&host) {
            debug!(id = %id, host = %host, "ignoring loopback flow");
            return;
        }

        // Re-register: a command arriving after the request phase must
        // still find this exchange
        self.registry.register(&handle);

        let waiting = self.breakpoints.should_break(&key, Phase::Response);
        if waiting {
            self.breakpoints.mark_waiting(&id, Phase::Response);
            self.registry.pin(&id);
            self.engine.suspend(&id);
            self.arm_release_timeout(&id, Phase::Response);
        }

        let response_bytes = handle
            .read()
            .response
            .as_ref()
            .map(|r| r.body.len())
            .unwrap_or(0);

        match self.shaper.shape_downstream(response_bytes).await {
            Downlink::Dropped { profile_id } => {
                let mut exchange = handle.write();
                let mut response = HttpResponse::new(LOSS_STATUS);
                response.headers.set("Content-Type", "text/plain");
                response.body = Bytes::from_static(LOSS_BODY.as_bytes());
                exchange.response = Some(response);
                debug!(id = %id, profile = %profile_id, "response replaced by simulated loss");
            }
            Downlink::Shaped { profile_id } => {
                let mut exchange = handle.write();
                if let Some(response) = exchange.response.as_mut() {
                    response.headers.set(PROFILE_HEADER, profile_id);
                }
            }
            Downlink::Untouched => {}
        }

        let meta = waiting.then(|| BreakpointMeta {
            phase: Phase::Response,
            state: BreakpointState::Waiting,
            key,
        });
        self.emit(EventKind::Response, &handle, meta);
    }

    /// Dispatch one controller command.
    ///
    /// Deliberately synchronous: no command handler sleeps or waits, so
    /// the reader task can never be stalled by a suspended exchange.
    pub fn handle_command(&self, command: Command) {
        match command {
            Command::MockResponse {
                id,
                body,
                status,
                headers,
            } => self.mock_response(&id, body, status, headers),

            Command::MockRule {
                key,
                body,
                status,
                headers,
                enabled,
            } => {
                if !enabled {
                    self.mock.remove_rule(&key);
                    return;
                }
                let rule = OverrideRule {
                    body,
                    headers,
                    status,
                };
                self.mock.set_rule(key.clone(), rule.clone());
                // Update the live exchange under this key so the
                // controller's view refreshes without a new request
                if let Some(handle) = self.registry.lookup_by_key(&key) {
                    self.mock.apply(&handle, &rule);
                }
            }

            Command::DeleteRule { key } => {
                if self.mock.remove_rule(&key).is_some() {
                    if let Some(handle) = self.registry.lookup_by_key(&key) {
                        handle.write().response = None;
                        debug!(key = %key, "cleared live response after rule removal");
                    }
                }
            }

            Command::MockRequest { id, body, headers } => {
                let Some(handle) = self.registry.lookup_by_id(&id) else {
                    warn!(id = %id, "mock_request for unknown flow");
                    return;
                };
                let mut exchange = handle.write();
                exchange.request.body = Bytes::from(body.into_bytes());
                if let Some(headers) = headers {
                    if !headers.is_empty() {
                        exchange.request.headers = headers;
                    }
                }
            }

            Command::BreakpointRule {
                key,
                request,
                response,
            } => {
                self.breakpoints
                    .set_rule(key, BreakpointRule { request, response });
            }

            Command::BreakpointContinue {
                id,
                phase,
                request,
                response,
            } => self.breakpoint_continue(&id, &phase, request, response),

            Command::RetryFlow { id, overrides } => {
                // Failure is contained: logged by the orchestrator, the
                // original exchange and other flows are unaffected
                let _ = self.retry.retry(&id, &overrides);
            }

            Command::TrafficProfile { profile } => {
                self.shaper.set_profile(profile);
            }
        }
        metrics::counter!("flowbridge_commands_total").increment(1);
    }

    fn mock_response(
        &self,
        id: &str,
        body: String,
        status: Option<u16>,
        headers: Option<crate::flow::exchange::Headers>,
    ) {
        let Some(handle) = self.registry.lookup_by_id(id) else {
            warn!(id = %id, "mock_response for unknown flow");
            return;
        };

        let (key, rule) = {
            let exchange = handle.read();
            let fallback_headers = exchange
                .response
                .as_ref()
                .map(|r| r.headers.clone())
                .unwrap_or_default();
            let fallback_status = exchange.response.as_ref().map(|r| r.status).unwrap_or(200);
            let rule = OverrideRule {
                body,
                headers: headers.filter(|h| !h.is_empty()).unwrap_or(fallback_headers),
                status: status.unwrap_or(fallback_status),
            };
            (exchange.key(), rule)
        };

        self.mock.set_rule(key, rule.clone());
        self.mock.apply(&handle, &rule);
    }

    fn breakpoint_continue(
        &self,
        id: &str,
        phase: &str,
        request: Option<RequestEdit>,
        response: Option<ResponseEdit>,
    ) {
        let Some(handle) = self.registry.lookup_by_id(id) else {
            warn!(id = %id, "breakpoint_continue for unknown flow");
            return;
        };

        match Phase::parse(phase) {
            Some(Phase::Request) => {
                self.breakpoints.take_waiting(id, Phase::Request);
                self.finish_release(&handle, id, Phase::Request, request, None);
            }
            Some(Phase::Response) => {
                self.breakpoints.take_waiting(id, Phase::Response);
                self.finish_release(&handle, id, Phase::Response, None, response);
            }
            None => {
                // Fail open: never leave an exchange permanently stuck
                warn!(id = %id, phase = %phase, "unknown breakpoint phase, releasing unmodified");
                self.breakpoints.take_waiting(id, Phase::Request);
                self.breakpoints.take_waiting(id, Phase::Response);
                self.registry.unpin(id);
                self.engine.resume(id);
            }
        }
    }

    /// Apply edits, refresh the registry, announce the release, and lift
    /// the engine-side suspension
    fn finish_release(
        &self,
        handle: &FlowHandle,
        id: &str,
        phase: Phase,
        request_edit: Option<RequestEdit>,
        response_edit: Option<ResponseEdit>,
    ) {
        let old_key = handle.read().key();

        if let Some(edit) = request_edit {
            handle.write().apply_request_edit(&edit);
        }
        if let Some(edit) = response_edit {
            handle.write().apply_response_edit(&edit);
        }

        let new_key = handle.read().key();
        if new_key != old_key {
            self.registry.rekey(&old_key, &new_key, handle);
        }
        self.registry.unpin(id);
        self.registry.register(handle);

        let kind = match phase {
            Phase::Request => EventKind::Request,
            Phase::Response => EventKind::Response,
        };
        self.emit(
            kind,
            handle,
            Some(BreakpointMeta {
                phase,
                state: BreakpointState::Released,
                key: new_key,
            }),
        );
        self.engine.resume(id);
        info!(id = %id, phase = phase.as_str(), "breakpoint released");
    }

    /// Hardening extension: auto-release a suspension that is never
    /// continued, when a timeout is configured
    fn arm_release_timeout(&self, id: &str, phase: Phase) {
        let Some(timeout_ms) = self.config.breakpoint_timeout_ms else {
            return;
        };
        let Some(control) = self.self_ref.upgrade() else {
            return;
        };
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            // take_waiting is the release gate: whoever removes the entry
            // owns the single release
            if !control.breakpoints.take_waiting(&id, phase) {
                return;
            }
            warn!(id = %id, phase = phase.as_str(), timeout_ms, "breakpoint timed out, auto-releasing");
            if let Some(handle) = control.registry.lookup_by_id(&id) {
                control.finish_release(&handle, &id, phase, None, None);
            } else {
                control.registry.unpin(&id);
                control.engine.resume(&id);
            }
        });
    }

    fn emit(&self, kind: EventKind, handle: &FlowHandle, breakpoint: Option<BreakpointMeta>) {
        let event = {
            let exchange = handle.read();
            FlowEvent::from_exchange(kind, &exchange, breakpoint)
        };
        self.events.emit(&event);
        metrics::counter!("flowbridge_events_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::command::parse_command;
    use crate::bridge::event::CaptureSink;
    use crate::engine::RecordingEngine;
    use crate::flow::exchange::{Exchange, HttpRequest};
    use crate::mock::engine::OVERRIDE_MARKER_HEADER;

    struct Harness {
        control: Arc<ControlPlane>,
        engine: Arc<RecordingEngine>,
        sink: Arc<CaptureSink>,
    }

    fn harness() -> Harness {
        harness_with_config(CoreConfig::default())
    }

    fn harness_with_config(config: CoreConfig) -> Harness {
        let engine = Arc::new(RecordingEngine::new());
        let sink = Arc::new(CaptureSink::new());
        let control = ControlPlane::new(
            config,
            Arc::clone(&engine) as Arc<dyn EngineHandle>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );
        Harness {
            control,
            engine,
            sink,
        }
    }

    fn flow(id: &str, url: &str) -> FlowHandle {
        Exchange::new(id, HttpRequest::new("GET", url)).into_handle()
    }

    fn flow_with_response(id: &str, url: &str, status: u16) -> FlowHandle {
        let mut exchange = Exchange::new(id, HttpRequest::new("GET", url));
        exchange.response = Some(HttpResponse::new(status));
        exchange.into_handle()
    }

    fn cmd(control: &Arc<ControlPlane>, line: &str) {
        control.handle_command(parse_command(line).unwrap());
    }

    #[tokio::test]
    async fn test_request_then_response_events_in_order() {
        let h = harness();
        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;
        handle.write().response = Some(HttpResponse::new(200));
        h.control.on_response(Arc::clone(&handle)).await;

        let events = h.sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, EventKind::Request);
        assert_eq!(events[1].event, EventKind::Response);
        assert_eq!(events[0].id, events[1].id);
        assert!(events[0].response.is_none());
        assert_eq!(events[1].response.as_ref().unwrap().status, 200);
    }

    #[tokio::test]
    async fn test_loopback_flows_are_ignored() {
        let h = harness();
        for url in [
            "http://localhost:3000/api",
            "http://127.0.0.1/api",
            "http://[::1]:8080/api",
        ] {
            let handle = flow("a", url);
            h.control.on_request(Arc::clone(&handle)).await;
            h.control.on_response(handle).await;
        }

        assert!(h.sink.events().is_empty());
        assert!(h.control.registry().is_empty());
    }

    #[tokio::test]
    async fn test_map_local_short_circuits_matching_requests() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"mock_rule","key":"api.example.com/v1/items","body":"{\"mock\":1}","status":201,"headers":{},"enabled":true}"#,
        );

        let first = flow("a", "https://api.example.com/v1/items?page=1");
        let second = flow("b", "https://api.example.com/v1/items?page=2");
        h.control.on_request(Arc::clone(&first)).await;
        h.control.on_request(Arc::clone(&second)).await;

        let r1 = first.read().response.clone().unwrap();
        let r2 = second.read().response.clone().unwrap();
        assert_eq!(r1.status, 201);
        assert_eq!(r1.headers.get(OVERRIDE_MARKER_HEADER), Some("true"));
        assert_eq!(r1, r2);

        // Responses are visible on the request events too
        let events = h.sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].response.as_ref().unwrap().status, 201);
    }

    #[tokio::test]
    async fn test_mock_rule_updates_live_exchange() {
        let h = harness();
        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;
        assert!(handle.read().response.is_none());

        cmd(
            &h.control,
            r#"{"type":"mock_rule","key":"api.example.com/v1/items","body":"late","status":200,"headers":{},"enabled":true}"#,
        );
        assert_eq!(
            handle.read().response.as_ref().unwrap().body.as_ref(),
            b"late"
        );
    }

    #[tokio::test]
    async fn test_mock_rule_disabled_removes() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"mock_rule","key":"api.example.com/gone","body":"x","status":200,"headers":{},"enabled":true}"#,
        );
        cmd(
            &h.control,
            r#"{"type":"mock_rule","key":"api.example.com/gone","enabled":false}"#,
        );

        let handle = flow("a", "https://api.example.com/gone");
        h.control.on_request(Arc::clone(&handle)).await;
        assert!(handle.read().response.is_none());
    }

    #[tokio::test]
    async fn test_mock_response_registers_rule_and_reapplies() {
        let h = harness();
        let handle = flow_with_response("a", "https://api.example.com/v1/items", 404);
        h.control.on_request(Arc::clone(&handle)).await;

        cmd(
            &h.control,
            r#"{"type":"mock_response","id":"a","body":"fixed"}"#,
        );

        // Applied immediately to the live exchange, status carried over
        {
            let exchange = handle.read();
            let response = exchange.response.as_ref().unwrap();
            assert_eq!(response.status, 404);
            assert_eq!(response.body.as_ref(), b"fixed");
            assert_eq!(response.headers.get(OVERRIDE_MARKER_HEADER), Some("true"));
        }

        // And persisted as a rule for the next request to the same key
        let next = flow("b", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&next)).await;
        assert_eq!(next.read().response.as_ref().unwrap().body.as_ref(), b"fixed");
    }

    #[tokio::test]
    async fn test_mock_response_unknown_flow_is_noop() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"mock_response","id":"ghost","body":"x"}"#,
        );
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rule_clears_live_response() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"mock_rule","key":"api.example.com/v1/items","body":"x","status":200,"headers":{},"enabled":true}"#,
        );
        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;
        assert!(handle.read().response.is_some());

        cmd(&h.control, r#"{"type":"delete_rule","key":"api.example.com/v1/items"}"#);
        assert!(handle.read().response.is_none());
    }

    #[tokio::test]
    async fn test_mock_request_rewrites_live_request() {
        let h = harness();
        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;

        cmd(
            &h.control,
            r#"{"type":"mock_request","id":"a","body":"patched","headers":{"X-Injected":"1"}}"#,
        );

        let exchange = handle.read();
        assert_eq!(exchange.request.body.as_ref(), b"patched");
        assert_eq!(exchange.request.headers.get("X-Injected"), Some("1"));
    }

    #[tokio::test]
    async fn test_breakpoint_suspends_and_releases_with_edits() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"breakpoint_rule","key":"api.example.com/v1/items","request":true,"response":false}"#,
        );

        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;

        assert_eq!(h.engine.suspended.lock().as_slice(), ["a"]);
        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        let meta = events[0].breakpoint.as_ref().unwrap();
        assert_eq!(meta.state, BreakpointState::Waiting);
        assert_eq!(meta.key, "api.example.com/v1/items");

        h.sink.clear();
        cmd(
            &h.control,
            r#"{"type":"breakpoint_continue","id":"a","phase":"request","request":{"method":"post","url":"https://api.example.com/v2/items","body":"edited"}}"#,
        );

        assert_eq!(h.engine.resumed.lock().as_slice(), ["a"]);
        {
            let exchange = handle.read();
            assert_eq!(exchange.request.method, "POST");
            assert_eq!(exchange.request.body.as_ref(), b"edited");
        }

        // Rekeyed: old key slot gone, new key resolves to this flow
        assert!(h
            .control
            .registry()
            .lookup_by_key("api.example.com/v1/items")
            .is_none());
        assert_eq!(
            h.control
                .registry()
                .lookup_by_key("api.example.com/v2/items")
                .unwrap()
                .read()
                .id,
            "a"
        );

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        let meta = events[0].breakpoint.as_ref().unwrap();
        assert_eq!(meta.state, BreakpointState::Released);
        assert_eq!(meta.key, "api.example.com/v2/items");
        assert!(!h.control.breakpoints.is_waiting("a", Phase::Request));
    }

    #[tokio::test]
    async fn test_suspended_flow_survives_capacity_eviction() {
        let h = harness_with_config(CoreConfig {
            registry_capacity: 1,
            ..CoreConfig::default()
        });
        cmd(
            &h.control,
            r#"{"type":"breakpoint_rule","key":"api.example.com/held","request":true,"response":false}"#,
        );

        let held = flow("held-1", "https://api.example.com/held");
        h.control.on_request(Arc::clone(&held)).await;
        assert_eq!(h.engine.suspended.lock().as_slice(), ["held-1"]);

        // Unrelated traffic pushes the registry over capacity
        let other = flow("b", "https://api.example.com/other");
        h.control.on_request(other).await;

        // The suspended exchange is still resident and releasable
        assert!(h.control.registry().lookup_by_id("held-1").is_some());
        cmd(
            &h.control,
            r#"{"type":"breakpoint_continue","id":"held-1","phase":"request"}"#,
        );
        assert_eq!(h.engine.resumed.lock().as_slice(), ["held-1"]);
        assert_eq!(h.control.breakpoints().waiting_count(), 0);

        // Once released it is an ordinary entry again and may be evicted
        let later = flow("c", "https://api.example.com/later");
        h.control.on_request(later).await;
        assert!(h.control.registry().lookup_by_id("held-1").is_none());
    }

    #[tokio::test]
    async fn test_breakpoint_response_release_with_edit() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"breakpoint_rule","key":"api.example.com/v1/items","request":false,"response":true}"#,
        );

        let handle = flow_with_response("a", "https://api.example.com/v1/items", 500);
        h.control.on_response(Arc::clone(&handle)).await;
        assert_eq!(h.engine.suspended.lock().as_slice(), ["a"]);

        cmd(
            &h.control,
            r#"{"type":"breakpoint_continue","id":"a","phase":"response","response":{"status":204,"body":""}}"#,
        );

        assert_eq!(handle.read().response.as_ref().unwrap().status, 204);
        assert_eq!(h.engine.resumed.lock().as_slice(), ["a"]);
    }

    #[tokio::test]
    async fn test_unknown_phase_fails_open() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"breakpoint_rule","key":"api.example.com/v1/items","request":true,"response":false}"#,
        );
        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;
        h.sink.clear();

        cmd(
            &h.control,
            r#"{"type":"breakpoint_continue","id":"a","phase":"upgrade"}"#,
        );

        // Resumed without edits, no released event emitted
        assert_eq!(h.engine.resumed.lock().as_slice(), ["a"]);
        assert_eq!(handle.read().request.method, "GET");
        assert!(h.sink.events().is_empty());
        assert!(!h.control.breakpoints.is_waiting("a", Phase::Request));
    }

    #[tokio::test]
    async fn test_breakpoint_continue_unknown_flow_is_noop() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"breakpoint_continue","id":"ghost","phase":"request"}"#,
        );
        assert!(h.engine.resumed.lock().is_empty());
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakpoint_timeout_auto_releases() {
        let h = harness_with_config(CoreConfig {
            breakpoint_timeout_ms: Some(2_000),
            ..CoreConfig::default()
        });
        cmd(
            &h.control,
            r#"{"type":"breakpoint_rule","key":"api.example.com/v1/items","request":true,"response":false}"#,
        );

        let handle = flow("a", "https://api.example.com/v1/items");
        h.control.on_request(Arc::clone(&handle)).await;
        h.sink.clear();

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        tokio::task::yield_now().await;

        assert_eq!(h.engine.resumed.lock().as_slice(), ["a"]);
        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].breakpoint.as_ref().unwrap().state,
            BreakpointState::Released
        );
        // Released unmodified
        assert_eq!(handle.read().request.method, "GET");
    }

    #[tokio::test]
    async fn test_retry_flow_command() {
        let h = harness();
        let handle = flow_with_response("A", "https://api.example.com/foo", 200);
        h.control.on_request(Arc::clone(&handle)).await;
        h.control.on_response(Arc::clone(&handle)).await;

        cmd(
            &h.control,
            r#"{"type":"retry_flow","id":"A","method":"POST","body":"x"}"#,
        );

        let replayed = h.engine.replayed.lock();
        assert_eq!(replayed.len(), 1);
        let clone = replayed[0].read();
        assert_ne!(clone.id, "A");
        assert_eq!(clone.request.method, "POST");
        assert_eq!(clone.request.body.as_ref(), b"x");
        assert!(clone.response.is_none());
        // Original unmodified
        assert_eq!(handle.read().request.method, "GET");
    }

    #[tokio::test]
    async fn test_traffic_profile_command_activates() {
        let h = harness();
        cmd(
            &h.control,
            r#"{"type":"traffic_profile","profile":{"id":"edge","name":"Edge","latency_ms":-5,"packet_loss":1.5}}"#,
        );
        let active = h.control.shaper().active_profile();
        assert_eq!(active.id, "edge");
        assert_eq!(active.latency_ms, 0.0);
        assert_eq!(active.packet_loss, 1.0);
    }

    #[tokio::test]
    async fn test_loss_substitutes_598_response() {
        let h = harness();
        h.control.shaper().set_profile(crate::shaping::TrafficProfile {
            id: "lossy".to_string(),
            packet_loss: 1.0,
            ..crate::shaping::TrafficProfile::disabled()
        });

        let handle = flow_with_response("a", "https://api.example.com/v1/items", 200);
        h.control.on_response(Arc::clone(&handle)).await;

        let exchange = handle.read();
        let response = exchange.response.as_ref().unwrap();
        assert_eq!(response.status, LOSS_STATUS);
        assert_eq!(response.body.as_ref(), LOSS_BODY.as_bytes());

        let events = h.sink.events();
        assert_eq!(events[0].response.as_ref().unwrap().status, LOSS_STATUS);
    }

    #[tokio::test]
    async fn test_shaped_response_tagged_with_profile() {
        let h = harness();
        h.control.shaper().set_profile(crate::shaping::TrafficProfile {
            id: "tagged".to_string(),
            downstream_kbps: 1_000_000.0,
            ..crate::shaping::TrafficProfile::disabled()
        });

        let handle = flow_with_response("a", "https://api.example.com/v1/items", 200);
        h.control.on_response(Arc::clone(&handle)).await;

        let exchange = handle.read();
        let response = exchange.response.as_ref().unwrap();
        assert_eq!(response.headers.get(PROFILE_HEADER), Some("tagged"));
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_malformed_rule_then_valid_commands_still_work() {
        let h = harness();
        assert!(parse_command("garbage").is_err());
        cmd(
            &h.control,
            r#"{"type":"breakpoint_rule","key":"k","request":true,"response":false}"#,
        );
        assert!(h.control.breakpoints.rule_for("k").is_some());
    }
}
