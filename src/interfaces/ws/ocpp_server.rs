//! OCPP 1.6 WebSocket server
//!
//! Accepts the charger at `ws://<host>:<port>/<base_path>/{charge_point_id}`.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::application::commands::SharedCommandSender;
use crate::application::events::{
    ChargePointConnectedEvent, ChargePointDisconnectedEvent, Event, SharedEventBus,
};
use crate::application::handlers::{HandlerContext, SharedActionRouter};
use crate::application::session::{
    Connection, OutboundMessage, RegisterResult, SharedSessionRegistry,
};
use crate::application::state::SharedStateStore;
use crate::config::Config;
use crate::shared::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
pub const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

type ServerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone)]
pub struct OcppServer {
    config: Config,
    session_registry: SharedSessionRegistry,
    command_sender: SharedCommandSender,
    router: SharedActionRouter,
    state: SharedStateStore,
    event_bus: SharedEventBus,
    shutdown_signal: Option<ShutdownSignal>,
}

impl OcppServer {
    pub fn new(
        config: Config,
        session_registry: SharedSessionRegistry,
        command_sender: SharedCommandSender,
        router: SharedActionRouter,
        state: SharedStateStore,
    ) -> Self {
        let event_bus = state.events().clone();
        Self {
            config,
            session_registry,
            command_sender,
            router,
            state,
            event_bus,
            shutdown_signal: None,
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self) -> ServerResult {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> ServerResult {
        let addr = listener.local_addr()?;
        info!("🔌 OCPP 1.6 Central System started on ws://{}", addr);
        info!(
            "   Charge points should connect to: ws://{}{}/{{charge_point_id}}",
            addr, self.config.base_path
        );

        let shutdown = self.shutdown_signal.clone();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                _ = wait_for(shutdown.as_ref()) => {
                    info!("🛑 WebSocket server received shutdown signal");
                    self.session_registry.close_all("server shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.handle_connection(stream, addr).await {
                warn!("Connection from {} ended: {}", addr, e);
            }
        });
    }

    async fn handle_connection(self, stream: TcpStream, addr: SocketAddr) -> ServerResult {
        debug!("New TCP connection from: {}", addr);

        let mut identity: Option<String> = None;
        let callback = |req: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let path = req.uri().path();
            let Some(id) =
                resolve_identity(path, &self.config.base_path, &self.config.default_identity)
            else {
                warn!(%addr, path, "Handshake rejected: path outside base");
                return Err(reject(StatusCode::NOT_FOUND, "unknown path"));
            };

            let requested = req
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !offers_subprotocol(requested) {
                warn!(%addr, requested, "Handshake rejected: ocpp1.6 not offered");
                return Err(reject(StatusCode::BAD_REQUEST, "subprotocol ocpp1.6 required"));
            }

            if !self.session_registry.can_accept(&id) {
                warn!(%addr, charge_point_id = id.as_str(), "Handshake rejected: session slot taken");
                return Err(reject(StatusCode::CONFLICT, "another charge point is connected"));
            }

            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(OCPP_SUBPROTOCOL));
            identity = Some(id);
            Ok(response)
        };

        let mut ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
        let charge_point_id = identity.unwrap_or_else(|| self.config.default_identity.clone());
        let connection_id = self.session_registry.next_connection_id();

        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let connection = Connection::new(
            connection_id,
            &charge_point_id,
            Some(addr.to_string()),
            tx.clone(),
        );

        match self.session_registry.register(connection) {
            RegisterResult::Registered => {}
            RegisterResult::Replaced(evicted) => {
                let dropped = self.command_sender.cleanup_connection(evicted.connection_id);
                info!(
                    charge_point_id = charge_point_id.as_str(),
                    old_connection_id = evicted.connection_id,
                    dropped,
                    "Reconnect replaced the previous session"
                );
            }
            RegisterResult::Rejected { .. } => {
                let frame = CloseFrame {
                    code: CloseCode::Policy,
                    reason: "another charge point is connected".into(),
                };
                let _ = ws_stream.close(Some(frame)).await;
                return Ok(());
            }
        }

        info!(
            charge_point_id = charge_point_id.as_str(),
            connection_id,
            %addr,
            "Charge point connected"
        );
        self.state.apply(|s| s.mark_connected(&charge_point_id));
        self.event_bus
            .publish(Event::ChargePointConnected(ChargePointConnectedEvent {
                charge_point_id: charge_point_id.clone(),
                remote_addr: Some(addr.to_string()),
                timestamp: Utc::now(),
            }));

        let ctx = HandlerContext {
            charge_point_id: charge_point_id.clone(),
            connection_id,
            state: self.state.clone(),
            session_registry: self.session_registry.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Outgoing frames and close requests
        let cp_id_send = charge_point_id.clone();
        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    OutboundMessage::Frame(text) => {
                        debug!(charge_point_id = cp_id_send.as_str(), raw = text.as_str(), ">> frame");
                        if let Err(e) = ws_sender.send(Message::Text(text)).await {
                            error!(charge_point_id = cp_id_send.as_str(), "Send error: {}", e);
                            break;
                        }
                    }
                    OutboundMessage::Close(reason) => {
                        info!(charge_point_id = cp_id_send.as_str(), reason = reason.as_str(), "Closing socket");
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.into(),
                        };
                        let _ = ws_sender.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        });

        // Incoming frames, handled one at a time
        let router = self.router.clone();
        let reply_tx = tx.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = router.handle_text(&ctx, &text).await {
                            if reply_tx.send(OutboundMessage::Frame(reply)).is_err() {
                                return "outbound queue closed";
                            }
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        warn!(
                            charge_point_id = ctx.charge_point_id.as_str(),
                            len = data.len(),
                            "Binary message ignored"
                        );
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(charge_point_id = ctx.charge_point_id.as_str(), ?frame, "Close frame received");
                        return "closed by charge point";
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        warn!(charge_point_id = ctx.charge_point_id.as_str(), "WebSocket error: {}", e);
                        return "transport error";
                    }
                }
            }
            "stream ended"
        });

        let reason = tokio::select! {
            _ = &mut send_task => "send side closed",
            result = &mut recv_task => result.unwrap_or("receive task failed"),
            _ = wait_for(self.shutdown_signal.as_ref()) => {
                let _ = tx.send(OutboundMessage::Close("server shutting down".into()));
                let _ = tokio::time::timeout(Duration::from_secs(1), &mut send_task).await;
                "server shutdown"
            }
        };
        send_task.abort();
        recv_task.abort();

        self.cleanup(&charge_point_id, connection_id, reason);
        Ok(())
    }

    fn cleanup(&self, charge_point_id: &str, connection_id: u64, reason: &str) {
        let released = self.session_registry.unregister(charge_point_id, connection_id);
        let dropped = self.command_sender.cleanup_connection(connection_id);

        info!(
            charge_point_id,
            connection_id,
            reason,
            dropped,
            "Charge point disconnected"
        );

        // A newer connection of the same identity owns the state now.
        if !released {
            return;
        }

        self.state.apply(|s| {
            s.charge_point_id.as_deref() == Some(charge_point_id) && s.mark_disconnected()
        });
        self.event_bus
            .publish(Event::ChargePointDisconnected(ChargePointDisconnectedEvent {
                charge_point_id: charge_point_id.to_string(),
                reason: Some(reason.to_string()),
                timestamp: Utc::now(),
            }));
    }
}

async fn wait_for(shutdown: Option<&ShutdownSignal>) {
    match shutdown {
        Some(signal) => signal.wait().await,
        None => std::future::pending().await,
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

fn offers_subprotocol(header: &str) -> bool {
    header
        .split(',')
        .map(str::trim)
        .any(|p| p.eq_ignore_ascii_case(OCPP_SUBPROTOCOL))
}

/// Identity from the request path: the last segment below `base_path`, or
/// `default_identity` when there is none. `None` if the path is outside
/// the base.
fn resolve_identity(path: &str, base_path: &str, default_identity: &str) -> Option<String> {
    let base = base_path.trim_end_matches('/');
    let rest = path.strip_prefix(base)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }

    let identity = rest
        .split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or(default_identity);
    Some(identity.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Error as WsError;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::*;
    use crate::application::commands::{create_command_sender, trigger_message, TriggerType};
    use crate::application::events::create_event_bus;
    use crate::application::handlers::create_ocpp16_router;
    use crate::application::session::SessionRegistry;
    use crate::application::state::StateStore;
    use crate::domain::ChargeStatus;
    use crate::shared::OcppFrame;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Harness {
        addr: SocketAddr,
        state: SharedStateStore,
        command_sender: SharedCommandSender,
        shutdown: ShutdownSignal,
    }

    async fn start() -> Harness {
        let registry = SessionRegistry::shared(1);
        let command_sender = create_command_sender(registry.clone(), Duration::from_secs(5));
        let router = create_ocpp16_router(command_sender.clone());
        let state = Arc::new(StateStore::new(create_event_bus()));
        let shutdown = ShutdownSignal::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = OcppServer::new(
            Config::default(),
            registry,
            command_sender.clone(),
            router,
            state.clone(),
        )
        .with_shutdown(shutdown.clone());
        tokio::spawn(server.serve(listener));

        Harness {
            addr,
            state,
            command_sender,
            shutdown,
        }
    }

    async fn connect(addr: SocketAddr, path: &str, protocol: Option<&'static str>) -> Result<Client, WsError> {
        let mut request = format!("ws://{addr}{path}").into_client_request().unwrap();
        if let Some(p) = protocol {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(p));
        }
        connect_async(request).await.map(|(ws, _)| ws)
    }

    fn status_of(result: Result<Client, WsError>) -> u16 {
        match result {
            Err(WsError::Http(response)) => response.status().as_u16(),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("handshake unexpectedly accepted"),
        }
    }

    async fn next_frame(ws: &mut Client) -> OcppFrame {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("frame in time")
                .expect("stream open")
                .unwrap();
            if let Message::Text(text) = msg {
                return OcppFrame::parse(&text).unwrap();
            }
        }
    }

    async fn call(ws: &mut Client, id: &str, action: &str, payload: Value) -> OcppFrame {
        let text = json!([2, id, action, payload]).to_string();
        ws.send(Message::Text(text)).await.unwrap();
        next_frame(ws).await
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn identity_from_path() {
        assert_eq!(resolve_identity("/ocpp/THOR1", "/ocpp", "growatt_thor").as_deref(), Some("THOR1"));
        assert_eq!(resolve_identity("/ocpp/a/b/", "/ocpp", "growatt_thor").as_deref(), Some("b"));
        assert_eq!(resolve_identity("/ocpp", "/ocpp", "growatt_thor").as_deref(), Some("growatt_thor"));
        assert_eq!(resolve_identity("/ocpp/", "/ocpp", "growatt_thor").as_deref(), Some("growatt_thor"));
        assert_eq!(resolve_identity("/ocppx/THOR1", "/ocpp", "growatt_thor"), None);
        assert_eq!(resolve_identity("/other/THOR1", "/ocpp", "growatt_thor"), None);
        assert_eq!(resolve_identity("/THOR1", "/", "growatt_thor").as_deref(), Some("THOR1"));
    }

    #[test]
    fn subprotocol_offer_is_parsed() {
        assert!(offers_subprotocol("ocpp1.6"));
        assert!(offers_subprotocol("ocpp2.0.1, ocpp1.6"));
        assert!(!offers_subprotocol("ocpp2.0.1"));
        assert!(!offers_subprotocol(""));
    }

    #[tokio::test]
    async fn handshake_rejections() {
        let h = start().await;

        assert_eq!(status_of(connect(h.addr, "/ocpp/THOR1", None).await), 400);
        assert_eq!(status_of(connect(h.addr, "/ocpp/THOR1", Some("ocpp2.0.1")).await), 400);
        assert_eq!(status_of(connect(h.addr, "/other/THOR1", Some("ocpp1.6")).await), 404);

        let _first = connect(h.addr, "/ocpp/THOR1", Some("ocpp1.6")).await.unwrap();
        eventually(|| h.state.snapshot().connected).await;
        assert_eq!(status_of(connect(h.addr, "/ocpp/THOR2", Some("ocpp1.6")).await), 409);

        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn boot_status_and_disconnect() {
        let h = start().await;
        let mut ws = connect(h.addr, "/ocpp/THOR1", Some("ocpp1.6")).await.unwrap();

        let reply = call(
            &mut ws,
            "b1",
            "BootNotification",
            json!({"chargePointVendor": "Growatt", "chargePointModel": "THOR 11AS", "chargePointSerialNumber": "SN1"}),
        )
        .await;
        match reply {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "b1");
                assert_eq!(payload["status"], "Accepted");
                assert_eq!(payload["interval"], 60);
            }
            other => panic!("unexpected {other:?}"),
        }

        call(&mut ws, "s1", "StatusNotification", json!({"connectorId": 1, "status": "Available", "errorCode": "NoError"})).await;
        let snapshot = h.state.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.charge_point_id.as_deref(), Some("THOR1"));
        assert_eq!(snapshot.status, ChargeStatus::Idle);
        assert_eq!(snapshot.boot.map(|b| b.model), Some("THOR 11AS".to_string()));

        ws.close(None).await.unwrap();
        eventually(|| !h.state.snapshot().connected).await;
        assert_eq!(h.state.snapshot().status, ChargeStatus::Unavailable);

        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn bad_frames_keep_the_connection() {
        let h = start().await;
        let mut ws = connect(h.addr, "/ocpp/THOR1", Some("ocpp1.6")).await.unwrap();

        ws.send(Message::Text("garbage".into())).await.unwrap();
        match call(&mut ws, "g1", "Heartbeat", json!("oops")).await {
            OcppFrame::CallError { unique_id, error_code, .. } => {
                assert_eq!(unique_id, "g1");
                assert_eq!(error_code, "FormationViolation");
            }
            other => panic!("unexpected {other:?}"),
        }

        match call(&mut ws, "h1", "Heartbeat", json!({})).await {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "h1");
                assert!(payload["currentTime"].is_string());
            }
            other => panic!("unexpected {other:?}"),
        }

        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn outbound_call_is_correlated() {
        let h = start().await;
        let mut ws = connect(h.addr, "/ocpp/THOR1", Some("ocpp1.6")).await.unwrap();
        eventually(|| h.state.snapshot().connected).await;

        let sender = h.command_sender.clone();
        let pending = tokio::spawn(async move {
            trigger_message(&sender, "THOR1", TriggerType::StatusNotification, None).await
        });

        let (unique_id, action) = match next_frame(&mut ws).await {
            OcppFrame::Call { unique_id, action, .. } => (unique_id, action),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(action, "TriggerMessage");

        let answer = json!([3, unique_id, {"status": "Accepted"}]).to_string();
        ws.send(Message::Text(answer)).await.unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), "Accepted");
        h.shutdown.trigger();
    }

    #[tokio::test]
    async fn shutdown_closes_the_charger() {
        let h = start().await;
        let mut ws = connect(h.addr, "/ocpp/THOR1", Some("ocpp1.6")).await.unwrap();
        eventually(|| h.state.snapshot().connected).await;

        h.shutdown.trigger();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    return true;
                }
            }
            true
        })
        .await;
        assert_eq!(closed, Ok(true));
    }
}
