//! Inbound frame dispatch
//!
//! Calls are routed by action name to a registered [`ActionHandler`];
//! CallResult and CallError frames are handed to the [`CommandSender`] that
//! is waiting for them.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::application::commands::SharedCommandSender;
use crate::application::session::SharedSessionRegistry;
use crate::application::state::SharedStateStore;
use crate::shared::ocpp_frame::{error_code, OcppFrame};
use crate::shared::HandlerFault;

/// Everything a handler may touch for one connection.
#[derive(Clone)]
pub struct HandlerContext {
    pub charge_point_id: String,
    pub connection_id: u64,
    pub state: SharedStateStore,
    pub session_registry: SharedSessionRegistry,
    /// Seconds, returned in BootNotification.
    pub heartbeat_interval: u32,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, payload: Value) -> Result<Value, HandlerFault>;
}

pub struct ActionRouter {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
    command_sender: SharedCommandSender,
}

pub type SharedActionRouter = Arc<ActionRouter>;

impl ActionRouter {
    pub fn new(command_sender: SharedCommandSender) -> Self {
        Self {
            handlers: HashMap::new(),
            command_sender,
        }
    }

    pub fn register(&mut self, action: &'static str, handler: impl ActionHandler + 'static) -> &mut Self {
        self.handlers.insert(action, Arc::new(handler));
        self
    }

    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<_> = self.handlers.keys().copied().collect();
        actions.sort_unstable();
        actions
    }

    /// Decode a text frame and handle it. Returns the serialized reply, if
    /// one is due.
    pub async fn handle_text(&self, ctx: &HandlerContext, text: &str) -> Option<String> {
        metrics::counter!("ocpp_frames_received_total").increment(1);
        debug!(charge_point_id = ctx.charge_point_id.as_str(), raw = text, "<< frame");

        match OcppFrame::parse(text) {
            Ok(frame) => self
                .handle_inbound(ctx, frame)
                .await
                .map(|reply| reply.serialize()),
            Err(e) => {
                metrics::counter!("ocpp_frame_decode_errors_total").increment(1);
                warn!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    error = %e,
                    raw = text,
                    "Undecodable frame"
                );
                OcppFrame::recover_call_id(text).map(|unique_id| {
                    OcppFrame::error_response(unique_id, error_code::FORMATION_VIOLATION, e.to_string())
                        .serialize()
                })
            }
        }
    }

    pub async fn handle_inbound(&self, ctx: &HandlerContext, frame: OcppFrame) -> Option<OcppFrame> {
        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => Some(self.dispatch(ctx, unique_id, &action, payload).await),

            OcppFrame::CallResult { unique_id, payload } => {
                self.command_sender.handle_response(
                    ctx.connection_id,
                    &ctx.charge_point_id,
                    &unique_id,
                    payload,
                );
                None
            }

            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                self.command_sender.handle_error(
                    ctx.connection_id,
                    &ctx.charge_point_id,
                    &unique_id,
                    &error_code,
                    &error_description,
                );
                None
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &HandlerContext,
        unique_id: String,
        action: &str,
        payload: Value,
    ) -> OcppFrame {
        ctx.session_registry.touch(&ctx.charge_point_id);

        let Some(handler) = self.handlers.get(action).cloned() else {
            metrics::counter!("ocpp_calls_total", "action" => action.to_string(), "outcome" => "not_implemented")
                .increment(1);
            warn!(
                charge_point_id = ctx.charge_point_id.as_str(),
                action,
                message_id = unique_id.as_str(),
                "Unsupported action"
            );
            return OcppFrame::error_response(
                unique_id,
                error_code::NOT_IMPLEMENTED,
                format!("Action '{}' is not supported", action),
            );
        };

        let result = AssertUnwindSafe(handler.handle(ctx, payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerFault::Panicked(panic_message(panic))));

        match result {
            Ok(payload) => {
                metrics::counter!("ocpp_calls_total", "action" => action.to_string(), "outcome" => "ok")
                    .increment(1);
                OcppFrame::CallResult { unique_id, payload }
            }
            Err(fault) => {
                metrics::counter!("ocpp_calls_total", "action" => action.to_string(), "outcome" => "fault")
                    .increment(1);
                error!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    action,
                    message_id = unique_id.as_str(),
                    error = %fault,
                    "Handler failed"
                );
                OcppFrame::error_response(unique_id, fault.error_code(), fault.to_string())
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use super::HandlerContext;
    use crate::application::commands::{create_command_sender, SharedCommandSender};
    use crate::application::events::create_event_bus;
    use crate::application::session::SessionRegistry;
    use crate::application::state::StateStore;

    pub fn context() -> (HandlerContext, SharedCommandSender) {
        let registry = SessionRegistry::shared(1);
        let sender = create_command_sender(registry.clone(), Duration::from_secs(1));
        let ctx = HandlerContext {
            charge_point_id: "THOR1".into(),
            connection_id: 1,
            state: Arc::new(StateStore::new(create_event_bus())),
            session_registry: registry,
            heartbeat_interval: 60,
        };
        (ctx, sender)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::context;
    use super::*;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn handle(&self, _: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
            Ok(payload)
        }
    }

    struct Boom;

    #[async_trait]
    impl ActionHandler for Boom {
        async fn handle(&self, _: &HandlerContext, _: Value) -> Result<Value, HandlerFault> {
            panic!("handler exploded")
        }
    }

    struct Picky;

    #[async_trait]
    impl ActionHandler for Picky {
        async fn handle(&self, _: &HandlerContext, payload: Value) -> Result<Value, HandlerFault> {
            serde_json::from_value::<u32>(payload).map_err(|source| HandlerFault::InvalidPayload {
                action: "Picky",
                source,
            })?;
            Ok(json!({}))
        }
    }

    fn router(sender: SharedCommandSender) -> ActionRouter {
        let mut router = ActionRouter::new(sender);
        router.register("Echo", Echo).register("Boom", Boom).register("Picky", Picky);
        router
    }

    fn reply(text: Option<String>) -> OcppFrame {
        OcppFrame::parse(&text.expect("a reply")).unwrap()
    }

    #[tokio::test]
    async fn routes_call_to_handler() {
        let (ctx, sender) = context();
        let out = router(sender).handle_text(&ctx, r#"[2,"m1","Echo",{"a":1}]"#).await;
        assert_eq!(
            reply(out),
            OcppFrame::CallResult {
                unique_id: "m1".into(),
                payload: json!({"a": 1})
            }
        );
    }

    #[tokio::test]
    async fn unknown_action_is_not_implemented() {
        let (ctx, sender) = context();
        let out = router(sender).handle_text(&ctx, r#"[2,"m2","Reset",{}]"#).await;
        match reply(out) {
            OcppFrame::CallError { unique_id, error_code, .. } => {
                assert_eq!(unique_id, "m2");
                assert_eq!(error_code, "NotImplemented");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let (ctx, sender) = context();
        let out = router(sender).handle_text(&ctx, r#"[2,"m3","Boom",{}]"#).await;
        match reply(out) {
            OcppFrame::CallError { error_code, error_description, .. } => {
                assert_eq!(error_code, "InternalError");
                assert!(error_description.contains("handler exploded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_payload_is_formation_violation() {
        let (ctx, sender) = context();
        let out = router(sender).handle_text(&ctx, r#"[2,"m4","Picky",{}]"#).await;
        match reply(out) {
            OcppFrame::CallError { error_code, .. } => assert_eq!(error_code, "FormationViolation"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_call_gets_error_when_id_recoverable() {
        let (ctx, sender) = context();
        let router = router(sender);

        let out = router.handle_text(&ctx, r#"[2,"m5","Echo","not-an-object"]"#).await;
        match reply(out) {
            OcppFrame::CallError { unique_id, error_code, .. } => {
                assert_eq!(unique_id, "m5");
                assert_eq!(error_code, "FormationViolation");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(router.handle_text(&ctx, "garbage").await, None);
        assert_eq!(router.handle_text(&ctx, "[9,\"x\",{}]").await, None);
    }

    #[tokio::test]
    async fn results_are_not_answered() {
        let (ctx, sender) = context();
        let out = router(sender).handle_text(&ctx, r#"[3,"CS-99",{}]"#).await;
        assert_eq!(out, None);
    }
}
