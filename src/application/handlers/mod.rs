pub mod ocpp_v16;
pub mod router;

pub use router::{ActionHandler, ActionRouter, HandlerContext, SharedActionRouter};

use crate::application::commands::SharedCommandSender;

/// Router with every supported 1.6 action registered.
pub fn create_ocpp16_router(command_sender: SharedCommandSender) -> SharedActionRouter {
    let mut router = ActionRouter::new(command_sender);
    ocpp_v16::register_all(&mut router);
    std::sync::Arc::new(router)
}
