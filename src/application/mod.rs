pub mod commands;
pub mod events;
pub mod handlers;
pub mod session;
pub mod state;

// Re-export key types for convenience
pub use commands::{
    get_configuration, trigger_message, CommandError, CommandSender, ConfigurationResult,
    RefreshReport, RefreshService, SharedCommandSender, SharedRefreshService, TriggerType,
};
pub use events::{create_event_bus, Event, EventBus, EventMessage, EventSubscriber, SharedEventBus};
pub use handlers::{create_ocpp16_router, ActionHandler, ActionRouter, HandlerContext, SharedActionRouter};
pub use session::{SessionRegistry, SharedSessionRegistry};
pub use state::{ChargePointState, SharedStateStore, StateSnapshot, StateStore};
