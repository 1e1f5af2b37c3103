pub mod errors;
pub mod ocpp_frame;
pub mod shutdown;

pub use errors::{CoercionError, HandlerFault, TransportFault};
pub use ocpp_frame::{OcppFrame, OcppFrameError};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
