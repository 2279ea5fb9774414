mod dispatcher;
mod handler;
mod handlers;
pub mod message;

pub use dispatcher::MessageDispatcher;
pub use handler::ws_handler;
pub use handlers::{HandlerError, HandlerResult};
pub use message::{ClientRequest, InboundEnvelope, OutboundEnvelope, RequestKind, ServerEvent};
