//! Request-handling core for the Cobalto web framework: routing,
//! middleware, context, body parsing and WebSocket upgrade.
//!
//! Configuration file parsing, CLI tooling, template rendering and the
//! ORM are external collaborators layered on top of this crate; they are
//! not grown here.

pub mod app;
pub mod body;
pub mod context;
pub mod error;
pub mod method;
pub mod middleware;
pub mod routing;
pub mod settings;
pub mod websocket;

pub use app::{Application, WsContext};
pub use context::Context;
pub use error::{AppError, ExceptionFilter};
pub use method::Method;
pub use middleware::{Middleware, Next, Pipeline};
pub use routing::{Router, RouterError};
pub use settings::Settings;
