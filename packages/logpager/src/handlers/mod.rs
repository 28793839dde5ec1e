mod health;
mod websocket;

pub use health::health_handler;
pub use websocket::log_websocket_handler;
