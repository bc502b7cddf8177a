//! Socket ownership and the authenticated session on top of it.

pub mod connection;
pub mod session;

pub use connection::Connection;
pub use session::Session;
