//! JSON-RPC API Layer
//!
//! Service surface of the notebook app engine: launch an app by name, describe
//! its input form, and shut the service down from a loopback client.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig, ServerError};
