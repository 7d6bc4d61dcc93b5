//! hypotree-dispatch - action vocabulary and line protocol over TreeManager
//!
//! `Command` is the closed set of things a caller can ask for, `Dispatcher`
//! runs one command against a manager, and `serve` drives a JSON-lines
//! stream of requests through a dispatcher.

pub mod command;
pub mod dispatcher;
pub mod serve;

pub use command::{Action, Command};
pub use dispatcher::Dispatcher;
pub use serve::serve;
