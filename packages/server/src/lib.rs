// Campaign Jobs - API Core
//
// Campaign management backend: HTTP endpoints create campaigns and enqueue
// crawl/qualify/dispatch jobs; workers drive each job through its lifecycle.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
