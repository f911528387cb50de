pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod events;
pub mod io;
pub mod pagination;
pub mod paths;
pub mod release;
pub mod scheduler;
pub mod service;
pub mod types;
pub mod validation;
pub mod validator;
pub mod workspace;

pub use error::{CadenceError, Result};
pub use workspace::Workspace;
