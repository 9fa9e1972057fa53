pub mod config;
pub mod error;
pub mod interpreter;
pub mod lox;

pub use crate::config::RuntimeConfig;
pub use crate::error::RuntimeError;
pub use crate::lox::{Lox, Status};
