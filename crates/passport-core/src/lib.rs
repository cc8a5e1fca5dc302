pub mod config;
pub mod error;

pub use config::PassportConfig;
pub use error::{PassportError, PassportResult};
