pub mod config;
pub mod error;
pub mod hash;
pub mod text;
pub mod types;
pub mod urls;

pub use config::Config;
pub use error::{LeadSignalError, Result};
pub use hash::content_hash;
pub use text::normalize_whitespace;
pub use types::*;
pub use urls::normalize_url;
