pub mod config;
pub mod error;
pub mod slug;
pub mod types;

pub use config::Config;
pub use error::FixwiseError;
pub use slug::*;
pub use types::*;
