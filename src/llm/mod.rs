pub mod analyst;
#[cfg(feature = "gemini")]
pub mod client;
pub mod prompts;
pub mod types;
pub mod utils;

pub use analyst::*;
#[cfg(feature = "gemini")]
pub use client::*;
pub use types::*;
