pub mod collaborate;
pub mod diagram;
pub mod health;
pub mod sessions;
pub mod ws;

pub use health::*;
