pub mod collaboration;
pub mod diagram;
pub mod error;
pub mod health;
pub mod messages;
pub mod threat_model;

pub use collaboration::*;
pub use diagram::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use threat_model::*;
