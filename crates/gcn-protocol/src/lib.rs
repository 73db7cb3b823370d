pub mod auth;
pub mod envelope;
pub mod message;
pub mod resources;
pub mod status;

pub use auth::*;
pub use envelope::*;
pub use message::*;
pub use status::*;
