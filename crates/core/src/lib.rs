//! Domain types shared by the coinlab stores, the gateway client and the CLI.

pub mod events;
pub mod models;
pub mod traits;

pub use events::*;
pub use models::*;
pub use traits::*;
