//! Database side collaborators of a migration target.
//!
//! - [`ConnectionSource`] hands out [`DatabaseConnection`]s, the way a pool
//!   or data source does.
//! - [`ResourceLoader`] turns a changelog path into changelog content.
//!
//! Both are thin `Arc` handles around provider traits, so applications plug
//! in their own pool or storage by implementing the provider trait.

mod connection;
mod resource;

pub use connection::*;
pub use resource::*;
