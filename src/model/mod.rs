pub mod base;
pub mod config;
pub mod entity;
pub mod promotion;
pub mod property;
pub mod scope;

pub use base::*;
pub use config::*;
pub use entity::*;
pub use promotion::*;
pub use property::*;
pub use scope::*;
