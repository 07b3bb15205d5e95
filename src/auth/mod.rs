pub mod permissions;
pub mod scope;
pub mod user;

pub use permissions::*;
pub use scope::*;
pub use user::*;
