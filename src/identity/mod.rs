//! Caller identity and the platform user/role directory.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod directory;
mod request_context;

pub use principal::{Principal, Attrs};
pub use directory::{UserDirectory, StaticDirectory, UserRecord, RoleRecord};
pub use request_context::RequestContext;
