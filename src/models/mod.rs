// Models module - entity representations

pub mod authorization_code;

pub use authorization_code::{AuthorizationCode, NewAuthorizationCode, SortField};
