pub mod address;
pub mod hash;
pub mod identity;
pub mod merkle;

pub use address::address_of;
pub use identity::{validate_public, verify, PrivateIdentity};
