/// Radio/MAC collaborator interface
pub mod traits;

pub use traits::{JoinRequest, MacRadio, UplinkRequest};
