pub mod fingerprint;
pub mod local;
pub mod provider;

pub use fingerprint::*;
pub use local::*;
pub use provider::*;
