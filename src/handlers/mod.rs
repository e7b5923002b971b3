pub mod diagnostics;
pub mod health;
pub mod sessions;

pub use diagnostics::*;
pub use health::*;
pub use sessions::*;
