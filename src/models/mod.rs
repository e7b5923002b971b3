pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod health;
pub mod messages;
pub mod pairing;
pub mod session;

pub use diagnostics::*;
pub use envelope::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use pairing::*;
pub use session::*;
