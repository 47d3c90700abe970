pub mod error;
pub mod router;

pub use error::{Result, RouterError};
pub use router::ChatKeyRouter;
