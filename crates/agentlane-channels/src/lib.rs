pub mod dispatcher;
pub mod error;
pub mod registry;

pub use dispatcher::{Dispatcher, SendOutcome, SendTextParams};
pub use error::DispatcherError;
pub use registry::EgressRegistry;
