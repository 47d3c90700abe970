//! agentlane-terminal — interactive PTY shell sessions for agent runs.
//!
//! Sessions are owned by the `TerminalManager` that a single run holds, not
//! by the process — `close_all` forcibly tears every session down when its
//! run terminates.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use agentlane_terminal::manager::TerminalManager;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mgr = TerminalManager::new();
//!
//!     let (id, output) = mgr.exec_command("echo hello", None, None).await.unwrap();
//!     println!("{output}");
//!
//!     mgr.write_stdin(&id, "echo again\n").await.unwrap();
//!     mgr.close_shell(&id).await.unwrap();
//! }
//! ```

pub mod error;
pub mod manager;
pub mod safety;
pub mod session;
pub mod truncate;
pub mod types;

pub use error::{Result, TerminalError};
pub use manager::TerminalManager;
pub use types::{SessionId, SessionInfo};
