pub mod accounts;
pub mod common;
pub mod conflicts;
pub mod network;
pub mod note;
pub mod settings;
pub mod sync;
pub mod watch;
