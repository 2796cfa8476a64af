// Public API for integration tests and the server binary

pub mod error;
pub mod protocol;
pub mod state;
pub mod types;
pub mod words;
pub mod ws;
