// Library surface for headless/integration tests and the binary.
pub mod app;
pub mod app_dirs;
pub mod canvas;
pub mod celebration;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod round;
pub mod runtime;
pub mod session;
pub mod ui;
pub mod vocabulary;
