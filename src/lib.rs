pub mod archive;
pub mod config;
pub mod elevate;
pub mod error;
pub mod install;
pub mod integrate;
pub mod leftover;
pub mod registry;
pub mod resolve;
pub mod task;
pub mod uninstall;
pub mod util;
