pub mod config;
pub mod controller;
pub mod module;
pub mod motion;
pub mod transport;
