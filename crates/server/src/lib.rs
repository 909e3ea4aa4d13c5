pub mod block;
pub mod config;
pub mod dashboard;
pub mod extensions;
pub mod net;
pub mod persistence;
pub mod session;
