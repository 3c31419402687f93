pub mod cli;
pub mod env;
pub mod error;
pub mod fsutils;
pub mod setup;
pub mod timeutils;
