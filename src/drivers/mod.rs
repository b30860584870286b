//! FlexCAN driver modules.

pub mod can;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod registers;
