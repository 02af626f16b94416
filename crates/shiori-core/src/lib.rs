pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod models;
pub mod organizer;
pub mod storage;
