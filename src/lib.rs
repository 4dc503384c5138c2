pub mod address_book;
pub mod builder;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod submitter;
pub mod wallet;
