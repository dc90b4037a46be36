pub mod accounts;
pub mod amount;
pub mod chat;
pub mod config;
pub mod ipc;
pub mod jobs;
pub mod ledger;
pub mod protocol;
pub mod supervisor;
pub mod utils;
