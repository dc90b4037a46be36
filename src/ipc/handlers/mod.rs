pub mod account;
pub mod afk;
pub mod ledger;
