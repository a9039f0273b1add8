pub mod auction_log;
pub mod ledger;
