pub mod api;
pub mod bidding;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock_bidder;
pub mod model;
pub mod routing;
