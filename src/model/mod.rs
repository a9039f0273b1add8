pub mod adapters;
pub mod auction;
pub mod call;
pub mod campaign;
pub mod target;
