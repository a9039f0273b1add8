pub mod engine;
pub mod extractor;
pub mod health;
pub mod path;
pub mod registry;
pub mod selection;
pub mod template;
pub mod transport;
