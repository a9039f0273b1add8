pub mod config_manager;
pub mod settings;

pub use config_manager::ConfigManager;
pub use settings::Settings;
