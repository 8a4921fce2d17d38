pub mod drivers;
pub mod open;
pub mod paths;
pub mod platform;
pub mod update;

pub use open::open_url;
pub use paths::app_config_dir;
