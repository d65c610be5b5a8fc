pub mod daemon;

pub use daemon::FocusDaemonProxy;

pub const INTERFACE_NAME: &str = "org.dots.FocusDaemon";
pub const SERVICE_NAME: &str = "org.dots.FocusDaemon";
pub const OBJECT_PATH: &str = "/org/dots/FocusDaemon";
