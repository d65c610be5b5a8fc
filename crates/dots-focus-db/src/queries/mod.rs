pub mod key_value;
pub mod managed_apps;
pub mod notifications;
pub mod rules;

pub use key_value::KeyValueQueries;
pub use managed_apps::ManagedAppQueries;
pub use notifications::NotificationQueries;
pub use rules::RuleQueries;
