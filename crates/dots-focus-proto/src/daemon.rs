use zbus::proxy;

/// Client side of the focus daemon. Structured replies are JSON strings.
#[proxy(
    interface = "org.dots.FocusDaemon",
    default_service = "org.dots.FocusDaemon",
    default_path = "/org/dots/FocusDaemon"
)]
pub trait FocusDaemon {
    /// Returns an `EnforcementDecision` as JSON.
    async fn submit_notification(
        &self,
        package_id: &str,
        title: &str,
        content: &str,
    ) -> zbus::Result<String>;

    async fn check_blocked(&self, package_id: &str) -> zbus::Result<bool>;

    /// Takes a `Rule` as JSON and returns the `ReconcileSummary` of the
    /// packages it governs.
    async fn put_rule(&self, rule_json: &str) -> zbus::Result<String>;

    async fn delete_rule(&self, rule_id: &str) -> zbus::Result<String>;

    async fn manage_app(&self, package_id: &str, rule_id: &str) -> zbus::Result<String>;

    async fn unmanage_app(&self, package_id: &str) -> zbus::Result<String>;

    /// Pending report alarms as a JSON list of `ScheduleEntry`.
    async fn list_scheduled(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    async fn report_ready(&self, package_id: &str) -> zbus::Result<()>;
}
