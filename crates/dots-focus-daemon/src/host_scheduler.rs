use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::ports::HostScheduler;

/// In-process host scheduler: one sleeping task per key.
///
/// When a key's time comes it is sent on the channel returned by
/// [`TokioHostScheduler::new`]. Arming a key that is already armed replaces
/// the previous task. Nothing survives the process.
///
/// Tokio timers stop while the machine is suspended, so every task also
/// checks the wall clock at least once per [`WALL_CLOCK_CHECK`].
pub struct TokioHostScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    fired: mpsc::UnboundedSender<String>,
}

pub const WALL_CLOCK_CHECK: Duration = Duration::from_secs(60);

/// Returns once the timer deadline passes or the wall clock reaches
/// `when_millis`, whichever comes first.
async fn wait_until<F>(deadline: Instant, when_millis: i64, wall_clock_millis: F)
where
    F: Fn() -> i64,
{
    loop {
        let now = Instant::now();
        if now >= deadline || wall_clock_millis() >= when_millis {
            return;
        }
        sleep((deadline - now).min(WALL_CLOCK_CHECK)).await;
    }
}

impl TokioHostScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fired, receiver) = mpsc::unbounded_channel();
        (Self { tasks: Mutex::new(HashMap::new()), fired }, receiver)
    }

    /// Keys whose task has not fired or been canceled yet.
    pub fn armed_count(&self) -> usize {
        self.tasks.lock().values().filter(|task| !task.is_finished()).count()
    }
}

impl HostScheduler for TokioHostScheduler {
    fn arm_at(&self, key: &str, when_millis: i64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, cannot arm {}", key);
            return;
        };

        let delay_millis = (when_millis - Utc::now().timestamp_millis()).max(0);
        let fired = self.fired.clone();
        let fired_key = key.to_string();

        let deadline = Instant::now() + Duration::from_millis(delay_millis as u64);

        let task = runtime.spawn(async move {
            wait_until(deadline, when_millis, || Utc::now().timestamp_millis()).await;
            if fired.send(fired_key).is_err() {
                debug!("Alarm receiver closed");
            }
        });

        if let Some(previous) = self.tasks.lock().insert(key.to_string(), task) {
            previous.abort();
        }
        debug!("Armed {} in {} ms", key, delay_millis);
    }

    fn cancel(&self, key: &str) {
        if let Some(task) = self.tasks.lock().remove(key) {
            task.abort();
            debug!("Canceled {}", key);
        }
    }
}

impl Drop for TokioHostScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}
