use std::time::Duration;

use tokio::sync::watch;

/// Default quiet period before a burst of changes is reported.
pub const DEFAULT_CHANGE_DEBOUNCE: Duration = Duration::from_millis(250);

/// Producer half of the "graph changed" signal.
///
/// Each call to [`ChangeNotifier::signal`] bumps a generation counter; consumers read
/// it through a debounced [`ChangeStream`].
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: watch::Sender<u64>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn signal(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    /// Number of signals so far.
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self, debounce: Duration) -> ChangeStream {
        ChangeStream {
            rx: self.tx.subscribe(),
            debounce,
        }
    }
}

/// Debounced consumer of [`ChangeNotifier`] signals.
#[derive(Debug)]
pub struct ChangeStream {
    rx: watch::Receiver<u64>,
    debounce: Duration,
}

impl ChangeStream {
    /// Wait for the next burst of changes to settle and return the generation it
    /// settled on. Returns `None` once the notifier is gone and nothing is pending.
    pub async fn next_settled(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        loop {
            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.debounce) => break,
            }
        }
        Some(*self.rx.borrow_and_update())
    }

    /// Whether a signal arrived that has not been reported yet.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
