//! Cancellable waits used by every polling loop.
//!
//! Callers hold the `watch::Sender<bool>` and flip it to `true` to
//! cancel; each loop checks the receiver before sleeping and races the
//! sleep against a change notification.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::{CoreError, CoreResult};

/// Cancellation handle passed into polling calls.
pub type Cancel = watch::Receiver<bool>;

/// Sleep for `interval`, returning early with `Cancelled` if the
/// handle is (or becomes) set.
///
/// A dropped sender means nobody can cancel anymore; the wait then
/// degrades to a plain sleep.
pub async fn pause(interval: Duration, cancel: &mut Cancel) -> CoreResult<()> {
    if *cancel.borrow() {
        return Err(CoreError::Cancelled);
    }

    tokio::select! {
        _ = tokio::time::sleep(interval) => Ok(()),
        changed = cancel.changed() => match changed {
            Ok(()) if *cancel.borrow() => Err(CoreError::Cancelled),
            Ok(()) => Ok(()),
            Err(_) => {
                tokio::time::sleep(interval).await;
                Ok(())
            }
        },
    }
}

/// A handle that is never cancelled, for one-shot calls and tests.
pub fn never() -> Cancel {
    let (tx, rx) = watch::channel(false);
    drop(tx);
    rx
}
