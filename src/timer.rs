//! Repeating timers feeding ticks into the main event loop.
//!
//! Handlers never sleep on their own: a handler that wants periodic work
//! schedules a timer and receives `tick()` calls through the same serialized
//! loop that delivers chat lines. Cancellation is explicit, via the handle
//! returned at scheduling time. A handler owning a timer must cancel it when
//! it is closed, otherwise the tick keeps arriving.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::Sender;
use futures::SinkExt;

use async_std::task;

use crate::model::{Event, Tick};

/// Spawns timer tasks. Cheap to clone, every bot context holds one.
#[derive(Clone)]
pub struct TimerService {
    tx_event: Sender<Event>,
}

impl TimerService {
    pub fn new(tx_event: Sender<Event>) -> TimerService {
        TimerService { tx_event }
    }

    /// Schedules a repeating tick for `handler` in `channel`. The first tick
    /// fires one full `interval` after the call.
    pub fn schedule(&self, channel: &str, handler: &str, interval: Duration) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let mut tx_event = self.tx_event.clone();
        let tick = Tick {
            channel: channel.to_string(),
            handler: handler.to_string(),
        };

        task::spawn(async move {
            loop {
                task::sleep(interval).await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                if tx_event.send(Event::Tick(tick.clone())).await.is_err() {
                    break;
                }
            }
        });

        TimerHandle { cancelled }
    }
}

/// Cancellation token for one scheduled timer.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Stops the timer. Ticks already queued may still be delivered, no new
    /// ones are produced after this returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::channel;
    use futures::StreamExt;

    #[test]
    fn test_timer_ticks_until_cancelled() {
        let (tx, mut rx) = channel(64);
        let timers = TimerService::new(tx);

        task::block_on(async {
            let handle = timers.schedule("chan", "somehandler", Duration::from_millis(5));

            for _ in 0..2 {
                match rx.next().await {
                    Some(Event::Tick(tick)) => {
                        assert_eq!(tick.channel, "chan");
                        assert_eq!(tick.handler, "somehandler");
                    }
                    other => panic!("expected a tick, got {:?}", other),
                }
            }

            handle.cancel();
            assert!(handle.is_cancelled());

            // drain whatever was produced before the flag landed, then
            // make sure the stream stays quiet
            task::sleep(Duration::from_millis(20)).await;
            while let Ok(Some(_)) = rx.try_next() {}

            task::sleep(Duration::from_millis(20)).await;
            assert!(rx.try_next().is_err());
        });
    }
}
