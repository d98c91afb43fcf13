//! Heartbeat streams bounded by a signal.

use core::pin::Pin;
use core::task::{Context, Poll};

use futures::Stream;
use futures::stream::FusedStream;

use crate::signal::{Doner, Signal};

/// Stream of heartbeats that ends when a signal completes.
///
/// A heartbeat is available while the signal is pending, so a consumer loop runs at its
/// own pace. Before each heartbeat the stream returns `Pending` once and reschedules
/// itself, which lets the task that completes the signal run even on a current-thread
/// runtime. There is no producer task behind the stream: nothing is left blocked once
/// the signal completes, and each call to [`tick`] creates an independent stream.
#[must_use = "streams do nothing unless polled"]
#[derive(Debug)]
pub struct Ticks {
    signal: Signal,
    finished: bool,
    yielded: bool,
}

impl Stream for Ticks {
    type Item = ();

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished || this.signal.is_done() {
            this.finished = true;
            return Poll::Ready(None);
        }

        if !this.yielded {
            this.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        this.yielded = false;
        Poll::Ready(Some(()))
    }
}

impl FusedStream for Ticks {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

/// Returns a heartbeat stream that terminates once `doner` completes.
pub fn tick<D>(doner: &D) -> Ticks
where
    D: Doner + ?Sized,
{
    Ticks {
        signal: doner.done(),
        finished: false,
        yielded: false,
    }
}
