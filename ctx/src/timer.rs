//! Optional deadline timer for context watchers.
//!
//! [`Expiry`] resolves when its deadline is reached and stays pending forever when there
//! is no deadline, which lets a watcher keep a single `tokio::select!` branch for both
//! cases.

use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Instant, Sleep, sleep_until};

pin_project! {
    /// A future that resolves at an optional deadline.
    #[derive(Debug)]
    pub(crate) struct Expiry {
        #[pin]
        sleep: Option<Sleep>,
    }
}

impl Expiry {
    /// Creates a timer for `deadline`, or a timer that never fires for `None`.
    pub(crate) fn new(deadline: Option<Instant>) -> Self {
        Self {
            sleep: deadline.map(sleep_until),
        }
    }
}

impl Future for Expiry {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().sleep.as_pin_mut() {
            Some(sleep) => sleep.poll(cx),
            None => Poll::Pending,
        }
    }
}
