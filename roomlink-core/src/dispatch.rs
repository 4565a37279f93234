//! Single-consumer event dispatch.
//!
//! Every component that reports asynchronous state delivers its events into
//! one unbounded queue with exactly one consumer. Callbacks registered
//! through [`EventHandler`] run on a dedicated task, never on the thread
//! that issued the API call that produced the event. Blocking teardown
//! must therefore never be awaited from within the consumer itself.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Producer half of an event channel
#[derive(Debug)]
pub struct EventSink<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSink<T> {
    /// Emit an event; returns false if the consumer is gone
    pub fn emit(&self, event: T) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Check if the consumer side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of an event channel; serial, single-consumer delivery
#[derive(Debug)]
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> EventStream<T> {
    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<T>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl<T> futures::Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Create a connected sink/stream pair
pub fn event_channel<T>() -> (EventSink<T>, EventStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { receiver: rx })
}

/// Callback-style event processing on a dedicated task
#[derive(Debug)]
pub struct EventHandler<T> {
    event_tx: mpsc::UnboundedSender<T>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl<T: Send + 'static> EventHandler<T> {
    /// Create a new event handler with a callback function.
    ///
    /// The callback runs serially on its own task for every event sent to
    /// the handler.
    pub fn new<F>(mut callback: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<T>();

        let task_handle = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                callback(event);
            }
            debug!("event handler queue drained, callback task exiting");
        });

        Self {
            event_tx,
            _task_handle: task_handle,
        }
    }

    /// Send an event to the handler
    pub fn send_event(&self, event: T) -> Result<(), mpsc::error::SendError<T>> {
        self.event_tx.send(event)
    }

    /// Get a sender for events
    pub fn sender(&self) -> mpsc::UnboundedSender<T> {
        self.event_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_event_channel_delivery_order() {
        let (sink, mut stream) = event_channel::<u32>();
        for i in 0..5 {
            assert!(sink.emit(i));
        }
        for i in 0..5 {
            assert_eq!(stream.next().await, Some(i));
        }
        assert_eq!(stream.try_next().unwrap(), None);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_consumer() {
        let (sink, stream) = event_channel::<u32>();
        assert!(!sink.is_closed());
        drop(stream);
        assert!(sink.is_closed());
        assert!(!sink.emit(1));
    }

    #[tokio::test]
    async fn test_futures_stream_impl() {
        let (sink, stream) = event_channel::<&'static str>();
        sink.emit("a");
        sink.emit("b");
        drop(sink);
        let collected: Vec<_> = stream.collect().await;
        assert_eq!(collected, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_event_handler_runs_callback() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let handler = EventHandler::new(move |n: usize| {
            seen_clone.fetch_add(n, Ordering::SeqCst);
        });

        handler.send_event(2).unwrap();
        handler.send_event(3).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
