//
// AsyncStream: a Stream driven by an async closure that pushes
// items through a Sender. Used to stream Multi-Status bodies while
// the tree walk is still in progress.
//
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_channel::mpsc;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;

/// Sending end, passed to the async closure.
pub(crate) struct Sender<I>(mpsc::UnboundedSender<I>);

impl<I> Sender<I> {
    /// Queue an item on the stream. Send failures mean the receiver
    /// is gone (client disconnect); the producer will notice on the
    /// next poll and can simply stop.
    pub async fn send(&mut self, item: impl Into<I>) {
        let _ = self.0.unbounded_send(item.into());
    }
}

/// A stream produced by an async closure.
pub(crate) struct AsyncStream<I, E> {
    rx: mpsc::UnboundedReceiver<I>,
    fut: Option<BoxFuture<'static, Result<(), E>>>,
}

impl<I, E> AsyncStream<I, E> {
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce(Sender<I>) -> R,
        R: Future<Output = Result<(), E>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded();
        AsyncStream {
            rx,
            fut: Some(Box::pin(f(Sender(tx)))),
        }
    }
}

impl<I, E> Stream for AsyncStream<I, E> {
    type Item = Result<I, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            // Drain queued items first, the producer may be ahead of us.
            match Pin::new(&mut this.rx).poll_next(cx) {
                Poll::Ready(Some(item)) => return Poll::Ready(Some(Ok(item))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => {}
            }
            match this.fut.as_mut() {
                None => return Poll::Ready(None),
                Some(fut) => match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(())) => {
                        // producer done, loop once more to drain the channel.
                        this.fut = None;
                    }
                    Poll::Ready(Err(e)) => {
                        this.fut = None;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn yields_in_order_then_ends() {
        let strm = AsyncStream::<u32, std::io::Error>::new(|mut tx| async move {
            tx.send(1u32).await;
            tx.send(2u32).await;
            Ok(())
        });
        let v: Vec<u32> = strm.map(|r| r.unwrap()).collect().await;
        assert_eq!(v, vec![1, 2]);
    }
}
