//! Unbounded FIFO stage between bursty producers and a fixed consumer pool.
//!
//! Directory discovery fans out: one wide directory can enqueue thousands
//! of sub-directories at once, and the only drainers of that queue are the
//! same workers doing the enqueueing. A single fixed-capacity channel
//! deadlocks there once the burst exceeds its capacity. The stage splices
//! an overflow buffer between a small input channel and a small output
//! channel: a pump thread moves items across, so senders block at most
//! momentarily and consumers drain the output side as a normal channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select};

/// Overflow buffer growth increment.
const CHUNK: usize = 8;

/// Error returned by [`StageSender::send`] once the stage has shut down.
#[derive(Debug)]
pub struct StageSendError<T>(
    /// The item that could not be queued.
    pub T,
);

/// Producer handle feeding the stage.
pub struct StageSender<T> {
    tx: Sender<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
        }
    }
}

impl<T> StageSender<T> {
    /// Queues an item.
    ///
    /// Blocks only while the small input channel is full and the pump is
    /// momentarily busy; the overflow buffer means producers are never
    /// blocked on consumer progress.
    pub fn send(&self, item: T) -> Result<(), StageSendError<T>> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.tx.send(item).map_err(|error| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            StageSendError(error.0)
        })
    }
}

/// Control handle owning the pump thread.
pub struct StageController {
    close_tx: Sender<()>,
    depth: Arc<AtomicUsize>,
    pump: Option<JoinHandle<()>>,
}

impl StageController {
    /// Number of items accepted but not yet handed to a consumer.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Shared view of the stage depth, for progress reporting.
    #[must_use]
    pub fn depth_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.depth)
    }

    /// Stops accepting input, flushes buffered items to consumers, and
    /// waits for the pump to exit. Consumers observe a disconnected
    /// channel once the flush completes.
    pub fn close(&mut self) {
        let _ = self.close_tx.send(());
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl Drop for StageController {
    fn drop(&mut self) {
        self.close();
    }
}

/// Creates a stage whose input and output channels hold `capacity` items
/// each; anything beyond that spills into the internal overflow buffer.
pub fn stage<T: Send + 'static>(capacity: usize) -> (StageSender<T>, Receiver<T>, StageController) {
    let (in_tx, in_rx) = bounded(capacity);
    let (out_tx, out_rx) = bounded(capacity);
    let (close_tx, close_rx) = bounded(1);
    let depth = Arc::new(AtomicUsize::new(0));

    let pump_depth = Arc::clone(&depth);
    let pump = thread::spawn(move || run_pump(&in_rx, &out_tx, &close_rx, &pump_depth));

    (
        StageSender {
            tx: in_tx,
            depth: Arc::clone(&depth),
        },
        out_rx,
        StageController {
            close_tx,
            depth,
            pump: Some(pump),
        },
    )
}

fn run_pump<T>(
    in_rx: &Receiver<T>,
    out_tx: &Sender<T>,
    close_rx: &Receiver<()>,
    depth: &AtomicUsize,
) {
    let mut buffer: VecDeque<T> = VecDeque::new();

    loop {
        if buffer.is_empty() {
            select! {
                recv(in_rx) -> msg => match msg {
                    Ok(item) => push_chunked(&mut buffer, item),
                    Err(_) => break,
                },
                recv(close_rx) -> _ => break,
            }
        } else {
            select! {
                recv(in_rx) -> msg => match msg {
                    Ok(item) => push_chunked(&mut buffer, item),
                    Err(_) => break,
                },
                recv(close_rx) -> _ => break,
                send(out_tx, buffer.pop_front().expect("buffer checked non-empty")) -> result => {
                    if result.is_err() {
                        return;
                    }
                    depth.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    // The input side is done. Hand over anything still buffered, plus
    // whatever raced into the input channel before the close.
    for item in in_rx.try_iter() {
        push_chunked(&mut buffer, item);
    }
    for item in buffer {
        if out_tx.send(item).is_err() {
            return;
        }
        depth.fetch_sub(1, Ordering::Relaxed);
    }
}

fn push_chunked<T>(buffer: &mut VecDeque<T>, item: T) {
    if buffer.len() == buffer.capacity() {
        buffer.reserve(CHUNK);
    }
    buffer.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_fifo_order() {
        let (tx, rx, mut control) = stage::<usize>(4);
        let consumer = thread::spawn(move || rx.iter().collect::<Vec<_>>());

        for i in 0..100 {
            tx.send(i).expect("send");
        }
        drop(tx);
        control.close();

        assert_eq!(consumer.join().expect("consumer"), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn burst_beyond_capacity_does_not_block_the_producer() {
        // No consumer is draining while the burst is sent; a plain bounded
        // channel of this capacity would deadlock here.
        let (tx, rx, _control) = stage::<usize>(2);
        for i in 0..64 {
            tx.send(i).expect("send");
        }
        let drained: Vec<usize> = (0..64).map(|_| rx.recv().expect("recv")).collect();
        assert_eq!(drained, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn close_flushes_buffered_items_then_disconnects() {
        let (tx, rx, mut control) = stage::<usize>(2);
        for i in 0..10 {
            tx.send(i).expect("send");
        }
        control.close();

        let drained: Vec<usize> = rx.iter().collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert!(tx.send(11).is_err());
    }

    #[test]
    fn depth_tracks_undelivered_items() {
        let (tx, rx, control) = stage::<usize>(2);
        assert_eq!(control.depth(), 0);
        for i in 0..8 {
            tx.send(i).expect("send");
        }
        for _ in 0..8 {
            let _ = rx.recv().expect("recv");
        }
        // All items were handed to the consumer side.
        // Give the pump a moment to account for the last hand-off.
        for _ in 0..100 {
            if control.depth() == 0 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(control.depth(), 0);
    }

    #[test]
    fn sender_clones_feed_one_queue() {
        let (tx, rx, mut control) = stage::<usize>(4);
        let tx2 = tx.clone();
        tx.send(1).expect("send");
        tx2.send(2).expect("send");
        drop(tx);
        drop(tx2);
        control.close();

        let mut drained: Vec<usize> = rx.iter().collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2]);
    }
}
