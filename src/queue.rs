//! Paced outbound queue.
//!
//! Commands are appended by the caller-facing session methods and drained by a
//! background task that forwards one command at a time to the session loop.
//! Each command travels with a [`Pending`] acknowledgement; the drain task
//! waits for the session loop to confirm the transport write before sleeping
//! the current outgoing delay, so the spacing is measured between completed
//! sends. The delay is re-read on every iteration, so a `VAR msg_flood`
//! retune applies to the very next command.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::protocol::ClientCommand;

/// A command handed to the session loop, with the ack the drain task waits
/// on before it starts the next pause.
#[derive(Debug)]
pub struct Pending {
    pub command: ClientCommand,
    sent: oneshot::Sender<()>,
}

impl Pending {
    /// Wrap `command`; the receiver resolves once [`ack`](Self::ack) is called.
    pub fn new(command: ClientCommand) -> (Self, oneshot::Receiver<()>) {
        let (sent, rx) = oneshot::channel();
        (Self { command, sent }, rx)
    }

    /// Report that the command has been written to the transport.
    pub fn ack(self) {
        let _ = self.sent.send(());
    }
}

/// FIFO buffer of outbound commands with a server-tunable pacing delay.
#[derive(Debug)]
pub struct OutgoingQueue {
    buf: Mutex<VecDeque<ClientCommand>>,
    delay_nanos: AtomicU64,
}

impl OutgoingQueue {
    /// Create an empty queue paced at `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            buf: Mutex::new(VecDeque::new()),
            delay_nanos: AtomicU64::new(duration_to_nanos(delay)),
        }
    }

    /// Append a command.
    pub fn enqueue(&self, command: ClientCommand) {
        self.lock().push_back(command);
    }

    /// Remove and return the oldest command.
    pub fn pop(&self) -> Option<ClientCommand> {
        self.lock().pop_front()
    }

    /// Number of commands waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything still waiting.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Current pause after each forwarded command.
    pub fn delay(&self) -> Duration {
        Duration::from_nanos(self.delay_nanos.load(Ordering::Acquire))
    }

    /// Retune the pacing delay.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_nanos
            .store(duration_to_nanos(delay), Ordering::Release);
    }

    /// Forward queued commands to `sink` until `running` clears or the sink
    /// closes.
    ///
    /// After a forwarded command is acknowledged, sleeps the current delay.
    /// A dropped ack ends the loop. When the queue is empty, polls every
    /// `idle_poll`.
    pub async fn drain_loop(
        self: Arc<Self>,
        sink: mpsc::Sender<Pending>,
        running: Arc<AtomicBool>,
        idle_poll: Duration,
    ) {
        debug!("drain loop started");
        while running.load(Ordering::Acquire) {
            match self.pop() {
                Some(command) => {
                    trace!(code = command.code(), "forwarding queued command");
                    let (pending, sent) = Pending::new(command);
                    if sink.send(pending).await.is_err() || sent.await.is_err() {
                        debug!("session loop gone, stopping drain loop");
                        break;
                    }
                    tokio::time::sleep(self.delay()).await;
                }
                None => tokio::time::sleep(idle_poll).await,
            }
        }
        debug!("drain loop exited");
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ClientCommand>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn duration_to_nanos(delay: Duration) -> u64 {
    u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn msg(text: &str) -> ClientCommand {
        ClientCommand::ChannelMessage {
            channel: "Frontpage".into(),
            message: text.into(),
        }
    }

    #[test]
    fn fifo_order() {
        let queue = OutgoingQueue::new(Duration::ZERO);
        queue.enqueue(msg("A"));
        queue.enqueue(msg("B"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(msg("A")));
        assert_eq!(queue.pop(), Some(msg("B")));
        assert!(queue.is_empty());
    }

    #[test]
    fn delay_roundtrips_through_atomic() {
        let queue = OutgoingQueue::new(Duration::from_secs(1));
        queue.set_delay(Duration::from_millis(1250));
        assert_eq!(queue.delay(), Duration::from_millis(1250));
    }

    /// Receive the next command and confirm it as written at once.
    async fn recv_acked(rx: &mut mpsc::Receiver<Pending>) -> ClientCommand {
        let pending = rx.recv().await.unwrap();
        let command = pending.command.clone();
        pending.ack();
        command
    }

    #[tokio::test(start_paused = true)]
    async fn drain_paces_each_command() {
        let delay = Duration::from_millis(500);
        let queue = Arc::new(OutgoingQueue::new(delay));
        for text in ["A", "B", "C"] {
            queue.enqueue(msg(text));
        }

        let running = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(Arc::clone(&queue).drain_loop(
            tx,
            Arc::clone(&running),
            Duration::from_millis(10),
        ));

        let mut seen = Vec::new();
        for _ in 0..3 {
            let command = recv_acked(&mut rx).await;
            seen.push((command, Instant::now()));
        }

        let order: Vec<_> = seen.iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(order, [msg("A"), msg("B"), msg("C")]);
        for pair in seen.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= delay);
        }

        running.store(false, Ordering::Release);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_starts_after_write_completes() {
        let delay = Duration::from_secs(1);
        let queue = Arc::new(OutgoingQueue::new(delay));
        queue.enqueue(msg("A"));
        queue.enqueue(msg("B"));

        let running = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(Arc::clone(&queue).drain_loop(
            tx,
            Arc::clone(&running),
            Duration::from_millis(10),
        ));

        // The first write takes three seconds to finish.
        let first = rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let written = Instant::now();
        first.ack();

        let second = recv_acked(&mut rx).await;
        assert_eq!(second, msg("B"));
        assert!(Instant::now() - written >= delay);
        running.store(false, Ordering::Release);
    }

    #[tokio::test(start_paused = true)]
    async fn retuned_delay_applies_to_next_command() {
        let queue = Arc::new(OutgoingQueue::new(Duration::from_secs(10)));
        let running = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(Arc::clone(&queue).drain_loop(
            tx,
            Arc::clone(&running),
            Duration::from_millis(10),
        ));

        queue.set_delay(Duration::from_millis(100));
        queue.enqueue(msg("A"));
        queue.enqueue(msg("B"));

        let first = recv_acked(&mut rx).await;
        let t0 = Instant::now();
        let second = recv_acked(&mut rx).await;
        let gap = Instant::now() - t0;

        assert_eq!((first, second), (msg("A"), msg("B")));
        assert!(gap >= Duration::from_millis(100));
        assert!(gap < Duration::from_secs(10));
        running.store(false, Ordering::Release);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_stops_when_sink_closes() {
        let queue = Arc::new(OutgoingQueue::new(Duration::ZERO));
        queue.enqueue(msg("A"));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let running = Arc::new(AtomicBool::new(true));
        Arc::clone(&queue)
            .drain_loop(tx, running, Duration::from_millis(10))
            .await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_stops_when_ack_is_dropped() {
        let queue = Arc::new(OutgoingQueue::new(Duration::ZERO));
        queue.enqueue(msg("A"));
        queue.enqueue(msg("B"));
        let (tx, mut rx) = mpsc::channel(1);

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(Arc::clone(&queue).drain_loop(
            tx,
            running,
            Duration::from_millis(10),
        ));
        drop(rx.recv().await.unwrap());
        task.await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_empties_the_buffer() {
        let queue = OutgoingQueue::new(Duration::ZERO);
        queue.enqueue(msg("A"));
        queue.clear();
        assert!(queue.is_empty());
    }
}
