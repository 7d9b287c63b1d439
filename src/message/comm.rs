use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Tag for the packed payloads of a motion plan.
pub const TAG_MOTION: u32 = 1;

/// Tag for the upward sweep of a tree reduction.
pub const TAG_REDUCE: u32 = 2;

/// Tag for the downward sweep of a tree broadcast.
pub const TAG_BROADCAST: u32 = 3;

/// Tag announcing that the sending rank has panicked.
pub const TAG_ABORT: u32 = u32::MAX;

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying transport can in principle be TCP, UDP, or a
/// higher level abstraction like MPI. Collective operations built on top of
/// these two primitives live on [`crate::context::Context`].
///
pub trait Communicator: Send + Sync {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted. Messages between a given pair of ranks
    /// with the same tag must be delivered in the order they were sent.
    fn send(&self, rank: usize, tag: u32, message: Vec<u8>);

    /// Must be implemented to receive the next message with the given tag
    /// from the given peer. This method is allowed to block until the
    /// message arrives. Messages from other peers, or with other tags, that
    /// arrive in the meantime must be kept for later calls.
    fn recv(&self, rank: usize, tag: u32) -> Vec<u8>;
}

/// Holds messages which arrived before anyone asked for them, keyed by source
/// rank and tag. Transports pull from their raw inbound stream until the
/// requested message shows up, parking everything else here.
///
#[derive(Default)]
pub struct Mailbox {
    parked: Mutex<HashMap<(usize, u32), VecDeque<Vec<u8>>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next message from `source` with `tag`, either one parked
    /// earlier or the first matching one produced by `next_inbound`.
    pub fn recv<F>(&self, source: usize, tag: u32, mut next_inbound: F) -> Vec<u8>
    where
        F: FnMut() -> (usize, u32, Vec<u8>),
    {
        let mut parked = self.parked.lock().expect("mailbox lock poisoned");

        if let Some(message) = parked.get_mut(&(source, tag)).and_then(VecDeque::pop_front) {
            return message;
        }
        loop {
            let (s, t, message) = next_inbound();
            if s == source && t == tag {
                return message;
            }
            parked.entry((s, t)).or_default().push_back(message);
        }
    }

    /// Return the number of messages waiting to be claimed.
    pub fn num_parked(&self) -> usize {
        self.parked
            .lock()
            .expect("mailbox lock poisoned")
            .values()
            .map(VecDeque::len)
            .sum()
    }
}

/// The trivial communicator for a single process. Messages sent to self are
/// delivered through the mailbox.
///
#[derive(Default)]
pub struct SerialCommunicator {
    queue: Mutex<VecDeque<(usize, u32, Vec<u8>)>>,
    mailbox: Mailbox,
}

impl SerialCommunicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, rank: usize, tag: u32, message: Vec<u8>) {
        assert_eq!(rank, 0, "serial communicator cannot send to rank {}", rank);
        self.queue
            .lock()
            .expect("serial queue lock poisoned")
            .push_back((0, tag, message))
    }

    fn recv(&self, rank: usize, tag: u32) -> Vec<u8> {
        assert_eq!(rank, 0, "serial communicator cannot receive from rank {}", rank);
        self.mailbox.recv(rank, tag, || {
            self.queue
                .lock()
                .expect("serial queue lock poisoned")
                .pop_front()
                .unwrap_or_else(|| panic!("deadlock: rank 0 waits for a message (tag {}) nobody sent", tag))
        })
    }
}

#[cfg(test)]
mod test {

    use super::{Communicator, Mailbox, SerialCommunicator};

    #[test]
    fn mailbox_parks_unmatched_messages() {
        let mut inbound = vec![(1, 7, vec![1]), (2, 7, vec![2]), (1, 8, vec![3])].into_iter();
        let mailbox = Mailbox::new();

        assert_eq!(mailbox.recv(1, 8, || inbound.next().unwrap()), vec![3]);
        assert_eq!(mailbox.num_parked(), 2);
        assert_eq!(mailbox.recv(2, 7, || inbound.next().unwrap()), vec![2]);
        assert_eq!(mailbox.recv(1, 7, || inbound.next().unwrap()), vec![1]);
        assert_eq!(mailbox.num_parked(), 0);
    }

    #[test]
    fn serial_communicator_delivers_to_itself() {
        let comm = SerialCommunicator::new();
        comm.send(0, 4, vec![9, 9]);
        comm.send(0, 5, vec![1]);
        assert_eq!(comm.recv(0, 5), vec![1]);
        assert_eq!(comm.recv(0, 4), vec![9, 9]);
    }
}
