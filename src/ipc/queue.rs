//! Message queue.
//!
//! Messages are copied into the kernel message pool on send and copied out
//! on receive. Normal messages join the tail, urgent ones jump to the head.
//! A send resumes at most one receiver, which then re-checks the queue
//! itself; it is not handed a particular message.

use heapless::Deque;

use crate::config::MSG_POOL_BLOCKS;
use crate::error::{KernelError, KernelResult};
use crate::ipc::pool::BlockId;
use crate::ipc::{QueueId, Urgency, Wait};
use crate::scheduler::Scheduler;
use crate::timer::Timeout;
use crate::wait::{WaitQueue, WaitTarget};

/// A queued payload stored in the message pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    block: BlockId,
    len: usize,
}

impl Message {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
pub struct MessageQueue {
    pub(crate) messages: Deque<Message, MSG_POOL_BLOCKS>,
    pub(crate) waiters: WaitQueue,
}

impl MessageQueue {
    pub const fn new() -> Self {
        Self {
            messages: Deque::new(),
            waiters: WaitQueue::new(),
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        MessageQueue::new()
    }
}

impl Scheduler {
    pub fn queue_create(&mut self) -> KernelResult<QueueId> {
        let id = QueueId(self.queues.len());
        self.queues
            .push(MessageQueue::new())
            .map_err(|_| KernelError::Fail)?;
        Ok(id)
    }

    /// Copy `payload` into the queue and wake the most urgent receiver.
    ///
    /// Fails, leaving the queue untouched, if the payload cannot be stored.
    pub fn queue_send(&mut self, id: QueueId, payload: &[u8], urgency: Urgency) -> KernelResult<()> {
        if id.0 >= self.queues.len() {
            return Err(KernelError::Fail);
        }
        let Some(block) = self.pool.alloc(payload) else {
            warn!("{}: no pool block for {=usize} bytes", id, payload.len());
            return Err(KernelError::Fail);
        };
        let message = Message {
            block,
            len: payload.len(),
        };

        let queue = &mut self.queues[id.0];
        let pushed = match urgency {
            Urgency::Normal => queue.messages.push_back(message),
            Urgency::Urgent => queue.messages.push_front(message),
        };
        if pushed.is_err() {
            self.pool.free(block);
            return Err(KernelError::Fail);
        }

        if let Some(receiver) = queue.waiters.head() {
            self.wake(receiver, Ok(()));
            self.schedule();
        }
        Ok(())
    }

    /// Copy the head message into `buf` and return its length.
    ///
    /// A message larger than `buf` is left queued and the call fails.
    pub fn queue_recv(&mut self, id: QueueId, buf: &mut [u8], timeout: Timeout) -> KernelResult<Wait<usize>> {
        match self.try_dequeue(id, buf)? {
            Some(len) => Ok(Wait::Complete(len)),
            None => {
                self.block_current(WaitTarget::Queue(id), timeout)?;
                Ok(Wait::Blocked)
            }
        }
    }

    /// Finish a receive that blocked: check how the wait ended, then retry
    /// the dequeue once without waiting.
    pub fn queue_recv_resumed(&mut self, id: QueueId, buf: &mut [u8]) -> KernelResult<usize> {
        self.wait_result()?;
        self.try_dequeue(id, buf)?.ok_or(KernelError::Timeout)
    }

    fn try_dequeue(&mut self, id: QueueId, buf: &mut [u8]) -> KernelResult<Option<usize>> {
        let queue = self.queues.get_mut(id.0).ok_or(KernelError::Fail)?;
        let Some(&message) = queue.messages.front() else {
            return Ok(None);
        };
        if message.len > buf.len() {
            return Err(KernelError::Fail);
        }
        queue.messages.pop_front();
        buf[..message.len].copy_from_slice(self.pool.data(message.block, message.len));
        self.pool.free(message.block);
        Ok(Some(message.len))
    }

    pub fn queue_len(&self, id: QueueId) -> KernelResult<usize> {
        self.queues.get(id.0).map(|q| q.messages.len()).ok_or(KernelError::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MSG_BLOCK_SIZE;
    use crate::scheduler::tests::{kernel, spawn, switch};

    #[test]
    fn test_urgent_jumps_ahead() {
        let mut k = kernel();
        spawn(&mut k, "a", 3, 0);
        k.start().unwrap();
        let q = k.queue_create().unwrap();

        k.queue_send(q, b"m1", Urgency::Normal).unwrap();
        k.queue_send(q, b"m2", Urgency::Normal).unwrap();
        k.queue_send(q, b"m3", Urgency::Urgent).unwrap();
        assert_eq!(k.queue_len(q), Ok(3));

        let mut buf = [0u8; 8];
        for expected in [b"m3", b"m1", b"m2"] {
            let n = k.queue_recv(q, &mut buf, Timeout::NoWait).unwrap().complete().unwrap();
            assert_eq!(&buf[..n], expected);
        }
        assert_eq!(k.queue_recv(q, &mut buf, Timeout::NoWait), Err(KernelError::Timeout));
        assert_eq!(k.pool.available(), MSG_POOL_BLOCKS);
    }

    #[test]
    fn test_small_buffer_leaves_message_queued() {
        let mut k = kernel();
        spawn(&mut k, "a", 3, 0);
        k.start().unwrap();
        let q = k.queue_create().unwrap();
        k.queue_send(q, b"too long", Urgency::Normal).unwrap();

        let mut small = [0u8; 4];
        assert_eq!(k.queue_recv(q, &mut small, Timeout::Forever), Err(KernelError::Fail));
        assert_eq!(k.queue_len(q), Ok(1));

        let mut buf = [0u8; 8];
        assert_eq!(k.queue_recv(q, &mut buf, Timeout::NoWait), Ok(Wait::Complete(8)));
    }

    #[test]
    fn test_failed_send_rolls_back() {
        let mut k = kernel();
        spawn(&mut k, "a", 3, 0);
        k.start().unwrap();
        let q = k.queue_create().unwrap();

        let big = [0u8; MSG_BLOCK_SIZE + 1];
        assert_eq!(k.queue_send(q, &big, Urgency::Normal), Err(KernelError::Fail));
        assert_eq!(k.queue_len(q), Ok(0));

        for _ in 0..MSG_POOL_BLOCKS {
            k.queue_send(q, &[7], Urgency::Normal).unwrap();
        }
        assert_eq!(k.queue_send(q, &[8], Urgency::Urgent), Err(KernelError::Fail));
        assert_eq!(k.queue_len(q), Ok(MSG_POOL_BLOCKS));
    }

    #[test]
    fn test_blocked_receiver_resumes_and_retries() {
        let mut k = kernel();
        let rx = spawn(&mut k, "rx", 2, 0);
        let tx = spawn(&mut k, "tx", 5, 0);
        k.start().unwrap();
        let q = k.queue_create().unwrap();
        let mut buf = [0u8; 16];

        assert_eq!(k.queue_recv(q, &mut buf, Timeout::Ticks(50)), Ok(Wait::Blocked));
        switch(&mut k);
        assert_eq!(k.current_task(), Some(tx));

        k.queue_send(q, b"ping", Urgency::Normal).unwrap();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(rx));
        assert!(!k.timers.contains(crate::scheduler::TimerKey::Task(rx)));
        assert_eq!(k.queue_recv_resumed(q, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    fn test_resumed_receiver_times_out() {
        let mut k = kernel();
        let rx = spawn(&mut k, "rx", 2, 0);
        k.start().unwrap();
        let q = k.queue_create().unwrap();
        let mut buf = [0u8; 16];

        let _ = k.queue_recv(q, &mut buf, Timeout::Ticks(2)).unwrap();
        switch(&mut k);
        k.tick();
        k.tick();
        switch(&mut k);
        assert_eq!(k.current_task(), Some(rx));
        assert_eq!(k.queue_recv_resumed(q, &mut buf), Err(KernelError::Timeout));
    }
}
