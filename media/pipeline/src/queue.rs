/*!
    Frame queue coupling the decode and encode threads.
*/

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use slowmo_types::{Error, FrameBuffer, Result};

#[derive(Debug)]
struct State {
    frames: VecDeque<FrameBuffer>,
    closed: bool,
}

/**
    FIFO of decoded frames shared between one producer and one consumer.

    Every frame in the queue has the dimensions given at construction,
    which stay fixed for the whole run. The queue is shared through an
    `Arc`. Closing it does not discard anything: [`FrameQueue::pop`] keeps
    returning frames until the queue is both closed and empty, and only
    then returns `None`.

    A queue created with [`FrameQueue::bounded`] blocks the producer while
    it is full, so a fast decoder cannot buffer an entire video in memory.
*/
#[derive(Debug)]
pub struct FrameQueue {
    state: Mutex<State>,
    /// Signalled when a frame is pushed or the queue is closed.
    not_empty: Condvar,
    /// Signalled when a frame is popped or the queue is closed.
    not_full: Condvar,
    width: u32,
    height: u32,
    capacity: Option<usize>,
}

impl FrameQueue {
    /**
        Create an unbounded queue for `width` x `height` frames.
    */
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capacity(width, height, None)
    }

    /**
        Create a queue holding at most `capacity` frames.

        # Panics

        Panics if `capacity` is zero.
    */
    pub fn bounded(width: u32, height: u32, capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self::with_capacity(width, height, Some(capacity))
    }

    fn with_capacity(width: u32, height: u32, capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                frames: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            width,
            height,
            capacity,
        }
    }

    /**
        Append a frame, blocking while a bounded queue is full.

        Returns [`Error::QueueClosed`] if the queue was closed, and
        [`Error::InvalidData`] if the frame's size differs from the queue's.
    */
    pub fn push(&self, frame: FrameBuffer) -> Result<()> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(Error::invalid_data(format!(
                "frame is {}x{}, queue holds {}x{} frames",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let mut state = self.state.lock();
        if let Some(capacity) = self.capacity {
            while !state.closed && state.frames.len() >= capacity {
                self.not_full.wait(&mut state);
            }
        }
        if state.closed {
            return Err(Error::QueueClosed);
        }

        state.frames.push_back(frame);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /**
        Remove the oldest frame, blocking until one is available.

        Returns `None` only once the queue is closed and empty.
    */
    pub fn pop(&self) -> Option<FrameBuffer> {
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /**
        Remove the oldest frame without blocking.
    */
    pub fn try_pop(&self) -> Option<FrameBuffer> {
        let frame = self.state.lock().frames.pop_front();
        if frame.is_some() {
            self.not_full.notify_one();
        }
        frame
    }

    /**
        Close the queue. Further pushes fail; queued frames stay poppable.

        Closing twice is a no-op.
    */
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /**
        Returns true once the queue is closed and every frame was popped.
    */
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.closed && state.frames.is_empty()
    }

    /**
        Dimensions every frame in this queue has.
    */
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
