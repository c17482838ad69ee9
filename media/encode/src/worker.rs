/*!
    Run a codec backend on its own thread.

    The caller side keeps the synchronous send/receive protocol: frames are
    queued to the worker (blocking once the queue is full) and finished packets
    come back through an unbounded output queue that `poll_packet` drains
    without blocking.
*/

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use media_types::{Error, Frame, Pts, Result};

use crate::backend::{BackendPacket, CodecBackend, CodecParameters, Received};
use crate::queue::WorkQueue;

enum Job {
    Frame(Frame, Pts),
    Eof,
}

enum Output {
    Packet(BackendPacket),
    Eof,
    Error(String),
}

/**
    A [`CodecBackend`] that forwards every call to a worker thread.
*/
pub struct ThreadedBackend {
    pending: Option<Box<dyn CodecBackend>>,
    capacity: usize,
    frame_size: Option<usize>,
    extradata: Option<Vec<u8>>,
    jobs: Arc<WorkQueue<Job>>,
    output: Arc<WorkQueue<Output>>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl ThreadedBackend {
    /**
        Wrap `inner`; up to `capacity` frames may be in flight before
        `send_frame` blocks.
    */
    pub fn new(inner: Box<dyn CodecBackend>, capacity: usize) -> Self {
        Self {
            pending: Some(inner),
            capacity,
            frame_size: None,
            extradata: None,
            jobs: Arc::new(WorkQueue::new(capacity)),
            output: Arc::new(WorkQueue::new(usize::MAX)),
            handle: None,
            finished: false,
        }
    }

    /**
        Frames queued to the worker and not yet picked up.
    */
    pub fn queued_frames(&self) -> usize {
        self.jobs.len()
    }

    fn submit(&mut self, job: Job) -> Result<()> {
        if self.handle.is_none() {
            return Err(Error::codec("threaded backend is not open"));
        }
        if !self.jobs.push(job) {
            return Err(Error::codec("encoder worker has stopped"));
        }
        Ok(())
    }

    fn translate(&mut self, output: Option<Output>) -> Result<Received> {
        match output {
            Some(Output::Packet(packet)) => Ok(Received::Packet(packet)),
            Some(Output::Eof) => {
                self.finished = true;
                Ok(Received::Eof)
            }
            Some(Output::Error(message)) => Err(Error::Codec(message)),
            None if self.finished => Ok(Received::Eof),
            None => Ok(Received::Again),
        }
    }
}

impl CodecBackend for ThreadedBackend {
    fn open(&mut self, params: &CodecParameters) -> Result<()> {
        let Some(mut inner) = self.pending.take() else {
            return Err(Error::codec("threaded backend opened twice"));
        };

        inner.open(params)?;
        self.frame_size = inner.frame_size();
        self.extradata = inner.extradata();

        let jobs = Arc::clone(&self.jobs);
        let output = Arc::clone(&self.output);
        let name = format!("encode-{}", params.info.codec_id());
        tracing::debug!(thread = %name, capacity = self.capacity, "starting encoder worker");

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(inner, &jobs, &output))?;
        self.handle = Some(handle);
        Ok(())
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn extradata(&self) -> Option<Vec<u8>> {
        self.extradata.clone()
    }

    fn send_frame(&mut self, frame: &Frame, pts: Pts) -> Result<()> {
        self.submit(Job::Frame(frame.clone(), pts))
    }

    fn send_eof(&mut self) -> Result<()> {
        self.submit(Job::Eof)
    }

    fn poll_packet(&mut self) -> Result<Received> {
        let output = self.output.try_pop();
        self.translate(output)
    }

    fn wait_packet(&mut self) -> Result<Received> {
        if self.finished {
            return Ok(Received::Eof);
        }
        match self.output.pop() {
            Some(output) => self.translate(Some(output)),
            None => Err(Error::codec("encoder worker exited before end of stream")),
        }
    }
}

impl Drop for ThreadedBackend {
    fn drop(&mut self) {
        self.jobs.close();
        self.output.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("encoder worker panicked");
            }
        }
    }
}

fn run_worker(mut backend: Box<dyn CodecBackend>, jobs: &WorkQueue<Job>, output: &WorkQueue<Output>) {
    let last = process_jobs(backend.as_mut(), jobs, output);
    // Refuse further input before reporting, so the caller never sees a
    // terminal output while the job queue still accepts frames.
    jobs.close();
    if let Some(last) = last {
        output.push(last);
    }
    output.close();
}

/**
    Feed jobs to the backend until it finishes or fails. Returns the terminal
    output, or `None` if the queues were closed underneath it.
*/
fn process_jobs(
    backend: &mut dyn CodecBackend,
    jobs: &WorkQueue<Job>,
    output: &WorkQueue<Output>,
) -> Option<Output> {
    while let Some(job) = jobs.pop() {
        let finishing = matches!(job, Job::Eof);
        let sent = match job {
            Job::Frame(frame, pts) => backend.send_frame(&frame, pts),
            Job::Eof => backend.send_eof(),
        };
        if let Err(err) = sent {
            tracing::warn!(error = %err, "encoder worker failed");
            return Some(Output::Error(err.to_string()));
        }

        loop {
            let received = if finishing {
                backend.wait_packet()
            } else {
                backend.poll_packet()
            };
            match received {
                Ok(Received::Packet(packet)) => {
                    if !output.push(Output::Packet(packet)) {
                        return None;
                    }
                }
                Ok(Received::Again) if finishing => {
                    return Some(Output::Error("backend stalled after end of stream".into()));
                }
                Ok(Received::Again) => break,
                Ok(Received::Eof) => return Some(Output::Eof),
                Err(err) => {
                    tracing::warn!(error = %err, "encoder worker failed");
                    return Some(Output::Error(err.to_string()));
                }
            }
        }
    }
    None
}
