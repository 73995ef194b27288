//! Off-thread decode service
//!
//! Each submitted file is decoded as one task on a shared [`TaskPool`]. The
//! returned [`DecodeTicket`] receives progress events followed by exactly one
//! [`DecodeEvent::Finished`]. Dropping a ticket discards the result; the
//! decode itself runs to completion.

use std::sync::Arc;

use crossbeam::channel::{Receiver, TryRecvError, unbounded};
use stipple_core::{PointCloudDataset, TaskLost, TaskPool};

use crate::decoder::{DecodeOptions, PcdDecoder};
use crate::error::DecodeResult;

/// Message from a running decode
#[derive(Debug)]
pub enum DecodeEvent {
    Progress { percentage: f32, message: String },
    Finished(DecodeResult<PointCloudDataset>),
}

/// Receiving end of one decode request
pub struct DecodeTicket {
    id: u64,
    events: Receiver<DecodeEvent>,
    finished: bool,
}

impl DecodeTicket {
    /// Get the task id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether the final event has been received
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next pending event, if any, without blocking
    pub fn try_event(&mut self) -> Result<Option<DecodeEvent>, TaskLost> {
        match self.events.try_recv() {
            Ok(event) => {
                if matches!(event, DecodeEvent::Finished(_)) {
                    self.finished = true;
                }
                Ok(Some(event))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) if self.finished => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TaskLost { id: self.id }),
        }
    }

    /// Block until the decode finishes, discarding progress
    pub fn wait(self) -> Result<DecodeResult<PointCloudDataset>, TaskLost> {
        let id = self.id;
        for event in self.events.iter() {
            if let DecodeEvent::Finished(result) = event {
                return Ok(result);
            }
        }
        Err(TaskLost { id })
    }
}

/// Decodes PCD files on a task pool
pub struct DecodeService {
    pool: Arc<TaskPool>,
    decoder: Arc<PcdDecoder>,
}

impl DecodeService {
    /// Create a service on an existing pool
    pub fn new(pool: Arc<TaskPool>, options: DecodeOptions) -> Self {
        Self {
            pool,
            decoder: Arc::new(PcdDecoder::new(options)),
        }
    }

    /// Get the decoder options
    pub fn options(&self) -> &DecodeOptions {
        self.decoder.options()
    }

    /// Queue a file for decoding
    pub fn submit(&self, bytes: Vec<u8>) -> DecodeTicket {
        let (sender, events) = unbounded();
        let decoder = Arc::clone(&self.decoder);

        let handle = self.pool.spawn("pcd_decode", move || {
            let mut report = |percentage: f32, message: &str| {
                let _ = sender.send(DecodeEvent::Progress {
                    percentage,
                    message: message.to_string(),
                });
            };
            let result = decoder.decode_with_progress(&bytes, &mut report);
            match &result {
                Ok(dataset) => log::info!("Decoded {} points", dataset.len()),
                Err(e) => log::warn!("Decode failed: {}", e),
            }
            let _ = sender.send(DecodeEvent::Finished(result));
        });

        DecodeTicket {
            id: handle.id(),
            events,
            finished: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    fn service() -> DecodeService {
        DecodeService::new(Arc::new(TaskPool::new(2).unwrap()), DecodeOptions::default())
    }

    const FILE: &str = "VERSION 0.7\nFIELDS x y z\nPOINTS 2\nDATA ascii\n0 0 0\n1 2 3\n";

    #[test]
    fn test_submit_and_wait() {
        let dataset = service().submit(FILE.as_bytes().to_vec()).wait().unwrap().unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_events_end_with_finished() {
        let service = service();
        let mut ticket = service.submit(FILE.as_bytes().to_vec());

        let mut progress = 0;
        let mut finished = None;
        while finished.is_none() {
            match ticket.try_event().unwrap() {
                Some(DecodeEvent::Progress { .. }) => progress += 1,
                Some(DecodeEvent::Finished(result)) => finished = Some(result),
                None => std::thread::yield_now(),
            }
        }

        assert!(progress >= 2);
        assert!(ticket.is_finished());
        assert!(finished.unwrap().is_ok());
        assert!(ticket.try_event().unwrap().is_none());
    }

    #[test]
    fn test_independent_tickets() {
        let service = service();
        let good = service.submit(FILE.as_bytes().to_vec());
        let bad = service.submit(b"not a pcd".to_vec());

        assert!(matches!(bad.wait().unwrap(), Err(DecodeError::MalformedHeader(_))));
        assert_eq!(good.wait().unwrap().unwrap().len(), 2);
    }
}
