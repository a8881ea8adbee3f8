use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{error, trace};

use crate::common::{CrabError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request. Buffers are owned by the request and travel back to
/// the caller on the completion channel.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        done: Sender<Result<()>>,
    },
}

impl DiskRequest {
    pub fn page_id(&self) -> PageId {
        match self {
            DiskRequest::Read { page_id, .. } | DiskRequest::Write { page_id, .. } => *page_id,
        }
    }
}

/// DiskScheduler owns a background worker thread that serves disk requests
/// from a bounded queue.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker thread over `disk_manager`.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::Builder::new()
            .name("disk-scheduler".into())
            .spawn(move || Self::run_worker(dm_clone, receiver, shutdown_clone))
            .ok();

        if worker_handle.is_none() {
            error!("failed to spawn the disk scheduler worker");
        }

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle,
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        if self.worker_handle.is_none() {
            return Err(CrabError::DiskScheduler("worker is not running".into()));
        }
        self.request_sender
            .send(request)
            .map_err(|e| CrabError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Reads `page_id` into `data` and waits for the result.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_id, done: tx })?;

        let buf = Self::wait(page_id, rx)?;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes `data` to `page_id` and waits for the result.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data: buf,
            done: tx,
        })?;

        Self::wait(page_id, rx)
    }

    fn wait<T>(page_id: PageId, rx: Receiver<Result<T>>) -> Result<T> {
        rx.recv()
            .map_err(|e| CrabError::DiskScheduler(format!("failed to receive completion: {}", e)))?
            .map_err(|e| CrabError::DiskScheduler(format!("request for {} failed: {}", page_id, e)))
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        trace!("disk request for {}", request.page_id());

        // the caller may have given up waiting; a closed completion channel is fine
        match request {
            DiskRequest::Read { page_id, done } => {
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager.read_page(page_id, &mut buf[..]).map(|_| buf);
                let _ = done.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                done,
            } => {
                let _ = done.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
