//! The session controller: the host's side of the bus engine.
//!
//! The engine runs on its own thread.  RAM and the event log (the
//! [`Workspace`]) belong to whichever side is using them: the host
//! between runs, the engine during one.  They move to the engine
//! with each run request and come back with its result, so the host
//! cannot look at RAM while the processor is using it.  The HIDOS
//! dispatcher is the one exception (see [`Session::start_hidos`]).
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{event, Level};

use base::prelude::*;
use transfer::{ByteLink, TransferConfig, TransferError};

use crate::bridge::{DeviceManager, Dispatcher, Mailbox};
use crate::clock::Clock;
use crate::engine::{BusEngine, Workspace};
use crate::memory::ImageTooLarge;
use crate::pins::BusPins;

#[derive(Debug)]
pub enum SessionError {
    /// A run is in progress, so the engine owns RAM and the log.
    Busy,
    /// There is no run to wait for.
    Idle,
    /// The engine thread has exited (it panicked); RAM and the log
    /// went with it.
    EngineGone,
    Spawn(io::Error),
    Image(ImageTooLarge),
    Transfer(TransferError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            SessionError::Busy => f.write_str("a run is in progress"),
            SessionError::Idle => f.write_str("no run is in progress"),
            SessionError::EngineGone => f.write_str("the bus engine thread has exited"),
            SessionError::Spawn(e) => write!(f, "failed to start the bus engine thread: {e}"),
            SessionError::Image(e) => write!(f, "{e}"),
            SessionError::Transfer(e) => write!(f, "transfer failed: {e}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Spawn(e) => Some(e),
            SessionError::Image(e) => Some(e),
            SessionError::Transfer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ImageTooLarge> for SessionError {
    fn from(e: ImageTooLarge) -> SessionError {
        SessionError::Image(e)
    }
}

impl From<TransferError> for SessionError {
    fn from(e: TransferError) -> SessionError {
        SessionError::Transfer(e)
    }
}

enum Ownership {
    Host(Workspace),
    Engine,
    Lost,
}

struct Job {
    request: RunRequest,
    workspace: Workspace,
    mailbox: Option<Arc<Mailbox>>,
}

struct Completion {
    result: RunResult,
    workspace: Workspace,
}

/// Tells the dispatcher the run is over even if the engine panics,
/// so that it does not wait forever.
struct FinishOnDrop(Option<Arc<Mailbox>>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        if let Some(mailbox) = self.0.as_ref() {
            mailbox.finish();
        }
    }
}

fn engine_loop<P: BusPins, C: Clock>(
    mut engine: BusEngine<P, C>,
    jobs: Receiver<Job>,
    completions: SyncSender<Completion>,
    stop: &AtomicBool,
) {
    for job in jobs.iter() {
        let Job {
            request,
            mut workspace,
            mailbox,
        } = job;
        let guard = FinishOnDrop(mailbox.clone());
        let result = engine.run(&request, &mut workspace, mailbox.as_deref(), stop);
        drop(guard);
        if completions.send(Completion { result, workspace }).is_err() {
            break;
        }
    }
    event!(Level::DEBUG, "bus engine thread exiting");
}

/// Lets another thread (for example a keyboard or signal handler)
/// stop the current run.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

pub struct Session {
    jobs: Option<SyncSender<Job>>,
    completions: Receiver<Completion>,
    stop: Arc<AtomicBool>,
    ownership: Ownership,
    worker: Option<JoinHandle<()>>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let owner = match self.ownership {
            Ownership::Host(_) => "host",
            Ownership::Engine => "engine",
            Ownership::Lost => "lost",
        };
        f.debug_struct("Session")
            .field("workspace", &owner)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Starts the engine thread.  The session begins owning
    /// `workspace`.
    pub fn new<P, C>(engine: BusEngine<P, C>, workspace: Workspace) -> Result<Session, SessionError>
    where
        P: BusPins + Send + 'static,
        C: Clock + Send + 'static,
    {
        // A rendezvous channel for jobs: the engine is either running
        // or waiting in recv().
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(0);
        let (done_tx, done_rx) = mpsc::sync_channel::<Completion>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let engine_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("bus-engine".to_string())
            .spawn(move || engine_loop(engine, job_rx, done_tx, &engine_stop))
            .map_err(SessionError::Spawn)?;
        Ok(Session {
            jobs: Some(job_tx),
            completions: done_rx,
            stop,
            ownership: Ownership::Host(workspace),
            worker: Some(worker),
        })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.ownership, Ownership::Engine)
    }

    fn unavailable(&self) -> SessionError {
        match self.ownership {
            Ownership::Lost => SessionError::EngineGone,
            _ => SessionError::Busy,
        }
    }

    /// The workspace, if the host owns it.
    pub fn workspace(&self) -> Result<&Workspace, SessionError> {
        match &self.ownership {
            Ownership::Host(workspace) => Ok(workspace),
            _ => Err(self.unavailable()),
        }
    }

    fn submit_job(
        &mut self,
        request: RunRequest,
        mailbox: Option<Arc<Mailbox>>,
    ) -> Result<(), SessionError> {
        let jobs = match (&self.ownership, self.jobs.as_ref()) {
            (Ownership::Host(_), Some(jobs)) => jobs,
            (Ownership::Host(_), None) => return Err(SessionError::EngineGone),
            _ => return Err(self.unavailable()),
        };
        let workspace = match mem::replace(&mut self.ownership, Ownership::Engine) {
            Ownership::Host(workspace) => workspace,
            // Checked above.
            other => {
                self.ownership = other;
                return Err(SessionError::Busy);
            }
        };
        // Cleared here rather than by the engine so that a stop
        // requested straight after submitting is not lost.
        self.stop.store(false, Ordering::Release);
        event!(Level::DEBUG, "submitting {request:?}");
        match jobs.send(Job {
            request,
            workspace,
            mailbox,
        }) {
            Ok(()) => Ok(()),
            Err(mpsc::SendError(job)) => {
                self.ownership = Ownership::Host(job.workspace);
                Err(SessionError::EngineGone)
            }
        }
    }

    /// Hands RAM and the log to the engine and starts a run.
    pub fn submit(&mut self, request: RunRequest) -> Result<(), SessionError> {
        self.submit_job(request, None)
    }

    fn engine_lost(&mut self) -> SessionError {
        event!(Level::ERROR, "the bus engine thread has exited");
        self.ownership = Ownership::Lost;
        SessionError::EngineGone
    }

    fn check_in_flight(&self) -> Result<(), SessionError> {
        match self.ownership {
            Ownership::Engine => Ok(()),
            Ownership::Host(_) => Err(SessionError::Idle),
            Ownership::Lost => Err(SessionError::EngineGone),
        }
    }

    /// Waits for the current run to finish.
    pub fn await_result(&mut self) -> Result<RunResult, SessionError> {
        self.check_in_flight()?;
        match self.completions.recv() {
            Ok(Completion { result, workspace }) => {
                self.ownership = Ownership::Host(workspace);
                Ok(result)
            }
            Err(_) => Err(self.engine_lost()),
        }
    }

    /// Like [`Session::await_result`] but returns `None` at once if
    /// the run is still going.
    pub fn poll_result(&mut self) -> Result<Option<RunResult>, SessionError> {
        self.check_in_flight()?;
        match self.completions.try_recv() {
            Ok(Completion { result, workspace }) => {
                self.ownership = Ownership::Host(workspace);
                Ok(Some(result))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.engine_lost()),
        }
    }

    /// Asks the engine to stop at the end of the current bus cycle.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    pub fn run(&mut self, request: RunRequest) -> Result<RunResult, SessionError> {
        self.submit(request)?;
        self.await_result()
    }

    /// Runs until stopped or until the processor stops producing bus
    /// cycles.
    pub fn run_no_log(&mut self) -> Result<RunResult, SessionError> {
        self.run(RunRequest::new(RunMode::NoLog, CycleLimit::Unbounded))
    }

    pub fn run_with_log(
        &mut self,
        mode: RunMode,
        limit: CycleLimit,
    ) -> Result<RunResult, SessionError> {
        self.run(RunRequest::new(mode, limit))
    }

    pub fn read_ram(&self, start: Address, len: usize) -> Result<Vec<u8>, SessionError> {
        Ok(self.workspace()?.ram.read_range(start, len))
    }

    pub fn write_ram(&mut self, start: Address, bytes: &[u8]) -> Result<(), SessionError> {
        self.workspace()?.ram.write_range(start, bytes);
        Ok(())
    }

    pub fn fill_ram(&mut self, value: u8) -> Result<(), SessionError> {
        self.workspace()?.ram.fill(value);
        Ok(())
    }

    /// Copies a boot image to address 0.
    pub fn load_fixed_image(&mut self, image: &[u8]) -> Result<(), SessionError> {
        self.workspace()?.ram.load(image)?;
        event!(Level::INFO, "loaded {} byte image at 0", image.len());
        Ok(())
    }

    /// The valid entries of the event log from the last logging run.
    pub fn event_log(&self) -> Result<&[BusEvent], SessionError> {
        Ok(self.workspace()?.log.entries())
    }

    /// Runs in HIDOS mode, serving the guest's I/O requests on this
    /// thread until the run ends.  Load the boot image first.
    ///
    /// This is the one time the host and the engine use RAM at once:
    /// the dispatcher reads and writes the guest's buffers while the
    /// engine is serving bus cycles.  The guest waits on the status
    /// port while its request is outstanding, so they do not collide.
    pub fn start_hidos(
        &mut self,
        devices: DeviceManager,
        log_level: u8,
    ) -> Result<RunResult, SessionError> {
        let ram = self.workspace()?.ram.shared_handle();
        let mailbox = Arc::new(Mailbox::new());
        self.submit_job(
            RunRequest::new(RunMode::HidosVm, CycleLimit::Unbounded),
            Some(Arc::clone(&mailbox)),
        )?;
        let mut dispatcher = Dispatcher::new(devices, ram, log_level);
        let served = dispatcher.serve(&mailbox);
        event!(Level::INFO, "HIDOS run served {served} requests");
        self.await_result()
    }

    /// Sends the whole of RAM.
    pub fn send_ram<L: ByteLink + ?Sized>(
        &self,
        link: &mut L,
        config: &TransferConfig,
    ) -> Result<(), SessionError> {
        let bytes = self.workspace()?.ram.snapshot();
        transfer::send(link, &bytes, config)?;
        Ok(())
    }

    /// Receives an image into RAM from address 0 and returns the
    /// number of bytes stored.  RAM is unchanged if the transfer
    /// fails.
    pub fn receive_ram<L: ByteLink + ?Sized>(
        &mut self,
        link: &mut L,
        config: &TransferConfig,
    ) -> Result<usize, SessionError> {
        let ram = &self.workspace()?.ram;
        let mut buffer = vec![0_u8; ram.size()];
        let len = transfer::receive(link, &mut buffer, config)?;
        ram.load(&buffer[..len])?;
        event!(Level::INFO, "received {len} bytes into RAM");
        Ok(len)
    }

    /// Sends the valid entries of the event log, 8 bytes each.
    pub fn send_log<L: ByteLink + ?Sized>(
        &self,
        link: &mut L,
        config: &TransferConfig,
    ) -> Result<(), SessionError> {
        let bytes = self.workspace()?.log.wire_bytes();
        event!(Level::INFO, "sending {} log entries", bytes.len() / RECORD_SIZE);
        transfer::send(link, &bytes, config)?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.request_stop();
        // Closing the job channel ends the engine's loop.
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                event!(Level::WARN, "the bus engine thread panicked");
            }
        }
    }
}
