use std::{
    fmt, io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::trace;

/// Default delay between the first queued line and the flush that sends it.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(500);

const FLUSH_THREAD_NAME: &str = "statsd-client-flush";

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Starts the background flush thread.
///
/// Defaults to a named OS thread. Tests swap it out to observe what happens when threads can't be spawned.
#[derive(Clone)]
pub(crate) struct Spawner(Arc<dyn Fn(Task) -> io::Result<()> + Send + Sync>);

impl Spawner {
    pub fn new<F>(spawn: F) -> Self
    where
        F: Fn(Task) -> io::Result<()> + Send + Sync + 'static,
    {
        Spawner(Arc::new(spawn))
    }

    fn spawn(&self, task: Task) -> io::Result<()> {
        (self.0)(task)
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Spawner::new(|task| thread::Builder::new().name(FLUSH_THREAD_NAME.to_string()).spawn(task).map(drop))
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner").finish_non_exhaustive()
    }
}

enum Command {
    Arm { generation: u64, deadline: Instant },
    Cancel,
}

/// Debounces flushes: at most one delayed trigger is armed at any time.
///
/// Triggers fire on a single long-lived thread, started on first use and shared by every trigger this scheduler
/// arms, so anything the flush callback keeps per thread (such as a UDP socket) survives from one flush to the next.
/// The thread exits once the scheduler is dropped.
pub(crate) struct FlushScheduler {
    spawner: Spawner,
    commands: Option<Sender<Command>>,
    armed: Option<u64>,
    next_generation: u64,
}

impl FlushScheduler {
    pub fn new(spawner: Spawner) -> Self {
        FlushScheduler { spawner, commands: None, armed: None, next_generation: 0 }
    }

    /// Returns `true` if a trigger is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Returns `true` if `generation` identifies the currently armed trigger.
    pub fn is_current(&self, generation: u64) -> bool {
        self.armed == Some(generation)
    }

    /// Arms a one-shot trigger that calls `on_fire` after `delay`, unless already armed.
    ///
    /// `on_fire` receives the generation of the trigger that fired, which can be checked with [`is_current`] to
    /// ignore triggers that were cancelled just as they expired. It is only kept when the flush thread has to be
    /// started; once running, the thread keeps calling the callback it was started with.
    ///
    /// Returns `Ok(false)` if a trigger was already armed.
    ///
    /// # Errors
    ///
    /// If the flush thread could not be started, an error is returned and the scheduler stays idle. The next call
    /// tries to start it again.
    ///
    /// [`is_current`]: FlushScheduler::is_current
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> io::Result<bool>
    where
        F: Fn(u64) + Send + 'static,
    {
        if self.armed.is_some() {
            return Ok(false);
        }

        let generation = self.next_generation;
        let command = Command::Arm { generation, deadline: Instant::now() + delay };

        let commands = match self.commands.take() {
            Some(commands) => commands,
            None => self.start(on_fire)?,
        };
        if commands.send(command).is_err() {
            // The thread is gone, so the next call starts a fresh one.
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "flush thread exited"));
        }
        self.commands = Some(commands);

        self.next_generation = self.next_generation.wrapping_add(1);
        self.armed = Some(generation);
        trace!(generation, ?delay, "Armed flush trigger.");

        Ok(true)
    }

    /// Cancels the armed trigger, if any, returning the scheduler to idle.
    pub fn disarm(&mut self) -> bool {
        let Some(generation) = self.armed.take() else {
            return false;
        };

        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Cancel);
        }
        trace!(generation, "Disarmed flush trigger.");

        true
    }

    fn start<F>(&self, on_fire: F) -> io::Result<Sender<Command>>
    where
        F: Fn(u64) + Send + 'static,
    {
        let (tx, rx) = unbounded();
        self.spawner.spawn(Box::new(move || run(&rx, on_fire)))?;
        trace!("Started flush thread.");
        Ok(tx)
    }
}

impl Default for FlushScheduler {
    fn default() -> Self {
        FlushScheduler::new(Spawner::default())
    }
}

fn run<F>(commands: &Receiver<Command>, on_fire: F)
where
    F: Fn(u64),
{
    let mut armed: Option<(u64, Instant)> = None;

    loop {
        let command = match armed {
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
            Some((generation, deadline)) => match commands.recv_deadline(deadline) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    armed = None;
                    on_fire(generation);
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        armed = match command {
            Command::Arm { generation, deadline } => Some((generation, deadline)),
            Command::Cancel => {
                if let Some((generation, _)) = armed {
                    trace!(generation, "Flush trigger cancelled.");
                }
                None
            }
        };
    }

    trace!("Flush thread exiting.");
}
