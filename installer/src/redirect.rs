//! Scoped capture of the process-wide standard streams and file-mode mask.
//!
//! While a build runs, anything written to the process's standard output or
//! error (by this process or by children inheriting the descriptors) is
//! routed into the execution context's listeners: output lines at
//! [`LogLevel::Info`], error lines at [`LogLevel::Error`]. Both guards restore
//! the previous state when dropped, including during unwinding.
//!
//! Restoring never waits for the redirection pipe to close. Output already
//! written when the streams are restored is delivered before the guard is
//! released; processes that outlive the build and still hold the pipe keep
//! being forwarded to the listeners in the background until they exit.

use crate::level::LogLevel;
use crate::logger::Listeners;
use std::cell::Cell;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Serialises redirections across threads; the standard streams are
/// process-global.
static REDIRECT_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    /// Number of live [`StreamRedirect`] guards created on this thread.
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Name of the threads draining redirected streams.
#[cfg(unix)]
const CAPTURE_THREAD: &str = "buildcall-capture";

fn nested() -> bool {
    DEPTH.with(Cell::get) > 0
}

/// Routes the process's standard streams into build listeners until dropped.
///
/// Only one thread holds a redirection at a time; [`StreamRedirect::acquire`]
/// on another thread blocks until the holder's guard is dropped. Acquiring
/// again on the holding thread shares the active redirection, so output of
/// the nested build reaches the outer build's listeners.
#[must_use = "the streams are restored as soon as the guard is dropped"]
pub struct StreamRedirect {
    out: Option<imp::Redirected>,
    err: Option<imp::Redirected>,
    lock: Option<MutexGuard<'static, ()>>,
}

impl StreamRedirect {
    /// Redirect standard output and error into `listeners`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptors cannot be duplicated or the capture
    /// threads cannot be started. Any stream already redirected is restored
    /// before the error is returned.
    pub fn acquire(listeners: &Listeners) -> io::Result<Self> {
        if nested() {
            DEPTH.with(|depth| depth.set(depth.get() + 1));
            log::trace!("standard streams already redirected on this thread; sharing them");
            return Ok(Self {
                out: None,
                err: None,
                lock: None,
            });
        }

        let lock = REDIRECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        let mut redirect = Self {
            out: None,
            err: None,
            lock: Some(lock),
        };
        redirect.out = Some(imp::Redirected::install(
            imp::Stream::Output,
            LogLevel::Info,
            listeners.clone(),
        )?);
        redirect.err = Some(imp::Redirected::install(
            imp::Stream::Error,
            LogLevel::Error,
            listeners.clone(),
        )?);
        log::trace!("standard streams redirected into build listeners");
        Ok(redirect)
    }

    /// Returns true if this guard shares a redirection made earlier on the
    /// same thread.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.lock.is_none()
    }
}

impl Drop for StreamRedirect {
    fn drop(&mut self) {
        if let Some(err) = self.err.take() {
            err.restore();
        }
        if let Some(out) = self.out.take() {
            out.restore();
        }
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        if !self.is_shared() {
            log::trace!("standard streams restored");
        }
    }
}

impl std::fmt::Debug for StreamRedirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRedirect")
            .field("output", &self.out.is_some())
            .field("error", &self.err.is_some())
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// Run `f` while no other thread holds a redirection.
///
/// Code that duplicates the standard stream descriptors uses this so it never
/// captures another thread's redirection pipe. On the thread holding the
/// redirection `f` runs straight away and sees the redirected streams.
pub(crate) fn while_unredirected<T>(f: impl FnOnce() -> T) -> T {
    if nested() {
        return f();
    }
    let _lock = REDIRECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    f()
}

/// Restores the process file-mode creation mask when dropped.
#[derive(Debug)]
#[must_use = "the policy is restored as soon as the guard is dropped"]
pub struct SecurityPolicyGuard {
    #[cfg(unix)]
    mask: libc::mode_t,
}

impl SecurityPolicyGuard {
    /// Record the current policy.
    pub fn save() -> Self {
        #[cfg(unix)]
        {
            // SAFETY: umask only swaps the process mask and cannot fail. The
            // temporary value is replaced on the next line.
            let mask = unsafe { libc::umask(0o022) };
            // SAFETY: as above; this reinstates the mask just read.
            unsafe { libc::umask(mask) };
            Self { mask }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// The saved file-mode creation mask.
    #[cfg(unix)]
    #[must_use]
    pub const fn mask(&self) -> libc::mode_t {
        self.mask
    }
}

impl Drop for SecurityPolicyGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: umask only swaps the process mask and cannot fail.
            unsafe { libc::umask(self.mask) };
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::CAPTURE_THREAD;
    use crate::level::LogLevel;
    use crate::logger::Listeners;
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    /// Upper bound on waiting for the capture thread to deliver output
    /// written before the streams were restored.
    const CATCH_UP_LIMIT: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, Copy)]
    pub(super) enum Stream {
        Output,
        Error,
    }

    impl Stream {
        const fn fd(self) -> RawFd {
            match self {
                Self::Output => libc::STDOUT_FILENO,
                Self::Error => libc::STDERR_FILENO,
            }
        }

        fn flush(self) {
            let flushed = match self {
                Self::Output => io::stdout().flush(),
                Self::Error => io::stderr().flush(),
            };
            if let Err(e) = flushed {
                log::trace!("failed to flush {self:?} stream: {e}");
            }
        }
    }

    pub(super) struct Redirected {
        stream: Stream,
        saved: OwnedFd,
        /// Closing this wakes the capture thread once the stream is restored.
        wake: OwnedFd,
        caught_up: Receiver<()>,
    }

    impl Redirected {
        pub(super) fn install(
            stream: Stream,
            level: LogLevel,
            listeners: Listeners,
        ) -> io::Result<Self> {
            stream.flush();
            let saved = duplicate(stream.fd())?;
            let (read_end, write_end) = pipe()?;
            let (wake_read, wake) = pipe()?;
            let (caught_up_tx, caught_up) = mpsc::channel();
            let capture = Capture {
                data: File::from(read_end),
                wake: wake_read,
                caught_up: caught_up_tx,
                level,
                listeners,
            };
            std::thread::Builder::new()
                .name(CAPTURE_THREAD.to_owned())
                .spawn(move || capture.run())?;

            // SAFETY: both descriptors are open; dup2 atomically replaces the
            // standard stream with the pipe's write end.
            if unsafe { libc::dup2(write_end.as_raw_fd(), stream.fd()) } == -1 {
                return Err(io::Error::last_os_error());
            }
            drop(write_end);

            Ok(Self {
                stream,
                saved,
                wake,
                caught_up,
            })
        }

        pub(super) fn restore(self) {
            self.stream.flush();
            // SAFETY: `saved` is an open duplicate of the original stream;
            // dup2 reinstates it in place of the pipe.
            if unsafe { libc::dup2(self.saved.as_raw_fd(), self.stream.fd()) } == -1 {
                log::trace!(
                    "failed to restore {:?} stream: {}",
                    self.stream,
                    io::Error::last_os_error()
                );
                return;
            }
            drop(self.wake);
            if self.caught_up.recv_timeout(CATCH_UP_LIMIT).is_err() {
                log::trace!("{:?} capture did not catch up before restore", self.stream);
            }
        }
    }

    /// The capture thread's side of a redirection.
    struct Capture {
        data: File,
        wake: OwnedFd,
        caught_up: Sender<()>,
        level: LogLevel,
        listeners: Listeners,
    }

    enum Ready {
        Data,
        Restored,
    }

    impl Capture {
        fn run(mut self) {
            let mut lines = LineBuffer::default();
            let mut chunk = [0_u8; 4096];

            loop {
                match wait(&self.data, &self.wake) {
                    Ok(Ready::Data) => match self.data.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => lines.push(chunk.get(..n).unwrap_or_default(), self.level, &self.listeners),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            log::trace!("stopped capturing redirected stream: {e}");
                            break;
                        }
                    },
                    Ok(Ready::Restored) => {
                        let open = self.catch_up(&mut lines, &mut chunk);
                        lines.finish(self.level, &self.listeners);
                        if self.caught_up.send(()).is_err() {
                            log::trace!("stream restore stopped waiting for capture");
                        }
                        if open {
                            self.forward_remaining(&mut lines, &mut chunk);
                        }
                        return;
                    }
                    Err(e) => {
                        log::trace!("stopped capturing redirected stream: {e}");
                        break;
                    }
                }
            }
            lines.finish(self.level, &self.listeners);
        }

        /// Read everything already buffered in the pipe. Returns false if the
        /// pipe reached end of file.
        fn catch_up(&mut self, lines: &mut LineBuffer, chunk: &mut [u8]) -> bool {
            if let Err(e) = set_nonblocking(&self.data, true) {
                log::trace!("cannot drain redirected stream without blocking: {e}");
                return true;
            }
            let open = loop {
                match self.data.read(chunk) {
                    Ok(0) => break false,
                    Ok(n) => lines.push(chunk.get(..n).unwrap_or_default(), self.level, &self.listeners),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break true,
                    Err(e) => {
                        log::trace!("stopped capturing redirected stream: {e}");
                        break false;
                    }
                }
            };
            if let Err(e) = set_nonblocking(&self.data, false) {
                log::trace!("failed to restore blocking reads: {e}");
                return false;
            }
            open
        }

        /// Forward output of processes still holding the pipe until they exit.
        fn forward_remaining(&mut self, lines: &mut LineBuffer, chunk: &mut [u8]) {
            loop {
                match self.data.read(chunk) {
                    Ok(0) => break,
                    Ok(n) => lines.push(chunk.get(..n).unwrap_or_default(), self.level, &self.listeners),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        log::trace!("stopped forwarding background output: {e}");
                        break;
                    }
                }
            }
            lines.finish(self.level, &self.listeners);
        }
    }

    /// Splits captured bytes into lines.
    #[derive(Default)]
    struct LineBuffer {
        pending: Vec<u8>,
    }

    impl LineBuffer {
        fn push(&mut self, bytes: &[u8], level: LogLevel, listeners: &Listeners) {
            self.pending.extend_from_slice(bytes);
            while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                emit(&line, level, listeners);
            }
        }

        fn finish(&mut self, level: LogLevel, listeners: &Listeners) {
            if !self.pending.is_empty() {
                let line = std::mem::take(&mut self.pending);
                emit(&line, level, listeners);
            }
        }
    }

    fn emit(line: &[u8], level: LogLevel, listeners: &Listeners) {
        let line = String::from_utf8_lossy(line);
        listeners.log(level, None, line.trim_end_matches(['\n', '\r']));
    }

    /// Block until the pipe has data or the stream has been restored.
    fn wait(data: &File, wake: &OwnedFd) -> io::Result<Ready> {
        let readable = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        loop {
            let mut fds = [
                libc::pollfd {
                    fd: wake.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: data.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            // SAFETY: `fds` holds two initialised pollfd entries that outlive
            // the call.
            if unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) } == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            let [wake_fd, data_fd] = fds;
            if wake_fd.revents & readable != 0 {
                return Ok(Ready::Restored);
            }
            if data_fd.revents & readable != 0 {
                return Ok(Ready::Data);
            }
        }
    }

    fn set_nonblocking(file: &File, nonblocking: bool) -> io::Result<()> {
        let fd = file.as_raw_fd();
        // SAFETY: the descriptor is open for the duration of both calls.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        // SAFETY: as above.
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn duplicate(fd: RawFd) -> io::Result<OwnedFd> {
        // SAFETY: F_DUPFD_CLOEXEC returns a fresh descriptor we take
        // ownership of, or -1.
        let copy = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if copy == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `copy` is a newly opened descriptor owned by nobody else.
        Ok(unsafe { OwnedFd::from_raw_fd(copy) })
    }

    fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds: [libc::c_int; 2] = [-1, -1];
        // SAFETY: `fds` has room for the two descriptors pipe writes.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        let [read, write] = fds;
        // SAFETY: pipe succeeded, so both descriptors are open and unowned.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };
        close_on_exec(&read)?;
        close_on_exec(&write)?;
        Ok((read, write))
    }

    fn close_on_exec(fd: &OwnedFd) -> io::Result<()> {
        // SAFETY: the descriptor is open for the duration of the call.
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod imp {
    use crate::level::LogLevel;
    use crate::logger::Listeners;
    use std::io;

    #[derive(Debug, Clone, Copy)]
    pub(super) enum Stream {
        Output,
        Error,
    }

    pub(super) struct Redirected;

    impl Redirected {
        pub(super) fn install(
            stream: Stream,
            _level: LogLevel,
            _listeners: Listeners,
        ) -> io::Result<Self> {
            log::trace!("{stream:?} stream redirection is not supported on this platform");
            Ok(Self)
        }

        pub(super) fn restore(self) {}
    }
}
