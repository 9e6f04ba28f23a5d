use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

/// The output and error sinks shared by all file tasks.
///
/// Every message is formatted up front and handed to the sink in a single
/// `write_all` while the lock is held, so lines from concurrent tasks never
/// interleave mid-message.
pub struct Reporter {
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
}

impl Reporter {
    /// Creates a reporter over arbitrary writers.
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
        }
    }

    /// Reports to the process's stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Writes one line to the output sink.
    pub fn out(&self, args: fmt::Arguments<'_>) {
        write_line(&self.out, args);
    }

    /// Writes one line to the error sink.
    pub fn err(&self, args: fmt::Arguments<'_>) {
        write_line(&self.err, args);
    }
}

fn write_line(sink: &Mutex<Box<dyn Write + Send>>, args: fmt::Arguments<'_>) {
    let mut line = args.to_string();
    line.push('\n');
    // A poisoned lock only means another task panicked mid-write; keep reporting.
    let mut sink = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(e) = sink.write_all(line.as_bytes()).and_then(|_| sink.flush()) {
        tracing::debug!("dropping report line: {e}");
    }
}

/// An in-memory sink that can be cloned into a [`Reporter`] and read back.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuf(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuf {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
