#![cfg(unix)]
use super::{read_up_to, Transport};
use nix::{errno::Errno, sys::stat::Mode, unistd::mkfifo};
use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Creates a FIFO at `path`, tolerating one that already exists.
pub fn make_fifo<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match mkfifo(path.as_ref(), Mode::S_IRWXU) {
        Ok(()) => Ok(()),
        Err(Errno::EEXIST) => {
            log::debug!("Named pipe {:?} already exists", path.as_ref());
            Ok(())
        }
        Err(e) => Err(io::Error::from(e)),
    }
}

fn remove_fifo(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// A pair of unidirectional FIFOs.
///
/// The input pipe carries messages from the peer, the output pipe messages to
/// it. Both FIFO files are removed when the transport is closed or dropped.
pub struct NamedPipeTransport {
    input_path: PathBuf,
    output_path: PathBuf,
    input: Option<File>,
    output: Option<File>,
}

impl NamedPipeTransport {
    /// Creates both FIFOs if absent, then opens the input for reading and the
    /// output for writing.
    ///
    /// Opening blocks until the peer has opened the other end of each pipe,
    /// so the peer must open its writing end (our input) first.
    pub fn open<P: AsRef<Path>>(input: P, output: P) -> io::Result<Self> {
        let input_path = input.as_ref().to_path_buf();
        let output_path = output.as_ref().to_path_buf();
        make_fifo(&input_path)?;
        make_fifo(&output_path)?;

        let mut transport = Self {
            input_path,
            output_path,
            input: None,
            output: None,
        };
        log::info!("Waiting for peer on {:?}", transport.input_path);
        transport.input = Some(File::open(&transport.input_path)?);
        transport.output = Some(OpenOptions::new().write(true).open(&transport.output_path)?);
        log::info!("Named pipes {:?} and {:?} connected", transport.input_path, transport.output_path);

        Ok(transport)
    }

    /// Closes both handles and removes the FIFO files.
    ///
    /// Files already removed are ignored. Calling it again is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        self.input.take();
        self.output.take();
        remove_fifo(&self.input_path)?;
        remove_fifo(&self.output_path)
    }

    fn closed() -> io::Error {
        io::Error::new(ErrorKind::NotConnected, "named pipe transport is closed")
    }
}

impl Transport for NamedPipeTransport {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let input = self.input.as_mut().ok_or_else(Self::closed)?;
        read_up_to(input, n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let output = self.output.as_mut().ok_or_else(Self::closed)?;
        output.write_all(bytes)?;
        output.flush()
    }
}

impl Drop for NamedPipeTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to remove named pipes: {}", e);
        }
    }
}
