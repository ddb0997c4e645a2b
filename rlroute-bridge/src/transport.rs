//! Blocking byte streams to the peer.
//!
//! Two transports are provided: [`SocketTransport`], a TCP connection on the
//! loopback interface accepted by [`SocketListener`], and
//! [`NamedPipeTransport`], a pair of unidirectional FIFOs.
mod named_pipe;
mod socket;

use std::io::{self, ErrorKind, Read};

#[cfg(unix)]
pub use named_pipe::{make_fifo, NamedPipeTransport};
pub use socket::{SocketListener, SocketTransport};

/// A blocking byte source and sink.
pub trait Transport {
    /// Reads exactly `n` bytes, or fewer only when the stream ends.
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>>;

    /// Writes all bytes.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        (**self).read(n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }
}

/// Reads from `r` until `n` bytes are obtained or the stream ends.
///
/// The underlying reader may return short reads at any time.
pub(crate) fn read_up_to<R: Read>(r: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut off = 0usize;
    while off < n {
        match r.read(&mut buf[off..]) {
            Ok(0) => break,
            Ok(k) => off += k,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(off);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns at most one byte per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match (self.0.split_first(), buf.first_mut()) {
                (Some((b, rest)), Some(slot)) => {
                    *slot = *b;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn test_read_up_to_loops_over_short_reads() -> io::Result<()> {
        let data = [1u8, 2, 3, 4, 5];
        let mut r = Trickle(&data);
        assert_eq!(read_up_to(&mut r, 3)?, vec![1, 2, 3]);
        assert_eq!(read_up_to(&mut r, 3)?, vec![4, 5]);
        assert_eq!(read_up_to(&mut r, 3)?, Vec::<u8>::new());
        Ok(())
    }
}
