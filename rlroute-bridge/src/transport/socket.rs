use super::{read_up_to, Transport};
use std::{
    io::{self, Write},
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream},
};

/// Listening TCP socket on the loopback interface.
///
/// Peers are accepted one at a time.
pub struct SocketListener {
    listener: TcpListener,
}

impl SocketListener {
    /// Binds `127.0.0.1:port`. Port `0` picks a free port.
    ///
    /// On Unix the standard library sets `SO_REUSEADDR` on listening sockets,
    /// so a restarted server can rebind a port in `TIME_WAIT`.
    pub fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        log::info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocks until a peer connects.
    pub fn accept(&self) -> io::Result<SocketTransport> {
        let (stream, addr) = self.listener.accept()?;
        log::info!("Accepted connection from {}", addr);
        Ok(SocketTransport { stream })
    }
}

/// Connected TCP stream.
pub struct SocketTransport {
    stream: TcpStream,
}

impl SocketTransport {
    /// Connects to a listening socket, as the peer does.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr)?,
        })
    }

    /// Wraps a connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Transport for SocketTransport {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        read_up_to(&mut self.stream, n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }
}
