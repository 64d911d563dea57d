//! Listening socket that hands out exactly one connection.
//!
//! The listening socket is closed as soon as the first connection is
//! accepted; later connection attempts are refused by the kernel.

use crate::config::ListenAddr;
use socket2::{Domain, SockAddr, Socket, Type};
use std::io;
use tracing::{debug, info};

/// A bound, listening socket.
pub struct Listener {
    socket: Socket,
}

/// The one accepted connection.
pub struct Accepted {
    pub socket: Socket,
    pub peer: String,
}

impl Listener {
    /// Bind and listen on `addr` with a backlog of one.
    pub fn bind(addr: &ListenAddr) -> io::Result<Self> {
        let socket = match *addr {
            ListenAddr::Vsock { cid, port } => bind_vsock(cid, port)?,
            ListenAddr::Tcp(addr) => {
                let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
                socket.set_reuse_address(true)?;
                socket.bind(&addr.into())?;
                socket
            }
        };
        socket.listen(1)?;

        debug!(addr = %addr, "Listening");
        Ok(Self { socket })
    }

    /// The address the socket is bound to, as printed in logs.
    pub fn local_addr(&self) -> io::Result<String> {
        self.socket.local_addr().map(|addr| describe(&addr))
    }

    /// Accept one connection and close the listening socket.
    pub fn accept_one(self) -> io::Result<Accepted> {
        let (socket, peer) = self.socket.accept()?;
        let peer = describe(&peer);
        info!(peer = %peer, "Accepted connection");
        Ok(Accepted { socket, peer })
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_vsock(cid: u32, port: u32) -> io::Result<Socket> {
    let socket = Socket::new(Domain::VSOCK, Type::STREAM, None)?;
    socket.bind(&SockAddr::vsock(cid, port))?;
    Ok(socket)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_vsock(_cid: u32, _port: u32) -> io::Result<Socket> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Unsupported platform: vsock is only available on Linux",
    ))
}

fn describe(addr: &SockAddr) -> String {
    if let Some(addr) = addr.as_socket() {
        return addr.to_string();
    }
    if let Some((cid, port)) = vsock_address(addr) {
        return format!("vsock:{cid}:{port}");
    }
    format!("family {}", addr.family())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn vsock_address(addr: &SockAddr) -> Option<(u32, u32)> {
    addr.as_vsock_address()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn vsock_address(_addr: &SockAddr) -> Option<(u32, u32)> {
    None
}
