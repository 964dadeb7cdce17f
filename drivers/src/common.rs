//! Shared plumbing for the concrete driver modules: fd opening and the
//! single-field schema shape most of these synthetic/stand-in drivers use.
//!
//! Drivers reach for `libc` directly rather than wrapping every
//! open/connect in its own abstraction, since each driver's fd-acquisition
//! shape is different enough that a shared abstraction would just be an
//! extra layer of indirection.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use hound_abi::{DataId, Error, FieldDescriptor, FieldType, Result, SchemaDescriptor, Unit};

/// Open `path` read-only and non-blocking, the fd shape every pull-mode
/// driver here hands to the poller.
pub fn open_readonly_nonblock(path: &str) -> Result<RawFd> {
    let c_path = CString::new(path).map_err(|_| Error::InvalidString)?;
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK) };
    if fd < 0 {
        return Err(Error::from_errno(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)));
    }
    Ok(fd)
}

/// Open a TCP connection to `host:port`, the fd shape the line/stream
/// oriented stand-ins (gpsd, MQTT) hand to the poller.
pub fn connect_tcp(host: &str, port: u16) -> Result<RawFd> {
    use std::net::{TcpStream, ToSocketAddrs};
    use std::os::unix::io::IntoRawFd;

    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::InvalidString)?;
    let addr = addrs.next().ok_or(Error::InvalidString)?;
    let stream = TcpStream::connect(addr)
        .map_err(|e| Error::from_errno(e.raw_os_error().unwrap_or(libc::EIO)))?;
    stream.set_nonblocking(true).ok();
    Ok(stream.into_raw_fd())
}

pub fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// A schema with exactly one named, unit-tagged field of a fixed-size type.
pub fn single_field_schema(data_id: DataId, name: &str, field_name: &str, unit: Unit, ty: FieldType) -> SchemaDescriptor {
    SchemaDescriptor {
        data_id,
        name: name.to_string(),
        fmts: vec![FieldDescriptor {
            name: field_name.to_string(),
            unit,
            ty,
            size: 0,
            offset: 0,
        }],
    }
}
