//! AF_PACKET frame transport.
//!
//! Binds a `SOCK_DGRAM` packet socket to the EBM EtherType on one
//! interface, so the kernel strips and rebuilds the Ethernet header and
//! the engines only ever see EBM payloads. Read deadlines map onto
//! `SO_RCVTIMEO`.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use tracing::debug;

use super::traits::{FrameTransport, TransportError};
use super::MacAddr;
use crate::protocol::constants::ETHERTYPE_EBM;

/// Packet socket bound to one interface and the EBM EtherType.
pub struct PacketTransport {
    fd: OwnedFd,
    ifindex: libc::c_int,
}

impl PacketTransport {
    /// Open a packet socket on the named interface.
    ///
    /// Requires `CAP_NET_RAW`.
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let name = CString::new(interface)
            .map_err(|_| TransportError::InterfaceNotFound(interface.to_string()))?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(TransportError::InterfaceNotFound(interface.to_string()));
        }
        let ifindex = ifindex as libc::c_int;

        let proto = (ETHERTYPE_EBM.to_be()) as libc::c_int;
        let raw_fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_DGRAM, proto) };
        if raw_fd < 0 {
            return Err(TransportError::OpenFailed(
                io::Error::last_os_error().to_string(),
            ));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
        sll.sll_protocol = ETHERTYPE_EBM.to_be();
        sll.sll_ifindex = ifindex;
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(TransportError::OpenFailed(
                io::Error::last_os_error().to_string(),
            ));
        }

        debug!(interface, ifindex, "opened packet socket");
        Ok(Self { fd, ifindex })
    }
}

impl FrameTransport for PacketTransport {
    fn send_to(&self, frame: &[u8], dest: MacAddr) -> Result<(), TransportError> {
        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
        sll.sll_protocol = ETHERTYPE_EBM.to_be();
        sll.sll_ifindex = self.ifindex;
        sll.sll_halen = 6;
        sll.sll_addr[..6].copy_from_slice(&dest.octets());

        let rc = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(TransportError::SendFailed(
                io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let rc = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    Err(TransportError::Timeout)
                }
                _ => Err(TransportError::ReadFailed(err.to_string())),
            };
        }
        Ok(rc as usize)
    }

    fn set_read_deadline(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        // A zeroed timeval disables the deadline, so a nonzero deadline
        // must round up to at least one microsecond.
        let tv = match timeout {
            Some(t) => libc::timeval {
                tv_sec: t.as_secs() as libc::time_t,
                tv_usec: t.subsec_micros().max(u32::from(t.as_secs() == 0)) as libc::suseconds_t,
            },
            None => libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(TransportError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}
