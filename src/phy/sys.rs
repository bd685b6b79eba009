#![allow(unsafe_code)]

use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::wire::ETHERNET_HEADER_LEN;

use super::OutputPort;

fn check(res: libc::c_int) -> io::Result<libc::c_int> {
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res)
    }
}

fn check_len(res: libc::ssize_t) -> io::Result<usize> {
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res as usize)
    }
}

/// A zeroed ifreq carrying `name`, ready for ioctl calls.
fn named_ifreq(name: &str) -> io::Result<libc::ifreq> {
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    // One slot stays zero: the name must remain NUL-terminated.
    if name.len() >= ifr.ifr_name.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }
    for (slot, byte) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
        *slot = *byte as libc::c_char;
    }
    Ok(ifr)
}

/// A Linux TAP device carrying Ethernet frames.
///
/// Reads and writes are non-blocking; a frame the kernel has no room for
/// is dropped, which is what a congested wire would do anyway.
#[derive(Debug)]
pub struct TunTapPort {
    fd: OwnedFd,
    mtu: usize,
}

impl AsRawFd for TunTapPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl TunTapPort {
    /// Attach to the TAP interface called `name`, creating it on demand.
    ///
    /// Creating a device needs CAP_NET_ADMIN (or root); attaching to a
    /// persistent device owned by the current user does not.
    pub fn new(name: &str) -> io::Result<TunTapPort> {
        let fd = check(unsafe {
            libc::open(c"/dev/net/tun".as_ptr(), libc::O_RDWR | libc::O_NONBLOCK)
        })?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut ifr = named_ifreq(name)?;
        unsafe {
            ifr.ifr_ifru.ifru_flags = (libc::IFF_TAP | libc::IFF_NO_PI) as libc::c_short;
        }
        check(unsafe { libc::ioctl(fd.as_raw_fd(), libc::TUNSETIFF as _, &mut ifr) })?;

        let mtu = query_mtu(&mut ifr)?;
        Ok(TunTapPort { fd, mtu })
    }

    /// The largest frame the device will carry.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Read one frame into `buffer`, without blocking. Returns
    /// `ErrorKind::WouldBlock` when no frame is waiting.
    pub fn recv(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        check_len(unsafe {
            libc::read(self.fd.as_raw_fd(), buffer.as_mut_ptr().cast(), buffer.len())
        })
    }

    /// Write one frame to the device.
    pub fn send(&mut self, buffer: &[u8]) -> io::Result<usize> {
        check_len(unsafe {
            libc::write(self.fd.as_raw_fd(), buffer.as_ptr().cast(), buffer.len())
        })
    }
}

/// Ask the kernel for the device's IP MTU. TAP ioctls answer on any
/// AF_INET socket, not on the tun fd itself; the port carries whole
/// Ethernet frames, so the header goes on top.
fn query_mtu(ifr: &mut libc::ifreq) -> io::Result<usize> {
    let probe = check(unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) })?;
    let probe = unsafe { OwnedFd::from_raw_fd(probe) };
    check(unsafe { libc::ioctl(probe.as_raw_fd(), libc::SIOCGIFMTU as _, &mut *ifr) })?;
    let ip_mtu = unsafe { ifr.ifr_ifru.ifru_mtu } as usize;
    Ok(ip_mtu + ETHERNET_HEADER_LEN)
}

impl OutputPort for TunTapPort {
    fn transmit(&mut self, frame: &[u8]) {
        match self.send(frame) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                net_debug!("phy: tx dropped, device busy")
            }
            Err(err) => net_debug!("phy: tx failed: {}", err),
        }
    }
}
