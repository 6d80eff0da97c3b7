//! Linux raw-socket packet capture and injection (§4.8), grounded on the
//! teacher's `phy::sys`/`TunTapInterface` split: a thin `PacketIo` trait
//! (the analog of `phy::Device`) and one concrete `AF_PACKET` backend.
//!
//! Differs from the teacher's token-based `Device` trait because this
//! crate's event loop is fd-readiness driven (§4.1), not poll-driven: a
//! `PacketIo` is just "give me a raw socket fd, let me recv/send frames on
//! it", with the BPF filter and promiscuous-mode setup folded into
//! construction.

use std::io;
use std::mem;
use std::os::unix::io::RawFd;

use crate::error::{Error, Result};

/// Maximum UDP datagram size, and so the largest frame this crate ever
/// needs to capture whole (§4.8 "max snap-length equal to the maximum UDP
/// datagram").
pub const SNAPLEN: usize = 65_535;

/// Minimal capture/injection surface an `Interface` needs. Implemented by
/// `LinuxRawSocket`; kept as a trait so tests can substitute an in-memory
/// fake without opening a real socket.
pub trait PacketIo {
    fn as_raw_fd(&self) -> RawFd;
    /// Reads one frame into `buffer`, returning the number of bytes
    /// written. `buffer` must be at least `SNAPLEN` bytes.
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize>;
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

/// A promiscuous-mode `AF_PACKET`/`SOCK_RAW` socket bound to one interface,
/// with a BPF classic filter installed so only the frames this subsystem
/// cares about (link-layer multicast destined for the tracked protocol)
/// reach user space.
#[derive(Debug)]
pub struct LinuxRawSocket {
    fd: RawFd,
    ifindex: libc::c_int,
}

impl LinuxRawSocket {
    /// Opens a raw socket on `ifname`, puts the interface into promiscuous
    /// mode, and installs `filter` (a classic BPF program built by the
    /// caller — e.g. "ether proto ARP or IP proto IGMP", compiled ahead of
    /// time since this crate has no libpcap dependency).
    pub fn new(ifname: &str, filter: &[libc::sock_filter]) -> io::Result<LinuxRawSocket> {
        // SAFETY: a plain `socket(2)` call with no pointers involved.
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, eth_p_all()) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let ifindex = interface_index(fd, ifname)?;

        let mut sockaddr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sockaddr.sll_family = libc::AF_PACKET as u16;
        sockaddr.sll_protocol = eth_p_all() as u16;
        sockaddr.sll_ifindex = ifindex;

        // SAFETY: `sockaddr` is a validly initialized `sockaddr_ll`, sized
        // and cast per the usual raw-socket `bind(2)` convention.
        let rc = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        if !filter.is_empty() {
            attach_filter(fd, filter)?;
        }
        set_promiscuous(fd, ifindex, true)?;

        Ok(LinuxRawSocket { fd, ifindex })
    }
}

impl PacketIo for LinuxRawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        // SAFETY: `buffer` is a valid, exclusively-borrowed slice of at
        // least `buffer.len()` bytes; `recv(2)` writes at most that many.
        let n = unsafe {
            libc::recv(
                self.fd,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
                0,
            )
        };
        if n < 0 {
            return Err(Error::Malformed);
        }
        Ok(n as usize)
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        // SAFETY: `frame` is a valid, immutably-borrowed slice of
        // `frame.len()` bytes; `send(2)` reads at most that many.
        let n = unsafe {
            libc::send(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if n < 0 || n as usize != frame.len() {
            return Err(Error::Malformed);
        }
        Ok(())
    }
}

impl Drop for LinuxRawSocket {
    fn drop(&mut self) {
        let _ = set_promiscuous(self.fd, self.ifindex, false);
        // SAFETY: `self.fd` is a valid fd owned exclusively by this value.
        unsafe {
            libc::close(self.fd);
        }
    }
}

fn eth_p_all() -> libc::c_int {
    // ETH_P_ALL, network-endian as `socket(2)` expects for AF_PACKET.
    (libc::ETH_P_ALL as u16).to_be() as libc::c_int
}

fn interface_index(fd: RawFd, ifname: &str) -> io::Result<libc::c_int> {
    let mut ifreq: libc::ifreq = unsafe { mem::zeroed() };
    if ifname.len() >= ifreq.ifr_name.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }
    for (dst, src) in ifreq.ifr_name.iter_mut().zip(ifname.bytes()) {
        *dst = src as libc::c_char;
    }
    // SAFETY: `ifreq` is a valid, fully-initialized `ifreq`; `SIOCGIFINDEX`
    // only reads `ifr_name` and writes `ifr_ifru.ifru_ivalue`.
    let rc = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifreq) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { ifreq.ifr_ifru.ifru_ivalue })
}

fn set_promiscuous(fd: RawFd, ifindex: libc::c_int, enable: bool) -> io::Result<()> {
    let mut mreq: libc::packet_mreq = unsafe { mem::zeroed() };
    mreq.mr_ifindex = ifindex;
    mreq.mr_type = libc::PACKET_MR_PROMISC as u16;

    let opt = if enable {
        libc::PACKET_ADD_MEMBERSHIP
    } else {
        libc::PACKET_DROP_MEMBERSHIP
    };
    // SAFETY: `mreq` is fully initialized and sized correctly for
    // `setsockopt(2)`'s `SOL_PACKET` level.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            opt,
            &mreq as *const libc::packet_mreq as *const libc::c_void,
            mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn attach_filter(fd: RawFd, filter: &[libc::sock_filter]) -> io::Result<()> {
    let prog = libc::sock_fprog {
        len: filter.len() as u16,
        filter: filter.as_ptr() as *mut libc::sock_filter,
    };
    // SAFETY: `prog` borrows `filter` for the duration of this call only;
    // the kernel copies the program into its own memory during
    // `setsockopt(2)`.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &prog as *const libc::sock_fprog as *const libc::c_void,
            mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// An in-memory `PacketIo` fake for tests: a queue of frames to return from
/// `recv` and a record of everything passed to `send`.
#[cfg(test)]
pub struct FakePacketIo {
    pub inbound: std::collections::VecDeque<Vec<u8>>,
    pub outbound: Vec<Vec<u8>>,
}

#[cfg(test)]
impl FakePacketIo {
    pub fn new() -> FakePacketIo {
        FakePacketIo {
            inbound: std::collections::VecDeque::new(),
            outbound: Vec::new(),
        }
    }
}

#[cfg(test)]
impl PacketIo for FakePacketIo {
    fn as_raw_fd(&self) -> RawFd {
        -1
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.inbound.pop_front() {
            Some(frame) => {
                let n = frame.len().min(buffer.len());
                buffer[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.outbound.push(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_packet_io_round_trips_frames() {
        let mut io = FakePacketIo::new();
        io.inbound.push_back(vec![1, 2, 3]);
        let mut buf = [0u8; SNAPLEN];
        let n = io.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        io.send(&[4, 5]).unwrap();
        assert_eq!(io.outbound, vec![vec![4, 5]]);
    }
}
