//! The address-space proxies: request dispatch and the five read/write
//! handler pairs.
//!
//! Every accepted request is answered with exactly one response. Request
//! validation failures (bad width, short payload, oversized length) and
//! mapping failures are reported in the response status with an empty
//! payload; only a dying transport propagates as an error and tears the
//! session down.

use super::Session;
use crate::map::MemType;
use crate::mmio::{self, AccessWidth};
use crate::proto::{MAX_PAYLOAD_SIZE, ReceivedPdu, Tag, XferRequest};
use crate::{Error, STATUS_SUCCESS};
use core::{ptr, slice};
use embedded_io::{Read, ReadReady, Write};

impl<S: Read + Write + ReadReady> Session<S> {
    /// Dispatches one received request.
    pub(super) fn handle(&mut self, pdu: &ReceivedPdu<'_>) -> Result<(), Error> {
        let Some(tag) = Tag::from_raw(pdu.header.tag) else {
            // The receiver only hands out known request tags.
            return Ok(());
        };
        match tag {
            Tag::ScpMemReadReq => self.scp_mem_xfer(pdu, false),
            Tag::ScpMemWriteReq => self.scp_mem_xfer(pdu, true),
            Tag::ScpMmioReadReq => self.scp_mmio_xfer(pdu, false),
            Tag::ScpMmioWriteReq => self.scp_mmio_xfer(pdu, true),
            Tag::SmnReadReq => self.smn_xfer(pdu, false),
            Tag::SmnWriteReq => self.smn_xfer(pdu, true),
            Tag::X86MemReadReq => self.x86_mem_xfer(pdu, false),
            Tag::X86MemWriteReq => self.x86_mem_xfer(pdu, true),
            Tag::X86MmioReadReq => self.x86_mmio_xfer(pdu, false),
            Tag::X86MmioWriteReq => self.x86_mmio_xfer(pdu, true),
            // A connect while connected is dropped like any other
            // out-of-place PDU.
            _ => Ok(()),
        }
    }

    /// Response carrying only a status code.
    fn respond_empty(&mut self, tag: Tag, status: i32) -> Result<(), Error> {
        let ts = self.timer.millis();
        self.tx.send(&mut self.port, ts, status, 0, tag, &[])
    }

    /// Bulk copy to or from local SRAM. No width constraint.
    fn scp_mem_xfer(&mut self, pdu: &ReceivedPdu<'_>, write: bool) -> Result<(), Error> {
        let resp = if write {
            Tag::ScpMemWriteResp
        } else {
            Tag::ScpMemReadResp
        };
        let Some((req, data, len)) = parse_bulk(pdu.payload, write) else {
            return self.respond_empty(resp, Error::InvalidParameter.status_code());
        };

        let addr = req.addr as usize;
        if write {
            // Safety: the peer addresses local SRAM it learned about from
            // the connect response; the stub is its debug proxy.
            unsafe { ptr::copy_nonoverlapping(data.as_ptr(), addr as *mut u8, len) };
            self.respond_empty(resp, STATUS_SUCCESS)
        } else {
            // Safety: see above.
            let src = unsafe { slice::from_raw_parts(addr as *const u8, len) };
            let ts = self.timer.millis();
            self.tx
                .send(&mut self.port, ts, STATUS_SUCCESS, 0, resp, src)
        }
    }

    /// Width-constrained access to local MMIO.
    fn scp_mmio_xfer(&mut self, pdu: &ReceivedPdu<'_>, write: bool) -> Result<(), Error> {
        let resp = if write {
            Tag::ScpMmioWriteResp
        } else {
            Tag::ScpMmioReadResp
        };
        let Some((req, width, data)) = parse_width(pdu.payload, write) else {
            return self.respond_empty(resp, Error::InvalidParameter.status_code());
        };

        let addr = req.addr as usize;
        let mut buf = [0u8; 8];
        if write {
            buf[..width.size()].copy_from_slice(&data[..width.size()]);
            // Safety: single access of the exact width the request named.
            unsafe { mmio::write(addr, width, &buf) };
            self.respond_empty(resp, STATUS_SUCCESS)
        } else {
            // Safety: see above.
            unsafe { mmio::read(addr, width, &mut buf) };
            let ts = self.timer.millis();
            self.tx.send(
                &mut self.port,
                ts,
                STATUS_SUCCESS,
                0,
                resp,
                &buf[..width.size()],
            )
        }
    }

    /// Width-constrained access to the SMN space through a transient
    /// window.
    fn smn_xfer(&mut self, pdu: &ReceivedPdu<'_>, write: bool) -> Result<(), Error> {
        let resp = if write {
            Tag::SmnWriteResp
        } else {
            Tag::SmnReadResp
        };
        let Some((req, width, data)) = parse_width(pdu.payload, write) else {
            return self.respond_empty(resp, Error::InvalidParameter.status_code());
        };
        if req.addr > u64::from(u32::MAX) {
            return self.respond_empty(resp, Error::InvalidParameter.status_code());
        }

        let outcome = match self.smn.map(req.addr as u32) {
            Ok(mapping) => {
                let mut buf = [0u8; 8];
                if write {
                    buf[..width.size()].copy_from_slice(&data[..width.size()]);
                    // Safety: single width-exact access inside the live
                    // window.
                    unsafe { mmio::write(mapping.addr(), width, &buf) };
                } else {
                    // Safety: see above.
                    unsafe { mmio::read(mapping.addr(), width, &mut buf) };
                }
                let payload = if write { &[][..] } else { &buf[..width.size()] };
                let ts = self.timer.millis();
                let result = self
                    .tx
                    .send(&mut self.port, ts, STATUS_SUCCESS, 0, resp, payload);
                drop(mapping);
                Ok(result)
            }
            // The peer gets to see the precise mapping error.
            Err(e) => Err(e.status_code()),
        };
        match outcome {
            Ok(result) => result,
            Err(code) => self.respond_empty(resp, code),
        }
    }

    /// Bulk copy to or from x86 memory through a transient window.
    fn x86_mem_xfer(&mut self, pdu: &ReceivedPdu<'_>, write: bool) -> Result<(), Error> {
        let resp = if write {
            Tag::X86MemWriteResp
        } else {
            Tag::X86MemReadResp
        };
        let Some((req, data, len)) = parse_bulk(pdu.payload, write) else {
            return self.respond_empty(resp, Error::InvalidParameter.status_code());
        };

        let outcome = match self.x86.map(req.addr, MemType::Normal) {
            Ok(mapping) => {
                let result = if write {
                    // Safety: the transfer stays inside the 64 MiB window
                    // the slot exposes.
                    unsafe {
                        ptr::copy_nonoverlapping(data.as_ptr(), mapping.addr() as *mut u8, len)
                    };
                    let ts = self.timer.millis();
                    self.tx.send(&mut self.port, ts, STATUS_SUCCESS, 0, resp, &[])
                } else {
                    // Safety: see above; the response is served straight
                    // out of the window.
                    let src = unsafe { slice::from_raw_parts(mapping.addr() as *const u8, len) };
                    let ts = self.timer.millis();
                    self.tx.send(&mut self.port, ts, STATUS_SUCCESS, 0, resp, src)
                };
                drop(mapping);
                Ok(result)
            }
            Err(e) => Err(e.status_code()),
        };
        match outcome {
            Ok(result) => result,
            Err(code) => self.respond_empty(resp, code),
        }
    }

    /// Width-constrained access to x86 MMIO through a transient window.
    ///
    /// Maps with the normal memory type, not [MemType::Mmio]; devices
    /// sensitive to the distinction do not get MMIO semantics here.
    fn x86_mmio_xfer(&mut self, pdu: &ReceivedPdu<'_>, write: bool) -> Result<(), Error> {
        let resp = if write {
            Tag::X86MmioWriteResp
        } else {
            Tag::X86MmioReadResp
        };
        let Some((req, width, data)) = parse_width(pdu.payload, write) else {
            return self.respond_empty(resp, Error::InvalidParameter.status_code());
        };

        let outcome = match self.x86.map(req.addr, MemType::Normal) {
            Ok(mapping) => {
                let mut buf = [0u8; 8];
                if write {
                    buf[..width.size()].copy_from_slice(&data[..width.size()]);
                    // Safety: single width-exact access inside the live
                    // window.
                    unsafe { mmio::write(mapping.addr(), width, &buf) };
                } else {
                    // Safety: see above.
                    unsafe { mmio::read(mapping.addr(), width, &mut buf) };
                }
                let payload = if write { &[][..] } else { &buf[..width.size()] };
                let ts = self.timer.millis();
                let result = self
                    .tx
                    .send(&mut self.port, ts, STATUS_SUCCESS, 0, resp, payload);
                drop(mapping);
                Ok(result)
            }
            Err(e) => Err(e.status_code()),
        };
        match outcome {
            Ok(result) => result,
            Err(code) => self.respond_empty(resp, code),
        }
    }
}

/// Validates a bulk transfer request: the length must fit a response
/// payload, and a write must carry at least as many data bytes as it
/// claims.
fn parse_bulk(payload: &[u8], write: bool) -> Option<(XferRequest, &[u8], usize)> {
    let (req, data) = XferRequest::parse(payload)?;
    let len = req.len as usize;
    if len > MAX_PAYLOAD_SIZE {
        return None;
    }
    if write && data.len() < len {
        return None;
    }
    Some((req, data, len))
}

/// Validates a width-constrained transfer request: the length must be a
/// hardware access width, and a write must carry the data bytes.
fn parse_width(payload: &[u8], write: bool) -> Option<(XferRequest, AccessWidth, &[u8])> {
    let (req, data) = XferRequest::parse(payload)?;
    let width = AccessWidth::from_size(req.len).ok()?;
    if write && data.len() < width.size() {
        return None;
    }
    Some((req, width, data))
}
