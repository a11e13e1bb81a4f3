//! Session control: beacon until a peer connects, then dispatch requests
//! forever.

mod xfer;

use core::convert::Infallible;
use core::fmt::Write as _;

use crate::log::LogBuffer;
use crate::map::{MemType, SmnMapper, X86Mapper};
use crate::proto::recv::INDEFINITE_WAIT;
use crate::proto::{
    Beacon, ConnectResponse, MAX_PDU_SIZE, PduReceiver, PduSender, ReceivedPdu, Tag,
};
use crate::timer::Timekeeper;
use crate::uart::{Config, Uart16550, X86UartIo};
use crate::{Error, STATUS_SUCCESS};
use embedded_io::{Read, ReadReady, Write};

/// x86 physical address of the SoC's legacy UART.
pub const X86_UART_PHYS: u64 = 0xFFFD_FC00_03F8;
/// Size of the scratch area advertised to the peer for staging bulk
/// transfers.
pub const SCRATCH_SIZE: usize = 16 * 1024;
/// Beacon period while unconnected.
pub const BEACON_INTERVAL_MS: u32 = 1000;
/// Number of compute dies the stub reports.
pub const UNIT_COUNT: u16 = 1;

/// Everything of the stub except the receive state machine.
///
/// Split out so a received PDU, which borrows the receiver's buffer, can be
/// handled while the rest of the session mutates.
struct Session<S> {
    port: S,
    timer: Timekeeper,
    x86: X86Mapper,
    smn: SmnMapper,
    tx: PduSender,
    log: LogBuffer,
    connected: bool,
    beacons_sent: u32,
    scratch: [u8; SCRATCH_SIZE],
}

/// The serial debug stub.
pub struct SerialStub<S> {
    session: Session<S>,
    rx: PduReceiver,
}

/// Cold boot: maps the UART through the x86 window, configures it for
/// 115200 8N1, starts the timekeeper and assembles the stub.
///
/// The UART mapping is held for the stub's lifetime and deliberately never
/// released.
pub fn bring_up() -> Result<SerialStub<Uart16550<X86UartIo>>, Error> {
    let mut x86 = X86Mapper::new();
    let smn = SmnMapper::new();
    let uart_base = x86.map_raw(X86_UART_PHYS, MemType::Mmio)?;
    // Safety: the window stays mapped, see above.
    let io = unsafe { X86UartIo::new(uart_base) };
    let port = Uart16550::new(io, Config::default());
    let timer = Timekeeper::new();
    Ok(SerialStub::new(port, timer, x86, smn))
}

impl<S: Read + Write + ReadReady> SerialStub<S> {
    /// Assembles a stub from its collaborators.
    pub fn new(port: S, timer: Timekeeper, x86: X86Mapper, smn: SmnMapper) -> Self {
        SerialStub {
            session: Session {
                port,
                timer,
                x86,
                smn,
                tx: PduSender::new(),
                log: LogBuffer::new(),
                connected: false,
                beacons_sent: 0,
                scratch: [0; SCRATCH_SIZE],
            },
            rx: PduReceiver::new(UNIT_COUNT),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.connected
    }

    /// The mainloop: beacon until a peer connects, then serve requests
    /// until the transport dies.
    pub fn run(&mut self) -> Result<Infallible, Error> {
        let _ = writeln!(self.session.log, "mainloop: entering");
        self.session.pump_log();

        while !self.session.connected {
            self.session.send_beacon()?;
            self.wait_for_connect(BEACON_INTERVAL_MS)?;
        }

        let _ = writeln!(self.session.log, "mainloop: connection established");
        self.session.pump_log();

        loop {
            self.service(INDEFINITE_WAIT)?;
        }
    }

    /// One bounded receive-and-dispatch step after connect.
    ///
    /// Returns without error when the bound elapses first, so a caller can
    /// interleave the stub with other work; partial receive state carries
    /// over to the next call.
    pub fn service(&mut self, timeout_ms: u32) -> Result<(), Error> {
        match self
            .rx
            .recv(&mut self.session.port, &mut self.session.timer, timeout_ms)
        {
            Ok(pdu) => self.session.handle(&pdu)?,
            Err(Error::TryAgain) => return Ok(()),
            Err(e) => return Err(e),
        }
        self.session.pump_log();
        Ok(())
    }

    /// Waits up to `timeout_ms` for the connect request.
    ///
    /// Anything else arriving pre-connect is dropped and the beacon phase
    /// continues.
    fn wait_for_connect(&mut self, timeout_ms: u32) -> Result<(), Error> {
        match self
            .rx
            .recv(&mut self.session.port, &mut self.session.timer, timeout_ms)
        {
            Ok(pdu) => self.session.accept_connect(&pdu),
            Err(Error::TryAgain) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl<S: Read + Write + ReadReady> Session<S> {
    fn send_beacon(&mut self) -> Result<(), Error> {
        self.beacons_sent += 1;
        let beacon = Beacon {
            beacons_sent: self.beacons_sent,
        };
        let ts = self.timer.millis();
        self.tx.send(
            &mut self.port,
            ts,
            STATUS_SUCCESS,
            0,
            Tag::Beacon,
            &beacon.to_bytes(),
        )
    }

    fn accept_connect(&mut self, pdu: &ReceivedPdu<'_>) -> Result<(), Error> {
        if pdu.header.tag != Tag::ConnectReq.raw() {
            return Ok(());
        }

        let response = ConnectResponse {
            max_pdu_size: MAX_PDU_SIZE as u32,
            scratch_size: SCRATCH_SIZE as u32,
            scratch_addr: self.scratch.as_ptr() as usize as u32,
            sys_sockets: 1,
            ccds_per_socket: 1,
        };

        // Restart the outgoing stream so the connect response carries
        // counter 1.
        self.tx.reset_counter();
        let ts = self.timer.millis();
        self.tx.send(
            &mut self.port,
            ts,
            STATUS_SUCCESS,
            0,
            Tag::ConnectResp,
            &response.to_bytes(),
        )?;
        self.connected = true;
        Ok(())
    }

    /// Forwards buffered log bytes as a notification. Log loss beats
    /// protocol deadlock, so the send result is ignored.
    fn pump_log(&mut self) {
        if self.log.is_empty() {
            return;
        }
        let ts = self.timer.millis();
        let _ = self.tx.send(
            &mut self.port,
            ts,
            STATUS_SUCCESS,
            0,
            Tag::LogMsg,
            self.log.as_bytes(),
        );
        self.log.clear();
    }
}
