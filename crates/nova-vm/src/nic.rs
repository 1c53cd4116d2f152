//! Network controller (NIC).
//!
//! Four TCP connection slots. Each connected slot runs one background
//! reader thread that frames incoming bytes (single length-byte prefix,
//! 0 meaning 256) into a bounded lock-free queue; overflow drops the
//! oldest message and sets the slot's sticky error flag. Connection state
//! crosses threads as atomics, and a per-slot cancellation token plus a
//! 500 ms read timeout bound shutdown.
//!
//! # Registers ($A100-$A13F)
//!
//! | Addr  | Register        |
//! |-------|-----------------|
//! | $A100 | Cmd (`Connect=1, Disconnect=2, Send=3, Recv=4, Listen=5, Accept=6, Reset=7`) |
//! | $A101 | Slot select     |
//! | $A102 | Global status (bit 0 AnyData, bit 1 AnyError) |
//! | $A103 | IrqStatus (read-and-clear) |
//! | $A104 | IrqCtl (per-slot enable mask) |
//! | $A105 | Slot status     |
//! | $A106-$A107 | Buffer address (CPU RAM) |
//! | $A108 | Length (0 = 256) |
//! | $A109-$A10A | TCP port    |
//! | $A10B-$A10E | IPv4 address (Connect) |
//! | $A10F | ErrCode         |

#![allow(clippy::cast_possible_truncation)]

use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use log::debug;
use nova_core::ErrCode;

pub const NIC_BASE: u16 = 0xA100;
pub const NIC_END: u16 = 0xA13F;

/// Connection slots.
pub const SLOT_COUNT: usize = 4;
/// Receive queue depth per slot.
pub const QUEUE_DEPTH: usize = 16;

/// ROM body start; received payloads may not land past it.
const ROM_BASE: usize = 0xC000;

/// Reader poll interval / shutdown bound.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Slot status bits.
pub mod slot_status {
    pub const CONNECTED: u8 = 0x01;
    pub const DATA_READY: u8 = 0x02;
    pub const SEND_READY: u8 = 0x04;
    pub const ERROR: u8 = 0x08;
    pub const REMOTE_CLOSED: u8 = 0x10;
}

/// Command codes.
mod cmd {
    pub const CONNECT: u8 = 1;
    pub const DISCONNECT: u8 = 2;
    pub const SEND: u8 = 3;
    pub const RECV: u8 = 4;
    pub const LISTEN: u8 = 5;
    pub const ACCEPT: u8 = 6;
    pub const RESET: u8 = 7;
}

/// One connection slot.
struct Slot {
    connected: Arc<AtomicBool>,
    remote_closed: Arc<AtomicBool>,
    error: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    rx: Arc<ArrayQueue<Vec<u8>>>,
    pending_accept: Arc<Mutex<Option<TcpStream>>>,
    stream: Option<TcpStream>,
    reader: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            remote_closed: Arc::new(AtomicBool::new(false)),
            error: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            rx: Arc::new(ArrayQueue::new(QUEUE_DEPTH)),
            pending_accept: Arc::new(Mutex::new(None)),
            stream: None,
            reader: None,
            listener: None,
        }
    }

    fn status(&self) -> u8 {
        let mut bits = slot_status::SEND_READY;
        if self.connected.load(Ordering::Acquire) {
            bits |= slot_status::CONNECTED;
        }
        let pending = self
            .pending_accept
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        if !self.rx.is_empty() || pending {
            bits |= slot_status::DATA_READY;
        }
        if self.error.load(Ordering::Acquire) {
            bits |= slot_status::ERROR;
        }
        if self.remote_closed.load(Ordering::Acquire) {
            bits |= slot_status::REMOTE_CLOSED;
        }
        bits
    }

    /// Stop workers and drop the connection. Errors stay sticky; `Reset`
    /// clears them separately.
    fn teardown(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
        self.cancel.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        if let Ok(mut guard) = self.pending_accept.lock() {
            *guard = None;
        }
    }

    fn reset(&mut self) {
        self.teardown();
        while self.rx.pop().is_some() {}
        self.error.store(false, Ordering::Release);
        self.remote_closed.store(false, Ordering::Release);
    }
}

/// The network controller.
pub struct Nic {
    slots: Vec<Slot>,
    irq_mask: u8,
    /// Per-slot pending bits, set by reader threads.
    irq_pending: Arc<AtomicU8>,
    slot_sel: u8,
    buf_addr: u16,
    length: u8,
    port: u16,
    ip: [u8; 4],
    err: ErrCode,
}

impl Nic {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| Slot::new()).collect(),
            irq_mask: 0,
            irq_pending: Arc::new(AtomicU8::new(0)),
            slot_sel: 0,
            buf_addr: 0,
            length: 0,
            port: 0,
            ip: [127, 0, 0, 1],
            err: ErrCode::None,
        }
    }

    #[must_use]
    pub fn owns(addr: u16) -> bool {
        (NIC_BASE..=NIC_END).contains(&addr)
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0xA101 => self.slot_sel,
            0xA102 => {
                let mut bits = 0;
                if self.slots.iter().any(|s| s.status() & slot_status::DATA_READY != 0) {
                    bits |= 0x01;
                }
                if self.slots.iter().any(|s| s.status() & slot_status::ERROR != 0) {
                    bits |= 0x02;
                }
                bits
            }
            0xA103 => self.irq_pending.swap(0, Ordering::AcqRel),
            0xA104 => self.irq_mask,
            0xA105 => self.slots[self.slot()].status(),
            0xA106 => self.buf_addr as u8,
            0xA107 => (self.buf_addr >> 8) as u8,
            0xA108 => self.length,
            0xA109 => self.port as u8,
            0xA10A => (self.port >> 8) as u8,
            0xA10B..=0xA10E => self.ip[(addr - 0xA10B) as usize],
            0xA10F => self.err.as_u8(),
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8, ram: &mut [u8]) {
        match addr {
            0xA100 => self.execute(value, ram),
            0xA101 => self.slot_sel = value % SLOT_COUNT as u8,
            0xA104 => self.irq_mask = value & 0x0F,
            0xA106 => self.buf_addr = (self.buf_addr & 0xFF00) | u16::from(value),
            0xA107 => self.buf_addr = (self.buf_addr & 0x00FF) | (u16::from(value) << 8),
            0xA108 => self.length = value,
            0xA109 => self.port = (self.port & 0xFF00) | u16::from(value),
            0xA10A => self.port = (self.port & 0x00FF) | (u16::from(value) << 8),
            0xA10B..=0xA10E => self.ip[(addr - 0xA10B) as usize] = value,
            _ => {}
        }
    }

    fn slot(&self) -> usize {
        self.slot_sel as usize % SLOT_COUNT
    }

    /// Wire length from the length register (0 = 256).
    fn wire_len(&self) -> usize {
        if self.length == 0 { 256 } else { self.length as usize }
    }

    fn execute(&mut self, code: u8, ram: &mut [u8]) {
        self.err = ErrCode::None;
        let result = match code {
            cmd::CONNECT => self.connect(),
            cmd::DISCONNECT => {
                let slot = self.slot();
                self.slots[slot].teardown();
                Ok(())
            }
            cmd::SEND => self.send(ram),
            cmd::RECV => self.recv(ram),
            cmd::LISTEN => self.listen(),
            cmd::ACCEPT => self.accept(),
            cmd::RESET => {
                let slot = self.slot();
                self.slots[slot].reset();
                Ok(())
            }
            _ => Err(ErrCode::BadCmd),
        };
        if let Err(err) = result {
            self.err = err;
        }
    }

    fn connect(&mut self) -> Result<(), ErrCode> {
        let idx = self.slot();
        if self.slots[idx].connected.load(Ordering::Acquire) {
            return Err(ErrCode::BadCmd);
        }
        let addr = SocketAddr::from((
            Ipv4Addr::new(self.ip[0], self.ip[1], self.ip[2], self.ip[3]),
            self.port,
        ));
        let stream =
            TcpStream::connect_timeout(&addr, Duration::from_millis(500)).map_err(|e| {
                debug!("slot {idx}: connect to {addr} failed: {e}");
                ErrCode::Io
            })?;
        self.attach_stream(idx, stream);
        Ok(())
    }

    fn listen(&mut self) -> Result<(), ErrCode> {
        let idx = self.slot();
        let slot = &mut self.slots[idx];
        if slot.connected.load(Ordering::Acquire) || slot.listener.is_some() {
            return Err(ErrCode::BadCmd);
        }
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, self.port)).map_err(|_| ErrCode::Io)?;
        listener.set_nonblocking(true).map_err(|_| ErrCode::Io)?;

        let cancel = Arc::clone(&slot.cancel);
        let pending = Arc::clone(&slot.pending_accept);
        let irq_pending = Arc::clone(&self.irq_pending);
        let bit = 1u8 << idx;
        slot.listener = Some(std::thread::spawn(move || {
            // Poll for one connection, cooperatively cancellable
            loop {
                if cancel.load(Ordering::Acquire) {
                    return;
                }
                match listener.accept() {
                    Ok((stream, _)) => {
                        if let Ok(mut guard) = pending.lock() {
                            *guard = Some(stream);
                        }
                        irq_pending.fetch_or(bit, Ordering::AcqRel);
                        return;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    Err(_) => return,
                }
            }
        }));
        Ok(())
    }

    fn accept(&mut self) -> Result<(), ErrCode> {
        let idx = self.slot();
        let taken = self.slots[idx]
            .pending_accept
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        let Some(stream) = taken else {
            return Err(ErrCode::NotFound);
        };
        if let Some(listener) = self.slots[idx].listener.take() {
            let _ = listener.join();
        }
        self.attach_stream(idx, stream);
        Ok(())
    }

    /// Mark the slot connected and start its framed-message reader.
    fn attach_stream(&mut self, idx: usize, stream: TcpStream) {
        let slot = &mut self.slots[idx];
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
        let _ = stream.set_nodelay(true);

        slot.connected.store(true, Ordering::Release);
        slot.remote_closed.store(false, Ordering::Release);
        slot.cancel.store(false, Ordering::Release);

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => {
                slot.error.store(true, Ordering::Release);
                return;
            }
        };
        slot.stream = Some(stream);

        let connected = Arc::clone(&slot.connected);
        let remote_closed = Arc::clone(&slot.remote_closed);
        let error = Arc::clone(&slot.error);
        let cancel = Arc::clone(&slot.cancel);
        let rx = Arc::clone(&slot.rx);
        let irq_pending = Arc::clone(&self.irq_pending);
        let bit = 1u8 << idx;

        slot.reader = Some(std::thread::spawn(move || {
            let mut stream = reader_stream;
            loop {
                if cancel.load(Ordering::Acquire) {
                    return;
                }
                let mut header = [0u8; 1];
                match read_full(&mut stream, &mut header, &cancel) {
                    ReadOutcome::Done => {}
                    ReadOutcome::Cancelled => return,
                    ReadOutcome::Closed => {
                        remote_closed.store(true, Ordering::Release);
                        connected.store(false, Ordering::Release);
                        return;
                    }
                }
                let len = if header[0] == 0 { 256 } else { header[0] as usize };
                let mut payload = vec![0u8; len];
                match read_full(&mut stream, &mut payload, &cancel) {
                    ReadOutcome::Done => {}
                    ReadOutcome::Cancelled => return,
                    ReadOutcome::Closed => {
                        remote_closed.store(true, Ordering::Release);
                        connected.store(false, Ordering::Release);
                        return;
                    }
                }
                // Bounded queue: overflow drops the oldest message and
                // flips the sticky error bit
                if rx.force_push(payload).is_some() {
                    error.store(true, Ordering::Release);
                }
                irq_pending.fetch_or(bit, Ordering::AcqRel);
            }
        }));
    }

    fn send(&mut self, ram: &[u8]) -> Result<(), ErrCode> {
        let idx = self.slot();
        if !self.slots[idx].connected.load(Ordering::Acquire) {
            return Err(ErrCode::Closed);
        }
        let len = self.wire_len();
        let start = self.buf_addr as usize;
        if start + len > ram.len() {
            return Err(ErrCode::Range);
        }

        let mut frame = Vec::with_capacity(len + 1);
        frame.push(if len == 256 { 0 } else { len as u8 });
        frame.extend_from_slice(&ram[start..start + len]);

        let slot = &mut self.slots[idx];
        let Some(stream) = slot.stream.as_mut() else {
            return Err(ErrCode::Closed);
        };
        if stream.write_all(&frame).is_err() {
            slot.error.store(true, Ordering::Release);
            slot.connected.store(false, Ordering::Release);
            return Err(ErrCode::Closed);
        }
        Ok(())
    }

    fn recv(&mut self, ram: &mut [u8]) -> Result<(), ErrCode> {
        let idx = self.slot();
        let Some(payload) = self.slots[idx].rx.pop() else {
            self.length = 0;
            return Ok(());
        };
        let start = self.buf_addr as usize;
        if start + payload.len() > ROM_BASE {
            return Err(ErrCode::Range);
        }
        ram[start..start + payload.len()].copy_from_slice(&payload);
        self.length = if payload.len() == 256 {
            0
        } else {
            payload.len() as u8
        };
        Ok(())
    }

    /// Master IRQ line: any pending bit that is mask-enabled.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending.load(Ordering::Acquire) & self.irq_mask != 0
    }

    /// Reset every slot (global soft reset).
    pub fn reset_all(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
        self.irq_pending.store(0, Ordering::Release);
    }

    /// Stop all worker threads (machine teardown).
    pub fn shutdown(&mut self) {
        for slot in &mut self.slots {
            slot.teardown();
        }
    }
}

impl Default for Nic {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Nic {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum ReadOutcome {
    Done,
    Cancelled,
    Closed,
}

/// Read exactly `buf.len()` bytes, tolerating read timeouts and checking
/// the cancellation token between attempts.
fn read_full(stream: &mut TcpStream, buf: &mut [u8], cancel: &AtomicBool) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        if cancel.load(Ordering::Acquire) {
            return ReadOutcome::Cancelled;
        }
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return ReadOutcome::Closed,
            Ok(n) => filled += n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => return ReadOutcome::Closed,
        }
    }
    ReadOutcome::Done
}
