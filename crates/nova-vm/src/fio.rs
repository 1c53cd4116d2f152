//! File I/O controller.
//!
//! Register-backed commands over a host-provided `FileStore` collaborator.
//! Program files carry a two-byte little-endian load address before the
//! body; raw transfers move the exact byte stream of a memory space. Host
//! I/O failures surface as error codes, never as panics or out-of-band
//! exceptions.
//!
//! # Registers ($B9A0-$B9EF)
//!
//! | Addr  | Register        |
//! |-------|-----------------|
//! | $B9A0 | Cmd (`ProgSave=1, ProgLoad=2, RawSave=3, RawLoad=4, Delete=5`) |
//! | $B9A1 | Status          |
//! | $B9A2 | ErrCode         |
//! | $B9A3-$B9A4 | Name pointer (CPU RAM) |
//! | $B9A5 | Name length     |
//! | $B9A6-$B9A7 | Data address |
//! | $B9A8-$B9AA | Length (24-bit LE; result register for loads) |
//! | $B9AB | Memory space for raw transfers |
//! | $B9AC-$B9AD | Load address (result of `ProgLoad`) |

#![allow(clippy::cast_possible_truncation)]

use std::fs;
use std::io;
use std::path::PathBuf;

use nova_core::{CtrlStatus, ErrCode};

use crate::spaces::{MemSpace, SpaceView};

pub const FIO_BASE: u16 = 0xB9A0;
pub const FIO_END: u16 = 0xB9EF;

/// ROM body start; program loads may not write past it.
const ROM_BASE: usize = 0xC000;

/// Longest accepted file name.
const NAME_MAX: usize = 32;

/// Command codes.
mod cmd {
    pub const PROG_SAVE: u8 = 1;
    pub const PROG_LOAD: u8 = 2;
    pub const RAW_SAVE: u8 = 3;
    pub const RAW_LOAD: u8 = 4;
    pub const DELETE: u8 = 5;
}

/// Host-side storage collaborator.
///
/// The controller translates `io::Error` into its error-code register; a
/// missing file maps to `NotFound`, everything else to `Io`.
pub trait FileStore: Send {
    fn save(&mut self, name: &str, bytes: &[u8]) -> io::Result<()>;
    fn load(&mut self, name: &str) -> io::Result<Vec<u8>>;
    fn delete(&mut self, name: &str) -> io::Result<()>;
}

/// Directory-backed store.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl FileStore for DirStore {
    fn save(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(name), bytes)
    }

    fn load(&mut self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(name))
    }

    fn delete(&mut self, name: &str) -> io::Result<()> {
        fs::remove_file(self.root.join(name))
    }
}

/// The file I/O controller.
pub struct Fio {
    store: Box<dyn FileStore>,
    status: CtrlStatus,
    err: ErrCode,
    name_ptr: u16,
    name_len: u8,
    data_addr: u16,
    length: u32,
    space: u8,
    load_addr: u16,
    /// Name of the last successfully saved program, for the host hook.
    last_saved: Option<String>,
}

impl Fio {
    #[must_use]
    pub fn new(store: Box<dyn FileStore>) -> Self {
        Self {
            store,
            status: CtrlStatus::Idle,
            err: ErrCode::None,
            name_ptr: 0,
            name_len: 0,
            data_addr: 0,
            length: 0,
            space: 0,
            load_addr: 0,
            last_saved: None,
        }
    }

    #[must_use]
    pub fn owns(addr: u16) -> bool {
        (FIO_BASE..=FIO_END).contains(&addr)
    }

    #[must_use]
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xB9A1 => self.status.as_u8(),
            0xB9A2 => self.err.as_u8(),
            0xB9A3 => self.name_ptr as u8,
            0xB9A4 => (self.name_ptr >> 8) as u8,
            0xB9A5 => self.name_len,
            0xB9A6 => self.data_addr as u8,
            0xB9A7 => (self.data_addr >> 8) as u8,
            0xB9A8 => self.length as u8,
            0xB9A9 => (self.length >> 8) as u8,
            0xB9AA => (self.length >> 16) as u8,
            0xB9AB => self.space,
            0xB9AC => self.load_addr as u8,
            0xB9AD => (self.load_addr >> 8) as u8,
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xB9A3 => self.name_ptr = (self.name_ptr & 0xFF00) | u16::from(value),
            0xB9A4 => self.name_ptr = (self.name_ptr & 0x00FF) | (u16::from(value) << 8),
            0xB9A5 => self.name_len = value,
            0xB9A6 => self.data_addr = (self.data_addr & 0xFF00) | u16::from(value),
            0xB9A7 => self.data_addr = (self.data_addr & 0x00FF) | (u16::from(value) << 8),
            0xB9A8 => self.length = (self.length & 0xFF_FF00) | u32::from(value),
            0xB9A9 => self.length = (self.length & 0xFF_00FF) | (u32::from(value) << 8),
            0xB9AA => self.length = (self.length & 0x00_FFFF) | (u32::from(value) << 16),
            0xB9AB => self.space = value,
            _ => {}
        }
    }

    /// Execute a command against the machine's memory spaces.
    pub fn write_cmd(&mut self, code: u8, view: &mut SpaceView<'_>) {
        self.err = ErrCode::None;
        let result = self.dispatch(code, view);
        match result {
            Ok(()) => self.status = CtrlStatus::Ok,
            Err(err) => {
                self.status = CtrlStatus::Error;
                self.err = err;
            }
        }
    }

    fn dispatch(&mut self, code: u8, view: &mut SpaceView<'_>) -> Result<(), ErrCode> {
        match code {
            cmd::PROG_SAVE => {
                let name = self.read_name(view.ram)?;
                let len = self.length as usize;
                let start = self.data_addr as usize;
                if len == 0 || start + len > view.ram.len() {
                    return Err(ErrCode::Range);
                }
                // Program format: 2-byte LE load address, then the body
                let mut bytes = Vec::with_capacity(len + 2);
                bytes.extend_from_slice(&self.data_addr.to_le_bytes());
                bytes.extend_from_slice(&view.ram[start..start + len]);
                self.store.save(&name, &bytes).map_err(map_io)?;
                self.last_saved = Some(name);
                Ok(())
            }
            cmd::PROG_LOAD => {
                let name = self.read_name(view.ram)?;
                let bytes = self.store.load(&name).map_err(map_io)?;
                if bytes.len() < 2 {
                    return Err(ErrCode::Io);
                }
                let load = u16::from_le_bytes([bytes[0], bytes[1]]);
                let body = &bytes[2..];
                let start = load as usize;
                if start + body.len() > ROM_BASE {
                    return Err(ErrCode::Range);
                }
                view.ram[start..start + body.len()].copy_from_slice(body);
                self.load_addr = load;
                self.length = body.len() as u32;
                Ok(())
            }
            cmd::RAW_SAVE => {
                let name = self.read_name(view.ram)?;
                let space = MemSpace::from_reg(self.space).ok_or(ErrCode::BadSpace)?;
                let len = view.len(space);
                if len == 0 {
                    return Err(ErrCode::BadSpace);
                }
                let mut bytes = Vec::with_capacity(len);
                for offset in 0..len {
                    bytes.push(view.try_read(space, offset).unwrap_or(0));
                }
                self.store.save(&name, &bytes).map_err(map_io)?;
                Ok(())
            }
            cmd::RAW_LOAD => {
                let name = self.read_name(view.ram)?;
                let space = MemSpace::from_reg(self.space).ok_or(ErrCode::BadSpace)?;
                let bytes = self.store.load(&name).map_err(map_io)?;
                let len = bytes.len().min(view.len(space));
                for (offset, &b) in bytes[..len].iter().enumerate() {
                    if !view.try_write(space, offset, b) {
                        return Err(ErrCode::WriteProtected);
                    }
                }
                self.length = len as u32;
                Ok(())
            }
            cmd::DELETE => {
                let name = self.read_name(view.ram)?;
                self.store.delete(&name).map_err(map_io)?;
                Ok(())
            }
            _ => Err(ErrCode::BadCmd),
        }
    }

    fn read_name(&self, ram: &[u8]) -> Result<String, ErrCode> {
        let start = self.name_ptr as usize;
        let len = self.name_len as usize;
        if len == 0 || len > NAME_MAX {
            return Err(ErrCode::Name);
        }
        let bytes = ram.get(start..start + len).ok_or(ErrCode::Name)?;
        if !bytes
            .iter()
            .all(|&b| (0x21..=0x7E).contains(&b) && b != b'/' && b != b'\\')
        {
            return Err(ErrCode::Name);
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Take the name of the last saved program (host hook plumbing).
    pub fn take_saved_name(&mut self) -> Option<String> {
        self.last_saved.take()
    }
}

/// Map a host I/O error onto the error-code register.
fn map_io(err: io::Error) -> ErrCode {
    if err.kind() == io::ErrorKind::NotFound {
        ErrCode::NotFound
    } else {
        ErrCode::Io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vgc::Vgc;
    use crate::xmc::Xmc;

    fn view<'a>(ram: &'a mut Vec<u8>, vgc: &'a mut Vgc, xmc: &'a mut Xmc) -> SpaceView<'a> {
        SpaceView {
            ram: ram.as_mut_slice(),
            vgc,
            xmc,
        }
    }

    fn fio_with_dir() -> (Fio, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let fio = Fio::new(Box::new(DirStore::new(dir.path().to_path_buf())));
        (fio, dir)
    }

    fn set_name(fio: &mut Fio, ram: &mut [u8], name: &str) {
        ram[0x100..0x100 + name.len()].copy_from_slice(name.as_bytes());
        fio.write(0xB9A3, 0x00);
        fio.write(0xB9A4, 0x01);
        fio.write(0xB9A5, name.len() as u8);
    }

    #[test]
    fn program_save_load_round_trip() {
        let (mut fio, _dir) = fio_with_dir();
        let mut ram = vec![0u8; 0x10000];
        let mut vgc = Vgc::new();
        let mut xmc = Xmc::new(64);

        ram[0x0801..0x0804].copy_from_slice(&[0xA9, 0x42, 0x60]);
        set_name(&mut fio, &mut ram, "demo.prg");
        fio.write(0xB9A6, 0x01);
        fio.write(0xB9A7, 0x08);
        fio.write(0xB9A8, 3);
        fio.write(0xB9A9, 0);
        fio.write(0xB9AA, 0);
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::PROG_SAVE, &mut v);
        }
        assert_eq!(fio.read(0xB9A1), CtrlStatus::Ok.as_u8());
        assert_eq!(fio.take_saved_name().as_deref(), Some("demo.prg"));

        ram[0x0801..0x0804].fill(0);
        set_name(&mut fio, &mut ram, "demo.prg");
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::PROG_LOAD, &mut v);
        }
        assert_eq!(fio.read(0xB9A1), CtrlStatus::Ok.as_u8());
        assert_eq!(&ram[0x0801..0x0804], &[0xA9, 0x42, 0x60]);
        assert_eq!(fio.read(0xB9AC), 0x01);
        assert_eq!(fio.read(0xB9AD), 0x08);
        assert_eq!(fio.read(0xB9A8), 3);
    }

    #[test]
    fn load_missing_file_reports_not_found() {
        let (mut fio, _dir) = fio_with_dir();
        let mut ram = vec![0u8; 0x10000];
        let mut vgc = Vgc::new();
        let mut xmc = Xmc::new(64);
        set_name(&mut fio, &mut ram, "nope");
        let mut v = view(&mut ram, &mut vgc, &mut xmc);
        fio.write_cmd(cmd::PROG_LOAD, &mut v);
        assert_eq!(fio.read(0xB9A2), ErrCode::NotFound.as_u8());
    }

    #[test]
    fn raw_save_load_gfx_space() {
        let (mut fio, _dir) = fio_with_dir();
        let mut ram = vec![0u8; 0x10000];
        let mut vgc = Vgc::new();
        let mut xmc = Xmc::new(64);
        vgc.space_write(2, 7, 0x99);

        set_name(&mut fio, &mut ram, "pic");
        fio.write(0xB9AB, 3); // VgcGfx
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::RAW_SAVE, &mut v);
        }
        assert_eq!(fio.read(0xB9A1), CtrlStatus::Ok.as_u8());

        vgc.space_write(2, 7, 0);
        set_name(&mut fio, &mut ram, "pic");
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::RAW_LOAD, &mut v);
        }
        assert_eq!(vgc.space_read(2, 7), Some(0x99));
    }

    #[test]
    fn bad_name_is_rejected_before_io() {
        let (mut fio, _dir) = fio_with_dir();
        let mut ram = vec![0u8; 0x10000];
        let mut vgc = Vgc::new();
        let mut xmc = Xmc::new(64);
        set_name(&mut fio, &mut ram, "../escape");
        let mut v = view(&mut ram, &mut vgc, &mut xmc);
        fio.write_cmd(cmd::PROG_LOAD, &mut v);
        assert_eq!(fio.read(0xB9A2), ErrCode::Name.as_u8());
    }

    #[test]
    fn delete_removes_file() {
        let (mut fio, _dir) = fio_with_dir();
        let mut ram = vec![0u8; 0x10000];
        let mut vgc = Vgc::new();
        let mut xmc = Xmc::new(64);
        ram[0x2000] = 1;
        set_name(&mut fio, &mut ram, "gone");
        fio.write(0xB9A6, 0x00);
        fio.write(0xB9A7, 0x20);
        fio.write(0xB9A8, 1);
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::PROG_SAVE, &mut v);
        }
        set_name(&mut fio, &mut ram, "gone");
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::DELETE, &mut v);
        }
        assert_eq!(fio.read(0xB9A1), CtrlStatus::Ok.as_u8());
        set_name(&mut fio, &mut ram, "gone");
        {
            let mut v = view(&mut ram, &mut vgc, &mut xmc);
            fio.write_cmd(cmd::PROG_LOAD, &mut v);
        }
        assert_eq!(fio.read(0xB9A2), ErrCode::NotFound.as_u8());
    }
}
