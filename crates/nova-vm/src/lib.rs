//! NovaVM: a fantasy 8-bit computer.
//!
//! A 65C02 on a memory-mapped bus with a video/graphics controller (text,
//! bitmap, sprites and a raster coprocessor), two SID chips driven by a
//! six-voice MML sequencer, expansion memory with named allocations and
//! mappable windows, a programmable timer, a four-slot TCP network
//! controller, DMA and blitter engines, and file I/O. Everything advances
//! in lockstep with the CPU's cycle counts; the scheduler paces those
//! cycles against the wall clock (or not, in turbo).

pub mod blitter;
pub mod bus;
pub mod config;
pub mod copper;
pub mod debugger;
pub mod dma;
pub mod draw;
pub mod fio;
pub mod hooks;
pub mod machine;
pub mod mml;
pub mod music;
pub mod nic;
pub mod scheduler;
pub mod sidplayer;
pub mod spaces;
pub mod sprites;
pub mod timer;
pub mod vgc;
pub mod xmc;

pub use bus::NovaBus;
pub use config::VmConfig;
pub use debugger::{Debugger, DebuggerHandle};
pub use hooks::HostHooks;
pub use machine::{NovaVm, VmError};
pub use scheduler::Scheduler;
