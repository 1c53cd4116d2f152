//! NovaVM headless runner.
//!
//! Boots the machine from `roms/nova.rom` and runs the scheduler until a
//! fatal fault or Ctrl-C. Configuration comes from three environment
//! knobs — `NOVA_CPU_HZ`, `NOVA_TURBO`, `NOVA_TIMING_LOG` — there is no
//! CLI. Rendering, audio output and the control surface are host
//! concerns layered on the library crate.

use std::path::{Path, PathBuf};
use std::process;

use nova_vm::debugger::Debugger;
use nova_vm::{NovaVm, Scheduler, VmConfig};

/// ROM image file name searched for under `roms/`.
const ROM_NAME: &str = "nova.rom";

/// Load the ROM image, or exit with a pointer to where it belongs.
fn load_rom(path: &Path) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(data) => {
            if data.len() > nova_vm::config::ROM_SIZE {
                eprintln!(
                    "ROM at {} is {} bytes, expected at most {}",
                    path.display(),
                    data.len(),
                    nova_vm::config::ROM_SIZE
                );
                process::exit(1);
            }
            data
        }
        Err(e) => {
            eprintln!("Cannot read ROM at {}: {e}", path.display());
            eprintln!();
            eprintln!("Place the ROM image in the roms/ directory:");
            eprintln!("  roms/{ROM_NAME}  (up to 16384 bytes)");
            process::exit(1);
        }
    }
}

/// Find the roms/ directory relative to the executable or current
/// directory.
fn find_roms_dir() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        // Walk up from target/debug or target/release to the workspace root
        let mut dir = exe.parent().map(Path::to_path_buf);
        for _ in 0..5 {
            if let Some(ref d) = dir {
                let roms = d.join("roms");
                if roms.is_dir() {
                    return roms;
                }
                dir = d.parent().map(Path::to_path_buf);
            }
        }
    }
    PathBuf::from("roms")
}

fn main() {
    env_logger::init();

    let rom = load_rom(&find_roms_dir().join(ROM_NAME));
    let config = VmConfig::from_env(rom);

    let mut vm = NovaVm::new(&config);
    vm.boot(None);

    let (debugger, _debug_handle) = Debugger::new();
    let scheduler = Scheduler::new(vm, debugger);

    if let (_vm, Err(e)) = scheduler.run() {
        eprintln!("Machine halted: {e}");
        process::exit(1);
    }
}
