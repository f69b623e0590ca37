//! Entry point: reads a ROM path off the command line, boots the desktop
//! HAL, and drives the frame loop until the process is stopped.

mod nes;

use std::env;
use std::fs;
use std::process::ExitCode;

use nes::hal::PistonHal;
use nes::Nes;

const DEFAULT_ROM_PATH: &str = "./ignores/donkeykong.nes";
const SCREEN_WIDTH: u32 = 256;
const SCREEN_HEIGHT: u32 = 240;

fn main() -> ExitCode {
    env_logger::init();

    let rom_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_ROM_PATH.to_string());
    let rom_bytes = match fs::read(&rom_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("failed to read {}: {}", rom_path, err);
            return ExitCode::FAILURE;
        }
    };

    let hal = Box::new(PistonHal::new(SCREEN_WIDTH, SCREEN_HEIGHT));
    let mut console = match Nes::load(&rom_bytes, hal) {
        Ok(console) => console,
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = console.power_on() {
        log::error!("{}", err);
        return ExitCode::FAILURE;
    }

    loop {
        if let Err(err) = console.run_frame() {
            // A HalUnavailable failure is not fatal: the core keeps making
            // forward progress and simply tries the HAL again next frame.
            log::warn!("{}", err);
        }
    }
}
