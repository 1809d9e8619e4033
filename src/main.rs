//! RMS + deferrable server demo, entry point.
//!
//! On the bare-metal target (Cortex-M3, QEMU `mps2-an385`) output goes via
//! semihosting to the QEMU console and the core halts when the run ends. On
//! the host the same run prints to stdout, with diagnostics on stderr.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::fmt::{self, Write};

    use cortex_m_rt::entry;
    use cortex_m_semihosting::{debug, hio, hprintln};
    use panic_halt as _;

    use rms_deferrable::config::HarnessConfig;
    use rms_deferrable::harness;

    /// Semihosting stdout as a `fmt::Write`.
    struct Console(hio::HostStream);

    impl Write for Console {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0.write_all(s.as_bytes()).map_err(|_| fmt::Error)
        }
    }

    struct SemihostingLogger;

    impl log::Log for SemihostingLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Info
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                let _ = hprintln!("[{}] {}", record.level(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: SemihostingLogger = SemihostingLogger;

    #[entry]
    fn main() -> ! {
        // Only fails if a logger is already set.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Info);

        let _ = hprintln!("========================================");
        let _ = hprintln!("  RMS + Deferrable Server on Cortex-M3");
        let _ = hprintln!("========================================\n");

        let Ok(stdout) = hio::hstdout() else {
            halt();
        };
        let mut console = Console(stdout);
        let config = HarnessConfig::default();

        match cortex_m::interrupt::free(|_| harness::run(&mut console, &config)) {
            Ok(_) => {
                let _ = hprintln!("\nRun finished. Halting.");
                debug::exit(debug::EXIT_SUCCESS);
            }
            Err(e) => {
                let _ = hprintln!("init failed: {}", e);
                debug::exit(debug::EXIT_FAILURE);
            }
        }
        halt()
    }

    fn halt() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() -> std::process::ExitCode {
    use std::io::Write as _;
    use std::process::ExitCode;

    use rms_deferrable::config::HarnessConfig;
    use rms_deferrable::harness;

    /// Stdout as a `fmt::Write`.
    struct Console(std::io::Stdout);

    impl std::fmt::Write for Console {
        fn write_str(&mut self, s: &str) -> std::fmt::Result {
            self.0.write_all(s.as_bytes()).map_err(|_| std::fmt::Error)
        }
    }

    struct StderrLogger;

    impl log::Log for StderrLogger {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                eprintln!("[{}] {}", record.level(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    let level = match std::env::var("RMS_LOG").as_deref() {
        Ok("debug") => log::LevelFilter::Debug,
        Ok("off") => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    };
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);

    let mut console = Console(std::io::stdout());
    let code = match harness::run(&mut console, &HarnessConfig::default()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("init failed: {}", e);
            ExitCode::FAILURE
        }
    };
    let _ = console.0.flush();
    code
}
