//! Doomsday map check
//!
//! Builds a synthetic room grid, partitions it, moves a crowd of mobjs around
//! it, traces sight lines between them and pushes texture uploads through the
//! deferred GL queue. Useful for eyeballing timings and log output.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p doomsday-mapcheck --release -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod checks;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::checks::CheckParams;

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let params = CheckParams::from_args();
    info!(?params, "Doomsday map check");

    let world = checks::build_world(&params)?;
    let positions = checks::run_linkage(&world, &params)?;
    checks::run_sight(&world, &positions);
    checks::run_deferred_gl(&params)?;

    info!("All checks finished");
    Ok(())
}

fn print_help() {
    eprintln!(
        "Doomsday map check

USAGE:
    cargo run -p doomsday-mapcheck -- [OPTIONS]

MAP OPTIONS:
    --rooms <N>         Rooms per side of the generated grid (default: 8)
    --factor <N>        BSP split cost factor (default: 7)

SIMULATION OPTIONS:
    --mobjs <N>         Mobjs to spawn (default: 500)
    --ticks <N>         Movement tics to simulate (default: 35)

GL QUEUE OPTIONS:
    --tasks <N>         Texture uploads queued by the worker (default: 256)
    --budget-ms <N>     Drain budget per frame in ms, 0 = unlimited (default: 2)

OTHER:
    -h, --help          Print this help message

EXAMPLES:
    # Default run
    cargo run -p doomsday-mapcheck --release

    # A larger map with more splits avoided
    cargo run -p doomsday-mapcheck --release -- --rooms 24 --factor 17

    # Show per-drain debug output
    RUST_LOG=debug cargo run -p doomsday-mapcheck -- --tasks 32"
    );
}
