//! uft utility - main entrypoint

use std::process::ExitCode;

fn main() -> ExitCode {
    uft::main()
}
