//! Version command - show version information

use anyhow::Result;

use crate::cli::args::VersionArgs;

/// Execute the version command
pub async fn execute(args: VersionArgs) -> Result<()> {
    print_version(args.build_info);
    Ok(())
}

/// Print version information
///
/// Without `build_info`, prints a single line with name and version.
pub fn print_version(build_info: bool) {
    println!("{} {}", crate::NAME, crate::VERSION);

    if build_info {
        println!();
        println!("Build info:");
        println!("  Target:    {}", std::env::consts::ARCH);
        println!("  OS:        {}", std::env::consts::OS);
        println!("  Rust:      {}", env!("RUSTC_VERSION"));
        if let Ok(exe) = std::env::current_exe() {
            println!("  Executable: {}", exe.display());
        }
        println!();
        println!("License:    {}", env!("CARGO_PKG_LICENSE"));
    }
}
