//! Toolchain command: report the execution routing decision

use colored::Colorize;

use super::{execution_context, CommandResult, GlobalArgs};

pub fn execute(global: &GlobalArgs) -> CommandResult<u8> {
    println!("{}", "=== Toolchain ===".bold().cyan());
    let context = execution_context(global)?;

    println!("  Toolchain manager: {}", global.toolchain_manager_path().display());
    match context.sdk_version() {
        Some(version) => {
            println!("  SDK version:       {}", version);
            println!(
                "  Supported:         {}",
                if context.sdk_supported() { "yes".green() } else { "no".yellow() }
            );
        }
        None => println!("  SDK version:       none detected"),
    }
    if context.forced_direct() {
        println!("  Override:          {}", "host tools forced".yellow());
    }
    println!("  Execution:         {}", context.mode());
    Ok(0)
}
