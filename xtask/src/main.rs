//! Build automation tasks for the relay-pool workspace.
//!
//! Run with `cargo xtask <command>`.
//!
//! ## Available Commands
//!
//! - `ci`: Run all CI checks (format, lint, test, doc)
//! - `fmt`: Check/apply code formatting
//! - `clippy`: Run clippy lints
//! - `test`: Run all tests
//! - `stress`: Re-run the concurrency tests in release mode
//! - `doc`: Generate documentation
//! - `clean`: Clean build artifacts
//! - `coverage`: Run code coverage
//! - `semver`: Check for semver violations

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for relay-pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks (format, lint, test, doc)
    Ci,
    /// Run cargo fmt (--check by default, --fix to apply)
    Fmt {
        /// Apply formatting fixes
        #[arg(long)]
        fix: bool,
    },
    /// Run clippy with all features
    Clippy {
        /// Apply clippy suggestions
        #[arg(long)]
        fix: bool,
    },
    /// Run all tests
    Test {
        /// Test a specific package
        #[arg(short, long)]
        package: Option<String>,
        /// Run a single integration test target
        #[arg(long)]
        target: Option<String>,
    },
    /// Re-run the concurrency tests in release mode to shake out races
    Stress {
        /// Number of runs
        #[arg(long, default_value = "20")]
        runs: u32,
    },
    /// Generate documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Clean build artifacts
    Clean,
    /// Run code coverage
    Coverage {
        /// Output format (html, lcov, json)
        #[arg(long, default_value = "html")]
        format: String,
    },
    /// Check for semver violations (requires cargo-semver-checks)
    Semver,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Change to workspace root
    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh, false)?;
            clippy(&sh, false)?;
            test(&sh, None, None)?;
            doc(&sh, false)?;
            println!("\n✅ All CI checks passed!");
        }
        Command::Fmt { fix } => fmt(&sh, fix)?,
        Command::Clippy { fix } => clippy(&sh, fix)?,
        Command::Test { package, target } => test(&sh, package.as_deref(), target.as_deref())?,
        Command::Stress { runs } => stress(&sh, runs)?,
        Command::Doc { open } => doc(&sh, open)?,
        Command::Clean => clean(&sh)?,
        Command::Coverage { format } => coverage(&sh, &format)?,
        Command::Semver => semver(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        println!("Applying formatting...");
        cmd!(sh, "cargo fmt --all").run()?;
        println!("✅ Formatting applied.");
    } else {
        println!("Checking formatting...");
        cmd!(sh, "cargo fmt --all -- --check").run()?;
        println!("✅ Formatting check passed.");
    }
    Ok(())
}

fn clippy(sh: &Shell, fix: bool) -> Result<()> {
    if fix {
        println!("Applying clippy suggestions...");
        cmd!(
            sh,
            "cargo clippy --all-features --all-targets --fix --allow-dirty"
        )
        .run()?;
        println!("✅ Clippy suggestions applied.");
    } else {
        println!("Running clippy...");
        cmd!(
            sh,
            "cargo clippy --all-features --all-targets -- -D warnings"
        )
        .run()?;
        println!("✅ Clippy check passed.");
    }
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>, target: Option<&str>) -> Result<()> {
    println!("Running tests...");

    let mut args = vec!["--all-features"];

    if let Some(pkg) = package {
        args.push("-p");
        args.push(pkg);
    }

    if let Some(target) = target {
        args.push("--test");
        args.push(target);
    }

    cmd!(sh, "cargo test {args...}").run()?;
    println!("✅ All tests passed.");
    Ok(())
}

fn stress(sh: &Shell, runs: u32) -> Result<()> {
    if runs == 0 {
        bail!("--runs must be at least 1");
    }
    println!("Running concurrency tests {runs} times...");
    for run in 1..=runs {
        println!("  Run {run}/{runs}");
        cmd!(
            sh,
            "cargo test --release -p relay-pool --test concurrency --quiet"
        )
        .run()
        .with_context(|| format!("stress run {run} failed"))?;
    }
    println!("✅ {runs} stress runs passed.");
    Ok(())
}

fn doc(sh: &Shell, open: bool) -> Result<()> {
    println!("Generating documentation...");
    if open {
        cmd!(sh, "cargo doc --all-features --no-deps --open").run()?;
    } else {
        cmd!(sh, "cargo doc --all-features --no-deps").run()?;
    }
    println!("✅ Documentation generated.");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    println!("✅ Clean complete.");
    Ok(())
}

fn coverage(sh: &Shell, format: &str) -> Result<()> {
    println!("Running code coverage...");

    // Requires cargo-llvm-cov
    match format {
        "html" => {
            cmd!(sh, "cargo llvm-cov --all-features --html").run()?;
            println!("✅ Coverage report: target/llvm-cov/html/index.html");
        }
        "lcov" => {
            cmd!(
                sh,
                "cargo llvm-cov --all-features --lcov --output-path target/lcov.info"
            )
            .run()?;
            println!("✅ Coverage report: target/lcov.info");
        }
        "json" => {
            cmd!(
                sh,
                "cargo llvm-cov --all-features --json --output-path target/coverage.json"
            )
            .run()?;
            println!("✅ Coverage report: target/coverage.json");
        }
        _ => {
            bail!(
                "Unknown coverage format: {}. Use html, lcov, or json.",
                format
            );
        }
    }

    Ok(())
}

fn semver(sh: &Shell) -> Result<()> {
    println!("Checking for semver violations...");
    cmd!(sh, "cargo semver-checks check-release -p relay-pool").run()?;
    println!("✅ No semver violations detected.");
    Ok(())
}
