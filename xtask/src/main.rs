use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(author, version, about = "Project automation commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cargo nextest with default configuration
    Nextest {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Write a small synthetic SDK tree for trying the extractor by hand
    Fixture {
        /// Directory to create the tree in (must not exist yet)
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Nextest { profile, release } => run_nextest(profile, release)?,
        Commands::Fixture { out } => write_fixture(&out)?,
    }
    Ok(())
}

fn run_nextest(profile: Option<String>, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("nextest").arg("run").arg("--workspace");
    if let Some(profile) = profile {
        cmd.arg("--profile").arg(profile);
    }
    if release {
        cmd.arg("--release");
    }
    let status = cmd.status()?;
    if !status.success() {
        bail!("cargo nextest run failed");
    }
    Ok(())
}

const FIXTURE_FILES: &[(&str, &str)] = &[
    ("Projects/examples/Blink/readme.txt", "Toggles LD1 every 500 ms.\n"),
    ("Projects/examples/Blink/BoardX_U575/EWARM/Project.ewp", "<project/>\n"),
    ("Projects/examples/Blink/BoardX_U575/EWARM/Project.ewd", "<project/>\n"),
    ("Projects/examples/Blink/BoardX_U575/EWARM/Project.eww", "<workspace/>\n"),
    ("Projects/examples/Blink/BoardX_U575/src/main.c", "int main(void) { for (;;) {} }\n"),
    ("Projects/examples/Blink/BoardX_U575/inc/main.h", "#pragma once\n"),
    ("Projects/examples/Blink/BoardX_U575/Core/Src/main.c", "int main(void) { return 0; }\n"),
    ("Projects/examples/Blink/BoardX_U575/Makefile", "all:\n"),
    ("Projects/examples/Blink/BoardX_U575/debug/launch.json", "{}\n"),
    ("Projects/examples/Blink/hal/stm32u5xx_hal_conf.h", "#pragma once\n"),
    ("Projects/examples/Blink/hal_iar/Project.ewp", "<project/>\n"),
    ("Projects/examples/Blink/BoardY_noserial/src/main.c", "int main(void) { return 0; }\n"),
    ("Projects/examples/Timer/Basic/BoardX_U575/src/basic.c", "void basic(void) {}\n"),
    ("Projects/examples/Timer/Advanced/BoardX_U575/src/advanced.c", "void advanced(void) {}\n"),
    ("Drivers/CMSIS/Include/core_cm33.h", "#pragma once\n"),
    ("hal/Inc/stm32u5xx_hal.h", "#pragma once\n"),
    ("dfp/Source/startup_stm32u575xx.s", "  .syntax unified\n"),
    ("dfp/Include/stm32u575xx.h", "#pragma once\n"),
];

fn write_fixture(out: &Path) -> Result<()> {
    if out.exists() {
        bail!("{} already exists", out.display());
    }
    for (path, contents) in FIXTURE_FILES {
        let full = out.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&full, contents).with_context(|| format!("failed to write {}", full.display()))?;
    }
    println!("wrote {} files under {}", FIXTURE_FILES.len(), out.display());
    Ok(())
}
