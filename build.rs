// build.rs

use clap::CommandFactory;
use clap_complete::{Shell, generate_to};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

#[allow(dead_code)]
#[path = "src/types.rs"]
mod types;

#[allow(dead_code)]
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-changed=src/types.rs");

    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            println!("cargo:warning=OUT_DIR not set, skipping man page and completions");
            return;
        }
    };

    let mut cmd = cli::Cli::command();

    // Man page
    let mut buffer = Vec::new();
    if let Err(e) = Man::new(cmd.clone()).render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }
    if let Err(e) = fs::write(out_dir.join("provision.1"), buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
        return;
    }

    // Shell completions
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        if let Err(e) = generate_to(shell, &mut cmd, "provision", &out_dir) {
            println!("cargo:warning=Failed to generate {} completions: {}", shell, e);
        }
    }
}
