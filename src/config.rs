//! CLI scaffolding for the `conoded` binary (spec.md §6 Configuration
//! collaborator): `clap`-derived argument parsing, `CONODE_SERVICE_PATH`
//! env fallback, home-directory creation on boot.
//!
//! Grounded on the teacher's `main.rs` (`clap::Command`/`arg!`/
//! `value_parser!`, a required positional home-directory argument, a
//! `--port` flag with a default, and an unconditional
//! `fs::create_dir_all(home_directory_path)` before anything else runs),
//! adapted to `clap`'s derive macro since a cothority node's argument
//! surface is small enough to declare as a plain struct.

#![cfg(feature = "build-binary")]

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "conoded", version, about = "Runs a cothority node")]
pub struct Args {
    /// Path to the node's home directory (identity, keys, address book).
    pub home: PathBuf,

    /// Address to bind the tree-protocol transport on.
    #[arg(long, default_value = "127.0.0.1:7770")]
    pub address: String,

    /// Address to bind the client-facing front-end on.
    #[arg(long, default_value = "127.0.0.1:7771")]
    pub ws_address: String,

    /// Overrides `CONODE_SERVICE_PATH` for this run.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Print debug-level log lines (spec.md §5 logging levels).
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Creates the home directory if missing, matching the teacher's
    /// `fs::create_dir_all(home_directory_path)` boot step.
    pub async fn ensure_home(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.home).await
    }

    /// `CONODE_SERVICE_PATH` resolution order: `--db-path` flag, then the
    /// env var, then the default inside `service::resolve_db_path`.
    pub fn apply_db_path_override(&self) {
        if let Some(path) = &self.db_path {
            std::env::set_var("CONODE_SERVICE_PATH", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_home_and_defaults() {
        let args = Args::parse_from(["conoded", "/tmp/conode-home"]);
        assert_eq!(args.home, PathBuf::from("/tmp/conode-home"));
        assert_eq!(args.address, "127.0.0.1:7770");
        assert!(!args.debug);
    }

    #[test]
    fn accepts_overrides() {
        let args = Args::parse_from([
            "conoded",
            "/tmp/conode-home",
            "--address",
            "0.0.0.0:9000",
            "--debug",
        ]);
        assert_eq!(args.address, "0.0.0.0:9000");
        assert!(args.debug);
    }
}
