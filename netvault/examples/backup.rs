//! Configuration backup example
//!
//! Loads an inventory and run policy from a TOML file, backs up every
//! device into `<root>/todayBackup`, then archives the staged files into
//! `<root>/backupArchive/YYYYmmdd_backup`. When the file has an `[sftp]`
//! section every artifact is also uploaded to that backup server.
//!
//! Credentials come from the environment:
//!
//! - `NETVAULT_USER` / `NETVAULT_PASSWORD` for the `default` domain
//! - `NETVAULT_APPLIANCE_USER` / `NETVAULT_APPLIANCE_PASSWORD` for `appliance`
//! - `NETVAULT_BACKUP_USER` (default `backupuser`) / `NETVAULT_BACKUP_PASSWORD`
//!   for `backup-server`
//!
//! Ctrl-C cancels the run: no new sessions start and in-flight steps get
//! the configured grace period.
//!
//! # Usage
//!
//! ```bash
//! NETVAULT_USER=netops NETVAULT_PASSWORD=secret \
//!     cargo run --example backup -- --config netvault.toml --root /srv/backups
//! ```

use std::env;
use std::path::PathBuf;

use netvault::{
    ConfigFile, Credential, CredentialRef, CredentialSet, DirectorySink, MirrorSink,
    Orchestrator, RunContext, RunState, SftpSink, SshConnector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== Netvault Backup Example ===\n");

    let file = ConfigFile::load(&args.config)?;
    let connector = SshConnector::new(file.ssh.clone());
    let ssh_options = file.ssh.clone();
    let sftp = file.sftp.clone();
    let (inventory, mut config) = file.into_parts()?;
    config.apply_env_overrides();

    println!(
        "{} device(s), {} session(s) at a time",
        inventory.len(),
        config.max_in_flight
    );

    let orchestrator = Orchestrator::new(inventory, connector, config)?;
    let local = DirectorySink::new(&args.root);
    local.prepare().await?;

    let mut credentials = credentials_from_env();
    let backup_credential = match sftp {
        Some(ref settings) => {
            let domain = CredentialRef::new(settings.credential.as_str());
            Some(credentials.take(&domain).ok_or_else(|| {
                format!("no credentials for backup server domain '{}'", domain)
            })?)
        }
        None => None,
    };

    let mut ctx = RunContext::new(credentials);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    let (report, local) = match (sftp, backup_credential) {
        (Some(settings), Some(credential)) => {
            let remote = SftpSink::connect_with(&settings, credential, ssh_options);
            let sink = MirrorSink::new(local, remote);
            let report = orchestrator.run(&mut ctx, &sink).await;
            let (local, remote) = sink.into_inner();
            remote.close().await;
            (report, local)
        }
        _ => (orchestrator.run(&mut ctx, &local).await, local),
    };
    println!("\n{}", report.summary());

    if report.final_state() == RunState::Aborted {
        std::process::exit(2);
    }

    if !args.no_archive {
        let (dir, moved) = local.archive_staged(&report.stamp).await?;
        println!("Archived {} file(s) to {}", moved, dir.display());
    }

    Ok(())
}

fn credentials_from_env() -> CredentialSet {
    let mut credentials = CredentialSet::new();
    for (domain, user_var, password_var) in [
        ("default", "NETVAULT_USER", "NETVAULT_PASSWORD"),
        (
            "appliance",
            "NETVAULT_APPLIANCE_USER",
            "NETVAULT_APPLIANCE_PASSWORD",
        ),
    ] {
        if let (Ok(user), Ok(password)) = (env::var(user_var), env::var(password_var)) {
            credentials.insert(domain, Credential::new(user, password));
        }
    }
    if let Ok(password) = env::var("NETVAULT_BACKUP_PASSWORD") {
        let user = env::var("NETVAULT_BACKUP_USER").unwrap_or_else(|_| "backupuser".to_string());
        credentials.insert(
            netvault::sink::BACKUP_CREDENTIAL_DOMAIN,
            Credential::new(user, password),
        );
    }
    credentials
}

/// Command line arguments.
struct Args {
    config: PathBuf,
    root: PathBuf,
    no_archive: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut config = PathBuf::from("netvault.toml");
        let mut root = PathBuf::from(".");
        let mut no_archive = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    if i < args.len() {
                        config = PathBuf::from(&args[i]);
                    }
                }
                "--root" | "-r" => {
                    i += 1;
                    if i < args.len() {
                        root = PathBuf::from(&args[i]);
                    }
                }
                "--no-archive" => no_archive = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self {
            config,
            root,
            no_archive,
        }
    }

    fn print_help() {
        println!("Netvault backup example");
        println!();
        println!("Usage: backup [OPTIONS]");
        println!();
        println!("Options:");
        println!("  -c, --config <PATH>   Configuration file [default: netvault.toml]");
        println!("  -r, --root <DIR>      Backup root directory [default: .]");
        println!("      --no-archive      Leave artifacts in todayBackup/");
        println!("      --help            Print help");
    }
}
