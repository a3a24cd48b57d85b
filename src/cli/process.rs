use std::{env, path::Path};

use anyhow::{Result, bail};
use sysinfo::{Signal, System, get_current_pid};

use super::daemon_path::to_daemon_path;

/// Terminates every running daemon started from the given executable. Also
/// serves as the single-instance guarantee: `init` always calls this before
/// spawning a fresh daemon.
pub fn kill_previous_daemons(name: &Path) {
    let system = System::new_all();
    let current_id = get_current_pid().unwrap();
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
}

/// Replaces any running daemon with a fresh one. The daemon binary detaches
/// itself, so the spawned process returns as soon as the real daemon is up.
pub fn restart_daemon() -> Result<()> {
    let daemon_path = to_daemon_path(env::current_exe()?);
    kill_previous_daemons(&daemon_path);

    println!("Starting daemon");
    let status = std::process::Command::new(&daemon_path).status()?;
    if !status.success() {
        bail!("Daemon launcher exited with {status}");
    }
    println!("Success");
    Ok(())
}

pub fn stop_daemon() -> Result<()> {
    let daemon_path = to_daemon_path(env::current_exe()?);
    kill_previous_daemons(&daemon_path);
    Ok(())
}
