use std::os::fd::AsRawFd as _;
use std::path::PathBuf;

use anyhow::Context as _;
use anyhow::anyhow;
use log::debug;
use nix::unistd::ForkResult;

/// Sidecar lifecycle flags of the `serve` subcommand.
#[derive(Debug)]
pub(crate) struct DaemonOptions {
    pub(crate) background: bool,
    pub(crate) setsid: bool,
    pub(crate) pid_file: Option<PathBuf>,
    pub(crate) log_file: Option<PathBuf>,
    pub(crate) run_as: Option<String>,
}

/// Detaches the process as configured. Must run before the async runtime is
/// built; the listening socket is expected to be bound already so that bind
/// failures were reported on the original stderr.
///
/// Order: fork (parent exits), stdio redirection, setsid, pid file, setuid.
/// A privilege-drop failure is fatal before the accept loop begins.
pub(crate) fn daemonize(options: &DaemonOptions) -> anyhow::Result<()> {
    if options.background {
        /* SAFETY: no threads have been spawned yet */
        match unsafe { nix::unistd::fork() }.context("Failed to fork")? {
            ForkResult::Parent { child } => {
                debug!("Forked daemon process {child}");
                std::process::exit(0);
            }
            ForkResult::Child => (),
        }
    }

    if let Some(log_path) = &options.log_file {
        let log = std::fs::File::options()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("Failed to open log file `{}`", log_path.display()))?;
        redirect_stdio(&log, false).context("Failed to redirect output to the log file")?;
    } else if options.setsid {
        let null = std::fs::File::options()
            .read(true)
            .write(true)
            .open("/dev/null")
            .context("Failed to open the null device")?;
        redirect_stdio(&null, true).context("Failed to detach from the terminal")?;
    }

    if options.setsid {
        nix::unistd::setsid().context("Failed to create a new session")?;
    }

    if let Some(pid_path) = &options.pid_file {
        std::fs::write(pid_path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Failed to write pid file `{}`", pid_path.display()))?;
    }

    if let Some(username) = &options.run_as {
        let user = nix::unistd::User::from_name(username)
            .with_context(|| format!("Failed to look up user `{username}`"))?
            .ok_or_else(|| anyhow!("Unknown user `{username}`"))?;
        nix::unistd::setuid(user.uid)
            .with_context(|| format!("Failed to switch to user `{username}`"))?;
        debug!("Running as user `{username}` ({})", user.uid);
    }

    Ok(())
}

fn redirect_stdio(target: &std::fs::File, include_stdin: bool) -> anyhow::Result<()> {
    let fd = target.as_raw_fd();

    if include_stdin {
        nix::unistd::dup2(fd, 0).context("Failed to redirect stdin")?;
    }
    nix::unistd::dup2(fd, 1).context("Failed to redirect stdout")?;
    nix::unistd::dup2(fd, 2).context("Failed to redirect stderr")?;

    Ok(())
}
