//! Finding and terminating browsers started with remote debugging
//!
//! Only processes carrying the remote-debugging flag are ever matched, so a user's
//! ordinary browsing session is never touched.

use crate::{browser::session::{BrowserFamily, DEBUG_PORT_MARKER},
            error::{BrowserError, Result}};
use std::path::Path;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Socket state `TCP_LISTEN` in `/proc/net/tcp`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const PROC_TCP_LISTEN: &str = "0A";

/// Forcefully terminate a single process, returning whether a signal was delivered
pub fn kill_pid(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|process| process.kill()).unwrap_or(false)
}

/// Kill the process listening on `port`, if any
///
/// Returns the number of processes killed (0 or 1). Nothing listening is not an error.
pub fn kill_on_port(port: u16) -> Result<usize> {
    let pids = pids_on_port(port)?;
    let Some(&pid) = pids.first() else {
        log::debug!("No process is listening on port {}", port);
        return Ok(0);
    };

    if !kill_pid(pid) {
        return Err(BrowserError::ProcessLookupFailed(format!(
            "failed to terminate process {} on port {}",
            pid, port
        )));
    }

    log::info!("Killed process {} listening on port {}", pid, port);
    Ok(1)
}

/// Kill every debug-enabled process of the browser at `executable`, except ourselves
pub fn kill_all_managed(executable: &Path) -> Result<usize> {
    let mut names = Vec::new();
    if let Some(name) = executable.file_name() {
        names.push(name.to_string_lossy().to_string());
    }
    if let Some(name) = BrowserFamily::from_executable(executable).process_name() {
        names.push(name.to_string());
    }
    if names.is_empty() {
        return Err(BrowserError::InvalidInput(format!(
            "cannot tell which processes belong to {}",
            executable.display()
        )));
    }

    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let command_lines = sys.processes().iter().map(|(pid, process)| {
        let cmd_line = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        (*pid, cmd_line)
    });
    let targets = managed_pids(command_lines, sysinfo::get_current_pid().ok(), &names);

    let mut killed = 0;
    for pid in targets {
        if sys.process(pid).is_some_and(|process| process.kill()) {
            log::debug!("Killed {}", pid);
            killed += 1;
        }
    }

    if killed > 0 {
        log::info!("Killed {} browser process(es) with remote debugging enabled", killed);
    }
    Ok(killed)
}

/// Select the debug-enabled browser processes among `(pid, command line)` pairs, never `own_pid`
fn managed_pids<I, S>(processes: I, own_pid: Option<Pid>, names: &[S]) -> Vec<Pid>
where
    I: IntoIterator<Item = (Pid, String)>,
    S: AsRef<str>,
{
    processes
        .into_iter()
        .filter(|(pid, cmd_line)| Some(*pid) != own_pid && is_managed_browser(cmd_line, names))
        .map(|(pid, _)| pid)
        .collect()
}

fn is_managed_browser<S: AsRef<str>>(cmd_line: &str, names: &[S]) -> bool {
    cmd_line.contains(DEBUG_PORT_MARKER) && names.iter().any(|name| cmd_line.contains(name.as_ref()))
}

/// PIDs of processes listening on `port`, in the order the OS reported them
pub fn pids_on_port(port: u16) -> Result<Vec<u32>> {
    #[cfg(target_os = "linux")]
    {
        proc_pids_on_port(port)
    }

    #[cfg(windows)]
    {
        let output = run_lookup(std::process::Command::new("netstat").args(["-ano", "-p", "TCP"]))?;
        Ok(parse_netstat_pids(&output, port))
    }

    #[cfg(all(not(windows), not(target_os = "linux")))]
    {
        let filter = format!("-iTCP:{}", port);
        let output =
            run_lookup(std::process::Command::new("lsof").args(["-nP", "-t", filter.as_str(), "-sTCP:LISTEN"]))?;
        Ok(parse_lsof_pids(&output))
    }
}

/// Socket lookup through procfs: listening inodes from `/proc/net/tcp{,6}`, owners from `/proc/<pid>/fd`
#[cfg(target_os = "linux")]
fn proc_pids_on_port(port: u16) -> Result<Vec<u32>> {
    let mut inodes = Vec::new();
    let mut tables_read = 0;
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        match std::fs::read_to_string(table) {
            Ok(contents) => {
                tables_read += 1;
                inodes.extend(parse_proc_net_listeners(&contents, port));
            }
            Err(e) => log::debug!("Failed to read {}: {}", table, e),
        }
    }
    if tables_read == 0 {
        return Err(BrowserError::ProcessLookupFailed("cannot read /proc/net/tcp".to_string()));
    }
    if inodes.is_empty() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir("/proc")
        .map_err(|e| BrowserError::ProcessLookupFailed(format!("failed to read /proc: {}", e)))?;

    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
            continue;
        };
        // Other users' fds are unreadable without privileges
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let owns_socket = fds.flatten().any(|fd| {
            std::fs::read_link(fd.path())
                .ok()
                .and_then(|link| parse_socket_inode(&link.to_string_lossy()))
                .is_some_and(|inode| inodes.contains(&inode))
        });
        if owns_socket && !pids.contains(&pid) {
            pids.push(pid);
        }
    }
    Ok(pids)
}

#[cfg(not(target_os = "linux"))]
fn run_lookup(command: &mut std::process::Command) -> Result<String> {
    let program = command.get_program().to_string_lossy().to_string();
    let output = command.output().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BrowserError::ProcessLookupFailed(format!("{} is not installed", program)),
        _ => BrowserError::ProcessLookupFailed(format!("failed to run {}: {}", program, e)),
    })?;

    // lsof exits with 1 when nothing matches
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Inodes of sockets listening on `port` in a `/proc/net/tcp` style table
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_net_listeners(contents: &str, port: u16) -> Vec<u64> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // sl  local_address  rem_address  st  tx:rx  tr:when  retrnsmt  uid  timeout  inode
            if fields.len() < 10 || fields[3] != PROC_TCP_LISTEN {
                return None;
            }
            let (_, local_port) = fields[1].rsplit_once(':')?;
            if u16::from_str_radix(local_port, 16).ok()? != port {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

#[cfg_attr(any(windows, target_os = "linux"), allow(dead_code))]
fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output.lines().filter_map(|line| line.trim().parse().ok()).collect()
}

#[cfg_attr(not(windows), allow(dead_code))]
fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    let mut pids = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // Proto  Local Address  Foreign Address  State  PID
        if fields.len() < 5 || fields[3] != "LISTENING" || !fields[1].ends_with(&suffix) {
            continue;
        }
        if let Ok(pid) = fields[4].parse::<u32>() {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        }
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn test_parse_lsof_output() {
        assert_eq!(parse_lsof_pids("1234\n5678\n"), vec![1234, 5678]);
        assert!(parse_lsof_pids("").is_empty());
    }

    #[test]
    fn test_parse_netstat_output() {
        let output = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1000
  TCP    127.0.0.1:9222         0.0.0.0:0              LISTENING       4242
  TCP    [::1]:9222             [::]:0                 LISTENING       4242
  TCP    127.0.0.1:50000        127.0.0.1:9222         ESTABLISHED     777
  TCP    127.0.0.1:19222        0.0.0.0:0              LISTENING       555
";
        assert_eq!(parse_netstat_pids(output, 9222), vec![4242]);
        assert!(parse_netstat_pids(output, 8080).is_empty());
    }

    #[test]
    fn test_parse_proc_net_tcp() {
        let table = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:2406 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 48213 1 0000000000000000 100 0 0 10 0
   1: 0100007F:C350 0100007F:2406 01 00000000:00000000 00:00000000 00000000  1000        0 48999 1 0000000000000000 20 4 30 10 -1
   2: 00000000:4B66 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1200 1 0000000000000000 100 0 0 10 0
";
        assert_eq!(parse_proc_net_listeners(table, 9222), vec![48213]);
        assert_eq!(parse_proc_net_listeners(table, 19302), vec![1200]);
        // An established connection to the port is not a listener
        assert!(parse_proc_net_listeners(table, 50000).is_empty());
    }

    #[test]
    fn test_parse_socket_inode() {
        assert_eq!(parse_socket_inode("socket:[48213]"), Some(48213));
        assert_eq!(parse_socket_inode("pipe:[48213]"), None);
        assert_eq!(parse_socket_inode("/dev/null"), None);
    }

    #[test]
    fn test_managed_browser_requires_debug_flag() {
        let names = ["google-chrome", "chrome"];
        assert!(is_managed_browser(
            "/opt/google/chrome/chrome --remote-debugging-port=9222 --user-data-dir=/tmp/x",
            &names
        ));
        assert!(!is_managed_browser("/opt/google/chrome/chrome --restore-last-session", &names));
        assert!(!is_managed_browser("/usr/bin/node server.js --remote-debugging-port=9222", &names));
    }

    #[test]
    fn test_managed_pids_skip_own_process_and_plain_browsers() {
        let names = ["chrome"];
        let own = Pid::from_u32(100);
        let processes = vec![
            (Pid::from_u32(100), "/opt/google/chrome/chrome --remote-debugging-port=9222".to_string()),
            (Pid::from_u32(200), "/opt/google/chrome/chrome --remote-debugging-port=9333".to_string()),
            (Pid::from_u32(300), "/opt/google/chrome/chrome --restore-last-session".to_string()),
            (Pid::from_u32(400), "/usr/bin/python3 -m http.server".to_string()),
        ];

        assert_eq!(managed_pids(processes, Some(own), &names), vec![Pid::from_u32(200)]);
    }

    #[test]
    fn test_managed_pids_without_own_pid() {
        let processes = vec![(Pid::from_u32(7), "chromium --remote-debugging-port=9222".to_string())];
        assert_eq!(managed_pids(processes, None, &["chromium"]), vec![Pid::from_u32(7)]);
    }

    #[test]
    fn test_kill_on_unbound_port_kills_nothing() {
        assert_eq!(kill_on_port(unbound_port()).unwrap(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_listening_socket_maps_to_own_pid() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let pids = pids_on_port(port).unwrap();
        assert!(pids.contains(&std::process::id()), "{:?}", pids);
    }
}
