//! Connection table from `netstat -an` (Windows, macOS, BSDs).

use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

use super::{ConnectionLister, SocketEntry, TcpState};

/// Protocol filters passed to `-p`. Windows lists IPv6 sockets separately;
/// BSD `-p tcp` already covers tcp4 and tcp6.
#[cfg(windows)]
const PROTOCOLS: &[&str] = &["tcp", "tcpv6"];
#[cfg(not(windows))]
const PROTOCOLS: &[&str] = &["tcp"];

#[derive(Debug, Clone)]
pub struct NetstatLister {
    /// Limit per `netstat` invocation; a slower run is killed.
    timeout: Duration,
}

impl NetstatLister {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ConnectionLister for NetstatLister {
    fn connections(&self) -> std::io::Result<Vec<SocketEntry>> {
        let mut entries = Vec::new();
        for proto in PROTOCOLS {
            let mut cmd = Command::new("netstat");
            cmd.args(["-an", "-p", proto]);
            let stdout = run_bounded(&mut cmd, self.timeout)?;
            entries.extend(parse_output(&String::from_utf8_lossy(&stdout)));
        }
        Ok(entries)
    }
}

/// Run `cmd` and collect its stdout, killing it once `timeout` passes.
/// stdout is drained on a thread so a full pipe cannot stall the child.
fn run_bounded(cmd: &mut Command, timeout: Duration) -> std::io::Result<Vec<u8>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            buf
        })
    });

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_and_reap(&mut child);
            return Err(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("netstat did not finish within {}ms", timeout.as_millis()),
            ));
        }
        Err(e) => {
            kill_and_reap(&mut child);
            return Err(e);
        }
    };

    // the child has exited, so the pipe is closed and the reader ends
    let stdout = reader
        .map(|r| r.join().unwrap_or_default())
        .unwrap_or_default();

    if !status.success() {
        return Err(std::io::Error::other(format!("netstat exited with {status}")));
    }
    Ok(stdout)
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Parse netstat output from either the Windows or the BSD layout.
///
/// Windows: `TCP    127.0.0.1:8000    127.0.0.1:51234    ESTABLISHED`
/// macOS:   `tcp4   0   0   127.0.0.1.8000   127.0.0.1.51234   ESTABLISHED`
pub(crate) fn parse_output(text: &str) -> Vec<SocketEntry> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<SocketEntry> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    let proto = cols.first()?.to_ascii_lowercase();
    if !proto.starts_with("tcp") {
        return None;
    }

    // BSD layout carries Recv-Q / Send-Q columns before the addresses.
    let (local, state) = if cols.len() >= 6 && cols[1].parse::<u64>().is_ok() {
        (cols[3], cols[5])
    } else if cols.len() >= 4 {
        (cols[1], cols[3])
    } else {
        return None;
    };

    Some(SocketEntry {
        local_port: port_of(local)?,
        state: state_of(state),
    })
}

fn port_of(addr: &str) -> Option<u16> {
    let idx = addr.rfind([':', '.'])?;
    addr[idx + 1..].parse().ok()
}

fn state_of(raw: &str) -> TcpState {
    match raw.to_ascii_uppercase().as_str() {
        "ESTABLISHED" => TcpState::Established,
        "SYN_RECEIVED" | "SYN_RCVD" | "SYN_RECV" => TcpState::SynReceived,
        "LISTEN" | "LISTENING" => TcpState::Listen,
        _ => TcpState::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_layout() {
        let out = "
Active Connections

  Proto  Local Address          Foreign Address        State
  TCP    0.0.0.0:8000           0.0.0.0:0              LISTENING
  TCP    192.168.1.37:8000      192.168.1.34:50612     ESTABLISHED
  TCP    [::1]:8000             [::1]:50700            SYN_RECEIVED
  TCP    192.168.1.37:50999     52.1.1.1:443           TIME_WAIT
";
        let rows = parse_output(out);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], SocketEntry { local_port: 8000, state: TcpState::Listen });
        assert_eq!(rows[1], SocketEntry { local_port: 8000, state: TcpState::Established });
        assert_eq!(rows[2], SocketEntry { local_port: 8000, state: TcpState::SynReceived });
        assert_eq!(rows[3].state, TcpState::Other);
    }

    #[cfg(windows)]
    #[test]
    fn windows_lists_ipv6_sockets_too() {
        assert_eq!(PROTOCOLS, &["tcp", "tcpv6"]);
        let rows = parse_output("  TCP    [::]:8000    [::]:0    LISTENING\n");
        assert_eq!(rows, vec![SocketEntry { local_port: 8000, state: TcpState::Listen }]);
    }

    #[test]
    fn bsd_layout() {
        let out = "Active Internet connections (including servers)
Proto Recv-Q Send-Q  Local Address          Foreign Address        (state)
tcp4       0      0  127.0.0.1.8000         127.0.0.1.51234        ESTABLISHED
tcp6       0      0  *.8000                 *.*                    LISTEN
tcp4       0      0  10.0.0.5.8000          10.0.0.9.61000         SYN_RCVD
";
        let rows = parse_output(out);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], SocketEntry { local_port: 8000, state: TcpState::Established });
        assert_eq!(rows[1].state, TcpState::Listen);
        assert_eq!(rows[2].state, TcpState::SynReceived);
    }

    #[test]
    fn non_tcp_and_short_lines_ignored() {
        assert!(parse_output("UDP 0.0.0.0:8000 *:*\nTCP x\n").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn hung_tool_is_killed_at_deadline() {
        let start = std::time::Instant::now();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let err = run_bounded(&mut cmd, Duration::from_millis(200)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn bounded_run_collects_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'tcp4 0 0 *.8000 *.* LISTEN'"]);
        let out = run_bounded(&mut cmd, Duration::from_secs(5)).unwrap();
        let rows = parse_output(&String::from_utf8_lossy(&out));
        assert_eq!(rows, vec![SocketEntry { local_port: 8000, state: TcpState::Listen }]);
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_an_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        assert!(run_bounded(&mut cmd, Duration::from_secs(5)).is_err());
    }
}
