// tests/helpers/mod.rs - Sandbox with fake tools and a stand-in database

#![allow(dead_code)]

use assert_cmd::Command;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Working directory with fake `alembic` / `uvicorn` scripts and a listening
/// socket playing the database
pub struct Sandbox {
    pub dir: TempDir,
    db: Option<TcpListener>,
    db_port: u16,
    migration_tool: PathBuf,
    server: PathBuf,
}

impl Sandbox {
    /// Sandbox whose database is already accepting connections
    pub fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        Self::build(Some(listener), port, "exit 0")
    }

    /// Sandbox whose database port has nothing listening
    pub fn without_database() -> Self {
        Self::build(None, unused_port(), "exit 0")
    }

    /// Sandbox whose `alembic upgrade` exits with `code`
    pub fn with_failing_upgrade(code: i32) -> Self {
        Self::with_upgrade_script(&format!("exit {}", code))
    }

    /// Sandbox whose `alembic upgrade` runs `script` (with `$PIDFILE` set)
    pub fn with_upgrade_script(script: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        Self::build(Some(listener), port, script)
    }

    /// Sandbox pointed at a specific database port
    pub fn with_db_port(port: u16) -> Self {
        Self::build(None, port, "exit 0")
    }

    fn build(db: Option<TcpListener>, db_port: u16, upgrade: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();

        let tool_log = dir.path().join("tool.log");
        let server_log = dir.path().join("server.log");
        let pid_file = dir.path().join("upgrade.pid");

        let migration_tool = bin.join("alembic");
        write_script(
            &migration_tool,
            &format!(
                r#"#!/bin/sh
echo "$*" >> "{log}"
case "$1" in
  init)
    mkdir -p "$2"
    printf 'target_metadata = None\n' > "$2/env.py"
    ;;
  upgrade)
    PIDFILE="{pid_file}"
    {upgrade}
    ;;
esac
exit 0
"#,
                log = tool_log.display(),
                pid_file = pid_file.display(),
                upgrade = upgrade
            ),
        );

        let server = bin.join("uvicorn");
        write_script(
            &server,
            &format!(
                "#!/bin/sh\necho \"$*\" >> \"{log}\"\nexit 0\n",
                log = server_log.display()
            ),
        );

        Self {
            dir,
            db,
            db_port,
            migration_tool,
            server,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn db_port(&self) -> u16 {
        self.db_port
    }

    /// `startgate` running inside the sandbox with a clean environment
    pub fn startgate(&self) -> Command {
        let mut cmd = Command::cargo_bin("startgate").unwrap();
        cmd.current_dir(self.path())
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("DB_HOST", "127.0.0.1")
            .env("DB_PORT", self.db_port.to_string())
            .env("STARTGATE_PROBE_INTERVAL_MS", "50")
            .env("STARTGATE_CONNECT_TIMEOUT_MS", "50")
            .env("STARTGATE_MIGRATION_TOOL", &self.migration_tool)
            .env("STARTGATE_SERVER_PROGRAM", &self.server);
        cmd
    }

    /// `startgate` started in the background with the same environment as
    /// [`Sandbox::startgate`]; output is discarded
    pub fn spawn_startgate(&self, args: &[&str]) -> Child {
        std::process::Command::new(assert_cmd::cargo::cargo_bin("startgate"))
            .args(args)
            .current_dir(self.path())
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("DB_HOST", "127.0.0.1")
            .env("DB_PORT", self.db_port.to_string())
            .env("STARTGATE_PROBE_INTERVAL_MS", "50")
            .env("STARTGATE_CONNECT_TIMEOUT_MS", "50")
            .env("STARTGATE_MIGRATION_TOOL", &self.migration_tool)
            .env("STARTGATE_SERVER_PROGRAM", &self.server)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    /// Pid written by an upgrade script that runs `echo $$ > "$PIDFILE"`
    pub fn upgrade_pid(&self, timeout: Duration) -> Option<u32> {
        let path = self.path().join("upgrade.pid");
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(pid) = contents.trim().parse() {
                    return Some(pid);
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    /// Write an environment file with `contents`
    pub fn write_env_file(&self, contents: &str) {
        let dir = self.path().join("alembic");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("env.py"), contents).unwrap();
    }

    /// A fully configured migration environment
    pub fn configure(&self) {
        self.write_env_file("from db.base import Base\ntarget_metadata = Base.metadata\n");
    }

    pub fn tool_calls(&self) -> Vec<String> {
        read_lines(&self.path().join("tool.log"))
    }

    pub fn server_calls(&self) -> Vec<String> {
        read_lines(&self.path().join("server.log"))
    }

    pub fn close_database(&mut self) {
        self.db.take();
    }
}

fn write_script(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
    let mut permissions = std::fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions).unwrap();
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(String::from).collect())
        .unwrap_or_default()
}

/// Deliver `signal` (e.g. "TERM") to `pid` through the system `kill`
pub fn send_signal(pid: u32, signal: &str) {
    let status = std::process::Command::new("kill")
        .arg(format!("-{}", signal))
        .arg(pid.to_string())
        .status()
        .unwrap();
    assert!(status.success(), "kill -{} {} failed", signal, pid);
}

/// Wait for `child` to exit, killing it if it outlives `timeout`
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("process {} did not exit within {:?}", child.id(), timeout);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// True once `pid` has exited (a zombie waiting to be reaped counts as exited)
pub fn process_exited(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // Field 3 is the state; the command name before it is parenthesised
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map_or(true, |state| state == "Z" || state == "X"),
        Err(_) if Path::new("/proc/self").exists() => true,
        Err(_) => !std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false),
    }
}

/// A port nothing is listening on (at the time of the call)
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
