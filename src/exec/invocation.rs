// src/exec/invocation.rs

//! Building the command line for a run.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Privilege-switch wrapper used when the run-as user differs from ours.
pub const PRIVILEGE_SWITCH: &str = "sudo";
pub const PRIVILEGE_SWITCH_USER_FLAG: &str = "-u";

/// Program plus arguments for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl Invocation {
    /// `<interpreter> <script>`, or `sudo -u <user> <interpreter> <script>`
    /// when `run_as` is not `current_user`.
    pub fn build(interpreter: &Path, script: &Path, run_as: &str, current_user: &str) -> Self {
        let mut argv: Vec<OsString> = Vec::with_capacity(5);
        if needs_privilege_switch(run_as, current_user) {
            argv.push(PRIVILEGE_SWITCH.into());
            argv.push(PRIVILEGE_SWITCH_USER_FLAG.into());
            argv.push(run_as.into());
        }
        argv.push(interpreter.as_os_str().to_owned());
        argv.push(script.as_os_str().to_owned());

        let program = argv.remove(0);
        Self {
            program,
            args: argv,
        }
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Tokio command with both output streams piped.
    ///
    /// On unix the child leads its own process group so an interrupt can
    /// take down everything the script started, not just the interpreter.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        f.write_str(&parts.join(" "))
    }
}

pub fn needs_privilege_switch(run_as: &str, current_user: &str) -> bool {
    run_as != current_user
}

/// Login name of the user running this process.
///
/// Checks `LOGNAME`, `USER`, `LNAME` and `USERNAME` first, then falls back to
/// the password database. Empty if nothing can be determined.
pub fn current_user() -> String {
    for var in ["LOGNAME", "USER", "LNAME", "USERNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    user_from_passwd().unwrap_or_default()
}

#[cfg(unix)]
fn user_from_passwd() -> Option<String> {
    let uid = unsafe { libc::getuid() };
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
        return None;
    }

    let name = unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) };
    Some(name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn user_from_passwd() -> Option<String> {
    None
}
