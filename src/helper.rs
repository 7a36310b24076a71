//! Resident injection helper process.
//!
//! The helper is a long-lived PowerShell host that compiles a tiny
//! `SendInput` wrapper once and then reads one command per line from stdin.
//! Keeping it resident means each key event costs a pipe write instead of a
//! process spawn.

use crate::config::HelperSettings;
use crate::error::{MacroError, Result};
use crate::injector::{InjectCommand, InjectionBackend};
use crate::process_tree::{ProcessMark, ProcessTree};
use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long the helper holds keys down during `pressRelease`.
pub const PRESS_DWELL_MS: u64 = 15;

/// Minimum age of the descendant snapshot before a send refreshes it.
const SNAPSHOT_PERIOD: Duration = Duration::from_secs(1);

const SCRIPT_TEMPLATE: &str = r#"
Add-Type -TypeDefinition @'
using System;
using System.Runtime.InteropServices;
using System.Threading;

public static class KeyInjector {
    [StructLayout(LayoutKind.Sequential)]
    struct MOUSEINPUT { public int dx; public int dy; public uint mouseData; public uint dwFlags; public uint time; public IntPtr dwExtraInfo; }
    [StructLayout(LayoutKind.Sequential)]
    struct KEYBDINPUT { public ushort wVk; public ushort wScan; public uint dwFlags; public uint time; public IntPtr dwExtraInfo; }
    [StructLayout(LayoutKind.Explicit)]
    struct InputUnion { [FieldOffset(0)] public MOUSEINPUT mi; [FieldOffset(0)] public KEYBDINPUT ki; }
    [StructLayout(LayoutKind.Sequential)]
    struct INPUT { public uint type; public InputUnion u; }

    [DllImport("user32.dll", SetLastError = true)]
    static extern uint SendInput(uint count, INPUT[] inputs, int size);
    [DllImport("user32.dll")]
    static extern uint MapVirtualKey(uint code, uint mapType);

    static void Send(int code, bool up) {
        ushort vk = (ushort)(code & 0xFF);
        uint flags = up ? 0x2u : 0u;
        if ((code & 0x100) != 0) { flags |= 0x1u; }
        INPUT input = new INPUT();
        input.type = 1;
        input.u.ki.wVk = vk;
        input.u.ki.wScan = (ushort)MapVirtualKey(vk, 0);
        input.u.ki.dwFlags = flags;
        SendInput(1, new INPUT[] { input }, Marshal.SizeOf(typeof(INPUT)));
    }

    public static void Down(int[] codes) { foreach (int c in codes) { Send(c, false); } }
    public static void Up(int[] codes) { for (int i = codes.Length - 1; i >= 0; i--) { Send(codes[i], true); } }
    public static void PressRelease(int[] codes, int dwell) { Down(codes); Thread.Sleep(dwell); Up(codes); }
}
'@
while ($true) {
    $line = [Console]::In.ReadLine()
    if ($line -eq $null) { break }
    if ($line -match '^(down|up|pressRelease)\(([0-9,]*)\)$') {
        $codes = [int[]]@($Matches[2].Split(',') | Where-Object { $_ -ne '' } | ForEach-Object { [int]$_ })
        switch -CaseSensitive ($Matches[1]) {
            'down' { [KeyInjector]::Down($codes) }
            'up' { [KeyInjector]::Up($codes) }
            'pressRelease' { [KeyInjector]::PressRelease($codes, __DWELL_MS__) }
        }
    }
}
"#;

/// The PowerShell program run by the helper.
pub fn helper_script() -> String {
    SCRIPT_TEMPLATE.replace("__DWELL_MS__", &PRESS_DWELL_MS.to_string())
}

/// [`InjectionBackend`] writing commands to a resident helper subprocess.
pub struct HelperProcess {
    settings: HelperSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    tree: ProcessTree,
    /// Descendants seen while the helper was alive. A helper that crashes
    /// leaves orphans that no longer hang off its pid.
    known: Vec<ProcessMark>,
    snapshot_at: Option<Instant>,
    spawn_count: u32,
}

impl HelperProcess {
    pub fn new(settings: HelperSettings) -> Self {
        Self {
            settings,
            child: None,
            stdin: None,
            tree: ProcessTree::new(),
            known: Vec::new(),
            snapshot_at: None,
            spawn_count: 0,
        }
    }

    /// How many times the helper has been (re)started.
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count
    }

    /// Pid of the running helper, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn refresh_snapshot(&mut self) {
        if self
            .snapshot_at
            .is_some_and(|at| at.elapsed() < SNAPSHOT_PERIOD)
        {
            return;
        }
        if let Some(pid) = self.pid() {
            self.known = self.tree.snapshot(pid);
            self.snapshot_at = Some(Instant::now());
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let mut command = Command::new(&self.settings.program);
        command
            .args(&self.settings.args)
            .arg(helper_script())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command
            .spawn()
            .map_err(|e| MacroError::helper_spawn(&self.settings.program, e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MacroError::helper_unavailable("helper stdin was not captured"))?;

        self.spawn_count += 1;
        info!(pid = child.id(), spawn = self.spawn_count, "injection helper started");
        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    /// Kill whatever is left of the current helper and forget it.
    fn discard(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            let killed = self.tree.kill_tree(pid);
            let _ = child.kill();
            let _ = child.wait();
            let orphans = self.tree.kill_marked(&self.known);
            debug!(pid, killed, orphans, "injection helper discarded");
        }
        self.known.clear();
        self.snapshot_at = None;
    }
}

impl InjectionBackend for HelperProcess {
    fn ensure_started(&mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => warn!("injection helper exited ({}), restarting", status),
                Err(e) => warn!("injection helper state unknown ({}), restarting", e),
            }
            self.discard();
        }
        self.spawn()
    }

    fn send(&mut self, command: &InjectCommand) -> Result<()> {
        self.ensure_started()?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MacroError::helper_unavailable("helper stdin closed"))?;

        let line = format!("{command}\n");
        if let Err(e) = stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
        {
            self.discard();
            return Err(e.into());
        }
        self.refresh_snapshot();
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(pid) = self.pid() {
            info!(pid, "stopping injection helper");
        }
        self.discard();
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_carries_dwell_and_protocol() {
        let script = helper_script();
        assert!(script.contains("PressRelease($codes, 15)"));
        assert!(!script.contains("__DWELL_MS__"));
        assert!(script.contains("down|up|pressRelease"));
    }

    #[test]
    fn test_missing_program_reports_spawn_error() {
        let mut helper = HelperProcess::new(HelperSettings {
            program: "definitely-not-a-real-helper-binary".to_string(),
            args: vec![],
            eager: false,
        });
        let err = helper.ensure_started().unwrap_err();
        assert!(matches!(err, MacroError::HelperSpawn { .. }));
        assert_eq!(helper.spawn_count(), 0);

        helper.shutdown();
        helper.shutdown();
        assert!(helper.pid().is_none());
    }

    #[cfg(unix)]
    fn forking_helper() -> HelperProcess {
        HelperProcess::new(HelperSettings {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "sleep 300 & cat > /dev/null; wait".to_string(),
            ],
            eager: false,
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_shutdown_kills_whole_helper_tree() {
        let mut helper = forking_helper();
        helper.ensure_started().unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let pid = helper.pid().unwrap();
        let mut tree = ProcessTree::new();
        let descendants = tree.descendants(pid);
        assert!(!descendants.is_empty());

        helper.shutdown();
        std::thread::sleep(Duration::from_millis(200));
        assert!(helper.pid().is_none());
        assert!(!tree.is_alive(pid));
        for child in descendants {
            assert!(!tree.is_alive(child), "descendant {child} survived");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_restart_after_crash_kills_orphans() {
        let mut helper = forking_helper();
        let command = InjectCommand::new(crate::injector::Op::Up, vec![crate::keymap::Token::SPACE]);
        helper.ensure_started().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        helper.send(&command).unwrap();

        let pid = helper.pid().unwrap();
        let mut tree = ProcessTree::new();
        let orphans = tree.descendants(pid);
        assert!(!orphans.is_empty());

        // Only the root dies; its children are re-parented away.
        std::process::Command::new("kill")
            .args(["-9", &pid.to_string()])
            .status()
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));

        helper.ensure_started().unwrap();
        assert_eq!(helper.spawn_count(), 2);
        std::thread::sleep(Duration::from_millis(200));
        for orphan in orphans {
            assert!(!tree.is_alive(orphan), "orphan {orphan} survived");
        }
        helper.shutdown();
    }

    #[cfg(unix)]
    #[test]
    fn test_helper_is_resident_and_restarts_after_death() {
        let mut helper = HelperProcess::new(HelperSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat > /dev/null".to_string()],
            eager: false,
        });
        let command = InjectCommand::new(crate::injector::Op::Down, vec![crate::keymap::Token::SPACE]);

        helper.send(&command).unwrap();
        helper.send(&command).unwrap();
        assert_eq!(helper.spawn_count(), 1);

        let pid = helper.pid().unwrap();
        ProcessTree::new().kill_tree(pid);
        std::thread::sleep(std::time::Duration::from_millis(100));

        helper.ensure_started().unwrap();
        assert_eq!(helper.spawn_count(), 2);
        assert_ne!(helper.pid(), Some(pid));

        helper.shutdown();
        assert!(helper.pid().is_none());
    }
}
