//! Process Tree Termination
//!
//! 先终止所有子孙进程，再终止进程本身，避免训练脚本派生的 GPU worker 成为孤儿。
//! unix 上子进程以独立进程组启动，最后再对整个进程组补发 SIGKILL。

/// 终止 pid 及其全部子孙进程，返回发送终止信号的进程数
pub fn kill_tree(pid: u32) -> usize {
    let Some(pid) = sanitize_pid(pid) else {
        tracing::warn!(pid = pid, "Skipping kill for invalid pid");
        return 0;
    };

    let descendants = descendants_of(pid);
    tracing::debug!(
        pid = pid,
        descendants = descendants.len(),
        "Killing process tree"
    );

    // 广度优先收集，反向遍历即叶子先行
    let mut killed = 0;
    for child in descendants.iter().rev() {
        if terminate(*child) {
            killed += 1;
        }
    }
    terminate_group(pid);
    if terminate(pid) {
        killed += 1;
    }
    killed
}

fn sanitize_pid(pid: u32) -> Option<u32> {
    if pid == 0 || pid > i32::MAX as u32 {
        None
    } else {
        Some(pid)
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) == 0 }
}

#[cfg(unix)]
fn terminate_group(pgid: u32) {
    unsafe {
        libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(windows)]
fn terminate(pid: u32) -> bool {
    // taskkill /T 自带子树遍历
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn terminate_group(_pgid: u32) {}

/// 广度优先列出子孙进程（父进程在子进程之前）
#[cfg(target_os = "linux")]
fn descendants_of(root: u32) -> Vec<u32> {
    let table = process_table();
    let mut result = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for &(pid, ppid) in &table {
            if ppid == parent && pid != root && !result.contains(&pid) {
                result.push(pid);
                frontier.insert(0, pid);
            }
        }
    }
    result
}

#[cfg(not(target_os = "linux"))]
fn descendants_of(_root: u32) -> Vec<u32> {
    Vec::new()
}

/// (pid, ppid) 快照
#[cfg(target_os = "linux")]
fn process_table() -> Vec<(u32, u32)> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(|pid| {
            let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
            Some((pid, parse_ppid(&stat)?))
        })
        .collect()
}

/// `/proc/<pid>/stat` 格式: `pid (comm) state ppid ...`，comm 可含空格和括号
#[cfg(any(target_os = "linux", test))]
fn parse_ppid(stat: &str) -> Option<u32> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let mut fields = after_comm.split_whitespace();
    fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ppid() {
        assert_eq!(parse_ppid("1234 (python) S 1000 1234 1234 0"), Some(1000));
        assert_eq!(parse_ppid("77 (weird ) name) R 42 77"), Some(42));
        assert_eq!(parse_ppid("garbage"), None);
    }

    #[test]
    fn test_invalid_pid_is_skipped() {
        assert_eq!(kill_tree(0), 0);
        assert_eq!(kill_tree(u32::MAX), 0);
    }
}
