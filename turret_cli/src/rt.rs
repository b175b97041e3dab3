//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall).
//!
//! Everything here is best effort: a failure is logged and the rig keeps
//! running with normal scheduling.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
fn last_os_error(what: &str) -> eyre::Report {
    eyre::eyre!("{what} failed: {}", std::io::Error::last_os_error())
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit only writes into the provided struct.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was filled in.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    Some(if cur == libc::RLIM_INFINITY {
        "memlock limit: unlimited".to_string()
    } else {
        format!("memlock limit: {} KiB", cur / 1024)
    })
}

#[cfg(target_os = "linux")]
fn apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => libc::MCL_CURRENT,
        RtLock::All => libc::MCL_CURRENT | libc::MCL_FUTURE,
    };
    // SAFETY: mlockall takes plain flags and touches no caller memory.
    if unsafe { libc::mlockall(flags) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    // All needs more headroom than Current; settle for what is resident.
    if lock == RtLock::All
        && matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
        // SAFETY: as above.
        && unsafe { libc::mlockall(libc::MCL_CURRENT) } == 0
    {
        tracing::warn!(error = %err, "mlockall(current|future) failed; locked current pages only");
        return Ok(());
    }
    let mut msg = format!("mlockall failed: {err}");
    if let Some(h) = memlock_limit_hint() {
        msg.push_str("; ");
        msg.push_str(&h);
    }
    msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    // SAFETY: pure queries of the scheduler's priority range.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let prio = prio.unwrap_or(max).clamp(min, max);
    let param = libc::sched_param {
        sched_priority: prio,
    };
    // SAFETY: param outlives the call; pid 0 is the calling process.
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
        return Err(last_os_error("sched_setscheduler(SCHED_FIFO)"));
    }
    Ok(prio)
}

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();
    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match apply_mem_lock(lock) {
            Ok(()) => tracing::info!(?lock, "rt memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt memory lock not applied"),
        }
        match apply_fifo_priority(prio) {
            Ok(p) => tracing::info!(prio = p, "rt SCHED_FIFO applied"),
            Err(e) => tracing::warn!(error = %e, "rt priority not applied; needs CAP_SYS_NICE or root"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock) {
    if rt {
        tracing::warn!("real-time mode is only supported on Linux; ignoring --rt");
    }
}
