//! SSH signal names and their host signal numbers.

/// Every signal name the relay understands, with the host number.
pub const SIGNALS: &[(&str, libc::c_int)] = &[
    ("ABRT", libc::SIGABRT),
    ("ALRM", libc::SIGALRM),
    ("FPE", libc::SIGFPE),
    ("HUP", libc::SIGHUP),
    ("ILL", libc::SIGILL),
    ("INT", libc::SIGINT),
    ("KILL", libc::SIGKILL),
    ("PIPE", libc::SIGPIPE),
    ("QUIT", libc::SIGQUIT),
    ("SEGV", libc::SIGSEGV),
    ("TERM", libc::SIGTERM),
    ("USR1", libc::SIGUSR1),
    ("USR2", libc::SIGUSR2),
];

/// Signals a local process can catch and pass on. FPE, ILL and SEGV are
/// known by name but cannot be hooked; KILL cannot be caught at all.
pub const FORWARDABLE: &[libc::c_int] = &[
    libc::SIGABRT,
    libc::SIGALRM,
    libc::SIGHUP,
    libc::SIGINT,
    libc::SIGPIPE,
    libc::SIGQUIT,
    libc::SIGTERM,
    libc::SIGUSR1,
    libc::SIGUSR2,
];

/// Accepts `TERM` and `SIGTERM`.
pub fn signal_number(name: &str) -> Option<libc::c_int> {
    let name = name.strip_prefix("SIG").unwrap_or(name);
    SIGNALS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, signo)| *signo)
}

pub fn signal_name(signo: libc::c_int) -> Option<&'static str> {
    SIGNALS
        .iter()
        .find(|(_, known)| *known == signo)
        .map(|(name, _)| *name)
}
