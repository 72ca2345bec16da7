//! Local signal capture for the session loop.
//!
//! A dedicated thread owns the signal-hook iterator and feeds two queues: one
//! for signals to forward, one for window-size changes.

use anyhow::{Context, Result};
use ferry_common::signals::{signal_name, signal_number, FORWARDABLE};
use russh::Sig;
use signal_hook::consts::SIGWINCH;
use signal_hook::iterator::{Handle, Signals};
use std::thread;
use tokio::sync::mpsc;

pub struct SignalForwarder {
    pub signals: mpsc::UnboundedReceiver<Sig>,
    pub resizes: mpsc::UnboundedReceiver<()>,
    handle: Handle,
}

impl SignalForwarder {
    /// Start capturing. SIGWINCH is only watched when a PTY is in use.
    pub fn install(watch_resize: bool) -> Result<Self> {
        let mut wanted: Vec<i32> = FORWARDABLE.to_vec();
        if watch_resize {
            wanted.push(SIGWINCH);
        }
        let mut signals = Signals::new(&wanted).context("failed to register signal handlers")?;
        let handle = signals.handle();

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name("ferry-signals".into())
            .spawn(move || {
                for signo in signals.forever() {
                    if signo == SIGWINCH {
                        let _ = resize_tx.send(());
                        continue;
                    }
                    match to_ssh_signal(signo) {
                        Some(sig) => {
                            if signal_tx.send(sig).is_err() {
                                break;
                            }
                        }
                        None => tracing::debug!(signo, "ignoring untranslatable signal"),
                    }
                }
            })
            .context("failed to spawn signal thread")?;

        Ok(Self {
            signals: signal_rx,
            resizes: resize_rx,
            handle,
        })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
    }
}

pub fn to_ssh_signal(signo: i32) -> Option<Sig> {
    let sig = match signal_name(signo)? {
        "ABRT" => Sig::ABRT,
        "ALRM" => Sig::ALRM,
        "FPE" => Sig::FPE,
        "HUP" => Sig::HUP,
        "ILL" => Sig::ILL,
        "INT" => Sig::INT,
        "KILL" => Sig::KILL,
        "PIPE" => Sig::PIPE,
        "QUIT" => Sig::QUIT,
        "SEGV" => Sig::SEGV,
        "TERM" => Sig::TERM,
        "USR1" => Sig::USR1,
        other => Sig::Custom(other.to_string()),
    };
    Some(sig)
}

/// Host number for a signal reported by the remote side.
pub fn from_ssh_signal(sig: &Sig) -> Option<i32> {
    let name = match sig {
        Sig::ABRT => "ABRT",
        Sig::ALRM => "ALRM",
        Sig::FPE => "FPE",
        Sig::HUP => "HUP",
        Sig::ILL => "ILL",
        Sig::INT => "INT",
        Sig::KILL => "KILL",
        Sig::PIPE => "PIPE",
        Sig::QUIT => "QUIT",
        Sig::SEGV => "SEGV",
        Sig::TERM => "TERM",
        Sig::USR1 => "USR1",
        Sig::Custom(name) => name.as_str(),
    };
    signal_number(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_forwardable_signal_translates() {
        for signo in FORWARDABLE {
            let sig = to_ssh_signal(*signo).expect("translatable");
            assert_eq!(from_ssh_signal(&sig), Some(*signo));
        }
    }

    #[test]
    fn usr2_travels_as_custom_name() {
        assert!(matches!(to_ssh_signal(libc::SIGUSR2), Some(Sig::Custom(ref name)) if name == "USR2"));
        assert_eq!(from_ssh_signal(&Sig::Custom("WINCH".into())), None);
        assert!(to_ssh_signal(libc::SIGWINCH).is_none());
    }
}
