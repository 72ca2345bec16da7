//! Conversion between native termios and the SSH terminal-mode encoding.
//!
//! Terminal modes travel as `(opcode, value)` pairs using the opcodes of the
//! SSH `pty-req` encoding. Each host OS supplies its own tables mapping
//! opcodes to native flag bits and control-character slots; bits that one OS
//! does not have are simply absent from its tables and are dropped on the way
//! in.

use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};
use std::collections::BTreeMap;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use thiserror::Error;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::NativeTerminal;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::NativeTerminal;

/// SSH terminal-mode opcodes (RFC 4254 section 8).
pub mod opcode {
    pub const TTY_OP_END: u8 = 0;
    pub const VINTR: u8 = 1;
    pub const VQUIT: u8 = 2;
    pub const VERASE: u8 = 3;
    pub const VKILL: u8 = 4;
    pub const VEOF: u8 = 5;
    pub const VEOL: u8 = 6;
    pub const VEOL2: u8 = 7;
    pub const VSTART: u8 = 8;
    pub const VSTOP: u8 = 9;
    pub const VSUSP: u8 = 10;
    pub const VDSUSP: u8 = 11;
    pub const VREPRINT: u8 = 12;
    pub const VWERASE: u8 = 13;
    pub const VLNEXT: u8 = 14;
    pub const VFLUSH: u8 = 15;
    pub const VSWTCH: u8 = 16;
    pub const VSTATUS: u8 = 17;
    pub const VDISCARD: u8 = 18;

    pub const IGNPAR: u8 = 30;
    pub const PARMRK: u8 = 31;
    pub const INPCK: u8 = 32;
    pub const ISTRIP: u8 = 33;
    pub const INLCR: u8 = 34;
    pub const IGNCR: u8 = 35;
    pub const ICRNL: u8 = 36;
    pub const IUCLC: u8 = 37;
    pub const IXON: u8 = 38;
    pub const IXANY: u8 = 39;
    pub const IXOFF: u8 = 40;
    pub const IMAXBEL: u8 = 41;
    pub const IUTF8: u8 = 42;

    pub const ISIG: u8 = 50;
    pub const ICANON: u8 = 51;
    pub const XCASE: u8 = 52;
    pub const ECHO: u8 = 53;
    pub const ECHOE: u8 = 54;
    pub const ECHOK: u8 = 55;
    pub const ECHONL: u8 = 56;
    pub const NOFLSH: u8 = 57;
    pub const TOSTOP: u8 = 58;
    pub const IEXTEN: u8 = 59;
    pub const ECHOCTL: u8 = 60;
    pub const ECHOKE: u8 = 61;
    pub const PENDIN: u8 = 62;

    pub const OPOST: u8 = 70;
    pub const OLCUC: u8 = 71;
    pub const ONLCR: u8 = 72;
    pub const OCRNL: u8 = 73;
    pub const ONOCR: u8 = 74;
    pub const ONLRET: u8 = 75;

    pub const CS7: u8 = 90;
    pub const CS8: u8 = 91;
    pub const PARENB: u8 = 92;
    pub const PARODD: u8 = 93;

    pub const TTY_OP_ISPEED: u8 = 128;
    pub const TTY_OP_OSPEED: u8 = 129;
}

#[derive(Debug, Error)]
pub enum TermiosError {
    #[error("failed to read terminal attributes: {0}")]
    Get(#[source] nix::Error),
    #[error("failed to set terminal attributes: {0}")]
    Set(#[source] nix::Error),
    #[error("failed to query window size: {0}")]
    WindowSize(#[source] std::io::Error),
    #[error("failed to set window size: {0}")]
    SetWindowSize(#[source] std::io::Error),
}

/// Terminal modes keyed by opcode. Flags are 0 or 1; control characters and
/// speeds carry their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortableModes(BTreeMap<u8, u32>);

impl PortableModes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, opcode: u8) -> Option<u32> {
        self.0.get(&opcode).copied()
    }

    pub fn set(&mut self, opcode: u8, value: u32) {
        self.0.insert(opcode, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs in opcode order, ready for a `pty-req`.
    pub fn to_pairs(&self) -> Vec<(u8, u32)> {
        self.0.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Rebuild from wire pairs. `TTY_OP_END` and anything past it is ignored.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u8, u32)>) -> Self {
        let mut modes = Self::new();
        for (opcode, value) in pairs {
            if opcode == opcode::TTY_OP_END {
                break;
            }
            modes.set(opcode, value);
        }
        modes
    }
}

/// Host terminal capabilities: the opcode tables, baud-rate handling and the
/// attribute syscalls.
pub trait TerminalPlatform {
    const CONTROL_CHARS: &'static [(u8, SpecialCharacterIndices)];
    const INPUT_FLAGS: &'static [(u8, InputFlags)];
    const LOCAL_FLAGS: &'static [(u8, LocalFlags)];
    const OUTPUT_FLAGS: &'static [(u8, OutputFlags)];
    const CONTROL_FLAGS: &'static [(u8, ControlFlags)];

    /// Input and output speed in bits per second, when representable.
    fn speeds(termios: &Termios) -> (Option<u32>, Option<u32>);
    /// Rates the host cannot express are left as they were.
    fn set_input_speed(termios: &mut Termios, rate: u32);
    fn set_output_speed(termios: &mut Termios, rate: u32);

    fn get_attributes(fd: BorrowedFd<'_>) -> Result<Termios, TermiosError> {
        termios::tcgetattr(fd).map_err(TermiosError::Get)
    }

    fn set_attributes(fd: BorrowedFd<'_>, attrs: &Termios) -> Result<(), TermiosError> {
        termios::tcsetattr(fd, SetArg::TCSANOW, attrs).map_err(TermiosError::Set)
    }
}

pub fn get_attributes<Fd: AsFd>(fd: Fd) -> Result<Termios, TermiosError> {
    NativeTerminal::get_attributes(fd.as_fd())
}

pub fn set_attributes<Fd: AsFd>(fd: Fd, attrs: &Termios) -> Result<(), TermiosError> {
    NativeTerminal::set_attributes(fd.as_fd(), attrs)
}

pub fn to_portable(native: &Termios) -> PortableModes {
    to_portable_with::<NativeTerminal>(native)
}

pub fn apply_portable(modes: &PortableModes, native: &mut Termios) {
    apply_portable_with::<NativeTerminal>(modes, native)
}

pub fn to_portable_with<P: TerminalPlatform>(native: &Termios) -> PortableModes {
    let mut modes = PortableModes::new();

    for (op, index) in P::CONTROL_CHARS {
        modes.set(*op, u32::from(native.control_chars[*index as usize]));
    }
    for (op, flag) in P::INPUT_FLAGS {
        modes.set(*op, u32::from(native.input_flags.contains(*flag)));
    }
    for (op, flag) in P::LOCAL_FLAGS {
        modes.set(*op, u32::from(native.local_flags.contains(*flag)));
    }
    for (op, flag) in P::OUTPUT_FLAGS {
        modes.set(*op, u32::from(native.output_flags.contains(*flag)));
    }
    for (op, flag) in P::CONTROL_FLAGS {
        modes.set(*op, u32::from(native.control_flags.contains(*flag)));
    }

    // Character size is a field, not a pair of independent bits.
    let size = native.control_flags & ControlFlags::CSIZE;
    modes.set(opcode::CS7, u32::from(size == ControlFlags::CS7));
    modes.set(opcode::CS8, u32::from(size == ControlFlags::CS8));

    let (ispeed, ospeed) = P::speeds(native);
    if let Some(rate) = ispeed {
        modes.set(opcode::TTY_OP_ISPEED, rate);
    }
    if let Some(rate) = ospeed {
        modes.set(opcode::TTY_OP_OSPEED, rate);
    }
    modes
}

pub fn apply_portable_with<P: TerminalPlatform>(modes: &PortableModes, native: &mut Termios) {
    // Speeds first: setting them rebuilds the flag fields from the raw struct.
    if let Some(rate) = modes.get(opcode::TTY_OP_ISPEED) {
        P::set_input_speed(native, rate);
    }
    if let Some(rate) = modes.get(opcode::TTY_OP_OSPEED) {
        P::set_output_speed(native, rate);
    }

    for (op, index) in P::CONTROL_CHARS {
        if let Some(value) = modes.get(*op) {
            native.control_chars[*index as usize] = value as libc::cc_t;
        }
    }
    for (op, flag) in P::INPUT_FLAGS {
        if let Some(value) = modes.get(*op) {
            native.input_flags.set(*flag, value != 0);
        }
    }
    for (op, flag) in P::LOCAL_FLAGS {
        if let Some(value) = modes.get(*op) {
            native.local_flags.set(*flag, value != 0);
        }
    }
    for (op, flag) in P::OUTPUT_FLAGS {
        if let Some(value) = modes.get(*op) {
            native.output_flags.set(*flag, value != 0);
        }
    }
    for (op, flag) in P::CONTROL_FLAGS {
        if let Some(value) = modes.get(*op) {
            native.control_flags.set(*flag, value != 0);
        }
    }

    let size = match (modes.get(opcode::CS8), modes.get(opcode::CS7)) {
        (Some(v), _) if v != 0 => Some(ControlFlags::CS8),
        (_, Some(v)) if v != 0 => Some(ControlFlags::CS7),
        _ => None,
    };
    if let Some(size) = size {
        native.control_flags.remove(ControlFlags::CSIZE);
        native.control_flags.insert(size);
    }
}

/// Terminal geometry in cells and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            ..Default::default()
        }
    }
}

pub fn window_size<Fd: AsRawFd>(fd: &Fd) -> Result<WindowSize, TermiosError> {
    // SAFETY: TIOCGWINSZ writes one winsize into the zeroed struct we own.
    let ws = unsafe {
        let mut ws: libc::winsize = std::mem::zeroed();
        if libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ, &mut ws as *mut _) != 0 {
            return Err(TermiosError::WindowSize(std::io::Error::last_os_error()));
        }
        ws
    };
    Ok(WindowSize {
        cols: ws.ws_col,
        rows: ws.ws_row,
        pixel_width: ws.ws_xpixel,
        pixel_height: ws.ws_ypixel,
    })
}

pub fn set_window_size<Fd: AsRawFd>(fd: &Fd, size: WindowSize) -> Result<(), TermiosError> {
    let ws = libc::winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: size.pixel_width,
        ws_ypixel: size.pixel_height,
    };
    // SAFETY: TIOCSWINSZ only reads the winsize we pass.
    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ, &ws as *const _) } != 0 {
        return Err(TermiosError::SetWindowSize(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn blank() -> Termios {
        // SAFETY: an all-zero termios is a valid (if useless) value.
        let raw: libc::termios = unsafe { std::mem::zeroed() };
        Termios::from(raw)
    }

    fn interactive() -> Termios {
        let mut t = blank();
        t.input_flags = InputFlags::ICRNL | InputFlags::IXON | InputFlags::IMAXBEL;
        t.output_flags = OutputFlags::OPOST | OutputFlags::ONLCR;
        t.local_flags = LocalFlags::ISIG
            | LocalFlags::ICANON
            | LocalFlags::ECHO
            | LocalFlags::ECHOE
            | LocalFlags::IEXTEN;
        t.control_flags = ControlFlags::CS8 | ControlFlags::CREAD;
        t.control_chars[SpecialCharacterIndices::VINTR as usize] = 0x03;
        t.control_chars[SpecialCharacterIndices::VEOF as usize] = 0x04;
        t
    }

    #[test]
    fn flags_are_zero_or_one() {
        let modes = to_portable(&interactive());
        assert_eq!(modes.get(opcode::ICRNL), Some(1));
        assert_eq!(modes.get(opcode::INLCR), Some(0));
        assert_eq!(modes.get(opcode::ECHO), Some(1));
        assert_eq!(modes.get(opcode::ONLCR), Some(1));
        assert_eq!(modes.get(opcode::VINTR), Some(3));
        assert_eq!(modes.get(opcode::CS8), Some(1));
        assert_eq!(modes.get(opcode::CS7), Some(0));
        for (op, value) in modes.to_pairs() {
            if (30..=93).contains(&op) {
                assert!(value <= 1, "opcode {op} carried {value}");
            }
        }
    }

    #[test]
    fn apply_leaves_absent_keys_untouched() {
        let mut native = interactive();
        let mut modes = PortableModes::new();
        modes.set(opcode::ECHO, 0);
        apply_portable(&modes, &mut native);

        assert!(!native.local_flags.contains(LocalFlags::ECHO));
        assert!(native.local_flags.contains(LocalFlags::ICANON));
        assert!(native.input_flags.contains(InputFlags::ICRNL));
        assert_eq!(native.control_chars[SpecialCharacterIndices::VINTR as usize], 3);
    }

    #[test]
    fn unknown_opcodes_are_ignored() {
        let mut native = interactive();
        let before = native.clone();
        let modes = PortableModes::from_pairs([(200, 1), (opcode::VFLUSH, 9), (99, 1)]);
        apply_portable(&modes, &mut native);
        assert_eq!(native.input_flags, before.input_flags);
        assert_eq!(native.local_flags, before.local_flags);
        assert_eq!(native.control_flags, before.control_flags);
    }

    #[test]
    fn character_size_is_applied_as_a_field() {
        let mut native = interactive();
        let modes = PortableModes::from_pairs([(opcode::CS7, 1), (opcode::CS8, 0)]);
        apply_portable(&modes, &mut native);
        assert_eq!(native.control_flags & ControlFlags::CSIZE, ControlFlags::CS7);
        assert!(native.control_flags.contains(ControlFlags::CREAD));
    }

    #[test]
    fn from_pairs_stops_at_end_marker() {
        let modes = PortableModes::from_pairs([(opcode::ECHO, 1), (0, 0), (opcode::ISIG, 1)]);
        assert_eq!(modes.len(), 1);
        assert_eq!(modes.get(opcode::ISIG), None);
    }

    #[test]
    fn speeds_round_trip() {
        let mut native = interactive();
        let mut modes = PortableModes::new();
        modes.set(opcode::TTY_OP_ISPEED, 38400);
        modes.set(opcode::TTY_OP_OSPEED, 38400);
        apply_portable(&modes, &mut native);

        let back = to_portable(&native);
        assert_eq!(back.get(opcode::TTY_OP_ISPEED), Some(38400));
        assert_eq!(back.get(opcode::TTY_OP_OSPEED), Some(38400));
    }

    #[test]
    fn speeds_do_not_disturb_applied_flags() {
        let mut native = blank();
        let modes = PortableModes::from_pairs([
            (opcode::IXANY, 1),
            (opcode::IMAXBEL, 1),
            (opcode::ECHOKE, 1),
            (opcode::TTY_OP_ISPEED, 9600),
            (opcode::TTY_OP_OSPEED, 9600),
        ]);
        apply_portable(&modes, &mut native);
        assert!(native.input_flags.contains(InputFlags::IXANY | InputFlags::IMAXBEL));
        assert!(native.local_flags.contains(LocalFlags::ECHOKE));
        assert_eq!(to_portable(&native).get(opcode::TTY_OP_ISPEED), Some(9600));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn case_folding_modes_are_not_carried() {
        let mut native = interactive();
        let before = native.clone();
        let modes = PortableModes::from_pairs([(opcode::IUCLC, 1), (opcode::XCASE, 1)]);
        apply_portable(&modes, &mut native);
        assert_eq!(native.input_flags, before.input_flags);
        assert_eq!(native.local_flags, before.local_flags);

        let portable = to_portable(&native);
        assert_eq!(portable.get(opcode::IUCLC), None);
        assert_eq!(portable.get(opcode::XCASE), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unrepresentable_speed_is_dropped() {
        let mut native = interactive();
        let modes = PortableModes::from_pairs([(opcode::TTY_OP_OSPEED, 38400)]);
        apply_portable(&modes, &mut native);
        let odd = PortableModes::from_pairs([(opcode::TTY_OP_OSPEED, 12345)]);
        apply_portable(&odd, &mut native);
        assert_eq!(to_portable(&native).get(opcode::TTY_OP_OSPEED), Some(38400));
    }

    fn arb_termios() -> impl Strategy<Value = Termios> {
        (
            any::<u64>(),
            proptest::collection::vec(any::<u8>(), NativeTerminal::CONTROL_CHARS.len()),
            any::<bool>(),
        )
            .prop_map(|(bits, chars, wide)| {
                let mut t = blank();
                let mut bit = 0;
                let mut next = || {
                    let on = bits & (1 << (bit % 64)) != 0;
                    bit += 1;
                    on
                };
                for (_, flag) in NativeTerminal::INPUT_FLAGS {
                    t.input_flags.set(*flag, next());
                }
                for (_, flag) in NativeTerminal::LOCAL_FLAGS {
                    t.local_flags.set(*flag, next());
                }
                for (_, flag) in NativeTerminal::OUTPUT_FLAGS {
                    t.output_flags.set(*flag, next());
                }
                for (_, flag) in NativeTerminal::CONTROL_FLAGS {
                    t.control_flags.set(*flag, next());
                }
                t.control_flags.remove(ControlFlags::CSIZE);
                t.control_flags
                    .insert(if wide { ControlFlags::CS8 } else { ControlFlags::CS7 });
                for ((_, index), value) in NativeTerminal::CONTROL_CHARS.iter().zip(chars) {
                    t.control_chars[*index as usize] = value;
                }
                t
            })
    }

    proptest! {
        #[test]
        fn apply_reproduces_every_mapped_bit(source in arb_termios()) {
            let mut fresh = blank();
            apply_portable(&to_portable(&source), &mut fresh);

            for (_, flag) in NativeTerminal::INPUT_FLAGS {
                prop_assert_eq!(fresh.input_flags.contains(*flag), source.input_flags.contains(*flag));
            }
            for (_, flag) in NativeTerminal::LOCAL_FLAGS {
                prop_assert_eq!(fresh.local_flags.contains(*flag), source.local_flags.contains(*flag));
            }
            for (_, flag) in NativeTerminal::OUTPUT_FLAGS {
                prop_assert_eq!(fresh.output_flags.contains(*flag), source.output_flags.contains(*flag));
            }
            for (_, flag) in NativeTerminal::CONTROL_FLAGS {
                prop_assert_eq!(fresh.control_flags.contains(*flag), source.control_flags.contains(*flag));
            }
            prop_assert_eq!(
                fresh.control_flags & ControlFlags::CSIZE,
                source.control_flags & ControlFlags::CSIZE
            );
            for (_, index) in NativeTerminal::CONTROL_CHARS {
                prop_assert_eq!(fresh.control_chars[*index as usize], source.control_chars[*index as usize]);
            }
        }

        #[test]
        fn arbitrary_modes_never_panic(pairs in proptest::collection::vec((any::<u8>(), any::<u32>()), 0..64)) {
            let mut native = interactive();
            apply_portable(&PortableModes::from_pairs(pairs), &mut native);
        }
    }
}
