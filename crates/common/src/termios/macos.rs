use super::{opcode as op, TerminalPlatform};
use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SpecialCharacterIndices, Termios,
};

/// Darwin has no IUCLC, XCASE, OLCUC or VSWTC; it adds VDSUSP and VSTATUS.
pub struct NativeTerminal;

impl TerminalPlatform for NativeTerminal {
    const CONTROL_CHARS: &'static [(u8, SpecialCharacterIndices)] = &[
        (op::VINTR, SpecialCharacterIndices::VINTR),
        (op::VQUIT, SpecialCharacterIndices::VQUIT),
        (op::VERASE, SpecialCharacterIndices::VERASE),
        (op::VKILL, SpecialCharacterIndices::VKILL),
        (op::VEOF, SpecialCharacterIndices::VEOF),
        (op::VEOL, SpecialCharacterIndices::VEOL),
        (op::VEOL2, SpecialCharacterIndices::VEOL2),
        (op::VSTART, SpecialCharacterIndices::VSTART),
        (op::VSTOP, SpecialCharacterIndices::VSTOP),
        (op::VSUSP, SpecialCharacterIndices::VSUSP),
        (op::VDSUSP, SpecialCharacterIndices::VDSUSP),
        (op::VREPRINT, SpecialCharacterIndices::VREPRINT),
        (op::VWERASE, SpecialCharacterIndices::VWERASE),
        (op::VLNEXT, SpecialCharacterIndices::VLNEXT),
        (op::VSTATUS, SpecialCharacterIndices::VSTATUS),
        (op::VDISCARD, SpecialCharacterIndices::VDISCARD),
    ];

    const INPUT_FLAGS: &'static [(u8, InputFlags)] = &[
        (op::IGNPAR, InputFlags::IGNPAR),
        (op::PARMRK, InputFlags::PARMRK),
        (op::INPCK, InputFlags::INPCK),
        (op::ISTRIP, InputFlags::ISTRIP),
        (op::INLCR, InputFlags::INLCR),
        (op::IGNCR, InputFlags::IGNCR),
        (op::ICRNL, InputFlags::ICRNL),
        (op::IXON, InputFlags::IXON),
        (op::IXANY, InputFlags::IXANY),
        (op::IXOFF, InputFlags::IXOFF),
        (op::IMAXBEL, InputFlags::IMAXBEL),
        (op::IUTF8, InputFlags::IUTF8),
    ];

    const LOCAL_FLAGS: &'static [(u8, LocalFlags)] = &[
        (op::ISIG, LocalFlags::ISIG),
        (op::ICANON, LocalFlags::ICANON),
        (op::ECHO, LocalFlags::ECHO),
        (op::ECHOE, LocalFlags::ECHOE),
        (op::ECHOK, LocalFlags::ECHOK),
        (op::ECHONL, LocalFlags::ECHONL),
        (op::NOFLSH, LocalFlags::NOFLSH),
        (op::TOSTOP, LocalFlags::TOSTOP),
        (op::IEXTEN, LocalFlags::IEXTEN),
        (op::ECHOCTL, LocalFlags::ECHOCTL),
        (op::ECHOKE, LocalFlags::ECHOKE),
        (op::PENDIN, LocalFlags::PENDIN),
    ];

    const OUTPUT_FLAGS: &'static [(u8, OutputFlags)] = &[
        (op::OPOST, OutputFlags::OPOST),
        (op::ONLCR, OutputFlags::ONLCR),
        (op::OCRNL, OutputFlags::OCRNL),
        (op::ONOCR, OutputFlags::ONOCR),
        (op::ONLRET, OutputFlags::ONLRET),
    ];

    const CONTROL_FLAGS: &'static [(u8, ControlFlags)] = &[
        (op::PARENB, ControlFlags::PARENB),
        (op::PARODD, ControlFlags::PARODD),
    ];

    fn speeds(t: &Termios) -> (Option<u32>, Option<u32>) {
        (
            Some(termios::cfgetispeed(t)),
            Some(termios::cfgetospeed(t)),
        )
    }

    fn set_input_speed(t: &mut Termios, rate: u32) {
        let _ = termios::cfsetispeed(t, rate);
    }

    fn set_output_speed(t: &mut Termios, rate: u32) {
        let _ = termios::cfsetospeed(t, rate);
    }
}
