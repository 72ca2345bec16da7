use super::{opcode as op, TerminalPlatform};
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SpecialCharacterIndices,
    Termios,
};

/// IUCLC and XCASE are left out: nix drops bits it does not model whenever it
/// rebuilds a `Termios` from the raw struct, so they cannot be carried.
pub struct NativeTerminal;

const BAUD_RATES: &[(BaudRate, u32)] = &[
    (BaudRate::B0, 0),
    (BaudRate::B50, 50),
    (BaudRate::B75, 75),
    (BaudRate::B110, 110),
    (BaudRate::B134, 134),
    (BaudRate::B150, 150),
    (BaudRate::B200, 200),
    (BaudRate::B300, 300),
    (BaudRate::B600, 600),
    (BaudRate::B1200, 1200),
    (BaudRate::B1800, 1800),
    (BaudRate::B2400, 2400),
    (BaudRate::B4800, 4800),
    (BaudRate::B9600, 9600),
    (BaudRate::B19200, 19200),
    (BaudRate::B38400, 38400),
    (BaudRate::B57600, 57600),
    (BaudRate::B115200, 115200),
    (BaudRate::B230400, 230400),
    (BaudRate::B460800, 460800),
];

fn rate_of(baud: BaudRate) -> Option<u32> {
    BAUD_RATES
        .iter()
        .find(|(b, _)| *b == baud)
        .map(|(_, rate)| *rate)
}

fn baud_of(rate: u32) -> Option<BaudRate> {
    BAUD_RATES
        .iter()
        .find(|(_, r)| *r == rate)
        .map(|(baud, _)| *baud)
}

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
        (op::VREPRINT, SpecialCharacterIndices::VREPRINT),
        (op::VWERASE, SpecialCharacterIndices::VWERASE),
        (op::VLNEXT, SpecialCharacterIndices::VLNEXT),
        (op::VSWTCH, SpecialCharacterIndices::VSWTC),
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
        (op::OLCUC, OutputFlags::OLCUC),
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
            rate_of(termios::cfgetispeed(t)),
            rate_of(termios::cfgetospeed(t)),
        )
    }

    fn set_input_speed(t: &mut Termios, rate: u32) {
        if let Some(baud) = baud_of(rate) {
            let _ = termios::cfsetispeed(t, baud);
        }
    }

    fn set_output_speed(t: &mut Termios, rate: u32) {
        if let Some(baud) = baud_of(rate) {
            let _ = termios::cfsetospeed(t, baud);
        }
    }
}
