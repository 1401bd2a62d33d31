//! Signal translation and delivery.

use rkernel_protocols::LifecycleError;

#[cfg(unix)]
pub(crate) use nix::sys::signal::Signal;
#[cfg(unix)]
use rkernel_protocols::KernelSignal;

/// Parse a signal name such as `SIGUSR2` or `usr2`.
#[cfg(unix)]
pub(crate) fn parse_signal(name: &str) -> Result<Signal, LifecycleError> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    full.parse::<Signal>()
        .map_err(|_| LifecycleError::InvalidConfig(format!("unknown signal '{}'", name)))
}

#[cfg(not(unix))]
pub(crate) fn parse_signal(_name: &str) -> Result<(), LifecycleError> {
    Ok(())
}

/// OS signal for an abstract kernel signal.
#[cfg(unix)]
pub(crate) fn translate(signal: KernelSignal, interrupt: Signal) -> Signal {
    match signal {
        KernelSignal::Interrupt => interrupt,
        KernelSignal::Terminate => Signal::SIGTERM,
        KernelSignal::Kill => Signal::SIGKILL,
    }
}

/// Send a signal to the process group led by `pid`.
#[cfg(unix)]
pub(crate) fn send_to_group(pid: u32, signal: Signal) -> nix::Result<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), signal)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal("SIGINT").unwrap(), Signal::SIGINT);
        assert_eq!(parse_signal("sigusr2").unwrap(), Signal::SIGUSR2);
        assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM);
        assert!(parse_signal("SIGNOPE").is_err());
    }

    #[test]
    fn test_translate() {
        assert_eq!(
            translate(KernelSignal::Interrupt, Signal::SIGUSR2),
            Signal::SIGUSR2
        );
        assert_eq!(
            translate(KernelSignal::Terminate, Signal::SIGINT),
            Signal::SIGTERM
        );
        assert_eq!(translate(KernelSignal::Kill, Signal::SIGINT), Signal::SIGKILL);
    }
}
