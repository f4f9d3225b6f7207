#![allow(unused_macros)]

mod simple_logger;

pub(crate) use simple_logger::SimpleLogger;

/// Diagnostics addressed to the person at the terminal, e.g. "cd: no such
/// file or directory". Always enabled.
macro_rules! user_error {
    ($($arg:tt)+) => { ::log::error!(target: "jobsh::user", $($arg)+) };
}
// macro_rules! user_warn {
//     ($($arg:tt)+) => { ::log::warn!(target: "jobsh::user", $($arg)+) };
// }
// macro_rules! user_info {
//     ($($arg:tt)+) => { ::log::info!(target: "jobsh::user", $($arg)+) };
// }

pub(crate) use user_error;

// Internal tracing, compiled in only with the "dev" feature.
macro_rules! dev_warn {
    ($($arg:tt)+) => {
        if std::cfg!(feature = "dev") {
            ::log::warn!(target: "jobsh::dev", $($arg)+)
        }
    };
}
// macro_rules! dev_info {
//     ($($arg:tt)+) => {
//         if std::cfg!(feature = "dev") {
//             ::log::info!(target: "jobsh::dev", $($arg)+)
//         }
//     };
// }
macro_rules! dev_debug {
    ($($arg:tt)+) => {
        if std::cfg!(feature = "dev") {
            ::log::debug!(target: "jobsh::dev", $($arg)+)
        }
    };
}

pub(crate) use {dev_debug, dev_warn};

/// Install the stderr logger. Must run before the first diagnostic is emitted.
pub fn init() {
    if log::set_boxed_logger(Box::new(SimpleLogger::to_stderr("jobsh: "))).is_ok() {
        let max_level = if cfg!(feature = "dev") {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        log::set_max_level(max_level);
    }
}
