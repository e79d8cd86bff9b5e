#![allow(unused_macros, dead_code)]
macro_rules! verbose_println {
    ($level:expr, $($p:expr),+) => {
        if crate::config::ARGS.verbose >= ($level) {
            println!($($p),+);
        }
    }
}
// Adding explicit carriage returns to some of these because in testing (at least on mac)
// I found that CR would occasionally be elided when only LF was used.
macro_rules! info {
    ($($p:expr),+) => {
        println!(concat!(blue!("INFO"),": {}\r"),format_args!($($p),+))
    }
}

macro_rules! warn {
    ($($p:expr),+) => {
        println!(concat!(yellow!("WARNING"),": {}\r"),format_args!($($p),+))
    }
}
macro_rules! line_err {
    ($line:expr, $kind:expr, $($msg:expr),+) => {
        crate::error::Error::new($kind, Some($line), format!($($msg),+).as_str())
    };
}
macro_rules! syntax_err {
    ($line:expr, $($msg:expr),+) => {
        crate::error::Error::new(
            crate::error::ErrorKind::Syntax,
            Some($line),
            format!($($msg),+).as_str(),
        )
    };
}
macro_rules! config_err {
    ($($msg:expr),+) => {
        crate::error::Error::new(crate::error::ErrorKind::Config, None, format!($($msg),+).as_str())
    };
}
macro_rules! general_err {
    ($($msg:expr),+) => {
        crate::error::Error::new(crate::error::ErrorKind::General, None, format!($($msg),+).as_str())
    };
}
macro_rules! range_err {
    ($line:expr, $($msg:expr),+) => {
        crate::error::Error::new(
            crate::error::ErrorKind::Range,
            Some($line),
            format!($($msg),+).as_str(),
        )
    };
}
macro_rules! color {
    ($color: literal, $msg: expr) => {
        concat!("\x1b[", $color, "m", $msg, "\x1b[0m")
    };
}
macro_rules! red {
    ($msg:expr) => {
        color!(91, $msg)
    };
}
macro_rules! green {
    ($msg:expr) => {
        color!(92, $msg)
    };
}
macro_rules! yellow {
    ($msg:expr) => {
        color!(93, $msg)
    };
}
macro_rules! blue {
    ($msg:expr) => {
        color!(94, $msg)
    };
}
