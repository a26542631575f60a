/// Terminal and file logging through simplelog.
pub mod logger;
