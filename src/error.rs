//! Daemon Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Which startup or shutdown step failed. Everything here ends the process.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("cannot load configuration")]
    Config,
    #[display("cannot open durable store")]
    Store,
    #[display("watcher failure")]
    Watcher,
    #[display("cannot listen for shutdown signal")]
    Signal,
}
