use thiserror::Error;
use zwh_core::parse::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Parser error: {0}")]
    Parser(#[from] ParseError),
    #[error("Serial port error: {0}")]
    SerialPort(#[from] tokio_serial::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("The serial port is closed")]
    PortClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
