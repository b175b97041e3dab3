use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("gpio pin {0} is busy")]
    PinBusy(u8),
    #[error("{0} unavailable")]
    Unavailable(String),
    #[error("injected fault on {0} line")]
    Injected(&'static str),
}

pub type Result<T> = std::result::Result<T, HwError>;
