pub mod error;
pub mod evidence;
pub mod identifiers;
pub mod media;
pub mod memory;
pub mod ports;
pub mod records;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
