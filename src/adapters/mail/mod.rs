pub mod memory;
pub mod smtp;

pub use memory::MemoryMailTransport;
pub use smtp::SmtpMailTransport;
