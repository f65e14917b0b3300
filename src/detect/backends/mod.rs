pub mod cpu;
pub mod stub;

pub use cpu::FrameDifferencer;
pub use stub::StubExtractor;
