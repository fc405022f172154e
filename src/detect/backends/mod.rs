pub mod stub;
#[cfg(feature = "detector-tract")]
pub mod tract;
pub mod triton;

pub use stub::StubBackend;
#[cfg(feature = "detector-tract")]
pub use tract::TractBackend;
pub use triton::TritonBackend;
