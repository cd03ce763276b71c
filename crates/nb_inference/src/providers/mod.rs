pub mod dummy;
pub mod openai;

pub use dummy::DummyProvider;
pub use openai::OpenAiProvider;
