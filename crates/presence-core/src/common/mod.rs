pub mod runtime;

pub use runtime::AsyncRuntime;
