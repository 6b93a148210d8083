pub mod conformance;
pub mod interpreter;
pub mod types;

pub use interpreter::Interpreter;
