pub mod context;
pub mod error;
pub mod object;
pub mod severity;
pub mod value;

pub use context::Context;
pub use error::{ConfigurationError, DomainError};
pub use object::{ObjectRef, Reflect, TypeDescriptor, TypeDescriptorBuilder};
pub use severity::{ConstraintTarget, Severity};
pub use value::Value;
