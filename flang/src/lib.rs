pub mod construct;
pub mod object;
pub mod parser;
pub mod pattern;
pub mod tree;

pub use construct::builder::{BuildError, Builder};
pub use construct::reference::ReferenceTarget;
pub use construct::{ChildrenOrValue, ComponentType, Construct, ConstructId, ConstructKind};
pub use object::FlangObject;
pub use tree::{ElementValue, IntermediateTreeElement};
