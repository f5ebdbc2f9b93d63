pub mod bitstring;
pub mod error;
pub mod factory;
pub mod node;
pub mod range;
pub mod reference;
pub mod registry;
pub mod skip;
pub mod transport;
pub mod wire;

pub use bitstring::BitString;
pub use error::{CallError, CallResult};
pub use factory::{NodeFactory, SkipNodeFactory};
pub use node::{Extension, NodeCore, NodeMessage, NodeState};
pub use reference::{BareReference, Bound, RemoteCall, SkipReference};
pub use skip::SkipState;
pub use transport::Dispatcher;
