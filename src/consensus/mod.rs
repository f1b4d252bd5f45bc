pub mod machine;
pub mod message;
pub mod state;
pub mod timer;

pub use machine::{Action, Event, StateMachine};
pub use message::{Ballot, Message, NodeMeta, Term};
pub use state::{ConsensusState, Role, RoleKind};
