mod config;
mod engine;
mod error;
mod guard;
mod id;
mod identity;
mod item;
mod memory;
mod metadata;
mod ranker;
mod selector;
mod store;
mod validator;
mod votes;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use guard::*;
pub use id::*;
pub use identity::*;
pub use item::*;
pub use memory::*;
pub use metadata::*;
pub use ranker::*;
pub use selector::*;
pub use store::*;
pub use validator::*;
pub use votes::*;
