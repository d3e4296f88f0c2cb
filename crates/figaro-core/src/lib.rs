//! Agent loop and supervisor for Figaro.

mod agent;
mod error;
mod sink;
mod supervisor;

pub use agent::{Agent, MAX_ITERATIONS};
pub use error::FigaroError;
pub use sink::{ConversationSink, FileSink};
pub use supervisor::{Supervisor, SupervisorOptions};
