//! Tool invoker adapters.

mod command;

pub use command::{CommandTool, CommandToolInvoker};
