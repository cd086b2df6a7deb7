mod exec;
mod insert;
mod provider;
mod stream;

pub use exec::LuaScanExec;
pub use insert::LuaInsertExec;
pub use provider::LuaTableProvider;
pub use stream::{LuaScanStream, ScanReadOptions};
