pub mod binding;
pub mod capabilities;
pub mod codec;
pub mod datasource;
pub mod error;
pub mod filter;
pub mod modify;
pub mod operator;
pub mod options;
pub mod planning;
pub mod scan;
pub mod session;
pub mod types;
pub mod value;

pub use datasource::LuaTableProvider;
pub use error::{BridgeError, BridgeResult};
