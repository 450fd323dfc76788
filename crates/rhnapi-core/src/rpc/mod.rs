//! XML-RPC value model, wire codec and the call client bound to a transport.
//!
//! The codec only covers what the Spacewalk API exchanges: the standard
//! scalar types plus `<i8>` and `<nil/>`, arrays and structs.

pub mod client;
pub mod codec;
pub mod value;

pub use client::RpcClient;
pub use value::Value;
