//! Sentinel wire protocol
//!
//! Just enough RESP to ask a sentinel `SENTINEL get-master-addr-by-name`
//! and read the multi-bulk answer.

pub mod codec;
pub mod types;

pub use codec::{
    Reply, encode_get_master_addr, get_master_addr_by_name, read_master_addr_reply,
    read_multi_bulk,
};
pub use types::{LinkStatus, MasterAddr};
