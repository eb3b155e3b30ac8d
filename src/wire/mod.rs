//! The wire layer: opcode table, packet framing, typed codec primitives,
//! and per-opcode message payloads. Mirrors the `protocol::xdr` +
//! `protocol::rpc::wire` split, collapsed into one module tree since this
//! protocol has a single message family rather than NFS's several
//! program/version combinations.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod opcode;
