//! Hand-rolled error enums the wire protocol itself serializes or the
//! registries surface to callers (§7 taxonomy items 3 and 5-ish). Styled
//! after `xdr::nfs3::nfsstat3`: a closed enum with a manual `Display` and
//! `std::error::Error` impl, no `thiserror`.

use std::fmt;

/// Structure-conflict failures reported via CONNECT_PORTS_ERROR (§7 item 3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectError {
    /// The client-supplied connection handle is already bound in
    /// `server_port_map`.
    OccupiedHandle,
    /// The requested server port path does not resolve in the host's port
    /// graph.
    PortNotFound,
    /// The requested data type does not match the port's actual type.
    TypeMismatch,
    /// A server-side conversion's operations or intermediate/destination
    /// types could not be resolved against the registers.
    ConversionUnresolved,
    /// The host port graph rejected the mutation for a reason it did not
    /// further categorize.
    HostRejected,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConnectError::OccupiedHandle => "connection handle already in use",
            ConnectError::PortNotFound => "server port not found",
            ConnectError::TypeMismatch => "port data type mismatch",
            ConnectError::ConversionUnresolved => "server-side conversion could not be resolved",
            ConnectError::HostRejected => "host port graph rejected the request",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ConnectError {}

/// Why a pending pull call resolved without a value (§4.3 PULLCALL_RETURN,
/// §8 scenario 6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PullFailure {
    /// A PULLCALL_RETURN arrived but its type did not match the local port's
    /// type.
    InvalidDataReceived,
    /// No PULLCALL_RETURN arrived before the deadline, or the connection was
    /// lost first.
    NoConnection,
}

impl fmt::Display for PullFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PullFailure::InvalidDataReceived => "pull returned a value of the wrong type",
            PullFailure::NoConnection => "pull call timed out or the connection was lost",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for PullFailure {}
