//! Identity resolution: bearer sessions and Sign-In-With-Farcaster.

pub mod bearer;
pub mod siwf;

pub use bearer::{optional_fid, require_fid, IdentityProvider, PrivyIdentity};
pub use siwf::{CustodyResolver, RpcCustodyResolver, SiwfOutcome, SiwfRequest, SiwfVerifier};
