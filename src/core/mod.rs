//! # Core Wire Components
//!
//! Field codec, packet ids and the outbound frame type.
//!
//! ## Wire Format
//! ```text
//! [Id(1)] [Payload(N)]
//! ```
//! `N` is fixed per packet id and looked up in the packet registry; it can
//! differ between the base and the extension-gated variant of the same id.

pub mod codec;
pub mod packet;
