//! Serialization support: field tags, include mappings and the envelope codec.
//!
//! Payload types describe their wire layout by tagging member fields with a
//! [`PayloadDataIndex`] and wiring subtypes with an [`IncludeTag`]. The
//! [`TagRegistry`] holds both per payload type.
//!
//! ```rust,ignore
//! use peerwire::serialization::{PayloadDataIndex, TagRegistry};
//!
//! let mut registry = TagRegistry::new();
//! registry.register_member("Move", "x", PayloadDataIndex::new(1)?)?;
//! ```

mod codec;
mod registry;
mod tags;

pub use codec::{decode_envelope, encode_envelope, EnvelopeFrame};
pub use registry::TagRegistry;
pub use tags::{IncludeTag, IncludeTarget, PayloadDataIndex, PayloadIncludeIndex, MAX_PAYLOAD_INDEX};
